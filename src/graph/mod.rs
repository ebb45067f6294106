//! Dynamic directed graph of mobile agents.
//!
//! [`MobilityGraph`] wraps a petgraph `StableDiGraph` so that node indices
//! survive removals, and adds a name index plus the current simulation
//! step. Links are directed: `b → a` is an *entering* link of `a`, and the
//! agents at the source end of `a`'s entering links are its neighbours for
//! every computation in this crate. [`MobilityGraph::connect`] adds both
//! directions, which is what a radio-range graph normally wants.
//!
//! Structural changes are made by the driver between steps. Removing an
//! agent notifies a [`GraphSink`] *before* the agent disappears, so the
//! community layer can hand off an originator token while the departing
//! agent's neighbourhood is still readable.

mod agent;
mod attributes;

pub use agent::{Agent, Link, MobilityState};
pub use attributes::{AttrValue, Attributes};

use crate::error::{Error, Result};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

/// Receives structural events from a [`MobilityGraph`].
pub trait GraphSink {
    /// Called before `agent` and its links are removed.
    fn node_removed(&mut self, _graph: &mut MobilityGraph, _agent: NodeIndex) {}
}

impl GraphSink for () {}

/// Agents, links and the current step.
#[derive(Debug, Clone, Default)]
pub struct MobilityGraph {
    graph: StableDiGraph<Agent, Link>,
    names: HashMap<String, NodeIndex>,
    step: u64,
}

impl MobilityGraph {
    /// Empty graph at step 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current step.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Set the current step.
    pub fn set_step(&mut self, step: u64) {
        self.step = step;
    }

    /// Advance to the next step and return it.
    pub fn advance_step(&mut self) -> u64 {
        self.step += 1;
        self.step
    }

    /// Add an agent with the given name.
    pub fn add_agent(&mut self, name: impl Into<String>) -> Result<NodeIndex> {
        self.insert_agent(Agent::new(name))
    }

    /// Add a prepared agent record.
    pub fn insert_agent(&mut self, agent: Agent) -> Result<NodeIndex> {
        if self.names.contains_key(agent.name()) {
            return Err(Error::DuplicateAgent(agent.name().to_string()));
        }
        let name = agent.name().to_string();
        let idx = self.graph.add_node(agent);
        self.names.insert(name, idx);
        Ok(idx)
    }

    /// Remove an agent and its links, notifying `sink` first.
    pub fn remove_agent<S>(&mut self, agent: NodeIndex, sink: &mut S) -> Option<Agent>
    where
        S: GraphSink + ?Sized,
    {
        if !self.graph.contains_node(agent) {
            return None;
        }
        sink.node_removed(self, agent);
        let removed = self.graph.remove_node(agent)?;
        self.names.remove(removed.name());
        Some(removed)
    }

    /// Index of the agent called `name`.
    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.names.get(name).copied()
    }

    /// Index of the agent called `name`, or [`Error::UnknownAgent`].
    pub fn require(&self, name: &str) -> Result<NodeIndex> {
        self.index_of(name)
            .ok_or_else(|| Error::UnknownAgent(name.to_string()))
    }

    /// Agent record.
    pub fn agent(&self, agent: NodeIndex) -> Option<&Agent> {
        self.graph.node_weight(agent)
    }

    /// Mutable agent record.
    pub fn agent_mut(&mut self, agent: NodeIndex) -> Option<&mut Agent> {
        self.graph.node_weight_mut(agent)
    }

    /// Whether `agent` is in the graph.
    pub fn contains(&self, agent: NodeIndex) -> bool {
        self.graph.contains_node(agent)
    }

    /// All agent indices.
    pub fn agents(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// Number of agents.
    pub fn agent_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of directed links.
    pub fn link_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Add the directed link `from → to`. An existing link is reused.
    pub fn add_link(&mut self, from: NodeIndex, to: NodeIndex) -> EdgeIndex {
        match self.graph.find_edge(from, to) {
            Some(edge) => edge,
            None => self.graph.add_edge(from, to, Link::default()),
        }
    }

    /// Link `a` and `b` in both directions.
    pub fn connect(&mut self, a: NodeIndex, b: NodeIndex) {
        self.add_link(a, b);
        self.add_link(b, a);
    }

    /// Remove the directed link `from → to`.
    pub fn remove_link(&mut self, from: NodeIndex, to: NodeIndex) -> Option<Link> {
        let edge = self.graph.find_edge(from, to)?;
        self.graph.remove_edge(edge)
    }

    /// Remove both directions between `a` and `b`.
    pub fn disconnect(&mut self, a: NodeIndex, b: NodeIndex) {
        self.remove_link(a, b);
        self.remove_link(b, a);
    }

    /// Sources of `agent`'s entering links.
    pub fn entering(&self, agent: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .edges_directed(agent, Direction::Incoming)
            .map(|edge| edge.source())
    }

    /// Number of entering links.
    pub fn in_degree(&self, agent: NodeIndex) -> usize {
        self.graph
            .edges_directed(agent, Direction::Incoming)
            .count()
    }

    /// Link entering `agent` from `neighbor`.
    pub fn link_from(&self, agent: NodeIndex, neighbor: NodeIndex) -> Option<&Link> {
        let edge = self.graph.find_edge(neighbor, agent)?;
        self.graph.edge_weight(edge)
    }

    /// Mutable link entering `agent` from `neighbor`.
    pub fn link_from_mut(&mut self, agent: NodeIndex, neighbor: NodeIndex) -> Option<&mut Link> {
        let edge = self.graph.find_edge(neighbor, agent)?;
        self.graph.edge_weight_mut(edge)
    }

    /// Largest weight among `agent`'s entering links.
    ///
    /// `None` when there are no entering links; unweighted links count as
    /// weight 0.
    pub fn max_entering_weight(&self, agent: NodeIndex) -> Option<f64> {
        self.graph
            .edges_directed(agent, Direction::Incoming)
            .map(|edge| edge.weight().weight.unwrap_or(0.0))
            .fold(None, |max, w| Some(max.map_or(w, |m: f64| m.max(w))))
    }

    /// Add one to the duration of every link.
    pub fn age_links(&mut self) {
        let edges: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        for edge in edges {
            if let Some(link) = self.graph.edge_weight_mut(edge) {
                link.duration += 1;
            }
        }
    }
}
