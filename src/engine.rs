//! The per-step driver.
//!
//! [`MobileCommunities`] owns one [`CongestionMeasure`] and one
//! [`CommunityAlgorithm`] built from the same [`CommunityConfig`], and runs
//! them in order once per simulation step:
//!
//! ```text
//! measure pass (shuffled)  ->  community pass (shuffled)  ->  token sweep  ->  link ageing
//! ```
//!
//! The graph is owned by the caller. Structural changes (agents joining,
//! links appearing or breaking) happen between calls to
//! [`MobileCommunities::step`]; agent removal goes through
//! [`MobileCommunities::remove_agent`] so the originator token is handed
//! off before the agent disappears.

use crate::community::validate::check_originators;
use crate::community::{CommunityAlgorithm, StepReport};
use crate::config::{CommunityConfig, Markers};
use crate::error::{Error, Result};
use crate::graph::{Agent, AttrValue, GraphSink, MobilityGraph};
use crate::mobility::CongestionMeasure;
use petgraph::stable_graph::NodeIndex;
use serde_json::Value;
use tracing::debug;

/// Mobility measurement and community detection, one step at a time.
#[derive(Debug, Clone)]
pub struct MobileCommunities {
    config: CommunityConfig,
    markers: Markers,
    measure: CongestionMeasure,
    algorithm: CommunityAlgorithm,
}

impl MobileCommunities {
    /// Build from a validated configuration.
    pub fn new(config: CommunityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            markers: config.markers(),
            measure: CongestionMeasure::from_config(&config),
            algorithm: CommunityAlgorithm::from_config(&config),
            config,
        })
    }

    /// Build from a flat parameter map.
    pub fn from_params<I, K>(params: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::new(CommunityConfig::from_params(params)?)
    }

    /// Configuration in use.
    pub fn config(&self) -> &CommunityConfig {
        &self.config
    }

    /// Mobility measurement stage.
    pub fn measure(&self) -> &CongestionMeasure {
        &self.measure
    }

    /// Community detection stage.
    pub fn algorithm(&self) -> &CommunityAlgorithm {
        &self.algorithm
    }

    /// Mutable access to the community detection stage.
    pub fn algorithm_mut(&mut self) -> &mut CommunityAlgorithm {
        &mut self.algorithm
    }

    /// Run one full step at the graph's current step number.
    pub fn step(&mut self, graph: &mut MobilityGraph) -> StepReport {
        let skipped = self.measure.compute(graph);
        let mut report = self.algorithm.compute(graph);
        report.skipped = skipped;
        graph.age_links();
        debug!(%report, "step done");
        report
    }

    /// Remove `agent`, handing its originator token off first.
    pub fn remove_agent(&mut self, graph: &mut MobilityGraph, agent: NodeIndex) -> Option<Agent> {
        graph.remove_agent(agent, self)
    }

    /// Set a named attribute on `agent`, routing configured markers to
    /// their typed fields.
    pub fn set_attribute(
        &self,
        graph: &mut MobilityGraph,
        agent: NodeIndex,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        let record = graph
            .agent_mut(agent)
            .ok_or_else(|| Error::UnknownAgent(format!("#{}", agent.index())))?;
        record.set_attribute(&self.markers, name, value)
    }

    /// Check the originator invariant.
    pub fn check(&self, graph: &MobilityGraph) -> Result<()> {
        check_originators(graph).into_result()
    }
}

impl GraphSink for MobileCommunities {
    fn node_removed(&mut self, graph: &mut MobilityGraph, agent: NodeIndex) {
        self.algorithm.node_removed(graph, agent);
    }
}
