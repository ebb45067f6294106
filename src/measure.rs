//! Partition measures.
//!
//! Snapshots of the current partition, computed on demand from a
//! [`MobilityGraph`].
//!
//! | Measure                   | What it summarises                                |
//! |---------------------------|---------------------------------------------------|
//! | [`CommunityDistribution`] | community count and size spread                   |
//! | [`MobilityProfile`]       | how homogeneous communities are in one quantity   |
//!
//! A good mobility partition has a high spread of per-community means
//! (communities differ from each other) and a low mean per-community
//! standard deviation (members agree with each other).
//!
//! Standard deviations are sample standard deviations (`n - 1`), and 0 for
//! fewer than two values.
//!
//! # Example
//!
//! ```rust
//! use convoy::graph::MobilityGraph;
//! use convoy::measure::{CommunityDistribution, MobilityProfile, Quantity};
//!
//! let graph = MobilityGraph::new();
//! let dist = CommunityDistribution::compute(&graph);
//! assert_eq!(dist.communities, 0);
//! let profile = MobilityProfile::compute(&graph, Quantity::Speed);
//! assert_eq!(profile.mean_of_means, 0.0);
//! ```

use crate::community::CommunityId;
use crate::graph::{Agent, MobilityGraph};
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;

/// Members of every community. Unlabelled agents are left out.
pub fn partition(graph: &MobilityGraph) -> HashMap<CommunityId, Vec<NodeIndex>> {
    let mut communities: HashMap<CommunityId, Vec<NodeIndex>> = HashMap::new();
    for u in graph.agents() {
        if let Some(label) = graph.agent(u).and_then(|a| a.community.label) {
            communities.entry(label).or_default().push(u);
        }
    }
    communities
}

/// Community count and size statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommunityDistribution {
    /// Number of non-empty communities.
    pub communities: usize,
    /// Smallest community size.
    pub min_size: usize,
    /// Largest community size.
    pub max_size: usize,
    /// Mean community size.
    pub mean_size: f64,
    /// Sample standard deviation of community sizes.
    pub size_std_dev: f64,
}

impl CommunityDistribution {
    /// Measure the current partition.
    pub fn compute(graph: &MobilityGraph) -> Self {
        let sizes: Vec<f64> = partition(graph)
            .values()
            .map(|members| members.len() as f64)
            .collect();
        if sizes.is_empty() {
            return Self::default();
        }
        let (mean_size, size_std_dev) = mean_std_dev(&sizes);
        Self {
            communities: sizes.len(),
            min_size: sizes.iter().fold(f64::INFINITY, |a, &b| a.min(b)) as usize,
            max_size: sizes.iter().fold(0.0, |a: f64, &b| a.max(b)) as usize,
            mean_size,
            size_std_dev,
        }
    }
}

/// Per-agent quantity profiled by [`MobilityProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Time-mean speed.
    TimeMeanSpeed,
    /// Instantaneous speed.
    Speed,
    /// Change of time-mean speed.
    Dynamism,
    /// Community score.
    Score,
}

impl Quantity {
    /// Value for `agent`; missing values read as 0.0.
    pub fn read(&self, agent: &Agent) -> f64 {
        match self {
            Quantity::TimeMeanSpeed => agent.time_mean_speed(),
            Quantity::Speed => agent.speed.unwrap_or(0.0),
            Quantity::Dynamism => agent.mobility.dynamism.unwrap_or(0.0),
            Quantity::Score => agent.community.score,
        }
    }
}

/// How one quantity is distributed within and across communities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MobilityProfile {
    /// Quantity profiled.
    pub quantity: Quantity,
    /// Mean over communities of the per-community mean.
    pub mean_of_means: f64,
    /// Sample standard deviation of the per-community means.
    pub std_dev_of_means: f64,
    /// Mean over communities of the per-community standard deviation.
    pub mean_std_dev: f64,
}

impl MobilityProfile {
    /// Profile `quantity` over the current partition.
    pub fn compute(graph: &MobilityGraph, quantity: Quantity) -> Self {
        let mut means = Vec::new();
        let mut std_devs = Vec::new();
        for members in partition(graph).values() {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|&u| graph.agent(u))
                .map(|a| quantity.read(a))
                .collect();
            let (mean, std_dev) = mean_std_dev(&values);
            means.push(mean);
            std_devs.push(std_dev);
        }
        let (mean_of_means, std_dev_of_means) = mean_std_dev(&means);
        let (mean_std_dev, _) = mean_std_dev(&std_devs);
        Self {
            quantity,
            mean_of_means,
            std_dev_of_means,
            mean_std_dev,
        }
    }
}

/// Mean and sample standard deviation; `(0, 0)` for no values.
fn mean_std_dev(values: &[f64]) -> (f64, f64) {
    let n = values.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    (mean, var.sqrt())
}
