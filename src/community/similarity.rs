//! Neighbour similarity.
//!
//! The similarity `sim(a, b)` of an observer `a` to one of its entering
//! neighbours `b` is built from two parts:
//!
//! - a **topological** part ([`Topology`]): how much `b` belongs with `a`
//!   structurally, and
//! - a **mobility** part ([`Weighting`] over a [`MobilityMetric`]): how
//!   much `b` moves like `a`.
//!
//! | Weighting   | `sim(a, b)`                                            |
//! |-------------|--------------------------------------------------------|
//! | `None`      | `topo`                                                 |
//! | `Stability` | `topo * w(b→a) / max w(·→a)`, 0 if the max is 0        |
//! | `Product`   | `topo * mobility`                                      |
//! | `Blended`   | `w * mobility + (1 - w) * topo`, 0 below the threshold |
//!
//! Every weighting other than `None` writes the mobility similarity onto
//! the link `b → a` before scoring ([`Similarity::refresh_weights`]), so
//! link weights always reflect the current step.
//!
//! Per-observer quantities (the largest entering weight, the largest
//! degree factor) are computed once per observer in an [`Observer`] and
//! reused for every neighbour.

use crate::graph::MobilityGraph;
use crate::mobility::MobilityMetric;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashSet;
use tracing::trace;

/// Structural part of the similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Topology {
    /// Overlap of the closed entering neighbourhoods,
    /// `|N[a] ∩ N[b]| / |N[a] ∪ N[b]|`.
    Neighborhood,
    /// Neighbour score times `in_degree(b)^m`, normalised by the largest
    /// `in_degree^m` among the observer's neighbours. Unlabelled
    /// neighbours score 0.
    DegreeWeighted {
        /// Degree preference exponent.
        m: f64,
    },
}

/// How mobility similarity enters the score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weighting {
    /// Topology only.
    None,
    /// Scale by link weight relative to the largest entering weight.
    Stability,
    /// Multiply topology and mobility.
    Product,
    /// Convex blend, cut to 0 when mobility is below `threshold`.
    Blended {
        /// Share of mobility in the blend.
        mobility_weight: f64,
        /// Minimum mobility similarity.
        threshold: f64,
    },
}

/// Which speed feeds the mobility metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedSource {
    /// Latest instantaneous speed.
    Instant,
    /// Time-mean speed from the last measurement.
    TimeMean,
}

/// Per-observer context for [`Similarity::similarity`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observer {
    /// The observing agent.
    pub agent: NodeIndex,
    /// Largest entering link weight; `None` with no entering links.
    pub max_weight: Option<f64>,
    /// Largest `in_degree^m` among entering neighbours.
    pub max_degree_factor: f64,
}

/// Similarity strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Structural part.
    pub topology: Topology,
    /// Mobility weighting.
    pub weighting: Weighting,
    /// Mobility metric.
    pub metric: MobilityMetric,
    /// Speed fed to the metric.
    pub speed: SpeedSource,
}

impl Default for Similarity {
    fn default() -> Self {
        Self {
            topology: Topology::Neighborhood,
            weighting: Weighting::None,
            metric: MobilityMetric::Spatial,
            speed: SpeedSource::TimeMean,
        }
    }
}

impl Similarity {
    /// Compose a similarity strategy.
    pub fn new(
        topology: Topology,
        weighting: Weighting,
        metric: MobilityMetric,
        speed: SpeedSource,
    ) -> Self {
        Self {
            topology,
            weighting,
            metric,
            speed,
        }
    }

    /// Mobility similarity of `a` and `b`. Missing readings count as 0.
    pub fn mobility(&self, graph: &MobilityGraph, a: NodeIndex, b: NodeIndex) -> f64 {
        let (Some(x), Some(y)) = (graph.agent(a), graph.agent(b)) else {
            return 0.0;
        };
        let (sa, sb) = match self.speed {
            SpeedSource::Instant => (x.speed.unwrap_or(0.0), y.speed.unwrap_or(0.0)),
            SpeedSource::TimeMean => (x.time_mean_speed(), y.time_mean_speed()),
        };
        self.metric.score(
            sa,
            sb,
            x.heading.unwrap_or(0.0),
            y.heading.unwrap_or(0.0),
        )
    }

    /// Write the mobility similarity onto every link entering `a`.
    /// Returns the number of links written; 0 under [`Weighting::None`].
    pub fn refresh_weights(&self, graph: &mut MobilityGraph, a: NodeIndex) -> usize {
        if self.weighting == Weighting::None {
            return 0;
        }
        let weights: Vec<(NodeIndex, f64)> = graph
            .entering(a)
            .map(|b| (b, self.mobility(graph, a, b)))
            .collect();
        for &(b, w) in &weights {
            if let Some(link) = graph.link_from_mut(a, b) {
                link.weight = Some(w);
                trace!(to = a.index(), from = b.index(), weight = w, "link weight");
            }
        }
        weights.len()
    }

    /// Per-observer context for `a`.
    pub fn observe(&self, graph: &MobilityGraph, a: NodeIndex) -> Observer {
        let max_degree_factor = match self.topology {
            Topology::DegreeWeighted { m } => graph
                .entering(a)
                .map(|b| degree_factor(graph.in_degree(b), m))
                .fold(0.0, f64::max),
            Topology::Neighborhood => 0.0,
        };
        Observer {
            agent: a,
            max_weight: graph.max_entering_weight(a),
            max_degree_factor,
        }
    }

    /// Structural similarity of `b` as seen by the observer.
    pub fn topological(&self, graph: &MobilityGraph, observer: &Observer, b: NodeIndex) -> f64 {
        match self.topology {
            Topology::Neighborhood => neighborhood_overlap(graph, observer.agent, b),
            Topology::DegreeWeighted { m } => {
                let Some(state) = graph.agent(b).map(|n| &n.community) else {
                    return 0.0;
                };
                if state.label.is_none() || observer.max_degree_factor <= 0.0 {
                    return 0.0;
                }
                let factor = degree_factor(graph.in_degree(b), m) / observer.max_degree_factor;
                (state.score.clamp(0.0, 1.0) * factor).clamp(0.0, 1.0)
            }
        }
    }

    /// Similarity of `b` as seen by the observer, in [0, 1].
    pub fn similarity(&self, graph: &MobilityGraph, observer: &Observer, b: NodeIndex) -> f64 {
        let a = observer.agent;
        let topo = self.topological(graph, observer, b);
        let sim = match self.weighting {
            Weighting::None => topo,
            Weighting::Stability => match observer.max_weight {
                None => topo,
                Some(max) if max <= 0.0 => 0.0,
                Some(max) => {
                    let w = graph
                        .link_from(a, b)
                        .and_then(|l| l.weight)
                        .unwrap_or(0.0);
                    topo * w / max
                }
            },
            Weighting::Product => topo * self.mobility(graph, a, b),
            Weighting::Blended {
                mobility_weight,
                threshold,
            } => {
                let mobility = self.mobility(graph, a, b);
                if mobility < threshold {
                    0.0
                } else {
                    mobility_weight * mobility + (1.0 - mobility_weight) * topo
                }
            }
        };
        sim.clamp(0.0, 1.0)
    }
}

/// Overlap of the closed entering neighbourhoods of `a` and `b`.
///
/// Two agents joined in both directions and nothing else score 1.0; two
/// unlinked agents with no common neighbour score 0.0.
pub fn neighborhood_overlap(graph: &MobilityGraph, a: NodeIndex, b: NodeIndex) -> f64 {
    let na: HashSet<NodeIndex> = std::iter::once(a).chain(graph.entering(a)).collect();
    let nb: HashSet<NodeIndex> = std::iter::once(b).chain(graph.entering(b)).collect();
    let common = na.intersection(&nb).count();
    let union = na.len() + nb.len() - common;
    if union == 0 {
        0.0
    } else {
        common as f64 / union as f64
    }
}

fn degree_factor(in_degree: usize, m: f64) -> f64 {
    if in_degree == 0 {
        0.0
    } else {
        (in_degree as f64).powf(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::state::CommunityMinter;
    use proptest::prelude::*;

    fn pair(speed_a: f64, speed_b: f64, heading_b: f64) -> (MobilityGraph, NodeIndex, NodeIndex) {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        let b = g.add_agent("b").unwrap();
        g.agent_mut(a).unwrap().speed = Some(speed_a);
        g.agent_mut(a).unwrap().heading = Some(0.0);
        g.agent_mut(b).unwrap().speed = Some(speed_b);
        g.agent_mut(b).unwrap().heading = Some(heading_b);
        (g, a, b)
    }

    fn stability() -> Similarity {
        Similarity::new(
            Topology::Neighborhood,
            Weighting::Stability,
            MobilityMetric::Spatial,
            SpeedSource::Instant,
        )
    }

    #[test]
    fn test_no_edge_is_zero() {
        let (g, a, b) = pair(10.0, 10.0, 0.0);
        let sim = stability();
        let obs = sim.observe(&g, a);
        assert_eq!(obs.max_weight, None);
        assert_eq!(sim.similarity(&g, &obs, b), 0.0);
    }

    #[test]
    fn test_one_edge_identical_mobility_is_one() {
        let (mut g, a, b) = pair(10.0, 10.0, 0.0);
        g.connect(a, b);
        let sim = stability();
        assert_eq!(sim.refresh_weights(&mut g, a), 1);
        assert_eq!(g.link_from(a, b).unwrap().weight, Some(1.0));
        let obs = sim.observe(&g, a);
        assert_eq!(sim.similarity(&g, &obs, b), 1.0);
    }

    #[test]
    fn test_stability_zero_max_weight_forces_zero() {
        let (mut g, a, b) = pair(10.0, 10.0, 180.0);
        g.connect(a, b);
        let sim = stability();
        sim.refresh_weights(&mut g, a);
        let obs = sim.observe(&g, a);
        assert_eq!(obs.max_weight, Some(0.0));
        assert_eq!(sim.similarity(&g, &obs, b), 0.0);
    }

    #[test]
    fn test_stability_rescales_by_max_weight() {
        let (mut g, a, b) = pair(10.0, 10.0, 0.0);
        let c = g.add_agent("c").unwrap();
        g.agent_mut(c).unwrap().speed = Some(5.0);
        g.agent_mut(c).unwrap().heading = Some(0.0);
        g.connect(a, b);
        g.connect(a, c);
        let sim = stability();
        sim.refresh_weights(&mut g, a);
        let obs = sim.observe(&g, a);
        assert_eq!(obs.max_weight, Some(1.0));
        // N[a] = {a, b, c}, N[c] = {c, a}: overlap 2/3, weight 0.5.
        let expected = (2.0 / 3.0) * 0.5;
        assert!((sim.similarity(&g, &obs, c) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_no_weighting_leaves_links_alone() {
        let (mut g, a, b) = pair(10.0, 10.0, 0.0);
        g.connect(a, b);
        let sim = Similarity::default();
        assert_eq!(sim.refresh_weights(&mut g, a), 0);
        assert_eq!(g.link_from(a, b).unwrap().weight, None);
    }

    #[test]
    fn test_blended_threshold() {
        let (mut g, a, b) = pair(10.0, 10.0, 90.0);
        g.connect(a, b);
        let blended = |threshold| {
            Similarity::new(
                Topology::Neighborhood,
                Weighting::Blended {
                    mobility_weight: 0.5,
                    threshold,
                },
                MobilityMetric::Spatial,
                SpeedSource::Instant,
            )
        };
        let low = blended(0.4);
        let obs = low.observe(&g, a);
        assert!((low.similarity(&g, &obs, b) - 0.75).abs() < 1e-12);
        let high = blended(0.6);
        assert_eq!(high.similarity(&g, &obs, b), 0.0);
    }

    #[test]
    fn test_degree_weighted_normalises_and_ignores_unlabelled() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        let b = g.add_agent("b").unwrap();
        let c = g.add_agent("c").unwrap();
        let d = g.add_agent("d").unwrap();
        g.connect(a, b);
        g.connect(a, c);
        g.connect(c, d);
        let mut minter = CommunityMinter::default();
        let id = minter.mint();
        g.agent_mut(c).unwrap().community.originate(id, 1.0);

        let sim = Similarity::new(
            Topology::DegreeWeighted { m: 1.0 },
            Weighting::None,
            MobilityMetric::Spatial,
            SpeedSource::Instant,
        );
        let obs = sim.observe(&g, a);
        assert_eq!(obs.max_degree_factor, 2.0);
        assert_eq!(sim.similarity(&g, &obs, b), 0.0);
        assert_eq!(sim.similarity(&g, &obs, c), 1.0);

        g.agent_mut(b).unwrap().community.originate(minter.mint(), 0.8);
        assert!((sim.similarity(&g, &obs, b) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_overlap_directed() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        let b = g.add_agent("b").unwrap();
        g.add_link(b, a);
        assert_eq!(neighborhood_overlap(&g, a, b), 0.5);
        assert_eq!(neighborhood_overlap(&g, a, a), 1.0);
    }

    proptest! {
        #[test]
        fn similarity_stays_in_unit_interval(
            speeds in proptest::collection::vec(0.0f64..40.0, 5),
            headings in proptest::collection::vec(0.0f64..360.0, 5),
            links in proptest::collection::vec((0usize..5, 0usize..5), 0..12),
            scores in proptest::collection::vec(0.0f64..1.0, 5),
            m in -1.0f64..2.0,
        ) {
            let mut g = MobilityGraph::new();
            let mut minter = CommunityMinter::default();
            let nodes: Vec<NodeIndex> = (0..5)
                .map(|i| g.add_agent(format!("n{i}")).unwrap())
                .collect();
            for (i, &n) in nodes.iter().enumerate() {
                let agent = g.agent_mut(n).unwrap();
                agent.speed = Some(speeds[i]);
                agent.heading = Some(headings[i]);
                agent.community.originate(minter.mint(), scores[i]);
            }
            for (x, y) in links {
                if x != y {
                    g.connect(nodes[x], nodes[y]);
                }
            }
            let strategies = [
                stability(),
                Similarity::new(Topology::DegreeWeighted { m }, Weighting::Product,
                    MobilityMetric::Congestion { threshold: 10.0 }, SpeedSource::Instant),
                Similarity::new(Topology::Neighborhood,
                    Weighting::Blended { mobility_weight: 0.3, threshold: 0.2 },
                    MobilityMetric::Spatial, SpeedSource::TimeMean),
            ];
            for sim in strategies {
                for &a in &nodes {
                    sim.refresh_weights(&mut g, a);
                    let obs = sim.observe(&g, a);
                    let neighbours: Vec<NodeIndex> = g.entering(a).collect();
                    for b in neighbours {
                        let s = sim.similarity(&g, &obs, b);
                        prop_assert!((0.0..=1.0).contains(&s));
                    }
                }
            }
        }
    }
}
