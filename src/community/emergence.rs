//! Community emergence.
//!
//! Label propagation alone never splits a community: an agent that no
//! longer moves like its neighbours keeps their label as long as nothing
//! better is on offer. Emergence detects that state and moves the agent
//! into a community of its own.
//!
//! An agent *needs* emergence when one of its same-community neighbours is
//! at similarity exactly 0. Under [`EmergencePolicy::Coordinated`] the
//! switch is delayed, and the need only counts while it is *anchored*: the
//! zero-similarity neighbour scores at least as high in the community as
//! the agent itself. When one member of a platoon turns round, its score
//! collapses to 0 while the rest keep theirs, so the turning agent leaves
//! and the platoon stays.
//!
//! ```text
//!         anchored need                 countdown spent, need re-checked
//!   Idle ──────────────▶ Pending{from,to} ────────────────────────────▶ Done{from,to} ──▶ Idle
//!    ▲                       │ need gone                                  (label pinned)
//!    └───────────────────────┘
//! ```
//!
//! The need is re-checked on every pending step, including the one that
//! would commit the switch.
//!
//! - A pending neighbour leaving the same community, at non-zero
//!   similarity, is joined: its target becomes ours, so agents splitting
//!   off together end up together.
//! - On the switch the agent founds the target community (score 0,
//!   originator) unless a neighbour already carries that label. In that
//!   case it joins as a plain member with score 0, and the founder keeps
//!   the token. A token for the old community is handed to the best
//!   neighbour still in it.
//! - While `Done`, the label is pinned so that propagation cannot pull the
//!   agent straight back. The bookkeeping clears when the countdown runs
//!   out.
//!
//! The scan only runs for agents with at least `min_in_degree` entering
//! links.

use super::epidemic::CommunityAlgorithm;
use super::originator::{best_member, pass_token};
use super::report::StepReport;
use super::similarity::Observer;
use super::state::{CommunityId, Emergence};
use crate::graph::MobilityGraph;
use petgraph::stable_graph::NodeIndex;
use tracing::debug;

/// When and how agents split away from their community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmergencePolicy {
    /// Never.
    #[default]
    Disabled,
    /// Found a new community in the step the need is detected.
    Immediate {
        /// Minimum number of entering links for the scan.
        min_in_degree: usize,
    },
    /// Switch after `countdown` steps of anchored need, then pin the
    /// label for `countdown` steps.
    Coordinated {
        /// Steps between detection and switch, and of pinning after it.
        countdown: u32,
        /// Minimum number of entering links for the scan.
        min_in_degree: usize,
    },
}

/// Outcome of scanning the same-community neighbours of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EmergenceScan {
    /// Some same-community neighbour is at similarity 0.
    pub needed: bool,
    /// Some same-community neighbour at similarity 0 scores at least as
    /// high as the scanning agent.
    pub anchored: bool,
    /// Target of a similar neighbour already leaving the same community.
    pub join: Option<CommunityId>,
}

impl CommunityAlgorithm {
    /// Scan `observer`'s neighbours in `community`.
    pub fn scan_emergence(
        &self,
        graph: &MobilityGraph,
        observer: &Observer,
        community: CommunityId,
        min_in_degree: usize,
    ) -> EmergenceScan {
        let mut scan = EmergenceScan::default();
        if graph.in_degree(observer.agent) < min_in_degree {
            return scan;
        }
        let own = graph.agent(observer.agent).map_or(0.0, |a| a.community.score);
        for v in graph.entering(observer.agent) {
            let Some(n) = graph.agent(v) else { continue };
            if !n.community.is_in(community) {
                continue;
            }
            let sim = self.similarity.similarity(graph, observer, v);
            if sim == 0.0 {
                scan.needed = true;
                scan.anchored |= n.community.score >= own;
            } else if let Some(target) = n.community.emergence.pending_from(community) {
                scan.join.get_or_insert(target);
            }
        }
        scan
    }

    pub(crate) fn check_emergence(
        &mut self,
        graph: &mut MobilityGraph,
        u: NodeIndex,
        observer: &Observer,
        report: &mut StepReport,
    ) {
        let Some(state) = graph.agent(u).map(|a| a.community.clone()) else {
            return;
        };
        let Some(label) = state.label else { return };

        match self.emergence {
            EmergencePolicy::Disabled => {}
            EmergencePolicy::Immediate { min_in_degree } => {
                if self.scan_emergence(graph, observer, label, min_in_degree).needed {
                    let target = self.minter.mint();
                    self.switch_community(graph, u, target, report);
                }
            }
            EmergencePolicy::Coordinated {
                countdown,
                min_in_degree,
            } => {
                let next = match state.emergence {
                    Emergence::Idle => {
                        let scan = self.scan_emergence(graph, observer, label, min_in_degree);
                        if scan.anchored {
                            let to = scan.join.unwrap_or_else(|| self.minter.mint());
                            debug!(agent = u.index(), from = %label, %to, joined = scan.join.is_some(), "emergence pending");
                            Emergence::Pending {
                                from: label,
                                to,
                                remaining: countdown,
                            }
                        } else {
                            Emergence::Idle
                        }
                    }
                    Emergence::Pending { from, to, remaining } => {
                        let sustained = label == from
                            && self
                                .scan_emergence(graph, observer, label, min_in_degree)
                                .anchored;
                        if !sustained {
                            debug!(agent = u.index(), from = %label, "emergence cancelled");
                            Emergence::Idle
                        } else if remaining <= 1 {
                            self.switch_community(graph, u, to, report);
                            Emergence::Done {
                                from,
                                to,
                                remaining: countdown,
                            }
                        } else {
                            Emergence::Pending {
                                from,
                                to,
                                remaining: remaining - 1,
                            }
                        }
                    }
                    Emergence::Done { from, to, remaining } => {
                        if remaining <= 1 {
                            Emergence::Idle
                        } else {
                            Emergence::Done {
                                from,
                                to,
                                remaining: remaining - 1,
                            }
                        }
                    }
                };
                if let Some(agent) = graph.agent_mut(u) {
                    agent.community.emergence = next;
                }
            }
        }
    }

    /// Move `u` into `target`, founding it if no neighbour carries it yet.
    fn switch_community(
        &mut self,
        graph: &mut MobilityGraph,
        u: NodeIndex,
        target: CommunityId,
        report: &mut StepReport,
    ) {
        let Some(state) = graph.agent(u).map(|a| a.community.clone()) else {
            return;
        };
        if state.originator {
            if let Some(old) = state.label {
                let heir = best_member(graph, u, old);
                pass_token(graph, u, heir, None, report);
            }
        }
        let founder = !graph
            .entering(u)
            .filter_map(|v| graph.agent(v))
            .any(|n| n.community.is_in(target));
        if let Some(agent) = graph.agent_mut(u) {
            if founder {
                agent.community.originate(target, 0.0);
            } else {
                agent.community.label = Some(target);
                agent.community.score = 0.0;
            }
        }
        report.emerged += 1;
        report.label_changes += 1;
        if founder {
            report.originated += 1;
        }
        debug!(agent = u.index(), from = ?state.label.map(|c| c.to_string()), to = %target, founder, "emerged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::similarity::{Similarity, SpeedSource, Topology, Weighting};
    use crate::mobility::MobilityMetric;

    fn algorithm(policy: EmergencePolicy) -> CommunityAlgorithm {
        CommunityAlgorithm::new(Similarity::new(
            Topology::Neighborhood,
            Weighting::Stability,
            MobilityMetric::Spatial,
            SpeedSource::Instant,
        ))
        .with_emergence(policy)
        .with_seed(9)
    }

    /// Hub `u` plus `n` neighbours, all in one community; `u` heads the
    /// other way.
    fn split_setup(
        algo: &mut CommunityAlgorithm,
        n: usize,
    ) -> (MobilityGraph, NodeIndex, Vec<NodeIndex>, CommunityId) {
        let mut g = MobilityGraph::new();
        let community = algo.minter.mint();
        let u = g.add_agent("u").unwrap();
        let others: Vec<NodeIndex> = (0..n)
            .map(|i| g.add_agent(format!("n{i}")).unwrap())
            .collect();
        for &v in &others {
            g.connect(u, v);
        }
        for (i, &v) in std::iter::once(&u).chain(&others).enumerate() {
            let agent = g.agent_mut(v).unwrap();
            agent.speed = Some(15.0);
            agent.heading = Some(if v == u { 180.0 } else { 0.0 });
            agent.community.label = Some(community);
            agent.community.score = 1.0;
            agent.community.originator = i == 1;
        }
        (g, u, others, community)
    }

    fn run(algo: &mut CommunityAlgorithm, g: &mut MobilityGraph, u: NodeIndex) -> StepReport {
        let mut report = StepReport::default();
        algo.similarity.refresh_weights(g, u);
        let observer = algo.similarity.observe(g, u);
        algo.check_emergence(g, u, &observer, &mut report);
        report
    }

    #[test]
    fn test_scan_detects_zero_similarity() {
        let mut algo = algorithm(EmergencePolicy::Disabled);
        let (mut g, u, _, community) = split_setup(&mut algo, 2);
        algo.similarity.refresh_weights(&mut g, u);
        let observer = algo.similarity.observe(&g, u);
        let scan = algo.scan_emergence(&g, &observer, community, 2);
        assert!(scan.needed);
        assert_eq!(scan.join, None);
        // Too few entering links: never scanned.
        assert_eq!(algo.scan_emergence(&g, &observer, community, 3), EmergenceScan::default());
    }

    #[test]
    fn test_single_neighbor_never_emerges_by_default() {
        let mut algo = algorithm(EmergencePolicy::Coordinated {
            countdown: 2,
            min_in_degree: 2,
        });
        let (mut g, u, _, community) = split_setup(&mut algo, 1);
        for _ in 0..4 {
            run(&mut algo, &mut g, u);
        }
        assert!(g.agent(u).unwrap().community.is_in(community));

        algo.emergence = EmergencePolicy::Coordinated {
            countdown: 2,
            min_in_degree: 1,
        };
        for _ in 0..3 {
            run(&mut algo, &mut g, u);
        }
        assert!(!g.agent(u).unwrap().community.is_in(community));
    }

    #[test]
    fn test_coordinated_countdown_then_pin_then_clear() {
        let mut algo = algorithm(EmergencePolicy::Coordinated {
            countdown: 2,
            min_in_degree: 2,
        });
        let (mut g, u, others, community) = split_setup(&mut algo, 3);

        run(&mut algo, &mut g, u);
        let Emergence::Pending { from, to, remaining } = g.agent(u).unwrap().community.emergence else {
            panic!("expected pending emergence");
        };
        assert_eq!((from, remaining), (community, 2));

        run(&mut algo, &mut g, u);
        assert!(g.agent(u).unwrap().community.is_in(community));

        let report = run(&mut algo, &mut g, u);
        assert_eq!(report.emerged, 1);
        assert_eq!(report.originated, 1);
        let state = &g.agent(u).unwrap().community;
        assert!(state.is_in(to));
        assert!(state.originator);
        assert_eq!(state.score, 0.0);
        assert!(state.emergence.is_pinned());
        for &v in &others {
            assert!(g.agent(v).unwrap().community.is_in(community));
        }

        // Done counts down without touching the label again.
        let report = run(&mut algo, &mut g, u);
        assert_eq!(report.emerged, 0);
        assert!(g.agent(u).unwrap().community.emergence.is_pinned());
        run(&mut algo, &mut g, u);
        let state = &g.agent(u).unwrap().community;
        assert!(state.emergence.is_idle());
        assert!(state.is_in(to));
    }

    #[test]
    fn test_switching_originator_hands_off_old_token() {
        let mut algo = algorithm(EmergencePolicy::Immediate { min_in_degree: 2 });
        let (mut g, u, others, community) = split_setup(&mut algo, 2);
        for &v in &others {
            g.agent_mut(v).unwrap().community.originator = false;
        }
        g.agent_mut(others[1]).unwrap().community.score = 2.0;
        g.agent_mut(u).unwrap().community.originator = true;

        let report = run(&mut algo, &mut g, u);
        assert_eq!(report.emerged, 1);
        assert_eq!(report.token_moves, 1);
        assert!(!g.agent(u).unwrap().community.is_in(community));
        let heir = &g.agent(others[1]).unwrap().community;
        assert!(heir.originator && heir.is_in(community));
    }

    #[test]
    fn test_pending_target_is_joined() {
        let mut algo = algorithm(EmergencePolicy::Coordinated {
            countdown: 2,
            min_in_degree: 2,
        });
        let (mut g, u, others, community) = split_setup(&mut algo, 2);
        // n0 moves with u and is already leaving the community.
        let target = algo.minter.mint();
        {
            let n0 = g.agent_mut(others[0]).unwrap();
            n0.heading = Some(180.0);
            n0.community.emergence = Emergence::Pending {
                from: community,
                to: target,
                remaining: 1,
            };
        }
        run(&mut algo, &mut g, u);
        assert_eq!(
            g.agent(u).unwrap().community.emergence.pending_from(community),
            Some(target)
        );

        // n0 switches first; u then joins rather than founds.
        g.agent_mut(others[0]).unwrap().community.label = Some(target);
        run(&mut algo, &mut g, u);
        let report = run(&mut algo, &mut g, u);
        assert_eq!(report.emerged, 1);
        assert_eq!(report.originated, 0);
        let state = &g.agent(u).unwrap().community;
        assert!(state.is_in(target));
        assert!(!state.originator);
        assert_eq!(state.score, 0.0);
    }

    #[test]
    fn test_pending_cancelled_when_need_vanishes() {
        let mut algo = algorithm(EmergencePolicy::Coordinated {
            countdown: 2,
            min_in_degree: 2,
        });
        let (mut g, u, _, community) = split_setup(&mut algo, 2);
        run(&mut algo, &mut g, u);
        assert!(!g.agent(u).unwrap().community.emergence.is_idle());

        g.agent_mut(u).unwrap().heading = Some(0.0);
        run(&mut algo, &mut g, u);
        let state = &g.agent(u).unwrap().community;
        assert!(state.emergence.is_idle());
        assert!(state.is_in(community));
    }

    #[test]
    fn test_need_counts_only_when_anchored() {
        let mut algo = algorithm(EmergencePolicy::Coordinated {
            countdown: 2,
            min_in_degree: 2,
        });
        let (mut g, u, others, community) = split_setup(&mut algo, 3);
        // Every zero-similarity neighbour scores below u.
        for &v in &others {
            g.agent_mut(v).unwrap().community.score = 0.0;
        }
        algo.similarity.refresh_weights(&mut g, u);
        let observer = algo.similarity.observe(&g, u);
        let scan = algo.scan_emergence(&g, &observer, community, 2);
        assert!(scan.needed);
        assert!(!scan.anchored);

        run(&mut algo, &mut g, u);
        assert!(g.agent(u).unwrap().community.emergence.is_idle());
    }

    #[test]
    fn test_switch_rechecks_need_before_committing() {
        let mut algo = algorithm(EmergencePolicy::Coordinated {
            countdown: 2,
            min_in_degree: 2,
        });
        let (mut g, u, others, community) = split_setup(&mut algo, 3);
        run(&mut algo, &mut g, u);
        run(&mut algo, &mut g, u);
        assert!(matches!(
            g.agent(u).unwrap().community.emergence,
            Emergence::Pending { remaining: 1, .. }
        ));

        // Before the switch lands, u turns out to be the odd one out.
        for &v in &others {
            g.agent_mut(v).unwrap().community.score = 0.5;
        }
        let report = run(&mut algo, &mut g, u);
        assert_eq!(report.emerged, 0);
        let state = &g.agent(u).unwrap().community;
        assert!(state.emergence.is_idle());
        assert!(state.is_in(community));
    }
}
