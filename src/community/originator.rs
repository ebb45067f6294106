//! Originator token migration.
//!
//! Every non-empty community has exactly one agent holding its originator
//! token. The token moves in three situations:
//!
//! | Situation                        | Recipient                                  |
//! |----------------------------------|--------------------------------------------|
//! | holder kept its label            | weighted walk (only under `WeightedWalk`)  |
//! | holder changed label             | best-scoring neighbour of the old community |
//! | holder leaves the graph          | best-scoring neighbour of its community    |
//!
//! The walk moves the token when a same-community neighbour (other than
//! the one the token just came from) scores higher than the holder, or,
//! failing that, with probability `max / own`. The recipient is drawn by
//! roulette wheel over neighbour scores. A token that arrived during the
//! current step does not move again until the next one.
//!
//! Handoffs can fail when the holder has no neighbour in the community.
//! [`reconcile_tokens`] runs at the end of every step and repairs whatever
//! the local rules left behind.

use super::epidemic::CommunityAlgorithm;
use super::report::StepReport;
use super::state::{CommunityId, CommunityState};
use crate::graph::MobilityGraph;
use petgraph::stable_graph::NodeIndex;
use rand::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// How the token moves while its holder stays in the community.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenPolicy {
    /// Score-driven random walk towards the community's centre.
    #[default]
    WeightedWalk,
    /// Stays put; only label changes and removals move it.
    Pinned,
}

impl CommunityAlgorithm {
    pub(crate) fn update_originator(
        &mut self,
        graph: &mut MobilityGraph,
        u: NodeIndex,
        previous: Option<CommunityId>,
        report: &mut StepReport,
    ) {
        let Some(state) = graph.agent(u).map(|a| a.community.clone()) else {
            return;
        };
        if state.originator {
            match previous {
                Some(old) if state.label != Some(old) => {
                    let heir = best_member(graph, u, old);
                    pass_token(graph, u, heir, None, report);
                }
                _ if !state.new_originator && self.token_policy == TokenPolicy::WeightedWalk => {
                    if let Some(v) = self.walk_target(graph, u, &state) {
                        pass_token(graph, u, Some(v), Some(u), report);
                    }
                }
                _ => {}
            }
        }
        if let Some(agent) = graph.agent_mut(u) {
            agent.community.new_originator = false;
        }
    }

    fn walk_target(
        &mut self,
        graph: &MobilityGraph,
        u: NodeIndex,
        state: &CommunityState,
    ) -> Option<NodeIndex> {
        let label = state.label?;
        let candidates: Vec<(NodeIndex, f64)> = graph
            .entering(u)
            .filter(|&v| Some(v) != state.originator_from)
            .filter_map(|v| {
                let n = graph.agent(v)?;
                n.community
                    .is_in(label)
                    .then_some((v, n.community.score.max(0.0)))
            })
            .collect();
        let max = candidates.iter().map(|&(_, s)| s).reduce(f64::max)?;
        let own = state.score;
        let moves = max > own || (own > 0.0 && self.rng.random::<f64>() < max / own);
        if !moves {
            return None;
        }
        roulette(&candidates, &mut self.rng)
    }

    /// Hand the token of a departing agent to its best-scoring neighbour
    /// in the same community.
    pub(crate) fn hand_off_departing(&mut self, graph: &mut MobilityGraph, u: NodeIndex) {
        let Some(state) = graph.agent(u).map(|a| a.community.clone()) else {
            return;
        };
        let (true, Some(label)) = (state.originator, state.label) else {
            return;
        };
        let heir = best_member(graph, u, label);
        debug!(agent = u.index(), community = %label, heir = ?heir.map(|h| h.index()), "departing originator");
        let mut scratch = StepReport::default();
        pass_token(graph, u, heir, None, &mut scratch);
    }
}

/// Entering neighbour of `u` in `community` with the highest score.
/// Ties go to the first neighbour seen.
pub fn best_member(graph: &MobilityGraph, u: NodeIndex, community: CommunityId) -> Option<NodeIndex> {
    let mut best: Option<(NodeIndex, f64)> = None;
    for v in graph.entering(u) {
        let Some(n) = graph.agent(v) else { continue };
        if !n.community.is_in(community) {
            continue;
        }
        if best.map_or(true, |(_, s)| n.community.score > s) {
            best = Some((v, n.community.score));
        }
    }
    best.map(|(v, _)| v)
}

/// Move the token from `from` to `to`; with no recipient the token is
/// simply dropped and left to the end-of-step sweep.
pub(crate) fn pass_token(
    graph: &mut MobilityGraph,
    from: NodeIndex,
    to: Option<NodeIndex>,
    origin: Option<NodeIndex>,
    report: &mut StepReport,
) {
    if let Some(agent) = graph.agent_mut(from) {
        agent.community.release_token();
    }
    let Some(to) = to else { return };
    if let Some(agent) = graph.agent_mut(to) {
        agent.community.receive_token(origin);
        report.token_moves += 1;
        debug!(from = from.index(), to = to.index(), "originator token moved");
    }
}

/// Roulette-wheel draw proportional to the candidates' scores.
fn roulette(candidates: &[(NodeIndex, f64)], rng: &mut StdRng) -> Option<NodeIndex> {
    let total: f64 = candidates.iter().map(|&(_, s)| s).sum();
    let mut r = rng.random::<f64>() * total;
    for &(v, s) in candidates {
        if r <= s {
            return Some(v);
        }
        r -= s;
    }
    candidates.last().map(|&(v, _)| v)
}

/// Restore one originator per non-empty community and clear
/// `new_originator` flags. Returns the number of repairs made.
pub fn reconcile_tokens(graph: &mut MobilityGraph) -> usize {
    let mut top: HashMap<CommunityId, (NodeIndex, f64)> = HashMap::new();
    let mut holders: HashMap<CommunityId, Vec<(NodeIndex, f64)>> = HashMap::new();
    let mut stray: Vec<NodeIndex> = Vec::new();

    for u in graph.agents() {
        let Some(state) = graph.agent(u).map(|a| &a.community) else { continue };
        let Some(label) = state.label else {
            if state.originator {
                stray.push(u);
            }
            continue;
        };
        let entry = top.entry(label).or_insert((u, state.score));
        if state.score > entry.1 {
            *entry = (u, state.score);
        }
        if state.originator {
            holders.entry(label).or_default().push((u, state.score));
        }
    }

    let mut repairs = 0;
    for u in stray {
        if let Some(agent) = graph.agent_mut(u) {
            agent.community.release_token();
            repairs += 1;
        }
    }
    for (community, (best, _)) in top {
        match holders.get(&community).map(Vec::as_slice) {
            None | Some([]) => {
                if let Some(agent) = graph.agent_mut(best) {
                    agent.community.receive_token(None);
                    repairs += 1;
                    debug!(%community, agent = best.index(), "community without originator repaired");
                }
            }
            Some([_]) => {}
            Some(many) => {
                let keep = many
                    .iter()
                    .copied()
                    .reduce(|a, b| if b.1 > a.1 { b } else { a })
                    .map(|(v, _)| v);
                for &(v, _) in many {
                    if Some(v) != keep {
                        if let Some(agent) = graph.agent_mut(v) {
                            agent.community.release_token();
                            repairs += 1;
                        }
                    }
                }
                debug!(%community, holders = many.len(), "surplus originators released");
            }
        }
    }

    let all: Vec<NodeIndex> = graph.agents().collect();
    for u in all {
        if let Some(agent) = graph.agent_mut(u) {
            agent.community.new_originator = false;
        }
    }
    repairs
}
