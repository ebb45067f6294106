//! Epidemic label propagation over a mobility graph.
//!
//! One call to [`CommunityAlgorithm::compute`] is one step: every agent is
//! visited once, in an order shuffled by the algorithm's own seeded RNG,
//! and goes through
//!
//! 1. **compute-scores**: accumulate `sim(u, v)` per community label over
//!    labelled entering neighbours `v`;
//! 2. **select-label**: take the label with the highest positive score
//!    (first seen wins a tie); an unlabelled agent with nothing to join
//!    founds a singleton community with score 1.0;
//! 3. **update-originator**: token migration, see [`TokenPolicy`];
//! 4. **check-emergence**: community splitting, see [`EmergencePolicy`].
//!
//! Each agent reads all of its neighbours before writing its own state.
//! Writes to neighbours are limited to link weights and token handoffs.
//!
//! After the pass, a sweep restores the one-originator-per-community
//! invariant and clears `new_originator` flags.

use super::emergence::EmergencePolicy;
use super::originator::{reconcile_tokens, TokenPolicy};
use super::report::StepReport;
use super::similarity::{Observer, Similarity, SpeedSource, Topology, Weighting};
use super::state::{CommunityId, CommunityMinter, CommunityState};
use super::validate::check_originators;
use crate::config::{Algorithm, CommunityConfig, SpeedType};
use crate::graph::{GraphSink, MobilityGraph};
use crate::mobility::MobilityMetric;
use petgraph::stable_graph::NodeIndex;
use rand::prelude::*;
use tracing::debug;

/// How an agent's score in its community is derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreRule {
    /// The accumulated similarity of the chosen label.
    Accumulated,
    /// A token holder that kept its label scores 1.0; everyone else takes
    /// the best same-label neighbour score minus `delta`, floored at 0.
    HopAttenuated {
        /// Hop attenuation.
        delta: f64,
    },
}

/// Epidemic community detection with a wandering originator token.
#[derive(Debug, Clone)]
pub struct CommunityAlgorithm {
    pub(crate) similarity: Similarity,
    pub(crate) score_rule: ScoreRule,
    pub(crate) token_policy: TokenPolicy,
    pub(crate) emergence: EmergencePolicy,
    pub(crate) rng: StdRng,
    pub(crate) minter: CommunityMinter,
}

impl CommunityAlgorithm {
    /// Algorithm with the given similarity, accumulated scores, a
    /// wandering token, no emergence, and an OS-seeded RNG.
    pub fn new(similarity: Similarity) -> Self {
        Self {
            similarity,
            score_rule: ScoreRule::Accumulated,
            token_policy: TokenPolicy::WeightedWalk,
            emergence: EmergencePolicy::Disabled,
            rng: StdRng::from_os_rng(),
            minter: CommunityMinter::default(),
        }
    }

    /// Algorithm for the preset and parameters in `config`.
    pub fn from_config(config: &CommunityConfig) -> Self {
        let speed = match config.speed_type {
            SpeedType::Instant => SpeedSource::Instant,
            SpeedType::TimeMean | SpeedType::SpaceTimeMean => SpeedSource::TimeMean,
        };
        let algorithm = match config.algorithm {
            Algorithm::MobileSandSharc => Self::new(Similarity::new(
                Topology::Neighborhood,
                Weighting::Stability,
                MobilityMetric::Congestion {
                    threshold: config.congestion_speed_threshold,
                },
                speed,
            ))
            .with_emergence(EmergencePolicy::Coordinated {
                countdown: config.emergence_countdown,
                min_in_degree: config.emergence_min_in_degree,
            }),
            Algorithm::MobileSharc => Self::new(Similarity::new(
                Topology::Neighborhood,
                Weighting::Blended {
                    mobility_weight: config.mobility_weight,
                    threshold: config.mobility_similarity_threshold,
                },
                MobilityMetric::Spatial,
                speed,
            )),
            Algorithm::MobileLeung => Self::new(Similarity::new(
                Topology::DegreeWeighted { m: config.m },
                Weighting::Product,
                MobilityMetric::Spatial,
                speed,
            ))
            .with_score_rule(ScoreRule::HopAttenuated {
                delta: config.delta,
            })
            .with_token_policy(TokenPolicy::Pinned),
            Algorithm::Crowdz => Self::new(Similarity::new(
                Topology::DegreeWeighted { m: 0.0 },
                Weighting::Product,
                MobilityMetric::Spatial,
                speed,
            ))
            .with_score_rule(ScoreRule::HopAttenuated { delta: 0.0 })
            .with_token_policy(TokenPolicy::Pinned),
        };
        match config.seed {
            Some(seed) => algorithm.with_seed(seed),
            None => algorithm,
        }
    }

    /// Seed the RNG used for shuffling and token walks.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Set the similarity strategy.
    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.similarity = similarity;
        self
    }

    /// Set the score rule.
    pub fn with_score_rule(mut self, rule: ScoreRule) -> Self {
        self.score_rule = rule;
        self
    }

    /// Set the token policy.
    pub fn with_token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = policy;
        self
    }

    /// Set the emergence policy.
    pub fn with_emergence(mut self, policy: EmergencePolicy) -> Self {
        self.emergence = policy;
        self
    }

    /// Similarity strategy.
    pub fn similarity(&self) -> &Similarity {
        &self.similarity
    }

    /// Score rule.
    pub fn score_rule(&self) -> ScoreRule {
        self.score_rule
    }

    /// Token policy.
    pub fn token_policy(&self) -> TokenPolicy {
        self.token_policy
    }

    /// Emergence policy.
    pub fn emergence_policy(&self) -> EmergencePolicy {
        self.emergence
    }

    /// Run one community pass over every agent.
    pub fn compute(&mut self, graph: &mut MobilityGraph) -> StepReport {
        let mut report = StepReport::new(graph.step());
        let mut order: Vec<NodeIndex> = graph.agents().collect();
        order.shuffle(&mut self.rng);
        for u in order {
            self.compute_node(graph, u, &mut report);
            report.agents += 1;
        }
        report.repairs = reconcile_tokens(graph);
        if cfg!(debug_assertions) {
            let health = check_originators(graph);
            debug_assert!(health.is_healthy(), "{health}");
        }
        report
    }

    /// Run the four sub-steps for one agent.
    pub fn compute_node(&mut self, graph: &mut MobilityGraph, u: NodeIndex, report: &mut StepReport) {
        let Some(before) = graph.agent(u).map(|a| a.community.clone()) else {
            return;
        };
        self.similarity.refresh_weights(graph, u);
        let observer = self.similarity.observe(graph, u);
        let scores = self.community_scores(graph, &observer);
        let best = select_label(&scores).filter(|&(_, score)| score > 0.0);

        let label = match (best, before.label) {
            (None, None) => {
                let community = self.originate(graph, u, 1.0);
                report.originated += 1;
                debug!(agent = u.index(), %community, "isolated agent founded community");
                return;
            }
            (_, Some(current)) if before.emergence.is_pinned() => current,
            (Some((chosen, _)), _) => chosen,
            (None, Some(current)) => current,
        };
        let score = self.next_score(graph, u, &before, label, &scores);
        if let Some(agent) = graph.agent_mut(u) {
            agent.community.label = Some(label);
            agent.community.score = score;
        }
        if before.label != Some(label) {
            report.label_changes += 1;
        }

        self.update_originator(graph, u, before.label, report);
        self.check_emergence(graph, u, &observer, report);
    }

    /// Accumulated similarity per label, in the order labels are first met.
    pub fn community_scores(
        &self,
        graph: &MobilityGraph,
        observer: &Observer,
    ) -> Vec<(CommunityId, f64)> {
        let mut scores: Vec<(CommunityId, f64)> = Vec::new();
        for v in graph.entering(observer.agent) {
            let Some(label) = graph.agent(v).and_then(|n| n.community.label) else {
                continue;
            };
            let sim = self.similarity.similarity(graph, observer, v);
            match scores.iter_mut().find(|(c, _)| *c == label) {
                Some(entry) => entry.1 += sim,
                None => scores.push((label, sim)),
            }
        }
        scores
    }

    /// Found a fresh community with `u` as originator.
    pub(crate) fn originate(&mut self, graph: &mut MobilityGraph, u: NodeIndex, score: f64) -> CommunityId {
        let community = self.minter.mint();
        if let Some(agent) = graph.agent_mut(u) {
            agent.community.originate(community, score);
        }
        community
    }

    fn next_score(
        &self,
        graph: &MobilityGraph,
        u: NodeIndex,
        before: &CommunityState,
        label: CommunityId,
        scores: &[(CommunityId, f64)],
    ) -> f64 {
        match self.score_rule {
            ScoreRule::Accumulated => scores
                .iter()
                .find(|(c, _)| *c == label)
                .map_or(before.score, |&(_, s)| s),
            ScoreRule::HopAttenuated { delta } => {
                if before.originator && before.label == Some(label) {
                    return 1.0;
                }
                graph
                    .entering(u)
                    .filter_map(|v| graph.agent(v))
                    .filter(|n| n.community.is_in(label))
                    .map(|n| n.community.score)
                    .fold(None, |max: Option<f64>, s| Some(max.map_or(s, |m| m.max(s))))
                    .map_or(before.score, |max| (max - delta).max(0.0))
            }
        }
    }
}

impl GraphSink for CommunityAlgorithm {
    fn node_removed(&mut self, graph: &mut MobilityGraph, agent: NodeIndex) {
        self.hand_off_departing(graph, agent);
    }
}

/// Label with the highest accumulated score; the first one seen wins ties.
pub fn select_label(scores: &[(CommunityId, f64)]) -> Option<(CommunityId, f64)> {
    scores.iter().copied().fold(None, |best, (c, s)| match best {
        Some((_, b)) if b >= s => best,
        _ => Some((c, s)),
    })
}
