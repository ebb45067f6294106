//! Community detection for mobile agents.
//!
//! Given a graph whose links come and go as agents move, find groups of
//! agents that travel together: densely linked *and* mobility-similar,
//! and stable from one step to the next.
//!
//! ## Epidemic label propagation
//!
//! Every agent carries a community label and a score. Each step, an agent
//! looks at its labelled neighbours, sums their similarity per label and
//! adopts the strongest one:
//!
//! ```text
//! score(c) = Σ sim(u, v)   over neighbours v labelled c
//! label(u) = argmax_c score(c)
//! ```
//!
//! Unlike static label propagation this never "converges": it runs
//! forever alongside the simulation, and the partition tracks the graph.
//!
//! ## The Originator Token
//!
//! Plain label propagation drifts. A community slowly swallowed by a
//! neighbour loses nothing it can notice. Each community therefore has a
//! single **originator**, an agent holding a token that anchors it. The
//! token wanders towards well-connected members (see [`originator`]) and
//! is handed off when its holder leaves.
//!
//! **Invariant**: every non-empty community has exactly one originator.
//! Local rules keep this most of the time; an end-of-step sweep repairs
//! the rest, and [`validate::check_originators`] checks it.
//!
//! ## Similarity
//!
//! `sim(u, v)` composes a structural part with a mobility part (same
//! heading, comparable speed); see [`similarity`]. A neighbour heading
//! the other way contributes nothing, however well linked.
//!
//! ## Emergence
//!
//! Propagation alone never splits a community. When a member finds
//! itself at zero similarity with same-community neighbours, it splits
//! off into a new community, together with any neighbours doing the same
//! (see [`emergence`]).
//!
//! ## Presets
//!
//! | Preset            | Topology        | Weighting | Score          | Token  | Emergence   |
//! |-------------------|-----------------|-----------|----------------|--------|-------------|
//! | `mobileSandSharc` | neighbourhood   | stability | accumulated    | walk   | coordinated |
//! | `mobileSharc`     | neighbourhood   | blended   | accumulated    | walk   | off         |
//! | `mobileLeung`     | degree^m        | product   | hop-attenuated | pinned | off         |
//! | `crowdz`          | degree^0        | product   | hop-attenuated | pinned | off         |
//!
//! ## Usage
//!
//! ```rust
//! use convoy::community::CommunityAlgorithm;
//! use convoy::config::CommunityConfig;
//! use convoy::graph::MobilityGraph;
//!
//! let mut graph = MobilityGraph::new();
//! let a = graph.add_agent("a").unwrap();
//! let b = graph.add_agent("b").unwrap();
//! graph.connect(a, b);
//!
//! let mut algo = CommunityAlgorithm::from_config(&CommunityConfig::default().with_seed(1));
//! graph.advance_step();
//! algo.compute(&mut graph);
//! assert_eq!(
//!     graph.agent(a).unwrap().community.label,
//!     graph.agent(b).unwrap().community.label,
//! );
//! ```
//!
//! ## References
//!
//! - Leung, Hui, Liò, Crowcroft (2009). "Towards real-time community
//!   detection in large networks."
//! - Raghavan, Albert, Kumara (2007). "Near linear time algorithm to
//!   detect community structures in large-scale networks."

pub mod emergence;
mod epidemic;
pub mod originator;
mod report;
pub mod similarity;
mod state;
pub mod validate;

pub use emergence::{EmergencePolicy, EmergenceScan};
pub use epidemic::{select_label, CommunityAlgorithm, ScoreRule};
pub use originator::{best_member, reconcile_tokens, TokenPolicy};
pub use report::StepReport;
pub use similarity::{neighborhood_overlap, Observer, Similarity, SpeedSource, Topology, Weighting};
pub use state::{CommunityId, CommunityMinter, CommunityState, Emergence};
