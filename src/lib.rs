//! # convoy
//!
//! Community detection for mobile agents: groups of vehicles (or any
//! moving nodes) that are both densely linked and travelling together,
//! tracked step by step as the link graph changes.
//!
//! The crate is a per-step library. The caller owns a [`MobilityGraph`],
//! updates positions, speeds, headings and links between steps, and calls
//! [`MobileCommunities::step`] once per simulation step.
//!
//! | Module        | Role                                                      |
//! |---------------|-----------------------------------------------------------|
//! | [`graph`]     | typed agent and link records over a petgraph store         |
//! | [`mobility`]  | speed histories, time-mean speeds, mobility similarity     |
//! | [`community`] | epidemic label propagation, originator token, emergence    |
//! | [`measure`]   | partition statistics                                       |
//! | [`engine`]    | the per-step driver                                        |
//! | [`config`]    | the flat parameter map                                     |
//!
//! ```rust
//! use convoy::{CommunityConfig, MobileCommunities, MobilityGraph};
//!
//! let mut graph = MobilityGraph::new();
//! let a = graph.add_agent("a").unwrap();
//! let b = graph.add_agent("b").unwrap();
//! graph.connect(a, b);
//! for u in [a, b] {
//!     let agent = graph.agent_mut(u).unwrap();
//!     agent.speed = Some(25.0);
//!     agent.heading = Some(0.0);
//! }
//!
//! let mut engine = MobileCommunities::new(CommunityConfig::default().with_seed(7)).unwrap();
//! graph.advance_step();
//! let report = engine.step(&mut graph);
//! assert_eq!(report.agents, 2);
//! engine.check(&graph).unwrap();
//! ```

pub mod community;
/// Parameter map and algorithm presets.
pub mod config;
pub mod engine;
/// Error types used across `convoy`.
pub mod error;
pub mod graph;
pub mod measure;
pub mod mobility;


pub use community::{CommunityAlgorithm, CommunityId, StepReport};
pub use config::{Algorithm, CommunityConfig, SpeedType};
pub use engine::MobileCommunities;
pub use error::{Error, Result};
pub use graph::{Agent, GraphSink, Link, MobilityGraph};
pub use measure::{CommunityDistribution, MobilityProfile, Quantity};
pub use mobility::{MobilityMetric, SpeedHistory};
