//! Community invariant checking.
//!
//! Verifies the originator invariant over a whole graph:
//! - every non-empty community has exactly one originator,
//! - no unlabelled agent holds a token,
//! - no `new_originator` flag outlives its step.
//!
//! A stale flag is reported but does not make the graph unhealthy.
//!
//! # Example
//!
//! ```rust
//! use convoy::community::validate::check_originators;
//! use convoy::graph::MobilityGraph;
//!
//! let graph = MobilityGraph::new();
//! let check = check_originators(&graph);
//! assert!(check.is_healthy());
//! ```

use crate::error::{Error, Result};
use crate::graph::MobilityGraph;
use petgraph::stable_graph::NodeIndex;
use std::collections::HashMap;
use std::fmt;

use super::state::CommunityId;

/// One breach of the originator invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// An agent without a label holds a token.
    StrayToken { agent: NodeIndex },
    /// A labelled community has no token holder.
    NoOriginator { community: CommunityId },
    /// Several members of one community hold its token.
    ManyOriginators {
        community: CommunityId,
        holders: Vec<NodeIndex>,
    },
    /// A `new_originator` flag survived the end of its step.
    StaleFlag { agent: NodeIndex },
}

impl Violation {
    /// Whether this breaks the invariant, as opposed to leftover bookkeeping.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Violation::StaleFlag { .. })
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::StrayToken { agent } => {
                write!(f, "unlabelled agent {} holds a token", agent.index())
            }
            Violation::NoOriginator { community } => {
                write!(f, "community {community} has no originator")
            }
            Violation::ManyOriginators { community, holders } => {
                let ids: Vec<String> = holders.iter().map(|h| h.index().to_string()).collect();
                write!(
                    f,
                    "community {community} has {} originators (agents {})",
                    holders.len(),
                    ids.join(", ")
                )
            }
            Violation::StaleFlag { agent } => {
                write!(f, "new_originator flag on agent {} outlived its step", agent.index())
            }
        }
    }
}

/// Result of [`check_originators`].
#[derive(Debug, Clone, Default)]
pub struct OriginatorCheck {
    pub violations: Vec<Violation>,
}

impl OriginatorCheck {
    /// No fatal violation.
    pub fn is_healthy(&self) -> bool {
        !self.violations.iter().any(Violation::is_fatal)
    }

    /// No violation of any kind.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// `Ok` when healthy, otherwise [`Error::InvariantViolation`] naming
    /// the first fatal violation.
    pub fn into_result(self) -> Result<()> {
        match self.violations.into_iter().find(Violation::is_fatal) {
            None => Ok(()),
            Some(v) => Err(Error::InvariantViolation(v.to_string())),
        }
    }
}

impl fmt::Display for OriginatorCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "originators ok");
        }
        let fatal = self.violations.iter().filter(|v| v.is_fatal()).count();
        writeln!(
            f,
            "{fatal} fatal, {} stale flags",
            self.violations.len() - fatal
        )?;
        for v in &self.violations {
            writeln!(f, "  {v}")?;
        }
        Ok(())
    }
}

/// Check the originator invariant across `graph`.
pub fn check_originators(graph: &MobilityGraph) -> OriginatorCheck {
    let mut violations = Vec::new();
    let mut holders: HashMap<CommunityId, Vec<NodeIndex>> = HashMap::new();

    for u in graph.agents() {
        let Some(state) = graph.agent(u).map(|a| &a.community) else {
            continue;
        };
        match state.label {
            Some(label) => {
                let entry = holders.entry(label).or_default();
                if state.originator {
                    entry.push(u);
                }
            }
            None if state.originator => violations.push(Violation::StrayToken { agent: u }),
            None => {}
        }
        if state.new_originator {
            violations.push(Violation::StaleFlag { agent: u });
        }
    }

    for (community, members) in holders {
        match members.len() {
            0 => violations.push(Violation::NoOriginator { community }),
            1 => {}
            _ => violations.push(Violation::ManyOriginators {
                community,
                holders: members,
            }),
        }
    }

    OriginatorCheck { violations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::community::state::CommunityMinter;
    use proptest::prelude::*;

    #[test]
    fn test_violation_display() {
        let mut minter = CommunityMinter::default();
        let community = minter.mint();
        let v = Violation::ManyOriginators {
            community,
            holders: vec![NodeIndex::new(3), NodeIndex::new(42)],
        };
        let s = v.to_string();
        assert!(s.contains("community c0"));
        assert!(s.contains("2 originators"));
        assert!(s.contains("3, 42"));
        assert!(v.is_fatal());
        assert!(!Violation::StaleFlag { agent: NodeIndex::new(0) }.is_fatal());
    }

    #[test]
    fn test_check_originators_flags_zero_and_many() {
        let mut g = MobilityGraph::new();
        let mut minter = CommunityMinter::default();
        let (c0, c1) = (minter.mint(), minter.mint());
        let a = g.add_agent("a").unwrap();
        let b = g.add_agent("b").unwrap();
        let c = g.add_agent("c").unwrap();
        g.agent_mut(a).unwrap().community.label = Some(c0);
        g.agent_mut(b).unwrap().community.originate(c1, 1.0);
        g.agent_mut(c).unwrap().community.originate(c1, 1.0);

        let check = check_originators(&g);
        assert!(!check.is_healthy());
        assert!(check.violations.contains(&Violation::NoOriginator { community: c0 }));
        assert!(check.violations.iter().any(|v| matches!(
            v,
            Violation::ManyOriginators { community, holders } if *community == c1 && holders.len() == 2
        )));
        let stale = check
            .violations
            .iter()
            .filter(|v| matches!(v, Violation::StaleFlag { .. }))
            .count();
        assert_eq!(stale, 2);
        assert!(matches!(check.into_result(), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_stale_flag_alone_is_healthy() {
        let mut g = MobilityGraph::new();
        let mut minter = CommunityMinter::default();
        let a = g.add_agent("a").unwrap();
        g.agent_mut(a).unwrap().community.originate(minter.mint(), 1.0);

        let check = check_originators(&g);
        assert!(!check.is_clean());
        assert!(check.is_healthy());
        assert!(check.into_result().is_ok());
    }

    #[test]
    fn test_unlabelled_token_holder() {
        let mut g = MobilityGraph::new();
        let a = g.add_agent("a").unwrap();
        g.agent_mut(a).unwrap().community.originator = true;
        let check = check_originators(&g);
        assert_eq!(check.violations, vec![Violation::StrayToken { agent: a }]);
    }

    #[test]
    fn test_healthy_graph() {
        let mut g = MobilityGraph::new();
        let mut minter = CommunityMinter::default();
        let c0 = minter.mint();
        let a = g.add_agent("a").unwrap();
        let b = g.add_agent("b").unwrap();
        g.add_agent("unlabelled").unwrap();
        g.agent_mut(a).unwrap().community.originate(c0, 1.0);
        g.agent_mut(a).unwrap().community.new_originator = false;
        g.agent_mut(b).unwrap().community.label = Some(c0);

        let check = check_originators(&g);
        assert!(check.is_clean(), "{}", check);
        assert!(check.into_result().is_ok());
    }

    proptest! {
        #[test]
        fn reconciled_graphs_are_healthy(
            labels in proptest::collection::vec(proptest::option::of(0usize..4), 1..30),
            tokens in proptest::collection::vec(any::<bool>(), 30),
            scores in proptest::collection::vec(0.0f64..3.0, 30),
        ) {
            let mut g = MobilityGraph::new();
            let mut minter = CommunityMinter::default();
            let ids: Vec<CommunityId> = (0..4).map(|_| minter.mint()).collect();
            for (i, label) in labels.iter().enumerate() {
                let u = g.add_agent(format!("a{i}")).unwrap();
                let state = &mut g.agent_mut(u).unwrap().community;
                state.label = label.map(|l| ids[l]);
                state.originator = tokens[i];
                state.new_originator = tokens[i];
                state.score = scores[i];
            }
            crate::community::originator::reconcile_tokens(&mut g);
            let check = check_originators(&g);
            prop_assert!(check.is_clean(), "{}", check);
        }
    }
}
