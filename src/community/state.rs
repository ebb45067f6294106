//! Per-agent community state.

use petgraph::stable_graph::NodeIndex;
use std::fmt;

/// Opaque community identifier.
///
/// Identifiers are unique among communities alive at the same time and
/// carry no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommunityId(u64);

impl CommunityId {
    /// Raw value, for export.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Issues fresh [`CommunityId`]s.
#[derive(Debug, Clone, Default)]
pub struct CommunityMinter {
    next: u64,
}

impl CommunityMinter {
    /// Next unused identifier.
    pub fn mint(&mut self) -> CommunityId {
        let id = CommunityId(self.next);
        self.next += 1;
        id
    }
}

/// Emergence bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emergence {
    /// Nothing in progress.
    #[default]
    Idle,
    /// A switch from `from` to `to` is counting down.
    Pending {
        /// Community being left.
        from: CommunityId,
        /// Community being founded or joined.
        to: CommunityId,
        /// Steps before the switch.
        remaining: u32,
    },
    /// The switch happened; the label stays pinned while `remaining` runs out.
    Done {
        /// Community that was left.
        from: CommunityId,
        /// Community that was founded or joined.
        to: CommunityId,
        /// Steps the label stays pinned.
        remaining: u32,
    },
}

impl Emergence {
    /// Whether no emergence is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self, Emergence::Idle)
    }

    /// Whether the label is pinned after a switch.
    pub fn is_pinned(&self) -> bool {
        matches!(self, Emergence::Done { .. })
    }

    /// Target of a pending switch away from `community`.
    pub fn pending_from(&self, community: CommunityId) -> Option<CommunityId> {
        match *self {
            Emergence::Pending { from, to, .. } if from == community => Some(to),
            _ => None,
        }
    }
}

/// Community membership of one agent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommunityState {
    /// Community label; `None` until the agent has been computed once.
    pub label: Option<CommunityId>,
    /// Score in the current community.
    pub score: f64,
    /// Holds the community's originator token.
    pub originator: bool,
    /// Received or founded the token during the current step.
    pub new_originator: bool,
    /// Agent the token was last received from by a walk move.
    pub originator_from: Option<NodeIndex>,
    /// Emergence bookkeeping.
    pub emergence: Emergence,
}

impl CommunityState {
    /// Found `community` with this agent as originator.
    pub fn originate(&mut self, community: CommunityId, score: f64) {
        self.label = Some(community);
        self.score = score;
        self.originator = true;
        self.new_originator = true;
        self.originator_from = None;
    }

    /// Receive the originator token, from `from` if it was walked over.
    pub fn receive_token(&mut self, from: Option<NodeIndex>) {
        self.originator = true;
        self.new_originator = true;
        self.originator_from = from;
    }

    /// Give up the originator token.
    pub fn release_token(&mut self) {
        self.originator = false;
        self.new_originator = false;
        self.originator_from = None;
    }

    /// Whether `other` is labelled and in the same community.
    pub fn shares_label(&self, other: &CommunityState) -> bool {
        self.label.is_some() && self.label == other.label
    }

    /// Whether this agent is labelled `community`.
    pub fn is_in(&self, community: CommunityId) -> bool {
        self.label == Some(community)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minter_is_unique() {
        let mut minter = CommunityMinter::default();
        let a = minter.mint();
        let b = minter.mint();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "c0");
        assert_eq!(b.raw(), 1);
    }

    #[test]
    fn test_token_lifecycle() {
        let mut minter = CommunityMinter::default();
        let c = minter.mint();
        let mut s = CommunityState::default();
        assert!(s.label.is_none());

        s.originate(c, 1.0);
        assert!(s.originator && s.new_originator);
        assert!(s.is_in(c));

        s.release_token();
        assert!(!s.originator);

        s.receive_token(Some(NodeIndex::new(3)));
        assert_eq!(s.originator_from, Some(NodeIndex::new(3)));

        let other = CommunityState::default();
        assert!(!s.shares_label(&other));
        assert!(!other.shares_label(&CommunityState::default()));
    }

    #[test]
    fn test_emergence_views() {
        let mut minter = CommunityMinter::default();
        let (from, to) = (minter.mint(), minter.mint());
        let pending = Emergence::Pending { from, to, remaining: 2 };
        assert_eq!(pending.pending_from(from), Some(to));
        assert_eq!(pending.pending_from(to), None);
        assert!(!pending.is_pinned());
        assert!(Emergence::Done { from, to, remaining: 1 }.is_pinned());
        assert!(Emergence::default().is_idle());
    }
}
