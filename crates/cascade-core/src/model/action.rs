use crate::model::rank::Rank;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Special effect carried by an action-capable card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Blind swap of two cards anywhere on the table.
    Exchange,
    /// Peek at one card, then optionally swap it with one of the mover's own.
    Scout,
    /// Reveal one opponent card to the mover.
    Observe,
    /// Chosen opponent draws a face-down penalty card.
    Attack,
    /// Wildcard: target one card and announce a rank.
    Declare,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Exchange,
        ActionKind::Scout,
        ActionKind::Observe,
        ActionKind::Attack,
        ActionKind::Declare,
    ];

    pub const fn rank(self) -> Rank {
        match self {
            ActionKind::Exchange => Rank::Jack,
            ActionKind::Scout => Rank::Queen,
            ActionKind::Observe => Rank::Ten,
            ActionKind::Attack => Rank::Eight,
            ActionKind::Declare => Rank::Joker,
        }
    }

    pub const fn is_harmful(self) -> bool {
        matches!(self, ActionKind::Attack)
    }

    pub const fn reveals(self) -> bool {
        matches!(self, ActionKind::Scout | ActionKind::Observe)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Exchange => "exchange",
            ActionKind::Scout => "scout",
            ActionKind::Observe => "observe",
            ActionKind::Attack => "attack",
            ActionKind::Declare => "declare",
        };
        f.write_str(label)
    }
}
