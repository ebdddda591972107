use crate::model::action::ActionKind;
use crate::model::rank::Rank;
use core::fmt;
use serde::{Deserialize, Serialize};

pub type CardId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub rank: Rank,
    #[serde(default)]
    pub played: bool,
}

impl Card {
    /// First id handed out to cards synthesised during determinization.
    pub const SYNTHETIC_BASE: CardId = 1000;

    pub const fn new(id: CardId, rank: Rank) -> Self {
        Self {
            id,
            rank,
            played: false,
        }
    }

    pub const fn synthetic(sequence: u16, rank: Rank) -> Self {
        Self::new(Card::SYNTHETIC_BASE + sequence, rank)
    }

    pub const fn value(self) -> i32 {
        self.rank.value()
    }

    pub const fn action(self) -> Option<ActionKind> {
        self.rank.action()
    }

    pub const fn has_action(self) -> bool {
        self.rank.action().is_some()
    }

    pub const fn is_synthetic(self) -> bool {
        self.id >= Card::SYNTHETIC_BASE
    }

    pub const fn as_played(self) -> Self {
        Self {
            id: self.id,
            rank: self.rank,
            played: true,
        }
    }

    pub const fn same_card(self, other: Card) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.rank, self.id)
    }
}
