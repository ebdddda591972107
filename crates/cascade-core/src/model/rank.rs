use crate::model::action::ActionKind;
use core::fmt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rank {
    Ace = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Five = 5,
    Six = 6,
    Seven = 7,
    Eight = 8,
    Nine = 9,
    Ten = 10,
    Jack = 11,
    Queen = 12,
    King = 13,
    Joker = 14,
}

impl Rank {
    pub const COUNT: usize = 14;

    pub const ORDERED: [Rank; Rank::COUNT] = [
        Rank::Ace,
        Rank::Two,
        Rank::Three,
        Rank::Four,
        Rank::Five,
        Rank::Six,
        Rank::Seven,
        Rank::Eight,
        Rank::Nine,
        Rank::Ten,
        Rank::Jack,
        Rank::Queen,
        Rank::King,
        Rank::Joker,
    ];

    pub const fn from_index(index: usize) -> Option<Self> {
        if index < Rank::COUNT {
            Some(Rank::ORDERED[index])
        } else {
            None
        }
    }

    /// Dense 0-based index, `Ace == 0` through `Joker == 13`.
    pub const fn index(self) -> usize {
        self as usize - 1
    }

    /// Point value counted against the holder at the end of a round.
    pub const fn value(self) -> i32 {
        match self {
            Rank::King => 0,
            Rank::Joker => -1,
            other => other as i32,
        }
    }

    pub const fn action(self) -> Option<ActionKind> {
        match self {
            Rank::Jack => Some(ActionKind::Exchange),
            Rank::Queen => Some(ActionKind::Scout),
            Rank::Ten => Some(ActionKind::Observe),
            Rank::Eight => Some(ActionKind::Attack),
            Rank::Joker => Some(ActionKind::Declare),
            _ => None,
        }
    }

    pub const fn copies_in_deck(self) -> u8 {
        match self {
            Rank::Joker => 2,
            _ => 4,
        }
    }

    pub const fn is_wildcard(self) -> bool {
        matches!(self, Rank::Joker)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
            Rank::Joker => "JK",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::Rank;
    use crate::model::action::ActionKind;

    #[test]
    fn index_roundtrip() {
        for (i, rank) in Rank::ORDERED.iter().enumerate() {
            assert_eq!(rank.index(), i);
            assert_eq!(Rank::from_index(i), Some(*rank));
        }
        assert_eq!(Rank::from_index(Rank::COUNT), None);
    }

    #[test]
    fn king_and_joker_are_cheapest() {
        assert_eq!(Rank::King.value(), 0);
        assert_eq!(Rank::Joker.value(), -1);
        assert_eq!(Rank::Queen.value(), 12);
        assert_eq!(Rank::Ace.value(), 1);
    }

    #[test]
    fn action_ranks_map_to_kinds() {
        assert_eq!(Rank::Jack.action(), Some(ActionKind::Exchange));
        assert_eq!(Rank::Joker.action(), Some(ActionKind::Declare));
        assert_eq!(Rank::Seven.action(), None);
    }

    #[test]
    fn display_matches_symbols() {
        assert_eq!(Rank::Joker.to_string(), "JK");
        assert_eq!(Rank::Ten.to_string(), "10");
    }
}
