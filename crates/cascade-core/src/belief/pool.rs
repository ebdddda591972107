use crate::model::card::Card;
use crate::model::rank::Rank;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rank returned when a draw is requested from an exhausted pool.
pub const DEFAULT_RANK: Rank = Rank::Seven;

/// Count of unseen cards per rank. Counts saturate at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RankPool {
    counts: [u8; Rank::COUNT],
}

impl Default for RankPool {
    fn default() -> Self {
        Self::empty()
    }
}

impl RankPool {
    pub const fn empty() -> Self {
        Self {
            counts: [0; Rank::COUNT],
        }
    }

    /// Composition of a full 54-card deck.
    pub fn full_deck() -> Self {
        let mut pool = Self::empty();
        for rank in Rank::ORDERED {
            pool.counts[rank.index()] = rank.copies_in_deck();
        }
        pool
    }

    pub fn count(&self, rank: Rank) -> u8 {
        self.counts[rank.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn add(&mut self, rank: Rank) {
        let slot = &mut self.counts[rank.index()];
        *slot = slot.saturating_add(1);
    }

    /// Removes one copy; returns false when none was left.
    pub fn remove(&mut self, rank: Rank) -> bool {
        let slot = &mut self.counts[rank.index()];
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    pub fn remove_card(&mut self, card: Card) -> bool {
        self.remove(card.rank)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Rank, u8)> + '_ {
        Rank::ORDERED
            .iter()
            .copied()
            .map(move |rank| (rank, self.count(rank)))
            .filter(|(_, count)| *count > 0)
    }

    /// Mean point value of one unseen card.
    pub fn expected_value(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return DEFAULT_RANK.value() as f32;
        }
        let sum: i32 = self
            .iter()
            .map(|(rank, count)| rank.value() * count as i32)
            .sum();
        sum as f32 / total as f32
    }

    pub fn max_value(&self) -> Option<i32> {
        self.iter().map(|(rank, _)| rank.value()).max()
    }

    pub fn min_value(&self) -> Option<i32> {
        self.iter().map(|(rank, _)| rank.value()).min()
    }

    /// Probability that one unseen card has `rank`.
    pub fn probability(&self, rank: Rank) -> f32 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.count(rank) as f32 / total as f32
        }
    }

    /// Weighted draw with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Rank> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let mut pick = rng.gen_range(0..total);
        for (rank, count) in self.iter() {
            let count = count as usize;
            if pick < count {
                return Some(rank);
            }
            pick -= count;
        }
        None
    }

    /// Weighted draw without replacement.
    pub fn take<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<Rank> {
        let rank = self.sample(rng)?;
        self.remove(rank);
        Some(rank)
    }
}
