use cascade_core::belief::{DEFAULT_RANK, RankPool};
use cascade_core::model::card::Card;
use cascade_core::model::rank::Rank;
use cascade_core::state::{SearchState, Slot};
use rand::Rng;
use rand::seq::SliceRandom;

/// Samples one concrete world consistent with a search state's beliefs.
///
/// Trusted slots are kept. Untrusted slots are filled by drawing without
/// replacement from the unseen pool; a low-confidence remembered card is kept
/// with probability equal to its confidence when the pool still holds its
/// rank. The remaining pool is shuffled into the deck order.
#[derive(Debug, Default)]
pub struct Determinizer {
    fallbacks: usize,
}

impl Determinizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default-rank substitutions made so far; non-zero only on inconsistent input.
    pub fn fallbacks(&self) -> usize {
        self.fallbacks
    }

    pub fn determinize<R: Rng + ?Sized>(&mut self, state: &SearchState, rng: &mut R) -> SearchState {
        let mut world = state.clone();
        let mut pool = state.unseen_pool();
        let mut sequence: u16 = 0;

        for belief in world.agents_mut() {
            for slot in belief.slots.iter_mut().filter(|slot| !slot.is_trusted()) {
                let remembered = slot
                    .card
                    .filter(|card| rng.gen_bool(f64::from(slot.confidence.clamp(0.0, 1.0))))
                    .filter(|card| pool.remove(card.rank));
                let card = match remembered {
                    Some(card) => card,
                    None => {
                        let rank = self.draw(&mut pool, rng);
                        sequence += 1;
                        Card::synthetic(sequence, rank)
                    }
                };
                *slot = Slot {
                    card: Some(card),
                    confidence: slot.confidence,
                };
            }
        }

        if let Some(pending) = world.pending_mut() {
            if pending.card.is_none() {
                let rank = self.draw(&mut pool, rng);
                sequence += 1;
                pending.card = Some(Card::synthetic(sequence, rank));
            }
        }

        let mut order = Vec::with_capacity(state.deck_remaining());
        for (rank, count) in pool.iter() {
            for _ in 0..count {
                sequence += 1;
                order.push(Card::synthetic(sequence, rank));
            }
        }
        order.shuffle(rng);
        order.truncate(state.deck_remaining());
        while order.len() < state.deck_remaining() {
            self.note_fallback();
            sequence += 1;
            order.push(Card::synthetic(sequence, DEFAULT_RANK));
        }
        world.set_deck_order(order);
        world
    }

    fn draw<R: Rng + ?Sized>(&mut self, pool: &mut RankPool, rng: &mut R) -> Rank {
        match pool.take(rng) {
            Some(rank) => rank,
            None => {
                self.note_fallback();
                DEFAULT_RANK
            }
        }
    }

    fn note_fallback(&mut self) {
        self.fallbacks += 1;
        if self.fallbacks == 1 {
            tracing::warn!(
                target: "cascade_bot::search",
                fallback = %DEFAULT_RANK,
                message = "unseen pool exhausted during determinization",
            );
        }
    }
}
