use crate::model::card::{Card, CardId};
use crate::model::rank::Rank;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Draw pile; the top of the pile is the end of the vector.
#[derive(Debug, Clone)]
pub struct Deck {
    cards: Vec<Card>,
}

impl Deck {
    pub const SIZE: usize = 54;

    pub fn standard() -> Self {
        let mut cards = Vec::with_capacity(Deck::SIZE);
        let mut id: CardId = 0;
        for rank in Rank::ORDERED.iter().copied() {
            for _ in 0..rank.copies_in_deck() {
                cards.push(Card::new(id, rank));
                id += 1;
            }
        }
        Self { cards }
    }

    pub fn shuffled<R: rand::Rng + ?Sized>(rng: &mut R) -> Self {
        let mut deck = Self::standard();
        deck.shuffle_in_place(rng);
        deck
    }

    pub fn shuffled_with_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::shuffled(&mut rng)
    }

    pub fn shuffle_in_place<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    pub fn draw(&mut self) -> Option<Card> {
        self.cards.pop()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn into_cards(self) -> Vec<Card> {
        self.cards
    }
}

#[cfg(test)]
mod tests {
    use super::Deck;
    use crate::model::rank::Rank;
    use std::collections::HashSet;

    #[test]
    fn standard_deck_has_54_unique_ids() {
        let deck = Deck::standard();
        assert_eq!(deck.len(), 54);
        let ids: HashSet<_> = deck.cards().iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 54);
        assert!(ids.iter().all(|id| *id < 54));
    }

    #[test]
    fn standard_deck_holds_two_jokers() {
        let deck = Deck::standard();
        let jokers = deck
            .cards()
            .iter()
            .filter(|c| c.rank == Rank::Joker)
            .count();
        assert_eq!(jokers, 2);
        let sevens = deck
            .cards()
            .iter()
            .filter(|c| c.rank == Rank::Seven)
            .count();
        assert_eq!(sevens, 4);
    }

    #[test]
    fn shuffle_with_seed_is_deterministic() {
        let deck_a = Deck::shuffled_with_seed(42);
        let deck_b = Deck::shuffled_with_seed(42);
        assert_eq!(deck_a.cards(), deck_b.cards());
    }

    #[test]
    fn draw_takes_from_the_top() {
        let mut deck = Deck::standard();
        let top = *deck.cards().last().unwrap();
        assert_eq!(deck.draw(), Some(top));
        assert_eq!(deck.len(), 53);
    }
}
