use cascade_core::model::action::ActionKind;
use cascade_core::model::moves::Move;
use cascade_core::state::movegen::legal_moves;
use cascade_core::state::SearchState;
use cascade_core::state::transition::apply;
use rand::Rng;
use rand::seq::SliceRandom;

/// Hands at or below this size make any move a possible round ender.
const ENDING_HAND: usize = 2;

/// Prioritised playout policy.
///
/// In order: an immediate win, the largest cascade-in, a peek (taken with
/// probability `scout_bias`), the best swap of a trusted card for a cheaper
/// known one, an attack on the opponent closest to going out, and otherwise a
/// uniformly random move that is not a call.
#[derive(Debug, Clone, Copy)]
pub struct RolloutPolicy {
    pub scout_bias: f64,
}

impl Default for RolloutPolicy {
    fn default() -> Self {
        Self { scout_bias: 0.75 }
    }
}

impl RolloutPolicy {
    pub fn new(scout_bias: f64) -> Self {
        Self {
            scout_bias: scout_bias.clamp(0.0, 1.0),
        }
    }

    /// Plays at most `depth` moves from `state`.
    pub fn play<R: Rng + ?Sized>(&self, mut state: SearchState, depth: usize, rng: &mut R) -> SearchState {
        for _ in 0..depth {
            if state.is_terminal() {
                break;
            }
            let moves = legal_moves(&state);
            let mv = self.choose(&state, &moves, rng);
            state = apply(&state, &mv);
        }
        state
    }

    pub fn choose<R: Rng + ?Sized>(&self, state: &SearchState, moves: &[Move], rng: &mut R) -> Move {
        if let Some(mv) = immediate_win(state, moves) {
            return mv;
        }
        if let Some(mv) = largest_cascade(moves) {
            return mv;
        }
        let peeks: Vec<&Move> = moves.iter().filter(|mv| is_peek(state, mv)).collect();
        if !peeks.is_empty() && rng.gen_bool(self.scout_bias) {
            if let Some(mv) = peeks.choose(rng) {
                return (*mv).clone();
            }
        }
        if let Some(mv) = improving_swap(state, moves) {
            return mv;
        }
        if let Some(mv) = defensive_attack(state, moves) {
            return mv;
        }
        let quiet: Vec<&Move> = moves
            .iter()
            .filter(|mv| !matches!(mv, Move::CallEndGame))
            .collect();
        quiet
            .choose(rng)
            .map(|mv| (*mv).clone())
            .or_else(|| moves.first().cloned())
            .unwrap_or(Move::Pass)
    }
}

fn immediate_win(state: &SearchState, moves: &[Move]) -> Option<Move> {
    let mover = state.mover();
    let short_hand = state.card_count(mover) <= ENDING_HAND;
    moves
        .iter()
        .filter(|mv| short_hand || matches!(mv, Move::CallEndGame))
        .find(|mv| {
            let next = apply(state, mv);
            next.is_terminal()
                && next
                    .winner()
                    .is_some_and(|winner| next.same_side(winner, mover))
        })
        .cloned()
}

fn largest_cascade(moves: &[Move]) -> Option<Move> {
    moves
        .iter()
        .filter_map(|mv| match mv {
            Move::CascadeIn { positions } => Some((positions.len(), mv)),
            _ => None,
        })
        .max_by_key(|(len, _)| *len)
        .map(|(_, mv)| mv.clone())
}

fn pending_action(state: &SearchState) -> Option<ActionKind> {
    state.pending().and_then(|p| p.card).and_then(|c| c.action())
}

fn is_peek(state: &SearchState, mv: &Move) -> bool {
    let Move::UseAction { declared, .. } = mv else {
        return false;
    };
    match pending_action(state) {
        Some(ActionKind::Scout | ActionKind::Observe) => true,
        Some(ActionKind::Declare) => declared
            .and_then(|rank| rank.action())
            .is_some_and(ActionKind::reveals),
        _ => false,
    }
}

fn improving_swap(state: &SearchState, moves: &[Move]) -> Option<Move> {
    let incoming = state.pending().and_then(|p| p.card)?;
    let own = state.agent(state.mover())?;
    moves
        .iter()
        .filter_map(|mv| {
            let Move::SwapIntoHand { position } = mv else {
                return None;
            };
            let outgoing = own.slot(*position)?.trusted_card()?;
            let gain = outgoing.value() - incoming.value();
            (gain > 0).then_some((gain, mv))
        })
        .max_by_key(|(gain, _)| *gain)
        .map(|(_, mv)| mv.clone())
}

fn defensive_attack(state: &SearchState, moves: &[Move]) -> Option<Move> {
    let attacking = match pending_action(state) {
        Some(ActionKind::Attack) => true,
        Some(ActionKind::Declare) => false,
        _ => return None,
    };
    moves
        .iter()
        .filter(|mv| match mv {
            Move::UseAction { declared, .. } => {
                attacking || declared.and_then(|r| r.action()) == Some(ActionKind::Attack)
            }
            _ => false,
        })
        .filter_map(|mv| {
            let target = mv.targets().first()?;
            let cards = state.card_count(target.agent);
            (cards <= ENDING_HAND).then_some((cards, mv))
        })
        .min_by_key(|(cards, _)| *cards)
        .map(|(_, mv)| mv.clone())
}

#[cfg(test)]
mod tests {
    use super::RolloutPolicy;
    use cascade_core::belief::BeliefStore;
    use cascade_core::model::agent::AgentId;
    use cascade_core::model::card::Card;
    use cascade_core::model::moves::{Move, Target};
    use cascade_core::model::rank::Rank;
    use cascade_core::state::movegen::legal_moves;
    use cascade_core::state::transition::apply;
    use cascade_core::state::{AgentBelief, CardSource, PendingCard, SearchState};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::sync::Arc;

    fn table(hands: Vec<Vec<Card>>, pending: Option<Card>) -> SearchState {
        let beliefs = Arc::new(BeliefStore::new(AgentId(0), hands.len()));
        let agents = hands.iter().map(|h| AgentBelief::known(h)).collect();
        SearchState::new(beliefs, agents, AgentId(0))
            .with_deck_order(vec![Card::new(60, Rank::Two); 8])
            .with_pending(pending.map(|card| PendingCard {
                card: Some(card),
                source: CardSource::Deck,
            }))
    }

    #[test]
    fn takes_an_immediate_win() {
        // Either placing the drawn Six cascades the last own card.
        let state = table(
            vec![
                vec![Card::new(0, Rank::Six)],
                vec![Card::new(1, Rank::Nine), Card::new(2, Rank::Nine)],
            ],
            Some(Card::new(3, Rank::Six)),
        );
        let moves = legal_moves(&state);
        let mut rng = SmallRng::seed_from_u64(0);
        let mv = RolloutPolicy::default().choose(&state, &moves, &mut rng);
        let next = apply(&state, &mv);
        assert!(next.is_terminal());
        assert_eq!(next.winner(), Some(AgentId(0)));
    }

    #[test]
    fn swaps_out_the_most_expensive_known_card() {
        let state = table(
            vec![
                vec![
                    Card::new(0, Rank::Five),
                    Card::new(1, Rank::Queen),
                    Card::new(2, Rank::Nine),
                ],
                vec![
                    Card::new(4, Rank::Two),
                    Card::new(5, Rank::Three),
                    Card::new(6, Rank::Four),
                ],
            ],
            Some(Card::new(3, Rank::Ace)),
        );
        let moves = legal_moves(&state);
        let mut rng = SmallRng::seed_from_u64(0);
        let mv = RolloutPolicy::new(0.0).choose(&state, &moves, &mut rng);
        assert_eq!(mv, Move::SwapIntoHand { position: 1 });
    }

    #[test]
    fn attacks_the_opponent_about_to_go_out() {
        let state = table(
            vec![
                vec![
                    Card::new(0, Rank::Five),
                    Card::new(1, Rank::Four),
                    Card::new(2, Rank::Six),
                ],
                vec![
                    Card::new(4, Rank::Two),
                    Card::new(5, Rank::Three),
                    Card::new(6, Rank::Four),
                ],
                vec![Card::new(7, Rank::Ace)],
            ],
            Some(Card::new(3, Rank::Eight)),
        );
        let moves = legal_moves(&state);
        let mut rng = SmallRng::seed_from_u64(0);
        let mv = RolloutPolicy::new(0.0).choose(&state, &moves, &mut rng);
        assert_eq!(mv.targets().first().map(|t| t.agent), Some(AgentId(2)));
        assert_eq!(
            mv,
            Move::UseAction {
                targets: vec![Target::new(AgentId(2), 0)],
                swap: false,
                declared: None,
            }
        );
    }

    #[test]
    fn playout_stops_at_depth_or_terminal() {
        let state = table(
            vec![
                vec![Card::new(0, Rank::Five), Card::new(1, Rank::Four)],
                vec![Card::new(4, Rank::Two), Card::new(5, Rank::Three)],
            ],
            None,
        );
        let mut rng = SmallRng::seed_from_u64(7);
        let end = RolloutPolicy::default().play(state.clone(), 3, &mut rng);
        assert!(end.is_terminal() || end.turn() <= state.turn() + 3);
    }
}
