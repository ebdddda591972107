use super::{
    CardSource, MAX_CASCADE_DEPTH, PendingCard, Phase, SearchState, Slot, TerminalReason,
};
use crate::model::action::ActionKind;
use crate::model::agent::AgentId;
use crate::model::card::Card;
use crate::model::moves::{Move, Target};
use crate::model::rank::Rank;
use tracing::{Level, event};

/// Positions removed from each agent by one cascade pass, ascending.
type Removed = Vec<(AgentId, Vec<usize>)>;

/// Applies `mv` to a copy of `state`.
///
/// Moves that do not fit the state (wrong phase, missing pending card,
/// positions out of range) advance the turn without any other effect.
pub fn apply(state: &SearchState, mv: &Move) -> SearchState {
    let mut next = state.clone();
    if next.is_terminal() {
        malformed(&next, mv, "state_is_terminal");
        return next;
    }
    next.last_cascade_depth = 0;
    if !super::movegen::is_legal(&next, mv) {
        malformed(&next, mv, "illegal_move");
        degrade(&mut next);
        settle_terminal(&mut next);
        return next;
    }
    match mv {
        Move::Draw => draw(&mut next),
        Move::TakeDiscard => take_discard(&mut next),
        Move::UseAction {
            targets,
            swap,
            declared,
        } => use_action(&mut next, targets, *swap, *declared),
        Move::SwapIntoHand { position } => swap_into_hand(&mut next, *position),
        Move::DiscardDrawn => discard_drawn(&mut next),
        Move::CascadeIn { positions } => cascade_in(&mut next, positions),
        Move::Pass => pass(&mut next),
        Move::CallEndGame => call_end_game(&mut next),
    }
    settle_terminal(&mut next);
    next
}

/// Records an end-of-round call that the rest of the table still answers.
///
/// Unlike [`apply`] with [`Move::CallEndGame`], the state stays live: the
/// turn passes on and the round completes when play returns to the caller.
pub fn open_endgame(state: &SearchState) -> SearchState {
    let mut next = state.clone();
    if next.is_terminal() || !super::movegen::is_legal(&next, &Move::CallEndGame) {
        malformed(&next, &Move::CallEndGame, "call_not_allowed");
        return next;
    }
    next.last_cascade_depth = 0;
    next.caller = Some(next.mover);
    end_turn(&mut next);
    settle_terminal(&mut next);
    next
}

fn malformed(state: &SearchState, mv: &Move, reason: &'static str) {
    if !tracing::enabled!(target: "cascade_core::transition", Level::DEBUG) {
        return;
    }
    event!(
        target: "cascade_core::transition",
        Level::DEBUG,
        mover = %state.mover,
        turn = state.turn,
        attempted = %mv,
        reason,
    );
}

/// No-op fallback: close whatever is open and hand the turn on.
fn degrade(state: &mut SearchState) {
    match state.phase() {
        Phase::CascadeWindow => close_window(state),
        Phase::PostDraw => {
            if let Some(PendingCard {
                card: Some(card),
                source: CardSource::Discard,
            }) = state.pending
            {
                put_back(state, card);
            } else if let Some(card) = state.pending.and_then(|p| p.card) {
                place_on_discard(state, card, None);
                cascade_top(state);
                settle_cascades(state);
            }
            end_turn(state);
        }
        Phase::TurnStart => end_turn(state),
        Phase::Finished => {}
    }
}

fn draw(state: &mut SearchState) {
    state.deck_remaining = state.deck_remaining.saturating_sub(1);
    let card = state.deck_order.pop();
    state.pending = Some(PendingCard {
        card,
        source: CardSource::Deck,
    });
}

fn take_discard(state: &mut SearchState) {
    let Some(top) = state.discard_top else {
        return;
    };
    if state
        .discard_history
        .last()
        .is_some_and(|c| c.same_card(top))
    {
        state.discard_history.pop();
    }
    state.discard_top = state.discard_history.last().copied();
    state.declared_top = None;
    state.pending = Some(PendingCard {
        card: Some(Card { played: false, ..top }),
        source: CardSource::Discard,
    });
}

fn use_action(state: &mut SearchState, requested: &[Target], swap: bool, declared: Option<Rank>) {
    let Some(card) = state.pending.take().and_then(|p| p.card) else {
        return;
    };
    let Some(kind) = card.action() else {
        place_on_discard(state, card, None);
        end_turn(state);
        return;
    };
    let declared = if kind == ActionKind::Declare {
        declared
    } else {
        None
    };
    place_on_discard(state, card, declared);
    let removed = cascade_top(state);
    let targets: Vec<Option<Target>> = requested.iter().map(|t| remap(*t, &removed)).collect();
    let first = targets.first().copied().flatten();
    let second = targets.get(1).copied().flatten();
    let attacked = requested.first().map(|t| t.agent);

    match kind {
        ActionKind::Exchange => {
            if let (Some(a), Some(b)) = (first, second) {
                swap_slots(state, a, b);
            }
        }
        ActionKind::Scout => {
            if let Some(peeked) = first {
                reveal(state, peeked);
                if let (true, Some(own)) = (swap, second) {
                    swap_slots(state, peeked, own);
                    reveal(state, own);
                }
            }
        }
        ActionKind::Observe => {
            if let Some(target) = first {
                reveal(state, target);
            }
        }
        ActionKind::Attack => {
            if let Some(agent) = attacked {
                penalty(state, agent);
            }
        }
        ActionKind::Declare => match (declared.and_then(Rank::action), first) {
            (Some(ActionKind::Scout | ActionKind::Observe), Some(target)) => reveal(state, target),
            (Some(ActionKind::Attack), _) => {
                if let Some(agent) = attacked {
                    penalty(state, agent);
                }
            }
            _ => {}
        },
    }
    settle_cascades(state);
    end_turn(state);
}

fn swap_into_hand(state: &mut SearchState, position: usize) {
    let Some(pending) = state.pending.take() else {
        return;
    };
    let incoming = match pending.card {
        Some(card) => Slot::known(card),
        None => Slot::unknown(),
    };
    let mover = state.mover;
    let Some(slot) = slot_mut(state, Target::new(mover, position)) else {
        end_turn(state);
        return;
    };
    let outgoing = std::mem::replace(slot, incoming);
    match outgoing.card {
        Some(card) => {
            place_on_discard(state, card, None);
            cascade_top(state);
            settle_cascades(state);
        }
        None => event!(
            target: "cascade_core::transition",
            Level::DEBUG,
            mover = %state.mover,
            position,
            reason = "swapped_out_unknown_card",
        ),
    }
    end_turn(state);
}

fn discard_drawn(state: &mut SearchState) {
    if let Some(card) = state.pending.take().and_then(|p| p.card) {
        place_on_discard(state, card, None);
        cascade_top(state);
        settle_cascades(state);
    }
    end_turn(state);
}

fn cascade_in(state: &mut SearchState, positions: &[usize]) {
    let mover = state.mover;
    let mut ordered: Vec<usize> = positions.to_vec();
    ordered.sort_unstable_by(|a, b| b.cmp(a));
    ordered.dedup();
    let mut removed = Vec::with_capacity(ordered.len());
    if let Some(belief) = state.agents.get_mut(mover.index()) {
        for position in ordered {
            if position >= belief.slots.len() {
                continue;
            }
            if let Some(card) = belief.slots.remove(position).card {
                removed.push(card.as_played());
            }
        }
    }
    removed.reverse();
    push_discards(state, removed);
    close_window(state);
}

fn pass(state: &mut SearchState) {
    match state.phase() {
        Phase::CascadeWindow => close_window(state),
        Phase::PostDraw => degrade(state),
        Phase::TurnStart => end_turn(state),
        Phase::Finished => {}
    }
}

fn call_end_game(state: &mut SearchState) {
    state.caller = Some(state.mover);
    state.end_called = true;
}

fn close_window(state: &mut SearchState) {
    state.cascade_phase = false;
    state.active_ranks.clear();
}

fn end_turn(state: &mut SearchState) {
    state.pending = None;
    state.cascade_phase = false;
    state.active_ranks.clear();
    state.mover = state.mover.next(state.table_size());
    state.turn += 1;
}

fn place_on_discard(state: &mut SearchState, card: Card, declared: Option<Rank>) {
    let card = card.as_played();
    state.discard_history.push(card);
    state.discard_top = Some(card);
    state.declared_top = declared;
}

fn put_back(state: &mut SearchState, card: Card) {
    let top = state.declared_top;
    place_on_discard(state, card, None);
    state.declared_top = top.filter(|_| card.rank.is_wildcard());
}

fn push_discards(state: &mut SearchState, cards: Vec<Card>) {
    if cards.is_empty() {
        return;
    }
    state.discard_history.extend(cards);
    state.discard_top = state.discard_history.last().copied();
    state.declared_top = None;
}

/// Removes every trusted card of the current top rank from every hand.
fn cascade_top(state: &mut SearchState) -> Removed {
    let Some(rank) = state.top_rank() else {
        return Vec::new();
    };
    state.last_cascade_depth += 1;
    let mut removed = Vec::new();
    let mut cards = Vec::new();
    for (index, belief) in state.agents.iter_mut().enumerate() {
        let positions = belief.trusted_positions(rank);
        for position in positions.iter().rev() {
            if let Some(card) = belief.slots.remove(*position).card {
                cards.push(card.as_played());
            }
        }
        if !positions.is_empty() {
            removed.push((AgentId(index as u8), positions));
        }
    }
    push_discards(state, cards);
    if !removed.is_empty() && tracing::enabled!(target: "cascade_core::transition", Level::TRACE)
    {
        event!(
            target: "cascade_core::transition",
            Level::TRACE,
            rank = %rank,
            depth = state.last_cascade_depth,
            agents = removed.len(),
        );
    }
    removed
}

/// Follow-up cascades for cards of the top rank that became trusted after the
/// first pass, bounded by [`MAX_CASCADE_DEPTH`].
fn settle_cascades(state: &mut SearchState) {
    while state.last_cascade_depth < MAX_CASCADE_DEPTH {
        let Some(rank) = state.top_rank() else {
            return;
        };
        let pending = state
            .agents
            .iter()
            .any(|belief| !belief.trusted_positions(rank).is_empty());
        if !pending {
            return;
        }
        cascade_top(state);
    }
}

/// Shifts a target past the positions a cascade removed; `None` if its card went.
fn remap(target: Target, removed: &Removed) -> Option<Target> {
    let Some((_, positions)) = removed.iter().find(|(agent, _)| *agent == target.agent) else {
        return Some(target);
    };
    if positions.contains(&target.position) {
        return None;
    }
    let below = positions.iter().filter(|p| **p < target.position).count();
    Some(Target::new(target.agent, target.position - below))
}

fn slot_mut(state: &mut SearchState, target: Target) -> Option<&mut Slot> {
    state
        .agents
        .get_mut(target.agent.index())
        .and_then(|belief| belief.slots.get_mut(target.position))
}

fn reveal(state: &mut SearchState, target: Target) {
    if let Some(slot) = slot_mut(state, target) {
        slot.reveal();
    }
}

fn swap_slots(state: &mut SearchState, a: Target, b: Target) {
    let (Some(left), Some(right)) = (state.slot(a).copied(), state.slot(b).copied()) else {
        return;
    };
    if let Some(slot) = slot_mut(state, a) {
        *slot = right;
    }
    if let Some(slot) = slot_mut(state, b) {
        *slot = left;
    }
}

fn penalty(state: &mut SearchState, agent: AgentId) {
    if state.deck_remaining == 0 {
        return;
    }
    state.deck_remaining -= 1;
    let slot = match state.deck_order.pop() {
        Some(card) => Slot::hidden(card),
        None => Slot::unknown(),
    };
    if let Some(belief) = state.agents.get_mut(agent.index()) {
        belief.slots.push(slot);
    }
}

fn settle_terminal(state: &mut SearchState) {
    if state.terminal.is_some() {
        return;
    }
    let at_turn_start = state.phase() == Phase::TurnStart;
    let reason = if state.end_called {
        Some(TerminalReason::EndCalled)
    } else if state.agents.iter().any(|b| b.is_empty()) {
        Some(TerminalReason::EmptyHand)
    } else if at_turn_start && state.deck_remaining == 0 {
        Some(TerminalReason::DeckExhausted)
    } else if state.turn >= state.turn_ceiling {
        Some(TerminalReason::TurnCeiling)
    } else if at_turn_start && state.caller == Some(state.mover) {
        Some(TerminalReason::EndgameComplete)
    } else {
        None
    };
    if let Some(reason) = reason {
        state.terminal = Some(reason);
        state.winner = state.resolve_winner();
    }
}

#[cfg(test)]
mod tests {
    use super::apply;
    use crate::belief::BeliefStore;
    use crate::model::agent::AgentId;
    use crate::model::card::Card;
    use crate::model::moves::{Move, Target};
    use crate::model::rank::Rank;
    use crate::state::{
        AgentBelief, CardSource, MAX_CASCADE_DEPTH, PendingCard, Phase, SearchState, Slot,
        TerminalReason,
    };
    use std::sync::Arc;

    fn card(id: u16, rank: Rank) -> Card {
        Card::new(id, rank)
    }

    fn table(hands: Vec<AgentBelief>, deck: Vec<Card>, discard: Vec<Card>) -> SearchState {
        let beliefs = Arc::new(BeliefStore::new(AgentId(0), hands.len()));
        SearchState::new(beliefs, hands, AgentId(0))
            .with_deck_order(deck)
            .with_discard(discard)
    }

    fn pending(state: SearchState, card: Card, source: CardSource) -> SearchState {
        state.with_pending(Some(PendingCard {
            card: Some(card),
            source,
        }))
    }

    #[test]
    fn discarding_a_seven_cascades_both_known_sevens() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two), card(1, Rank::Three)]),
            AgentBelief::known(&[card(2, Rank::Seven), card(3, Rank::Seven), card(4, Rank::King)]),
        ];
        let state = table(hands, vec![card(10, Rank::Ace); 5], vec![card(11, Rank::Ace)]);
        let state = pending(state, card(5, Rank::Seven), CardSource::Deck);
        let next = apply(&state, &Move::DiscardDrawn);
        let remaining = &next.agents()[1];
        assert_eq!(remaining.card_count(), 1);
        assert_eq!(remaining.slots[0].card, Some(card(4, Rank::King)));
        assert_eq!(next.score_of(AgentId(1)), 0.0);
        assert_eq!(next.mover(), AgentId(1));
        assert_eq!(next.discard_history().len(), 4);
    }

    #[test]
    fn untrusted_cards_survive_a_cascade() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two)]),
            AgentBelief::new(vec![
                Slot::known(card(2, Rank::Seven)),
                Slot::hidden(card(3, Rank::Seven)),
            ]),
        ];
        let state = table(hands, vec![card(10, Rank::Ace); 3], vec![]);
        let state = pending(state, card(5, Rank::Seven), CardSource::Deck);
        let next = apply(&state, &Move::DiscardDrawn);
        assert_eq!(next.agents()[1].card_count(), 1);
        assert_eq!(next.agents()[1].slots[0].card, Some(card(3, Rank::Seven)));
    }

    #[test]
    fn three_single_nines_end_the_round() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Nine), card(1, Rank::Four)]),
            AgentBelief::known(&[card(2, Rank::Nine)]),
            AgentBelief::known(&[card(3, Rank::Nine)]),
            AgentBelief::known(&[card(4, Rank::Ace)]),
        ];
        let state = table(hands, vec![card(10, Rank::Two); 5], vec![]);
        let state = pending(state, card(6, Rank::Nine), CardSource::Deck);
        let next = apply(&state, &Move::DiscardDrawn);
        assert_eq!(next.agents()[1].card_count(), 0);
        assert_eq!(next.agents()[2].card_count(), 0);
        assert_eq!(next.agents()[0].card_count(), 1);
        assert!(next.is_terminal());
        assert_eq!(next.terminal_reason(), Some(TerminalReason::EmptyHand));
        assert_eq!(next.winner(), Some(AgentId(1)));
    }

    #[test]
    fn swap_into_hand_discards_the_replaced_card() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Queen), card(1, Rank::Four)]),
            AgentBelief::known(&[card(2, Rank::Five)]),
        ];
        let state = table(hands, vec![card(10, Rank::Two); 4], vec![card(20, Rank::Six)]);
        let state = pending(state, card(6, Rank::King), CardSource::Deck);
        let before = state.total_value();
        let next = apply(&state, &Move::SwapIntoHand { position: 0 });
        assert_eq!(next.agents()[0].slots[0].card, Some(card(6, Rank::King)));
        assert_eq!(next.discard_top().map(|c| c.id), Some(0));
        assert_eq!(next.total_value(), before);
    }

    #[test]
    fn take_discard_pops_the_pile() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two)]),
            AgentBelief::known(&[card(1, Rank::Five)]),
        ];
        let state = table(
            hands,
            vec![card(10, Rank::Two); 4],
            vec![card(20, Rank::Six), card(21, Rank::King)],
        );
        let next = apply(&state, &Move::TakeDiscard);
        assert_eq!(next.phase(), Phase::PostDraw);
        assert_eq!(next.pending().and_then(|p| p.card).map(|c| c.id), Some(21));
        assert_eq!(next.discard_top().map(|c| c.id), Some(20));
        assert_eq!(next.mover(), AgentId(0));
    }

    #[test]
    fn discard_drawn_is_refused_for_a_taken_card() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two)]),
            AgentBelief::known(&[card(1, Rank::Five)]),
        ];
        let state = table(hands, vec![card(10, Rank::Two); 4], vec![]);
        let state = pending(state, card(21, Rank::King), CardSource::Discard);
        let next = apply(&state, &Move::DiscardDrawn);
        // degraded: card goes back on the pile without cascading, turn advances
        assert_eq!(next.discard_top().map(|c| c.id), Some(21));
        assert_eq!(next.mover(), AgentId(1));
        assert_eq!(next.agents()[0].card_count(), 1);
    }

    #[test]
    fn declare_cascades_the_declared_rank_and_reveals() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Five), card(1, Rank::Jack)]),
            AgentBelief::new(vec![
                Slot::known(card(2, Rank::Five)),
                Slot::hidden(card(3, Rank::Five)),
                Slot::hidden(card(4, Rank::Queen)),
            ]),
        ];
        let state = table(hands, vec![card(10, Rank::Two); 4], vec![]);
        let state = pending(state, card(52, Rank::Joker), CardSource::Deck);
        let mv = Move::UseAction {
            targets: vec![Target::new(AgentId(1), 1)],
            swap: false,
            declared: Some(Rank::Ten),
        };
        let next = apply(&state, &mv);
        // Ten cascades nothing, Observe reveals agent1[1].
        assert!(next.agents()[1].slots[1].is_trusted());
        assert_eq!(next.agents()[1].card_count(), 3);

        let mv = Move::UseAction {
            targets: vec![Target::new(AgentId(1), 1)],
            swap: false,
            declared: Some(Rank::Five),
        };
        let next = apply(&state, &mv);
        assert_eq!(next.agents()[0].card_count(), 1);
        assert_eq!(next.agents()[1].card_count(), 2);
    }

    #[test]
    fn observe_reveal_triggers_a_nested_cascade() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two), card(1, Rank::Three)]),
            AgentBelief::new(vec![
                Slot::hidden(card(2, Rank::Four)),
                Slot::hidden(card(3, Rank::Queen)),
            ]),
        ];
        let state = table(hands, vec![card(10, Rank::Two); 4], vec![]);
        let state = pending(state, card(52, Rank::Joker), CardSource::Deck);
        let mv = Move::UseAction {
            targets: vec![Target::new(AgentId(1), 1)],
            swap: false,
            declared: Some(Rank::Queen),
        };
        let next = apply(&state, &mv);
        // Declaring Queen means Scout: the revealed Queen matches the top rank.
        assert_eq!(next.agents()[1].card_count(), 1);
        assert_eq!(next.last_cascade_depth(), 2);
        assert!(next.last_cascade_depth() <= MAX_CASCADE_DEPTH);
    }

    #[test]
    fn exchange_swaps_blind_and_keeps_positions_after_cascade() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Jack), card(1, Rank::Nine)]),
            AgentBelief::new(vec![
                Slot::hidden(card(2, Rank::Ace)),
                Slot::hidden(card(3, Rank::Six)),
            ]),
        ];
        let state = table(hands, vec![card(10, Rank::Two); 4], vec![]);
        let state = pending(state, card(40, Rank::Jack), CardSource::Deck);
        let mv = Move::UseAction {
            targets: vec![Target::new(AgentId(0), 1), Target::new(AgentId(1), 0)],
            swap: false,
            declared: None,
        };
        let before = state.total_value();
        let next = apply(&state, &mv);
        // own trusted Jack cascaded away; the Nine shifted to position 0
        assert_eq!(next.agents()[0].card_count(), 1);
        assert_eq!(next.agents()[0].slots[0].card, Some(card(2, Rank::Ace)));
        assert_eq!(next.agents()[1].slots[0].card, Some(card(1, Rank::Nine)));
        assert_eq!(next.total_value(), before);
    }

    #[test]
    fn attack_hands_a_hidden_penalty_card() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two)]),
            AgentBelief::known(&[card(1, Rank::Five)]),
        ];
        let state = table(hands, vec![card(10, Rank::Six), card(11, Rank::Four)], vec![]);
        let state = pending(state, card(30, Rank::Eight), CardSource::Deck);
        let mv = Move::UseAction {
            targets: vec![Target::new(AgentId(1), 0)],
            swap: false,
            declared: None,
        };
        let next = apply(&state, &mv);
        assert_eq!(next.agents()[1].card_count(), 2);
        assert_eq!(next.agents()[1].slots[1], Slot::hidden(card(11, Rank::Four)));
        assert_eq!(next.deck_remaining(), 1);
    }

    #[test]
    fn call_end_game_is_terminal_at_once() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Ace)]),
            AgentBelief::known(&[card(1, Rank::Five)]),
        ];
        let state = table(hands, vec![card(10, Rank::Six)], vec![]);
        let next = apply(&state, &Move::CallEndGame);
        assert_eq!(next.terminal_reason(), Some(TerminalReason::EndCalled));
        assert_eq!(next.caller(), Some(AgentId(0)));
        assert_eq!(next.winner(), Some(AgentId(0)));
    }

    #[test]
    fn endgame_finishes_when_turn_returns_to_caller() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Ace)]),
            AgentBelief::known(&[card(1, Rank::Five)]),
        ];
        let state = table(hands, vec![card(10, Rank::Six); 4], vec![])
            .with_endgame(Some(AgentId(0)), Some(AgentId(1)));
        let state = SearchState {
            mover: AgentId(1),
            ..state
        };
        let drawn = apply(&state, &Move::Draw);
        assert!(!drawn.is_terminal());
        let next = apply(&drawn, &Move::DiscardDrawn);
        assert_eq!(next.terminal_reason(), Some(TerminalReason::EndgameComplete));
        assert_eq!(next.winner(), Some(AgentId(0)));
    }

    #[test]
    fn cascade_window_removes_chosen_positions() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Four), card(1, Rank::Two), card(2, Rank::Four)]),
            AgentBelief::known(&[card(3, Rank::Five)]),
        ];
        let state = table(hands, vec![card(10, Rank::Six); 4], vec![card(4, Rank::Four)])
            .with_cascade_window(vec![Rank::Four]);
        let next = apply(
            &state,
            &Move::CascadeIn {
                positions: vec![0, 2],
            },
        );
        assert_eq!(next.agents()[0].card_count(), 1);
        assert_eq!(next.phase(), Phase::TurnStart);
        assert_eq!(next.mover(), AgentId(0));
    }

    #[test]
    fn malformed_swap_degrades_to_turn_advance() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two)]),
            AgentBelief::known(&[card(1, Rank::Five)]),
        ];
        let state = table(hands, vec![card(10, Rank::Six); 4], vec![]);
        let next = apply(&state, &Move::SwapIntoHand { position: 9 });
        assert_eq!(next.mover(), AgentId(1));
        assert_eq!(next.agents()[0].card_count(), 1);
    }

    #[test]
    fn refused_move_still_cascades_a_drawn_card() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two)]),
            AgentBelief::known(&[card(24, Rank::Seven), card(16, Rank::Five)]),
        ];
        let state = table(hands, vec![card(10, Rank::Six); 4], vec![]);
        let state = pending(state, card(25, Rank::Seven), CardSource::Deck);
        let next = apply(&state, &Move::Pass);
        assert_eq!(next.mover(), AgentId(1));
        assert_eq!(next.agents()[1].card_count(), 1);
        assert_eq!(next.agents()[1].slots[0].card, Some(card(16, Rank::Five)));
        assert_eq!(next.discard_top().map(|c| c.id), Some(24));
        assert!(next.pending().is_none());
    }

    #[test]
    fn exhausted_deck_ends_the_round() {
        let hands = vec![
            AgentBelief::known(&[card(0, Rank::Two), card(2, Rank::Three)]),
            AgentBelief::known(&[card(1, Rank::Five), card(3, Rank::Seven)]),
        ];
        let state = table(hands, vec![card(10, Rank::Six)], vec![]);
        let drawn = apply(&state, &Move::Draw);
        let next = apply(&drawn, &Move::DiscardDrawn);
        assert_eq!(next.terminal_reason(), Some(TerminalReason::DeckExhausted));
        assert_eq!(next.winner(), Some(AgentId(0)));
    }

    #[test]
    fn open_endgame_runs_until_the_caller_is_back() {
        let hands = vec![
            AgentBelief::known(&[Card::new(0, Rank::Ace)]),
            AgentBelief::known(&[Card::new(36, Rank::Ten)]),
        ];
        let state = SearchState::new(Arc::new(BeliefStore::new(AgentId(0), 2)), hands, AgentId(0))
            .with_discard(vec![Card::new(20, Rank::Six)])
            .with_deck_order(vec![Card::new(24, Rank::Seven), Card::new(28, Rank::Eight)]);
        let called = super::open_endgame(&state);
        assert!(!called.is_terminal());
        assert_eq!(called.caller(), Some(AgentId(0)));
        assert_eq!(called.mover(), AgentId(1));

        let drawn = apply(&called, &Move::Draw);
        let done = apply(&drawn, &Move::DiscardDrawn);
        assert_eq!(done.terminal_reason(), Some(TerminalReason::EndgameComplete));
        assert_eq!(done.winner(), Some(AgentId(0)));
    }
}
