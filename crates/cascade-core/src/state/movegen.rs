use super::{AgentBelief, CardSource, Phase, SearchState};
use crate::model::action::ActionKind;
use crate::model::agent::AgentId;
use crate::model::moves::{Move, Target};
use crate::model::rank::Rank;

/// Legal moves for the current mover. Never empty: falls back to `[Move::Pass]`.
pub fn legal_moves(state: &SearchState) -> Vec<Move> {
    let moves = match state.phase() {
        Phase::Finished => Vec::new(),
        Phase::TurnStart => turn_start_moves(state),
        Phase::PostDraw => post_draw_moves(state),
        Phase::CascadeWindow => cascade_window_moves(state),
    };
    if moves.is_empty() {
        vec![Move::Pass]
    } else {
        moves
    }
}

/// Every way of playing `kind` from the current position.
pub fn action_moves(state: &SearchState, kind: ActionKind) -> Vec<Move> {
    let mover = state.mover;
    let opponents: Vec<AgentId> = AgentId::all(state.table_size())
        .filter(|agent| *agent != mover && may_target(state, mover, *agent))
        .collect();
    let own = representative_positions(state.agent(mover));
    let mut moves = Vec::new();
    match kind {
        ActionKind::Exchange => {
            let pool: Vec<Target> = AgentId::all(state.table_size())
                .filter(|agent| may_target(state, mover, *agent))
                .flat_map(|agent| {
                    representative_positions(state.agent(agent))
                        .into_iter()
                        .map(move |pos| Target::new(agent, pos))
                })
                .collect();
            for (i, a) in pool.iter().enumerate() {
                for b in &pool[i + 1..] {
                    if a.agent != b.agent {
                        moves.push(use_action(vec![*a, *b], false, None));
                    }
                }
            }
        }
        ActionKind::Scout => {
            for agent in &opponents {
                for pos in representative_positions(state.agent(*agent)) {
                    let peeked = Target::new(*agent, pos);
                    moves.push(use_action(vec![peeked], false, None));
                    for own_pos in &own {
                        moves.push(use_action(
                            vec![peeked, Target::new(mover, *own_pos)],
                            true,
                            None,
                        ));
                    }
                }
            }
            if let Some(pos) = first_untrusted(state.agent(mover)) {
                moves.push(use_action(vec![Target::new(mover, pos)], false, None));
            }
        }
        ActionKind::Observe => {
            for target in hidden_targets(state, &opponents) {
                moves.push(use_action(vec![target], false, None));
            }
        }
        ActionKind::Attack => {
            if !state.is_coalition_member(mover) {
                for agent in &opponents {
                    moves.push(use_action(vec![Target::new(*agent, 0)], false, None));
                }
            }
        }
        ActionKind::Declare => {
            let canonical = Target::new(mover, 0);
            for rank in Rank::ORDERED {
                match rank.action() {
                    Some(ActionKind::Scout | ActionKind::Observe) => {
                        for target in hidden_targets(state, &opponents) {
                            moves.push(use_action(vec![target], false, Some(rank)));
                        }
                    }
                    Some(ActionKind::Attack) => {
                        if !state.is_coalition_member(mover) {
                            for agent in &opponents {
                                moves.push(use_action(
                                    vec![Target::new(*agent, 0)],
                                    false,
                                    Some(rank),
                                ));
                            }
                        }
                    }
                    Some(ActionKind::Exchange | ActionKind::Declare) | None => {
                        moves.push(use_action(vec![canonical], false, Some(rank)));
                    }
                }
            }
        }
    }
    moves
}

/// Structural legality: phase, ranges, pending card and coalition constraints.
pub fn is_legal(state: &SearchState, mv: &Move) -> bool {
    let mover = state.mover;
    match (state.phase(), mv) {
        (Phase::TurnStart, Move::Draw) => state.deck_remaining > 0,
        (Phase::TurnStart, Move::TakeDiscard) => state.discard_top.is_some(),
        (Phase::TurnStart, Move::CallEndGame) => may_call(state),
        (Phase::TurnStart, Move::Pass) => {
            state.deck_remaining == 0 && state.discard_top.is_none()
        }
        (Phase::PostDraw, Move::UseAction {
            targets,
            swap,
            declared,
        }) => valid_action(state, targets, *swap, *declared),
        (Phase::PostDraw, Move::SwapIntoHand { position }) => {
            *position < state.card_count(mover)
        }
        (Phase::PostDraw, Move::DiscardDrawn) => {
            matches!(state.pending, Some(p) if p.source == CardSource::Deck)
        }
        (Phase::CascadeWindow, Move::CascadeIn { positions }) => {
            let Some(belief) = state.agent(mover) else {
                return false;
            };
            let mut seen = positions.clone();
            seen.sort_unstable();
            seen.dedup();
            !positions.is_empty()
                && seen.len() == positions.len()
                && positions.iter().all(|pos| {
                    belief
                        .slot(*pos)
                        .and_then(|slot| slot.trusted_card())
                        .is_some_and(|card| state.active_ranks.contains(&card.rank))
                })
        }
        (Phase::CascadeWindow, Move::Pass) => true,
        _ => false,
    }
}

/// One position per distinct trusted rank plus one for the interchangeable
/// unknown positions.
pub fn representative_positions(belief: Option<&AgentBelief>) -> Vec<usize> {
    let Some(belief) = belief else {
        return Vec::new();
    };
    let mut seen_ranks: Vec<Rank> = Vec::new();
    let mut unknown_taken = false;
    let mut positions = Vec::new();
    for (pos, slot) in belief.slots.iter().enumerate() {
        match slot.trusted_card() {
            Some(card) => {
                if !seen_ranks.contains(&card.rank) {
                    seen_ranks.push(card.rank);
                    positions.push(pos);
                }
            }
            None => {
                if !unknown_taken {
                    unknown_taken = true;
                    positions.push(pos);
                }
            }
        }
    }
    positions
}

fn turn_start_moves(state: &SearchState) -> Vec<Move> {
    let mut moves = Vec::with_capacity(3);
    if state.deck_remaining > 0 {
        moves.push(Move::Draw);
    }
    if state.discard_top.is_some() {
        moves.push(Move::TakeDiscard);
    }
    if may_call(state) {
        moves.push(Move::CallEndGame);
    }
    moves
}

fn post_draw_moves(state: &SearchState) -> Vec<Move> {
    let Some(pending) = state.pending else {
        return Vec::new();
    };
    let mut moves = Vec::new();
    if let Some(kind) = pending.card.and_then(|c| c.action()) {
        moves.extend(action_moves(state, kind));
    }
    for position in representative_positions(state.agent(state.mover)) {
        moves.push(Move::SwapIntoHand { position });
    }
    if pending.source == CardSource::Deck {
        moves.push(Move::DiscardDrawn);
    }
    moves
}

fn cascade_window_moves(state: &SearchState) -> Vec<Move> {
    let mut moves = Vec::new();
    if let Some(belief) = state.agent(state.mover) {
        let mut union = Vec::new();
        for rank in &state.active_ranks {
            let positions = belief.trusted_positions(*rank);
            if positions.is_empty() {
                continue;
            }
            union.extend(positions.iter().copied());
            moves.push(Move::CascadeIn { positions });
        }
        if moves.len() > 1 {
            union.sort_unstable();
            moves.push(Move::CascadeIn { positions: union });
        }
    }
    moves.push(Move::Pass);
    moves
}

fn may_call(state: &SearchState) -> bool {
    state.caller.is_none() && state.turn >= state.min_call_turn
}

/// Coalition members never touch the caller's cards.
fn may_target(state: &SearchState, mover: AgentId, target: AgentId) -> bool {
    !(state.is_coalition_member(mover) && state.caller == Some(target))
}

fn first_untrusted(belief: Option<&AgentBelief>) -> Option<usize> {
    belief?.slots.iter().position(|slot| !slot.is_trusted())
}

fn hidden_targets(state: &SearchState, agents: &[AgentId]) -> Vec<Target> {
    agents
        .iter()
        .filter_map(|agent| first_untrusted(state.agent(*agent)).map(|pos| Target::new(*agent, pos)))
        .collect()
}

fn use_action(targets: Vec<Target>, swap: bool, declared: Option<Rank>) -> Move {
    Move::UseAction {
        targets,
        swap,
        declared,
    }
}

fn in_range(state: &SearchState, target: &Target) -> bool {
    target.position < state.card_count(target.agent)
}

fn valid_action(
    state: &SearchState,
    targets: &[Target],
    swap: bool,
    declared: Option<Rank>,
) -> bool {
    let Some(kind) = state.pending.and_then(|p| p.card).and_then(|c| c.action()) else {
        return false;
    };
    let mover = state.mover;
    let coalition = state.is_coalition_member(mover);
    if targets.iter().any(|t| {
        t.agent.index() >= state.table_size() || !may_target(state, mover, t.agent)
    }) {
        return false;
    }
    match kind {
        ActionKind::Exchange => {
            targets.len() == 2
                && targets[0] != targets[1]
                && targets.iter().all(|t| in_range(state, t))
        }
        ActionKind::Scout => match (targets, swap) {
            ([peeked], false) => in_range(state, peeked),
            ([peeked, own], true) => {
                in_range(state, peeked)
                    && in_range(state, own)
                    && own.agent == mover
                    && peeked.agent != mover
            }
            _ => false,
        },
        ActionKind::Observe => {
            matches!(targets, [t] if t.agent != mover && in_range(state, t))
        }
        ActionKind::Attack => !coalition && matches!(targets, [t] if t.agent != mover),
        ActionKind::Declare => {
            let Some(rank) = declared else {
                return false;
            };
            let [target] = targets else {
                return false;
            };
            match rank.action() {
                Some(ActionKind::Attack) => !coalition && target.agent != mover,
                Some(ActionKind::Scout | ActionKind::Observe) => in_range(state, target),
                Some(ActionKind::Exchange | ActionKind::Declare) | None => true,
            }
        }
    }
}
