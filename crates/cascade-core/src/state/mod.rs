//! Search-side game state.
//!
//! - `SearchState`: compact, cloneable snapshot of one decision point.
//! - `movegen`: legal move enumeration per phase.
//! - `transition`: pure `apply(state, move) -> state`.

pub mod movegen;
pub mod transition;

use crate::belief::{BeliefStore, RankPool, TRUST_THRESHOLD};
use crate::model::agent::AgentId;
use crate::model::card::Card;
use crate::model::moves::Target;
use crate::model::rank::Rank;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Upper bound on cascades chained from a single move.
pub const MAX_CASCADE_DEPTH: usize = 4;

/// Turns simulated before a playout is cut off.
pub const DEFAULT_TURN_CEILING: u32 = 120;

/// One hand position as seen from the deciding perspective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub card: Option<Card>,
    pub confidence: f32,
}

impl Slot {
    pub const fn unknown() -> Self {
        Self {
            card: None,
            confidence: 0.0,
        }
    }

    pub const fn known(card: Card) -> Self {
        Self {
            card: Some(card),
            confidence: 1.0,
        }
    }

    /// Concrete but unobserved card, as filled in by determinization.
    pub const fn hidden(card: Card) -> Self {
        Self {
            card: Some(card),
            confidence: 0.0,
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.card.is_some() && self.confidence >= TRUST_THRESHOLD
    }

    pub fn trusted_card(&self) -> Option<Card> {
        if self.is_trusted() { self.card } else { None }
    }

    pub fn reveal(&mut self) {
        if self.card.is_some() {
            self.confidence = 1.0;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentBelief {
    pub slots: Vec<Slot>,
}

impl AgentBelief {
    pub fn new(slots: Vec<Slot>) -> Self {
        Self { slots }
    }

    pub fn unknown(count: usize) -> Self {
        Self {
            slots: vec![Slot::unknown(); count],
        }
    }

    pub fn known(cards: &[Card]) -> Self {
        Self {
            slots: cards.iter().copied().map(Slot::known).collect(),
        }
    }

    pub fn card_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, position: usize) -> Option<&Slot> {
        self.slots.get(position)
    }

    pub fn trusted_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_trusted()).count()
    }

    pub fn trusted_positions(&self, rank: Rank) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.trusted_card().is_some_and(|c| c.rank == rank))
            .map(|(pos, _)| pos)
            .collect()
    }

    pub fn trusted_cards(&self) -> impl Iterator<Item = Card> + '_ {
        self.slots.iter().filter_map(Slot::trusted_card)
    }

    pub fn known_fraction(&self) -> f32 {
        if self.slots.is_empty() {
            return 1.0;
        }
        self.trusted_count() as f32 / self.slots.len() as f32
    }

    /// Trusted values plus `expected_unknown` for every untrusted position.
    pub fn estimated_score(&self, expected_unknown: f32) -> f32 {
        self.slots
            .iter()
            .map(|slot| match slot.trusted_card() {
                Some(card) => card.value() as f32,
                None => expected_unknown,
            })
            .sum()
    }

    /// Exact score when every position holds a concrete card.
    pub fn concrete_score(&self) -> Option<i32> {
        self.slots
            .iter()
            .map(|slot| slot.card.map(Card::value))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSource {
    Deck,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingCard {
    pub card: Option<Card>,
    pub source: CardSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TurnStart,
    PostDraw,
    CascadeWindow,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    EndCalled,
    EmptyHand,
    DeckExhausted,
    TurnCeiling,
    EndgameComplete,
}

#[derive(Debug, Clone)]
pub struct SearchState {
    pub(crate) agents: Vec<AgentBelief>,
    pub(crate) mover: AgentId,
    pub(crate) discard_top: Option<Card>,
    pub(crate) declared_top: Option<Rank>,
    pub(crate) discard_history: Vec<Card>,
    pub(crate) deck_remaining: usize,
    pub(crate) deck_order: Vec<Card>,
    pub(crate) beliefs: Arc<BeliefStore>,
    pub(crate) pending: Option<PendingCard>,
    pub(crate) cascade_phase: bool,
    pub(crate) active_ranks: Vec<Rank>,
    pub(crate) turn: u32,
    pub(crate) turn_ceiling: u32,
    pub(crate) min_call_turn: u32,
    pub(crate) terminal: Option<TerminalReason>,
    pub(crate) winner: Option<AgentId>,
    pub(crate) caller: Option<AgentId>,
    pub(crate) coalition_leader: Option<AgentId>,
    pub(crate) end_called: bool,
    pub(crate) last_cascade_depth: usize,
}

impl SearchState {
    pub fn new(beliefs: Arc<BeliefStore>, agents: Vec<AgentBelief>, mover: AgentId) -> Self {
        Self {
            agents,
            mover,
            discard_top: None,
            declared_top: None,
            discard_history: Vec::new(),
            deck_remaining: 0,
            deck_order: Vec::new(),
            beliefs,
            pending: None,
            cascade_phase: false,
            active_ranks: Vec::new(),
            turn: 0,
            turn_ceiling: DEFAULT_TURN_CEILING,
            min_call_turn: 0,
            terminal: None,
            winner: None,
            caller: None,
            coalition_leader: None,
            end_called: false,
            last_cascade_depth: 0,
        }
    }

    /// Builds per-agent slots from everything the store remembers.
    pub fn from_beliefs(beliefs: Arc<BeliefStore>, mover: AgentId) -> Self {
        let agents = AgentId::all(beliefs.table_size())
            .map(|agent| {
                let Some(knowledge) = beliefs.agent(agent) else {
                    return AgentBelief::default();
                };
                let mut belief = AgentBelief::unknown(knowledge.card_count());
                for (pos, known) in knowledge.iter_known() {
                    if let Some(slot) = belief.slots.get_mut(pos) {
                        *slot = Slot {
                            card: Some(known.card),
                            confidence: known.confidence,
                        };
                    }
                }
                belief
            })
            .collect();
        Self::new(beliefs, agents, mover)
    }

    pub fn with_discard(mut self, history: Vec<Card>) -> Self {
        self.discard_top = history.last().copied();
        self.discard_history = history;
        self.declared_top = None;
        self
    }

    pub fn with_declared_top(mut self, rank: Option<Rank>) -> Self {
        self.declared_top = rank;
        self
    }

    pub fn with_deck_remaining(mut self, remaining: usize) -> Self {
        self.deck_remaining = remaining;
        self
    }

    pub fn with_deck_order(mut self, order: Vec<Card>) -> Self {
        self.deck_remaining = order.len();
        self.deck_order = order;
        self
    }

    pub fn with_pending(mut self, pending: Option<PendingCard>) -> Self {
        self.pending = pending;
        self
    }

    pub fn with_cascade_window(mut self, ranks: Vec<Rank>) -> Self {
        self.cascade_phase = !ranks.is_empty();
        self.active_ranks = ranks;
        self
    }

    pub fn with_turn(mut self, turn: u32) -> Self {
        self.turn = turn;
        self
    }

    pub fn with_turn_ceiling(mut self, ceiling: u32) -> Self {
        self.turn_ceiling = ceiling;
        self
    }

    pub fn with_min_call_turn(mut self, turn: u32) -> Self {
        self.min_call_turn = turn;
        self
    }

    pub fn with_endgame(mut self, caller: Option<AgentId>, leader: Option<AgentId>) -> Self {
        self.caller = caller;
        self.coalition_leader = leader;
        self
    }

    pub fn phase(&self) -> Phase {
        if self.terminal.is_some() {
            Phase::Finished
        } else if self.cascade_phase {
            Phase::CascadeWindow
        } else if self.pending.is_some() {
            Phase::PostDraw
        } else {
            Phase::TurnStart
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    pub fn terminal_reason(&self) -> Option<TerminalReason> {
        self.terminal
    }

    pub fn winner(&self) -> Option<AgentId> {
        self.winner
    }

    pub fn mover(&self) -> AgentId {
        self.mover
    }

    pub fn table_size(&self) -> usize {
        self.agents.len()
    }

    pub fn agents(&self) -> &[AgentBelief] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [AgentBelief] {
        &mut self.agents
    }

    pub fn agent(&self, agent: AgentId) -> Option<&AgentBelief> {
        self.agents.get(agent.index())
    }

    pub fn slot(&self, target: Target) -> Option<&Slot> {
        self.agent(target.agent)
            .and_then(|belief| belief.slot(target.position))
    }

    pub fn card_count(&self, agent: AgentId) -> usize {
        self.agent(agent).map_or(0, AgentBelief::card_count)
    }

    pub fn discard_top(&self) -> Option<Card> {
        self.discard_top
    }

    /// Rank that cascades: the declared rank over a wildcard, else the top card's rank.
    pub fn top_rank(&self) -> Option<Rank> {
        self.declared_top.or(self.discard_top.map(|c| c.rank))
    }

    pub fn declared_top(&self) -> Option<Rank> {
        self.declared_top
    }

    pub fn discard_history(&self) -> &[Card] {
        &self.discard_history
    }

    pub fn deck_remaining(&self) -> usize {
        self.deck_remaining
    }

    pub fn deck_order(&self) -> &[Card] {
        &self.deck_order
    }

    pub fn set_deck_order(&mut self, order: Vec<Card>) {
        self.deck_order = order;
    }

    pub fn beliefs(&self) -> &Arc<BeliefStore> {
        &self.beliefs
    }

    pub fn pending(&self) -> Option<PendingCard> {
        self.pending
    }

    pub fn pending_mut(&mut self) -> Option<&mut PendingCard> {
        self.pending.as_mut()
    }

    pub fn active_ranks(&self) -> &[Rank] {
        &self.active_ranks
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn min_call_turn(&self) -> u32 {
        self.min_call_turn
    }

    pub fn caller(&self) -> Option<AgentId> {
        self.caller
    }

    pub fn coalition_leader(&self) -> Option<AgentId> {
        self.coalition_leader
    }

    /// Deepest cascade chain produced by the move that created this state.
    pub fn last_cascade_depth(&self) -> usize {
        self.last_cascade_depth
    }

    pub fn is_coalition_member(&self, agent: AgentId) -> bool {
        matches!(self.caller, Some(caller) if caller != agent)
    }

    /// Whether two agents win or lose together.
    pub fn same_side(&self, a: AgentId, b: AgentId) -> bool {
        match self.caller {
            None => a == b,
            Some(caller) => (a == caller) == (b == caller),
        }
    }

    /// Cards whose location is unknown: composition minus discards minus trusted
    /// hand cards minus a known pending card.
    pub fn unseen_pool(&self) -> RankPool {
        let mut pool = self.beliefs.composition();
        for card in &self.discard_history {
            pool.remove_card(*card);
        }
        for belief in &self.agents {
            for card in belief.trusted_cards() {
                pool.remove_card(card);
            }
        }
        if let Some(card) = self.pending.and_then(|p| p.card) {
            pool.remove_card(card);
        }
        pool
    }

    pub fn expected_unknown_value(&self) -> f32 {
        self.unseen_pool().expected_value()
    }

    /// Concrete score when fully determinized, estimate otherwise.
    pub fn score_of(&self, agent: AgentId) -> f32 {
        let Some(belief) = self.agent(agent) else {
            return 0.0;
        };
        match belief.concrete_score() {
            Some(score) => score as f32,
            None => belief.estimated_score(self.expected_unknown_value()),
        }
    }

    /// Orders two agents by standing: holding no cards first, then lower
    /// score, fewer cards, lower id.
    pub fn standing_cmp(&self, a: AgentId, b: AgentId) -> Ordering {
        let cards_a = self.card_count(a);
        let cards_b = self.card_count(b);
        (cards_a > 0)
            .cmp(&(cards_b > 0))
            .then(self.score_of(a).total_cmp(&self.score_of(b)))
            .then(cards_a.cmp(&cards_b))
            .then(a.cmp(&b))
    }

    pub fn ranking(&self) -> Vec<AgentId> {
        let mut seats: Vec<AgentId> = AgentId::all(self.table_size()).collect();
        seats.sort_by(|a, b| self.standing_cmp(*a, *b));
        seats
    }

    /// Winner under the current hands. A caller only wins when strictly
    /// ahead of every coalition member; otherwise the best member wins.
    pub fn resolve_winner(&self) -> Option<AgentId> {
        let ranking = self.ranking();
        let Some(caller) = self.caller else {
            return ranking.first().copied();
        };
        let best_member = ranking.iter().copied().find(|agent| *agent != caller);
        let Some(member) = best_member else {
            return Some(caller);
        };
        let caller_key = (self.card_count(caller) > 0, self.score_of(caller));
        let strictly_ahead = AgentId::all(self.table_size())
            .filter(|agent| *agent != caller)
            .all(|agent| {
                let key = (self.card_count(agent) > 0, self.score_of(agent));
                match caller_key.0.cmp(&key.0) {
                    Ordering::Less => true,
                    Ordering::Greater => false,
                    Ordering::Equal => caller_key.1 < key.1,
                }
            });
        Some(if strictly_ahead { caller } else { member })
    }

    /// Sum of card values in hands, discard pile, deck order and pending card.
    pub fn total_value(&self) -> i32 {
        let hands: i32 = self
            .agents
            .iter()
            .flat_map(|b| b.slots.iter())
            .filter_map(|s| s.card)
            .map(Card::value)
            .sum();
        let discards: i32 = self.discard_history.iter().map(|c| c.value()).sum();
        let deck: i32 = self.deck_order.iter().map(|c| c.value()).sum();
        let pending = self.pending.and_then(|p| p.card).map_or(0, Card::value);
        hands + discards + deck + pending
    }
}
