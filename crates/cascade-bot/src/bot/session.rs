use super::Difficulty;
use super::context::DecisionContext;
use super::params::SearchConfig;
use super::plan::{TargetPlan, TargetStep};
use crate::coalition::{CoalitionInput, CoalitionPlan, CoalitionPlanner, PlanStep, StepKind};
use crate::search::{MctsEngine, SearchOutcome, SearchStats};
use cascade_core::belief::{BeliefStore, DEFAULT_RANK};
use cascade_core::model::action::ActionKind;
use cascade_core::model::agent::AgentId;
use cascade_core::model::card::Card;
use cascade_core::model::moves::{Move, Target};
use cascade_core::model::rank::Rank;
use cascade_core::state::movegen::is_legal;
use cascade_core::state::{CardSource, PendingCard, SearchState};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnDecision {
    pub source: CardSource,
    /// Targets fixed up front; empty unless the card is already known.
    pub plan: TargetPlan,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionTargets {
    pub targets: Vec<Target>,
    pub swap: bool,
    pub declared: Option<Rank>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapChoice {
    Position(usize),
    Discard,
}

#[derive(Debug, Clone)]
struct CoalitionCache {
    caller: AgentId,
    champion: AgentId,
    plan: CoalitionPlan,
    planned_turn: u32,
    hands: BTreeMap<AgentId, Vec<Card>>,
    top: Option<Card>,
}

impl CoalitionCache {
    /// A plan stands until the table differs from the one it was made for and
    /// `agent`'s own step can no longer be played as planned.
    fn still_holds(&self, agent: AgentId, input: &CoalitionInput) -> bool {
        let same_top = match (self.top, input.discard_top) {
            (Some(a), Some(b)) => a.same_card(b),
            (None, None) => true,
            _ => false,
        };
        if same_top && self.hands == input.hands {
            return true;
        }
        self.plan
            .step_for(agent)
            .is_some_and(|step| step.playable_on(&input.hands, input.discard_top))
    }
}

/// One agent's decision state for one round.
///
/// Every protocol call first folds the context into the belief store, then
/// answers from the committed coalition step, the pending target plan, or a
/// fresh search, in that order.
#[derive(Debug, Clone)]
pub struct AgentSession {
    agent: AgentId,
    difficulty: Difficulty,
    config: SearchConfig,
    engine: MctsEngine,
    planner: CoalitionPlanner,
    beliefs: BeliefStore,
    rng: SmallRng,
    target_plan: TargetPlan,
    last_targets: Vec<Target>,
    coalition: Option<CoalitionCache>,
    committed: Option<PlanStep>,
    last_stats: Option<SearchStats>,
}

impl AgentSession {
    pub fn new(agent: AgentId, table_size: usize, difficulty: Difficulty, seed: u64) -> Self {
        Self::with_config(agent, table_size, difficulty, SearchConfig::from_env(difficulty), seed)
    }

    pub fn with_config(
        agent: AgentId,
        table_size: usize,
        difficulty: Difficulty,
        config: SearchConfig,
        seed: u64,
    ) -> Self {
        Self {
            agent,
            difficulty,
            config,
            engine: MctsEngine::new(config),
            planner: CoalitionPlanner::default(),
            beliefs: BeliefStore::new(agent, table_size),
            rng: SmallRng::seed_from_u64(seed),
            target_plan: TargetPlan::default(),
            last_targets: Vec::new(),
            coalition: None,
            committed: None,
            last_stats: None,
        }
    }

    pub fn agent(&self) -> AgentId {
        self.agent
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    pub fn target_plan(&self) -> &TargetPlan {
        &self.target_plan
    }

    pub fn last_stats(&self) -> Option<&SearchStats> {
        self.last_stats.as_ref()
    }

    pub fn coalition_plan(&self) -> Option<&CoalitionPlan> {
        self.coalition.as_ref().map(|cache| &cache.plan)
    }

    pub fn decide_turn_action(&mut self, ctx: &DecisionContext<'_>) -> TurnDecision {
        self.absorb(ctx);
        self.target_plan.clear();
        self.last_targets.clear();
        self.committed = None;

        if let Some(step) = self.coalition_step(ctx) {
            let on_top = step
                .source
                .zip(ctx.snapshot.discard_top)
                .is_some_and(|(source, top)| source.same_card(top));
            if step.kind != StepKind::Hold && on_top {
                if matches!(step.kind, StepKind::Exchange | StepKind::Declare) {
                    self.target_plan = TargetPlan::from_action(&step.targets, false, step.declared);
                }
                self.log_decision("turn", "coalition", &step.rationale);
                self.committed = Some(step);
                return TurnDecision {
                    source: CardSource::Discard,
                    plan: self.target_plan.clone(),
                };
            }
        }

        let state = self.search_state(ctx, None);
        let outcome = self.run_search(&state, |mv| !matches!(mv, Move::CallEndGame));
        let source = match outcome.best {
            Move::TakeDiscard => CardSource::Discard,
            _ => CardSource::Deck,
        };
        // A drawn card is unknown until it arrives; only a taken card keeps
        // the searched follow-up.
        if source == CardSource::Discard {
            if let Some(Move::UseAction {
                targets,
                swap,
                declared,
            }) = &outcome.follow_up
            {
                self.target_plan = TargetPlan::from_action(targets, *swap, *declared);
            }
        }
        self.log_decision("turn", "search", outcome.best.label());
        TurnDecision {
            source,
            plan: self.target_plan.clone(),
        }
    }

    pub fn should_use_action(&mut self, card: Card, ctx: &DecisionContext<'_>) -> bool {
        if card.action().is_none() {
            return false;
        }
        if let Some(step) = &self.committed {
            return matches!(step.kind, StepKind::Exchange | StepKind::Declare);
        }
        if !self.target_plan.is_empty() {
            return true;
        }
        self.absorb(ctx);
        let state = self.search_state(ctx, Some(card));
        let outcome = self.run_search(&state, |_| true);
        match outcome.best {
            Move::UseAction {
                targets,
                swap,
                declared,
            } => {
                self.target_plan = TargetPlan::from_action(&targets, swap, declared);
                true
            }
            _ => false,
        }
    }

    pub fn select_action_targets(&mut self, ctx: &DecisionContext<'_>) -> ActionTargets {
        self.absorb(ctx);
        let pending = ctx.snapshot.pending.and_then(|p| p.card);
        let state = self.search_state(ctx, pending);

        if !self.target_plan.is_empty() {
            let planned = self.planned_targets();
            let mv = Move::UseAction {
                targets: planned.targets.clone(),
                swap: planned.swap,
                declared: planned.declared,
            };
            if is_legal(&state, &mv) {
                self.last_targets = planned.targets.clone();
                return planned;
            }
            event!(
                target: "cascade_bot::session",
                Level::DEBUG,
                agent = %self.agent,
                planned = %mv,
                reason = "stale_target_plan",
            );
            self.target_plan.clear();
        }

        let outcome = self.run_search(&state, |mv| matches!(mv, Move::UseAction { .. }));
        match outcome.best {
            Move::UseAction {
                targets,
                swap,
                declared,
            } => {
                self.target_plan = TargetPlan::from_action(&targets, swap, declared);
                self.planned_targets()
            }
            _ => ActionTargets::default(),
        }
    }

    /// Swaps only when the peeked card beats what sits at the own target.
    pub fn should_swap_after_peek(&mut self, peeked: Card, ctx: &DecisionContext<'_>) -> bool {
        self.absorb(ctx);
        let planned = self.target_plan.take_swap().unwrap_or(false);
        let own = self
            .last_targets
            .iter()
            .find(|t| t.agent == self.agent)
            .copied();
        let swap = own.is_some_and(|target| (peeked.value() as f32) < self.value_at(target));
        if swap != planned {
            event!(
                target: "cascade_bot::session",
                Level::DEBUG,
                agent = %self.agent,
                peeked = %peeked,
                planned,
                swap,
            );
        }
        swap
    }

    pub fn select_declaration(&mut self, ctx: &DecisionContext<'_>) -> Rank {
        if let Some(rank) = self.target_plan.take_declaration() {
            return rank;
        }
        self.absorb(ctx);
        let pending = ctx.snapshot.pending.and_then(|p| p.card);
        if pending.is_some_and(|c| c.action() == Some(ActionKind::Declare)) {
            let state = self.search_state(ctx, pending);
            let outcome = self.run_search(&state, |mv| {
                matches!(mv, Move::UseAction { declared: Some(_), .. })
            });
            if let Move::UseAction {
                declared: Some(rank),
                ..
            } = outcome.best
            {
                return rank;
            }
        }
        self.most_held_rank(ctx.in_coalition()).unwrap_or(DEFAULT_RANK)
    }

    /// Joins when shedding the matching cards does not raise the score, or
    /// when it empties the hand.
    pub fn should_participate_in_cascade(
        &mut self,
        ranks: &[Rank],
        ctx: &DecisionContext<'_>,
    ) -> bool {
        self.absorb(ctx);
        let Some(own) = self.beliefs.agent(self.agent) else {
            return false;
        };
        let matching: Vec<Card> = own
            .iter_known()
            .filter(|(_, known)| known.is_trusted() && ranks.contains(&known.card.rank))
            .map(|(_, known)| known.card)
            .collect();
        if matching.is_empty() {
            return false;
        }
        let empties = matching.len() >= ctx.own_card_count();
        empties || matching.iter().map(|c| c.value()).sum::<i32>() >= 0
    }

    pub fn select_best_swap_position(&mut self, card: Card, ctx: &DecisionContext<'_>) -> SwapChoice {
        if let Some(step) = &self.committed {
            if step.kind == StepKind::TakeAndSwap {
                if let Some(target) = step.targets.first() {
                    return SwapChoice::Position(target.position);
                }
            }
        }
        self.absorb(ctx);
        let state = self.search_state(ctx, Some(card));
        let outcome = self.run_search(&state, |mv| {
            matches!(mv, Move::SwapIntoHand { .. } | Move::DiscardDrawn)
        });
        match outcome.best {
            Move::SwapIntoHand { position } => SwapChoice::Position(position),
            Move::DiscardDrawn => SwapChoice::Discard,
            _ => self.fallback_swap(card, &state),
        }
    }

    /// Calls only past the minimum turn, when search favours it and the hand
    /// still wins with own unknowns at the pool's worst and every opponent's
    /// unknowns at its best.
    pub fn should_call_end_game(&mut self, ctx: &DecisionContext<'_>) -> bool {
        self.absorb(ctx);
        let snapshot = ctx.snapshot;
        if snapshot.caller.is_some() {
            return false;
        }
        if snapshot.turn < self.config.min_call_turn {
            event!(
                target: "cascade_bot::session",
                Level::DEBUG,
                agent = %self.agent,
                turn = snapshot.turn,
                min_call_turn = self.config.min_call_turn,
                reason = "min_turn_guard",
            );
            return false;
        }
        let state = self.search_state(ctx, None);
        if !self.worst_case_allows_call(&state) {
            return false;
        }
        let outcome = self.run_search(&state, |_| true);
        let call = outcome.best == Move::CallEndGame;
        self.log_decision("call", if call { "call" } else { "continue" }, outcome.best.label());
        call
    }

    pub fn observe_card(&mut self, card: Card, agent: AgentId, position: usize) {
        self.beliefs.observe(card, agent, position);
    }

    pub fn observe_discard(&mut self, card: Card) {
        self.beliefs.observe_discard(card);
    }

    pub fn observe_swap(&mut self, a: Target, b: Target) {
        self.beliefs.swap(a, b);
    }

    pub fn observe_removed(&mut self, agent: AgentId, position: usize) {
        self.beliefs.remove_position(agent, position);
    }

    pub fn observe_card_count(&mut self, agent: AgentId, count: usize) {
        self.beliefs.set_card_count(agent, count);
    }

    /// Fades remembered cards once per completed turn.
    pub fn observe_turn_end(&mut self) {
        if self.config.memory_decay >= 1.0 {
            return;
        }
        let forgotten = self.beliefs.decay(self.config.memory_decay);
        if forgotten > 0 {
            event!(
                target: "cascade_bot::session",
                Level::TRACE,
                agent = %self.agent,
                forgotten,
            );
        }
    }

    pub fn end_round(&mut self) {
        let table_size = self.beliefs.table_size();
        self.beliefs.reset_round(table_size);
        self.target_plan.clear();
        self.last_targets.clear();
        self.coalition = None;
        self.committed = None;
    }

    fn absorb(&mut self, ctx: &DecisionContext<'_>) {
        let snapshot = ctx.snapshot;
        if self.beliefs.table_size() != snapshot.table_size() {
            self.beliefs.reset_round(snapshot.table_size());
        }
        for agent in AgentId::all(snapshot.table_size()) {
            self.beliefs.set_card_count(agent, snapshot.card_count(agent));
        }
        self.beliefs.sync_discards(&snapshot.discard_history);
        for (target, card) in ctx.knowledge {
            let confidence = if target.agent == self.agent {
                1.0
            } else {
                self.config.knowledge_confidence
            };
            self.beliefs
                .observe_with_confidence(*card, target.agent, target.position, confidence);
        }
    }

    fn search_state(&self, ctx: &DecisionContext<'_>, pending: Option<Card>) -> SearchState {
        let snapshot = ctx.snapshot;
        let mut history = snapshot.discard_history.clone();
        if history.is_empty() {
            history.extend(snapshot.discard_top);
        }
        let pending = match pending {
            Some(card) => Some(PendingCard {
                card: Some(card),
                source: snapshot.pending.map_or(CardSource::Deck, |p| p.source),
            }),
            None => snapshot.pending,
        };
        SearchState::from_beliefs(Arc::new(self.beliefs.clone()), self.agent)
            .with_discard(history)
            .with_declared_top(snapshot.declared_top)
            .with_deck_remaining(snapshot.deck_remaining)
            .with_pending(pending)
            .with_cascade_window(snapshot.cascade_ranks.clone())
            .with_turn(snapshot.turn)
            .with_turn_ceiling(snapshot.turn.saturating_add(self.config.turn_ceiling))
            .with_min_call_turn(self.config.min_call_turn)
            .with_endgame(snapshot.caller, snapshot.coalition_leader)
    }

    fn run_search<F>(&mut self, state: &SearchState, filter: F) -> SearchOutcome
    where
        F: Fn(&Move) -> bool,
    {
        let outcome = self
            .engine
            .search_filtered(state, self.agent, &mut self.rng, filter);
        self.last_stats = Some(outcome.stats.clone());
        outcome
    }

    fn planned_targets(&mut self) -> ActionTargets {
        let targets = self.target_plan.take_targets();
        let swap = self
            .target_plan
            .iter()
            .any(|step| matches!(step, TargetStep::Swap(true)));
        let declared = self.target_plan.peek_declaration();
        self.last_targets = targets.clone();
        ActionTargets {
            targets,
            swap,
            declared,
        }
    }

    /// Looks up this agent's step in the coalition plan. The cached plan is
    /// kept until new information invalidates it; replans keep the champion.
    fn coalition_step(&mut self, ctx: &DecisionContext<'_>) -> Option<PlanStep> {
        let caller = ctx.caller()?;
        if caller == self.agent {
            return None;
        }
        let hands = ctx.coalition_hands?;
        let input = self.coalition_input(ctx, caller, hands);
        let holds = self
            .coalition
            .as_ref()
            .is_some_and(|cache| cache.caller == caller && cache.still_holds(self.agent, &input));
        if !holds {
            let locked = self
                .coalition
                .as_ref()
                .filter(|cache| cache.caller == caller)
                .map(|cache| cache.champion);
            let plan = locked
                .and_then(|champion| self.planner.plan_for_champion(&input, champion))
                .or_else(|| self.planner.plan(&input));
            let turn = ctx.snapshot.turn;
            if tracing::enabled!(target: "cascade_bot::session", Level::DEBUG) {
                event!(
                    target: "cascade_bot::session",
                    Level::DEBUG,
                    agent = %self.agent,
                    turn,
                    replan = locked.is_some(),
                    champion = ?plan.as_ref().map(|p| p.champion),
                );
            }
            self.coalition = plan.map(|plan| CoalitionCache {
                caller,
                champion: plan.champion,
                plan,
                planned_turn: turn,
                hands: input.hands,
                top: input.discard_top,
            });
        }
        self.coalition.as_ref()?.plan.step_for(self.agent).cloned()
    }

    fn coalition_input(
        &self,
        ctx: &DecisionContext<'_>,
        caller: AgentId,
        hands: &BTreeMap<AgentId, Vec<Card>>,
    ) -> CoalitionInput {
        let caller_hand = (0..ctx.snapshot.card_count(caller))
            .map(|position| {
                ctx.known_card(caller, position)
                    .or_else(|| self.beliefs.trusted(caller, position))
            })
            .collect();
        CoalitionInput {
            caller,
            turn_order: ctx.snapshot.turns_until(caller),
            hands: hands
                .iter()
                .filter(|(agent, _)| **agent != caller)
                .map(|(agent, hand)| (*agent, hand.clone()))
                .collect(),
            caller_hand,
            discard_top: ctx.snapshot.discard_top,
            expected_unknown: self.beliefs.aggregate_distribution().expected_value(),
        }
    }

    fn value_at(&self, target: Target) -> f32 {
        match self.beliefs.trusted(target.agent, target.position) {
            Some(card) => card.value() as f32,
            None => self.beliefs.aggregate_distribution().expected_value(),
        }
    }

    /// Rank with the most trusted own copies; coalition members skip attacks.
    fn most_held_rank(&self, coalition: bool) -> Option<Rank> {
        let own = self.beliefs.agent(self.agent)?;
        let mut counts: BTreeMap<Rank, i32> = BTreeMap::new();
        for (_, known) in own.iter_known().filter(|(_, k)| k.is_trusted()) {
            *counts.entry(known.card.rank).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(rank, _)| !(coalition && rank.action().is_some_and(ActionKind::is_harmful)))
            .max_by_key(|(rank, count)| (*count, *count * rank.value()))
            .map(|(rank, _)| rank)
    }

    fn fallback_swap(&self, card: Card, state: &SearchState) -> SwapChoice {
        let count = state.card_count(self.agent);
        let worst = (0..count)
            .map(|position| (position, self.value_at(Target::new(self.agent, position))))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let from_deck = state.pending().is_none_or(|p| p.source == CardSource::Deck);
        match worst {
            Some((position, value)) if (card.value() as f32) < value || !from_deck => {
                SwapChoice::Position(position)
            }
            _ => SwapChoice::Discard,
        }
    }

    fn worst_case_allows_call(&self, state: &SearchState) -> bool {
        let pool = state.unseen_pool();
        let high = pool.max_value().unwrap_or(DEFAULT_RANK.value());
        let low = pool.min_value().unwrap_or(DEFAULT_RANK.value());
        let bound = |agent: AgentId, unknown: i32| -> i32 {
            state.agent(agent).map_or(0, |belief| {
                belief
                    .slots
                    .iter()
                    .map(|slot| slot.trusted_card().map_or(unknown, |c| c.value()))
                    .sum()
            })
        };
        let own_worst = bound(self.agent, high);
        let best_opponent = AgentId::all(state.table_size())
            .filter(|agent| *agent != self.agent)
            .map(|agent| bound(agent, low))
            .min();
        let allowed = best_opponent
            .is_some_and(|best| (own_worst as f32) + self.config.call_margin < best as f32);
        if !allowed {
            event!(
                target: "cascade_bot::session",
                Level::DEBUG,
                agent = %self.agent,
                own_worst,
                best_opponent = ?best_opponent,
                reason = "worst_case_rejects_call",
            );
        }
        allowed
    }

    fn log_decision(&self, query: &'static str, route: &'static str, detail: &str) {
        if tracing::enabled!(target: "cascade_bot::session", Level::DEBUG) {
            event!(
                target: "cascade_bot::session",
                Level::DEBUG,
                agent = %self.agent,
                query,
                route,
                detail,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentSession, SwapChoice};
    use crate::bot::{
        DecisionContext, Difficulty, ObservableSnapshot, OpponentKnowledge, SearchConfig,
        TargetPlan,
    };
    use cascade_core::model::agent::AgentId;
    use cascade_core::model::card::Card;
    use cascade_core::model::moves::Target;
    use cascade_core::model::rank::Rank;
    use cascade_core::state::{CardSource, PendingCard};
    use std::collections::BTreeMap;

    const ME: AgentId = AgentId(0);

    fn session(table_size: usize, iterations: usize) -> AgentSession {
        let config = SearchConfig::for_difficulty(Difficulty::Normal)
            .with_iterations(iterations)
            .with_deterministic(true);
        AgentSession::with_config(ME, table_size, Difficulty::Normal, config, 7)
    }

    fn snapshot(card_counts: Vec<usize>, top: Card, turn: u32) -> ObservableSnapshot {
        ObservableSnapshot {
            card_counts,
            discard_top: Some(top),
            discard_history: vec![top],
            deck_remaining: 30,
            mover: ME,
            turn,
            ..ObservableSnapshot::default()
        }
    }

    fn knowledge(entries: &[(u8, usize, Card)]) -> OpponentKnowledge {
        entries
            .iter()
            .map(|(agent, position, card)| (Target::new(AgentId(*agent), *position), *card))
            .collect()
    }

    #[test]
    fn call_waits_for_the_minimum_turn() {
        let known = knowledge(&[
            (0, 0, Card::new(48, Rank::King)),
            (1, 0, Card::new(33, Rank::Nine)),
            (1, 1, Card::new(37, Rank::Ten)),
        ]);
        let early = snapshot(vec![1, 2], Card::new(17, Rank::Five), 2);
        let mut bot = session(2, 300);
        let ctx = DecisionContext::new(ME, &early, &known, Difficulty::Normal);
        assert!(!bot.should_call_end_game(&ctx));
        assert!(bot.last_stats().is_none());

        let later = snapshot(vec![1, 2], Card::new(17, Rank::Five), 5);
        let ctx = DecisionContext::new(ME, &later, &known, Difficulty::Normal);
        assert!(bot.should_call_end_game(&ctx));
    }

    #[test]
    fn worst_case_blocks_a_risky_call() {
        // Opponent's unknown card could be a wildcard.
        let known = knowledge(&[
            (0, 0, Card::new(4, Rank::Two)),
            (0, 1, Card::new(5, Rank::Two)),
            (1, 0, Card::new(8, Rank::Three)),
        ]);
        let snap = snapshot(vec![2, 2], Card::new(17, Rank::Five), 8);
        let mut bot = session(2, 100);
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal);
        assert!(!bot.should_call_end_game(&ctx));
    }

    #[test]
    fn fresh_turn_clears_a_stale_plan() {
        let known = knowledge(&[(0, 0, Card::new(20, Rank::Six))]);
        let snap = snapshot(vec![2, 2], Card::new(4, Rank::Two), 1);
        let mut bot = session(2, 60);
        bot.target_plan = TargetPlan::from_action(&[Target::new(AgentId(1), 0)], false, None);
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal);
        let decision = bot.decide_turn_action(&ctx);
        assert!(decision.plan.is_empty());
        assert!(bot.target_plan().is_empty());
        assert!(bot.last_stats().is_some_and(|s| s.iterations == 60));
    }

    #[test]
    fn planned_targets_are_replayed() {
        let known = knowledge(&[(0, 0, Card::new(20, Rank::Six))]);
        let mut snap = snapshot(vec![2, 2], Card::new(4, Rank::Two), 3);
        snap.pending = Some(PendingCard {
            card: Some(Card::new(40, Rank::Jack)),
            source: CardSource::Discard,
        });
        let planned = [Target::new(AgentId(1), 0), Target::new(ME, 1)];
        let mut bot = session(2, 60);
        bot.target_plan = TargetPlan::from_action(&planned, false, None);
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal);

        assert!(bot.should_use_action(Card::new(40, Rank::Jack), &ctx));
        let chosen = bot.select_action_targets(&ctx);
        assert_eq!(chosen.targets, planned.to_vec());
        assert!(!chosen.swap);
        assert!(bot.last_stats().is_none());
    }

    #[test]
    fn stale_targets_fall_back_to_search() {
        let known = knowledge(&[(0, 0, Card::new(20, Rank::Six))]);
        let mut snap = snapshot(vec![2, 2], Card::new(4, Rank::Two), 3);
        snap.pending = Some(PendingCard {
            card: Some(Card::new(40, Rank::Jack)),
            source: CardSource::Discard,
        });
        let stale = [Target::new(AgentId(1), 5), Target::new(ME, 1)];
        let mut bot = session(2, 60);
        bot.target_plan = TargetPlan::from_action(&stale, false, None);
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal);

        let chosen = bot.select_action_targets(&ctx);
        assert_eq!(chosen.targets.len(), 2);
        assert_ne!(chosen.targets, stale.to_vec());
        assert!(bot.last_stats().is_some());
    }

    #[test]
    fn coalition_member_follows_the_plan() {
        let wildcard = Card::new(52, Rank::Joker);
        let nine = Card::new(33, Rank::Nine);
        let king = Card::new(48, Rank::King);
        let mut hands = BTreeMap::new();
        hands.insert(ME, vec![wildcard, nine]);
        hands.insert(
            AgentId(1),
            vec![
                Card::new(44, Rank::Queen),
                Card::new(45, Rank::Queen),
                Card::new(17, Rank::Five),
            ],
        );
        let mut snap = snapshot(vec![2, 3, 3], king, 9);
        snap.caller = Some(AgentId(2));
        let known = knowledge(&[(0, 0, wildcard), (0, 1, nine)]);
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal)
            .with_coalition_hands(&hands);

        let mut bot = session(3, 60);
        let decision = bot.decide_turn_action(&ctx);
        assert_eq!(decision.source, CardSource::Discard);
        assert_eq!(bot.coalition_plan().map(|p| p.champion), Some(ME));
        assert!(!bot.should_use_action(king, &ctx));
        assert_eq!(bot.select_best_swap_position(king, &ctx), SwapChoice::Position(1));
        assert!(!bot.should_call_end_game(&ctx));
        assert!(bot.last_stats().is_none());
    }

    #[test]
    fn cascade_participation_keeps_the_wildcard() {
        let known = knowledge(&[
            (0, 0, Card::new(17, Rank::Five)),
            (0, 1, Card::new(52, Rank::Joker)),
        ]);
        let snap = snapshot(vec![2, 2], Card::new(16, Rank::Five), 4);
        let mut bot = session(2, 10);
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal);
        assert!(bot.should_participate_in_cascade(&[Rank::Five], &ctx));
        assert!(!bot.should_participate_in_cascade(&[Rank::Joker], &ctx));
        assert!(!bot.should_participate_in_cascade(&[Rank::Nine], &ctx));

        let last = knowledge(&[(0, 0, Card::new(52, Rank::Joker))]);
        let snap = snapshot(vec![1, 2], Card::new(53, Rank::Joker), 4);
        let ctx = DecisionContext::new(ME, &snap, &last, Difficulty::Normal);
        let mut bot = session(2, 10);
        assert!(bot.should_participate_in_cascade(&[Rank::Joker], &ctx));
    }

    #[test]
    fn peek_swap_compares_against_the_own_target() {
        let known = knowledge(&[(0, 0, Card::new(4, Rank::Two))]);
        let snap = snapshot(vec![2, 2], Card::new(16, Rank::Five), 4);
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal);
        let mut bot = session(2, 10);
        bot.last_targets = vec![Target::new(AgentId(1), 0), Target::new(ME, 0)];
        assert!(!bot.should_swap_after_peek(Card::new(40, Rank::Jack), &ctx));
        assert!(bot.should_swap_after_peek(Card::new(49, Rank::King), &ctx));

        bot.last_targets = vec![Target::new(AgentId(1), 0)];
        assert!(!bot.should_swap_after_peek(Card::new(49, Rank::King), &ctx));
    }

    #[test]
    fn declaration_prefers_the_plan_then_held_pairs() {
        let known = knowledge(&[
            (0, 0, Card::new(33, Rank::Nine)),
            (0, 1, Card::new(34, Rank::Nine)),
            (0, 2, Card::new(9, Rank::Three)),
        ]);
        let snap = snapshot(vec![3, 2], Card::new(16, Rank::Five), 4);
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal);
        let mut bot = session(2, 10);
        bot.target_plan = TargetPlan::from_action(&[Target::new(ME, 0)], false, Some(Rank::Four));
        assert_eq!(bot.select_declaration(&ctx), Rank::Four);
        assert_eq!(bot.select_declaration(&ctx), Rank::Nine);
    }

    #[test]
    fn end_round_forgets_everything() {
        let mut bot = session(2, 10);
        bot.observe_card(Card::new(33, Rank::Nine), AgentId(1), 0);
        bot.observe_discard(Card::new(16, Rank::Five));
        assert!(bot.beliefs().trusted(AgentId(1), 0).is_some());
        bot.end_round();
        assert!(bot.beliefs().trusted(AgentId(1), 0).is_none());
        assert!(bot.beliefs().discards().is_empty());
        assert!(bot.coalition_plan().is_none());
    }

    #[test]
    fn observed_swaps_and_removals_move_memory() {
        let mut bot = session(3, 50);
        for seat in 0..3 {
            bot.observe_card_count(AgentId(seat), 4);
        }
        let nine = Card::new(33, Rank::Nine);
        bot.observe_card(nine, AgentId(1), 2);

        bot.observe_swap(Target::new(AgentId(1), 2), Target::new(ME, 1));
        assert_eq!(bot.beliefs().trusted(AgentId(1), 2), None);
        assert_eq!(bot.beliefs().trusted(ME, 1), Some(nine));

        bot.observe_removed(ME, 0);
        assert_eq!(bot.beliefs().trusted(ME, 0), Some(nine));
        assert_eq!(bot.beliefs().agent(ME).map(|k| k.card_count()), Some(3));

        bot.observe_card_count(ME, 0);
        assert_eq!(bot.beliefs().trusted(ME, 0), None);
    }

    #[test]
    fn coalition_plan_survives_until_the_table_changes() {
        let wildcard = Card::new(52, Rank::Joker);
        let nine = Card::new(33, Rank::Nine);
        let king = Card::new(48, Rank::King);
        let mut hands = BTreeMap::new();
        hands.insert(ME, vec![wildcard, nine]);
        hands.insert(
            AgentId(1),
            vec![
                Card::new(44, Rank::Queen),
                Card::new(45, Rank::Queen),
                Card::new(17, Rank::Five),
            ],
        );
        let known = knowledge(&[(0, 0, wildcard), (0, 1, nine)]);
        let mut bot = session(3, 60);
        let planned_turn = |bot: &AgentSession| bot.coalition.as_ref().map(|c| c.planned_turn);

        let mut snap = snapshot(vec![2, 3, 3], king, 9);
        snap.caller = Some(AgentId(2));
        let ctx = DecisionContext::new(ME, &snap, &known, Difficulty::Normal)
            .with_coalition_hands(&hands);
        bot.decide_turn_action(&ctx);
        assert_eq!(planned_turn(&bot), Some(9));

        let mut later = snapshot(vec![2, 3, 3], king, 12);
        later.caller = Some(AgentId(2));
        let ctx = DecisionContext::new(ME, &later, &known, Difficulty::Normal)
            .with_coalition_hands(&hands);
        bot.decide_turn_action(&ctx);
        assert_eq!(planned_turn(&bot), Some(9));

        let mut moved = snapshot(vec![2, 3, 3], Card::new(9, Rank::Three), 13);
        moved.caller = Some(AgentId(2));
        let ctx = DecisionContext::new(ME, &moved, &known, Difficulty::Normal)
            .with_coalition_hands(&hands);
        bot.decide_turn_action(&ctx);
        assert_eq!(planned_turn(&bot), Some(13));
        assert_eq!(bot.coalition_plan().map(|p| p.champion), Some(ME));
    }
}
