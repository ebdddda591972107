//! Full-information planning for the coalition facing a caller.
//!
//! Every coalition member's hand is known to the planner. For each candidate
//! champion a bounded depth-first search covers the members' remaining turns
//! and keeps the line that leaves the champion lowest. Steps never touch the
//! caller's cards and never use an attack.

use cascade_core::model::action::ActionKind;
use cascade_core::model::agent::AgentId;
use cascade_core::model::card::Card;
use cascade_core::model::moves::Target;
use cascade_core::model::rank::Rank;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{Level, event};

/// Search nodes expanded per candidate champion.
pub const MAX_PLAN_NODES: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Nothing deterministic to gain; play the turn individually.
    Hold,
    /// Take the discard top and swap it into `targets[0]`.
    TakeAndSwap,
    /// Take a discarded Jack and exchange `targets[0]` with `targets[1]`.
    Exchange,
    /// Take a discarded wildcard and declare `declared` on `targets[0]`.
    Declare,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub agent: AgentId,
    pub kind: StepKind,
    pub source: Option<Card>,
    pub targets: Vec<Target>,
    /// Cards the plan expects at `targets` when the step is played.
    pub target_cards: Vec<Card>,
    pub declared: Option<Rank>,
    pub rationale: String,
}

impl PlanStep {
    /// Whether the step can still be played as planned: its source card is on
    /// top and every target still holds the expected card.
    pub fn playable_on(&self, hands: &BTreeMap<AgentId, Vec<Card>>, top: Option<Card>) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        top.is_some_and(|top| top.same_card(source))
            && self.targets.len() == self.target_cards.len()
            && self.targets.iter().zip(&self.target_cards).all(|(target, card)| {
                hands
                    .get(&target.agent)
                    .and_then(|hand| hand.get(target.position))
                    .is_some_and(|held| held.same_card(*card))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoalitionPlan {
    pub champion: AgentId,
    pub target_score: i32,
    pub final_cards: usize,
    pub confidence: f32,
    pub steps: Vec<PlanStep>,
}

impl CoalitionPlan {
    pub fn step_for(&self, agent: AgentId) -> Option<&PlanStep> {
        self.steps.iter().find(|step| step.agent == agent)
    }
}

/// What the coalition knows when planning.
#[derive(Debug, Clone, PartialEq)]
pub struct CoalitionInput {
    pub caller: AgentId,
    /// Coalition members still to act before the caller, in seat order.
    pub turn_order: Vec<AgentId>,
    pub hands: BTreeMap<AgentId, Vec<Card>>,
    /// Caller's hand as far as known.
    pub caller_hand: Vec<Option<Card>>,
    pub discard_top: Option<Card>,
    pub expected_unknown: f32,
}

impl CoalitionInput {
    fn caller_estimate(&self, caller: &[Option<Card>]) -> f32 {
        caller
            .iter()
            .map(|slot| slot.map_or(self.expected_unknown, |c| c.value() as f32))
            .sum()
    }

    fn caller_known_fraction(&self) -> f32 {
        if self.caller_hand.is_empty() {
            return 1.0;
        }
        let known = self.caller_hand.iter().filter(|slot| slot.is_some()).count();
        known as f32 / self.caller_hand.len() as f32
    }
}

#[derive(Debug, Clone)]
struct Table {
    hands: BTreeMap<AgentId, Vec<Card>>,
    caller_id: AgentId,
    caller: Vec<Option<Card>>,
    top: Option<Card>,
}

impl Table {
    fn score(&self, agent: AgentId) -> i32 {
        self.hands
            .get(&agent)
            .map_or(0, |hand| hand.iter().map(|c| c.value()).sum())
    }

    fn cards(&self, agent: AgentId) -> usize {
        self.hands.get(&agent).map_or(0, Vec::len)
    }

    /// Puts `card` on the pile and cascades its rank.
    fn discard(&mut self, card: Card) {
        self.top = Some(card.as_played());
        self.cascade(card.rank);
    }

    /// Removes every known card of `rank`. Seats are emptied in id order and
    /// each hand from its last position down, so the lowest matching position
    /// of the highest matching seat ends on top.
    fn cascade(&mut self, rank: Rank) {
        let mut seats: Vec<AgentId> = self.hands.keys().copied().collect();
        seats.push(self.caller_id);
        seats.sort_unstable();
        let mut last = None;
        for seat in seats {
            if seat == self.caller_id {
                if let Some(card) = self.caller.iter().flatten().find(|c| c.rank == rank) {
                    last = Some(*card);
                }
                self.caller
                    .retain(|slot| !slot.is_some_and(|card| card.rank == rank));
            } else if let Some(hand) = self.hands.get_mut(&seat) {
                if let Some(card) = hand.iter().find(|c| c.rank == rank) {
                    last = Some(*card);
                }
                hand.retain(|card| card.rank != rank);
            }
        }
        if let Some(card) = last {
            self.top = Some(card.as_played());
        }
    }

    fn caller_out(&self) -> bool {
        self.caller.is_empty()
    }

    /// An emptied hand ends the round on the spot.
    fn round_over(&self) -> bool {
        self.caller_out() || self.hands.values().any(Vec::is_empty)
    }
}

/// Champion outcome, ordered best first.
#[derive(Debug, Clone, Copy)]
struct Outcome {
    caller_out: bool,
    has_cards: bool,
    score: i32,
    cards: usize,
    caller: f32,
}

impl Outcome {
    fn cmp(&self, other: &Outcome) -> Ordering {
        self.caller_out
            .cmp(&other.caller_out)
            .then(self.has_cards.cmp(&other.has_cards))
            .then(self.score.cmp(&other.score))
            .then(self.cards.cmp(&other.cards))
            .then(other.caller.total_cmp(&self.caller))
    }
}

struct Best {
    outcome: Outcome,
    steps: Vec<PlanStep>,
}

#[derive(Debug, Clone, Copy)]
pub struct CoalitionPlanner {
    max_nodes: usize,
}

impl Default for CoalitionPlanner {
    fn default() -> Self {
        Self {
            max_nodes: MAX_PLAN_NODES,
        }
    }
}

impl CoalitionPlanner {
    pub fn with_max_nodes(max_nodes: usize) -> Self {
        Self {
            max_nodes: max_nodes.max(1),
        }
    }

    /// Picks the champion and its plan. Ties on the achievable outcome go to
    /// fewer final cards, then lower current score, then lower agent id.
    pub fn plan(&self, input: &CoalitionInput) -> Option<CoalitionPlan> {
        let table = initial_table(input);
        let mut chosen: Option<(CoalitionPlan, i32)> = None;
        for champion in input.hands.keys().copied().filter(|a| *a != input.caller) {
            let Some(plan) = self.plan_for_champion(input, champion) else {
                continue;
            };
            let current = table.score(champion);
            let better = match &chosen {
                None => true,
                Some((best, best_current)) => {
                    let has = (plan.final_cards > 0, plan.target_score, plan.final_cards);
                    let other = (best.final_cards > 0, best.target_score, best.final_cards);
                    has.cmp(&other)
                        .then(current.cmp(best_current))
                        .then(champion.cmp(&best.champion))
                        == Ordering::Less
                }
            };
            if better {
                chosen = Some((plan, current));
            }
        }
        let plan = chosen.map(|(plan, _)| plan)?;
        if tracing::enabled!(target: "cascade_bot::coalition", Level::INFO) {
            event!(
                target: "cascade_bot::coalition",
                Level::INFO,
                caller = %input.caller,
                champion = %plan.champion,
                target_score = plan.target_score,
                confidence = plan.confidence,
                steps = plan.steps.len(),
            );
        }
        Some(plan)
    }

    /// Plan with `champion` locked in.
    pub fn plan_for_champion(
        &self,
        input: &CoalitionInput,
        champion: AgentId,
    ) -> Option<CoalitionPlan> {
        if champion == input.caller || !input.hands.contains_key(&champion) {
            return None;
        }
        let table = initial_table(input);
        let order: Vec<AgentId> = input
            .turn_order
            .iter()
            .copied()
            .filter(|agent| *agent != input.caller && input.hands.contains_key(agent))
            .collect();
        let mut search = Search {
            input,
            champion,
            order: &order,
            nodes: 0,
            max_nodes: self.max_nodes,
            steps: Vec::new(),
            best: None,
        };
        search.visit(&table, 0);
        let nodes = search.nodes;
        let best = search.best?;

        let confidence = if !best.outcome.has_cards {
            1.0
        } else {
            let margin = best.outcome.caller - best.outcome.score as f32;
            (0.5 + 0.5 * (margin / 10.0).tanh()) * (0.5 + 0.5 * input.caller_known_fraction())
        };
        if tracing::enabled!(target: "cascade_bot::coalition", Level::DEBUG) {
            event!(
                target: "cascade_bot::coalition",
                Level::DEBUG,
                champion = %champion,
                nodes,
                target_score = best.outcome.score,
            );
        }
        Some(CoalitionPlan {
            champion,
            target_score: best.outcome.score,
            final_cards: best.outcome.cards,
            confidence,
            steps: best.steps,
        })
    }
}

fn initial_table(input: &CoalitionInput) -> Table {
    Table {
        hands: input
            .hands
            .iter()
            .filter(|(agent, _)| **agent != input.caller)
            .map(|(agent, hand)| (*agent, hand.clone()))
            .collect(),
        caller_id: input.caller,
        caller: input.caller_hand.clone(),
        top: input.discard_top,
    }
}

struct Search<'a> {
    input: &'a CoalitionInput,
    champion: AgentId,
    order: &'a [AgentId],
    nodes: usize,
    max_nodes: usize,
    steps: Vec<PlanStep>,
    best: Option<Best>,
}

impl Search<'_> {
    fn visit(&mut self, table: &Table, depth: usize) {
        self.nodes += 1;
        if depth >= self.order.len() || self.nodes >= self.max_nodes || table.round_over() {
            self.record(table);
            return;
        }
        let agent = self.order[depth];
        for (step, next) in self.options(table, agent) {
            self.steps.push(step);
            self.visit(&next, depth + 1);
            self.steps.pop();
        }
    }

    fn record(&mut self, table: &Table) {
        let cards = table.cards(self.champion);
        let outcome = Outcome {
            caller_out: table.caller_out(),
            has_cards: cards > 0,
            score: table.score(self.champion),
            cards,
            caller: self.input.caller_estimate(&table.caller),
        };
        let better = self
            .best
            .as_ref()
            .is_none_or(|best| outcome.cmp(&best.outcome) == Ordering::Less);
        if better {
            self.best = Some(Best {
                outcome,
                steps: self.steps.clone(),
            });
        }
    }

    /// Candidate steps for `agent`, `Hold` first.
    fn options(&self, table: &Table, agent: AgentId) -> Vec<(PlanStep, Table)> {
        let mut options = Vec::new();
        let mut held = table.clone();
        held.top = None;
        options.push((
            step(
                agent,
                StepKind::Hold,
                None,
                Vec::new(),
                Vec::new(),
                None,
                "no deterministic gain",
            ),
            held,
        ));
        let Some(top) = table.top else {
            return options;
        };
        let hand = table.hands.get(&agent).cloned().unwrap_or_default();

        let mut swapped_ranks = Vec::new();
        for (position, card) in hand.iter().enumerate() {
            if swapped_ranks.contains(&card.rank) {
                continue;
            }
            swapped_ranks.push(card.rank);
            let mut next = table.clone();
            if let Some(slot) = next.hands.get_mut(&agent).and_then(|h| h.get_mut(position)) {
                *slot = Card { played: false, ..top };
            }
            next.discard(*card);
            let rationale = format!("take {top}, discard {card}");
            options.push((
                step(
                    agent,
                    StepKind::TakeAndSwap,
                    Some(top),
                    vec![Target::new(agent, position)],
                    vec![*card],
                    None,
                    &rationale,
                ),
                next,
            ));
        }

        match top.action() {
            Some(ActionKind::Exchange) => self.exchange_options(table, agent, top, &mut options),
            Some(ActionKind::Declare) => self.declare_options(table, agent, top, &mut options),
            Some(ActionKind::Scout | ActionKind::Observe | ActionKind::Attack) | None => {}
        }
        options
    }

    /// Moves a cheaper card from another member onto the champion. The Jack
    /// cascades before the exchange, so cards of its rank cannot be moved.
    fn exchange_options(
        &self,
        table: &Table,
        agent: AgentId,
        jack: Card,
        options: &mut Vec<(PlanStep, Table)>,
    ) {
        let Some(champion_hand) = table.hands.get(&self.champion) else {
            return;
        };
        for (member, hand) in &table.hands {
            if *member == self.champion {
                continue;
            }
            for (from, cheap) in hand.iter().enumerate() {
                for (to, costly) in champion_hand.iter().enumerate() {
                    if cheap.value() >= costly.value()
                        || cheap.rank == jack.rank
                        || costly.rank == jack.rank
                    {
                        continue;
                    }
                    let mut next = table.clone();
                    next.discard(jack);
                    let (Some(from_now), Some(to_now)) = (
                        position_of(&next, *member, *cheap),
                        position_of(&next, self.champion, *costly),
                    ) else {
                        continue;
                    };
                    if let Some(slot) = next
                        .hands
                        .get_mut(member)
                        .and_then(|h| h.get_mut(from_now))
                    {
                        *slot = *costly;
                    }
                    if let Some(slot) = next
                        .hands
                        .get_mut(&self.champion)
                        .and_then(|h| h.get_mut(to_now))
                    {
                        *slot = *cheap;
                    }
                    let rationale = format!("move {cheap} to {} for {costly}", self.champion);
                    options.push((
                        step(
                            agent,
                            StepKind::Exchange,
                            Some(jack),
                            vec![Target::new(*member, from), Target::new(self.champion, to)],
                            vec![*cheap, *costly],
                            None,
                            &rationale,
                        ),
                        next,
                    ));
                }
            }
        }
    }

    fn declare_options(
        &self,
        table: &Table,
        agent: AgentId,
        wildcard: Card,
        options: &mut Vec<(PlanStep, Table)>,
    ) {
        let Some(first) = table.hands.get(&self.champion).and_then(|h| h.first()).copied() else {
            return;
        };
        let target = Target::new(self.champion, 0);
        for rank in Rank::ORDERED {
            if rank.action().is_some_and(ActionKind::is_harmful) {
                continue;
            }
            // With nothing removed the wildcard stays on top under the declared rank.
            let mut next = table.clone();
            next.top = Some(wildcard);
            next.cascade(rank);
            let rationale = format!("declare {rank} to cascade");
            options.push((
                step(
                    agent,
                    StepKind::Declare,
                    Some(wildcard),
                    vec![target],
                    vec![first],
                    Some(rank),
                    &rationale,
                ),
                next,
            ));
        }
    }
}

fn position_of(table: &Table, agent: AgentId, card: Card) -> Option<usize> {
    table
        .hands
        .get(&agent)?
        .iter()
        .position(|held| held.same_card(card))
}

fn step(
    agent: AgentId,
    kind: StepKind,
    source: Option<Card>,
    targets: Vec<Target>,
    target_cards: Vec<Card>,
    declared: Option<Rank>,
    rationale: &str,
) -> PlanStep {
    PlanStep {
        agent,
        kind,
        source,
        targets,
        target_cards,
        declared,
        rationale: rationale.to_string(),
    }
}
