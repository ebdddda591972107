//! Static position scoring for search leaves.

use cascade_core::model::agent::AgentId;
use cascade_core::model::rank::Rank;
use cascade_core::state::{AgentBelief, SearchState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalWeights {
    pub cascade_potential: f32,
    pub standing: f32,
    pub action_value: f32,
    pub information: f32,
    pub threat: f32,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            cascade_potential: 0.30,
            standing: 0.25,
            action_value: 0.20,
            information: 0.15,
            threat: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoalitionWeights {
    pub score_gap: f32,
    pub card_gap: f32,
    pub champion_cascade: f32,
    pub caller_threat: f32,
}

impl Default for CoalitionWeights {
    fn default() -> Self {
        Self {
            score_gap: 0.40,
            card_gap: 0.30,
            champion_cascade: 0.20,
            caller_threat: 0.10,
        }
    }
}

/// Scores a state in `[0, 1]` from one agent's side.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    pub weights: EvalWeights,
    pub coalition: CoalitionWeights,
}

impl Evaluator {
    pub fn evaluate(&self, state: &SearchState, perspective: AgentId) -> f32 {
        if state.is_terminal() {
            return match state.winner() {
                Some(winner) if state.same_side(winner, perspective) => 1.0,
                _ => 0.0,
            };
        }
        match state.caller() {
            Some(caller) if caller != perspective => self.coalition_value(state, caller),
            _ => self.individual_value(state, perspective),
        }
    }

    fn individual_value(&self, state: &SearchState, perspective: AgentId) -> f32 {
        let Some(own) = state.agent(perspective) else {
            return 0.0;
        };
        let w = &self.weights;
        let value = w.cascade_potential * cascade_potential(own)
            + w.standing * standing(state, perspective)
            + w.action_value * action_value(own)
            + w.information * information(state, perspective)
            + w.threat * (1.0 - threat(state, perspective));
        value.clamp(0.0, 1.0)
    }

    fn coalition_value(&self, state: &SearchState, caller: AgentId) -> f32 {
        let Some(champion) = champion(state) else {
            return 0.0;
        };
        let w = &self.coalition;
        let score_gap = state.score_of(caller) - state.score_of(champion);
        let card_gap = state.card_count(caller) as f32 - state.card_count(champion) as f32;
        let champion_cascade = state.agent(champion).map_or(0.0, cascade_potential);
        let caller_actions = state
            .agent(caller)
            .map_or(0, |belief| belief.trusted_cards().filter(|c| c.has_action()).count());
        let caller_quiet = 1.0 - (caller_actions as f32 / 3.0).min(1.0);
        let value = w.score_gap * squash(score_gap, 10.0)
            + w.card_gap * squash(card_gap, 3.0)
            + w.champion_cascade * champion_cascade
            + w.caller_threat * caller_quiet;
        value.clamp(0.0, 1.0)
    }
}

/// Coalition member with the best standing.
pub fn champion(state: &SearchState) -> Option<AgentId> {
    let caller = state.caller()?;
    state.ranking().into_iter().find(|agent| *agent != caller)
}

/// Maps a signed gap to `(0, 1)`, 0.5 at parity.
fn squash(gap: f32, scale: f32) -> f32 {
    0.5 + 0.5 * (gap / scale).tanh()
}

/// Boost for a trusted wildcard held next to a matched group.
const WILDCARD_SYNERGY: f32 = 1.5;

/// Matched trusted groups that one discard would clear, weighted by value and
/// boosted when a wildcard can declare the group's rank.
pub fn cascade_potential(belief: &AgentBelief) -> f32 {
    let mut counts = [0u8; Rank::COUNT];
    for card in belief.trusted_cards() {
        counts[card.rank.index()] += 1;
    }
    let wildcard = belief.trusted_cards().any(|c| c.rank.is_wildcard());
    let raw: f32 = Rank::ORDERED
        .iter()
        .filter(|rank| counts[rank.index()] >= 2)
        .map(|rank| {
            let extra = f32::from(counts[rank.index()] - 1);
            extra * (1.0 + rank.value().max(0) as f32 / 13.0)
        })
        .sum();
    let raw = if wildcard { raw * WILDCARD_SYNERGY } else { raw };
    (raw / 3.0).min(1.0)
}

fn action_value(belief: &AgentBelief) -> f32 {
    let actions = belief.trusted_cards().filter(|c| c.has_action()).count();
    let has_wildcard = belief.trusted_cards().any(|c| c.rank.is_wildcard());
    let has_pair = cascade_potential(belief) > 0.0;
    let synergy = if has_wildcard && has_pair { 0.5 } else { 0.0 };
    (actions as f32 * 0.25 + synergy).min(1.0)
}

fn standing(state: &SearchState, perspective: AgentId) -> f32 {
    let opponents: Vec<AgentId> = AgentId::all(state.table_size())
        .filter(|agent| *agent != perspective)
        .collect();
    if opponents.is_empty() {
        return 1.0;
    }
    let count = opponents.len() as f32;
    let mean_score = opponents.iter().map(|a| state.score_of(*a)).sum::<f32>() / count;
    let mean_cards = opponents
        .iter()
        .map(|a| state.card_count(*a) as f32)
        .sum::<f32>()
        / count;
    let score_edge = squash(mean_score - state.score_of(perspective), 15.0);
    let card_edge = squash(mean_cards - state.card_count(perspective) as f32, 3.0);
    0.7 * score_edge + 0.3 * card_edge
}

fn information(state: &SearchState, perspective: AgentId) -> f32 {
    let own = state.agent(perspective).map_or(0.0, AgentBelief::known_fraction);
    let others: Vec<f32> = AgentId::all(state.table_size())
        .filter(|agent| *agent != perspective)
        .filter_map(|agent| state.agent(agent).map(AgentBelief::known_fraction))
        .collect();
    let others = if others.is_empty() {
        0.0
    } else {
        others.iter().sum::<f32>() / others.len() as f32
    };
    0.6 * own + 0.4 * others
}

/// How close the nearest opponent is to emptying its hand.
fn threat(state: &SearchState, perspective: AgentId) -> f32 {
    let fewest = AgentId::all(state.table_size())
        .filter(|agent| *agent != perspective)
        .map(|agent| state.card_count(agent))
        .min();
    match fewest {
        None => 0.0,
        Some(cards) => (1.0 - (cards.saturating_sub(1)) as f32 / 4.0).clamp(0.0, 1.0),
    }
}
