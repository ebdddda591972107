use super::pool::{DEFAULT_RANK, RankPool};
use crate::model::agent::AgentId;
use crate::model::card::Card;
use crate::model::moves::Target;
use crate::model::rank::Rank;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{Level, event};

/// Confidence at or above which a remembered card counts as trusted.
pub const TRUST_THRESHOLD: f32 = 0.5;

/// Entries decayed below this confidence are forgotten.
const FORGET_BELOW: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KnownCard {
    pub card: Card,
    pub confidence: f32,
}

impl KnownCard {
    pub const fn certain(card: Card) -> Self {
        Self {
            card,
            confidence: 1.0,
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.confidence >= TRUST_THRESHOLD
    }
}

/// What one perspective remembers about a single agent's hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentKnowledge {
    card_count: usize,
    known: BTreeMap<usize, KnownCard>,
}

impl AgentKnowledge {
    pub fn card_count(&self) -> usize {
        self.card_count
    }

    pub fn known(&self, position: usize) -> Option<&KnownCard> {
        self.known.get(&position)
    }

    pub fn iter_known(&self) -> impl Iterator<Item = (usize, &KnownCard)> {
        self.known.iter().map(|(pos, known)| (*pos, known))
    }

    pub fn trusted_count(&self) -> usize {
        self.known.values().filter(|k| k.is_trusted()).count()
    }

    pub fn trusted_value(&self) -> i32 {
        self.known
            .values()
            .filter(|k| k.is_trusted())
            .map(|k| k.card.value())
            .sum()
    }

    fn truncate(&mut self, count: usize) {
        self.card_count = count;
        self.known.retain(|pos, _| *pos < count);
    }
}

/// Confidence-weighted card knowledge from one agent's perspective.
///
/// Positions are dense and 0-based per agent; removing a position shifts every
/// later entry down by one so the store mirrors hand compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefStore {
    perspective: AgentId,
    agents: Vec<AgentKnowledge>,
    composition: RankPool,
    discards: Vec<Card>,
}

impl BeliefStore {
    pub fn new(perspective: AgentId, table_size: usize) -> Self {
        Self::with_composition(perspective, table_size, RankPool::full_deck())
    }

    pub fn with_composition(perspective: AgentId, table_size: usize, composition: RankPool) -> Self {
        Self {
            perspective,
            agents: vec![AgentKnowledge::default(); table_size],
            composition,
            discards: Vec::new(),
        }
    }

    pub fn perspective(&self) -> AgentId {
        self.perspective
    }

    pub fn table_size(&self) -> usize {
        self.agents.len()
    }

    pub fn composition(&self) -> RankPool {
        self.composition
    }

    pub fn agent(&self, agent: AgentId) -> Option<&AgentKnowledge> {
        self.agents.get(agent.index())
    }

    pub fn discards(&self) -> &[Card] {
        &self.discards
    }

    /// Records a certain observation. Returns false when nothing changed.
    pub fn observe(&mut self, card: Card, agent: AgentId, position: usize) -> bool {
        self.observe_with_confidence(card, agent, position, 1.0)
    }

    pub fn observe_with_confidence(
        &mut self,
        card: Card,
        agent: AgentId,
        position: usize,
        confidence: f32,
    ) -> bool {
        let confidence = confidence.clamp(0.0, 1.0);
        let Some(entry) = self.agents.get(agent.index()) else {
            event!(
                target: "cascade_core::belief",
                Level::DEBUG,
                agent = %agent,
                position,
                reason = "unknown_agent",
            );
            return false;
        };
        if let Some(existing) = entry.known.get(&position) {
            if existing.card.same_card(card) && existing.confidence >= confidence {
                return false;
            }
        }
        self.drop_card(card, Some(Target::new(agent, position)));
        let knowledge = &mut self.agents[agent.index()];
        if position >= knowledge.card_count {
            knowledge.card_count = position + 1;
        }
        knowledge
            .known
            .insert(position, KnownCard { card, confidence });
        true
    }

    /// Records a card reaching the discard pile. Idempotent per card id.
    pub fn observe_discard(&mut self, card: Card) -> bool {
        if self.discards.iter().any(|c| c.same_card(card)) {
            return false;
        }
        self.drop_card(card, None);
        self.discards.push(card.as_played());
        true
    }

    /// Replaces the remembered discard pile with the authoritative history.
    pub fn sync_discards(&mut self, history: &[Card]) {
        self.discards.clear();
        for card in history {
            self.observe_discard(*card);
        }
    }

    pub fn forget(&mut self, agent: AgentId, position: usize) {
        if let Some(knowledge) = self.agents.get_mut(agent.index()) {
            knowledge.known.remove(&position);
        }
    }

    /// Removes a hand position and compacts the positions above it.
    pub fn remove_position(&mut self, agent: AgentId, position: usize) {
        let Some(knowledge) = self.agents.get_mut(agent.index()) else {
            return;
        };
        if position >= knowledge.card_count {
            return;
        }
        let shifted: BTreeMap<usize, KnownCard> = std::mem::take(&mut knowledge.known)
            .into_iter()
            .filter(|(pos, _)| *pos != position)
            .map(|(pos, known)| if pos > position { (pos - 1, known) } else { (pos, known) })
            .collect();
        knowledge.known = shifted;
        knowledge.card_count -= 1;
    }

    /// Moves remembered knowledge along with two swapped cards.
    pub fn swap(&mut self, a: Target, b: Target) {
        let left = self
            .agents
            .get_mut(a.agent.index())
            .and_then(|k| k.known.remove(&a.position));
        let right = self
            .agents
            .get_mut(b.agent.index())
            .and_then(|k| k.known.remove(&b.position));
        if let (Some(known), Some(knowledge)) = (left, self.agents.get_mut(b.agent.index())) {
            knowledge.known.insert(b.position, known);
        }
        if let (Some(known), Some(knowledge)) = (right, self.agents.get_mut(a.agent.index())) {
            knowledge.known.insert(a.position, known);
        }
    }

    pub fn set_card_count(&mut self, agent: AgentId, count: usize) {
        if let Some(knowledge) = self.agents.get_mut(agent.index()) {
            knowledge.truncate(count);
        }
    }

    /// Fades every remembered card by `factor`; returns how many were forgotten.
    pub fn decay(&mut self, factor: f32) -> usize {
        let factor = factor.clamp(0.0, 1.0);
        let mut forgotten = 0;
        for knowledge in &mut self.agents {
            knowledge.known.retain(|_, known| {
                known.confidence *= factor;
                let keep = known.confidence >= FORGET_BELOW;
                if !keep {
                    forgotten += 1;
                }
                keep
            });
        }
        forgotten
    }

    pub fn reset_round(&mut self, table_size: usize) {
        self.agents = vec![AgentKnowledge::default(); table_size];
        self.discards.clear();
    }

    pub fn known(&self, agent: AgentId, position: usize) -> Option<KnownCard> {
        self.agent(agent).and_then(|k| k.known(position)).copied()
    }

    pub fn trusted(&self, agent: AgentId, position: usize) -> Option<Card> {
        self.known(agent, position)
            .filter(KnownCard::is_trusted)
            .map(|k| k.card)
    }

    /// Deck composition minus discards minus every trusted card in a hand.
    pub fn aggregate_distribution(&self) -> RankPool {
        let mut pool = self.composition;
        for card in &self.discards {
            pool.remove_card(*card);
        }
        for knowledge in &self.agents {
            for known in knowledge.known.values().filter(|k| k.is_trusted()) {
                pool.remove_card(known.card);
            }
        }
        pool
    }

    /// Draws one rank from the unseen pool, falling back to [`DEFAULT_RANK`].
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Rank {
        match self.aggregate_distribution().sample(rng) {
            Some(rank) => rank,
            None => {
                tracing::warn!(
                    target: "cascade_core::belief",
                    perspective = %self.perspective,
                    fallback = %DEFAULT_RANK,
                    message = "unseen pool exhausted; sampling default rank",
                );
                DEFAULT_RANK
            }
        }
    }

    /// Trusted card values plus the pool's expected value for each unknown.
    pub fn estimated_score(&self, agent: AgentId) -> f32 {
        let Some(knowledge) = self.agent(agent) else {
            return 0.0;
        };
        let unknown = knowledge.card_count - knowledge.trusted_count().min(knowledge.card_count);
        knowledge.trusted_value() as f32
            + unknown as f32 * self.aggregate_distribution().expected_value()
    }

    pub fn known_fraction(&self, agent: AgentId) -> f32 {
        match self.agent(agent) {
            Some(k) if k.card_count > 0 => k.trusted_count() as f32 / k.card_count as f32,
            _ => 0.0,
        }
    }

    fn drop_card(&mut self, card: Card, except: Option<Target>) {
        for (index, knowledge) in self.agents.iter_mut().enumerate() {
            knowledge.known.retain(|pos, known| {
                let here = Some(Target::new(AgentId(index as u8), *pos)) == except;
                here || !known.card.same_card(card)
            });
        }
    }
}
