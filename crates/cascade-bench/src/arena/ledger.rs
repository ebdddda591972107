use cascade_bot::bot::OpponentKnowledge;
use cascade_core::model::action::ActionKind;
use cascade_core::model::agent::AgentId;
use cascade_core::model::card::CardId;
use cascade_core::model::moves::{Move, Target};
use cascade_core::state::SearchState;
use std::collections::HashSet;

/// Which card ids each seat has looked at.
///
/// Tracking ids rather than positions keeps knowledge correct through
/// swaps and hand compaction.
#[derive(Debug, Clone)]
pub struct KnowledgeLedger {
    seen: Vec<HashSet<CardId>>,
}

impl KnowledgeLedger {
    /// Every seat starts knowing its first `peeked` cards.
    pub fn deal(truth: &SearchState, peeked: usize) -> Self {
        let seen = truth
            .agents()
            .iter()
            .map(|belief| {
                belief
                    .slots
                    .iter()
                    .take(peeked)
                    .filter_map(|slot| slot.card.map(|card| card.id))
                    .collect()
            })
            .collect();
        Self { seen }
    }

    pub fn knows(&self, agent: AgentId, id: CardId) -> bool {
        self.seen
            .get(agent.index())
            .is_some_and(|seen| seen.contains(&id))
    }

    fn learn(&mut self, agent: AgentId, id: CardId) {
        if let Some(seen) = self.seen.get_mut(agent.index()) {
            seen.insert(id);
        }
    }

    /// Records what the mover learns from `mv`, given the state before and
    /// after it was applied.
    pub fn record(&mut self, before: &SearchState, mv: &Move, after: &SearchState) {
        let mover = before.mover();
        match mv {
            Move::Draw | Move::TakeDiscard => {
                if let Some(card) = after.pending().and_then(|p| p.card) {
                    self.learn(mover, card.id);
                }
            }
            Move::UseAction {
                targets, declared, ..
            } => {
                let kind = before.pending().and_then(|p| p.card).and_then(|c| c.action());
                let effective = match kind {
                    Some(ActionKind::Declare) => declared.and_then(|rank| rank.action()),
                    other => other,
                };
                if effective.is_some_and(ActionKind::reveals) {
                    for target in targets {
                        if let Some(card) = before.slot(*target).and_then(|slot| slot.card) {
                            self.learn(mover, card.id);
                        }
                    }
                }
            }
            Move::SwapIntoHand { .. }
            | Move::DiscardDrawn
            | Move::CascadeIn { .. }
            | Move::Pass
            | Move::CallEndGame => {}
        }
    }

    /// Owner-known cards are the ones that take part in cascades.
    pub fn mark_owner_knowledge(&self, truth: &mut SearchState) {
        let mut marks = Vec::new();
        for (index, belief) in truth.agents().iter().enumerate() {
            let owner = AgentId(index as u8);
            for (position, slot) in belief.slots.iter().enumerate() {
                let known = slot.card.is_some_and(|card| self.knows(owner, card.id));
                marks.push((index, position, known));
            }
        }
        let agents = truth.agents_mut();
        for (index, position, known) in marks {
            if let Some(slot) = agents.get_mut(index).and_then(|b| b.slots.get_mut(position)) {
                slot.confidence = if known { 1.0 } else { 0.0 };
            }
        }
    }

    /// Everything `viewer` has seen, at its current position.
    pub fn knowledge_for(&self, viewer: AgentId, truth: &SearchState) -> OpponentKnowledge {
        let mut knowledge = OpponentKnowledge::new();
        for (index, belief) in truth.agents().iter().enumerate() {
            let owner = AgentId(index as u8);
            for (position, slot) in belief.slots.iter().enumerate() {
                if let Some(card) = slot.card.filter(|card| self.knows(viewer, card.id)) {
                    knowledge.insert(Target::new(owner, position), card);
                }
            }
        }
        knowledge
    }
}
