use super::Difficulty;
use cascade_core::model::agent::AgentId;
use cascade_core::model::card::Card;
use cascade_core::model::moves::Target;
use cascade_core::model::rank::Rank;
use cascade_core::state::PendingCard;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Publicly observable table state handed over by the rules engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservableSnapshot {
    /// Hand size per agent, indexed by seat.
    pub card_counts: Vec<usize>,
    pub discard_top: Option<Card>,
    #[serde(default)]
    pub declared_top: Option<Rank>,
    pub discard_history: Vec<Card>,
    pub deck_remaining: usize,
    pub mover: AgentId,
    pub caller: Option<AgentId>,
    pub coalition_leader: Option<AgentId>,
    pub turn: u32,
    pub pending: Option<PendingCard>,
    /// Ranks open for cascading in; empty when no window is open.
    #[serde(default)]
    pub cascade_ranks: Vec<Rank>,
}

impl ObservableSnapshot {
    pub fn table_size(&self) -> usize {
        self.card_counts.len()
    }

    pub fn card_count(&self, agent: AgentId) -> usize {
        self.card_counts.get(agent.index()).copied().unwrap_or(0)
    }

    /// Agents still to act before `caller` plays again, starting with the mover.
    pub fn turns_until(&self, caller: AgentId) -> Vec<AgentId> {
        let table = self.table_size();
        let mut order = Vec::new();
        if table == 0 {
            return order;
        }
        let mut agent = self.mover;
        for _ in 0..table {
            if agent == caller {
                break;
            }
            order.push(agent);
            agent = agent.next(table);
        }
        order
    }
}

/// Cards the deciding agent has seen, keyed by their current position.
pub type OpponentKnowledge = BTreeMap<Target, Card>;

#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    pub agent: AgentId,
    pub snapshot: &'a ObservableSnapshot,
    pub knowledge: &'a OpponentKnowledge,
    /// Every coalition member's hand, present only while an endgame runs.
    pub coalition_hands: Option<&'a BTreeMap<AgentId, Vec<Card>>>,
    pub difficulty: Difficulty,
}

impl<'a> DecisionContext<'a> {
    pub fn new(
        agent: AgentId,
        snapshot: &'a ObservableSnapshot,
        knowledge: &'a OpponentKnowledge,
        difficulty: Difficulty,
    ) -> Self {
        Self {
            agent,
            snapshot,
            knowledge,
            coalition_hands: None,
            difficulty,
        }
    }

    pub fn with_coalition_hands(mut self, hands: &'a BTreeMap<AgentId, Vec<Card>>) -> Self {
        self.coalition_hands = Some(hands);
        self
    }

    pub fn caller(&self) -> Option<AgentId> {
        self.snapshot.caller
    }

    /// True when an endgame is running and this agent is not the caller.
    pub fn in_coalition(&self) -> bool {
        matches!(self.snapshot.caller, Some(caller) if caller != self.agent)
    }

    pub fn own_card_count(&self) -> usize {
        self.snapshot.card_count(self.agent)
    }

    pub fn known_card(&self, agent: AgentId, position: usize) -> Option<Card> {
        self.knowledge.get(&Target::new(agent, position)).copied()
    }

    pub fn own_known(&self) -> impl Iterator<Item = (usize, Card)> + '_ {
        let agent = self.agent;
        self.knowledge
            .iter()
            .filter(move |(target, _)| target.agent == agent)
            .map(|(target, card)| (target.position, *card))
    }
}

#[cfg(test)]
mod tests {
    use super::{DecisionContext, ObservableSnapshot, OpponentKnowledge};
    use crate::bot::Difficulty;
    use cascade_core::model::agent::AgentId;
    use cascade_core::model::card::Card;
    use cascade_core::model::moves::Target;
    use cascade_core::model::rank::Rank;

    #[test]
    fn turns_until_stops_at_the_caller() {
        let snapshot = ObservableSnapshot {
            card_counts: vec![4, 4, 4, 4],
            mover: AgentId(2),
            caller: Some(AgentId(1)),
            ..ObservableSnapshot::default()
        };
        assert_eq!(
            snapshot.turns_until(AgentId(1)),
            vec![AgentId(2), AgentId(3), AgentId(0)]
        );
    }

    #[test]
    fn context_exposes_own_knowledge_only() {
        let snapshot = ObservableSnapshot {
            card_counts: vec![2, 2],
            caller: Some(AgentId(1)),
            ..ObservableSnapshot::default()
        };
        let mut knowledge = OpponentKnowledge::new();
        knowledge.insert(Target::new(AgentId(0), 1), Card::new(8, Rank::Three));
        knowledge.insert(Target::new(AgentId(1), 0), Card::new(9, Rank::Three));
        let ctx = DecisionContext::new(AgentId(0), &snapshot, &knowledge, Difficulty::Normal);
        assert!(ctx.in_coalition());
        assert_eq!(ctx.own_known().collect::<Vec<_>>(), vec![(1, Card::new(8, Rank::Three))]);
        assert_eq!(ctx.known_card(AgentId(1), 0).map(|c| c.rank), Some(Rank::Three));
    }

    #[test]
    fn snapshot_reads_json() {
        let raw = r#"{
            "card_counts": [3, 4],
            "discard_top": {"id": 5, "rank": "Two"},
            "discard_history": [{"id": 5, "rank": "Two"}],
            "deck_remaining": 40,
            "mover": 1,
            "caller": null,
            "coalition_leader": null,
            "turn": 7,
            "pending": null
        }"#;
        let snapshot: ObservableSnapshot = serde_json::from_str(raw).expect("parse");
        assert_eq!(snapshot.mover, AgentId(1));
        assert_eq!(snapshot.card_count(AgentId(0)), 3);
        assert!(snapshot.cascade_ranks.is_empty());
    }
}
