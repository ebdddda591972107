use cascade_core::model::moves::Target;
use cascade_core::model::rank::Rank;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStep {
    Target(Target),
    Swap(bool),
    Declare(Rank),
}

/// Action choices fixed when the turn was decided, replayed one query at a
/// time by the follow-up protocol calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetPlan {
    steps: VecDeque<TargetStep>,
}

impl TargetPlan {
    pub fn from_action(targets: &[Target], swap: bool, declared: Option<Rank>) -> Self {
        let mut plan = Self::default();
        for target in targets {
            plan.push(TargetStep::Target(*target));
        }
        plan.push(TargetStep::Swap(swap));
        if let Some(rank) = declared {
            plan.push(TargetStep::Declare(rank));
        }
        plan
    }

    pub fn push(&mut self, step: TargetStep) {
        self.steps.push_back(step);
    }

    pub fn pop(&mut self) -> Option<TargetStep> {
        self.steps.pop_front()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetStep> {
        self.steps.iter()
    }

    /// Removes and returns every queued target, leaving other steps in order.
    pub fn take_targets(&mut self) -> Vec<Target> {
        let mut targets = Vec::new();
        self.steps.retain(|step| match step {
            TargetStep::Target(target) => {
                targets.push(*target);
                false
            }
            TargetStep::Swap(_) | TargetStep::Declare(_) => true,
        });
        targets
    }

    pub fn take_swap(&mut self) -> Option<bool> {
        let index = self
            .steps
            .iter()
            .position(|step| matches!(step, TargetStep::Swap(_)))?;
        match self.steps.remove(index) {
            Some(TargetStep::Swap(swap)) => Some(swap),
            _ => None,
        }
    }

    pub fn take_declaration(&mut self) -> Option<Rank> {
        let index = self
            .steps
            .iter()
            .position(|step| matches!(step, TargetStep::Declare(_)))?;
        match self.steps.remove(index) {
            Some(TargetStep::Declare(rank)) => Some(rank),
            _ => None,
        }
    }

    pub fn peek_declaration(&self) -> Option<Rank> {
        self.steps.iter().find_map(|step| match step {
            TargetStep::Declare(rank) => Some(*rank),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{TargetPlan, TargetStep};
    use cascade_core::model::agent::AgentId;
    use cascade_core::model::moves::Target;
    use cascade_core::model::rank::Rank;

    #[test]
    fn steps_replay_in_order() {
        let a = Target::new(AgentId(1), 0);
        let b = Target::new(AgentId(0), 2);
        let mut plan = TargetPlan::from_action(&[a, b], true, None);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.pop(), Some(TargetStep::Target(a)));
        assert_eq!(plan.pop(), Some(TargetStep::Target(b)));
        assert_eq!(plan.pop(), Some(TargetStep::Swap(true)));
        assert!(plan.pop().is_none());
    }

    #[test]
    fn take_helpers_leave_the_rest() {
        let a = Target::new(AgentId(2), 1);
        let mut plan = TargetPlan::from_action(&[a], false, Some(Rank::Nine));
        assert_eq!(plan.peek_declaration(), Some(Rank::Nine));
        assert_eq!(plan.take_targets(), vec![a]);
        assert_eq!(plan.take_declaration(), Some(Rank::Nine));
        assert_eq!(plan.take_swap(), Some(false));
        assert!(plan.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut plan = TargetPlan::from_action(&[Target::new(AgentId(1), 0)], false, None);
        plan.clear();
        assert!(plan.is_empty());
        assert!(plan.take_swap().is_none());
    }
}
