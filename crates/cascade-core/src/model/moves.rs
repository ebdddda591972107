use crate::model::agent::AgentId;
use crate::model::rank::Rank;
use core::fmt;
use serde::{Deserialize, Serialize};

/// One hand position on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub agent: AgentId,
    pub position: usize,
}

impl Target {
    pub const fn new(agent: AgentId, position: usize) -> Self {
        Self { agent, position }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.agent, self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Move {
    Draw,
    TakeDiscard,
    /// Play the pending card for its action. `targets` follow the action's
    /// order: Exchange `[a, b]`, Scout `[peeked, own]`, Observe/Attack/Declare
    /// `[target]`.
    UseAction {
        targets: Vec<Target>,
        swap: bool,
        declared: Option<Rank>,
    },
    SwapIntoHand {
        position: usize,
    },
    DiscardDrawn,
    CascadeIn {
        positions: Vec<usize>,
    },
    Pass,
    CallEndGame,
}

impl Move {
    pub fn label(&self) -> &'static str {
        match self {
            Move::Draw => "draw",
            Move::TakeDiscard => "take_discard",
            Move::UseAction { .. } => "use_action",
            Move::SwapIntoHand { .. } => "swap_into_hand",
            Move::DiscardDrawn => "discard_drawn",
            Move::CascadeIn { .. } => "cascade_in",
            Move::Pass => "pass",
            Move::CallEndGame => "call_end_game",
        }
    }

    pub fn targets(&self) -> &[Target] {
        match self {
            Move::UseAction { targets, .. } => targets,
            _ => &[],
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Move::UseAction {
                targets,
                swap,
                declared,
            } => {
                write!(f, "use_action(")?;
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{target}")?;
                }
                if *swap {
                    f.write_str(";swap")?;
                }
                if let Some(rank) = declared {
                    write!(f, ";declare={rank}")?;
                }
                f.write_str(")")
            }
            Move::SwapIntoHand { position } => write!(f, "swap_into_hand({position})"),
            Move::CascadeIn { positions } => write!(f, "cascade_in({positions:?})"),
            other => f.write_str(other.label()),
        }
    }
}
