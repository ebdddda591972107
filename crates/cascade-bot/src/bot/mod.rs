mod context;
mod params;
mod plan;
mod session;

pub use context::{DecisionContext, ObservableSnapshot, OpponentKnowledge};
pub use params::SearchConfig;
pub use plan::{TargetPlan, TargetStep};
pub use session::{ActionTargets, AgentSession, SwapChoice, TurnDecision};

use core::fmt;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Normal, Difficulty::Hard];

    pub fn from_env() -> Self {
        static CACHED: OnceLock<Difficulty> = OnceLock::new();
        *CACHED.get_or_init(|| {
            std::env::var("CASCADE_BOT_DIFFICULTY")
                .ok()
                .and_then(|raw| Difficulty::parse(&raw))
                .unwrap_or_default()
        })
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" | "beginner" => Some(Difficulty::Easy),
            "normal" | "default" => Some(Difficulty::Normal),
            "hard" | "expert" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::Difficulty;

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(Difficulty::parse(" Expert "), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse("beginner"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse("default"), Some(Difficulty::Normal));
        assert_eq!(Difficulty::parse("impossible"), None);
    }

    #[test]
    fn display_matches_label() {
        for difficulty in Difficulty::ALL {
            assert_eq!(difficulty.to_string(), difficulty.label());
        }
    }
}
