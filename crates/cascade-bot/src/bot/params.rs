use super::Difficulty;
use serde::{Deserialize, Serialize};

/// Search budget and decision thresholds for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub max_iterations: usize,
    pub time_budget_ms: u64,
    pub rollout_depth: usize,
    pub exploration: f64,
    /// Chance a rollout takes an available scout/observe move.
    pub scout_bias: f64,
    /// Confidence given to opponent-knowledge entries from the context.
    pub knowledge_confidence: f32,
    /// Per-turn fade applied to remembered cards.
    pub memory_decay: f32,
    pub min_call_turn: u32,
    /// Required lead over the best opponent before calling.
    pub call_margin: f32,
    pub turn_ceiling: u32,
    /// Ignore the wall clock and stop on the iteration cap only.
    pub deterministic: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::for_difficulty(Difficulty::Normal)
    }
}

impl SearchConfig {
    pub const fn for_difficulty(difficulty: Difficulty) -> Self {
        match difficulty {
            Difficulty::Easy => Self {
                max_iterations: 150,
                time_budget_ms: 40,
                rollout_depth: 8,
                exploration: 1.6,
                scout_bias: 0.5,
                knowledge_confidence: 0.75,
                memory_decay: 0.85,
                min_call_turn: 6,
                call_margin: 0.0,
                turn_ceiling: 60,
                deterministic: false,
            },
            Difficulty::Normal => Self {
                max_iterations: 600,
                time_budget_ms: 120,
                rollout_depth: 14,
                exploration: std::f64::consts::SQRT_2,
                scout_bias: 0.75,
                knowledge_confidence: 0.9,
                memory_decay: 0.95,
                min_call_turn: 4,
                call_margin: 1.0,
                turn_ceiling: 90,
                deterministic: false,
            },
            Difficulty::Hard => Self {
                max_iterations: 2_000,
                time_budget_ms: 400,
                rollout_depth: 24,
                exploration: 1.2,
                scout_bias: 0.75,
                knowledge_confidence: 1.0,
                memory_decay: 1.0,
                min_call_turn: 3,
                call_margin: 2.0,
                turn_ceiling: 120,
                deterministic: false,
            },
        }
    }

    pub fn from_env(difficulty: Difficulty) -> Self {
        Self::from_reader(difficulty, |key| std::env::var(key).ok())
    }

    pub(crate) fn from_reader<F>(difficulty: Difficulty, mut read: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let base = Self::for_difficulty(difficulty);
        let max_iterations = read("CASCADE_SEARCH_ITERATIONS")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(base.max_iterations);
        let time_budget_ms = read("CASCADE_SEARCH_TIME_MS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(base.time_budget_ms);
        let rollout_depth = read("CASCADE_SEARCH_ROLLOUT_DEPTH")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(base.rollout_depth);
        let exploration = read("CASCADE_SEARCH_EXPLORATION")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value >= 0.0)
            .unwrap_or(base.exploration);
        let min_call_turn = read("CASCADE_MIN_CALL_TURN")
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .unwrap_or(base.min_call_turn);
        let deterministic = read("CASCADE_SEARCH_DETERMINISTIC")
            .map(|raw| matches!(raw.trim(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(base.deterministic);
        Self {
            max_iterations,
            time_budget_ms,
            rollout_depth,
            exploration,
            min_call_turn,
            deterministic,
            ..base
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations.max(1);
        self
    }

    pub fn with_time_budget_ms(mut self, millis: u64) -> Self {
        self.time_budget_ms = millis;
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn with_min_call_turn(mut self, turn: u32) -> Self {
        self.min_call_turn = turn;
        self
    }
}
