use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;
use statrs::statistics::Statistics;
use thiserror::Error;

use crate::arena::GameOutcome;
use crate::config::BenchmarkConfig;
use cascade_bot::bot::Difficulty;

const CONFIDENCE_Z: f64 = 1.96; // 95% CI

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode summary: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-agent accumulation over a run.
pub struct AnalyticsCollector {
    run_id: String,
    agents: HashMap<String, AgentAccumulator>,
    agent_order: Vec<String>,
    reasons: BTreeMap<String, usize>,
    games: usize,
    total_turns: u64,
}

impl AnalyticsCollector {
    pub fn new(config: &BenchmarkConfig) -> Self {
        let mut agents = HashMap::new();
        let mut order = Vec::new();
        for agent in &config.agents {
            if agents.contains_key(&agent.name) {
                continue;
            }
            agents.insert(
                agent.name.clone(),
                AgentAccumulator::new(agent.name.clone(), agent.difficulty),
            );
            order.push(agent.name.clone());
        }
        Self {
            run_id: config.run_id.clone(),
            agents,
            agent_order: order,
            reasons: BTreeMap::new(),
            games: 0,
            total_turns: 0,
        }
    }

    pub fn record_game(&mut self, outcome: &GameOutcome) {
        self.games += 1;
        self.total_turns += u64::from(outcome.turns);
        let reason = outcome
            .reason
            .and_then(|reason| serde_json::to_value(reason).ok())
            .and_then(|value| value.as_str().map(str::to_owned))
            .unwrap_or_else(|| "unfinished".to_string());
        *self.reasons.entry(reason).or_default() += 1;

        for (seat, name) in outcome.seating.iter().enumerate() {
            let Some(acc) = self.agents.get_mut(name) else {
                continue;
            };
            let metrics = outcome.metrics.get(seat).copied().unwrap_or_default();
            acc.games += 1;
            acc.scores
                .push(f64::from(outcome.scores.get(seat).copied().unwrap_or(0)));
            acc.cards_left += outcome.cards_left.get(seat).copied().unwrap_or(0);
            acc.total_ms += metrics.total_ms;
            acc.decisions += metrics.decisions;
            let won = outcome.winner == Some(seat);
            if won {
                acc.wins += 1;
            }
            if outcome.caller == Some(seat) {
                acc.calls += 1;
                if won {
                    acc.calls_won += 1;
                }
            }
        }
    }

    pub fn finalize(mut self) -> BenchSummary {
        let agents = self
            .agent_order
            .iter()
            .filter_map(|name| self.agents.remove(name))
            .map(AgentAccumulator::into_report)
            .collect();
        let avg_turns = if self.games == 0 {
            0.0
        } else {
            self.total_turns as f64 / self.games as f64
        };
        BenchSummary {
            run_id: self.run_id,
            games: self.games,
            avg_turns,
            reasons: self.reasons,
            agents,
        }
    }
}

struct AgentAccumulator {
    name: String,
    difficulty: Difficulty,
    games: usize,
    wins: usize,
    calls: usize,
    calls_won: usize,
    scores: Vec<f64>,
    cards_left: usize,
    total_ms: f64,
    decisions: usize,
}

impl AgentAccumulator {
    fn new(name: String, difficulty: Difficulty) -> Self {
        Self {
            name,
            difficulty,
            games: 0,
            wins: 0,
            calls: 0,
            calls_won: 0,
            scores: Vec::new(),
            cards_left: 0,
            total_ms: 0.0,
            decisions: 0,
        }
    }

    fn into_report(self) -> AgentReport {
        let (mean_score, stddev_score) = spread(&self.scores);
        let margin = if self.scores.len() < 2 {
            0.0
        } else {
            CONFIDENCE_Z * stddev_score / (self.scores.len() as f64).sqrt()
        };
        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

        AgentReport {
            name: self.name,
            difficulty: self.difficulty,
            games: self.games,
            wins: self.wins,
            win_rate: ratio(self.wins, self.games),
            mean_score,
            stddev_score,
            ci95: (mean_score - margin, mean_score + margin),
            avg_cards_left: ratio(self.cards_left, self.games),
            calls: self.calls,
            call_success: ratio(self.calls_won, self.calls),
            decisions: self.decisions,
            average_ms_per_decision: if self.decisions == 0 {
                0.0
            } else {
                self.total_ms / self.decisions as f64
            },
        }
    }
}

/// Sample mean and standard deviation; zero spread below two samples.
fn spread(values: &[f64]) -> (f64, f64) {
    match values.len() {
        0 => (0.0, 0.0),
        1 => (values[0], 0.0),
        _ => (values.mean(), values.std_dev()),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub name: String,
    pub difficulty: Difficulty,
    pub games: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub mean_score: f64,
    pub stddev_score: f64,
    pub ci95: (f64, f64),
    pub avg_cards_left: f64,
    pub calls: usize,
    pub call_success: f64,
    pub decisions: usize,
    pub average_ms_per_decision: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchSummary {
    pub run_id: String,
    pub games: usize,
    pub avg_turns: f64,
    /// Games per terminal reason.
    pub reasons: BTreeMap<String, usize>,
    pub agents: Vec<AgentReport>,
}

impl BenchSummary {
    pub fn agent(&self, name: &str) -> Option<&AgentReport> {
        self.agents.iter().find(|report| report.name == name)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        let file = File::create(path.as_ref()).map_err(|source| AnalyticsError::Io {
            context: "writing summary json",
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
