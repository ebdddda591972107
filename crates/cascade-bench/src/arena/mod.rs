//! Self-play referee: the core transition applied to the full deal, with
//! each seat deciding from its own masked view.

mod ledger;

pub use ledger::KnowledgeLedger;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cascade_bot::bot::{AgentSession, DecisionContext, ObservableSnapshot, SwapChoice};
use cascade_core::belief::BeliefStore;
use cascade_core::model::action::ActionKind;
use cascade_core::model::agent::AgentId;
use cascade_core::model::card::Card;
use cascade_core::model::deck::Deck;
use cascade_core::model::moves::Move;
use cascade_core::state::movegen::{is_legal, legal_moves};
use cascade_core::state::transition::{apply, open_endgame};
use cascade_core::state::{AgentBelief, CardSource, Phase, SearchState, Slot, TerminalReason};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use crate::analytics::{AnalyticsCollector, AnalyticsError, BenchSummary};
use crate::config::{AgentConfig, BenchmarkConfig, ResolvedOutputs};

/// Cards each seat looks at right after the deal.
const PEEKED_AT_DEAL: usize = 2;
/// Referee steps allowed per turn of the ceiling before a game counts as stalled.
const STEPS_PER_TURN: usize = 8;

/// Primary entry point for self-play runs.
pub struct ArenaRunner {
    config: BenchmarkConfig,
    outputs: ResolvedOutputs,
    logging_enabled: bool,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub games_played: usize,
    pub rows_written: usize,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
    pub summary: BenchSummary,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionMetrics {
    pub decisions: usize,
    pub total_ms: f64,
}

impl DecisionMetrics {
    fn record(&mut self, elapsed: Duration) -> f64 {
        let ms = elapsed.as_secs_f64() * 1_000.0;
        self.decisions += 1;
        self.total_ms += ms;
        ms
    }

    pub fn avg_ms(&self) -> f64 {
        if self.decisions == 0 {
            0.0
        } else {
            self.total_ms / self.decisions as f64
        }
    }
}

/// Result of one self-play game, indexed by seat.
#[derive(Debug, Clone)]
pub struct GameOutcome {
    pub seating: Vec<String>,
    pub winner: Option<usize>,
    pub reason: Option<TerminalReason>,
    pub caller: Option<usize>,
    pub turns: u32,
    pub scores: Vec<i32>,
    pub cards_left: Vec<usize>,
    pub metrics: Vec<DecisionMetrics>,
}

#[derive(Debug, Serialize)]
struct GameRow<'a> {
    run_id: &'a str,
    game_id: String,
    game_index: usize,
    game_seed: u64,
    seating: &'a [String],
    winner: Option<&'a str>,
    reason: Option<TerminalReason>,
    caller: Option<&'a str>,
    turns: u32,
    scores: &'a [i32],
    cards_left: &'a [usize],
    decisions: Vec<usize>,
    speed_ms_decision: Vec<f64>,
}

impl ArenaRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: BenchmarkConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        if config.agents.is_empty() {
            return Err(RunnerError::EmptyRoster);
        }
        Ok(Self {
            logging_enabled: config.logging.enable_structured,
            config,
            outputs,
        })
    }

    /// Plays every configured game, streaming one JSONL row per game.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        ensure_parent(self.outputs.jsonl.parent())?;
        ensure_parent(self.outputs.summary_json.parent())?;

        let mut writer = BufWriter::new(File::create(&self.outputs.jsonl)?);
        let mut rng = StdRng::seed_from_u64(self.config.games.seed.unwrap_or(0));
        let mut analytics = AnalyticsCollector::new(&self.config);
        let mut rows_written = 0usize;

        for game_index in 0..self.config.games.count {
            let game_seed = rng.next_u64();
            let outcome = self.play_game(game_index, game_seed)?;
            analytics.record_game(&outcome);
            write_row(&mut writer, &self.config.run_id, game_index, game_seed, &outcome)?;
            rows_written += 1;
        }
        writer.flush()?;

        let summary = analytics.finalize();
        summary.write_json(&self.outputs.summary_json)?;

        Ok(RunSummary {
            games_played: self.config.games.count,
            rows_written,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_json.clone(),
            summary,
        })
    }

    fn play_game(&self, game_index: usize, game_seed: u64) -> Result<GameOutcome, RunnerError> {
        let games = &self.config.games;
        let table = games.agents_per_table;
        let seating: Vec<&AgentConfig> = (0..table)
            .map(|seat| &self.config.agents[(game_index + seat) % self.config.agents.len()])
            .collect();
        let starter = AgentId((game_index % table) as u8);

        let mut truth = deal(game_seed, table, games.hand_size, games.max_turns, starter);
        let mut ledger = KnowledgeLedger::deal(&truth, PEEKED_AT_DEAL);
        let mut sessions: Vec<AgentSession> = seating
            .iter()
            .enumerate()
            .map(|(seat, agent)| {
                AgentSession::with_config(
                    AgentId(seat as u8),
                    table,
                    agent.difficulty,
                    agent.search_config(),
                    seat_seed(game_seed, seat),
                )
            })
            .collect();
        let mut metrics = vec![DecisionMetrics::default(); table];
        let limit = games.max_turns as usize * STEPS_PER_TURN;
        let mut steps = 0usize;

        while !truth.is_terminal() {
            if steps >= limit {
                return Err(RunnerError::Stalled {
                    game: game_index,
                    steps,
                });
            }
            steps += 1;

            ledger.mark_owner_knowledge(&mut truth);
            let mover = truth.mover();
            let session = sessions
                .get_mut(mover.index())
                .ok_or(RunnerError::UnknownSeat { seat: mover.index() })?;
            let started = Instant::now();
            let chosen = choose_move(session, &truth, &ledger);
            let elapsed_ms = metrics[mover.index()].record(started.elapsed());

            let mv = if is_legal(&truth, &chosen) {
                chosen
            } else {
                event!(
                    target: "cascade_bench::arena",
                    Level::WARN,
                    run_id = %self.config.run_id,
                    game_index,
                    mover = %mover,
                    rejected = %chosen,
                );
                legal_moves(&truth).into_iter().next().unwrap_or(Move::Pass)
            };

            if self.logging_enabled && tracing::enabled!(target: "cascade_bench::arena", Level::INFO) {
                event!(
                    target: "cascade_bench::arena",
                    Level::INFO,
                    run_id = %self.config.run_id,
                    game_index,
                    turn = truth.turn(),
                    mover = %mover,
                    agent = %seating[mover.index()].name,
                    mv = %mv,
                    elapsed_ms,
                );
            }

            let turn = truth.turn();
            let next = if mv == Move::CallEndGame {
                open_endgame(&truth)
            } else {
                apply(&truth, &mv)
            };
            ledger.record(&truth, &mv, &next);
            truth = next;
            if truth.turn() != turn {
                for session in &mut sessions {
                    session.observe_turn_end();
                }
            }
        }

        let seating_names: Vec<String> = seating.iter().map(|agent| agent.name.clone()).collect();
        let scores = truth
            .agents()
            .iter()
            .map(|belief| belief.concrete_score().unwrap_or(0))
            .collect();
        let cards_left = truth.agents().iter().map(AgentBelief::card_count).collect();

        Ok(GameOutcome {
            seating: seating_names,
            winner: truth.winner().map(AgentId::index),
            reason: truth.terminal_reason(),
            caller: truth.caller().map(AgentId::index),
            turns: truth.turn(),
            scores,
            cards_left,
            metrics,
        })
    }
}

fn deal(seed: u64, table: usize, hand_size: usize, max_turns: u32, starter: AgentId) -> SearchState {
    let mut deck = Deck::shuffled_with_seed(seed);
    let mut hands: Vec<Vec<Slot>> = vec![Vec::with_capacity(hand_size); table];
    for _ in 0..hand_size {
        for hand in &mut hands {
            if let Some(card) = deck.draw() {
                hand.push(Slot::hidden(card));
            }
        }
    }
    let opening: Vec<Card> = deck.draw().into_iter().collect();
    let agents = hands.into_iter().map(AgentBelief::new).collect();
    SearchState::new(Arc::new(BeliefStore::new(starter, table)), agents, starter)
        .with_discard(opening)
        .with_deck_order(deck.into_cards())
        .with_turn_ceiling(max_turns)
}

fn seat_seed(game_seed: u64, seat: usize) -> u64 {
    game_seed ^ (seat as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// What the rules engine would show the mover.
fn observe(truth: &SearchState) -> ObservableSnapshot {
    ObservableSnapshot {
        card_counts: truth.agents().iter().map(AgentBelief::card_count).collect(),
        discard_top: truth.discard_top(),
        declared_top: truth.declared_top(),
        discard_history: truth.discard_history().to_vec(),
        deck_remaining: truth.deck_remaining(),
        mover: truth.mover(),
        caller: truth.caller(),
        coalition_leader: truth.coalition_leader(),
        turn: truth.turn(),
        pending: truth.pending(),
        cascade_ranks: if truth.phase() == Phase::CascadeWindow {
            truth.active_ranks().to_vec()
        } else {
            Vec::new()
        },
    }
}

fn coalition_hands(truth: &SearchState) -> Option<BTreeMap<AgentId, Vec<Card>>> {
    let caller = truth.caller()?;
    Some(
        truth
            .agents()
            .iter()
            .enumerate()
            .map(|(index, belief)| (AgentId(index as u8), belief))
            .filter(|(agent, _)| *agent != caller)
            .map(|(agent, belief)| {
                (
                    agent,
                    belief.slots.iter().filter_map(|slot| slot.card).collect(),
                )
            })
            .collect(),
    )
}

fn choose_move(session: &mut AgentSession, truth: &SearchState, ledger: &KnowledgeLedger) -> Move {
    let mover = truth.mover();
    let snapshot = observe(truth);
    let knowledge = ledger.knowledge_for(mover, truth);
    let hands = coalition_hands(truth);
    let mut ctx = DecisionContext::new(mover, &snapshot, &knowledge, session.difficulty());
    if let Some(hands) = hands.as_ref() {
        ctx = ctx.with_coalition_hands(hands);
    }

    match truth.phase() {
        Phase::TurnStart => {
            if session.should_call_end_game(&ctx) {
                return Move::CallEndGame;
            }
            let decision = session.decide_turn_action(&ctx);
            let can_draw = truth.deck_remaining() > 0;
            let can_take = truth.discard_top().is_some();
            match decision.source {
                CardSource::Discard if can_take => Move::TakeDiscard,
                _ if can_draw => Move::Draw,
                _ if can_take => Move::TakeDiscard,
                _ => Move::Pass,
            }
        }
        Phase::PostDraw => resolve_pending(session, truth, &ctx),
        Phase::CascadeWindow => {
            let ranks = truth.active_ranks().to_vec();
            if !session.should_participate_in_cascade(&ranks, &ctx) {
                return Move::Pass;
            }
            let positions: Vec<usize> = truth
                .agent(mover)
                .map(|belief| {
                    ranks
                        .iter()
                        .flat_map(|rank| belief.trusted_positions(*rank))
                        .collect()
                })
                .unwrap_or_default();
            if positions.is_empty() {
                Move::Pass
            } else {
                Move::CascadeIn { positions }
            }
        }
        Phase::Finished => Move::Pass,
    }
}

fn resolve_pending(session: &mut AgentSession, truth: &SearchState, ctx: &DecisionContext<'_>) -> Move {
    let Some(card) = truth.pending().and_then(|p| p.card) else {
        return Move::DiscardDrawn;
    };
    if card.has_action() && session.should_use_action(card, ctx) {
        let chosen = session.select_action_targets(ctx);
        if !chosen.targets.is_empty() {
            let mut targets = chosen.targets;
            let mut swap = chosen.swap;
            let mut declared = chosen.declared;
            let kind = card.action();
            if kind == Some(ActionKind::Declare) && declared.is_none() {
                declared = Some(session.select_declaration(ctx));
            }
            if kind == Some(ActionKind::Scout) && targets.len() == 2 {
                let peeked = truth.slot(targets[0]).and_then(|slot| slot.card);
                swap = peeked.is_some_and(|peeked| session.should_swap_after_peek(peeked, ctx));
                if !swap {
                    targets.truncate(1);
                }
            }
            return Move::UseAction {
                targets,
                swap,
                declared,
            };
        }
    }
    match session.select_best_swap_position(card, ctx) {
        SwapChoice::Position(position) => Move::SwapIntoHand { position },
        SwapChoice::Discard => Move::DiscardDrawn,
    }
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn write_row(
    writer: &mut BufWriter<File>,
    run_id: &str,
    game_index: usize,
    game_seed: u64,
    outcome: &GameOutcome,
) -> Result<(), RunnerError> {
    let name = |seat: usize| outcome.seating.get(seat).map(String::as_str);
    let row = GameRow {
        run_id,
        game_id: format!("G{game_index:05}"),
        game_index,
        game_seed,
        seating: &outcome.seating,
        winner: outcome.winner.and_then(name),
        reason: outcome.reason,
        caller: outcome.caller.and_then(name),
        turns: outcome.turns,
        scores: &outcome.scores,
        cards_left: &outcome.cards_left,
        decisions: outcome.metrics.iter().map(|m| m.decisions).collect(),
        speed_ms_decision: outcome.metrics.iter().map(DecisionMetrics::avg_ms).collect(),
    };
    serde_json::to_writer(&mut *writer, &row)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Analytics(#[from] AnalyticsError),
    #[error("no agents configured")]
    EmptyRoster,
    #[error("referee produced seat {seat} outside the table")]
    UnknownSeat { seat: usize },
    #[error("game {game} did not finish within {steps} referee steps")]
    Stalled { game: usize, steps: usize },
}
