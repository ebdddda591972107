//! Determinized Monte Carlo tree search.
//!
//! - `determinize`: samples a concrete world from a belief-level state.
//! - `tree`: index arena of search nodes.
//! - `rollout`: prioritised playout policy.

mod determinize;
mod rollout;
mod tree;

pub use determinize::Determinizer;
pub use rollout::RolloutPolicy;
pub use tree::{Node, NodeId, ROOT, SearchTree};

use crate::bot::SearchConfig;
use crate::eval::Evaluator;
use cascade_core::model::agent::AgentId;
use cascade_core::model::moves::Move;
use cascade_core::state::SearchState;
use cascade_core::state::movegen::{is_legal, legal_moves};
use cascade_core::state::transition::apply;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{Level, event};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    pub iterations: usize,
    pub elapsed_ms: u64,
    pub tree_nodes: usize,
    pub root_children: usize,
    pub best_visits: u32,
    pub best_mean: f64,
    /// Descents cut short because no stored move fit the sampled world.
    pub mismatches: usize,
    pub determinize_fallbacks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootChoice {
    pub mv: Move,
    pub visits: u32,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best: Move,
    /// Most visited reply by the same agent after `best` (e.g. the target
    /// choice following a draw).
    pub follow_up: Option<Move>,
    /// Root moves in preference order.
    pub ranked: Vec<RootChoice>,
    pub stats: SearchStats,
}

impl SearchOutcome {
    fn pass() -> Self {
        Self {
            best: Move::Pass,
            follow_up: None,
            ranked: Vec::new(),
            stats: SearchStats::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MctsEngine {
    config: SearchConfig,
    evaluator: Evaluator,
    policy: RolloutPolicy,
}

impl MctsEngine {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            evaluator: Evaluator::default(),
            policy: RolloutPolicy::new(config.scout_bias),
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn search<R: Rng + ?Sized>(
        &self,
        root: &SearchState,
        perspective: AgentId,
        rng: &mut R,
    ) -> SearchOutcome {
        self.search_filtered(root, perspective, rng, |_| true)
    }

    /// Searches with root candidates restricted to moves passing `filter`.
    pub fn search_filtered<R, F>(
        &self,
        root: &SearchState,
        perspective: AgentId,
        rng: &mut R,
        filter: F,
    ) -> SearchOutcome
    where
        R: Rng + ?Sized,
        F: Fn(&Move) -> bool,
    {
        let candidates: Vec<Move> = legal_moves(root).into_iter().filter(|mv| filter(mv)).collect();
        if root.is_terminal() || candidates.is_empty() {
            return SearchOutcome::pass();
        }

        let started = Instant::now();
        let budget = Duration::from_millis(self.config.time_budget_ms);
        let mut tree = SearchTree::new(root.clone(), candidates.clone());
        let mut determinizer = Determinizer::new();
        let mut stats = SearchStats::default();

        while stats.iterations < self.config.max_iterations {
            if !self.config.deterministic && stats.iterations > 0 && started.elapsed() >= budget {
                break;
            }
            let world = determinizer.determinize(root, rng);
            let (leaf, sim, mismatch) = self.descend(&mut tree, world, &filter, rng);
            if mismatch {
                stats.mismatches += 1;
            }
            let end = self.policy.play(sim, self.config.rollout_depth, rng);
            let reward = f64::from(self.evaluator.evaluate(&end, perspective));
            tree.backpropagate(leaf, reward, perspective);
            stats.iterations += 1;
        }

        let ranked = rank_root(&tree, &candidates);
        let best = ranked
            .first()
            .map(|choice| choice.mv.clone())
            .unwrap_or(Move::Pass);
        let follow_up = follow_up(&tree, &best, perspective);

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        stats.tree_nodes = tree.len();
        stats.root_children = tree.node(ROOT).children.len();
        stats.determinize_fallbacks = determinizer.fallbacks();
        if let Some(choice) = ranked.first() {
            stats.best_visits = choice.visits;
            stats.best_mean = choice.mean;
        }
        log_search(perspective, &best, &stats);

        SearchOutcome {
            best,
            follow_up,
            ranked,
            stats,
        }
    }

    /// Selection and expansion on one sampled world. Returns the reached node,
    /// the world advanced to it, and whether descent stopped on a mismatch.
    fn descend<R, F>(
        &self,
        tree: &mut SearchTree,
        world: SearchState,
        root_filter: &F,
        rng: &mut R,
    ) -> (NodeId, SearchState, bool)
    where
        R: Rng + ?Sized,
        F: Fn(&Move) -> bool,
    {
        let mut node = ROOT;
        let mut sim = world;
        loop {
            if sim.is_terminal() {
                return (node, sim, false);
            }
            if node != ROOT {
                tree.register_moves(node, legal_moves(&sim));
            }
            let open: Vec<usize> = tree
                .node(node)
                .untried
                .iter()
                .enumerate()
                .filter(|(_, mv)| is_legal(&sim, mv) && (node != ROOT || root_filter(mv)))
                .map(|(index, _)| index)
                .collect();
            if !open.is_empty() {
                let pick = open[rng.gen_range(0..open.len())];
                let mv = tree.node_mut(node).untried.swap_remove(pick);
                let chooser = sim.mover();
                sim = apply(&sim, &mv);
                let child = tree.add_child(node, mv, chooser, sim.clone());
                return (child, sim, false);
            }
            let selected = tree.select_child(node, self.config.exploration, |mv| is_legal(&sim, mv));
            match selected {
                Some(child) => {
                    let Some(mv) = tree.node(child).mv.clone() else {
                        return (node, sim, true);
                    };
                    sim = apply(&sim, &mv);
                    node = child;
                }
                None => return (node, sim, true),
            }
        }
    }
}

/// Visited root children in preference order, then unexpanded candidates in
/// generation order.
fn rank_root(tree: &SearchTree, candidates: &[Move]) -> Vec<RootChoice> {
    let mut ranked: Vec<RootChoice> = tree
        .ranked_children(ROOT)
        .into_iter()
        .filter_map(|id| {
            let node = tree.node(id);
            node.mv.clone().map(|mv| RootChoice {
                mv,
                visits: node.visits,
                mean: node.mean(),
            })
        })
        .collect();
    for mv in candidates {
        if !ranked.iter().any(|choice| &choice.mv == mv) {
            ranked.push(RootChoice {
                mv: mv.clone(),
                visits: 0,
                mean: 0.0,
            });
        }
    }
    ranked
}

fn follow_up(tree: &SearchTree, best: &Move, perspective: AgentId) -> Option<Move> {
    let child = tree
        .node(ROOT)
        .children
        .iter()
        .copied()
        .find(|id| tree.node(*id).mv.as_ref() == Some(best))?;
    tree.ranked_children(child)
        .into_iter()
        .map(|id| tree.node(id))
        .find(|node| node.chooser == perspective && node.visits > 0)
        .and_then(|node| node.mv.clone())
}

fn log_search(perspective: AgentId, best: &Move, stats: &SearchStats) {
    if !tracing::enabled!(target: "cascade_bot::search", Level::DEBUG) {
        return;
    }
    event!(
        target: "cascade_bot::search",
        Level::DEBUG,
        agent = %perspective,
        chosen = %best,
        iterations = stats.iterations,
        elapsed_ms = stats.elapsed_ms,
        tree_nodes = stats.tree_nodes,
        best_visits = stats.best_visits,
        best_mean = stats.best_mean,
        mismatches = stats.mismatches,
    );
}

#[cfg(test)]
mod tests {
    use super::MctsEngine;
    use crate::bot::{Difficulty, SearchConfig};
    use cascade_core::belief::BeliefStore;
    use cascade_core::model::agent::AgentId;
    use cascade_core::model::card::Card;
    use cascade_core::model::moves::Move;
    use cascade_core::model::rank::Rank;
    use cascade_core::state::{AgentBelief, CardSource, PendingCard, SearchState, Slot};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use std::sync::Arc;

    fn config(iterations: usize) -> SearchConfig {
        SearchConfig::for_difficulty(Difficulty::Normal)
            .with_iterations(iterations)
            .with_deterministic(true)
    }

    fn root() -> SearchState {
        let mut store = BeliefStore::new(AgentId(0), 3);
        for seat in 0..3 {
            store.set_card_count(AgentId(seat), 4);
        }
        store.observe(Card::new(0, Rank::Nine), AgentId(0), 0);
        store.observe(Card::new(1, Rank::King), AgentId(0), 1);
        store.observe_discard(Card::new(2, Rank::Ace));
        SearchState::from_beliefs(Arc::new(store), AgentId(0))
            .with_discard(vec![Card::new(2, Rank::Ace)])
            .with_deck_remaining(30)
            .with_min_call_turn(4)
    }

    #[test]
    fn same_seed_same_choice() {
        let engine = MctsEngine::new(config(150));
        let mut a = SmallRng::seed_from_u64(21);
        let mut b = SmallRng::seed_from_u64(21);
        let left = engine.search(&root(), AgentId(0), &mut a);
        let right = engine.search(&root(), AgentId(0), &mut b);
        assert_eq!(left.best, right.best);
        assert_eq!(left.ranked, right.ranked);
        assert_eq!(left.stats.iterations, 150);
    }

    #[test]
    fn result_is_a_root_candidate() {
        let engine = MctsEngine::new(config(80));
        let mut rng = SmallRng::seed_from_u64(4);
        let outcome = engine.search(&root(), AgentId(0), &mut rng);
        assert!(matches!(outcome.best, Move::Draw | Move::TakeDiscard));
        let visits: u32 = outcome.ranked.iter().map(|c| c.visits).sum();
        assert_eq!(visits, 80);
    }

    #[test]
    fn terminal_root_passes() {
        let engine = MctsEngine::new(config(10));
        let beliefs = Arc::new(BeliefStore::new(AgentId(0), 2));
        let state = SearchState::new(
            beliefs,
            vec![AgentBelief::known(&[Card::new(0, Rank::Two)]), AgentBelief::unknown(2)],
            AgentId(0),
        )
        .with_deck_order(vec![Card::new(3, Rank::Two)]);
        let called = cascade_core::state::transition::apply(&state, &Move::CallEndGame);
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(engine.search(&called, AgentId(0), &mut rng).best, Move::Pass);
    }

    #[test]
    fn swaps_the_drawn_king_for_the_most_expensive_card() {
        let engine = MctsEngine::new(config(300));
        let hands = vec![
            AgentBelief::new(vec![
                Slot::known(Card::new(0, Rank::Nine)),
                Slot::known(Card::new(1, Rank::Two)),
            ]),
            AgentBelief::unknown(3),
        ];
        let state = SearchState::new(Arc::new(BeliefStore::new(AgentId(0), 2)), hands, AgentId(0))
            .with_deck_remaining(30)
            .with_discard(vec![Card::new(5, Rank::Four)])
            .with_pending(Some(PendingCard {
                card: Some(Card::new(9, Rank::King)),
                source: CardSource::Deck,
            }));
        let mut rng = SmallRng::seed_from_u64(8);
        let outcome = engine.search(&state, AgentId(0), &mut rng);
        assert_eq!(outcome.best, Move::SwapIntoHand { position: 0 });
    }
}
