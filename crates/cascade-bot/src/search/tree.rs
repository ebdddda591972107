use cascade_core::model::agent::AgentId;
use cascade_core::model::moves::Move;
use cascade_core::state::SearchState;
use std::collections::HashSet;

pub type NodeId = usize;

pub const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
pub struct Node {
    /// Move that led here; `None` at the root.
    pub mv: Option<Move>,
    /// Agent that chose `mv`.
    pub chooser: AgentId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub visits: u32,
    pub reward: f64,
    pub untried: Vec<Move>,
    /// Snapshot from the determinization that first expanded this node.
    pub state: SearchState,
    seen: HashSet<Move>,
}

impl Node {
    pub fn mean(&self) -> f64 {
        if self.visits == 0 {
            0.0
        } else {
            self.reward / f64::from(self.visits)
        }
    }
}

/// Index arena holding one search tree.
#[derive(Debug, Clone)]
pub struct SearchTree {
    nodes: Vec<Node>,
}

impl SearchTree {
    pub fn new(root: SearchState, moves: Vec<Move>) -> Self {
        let chooser = root.mover();
        let mut tree = Self {
            nodes: Vec::with_capacity(256),
        };
        tree.nodes.push(Node {
            mv: None,
            chooser,
            parent: None,
            children: Vec::new(),
            visits: 0,
            reward: 0.0,
            untried: Vec::new(),
            state: root,
            seen: HashSet::new(),
        });
        tree.register_moves(ROOT, moves);
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Adds moves not seen at this node before (new in this determinization).
    pub fn register_moves<I>(&mut self, id: NodeId, moves: I)
    where
        I: IntoIterator<Item = Move>,
    {
        let node = &mut self.nodes[id];
        for mv in moves {
            if node.seen.insert(mv.clone()) {
                node.untried.push(mv);
            }
        }
    }

    pub fn add_child(
        &mut self,
        parent: NodeId,
        mv: Move,
        chooser: AgentId,
        state: SearchState,
    ) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            mv: Some(mv),
            chooser,
            parent: Some(parent),
            children: Vec::new(),
            visits: 0,
            reward: 0.0,
            untried: Vec::new(),
            state,
            seen: HashSet::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// UCB1 over the children whose move passes `available`.
    pub fn select_child<F>(&self, id: NodeId, exploration: f64, available: F) -> Option<NodeId>
    where
        F: Fn(&Move) -> bool,
    {
        let parent_visits = f64::from(self.nodes[id].visits.max(1));
        let log_parent = parent_visits.ln();
        let mut best: Option<(NodeId, f64)> = None;
        for &child in &self.nodes[id].children {
            let node = &self.nodes[child];
            let Some(mv) = node.mv.as_ref() else {
                continue;
            };
            if !available(mv) {
                continue;
            }
            let score = if node.visits == 0 {
                f64::INFINITY
            } else {
                node.mean() + exploration * (log_parent / f64::from(node.visits)).sqrt()
            };
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((child, score));
            }
        }
        best.map(|(child, _)| child)
    }

    /// Adds `reward` (from `perspective`'s side) along the path to the root.
    /// Nodes chosen by the other side record the complement.
    pub fn backpropagate(&mut self, leaf: NodeId, reward: f64, perspective: AgentId) {
        let mut walk = Some(leaf);
        while let Some(id) = walk {
            let node = &mut self.nodes[id];
            let ally = node.state.same_side(node.chooser, perspective);
            node.visits += 1;
            node.reward += if ally { reward } else { 1.0 - reward };
            walk = node.parent;
        }
    }

    /// Children ordered by visits, then mean reward; equal entries keep
    /// generation order.
    pub fn ranked_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = self.nodes[id].children.clone();
        children.sort_by(|a, b| {
            let (a, b) = (&self.nodes[*a], &self.nodes[*b]);
            b.visits.cmp(&a.visits).then(b.mean().total_cmp(&a.mean()))
        });
        children
    }
}

#[cfg(test)]
mod tests {
    use super::{ROOT, SearchTree};
    use cascade_core::belief::BeliefStore;
    use cascade_core::model::agent::AgentId;
    use cascade_core::model::moves::Move;
    use cascade_core::state::{AgentBelief, SearchState};
    use std::sync::Arc;

    fn root() -> SearchState {
        let beliefs = Arc::new(BeliefStore::new(AgentId(0), 2));
        SearchState::new(beliefs, vec![AgentBelief::unknown(3); 2], AgentId(0))
    }

    #[test]
    fn register_moves_skips_duplicates() {
        let mut tree = SearchTree::new(root(), vec![Move::Draw, Move::TakeDiscard]);
        tree.register_moves(ROOT, vec![Move::Draw, Move::CallEndGame]);
        assert_eq!(
            tree.node(ROOT).untried,
            vec![Move::Draw, Move::TakeDiscard, Move::CallEndGame]
        );
    }

    #[test]
    fn backpropagation_walks_parent_links() {
        let mut tree = SearchTree::new(root(), vec![Move::Draw]);
        let child = tree.add_child(ROOT, Move::Draw, AgentId(0), root());
        let grandchild = tree.add_child(child, Move::DiscardDrawn, AgentId(0), root());
        tree.backpropagate(grandchild, 1.0, AgentId(0));
        assert_eq!(tree.node(ROOT).visits, 1);
        assert_eq!(tree.node(child).visits, 1);
        assert_eq!(tree.node(grandchild).reward, 1.0);
    }

    #[test]
    fn opponent_nodes_record_the_complement() {
        let mut tree = SearchTree::new(root(), vec![Move::Draw]);
        let theirs = tree.add_child(ROOT, Move::Draw, AgentId(1), root());
        tree.backpropagate(theirs, 0.8, AgentId(0));
        assert!((tree.node(theirs).reward - 0.2).abs() < 1e-9);
    }

    #[test]
    fn ranking_prefers_visits_then_mean_then_order() {
        let mut tree = SearchTree::new(root(), vec![]);
        let a = tree.add_child(ROOT, Move::Draw, AgentId(0), root());
        let b = tree.add_child(ROOT, Move::TakeDiscard, AgentId(0), root());
        let c = tree.add_child(ROOT, Move::CallEndGame, AgentId(0), root());
        for (id, visits, reward) in [(a, 3, 1.0), (b, 3, 2.0), (c, 3, 1.0)] {
            let node = tree.node_mut(id);
            node.visits = visits;
            node.reward = reward;
        }
        assert_eq!(tree.ranked_children(ROOT), vec![b, a, c]);
    }

    #[test]
    fn unvisited_children_are_selected_first() {
        let mut tree = SearchTree::new(root(), vec![]);
        let a = tree.add_child(ROOT, Move::Draw, AgentId(0), root());
        let b = tree.add_child(ROOT, Move::TakeDiscard, AgentId(0), root());
        tree.node_mut(ROOT).visits = 1;
        tree.node_mut(a).visits = 1;
        tree.node_mut(a).reward = 1.0;
        assert_eq!(tree.select_child(ROOT, 1.4, |_| true), Some(b));
        assert_eq!(tree.select_child(ROOT, 1.4, |m| *m == Move::Draw), Some(a));
    }
}
