//! Per-agent knowledge of hidden cards.
//!
//! This module is composed of:
//! - `pool`: rank multiset of the cards whose location is still unknown (`RankPool`).
//! - `store`: confidence-weighted card observations per agent and position (`BeliefStore`).

mod pool;
mod store;

pub use pool::{DEFAULT_RANK, RankPool};
pub use store::{AgentKnowledge, BeliefStore, KnownCard, TRUST_THRESHOLD};
