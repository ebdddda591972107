pub mod bot;
pub mod coalition;
pub mod eval;
pub mod search;
