use core::fmt;
use serde::{Deserialize, Serialize};

/// Seat identifier; seats act in increasing order and wrap around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u8);

impl AgentId {
    pub const MAX_TABLE: usize = 8;

    pub const fn new(seat: u8) -> Self {
        Self(seat)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn next(self, table_size: usize) -> AgentId {
        if table_size == 0 {
            return self;
        }
        AgentId(((self.index() + 1) % table_size) as u8)
    }

    pub fn all(table_size: usize) -> impl Iterator<Item = AgentId> {
        (0..table_size.min(AgentId::MAX_TABLE)).map(|i| AgentId(i as u8))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent{}", self.0)
    }
}
