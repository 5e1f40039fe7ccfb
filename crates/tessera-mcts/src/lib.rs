//! Game-independent parallel Monte-Carlo tree search.
//!
//! The engine core behind the tessera polyomino players: a UCT search with
//! RAVE and the Last-Good-Reply heuristic, running worker threads lock-free
//! on one shared, memory-bounded node arena. Game rules plug in through the
//! [`SearchDomain`] / [`SimulationState`] traits; the search returns a move
//! and keeps its tree for reuse by the next search.

pub mod abort;
pub mod bias;
pub mod interval;
pub mod node;
mod pool;
pub mod reply;
pub mod search;
pub mod state;
pub mod stats;
pub mod timer;
pub mod tree;

#[cfg(test)]
pub(crate) mod test_util;

pub use abort::AbortFlag;
pub use bias::BiasTerm;
pub use interval::{IntervalChecker, TimeIntervalChecker};
pub use node::{Node, NodeIndex};
pub use search::{ReuseParam, Search, SearchConfig, SearchError, TreeRef};
pub use state::{GameMove, PlayerMove, SearchDomain, SimulationState};
pub use stats::{DirtyStatistics, ExtStatistics, Statistics};
pub use timer::{TimeSource, Timer, WallTimeSource};
pub use tree::{max_nodes_for_memory, ChildExpander, Children, Tree};
