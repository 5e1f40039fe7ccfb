use std::fmt;

use crate::tree::ChildExpander;

// ---------------------------------------------------------------------------
// GameMove — compact move identity
// ---------------------------------------------------------------------------

/// Move type usable by the search.
///
/// Moves must map to a dense integer id space `[0, RANGE)`. The search stores
/// moves in atomic node and reply-table slots by id, so the mapping has to be
/// invertible: `from_index(to_index(m)) == m` for every legal move.
pub trait GameMove: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Exclusive upper bound of the id space.
    const RANGE: usize;

    fn to_index(self) -> usize;

    /// Inverse of `to_index`. Only called with ids previously produced by
    /// `to_index`.
    fn from_index(index: usize) -> Self;
}

/// A move annotated with the player who played it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PlayerMove<M> {
    pub player: usize,
    pub mv: M,
}

// ---------------------------------------------------------------------------
// SimulationState — per-worker domain state
// ---------------------------------------------------------------------------

/// Game-specific state of one simulation.
///
/// Each worker thread owns exactly one instance, created through
/// [`SearchDomain::create_state`] when the threads are constructed. The search
/// drives it through one iteration at a time: in-tree descent
/// (`play_in_tree` / `finish_in_tree`), expansion (`gen_children` /
/// `play_expanded_child`), playout (`start_playout` /
/// `gen_and_play_playout_move`) and evaluation. The state records the full
/// move history of the current simulation; `nu_moves` / `get_move` expose it
/// for the RAVE and reply-table updates.
///
/// `P` is the maximum number of players the evaluation vector is sized for.
pub trait SimulationState<const P: usize>: Send {
    type Move: GameMove;

    /// Called once when a search starts, before any simulation.
    fn start_search(&mut self) {}

    /// Called at the beginning of each simulation with its global index.
    fn start_simulation(&mut self, index: usize);

    /// Generate the children of the current position.
    ///
    /// `init_value` is the current position-value estimate for the player to
    /// play, to be used for prior-knowledge initialization of child values.
    fn gen_children(
        &mut self,
        expander: &mut ChildExpander<'_, Self::Move>,
        init_value: f32,
    );

    /// Play a move during the in-tree phase.
    fn play_in_tree(&mut self, mv: Self::Move);

    /// Called when the in-tree phase ends, before a potential expansion.
    fn finish_in_tree(&mut self) {}

    /// Play the best child selected right after an expansion.
    fn play_expanded_child(&mut self, mv: Self::Move);

    fn start_playout(&mut self) {}

    /// Generate and play one playout move. Returns `false` to end the
    /// playout. The reply candidates come from the Last-Good-Reply table and
    /// may be ignored (e.g. if not legal in the current position).
    fn gen_and_play_playout_move(
        &mut self,
        reply_1: Option<Self::Move>,
        reply_2: Option<Self::Move>,
    ) -> bool;

    /// Evaluation of the finished playout, one value in `[0, 1]` per player.
    fn evaluate_playout(&mut self) -> [f32; P];

    /// Evaluation of a terminal in-tree position.
    fn evaluate_terminal(&mut self) -> [f32; P];

    /// Number of moves played in the current simulation (in-tree + playout).
    fn nu_moves(&self) -> usize;

    fn get_move(&self, index: usize) -> PlayerMove<Self::Move>;

    /// Player to play at the current position.
    fn to_play(&self) -> usize;

    /// Exclude a move from RAVE updates (e.g. forced or pass moves).
    fn skip_rave(&self, _mv: Self::Move) -> bool {
        false
    }

    /// Diagnostic dump of the state.
    fn dump(&self, _out: &mut dyn fmt::Write) -> fmt::Result {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SearchDomain — host side of the boundary
// ---------------------------------------------------------------------------

/// What the embedding game engine provides to the search.
///
/// The domain is queried once per search (root player, tie value, follow-up
/// relation); the per-simulation work goes through the [`SimulationState`]
/// instances it creates.
pub trait SearchDomain<const P: usize>: Send {
    type Move: GameMove;
    type State: SimulationState<P, Move = Self::Move> + 'static;

    /// Create the state used by one worker thread.
    fn create_state(&self) -> Self::State;

    /// String representation of a move, for diagnostics only. Not on the
    /// move type itself because rendering may need board context.
    fn move_string(&self, mv: Self::Move) -> String;

    /// Current number of players (at most `P`).
    fn nu_players(&self) -> usize;

    /// Player to play at the root of the search.
    fn to_play(&self) -> usize;

    /// Evaluation corresponding to a 50% outcome.
    fn tie_value(&self) -> f32;

    /// Report whether the current root position is a follow-up of the
    /// previous search's root, writing the connecting move sequence (empty if
    /// it is the same position). The default says "no".
    fn check_followup(&mut self, _sequence: &mut Vec<Self::Move>) -> bool {
        false
    }

    /// Expected simulations per second, used to size the abort-check interval
    /// in deterministic mode and to detect very short searches. Should err on
    /// the low side if the rate varies a lot.
    fn expected_sims_per_sec(&self) -> f64 {
        100.0
    }
}
