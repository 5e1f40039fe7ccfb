use crate::state::{GameMove, PlayerMove, SearchDomain, SimulationState};
use crate::tree::ChildExpander;

// ---------------------------------------------------------------------------
// ToyMove
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ToyMove(pub usize);

impl GameMove for ToyMove {
    const RANGE: usize = 64;

    fn to_index(self) -> usize {
        self.0
    }

    fn from_index(index: usize) -> Self {
        ToyMove(index)
    }
}

// ---------------------------------------------------------------------------
// OneShotDomain — two arms with fixed evaluations, no playout randomness
// ---------------------------------------------------------------------------

/// Single-player one-shot game: the root has two moves whose evaluations are
/// fixed, and every position after the first move is terminal.
pub struct OneShotDomain {
    pub evals: [f32; 2],
}

pub struct OneShotState {
    evals: [f32; 2],
    history: Vec<PlayerMove<ToyMove>>,
}

impl SearchDomain<1> for OneShotDomain {
    type Move = ToyMove;
    type State = OneShotState;

    fn create_state(&self) -> OneShotState {
        OneShotState {
            evals: self.evals,
            history: Vec::new(),
        }
    }

    fn move_string(&self, mv: ToyMove) -> String {
        format!("{mv:?}")
    }

    fn nu_players(&self) -> usize {
        1
    }

    fn to_play(&self) -> usize {
        0
    }

    fn tie_value(&self) -> f32 {
        0.5
    }
}

impl SimulationState<1> for OneShotState {
    type Move = ToyMove;

    fn start_simulation(&mut self, _index: usize) {
        self.history.clear();
    }

    fn gen_children(&mut self, expander: &mut ChildExpander<'_, ToyMove>, init_value: f32) {
        if self.history.is_empty() {
            expander.add_child(ToyMove(0), 0.0, init_value);
            expander.add_child(ToyMove(1), 0.0, init_value);
        }
    }

    fn play_in_tree(&mut self, mv: ToyMove) {
        self.history.push(PlayerMove { player: 0, mv });
    }

    fn play_expanded_child(&mut self, mv: ToyMove) {
        self.history.push(PlayerMove { player: 0, mv });
    }

    fn gen_and_play_playout_move(
        &mut self,
        _reply_1: Option<ToyMove>,
        _reply_2: Option<ToyMove>,
    ) -> bool {
        false
    }

    fn evaluate_playout(&mut self) -> [f32; 1] {
        [self.evals[self.history[0].mv.0]]
    }

    fn evaluate_terminal(&mut self) -> [f32; 1] {
        self.evaluate_playout()
    }

    fn nu_moves(&self) -> usize {
        self.history.len()
    }

    fn get_move(&self, index: usize) -> PlayerMove<ToyMove> {
        self.history[index]
    }

    fn to_play(&self) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// BranchDomain — uniform branching to a fixed depth, hash evaluations
// ---------------------------------------------------------------------------

/// Single-player game tree with `branching` moves per position down to
/// `depth` plies. Evaluations are a deterministic hash of the move history,
/// so searches are repeatable without any RNG.
#[derive(Clone, Copy)]
pub struct BranchDomain {
    pub branching: usize,
    pub depth: usize,
}

pub struct BranchState {
    branching: usize,
    depth: usize,
    history: Vec<PlayerMove<ToyMove>>,
}

impl SearchDomain<1> for BranchDomain {
    type Move = ToyMove;
    type State = BranchState;

    fn create_state(&self) -> BranchState {
        BranchState {
            branching: self.branching,
            depth: self.depth,
            history: Vec::new(),
        }
    }

    fn move_string(&self, mv: ToyMove) -> String {
        format!("{mv:?}")
    }

    fn nu_players(&self) -> usize {
        1
    }

    fn to_play(&self) -> usize {
        0
    }

    fn tie_value(&self) -> f32 {
        0.5
    }
}

impl BranchState {
    fn eval(&self) -> f32 {
        let mut hash = 0x9E37_79B9_7F4A_7C15u64;
        for mv in &self.history {
            hash = hash.wrapping_mul(0x100_0000_01B3) ^ mv.mv.0 as u64;
        }
        ((hash >> 16) % 1000) as f32 / 1000.0
    }
}

impl SimulationState<1> for BranchState {
    type Move = ToyMove;

    fn start_simulation(&mut self, _index: usize) {
        self.history.clear();
    }

    fn gen_children(&mut self, expander: &mut ChildExpander<'_, ToyMove>, init_value: f32) {
        if self.history.len() < self.depth {
            for i in 0..self.branching {
                expander.add_child(ToyMove(i), 0.0, init_value);
            }
        }
    }

    fn play_in_tree(&mut self, mv: ToyMove) {
        self.history.push(PlayerMove { player: 0, mv });
    }

    fn play_expanded_child(&mut self, mv: ToyMove) {
        self.history.push(PlayerMove { player: 0, mv });
    }

    fn gen_and_play_playout_move(
        &mut self,
        _reply_1: Option<ToyMove>,
        _reply_2: Option<ToyMove>,
    ) -> bool {
        false
    }

    fn evaluate_playout(&mut self) -> [f32; 1] {
        [self.eval()]
    }

    fn evaluate_terminal(&mut self) -> [f32; 1] {
        [self.eval()]
    }

    fn nu_moves(&self) -> usize {
        self.history.len()
    }

    fn get_move(&self, index: usize) -> PlayerMove<ToyMove> {
        self.history[index]
    }

    fn to_play(&self) -> usize {
        0
    }
}

// ---------------------------------------------------------------------------
// FollowupDomain — BranchDomain that can declare a follow-up position
// ---------------------------------------------------------------------------

pub struct FollowupDomain {
    pub inner: BranchDomain,
    pub followup: Option<Vec<ToyMove>>,
}

impl SearchDomain<1> for FollowupDomain {
    type Move = ToyMove;
    type State = BranchState;

    fn create_state(&self) -> BranchState {
        self.inner.create_state()
    }

    fn move_string(&self, mv: ToyMove) -> String {
        self.inner.move_string(mv)
    }

    fn nu_players(&self) -> usize {
        1
    }

    fn to_play(&self) -> usize {
        0
    }

    fn tie_value(&self) -> f32 {
        0.5
    }

    fn check_followup(&mut self, sequence: &mut Vec<ToyMove>) -> bool {
        match &self.followup {
            Some(moves) => {
                sequence.extend(moves.iter().copied());
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// TwoPlayerDomain — alternating players over a branching tree
// ---------------------------------------------------------------------------

/// Two players alternating moves over a `BranchDomain`-style tree. Player 0
/// gets the hash evaluation, player 1 its complement.
#[derive(Clone, Copy)]
pub struct TwoPlayerDomain {
    pub branching: usize,
    pub depth: usize,
}

pub struct TwoPlayerState {
    branching: usize,
    depth: usize,
    history: Vec<PlayerMove<ToyMove>>,
}

impl SearchDomain<2> for TwoPlayerDomain {
    type Move = ToyMove;
    type State = TwoPlayerState;

    fn create_state(&self) -> TwoPlayerState {
        TwoPlayerState {
            branching: self.branching,
            depth: self.depth,
            history: Vec::new(),
        }
    }

    fn move_string(&self, mv: ToyMove) -> String {
        format!("{mv:?}")
    }

    fn nu_players(&self) -> usize {
        2
    }

    fn to_play(&self) -> usize {
        0
    }

    fn tie_value(&self) -> f32 {
        0.5
    }
}

impl TwoPlayerState {
    fn eval(&self) -> f32 {
        let mut hash = 0x9E37_79B9_7F4A_7C15u64;
        for mv in &self.history {
            hash = hash.wrapping_mul(0x100_0000_01B3) ^ mv.mv.0 as u64;
        }
        ((hash >> 16) % 1000) as f32 / 1000.0
    }

    fn push(&mut self, mv: ToyMove) {
        let player = self.history.len() % 2;
        self.history.push(PlayerMove { player, mv });
    }
}

impl SimulationState<2> for TwoPlayerState {
    type Move = ToyMove;

    fn start_simulation(&mut self, _index: usize) {
        self.history.clear();
    }

    fn gen_children(&mut self, expander: &mut ChildExpander<'_, ToyMove>, init_value: f32) {
        if self.history.len() < self.depth {
            for i in 0..self.branching {
                expander.add_child(ToyMove(i), 0.0, init_value);
            }
        }
    }

    fn play_in_tree(&mut self, mv: ToyMove) {
        self.push(mv);
    }

    fn play_expanded_child(&mut self, mv: ToyMove) {
        self.push(mv);
    }

    fn gen_and_play_playout_move(
        &mut self,
        reply_1: Option<ToyMove>,
        reply_2: Option<ToyMove>,
    ) -> bool {
        // Short playout tail: play a reply candidate if offered, otherwise a
        // move derived from the history, until two extra plies were added.
        if self.history.len() >= self.depth + 2 {
            return false;
        }
        let mv = reply_1
            .or(reply_2)
            .unwrap_or(ToyMove(self.history.len() % 7));
        self.push(mv);
        true
    }

    fn evaluate_playout(&mut self) -> [f32; 2] {
        let v = self.eval();
        [v, 1.0 - v]
    }

    fn evaluate_terminal(&mut self) -> [f32; 2] {
        self.evaluate_playout()
    }

    fn nu_moves(&self) -> usize {
        self.history.len()
    }

    fn get_move(&self, index: usize) -> PlayerMove<ToyMove> {
        self.history[index]
    }

    fn to_play(&self) -> usize {
        self.history.len() % 2
    }
}

// ---------------------------------------------------------------------------
// RaveDomain — isomorphic arms, one move is the winner's tell
// ---------------------------------------------------------------------------

/// Two root arms with identical value statistics: simulations alternate
/// between wins and losses regardless of the arm. Every winning playout
/// plays `ToyMove(0)` (a root move), every losing one plays junk, so RAVE
/// credits arm 0 with all wins while plain UCT sees no difference.
pub struct RaveDomain;

pub struct RaveState {
    history: Vec<PlayerMove<ToyMove>>,
    win: bool,
    playout_done: bool,
}

impl SearchDomain<1> for RaveDomain {
    type Move = ToyMove;
    type State = RaveState;

    fn create_state(&self) -> RaveState {
        RaveState {
            history: Vec::new(),
            win: false,
            playout_done: false,
        }
    }

    fn move_string(&self, mv: ToyMove) -> String {
        format!("{mv:?}")
    }

    fn nu_players(&self) -> usize {
        1
    }

    fn to_play(&self) -> usize {
        0
    }

    fn tie_value(&self) -> f32 {
        0.5
    }
}

impl SimulationState<1> for RaveState {
    type Move = ToyMove;

    fn start_simulation(&mut self, index: usize) {
        self.history.clear();
        self.win = index % 2 == 0;
        self.playout_done = false;
    }

    fn gen_children(&mut self, expander: &mut ChildExpander<'_, ToyMove>, init_value: f32) {
        if self.history.is_empty() {
            expander.add_child(ToyMove(0), 0.0, init_value);
            expander.add_child(ToyMove(1), 0.0, init_value);
        }
    }

    fn play_in_tree(&mut self, mv: ToyMove) {
        self.history.push(PlayerMove { player: 0, mv });
    }

    fn play_expanded_child(&mut self, mv: ToyMove) {
        self.history.push(PlayerMove { player: 0, mv });
    }

    fn gen_and_play_playout_move(
        &mut self,
        _reply_1: Option<ToyMove>,
        _reply_2: Option<ToyMove>,
    ) -> bool {
        if self.playout_done {
            return false;
        }
        self.playout_done = true;
        let mv = if self.win { ToyMove(0) } else { ToyMove(9) };
        self.history.push(PlayerMove { player: 0, mv });
        true
    }

    fn evaluate_playout(&mut self) -> [f32; 1] {
        [if self.win { 1.0 } else { 0.0 }]
    }

    fn evaluate_terminal(&mut self) -> [f32; 1] {
        self.evaluate_playout()
    }

    fn nu_moves(&self) -> usize {
        self.history.len()
    }

    fn get_move(&self, index: usize) -> PlayerMove<ToyMove> {
        self.history[index]
    }

    fn to_play(&self) -> usize {
        0
    }
}
