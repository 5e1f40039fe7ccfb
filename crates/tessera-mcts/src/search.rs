use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use thiserror::Error;
use tracing::{debug, info};

use crate::abort::AbortFlag;
use crate::bias::BiasTerm;
use crate::interval::{IntervalChecker, TimeIntervalChecker};
use crate::node::{Node, NodeIndex};
use crate::pool::WorkerPool;
use crate::reply::LastGoodReply;
use crate::state::{GameMove, SearchDomain, SimulationState};
use crate::stats::{DirtyStatistics, ExtStatistics};
use crate::timer::{TimeSource, Timer};
use crate::tree::{max_nodes_for_memory, ChildDesc, ChildExpander, Expansion, Tree};

/// Largest count the f32 statistics can increment without rounding away.
/// Approaching it terminates the search with the current best move.
pub(crate) const MAX_FLOAT_COUNT: f32 = ((1u32 << f32::MANTISSA_DIGITS) - 1) as f32;

// ---------------------------------------------------------------------------
// SearchConfig / ReuseParam
// ---------------------------------------------------------------------------

/// Search parameters. Immutable during a search; changing the
/// reuse-relevant subset between searches disables tree reuse.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchConfig {
    /// Worker threads, controller included. The default is
    /// `min(available_parallelism, 8)`.
    pub nu_threads: usize,
    /// Memory budget in bytes for both arenas together.
    pub tree_memory: usize,
    /// Minimum visit count before a leaf's children are materialized.
    pub expand_threshold: f32,
    /// Constant of the UCT exploration term.
    pub bias_term_constant: f32,
    /// Reuse the previous subtree when the root is a follow-up position.
    pub reuse_subtree: bool,
    /// Reuse the previous tree when the root is the same position.
    pub reuse_tree: bool,
    /// On memory exhaustion, prune low-count subtrees and continue. If
    /// disabled the search simply ends when the arena is full.
    pub prune_full_tree: bool,
    /// Initial prune threshold. Should be above typical count
    /// initializations if prior knowledge is used.
    pub prune_count_start: f32,
    pub rave: bool,
    /// Skip a RAVE update if another player played the same move first
    /// (useful where a repeated point means the position changed, e.g.
    /// after captures).
    pub rave_check_same: bool,
    /// Equivalence parameter of the RAVE weighting formula.
    pub rave_equivalence: f32,
    /// Weight RAVE updates linearly from 2 at the start of a simulation
    /// down to 1 at the end.
    pub weight_rave_updates: bool,
    /// Enable the Last-Good-Reply playout heuristic.
    pub last_good_reply: bool,
    /// Fix the abort-check interval so simulation counts do not depend on
    /// wall time. Full determinism additionally needs a single thread and a
    /// fixed domain seed.
    pub deterministic: bool,
}

fn default_nu_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            nu_threads: default_nu_threads(),
            tree_memory: 256_000_000,
            expand_threshold: 0.0,
            bias_term_constant: 0.7,
            reuse_subtree: true,
            reuse_tree: false,
            prune_full_tree: true,
            prune_count_start: 16.0,
            rave: false,
            rave_check_same: false,
            rave_equivalence: 1000.0,
            weight_rave_updates: true,
            last_good_reply: false,
            deterministic: false,
        }
    }
}

/// The subset of the parameters that must be unchanged between two searches
/// for the previous tree to remain meaningful.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReuseParam {
    rave: bool,
    weight_rave_updates: bool,
    rave_equivalence: f32,
}

impl ReuseParam {
    fn from_config(config: &SearchConfig) -> Self {
        Self {
            rave: config.rave,
            weight_rave_updates: config.weight_rave_updates,
            rave_equivalence: config.rave_equivalence,
        }
    }
}

// ---------------------------------------------------------------------------
// SearchError
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The root could not be expanded: terminal position, or the search was
    /// aborted before the first expansion.
    #[error("no move could be generated")]
    NoMove,
    /// Extraction of the reused subtree was interrupted and `always_search`
    /// was false.
    #[error("subtree reuse was aborted")]
    ReuseAborted,
}

// ---------------------------------------------------------------------------
// Shared search state
// ---------------------------------------------------------------------------

pub(crate) struct SearchTrees<M: GameMove> {
    pub tree: Tree<M>,
    pub tmp: Tree<M>,
}

/// State shared by all workers of one search.
///
/// The tree pair sits behind an `RwLock` that is taken once per round, not
/// per iteration: workers hold read guards for a whole search loop and the
/// controller only write-locks with every worker idle (clear, reuse swap,
/// prune). Everything else is atomics.
pub(crate) struct Shared<M: GameMove, const P: usize> {
    pub trees: RwLock<SearchTrees<M>>,
    pub root_val: [DirtyStatistics; P],
    pub init_val: [DirtyStatistics; P],
    pub reply: LastGoodReply<M, P>,
    pub nu_simulations: AtomicUsize,
    pub abort: AbortFlag,
}

/// Per-round parameter snapshot handed to every worker.
#[derive(Clone)]
pub(crate) struct RoundParams {
    pub config: SearchConfig,
    pub nu_players: usize,
    pub player: usize,
    pub max_count: f32,
    pub min_simulations: f32,
    pub max_time: f64,
    pub reuse_count: f32,
    pub search_start: f64,
    pub time_source: Arc<dyn TimeSource>,
    pub expected_sims_per_sec: f64,
    pub first_round: bool,
}

/// One start token for the pool workers.
pub(crate) struct Round<M: GameMove, const P: usize> {
    pub shared: Arc<Shared<M, P>>,
    pub params: RoundParams,
}

impl<M: GameMove, const P: usize> Clone for Round<M, P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            params: self.params.clone(),
        }
    }
}

pub(crate) struct WorkerReport {
    pub is_out_of_mem: bool,
}

// ---------------------------------------------------------------------------
// ThreadState — per-worker scratch
// ---------------------------------------------------------------------------

/// Worker-local state, reused across iterations and searches.
pub(crate) struct ThreadState<S: SimulationState<P>, const P: usize> {
    pub thread_id: usize,
    pub state: S,
    pub is_out_of_mem: bool,
    /// Nodes visited by the current simulation, root first.
    pub nodes: Vec<NodeIndex>,
    /// For each player and move id, the ply at which the move was first
    /// played in the current simulation (`u32::MAX` = not played). Reset on
    /// the way out of every RAVE update.
    pub first_play: [Vec<u32>; P],
    pub child_buf: Vec<ChildDesc<S::Move>>,
    pub stat_len: ExtStatistics,
    pub stat_in_tree_len: ExtStatistics,
}

impl<S: SimulationState<P>, const P: usize> ThreadState<S, P> {
    pub fn new(thread_id: usize, state: S) -> Self {
        Self {
            thread_id,
            state,
            is_out_of_mem: false,
            nodes: Vec::with_capacity(128),
            first_play: std::array::from_fn(|_| vec![u32::MAX; S::Move::RANGE]),
            child_buf: Vec::new(),
            stat_len: ExtStatistics::new(),
            stat_in_tree_len: ExtStatistics::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker round
// ---------------------------------------------------------------------------

/// Entry point of a pool worker for one round.
pub(crate) fn run_worker_round<S: SimulationState<P>, const P: usize>(
    thread_state: &mut ThreadState<S, P>,
    round: &Round<S::Move, P>,
) {
    if round.params.first_round {
        thread_state.state.start_search();
        thread_state.stat_len.clear();
        thread_state.stat_in_tree_len.clear();
    }
    let trees = round.shared.trees.read().expect("tree lock poisoned");
    search_loop(
        thread_state,
        &round.shared,
        &round.params,
        &trees.tree,
        None,
    );
}

// ---------------------------------------------------------------------------
// search_loop — one worker's simulations until an abort condition fires
// ---------------------------------------------------------------------------

fn search_loop<S: SimulationState<P>, const P: usize>(
    ts: &mut ThreadState<S, P>,
    shared: &Shared<S::Move, P>,
    params: &RoundParams,
    tree: &Tree<S::Move>,
    mut callback: Option<&mut (dyn FnMut(f64, f64) + 'static)>,
) {
    let time_interval = if params.max_count == 0.0 && params.max_time < 1.0 {
        0.1 * params.max_time
    } else {
        0.1
    };
    let mut expensive_abort_checker =
        IntervalChecker::new(Arc::clone(&params.time_source), time_interval);
    if params.config.deterministic {
        let interval = (params.expected_sims_per_sec / 5.0).max(1.0) as u32;
        expensive_abort_checker.set_deterministic(interval);
    }
    loop {
        ts.is_out_of_mem = false;
        let nu_simulations = shared.nu_simulations.fetch_add(1, Ordering::Relaxed);
        let root_count = tree.root().count();
        if root_count > 0.0
            && nu_simulations as f32 > params.min_simulations
            && (check_abort(ts.thread_id, params, tree)
                || expensive_abort_checker.check(|| {
                    check_abort_expensive(
                        ts.thread_id,
                        shared,
                        params,
                        tree,
                        callback.as_mut().map(|c| &mut **c),
                    )
                }))
        {
            break;
        }
        ts.nodes.clear();
        ts.nodes.push(NodeIndex::ROOT);
        ts.state.start_simulation(nu_simulations);
        let is_terminal = play_in_tree(ts, shared, params, tree);
        if ts.is_out_of_mem {
            return;
        }
        ts.stat_in_tree_len.add(ts.state.nu_moves() as f64);
        let eval = if is_terminal {
            ts.state.evaluate_terminal()
        } else {
            playout(ts, shared, params);
            ts.state.evaluate_playout()
        };
        ts.stat_len.add(ts.state.nu_moves() as f64);
        update_values(ts, shared, params, tree, &eval);
        if params.config.rave {
            update_rave_values(ts, params, tree, &eval);
        }
        if params.config.last_good_reply {
            update_last_good_reply(ts, shared, params, &eval);
        }
    }
}

/// Cheap abort conditions, checked every iteration.
fn check_abort<M: GameMove>(thread_id: usize, params: &RoundParams, tree: &Tree<M>) -> bool {
    let count = tree.root().count() + params.reuse_count;
    if count >= MAX_FLOAT_COUNT {
        debug!(thread_id, "maximum count representable in f32 reached");
        return true;
    }
    if params.max_count > 0.0 && count >= params.max_count {
        debug!(thread_id, "maximum count reached");
        return true;
    }
    false
}

/// Expensive abort conditions, sampled by the interval checker.
fn check_abort_expensive<M: GameMove, const P: usize>(
    thread_id: usize,
    shared: &Shared<M, P>,
    params: &RoundParams,
    tree: &Tree<M>,
    callback: Option<&mut (dyn FnMut(f64, f64) + 'static)>,
) -> bool {
    if shared.abort.get() {
        debug!(thread_id, "search aborted");
        return true;
    }
    let count = tree.root().count() + params.reuse_count;
    let time = params.time_source.now() - params.search_start;
    if !params.config.deterministic && time < 0.1 {
        // Simulations per second are too inaccurate this early.
        return false;
    }
    let sims_per_sec = if time == 0.0 {
        params.expected_sims_per_sec
    } else {
        shared.nu_simulations.load(Ordering::Relaxed) as f64 / time
    };
    let remaining_time;
    let mut remaining_simulations;
    if params.max_count == 0.0 {
        if time > params.max_time {
            debug!(thread_id, "maximum time reached");
            return true;
        }
        remaining_time = params.max_time - time;
        remaining_simulations = (remaining_time * sims_per_sec) as f32;
    } else {
        remaining_simulations = params.max_count - count;
        remaining_time = remaining_simulations as f64 / sims_per_sec;
    }
    if let Some(callback) = callback {
        callback(time, remaining_time);
    }
    if count + remaining_simulations > MAX_FLOAT_COUNT {
        remaining_simulations = MAX_FLOAT_COUNT - count;
    }
    if move_cannot_change(tree, count, remaining_simulations) {
        debug!(thread_id, "best move cannot change anymore");
        return true;
    }
    false
}

/// The best root child is settled once its lead over the runner-up exceeds
/// the simulations that can still happen.
pub(crate) fn move_cannot_change<M: GameMove>(
    tree: &Tree<M>,
    count: f32,
    remaining: f32,
) -> bool {
    if remaining > count {
        return false;
    }
    let mut max_count = 0.0f32;
    let mut second_max_count = 0.0f32;
    for child_index in tree.children(tree.root()) {
        let child_count = tree.node(child_index).count();
        if child_count > max_count {
            second_max_count = max_count;
            max_count = child_count;
        } else if child_count > second_max_count {
            second_max_count = child_count;
        }
    }
    max_count > second_max_count + remaining
}

// ---------------------------------------------------------------------------
// One simulation: selection, expansion, playout, backup
// ---------------------------------------------------------------------------

/// Descend from the root by the selection rule; expand the leaf if it passed
/// the threshold. Returns whether the simulation ended in a terminal
/// in-tree position.
fn play_in_tree<S: SimulationState<P>, const P: usize>(
    ts: &mut ThreadState<S, P>,
    shared: &Shared<S::Move, P>,
    params: &RoundParams,
    tree: &Tree<S::Move>,
) -> bool {
    let mut index = NodeIndex::ROOT;
    let mut is_terminal = false;
    while tree.node(index).has_children() {
        let child = select_child(tree, tree.node(index), &params.config);
        ts.nodes.push(child);
        ts.state.play_in_tree(tree.node_move(tree.node(child)));
        index = child;
    }
    ts.state.finish_in_tree();
    if tree.node(index).count() >= params.config.expand_threshold || index == NodeIndex::ROOT {
        let init_value = shared.init_val[ts.state.to_play()].mean();
        let mut expander = ChildExpander::new(&mut ts.child_buf);
        ts.state.gen_children(&mut expander, init_value);
        let best = expander.finish();
        match tree.expand(index, &ts.child_buf, best) {
            Expansion::Full => ts.is_out_of_mem = true,
            Expansion::Terminal => is_terminal = true,
            Expansion::Children(best_child) => {
                ts.nodes.push(best_child);
                ts.state
                    .play_expanded_child(tree.node_move(tree.node(best_child)));
            }
        }
    }
    is_terminal
}

/// UCT selection with RAVE mixing. The first child encountered wins ties.
fn select_child<M: GameMove>(tree: &Tree<M>, node: &Node, config: &SearchConfig) -> NodeIndex {
    debug_assert!(node.has_children());
    let node_count = node.count();
    let mut bias_term = BiasTerm::new(config.bias_term_constant);
    bias_term.start_iteration(node_count);
    let beta = if config.rave {
        (config.rave_equivalence / (3.0 * node_count + config.rave_equivalence)).sqrt()
    } else {
        0.0
    };
    let beta_inv = 1.0 - beta;
    let mut best_child = None;
    let mut best_value = f32::NEG_INFINITY;
    for child_index in tree.children(node) {
        let child = tree.node(child_index);
        let value = beta * child.rave_value()
            + beta_inv * child.value()
            + bias_term.get(child.count());
        if value > best_value {
            best_value = value;
            best_child = Some(child_index);
        }
    }
    best_child.expect("node has children")
}

/// Run the domain playout to the end of the simulation, feeding it reply
/// candidates when the heuristic is enabled.
fn playout<S: SimulationState<P>, const P: usize>(
    ts: &mut ThreadState<S, P>,
    shared: &Shared<S::Move, P>,
    params: &RoundParams,
) {
    ts.state.start_playout();
    loop {
        let mut reply_1 = None;
        let mut reply_2 = None;
        if params.config.last_good_reply {
            let nu_moves = ts.state.nu_moves();
            if nu_moves > 0 {
                let last = ts.state.get_move(nu_moves - 1).mv;
                let second_last = if nu_moves > 1 {
                    Some(ts.state.get_move(nu_moves - 2).mv)
                } else {
                    None
                };
                let (r1, r2) = shared
                    .reply
                    .get(ts.state.to_play(), last, second_last);
                reply_1 = r1;
                reply_2 = r2;
            }
        }
        if !ts.state.gen_and_play_playout_move(reply_1, reply_2) {
            break;
        }
    }
}

/// Back up the evaluation through the visited path. Each node gets the
/// evaluation of the player who was to move at its parent; the root gets
/// the root player's.
fn update_values<S: SimulationState<P>, const P: usize>(
    ts: &ThreadState<S, P>,
    shared: &Shared<S::Move, P>,
    params: &RoundParams,
    tree: &Tree<S::Move>,
    eval: &[f32; P],
) {
    tree.add_value(NodeIndex::ROOT, eval[params.player]);
    for i in 1..ts.nodes.len() {
        let mv = ts.state.get_move(i - 1);
        tree.add_value(ts.nodes[i], eval[mv.player]);
    }
    for i in 0..params.nu_players {
        shared.root_val[i].add(eval[i]);
        shared.init_val[i].add(eval[i]);
    }
}

/// RAVE backup over the in-tree path, using the per-player first-play
/// scratch. The scratch is reset on the way out.
fn update_rave_values<S: SimulationState<P>, const P: usize>(
    ts: &mut ThreadState<S, P>,
    params: &RoundParams,
    tree: &Tree<S::Move>,
    eval: &[f32; P],
) {
    let nu_moves = ts.state.nu_moves();
    if nu_moves == 0 {
        return;
    }
    let nu_nodes = ts.nodes.len();
    let mut i = nu_moves - 1;
    // Playout moves: record first-play indices only.
    while i >= nu_nodes {
        let mv = ts.state.get_move(i);
        if !ts.state.skip_rave(mv.mv) {
            ts.first_play[mv.player][mv.mv.to_index()] = i as u32;
        }
        i -= 1;
    }
    // In-tree moves: record and update the children of the node at ply i.
    loop {
        let mv = ts.state.get_move(i);
        if !ts.state.skip_rave(mv.mv) {
            ts.first_play[mv.player][mv.mv.to_index()] = i as u32;
        }
        update_rave_node(ts, params, tree, eval, i, mv.player);
        if i == 0 {
            break;
        }
        i -= 1;
    }
    for i in 0..nu_moves {
        let mv = ts.state.get_move(i);
        ts.first_play[mv.player][mv.mv.to_index()] = u32::MAX;
    }
}

fn update_rave_node<S: SimulationState<P>, const P: usize>(
    ts: &ThreadState<S, P>,
    params: &RoundParams,
    tree: &Tree<S::Move>,
    eval: &[f32; P],
    i: usize,
    player: usize,
) {
    let node = tree.node(ts.nodes[i]);
    if !node.has_children() {
        return;
    }
    let len = ts.state.nu_moves();
    let weight_factor = 1.0 / (len - i) as f32;
    for child_index in tree.children(node) {
        let child = tree.node(child_index);
        let m = child.move_index() as usize;
        let first = ts.first_play[player][m];
        if first == u32::MAX {
            continue;
        }
        debug_assert!(first as usize >= i);
        if params.config.rave_check_same {
            // Skip if any other player's first play of this move lies
            // between this node and the player's own first play.
            let mut other_played_same = false;
            for other in 0..params.nu_players {
                if other == player {
                    continue;
                }
                let first_other = ts.first_play[other][m];
                if first_other >= i as u32 && first_other <= first {
                    other_played_same = true;
                    break;
                }
            }
            if other_played_same {
                continue;
            }
        }
        let weight = if params.config.weight_rave_updates {
            // Decreases linearly from 2 at the start of the simulation to 1
            // at its end, proportional to the relative move distance.
            2.0 - (first as usize - i) as f32 * weight_factor
        } else {
            1.0
        };
        tree.add_rave_value(child_index, eval[player], weight);
    }
}

/// Reply-table update. Iterates backwards so that the first reply wins when
/// a key repeats within one simulation.
fn update_last_good_reply<S: SimulationState<P>, const P: usize>(
    ts: &ThreadState<S, P>,
    shared: &Shared<S::Move, P>,
    params: &RoundParams,
    eval: &[f32; P],
) {
    let nu_players = params.nu_players;
    let mut max_eval = eval[0];
    for &e in eval.iter().take(nu_players).skip(1) {
        max_eval = max_eval.max(e);
    }
    // A draw counts as a win for every player at the maximum: without more
    // information that scored slightly better than counting it as a loss.
    let mut is_winner = [false; P];
    for i in 0..nu_players {
        is_winner[i] = eval[i] == max_eval;
    }
    let nu_moves = ts.state.nu_moves();
    if nu_moves < 2 {
        return;
    }
    for i in (1..nu_moves).rev() {
        let reply = ts.state.get_move(i);
        let last = ts.state.get_move(i - 1).mv;
        let second_last = if i >= 2 {
            Some(ts.state.get_move(i - 2).mv)
        } else {
            None
        };
        if is_winner[reply.player] {
            shared.reply.store(reply.player, last, second_last, reply.mv);
        } else {
            shared.reply.forget(reply.player, last, second_last, reply.mv);
        }
    }
}

// ---------------------------------------------------------------------------
// Final selection
// ---------------------------------------------------------------------------

/// Best root child after the search: highest count, value as tie-breaker
/// (matters at very low simulation counts where many children are at 0 or
/// 1), allocation order breaking remaining ties.
fn select_child_final<M: GameMove>(
    tree: &Tree<M>,
    exclude_moves: Option<&[M]>,
) -> Option<NodeIndex> {
    let mut result = None;
    let mut max_count = -1.0f32;
    let mut max_count_value = f32::NEG_INFINITY;
    for child_index in tree.children(tree.root()) {
        let child = tree.node(child_index);
        if let Some(exclude) = exclude_moves {
            if exclude.contains(&tree.node_move(child)) {
                continue;
            }
        }
        let count = child.count();
        if count > max_count || (count == max_count && child.value() > max_count_value) {
            max_count = count;
            max_count_value = child.value();
            result = Some(child_index);
        }
    }
    result
}

fn value_in<M: GameMove>(tree: &Tree<M>, tie_value: f32) -> f32 {
    let root = tree.root();
    let root_count = root.count();
    if let Some(child_index) = select_child_final(tree, None) {
        let child = tree.node(child_index);
        // Root values are cleared when a subtree is reused, so the best
        // child can be better informed than the root itself.
        if child.count() > root_count {
            return child.value();
        }
    }
    if root_count > 0.0 {
        root.value()
    } else {
        tie_value
    }
}

// ---------------------------------------------------------------------------
// Search — controller
// ---------------------------------------------------------------------------

/// Read guard exposing the live tree.
pub struct TreeRef<'a, M: GameMove> {
    guard: RwLockReadGuard<'a, SearchTrees<M>>,
}

impl<'a, M: GameMove> Deref for TreeRef<'a, M> {
    type Target = Tree<M>;

    fn deref(&self) -> &Tree<M> {
        &self.guard.tree
    }
}

/// Game-independent parallel Monte-Carlo tree search.
///
/// The domain plugs in through [`SearchDomain`] and [`SimulationState`];
/// `P` is the maximum number of players evaluations are sized for.
pub struct Search<D: SearchDomain<P>, const P: usize> {
    domain: D,
    config: SearchConfig,
    shared: Arc<Shared<D::Move, P>>,
    pool: Option<WorkerPool<D::Move, P>>,
    controller_state: Option<ThreadState<D::State, P>>,
    callback: Option<Box<dyn FnMut(f64, f64)>>,
    followup_sequence: Vec<D::Move>,
    last_reuse_param: Option<ReuseParam>,
    reuse_count: f32,
    last_time: f64,
    player: usize,
}

impl<D: SearchDomain<P>, const P: usize> Search<D, P> {
    pub fn new(domain: D, config: SearchConfig) -> Self {
        let max_nodes = max_nodes_for_memory(config.tree_memory);
        info!(max_nodes, "search tree size: 2 arenas");
        let shared = Arc::new(Shared {
            trees: RwLock::new(SearchTrees {
                tree: Tree::new(max_nodes),
                tmp: Tree::new(max_nodes),
            }),
            root_val: std::array::from_fn(|_| DirtyStatistics::new()),
            init_val: std::array::from_fn(|_| DirtyStatistics::new()),
            reply: LastGoodReply::new(),
            nu_simulations: AtomicUsize::new(0),
            abort: AbortFlag::new(),
        });
        Self {
            domain,
            config,
            shared,
            pool: None,
            controller_state: None,
            callback: None,
            followup_sequence: Vec::new(),
            last_reuse_param: None,
            reuse_count: 0.0,
            last_time: 0.0,
            player: 0,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Replace the parameters. A changed memory budget rebuilds the arenas;
    /// a changed thread count rebuilds the worker pool before the next
    /// search; a changed reuse-relevant subset disables reuse once.
    pub fn set_config(&mut self, config: SearchConfig) {
        if max_nodes_for_memory(config.tree_memory)
            != max_nodes_for_memory(self.config.tree_memory)
        {
            let max_nodes = max_nodes_for_memory(config.tree_memory);
            let mut trees = self.shared.trees.write().expect("tree lock poisoned");
            trees.tree = Tree::new(max_nodes);
            trees.tmp = Tree::new(max_nodes);
            self.last_reuse_param = None;
        }
        self.config = config;
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub fn domain_mut(&mut self) -> &mut D {
        &mut self.domain
    }

    /// Cancellation handle, shareable with other threads.
    pub fn abort_flag(&self) -> AbortFlag {
        self.shared.abort.clone()
    }

    /// Progress callback, invoked about every 0.1 s with
    /// (elapsed seconds, estimated remaining seconds).
    pub fn set_callback(&mut self, callback: impl FnMut(f64, f64) + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Read-only view of the live tree. Must not be held across `search`.
    pub fn tree(&self) -> TreeRef<'_, D::Move> {
        TreeRef {
            guard: self.shared.trees.read().expect("tree lock poisoned"),
        }
    }

    /// Simulations attempted in the last search (reused counts excluded).
    pub fn nu_simulations(&self) -> usize {
        self.shared.nu_simulations.load(Ordering::Relaxed)
    }

    /// Mean evaluation per player at the root of the last search.
    pub fn root_values(&self) -> &[DirtyStatistics; P] {
        &self.shared.root_val
    }

    /// Count carried over from the reused subtree's root, if any.
    pub fn reuse_count(&self) -> f32 {
        self.reuse_count
    }

    /// Create the worker threads ahead of the first search. Called
    /// automatically, but doing it eagerly saves time at the first move
    /// generation when the game clock may already be running.
    pub fn create_threads(&mut self) {
        let nu_threads = self.config.nu_threads.max(1);
        info!(nu_threads, "creating search threads");
        self.controller_state = Some(ThreadState::new(0, self.domain.create_state()));
        let states: Vec<D::State> = (1..nu_threads)
            .map(|_| self.domain.create_state())
            .collect();
        self.pool = Some(WorkerPool::new(states));
    }

    fn check_create_threads(&mut self) {
        let nu_threads = self.config.nu_threads.max(1);
        let pool_size = self.pool.as_ref().map(WorkerPool::nu_workers);
        if self.controller_state.is_none() || pool_size != Some(nu_threads - 1) {
            self.create_threads();
        }
    }

    /// Run a search.
    ///
    /// Exactly one of `max_count` (simulation budget, includes counts reused
    /// from a previous subtree) and `max_time` is the active limit;
    /// `max_count > 0` disables the time limit. At least `min_simulations`
    /// are run in this call regardless of the early-termination predicates.
    /// With `always_search`, an interrupted subtree extraction still leads
    /// to a best-effort search on the partial tree; without it the search
    /// gives up (useful for pondering, where the full tree matters more
    /// than a result).
    ///
    /// Returns the chosen move; the tree stays populated for reuse.
    pub fn search(
        &mut self,
        max_count: f32,
        min_simulations: f32,
        max_time: f64,
        time_source: Arc<dyn TimeSource>,
        always_search: bool,
    ) -> Result<D::Move, SearchError> {
        self.check_create_threads();
        // A count budget still needs a finite-looking time in a few places.
        let mut max_time = if max_count > 0.0 { f64::MAX } else { max_time };
        let nu_players = self.domain.nu_players();
        debug_assert!(nu_players >= 1 && nu_players <= P);
        let tie_value = self.domain.tie_value();

        self.followup_sequence.clear();
        let mut is_followup = self.domain.check_followup(&mut self.followup_sequence);
        let mut is_same = false;
        if is_followup && self.followup_sequence.is_empty() {
            is_same = true;
            is_followup = false;
        }
        // A follow-up longer than one round of moves is too far away for the
        // old values to stay informative.
        let short_followup = is_followup && self.followup_sequence.len() <= nu_players;

        for i in 0..nu_players {
            self.shared.init_val[i].clear();
            self.shared.init_val[i].add(tie_value);
        }
        if is_same || short_followup {
            for i in 0..nu_players {
                if self.shared.root_val[i].count() > 0.0 {
                    self.shared.init_val[i].copy_from(&self.shared.root_val[i]);
                }
            }
        }

        self.reuse_count = 0.0;
        let reuse_param = ReuseParam::from_config(&self.config);
        let mut clear_tree = true;
        if ((self.config.reuse_subtree && short_followup)
            || (self.config.reuse_tree && is_same))
            && self.last_reuse_param == Some(reuse_param)
        {
            let mut trees = self.shared.trees.write().expect("tree lock poisoned");
            let tree_nodes = trees.tree.nu_nodes();
            if self.followup_sequence.is_empty() {
                if tree_nodes > 1 {
                    info!(
                        nodes = tree_nodes,
                        count = trees.tree.root().count(),
                        "reusing the full tree"
                    );
                    clear_tree = false;
                }
            } else {
                let timer = Timer::new(Arc::clone(&time_source));
                trees.tmp.clear(tie_value);
                if let Some(node) = trees.tree.find_node(&self.followup_sequence) {
                    let mut checker = TimeIntervalChecker::new(
                        Arc::clone(&time_source),
                        max_time,
                        self.shared.abort.clone(),
                    );
                    if self.config.deterministic {
                        checker.set_deterministic(1_000_000);
                    }
                    let SearchTrees { tree, tmp } = &mut *trees;
                    let aborted = !tree.extract_subtree(tmp, node, Some(&mut checker));
                    // The root of a reused subtree holds a move value from
                    // the previous search; only its count stays relevant.
                    self.reuse_count = tmp.root().count();
                    tmp.clear_root_value(tie_value);
                    if aborted && !always_search {
                        return Err(SearchError::ReuseAborted);
                    }
                    let tmp_tree_nodes = tmp.nu_nodes();
                    if tree_nodes > 1 && tmp_tree_nodes > 1 {
                        let time = timer.elapsed();
                        info!(
                            reused = tmp_tree_nodes,
                            total = tree_nodes,
                            time,
                            "reusing subtree"
                        );
                        std::mem::swap(tree, tmp);
                        clear_tree = false;
                        max_time = (max_time - time).max(0.0);
                    }
                }
            }
        }
        if clear_tree {
            self.reuse_count = 0.0;
            self.shared
                .trees
                .write()
                .expect("tree lock poisoned")
                .tree
                .clear(tie_value);
        }

        self.last_reuse_param = Some(reuse_param);
        self.player = self.domain.to_play();
        for i in 0..nu_players {
            self.shared.root_val[i].clear();
        }
        if self.config.last_good_reply && !is_followup {
            self.shared.reply.init(nu_players);
        }
        self.shared.nu_simulations.store(0, Ordering::Relaxed);
        let mut prune_min_count = self.config.prune_count_start;
        let expected_sims_per_sec = self.domain.expected_sims_per_sec();

        // Very short searches run single-threaded: with all workers racing
        // to expand the root, the lost updates at the start would waste most
        // of the budget.
        let mut nu_threads = self.config.nu_threads.max(1);
        if max_time < 0.5
            || (max_count > 0.0
                && (max_count - self.reuse_count) as f64 / expected_sims_per_sec < 0.5)
        {
            debug!("single-threading very short search");
            nu_threads = 1;
        }

        let search_start = time_source.now();
        let mut params = RoundParams {
            config: self.config,
            nu_players,
            player: self.player,
            max_count,
            min_simulations,
            max_time,
            reuse_count: self.reuse_count,
            search_start,
            time_source: Arc::clone(&time_source),
            expected_sims_per_sec,
            first_round: true,
        };

        loop {
            let extra = nu_threads - 1;
            let round = Round {
                shared: Arc::clone(&self.shared),
                params: params.clone(),
            };
            let pool = self.pool.as_ref().expect("threads created");
            pool.start_round(extra, &round);

            // The controller participates as worker 0.
            let controller = self.controller_state.as_mut().expect("threads created");
            if params.first_round {
                controller.state.start_search();
                controller.stat_len.clear();
                controller.stat_in_tree_len.clear();
            }
            {
                let trees = self.shared.trees.read().expect("tree lock poisoned");
                search_loop(
                    controller,
                    &self.shared,
                    &params,
                    &trees.tree,
                    self.callback.as_deref_mut(),
                );
            }
            let mut is_out_of_mem = controller.is_out_of_mem;
            is_out_of_mem |= pool.wait_round(extra);
            if !is_out_of_mem {
                break;
            }
            if !self.config.prune_full_tree {
                debug!("maximum tree size reached");
                break;
            }
            let time = time_source.now() - search_start;
            let mut new_prune_min_count = prune_min_count;
            if !self.prune(
                &time_source,
                time,
                max_time - time,
                prune_min_count,
                &mut new_prune_min_count,
            ) {
                debug!("aborting search because pruning failed");
                break;
            }
            prune_min_count = new_prune_min_count;
            params.first_round = false;
        }

        self.last_time = time_source.now() - search_start;
        let mut line = String::new();
        if self.write_info(&mut line).is_ok() && !line.is_empty() {
            debug!("{}", line.trim_end());
        }
        self.select_move(None).ok_or(SearchError::NoMove)
    }

    /// Copy the live tree's subtrees with `count >= prune_min_count` into
    /// the scratch arena and swap. Doubles the threshold for the next cycle
    /// if more than half the nodes survived. Returns `false` if pruning
    /// cannot make progress (aborted, or the threshold cap is reached).
    fn prune(
        &mut self,
        time_source: &Arc<dyn TimeSource>,
        time: f64,
        max_time: f64,
        prune_min_count: f32,
        new_prune_min_count: &mut f32,
    ) -> bool {
        let timer = Timer::new(Arc::clone(time_source));
        let mut checker = TimeIntervalChecker::new(
            Arc::clone(time_source),
            max_time,
            self.shared.abort.clone(),
        );
        if self.config.deterministic {
            checker.set_deterministic(1_000_000);
        }
        debug!(prune_min_count, time, "pruning");
        let mut trees = self.shared.trees.write().expect("tree lock poisoned");
        let SearchTrees { tree, tmp } = &mut *trees;
        tmp.clear(tree.root().value());
        if !tree.copy_subtree(
            tmp,
            NodeIndex::ROOT,
            NodeIndex::ROOT,
            prune_min_count,
            Some(&mut checker),
        ) {
            debug!("pruning aborted");
            return false;
        }
        let percent = tmp.nu_nodes() * 100 / tree.nu_nodes();
        debug!(
            nodes = tmp.nu_nodes(),
            percent,
            time = timer.elapsed(),
            "pruned"
        );
        std::mem::swap(tree, tmp);
        if percent > 50 {
            if prune_min_count >= 0.5 * MAX_FLOAT_COUNT {
                return false;
            }
            *new_prune_min_count = prune_min_count * 2.0;
        } else {
            *new_prune_min_count = prune_min_count;
        }
        true
    }

    /// Select the move to play from the last search's tree, optionally
    /// excluding some moves.
    pub fn select_move(&self, exclude_moves: Option<&[D::Move]>) -> Option<D::Move> {
        let trees = self.shared.trees.read().expect("tree lock poisoned");
        select_child_final(&trees.tree, exclude_moves)
            .map(|index| trees.tree.node_move(trees.tree.node(index)))
    }

    /// Value of the root position. Prefers the best child's value when that
    /// child is better informed than the root (root values are cleared when
    /// a subtree is reused).
    pub fn value(&self) -> f32 {
        let trees = self.shared.trees.read().expect("tree lock poisoned");
        value_in(&trees.tree, self.domain.tie_value())
    }

    /// One-line diagnostic summary of the last search.
    pub fn write_info(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        let Some(controller) = &self.controller_state else {
            return Ok(());
        };
        let trees = self.shared.trees.read().expect("tree lock poisoned");
        let tree = &trees.tree;
        let nu_simulations = self.nu_simulations();
        let sims_per_sec = if self.last_time > 0.0 {
            nu_simulations as f64 / self.last_time
        } else {
            0.0
        };
        writeln!(
            out,
            "Val: {:.2}, Cnt: {:.0}, ReCnt: {:.0}, Sim: {}, Nds: {}, Tm: {:.3}s",
            value_in(tree, self.domain.tie_value()),
            tree.root().count(),
            self.reuse_count,
            nu_simulations,
            tree.nu_nodes(),
            self.last_time,
        )?;
        writeln!(
            out,
            "Sim/s: {:.0}, Len: {}, Dp: {}",
            sims_per_sec, controller.stat_len, controller.stat_in_tree_len,
        )
    }

    /// Diagnostic dump of the controller's simulation state.
    pub fn dump(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        if let Some(controller) = &self.controller_state {
            controller.state.dump(out)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
