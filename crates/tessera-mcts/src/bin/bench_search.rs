//! Search throughput benchmark on a synthetic game tree.
//!
//! Usage: bench_search [simulations] [threads]

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tessera_mcts::{
    ChildExpander, GameMove, PlayerMove, Search, SearchConfig, SearchDomain, SimulationState,
    WallTimeSource,
};

const BRANCHING: usize = 20;
const DEPTH: usize = 12;
const PLAYOUT_LEN: usize = 30;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct BenchMove(usize);

impl GameMove for BenchMove {
    const RANGE: usize = 1024;

    fn to_index(self) -> usize {
        self.0
    }

    fn from_index(index: usize) -> Self {
        BenchMove(index)
    }
}

struct BenchDomain {
    seed: u64,
}

struct BenchState {
    rng: SmallRng,
    seed: u64,
    history: Vec<PlayerMove<BenchMove>>,
}

impl SearchDomain<2> for BenchDomain {
    type Move = BenchMove;
    type State = BenchState;

    fn create_state(&self) -> BenchState {
        BenchState {
            rng: SmallRng::seed_from_u64(self.seed),
            seed: self.seed,
            history: Vec::new(),
        }
    }

    fn move_string(&self, mv: BenchMove) -> String {
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

    fn expected_sims_per_sec(&self) -> f64 {
        10_000.0
    }
}

impl SimulationState<2> for BenchState {
    type Move = BenchMove;

    fn start_simulation(&mut self, index: usize) {
        self.history.clear();
        self.rng = SmallRng::seed_from_u64(self.seed ^ index as u64);
    }

    fn gen_children(&mut self, expander: &mut ChildExpander<'_, BenchMove>, init_value: f32) {
        if self.history.len() >= DEPTH {
            return;
        }
        let base = (self.history.len() * BRANCHING) % (BenchMove::RANGE - BRANCHING);
        for i in 0..BRANCHING {
            expander.add_child(BenchMove(base + i), 0.0, init_value);
        }
    }

    fn play_in_tree(&mut self, mv: BenchMove) {
        let player = self.history.len() % 2;
        self.history.push(PlayerMove { player, mv });
    }

    fn play_expanded_child(&mut self, mv: BenchMove) {
        self.play_in_tree(mv);
    }

    fn gen_and_play_playout_move(
        &mut self,
        reply_1: Option<BenchMove>,
        reply_2: Option<BenchMove>,
    ) -> bool {
        if self.history.len() >= DEPTH + PLAYOUT_LEN {
            return false;
        }
        let player = self.history.len() % 2;
        let mv = reply_1
            .or(reply_2)
            .unwrap_or_else(|| BenchMove(self.rng.gen_range(0..BenchMove::RANGE)));
        self.history.push(PlayerMove { player, mv });
        true
    }

    fn evaluate_playout(&mut self) -> [f32; 2] {
        let p0 = self.rng.gen_range(0.0..1.0);
        [p0, 1.0 - p0]
    }

    fn evaluate_terminal(&mut self) -> [f32; 2] {
        self.evaluate_playout()
    }

    fn nu_moves(&self) -> usize {
        self.history.len()
    }

    fn get_move(&self, index: usize) -> PlayerMove<BenchMove> {
        self.history[index]
    }

    fn to_play(&self) -> usize {
        self.history.len() % 2
    }
}

fn main() {
    let mut args = std::env::args().skip(1);
    let simulations: f32 = args
        .next()
        .map(|a| a.parse().expect("simulations"))
        .unwrap_or(100_000.0);
    let threads: usize = args.next().map(|a| a.parse().expect("threads")).unwrap_or(4);

    let config = SearchConfig {
        nu_threads: threads,
        rave: true,
        last_good_reply: true,
        ..SearchConfig::default()
    };
    let mut search: Search<BenchDomain, 2> = Search::new(BenchDomain { seed: 7 }, config);
    search.create_threads();

    let time_source = Arc::new(WallTimeSource::new());
    let start = Instant::now();
    let mv = search
        .search(simulations, 0.0, 0.0, time_source, true)
        .expect("bench tree has moves");
    let elapsed = start.elapsed().as_secs_f64();

    let sims = search.nu_simulations();
    println!("move: {mv:?}");
    println!(
        "{} simulations in {:.3}s ({:.0}/s, {} threads)",
        sims,
        elapsed,
        sims as f64 / elapsed,
        threads
    );
    let mut info = String::new();
    search.write_info(&mut info).unwrap();
    print!("{info}");
}
