use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use crate::search::{run_worker_round, Round, ThreadState, WorkerReport};
use crate::state::{GameMove, SimulationState};

// ---------------------------------------------------------------------------
// WorkerPool — persistent search threads
// ---------------------------------------------------------------------------

/// Pool of persistent worker threads.
///
/// Each worker owns its simulation state and blocks on a private channel
/// between searches; the controller posts one `Round` token per active
/// worker and awaits as many done tokens on a shared channel. The
/// controller itself acts as worker 0, so a pool for an N-thread search
/// holds N-1 threads. Threads exit when the pool (and with it the start
/// senders) is dropped.
pub(crate) struct WorkerPool<M: GameMove, const P: usize> {
    workers: Vec<Worker<M, P>>,
    done_rx: Receiver<WorkerReport>,
}

struct Worker<M: GameMove, const P: usize> {
    start_tx: Option<Sender<Round<M, P>>>,
    join: Option<JoinHandle<()>>,
}

impl<M: GameMove, const P: usize> WorkerPool<M, P> {
    /// Spawn one worker per state, numbered from 1 (the controller is 0).
    pub fn new<S>(states: Vec<S>) -> Self
    where
        S: SimulationState<P, Move = M> + 'static,
    {
        let (done_tx, done_rx) = mpsc::channel();
        let workers = states
            .into_iter()
            .enumerate()
            .map(|(i, state)| {
                let thread_id = i + 1;
                let (start_tx, start_rx) = mpsc::channel::<Round<M, P>>();
                let done_tx = done_tx.clone();
                let join = std::thread::Builder::new()
                    .name(format!("mcts-worker-{thread_id}"))
                    .spawn(move || worker_main(thread_id, state, start_rx, done_tx))
                    .expect("spawn search worker");
                Worker {
                    start_tx: Some(start_tx),
                    join: Some(join),
                }
            })
            .collect();
        Self { workers, done_rx }
    }

    pub fn nu_workers(&self) -> usize {
        self.workers.len()
    }

    /// Post a start token to the first `n` workers.
    pub fn start_round(&self, n: usize, round: &Round<M, P>) {
        debug_assert!(n <= self.workers.len());
        for worker in &self.workers[..n] {
            worker
                .start_tx
                .as_ref()
                .expect("pool not shut down")
                .send(round.clone())
                .expect("search worker alive");
        }
    }

    /// Await `n` done tokens. Returns whether any worker ran out of memory.
    pub fn wait_round(&self, n: usize) -> bool {
        let mut is_out_of_mem = false;
        for _ in 0..n {
            let report = self.done_rx.recv().expect("search worker alive");
            is_out_of_mem |= report.is_out_of_mem;
        }
        is_out_of_mem
    }
}

impl<M: GameMove, const P: usize> Drop for WorkerPool<M, P> {
    fn drop(&mut self) {
        for worker in &mut self.workers {
            // Closing the channel ends the worker loop.
            drop(worker.start_tx.take());
        }
        for worker in &mut self.workers {
            if let Some(join) = worker.join.take() {
                let _ = join.join();
            }
        }
    }
}

fn worker_main<S, M, const P: usize>(
    thread_id: usize,
    state: S,
    start_rx: Receiver<Round<M, P>>,
    done_tx: Sender<WorkerReport>,
) where
    M: GameMove,
    S: SimulationState<P, Move = M>,
{
    let mut thread_state = ThreadState::new(thread_id, state);
    while let Ok(round) = start_rx.recv() {
        run_worker_round(&mut thread_state, &round);
        let report = WorkerReport {
            is_out_of_mem: thread_state.is_out_of_mem,
        };
        if done_tx.send(report).is_err() {
            break;
        }
    }
}
