use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::state::GameMove;

// ---------------------------------------------------------------------------
// LastGoodReply — per-player 2-ply reply memory
// ---------------------------------------------------------------------------

/// Empty reply slot.
const NO_REPLY: u32 = u32::MAX;

/// Last-Good-Reply table.
///
/// For each player two reply slots are kept: a 1-ply reply keyed by the last
/// move alone, and a 2-ply reply keyed by the (last, second-to-last) move
/// pair, hashed into a fixed table. On a win the winner's reply is stored;
/// on a loss the matching entry is forgotten so a loser's move never
/// overwrites a winner's. All slots are relaxed atomics: lost updates and
/// hash collisions only degrade a heuristic whose suggestions the playout
/// policy re-validates anyway.
pub struct LastGoodReply<M, const P: usize> {
    lgr1: [Box<[AtomicU32]>; P],
    lgr2: [Box<[AtomicU32]>; P],
    hash_mask: usize,
    _marker: PhantomData<M>,
}

fn empty_slots(n: usize) -> Box<[AtomicU32]> {
    (0..n).map(|_| AtomicU32::new(NO_REPLY)).collect()
}

impl<M: GameMove, const P: usize> LastGoodReply<M, P> {
    pub fn new() -> Self {
        let hash_size = M::RANGE.next_power_of_two();
        Self {
            lgr1: std::array::from_fn(|_| empty_slots(M::RANGE)),
            lgr2: std::array::from_fn(|_| empty_slots(hash_size)),
            hash_mask: hash_size - 1,
            _marker: PhantomData,
        }
    }

    /// Forget everything for the first `nu_players` players. Called when a
    /// search starts from a position unrelated to the previous one.
    pub fn init(&self, nu_players: usize) {
        for player in 0..nu_players {
            for slot in self.lgr1[player].iter() {
                slot.store(NO_REPLY, Ordering::Relaxed);
            }
            for slot in self.lgr2[player].iter() {
                slot.store(NO_REPLY, Ordering::Relaxed);
            }
        }
    }

    fn hash2(&self, last: M, second_last: M) -> usize {
        (last.to_index().wrapping_mul(0x9E37_79B9) ^ second_last.to_index()) & self.hash_mask
    }

    /// Reply candidates for `player`, most specific first: the 2-ply reply
    /// (if a second-to-last move exists), then the 1-ply reply.
    pub fn get(
        &self,
        player: usize,
        last: M,
        second_last: Option<M>,
    ) -> (Option<M>, Option<M>) {
        let reply_2ply = second_last.and_then(|second| {
            decode(self.lgr2[player][self.hash2(last, second)].load(Ordering::Relaxed))
        });
        let reply_1ply = decode(self.lgr1[player][last.to_index()].load(Ordering::Relaxed));
        (reply_2ply, reply_1ply)
    }

    pub fn store(&self, player: usize, last: M, second_last: Option<M>, reply: M) {
        let encoded = reply.to_index() as u32;
        self.lgr1[player][last.to_index()].store(encoded, Ordering::Relaxed);
        if let Some(second) = second_last {
            self.lgr2[player][self.hash2(last, second)].store(encoded, Ordering::Relaxed);
        }
    }

    /// Clear the entries for this key, but only if they still hold `reply` —
    /// a different stored reply is someone else's win and is kept.
    pub fn forget(&self, player: usize, last: M, second_last: Option<M>, reply: M) {
        let encoded = reply.to_index() as u32;
        let _ = self.lgr1[player][last.to_index()].compare_exchange(
            encoded,
            NO_REPLY,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
        if let Some(second) = second_last {
            let _ = self.lgr2[player][self.hash2(last, second)].compare_exchange(
                encoded,
                NO_REPLY,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
    }
}

fn decode<M: GameMove>(slot: u32) -> Option<M> {
    if slot == NO_REPLY {
        None
    } else {
        Some(M::from_index(slot as usize))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
