use parking_lot::MutexGuard;
use std::sync::Arc;
use std::thread;

use super::place::PlaceState;
use super::{PetriPlace, Tokens};
use crate::config::{LockStrategy, NetConfig};
use crate::error::NetError;

/// Exclusive hold on every place a transition touches.
///
/// `guards[i]` guards `places[i]`; dropping the set releases every lock.
pub(crate) struct LockSet<'a> {
    places: &'a [Arc<PetriPlace>],
    guards: Vec<MutexGuard<'a, PlaceState>>,
    changed: Vec<bool>,
    rounds: u32,
}

impl<'a> LockSet<'a> {
    /// Locks all of `places`, which must not contain duplicates.
    pub(crate) fn acquire(places: &'a [Arc<PetriPlace>], config: &NetConfig) -> Self {
        match config.lock_strategy {
            LockStrategy::RetryAll => Self::acquire_retry_all(places, config.retry_yield_after),
            LockStrategy::Ordered => Self::acquire_ordered(places),
        }
    }

    /// Try-locks the places in order. On the first contended place every lock
    /// taken in this round is released and the whole set is tried again, so a
    /// strict subset of the locks is never held while waiting.
    fn acquire_retry_all(places: &'a [Arc<PetriPlace>], yield_after: u32) -> Self {
        let mut guards = Vec::with_capacity(places.len());
        let mut rounds = 0;

        'retry: loop {
            rounds += 1;
            for place in places {
                match place.try_lock() {
                    Some(guard) => guards.push(guard),
                    None => {
                        log::trace!("place [{}] is busy, retrying (round {})", place.id(), rounds);
                        guards.clear();
                        if rounds > yield_after {
                            thread::yield_now();
                        }
                        continue 'retry;
                    }
                }
            }

            return Self {
                places,
                guards,
                changed: vec![false; places.len()],
                rounds,
            };
        }
    }

    /// Blocks on each place in ascending serial order.
    fn acquire_ordered(places: &'a [Arc<PetriPlace>]) -> Self {
        let mut order = (0..places.len()).collect::<Vec<_>>();
        order.sort_by_key(|&index| places[index].serial());

        let mut slots = places.iter().map(|_| None).collect::<Vec<_>>();
        for index in order {
            slots[index] = Some(places[index].lock());
        }

        Self {
            places,
            guards: slots.into_iter().flatten().collect(),
            changed: vec![false; places.len()],
            rounds: 1,
        }
    }

    /// Number of acquisition rounds it took to get every lock.
    pub(crate) fn rounds(&self) -> u32 {
        self.rounds
    }

    fn position(&self, place: &PetriPlace) -> usize {
        match self.places.iter().position(|held| std::ptr::eq(held.as_ref(), place)) {
            Some(index) => index,
            None => panic!("place [{}] is not part of the locked set", place.id()),
        }
    }

    /// Token count as seen under the lock.
    pub(crate) fn tokens(&self, place: &PetriPlace) -> Tokens {
        self.guards[self.position(place)].tokens
    }

    pub(crate) fn apply(&mut self, place: &PetriPlace, delta: i64) -> Result<Tokens, NetError> {
        let index = self.position(place);
        let before = self.guards[index].tokens;
        let tokens = self.places[index].apply_locked(&mut self.guards[index], delta)?;
        self.changed[index] |= tokens != before;
        Ok(tokens)
    }

    /// Runs the alert check of every place changed through this set.
    pub(crate) fn raise_alerts(&mut self) {
        for (place, changed) in self.places.iter().zip(self.changed.iter_mut()) {
            if std::mem::take(changed) {
                place.check_alert();
            }
        }
    }
}
