use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// A slot holding at most one value.
///
/// Offers made while the slot is occupied are dropped, so a burst of
/// signals collapses into a single wakeup for the receiver.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Stores `value` if the slot is empty. Never blocks.
    pub fn offer(&self, value: T) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        self.ready.notify_one();
        true
    }

    /// Stores `value`, discarding whatever was pending.
    pub fn replace(&self, value: T) -> Option<T> {
        let mut slot = self.slot.lock();
        let previous = slot.replace(value);
        self.ready.notify_one();
        previous
    }

    /// Blocks until a value is available and takes it.
    pub fn take(&self) -> T {
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.take() {
                return value;
            }
            self.ready.wait(&mut slot);
        }
    }

    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let mut slot = self.slot.lock();
        self.ready
            .wait_while_for(&mut slot, |slot| slot.is_none(), timeout);
        slot.take()
    }

    pub fn try_take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}
