use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::{PetriArc, PetriTransition, Tokens, Weight};
use crate::error::NetError;
use crate::mailbox::Mailbox;

static PLACE_SERIAL: AtomicU64 = AtomicU64::new(0);

pub type AlertPredicate = Box<dyn Fn(&PetriPlace) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceKind {
    #[default]
    Regular,
    /// Collects tokens; transitions may read it but never consume from it.
    Sink,
}

/// The part of a place guarded by its lock.
#[derive(Debug, Default)]
pub(crate) struct PlaceState {
    pub(crate) tokens: Tokens,
}

/* Invariants:
    - `state.tokens` only changes while `state` is locked
    - `tokens` mirrors `state.tokens` and is written only under that same lock
    - `outbound` only holds arcs leaving this place (flow inputs and enable arcs)
*/
pub struct PetriPlace {
    id: String,
    serial: u64,
    kind: PlaceKind,
    pub(crate) state: Mutex<PlaceState>,
    tokens: AtomicU64,
    outbound: RwLock<Vec<Weak<PetriArc>>>,
    alert_predicate: RwLock<Option<AlertPredicate>>,
    alerts: Mailbox<()>,
}

impl PetriPlace {
    pub(crate) fn new(id: impl Into<String>, kind: PlaceKind) -> Self {
        Self {
            id: id.into(),
            serial: PLACE_SERIAL.fetch_add(1, Ordering::Relaxed),
            kind,
            state: Mutex::new(PlaceState::default()),
            tokens: AtomicU64::new(0),
            outbound: RwLock::new(Vec::new()),
            alert_predicate: RwLock::new(None),
            alerts: Mailbox::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Process-wide creation index, used to order lock acquisition.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn kind(&self) -> PlaceKind {
        self.kind
    }

    /// Last committed token count. May be stale as soon as it is returned.
    #[inline]
    pub fn tokens(&self) -> Tokens {
        self.tokens.load(Ordering::Acquire)
    }

    /// Adds `delta` tokens (or removes them, if negative) under the place's lock.
    ///
    /// # Panics
    ///
    /// Panics if the place would go negative or past [`Tokens::MAX`]. Use
    /// [`PetriPlace::try_add_tokens`] to get the error back instead.
    pub fn add_tokens(&self, delta: i64) -> bool {
        match self.try_add_tokens(delta) {
            Ok(_) => true,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn try_add_tokens(&self, delta: i64) -> Result<Tokens, NetError> {
        let mut state = self.state.lock();
        let before = state.tokens;
        let tokens = self.apply_locked(&mut state, delta)?;
        if tokens != before {
            self.check_alert();
        }
        Ok(tokens)
    }

    /// Token update for callers already holding `state`. Notifies every outbound
    /// arc but leaves the alert check to the caller.
    pub(crate) fn apply_locked(&self, state: &mut PlaceState, delta: i64) -> Result<Tokens, NetError> {
        let tokens = state.tokens.checked_add_signed(delta).ok_or_else(|| {
            if delta < 0 {
                NetError::Underflow {
                    place: self.id.clone(),
                    tokens: state.tokens,
                    delta,
                }
            } else {
                NetError::Overflow {
                    place: self.id.clone(),
                    tokens: state.tokens,
                    added: delta.unsigned_abs(),
                }
            }
        })?;

        if tokens != state.tokens {
            state.tokens = tokens;
            self.tokens.store(tokens, Ordering::Release);
        }
        self.notify_outbound(tokens);

        Ok(tokens)
    }

    /// Raises an alert if the predicate holds for the current count.
    pub(crate) fn check_alert(&self) {
        let predicate = self.alert_predicate.read();
        if let Some(predicate) = predicate.as_ref() {
            if predicate(self) && self.alerts.offer(()) {
                log::trace!("place [{}] raised an alert at {} tokens", self.id, self.tokens());
            }
        }
    }

    fn notify_outbound(&self, tokens: Tokens) {
        for arc in self.outbound.read().iter() {
            if let Some(arc) = arc.upgrade() {
                arc.notify(tokens);
            }
        }
    }

    /// Connects this place to `transition` as one of its inputs.
    pub fn connect_to(
        self: &Arc<Self>,
        transition: &Arc<PetriTransition>,
        weight: Weight,
    ) -> Result<Arc<PetriArc>, NetError> {
        self.check_consumable()?;
        let arc = Arc::new(PetriArc::input(self, transition, weight)?);
        transition.attach_input(Arc::clone(&arc));
        self.attach_outbound(&arc);
        Ok(arc)
    }

    pub(crate) fn check_consumable(&self) -> Result<(), NetError> {
        match self.kind {
            PlaceKind::Sink => Err(NetError::SinkPlace {
                place: self.id.clone(),
            }),
            PlaceKind::Regular => Ok(()),
        }
    }

    /// Registers `arc` for change notifications and offers it the current count,
    /// so tokens added before the arc existed are not stranded.
    pub(crate) fn attach_outbound(&self, arc: &Arc<PetriArc>) {
        self.outbound.write().push(Arc::downgrade(arc));
        arc.notify(self.tokens());
    }

    pub fn outbound(&self) -> Vec<Arc<PetriArc>> {
        self.outbound.read().iter().filter_map(Weak::upgrade).collect()
    }

    /// Installs the predicate evaluated after every change of the token count.
    pub fn set_alert_predicate<F>(&self, predicate: F)
    where
        F: Fn(&PetriPlace) -> bool + Send + Sync + 'static,
    {
        *self.alert_predicate.write() = Some(Box::new(predicate));
    }

    pub fn set_alert_on_change(&self) {
        self.set_alert_predicate(|_| true);
    }

    pub fn set_alert_at_least(&self, tokens: Tokens) {
        self.set_alert_predicate(move |place| place.tokens() >= tokens);
    }

    pub fn clear_alert_predicate(&self) {
        *self.alert_predicate.write() = None;
    }

    /// Blocks until an alert is pending and consumes it.
    pub fn wait_for_alert(&self) {
        self.alerts.take()
    }

    /// Like [`PetriPlace::wait_for_alert`], giving up after `timeout`.
    pub fn wait_for_alert_timeout(&self, timeout: Duration) -> bool {
        self.alerts.take_timeout(timeout).is_some()
    }

    pub fn try_take_alert(&self) -> bool {
        self.alerts.try_take().is_some()
    }

    pub fn has_pending_alert(&self) -> bool {
        self.alerts.is_pending()
    }

    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, PlaceState> {
        self.state.lock()
    }

    pub(crate) fn try_lock(&self) -> Option<parking_lot::MutexGuard<'_, PlaceState>> {
        self.state.try_lock()
    }
}

impl fmt::Debug for PetriPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PetriPlace")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("tokens", &self.tokens())
            .finish()
    }
}

impl fmt::Display for PetriPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Place: ID [{}] Tokens [{}] {{", self.id, self.tokens())?;
        for arc in self.outbound() {
            write!(f, "{}, ", arc)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    fn place(id: &str) -> PetriPlace {
        PetriPlace::new(id, PlaceKind::Regular)
    }

    #[test]
    fn test_add_tokens() {
        let p = place("P");
        assert!(p.add_tokens(3));
        assert!(p.add_tokens(-2));
        assert_eq!(p.tokens(), 1);
        assert_eq!(p.try_add_tokens(4), Ok(5));
    }

    #[test]
    fn test_underflow_is_reported() {
        let p = place("P");
        p.add_tokens(1);
        assert_eq!(
            p.try_add_tokens(-2),
            Err(NetError::Underflow {
                place: "P".to_string(),
                tokens: 1,
                delta: -2
            })
        );
        assert_eq!(p.tokens(), 1);
    }

    #[test]
    fn test_overflow_is_reported() {
        let p = place("P");
        p.add_tokens(i64::MAX);
        p.add_tokens(i64::MAX);
        assert_eq!(
            p.try_add_tokens(2),
            Err(NetError::Overflow {
                place: "P".to_string(),
                tokens: Tokens::MAX - 1,
                added: 2
            })
        );
        assert_eq!(p.try_add_tokens(1), Ok(Tokens::MAX));
    }

    #[test]
    #[should_panic(expected = "more tokens")]
    fn test_overflow_is_fatal() {
        let p = place("P");
        p.add_tokens(i64::MAX);
        p.add_tokens(i64::MAX);
        p.add_tokens(i64::MAX);
    }

    #[test]
    #[should_panic(expected = "negative")]
    fn test_underflow_is_fatal() {
        place("P").add_tokens(-1);
    }

    #[test]
    fn test_concurrent_accumulation() {
        const N: usize = 100;
        const TOKS: usize = 10_000;

        let p = Arc::new(place("P"));
        let adders = (0..N)
            .map(|_| {
                let p = Arc::clone(&p);
                thread::spawn(move || {
                    for _ in 0..TOKS {
                        p.add_tokens(1);
                    }
                })
            })
            .collect::<Vec<_>>();
        for adder in adders {
            adder.join().unwrap();
        }

        assert_eq!(p.tokens(), (N * TOKS) as Tokens);
    }

    #[test]
    fn test_alerts_coalesce() {
        let p = place("P");
        p.set_alert_on_change();
        for _ in 0..10 {
            p.add_tokens(1);
        }
        assert!(p.try_take_alert());
        assert!(!p.try_take_alert());
    }

    #[test]
    fn test_alert_needs_a_change() {
        let p = place("P");
        p.set_alert_on_change();
        p.add_tokens(0);
        assert!(!p.has_pending_alert());
        p.add_tokens(2);
        p.add_tokens(-2);
        assert!(p.try_take_alert());
    }

    #[test]
    fn test_clear_alert_predicate() {
        let p = place("P");
        p.set_alert_on_change();
        p.add_tokens(1);
        assert!(p.try_take_alert());

        p.clear_alert_predicate();
        p.add_tokens(1);
        assert!(!p.has_pending_alert());
        assert_eq!(p.tokens(), 2);
    }

    #[test]
    fn test_alert_threshold() {
        let p = place("P");
        p.set_alert_at_least(3);
        p.add_tokens(2);
        assert!(!p.has_pending_alert());
        p.add_tokens(1);
        assert!(p.wait_for_alert_timeout(Duration::from_secs(1)));
        assert_eq!(p.tokens(), 3);
    }

    #[test]
    fn test_wait_for_alert_wakes_waiter() {
        let p = Arc::new(place("P"));
        p.set_alert_at_least(1);
        let waiter = {
            let p = Arc::clone(&p);
            thread::spawn(move || {
                p.wait_for_alert();
                p.tokens()
            })
        };
        thread::sleep(Duration::from_millis(20));
        p.add_tokens(1);
        assert_eq!(waiter.join().unwrap(), 1);
    }

    #[test]
    fn test_try_lock_contention() {
        let p = place("P");
        let guard = p.lock();
        assert!(p.try_lock().is_none());
        drop(guard);
        assert!(p.try_lock().is_some());
    }
}
