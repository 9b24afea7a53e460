use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use super::locking::LockSet;
use super::{ArcKind, EnableBounds, PetriArc, PetriPlace, Tokens, Weight};
use crate::config::NetConfig;
use crate::error::NetError;
use crate::mailbox::Mailbox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    Fire,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    /// Waiting for a readiness signal.
    Idle = 0,
    /// Inside a firing attempt.
    Running = 1,
    Stopped = 2,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            _ => WorkerState::Stopped,
        }
    }
}

/* Invariants:
    - `places` holds every place referenced by `inputs`, `enables` and `outputs`, exactly once,
      in order of first appearance
    - arcs are only ever appended
*/
#[derive(Default)]
struct TransitionArcs {
    inputs: Vec<Arc<PetriArc>>,
    enables: Vec<Arc<PetriArc>>,
    outputs: Vec<Arc<PetriArc>>,
    places: Vec<Arc<PetriPlace>>,
}

impl TransitionArcs {
    fn track(&mut self, place: &Arc<PetriPlace>) {
        if !self.places.iter().any(|known| Arc::ptr_eq(known, place)) {
            self.places.push(Arc::clone(place));
        }
    }

    /// Checks every input and enable arc against the locked marking. Input
    /// weights drawn from the same place are summed, so consuming can't underflow.
    fn is_ready(&self, locks: &LockSet<'_>) -> bool {
        let mut demand: Vec<Tokens> = vec![0; self.places.len()];

        for arc in self.inputs.iter() {
            let tokens = locks.tokens(arc.place());
            if !arc.test(tokens) {
                return false;
            }
            if let ArcKind::Flow { weight } = arc.kind() {
                let index = self.index_of(arc.place());
                demand[index] += weight;
                if tokens < demand[index] {
                    return false;
                }
            }
        }

        self.enables.iter().all(|arc| arc.test(locks.tokens(arc.place())))
    }

    fn index_of(&self, place: &Arc<PetriPlace>) -> usize {
        self.places
            .iter()
            .position(|known| Arc::ptr_eq(known, place))
            .unwrap_or_default()
    }
}

/// An actor moving tokens between places.
///
/// Once its net is started, a worker thread waits on the transition's mailbox
/// and runs a firing attempt on each readiness signal.
pub struct PetriTransition {
    id: String,
    config: Arc<NetConfig>,
    arcs: RwLock<TransitionArcs>,
    mailbox: Mailbox<Signal>,
    state: AtomicU8,
    fired: AtomicU64,
}

impl PetriTransition {
    pub(crate) fn new(id: impl Into<String>, config: Arc<NetConfig>) -> Self {
        Self {
            id: id.into(),
            config,
            arcs: RwLock::new(TransitionArcs::default()),
            mailbox: Mailbox::new(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            fired: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Number of successful firings so far.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Acquire)
    }

    pub fn inputs(&self) -> Vec<Arc<PetriArc>> {
        self.arcs.read().inputs.clone()
    }

    pub fn enables(&self) -> Vec<Arc<PetriArc>> {
        self.arcs.read().enables.clone()
    }

    pub fn outputs(&self) -> Vec<Arc<PetriArc>> {
        self.arcs.read().outputs.clone()
    }

    /// The distinct places this transition locks when firing.
    pub fn places(&self) -> Vec<Arc<PetriPlace>> {
        self.arcs.read().places.clone()
    }

    #[inline]
    pub fn involves(&self, place: &PetriPlace) -> bool {
        self.arcs
            .read()
            .places
            .iter()
            .any(|known| std::ptr::eq(known.as_ref(), place))
    }

    /// Connects this transition to `place` as one of its outputs.
    pub fn connect_to(
        self: &Arc<Self>,
        place: &Arc<PetriPlace>,
        weight: Weight,
    ) -> Result<Arc<PetriArc>, NetError> {
        let arc = Arc::new(PetriArc::output(self, place, weight)?);
        let mut arcs = self.arcs.write();
        arcs.track(place);
        arcs.outputs.push(Arc::clone(&arc));
        Ok(arc)
    }

    /// Only lets this transition fire while `place` holds a count within `bounds`.
    /// Sink places may be read this way.
    pub fn enabled_by(
        self: &Arc<Self>,
        place: &Arc<PetriPlace>,
        bounds: EnableBounds,
    ) -> Result<Arc<PetriArc>, NetError> {
        let arc = Arc::new(PetriArc::enable(place, self, bounds)?);
        {
            let mut arcs = self.arcs.write();
            arcs.track(place);
            arcs.enables.push(Arc::clone(&arc));
        }
        place.attach_outbound(&arc);
        Ok(arc)
    }

    /// Only lets this transition fire while `place` is empty.
    pub fn inhibited_by(self: &Arc<Self>, place: &Arc<PetriPlace>) -> Result<Arc<PetriArc>, NetError> {
        self.enabled_by(place, EnableBounds::inhibit())
    }

    pub(crate) fn attach_input(&self, arc: Arc<PetriArc>) {
        let mut arcs = self.arcs.write();
        arcs.track(arc.place());
        arcs.inputs.push(arc);
    }

    /// Wakes the worker. Signals arriving while one is pending are dropped;
    /// the worker re-checks every condition when it wakes.
    pub fn notify_readiness(&self) {
        if !self.mailbox.offer(Signal::Fire) {
            log::trace!("transition [{}] already has a pending signal", self.id);
        }
    }

    /// Asks the worker to exit once its current attempt, if any, is done.
    pub(crate) fn request_stop(&self) {
        self.mailbox.replace(Signal::Stop);
    }

    /// Atomically consumes the input tokens and produces the output tokens,
    /// provided every input and enable arc is satisfied.
    ///
    /// # Panics
    ///
    /// Panics if a place underflows after validation succeeded, which means a
    /// place was mutated without holding its lock.
    pub(crate) fn firing_attempt(&self) -> bool {
        let arcs = self.arcs.read();
        let mut locks = LockSet::acquire(&arcs.places, &self.config);
        log::trace!(
            "transition [{}] locked {} places in {} rounds",
            self.id,
            arcs.places.len(),
            locks.rounds()
        );

        if !arcs.is_ready(&locks) {
            log::trace!("transition [{}] is not enabled", self.id);
            return false;
        }

        for arc in arcs.inputs.iter() {
            if let Err(error) = arc.consume(&mut locks) {
                panic!("transition [{}] broke the firing protocol: {}", self.id, error);
            }
        }
        for arc in arcs.outputs.iter() {
            if let Err(error) = arc.fire(&mut locks) {
                panic!("transition [{}] broke the firing protocol: {}", self.id, error);
            }
        }
        // Alert predicates only ever see the completed marking.
        locks.raise_alerts();
        drop(locks);

        self.fired.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Worker loop: one firing attempt per readiness signal, until stopped.
    pub(crate) fn run(self: Arc<Self>) {
        let _exit = StopOnExit(self.as_ref());
        log::info!("transition [{}] started", self.id);

        loop {
            self.set_state(WorkerState::Idle);
            match self.mailbox.take() {
                Signal::Stop => break,
                Signal::Fire => {
                    self.set_state(WorkerState::Running);
                    if self.firing_attempt() {
                        log::debug!("transition [{}] fired", self.id);
                    }
                }
            }
        }

        log::info!("transition [{}] stopped", self.id);
    }
}

/// Marks the transition stopped however the worker loop exits.
struct StopOnExit<'a>(&'a PetriTransition);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        self.0.set_state(WorkerState::Stopped);
    }
}

impl fmt::Debug for PetriTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PetriTransition")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("fired", &self.fired())
            .finish()
    }
}

impl fmt::Display for PetriTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transition: ID [{}] {{", self.id)?;
        for arc in self.outputs() {
            write!(f, "{}, ", arc)?;
        }
        write!(f, "}}")
    }
}
