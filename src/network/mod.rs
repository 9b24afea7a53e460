use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::NetConfig;
use crate::error::NetError;

mod arc;
pub use arc::{ArcDirection, ArcKind, EnableBounds, PetriArc};

pub mod data;
use data::{ArcLabel, ArcSnapshot, NetSnapshot, PlaceSnapshot, TransitionSnapshot};

#[cfg(feature = "export_dot")]
pub(crate) mod export_dot;

pub(crate) mod locking;

mod place;
pub use place::{AlertPredicate, PetriPlace, PlaceKind};

mod transition;
pub use transition::{PetriTransition, WorkerState};

pub type Tokens = u64;
pub type Weight = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Built,
    Running,
    Stopped,
}

/// Owns the places and transitions of a net, and the worker threads running them.
///
/// Entities are never removed; they live as long as the net (or any handle to them).
pub struct PetriNet {
    id: String,
    config: Arc<NetConfig>,
    places: Vec<Arc<PetriPlace>>,
    transitions: Vec<Arc<PetriTransition>>,
    workers: Vec<(Arc<PetriTransition>, JoinHandle<()>)>,
    lifecycle: Lifecycle,
}

impl PetriNet {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, NetConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: NetConfig) -> Self {
        Self {
            id: id.into(),
            config: Arc::new(config),
            places: Vec::new(),
            transitions: Vec::new(),
            workers: Vec::new(),
            lifecycle: Lifecycle::Built,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn new_place(&mut self, id: impl Into<String>) -> Arc<PetriPlace> {
        self.push_place(PetriPlace::new(id, PlaceKind::Regular))
    }

    /// A place that only collects tokens; connecting it to a transition fails.
    pub fn new_sink_place(&mut self, id: impl Into<String>) -> Arc<PetriPlace> {
        self.push_place(PetriPlace::new(id, PlaceKind::Sink))
    }

    fn push_place(&mut self, place: PetriPlace) -> Arc<PetriPlace> {
        let place = Arc::new(place);
        self.places.push(Arc::clone(&place));
        place
    }

    pub fn new_transition(&mut self, id: impl Into<String>) -> Arc<PetriTransition> {
        let transition = Arc::new(PetriTransition::new(id, Arc::clone(&self.config)));
        if self.lifecycle != Lifecycle::Built {
            log::warn!(
                "transition [{}] was added to net [{}] after start and will not run",
                transition.id(),
                self.id
            );
        }
        self.transitions.push(Arc::clone(&transition));
        transition
    }

    pub fn places(&self) -> &[Arc<PetriPlace>] {
        &self.places
    }

    pub fn transitions(&self) -> &[Arc<PetriTransition>] {
        &self.transitions
    }

    pub fn get_place(&self, id: &str) -> Option<&Arc<PetriPlace>> {
        self.places.iter().find(|place| place.id() == id)
    }

    pub fn get_transition(&self, id: &str) -> Option<&Arc<PetriTransition>> {
        self.transitions.iter().find(|transition| transition.id() == id)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Spawns one worker thread per transition.
    pub fn start(&mut self) -> Result<(), NetError> {
        if self.lifecycle != Lifecycle::Built {
            return Err(NetError::AlreadyStarted {
                net: self.id.clone(),
            });
        }

        log::info!(
            "starting net [{}] with {} places and {} transitions",
            self.id,
            self.places.len(),
            self.transitions.len()
        );

        self.lifecycle = Lifecycle::Running;
        let transitions = self.transitions.clone();
        for transition in transitions.iter() {
            let worker = Arc::clone(transition);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.config.worker_name_prefix, transition.id()))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => self.workers.push((Arc::clone(transition), handle)),
                Err(error) => {
                    log::error!("could not spawn worker for transition [{}]: {}", transition.id(), error);
                    // Unwind the workers that did start.
                    let _ = self.stop();
                    return Err(NetError::Spawn {
                        transition: transition.id().to_string(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Stops every worker and waits for all of them to exit. An attempt in
    /// progress completes first, so no firing happens after this returns.
    pub fn stop(&mut self) -> Result<(), NetError> {
        if self.lifecycle != Lifecycle::Running {
            return Err(NetError::NotRunning {
                net: self.id.clone(),
            });
        }
        self.lifecycle = Lifecycle::Stopped;

        for (transition, _) in self.workers.iter() {
            transition.request_stop();
        }

        let mut result = Ok(());
        for (transition, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("worker of transition [{}] panicked", transition.id());
                if result.is_ok() {
                    result = Err(NetError::WorkerPanicked {
                        transition: transition.id().to_string(),
                    });
                }
            }
        }

        log::info!("net [{}] stopped", self.id);
        result
    }

    /// Token count of every place, in creation order.
    pub fn marking(&self) -> Vec<(String, Tokens)> {
        self.places
            .iter()
            .map(|place| (place.id().to_string(), place.tokens()))
            .collect()
    }

    pub fn total_tokens(&self) -> Tokens {
        self.places.iter().map(|place| place.tokens()).sum()
    }

    /// Read-only view of the net. Counts are read without locking, so a
    /// snapshot taken while running need not be a reachable marking.
    pub fn snapshot(&self) -> NetSnapshot {
        let places = self
            .places
            .iter()
            .map(|place| PlaceSnapshot {
                id: place.id().to_string(),
                tokens: place.tokens(),
                kind: place.kind(),
            })
            .collect();

        let mut transitions = Vec::with_capacity(self.transitions.len());
        let mut arcs = Vec::new();
        for transition in self.transitions.iter() {
            transitions.push(TransitionSnapshot {
                id: transition.id().to_string(),
                state: transition.state(),
                fired: transition.fired(),
            });

            let incoming = transition.inputs().into_iter().chain(transition.enables());
            for arc in incoming.chain(transition.outputs()) {
                arcs.push(ArcSnapshot::from(arc.as_ref()));
            }
        }

        NetSnapshot {
            id: self.id.clone(),
            places,
            transitions,
            arcs,
        }
    }
}

impl Drop for PetriNet {
    fn drop(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            if let Err(error) = self.stop() {
                log::error!("{}", error);
            }
        }
    }
}

impl From<&PetriArc> for ArcSnapshot {
    fn from(arc: &PetriArc) -> Self {
        let transition = arc
            .transition()
            .map(|transition| transition.id().to_string())
            .unwrap_or_default();
        let place = arc.place().id().to_string();
        let (source, target) = match arc.direction() {
            ArcDirection::PlaceToTransition => (place, transition),
            ArcDirection::TransitionToPlace => (transition, place),
        };
        let label = match arc.kind() {
            ArcKind::Flow { weight } => ArcLabel::Weight(weight),
            ArcKind::Enable(bounds) => ArcLabel::Range {
                low: bounds.low,
                high: bounds.high,
            },
        };

        ArcSnapshot {
            id: arc.id().to_string(),
            source,
            target,
            direction: arc.direction(),
            label,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use std::time::Duration;

    pub(crate) const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn test_trigger() {
        let mut net = PetriNet::new("trigger");
        let p1 = net.new_place("P1");
        let p2 = net.new_place("P2");
        let t = net.new_transition("T");
        let end = net.new_sink_place("PEnd");
        end.set_alert_at_least(1);
        p1.connect_to(&t, 1).unwrap();
        p2.connect_to(&t, 2).unwrap();
        t.connect_to(&end, 1).unwrap();

        net.start().unwrap();
        p1.add_tokens(1);
        p2.add_tokens(2);
        assert!(end.wait_for_alert_timeout(TIMEOUT));
        net.stop().unwrap();

        assert_eq!(net.marking(), vec![
            ("P1".to_string(), 0),
            ("P2".to_string(), 0),
            ("PEnd".to_string(), 1),
        ]);
        assert_eq!(t.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_tokens_before_start() {
        let mut net = PetriNet::new("early");
        let p = net.new_place("P");
        let t = net.new_transition("T");
        let end = net.new_place("End");
        p.connect_to(&t, 1).unwrap();
        t.connect_to(&end, 1).unwrap();
        end.set_alert_at_least(3);

        p.add_tokens(3);
        assert_eq!(end.tokens(), 0);
        net.start().unwrap();
        assert!(end.wait_for_alert_timeout(TIMEOUT));
        net.stop().unwrap();
        assert_eq!((p.tokens(), end.tokens()), (0, 3));
        assert_eq!(t.fired(), 3);
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut net = PetriNet::new("lifecycle");
        net.new_transition("T");
        assert_eq!(
            net.stop(),
            Err(NetError::NotRunning {
                net: "lifecycle".to_string()
            })
        );
        net.start().unwrap();
        assert!(net.is_running());
        assert!(matches!(net.start(), Err(NetError::AlreadyStarted { .. })));
        net.stop().unwrap();
        assert!(!net.is_running());
        assert!(matches!(net.start(), Err(NetError::AlreadyStarted { .. })));
        assert!(matches!(net.stop(), Err(NetError::NotRunning { .. })));
    }

    #[test]
    fn test_no_firing_after_stop() {
        let mut net = PetriNet::new("stopped");
        let p = net.new_place("P");
        let t = net.new_transition("T");
        let q = net.new_place("Q");
        p.connect_to(&t, 1).unwrap();
        t.connect_to(&q, 1).unwrap();

        net.start().unwrap();
        net.stop().unwrap();
        p.add_tokens(5);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!((p.tokens(), q.tokens()), (5, 0));
    }

    #[test]
    fn test_drop_stops_workers() {
        let t;
        {
            let mut net = PetriNet::new("dropped");
            t = net.new_transition("T");
            net.start().unwrap();
        }
        assert_eq!(t.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_panicking_alert_keeps_marking_whole() {
        let mut net = PetriNet::new("panicking");
        let a = net.new_place("A");
        let t = net.new_transition("T");
        let b = net.new_place("B");
        a.connect_to(&t, 1).unwrap();
        t.connect_to(&b, 1).unwrap();
        a.set_alert_predicate(|place| {
            if place.tokens() == 0 {
                panic!("alert predicate gave up");
            }
            false
        });
        a.add_tokens(1);

        net.start().unwrap();
        let deadline = std::time::Instant::now() + TIMEOUT;
        while t.state() != WorkerState::Stopped && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }

        assert_eq!(
            net.stop(),
            Err(NetError::WorkerPanicked {
                transition: "T".to_string()
            })
        );
        assert_eq!((a.tokens(), b.tokens()), (0, 1));
        assert_eq!(net.total_tokens(), 1);
        assert!(!net.is_running());
    }

    #[test]
    fn test_config_is_shared() {
        let config = NetConfig::default()
            .lock_strategy(crate::config::LockStrategy::Ordered)
            .worker_name_prefix("worker");
        let net = PetriNet::with_config("configured", config.clone());
        assert_eq!(net.config(), &config);
        assert_eq!(net.id(), "configured");
        assert_eq!(PetriNet::new("plain").config(), &NetConfig::default());
    }

    #[test]
    fn test_lookup() {
        let mut net = PetriNet::new("lookup");
        net.new_place("A");
        net.new_transition("T");
        assert!(net.get_place("A").is_some());
        assert!(net.get_place("T").is_none());
        assert!(net.get_transition("T").is_some());
    }

    #[test]
    fn test_snapshot() {
        let mut net = PetriNet::new("snapshot");
        let p = net.new_place("P");
        let gate = net.new_place("G");
        let t = net.new_transition("T");
        let q = net.new_sink_place("Q");
        p.connect_to(&t, 2).unwrap();
        t.enabled_by(&gate, EnableBounds::at_least(1)).unwrap();
        t.connect_to(&q, 1).unwrap();
        p.add_tokens(4);

        let snapshot = net.snapshot();
        assert_eq!(snapshot.id, "snapshot");
        assert_eq!(snapshot.places.len(), 3);
        assert_eq!(snapshot.places[0].tokens, 4);
        assert_eq!(snapshot.places[2].kind, PlaceKind::Sink);
        assert_eq!(snapshot.transitions[0].state, WorkerState::Idle);
        assert_eq!(snapshot.arcs.len(), 3);
        assert_eq!(snapshot.arcs[0].source, "P");
        assert_eq!(snapshot.arcs[0].target, "T");
        assert_eq!(snapshot.arcs[0].label, ArcLabel::Weight(2));
        assert_eq!(
            snapshot.arcs[1].label,
            ArcLabel::Range {
                low: Some(1),
                high: None
            }
        );
        assert_eq!(snapshot.arcs[2].source, "T");
        assert_eq!(snapshot.arcs[2].target, "Q");
        assert_eq!(snapshot.total_tokens(), 4);
    }
}
