//! Free-running Petri net execution.
//!
//! Each transition is an actor on its own thread. Adding tokens to a place
//! notifies the transitions reading it, and a notified transition locks every
//! place it touches and fires atomically if its inputs and gates allow it.

pub mod config;
pub use config::{LockStrategy, NetConfig};

pub mod error;
pub use error::NetError;

pub mod mailbox;

mod network;
pub use network::{
    data, AlertPredicate, ArcDirection, ArcKind, EnableBounds, PetriArc, PetriNet, PetriPlace,
    PetriTransition, PlaceKind, Tokens, Weight, WorkerState,
};

pub mod structures;
