use thiserror::Error;

use crate::network::{Tokens, Weight};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("arc {arc} must have a weight of at least 1, got {weight}")]
    InvalidWeight { arc: String, weight: Weight },
    #[error("arc {arc} has an empty range: low {low} > high {high}")]
    InvalidBounds { arc: String, low: Tokens, high: Tokens },
    #[error("place {place} is a sink and no transition may consume from it")]
    SinkPlace { place: String },
    #[error("place {place} cannot hold a negative amount of tokens: {tokens} + ({delta})")]
    Underflow {
        place: String,
        tokens: Tokens,
        delta: i64,
    },
    #[error("place {place} cannot take {added} more tokens on top of {tokens}")]
    Overflow {
        place: String,
        tokens: Tokens,
        added: Tokens,
    },
    #[error("net {net} has already been started")]
    AlreadyStarted { net: String },
    #[error("net {net} is not running")]
    NotRunning { net: String },
    #[error("could not spawn a worker for transition {transition}: {reason}")]
    Spawn { transition: String, reason: String },
    #[error("worker of transition {transition} panicked")]
    WorkerPanicked { transition: String },
}
