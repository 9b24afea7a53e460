use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Weak};

use super::locking::LockSet;
use super::{PetriPlace, PetriTransition, Tokens, Weight};
use crate::error::NetError;

/// Inclusive token range gating a transition. A missing bound is unbounded on that side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnableBounds {
    pub low: Option<Tokens>,
    pub high: Option<Tokens>,
}

impl EnableBounds {
    pub const fn new(low: Option<Tokens>, high: Option<Tokens>) -> Self {
        Self { low, high }
    }

    pub const fn at_least(low: Tokens) -> Self {
        Self::new(Some(low), None)
    }

    pub const fn at_most(high: Tokens) -> Self {
        Self::new(None, Some(high))
    }

    pub const fn exactly(tokens: Tokens) -> Self {
        Self::new(Some(tokens), Some(tokens))
    }

    /// Only lets a transition fire while the place is empty.
    pub const fn inhibit() -> Self {
        Self::exactly(0)
    }

    #[inline]
    pub fn contains(&self, tokens: Tokens) -> bool {
        self.low.map_or(true, |low| tokens >= low) && self.high.map_or(true, |high| tokens <= high)
    }

    pub fn is_inhibition(&self) -> bool {
        self.low == Some(0) && self.high == Some(0)
    }

    pub(crate) fn validate(&self, arc: &str) -> Result<(), NetError> {
        match (self.low, self.high) {
            (Some(low), Some(high)) if low > high => Err(NetError::InvalidBounds {
                arc: arc.to_string(),
                low,
                high,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for EnableBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.low, self.high) {
            (Some(low), Some(high)) if low == high => write!(f, "<{}>", low),
            (low, high) => {
                write!(f, "<")?;
                if let Some(low) = low {
                    write!(f, "{}", low)?;
                }
                write!(f, ",")?;
                if let Some(high) = high {
                    write!(f, "{}", high)?;
                }
                write!(f, ">")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArcKind {
    /// Moves `weight` tokens when the transition fires.
    Flow { weight: Weight },
    /// Reads the place without moving tokens.
    Enable(EnableBounds),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcDirection {
    PlaceToTransition,
    TransitionToPlace,
}

/// A link between a place and a transition. Immutable once created.
pub struct PetriArc {
    id: String,
    kind: ArcKind,
    direction: ArcDirection,
    place: Arc<PetriPlace>,
    transition: Weak<PetriTransition>,
}

impl PetriArc {
    pub(crate) fn input(
        place: &Arc<PetriPlace>,
        transition: &Arc<PetriTransition>,
        weight: Weight,
    ) -> Result<Self, NetError> {
        let id = format!("{} >{}> {}", place.id(), weight, transition.id());
        Self::flow(id, weight, ArcDirection::PlaceToTransition, place, transition)
    }

    pub(crate) fn output(
        transition: &Arc<PetriTransition>,
        place: &Arc<PetriPlace>,
        weight: Weight,
    ) -> Result<Self, NetError> {
        let id = format!("{} >{}> {}", transition.id(), weight, place.id());
        Self::flow(id, weight, ArcDirection::TransitionToPlace, place, transition)
    }

    pub(crate) fn enable(
        place: &Arc<PetriPlace>,
        transition: &Arc<PetriTransition>,
        bounds: EnableBounds,
    ) -> Result<Self, NetError> {
        let id = if bounds.is_inhibition() {
            format!("{} >o {}", place.id(), transition.id())
        } else {
            format!("{} >{}> {}", place.id(), bounds, transition.id())
        };
        bounds.validate(&id)?;

        Ok(Self {
            id,
            kind: ArcKind::Enable(bounds),
            direction: ArcDirection::PlaceToTransition,
            place: Arc::clone(place),
            transition: Arc::downgrade(transition),
        })
    }

    fn flow(
        id: String,
        weight: Weight,
        direction: ArcDirection,
        place: &Arc<PetriPlace>,
        transition: &Arc<PetriTransition>,
    ) -> Result<Self, NetError> {
        if weight == 0 {
            return Err(NetError::InvalidWeight { arc: id, weight });
        }

        Ok(Self {
            id,
            kind: ArcKind::Flow { weight },
            direction,
            place: Arc::clone(place),
            transition: Arc::downgrade(transition),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ArcKind {
        self.kind
    }

    pub fn direction(&self) -> ArcDirection {
        self.direction
    }

    pub fn place(&self) -> &Arc<PetriPlace> {
        &self.place
    }

    /// The owning transition, if it is still alive.
    pub fn transition(&self) -> Option<Arc<PetriTransition>> {
        self.transition.upgrade()
    }

    /// Flow arcs: whether `tokens` covers the weight. Enable arcs: whether `tokens` is in range.
    #[inline]
    pub fn test(&self, tokens: Tokens) -> bool {
        match self.kind {
            ArcKind::Flow { weight } => tokens >= weight,
            ArcKind::Enable(bounds) => bounds.contains(tokens),
        }
    }

    /// Takes `weight` tokens out of the place. The place must be held by `locks`.
    pub(crate) fn consume(&self, locks: &mut LockSet<'_>) -> Result<(), NetError> {
        match self.kind {
            ArcKind::Flow { weight } => locks.apply(&self.place, -(weight as i64)).map(|_| ()),
            ArcKind::Enable(_) => Ok(()),
        }
    }

    /// Puts `weight` tokens into the place. The place must be held by `locks`.
    pub(crate) fn fire(&self, locks: &mut LockSet<'_>) -> Result<(), NetError> {
        match self.kind {
            ArcKind::Flow { weight } => locks.apply(&self.place, weight as i64).map(|_| ()),
            ArcKind::Enable(_) => Ok(()),
        }
    }

    /// Wakes the owning transition if `tokens` could satisfy this arc.
    pub(crate) fn notify(&self, tokens: Tokens) {
        if !self.test(tokens) {
            return;
        }
        if let Some(transition) = self.transition.upgrade() {
            log::trace!("arc [{}] notifies transition [{}]", self.id, transition.id());
            transition.notify_readiness();
        }
    }
}

impl fmt::Debug for PetriArc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PetriArc")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("direction", &self.direction)
            .finish()
    }
}

impl fmt::Display for PetriArc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ArcKind::Flow { weight } => write!(f, "ID [{}] Weight [{}]", self.id, weight),
            ArcKind::Enable(bounds) => write!(f, "ID [{}] Range [{}]", self.id, bounds),
        }
    }
}
