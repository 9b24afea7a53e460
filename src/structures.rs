//! Reusable sub-nets built on top of the public API.
use std::sync::Arc;

use crate::error::NetError;
use crate::network::{EnableBounds, PetriArc, PetriNet, PetriPlace, PetriTransition, Tokens};

fn prefixed(id: &str, name: &str) -> String {
    if id.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", id, name)
    }
}

/// Every token put in `input` flips `output` between zero and one token.
pub struct ToggleSwitch {
    pub input: Arc<PetriPlace>,
    pub output: Arc<PetriPlace>,
}

pub fn toggle_switch(net: &mut PetriNet, id: &str) -> Result<ToggleSwitch, NetError> {
    let input = net.new_place(prefixed(id, "In"));
    let output = net.new_place(prefixed(id, "Out"));

    let on = net.new_transition(prefixed(id, "On"));
    input.connect_to(&on, 1)?;
    on.inhibited_by(&output)?;
    on.connect_to(&output, 1)?;

    let off = net.new_transition(prefixed(id, "Off"));
    input.connect_to(&off, 1)?;
    output.connect_to(&off, 1)?;

    Ok(ToggleSwitch { input, output })
}

/// Every token put in `input` increments `count`, which wraps to zero at `modulo`.
pub struct ModuloCounter {
    pub input: Arc<PetriPlace>,
    pub count: Arc<PetriPlace>,
    pub modulo: Tokens,
}

/// # Panics
///
/// Panics if `modulo < 2`.
pub fn modulo_counter(net: &mut PetriNet, id: &str, modulo: Tokens) -> Result<ModuloCounter, NetError> {
    assert!(modulo >= 2, "a modulo counter needs at least two states");

    let input = net.new_place(prefixed(id, "In"));
    let count = net.new_place(prefixed(id, "Cnt"));

    let increment = net.new_transition(prefixed(id, "Inc"));
    input.connect_to(&increment, 1)?;
    increment.connect_to(&count, 1)?;
    increment.enabled_by(&count, EnableBounds::at_most(modulo - 2))?;

    let reset = net.new_transition(prefixed(id, "Rst"));
    count.connect_to(&reset, modulo - 1)?;
    input.connect_to(&reset, 1)?;

    Ok(ModuloCounter { input, count, modulo })
}

/// Moves every token of `x` and `y` into `sum` while `run` holds a token.
/// `next` consumes the `run` token once both operands are drained.
pub struct Adder {
    pub run: Arc<PetriPlace>,
    pub sum: Arc<PetriPlace>,
    pub next: Arc<PetriTransition>,
}

pub fn adder(
    net: &mut PetriNet,
    id: &str,
    x: &Arc<PetriPlace>,
    y: &Arc<PetriPlace>,
) -> Result<Adder, NetError> {
    let sum = net.new_place(prefixed(id, "Sum"));
    let run = net.new_place(prefixed(id, "Run"));

    for (operand, name) in [(x, "AddX"), (y, "AddY")] {
        let add = net.new_transition(prefixed(id, name));
        operand.connect_to(&add, 1)?;
        add.connect_to(&sum, 1)?;
        add.enabled_by(&run, EnableBounds::at_least(1))?;
    }

    let next = net.new_transition(prefixed(id, "Next"));
    run.connect_to(&next, 1)?;
    next.inhibited_by(x)?;
    next.inhibited_by(y)?;

    Ok(Adder { run, sum, next })
}

/// A counting semaphore place guarding sections of a net.
pub struct Semaphore(Arc<PetriPlace>);

impl Semaphore {
    /// Fails if `value` does not fit in a single token delta.
    pub fn new(net: &mut PetriNet, id: &str, value: Tokens) -> Result<Self, NetError> {
        let place = net.new_place(prefixed(id, "Sem"));
        let delta = i64::try_from(value).map_err(|_| NetError::Overflow {
            place: place.id().to_string(),
            tokens: place.tokens(),
            added: value,
        })?;
        place.try_add_tokens(delta)?;

        Ok(Self(place))
    }

    pub fn place(&self) -> &Arc<PetriPlace> {
        &self.0
    }

    /// `transition` takes a permit when it fires.
    pub fn p(&self, transition: &Arc<PetriTransition>) -> Result<Arc<PetriArc>, NetError> {
        self.0.connect_to(transition, 1)
    }

    /// `transition` gives a permit back when it fires.
    pub fn v(&self, transition: &Arc<PetriTransition>) -> Result<Arc<PetriArc>, NetError> {
        transition.connect_to(&self.0, 1)
    }
}
