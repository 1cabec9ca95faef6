//! Entity domain names and their trigger behaviour
//!
//! Physical inputs show up as entities in a handful of domains. How a state
//! change on such an entity should be read depends on the domain: a button's
//! state is the time of its last press, a switch flips between on and off,
//! everything else is just a value.

pub const BUTTON: &str = "button";
pub const INPUT_BUTTON: &str = "input_button";
pub const SWITCH: &str = "switch";
pub const BINARY_SENSOR: &str = "binary_sensor";

/// How state changes in a domain translate into presses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStyle {
    /// Every state write is a press (`button`, `input_button`)
    Press,
    /// Only an off-to-on edge is a press (`switch`, `binary_sensor`)
    RisingEdge,
    /// Any change of value is a press
    ValueChange,
}

impl TriggerStyle {
    pub fn for_domain(domain: &str) -> Self {
        match domain {
            BUTTON | INPUT_BUTTON => Self::Press,
            SWITCH | BINARY_SENSOR => Self::RisingEdge,
            _ => Self::ValueChange,
        }
    }
}
