//! Core host types for the baby care tracker
//!
//! The tracker runs on a small Home-Assistant-style host. This crate holds the
//! value types every other crate passes around: EntityId, State, Event,
//! Context and ServiceCall, plus the event names the tracker listens to.

mod context;
pub mod domains;
mod entity_id;
mod event;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{slugify, EntityId, EntityIdError};
pub use event::{Event, EventData, EventType};
pub use service_call::ServiceCall;
pub use state::{State, STATE_OFF, STATE_ON, STATE_UNKNOWN};

/// Standard event types
pub mod events {
    use super::*;

    /// Fired by the state store whenever an entity state is written or removed
    pub const STATE_CHANGED: &str = "state_changed";

    /// Zigbee (ZHA) remote/button events
    pub const ZHA_EVENT: &str = "zha_event";

    /// deCONZ remote/button events
    pub const DECONZ_EVENT: &str = "deconz_event";

    /// Data for STATE_CHANGED events
    #[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<State>,
        pub new_state: Option<State>,
    }

    impl EventData for StateChangedData {
        fn event_type() -> &'static str {
            STATE_CHANGED
        }
    }
}
