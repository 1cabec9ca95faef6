//! Trigger listener
//!
//! One task per baby watches the event bus and turns mapped state changes
//! and button presses into tracker commands. Channels with no mapping are
//! not subscribed. Matched commands are handed to the baby's command queue,
//! so a slow save never holds up the event loop.

use std::sync::Arc;

use bct_core::events::{StateChangedData, DECONZ_EVENT, STATE_CHANGED, ZHA_EVENT};
use bct_core::Event;
use bct_event_bus::EventReceiver;
use bct_registries::Registries;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::dispatch::{match_button_press, should_trigger, ButtonMatch, ButtonPress};
use crate::hass::Hass;
use crate::mapping::MappingTable;
use crate::worker::CommandSender;

pub struct TriggerListener {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

struct Receivers {
    state: Option<EventReceiver>,
    zha: Option<EventReceiver>,
    deconz: Option<EventReceiver>,
}

impl Receivers {
    fn is_empty(&self) -> bool {
        self.state.is_none() && self.zha.is_none() && self.deconz.is_none()
    }
}

/// Receive from an optional channel; an absent one never yields
async fn recv(rx: &mut Option<EventReceiver>) -> Result<Event<Value>, RecvError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl TriggerListener {
    /// Subscribe for `table` and start the listener task
    ///
    /// Subscriptions are taken before this returns, so events fired right
    /// after are not missed.
    pub fn start(
        hass: &Hass,
        baby_name: &str,
        table: MappingTable,
        commands: CommandSender,
    ) -> Self {
        let receivers = Receivers {
            state: table
                .has_state_triggers()
                .then(|| hass.bus.subscribe(STATE_CHANGED)),
            zha: table
                .has_button_triggers()
                .then(|| hass.bus.subscribe(ZHA_EVENT)),
            deconz: table
                .has_button_triggers()
                .then(|| hass.bus.subscribe(DECONZ_EVENT)),
        };
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        info!(
            baby = %baby_name,
            mappings = table.len(),
            "Starting trigger listener"
        );

        let handle = tokio::spawn(run(
            receivers,
            shutdown_rx,
            baby_name.to_string(),
            hass.registries.clone(),
            table,
            commands,
        ));

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the task and wait for it to finish
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Trigger listener task ended abnormally");
        }
    }
}

async fn run(
    mut receivers: Receivers,
    mut shutdown_rx: broadcast::Receiver<()>,
    baby_name: String,
    registries: Arc<Registries>,
    table: MappingTable,
    commands: CommandSender,
) {
    while !receivers.is_empty() {
        tokio::select! {
            result = recv(&mut receivers.state) => match result {
                Ok(event) => handle_state_changed(&event, &table, &commands),
                Err(e) => on_recv_error(e, STATE_CHANGED, &mut receivers.state),
            },
            result = recv(&mut receivers.zha) => match result {
                Ok(event) => handle_button_event(&event, &registries, &table, &commands),
                Err(e) => on_recv_error(e, ZHA_EVENT, &mut receivers.zha),
            },
            result = recv(&mut receivers.deconz) => match result {
                Ok(event) => handle_button_event(&event, &registries, &table, &commands),
                Err(e) => on_recv_error(e, DECONZ_EVENT, &mut receivers.deconz),
            },
            _ = shutdown_rx.recv() => {
                debug!("Trigger listener received shutdown signal");
                break;
            }
        }
    }

    info!(baby = %baby_name, "Trigger listener stopped");
}

fn on_recv_error(err: RecvError, channel: &str, rx: &mut Option<EventReceiver>) {
    match err {
        RecvError::Lagged(n) => warn!(channel, skipped = n, "Trigger listener lagged"),
        RecvError::Closed => {
            info!(channel, "Event channel closed");
            *rx = None;
        }
    }
}

fn handle_state_changed(event: &Event<Value>, table: &MappingTable, commands: &CommandSender) {
    let Ok(data) = serde_json::from_value::<StateChangedData>(event.data.clone()) else {
        warn!("Malformed state_changed event");
        return;
    };

    let entity_id = data.entity_id.to_string();
    let Some(action) = table.state_action(&entity_id) else {
        return;
    };

    if !should_trigger(data.old_state.as_ref(), data.new_state.as_ref()) {
        trace!(%entity_id, %action, "State change does not count as a press");
        return;
    }

    debug!(%entity_id, %action, "Mapped entity triggered");
    commands.send(action, entity_id, event.context.child());
}

fn handle_button_event(
    event: &Event<Value>,
    registries: &Registries,
    table: &MappingTable,
    commands: &CommandSender,
) {
    let Some(press) = ButtonPress::from_event_data(&event.data) else {
        trace!(event_type = %event.event_type, "Button event without device or command");
        return;
    };

    match match_button_press(&press, &registries.entities, table) {
        ButtonMatch::Matched { entity_id, action } => {
            debug!(
                %entity_id,
                %action,
                command = %press.command,
                "Mapped button pressed"
            );
            commands.send(action, entity_id, event.context.child());
        }
        ButtonMatch::UnknownDevice => {
            debug!(device_id = %press.device_id, "Button device not in entity registry");
        }
        ButtonMatch::NotMapped => {
            trace!(device_id = %press.device_id, "Not a mapped button");
        }
        ButtonMatch::LabelMismatch {
            entity_id,
            configured,
            received,
        } => {
            debug!(
                %entity_id,
                configured = ?configured,
                %received,
                "Button label does not match any mapping"
            );
        }
    }
}
