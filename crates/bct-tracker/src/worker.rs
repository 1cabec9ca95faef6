//! Per-baby command queue
//!
//! Triggered commands are queued and run by a single task, one at a time and
//! in the order the listener saw their events. Queueing never blocks the
//! listener, and a failed command is logged without stopping the queue.

use std::sync::Arc;

use bct_core::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::action::MappedAction;
use crate::consts::NOTE_BUTTON_TRIGGERED;
use crate::coordinator::BabyCoordinator;

#[derive(Debug)]
struct QueuedCommand {
    action: MappedAction,
    entity_id: String,
    context: Context,
}

/// Handle the listener queues triggered actions through
#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<QueuedCommand>,
}

impl CommandSender {
    pub fn send(&self, action: MappedAction, entity_id: String, context: Context) {
        let queued = QueuedCommand {
            action,
            entity_id,
            context,
        };
        if let Err(mpsc::error::SendError(dropped)) = self.tx.send(queued) {
            warn!(
                action = %dropped.action,
                entity_id = %dropped.entity_id,
                "Command worker stopped, dropping triggered action"
            );
        }
    }
}

pub struct CommandWorker {
    sender: CommandSender,
    handle: JoinHandle<()>,
}

impl CommandWorker {
    pub fn start(coordinator: Arc<BabyCoordinator>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedCommand>();

        let handle = tokio::spawn(async move {
            while let Some(queued) = rx.recv().await {
                if let Err(e) = coordinator
                    .execute(queued.action.command(), NOTE_BUTTON_TRIGGERED, &queued.context)
                    .await
                {
                    error!(
                        baby = %coordinator.baby_name(),
                        action = %queued.action,
                        entity_id = %queued.entity_id,
                        error = %e,
                        "Mapped action failed"
                    );
                }
            }
            debug!(baby = %coordinator.baby_name(), "Command worker stopped");
        });

        Self {
            sender: CommandSender { tx },
            handle,
        }
    }

    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Close the queue and wait until every queued command has run
    ///
    /// Senders handed out earlier must be gone (listener stopped) for the
    /// queue to close.
    pub async fn drain(self) {
        drop(self.sender);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Command worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityType;
    use crate::clock::MockClock;
    use crate::hass::Hass;
    use crate::sensor::BabySensors;
    use crate::store::entry_store;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn coordinator(hass: &Hass) -> Arc<BabyCoordinator> {
        let clock = MockClock::at(
            NaiveDate::from_ymd_opt(2025, 8, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        let sensors = BabySensors::register(hass, "entry1", "Emma").unwrap();
        Arc::new(BabyCoordinator::new(
            "entry1",
            "Emma",
            None,
            entry_store(hass.registries.storage.clone(), "entry1"),
            Arc::new(clock),
            sensors,
        ))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_commands_run_in_order() {
        let dir = TempDir::new().unwrap();
        let hass = Hass::new(dir.path());
        let coord = coordinator(&hass);
        let worker = CommandWorker::start(coord.clone());
        let sender = worker.sender();

        for _ in 0..50 {
            sender.send(
                MappedAction::FeedingStartLeft,
                "input_button.start".into(),
                Context::new(),
            );
            sender.send(
                MappedAction::FeedingStop,
                "input_button.stop".into(),
                Context::new(),
            );
        }
        drop(sender);
        worker.drain().await;

        let data = coord.snapshot().await;
        assert!(data.current_feeding.is_none());
        assert_eq!(data.activities.len(), 50);
        assert!(data
            .activities
            .iter()
            .all(|r| r.notes == "Button triggered Button triggered"));
        assert_eq!(coord.daily_activities(ActivityType::Feeding).await.len(), 50);
    }

    #[tokio::test]
    async fn test_send_to_stopped_worker_is_dropped() {
        let dir = TempDir::new().unwrap();
        let hass = Hass::new(dir.path());
        let coord = coordinator(&hass);
        let CommandWorker { sender, handle } = CommandWorker::start(coord.clone());

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        sender.send(MappedAction::DiaperPee, "switch.a".into(), Context::new());
        assert!(coord.snapshot().await.activities.is_empty());
    }
}
