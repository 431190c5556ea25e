// Change notifications and backup progress payloads

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use serde::Serialize;

use crate::db::schema::Uid;

/// Progress payload emitted while a backup runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProgress {
    pub phase: String,
    pub current: u64,
    pub total: u64,
    pub percent: f64,
    pub message: String,
    pub is_error: bool,
    pub error_message: Option<String>,
}

impl BackupProgress {
    pub fn new(phase: impl Into<String>, current: u64, total: u64) -> Self {
        let total_safe = total.max(1);
        let percent = (current as f64 / total_safe as f64) * 100.0;
        Self {
            phase: phase.into(),
            current,
            total,
            percent: percent.min(100.0),
            message: String::new(),
            is_error: false,
            error_message: None,
        }
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = msg.into();
        self
    }

    pub fn error(mut self, msg: impl Into<String>) -> Self {
        self.is_error = true;
        self.error_message = Some(msg.into());
        self
    }
}

/// Something read caches must requery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum LibraryEvent {
    CollectionChanged { collection: String },
    CollectionCreated { collection: String },
    CollectionRenamed { old: String, new: String },
    CollectionDeleted { collection: String },
    SoundsChanged { uids: Vec<Uid> },
    TagsChanged,
    TemplatesChanged,
    WavetablesChanged,
    Backup(BackupProgress),
}

/// Fan-out of library events to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<LibraryEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<LibraryEvent> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Send to every live subscriber; dropped receivers are pruned.
    pub fn emit(&self, event: LibraryEvent) {
        let Ok(mut subs) = self.subscribers.lock() else {
            log::warn!("Event bus lock poisoned, dropping {:?}", event);
            return;
        };
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent_clamped() {
        let progress = BackupProgress::new("copy", 30, 20);
        assert_eq!(progress.percent, 100.0);
        let empty = BackupProgress::new("copy", 0, 0);
        assert_eq!(empty.percent, 0.0);
        let failed = BackupProgress::new("copy", 1, 2).error("disk full");
        assert!(failed.is_error);
    }

    #[test]
    fn test_bus_prunes_dropped_receivers() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        let gone = bus.subscribe();
        drop(gone);

        bus.emit(LibraryEvent::TagsChanged);
        assert_eq!(keep.try_recv().unwrap(), LibraryEvent::TagsChanged);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
