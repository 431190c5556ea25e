// Background backup worker
//
// One named thread per open library. It wakes every WORKER_POLL_MS to check
// the stop flag and runs a backup each time the configured interval elapses.
// Panics inside a backup are caught so the thread never dies.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::BackupSettings;
use crate::constants::WORKER_POLL_MS;
use crate::error::Result;
use crate::events::EventBus;

use super::backup::run_backup;

pub struct BackupWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackupWorker {
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Signal the thread and wait for it. A backup in progress completes first.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Backup worker thread panicked");
            }
        }
    }
}

impl Drop for BackupWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the periodic backup thread.
pub fn spawn_backup_worker(
    db_path: PathBuf,
    backup_dir: PathBuf,
    settings: BackupSettings,
    gate: Arc<Mutex<()>>,
    events: Arc<EventBus>,
) -> Result<BackupWorker> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = std::thread::Builder::new()
        .name("backup-worker".into())
        .spawn(move || worker_loop(db_path, backup_dir, settings, gate, events, flag))?;
    Ok(BackupWorker { stop, handle: Some(handle) })
}

fn worker_loop(
    db_path: PathBuf,
    backup_dir: PathBuf,
    settings: BackupSettings,
    gate: Arc<Mutex<()>>,
    events: Arc<EventBus>,
    stop: Arc<AtomicBool>,
) {
    let interval = Duration::from_secs(settings.interval_secs.max(1));
    let mut last_run = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(WORKER_POLL_MS));
        if last_run.elapsed() < interval {
            continue;
        }
        last_run = Instant::now();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_backup(&db_path, &backup_dir, &settings, &gate, Some(&events))
        }));

        match result {
            Ok(Ok(outcome)) => {
                log::debug!("Backup worker: wrote {}", outcome.path.display());
            }
            Ok(Err(e)) => {
                // already reported by run_backup
                log::debug!("Backup worker: backup failed: {}", e);
            }
            Err(_) => {
                log::error!("Backup worker: backup panicked (recovered)");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryConfig;
    use crate::db;
    use crate::db::seed::FactorySeed;
    use crate::jobs::backup::list_backups;

    #[test]
    fn test_worker_writes_backup_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("library.db");
        let (_conn, _) = db::open_library(&db_path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap();
        let backup_dir = dir.path().join("backups");

        let settings = BackupSettings { enabled: true, interval_secs: 1, ..BackupSettings::default() };
        let worker = spawn_backup_worker(
            db_path,
            backup_dir.clone(),
            settings,
            Arc::new(Mutex::new(())),
            Arc::new(EventBus::new()),
        )
        .unwrap();
        assert!(worker.is_running());

        let deadline = Instant::now() + Duration::from_secs(10);
        while list_backups(&backup_dir).unwrap().is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
        }
        worker.stop();
        assert!(!list_backups(&backup_dir).unwrap().is_empty());
    }
}
