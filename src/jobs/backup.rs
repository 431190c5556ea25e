// Copy-of-record backup
// Copies the live database with SQLite's online backup API from a separate
// read-only connection. The write gate is held for the whole copy so the
// backup never overlaps a foreground write transaction.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use chrono::Local;
use rusqlite::backup::{Backup, StepResult};
use rusqlite::Connection;
use serde::Serialize;

use crate::config::BackupSettings;
use crate::constants::{BACKUP_BUSY_RETRY_MS, BACKUP_FILE_PREFIX};
use crate::db;
use crate::error::{LibraryError, Result};
use crate::events::{BackupProgress, EventBus, LibraryEvent};
use crate::hash;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupOutcome {
    pub path: PathBuf,
    pub hash: String,
    pub pages: u64,
    pub pruned: Vec<PathBuf>,
}

fn emit(events: Option<&EventBus>, progress: BackupProgress) {
    if let Some(bus) = events {
        bus.emit(LibraryEvent::Backup(progress));
    }
}

/// `library-YYYYMMDD-HHMMSS.db`, with a counter if that name is taken.
fn backup_file_name(dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
    let mut candidate = dir.join(format!("{}{}.db", BACKUP_FILE_PREFIX, stamp));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}{}-{}.db", BACKUP_FILE_PREFIX, stamp, n));
        n += 1;
    }
    candidate
}

/// Backup files in `dir`, newest first.
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(BACKUP_FILE_PREFIX) && n.ends_with(".db"))
        })
        .collect();
    files.sort();
    files.reverse();
    Ok(files)
}

/// Delete all but the newest `keep` backups. `keep == 0` keeps everything.
pub fn prune_backups(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    if keep == 0 {
        return Ok(Vec::new());
    }
    let mut pruned = Vec::new();
    for old in list_backups(dir)?.into_iter().skip(keep) {
        std::fs::remove_file(&old)?;
        pruned.push(old);
    }
    Ok(pruned)
}

fn copy_pages(src: &Connection, dst: &mut Connection, pages_per_step: i32, events: Option<&EventBus>) -> Result<u64> {
    let backup = Backup::new(src, dst)?;
    loop {
        match backup.step(pages_per_step)? {
            StepResult::Done => break,
            StepResult::More => {
                let p = backup.progress();
                let total = p.pagecount.max(0) as u64;
                let done = total.saturating_sub(p.remaining.max(0) as u64);
                log::debug!("Backup copied {}/{} pages", done, total);
                emit(events, BackupProgress::new("copy", done, total));
            }
            // Busy, Locked: the source is in use, wait and retry
            _ => thread::sleep(Duration::from_millis(BACKUP_BUSY_RETRY_MS)),
        }
    }
    Ok(backup.progress().pagecount.max(0) as u64)
}

/// Copy the database at `db_path` into `backup_dir`.
pub fn run_backup(
    db_path: &Path,
    backup_dir: &Path,
    settings: &BackupSettings,
    gate: &Mutex<()>,
    events: Option<&EventBus>,
) -> Result<BackupOutcome> {
    let result = backup_inner(db_path, backup_dir, settings, gate, events);
    if let Err(e) = &result {
        log::error!("Backup of {} failed: {}", db_path.display(), e);
        emit(events, BackupProgress::new("failed", 0, 0).error(e.to_string()));
    }
    result
}

fn backup_inner(
    db_path: &Path,
    backup_dir: &Path,
    settings: &BackupSettings,
    gate: &Mutex<()>,
    events: Option<&EventBus>,
) -> Result<BackupOutcome> {
    std::fs::create_dir_all(backup_dir)
        .map_err(|e| LibraryError::Write(format!("{}: {}", backup_dir.display(), e)))?;

    let final_path = backup_file_name(backup_dir);
    let tmp_path = final_path.with_extension("db.tmp");
    emit(events, BackupProgress::new("start", 0, 0).with_message(final_path.display().to_string()));

    let src = db::open_read_connection(db_path)?;
    let mut dst = Connection::open(&tmp_path).map_err(LibraryError::from_open_failure)?;

    let pages = {
        let _guard = gate
            .lock()
            .map_err(|_| LibraryError::Other("write gate poisoned".to_string()))?;
        copy_pages(&src, &mut dst, settings.pages_per_step, events)
    };
    drop(dst);
    drop(src);

    let pages = match pages {
        Ok(p) => p,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    std::fs::rename(&tmp_path, &final_path)
        .map_err(|e| LibraryError::Write(format!("{}: {}", final_path.display(), e)))?;
    let hash = hash::compute_file_hash(&final_path)?;
    let pruned = prune_backups(backup_dir, settings.keep)?;

    log::info!("Backup written to {} ({} pages)", final_path.display(), pages);
    emit(
        events,
        BackupProgress::new("done", pages, pages).with_message(final_path.display().to_string()),
    );
    Ok(BackupOutcome { path: final_path, hash, pages, pruned })
}
