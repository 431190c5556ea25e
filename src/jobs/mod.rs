// Background jobs: the periodic copy-of-record backup

pub mod backup;
pub mod worker;

pub use backup::{list_backups, prune_backups, run_backup, BackupOutcome};
pub use worker::{spawn_backup_worker, BackupWorker};
