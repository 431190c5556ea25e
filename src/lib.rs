// Soundvault - sound library storage engine

pub mod collections;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod events;
pub mod hash;
pub mod jobs;
pub mod library;
pub mod params;
pub mod reorder;

pub use config::{BackupSettings, LibraryConfig};
pub use db::catalog::{Tag, Template};
pub use db::schema::{Sound, Uid};
pub use db::seed::FactorySeed;
pub use db::SchemaReport;
pub use error::{ErrorCode, LibraryError, Result};
pub use events::{BackupProgress, LibraryEvent};
pub use library::{CollectionInfo, Library, LibraryInfo};
