// Schema manager
// Opens a library file, verifies the table set and column layouts, migrates
// the legacy one-column-per-collection reference table, repairs slot data and
// seeds factory content. Safe to run on every start; a second run on the same
// file writes nothing.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

use crate::config::{ConsistencyPolicy, LibraryConfig};
use crate::constants::*;
use crate::db::catalog;
use crate::db::columns::{self, CREATE_SOUNDS, CREATE_TEMPLATES};
use crate::db::consistency::{self, CollectionRepair, ConsistencyPlan};
use crate::db::membership::{self, CollectionRecord};
use crate::db::schema::{self, Uid};
use crate::db::seed::{self, FactorySeed, SeedState};
use crate::error::{LibraryError, Result};

pub const CORE_TABLES: [&str; 4] = ["sounds", "reference", "collections", "collection_membership"];
pub const ANCILLARY_TABLES: [&str; 6] = [
    "tags",
    "templates",
    "ascii",
    "local_wavetables",
    "dumped_wavetables",
    "wavetable_previews",
];

const LEGACY_REFERENCE: &str = "reference_legacy";

const CREATE_REFERENCE: &str = r#"
    CREATE TABLE reference (
        uid TEXT PRIMARY KEY NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]'
    );
"#;

const CREATE_COLLECTIONS: &str = r#"
    -- Collection registry; factory collections are read-only
    CREATE TABLE collections (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        is_factory INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL DEFAULT 0
    );

    -- One row per (collection, sound); a slot holds at most one sound
    CREATE TABLE collection_membership (
        collection_id INTEGER NOT NULL REFERENCES collections(id),
        uid TEXT NOT NULL,
        slot INTEGER NOT NULL CHECK (slot BETWEEN 0 AND 1023),
        PRIMARY KEY (collection_id, uid),
        UNIQUE (collection_id, slot)
    );

    CREATE INDEX idx_membership_uid ON collection_membership(uid);
"#;

const CREATE_ANCILLARY: &str = r#"
    CREATE TABLE IF NOT EXISTS tags (
        tag TEXT PRIMARY KEY NOT NULL,
        bg_color INTEGER NOT NULL DEFAULT 5921370,
        fg_color INTEGER NOT NULL DEFAULT 16777215
    );

    CREATE TABLE IF NOT EXISTS ascii (
        code INTEGER PRIMARY KEY,
        glyph TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS local_wavetables (
        slot INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        samples BLOB NOT NULL,
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS dumped_wavetables (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slot INTEGER NOT NULL,
        name TEXT NOT NULL,
        samples BLOB NOT NULL,
        dumped_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS wavetable_previews (
        slot INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        points BLOB NOT NULL
    );
"#;

/// What `open_library` did to the file.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    pub created: bool,
    pub migrated_legacy: bool,
    pub repairs: Vec<CollectionRepair>,
    pub seed_state: SeedState,
    /// Rows written while opening. Zero for an already-consistent store.
    pub changes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Canonical,
    Legacy,
}

/// Get current schema version from database
fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn total_changes(conn: &Connection) -> Result<u64> {
    let changes: i64 = conn.query_row("SELECT total_changes()", [], |row| row.get(0))?;
    Ok(changes.max(0) as u64)
}

fn list_tables(conn: &Connection) -> rusqlite::Result<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect()
}

/// Column names of a table, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Quote a legacy column name for use as an identifier.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn classify_tables(tables: &BTreeSet<String>) -> Result<Layout> {
    if let Some(unknown) = tables
        .iter()
        .find(|t| !CORE_TABLES.contains(&t.as_str()) && !ANCILLARY_TABLES.contains(&t.as_str()))
    {
        return Err(LibraryError::SchemaMismatch(format!("unknown table '{}'", unknown)));
    }
    for required in ["sounds", "reference"] {
        if !tables.contains(required) {
            return Err(LibraryError::SchemaMismatch(format!("missing table '{}'", required)));
        }
    }
    match (tables.contains("collections"), tables.contains("collection_membership")) {
        (true, true) => Ok(Layout::Canonical),
        (false, false) => Ok(Layout::Legacy),
        _ => Err(LibraryError::SchemaMismatch(
            "collection registry is incomplete".to_string(),
        )),
    }
}

fn check_sounds_layout(conn: &Connection) -> Result<()> {
    let found = table_columns(conn, "sounds")?;
    let expected = columns::sounds_columns();
    if found != expected {
        let first_diff = found
            .iter()
            .zip(expected.iter())
            .position(|(a, b)| a != b)
            .unwrap_or(found.len().min(expected.len()));
        return Err(LibraryError::TableFormat(format!(
            "sounds has {} columns (expected {}), first difference at column {}",
            found.len(),
            expected.len(),
            first_diff
        )));
    }
    Ok(())
}

/// Create every table with its canonical definition, plus the factory
/// collections and the ascii lookup rows.
pub fn create_canonical_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&CREATE_SOUNDS)?;
    conn.execute_batch(CREATE_REFERENCE)?;
    conn.execute_batch(CREATE_COLLECTIONS)?;
    ensure_factory_collections(conn)?;
    ensure_ancillary_tables(conn)?;
    Ok(())
}

/// Create missing ancillary tables and fill the ascii lookup when empty.
pub fn ensure_ancillary_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_ANCILLARY)?;
    conn.execute_batch(&CREATE_TEMPLATES)?;

    let glyphs: i64 = conn.query_row("SELECT COUNT(*) FROM ascii", [], |row| row.get(0))?;
    if glyphs < i64::from(NAME_CHAR_MAX - NAME_CHAR_MIN + 1) {
        catalog::seed_ascii(conn)?;
    }
    Ok(())
}

/// Register factory collections until there are `FACTORY_COLLECTION_COUNT`.
pub fn ensure_factory_collections(conn: &Connection) -> Result<usize> {
    let records = membership::list_collection_records(conn)?;
    let mut missing = FACTORY_COLLECTION_COUNT.saturating_sub(records.iter().filter(|r| r.is_factory).count());
    let mut created = 0;
    for name in FACTORY_COLLECTIONS {
        if missing == 0 {
            break;
        }
        if records.iter().any(|r| r.name.eq_ignore_ascii_case(name)) {
            continue;
        }
        membership::insert_collection(conn, name, true)?;
        missing -= 1;
        created += 1;
    }
    Ok(created)
}

/// Older stores used `bgColor`/`fgColor` in the tag catalog.
fn upgrade_tag_columns(conn: &Connection) -> Result<()> {
    let cols = table_columns(conn, "tags")?;
    if cols.iter().any(|c| c == "bgColor") {
        conn.execute_batch("ALTER TABLE tags RENAME COLUMN bgColor TO bg_color;")?;
    }
    if cols.iter().any(|c| c == "fgColor") {
        conn.execute_batch("ALTER TABLE tags RENAME COLUMN fgColor TO fg_color;")?;
    }
    Ok(())
}

/// Legacy tag cells hold either a JSON list or a comma-separated string.
fn legacy_tags(raw: Option<String>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match schema::parse_tags(&raw) {
        Ok(tags) => tags,
        Err(_) => raw.split(',').map(|t| t.to_string()).collect(),
    }
}

fn legacy_pairs(conn: &Connection, column: &str) -> Result<Vec<(Uid, i64)>> {
    let col = quote_identifier(column);
    let sql = format!(
        "SELECT uid, {col} FROM {table} WHERE {col} IS NOT NULL ORDER BY rowid",
        col = col,
        table = LEGACY_REFERENCE
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, Uid>(0)?, row.get::<_, i64>(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Rebuild `reference` as (uid, tags) and move every extra column into the
/// collection registry. Runs in one transaction.
fn rebuild_reference(
    conn: &Connection,
    extras: &[String],
    policy: &ConsistencyPolicy,
    chunk_size: usize,
) -> Result<Vec<CollectionRepair>> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(&format!("ALTER TABLE reference RENAME TO {};", LEGACY_REFERENCE))?;
    tx.execute_batch(CREATE_REFERENCE)?;
    tx.execute_batch(CREATE_COLLECTIONS)?;

    let legacy_rows: Vec<(Uid, Option<String>)> = {
        let mut stmt = tx.prepare(&format!("SELECT uid, tags FROM {} ORDER BY rowid", LEGACY_REFERENCE))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    let mut copied: HashSet<Uid> = HashSet::with_capacity(legacy_rows.len());
    for (uid, tags) in legacy_rows {
        if copied.insert(uid.clone()) {
            schema::insert_reference_row(&tx, &uid, &legacy_tags(tags))?;
        }
    }

    // Plan every collection first so purges see the whole picture
    let mut planned: Vec<(CollectionRecord, ConsistencyPlan)> = Vec::with_capacity(extras.len());
    for (i, column) in extras.iter().enumerate() {
        let record = membership::insert_collection(&tx, column, i < FACTORY_COLLECTION_COUNT)?;
        let pairs = legacy_pairs(&tx, column)?;
        planned.push((record, consistency::plan(&pairs, policy)));
    }

    let trimmed: Vec<Uid> = planned.iter().flat_map(|(_, p)| p.trimmed.iter().cloned()).collect();
    let purged: HashSet<Uid> = if policy.purge_trimmed_duplicates {
        consistency::select_purgeable(&tx, &trimmed)?.into_iter().collect()
    } else {
        HashSet::new()
    };

    let mut repairs = Vec::new();
    for (record, plan) in &planned {
        let mut placed: HashSet<&Uid> = HashSet::new();
        for (uid, slot) in &plan.kept {
            if !purged.contains(uid) && placed.insert(uid) {
                membership::insert_member(&tx, record.id, uid, *slot)?;
            }
        }
        let repair = CollectionRepair {
            collection: record.name.clone(),
            trimmed: plan.trimmed.len(),
            purged: plan.trimmed.iter().filter(|u| purged.contains(*u)).count(),
            duplicates_nulled: plan.duplicates.len(),
            out_of_range: plan.out_of_range.len(),
            orphans_removed: 0,
        };
        if !repair.is_empty() {
            log::warn!("Consistency repair on legacy column '{}': {:?}", record.name, repair);
            repairs.push(repair);
        }
    }

    let purged: Vec<Uid> = purged.into_iter().collect();
    consistency::purge_sounds(&tx, &purged, chunk_size)?;
    tx.execute_batch(&format!("DROP TABLE {};", LEGACY_REFERENCE))?;
    tx.commit()?;

    log::info!("Migrated legacy reference table: {} collections", extras.len());
    Ok(repairs)
}

/// Accept any legacy reference layout that still carries `uid` and `tags`.
/// All-or-nothing: on failure the original table is left in place.
fn migrate_legacy_reference(conn: &Connection, config: &LibraryConfig) -> Result<Vec<CollectionRepair>> {
    let columns = table_columns(conn, "reference")?;
    for fixed in FIXED_REFERENCE_COLUMNS {
        if !columns.iter().any(|c| c == fixed) {
            return Err(LibraryError::TableFormat(format!("reference has no '{}' column", fixed)));
        }
    }
    let extras: Vec<String> = columns
        .into_iter()
        .filter(|c| !FIXED_REFERENCE_COLUMNS.contains(&c.as_str()))
        .collect();

    rebuild_reference(conn, &extras, &config.consistency, config.chunk_size).map_err(|e| {
        log::error!("Legacy reference migration failed, rolled back: {}", e);
        match e {
            LibraryError::TableFormat(_) => e,
            other => LibraryError::TableFormat(format!("legacy migration failed: {}", other)),
        }
    })
}

/// Open (or create) the library at `path` and bring it to the current schema.
pub fn open_library(
    path: &Path,
    config: &LibraryConfig,
    seed: &FactorySeed,
) -> Result<(Connection, SchemaReport)> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LibraryError::Write(format!("{}: {}", parent.display(), e)))?;
        }
    }

    let conn = Connection::open(path).map_err(LibraryError::from_open_failure)?;
    super::apply_pragmas(&conn).map_err(LibraryError::from_open_failure)?;

    let version = get_schema_version(&conn).map_err(LibraryError::from_open_failure)?;
    if version > SCHEMA_VERSION {
        return Err(LibraryError::SchemaMismatch(format!(
            "schema version {} is newer than this build supports (max {})",
            version, SCHEMA_VERSION
        )));
    }

    let before = total_changes(&conn)?;
    let mut report = SchemaReport::default();
    let tables = list_tables(&conn).map_err(LibraryError::from_open_failure)?;

    if tables.is_empty() {
        let tx = conn.unchecked_transaction()?;
        create_canonical_schema(&tx)?;
        tx.commit()?;
        report.created = true;
        log::info!("Created library schema at {}", path.display());
    } else {
        let layout = classify_tables(&tables)?;
        check_sounds_layout(&conn)?;
        match layout {
            Layout::Legacy => {
                report.repairs = migrate_legacy_reference(&conn, config)?;
                report.migrated_legacy = true;
            }
            Layout::Canonical => {
                let found = table_columns(&conn, "reference")?;
                if found != FIXED_REFERENCE_COLUMNS {
                    return Err(LibraryError::TableFormat(format!(
                        "reference columns {:?} do not match (uid, tags)",
                        found
                    )));
                }
            }
        }
        if tables.contains("tags") {
            upgrade_tag_columns(&conn)?;
        }
        ensure_ancillary_tables(&conn)?;
        ensure_factory_collections(&conn)?;
    }

    if version != SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        log::info!("Schema version {} -> {}", version, SCHEMA_VERSION);
    }

    report
        .repairs
        .extend(consistency::run_consistency_pass(&conn, &config.consistency, config.chunk_size)?);
    report.seed_state = seed::seed_factory_content(&conn, seed)?;
    report.changes = total_changes(&conn)? - before;

    Ok((conn, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{count_sounds, get_tags_for, insert_sound_row, sound_exists};
    use crate::params::{self, names};

    fn named(name: &str) -> Vec<i32> {
        let mut p = params::init_sound();
        names::write_name(&mut p, name);
        p
    }

    /// A store in the old layout: one nullable integer column per collection.
    fn legacy_store(path: &Path, collections: &[&str]) -> Connection {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(&CREATE_SOUNDS).unwrap();
        let cols: String = collections
            .iter()
            .map(|c| format!(", {} INTEGER", quote_identifier(c)))
            .collect();
        conn.execute_batch(&format!("CREATE TABLE reference (tags TEXT, uid TEXT PRIMARY KEY{});", cols))
            .unwrap();
        conn.execute_batch("CREATE TABLE tags (tag TEXT PRIMARY KEY, bgColor INTEGER, fgColor INTEGER);")
            .unwrap();
        conn
    }

    fn add_legacy_sound(conn: &Connection, uid: &str, name: &str, tags: &str, slots: &[(&str, i64)]) {
        insert_sound_row(conn, &Uid::from(uid), &named(name)).unwrap();
        conn.execute("INSERT INTO reference (uid, tags) VALUES (?1, ?2)", rusqlite::params![uid, tags])
            .unwrap();
        for (column, slot) in slots {
            conn.execute(
                &format!("UPDATE reference SET {} = ?1 WHERE uid = ?2", quote_identifier(column)),
                rusqlite::params![slot, uid],
            )
            .unwrap();
        }
    }

    fn collection_id(conn: &Connection, name: &str) -> i64 {
        conn.query_row("SELECT id FROM collections WHERE name = ?1", [name], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_fresh_store_is_created_and_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib").join("library.db");
        let (conn, report) = open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap();

        assert!(report.created);
        assert_eq!(report.seed_state, SeedState::Seeded);
        assert!(report.repairs.is_empty());
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let factories = seed::factory_records(&conn).unwrap();
        assert_eq!(factories.len(), FACTORY_COLLECTION_COUNT);
        for record in &factories {
            assert_eq!(membership::count_members(&conn, record.id).unwrap(), 1);
        }
        let tables = list_tables(&conn).unwrap();
        for table in CORE_TABLES.iter().chain(ANCILLARY_TABLES.iter()) {
            assert!(tables.contains(*table), "missing {}", table);
        }
    }

    #[test]
    fn test_second_open_makes_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        let config = LibraryConfig::default();
        drop(open_library(&path, &config, &FactorySeed::builtin()).unwrap());

        let (_conn, report) = open_library(&path, &config, &FactorySeed::builtin()).unwrap();
        assert!(!report.created);
        assert!(!report.migrated_legacy);
        assert_eq!(report.seed_state, SeedState::AlreadySeeded);
        assert_eq!(report.changes, 0);
    }

    #[test]
    fn test_legacy_layout_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        {
            let conn = legacy_store(&path, &["F1", "F2", "F3", "My Bank"]);
            add_legacy_sound(&conn, "a", "A", r#"["x"]"#, &[("My Bank", 0)]);
            add_legacy_sound(&conn, "b", "B", "y,z", &[("My Bank", 0)]);
            add_legacy_sound(&conn, "c", "C", "[]", &[("My Bank", 2000)]);
            add_legacy_sound(&conn, "d", "D", "[]", &[("My Bank", 7)]);
            add_legacy_sound(&conn, "e", "E", "[]", &[("F1", 0), ("F2", 1)]);
            conn.execute("INSERT INTO tags (tag, bgColor, fgColor) VALUES ('x', 1, 2)", []).unwrap();
        }

        let (conn, report) = open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap();
        assert!(report.migrated_legacy);
        assert_eq!(table_columns(&conn, "reference").unwrap(), vec!["uid", "tags"]);
        assert!(!list_tables(&conn).unwrap().contains(LEGACY_REFERENCE));

        let records = membership::list_collection_records(&conn).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["F1", "F2", "F3", "My Bank"]);
        assert!(records[..3].iter().all(|r| r.is_factory));
        assert!(!records[3].is_factory);

        let mine = membership::members(&conn, collection_id(&conn, "My Bank")).unwrap();
        assert_eq!(mine.get(&0), Some(&Uid::from("a")));
        assert_eq!(mine.get(&7), Some(&Uid::from("d")));
        assert_eq!(mine.len(), 2);

        let repair = report.repairs.iter().find(|r| r.collection == "My Bank").unwrap();
        assert_eq!(repair.duplicates_nulled, 1);
        assert_eq!(repair.out_of_range, 1);

        assert_eq!(get_tags_for(&conn, &Uid::from("b")).unwrap(), vec!["y", "z"]);
        assert_eq!(catalog::get_tag(&conn, "x").unwrap().unwrap().bg_color, 1);

        // F3 and the previews were empty, F1/F2 were not
        assert_eq!(report.seed_state, SeedState::Partial(0b1100));
    }

    #[test]
    fn test_legacy_overflow_purges_identical_copies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        {
            let conn = legacy_store(&path, &["F1", "F2", "F3", "Mine"]);
            add_legacy_sound(&conn, "twin-a", "Twin", "[]", &[("Mine", 3)]);
            add_legacy_sound(&conn, "twin-b", "Twin", "[]", &[("Mine", 1)]);
            add_legacy_sound(&conn, "unique", "Unique", "[]", &[("Mine", 5)]);
        }

        let mut config = LibraryConfig::default();
        config.consistency.capacity = 1;
        let (conn, report) = open_library(&path, &config, &FactorySeed::builtin()).unwrap();

        let mine = membership::members(&conn, collection_id(&conn, "Mine")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine.get(&1), Some(&Uid::from("twin-b")));

        assert!(!sound_exists(&conn, &Uid::from("twin-a")).unwrap());
        assert!(sound_exists(&conn, &Uid::from("twin-b")).unwrap());
        assert!(sound_exists(&conn, &Uid::from("unique")).unwrap());

        let repair = report.repairs.iter().find(|r| r.collection == "Mine").unwrap();
        assert_eq!(repair.trimmed, 2);
        assert_eq!(repair.purged, 1);
        assert_eq!(report.seed_state, SeedState::Seeded);
        // two legacy survivors plus one seeded preset per factory collection
        assert_eq!(count_sounds(&conn).unwrap(), 2 + FACTORY_COLLECTION_COUNT as i64);
    }

    #[test]
    fn test_failed_legacy_migration_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        {
            let conn = legacy_store(&path, &["F1", "F2", "F3", "Broken"]);
            add_legacy_sound(&conn, "a", "A", "[]", &[]);
            conn.execute("UPDATE reference SET \"Broken\" = 'not a slot' WHERE uid = 'a'", []).unwrap();
        }

        let err = open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap_err();
        assert!(matches!(err, LibraryError::TableFormat(_)));

        let conn = Connection::open(&path).unwrap();
        let tables = list_tables(&conn).unwrap();
        assert!(tables.contains("reference"));
        assert!(!tables.contains(LEGACY_REFERENCE));
        assert!(!tables.contains("collections"));
        assert_eq!(table_columns(&conn, "reference").unwrap().len(), 6);
    }

    #[test]
    fn test_unknown_table_is_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        drop(open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap());
        Connection::open(&path).unwrap().execute_batch("CREATE TABLE extras (x INTEGER);").unwrap();

        let err = open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap_err();
        assert!(matches!(err, LibraryError::SchemaMismatch(_)));
    }

    #[test]
    fn test_half_registry_is_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        {
            let conn = legacy_store(&path, &[]);
            conn.execute_batch("CREATE TABLE collections (id INTEGER PRIMARY KEY);").unwrap();
        }
        let err = open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap_err();
        assert!(matches!(err, LibraryError::SchemaMismatch(_)));
    }

    #[test]
    fn test_bad_sounds_layout_is_table_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE sounds (uid TEXT PRIMARY KEY, param_0 INTEGER);
                 CREATE TABLE reference (uid TEXT PRIMARY KEY, tags TEXT);",
            )
            .unwrap();
        }
        let err = open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap_err();
        assert!(matches!(err, LibraryError::TableFormat(_)));
    }

    #[test]
    fn test_garbage_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        std::fs::write(&path, "this is a text file and certainly not an sqlite database, ".repeat(20)).unwrap();

        let err = open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap_err();
        assert!(matches!(err, LibraryError::Invalid(_)), "got {:?}", err);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        drop(open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap());
        Connection::open(&path)
            .unwrap()
            .execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION + 1))
            .unwrap();

        let err = open_library(&path, &LibraryConfig::default(), &FactorySeed::builtin()).unwrap_err();
        assert!(matches!(err, LibraryError::SchemaMismatch(_)));
    }
}
