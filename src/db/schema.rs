// Sound store and reference rows: types and query helpers

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{CATEGORY_INDEX, NAME_SUFFIX_MAX, PARAM_COUNT};
use crate::db::columns::{self, placeholders};
use crate::error::{LibraryError, Result};
use crate::hash;
use crate::params::{self, names};

// ----- Uid -----

/// Unique, immutable identifier of a sound record (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    pub fn generate() -> Self {
        Uid(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Uid(value.to_string())
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Uid(value)
    }
}

impl ToSql for Uid {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for Uid {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        String::column_result(value).map(Uid)
    }
}

// ----- Sound -----

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
    pub uid: Uid,
    pub name: String,
    pub category: i32,
    pub params: Vec<i32>,
}

impl Sound {
    fn from_params(uid: Uid, params: Vec<i32>) -> Self {
        Self {
            uid,
            name: names::read_name(&params),
            category: params::category_of(&params),
            params,
        }
    }
}

fn read_params(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Vec<i32>> {
    (0..PARAM_COUNT).map(|i| row.get(offset + i)).collect()
}

fn param_values(params: &[i32], trailing: Vec<Value>) -> Vec<Value> {
    params
        .iter()
        .map(|v| Value::Integer(i64::from(*v)))
        .chain(trailing)
        .collect()
}

/// Insert a parameter row. `params` must already be sanitized.
pub fn insert_sound_row(conn: &Connection, uid: &Uid, params: &[i32]) -> Result<()> {
    params::check_len(params)?;
    let values = param_values(params, vec![Value::Text(uid.to_string())]);
    conn.execute(&columns::INSERT_SOUND, rusqlite::params_from_iter(values))?;
    Ok(())
}

pub fn insert_reference_row(conn: &Connection, uid: &Uid, tags: &[String]) -> Result<()> {
    conn.execute(
        "INSERT INTO reference (uid, tags) VALUES (?1, ?2)",
        params![uid, serialize_tags(tags)?],
    )?;
    Ok(())
}

/// Sanitize and store a new sound with an empty reference row. Returns its new UID.
pub fn create_sound(conn: &Connection, raw_params: &[i32]) -> Result<Uid> {
    let clean = params::sanitize(raw_params)?;
    let uid = Uid::generate();
    insert_sound_row(conn, &uid, &clean)?;
    insert_reference_row(conn, &uid, &[])?;
    Ok(uid)
}

pub fn get_parameters(conn: &Connection, uid: &Uid) -> Result<Option<Vec<i32>>> {
    let result = conn
        .query_row(&columns::SELECT_SOUND, params![uid], |row| read_params(row, 0))
        .optional()?;
    Ok(result)
}

pub fn require_parameters(conn: &Connection, uid: &Uid) -> Result<Vec<i32>> {
    get_parameters(conn, uid)?.ok_or_else(|| LibraryError::SoundNotFound(uid.to_string()))
}

pub fn sound_exists(conn: &Connection, uid: &Uid) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sounds WHERE uid = ?1)",
        params![uid],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Fetch sounds in input order. Unknown UIDs are skipped.
pub fn get_sounds(conn: &Connection, uids: &[Uid], chunk_size: usize) -> Result<Vec<Sound>> {
    let mut found: HashMap<Uid, Vec<i32>> = HashMap::with_capacity(uids.len());
    for chunk in uids.chunks(chunk_size.max(1)) {
        let sql = format!(
            "{} WHERE uid IN ({})",
            *columns::SELECT_ALL_SOUNDS,
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
            Ok((row.get::<_, Uid>(0)?, read_params(row, 1)?))
        })?;
        for row in rows {
            let (uid, params) = row?;
            found.insert(uid, params);
        }
    }

    Ok(uids
        .iter()
        .filter_map(|uid| found.get(uid).map(|p| Sound::from_params(uid.clone(), p.clone())))
        .collect())
}

pub fn update_sound(conn: &Connection, uid: &Uid, raw_params: &[i32]) -> Result<()> {
    let clean = params::sanitize(raw_params)?;
    let values = param_values(&clean, vec![Value::Text(uid.to_string())]);
    let rows = conn.execute(&columns::UPDATE_SOUND, rusqlite::params_from_iter(values))?;
    if rows == 0 {
        return Err(LibraryError::SoundNotFound(uid.to_string()));
    }
    Ok(())
}

/// Update one parameter. Returns the sanitized value actually stored.
pub fn update_field(conn: &Connection, uid: &Uid, index: usize, value: i32) -> Result<i32> {
    params::check_index(index)?;
    let clean = params::range_of(index).sanitize(value);
    let sql = format!("UPDATE sounds SET {} = ?1 WHERE uid = ?2", columns::param_column(index));
    let rows = conn.execute(&sql, params![clean, uid])?;
    if rows == 0 {
        return Err(LibraryError::SoundNotFound(uid.to_string()));
    }
    Ok(clean)
}

/// Remove parameter rows only. Reference rows are owned by the collection index.
pub fn delete_sound_params(conn: &Connection, uids: &[Uid], chunk_size: usize) -> Result<usize> {
    let mut deleted = 0;
    for chunk in uids.chunks(chunk_size.max(1)) {
        let sql = format!("DELETE FROM sounds WHERE uid IN ({})", placeholders(chunk.len()));
        deleted += conn.execute(&sql, rusqlite::params_from_iter(chunk.iter()))?;
    }
    Ok(deleted)
}

pub fn delete_reference_rows(conn: &Connection, uids: &[Uid], chunk_size: usize) -> Result<usize> {
    let mut deleted = 0;
    for chunk in uids.chunks(chunk_size.max(1)) {
        let sql = format!("DELETE FROM reference WHERE uid IN ({})", placeholders(chunk.len()));
        deleted += conn.execute(&sql, rusqlite::params_from_iter(chunk.iter()))?;
    }
    Ok(deleted)
}

pub fn name_exists(conn: &Connection, name: &str) -> Result<bool> {
    let codes = names::encode_name(name);
    let exists: bool = conn.query_row(
        &columns::NAME_EXISTS,
        rusqlite::params_from_iter(codes.iter()),
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// First `~N` variant of `name` not already used by any sound.
pub fn unique_duplicate_name(conn: &Connection, name: &str) -> Result<String> {
    let mut candidate = names::next_duplicate_name(name);
    for _ in 0..NAME_SUFFIX_MAX {
        if !name_exists(conn, &candidate)? {
            return Ok(candidate);
        }
        candidate = names::next_duplicate_name(&candidate);
    }
    Err(LibraryError::InvalidArgument(format!("no free duplicate name for '{}'", name)))
}

/// Copy parameters and tags under a fresh UID, optionally with a new `~N` name.
pub fn duplicate_sound(conn: &Connection, uid: &Uid, rename: bool) -> Result<Uid> {
    let mut params = require_parameters(conn, uid)?;
    if rename {
        let new_name = unique_duplicate_name(conn, &names::read_name(&params))?;
        names::write_name(&mut params, &new_name);
    }
    let tags = get_tags_for(conn, uid)?;

    let new_uid = Uid::generate();
    insert_sound_row(conn, &new_uid, &params)?;
    insert_reference_row(conn, &new_uid, &tags)?;
    Ok(new_uid)
}

/// Fingerprint of every stored parameter vector, grouped.
pub fn fingerprint_index(conn: &Connection) -> Result<HashMap<String, Vec<Uid>>> {
    let mut stmt = conn.prepare(&columns::SELECT_ALL_SOUNDS)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, Uid>(0)?, read_params(row, 1)?)))?;

    let mut index: HashMap<String, Vec<Uid>> = HashMap::new();
    for row in rows {
        let (uid, params) = row?;
        index.entry(hash::parameter_fingerprint(&params)).or_default().push(uid);
    }
    Ok(index)
}

// ----- Reference rows / tags -----

pub fn serialize_tags(tags: &[String]) -> Result<String> {
    Ok(serde_json::to_string(&normalize_tags(tags))?)
}

pub fn parse_tags(raw: &str) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(raw)?)
}

/// Trim, drop blanks and repeated labels, keep first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

pub fn get_tags_for(conn: &Connection, uid: &Uid) -> Result<Vec<String>> {
    let raw: Option<String> = conn
        .query_row("SELECT tags FROM reference WHERE uid = ?1", params![uid], |row| row.get(0))
        .optional()?;
    match raw {
        Some(raw) => parse_tags(&raw),
        None => Err(LibraryError::SoundNotFound(uid.to_string())),
    }
}

pub fn get_tags(conn: &Connection, uids: &[Uid], chunk_size: usize) -> Result<BTreeMap<Uid, Vec<String>>> {
    let mut out = BTreeMap::new();
    for chunk in uids.chunks(chunk_size.max(1)) {
        let sql = format!("SELECT uid, tags FROM reference WHERE uid IN ({})", placeholders(chunk.len()));
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
            Ok((row.get::<_, Uid>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (uid, raw) = row?;
            out.insert(uid, parse_tags(&raw)?);
        }
    }
    Ok(out)
}

pub fn set_tags(conn: &Connection, uid: &Uid, tags: &[String]) -> Result<()> {
    let rows = conn.execute(
        "UPDATE reference SET tags = ?1 WHERE uid = ?2",
        params![serialize_tags(tags)?, uid],
    )?;
    if rows == 0 {
        return Err(LibraryError::SoundNotFound(uid.to_string()));
    }
    Ok(())
}

/// Every reference row as (uid, tags). Used by tag rename/delete.
pub fn all_tag_rows(conn: &Connection) -> Result<Vec<(Uid, Vec<String>)>> {
    let mut stmt = conn.prepare("SELECT uid, tags FROM reference ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, Uid>(0)?, row.get::<_, String>(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        let (uid, raw) = row?;
        out.push((uid, parse_tags(&raw)?));
    }
    Ok(out)
}

/// Sounds per tag, optionally restricted to one collection.
pub fn count_by_tag(conn: &Connection, collection_id: Option<i64>) -> Result<BTreeMap<String, i64>> {
    let (sql, args): (&str, Vec<i64>) = match collection_id {
        Some(id) => (
            "SELECT j.value, COUNT(*) FROM reference r
             JOIN collection_membership m ON m.uid = r.uid AND m.collection_id = ?1,
             json_each(r.tags) j
             GROUP BY j.value",
            vec![id],
        ),
        None => (
            "SELECT j.value, COUNT(*) FROM reference r, json_each(r.tags) j GROUP BY j.value",
            vec![],
        ),
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (tag, count) = row?;
        out.insert(tag, count);
    }
    Ok(out)
}

/// Sounds per category code, optionally restricted to one collection.
pub fn count_by_category(conn: &Connection, collection_id: Option<i64>) -> Result<BTreeMap<i64, i64>> {
    let column = columns::param_column(CATEGORY_INDEX);
    let (sql, args) = match collection_id {
        Some(id) => (
            format!(
                "SELECT s.{col}, COUNT(*) FROM sounds s
                 JOIN collection_membership m ON m.uid = s.uid AND m.collection_id = ?1
                 GROUP BY s.{col}",
                col = column
            ),
            vec![id],
        ),
        None => (format!("SELECT {col}, COUNT(*) FROM sounds GROUP BY {col}", col = column), vec![]),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (category, count) = row?;
        out.insert(category, count);
    }
    Ok(out)
}

pub fn count_sounds(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM sounds", [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{NAME_OFFSET, OCTAVE_PARAMS};
    use crate::db::migrations::create_canonical_schema;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_canonical_schema(&conn).unwrap();
        conn
    }

    fn named(name: &str) -> Vec<i32> {
        let mut p = params::init_sound();
        names::write_name(&mut p, name);
        p
    }

    #[test]
    fn test_insert_then_get_returns_sanitized() {
        let conn = setup_db();
        let mut raw = named("Round Trip");
        raw[OCTAVE_PARAMS[0]] = 63;
        raw[10] = 400;

        let uid = create_sound(&conn, &raw).unwrap();
        let stored = get_parameters(&conn, &uid).unwrap().unwrap();
        assert_eq!(stored, params::sanitize(&raw).unwrap());
        assert_eq!(stored[OCTAVE_PARAMS[0]], 64);
        assert_eq!(stored[10], 127);
        assert_eq!(get_tags_for(&conn, &uid).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_update_missing_sound_is_not_found() {
        let conn = setup_db();
        let err = update_sound(&conn, &Uid::from("nope"), &params::init_sound()).unwrap_err();
        assert!(matches!(err, LibraryError::SoundNotFound(_)));
        let err = update_field(&conn, &Uid::from("nope"), 5, 1).unwrap_err();
        assert!(matches!(err, LibraryError::SoundNotFound(_)));
    }

    #[test]
    fn test_update_field_sanitizes() {
        let conn = setup_db();
        let uid = create_sound(&conn, &named("Field")).unwrap();
        assert_eq!(update_field(&conn, &uid, OCTAVE_PARAMS[1], 30).unwrap(), 28);
        let stored = get_parameters(&conn, &uid).unwrap().unwrap();
        assert_eq!(stored[OCTAVE_PARAMS[1]], 28);
        assert!(update_field(&conn, &uid, PARAM_COUNT, 1).is_err());
    }

    #[test]
    fn test_duplicate_copies_params_and_tags() {
        let conn = setup_db();
        let uid = create_sound(&conn, &named("Brass")).unwrap();
        set_tags(&conn, &uid, &["warm".to_string(), "vintage".to_string()]).unwrap();

        let copy = duplicate_sound(&conn, &uid, false).unwrap();
        assert_ne!(copy, uid);
        assert_eq!(get_parameters(&conn, &copy).unwrap(), get_parameters(&conn, &uid).unwrap());
        assert_eq!(get_tags_for(&conn, &copy).unwrap(), vec!["warm", "vintage"]);
    }

    #[test]
    fn test_duplicate_rename_skips_taken_names() {
        let conn = setup_db();
        let uid = create_sound(&conn, &named("Brass")).unwrap();
        create_sound(&conn, &named("Brass~1")).unwrap();

        let copy = duplicate_sound(&conn, &uid, true).unwrap();
        let copied = get_parameters(&conn, &copy).unwrap().unwrap();
        assert_eq!(names::read_name(&copied), "Brass~2");

        let original = get_parameters(&conn, &uid).unwrap().unwrap();
        assert_eq!(original[..NAME_OFFSET], copied[..NAME_OFFSET]);
    }

    #[test]
    fn test_get_sounds_preserves_order_across_chunks() {
        let conn = setup_db();
        let uids: Vec<Uid> = (0..7)
            .map(|i| create_sound(&conn, &named(&format!("S{}", i))).unwrap())
            .collect();
        let mut request: Vec<Uid> = uids.iter().rev().cloned().collect();
        request.insert(3, Uid::from("missing"));

        let small = get_sounds(&conn, &request, 2).unwrap();
        let large = get_sounds(&conn, &request, 500).unwrap();
        assert_eq!(small, large);
        assert_eq!(small.len(), 7);
        assert_eq!(small[0].name, "S6");
        assert_eq!(small[6].name, "S0");
    }

    #[test]
    fn test_delete_sound_params_chunked() {
        let conn = setup_db();
        let uids: Vec<Uid> = (0..5).map(|_| create_sound(&conn, &params::init_sound()).unwrap()).collect();
        assert_eq!(delete_sound_params(&conn, &uids[..4], 3).unwrap(), 4);
        assert_eq!(count_sounds(&conn).unwrap(), 1);
        assert!(sound_exists(&conn, &uids[4]).unwrap());
    }

    #[test]
    fn test_tags_normalized_and_counted() {
        let conn = setup_db();
        let a = create_sound(&conn, &named("A")).unwrap();
        let b = create_sound(&conn, &named("B")).unwrap();
        set_tags(&conn, &a, &[" dark ".into(), "dark".into(), "".into(), "pad".into()]).unwrap();
        set_tags(&conn, &b, &["dark".into()]).unwrap();

        assert_eq!(get_tags_for(&conn, &a).unwrap(), vec!["dark", "pad"]);
        let counts = count_by_tag(&conn, None).unwrap();
        assert_eq!(counts.get("dark"), Some(&2));
        assert_eq!(counts.get("pad"), Some(&1));

        let tags = get_tags(&conn, &[a.clone(), b.clone()], 1).unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_count_by_category() {
        let conn = setup_db();
        let mut lead = named("Lead");
        lead[CATEGORY_INDEX] = 7;
        create_sound(&conn, &lead).unwrap();
        create_sound(&conn, &lead).unwrap();
        create_sound(&conn, &named("Init")).unwrap();

        let counts = count_by_category(&conn, None).unwrap();
        assert_eq!(counts.get(&7), Some(&2));
        assert_eq!(counts.get(&0), Some(&1));
    }

    #[test]
    fn test_fingerprint_index_groups_identical() {
        let conn = setup_db();
        let a = create_sound(&conn, &named("Twin")).unwrap();
        let b = create_sound(&conn, &named("Twin")).unwrap();
        create_sound(&conn, &named("Other")).unwrap();

        let index = fingerprint_index(&conn).unwrap();
        let twins = index.values().find(|v| v.len() == 2).unwrap();
        assert!(twins.contains(&a) && twins.contains(&b));
    }
}
