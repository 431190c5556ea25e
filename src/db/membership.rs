// Collection registry rows and slot membership queries

use std::collections::{BTreeMap, BTreeSet, HashSet};

use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde::Serialize;

use crate::db::columns::placeholders;
use crate::db::schema::Uid;
use crate::error::Result;

// ----- Collections -----

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub id: i64,
    pub name: String,
    pub is_factory: bool,
    pub position: i64,
}

pub fn list_collection_records(conn: &Connection) -> Result<Vec<CollectionRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, is_factory, position FROM collections ORDER BY position, id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(CollectionRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            is_factory: row.get(2)?,
            position: row.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_collection(conn: &Connection, name: &str, is_factory: bool) -> Result<CollectionRecord> {
    let position: i64 = conn.query_row(
        "SELECT COALESCE(MAX(position), -1) + 1 FROM collections",
        [],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO collections (name, is_factory, position) VALUES (?1, ?2, ?3)",
        params![name, is_factory, position],
    )?;
    Ok(CollectionRecord {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        is_factory,
        position,
    })
}

pub fn rename_collection_record(conn: &Connection, id: i64, new_name: &str) -> Result<usize> {
    Ok(conn.execute("UPDATE collections SET name = ?1 WHERE id = ?2", params![new_name, id])?)
}

pub fn delete_collection_record(conn: &Connection, id: i64) -> Result<usize> {
    conn.execute("DELETE FROM collection_membership WHERE collection_id = ?1", params![id])?;
    Ok(conn.execute("DELETE FROM collections WHERE id = ?1", params![id])?)
}

// ----- Membership -----

pub fn get_slot(conn: &Connection, collection_id: i64, uid: &Uid) -> Result<Option<u16>> {
    let slot = conn
        .query_row(
            "SELECT slot FROM collection_membership WHERE collection_id = ?1 AND uid = ?2",
            params![collection_id, uid],
            |row| row.get(0),
        )
        .optional()?;
    Ok(slot)
}

pub fn get_uid_at(conn: &Connection, collection_id: i64, slot: u16) -> Result<Option<Uid>> {
    let uid = conn
        .query_row(
            "SELECT uid FROM collection_membership WHERE collection_id = ?1 AND slot = ?2",
            params![collection_id, slot],
            |row| row.get(0),
        )
        .optional()?;
    Ok(uid)
}

pub fn list_slots(conn: &Connection, collection_id: i64) -> Result<BTreeSet<u16>> {
    let mut stmt = conn.prepare("SELECT slot FROM collection_membership WHERE collection_id = ?1")?;
    let rows = stmt.query_map(params![collection_id], |row| row.get::<_, u16>(0))?;
    let mut out = BTreeSet::new();
    for row in rows {
        out.insert(row?);
    }
    Ok(out)
}

/// Slot -> UID for one collection.
pub fn members(conn: &Connection, collection_id: i64) -> Result<BTreeMap<u16, Uid>> {
    let mut stmt = conn.prepare(
        "SELECT slot, uid FROM collection_membership WHERE collection_id = ?1 ORDER BY slot",
    )?;
    let rows = stmt.query_map(params![collection_id], |row| Ok((row.get::<_, u16>(0)?, row.get::<_, Uid>(1)?)))?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (slot, uid) = row?;
        out.insert(slot, uid);
    }
    Ok(out)
}

pub fn count_members(conn: &Connection, collection_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM collection_membership WHERE collection_id = ?1",
        params![collection_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Raw (uid, slot) pairs in insertion order, for the consistency pass.
pub fn membership_pairs(conn: &Connection, collection_id: i64) -> Result<Vec<(Uid, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT uid, slot FROM collection_membership WHERE collection_id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![collection_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn insert_member(conn: &Connection, collection_id: i64, uid: &Uid, slot: u16) -> Result<()> {
    conn.execute(
        "INSERT INTO collection_membership (collection_id, uid, slot) VALUES (?1, ?2, ?3)",
        params![collection_id, uid, slot],
    )?;
    Ok(())
}

pub fn clear_slot(conn: &Connection, collection_id: i64, slot: u16) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM collection_membership WHERE collection_id = ?1 AND slot = ?2",
        params![collection_id, slot],
    )?)
}

pub fn remove_member(conn: &Connection, collection_id: i64, uid: &Uid) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM collection_membership WHERE collection_id = ?1 AND uid = ?2",
        params![collection_id, uid],
    )?)
}

pub fn remove_members(conn: &Connection, collection_id: i64, uids: &[Uid], chunk_size: usize) -> Result<usize> {
    let mut removed = 0;
    for chunk in uids.chunks(chunk_size.max(1)) {
        let sql = format!(
            "DELETE FROM collection_membership WHERE collection_id = ? AND uid IN ({})",
            placeholders(chunk.len())
        );
        let mut values: Vec<&dyn ToSql> = vec![&collection_id];
        values.extend(chunk.iter().map(|u| u as &dyn ToSql));
        removed += conn.execute(&sql, values.as_slice())?;
    }
    Ok(removed)
}

/// Drop every membership of the given UIDs, in all collections.
pub fn remove_from_all_collections(conn: &Connection, uids: &[Uid], chunk_size: usize) -> Result<usize> {
    let mut removed = 0;
    for chunk in uids.chunks(chunk_size.max(1)) {
        let sql = format!(
            "DELETE FROM collection_membership WHERE uid IN ({})",
            placeholders(chunk.len())
        );
        removed += conn.execute(&sql, rusqlite::params_from_iter(chunk.iter()))?;
    }
    Ok(removed)
}

/// Names of the collections each UID belongs to, with its slot there.
pub fn collections_of(conn: &Connection, uid: &Uid) -> Result<Vec<(String, u16)>> {
    let mut stmt = conn.prepare(
        "SELECT c.name, m.slot FROM collection_membership m
         JOIN collections c ON c.id = m.collection_id
         WHERE m.uid = ?1
         ORDER BY c.position, c.id",
    )?;
    let rows = stmt.query_map(params![uid], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Collection ids touched by a set of UIDs.
pub fn collection_ids_of(conn: &Connection, uids: &[Uid], chunk_size: usize) -> Result<BTreeSet<i64>> {
    let mut out = BTreeSet::new();
    for chunk in uids.chunks(chunk_size.max(1)) {
        let sql = format!(
            "SELECT DISTINCT collection_id FROM collection_membership WHERE uid IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| row.get::<_, i64>(0))?;
        for row in rows {
            out.insert(row?);
        }
    }
    Ok(out)
}

/// True if any reserved factory collection references `uid`.
pub fn is_factory_locked(conn: &Connection, uid: &Uid) -> Result<bool> {
    let locked: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM collection_membership m
            JOIN collections c ON c.id = m.collection_id
            WHERE m.uid = ?1 AND c.is_factory = 1
         )",
        params![uid],
        |row| row.get(0),
    )?;
    Ok(locked)
}

/// Subset of `uids` referenced by a factory collection.
pub fn factory_locked_set(conn: &Connection, uids: &[Uid], chunk_size: usize) -> Result<HashSet<Uid>> {
    let mut out = HashSet::new();
    for chunk in uids.chunks(chunk_size.max(1)) {
        let sql = format!(
            "SELECT DISTINCT m.uid FROM collection_membership m
             JOIN collections c ON c.id = m.collection_id
             WHERE c.is_factory = 1 AND m.uid IN ({})",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| row.get::<_, Uid>(0))?;
        for row in rows {
            out.insert(row?);
        }
    }
    Ok(out)
}

/// Membership rows whose UID has no sound record.
pub fn orphaned_members(conn: &Connection) -> Result<Vec<(i64, Uid)>> {
    let mut stmt = conn.prepare(
        "SELECT m.collection_id, m.uid FROM collection_membership m
         LEFT JOIN sounds s ON s.uid = m.uid
         WHERE s.uid IS NULL",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::create_canonical_schema;
    use crate::db::schema::create_sound;
    use crate::params::init_sound;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        create_canonical_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_slot_uniqueness_enforced() {
        let conn = setup_db();
        let lead = insert_collection(&conn, "Lead", false).unwrap();
        let a = create_sound(&conn, &init_sound()).unwrap();
        let b = create_sound(&conn, &init_sound()).unwrap();

        insert_member(&conn, lead.id, &a, 4).unwrap();
        assert!(insert_member(&conn, lead.id, &b, 4).is_err());
        assert!(insert_member(&conn, lead.id, &b, 1024).is_err());

        assert_eq!(get_slot(&conn, lead.id, &a).unwrap(), Some(4));
        assert_eq!(get_uid_at(&conn, lead.id, 4).unwrap(), Some(a.clone()));
        assert_eq!(get_uid_at(&conn, lead.id, 5).unwrap(), None);
        assert_eq!(list_slots(&conn, lead.id).unwrap().into_iter().collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_factory_lock_detection() {
        let conn = setup_db();
        let factory_id: i64 = conn
            .query_row("SELECT id FROM collections WHERE is_factory = 1 ORDER BY position LIMIT 1", [], |r| r.get(0))
            .unwrap();
        let user = insert_collection(&conn, "Mine", false).unwrap();
        let preset = create_sound(&conn, &init_sound()).unwrap();
        let own = create_sound(&conn, &init_sound()).unwrap();
        insert_member(&conn, factory_id, &preset, 0).unwrap();
        insert_member(&conn, user.id, &own, 0).unwrap();

        assert!(is_factory_locked(&conn, &preset).unwrap());
        assert!(!is_factory_locked(&conn, &own).unwrap());
        let locked = factory_locked_set(&conn, &[preset.clone(), own.clone()], 1).unwrap();
        assert_eq!(locked.len(), 1);
        assert!(locked.contains(&preset));
    }

    #[test]
    fn test_remove_members_chunked() {
        let conn = setup_db();
        let lead = insert_collection(&conn, "Lead", false).unwrap();
        let uids: Vec<Uid> = (0..6).map(|_| create_sound(&conn, &init_sound()).unwrap()).collect();
        for (i, uid) in uids.iter().enumerate() {
            insert_member(&conn, lead.id, uid, i as u16).unwrap();
        }
        assert_eq!(remove_members(&conn, lead.id, &uids[..5], 2).unwrap(), 5);
        assert_eq!(count_members(&conn, lead.id).unwrap(), 1);
    }

    #[test]
    fn test_delete_collection_drops_members() {
        let conn = setup_db();
        let lead = insert_collection(&conn, "Lead", false).unwrap();
        let a = create_sound(&conn, &init_sound()).unwrap();
        insert_member(&conn, lead.id, &a, 0).unwrap();

        assert_eq!(delete_collection_record(&conn, lead.id).unwrap(), 1);
        assert!(collections_of(&conn, &a).unwrap().is_empty());
    }
}
