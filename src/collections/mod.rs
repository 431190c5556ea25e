// Collection registry
// The library instance owns one registry, loaded from the `collections`
// table at open. Handles are looked up case-insensitively; every mutation
// goes through the database first and is mirrored here only after commit.

pub mod slots;

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;

use crate::constants::{COLLECTION_NAME_MAX_LEN, FIXED_REFERENCE_COLUMNS, RESERVED_COLLECTION_NAMES};
use crate::db::membership::{self, CollectionRecord};
use crate::error::{LibraryError, Result};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _.\-+#()]*$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionHandle {
    pub id: i64,
    pub name: String,
    pub is_factory: bool,
}

impl From<CollectionRecord> for CollectionHandle {
    fn from(record: CollectionRecord) -> Self {
        Self { id: record.id, name: record.name, is_factory: record.is_factory }
    }
}

/// Validate a user-supplied collection name. Returns the trimmed name.
pub fn validate_collection_name(name: &str) -> Result<String> {
    let name = name.trim();
    let reject = |why: &str| Err(LibraryError::InvalidCollectionName(format!("'{}': {}", name, why)));

    if name.is_empty() {
        return reject("name is empty");
    }
    if name.chars().count() > COLLECTION_NAME_MAX_LEN {
        return reject("name is too long");
    }
    if !NAME_RE.is_match(name) {
        return reject("only letters, digits, spaces and _ . - + # ( ) are allowed");
    }
    let lower = name.to_ascii_lowercase();
    if RESERVED_COLLECTION_NAMES.contains(&lower.as_str()) || FIXED_REFERENCE_COLUMNS.contains(&lower.as_str()) {
        return reject("name is reserved");
    }
    Ok(name.to_string())
}

#[derive(Debug, Default)]
pub struct CollectionRegistry {
    handles: Vec<CollectionHandle>,
}

impl CollectionRegistry {
    pub fn load(conn: &Connection) -> Result<Self> {
        let handles = membership::list_collection_records(conn)?
            .into_iter()
            .map(CollectionHandle::from)
            .collect();
        Ok(Self { handles })
    }

    pub fn list(&self) -> &[CollectionHandle] {
        &self.handles
    }

    pub fn find(&self, name: &str) -> Option<&CollectionHandle> {
        let name = name.trim();
        self.handles.iter().find(|h| h.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Result<&CollectionHandle> {
        self.find(name)
            .ok_or_else(|| LibraryError::CollectionNotFound(name.to_string()))
    }

    pub fn by_id(&self, id: i64) -> Option<&CollectionHandle> {
        self.handles.iter().find(|h| h.id == id)
    }

    /// A handle that accepts writes.
    pub fn get_mutable(&self, name: &str) -> Result<&CollectionHandle> {
        let handle = self.get(name)?;
        if handle.is_factory {
            return Err(LibraryError::ReadOnlyCollection(handle.name.clone()));
        }
        Ok(handle)
    }

    /// Validated name that no other collection uses. `except` allows a
    /// rename to change only the letter case.
    pub fn check_new_name(&self, name: &str, except: Option<i64>) -> Result<String> {
        let name = validate_collection_name(name)?;
        if let Some(existing) = self.find(&name) {
            if Some(existing.id) != except {
                return Err(LibraryError::CollectionExists(existing.name.clone()));
            }
        }
        Ok(name)
    }

    pub fn insert(&mut self, handle: CollectionHandle) {
        self.handles.push(handle);
    }

    pub fn rename(&mut self, id: i64, new_name: &str) {
        if let Some(handle) = self.handles.iter_mut().find(|h| h.id == id) {
            handle.name = new_name.to_string();
        }
    }

    pub fn remove(&mut self, id: i64) -> Option<CollectionHandle> {
        let index = self.handles.iter().position(|h| h.id == id)?;
        Some(self.handles.remove(index))
    }
}
