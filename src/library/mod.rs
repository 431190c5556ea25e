// Library facade
// One open sound library: the connection, its collection registry, the event
// bus and the write gate shared with the backup worker. Every mutating call
// runs in one transaction under the gate and emits events only after commit.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;

use crate::collections::{slots, CollectionHandle, CollectionRegistry};
use crate::config::LibraryConfig;
use crate::constants::{BANK_COUNT, BANK_SIZE};
use crate::db::catalog::{self, Tag, Template};
use crate::db::membership;
use crate::db::schema::{self, Sound, Uid};
use crate::db::seed::FactorySeed;
use crate::db::wavetables::{self, DumpedWavetable, Wavetable};
use crate::db::{self, SchemaReport};
use crate::error::{ErrorCode, LibraryError, Result};
use crate::events::{EventBus, LibraryEvent};
use crate::hash;
use crate::jobs::{self, BackupOutcome, BackupWorker};
use crate::params::{self, names};
use crate::reorder;


/// Summary for `info`-style views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryInfo {
    pub path: PathBuf,
    pub sounds: i64,
    pub collections: Vec<CollectionInfo>,
    pub tags: usize,
    pub templates: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub name: String,
    pub is_factory: bool,
    pub members: i64,
}

pub struct Library {
    conn: Connection,
    db_path: PathBuf,
    config: LibraryConfig,
    registry: CollectionRegistry,
    events: Arc<EventBus>,
    write_gate: Arc<Mutex<()>>,
    report: SchemaReport,
    last_error: Cell<Option<ErrorCode>>,
    // Started by `open` when backups are enabled; stopped on drop.
    backup_worker: Option<BackupWorker>,
}

impl Library {
    /// Open the database at `db_path`, migrating and seeding as needed.
    /// Starts the periodic backup when `config.backup.enabled` is set.
    pub fn open(db_path: &Path, config: LibraryConfig, seed: &FactorySeed) -> Result<Self> {
        config.validate()?;
        let (conn, report) = db::open_library(db_path, &config, seed).map_err(|e| {
            log::error!("Failed to open library {}: {} ({:?})", db_path.display(), e, e.code());
            e
        })?;
        let registry = CollectionRegistry::load(&conn)?;
        log::info!(
            "Opened library {} ({} collections, {} changes on open)",
            db_path.display(),
            registry.list().len(),
            report.changes
        );
        let mut lib = Self {
            conn,
            db_path: db_path.to_path_buf(),
            config,
            registry,
            events: Arc::new(EventBus::new()),
            write_gate: Arc::new(Mutex::new(())),
            report,
            last_error: Cell::new(None),
            backup_worker: None,
        };
        if lib.config.backup.enabled {
            lib.backup_worker = Some(lib.start_backup_worker()?);
            log::info!(
                "Periodic backup every {}s into {}",
                lib.config.backup.interval_secs,
                lib.backup_dir().display()
            );
        }
        Ok(lib)
    }

    /// Open `<root>/.soundvault/library.db` with the config stored beside it.
    pub fn open_root(root: &Path) -> Result<Self> {
        let config = LibraryConfig::load(&db::get_config_path(root))?;
        Self::open(&db::get_db_path(root), config, &FactorySeed::builtin())
    }

    pub fn report(&self) -> &SchemaReport {
        &self.report
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn subscribe(&self) -> Receiver<LibraryEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Code of the most recent failed call, if any.
    pub fn last_error(&self) -> Option<ErrorCode> {
        self.last_error.get()
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.last_error.set(Some(e.code()));
        }
        result
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.track(f(&self.conn))
    }

    /// Run `f` in one transaction under the write gate. Rolls back on error.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let result = (|| -> Result<T> {
            let _guard = self
                .write_gate
                .lock()
                .map_err(|_| LibraryError::Other("write gate poisoned".to_string()))?;
            let tx = self.conn.unchecked_transaction()?;
            let value = f(&tx)?;
            tx.commit().map_err(|e| LibraryError::Write(e.to_string()))?;
            Ok(value)
        })();
        self.track(result)
    }

    fn collection(&self, name: &str) -> Result<CollectionHandle> {
        self.track(self.registry.get(name).cloned())
    }

    fn mutable_collection(&self, name: &str) -> Result<CollectionHandle> {
        self.track(self.registry.get_mutable(name).cloned())
    }

    fn collection_id(&self, name: Option<&str>) -> Result<Option<i64>> {
        name.map(|n| self.collection(n).map(|h| h.id)).transpose()
    }

    fn changed(&self, handle: &CollectionHandle) {
        self.events.emit(LibraryEvent::CollectionChanged { collection: handle.name.clone() });
    }

    fn ensure_unlocked(conn: &Connection, uid: &Uid) -> Result<()> {
        if membership::is_factory_locked(conn, uid)? {
            return Err(LibraryError::FactoryLocked(uid.to_string()));
        }
        Ok(())
    }

    pub fn info(&self) -> Result<LibraryInfo> {
        self.read(|conn| {
            let mut collections = Vec::new();
            for handle in self.registry.list() {
                collections.push(CollectionInfo {
                    name: handle.name.clone(),
                    is_factory: handle.is_factory,
                    members: membership::count_members(conn, handle.id)?,
                });
            }
            Ok(LibraryInfo {
                path: self.db_path.clone(),
                sounds: schema::count_sounds(conn)?,
                collections,
                tags: catalog::list_tags(conn)?.len(),
                templates: catalog::list_templates(conn, None)?.len(),
            })
        })
    }

    // ----- Sound store -----

    /// Parameter vector of `uid`. `valid_only` drops the reserved placeholders.
    pub fn get_parameters(&self, uid: &Uid, valid_only: bool) -> Result<Vec<i32>> {
        self.read(|conn| {
            let params = schema::require_parameters(conn, uid)?;
            Ok(if valid_only { params::strip_reserved(&params) } else { params })
        })
    }

    pub fn get_sound(&self, uid: &Uid) -> Result<Sound> {
        self.read(|conn| {
            schema::get_sounds(conn, std::slice::from_ref(uid), 1)?
                .pop()
                .ok_or_else(|| LibraryError::SoundNotFound(uid.to_string()))
        })
    }

    /// Sounds in input order; unknown UIDs are skipped.
    pub fn get_sounds(&self, uids: &[Uid]) -> Result<Vec<Sound>> {
        self.read(|conn| schema::get_sounds(conn, uids, self.config.chunk_size))
    }

    pub fn sound_name(&self, uid: &Uid) -> Result<String> {
        Ok(names::read_name(&self.get_parameters(uid, false)?))
    }

    pub fn name_exists(&self, name: &str) -> Result<bool> {
        self.read(|conn| schema::name_exists(conn, name))
    }

    /// UIDs whose stored parameters equal `params` once sanitized.
    pub fn find_identical(&self, params: &[i32]) -> Result<Vec<Uid>> {
        self.read(|conn| {
            let fingerprint = hash::parameter_fingerprint(&params::sanitize(params)?);
            Ok(schema::fingerprint_index(conn)?.remove(&fingerprint).unwrap_or_default())
        })
    }

    pub fn count_sounds(&self) -> Result<i64> {
        self.read(schema::count_sounds)
    }

    pub fn insert_sound(&self, params: &[i32]) -> Result<Uid> {
        let uid = self.write(|conn| schema::create_sound(conn, params))?;
        self.events.emit(LibraryEvent::SoundsChanged { uids: vec![uid.clone()] });
        Ok(uid)
    }

    pub fn update_sound(&self, uid: &Uid, params: &[i32]) -> Result<()> {
        self.write(|conn| {
            Self::ensure_unlocked(conn, uid)?;
            schema::update_sound(conn, uid, params)
        })?;
        self.events.emit(LibraryEvent::SoundsChanged { uids: vec![uid.clone()] });
        Ok(())
    }

    /// Returns the sanitized value actually stored.
    pub fn update_field(&self, uid: &Uid, index: usize, value: i32) -> Result<i32> {
        let stored = self.write(|conn| {
            Self::ensure_unlocked(conn, uid)?;
            schema::update_field(conn, uid, index, value)
        })?;
        self.events.emit(LibraryEvent::SoundsChanged { uids: vec![uid.clone()] });
        Ok(stored)
    }

    /// Delete sounds with their reference rows and every membership.
    pub fn delete_sounds(&self, uids: &[Uid]) -> Result<usize> {
        let chunk = self.config.chunk_size;
        let (deleted, touched) = self.write(|conn| {
            let locked = membership::factory_locked_set(conn, uids, chunk)?;
            if let Some(uid) = locked.iter().next() {
                return Err(LibraryError::FactoryLocked(uid.to_string()));
            }
            let touched = membership::collection_ids_of(conn, uids, chunk)?;
            membership::remove_from_all_collections(conn, uids, chunk)?;
            schema::delete_reference_rows(conn, uids, chunk)?;
            let deleted = schema::delete_sound_params(conn, uids, chunk)?;
            Ok((deleted, touched))
        })?;

        self.events.emit(LibraryEvent::SoundsChanged { uids: uids.to_vec() });
        for id in touched {
            if let Some(handle) = self.registry.by_id(id) {
                self.changed(handle);
            }
        }
        Ok(deleted)
    }

    pub fn duplicate_sound(&self, uid: &Uid, rename: bool) -> Result<Uid> {
        let copy = self.write(|conn| schema::duplicate_sound(conn, uid, rename))?;
        self.events.emit(LibraryEvent::SoundsChanged { uids: vec![copy.clone()] });
        Ok(copy)
    }

    // ----- Collections -----

    pub fn list_collections(&self) -> &[CollectionHandle] {
        self.registry.list()
    }

    /// Create a collection, optionally copying `source` and filling the empty
    /// slots of `init_banks` with Init sounds. Factory-locked sounds in the
    /// source are duplicated rather than shared.
    pub fn create_collection(
        &mut self,
        name: &str,
        source: Option<&str>,
        init_banks: &[u16],
    ) -> Result<CollectionHandle> {
        let name = self.track(self.registry.check_new_name(name, None))?;
        let source = source.map(|s| self.collection(s)).transpose()?;
        if let Some(bank) = init_banks.iter().find(|b| **b >= BANK_COUNT) {
            return self.track(Err(LibraryError::InvalidArgument(format!("no bank {}", bank))));
        }

        let record = self.write(|conn| {
            let record = membership::insert_collection(conn, &name, false)?;
            if let Some(src) = &source {
                let members = membership::members(conn, src.id)?;
                // user collections migrated from legacy stores may still alias factory sounds
                let uids: Vec<Uid> = members.values().cloned().collect();
                let locked = membership::factory_locked_set(conn, &uids, self.config.chunk_size)?;
                for (slot, uid) in members {
                    let placed = if src.is_factory || locked.contains(&uid) {
                        schema::duplicate_sound(conn, &uid, false)?
                    } else {
                        uid
                    };
                    membership::insert_member(conn, record.id, &placed, slot)?;
                }
            }
            if !init_banks.is_empty() {
                let taken = membership::list_slots(conn, record.id)?;
                let init = params::init_sound();
                let banks: BTreeSet<u16> = init_banks.iter().copied().collect();
                for bank in banks {
                    for slot in bank * BANK_SIZE..(bank + 1) * BANK_SIZE {
                        if !taken.contains(&slot) {
                            let uid = schema::create_sound(conn, &init)?;
                            membership::insert_member(conn, record.id, &uid, slot)?;
                        }
                    }
                }
            }
            Ok(record)
        })?;

        let handle = CollectionHandle::from(record);
        self.registry.insert(handle.clone());
        log::info!("Created collection '{}'", handle.name);
        self.events.emit(LibraryEvent::CollectionCreated { collection: handle.name.clone() });
        Ok(handle)
    }

    pub fn rename_collection(&mut self, old: &str, new: &str) -> Result<()> {
        let handle = self.mutable_collection(old)?;
        let new_name = self.track(self.registry.check_new_name(new, Some(handle.id)))?;
        self.write(|conn| membership::rename_collection_record(conn, handle.id, &new_name))?;
        self.registry.rename(handle.id, &new_name);
        self.events.emit(LibraryEvent::CollectionRenamed { old: handle.name, new: new_name });
        Ok(())
    }

    /// Drop a collection and its slot assignments. Sounds stay in the library.
    pub fn delete_collection(&mut self, name: &str) -> Result<()> {
        let handle = self.mutable_collection(name)?;
        self.write(|conn| membership::delete_collection_record(conn, handle.id))?;
        self.registry.remove(handle.id);
        log::info!("Deleted collection '{}'", handle.name);
        self.events.emit(LibraryEvent::CollectionDeleted { collection: handle.name });
        Ok(())
    }

    pub fn get_slot(&self, uid: &Uid, collection: &str) -> Result<Option<u16>> {
        let handle = self.collection(collection)?;
        self.read(|conn| membership::get_slot(conn, handle.id, uid))
    }

    pub fn get_uid_at(&self, collection: &str, slot: i64) -> Result<Option<Uid>> {
        let handle = self.collection(collection)?;
        let slot = self.track(slots::check_slot(slot))?;
        self.read(|conn| membership::get_uid_at(conn, handle.id, slot))
    }

    pub fn list_slots(&self, collection: &str) -> Result<BTreeSet<u16>> {
        let handle = self.collection(collection)?;
        self.read(|conn| membership::list_slots(conn, handle.id))
    }

    pub fn collection_members(&self, collection: &str) -> Result<BTreeMap<u16, Uid>> {
        let handle = self.collection(collection)?;
        self.read(|conn| membership::members(conn, handle.id))
    }

    pub fn collections_of(&self, uid: &Uid) -> Result<Vec<(String, u16)>> {
        self.read(|conn| membership::collections_of(conn, uid))
    }

    pub fn is_factory_locked(&self, uid: &Uid) -> Result<bool> {
        self.read(|conn| membership::is_factory_locked(conn, uid))
    }

    // ----- Tags -----

    /// Replace the tags of every listed sound. Unknown tag names are added
    /// to the catalog.
    pub fn set_tags(&self, uids: &[Uid], tags: &[String]) -> Result<()> {
        self.write(|conn| {
            catalog::ensure_tags(conn, tags)?;
            for uid in uids {
                schema::set_tags(conn, uid, tags)?;
            }
            Ok(())
        })?;
        self.events.emit(LibraryEvent::TagsChanged);
        self.events.emit(LibraryEvent::SoundsChanged { uids: uids.to_vec() });
        Ok(())
    }

    pub fn get_tags(&self, uids: &[Uid]) -> Result<BTreeMap<Uid, Vec<String>>> {
        self.read(|conn| schema::get_tags(conn, uids, self.config.chunk_size))
    }

    pub fn count_by_tag(&self, collection: Option<&str>) -> Result<BTreeMap<String, i64>> {
        let id = self.collection_id(collection)?;
        self.read(|conn| schema::count_by_tag(conn, id))
    }

    /// Sounds per category code.
    pub fn count_by_category(&self, collection: Option<&str>) -> Result<BTreeMap<i64, i64>> {
        let id = self.collection_id(collection)?;
        self.read(|conn| schema::count_by_category(conn, id))
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.read(catalog::list_tags)
    }

    pub fn add_tag(&self, tag: &Tag) -> Result<()> {
        self.write(|conn| catalog::upsert_tag(conn, tag))?;
        self.events.emit(LibraryEvent::TagsChanged);
        Ok(())
    }

    pub fn set_tag_colors(&self, name: &str, bg_color: i64, fg_color: i64) -> Result<()> {
        self.write(|conn| {
            let mut tag = catalog::get_tag(conn, name)?.ok_or_else(|| LibraryError::TagNotFound(name.to_string()))?;
            tag.bg_color = bg_color;
            tag.fg_color = fg_color;
            catalog::upsert_tag(conn, &tag)
        })?;
        self.events.emit(LibraryEvent::TagsChanged);
        Ok(())
    }

    /// Returns the number of sounds whose tag list changed.
    pub fn rename_tag(&self, old: &str, new: &str) -> Result<usize> {
        let touched = self.write(|conn| catalog::rename_tag(conn, old, new))?;
        self.events.emit(LibraryEvent::TagsChanged);
        Ok(touched)
    }

    pub fn delete_tag(&self, name: &str) -> Result<usize> {
        let touched = self.write(|conn| catalog::delete_tag(conn, name))?;
        self.events.emit(LibraryEvent::TagsChanged);
        Ok(touched)
    }

    // ----- Templates -----

    pub fn save_template(&self, template: &Template) -> Result<()> {
        self.write(|conn| catalog::save_template(conn, template))?;
        self.events.emit(LibraryEvent::TemplatesChanged);
        Ok(())
    }

    pub fn get_template(&self, name: &str) -> Result<Template> {
        self.read(|conn| {
            catalog::get_template(conn, name)?.ok_or_else(|| LibraryError::TemplateNotFound(name.to_string()))
        })
    }

    pub fn list_templates(&self, group: Option<&str>) -> Result<Vec<Template>> {
        self.read(|conn| catalog::list_templates(conn, group))
    }

    pub fn delete_template(&self, name: &str) -> Result<()> {
        self.write(|conn| catalog::delete_template(conn, name))?;
        self.events.emit(LibraryEvent::TemplatesChanged);
        Ok(())
    }

    /// Overlay a template's values onto a sound.
    pub fn apply_template(&self, uid: &Uid, name: &str) -> Result<()> {
        self.write(|conn| {
            Self::ensure_unlocked(conn, uid)?;
            let template =
                catalog::get_template(conn, name)?.ok_or_else(|| LibraryError::TemplateNotFound(name.to_string()))?;
            let params = catalog::overlay_template(&schema::require_parameters(conn, uid)?, &template)?;
            schema::update_sound(conn, uid, &params)
        })?;
        self.events.emit(LibraryEvent::SoundsChanged { uids: vec![uid.clone()] });
        Ok(())
    }

    // ----- Wavetables -----

    pub fn save_local_wavetable(&self, slot: i64, name: &str, samples: &[i32]) -> Result<()> {
        self.write(|conn| wavetables::save_local_wavetable(conn, slot, name, samples))?;
        self.events.emit(LibraryEvent::WavetablesChanged);
        Ok(())
    }

    pub fn get_local_wavetable(&self, slot: i64) -> Result<Option<Wavetable>> {
        self.read(|conn| wavetables::get_local_wavetable(conn, slot))
    }

    pub fn list_local_wavetables(&self) -> Result<Vec<(i64, String)>> {
        self.read(wavetables::list_local_wavetables)
    }

    pub fn delete_local_wavetable(&self, slot: i64) -> Result<bool> {
        let deleted = self.write(|conn| wavetables::delete_local_wavetable(conn, slot))?;
        if deleted {
            self.events.emit(LibraryEvent::WavetablesChanged);
        }
        Ok(deleted)
    }

    pub fn record_dumped_wavetable(&self, slot: i64, name: &str, samples: &[i32]) -> Result<i64> {
        let id = self.write(|conn| wavetables::record_dumped_wavetable(conn, slot, name, samples))?;
        self.events.emit(LibraryEvent::WavetablesChanged);
        Ok(id)
    }

    pub fn list_dumped_wavetables(&self) -> Result<Vec<DumpedWavetable>> {
        self.read(wavetables::list_dumped_wavetables)
    }

    pub fn list_previews(&self) -> Result<Vec<(i64, String)>> {
        self.read(wavetables::list_previews)
    }

    pub fn get_preview(&self, slot: i64) -> Result<Option<Vec<i32>>> {
        self.read(|conn| wavetables::get_preview(conn, slot))
    }

    // ----- Slot reorder -----

    /// Place sounds at slots. Factory-locked sounds are duplicated and the
    /// copy is placed. Returns the UIDs actually placed, in input order.
    pub fn add_sounds(&self, collection: &str, pairs: &[(Uid, u16)]) -> Result<Vec<Uid>> {
        let handle = self.mutable_collection(collection)?;
        let chunk = self.config.chunk_size;
        let placed = self.write(|conn| add_sounds_in(conn, handle.id, pairs, chunk))?;
        self.changed(&handle);
        Ok(placed)
    }

    /// Clear the slots of the given sounds. The sounds themselves stay.
    pub fn remove_sounds(&self, collection: &str, uids: &[Uid]) -> Result<usize> {
        let handle = self.mutable_collection(collection)?;
        let chunk = self.config.chunk_size;
        let removed = self.write(|conn| membership::remove_members(conn, handle.id, uids, chunk))?;
        if removed > 0 {
            self.changed(&handle);
        }
        Ok(removed)
    }

    /// Move `uids[i]` to `targets[i]`; displaced sounds take the vacated slots.
    pub fn swap_slots(&self, collection: &str, uids: &[Uid], targets: &[u16]) -> Result<()> {
        let handle = self.mutable_collection(collection)?;
        let chunk = self.config.chunk_size;
        self.write(|conn| {
            let layout = membership::members(conn, handle.id)?;
            let present: HashSet<&Uid> = layout.values().collect();
            if let Some(outsider) = uids.iter().find(|u| !present.contains(u)) {
                return Err(LibraryError::InvalidArgument(format!(
                    "{} is not in '{}'",
                    outsider, handle.name
                )));
            }
            let change = reorder::plan_swap(&layout, uids, targets)?;
            reorder::apply(conn, handle.id, &change, chunk)
        })
        .map_err(|e| {
            if let LibraryError::InvalidArgument(why) = &e {
                log::warn!("Swap in '{}' rejected: {}", handle.name, why);
            }
            e
        })?;
        self.changed(&handle);
        Ok(())
    }

    /// Move the sounds at `source_slots` as one block to the insertion point
    /// `target` (0..=1024), shifting the sounds in between. Returns false when
    /// the layout would not change; nothing is written then.
    pub fn insert_with_shift(&self, collection: &str, source_slots: &[u16], target: u16) -> Result<bool> {
        let handle = self.mutable_collection(collection)?;
        let chunk = self.config.chunk_size;
        let moved = self.write(|conn| {
            let layout = membership::members(conn, handle.id)?;
            match reorder::plan_shift(&layout, source_slots, target)? {
                Some(change) => {
                    reorder::apply(conn, handle.id, &change, chunk)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })?;
        if moved {
            self.changed(&handle);
        }
        Ok(moved)
    }

    /// Insert duplicates of `uids` starting at `target`, pushing occupants
    /// aside. Returns the new UIDs.
    pub fn duplicate_insert(&self, collection: &str, uids: &[Uid], target: u16) -> Result<Vec<Uid>> {
        let handle = self.mutable_collection(collection)?;
        let chunk = self.config.chunk_size;
        let rename = self.config.rename_duplicates;
        let copies = self.write(|conn| {
            let mut copies = Vec::with_capacity(uids.len());
            for uid in uids {
                copies.push(schema::duplicate_sound(conn, uid, rename)?);
            }
            let layout = membership::members(conn, handle.id)?;
            let (change, start) = reorder::plan_insert_push(&layout, &copies, target)?;
            reorder::apply(conn, handle.id, &change, chunk)?;
            log::debug!("Inserted {} duplicates into '{}' at {}", copies.len(), handle.name, start);
            Ok(copies)
        })?;
        self.events.emit(LibraryEvent::SoundsChanged { uids: copies.clone() });
        self.changed(&handle);
        Ok(copies)
    }

    /// Replace the sounds at `targets` with `uids`. A sound already sitting at
    /// one of the targets is reused; everything else is duplicated.
    pub fn duplicate_replace(&self, collection: &str, uids: &[Uid], targets: &[u16]) -> Result<Vec<Uid>> {
        let handle = self.mutable_collection(collection)?;
        if uids.len() != targets.len() {
            return self.track(Err(LibraryError::InvalidArgument(format!(
                "{} sounds for {} target slots",
                uids.len(),
                targets.len()
            ))));
        }
        let chunk = self.config.chunk_size;
        let rename = self.config.rename_duplicates;
        let (placed, created) = self.write(|conn| {
            let layout = membership::members(conn, handle.id)?;
            let at_targets: HashSet<&Uid> = targets.iter().filter_map(|t| layout.get(t)).collect();

            let mut reused: HashSet<&Uid> = HashSet::new();
            let mut created = Vec::new();
            let mut pairs = Vec::with_capacity(uids.len());
            for (uid, target) in uids.iter().zip(targets) {
                let placed = if at_targets.contains(uid) && reused.insert(uid) {
                    uid.clone()
                } else {
                    let copy = schema::duplicate_sound(conn, uid, rename)?;
                    created.push(copy.clone());
                    copy
                };
                pairs.push((placed, *target));
            }
            for target in targets {
                membership::clear_slot(conn, handle.id, *target)?;
            }
            let placed = add_sounds_in(conn, handle.id, &pairs, chunk)?;
            Ok((placed, created))
        })?;
        if !created.is_empty() {
            self.events.emit(LibraryEvent::SoundsChanged { uids: created });
        }
        self.changed(&handle);
        Ok(placed)
    }

    // ----- Backup -----

    pub fn backup_dir(&self) -> PathBuf {
        self.config.backup_dir(&self.db_path)
    }

    /// Write a backup now, waiting for any write in progress.
    pub fn backup_now(&self) -> Result<BackupOutcome> {
        let result = jobs::run_backup(
            &self.db_path,
            &self.backup_dir(),
            &self.config.backup,
            &self.write_gate,
            Some(&self.events),
        );
        self.track(result)
    }

    pub fn is_backup_running(&self) -> bool {
        self.backup_worker.as_ref().map_or(false, BackupWorker::is_running)
    }

    /// Start the periodic backup thread. It shares this library's write gate.
    fn start_backup_worker(&self) -> Result<BackupWorker> {
        jobs::spawn_backup_worker(
            self.db_path.clone(),
            self.backup_dir(),
            self.config.backup.clone(),
            Arc::clone(&self.write_gate),
            Arc::clone(&self.events),
        )
    }
}

/// Core of `add_sounds`: clear each target, drop the sound's old slot in this
/// collection, then write. Factory-locked sounds are duplicated first.
fn add_sounds_in(conn: &Connection, collection_id: i64, pairs: &[(Uid, u16)], chunk_size: usize) -> Result<Vec<Uid>> {
    let mut targets = HashSet::with_capacity(pairs.len());
    let mut sources = HashSet::with_capacity(pairs.len());
    for (uid, slot) in pairs {
        slots::check_slot(i64::from(*slot))?;
        if !targets.insert(*slot) {
            return Err(LibraryError::InvalidArgument(format!("slot {} targeted twice", slot)));
        }
        if !sources.insert(uid) {
            return Err(LibraryError::InvalidArgument(format!("{} listed twice", uid)));
        }
        if !schema::sound_exists(conn, uid)? {
            return Err(LibraryError::SoundNotFound(uid.to_string()));
        }
    }

    let uids: Vec<Uid> = pairs.iter().map(|(u, _)| u.clone()).collect();
    let locked = membership::factory_locked_set(conn, &uids, chunk_size)?;

    let mut placed = Vec::with_capacity(pairs.len());
    for (uid, slot) in pairs {
        let uid = if locked.contains(uid) {
            schema::duplicate_sound(conn, uid, false)?
        } else {
            uid.clone()
        };
        membership::clear_slot(conn, collection_id, *slot)?;
        membership::remove_member(conn, collection_id, &uid)?;
        membership::insert_member(conn, collection_id, &uid, *slot)?;
        placed.push(uid);
    }
    Ok(placed)
}
