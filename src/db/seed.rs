// Factory content seeding
// Factory presets and wavetable previews are written exactly once. An
// "empty" bitmask tells a fresh store (seed everything) from a complete one
// (nothing to do) and from a half-populated one, which is reported instead
// of being silently re-seeded.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::db::membership::{self, CollectionRecord};
use crate::db::schema;
use crate::db::wavetables::encode_samples;
use crate::error::{LibraryError, Result};
use crate::params;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactoryPreset {
    /// Index of the factory collection (0..3).
    pub bank: usize,
    pub slot: u16,
    pub params: Vec<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WavetablePreview {
    pub slot: i64,
    pub name: String,
    pub points: Vec<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorySeed {
    pub presets: Vec<FactoryPreset>,
    pub wavetable_previews: Vec<WavetablePreview>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SeedState {
    #[default]
    AlreadySeeded,
    Seeded,
    /// Some factory content present, some missing; bits mark the empty parts.
    Partial(u8),
}

impl FactorySeed {
    /// Minimal built-in content: an Init preset per factory collection and
    /// four basic-shape previews.
    pub fn builtin() -> Self {
        let presets = (0..FACTORY_COLLECTION_COUNT)
            .map(|bank| FactoryPreset {
                bank,
                slot: 0,
                params: params::init_sound(),
                tags: Vec::new(),
            })
            .collect();

        let shapes: [(&str, fn(f64) -> f64); 4] = [
            ("Sine", |x| (x * std::f64::consts::TAU).sin()),
            ("Triangle", |x| 1.0 - 4.0 * (x - 0.5).abs()),
            ("Saw", |x| 2.0 * x - 1.0),
            ("Square", |x| if x < 0.5 { 1.0 } else { -1.0 }),
        ];
        let wavetable_previews = shapes
            .iter()
            .enumerate()
            .map(|(slot, (name, shape))| WavetablePreview {
                slot: slot as i64,
                name: name.to_string(),
                points: (0..PREVIEW_POINTS)
                    .map(|i| {
                        let x = i as f64 / PREVIEW_POINTS as f64;
                        (shape(x) * f64::from(WAVE_SAMPLE_MAX)).round() as i32
                    })
                    .collect(),
            })
            .collect();

        Self { presets, wavetable_previews }
    }

    /// Load a bank export written as JSON.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| LibraryError::Read(format!("{}: {}", path.display(), e)))?;
        let seed: FactorySeed = serde_json::from_str(&raw)?;
        seed.validate()?;
        Ok(seed)
    }

    /// Every factory collection and the previews must receive content, or the
    /// next open would see a half-populated store.
    pub fn validate(&self) -> Result<()> {
        for bank in 0..FACTORY_COLLECTION_COUNT {
            if !self.presets.iter().any(|p| p.bank == bank) {
                return Err(LibraryError::InvalidArgument(format!(
                    "factory seed has no presets for bank {}",
                    bank
                )));
            }
        }
        if let Some(p) = self.presets.iter().find(|p| p.bank >= FACTORY_COLLECTION_COUNT || p.slot >= SLOT_COUNT) {
            return Err(LibraryError::InvalidArgument(format!(
                "factory preset out of range: bank {}, slot {}",
                p.bank, p.slot
            )));
        }
        let mut positions = HashSet::new();
        if let Some(p) = self.presets.iter().find(|p| !positions.insert((p.bank, p.slot))) {
            return Err(LibraryError::InvalidArgument(format!(
                "two factory presets share bank {}, slot {}",
                p.bank, p.slot
            )));
        }
        if self.wavetable_previews.is_empty() {
            return Err(LibraryError::InvalidArgument("factory seed has no wavetable previews".to_string()));
        }
        for preset in &self.presets {
            params::check_len(&preset.params)?;
        }
        Ok(())
    }
}

pub fn factory_records(conn: &Connection) -> Result<Vec<CollectionRecord>> {
    Ok(membership::list_collection_records(conn)?
        .into_iter()
        .filter(|r| r.is_factory)
        .collect())
}

/// Bit i set: factory collection i is empty. SEED_PREVIEWS_BIT: no previews.
pub fn empty_mask(conn: &Connection) -> Result<u8> {
    let mut mask = 0u8;
    for (i, record) in factory_records(conn)?.iter().take(FACTORY_COLLECTION_COUNT).enumerate() {
        if membership::count_members(conn, record.id)? == 0 {
            mask |= 1 << i;
        }
    }
    let previews: i64 = conn.query_row("SELECT COUNT(*) FROM wavetable_previews", [], |row| row.get(0))?;
    if previews == 0 {
        mask |= SEED_PREVIEWS_BIT;
    }
    Ok(mask)
}

/// Seed factory content when the store has none at all.
pub fn seed_factory_content(conn: &Connection, seed: &FactorySeed) -> Result<SeedState> {
    let mask = empty_mask(conn)?;
    if mask == 0 {
        return Ok(SeedState::AlreadySeeded);
    }
    if mask != SEED_ALL_EMPTY {
        log::warn!("Factory content is partially present (empty mask {:#06b}); not re-seeding", mask);
        return Ok(SeedState::Partial(mask));
    }

    seed.validate()?;
    let factories = factory_records(conn)?;
    let tx = conn.unchecked_transaction()?;
    for preset in &seed.presets {
        let record = factories
            .get(preset.bank)
            .ok_or_else(|| LibraryError::SchemaMismatch(format!("factory collection {} missing", preset.bank)))?;
        let uid = schema::create_sound(&tx, &preset.params)?;
        if !preset.tags.is_empty() {
            schema::set_tags(&tx, &uid, &preset.tags)?;
        }
        membership::insert_member(&tx, record.id, &uid, preset.slot)?;
    }
    for preview in &seed.wavetable_previews {
        tx.execute(
            "INSERT OR REPLACE INTO wavetable_previews (slot, name, points) VALUES (?1, ?2, ?3)",
            params![preview.slot, preview.name, encode_samples(&preview.points)],
        )?;
    }
    tx.commit()?;

    log::info!(
        "Seeded {} factory presets and {} wavetable previews",
        seed.presets.len(),
        seed.wavetable_previews.len()
    );
    Ok(SeedState::Seeded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_seed_is_valid() {
        let seed = FactorySeed::builtin();
        seed.validate().unwrap();
        assert_eq!(seed.presets.len(), FACTORY_COLLECTION_COUNT);
        assert_eq!(seed.wavetable_previews.len(), 4);
        assert!(seed.wavetable_previews.iter().all(|p| p.points.len() == PREVIEW_POINTS));
    }

    #[test]
    fn test_seed_missing_bank_rejected() {
        let mut seed = FactorySeed::builtin();
        seed.presets.retain(|p| p.bank != 1);
        assert!(seed.validate().is_err());
    }

    #[test]
    fn test_seed_duplicate_position_rejected() {
        let mut seed = FactorySeed::builtin();
        let twin = seed.presets[0].clone();
        seed.presets.push(twin);
        let err = seed.validate().unwrap_err();
        assert!(matches!(err, LibraryError::InvalidArgument(_)));

        let conn = Connection::open_in_memory().unwrap();
        crate::db::migrations::create_canonical_schema(&conn).unwrap();
        assert!(seed_factory_content(&conn, &seed).is_err());
        assert_eq!(schema::count_sounds(&conn).unwrap(), 0);
    }

    #[test]
    fn test_seed_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.json");
        std::fs::write(&path, serde_json::to_string(&FactorySeed::builtin()).unwrap()).unwrap();
        let loaded = FactorySeed::from_json_file(&path).unwrap();
        assert_eq!(loaded.presets.len(), FACTORY_COLLECTION_COUNT);
    }
}
