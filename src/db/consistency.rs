// Startup consistency pass
// Repairs slot data left behind by earlier versions: overfull collections,
// duplicated slot numbers and out-of-range slots. Repairs are warnings, not
// failures; a clean pass performs no writes.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use serde::Serialize;

use crate::config::ConsistencyPolicy;
use crate::constants::SLOT_COUNT;
use crate::db::membership;
use crate::db::schema::{self, Uid};
use crate::error::Result;

/// What the pass decided for one collection's (uid, slot) entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsistencyPlan {
    pub kept: Vec<(Uid, u16)>,
    pub trimmed: Vec<Uid>,
    pub duplicates: Vec<(Uid, i64)>,
    pub out_of_range: Vec<(Uid, i64)>,
}

impl ConsistencyPlan {
    pub fn is_clean(&self) -> bool {
        self.trimmed.is_empty() && self.duplicates.is_empty() && self.out_of_range.is_empty()
    }

    /// UIDs that lose their slot in this collection.
    pub fn dropped(&self) -> Vec<Uid> {
        self.trimmed
            .iter()
            .cloned()
            .chain(self.duplicates.iter().map(|(u, _)| u.clone()))
            .chain(self.out_of_range.iter().map(|(u, _)| u.clone()))
            .collect()
    }
}

/// Repairs applied to one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRepair {
    pub collection: String,
    pub trimmed: usize,
    pub purged: usize,
    pub duplicates_nulled: usize,
    pub out_of_range: usize,
    pub orphans_removed: usize,
}

impl CollectionRepair {
    pub fn is_empty(&self) -> bool {
        self.trimmed + self.purged + self.duplicates_nulled + self.out_of_range + self.orphans_removed == 0
    }
}

fn in_range(slot: i64) -> bool {
    (0..i64::from(SLOT_COUNT)).contains(&slot)
}

/// Decide which entries survive. `pairs` is in insertion order.
///
/// Overflow beyond `capacity` is trimmed keeping in-range, lowest slots first;
/// among survivors the first-seen UID keeps a contested slot.
pub fn plan(pairs: &[(Uid, i64)], policy: &ConsistencyPolicy) -> ConsistencyPlan {
    let mut out = ConsistencyPlan::default();

    let mut survivors: Vec<usize> = (0..pairs.len()).collect();
    if policy.trim_overflow && pairs.len() > policy.capacity {
        let mut ranked = survivors.clone();
        ranked.sort_by_key(|&i| (!in_range(pairs[i].1), pairs[i].1, i));
        let (keep, trim) = ranked.split_at(policy.capacity);
        out.trimmed = trim.iter().map(|&i| pairs[i].0.clone()).collect();
        survivors = keep.to_vec();
        survivors.sort_unstable();
    }

    let mut seen: HashSet<i64> = HashSet::new();
    for i in survivors {
        let (uid, slot) = &pairs[i];
        if !in_range(*slot) {
            out.out_of_range.push((uid.clone(), *slot));
        } else if !seen.insert(*slot) {
            out.duplicates.push((uid.clone(), *slot));
        } else {
            out.kept.push((uid.clone(), *slot as u16));
        }
    }
    out
}

/// Of the trimmed UIDs, those whose parameters also exist under another UID.
/// Each purge is checked against the survivors so one copy always remains.
pub fn select_purgeable(conn: &Connection, candidates: &[Uid]) -> Result<Vec<Uid>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let index = schema::fingerprint_index(conn)?;
    let mut fingerprint_of: HashMap<&Uid, &String> = HashMap::new();
    for (fingerprint, uids) in &index {
        for uid in uids {
            fingerprint_of.insert(uid, fingerprint);
        }
    }

    let mut purged: Vec<Uid> = Vec::new();
    for uid in candidates {
        if purged.contains(uid) {
            continue;
        }
        let Some(fingerprint) = fingerprint_of.get(uid) else {
            continue;
        };
        let has_twin = index[*fingerprint]
            .iter()
            .any(|other| other != uid && !purged.contains(other));
        if has_twin {
            purged.push(uid.clone());
        }
    }
    Ok(purged)
}

/// Delete a sound completely: memberships, reference row and parameters.
pub fn purge_sounds(conn: &Connection, uids: &[Uid], chunk_size: usize) -> Result<()> {
    membership::remove_from_all_collections(conn, uids, chunk_size)?;
    schema::delete_reference_rows(conn, uids, chunk_size)?;
    schema::delete_sound_params(conn, uids, chunk_size)?;
    Ok(())
}

/// Run the pass over every canonical collection. Writes only when repairs are needed.
pub fn run_consistency_pass(
    conn: &Connection,
    policy: &ConsistencyPolicy,
    chunk_size: usize,
) -> Result<Vec<CollectionRepair>> {
    let records = membership::list_collection_records(conn)?;
    let orphans = membership::orphaned_members(conn)?;

    let mut plans = Vec::new();
    for record in &records {
        let pairs = membership::membership_pairs(conn, record.id)?;
        let plan = plan(&pairs, policy);
        let orphan_count = orphans.iter().filter(|(cid, _)| *cid == record.id).count();
        if !plan.is_clean() || orphan_count > 0 {
            plans.push((record, plan, orphan_count));
        }
    }

    if plans.is_empty() {
        return Ok(Vec::new());
    }

    let tx = conn.unchecked_transaction()?;
    let mut repairs = Vec::new();
    for (record, plan, orphan_count) in &plans {
        membership::remove_members(&tx, record.id, &plan.dropped(), chunk_size)?;
        if *orphan_count > 0 {
            let orphan_uids: Vec<Uid> = orphans
                .iter()
                .filter(|(cid, _)| *cid == record.id)
                .map(|(_, uid)| uid.clone())
                .collect();
            membership::remove_members(&tx, record.id, &orphan_uids, chunk_size)?;
        }

        let purged = if policy.purge_trimmed_duplicates {
            select_purgeable(&tx, &plan.trimmed)?
        } else {
            Vec::new()
        };
        purge_sounds(&tx, &purged, chunk_size)?;

        let repair = CollectionRepair {
            collection: record.name.clone(),
            trimmed: plan.trimmed.len(),
            purged: purged.len(),
            duplicates_nulled: plan.duplicates.len(),
            out_of_range: plan.out_of_range.len(),
            orphans_removed: *orphan_count,
        };
        log::warn!("Consistency repair on collection '{}': {:?}", record.name, repair);
        repairs.push(repair);
    }
    tx.commit()?;
    Ok(repairs)
}
