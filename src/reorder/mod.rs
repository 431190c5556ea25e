// Slot reorder engine
// Planners work on an in-memory slot -> uid layout of one collection and
// return the final rows for every slot they touch. `apply` writes a plan:
// it removes every affected membership and clears every target slot before
// inserting, so no slot ever has two claimants.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rusqlite::Connection;

use crate::constants::SLOT_COUNT;
use crate::db::membership;
use crate::db::schema::Uid;
use crate::error::{LibraryError, Result};

pub type Layout = BTreeMap<u16, Uid>;

/// Rows to drop and rows to write for one collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutChange {
    /// Sounds whose current membership is dropped.
    pub removed: Vec<Uid>,
    /// Final (uid, slot) rows.
    pub placed: Vec<(Uid, u16)>,
}

impl LayoutChange {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.placed.is_empty()
    }

    /// Result of applying this change to `layout`, without touching the store.
    pub fn applied_to(&self, layout: &Layout) -> Layout {
        let mut gone: HashSet<&Uid> = self.removed.iter().collect();
        gone.extend(self.placed.iter().map(|(u, _)| u));
        let mut out: Layout = layout
            .iter()
            .filter(|(_, uid)| !gone.contains(uid))
            .map(|(s, u)| (*s, u.clone()))
            .collect();
        for (uid, slot) in &self.placed {
            out.insert(*slot, uid.clone());
        }
        out
    }
}

fn reverse(layout: &Layout) -> HashMap<&Uid, u16> {
    layout.iter().map(|(slot, uid)| (uid, *slot)).collect()
}

fn check_target(slot: u16) -> Result<()> {
    if slot >= SLOT_COUNT {
        return Err(LibraryError::InvalidSlot(i64::from(slot)));
    }
    Ok(())
}

/// First slot of a block of `count` placed at `target`, never past the end.
pub fn clamp_block_start(target: u16, count: usize) -> Result<u16> {
    if count > usize::from(SLOT_COUNT) {
        return Err(LibraryError::CollectionFull(format!(
            "{} sounds do not fit in {} slots",
            count, SLOT_COUNT
        )));
    }
    Ok(target.min(SLOT_COUNT - count as u16))
}

/// Move `moving[i]` to `targets[i]`. Occupants of the targets that are not
/// themselves moving take the vacated source slots in ascending order;
/// displaced occupants left without a vacated slot leave the collection.
pub fn plan_swap(layout: &Layout, moving: &[Uid], targets: &[u16]) -> Result<LayoutChange> {
    if moving.len() != targets.len() {
        return Err(LibraryError::InvalidArgument(format!(
            "{} sounds for {} target slots",
            moving.len(),
            targets.len()
        )));
    }
    let target_set: BTreeSet<u16> = targets.iter().copied().collect();
    if target_set.len() != targets.len() {
        return Err(LibraryError::InvalidArgument("duplicate target slots".to_string()));
    }
    let moving_set: HashSet<&Uid> = moving.iter().collect();
    if moving_set.len() != moving.len() {
        return Err(LibraryError::InvalidArgument("a sound is listed twice".to_string()));
    }
    for slot in targets {
        check_target(*slot)?;
    }

    let slot_of = reverse(layout);
    let sources: BTreeSet<u16> = moving.iter().filter_map(|u| slot_of.get(u).copied()).collect();

    let displaced: Vec<Uid> = target_set
        .iter()
        .filter_map(|slot| layout.get(slot))
        .filter(|uid| !moving_set.contains(uid))
        .cloned()
        .collect();
    let vacated: Vec<u16> = sources.difference(&target_set).copied().collect();

    let mut change = LayoutChange {
        removed: moving.iter().chain(displaced.iter()).cloned().collect(),
        placed: moving.iter().cloned().zip(targets.iter().copied()).collect(),
    };
    change
        .placed
        .extend(displaced.into_iter().zip(vacated));
    Ok(change)
}

/// Move the occupants of `sources` as one block so that it lands before the
/// insertion point `target` (0..=1024). Non-moving occupants between the
/// block and the target close the gap. Returns None when nothing would move.
pub fn plan_shift(layout: &Layout, sources: &[u16], target: u16) -> Result<Option<LayoutChange>> {
    if target > SLOT_COUNT {
        return Err(LibraryError::InvalidSlot(i64::from(target)));
    }
    let sources: BTreeSet<u16> = sources.iter().copied().collect();
    let (Some(&min_src), Some(&max_src)) = (sources.first(), sources.last()) else {
        return Ok(None);
    };
    check_target(max_src)?;
    let count = sources.len();

    let before_target = sources.iter().filter(|s| **s < target).count() as u16;
    let first = clamp_block_start(target - before_target, count)?;
    let contiguous = usize::from(max_src - min_src) + 1 == count;
    if contiguous && first == min_src {
        return Ok(None);
    }

    let lo = first.min(min_src);
    let hi = max_src.max(first + count as u16 - 1);

    let old: Vec<Option<&Uid>> = (lo..=hi).map(|s| layout.get(&s)).collect();
    let mut rest: Vec<Option<&Uid>> = Vec::with_capacity(old.len());
    let mut block: Vec<Option<&Uid>> = Vec::with_capacity(count);
    for (slot, entry) in (lo..=hi).zip(old.iter()) {
        if sources.contains(&slot) {
            block.push(*entry);
        } else {
            rest.push(*entry);
        }
    }
    let split = usize::from(first - lo);
    let new: Vec<Option<&Uid>> = rest[..split]
        .iter()
        .chain(block.iter())
        .chain(rest[split..].iter())
        .copied()
        .collect();
    if new == old {
        return Ok(None);
    }

    Ok(Some(LayoutChange {
        removed: old.iter().flatten().map(|u| (*u).clone()).collect(),
        placed: (lo..=hi)
            .zip(new)
            .filter_map(|(slot, entry)| entry.map(|u| (u.clone(), slot)))
            .collect(),
    }))
}

/// Place `incoming` as a block starting at `target`. Occupants in the way are
/// pushed forward into the nearest empty slots after the block, then backward
/// into the nearest empty slots before it (moving the block start back).
/// Returns the change and the slot of the first incoming sound.
pub fn plan_insert_push(layout: &Layout, incoming: &[Uid], target: u16) -> Result<(LayoutChange, u16)> {
    check_target(target)?;
    let count = incoming.len();
    if count == 0 {
        return Ok((LayoutChange::default(), target));
    }
    let start = clamp_block_start(target, count)?;
    let free = usize::from(SLOT_COUNT) - layout.len();
    if free < count {
        return Err(LibraryError::CollectionFull(format!(
            "{} free slots for {} new sounds",
            free, count
        )));
    }

    // Nearest empties at or after `start`
    let mut needed = count;
    let mut hi = start;
    let mut slot = start;
    while slot < SLOT_COUNT && needed > 0 {
        if !layout.contains_key(&slot) {
            needed -= 1;
        }
        hi = slot;
        slot += 1;
    }

    // Whatever is still missing comes from before the block
    let mut lo = start;
    while needed > 0 {
        if lo == 0 {
            return Err(LibraryError::CollectionFull("no free slots left".to_string()));
        }
        lo -= 1;
        if !layout.contains_key(&lo) {
            needed -= 1;
        }
    }

    let before: Vec<&Uid> = (lo..start).filter_map(|s| layout.get(&s)).collect();
    let after: Vec<&Uid> = (start..=hi).filter_map(|s| layout.get(&s)).collect();
    let block_start = lo + before.len() as u16;

    let mut change = LayoutChange {
        removed: before.iter().chain(after.iter()).map(|u| (*u).clone()).collect(),
        placed: Vec::with_capacity(before.len() + count + after.len()),
    };
    let ordered = before.into_iter().chain(incoming.iter()).chain(after);
    for (offset, uid) in ordered.enumerate() {
        change.placed.push((uid.clone(), lo + offset as u16));
    }
    Ok((change, block_start))
}

/// Write a plan for one collection.
pub fn apply(conn: &Connection, collection_id: i64, change: &LayoutChange, chunk_size: usize) -> Result<()> {
    let mut touched: Vec<Uid> = change.removed.clone();
    let mut seen: HashSet<Uid> = touched.iter().cloned().collect();
    for (uid, _) in &change.placed {
        if seen.insert(uid.clone()) {
            touched.push(uid.clone());
        }
    }
    membership::remove_members(conn, collection_id, &touched, chunk_size)?;

    for (_, slot) in &change.placed {
        membership::clear_slot(conn, collection_id, *slot)?;
    }
    for (uid, slot) in &change.placed {
        membership::insert_member(conn, collection_id, uid, *slot)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(entries: &[(u16, &str)]) -> Layout {
        entries.iter().map(|(s, u)| (*s, Uid::from(*u))).collect()
    }

    fn uids(raw: &[&str]) -> Vec<Uid> {
        raw.iter().map(|u| Uid::from(*u)).collect()
    }

    #[test]
    fn test_swap_moves_displaced_into_vacated() {
        let lead = layout(&[(0, "A"), (1, "B"), (2, "C")]);
        let change = plan_swap(&lead, &uids(&["B", "C"]), &[0, 1]).unwrap();
        assert_eq!(change.applied_to(&lead), layout(&[(0, "B"), (1, "C"), (2, "A")]));
    }

    #[test]
    fn test_swap_pairwise() {
        let lead = layout(&[(3, "A"), (9, "B")]);
        let change = plan_swap(&lead, &uids(&["A"]), &[9]).unwrap();
        assert_eq!(change.applied_to(&lead), layout(&[(3, "B"), (9, "A")]));
    }

    #[test]
    fn test_swap_rejects_bad_requests() {
        let lead = layout(&[(0, "A"), (1, "B")]);
        assert!(plan_swap(&lead, &uids(&["A", "B"]), &[5]).is_err());
        assert!(plan_swap(&lead, &uids(&["A", "B"]), &[5, 5]).is_err());
        assert!(plan_swap(&lead, &uids(&["A"]), &[1024]).is_err());
    }

    #[test]
    fn test_swap_outsider_displaces_without_vacancy() {
        let lead = layout(&[(0, "A")]);
        let change = plan_swap(&lead, &uids(&["X"]), &[0]).unwrap();
        assert_eq!(change.applied_to(&lead), layout(&[(0, "X")]));
    }

    #[test]
    fn test_shift_moves_block_backward() {
        let lead = layout(&[(2, "a"), (3, "b"), (4, "c"), (5, "X")]);
        let change = plan_shift(&lead, &[5], 2).unwrap().unwrap();
        assert_eq!(change.applied_to(&lead), layout(&[(2, "X"), (3, "a"), (4, "b"), (5, "c")]));
    }

    #[test]
    fn test_shift_moves_block_forward() {
        let lead = layout(&[(2, "X"), (3, "Y"), (4, "a"), (6, "b")]);
        let change = plan_shift(&lead, &[2, 3], 7).unwrap().unwrap();
        assert_eq!(change.applied_to(&lead), layout(&[(2, "a"), (4, "b"), (5, "X"), (6, "Y")]));
    }

    #[test]
    fn test_shift_adjacent_target_is_noop() {
        let lead = layout(&[(4, "a"), (5, "X"), (6, "Y"), (7, "b")]);
        assert!(plan_shift(&lead, &[5, 6], 5).unwrap().is_none());
        assert!(plan_shift(&lead, &[5, 6], 6).unwrap().is_none());
        assert!(plan_shift(&lead, &[5, 6], 7).unwrap().is_none());
        assert!(plan_shift(&lead, &[5, 6], 8).unwrap().is_some());
    }

    #[test]
    fn test_shift_gathers_scattered_sources() {
        let lead = layout(&[(0, "A"), (1, "b"), (2, "B"), (3, "c")]);
        let change = plan_shift(&lead, &[0, 2], 4).unwrap().unwrap();
        assert_eq!(change.applied_to(&lead), layout(&[(0, "b"), (1, "c"), (2, "A"), (3, "B")]));
    }

    #[test]
    fn test_shift_clamps_at_end() {
        let lead = layout(&[(0, "A"), (1, "B"), (1023, "z")]);
        let change = plan_shift(&lead, &[0, 1], 1024).unwrap().unwrap();
        let moved = change.applied_to(&lead);
        assert_eq!(moved.get(&1022), Some(&Uid::from("A")));
        assert_eq!(moved.get(&1023), Some(&Uid::from("B")));
        assert_eq!(moved.len(), 3);
        assert!(plan_shift(&lead, &[0], 1025).is_err());
    }

    #[test]
    fn test_insert_push_forward() {
        let lead = layout(&[(0, "a"), (1, "b"), (3, "c")]);
        let (change, start) = plan_insert_push(&lead, &uids(&["N1", "N2"]), 1).unwrap();
        assert_eq!(start, 1);
        assert_eq!(
            change.applied_to(&lead),
            layout(&[(0, "a"), (1, "N1"), (2, "N2"), (3, "b"), (4, "c")])
        );
    }

    #[test]
    fn test_insert_push_backward_at_end() {
        let lead = layout(&[(1020, "w"), (1022, "y"), (1023, "z")]);
        let (change, start) = plan_insert_push(&lead, &uids(&["N"]), 1023).unwrap();
        let result = change.applied_to(&lead);
        assert_eq!(start, 1022);
        assert_eq!(result.get(&1020), Some(&Uid::from("w")));
        assert_eq!(result.get(&1021), Some(&Uid::from("y")));
        assert_eq!(result.get(&1022), Some(&Uid::from("N")));
        assert_eq!(result.get(&1023), Some(&Uid::from("z")));
    }

    #[test]
    fn test_insert_push_full_collection() {
        let full: Layout = (0..SLOT_COUNT).map(|s| (s, Uid::from(format!("u{}", s)))).collect();
        assert!(matches!(
            plan_insert_push(&full, &uids(&["N"]), 0),
            Err(LibraryError::CollectionFull(_))
        ));
    }

    #[test]
    fn test_plans_keep_slots_unique() {
        let lead: Layout = (0..40).filter(|s| s % 3 != 0).map(|s| (s, Uid::from(format!("u{}", s)))).collect();
        let (change, _) = plan_insert_push(&lead, &uids(&["N1", "N2", "N3"]), 5).unwrap();
        let result = change.applied_to(&lead);
        assert_eq!(result.len(), lead.len() + 3);
        let distinct: HashSet<&Uid> = result.values().collect();
        assert_eq!(distinct.len(), result.len());
    }
}
