//! Mutation guard: containment, size, kind and uniqueness checks that run
//! before any bucket row is written.
//!
//! Every function here is pure over a [`BucketTable`]; callers run them
//! inside the repository transaction that performs the write so the check
//! and the insert see the same state.

use crate::arena::BucketArena;
use crate::constants::CHILD_MAX_SIZE;
use crate::errors::{Error, Result};
use crate::helpers::range_from_bounds;
use crate::public_api::{BucketRecord, BucketUpdate};
use crate::table::{range_of, tier0_networks, BucketTable};
use crate::types::{AddressBucket, BucketId, BucketKind, BucketRange};
use log::{debug, warn};
use std::net::Ipv4Addr;

/// Where a new bucket hangs in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub parent_id: BucketId,
    pub privilege_id: BucketId,
}

pub fn ensure_within(range: &BucketRange, container: &AddressBucket, label: &str) -> Result<()> {
    if !range.within(container.start_int, container.end_int) {
        return Err(Error::Containment(format!(
            "{label} {}-{} (got {range})",
            container.start_ip, container.end_ip
        )));
    }
    Ok(())
}

pub fn ensure_unique(table: &BucketTable, kind: BucketKind, range: &BucketRange) -> Result<()> {
    if table.has_range(kind, range) {
        return Err(Error::Conflict(format!(
            "a {kind} bucket with range {range} already exists"
        )));
    }
    Ok(())
}

pub fn ensure_child_size(range: &BucketRange) -> Result<()> {
    if range.size() > CHILD_MAX_SIZE {
        return Err(Error::validation(format!(
            "child bucket range must be <= {CHILD_MAX_SIZE} addresses (got {})",
            range.size()
        )));
    }
    Ok(())
}

/// Resolve the owner of a new Parent bucket.
///
/// With `parent_id` the owner must be a Tier0 or Parent bucket. Without it the
/// Tier0 block holding `range.start` is used and the new bucket hangs directly
/// beneath it.
pub fn place_parent(
    table: &BucketTable,
    range: &BucketRange,
    parent_id: Option<BucketId>,
) -> Result<Placement> {
    let owner = match parent_id {
        Some(pid) => {
            let owner = table.require(pid)?;
            if !owner.kind.may_contain(BucketKind::Parent) {
                return Err(Error::NotFound(format!(
                    "bucket {pid} is not a tier0 or parent bucket"
                )));
            }
            ensure_within(range, owner, "parent bucket range")?;
            owner
        }
        None => {
            let owner = table.tier0_containing(range.start).ok_or_else(|| {
                Error::Containment(format!("a tier0 /8 block (got {range})"))
            })?;
            ensure_within(range, owner, "the /8 range")?;
            owner
        }
    };
    ensure_unique(table, BucketKind::Parent, range)?;
    debug!(
        "[GUARD] parent {range} placed under {} (privilege {})",
        owner.id, owner.privilege_id
    );
    Ok(Placement {
        parent_id: owner.id,
        privilege_id: owner.privilege_id,
    })
}

pub fn place_child(table: &BucketTable, range: &BucketRange, parent_id: BucketId) -> Result<Placement> {
    let owner = table.require(parent_id)?;
    if owner.kind != BucketKind::Parent {
        return Err(Error::NotFound(format!(
            "bucket {parent_id} is not a parent bucket"
        )));
    }
    ensure_child_size(range)?;
    ensure_within(range, owner, "parent bucket range")?;
    ensure_unique(table, BucketKind::Child, range)?;
    Ok(Placement {
        parent_id: owner.id,
        privilege_id: owner.privilege_id,
    })
}

/// Validate a partial update and return the resulting row.
pub fn apply_update(table: &BucketTable, id: BucketId, update: &BucketUpdate) -> Result<AddressBucket> {
    let current = table.require(id)?;
    let mut next = current.clone();
    let mut touched = false;

    if let Some(d) = &update.description {
        next.description = Some(d.clone());
        touched = true;
    }
    if let Some(m) = &update.memo {
        next.memo = Some(m.clone());
        touched = true;
    }
    if let Some(c) = &update.color {
        next.color = Some(c.clone());
        touched = true;
    }
    if let Some(reserved) = update.is_reserved {
        if current.kind != BucketKind::Child {
            return Err(Error::validation(
                "only child buckets can toggle the reserved flag",
            ));
        }
        next.is_reserved = reserved;
        touched = true;
    }
    if let Some(pid) = update.parent_id {
        if current.kind != BucketKind::Parent {
            return Err(Error::validation("only parent buckets can change parent"));
        }
        let new_parent = table.require(pid)?;
        if !new_parent.kind.may_contain(BucketKind::Parent) {
            return Err(Error::validation("new parent must be a tier0 or parent bucket"));
        }
        let arena = BucketArena::new(table.ordered());
        if arena.is_self_or_descendant(id, pid) {
            return Err(Error::validation(format!(
                "bucket {pid} is {id} or one of its descendants"
            )));
        }
        ensure_within(&current.range(), new_parent, "new parent range")?;
        next.parent_id = Some(pid);
        next.privilege_id = new_parent.privilege_id;
        touched = true;
    }
    if !touched {
        return Err(Error::validation("no updatable fields supplied"));
    }
    Ok(next)
}

/// Ids removed by deleting `id`: the bucket itself, then its descendants.
pub fn plan_delete(table: &BucketTable, id: BucketId) -> Result<Vec<BucketId>> {
    let target = table.require(id)?;
    if target.kind == BucketKind::Tier0 {
        return Err(Error::validation("tier0 buckets cannot be deleted"));
    }
    let arena = BucketArena::new(table.ordered());
    let mut ids = vec![id];
    ids.extend(arena.descendants(id));
    Ok(ids)
}

/// Rebuild a whole table from backup records.
///
/// Rows are applied in `(kind weight, id)` order with ranges recomputed from
/// their address strings. Parent references, containment and privilege ids
/// are checked once the whole batch is in, so a Parent that was re-parented
/// under a younger Parent still round-trips.
pub fn rebuild(records: &[BucketRecord]) -> Result<BucketTable> {
    let mut ordered: Vec<&BucketRecord> = records.iter().collect();
    ordered.sort_by_key(|r| (r.kind.weight(), r.id));

    let mut table = BucketTable::new();
    for r in &ordered {
        let mut range = range_from_bounds(&r.start_ip, &r.end_ip)
            .map_err(|e| e.context(format_args!("bucket {}", r.id)))?;
        range.cidr = r.cidr.clone();
        if r.kind == BucketKind::Tier0 && r.parent_id.is_some() {
            return Err(Error::validation(format!(
                "bucket {}: tier0 buckets have no parent",
                r.id
            )));
        }
        if r.kind == BucketKind::Child {
            ensure_child_size(&range).map_err(|e| e.context(format_args!("bucket {}", r.id)))?;
        }
        let is_reserved = r.is_reserved.unwrap_or(false);
        if is_reserved && r.kind != BucketKind::Child {
            warn!("[IMPORT] dropping reserved flag on {} bucket {}", r.kind, r.id);
        }
        table.restore(AddressBucket {
            id: r.id,
            kind: r.kind,
            privilege_id: r.privilege_id.unwrap_or(r.id),
            parent_id: r.parent_id,
            start_ip: Ipv4Addr::from(range.start),
            end_ip: Ipv4Addr::from(range.end),
            start_int: range.start,
            end_int: range.end,
            size: range.size(),
            description: r.description.clone(),
            memo: r.memo.clone(),
            color: r.color.clone(),
            cidr: range.cidr,
            is_reserved: is_reserved && r.kind == BucketKind::Child,
        })?;
    }

    for net in tier0_networks() {
        if !table.has_range(BucketKind::Tier0, &range_of(&net)) {
            return Err(Error::validation(format!("backup is missing tier0 block {net}")));
        }
    }
    let tier0_count = table.iter().filter(|b| b.kind == BucketKind::Tier0).count();
    if tier0_count != tier0_networks().count() {
        return Err(Error::validation(
            "backup holds tier0 buckets outside the fixed /8 blocks",
        ));
    }

    let arena = BucketArena::new(table.ordered());
    let mut fixed = Vec::new();
    for r in &ordered {
        let Some(bucket) = table.get(r.id) else { continue };
        if bucket.kind == BucketKind::Tier0 {
            if bucket.privilege_id != bucket.id {
                fixed.push(AddressBucket { privilege_id: bucket.id, ..bucket.clone() });
            }
            continue;
        }
        let pid = bucket.parent_id.ok_or_else(|| {
            Error::validation(format!("bucket {}: {} buckets need a parent_id", r.id, bucket.kind))
        })?;
        let owner = table.get(pid).ok_or_else(|| {
            Error::NotFound(format!("bucket {}: parent {pid}", r.id))
        })?;
        if !owner.kind.may_contain(bucket.kind) {
            return Err(Error::NotFound(format!(
                "bucket {}: parent {pid} is a {} bucket",
                r.id, owner.kind
            )));
        }
        ensure_within(&bucket.range(), owner, &format!("bucket {pid}"))?;
        let privilege = arena.privilege_of(bucket.id).ok_or_else(|| {
            Error::validation(format!("bucket {}: parent chain does not reach a tier0 bucket", r.id))
        })?;
        if r.privilege_id.is_some_and(|p| p != privilege) {
            warn!(
                "[IMPORT] bucket {} privilege_id {:?} rewritten to {}",
                r.id, r.privilege_id, privilege
            );
        }
        if bucket.privilege_id != privilege {
            fixed.push(AddressBucket { privilege_id: privilege, ..bucket.clone() });
        }
    }
    for bucket in fixed {
        table.replace(bucket)?;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use crate::helpers::range_from_cidr;

    #[test]
    fn parent_auto_attaches_to_tier0() {
        let table = BucketTable::seeded();
        let range = range_from_cidr("232.1.0.0/16").unwrap();
        let p = place_parent(&table, &range, None).unwrap();
        assert_eq!(p, Placement { parent_id: 9, privilege_id: 9 });
    }

    #[test]
    fn parent_outside_multicast_has_no_tier0() {
        let table = BucketTable::seeded();
        let range = range_from_cidr("10.0.0.0/16").unwrap();
        let err = place_parent(&table, &range, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Containment);
    }

    #[test]
    fn parent_spanning_two_blocks_rejected() {
        let table = BucketTable::seeded();
        let range = range_from_bounds("232.255.255.0", "233.0.0.10").unwrap();
        let err = place_parent(&table, &range, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Containment);
    }

    #[test]
    fn child_size_cap() {
        let ok = range_from_cidr("232.1.0.0/20").unwrap();
        assert!(ensure_child_size(&ok).is_ok());
        let big = range_from_bounds("232.1.0.0", "232.1.16.0").unwrap();
        assert_eq!(ensure_child_size(&big).unwrap_err().code(), ErrorCode::Validation);
    }

    #[test]
    fn empty_update_rejected() {
        let table = BucketTable::seeded();
        let err = apply_update(&table, 1, &BucketUpdate::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
        let err = apply_update(&table, 999, &BucketUpdate::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn tier0_never_deleted() {
        let table = BucketTable::seeded();
        for id in 1..=16 {
            assert_eq!(plan_delete(&table, id).unwrap_err().code(), ErrorCode::Validation);
        }
    }

    #[test]
    fn rebuild_requires_all_tier0() {
        let records: Vec<BucketRecord> = BucketTable::seeded()
            .export_order()
            .iter()
            .skip(1)
            .map(BucketRecord::from)
            .collect();
        let err = rebuild(&records).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
    }
}
