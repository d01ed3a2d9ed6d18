//! Id-keyed bucket rows with the `(kind, start, end)` uniqueness index.

use crate::constants::{
    MULTICAST_END, MULTICAST_FIRST_OCTET, MULTICAST_START, TIER0_COUNT, TIER0_PREFIX,
};
use crate::errors::{Error, Result};
use crate::helpers::v4_int;
use crate::types::{AddressBucket, BucketId, BucketKind, BucketRange};
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

/// A bucket that has passed the guard and is waiting for an id.
#[derive(Debug, Clone)]
pub struct NewBucket {
    pub kind: BucketKind,
    /// `None` only for Tier0, which owns itself.
    pub privilege_id: Option<BucketId>,
    pub parent_id: Option<BucketId>,
    pub range: BucketRange,
    pub description: Option<String>,
    pub memo: Option<String>,
    pub color: Option<String>,
    pub is_reserved: bool,
}

/// The sixteen fixed /8 blocks, 224.0.0.0/8 … 239.0.0.0/8.
pub fn tier0_networks() -> impl Iterator<Item = Ipv4Net> {
    (0..TIER0_COUNT).map(|i| {
        let first = Ipv4Addr::new(MULTICAST_FIRST_OCTET + i, 0, 0, 0);
        Ipv4Net::new_assert(first, TIER0_PREFIX)
    })
}

pub(crate) fn range_of(net: &Ipv4Net) -> BucketRange {
    BucketRange {
        start: v4_int(net.network()),
        end: v4_int(net.broadcast()),
        cidr: Some(net.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct BucketTable {
    rows: BTreeMap<BucketId, AddressBucket>,
    ranges: HashSet<(BucketKind, u32, u32)>,
    next_id: BucketId,
}

impl Default for BucketTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketTable {
    pub fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            ranges: HashSet::new(),
            next_id: 1,
        }
    }

    /// A table holding only the Tier0 blocks, ids 1..=16.
    pub fn seeded() -> Self {
        let mut table = Self::new();
        for net in tier0_networks() {
            let cidr = net.to_string();
            let seeded = table.insert(NewBucket {
                kind: BucketKind::Tier0,
                privilege_id: None,
                parent_id: None,
                range: range_of(&net),
                description: Some(cidr),
                memo: None,
                color: None,
                is_reserved: false,
            });
            debug_assert!(seeded.is_ok());
        }
        table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn next_id(&self) -> BucketId {
        self.next_id
    }

    pub fn get(&self, id: BucketId) -> Option<&AddressBucket> {
        self.rows.get(&id)
    }

    pub fn require(&self, id: BucketId) -> Result<&AddressBucket> {
        self.rows.get(&id).ok_or_else(|| Error::bucket_not_found(id))
    }

    /// Rows in id order.
    pub fn iter(&self) -> impl Iterator<Item = &AddressBucket> {
        self.rows.values()
    }

    pub fn tier0_containing(&self, addr: u32) -> Option<&AddressBucket> {
        if !(MULTICAST_START..=MULTICAST_END).contains(&addr) {
            return None;
        }
        self.rows
            .values()
            .find(|b| b.kind == BucketKind::Tier0 && b.contains_addr(addr))
    }

    pub fn has_range(&self, kind: BucketKind, range: &BucketRange) -> bool {
        self.ranges.contains(&(kind, range.start, range.end))
    }

    fn claim_range(&mut self, kind: BucketKind, range: &BucketRange) -> Result<()> {
        if !self.ranges.insert((kind, range.start, range.end)) {
            return Err(Error::Conflict(format!(
                "a {kind} bucket with range {range} already exists"
            )));
        }
        Ok(())
    }

    /// Assign the next id and store the row.
    pub fn insert(&mut self, new: NewBucket) -> Result<AddressBucket> {
        self.claim_range(new.kind, &new.range)?;
        let id = self.next_id;
        self.next_id += 1;
        let bucket = AddressBucket {
            id,
            kind: new.kind,
            privilege_id: new.privilege_id.unwrap_or(id),
            parent_id: new.parent_id,
            start_ip: Ipv4Addr::from(new.range.start),
            end_ip: Ipv4Addr::from(new.range.end),
            start_int: new.range.start,
            end_int: new.range.end,
            size: new.range.size(),
            description: new.description,
            memo: new.memo,
            color: new.color,
            cidr: new.range.cidr,
            is_reserved: new.is_reserved,
        };
        self.rows.insert(id, bucket.clone());
        Ok(bucket)
    }

    /// Store a row under its own id; the sequence continues past it.
    pub fn restore(&mut self, bucket: AddressBucket) -> Result<()> {
        if self.rows.contains_key(&bucket.id) {
            return Err(Error::Conflict(format!("duplicate bucket id {}", bucket.id)));
        }
        let after = bucket
            .id
            .checked_add(1)
            .ok_or_else(|| Error::validation(format!("bucket id {} out of range", bucket.id)))?;
        self.claim_range(bucket.kind, &bucket.range())?;
        self.next_id = self.next_id.max(after);
        self.rows.insert(bucket.id, bucket);
        Ok(())
    }

    /// Replace a row's mutable fields. The range is not re-indexed.
    pub fn replace(&mut self, bucket: AddressBucket) -> Result<()> {
        match self.rows.get_mut(&bucket.id) {
            Some(row) => {
                debug_assert_eq!((row.start_int, row.end_int), (bucket.start_int, bucket.end_int));
                *row = bucket;
                Ok(())
            }
            None => Err(Error::bucket_not_found(bucket.id)),
        }
    }

    pub fn remove(&mut self, id: BucketId) -> Option<AddressBucket> {
        let removed = self.rows.remove(&id)?;
        self.ranges
            .remove(&(removed.kind, removed.start_int, removed.end_int));
        Some(removed)
    }

    /// Snapshot order: start address, then kind weight, then id.
    pub fn ordered(&self) -> Vec<AddressBucket> {
        let mut out: Vec<_> = self.rows.values().cloned().collect();
        out.sort_by_key(|b| (b.start_int, b.kind.weight(), b.id));
        out
    }

    /// Backup order: Tier0, Parent, Child, each by start address.
    pub fn export_order(&self) -> Vec<AddressBucket> {
        let mut out: Vec<_> = self.rows.values().cloned().collect();
        out.sort_by_key(|b| (b.kind.weight(), b.start_int, b.id));
        out
    }
}
