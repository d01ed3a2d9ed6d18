//! Per-request arena over a bucket snapshot.
//!
//! Buckets live in one vector; relations are index maps rebuilt from the
//! `parent_id` back-references, so lookups are O(1) without any pointer
//! cycles between owners and children.

use crate::types::{AddressBucket, BucketId, BucketKind};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct BucketArena {
    buckets: Vec<AddressBucket>,
    by_id: HashMap<BucketId, usize>,
    children: HashMap<BucketId, Vec<usize>>,
    tier0: Vec<usize>,
}

impl BucketArena {
    /// Build from a snapshot. Input order is preserved for [`buckets`](Self::buckets);
    /// child lists are ordered by kind weight then start address.
    pub fn new(buckets: Vec<AddressBucket>) -> Self {
        let mut by_id = HashMap::with_capacity(buckets.len());
        let mut children: HashMap<BucketId, Vec<usize>> = HashMap::new();
        let mut tier0 = Vec::new();
        for (idx, b) in buckets.iter().enumerate() {
            by_id.insert(b.id, idx);
            match b.parent_id {
                Some(parent) => children.entry(parent).or_default().push(idx),
                None if b.kind == BucketKind::Tier0 => tier0.push(idx),
                None => {}
            }
        }
        let key = |i: &usize| {
            let b = &buckets[*i];
            (b.kind.weight(), b.start_int, b.id)
        };
        for list in children.values_mut() {
            list.sort_by_key(key);
        }
        tier0.sort_by_key(|i| buckets[*i].start_int);
        Self {
            buckets,
            by_id,
            children,
            tier0,
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn buckets(&self) -> &[AddressBucket] {
        &self.buckets
    }

    pub fn into_buckets(self) -> Vec<AddressBucket> {
        self.buckets
    }

    pub fn get(&self, id: BucketId) -> Option<&AddressBucket> {
        self.by_id.get(&id).map(|&i| &self.buckets[i])
    }

    pub fn children_of(&self, id: BucketId) -> impl Iterator<Item = &AddressBucket> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.buckets[i])
    }

    pub fn tier0(&self) -> impl Iterator<Item = &AddressBucket> {
        self.tier0.iter().map(move |&i| &self.buckets[i])
    }

    /// All transitive descendants, breadth first. `id` itself is excluded.
    pub fn descendants(&self, id: BucketId) -> Vec<BucketId> {
        let mut out = Vec::new();
        let mut cursor = 0;
        out.extend(self.children_of(id).map(|b| b.id));
        while cursor < out.len() {
            let next = out[cursor];
            cursor += 1;
            out.extend(self.children_of(next).map(|b| b.id));
        }
        out
    }

    /// Whether `candidate` is `id` or lies below it.
    pub fn is_self_or_descendant(&self, id: BucketId, candidate: BucketId) -> bool {
        let mut cur = Some(candidate);
        let mut hops = 0;
        while let Some(c) = cur {
            if c == id {
                return true;
            }
            hops += 1;
            if hops > self.buckets.len() {
                // broken chain; treat as unrelated
                return false;
            }
            cur = self.get(c).and_then(|b| b.parent_id);
        }
        false
    }

    /// Walk `parent_id` links up to the owning Tier0 bucket.
    pub fn privilege_of(&self, id: BucketId) -> Option<BucketId> {
        let mut cur = self.get(id)?;
        for _ in 0..=self.buckets.len() {
            if cur.kind == BucketKind::Tier0 {
                return Some(cur.id);
            }
            cur = self.get(cur.parent_id?)?;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::BucketTable;
    use crate::table::NewBucket;
    use crate::types::BucketRange;

    fn add(t: &mut BucketTable, kind: BucketKind, parent: BucketId, s: u32, e: u32) -> BucketId {
        t.insert(NewBucket {
            kind,
            privilege_id: Some(9),
            parent_id: Some(parent),
            range: BucketRange::new(s, e),
            description: None,
            memo: None,
            color: None,
            is_reserved: false,
        })
        .unwrap()
        .id
    }

    #[test]
    fn relations() {
        let mut t = BucketTable::seeded();
        let base = 0xE800_0000; // 232.0.0.0
        let p = add(&mut t, BucketKind::Parent, 9, base, base + 0xFFFF);
        let inner = add(&mut t, BucketKind::Parent, p, base, base + 0xFF);
        let c2 = add(&mut t, BucketKind::Child, p, base + 0x200, base + 0x2FF);
        let c1 = add(&mut t, BucketKind::Child, inner, base + 0x10, base + 0x1F);

        let arena = BucketArena::new(t.ordered());
        assert_eq!(arena.tier0().count(), 16);
        assert_eq!(arena.tier0().next().unwrap().id, 1);
        let kids: Vec<_> = arena.children_of(p).map(|b| b.id).collect();
        assert_eq!(kids, vec![inner, c2]);
        assert_eq!(arena.descendants(p), vec![inner, c2, c1]);
        assert_eq!(arena.privilege_of(c1), Some(9));
        assert_eq!(arena.get(c1).unwrap().parent_id, Some(inner));
        assert!(arena.is_self_or_descendant(p, c1));
        assert!(arena.is_self_or_descendant(p, p));
        assert!(!arena.is_self_or_descendant(inner, c2));
    }
}
