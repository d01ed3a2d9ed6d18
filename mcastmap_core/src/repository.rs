//! Storage seams: the bucket repository and the flow directory.
//!
//! Reads take an `Arc` snapshot and never wait on writers. Writes run one at
//! a time: the writer clones the current table, applies its closure and
//! publishes the result only if the closure returned `Ok`, so a failed
//! mutation leaves nothing behind.

use crate::errors::{Error, Result};
use crate::table::BucketTable;
use crate::usage::FlowAddresses;
use log::warn;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub trait BucketRepository: Send + Sync {
    /// Consistent view of every bucket row.
    fn snapshot(&self) -> Result<Arc<BucketTable>>;

    /// Run `f` against a private copy of the table and commit it on `Ok`.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut BucketTable) -> Result<T>;
}

/// Copy-on-write in-memory bucket store.
#[derive(Debug)]
pub struct MemoryRepository {
    current: RwLock<Arc<BucketTable>>,
    writer: Mutex<()>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::seeded()
    }
}

impl MemoryRepository {
    pub fn new(table: BucketTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
            writer: Mutex::new(()),
        }
    }

    /// Store holding the sixteen Tier0 blocks.
    pub fn seeded() -> Self {
        Self::new(BucketTable::seeded())
    }

    pub fn empty() -> Self {
        Self::new(BucketTable::new())
    }

    fn load(&self) -> Arc<BucketTable> {
        let guard = self.current.read().unwrap_or_else(|p| {
            warn!("[REPO] recovering poisoned snapshot lock");
            p.into_inner()
        });
        Arc::clone(&guard)
    }
}

impl BucketRepository for MemoryRepository {
    fn snapshot(&self) -> Result<Arc<BucketTable>> {
        Ok(self.load())
    }

    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut BucketTable) -> Result<T>,
    {
        // The writer lock guards no data, so a poisoned one is still usable.
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut draft = (*self.load()).clone();
        let out = f(&mut draft)?;
        let mut slot = self
            .current
            .write()
            .map_err(|_| Error::Storage("bucket snapshot lock poisoned".into()))?;
        *slot = Arc::new(draft);
        Ok(out)
    }
}

/// Source of the flow directory snapshot.
pub trait UsageSource: Send + Sync {
    fn flow_addresses(&self) -> Result<Vec<FlowAddresses>>;
}

/// Fixed in-memory flow list; hosts swap it wholesale.
#[derive(Debug, Default)]
pub struct StaticUsage {
    flows: RwLock<Vec<FlowAddresses>>,
}

impl StaticUsage {
    pub fn new(flows: Vec<FlowAddresses>) -> Self {
        Self {
            flows: RwLock::new(flows),
        }
    }

    pub fn replace(&self, flows: Vec<FlowAddresses>) {
        *self.flows.write().unwrap_or_else(PoisonError::into_inner) = flows;
    }

    pub fn push(&self, flow: FlowAddresses) {
        self.flows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(flow);
    }
}

impl UsageSource for StaticUsage {
    fn flow_addresses(&self) -> Result<Vec<FlowAddresses>> {
        let flows = self
            .flows
            .read()
            .map_err(|_| Error::Storage("flow directory lock poisoned".into()))?;
        Ok(flows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::NewBucket;
    use crate::types::{BucketKind, BucketRange};

    fn parent() -> NewBucket {
        NewBucket {
            kind: BucketKind::Parent,
            privilege_id: Some(9),
            parent_id: Some(9),
            range: BucketRange::new(0xE801_0000, 0xE801_FFFF),
            description: None,
            memo: None,
            color: None,
            is_reserved: false,
        }
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let repo = MemoryRepository::seeded();
        let before = repo.snapshot().unwrap();
        let err = repo
            .transaction(|t| {
                t.insert(parent())?;
                Err::<(), _>(Error::validation("abort"))
            })
            .unwrap_err();
        assert_eq!(err, Error::validation("abort"));
        let after = repo.snapshot().unwrap();
        assert_eq!(after.len(), 16);
        assert_eq!(after.next_id(), before.next_id());
    }

    #[test]
    fn old_snapshot_is_stable() {
        let repo = MemoryRepository::seeded();
        let old = repo.snapshot().unwrap();
        repo.transaction(|t| t.insert(parent())).unwrap();
        assert_eq!(old.len(), 16);
        assert_eq!(repo.snapshot().unwrap().len(), 17);
    }
}
