//! Registry of bucket ids currently held by a mutation.
//!
//! A second mutation touching a held id fails fast with [`Error::Busy`]
//! instead of queueing behind the first and overwriting its result.

use crate::errors::{Error, Result};
use crate::types::BucketId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;

#[derive(Debug, Default)]
pub struct InflightRegistry {
    claims: DashMap<BucketId, &'static str>,
}

/// Held ids; released on drop.
#[derive(Debug)]
#[must_use = "the claim is released as soon as it is dropped"]
pub struct InflightClaim<'a> {
    registry: &'a InflightRegistry,
    ids: Vec<BucketId>,
}

impl InflightClaim<'_> {
    pub fn ids(&self) -> &[BucketId] {
        &self.ids
    }
}

impl Drop for InflightClaim<'_> {
    fn drop(&mut self) {
        for id in &self.ids {
            self.registry.claims.remove(id);
        }
    }
}

impl InflightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every id in `ids` for `op`, or none of them.
    pub fn claim(&self, op: &'static str, ids: &[BucketId]) -> Result<InflightClaim<'_>> {
        let mut wanted = ids.to_vec();
        wanted.sort_unstable();
        wanted.dedup();

        let mut held = Vec::with_capacity(wanted.len());
        for id in wanted {
            // Entry guard must be gone before touching other shards below.
            let holder = match self.claims.entry(id) {
                Entry::Occupied(e) => Some(*e.get()),
                Entry::Vacant(v) => {
                    v.insert(op);
                    None
                }
            };
            if let Some(holder) = holder {
                debug!("[INFLIGHT] {op} on bucket {id} refused, held by {holder}");
                for h in &held {
                    self.claims.remove(h);
                }
                return Err(Error::Busy { id });
            }
            held.push(id);
        }
        Ok(InflightClaim {
            registry: self,
            ids: held,
        })
    }

    pub fn is_claimed(&self, id: BucketId) -> bool {
        self.claims.contains_key(&id)
    }

    /// Operation currently holding `id`.
    pub fn holder(&self, id: BucketId) -> Option<&'static str> {
        self.claims.get(&id).map(|r| *r.value())
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_and_release() {
        let reg = InflightRegistry::new();
        {
            let claim = reg.claim("update", &[5, 3, 5]).unwrap();
            assert_eq!(claim.ids(), &[3, 5]);
            assert_eq!(reg.holder(5), Some("update"));
            assert_eq!(reg.claim("delete", &[5]).unwrap_err(), Error::Busy { id: 5 });
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn partial_claim_rolls_back() {
        let reg = InflightRegistry::new();
        let _held = reg.claim("update", &[7]).unwrap();
        let err = reg.claim("delete", &[2, 7, 9]).unwrap_err();
        assert_eq!(err, Error::Busy { id: 7 });
        assert!(!reg.is_claimed(2));
        assert!(!reg.is_claimed(9));
        assert_eq!(reg.len(), 1);
    }
}
