//! Request payloads and response shapes exchanged with collaborators.
//!
//! Everything here is plain serde data. The ledger consumes the payloads and
//! produces the responses; no validation happens at this layer beyond what
//! serde itself enforces.

use crate::errors::{Error, Result};
use crate::helpers::resolve_range;
use crate::overlap::BucketOverlap;
use crate::types::{
    AddressBucket, BucketId, BucketKind, BucketRange, Offset, Segment, SegmentState, UsageEntry,
};
use crate::window::Window;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

// ───────────────────────── mutation payloads ─────────────────────────── //

/// Create a Parent bucket. Either `cidr` or both `start_ip`/`end_ip`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentBucketPayload {
    pub cidr: Option<String>,
    pub start_ip: Option<String>,
    pub end_ip: Option<String>,
    /// Owner; omitted means the Tier0 block holding `start_ip`.
    pub parent_id: Option<BucketId>,
    pub description: Option<String>,
    pub memo: Option<String>,
    pub color: Option<String>,
}

impl ParentBucketPayload {
    pub fn cidr(cidr: &str) -> Self {
        Self {
            cidr: Some(cidr.to_string()),
            ..Self::default()
        }
    }

    pub fn bounds(start_ip: &str, end_ip: &str) -> Self {
        Self {
            start_ip: Some(start_ip.to_string()),
            end_ip: Some(end_ip.to_string()),
            ..Self::default()
        }
    }

    pub fn under(mut self, parent_id: BucketId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn range(&self) -> Result<BucketRange> {
        resolve_range(
            self.cidr.as_deref(),
            self.start_ip.as_deref(),
            self.end_ip.as_deref(),
        )
    }
}

/// Create a Child bucket beneath a Parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildBucketPayload {
    pub parent_id: BucketId,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub start_ip: Option<String>,
    #[serde(default)]
    pub end_ip: Option<String>,
    #[serde(default)]
    pub is_reserved: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl ChildBucketPayload {
    pub fn cidr(parent_id: BucketId, cidr: &str) -> Self {
        Self {
            parent_id,
            cidr: Some(cidr.to_string()),
            ..Self::default()
        }
    }

    pub fn bounds(parent_id: BucketId, start_ip: &str, end_ip: &str) -> Self {
        Self {
            parent_id,
            start_ip: Some(start_ip.to_string()),
            end_ip: Some(end_ip.to_string()),
            ..Self::default()
        }
    }

    pub fn reserved(mut self) -> Self {
        self.is_reserved = true;
        self
    }

    pub fn range(&self) -> Result<BucketRange> {
        resolve_range(
            self.cidr.as_deref(),
            self.start_ip.as_deref(),
            self.end_ip.as_deref(),
        )
    }
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketUpdate {
    pub description: Option<String>,
    pub memo: Option<String>,
    pub color: Option<String>,
    pub is_reserved: Option<bool>,
    pub parent_id: Option<BucketId>,
}

// ───────────────────────── bulk transfer ─────────────────────────────── //

/// One row of an export/import backup. Integer bounds are never carried;
/// they are recomputed from the address strings on import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRecord {
    pub id: BucketId,
    pub kind: BucketKind,
    #[serde(default)]
    pub privilege_id: Option<BucketId>,
    #[serde(default)]
    pub parent_id: Option<BucketId>,
    pub start_ip: String,
    pub end_ip: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub is_reserved: Option<bool>,
}

impl From<&AddressBucket> for BucketRecord {
    fn from(b: &AddressBucket) -> Self {
        Self {
            id: b.id,
            kind: b.kind,
            privilege_id: Some(b.privilege_id),
            parent_id: b.parent_id,
            start_ip: b.start_ip.to_string(),
            end_ip: b.end_ip.to_string(),
            description: b.description.clone(),
            memo: b.memo.clone(),
            color: b.color.clone(),
            cidr: b.cidr.clone(),
            is_reserved: Some(b.is_reserved),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketBackup {
    pub buckets: Vec<BucketRecord>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BackupShape {
    Envelope(BucketBackup),
    Bare(Vec<BucketRecord>),
}

impl BucketBackup {
    pub fn new(buckets: Vec<BucketRecord>) -> Self {
        let count = buckets.len();
        Self { buckets, count }
    }

    /// Accepts the `{buckets, count}` envelope or a bare array of records.
    pub fn from_json(s: &str) -> Result<Self> {
        let shape: BackupShape = serde_json::from_str(s)
            .map_err(|e| Error::validation(format!("invalid backup document: {e}")))?;
        Ok(match shape {
            BackupShape::Envelope(b) => b,
            BackupShape::Bare(rows) => Self::new(rows),
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Storage(e.to_string()))
    }
}

// ───────────────────────── query responses ───────────────────────────── //

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub label: String,
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub prefix: Option<u8>,
    pub total: u64,
}

impl From<&Window> for WindowInfo {
    fn from(w: &Window) -> Self {
        Self {
            label: w.label.clone(),
            start: w.start,
            end: w.end,
            prefix: w.prefix,
            total: w.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewResponse {
    pub window: WindowInfo,
    pub parents: Vec<BucketOverlap>,
    pub children: Vec<BucketOverlap>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeInfo {
    pub label: String,
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub prefix: Option<u8>,
    pub total: u64,
    pub start_int: u32,
}

impl From<&Window> for ScopeInfo {
    fn from(w: &Window) -> Self {
        Self {
            label: w.label.clone(),
            start: w.start,
            end: w.end,
            prefix: w.prefix,
            total: w.total,
            start_int: w.start_int,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: u64,
    pub used: u64,
    pub reserved: u64,
    pub free: u64,
}

/// Every flow sitting on one used address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsedDetail {
    pub index: Offset,
    pub address: Ipv4Addr,
    pub state: SegmentState,
    pub flows: Vec<UsageEntry>,
}

/// A reserved Child clipped to the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedDetail {
    pub start: Offset,
    pub length: u64,
    pub address: Ipv4Addr,
    pub end_address: Ipv4Addr,
    pub block: AddressBucket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailResponse {
    pub scope: ScopeInfo,
    pub center_index: Offset,
    pub center_address: Ipv4Addr,
    pub counts: Counts,
    pub segments: Vec<Segment>,
    pub used_details: Vec<UsedDetail>,
    pub reserved_segments: Vec<ReservedDetail>,
    pub blocks: Vec<AddressBucket>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// Target first, then its descendants.
    pub deleted: Vec<BucketId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub imported: usize,
}
