//! Data structures for the bucket hierarchy and segmentation output

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

pub type BucketId = u64;

/// Offset relative to a window's `start_int`.
pub type Offset = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    Tier0,
    Parent,
    Child,
}

impl BucketKind {
    /// Dependency order used for export and import: Tier0 < Parent < Child.
    #[inline]
    pub fn weight(self) -> u8 {
        match self {
            BucketKind::Tier0 => 0,
            BucketKind::Parent => 1,
            BucketKind::Child => 2,
        }
    }

    /// Whether a bucket of this kind may own a bucket of kind `child`.
    pub fn may_contain(self, child: BucketKind) -> bool {
        match (self, child) {
            (BucketKind::Tier0 | BucketKind::Parent, BucketKind::Parent) => true,
            (BucketKind::Parent, BucketKind::Child) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BucketKind::Tier0 => "tier0",
            BucketKind::Parent => "parent",
            BucketKind::Child => "child",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed, inclusive interval over the 32-bit address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRange {
    pub start: u32,
    pub end: u32,
    /// Canonical CIDR when the range was given as one.
    pub cidr: Option<String>,
}

impl BucketRange {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end, cidr: None }
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.end as u64 - self.start as u64 + 1
    }

    #[inline]
    pub fn within(&self, start: u32, end: u32) -> bool {
        self.start >= start && self.end <= end
    }
}

impl fmt::Display for BucketRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cidr {
            Some(c) => f.write_str(c),
            None => write!(f, "{}-{}", Ipv4Addr::from(self.start), Ipv4Addr::from(self.end)),
        }
    }
}

/// Canonical bucket record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBucket {
    pub id: BucketId,
    pub kind: BucketKind,
    /// Owning Tier0 ancestor; a Tier0 bucket points at itself.
    pub privilege_id: BucketId,
    pub parent_id: Option<BucketId>,
    pub start_ip: Ipv4Addr,
    pub end_ip: Ipv4Addr,
    pub start_int: u32,
    pub end_int: u32,
    pub size: u64,
    pub description: Option<String>,
    pub memo: Option<String>,
    pub color: Option<String>,
    pub cidr: Option<String>,
    pub is_reserved: bool,
}

impl AddressBucket {
    #[inline]
    pub fn range(&self) -> BucketRange {
        BucketRange {
            start: self.start_int,
            end: self.end_int,
            cidr: self.cidr.clone(),
        }
    }

    #[inline]
    pub fn intersects(&self, start: u32, end: u32) -> bool {
        self.end_int >= start && self.start_int <= end
    }

    #[inline]
    pub fn contains_addr(&self, addr: u32) -> bool {
        self.start_int <= addr && addr <= self.end_int
    }

    /// Only Child buckets carry a meaningful reservation flag.
    #[inline]
    pub fn is_reserved_child(&self) -> bool {
        self.kind == BucketKind::Child && self.is_reserved
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentState {
    Free,
    Used,
    Reserved,
}

/// Maximal run of window offsets sharing one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Offset,
    pub length: u64,
    pub state: SegmentState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub block_ids: Vec<BucketId>,
}

impl Segment {
    #[inline]
    pub fn end(&self) -> Offset {
        self.start + self.length
    }
}

/// Which of a flow's two address slots an entry came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowPath {
    A,
    B,
}

/// One flow occupying one in-window address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub address_int: u32,
    pub flow_id: String,
    pub display_name: Option<String>,
    pub alias: Option<String>,
    pub path: FlowPath,
    pub flow_status: Option<String>,
    pub availability: Option<String>,
    pub node_label: Option<String>,
}
