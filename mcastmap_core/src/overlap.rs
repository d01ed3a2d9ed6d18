//! Per-bucket overlap with a window and how much of it is in use.

use crate::helpers::count_between;
use crate::types::{AddressBucket, BucketKind, Offset};
use crate::window::Window;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// A bucket annotated with its clipped overlap and usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketOverlap {
    #[serde(flatten)]
    pub bucket: AddressBucket,
    pub overlap_start_ip: Ipv4Addr,
    pub overlap_end_ip: Ipv4Addr,
    pub overlap_size: u64,
    pub used_in_scope: u64,
    pub usage_ratio: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlapSummary {
    pub parents: Vec<BucketOverlap>,
    pub children: Vec<BucketOverlap>,
}

/// Clip one bucket to the window. `None` when they do not intersect.
pub fn clip(bucket: &AddressBucket, window: &Window, used: &[Offset]) -> Option<BucketOverlap> {
    if !bucket.intersects(window.start_int, window.end_int) {
        return None;
    }
    let overlap_start = bucket.start_int.max(window.start_int);
    let overlap_end = bucket.end_int.min(window.end_int);
    let rel_start = window.offset_of(overlap_start);
    let rel_end = window.offset_of(overlap_end);
    let overlap_size = rel_end - rel_start + 1;
    let used_in_scope = count_between(used, rel_start, rel_end);
    let usage_ratio = if overlap_size > 0 {
        used_in_scope as f64 / overlap_size as f64
    } else {
        0.0
    };
    Some(BucketOverlap {
        bucket: bucket.clone(),
        overlap_start_ip: Ipv4Addr::from(overlap_start),
        overlap_end_ip: Ipv4Addr::from(overlap_end),
        overlap_size,
        used_in_scope,
        usage_ratio,
    })
}

/// Summarize every Parent and Child intersecting `window`. Input order is
/// kept in each output list; Tier0 buckets are skipped.
///
/// `used` must be sorted ascending, window-relative.
pub fn summarize(buckets: &[AddressBucket], window: &Window, used: &[Offset]) -> OverlapSummary {
    let mut out = OverlapSummary::default();
    for bucket in buckets {
        let list = match bucket.kind {
            BucketKind::Tier0 => continue,
            BucketKind::Parent => &mut out.parents,
            BucketKind::Child => &mut out.children,
        };
        if let Some(o) = clip(bucket, window, used) {
            list.push(o);
        }
    }
    out
}
