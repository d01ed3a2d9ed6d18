//! Sweep-line segmentation of a window into FREE / USED / RESERVED runs.
//!
//! Boundaries are every point where the state may change: the window edges,
//! each used offset and the offset after it, and each reserved interval's
//! clipped ends. Between two consecutive boundaries nothing changes, so one
//! segment is emitted per non-empty gap.
//!
//! Precedence is fixed: USED beats RESERVED beats FREE. A used address that
//! sits inside a reservation is reported USED and is not counted as reserved.

use crate::types::{AddressBucket, BucketId, Offset, Segment, SegmentState};
use crate::window::Window;
#[cfg(feature = "trace")]
use log::trace;
use std::collections::BTreeMap;

/// Half-open `[start, end)` reservation over window offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedInterval {
    pub start: Offset,
    pub end: Offset,
    pub bucket_id: BucketId,
}

/// Reserved Child buckets clipped to `window`, in input order. Empty clips
/// are dropped.
pub fn reserved_intervals<'a>(
    buckets: &'a [AddressBucket],
    window: &Window,
) -> Vec<(ReservedInterval, &'a AddressBucket)> {
    buckets
        .iter()
        .filter(|b| b.is_reserved_child())
        .filter(|b| b.intersects(window.start_int, window.end_int))
        .filter_map(|b| {
            let start = window.offset_of(b.start_int.max(window.start_int));
            let end = window.offset_of(b.end_int.min(window.end_int)) + 1;
            (start < end).then_some((
                ReservedInterval {
                    start,
                    end,
                    bucket_id: b.id,
                },
                b,
            ))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentPlan {
    pub segments: Vec<Segment>,
    /// Offsets in RESERVED segments; used offsets are never included.
    pub reserved_count: u64,
}

#[derive(Default)]
struct Events {
    begin: Vec<BucketId>,
    end: Vec<BucketId>,
}

/// Partition `[0, total)`.
///
/// `used` must be sorted ascending. Offsets at or past `total` are ignored,
/// as are the parts of reserved intervals outside the window.
pub fn build_segments(total: u64, used: &[Offset], reserved: &[ReservedInterval]) -> SegmentPlan {
    if total == 0 {
        return SegmentPlan::default();
    }

    let mut events: BTreeMap<Offset, Events> = BTreeMap::new();
    events.entry(0).or_default();
    events.entry(total).or_default();
    for &u in used.iter().take_while(|&&u| u < total) {
        events.entry(u).or_default();
        events.entry(u + 1).or_default();
    }
    for r in reserved {
        let (s, e) = (r.start.min(total), r.end.min(total));
        if s >= e {
            continue;
        }
        events.entry(s).or_default().begin.push(r.bucket_id);
        events.entry(e).or_default().end.push(r.bucket_id);
    }

    let boundaries: Vec<Offset> = events.keys().copied().collect();
    let mut active: Vec<BucketId> = Vec::new();
    let mut used_ptr = 0usize;
    let mut plan = SegmentPlan::default();

    for pair in boundaries.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if let Some(ev) = events.get(&lo) {
            for id in &ev.end {
                if let Some(pos) = active.iter().position(|a| a == id) {
                    active.remove(pos);
                }
            }
            active.extend(ev.begin.iter().copied());
        }

        while used_ptr < used.len() && used[used_ptr] < lo {
            used_ptr += 1;
        }
        let has_used = used_ptr < used.len() && used[used_ptr] < hi;

        let length = hi - lo;
        let (state, block_ids) = if has_used {
            (SegmentState::Used, Vec::new())
        } else if !active.is_empty() {
            plan.reserved_count += length;
            (SegmentState::Reserved, active.clone())
        } else {
            (SegmentState::Free, Vec::new())
        };
        #[cfg(feature = "trace")]
        trace!("[SEGMENT] [{lo}, {hi}) {state:?} blocks={block_ids:?}");
        plan.segments.push(Segment {
            start: lo,
            length,
            state,
            block_ids,
        });
    }
    plan
}

/// `(used, reserved, free)` for a plan; free never underflows.
pub fn counts(total: u64, used: u64, reserved_count: u64) -> (u64, u64, u64) {
    let free = total.saturating_sub(used + reserved_count);
    (used, reserved_count, free)
}
