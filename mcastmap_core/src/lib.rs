//! Allocation ledger for the IPv4 multicast space.
//!
//! The space 224.0.0.0–239.255.255.255 is split into sixteen fixed Tier0 /8
//! blocks, administrator-defined Parent ranges beneath them, and small Child
//! ranges beneath Parents that may be reserved. For any window the ledger
//! reconciles reservations against live flow usage into a gap-free
//! FREE/USED/RESERVED partition and reports per-bucket utilization.

pub mod arena;
pub mod config;
pub mod constants;
pub mod errors;
pub mod guard;
pub mod helpers;
pub mod inflight;
pub mod ledger;
pub mod overlap;
pub mod public_api;
pub mod repository;
pub mod segments;
pub mod table;
pub mod telemetry;
pub mod types;
pub mod usage;
pub mod window;

pub use config::LedgerConfig;
pub use errors::{Error, ErrorCode, Result};
pub use ledger::AddressLedger;
pub use public_api::{
    BucketBackup, BucketRecord, BucketUpdate, ChildBucketPayload, DetailResponse,
    OverviewResponse, ParentBucketPayload,
};
pub use repository::{BucketRepository, MemoryRepository, StaticUsage, UsageSource};
pub use types::{AddressBucket, BucketId, BucketKind, Segment, SegmentState};
pub use usage::FlowAddresses;
pub use window::WindowQuery;
