//! Constants and fixed limits for the multicast ledger

/// First octet of the first Tier0 block (224.0.0.0/8).
pub const MULTICAST_FIRST_OCTET: u8 = 224;
/// Number of Tier0 /8 blocks: 224.0.0.0/8 … 239.0.0.0/8.
pub const TIER0_COUNT: u8 = 16;
pub const TIER0_PREFIX: u8 = 8;

pub const MULTICAST_START: u32 = (MULTICAST_FIRST_OCTET as u32) << 24;
pub const MULTICAST_END: u32 = 0xEFFF_FFFF; // 239.255.255.255

/// Largest range a Child bucket may cover.
pub const CHILD_MAX_SIZE: u64 = 4096;

/// Window CIDR prefix bounds (inclusive).
pub const WINDOW_MIN_PREFIX: u8 = 8;
pub const WINDOW_MAX_PREFIX: u8 = 31;

pub const DEFAULT_SCOPE: &str = "232.0.0.0/8";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const AUDIT_TARGET: &str = "mcastmap::audit";

pub const ENV_DEFAULT_SCOPE: &str = "MCASTMAP_DEFAULT_SCOPE";
pub const ENV_LOG_LEVEL: &str = "MCASTMAP_LOG_LEVEL";
pub const ENV_AUDIT: &str = "MCASTMAP_AUDIT";
