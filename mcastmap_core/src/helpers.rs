//! Helper functions for address parsing and sorted-offset arithmetic

use crate::errors::{Error, Result};
use crate::types::{BucketRange, Offset};
use ipnet::{IpNet, Ipv4Net};
use std::net::{IpAddr, Ipv4Addr};

#[inline]
pub fn v4_int(addr: Ipv4Addr) -> u32 {
    u32::from_be_bytes(addr.octets())
}

/// Parse an IPv4 address; IPv6 input is rejected rather than mapped.
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr> {
    match s.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ok(v4),
        Ok(IpAddr::V6(_)) => Err(Error::validation(format!("only IPv4 is supported: {s}"))),
        Err(_) => Err(Error::validation(format!("invalid IPv4 address: {s}"))),
    }
}

/// Parse a CIDR leniently (host bits may be set) and truncate it.
pub fn parse_cidr_v4(s: &str) -> Result<Ipv4Net> {
    match s.trim().parse::<IpNet>() {
        Ok(IpNet::V4(net)) => Ok(net.trunc()),
        Ok(IpNet::V6(_)) => Err(Error::validation(format!("only IPv4 is supported: {s}"))),
        Err(_) => Err(Error::validation(format!("invalid CIDR: {s}"))),
    }
}

pub fn range_from_cidr(s: &str) -> Result<BucketRange> {
    let net = parse_cidr_v4(s)?;
    Ok(BucketRange {
        start: v4_int(net.network()),
        end: v4_int(net.broadcast()),
        cidr: Some(net.to_string()),
    })
}

pub fn range_from_bounds(start_ip: &str, end_ip: &str) -> Result<BucketRange> {
    let start = v4_int(parse_ipv4(start_ip)?);
    let end = v4_int(parse_ipv4(end_ip)?);
    if start > end {
        return Err(Error::validation("start_ip must be <= end_ip"));
    }
    Ok(BucketRange::new(start, end))
}

/// A non-blank CIDR wins; otherwise both explicit endpoints are required.
pub fn resolve_range(
    cidr: Option<&str>,
    start_ip: Option<&str>,
    end_ip: Option<&str>,
) -> Result<BucketRange> {
    if let Some(c) = cidr.map(str::trim).filter(|c| !c.is_empty()) {
        return range_from_cidr(c);
    }
    match (non_blank(start_ip), non_blank(end_ip)) {
        (Some(s), Some(e)) => range_from_bounds(s, e),
        _ => Err(Error::validation(
            "start and end IP are required when CIDR is not provided",
        )),
    }
}

#[inline]
pub fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|v| !v.trim().is_empty())
}

/// First index whose value is `>= value`.
#[inline]
pub fn lower_bound(sorted: &[Offset], value: Offset) -> usize {
    sorted.partition_point(|&v| v < value)
}

/// Number of sorted offsets inside `[start, end]`; two binary searches.
pub fn count_between(sorted: &[Offset], start: Offset, end: Offset) -> u64 {
    if end < start {
        return 0;
    }
    let left = lower_bound(sorted, start);
    let right = lower_bound(sorted, end + 1);
    right.saturating_sub(left) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cidr_is_truncated_and_canonical() {
        let r = range_from_cidr("232.1.5.77/24").unwrap();
        assert_eq!(r.cidr.as_deref(), Some("232.1.5.0/24"));
        assert_eq!(r.start, v4_int(Ipv4Addr::new(232, 1, 5, 0)));
        assert_eq!(r.size(), 256);
    }

    #[test]
    fn ipv6_and_garbage_rejected() {
        assert!(parse_ipv4("ff02::1").is_err());
        assert!(parse_ipv4("239.1.1").is_err());
        assert!(parse_cidr_v4("ff00::/8").is_err());
        assert!(range_from_bounds("232.0.0.9", "232.0.0.1").is_err());
    }

    #[test]
    fn cidr_beats_bounds() {
        let r = resolve_range(Some(" 232.0.0.0/30 "), Some("1.1.1.1"), None).unwrap();
        assert_eq!(r.size(), 4);
        assert!(resolve_range(Some("  "), Some("232.0.0.1"), None).is_err());
    }

    #[test]
    fn counts_inclusive_range() {
        let used = [1, 4, 5, 9];
        assert_eq!(count_between(&used, 0, 4), 2);
        assert_eq!(count_between(&used, 5, 5), 1);
        assert_eq!(count_between(&used, 6, 8), 0);
        assert_eq!(count_between(&used, 9, 3), 0);
    }
}
