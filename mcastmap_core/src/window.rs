//! Window resolution: turn a query's scope or explicit range into integer bounds.

use crate::constants::{WINDOW_MAX_PREFIX, WINDOW_MIN_PREFIX};
use crate::errors::{Error, Result};
use crate::helpers::{non_blank, parse_cidr_v4, parse_ipv4, v4_int};
use crate::types::Offset;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Query parameters selecting a window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowQuery {
    pub scope: Option<String>,
    pub range_start: Option<String>,
    pub range_end: Option<String>,
    pub center: Option<String>,
}

impl WindowQuery {
    pub fn scope(cidr: &str) -> Self {
        Self {
            scope: Some(cidr.to_string()),
            ..Self::default()
        }
    }

    pub fn range(start: &str, end: &str) -> Self {
        Self {
            range_start: Some(start.to_string()),
            range_end: Some(end.to_string()),
            ..Self::default()
        }
    }

    pub fn with_center(mut self, center: &str) -> Self {
        self.center = Some(center.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub label: String,
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    pub start_int: u32,
    pub end_int: u32,
    pub total: u64,
    pub prefix: Option<u8>,
}

impl Window {
    fn from_bounds(label: String, start_int: u32, end_int: u32, prefix: Option<u8>) -> Self {
        Self {
            label,
            start: Ipv4Addr::from(start_int),
            end: Ipv4Addr::from(end_int),
            start_int,
            end_int,
            total: end_int as u64 - start_int as u64 + 1,
            prefix,
        }
    }

    #[inline]
    pub fn contains(&self, addr: u32) -> bool {
        self.start_int <= addr && addr <= self.end_int
    }

    #[inline]
    pub fn offset_of(&self, addr: u32) -> Offset {
        (addr - self.start_int) as Offset
    }

    /// Address at a window-relative offset. Caller keeps `offset < total`.
    #[inline]
    pub fn addr_at(&self, offset: Offset) -> Ipv4Addr {
        Ipv4Addr::from((self.start_int as u64 + offset) as u32)
    }

    /// Resolve an optional center hint into `(center_index, center_address)`.
    /// Without a hint the window start is the center.
    pub fn center(&self, center: Option<&str>) -> Result<(Offset, Ipv4Addr)> {
        let Some(raw) = non_blank(center) else {
            return Ok((0, self.start));
        };
        let addr = parse_ipv4(raw).map_err(|_| Error::validation("invalid center address"))?;
        let addr_int = v4_int(addr);
        if !self.contains(addr_int) {
            return Err(Error::validation(
                "center address must be inside the selected scope",
            ));
        }
        Ok((self.offset_of(addr_int), addr))
    }
}

/// A complete explicit range takes precedence over `scope`; with neither,
/// `default_scope` is used.
pub fn resolve_window(query: &WindowQuery, default_scope: &str) -> Result<Window> {
    let start = non_blank(query.range_start.as_deref());
    let end = non_blank(query.range_end.as_deref());
    if let (Some(start), Some(end)) = (start, end) {
        return window_from_range(start, end);
    }
    match non_blank(query.scope.as_deref()) {
        Some(scope) => window_from_scope(scope),
        None => window_from_scope(default_scope),
    }
}

pub fn window_from_scope(scope: &str) -> Result<Window> {
    let net = parse_cidr_v4(scope).map_err(|e| match e {
        Error::Validation(msg) if msg.starts_with("only IPv4") => {
            Error::validation("only IPv4 multicast scopes are supported")
        }
        _ => Error::validation("invalid scope / CIDR"),
    })?;
    let prefix = net.prefix_len();
    if !(WINDOW_MIN_PREFIX..=WINDOW_MAX_PREFIX).contains(&prefix) {
        return Err(Error::validation(format!(
            "prefix length must be between /{WINDOW_MIN_PREFIX} and /{WINDOW_MAX_PREFIX}"
        )));
    }
    Ok(Window::from_bounds(
        net.to_string(),
        v4_int(net.network()),
        v4_int(net.broadcast()),
        Some(prefix),
    ))
}

pub fn window_from_range(start: &str, end: &str) -> Result<Window> {
    let s = parse_ipv4(start)?;
    let e = parse_ipv4(end)?;
    let (start_int, end_int) = (v4_int(s), v4_int(e));
    if start_int > end_int {
        return Err(Error::validation("range_start must be <= range_end"));
    }
    Ok(Window::from_bounds(format!("{s}/{e}"), start_int, end_int, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_SCOPE;
    use crate::errors::ErrorCode;

    #[test]
    fn scope_window_bounds() {
        let w = window_from_scope("10.0.0.0/30").unwrap();
        assert_eq!(w.total, 4);
        assert_eq!(w.label, "10.0.0.0/30");
        assert_eq!(w.prefix, Some(30));
        assert_eq!(w.end, Ipv4Addr::new(10, 0, 0, 3));
    }

    #[test]
    fn prefix_bounds_enforced() {
        assert!(window_from_scope("224.0.0.0/7").is_err());
        assert!(window_from_scope("224.0.0.0/8").is_ok());
        assert!(window_from_scope("224.0.0.0/31").is_ok());
        assert!(window_from_scope("224.0.0.1/32").is_err());
        assert!(window_from_scope("ff02::/16").is_err());
    }

    #[test]
    fn explicit_range_wins_over_scope() {
        let q = WindowQuery {
            scope: Some("232.0.0.0/8".into()),
            range_start: Some("239.1.0.10".into()),
            range_end: Some("239.1.0.19".into()),
            center: None,
        };
        let w = resolve_window(&q, DEFAULT_SCOPE).unwrap();
        assert_eq!(w.label, "239.1.0.10/239.1.0.19");
        assert_eq!(w.total, 10);
        assert_eq!(w.prefix, None);
    }

    #[test]
    fn half_range_falls_back_to_scope() {
        let q = WindowQuery {
            range_start: Some("239.1.0.10".into()),
            ..WindowQuery::default()
        };
        let w = resolve_window(&q, DEFAULT_SCOPE).unwrap();
        assert_eq!(w.label, DEFAULT_SCOPE);
    }

    #[test]
    fn inverted_range_rejected() {
        let err = resolve_window(&WindowQuery::range("232.0.0.9", "232.0.0.1"), DEFAULT_SCOPE)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Validation);
    }

    #[test]
    fn full_space_range_total() {
        let w = window_from_range("0.0.0.0", "255.255.255.255").unwrap();
        assert_eq!(w.total, 1u64 << 32);
        assert_eq!(w.addr_at(w.total - 1), Ipv4Addr::new(255, 255, 255, 255));
    }

    #[test]
    fn center_resolution() {
        let w = window_from_scope("232.1.5.0/24").unwrap();
        assert_eq!(w.center(None).unwrap(), (0, Ipv4Addr::new(232, 1, 5, 0)));
        assert_eq!(w.center(Some("232.1.5.10")).unwrap().0, 10);
        assert!(w.center(Some("232.1.6.0")).is_err());
        assert!(w.center(Some("nonsense")).is_err());
    }
}
