//! Usage index: which flows occupy which addresses of a window.

use crate::helpers::v4_int;
use crate::types::{FlowPath, Offset, UsageEntry};
use crate::window::Window;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

/// One row of the flow directory, as handed over by the collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowAddresses {
    pub flow_id: String,
    pub display_name: Option<String>,
    pub aliases: Vec<String>,
    pub multicast_addr_a: Option<String>,
    pub multicast_addr_b: Option<String>,
    pub flow_status: Option<String>,
    pub availability: Option<String>,
    pub node_label: Option<String>,
}

impl FlowAddresses {
    pub fn new(flow_id: &str) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            ..Self::default()
        }
    }

    pub fn with_a(mut self, addr: &str) -> Self {
        self.multicast_addr_a = Some(addr.to_string());
        self
    }

    pub fn with_b(mut self, addr: &str) -> Self {
        self.multicast_addr_b = Some(addr.to_string());
        self
    }

    fn alias(&self) -> Option<String> {
        self.aliases.iter().find(|a| !a.trim().is_empty()).cloned()
    }

    fn entry(&self, address_int: u32, path: FlowPath) -> UsageEntry {
        UsageEntry {
            address_int,
            flow_id: self.flow_id.clone(),
            display_name: self.display_name.clone(),
            alias: self.alias(),
            path,
            flow_status: self.flow_status.clone(),
            availability: self.availability.clone(),
            node_label: self.node_label.clone(),
        }
    }
}

/// In-window used offsets, each with the flows on it. Iteration is in
/// ascending offset order.
#[derive(Debug, Clone, Default)]
pub struct UsageIndex {
    by_offset: BTreeMap<Offset, Vec<UsageEntry>>,
}

impl UsageIndex {
    /// Addresses that are blank, unparsable, IPv6 or outside the window are
    /// skipped silently.
    pub fn build(flows: &[FlowAddresses], window: &Window) -> Self {
        let mut by_offset: BTreeMap<Offset, Vec<UsageEntry>> = BTreeMap::new();
        for flow in flows {
            let slots = [
                (flow.multicast_addr_a.as_deref(), FlowPath::A),
                (flow.multicast_addr_b.as_deref(), FlowPath::B),
            ];
            for (raw, path) in slots {
                let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
                    continue;
                };
                let addr = match raw.parse::<IpAddr>() {
                    Ok(IpAddr::V4(v4)) => v4_int(v4),
                    _ => {
                        trace!("[USAGE] flow {} skipped address {raw:?}", flow.flow_id);
                        continue;
                    }
                };
                if !window.contains(addr) {
                    continue;
                }
                by_offset
                    .entry(window.offset_of(addr))
                    .or_default()
                    .push(flow.entry(addr, path));
            }
        }
        Self { by_offset }
    }

    /// Sorted, de-duplicated used offsets.
    pub fn offsets(&self) -> Vec<Offset> {
        self.by_offset.keys().copied().collect()
    }

    pub fn entries_at(&self, offset: Offset) -> &[UsageEntry] {
        self.by_offset.get(&offset).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Offset, &[UsageEntry])> {
        self.by_offset.iter().map(|(o, e)| (*o, e.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::window_from_scope;

    #[test]
    fn filters_and_groups() {
        let w = window_from_scope("232.1.5.0/24").unwrap();
        let mut cam = FlowAddresses::new("cam-1").with_a("232.1.5.10").with_b("232.1.5.10");
        cam.aliases = vec![String::new(), "studio".into(), "spare".into()];
        let flows = vec![
            cam,
            FlowAddresses::new("out").with_a("232.1.6.1"),
            FlowAddresses::new("v6").with_a("ff3e::1"),
            FlowAddresses::new("junk").with_a("not-an-ip").with_b("232.1.5.0"),
        ];
        let idx = UsageIndex::build(&flows, &w);
        assert_eq!(idx.offsets(), vec![0, 10]);
        let at10 = idx.entries_at(10);
        assert_eq!(at10.len(), 2);
        assert_eq!(at10[0].path, FlowPath::A);
        assert_eq!(at10[1].path, FlowPath::B);
        assert_eq!(at10[0].alias.as_deref(), Some("studio"));
        assert_eq!(idx.entries_at(0)[0].flow_id, "junk");
        assert!(idx.entries_at(11).is_empty());
    }
}
