//! ASHRAE-assigned BACnet vendor identifiers.
//!
//! The full registry (<https://bacnet.org/assigned-vendor-ids/>) runs past
//! a thousand entries and is maintained outside this crate; what follows is
//! a representative slice used for device-discovery display and tests. An
//! unrecognized id is not an error — [`get_vendor_name`] returns `None` and
//! callers fall back to a numeric display.

#[cfg(not(feature = "std"))]
use alloc::{format, string::String, vec::Vec};

/// `(vendor_id, name)` pairs, kept sorted by id for the binary search in
/// [`get_vendor_info`].
const VENDORS: &[(u16, &str)] = &[
    (0, "ASHRAE"),
    (1, "NIST"),
    (2, "The Trane Company"),
    (3, "McQuay International"),
    (4, "PolarSoft"),
    (5, "Johnson Controls, Inc."),
    (6, "American Auto-Matrix"),
    (7, "Siemens Building Technologies, Inc."),
    (8, "Delta Controls"),
    (9, "Distech Controls Inc."),
    (10, "Schneider Electric"),
    (11, "TAC"),
    (12, "Orion Analysis Corporation"),
    (13, "Teletrol Systems Inc."),
    (14, "Cimetrics Technology"),
    (15, "Cornell University"),
    (16, "United Technologies Carrier"),
    (17, "Honeywell Inc."),
    (18, "Alerton / Honeywell"),
    (19, "TAC AB"),
    (20, "Hewlett-Packard Company"),
    (24, "Reliable Controls Corporation"),
    (30, "KMC Controls, Inc."),
    (36, "Cimetrics Inc"),
    (42, "PEAK Controls"),
    (44, "Circon Systems Corporation"),
    (70, "Sauter Controls"),
    (73, "York Controls Group"),
    (94, "WAGO Kontakttechnik GmbH & Co. KG"),
    (102, "ESS Engineering"),
    (105, "Database Brain Inc."),
    (111, "Ridder Data Systems"),
    (125, "Cisco Systems, Inc."),
    (147, "LOYTEC Electronics GmbH"),
    (185, "BACnet Stack at SourceForge"),
    (213, "Lutron Electronics Co., Inc."),
    (260, "SWEGON AB"),
    (356, "Deos GmbH"),
    (399, "Optigo Networks Inc."),
    (428, "Chipkin Automation Systems"),
    (717, "BACnet-RS Project"),
    (999, "Unassigned / Reserved for Testing"),
];

/// Detailed vendor record, as returned by [`get_vendor_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorInfo {
    pub id: u16,
    pub name: &'static str,
}

#[cfg(feature = "std")]
impl std::fmt::Display for VendorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (vendor id {})", self.name, self.id)
    }
}

/// Look up a vendor's registered name. Returns `None` for any id not in the
/// table above — not necessarily an unassigned id, just one this crate
/// doesn't carry a copy of.
pub fn get_vendor_name(vendor_id: u16) -> Option<&'static str> {
    VENDORS
        .binary_search_by_key(&vendor_id, |&(id, _)| id)
        .ok()
        .map(|idx| VENDORS[idx].1)
}

/// Look up the full [`VendorInfo`] record for a vendor id.
pub fn get_vendor_info(vendor_id: u16) -> Option<VendorInfo> {
    get_vendor_name(vendor_id).map(|name| VendorInfo {
        id: vendor_id,
        name,
    })
}

/// Case-insensitive substring search over vendor names.
#[cfg(feature = "std")]
pub fn find_vendors_by_name(term: &str) -> Vec<VendorInfo> {
    let needle = term.to_lowercase();
    VENDORS
        .iter()
        .filter(|(_, name)| name.to_lowercase().contains(&needle))
        .map(|&(id, name)| VendorInfo { id, name })
        .collect()
}

/// Vendor id 0 is reserved for ASHRAE itself and is never assigned to a
/// product; ids above the highest entry in the local table are neither
/// confirmed assigned nor confirmed free.
pub fn is_vendor_id_reserved(vendor_id: u16) -> bool {
    vendor_id == 0
}

/// Summary counters over the local vendor table, mostly useful for CLI
/// diagnostics (`bacnet-tool vendors --stats`).
#[derive(Debug, Clone, Copy, Default)]
pub struct VendorStatistics {
    pub known_vendor_count: usize,
    pub lowest_id: u16,
    pub highest_id: u16,
}

pub fn get_vendor_statistics() -> VendorStatistics {
    VendorStatistics {
        known_vendor_count: VENDORS.len(),
        lowest_id: VENDORS.first().map(|&(id, _)| id).unwrap_or(0),
        highest_id: VENDORS.last().map(|&(id, _)| id).unwrap_or(0),
    }
}

/// Render `"Name (id N)"`, or `"Unknown vendor (id N)"` for an id not in the
/// local table.
#[cfg(feature = "std")]
pub fn format_vendor_display(vendor_id: u16) -> String {
    match get_vendor_name(vendor_id) {
        Some(name) => format!("{} (id {})", name, vendor_id),
        None => format!("Unknown vendor (id {})", vendor_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vendor_resolves() {
        assert_eq!(get_vendor_name(5), Some("Johnson Controls, Inc."));
        assert_eq!(get_vendor_name(0), Some("ASHRAE"));
    }

    #[test]
    fn unknown_vendor_is_none() {
        assert_eq!(get_vendor_name(60000), None);
    }

    #[test]
    fn table_is_sorted_for_binary_search() {
        assert!(VENDORS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn reserved_id_zero() {
        assert!(is_vendor_id_reserved(0));
        assert!(!is_vendor_id_reserved(5));
    }

    #[cfg(feature = "std")]
    #[test]
    fn search_by_name_is_case_insensitive() {
        let found = find_vendors_by_name("johnson");
        assert!(found.iter().any(|v| v.id == 5));
    }
}
