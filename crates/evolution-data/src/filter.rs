//! Subsetting a month's rows to one hypergiant.

use evolution_core::models::DenormalizedRow;

use crate::registry::HypergiantKey;

/// Rows whose network belongs to `key`, in their original order.
///
/// An empty result is normal (the operator had no registered presence that
/// month) and the caller skips the month for that hypergiant.
pub fn select_rows<'a>(
    rows: &'a [DenormalizedRow],
    key: &HypergiantKey,
) -> Vec<&'a DenormalizedRow> {
    rows.iter().filter(|row| key.asns.contains(&row.asn)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(asn: &str, facility: &str) -> DenormalizedRow {
        DenormalizedRow {
            asn: asn.to_string(),
            facility_name: Some(facility.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_rows_keeps_matching_asns_in_order() {
        let rows = vec![row("15169", "A"), row("2906", "B"), row("36040", "C")];
        let key = HypergiantKey::new("google", ["15169", "36040"]);

        let selected = select_rows(&rows, &key);
        let facilities: Vec<&str> = selected
            .iter()
            .map(|r| r.facility_name.as_deref().unwrap())
            .collect();
        assert_eq!(facilities, vec!["A", "C"]);
    }

    #[test]
    fn test_select_rows_absent_hypergiant_is_empty() {
        let rows = vec![row("2906", "B")];
        let key = HypergiantKey::new("google", ["15169"]);
        assert!(select_rows(&rows, &key).is_empty());
    }

    #[test]
    fn test_select_rows_empty_asn_set() {
        let rows = vec![row("15169", "A")];
        let key = HypergiantKey::new("nobody", Vec::<String>::new());
        assert!(select_rows(&rows, &key).is_empty());
    }
}
