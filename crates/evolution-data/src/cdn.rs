//! Content-network presence per country.
//!
//! Counts the organizations running `Content` networks in each country and
//! the traffic they declare, one month at a time.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use evolution_core::traffic::{normalize_traffic, Mbps};
use serde::Serialize;

use crate::reader::{clean, OrgRecord, Relations};
use crate::registry::AsnCountryMap;

/// Network type tag identifying content providers.
pub const CONTENT_TYPE: &str = "Content";

/// Content organizations and their declared traffic in one country.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentCountryStats {
    pub organizations: usize,
    pub traffic: Mbps,
}

#[derive(Default)]
struct OrgTotals {
    traffic: Mbps,
    countries: BTreeSet<String>,
}

/// Per-country content statistics for one month.
///
/// Each `Content` network is placed by the ASN → country map when it knows
/// the ASN, otherwise by its organization's country. Networks are grouped by
/// organization name; an organization present in several countries counts
/// once in each, with its full traffic.
pub fn summarize_content_networks(
    relations: &Relations,
    asn_countries: Option<&AsnCountryMap>,
) -> BTreeMap<String, ContentCountryStats> {
    let orgs: HashMap<u64, &OrgRecord> =
        relations.orgs.iter().map(|o| (o.org_id, o)).collect();

    let mut per_org: BTreeMap<String, OrgTotals> = BTreeMap::new();
    for net in &relations.nets {
        if net.info_type.as_deref().map(str::trim) != Some(CONTENT_TYPE) {
            continue;
        }
        let Some(org) = orgs.get(&net.org_id) else {
            continue;
        };
        let Some(org_name) = clean(&org.name) else {
            continue;
        };

        let totals = per_org.entry(org_name).or_default();
        if let Some(traffic) = normalize_traffic(net.info_traffic.as_deref().unwrap_or("")) {
            totals.traffic += traffic;
        }

        let country = asn_countries
            .and_then(|map| map.get(&net.asn))
            .map(str::to_string)
            .or_else(|| clean(&org.country));
        if let Some(country) = country {
            totals.countries.insert(country);
        }
    }

    let mut per_country: BTreeMap<String, ContentCountryStats> = BTreeMap::new();
    for totals in per_org.into_values() {
        for country in totals.countries {
            let stats = per_country.entry(country).or_default();
            stats.organizations += 1;
            stats.traffic += totals.traffic;
        }
    }
    per_country
}
