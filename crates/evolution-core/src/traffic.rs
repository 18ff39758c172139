//! Throughput normalization.
//!
//! Registry throughput fields are free text (`"10-20Gbps"`, `"100+Tbps"`,
//! `"Not Disclosed"`). Everything is converted to megabits per second; text
//! that cannot be understood becomes `None`, never an error.

use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::warn;

/// Value reported for the open-ended top bucket `"100+Tbps"`.
pub const TOP_BUCKET_MBPS: f64 = 100_000_000.0;

// ── Mbps ──────────────────────────────────────────────────────────────────────

/// A rate in megabits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Mbps(pub f64);

impl Mbps {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Add for Mbps {
    type Output = Mbps;

    fn add(self, rhs: Mbps) -> Mbps {
        Mbps(self.0 + rhs.0)
    }
}

impl AddAssign for Mbps {
    fn add_assign(&mut self, rhs: Mbps) {
        self.0 += rhs.0;
    }
}

impl Sum for Mbps {
    fn sum<I: Iterator<Item = Mbps>>(iter: I) -> Mbps {
        iter.fold(Mbps::default(), Add::add)
    }
}

impl<'a> Sum<&'a Mbps> for Mbps {
    fn sum<I: Iterator<Item = &'a Mbps>>(iter: I) -> Mbps {
        iter.copied().sum()
    }
}

/// Integral rates are written as JSON integers so consumers see `20000`,
/// not `20000.0`.
impl Serialize for Mbps {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
            serializer.serialize_i64(v as i64)
        } else {
            serializer.serialize_f64(v)
        }
    }
}

impl<'de> Deserialize<'de> for Mbps {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Mbps)
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

fn traffic_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(\d+\.?\d*)\s*-\s*(\d+\.?\d*)\s*([TGM]?bps)|(\d+\.?\d*)\s*([TGM]?bps)\+?",
        )
        .expect("traffic regex is valid")
    })
}

/// Multiplier from `unit` to Mbps. A bare `bps` means Mbps in the registry.
fn unit_factor(unit: &str) -> f64 {
    match unit.chars().next().map(|c| c.to_ascii_uppercase()) {
        Some('T') => 1_000_000.0,
        Some('G') => 1_000.0,
        _ => 1.0,
    }
}

/// Convert a free-text throughput value to Mbps.
///
/// Ranges resolve to their upper bound. Returns `None` for empty or
/// unrecognised text; callers must exclude `None` from sums rather than
/// treating it as zero.
pub fn normalize_traffic(value: &str) -> Option<Mbps> {
    if let Some(caps) = traffic_pattern().captures(value) {
        if let (Some(high), Some(unit)) = (caps.get(2), caps.get(3)) {
            let high: f64 = high.as_str().parse().ok()?;
            return Some(Mbps(high * unit_factor(unit.as_str())));
        }
        if let (Some(number), Some(unit)) = (caps.get(4), caps.get(5)) {
            let number: f64 = number.as_str().parse().ok()?;
            return Some(Mbps(number * unit_factor(unit.as_str())));
        }
    }

    if value.is_empty() {
        return None;
    }
    if value == "100+Tbps" {
        return Some(Mbps(TOP_BUCKET_MBPS));
    }

    if let Some(high) = mbps_range_high(value) {
        return Some(high);
    }

    warn!("Unrecognized traffic pattern: {:?}", value);
    None
}

/// Upper bound of an `a-bMbps` string the main pattern did not catch.
fn mbps_range_high(value: &str) -> Option<Mbps> {
    let (head, _) = value.split_once("Mbps")?;
    let (_, high) = head.split_once('-')?;
    high.trim().parse::<f64>().ok().map(Mbps)
}

/// Capacity field of an exchange link: numeric in most dumps, free text in
/// a few.
pub fn capacity_from_value(value: &Value) -> Option<Mbps> {
    match value {
        Value::Number(n) => n.as_f64().map(Mbps),
        Value::String(s) => normalize_traffic(s.trim()),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
