// 🏷️ Classification Rules - Company size tiers from declared capital
// Rules as data: the four ceilings live in TierThresholds, defaults below

use serde::{Deserialize, Serialize};

// ============================================================================
// THRESHOLDS (inclusive upper bounds, in BRL)
// ============================================================================

/// Micro-entrepreneur ceiling
pub const MEI_CEILING: i64 = 81_000;

/// Small business (ME) ceiling
pub const ME_CEILING: i64 = 360_000;

/// Small-sized company ceiling
pub const SMALL_CEILING: i64 = 4_800_000;

/// Medium-sized company ceiling; anything above is large
pub const MEDIUM_CEILING: i64 = 300_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub mei: i64,
    pub me: i64,
    pub small: i64,
    pub medium: i64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        TierThresholds {
            mei: MEI_CEILING,
            me: ME_CEILING,
            small: SMALL_CEILING,
            medium: MEDIUM_CEILING,
        }
    }
}

impl TierThresholds {
    /// Ceilings must be non-negative and strictly increasing
    pub fn is_valid(&self) -> bool {
        self.mei >= 0 && self.mei < self.me && self.me < self.small && self.small < self.medium
    }
}

// ============================================================================
// SIZE TIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeTier {
    Mei,
    Me,
    Small,
    Medium,
    Large,
}

impl SizeTier {
    /// Exactly one tier for every capital value; bounds are closed on the upper end.
    pub fn classify(capital: i64, thresholds: &TierThresholds) -> SizeTier {
        if capital <= thresholds.mei {
            SizeTier::Mei
        } else if capital <= thresholds.me {
            SizeTier::Me
        } else if capital <= thresholds.small {
            SizeTier::Small
        } else if capital <= thresholds.medium {
            SizeTier::Medium
        } else {
            SizeTier::Large
        }
    }

    /// Label written to `classificacao_porte`
    pub fn label(&self) -> &'static str {
        match self {
            SizeTier::Mei => "MEI",
            SizeTier::Me => "ME",
            SizeTier::Small => "Small-sized Company",
            SizeTier::Medium => "Medium-sized Company",
            SizeTier::Large => "Large-sized Company",
        }
    }

    /// Only the three largest tiers are reported
    pub fn is_reported(&self) -> bool {
        matches!(self, SizeTier::Small | SizeTier::Medium | SizeTier::Large)
    }
}

// ============================================================================
// CAPITAL NORMALIZATION
// ============================================================================

/// Parse a locale-formatted capital string ("1.234,56") into a number.
///
/// Everything except digits, periods and commas is stripped. When a comma is
/// present the first one is the decimal mark, later commas are dropped and
/// periods are thousands separators.
/// Unparseable input is 0.0, never an error: an undeclared capital and a
/// declared zero capital land in the same tier.
pub fn normalize_capital(raw: &str) -> f64 {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let normalized = if kept.contains(',') {
        kept.replace('.', "").replacen(',', ".", 1).replace(',', "")
    } else {
        kept
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Floor to whole currency units
pub fn capital_to_int(capital: f64) -> i64 {
    capital.floor() as i64
}

// ============================================================================
// TESTS
// ============================================================================
