//! Combo-based scoring for accepted scans.
//!
//! Kept as a pure function so it can be tested in isolation from the
//! session store and the engine.

use time::Duration;

/// Points and updated combo state produced by scoring one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanScore {
    /// Points awarded for this scan: base points times the multiplier.
    pub points: u32,
    /// Updated combo streak, which is also the multiplier applied.
    pub streak: u32,
}

/// Score a single accepted scan.
///
/// The streak grows by one for every scan that lands within
/// `combo_window` of the player's previous scan, saturating at
/// `max_multiplier`; a first scan or a gap beyond the window resets it
/// to 1. The multiplier is integral, so no rounding is involved.
pub fn score_scan(
    base_points: u32,
    previous_streak: u32,
    gap: Option<Duration>,
    combo_window: Duration,
    max_multiplier: u32,
) -> ScanScore {
    let cap = max_multiplier.max(1);
    let streak = match gap {
        Some(gap) if gap <= combo_window => (previous_streak + 1).min(cap),
        _ => 1,
    };

    ScanScore {
        points: base_points * streak,
        streak,
    }
}
