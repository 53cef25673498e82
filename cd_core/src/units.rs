//! # Unit Types
//!
//! Lightweight wrappers for the units a room program and a drawing set use.
//! Plan geometry itself is held in integer millimetres (see [`crate::geometry`])
//! so edge sharing and wall merging compare exactly; these types sit at the
//! boundaries where people type metres, square metres or square feet.
//!
//! ## Example
//!
//! ```rust
//! use cd_core::units::{Meters, Millimeters, SquareFeet, SquareMeters};
//!
//! let width = Meters(3.25);
//! let mm: Millimeters = width.into();
//! assert_eq!(mm.0, 3250);
//!
//! let area: SquareMeters = SquareFeet(100.0).into();
//! assert!((area.0 - 9.2903).abs() < 1e-3);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// Square metres per square foot
pub const M2_PER_FT2: f64 = 0.092_903_04;

// ============================================================================
// Length Units
// ============================================================================

/// Length in metres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Meters(pub f64);

/// Length in whole millimetres
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millimeters(pub i64);

impl From<Meters> for Millimeters {
    fn from(m: Meters) -> Self {
        Millimeters((m.0 * 1000.0).round() as i64)
    }
}

impl From<Millimeters> for Meters {
    fn from(mm: Millimeters) -> Self {
        Meters(mm.0 as f64 / 1000.0)
    }
}

impl Add for Millimeters {
    type Output = Millimeters;
    fn add(self, rhs: Self) -> Self::Output {
        Millimeters(self.0 + rhs.0)
    }
}

impl Sub for Millimeters {
    type Output = Millimeters;
    fn sub(self, rhs: Self) -> Self::Output {
        Millimeters(self.0 - rhs.0)
    }
}

impl Mul for Meters {
    type Output = SquareMeters;
    fn mul(self, rhs: Self) -> Self::Output {
        SquareMeters(self.0 * rhs.0)
    }
}

// ============================================================================
// Area Units
// ============================================================================

/// Area in square metres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SquareMeters(pub f64);

/// Area in square feet
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SquareFeet(pub f64);

impl From<SquareFeet> for SquareMeters {
    fn from(ft2: SquareFeet) -> Self {
        SquareMeters(ft2.0 * M2_PER_FT2)
    }
}

impl From<SquareMeters> for SquareFeet {
    fn from(m2: SquareMeters) -> Self {
        SquareFeet(m2.0 / M2_PER_FT2)
    }
}

// ============================================================================
// Conversions used by the plan geometry
// ============================================================================

/// Metres to whole millimetres
pub fn mm(m: f64) -> i64 {
    Millimeters::from(Meters(m)).0
}

/// Millimetres to metres
pub fn m(mm: i64) -> f64 {
    Meters::from(Millimeters(mm)).0
}

/// Square millimetres to square metres
pub fn mm2_to_m2(mm2: i64) -> f64 {
    mm2 as f64 / 1_000_000.0
}

/// Round to the nearest grid multiple (never below one grid step)
pub fn snap(value: i64, grid: i64) -> i64 {
    if grid <= 1 {
        return value;
    }
    let snapped = ((value as f64 / grid as f64).round() as i64) * grid;
    snapped.max(grid)
}

/// Round up to the next grid multiple
pub fn snap_up(value: i64, grid: i64) -> i64 {
    if grid <= 1 {
        return value;
    }
    ((value + grid - 1).div_euclid(grid)) * grid
}

/// Format a length in metres the way drawings label it ("3.25")
pub fn format_m(value_m: f64) -> String {
    format!("{:.2}", value_m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metre_millimetre_conversion() {
        let mm_val: Millimeters = Meters(12.345).into();
        assert_eq!(mm_val.0, 12345);
        let back: Meters = mm_val.into();
        assert!((back.0 - 12.345).abs() < 1e-9);
    }

    #[test]
    fn test_square_feet() {
        let m2: SquareMeters = SquareFeet(1000.0).into();
        assert!((m2.0 - 92.903).abs() < 0.01);
    }

    #[test]
    fn test_snapping() {
        assert_eq!(snap(3849, 100), 3800);
        assert_eq!(snap(3850, 100), 3900);
        assert_eq!(snap(20, 100), 100);
        assert_eq!(snap_up(3801, 100), 3900);
        assert_eq!(snap_up(3800, 100), 3800);
    }

    #[test]
    fn test_area_product() {
        let area = Meters(4.0) * Meters(2.5);
        assert_eq!(area, SquareMeters(10.0));
        assert!((mm2_to_m2(4_000 * 2_500) - 10.0).abs() < 1e-9);
    }
}
