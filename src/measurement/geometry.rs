//! Sample geometry and conductivity derivation.

use crate::error::{AppResult, DmmError};

/// Sample geometry needed for conductivity:
/// distance between probes and cross-sectional area, both in SI units.
///
/// Construction validates both values; an invalid geometry never exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    length_m: f64,
    area_m2: f64,
}

impl Geometry {
    /// Validate and build a geometry. Both values must be strictly positive.
    pub fn new(length_m: f64, area_m2: f64) -> AppResult<Self> {
        if !(length_m > 0.0) {
            return Err(DmmError::InvalidParameter(
                "length_m must be positive".to_string(),
            ));
        }
        if !(area_m2 > 0.0) {
            return Err(DmmError::InvalidParameter(
                "area_m2 must be positive".to_string(),
            ));
        }
        Ok(Self { length_m, area_m2 })
    }

    /// Probe spacing / sample length in meters.
    pub fn length_m(&self) -> f64 {
        self.length_m
    }

    /// Cross-sectional area in square meters.
    pub fn area_m2(&self) -> f64 {
        self.area_m2
    }
}

/// Compute electrical conductivity sigma (S/m) from resistance and geometry:
/// `sigma = L / (R * A)`.
///
/// Returns `Ok(None)` when geometry is missing; that is the expected path
/// when the caller did not supply one, not an error. A resistance of zero or
/// below is physically nonsensical here and is rejected rather than silently
/// producing an infinite or negative conductivity.
pub fn conductivity_s_per_m(
    resistance_ohm: f64,
    geometry: Option<&Geometry>,
) -> AppResult<Option<f64>> {
    let Some(geometry) = geometry else {
        return Ok(None);
    };
    if !(resistance_ohm > 0.0) {
        return Err(DmmError::InvalidParameter(
            "resistance_ohm must be positive to compute conductivity".to_string(),
        ));
    }
    Ok(Some(
        geometry.length_m / (resistance_ohm * geometry.area_m2),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_validation() {
        assert!(Geometry::new(0.0, 1.0).is_err());
        assert!(Geometry::new(-0.01, 1.0).is_err());
        assert!(Geometry::new(1.0, 0.0).is_err());
        assert!(Geometry::new(1.0, -1e-6).is_err());
        assert!(Geometry::new(f64::NAN, 1.0).is_err());
        assert!(Geometry::new(0.02, 1e-6).is_ok());
    }

    #[test]
    fn test_conductivity_calculation() {
        // 20 mm length, 1 mm^2 area
        let geometry = Geometry::new(0.02, 1e-6).unwrap();
        let sigma = conductivity_s_per_m(10.0, Some(&geometry)).unwrap().unwrap();
        assert!((sigma - 2000.0).abs() / 2000.0 < 1e-9);
    }

    #[test]
    fn test_conductivity_none_without_geometry() {
        assert_eq!(conductivity_s_per_m(10.0, None).unwrap(), None);
        // even nonsensical resistances are fine when there is no geometry
        assert_eq!(conductivity_s_per_m(-5.0, None).unwrap(), None);
    }

    #[test]
    fn test_conductivity_rejects_nonpositive_resistance() {
        let geometry = Geometry::new(0.02, 1e-6).unwrap();
        assert!(conductivity_s_per_m(0.0, Some(&geometry)).is_err());
        assert!(conductivity_s_per_m(-10.0, Some(&geometry)).is_err());
    }
}
