//! Target pressure levels.

use crate::error::{PlevelError, PlevelResult};
use lazy_static::lazy_static;
use regex::Regex;

/// Default upper bound (Pa) on plausible surface pressures, large enough
/// for Venus-like atmospheres.
pub const DEFAULT_MAX_SURFACE_PRESSURE: f64 = 1.0e7;

/// Names of the predefined level sets.
pub const PRESET_NAMES: [&str; 3] = ["earth30", "earth25", "venus31"];

const EARTH30_LEVELS: [f64; 30] = [
    200.0, 800.0, 1400.0, 2200.0, 3200.0, 4500.0, 5900.0, 7400.0, 9100.0, 10800.0, 12600.0,
    14500.0, 16500.0, 18600.0, 20800.0, 23200.0, 25700.0, 28600.0, 31600.0, 35000.0, 38700.0,
    42800.0, 47300.0, 52200.0, 57700.0, 63800.0, 70500.0, 77900.0, 86100.0, 95200.0,
];

const EARTH25_LEVELS: [f64; 25] = [
    913.0, 1554.0, 2536.0, 3972.0, 5985.0, 8690.0, 12179.0, 16508.0, 21679.0, 27631.0, 34242.0,
    41335.0, 48691.0, 56071.0, 63236.0, 69970.0, 76097.0, 81493.0, 86090.0, 89878.0, 92898.0,
    95237.0, 97015.0, 98377.0, 99487.0,
];

const VENUS31_LEVELS: [f64; 31] = [
    8.0, 28.0, 45.0, 80.0, 156.0, 315.0, 653.0, 1350.0, 2739.0, 5408.0, 10321.0, 18968.0,
    33552.0, 57163.0, 93971.0, 149394.0, 230305.0, 345216.0, 504350.0, 719685.0, 1004691.0,
    1374048.0, 1842998.0, 2424487.0, 3126866.0, 3951858.0, 4888612.0, 5906931.0, 6951716.0,
    7938955.0, 8801669.0,
];

/// An ordered, validated set of target pressures (Pa).
#[derive(Clone, Debug, PartialEq)]
pub struct LevelSet {
    pressures: Vec<f64>,
    max_surface_pressure: f64,
}

impl LevelSet {
    /// Creates a new level set, failing with `InvalidLevelSet` unless the
    /// pressures are valid.
    pub fn new(pressures: Vec<f64>, max_surface_pressure: f64) -> PlevelResult<Self> {
        let level_set = Self {
            pressures,
            max_surface_pressure,
        };
        level_set.validate()?;
        Ok(level_set)
    }

    /// Parses a space or comma separated list of pressures.
    pub fn parse(text: &str, max_surface_pressure: f64) -> PlevelResult<Self> {
        let pressures = split_list(text)
            .map(|value| {
                value.parse::<f64>().map_err(|err| {
                    PlevelError::InvalidLevelSet(format!(
                        "Could not parse pressure level {}: {}",
                        value, err
                    ))
                })
            })
            .collect::<PlevelResult<Vec<_>>>()?;
        Self::new(pressures, max_surface_pressure)
    }

    /// Creates one of the predefined level sets.
    pub fn preset(name: &str, max_surface_pressure: f64) -> PlevelResult<Self> {
        let pressures = match name {
            "earth30" => EARTH30_LEVELS.to_vec(),
            "earth25" => EARTH25_LEVELS.to_vec(),
            "venus31" => VENUS31_LEVELS.to_vec(),
            invalid => {
                return Err(PlevelError::InvalidLevelSet(format!(
                    "Unknown level preset {} (valid presets are {})",
                    invalid,
                    PRESET_NAMES.join(", ")
                )))
            }
        };
        Self::new(pressures, max_surface_pressure)
    }

    /// Checks that the set is non-empty and that the pressures are finite,
    /// positive, below the maximum surface pressure and strictly monotonic.
    pub fn validate(&self) -> PlevelResult<()> {
        if self.pressures.is_empty() {
            return Err(PlevelError::InvalidLevelSet(
                "No pressure levels given".to_string(),
            ));
        }
        if !(self.max_surface_pressure.is_finite() && self.max_surface_pressure > 0.0) {
            return Err(PlevelError::InvalidLevelSet(format!(
                "Invalid maximum surface pressure {}",
                self.max_surface_pressure
            )));
        }
        if let Some(&pressure) = self.pressures.iter().find(|&&pressure| {
            !(pressure.is_finite() && pressure > 0.0 && pressure < self.max_surface_pressure)
        }) {
            return Err(PlevelError::InvalidLevelSet(format!(
                "Pressure level {} Pa outside the valid range (0, {}) Pa",
                pressure, self.max_surface_pressure
            )));
        }
        let is_increasing = self.pressures.windows(2).all(|pair| pair[1] > pair[0]);
        let is_decreasing = self.pressures.windows(2).all(|pair| pair[1] < pair[0]);
        if !(is_increasing || is_decreasing) {
            return Err(PlevelError::InvalidLevelSet(
                "Pressure levels are not strictly monotonic".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pressures(&self) -> &[f64] {
        &self.pressures
    }

    pub fn len(&self) -> usize {
        self.pressures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pressures.is_empty()
    }

    pub fn max_surface_pressure(&self) -> f64 {
        self.max_surface_pressure
    }
}

/// Splits a space or comma separated list into its non-empty elements.
pub fn split_list(text: &str) -> impl Iterator<Item = &str> {
    lazy_static! {
        static ref SEPARATOR_REGEX: Regex = Regex::new(r"[\s,]+").unwrap();
    }
    SEPARATOR_REGEX
        .split(text.trim())
        .filter(|element| !element.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_parsed_from_separated_lists() {
        let level_set = LevelSet::parse(" 100, 300 1000,1500 ", DEFAULT_MAX_SURFACE_PRESSURE).unwrap();
        assert_eq!(level_set.pressures(), &[100.0, 300.0, 1000.0, 1500.0]);

        let level_set = LevelSet::parse("95200 500", DEFAULT_MAX_SURFACE_PRESSURE).unwrap();
        assert_eq!(level_set.len(), 2);
    }

    #[test]
    fn invalid_levels_are_rejected() {
        for text in &["", "100 100", "100 50 200", "-5 100", "0 100", "100 nan", "100 abc", "2e7"] {
            let err = LevelSet::parse(text, DEFAULT_MAX_SURFACE_PRESSURE).unwrap_err();
            assert_eq!(err.kind(), "InvalidLevelSetError", "accepted {:?}", text);
        }
        assert!(LevelSet::parse("1e5 2e5", 1.5e5).is_err());
    }

    #[test]
    fn presets_are_valid() {
        for name in &PRESET_NAMES {
            let level_set = LevelSet::preset(name, DEFAULT_MAX_SURFACE_PRESSURE).unwrap();
            assert!(!level_set.is_empty());
        }
        assert_eq!(LevelSet::preset("earth30", 1e5).unwrap().len(), 30);
        assert_eq!(LevelSet::preset("venus31", 1e7).unwrap().pressures()[30], 8801669.0);
        assert!(LevelSet::preset("venus31", 1e5).is_err());
        assert!(LevelSet::preset("mars", 1e5).is_err());
    }
}
