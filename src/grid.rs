//! Native vertical grids of atmospheric model output.

use crate::{
    error::{PlevelError, PlevelResult},
    io::dataset::{Attributes, DatasetReader},
};

/// Name of the full-level (layer midpoint) vertical dimension.
pub const FULL_LEVEL_NAME: &str = "pfull";
/// Name of the half-level (layer interface) vertical dimension.
pub const HALF_LEVEL_NAME: &str = "phalf";
/// Name of the variable holding the pressure coefficients of a hybrid grid.
pub const A_COEFFICIENT_NAME: &str = "pk";
/// Name of the variable holding the surface pressure coefficients of a hybrid grid.
pub const B_COEFFICIENT_NAME: &str = "bk";
/// Name of the surface pressure field.
pub const SURFACE_PRESSURE_NAME: &str = "ps";

/// Whether values live at layer midpoints or layer interfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelKind {
    Full,
    Half,
}

impl LevelKind {
    /// Returns the kind of level corresponding to the given dimension name, if any.
    pub fn from_dimension_name(name: &str) -> Option<Self> {
        match name {
            FULL_LEVEL_NAME => Some(Self::Full),
            HALF_LEVEL_NAME => Some(Self::Half),
            _ => None,
        }
    }

    pub fn dimension_name(&self) -> &'static str {
        match self {
            Self::Full => FULL_LEVEL_NAME,
            Self::Half => HALF_LEVEL_NAME,
        }
    }
}

/// Order in which levels are stored in a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelOrder {
    TopToBottom,
    BottomToTop,
}

/// Coefficients `A_k` (Pa) and `B_k` of a hybrid sigma-pressure grid,
/// held in top-to-bottom order.
#[derive(Clone, Debug, PartialEq)]
pub struct HybridCoefficients {
    a: Vec<f64>,
    b: Vec<f64>,
    min_surface_pressure: f64,
    stored_order: LevelOrder,
}

impl HybridCoefficients {
    pub fn a(&self) -> &[f64] {
        &self.a
    }

    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Smallest surface pressure for which the half-level pressures are
    /// non-decreasing from top to bottom.
    pub fn min_surface_pressure(&self) -> f64 {
        self.min_surface_pressure
    }

    fn half_level_pressure(&self, k: usize, surface_pressure: f64) -> f64 {
        self.a[k] + self.b[k] * surface_pressure
    }
}

/// Fixed full and optional half level pressures (Pa), held in top-to-bottom order.
#[derive(Clone, Debug, PartialEq)]
pub struct PressureList {
    full: Vec<f64>,
    half: Option<Vec<f64>>,
    stored_order: LevelOrder,
}

impl PressureList {
    pub fn full(&self) -> &[f64] {
        &self.full
    }

    pub fn half(&self) -> Option<&[f64]> {
        self.half.as_deref()
    }
}

/// The native vertical coordinate of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub enum VerticalGrid {
    HybridSigmaPressure(HybridCoefficients),
    ExplicitPressureList(PressureList),
}

impl VerticalGrid {
    /// Creates a hybrid sigma-pressure grid from half-level coefficients
    /// given in stored order.
    ///
    /// The storage order is detected from `b` (or from `a` if `b` is
    /// constant) and the coefficients are reordered from top to bottom.
    /// `b` must be monotonic, and wherever `a` decreases towards the
    /// surface, `b` must increase enough to keep the pressures monotonic
    /// for sufficiently large surface pressures.
    pub fn hybrid(mut a: Vec<f64>, mut b: Vec<f64>) -> PlevelResult<Self> {
        if a.len() != b.len() {
            return Err(PlevelError::InvalidGrid(format!(
                "Coefficient lengths differ ({} values for {}, {} for {})",
                a.len(),
                A_COEFFICIENT_NAME,
                b.len(),
                B_COEFFICIENT_NAME
            )));
        }
        if a.len() < 2 {
            return Err(PlevelError::InvalidGrid(format!(
                "At least two half levels required, got {}",
                a.len()
            )));
        }
        if !a.iter().chain(b.iter()).all(|value| value.is_finite()) {
            return Err(PlevelError::InvalidGrid(
                "Hybrid coefficients contain non-finite values".to_string(),
            ));
        }

        let n = b.len();
        let stored_order = if b[n - 1] != b[0] {
            order_from_ends(b[0], b[n - 1])
        } else if a[n - 1] != a[0] {
            order_from_ends(a[0], a[n - 1])
        } else {
            return Err(PlevelError::InvalidGrid(
                "Hybrid coefficients describe a single pressure".to_string(),
            ));
        };
        if stored_order == LevelOrder::BottomToTop {
            a.reverse();
            b.reverse();
        }

        let mut min_surface_pressure: f64 = 0.0;
        for k in 0..n - 1 {
            let delta_a = a[k + 1] - a[k];
            let delta_b = b[k + 1] - b[k];
            if delta_b < 0.0 {
                return Err(PlevelError::InvalidGrid(format!(
                    "{} is not monotonic (between half levels {} and {})",
                    B_COEFFICIENT_NAME,
                    k,
                    k + 1
                )));
            }
            if delta_a < 0.0 {
                if delta_b == 0.0 {
                    return Err(PlevelError::InvalidGrid(format!(
                        "Pressure decreases downward between half levels {} and {} for any surface pressure",
                        k,
                        k + 1
                    )));
                }
                min_surface_pressure = min_surface_pressure.max(-delta_a / delta_b);
            }
        }

        Ok(Self::HybridSigmaPressure(HybridCoefficients {
            a,
            b,
            min_surface_pressure,
            stored_order,
        }))
    }

    /// Creates a grid with fixed full level pressures and optional half
    /// level pressures, given in stored order.
    pub fn explicit(mut full: Vec<f64>, half: Option<Vec<f64>>) -> PlevelResult<Self> {
        let stored_order = validate_pressure_list(FULL_LEVEL_NAME, &full)?;
        if stored_order == LevelOrder::BottomToTop {
            full.reverse();
        }
        let half = match half {
            Some(mut half) => {
                if half.len() != full.len() + 1 {
                    return Err(PlevelError::InvalidGrid(format!(
                        "Expected {} half levels for {} full levels, got {}",
                        full.len() + 1,
                        full.len(),
                        half.len()
                    )));
                }
                if validate_pressure_list(HALF_LEVEL_NAME, &half)? != stored_order {
                    return Err(PlevelError::InvalidGrid(
                        "Full and half levels are stored in different orders".to_string(),
                    ));
                }
                if stored_order == LevelOrder::BottomToTop {
                    half.reverse();
                }
                Some(half)
            }
            None => None,
        };
        Ok(Self::ExplicitPressureList(PressureList {
            full,
            half,
            stored_order,
        }))
    }

    /// Resolves the vertical grid of the given dataset.
    ///
    /// Hybrid coefficients take precedence over explicit pressure
    /// coordinates. Fails with `InvalidGrid` if neither is present.
    pub fn from_dataset(reader: &dyn DatasetReader) -> PlevelResult<Self> {
        let schema = reader.schema();
        match (
            schema.variable(A_COEFFICIENT_NAME),
            schema.variable(B_COEFFICIENT_NAME),
        ) {
            (Some(a_info), Some(_)) => {
                let factor = pressure_unit_factor(a_info.attributes());
                let a = read_vector(reader, A_COEFFICIENT_NAME)?
                    .into_iter()
                    .map(|value| value * factor)
                    .collect();
                let b = read_vector(reader, B_COEFFICIENT_NAME)?;
                Self::hybrid(a, b)
            }
            (Some(_), None) | (None, Some(_)) => Err(PlevelError::InvalidGrid(format!(
                "Only one of the hybrid coefficients {} and {} present in {}",
                A_COEFFICIENT_NAME,
                B_COEFFICIENT_NAME,
                reader.path().display()
            ))),
            (None, None) => match schema.variable(FULL_LEVEL_NAME) {
                Some(full_info) => {
                    let factor = pressure_unit_factor(full_info.attributes());
                    let full = read_vector(reader, FULL_LEVEL_NAME)?
                        .into_iter()
                        .map(|value| value * factor)
                        .collect();
                    let half = match schema.variable(HALF_LEVEL_NAME) {
                        Some(half_info) => {
                            let factor = pressure_unit_factor(half_info.attributes());
                            Some(
                                read_vector(reader, HALF_LEVEL_NAME)?
                                    .into_iter()
                                    .map(|value| value * factor)
                                    .collect(),
                            )
                        }
                        None => None,
                    };
                    Self::explicit(full, half)
                }
                None => Err(PlevelError::InvalidGrid(format!(
                    "Neither hybrid coefficients ({}, {}) nor pressure coordinates ({}) present in {}",
                    A_COEFFICIENT_NAME,
                    B_COEFFICIENT_NAME,
                    FULL_LEVEL_NAME,
                    reader.path().display()
                ))),
            },
        }
    }

    /// Whether column pressures depend on the surface pressure.
    pub fn requires_surface_pressure(&self) -> bool {
        matches!(self, Self::HybridSigmaPressure(_))
    }

    /// Order in which the levels were stored in the dataset.
    pub fn stored_order(&self) -> LevelOrder {
        match self {
            Self::HybridSigmaPressure(coefficients) => coefficients.stored_order,
            Self::ExplicitPressureList(pressures) => pressures.stored_order,
        }
    }

    /// Number of levels of the given kind, or `None` if the grid does not
    /// define such levels.
    pub fn n_levels(&self, kind: LevelKind) -> Option<usize> {
        match (self, kind) {
            (Self::HybridSigmaPressure(coefficients), LevelKind::Half) => Some(coefficients.a.len()),
            (Self::HybridSigmaPressure(coefficients), LevelKind::Full) => {
                Some(coefficients.a.len() - 1)
            }
            (Self::ExplicitPressureList(pressures), LevelKind::Full) => Some(pressures.full.len()),
            (Self::ExplicitPressureList(pressures), LevelKind::Half) => {
                pressures.half.as_ref().map(Vec::len)
            }
        }
    }

    /// Highest pressure of the grid when the surface pressure is not involved.
    pub fn bottom_pressure(&self) -> Option<f64> {
        match self {
            Self::HybridSigmaPressure(_) => None,
            Self::ExplicitPressureList(pressures) => pressures
                .half
                .as_ref()
                .and_then(|half| half.last())
                .or_else(|| pressures.full.last())
                .copied(),
        }
    }

    /// Checks that the given surface pressure yields a valid column profile.
    pub fn validate_surface_pressure(&self, surface_pressure: f64) -> PlevelResult<()> {
        if !(surface_pressure.is_finite() && surface_pressure > 0.0) {
            return Err(PlevelError::InvalidGrid(format!(
                "Invalid surface pressure {}",
                surface_pressure
            )));
        }
        if let Self::HybridSigmaPressure(coefficients) = self {
            if surface_pressure < coefficients.min_surface_pressure {
                return Err(PlevelError::InvalidGrid(format!(
                    "Surface pressure {} Pa is below {} Pa, the smallest value giving monotonic column pressures",
                    surface_pressure, coefficients.min_surface_pressure
                )));
            }
        }
        Ok(())
    }

    /// Returns the profile of levels of the given kind.
    pub fn profile(&self, kind: LevelKind) -> PlevelResult<ColumnProfile<'_>> {
        let n_levels = self.n_levels(kind).ok_or_else(|| {
            PlevelError::InvalidGrid(format!(
                "Grid has no {} levels",
                kind.dimension_name()
            ))
        })?;
        Ok(ColumnProfile {
            grid: self,
            kind,
            n_levels,
        })
    }

    /// Computes the top-to-bottom pressures (Pa) of the levels of the given
    /// kind for a column with the given surface pressure.
    pub fn column_pressures(&self, kind: LevelKind, surface_pressure: f64) -> PlevelResult<Vec<f64>> {
        let profile = self.profile(kind)?;
        if self.requires_surface_pressure() {
            self.validate_surface_pressure(surface_pressure)?;
        }
        let mut pressures = vec![0.0; profile.n_levels()];
        profile.fill(surface_pressure, &mut pressures);
        Ok(pressures)
    }
}

/// Levels of one kind of a vertical grid, for computing column pressures.
#[derive(Clone, Copy, Debug)]
pub struct ColumnProfile<'a> {
    grid: &'a VerticalGrid,
    kind: LevelKind,
    n_levels: usize,
}

impl<'a> ColumnProfile<'a> {
    pub fn kind(&self) -> LevelKind {
        self.kind
    }

    pub fn n_levels(&self) -> usize {
        self.n_levels
    }

    /// Writes the top-to-bottom pressures of the column with the given
    /// (validated) surface pressure into `pressures`.
    ///
    /// # Panics
    ///
    /// If `pressures` does not have one element per level.
    pub fn fill(&self, surface_pressure: f64, pressures: &mut [f64]) {
        assert_eq!(pressures.len(), self.n_levels, "Pressure buffer has wrong length");
        match (self.grid, self.kind) {
            (VerticalGrid::HybridSigmaPressure(coefficients), LevelKind::Half) => {
                for (k, pressure) in pressures.iter_mut().enumerate() {
                    *pressure = coefficients.half_level_pressure(k, surface_pressure);
                }
            }
            (VerticalGrid::HybridSigmaPressure(coefficients), LevelKind::Full) => {
                let mut upper = coefficients.half_level_pressure(0, surface_pressure);
                for (k, pressure) in pressures.iter_mut().enumerate() {
                    let lower = coefficients.half_level_pressure(k + 1, surface_pressure);
                    *pressure = full_level_pressure(upper, lower);
                    upper = lower;
                }
            }
            (VerticalGrid::ExplicitPressureList(list), LevelKind::Full) => {
                pressures.copy_from_slice(&list.full);
            }
            (VerticalGrid::ExplicitPressureList(list), LevelKind::Half) => {
                if let Some(half) = list.half.as_ref() {
                    pressures.copy_from_slice(half);
                }
            }
        }
    }
}

/// Relative thickness below which a layer is treated as having zero
/// thickness when computing its full-level pressure.
const THIN_LAYER_TOLERANCE: f64 = 1e-6;

/// Computes the full-level pressure of a layer from the pressures at its
/// upper and lower interfaces, following Simmons and Burridge (1981):
///
/// `ln p = (p_l ln p_l - p_u ln p_u) / (p_l - p_u) - 1`
///
/// A layer bounded by zero pressure above gets `p_l / e`. Layers of
/// vanishing thickness get the interface pressure.
pub fn full_level_pressure(upper: f64, lower: f64) -> f64 {
    let (thin, thick) = if upper <= lower {
        (upper, lower)
    } else {
        (lower, upper)
    };
    if thick <= 0.0 || thick - thin <= THIN_LAYER_TOLERANCE * thick {
        0.5 * (upper + lower)
    } else if thin <= 0.0 {
        thick / std::f64::consts::E
    } else {
        ((thick * thick.ln() - thin * thin.ln()) / (thick - thin) - 1.0).exp()
    }
}

/// Returns the factor converting pressures with the unit in the given
/// attributes to Pa.
pub fn pressure_unit_factor(attributes: &Attributes) -> f64 {
    match attributes
        .get("units")
        .and_then(|units| units.as_text())
        .map(|units| units.trim().to_lowercase())
        .as_deref()
    {
        Some("hpa") | Some("mb") | Some("mbar") | Some("millibar") | Some("millibars") => 100.0,
        Some("kpa") => 1000.0,
        _ => 1.0,
    }
}

fn order_from_ends(first: f64, last: f64) -> LevelOrder {
    if last >= first {
        LevelOrder::TopToBottom
    } else {
        LevelOrder::BottomToTop
    }
}

fn validate_pressure_list(name: &str, pressures: &[f64]) -> PlevelResult<LevelOrder> {
    if pressures.is_empty() {
        return Err(PlevelError::InvalidGrid(format!("No {} levels", name)));
    }
    if !pressures
        .iter()
        .all(|pressure| pressure.is_finite() && *pressure >= 0.0)
    {
        return Err(PlevelError::InvalidGrid(format!(
            "{} contains negative or non-finite pressures",
            name
        )));
    }
    let order = order_from_ends(pressures[0], pressures[pressures.len() - 1]);
    let is_monotonic = pressures.windows(2).all(|pair| match order {
        LevelOrder::TopToBottom => pair[1] >= pair[0],
        LevelOrder::BottomToTop => pair[1] <= pair[0],
    });
    if is_monotonic {
        Ok(order)
    } else {
        Err(PlevelError::InvalidGrid(format!("{} is not monotonic", name)))
    }
}

fn read_vector(reader: &dyn DatasetReader, name: &str) -> PlevelResult<Vec<f64>> {
    let values = reader
        .read_variable(name)
        .map_err(|err| PlevelError::io(reader.path(), err))?;
    if values.ndim() != 1 {
        return Err(PlevelError::InvalidGrid(format!(
            "{} has {} dimensions, expected 1",
            name,
            values.ndim()
        )));
    }
    Ok(values.iter().copied().collect())
}
