//! Interpolation of a single dataset onto pressure levels.

use crate::{
    batch::InterruptFlag,
    error::{IoResultExt, PlevelError, PlevelResult},
    grid::{self, LevelKind, LevelOrder, VerticalGrid},
    interpolation::{is_missing, MaskingPolicy, VerticalInterpolator, MISSING_VALUE},
    io::{
        dataset::{
            self, AttributeValue, Attributes, DatasetFormat, DatasetReader, DatasetSchema,
            DatasetWriter, Dimension, Precision, VariableInfo, TIME_DIMENSION_NAME,
        },
        utils::AtomicOutputPath,
        Verbosity,
    },
    io_result,
    levels::{self, LevelSet},
};
use atomic_counter::{AtomicCounter, RelaxedCounter};
use ndarray::prelude::*;
use rayon::prelude::*;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Which fields of a dataset to interpolate.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldSelection {
    Named(Vec<String>),
    AllOnNativeLevels,
}

impl FieldSelection {
    /// Creates a selection from a space or comma separated list of names.
    pub fn from_list(text: &str) -> Self {
        Self::Named(levels::split_list(text).map(String::from).collect())
    }
}

/// One vertical profile of a field, identified by its time, latitude and
/// longitude index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    pub time: usize,
    pub lat: usize,
    pub lon: usize,
}

/// Summary of a completed interpolation job.
#[derive(Clone, Debug, PartialEq)]
pub struct JobReport {
    pub interpolated_fields: Vec<String>,
    pub passthrough_variables: Vec<String>,
    pub n_columns: usize,
    pub n_masked_values: usize,
}

/// Result of running an interpolation job.
#[derive(Clone, Debug, PartialEq)]
pub enum JobOutcome {
    /// The output already existed, so nothing was done.
    Skipped,
    Completed(JobReport),
}

/// Interpolation of the fields of one input dataset onto a set of pressure
/// levels, producing one output dataset.
#[derive(Clone, Debug)]
pub struct InterpolationJob {
    input_path: PathBuf,
    output_path: PathBuf,
    fields: FieldSelection,
    level_set: Arc<LevelSet>,
    masking: MaskingPolicy,
}

/// Layout of a field to interpolate.
#[derive(Clone, Debug)]
struct FieldLayout {
    name: String,
    kind: LevelKind,
    dimensions: Vec<String>,
    shape: [usize; 4],
    missing_values: Vec<f64>,
}

enum SurfacePressure {
    Field(Array3<f64>),
    Uniform(f64),
}

impl InterpolationJob {
    pub fn new<P, Q>(
        input_path: P,
        output_path: Q,
        fields: FieldSelection,
        level_set: Arc<LevelSet>,
        masking: MaskingPolicy,
    ) -> Self
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        Self {
            input_path: input_path.as_ref().to_path_buf(),
            output_path: output_path.as_ref().to_path_buf(),
            fields,
            level_set,
            masking,
        }
    }

    pub fn input_path(&self) -> &Path {
        self.input_path.as_path()
    }

    pub fn output_path(&self) -> &Path {
        self.output_path.as_path()
    }

    pub fn fields(&self) -> &FieldSelection {
        &self.fields
    }

    pub fn level_set(&self) -> &LevelSet {
        self.level_set.as_ref()
    }

    pub fn masking(&self) -> MaskingPolicy {
        self.masking
    }

    /// Interpolates the selected fields of the input dataset onto the
    /// pressure levels and writes the result to the output path.
    ///
    /// Nothing is done if the output path already exists. The output is
    /// written to a temporary file that only replaces the output path once
    /// everything has been written, so a failed or interrupted job leaves
    /// no output behind.
    pub fn run<I: VerticalInterpolator>(
        &self,
        interpolator: &I,
        verbosity: &Verbosity,
        interrupt: &InterruptFlag,
    ) -> PlevelResult<JobOutcome> {
        if self.output_path.exists() {
            if verbosity.print_messages() {
                println!("Skipping {}: output exists", self.output_path.display());
            }
            return Ok(JobOutcome::Skipped);
        }
        let output_format = DatasetFormat::from_path(&self.output_path)?;

        if verbosity.print_messages() {
            println!("Reading {}", self.input_path.display());
        }
        let reader = dataset::open_dataset(&self.input_path)?;
        let reader = reader.as_ref();

        let grid = VerticalGrid::from_dataset(reader)?;
        let fields = self.resolve_fields(reader, &grid, verbosity)?;
        let surface_pressures = read_surface_pressure(reader, &grid, &fields)?;
        let (output_schema, passthrough_variables) =
            self.create_output_schema(reader.schema(), &fields);

        let atomic_output_path =
            AtomicOutputPath::new(&self.output_path).with_path(&self.output_path)?;
        let temporary_path = atomic_output_path.temporary_path().to_path_buf();
        let mut writer = dataset::create_dataset(&temporary_path, output_format)?;
        writer.define(&output_schema).with_path(&temporary_path)?;

        for name in &passthrough_variables {
            let values = reader.read_variable(name).with_path(reader.path())?;
            writer
                .write_variable(name, values.view())
                .with_path(&temporary_path)?;
        }
        writer
            .write_variable(
                grid::FULL_LEVEL_NAME,
                ArrayView1::from(self.level_set.pressures()).into_dyn(),
            )
            .with_path(&temporary_path)?;

        let n_masked_values = RelaxedCounter::new(0);
        let mut n_columns = 0;
        for field in &fields {
            interrupt.check()?;
            if verbosity.print_messages() {
                println!(
                    "Interpolating {} onto {} pressure levels",
                    field.name,
                    self.level_set.len()
                );
            }
            n_columns += self.interpolate_field(
                interpolator,
                reader,
                writer.as_mut(),
                &temporary_path,
                &grid,
                field,
                &surface_pressures,
                &n_masked_values,
                verbosity,
                interrupt,
            )?;
        }

        writer.finish().with_path(&temporary_path)?;
        interrupt.check()?;
        atomic_output_path
            .perform_replace()
            .with_path(&self.output_path)?;

        if verbosity.print_messages() {
            println!("Wrote {}", self.output_path.display());
        }

        Ok(JobOutcome::Completed(JobReport {
            interpolated_fields: fields.into_iter().map(|field| field.name).collect(),
            passthrough_variables,
            n_columns,
            n_masked_values: n_masked_values.get(),
        }))
    }

    /// Finds the layouts of the selected fields. Named variables without a
    /// native vertical dimension are left to be copied unchanged.
    fn resolve_fields(
        &self,
        reader: &dyn DatasetReader,
        grid: &VerticalGrid,
        verbosity: &Verbosity,
    ) -> PlevelResult<Vec<FieldLayout>> {
        let schema = reader.schema();
        let names: Vec<String> = match &self.fields {
            FieldSelection::Named(names) => {
                let mut included = HashSet::new();
                let mut names_on_levels = Vec::with_capacity(names.len());
                for name in names.iter().filter(|name| included.insert(name.as_str())) {
                    match schema.variable(name) {
                        Some(variable) if !has_native_vertical_dimension(variable) => {
                            if verbosity.print_messages() {
                                println!(
                                    "Note: {} has no native vertical dimension, copying it unchanged",
                                    name
                                );
                            }
                        }
                        _ => names_on_levels.push(name.clone()),
                    }
                }
                names_on_levels
            }
            FieldSelection::AllOnNativeLevels => schema
                .variables()
                .iter()
                .filter(|variable| is_on_native_levels(variable))
                .map(|variable| variable.name().to_string())
                .collect(),
        };
        if names.is_empty() {
            return Err(PlevelError::NoFieldsToInterpolate {
                path: reader.path().to_path_buf(),
            });
        }
        names
            .into_iter()
            .map(|name| FieldLayout::new(reader, grid, name))
            .collect()
    }

    fn create_output_schema(
        &self,
        input_schema: &DatasetSchema,
        fields: &[FieldLayout],
    ) -> (DatasetSchema, Vec<String>) {
        let mut schema = DatasetSchema::new();
        let n_levels = self.level_set.len();

        let mut has_level_dimension = false;
        for dimension in input_schema.dimensions() {
            match LevelKind::from_dimension_name(dimension.name()) {
                Some(LevelKind::Full) => {
                    schema.add_dimension(Dimension::new(grid::FULL_LEVEL_NAME, n_levels, false));
                    has_level_dimension = true;
                }
                Some(LevelKind::Half) => {}
                None => schema.add_dimension(dimension.clone()),
            }
        }
        if !has_level_dimension {
            schema.add_dimension(Dimension::new(grid::FULL_LEVEL_NAME, n_levels, false));
        }

        let mut passthrough_variables = Vec::new();
        for variable in input_schema.variables() {
            let name = variable.name();
            if has_native_vertical_dimension(variable)
                || name == grid::A_COEFFICIENT_NAME
                || name == grid::B_COEFFICIENT_NAME
                || fields.iter().any(|field| field.name == name)
            {
                continue;
            }
            schema.add_variable(variable.clone());
            passthrough_variables.push(name.to_string());
        }

        let level_attributes: Attributes = [
            ("long_name", "pressure"),
            ("units", "Pa"),
            ("positive", "down"),
            ("axis", "Z"),
            ("cartesian_axis", "Z"),
        ]
        .into_iter()
        .collect();
        schema.add_variable(VariableInfo::new(
            grid::FULL_LEVEL_NAME,
            vec![grid::FULL_LEVEL_NAME.to_string()],
            level_attributes,
            Precision::Double,
        ));

        for field in fields {
            let mut dimensions = field.dimensions.clone();
            dimensions[1] = grid::FULL_LEVEL_NAME.to_string();
            let mut variable = match input_schema.variable(&field.name) {
                Some(variable) => variable.with_dimensions(dimensions, Precision::Single),
                None => VariableInfo::new(
                    field.name.as_str(),
                    dimensions,
                    Attributes::new(),
                    Precision::Single,
                ),
            };
            variable
                .attributes_mut()
                .set("missing_value", MISSING_VALUE);
            variable.attributes_mut().set("_FillValue", MISSING_VALUE);
            schema.add_variable(variable);
        }

        *schema.attributes_mut() = input_schema.attributes().clone();
        let entry = format!(
            "{}: plevel interpolated {} from {} onto {} pressure levels",
            chrono::Local::now().format("%a %b %e %H:%M:%S %Y"),
            fields
                .iter()
                .map(|field| field.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.input_path.display(),
            n_levels
        );
        let history = match schema
            .attributes()
            .get("history")
            .and_then(AttributeValue::as_text)
        {
            Some(history) if !history.is_empty() => format!("{}\n{}", history, entry),
            _ => entry,
        };
        schema.attributes_mut().set("history", history);

        (schema, passthrough_variables)
    }

    #[allow(clippy::too_many_arguments)]
    fn interpolate_field<I: VerticalInterpolator>(
        &self,
        interpolator: &I,
        reader: &dyn DatasetReader,
        writer: &mut dyn DatasetWriter,
        temporary_path: &Path,
        grid: &VerticalGrid,
        field: &FieldLayout,
        surface_pressures: &SurfacePressure,
        n_masked_values: &RelaxedCounter,
        verbosity: &Verbosity,
        interrupt: &InterruptFlag,
    ) -> PlevelResult<usize> {
        let profile = grid.profile(field.kind)?;
        let is_reversed = grid.stored_order() == LevelOrder::BottomToTop;
        let target_pressures = self.level_set.pressures();
        let n_targets = target_pressures.len();
        let [n_times, n_levels, n_lats, n_lons] = field.shape;
        let n_columns_per_slab = n_lats * n_lons;

        let progress_bar = verbosity.create_progress_bar(n_times * n_columns_per_slab);
        let mut output_buffer = vec![MISSING_VALUE; n_columns_per_slab * n_targets];

        for time in 0..n_times {
            interrupt.check()?;

            let native_values = reader
                .read_variable_at_time(&field.name, time)
                .with_path(reader.path())?
                .into_dimensionality::<Ix3>()
                .map_err(|err| PlevelError::UnsupportedField {
                    name: field.name.clone(),
                    reason: err.to_string(),
                })?;

            output_buffer
                .par_chunks_mut(n_targets)
                .enumerate()
                .for_each_init(
                    || (vec![0.0; n_levels], vec![0.0; n_levels]),
                    |(column_pressures, column_values), (column_idx, output_values)| {
                        let column = Column {
                            time,
                            lat: column_idx / n_lons,
                            lon: column_idx % n_lons,
                        };
                        let surface_pressure = surface_pressures.at(&column);
                        profile.fill(surface_pressure, column_pressures);

                        for (k, value) in column_values.iter_mut().enumerate() {
                            let stored_k = if is_reversed { n_levels - 1 - k } else { k };
                            let native_value = native_values[[stored_k, column.lat, column.lon]];
                            *value = if field.is_missing(native_value) {
                                MISSING_VALUE
                            } else {
                                native_value
                            };
                        }

                        n_masked_values.add(interpolator.interp_column(
                            column_pressures,
                            column_values,
                            target_pressures,
                            surface_pressure,
                            self.masking,
                            output_values,
                        ));
                        progress_bar.inc(1);
                    },
                );

            // Columns are stored contiguously, so the level axis is moved to the front
            let output_values = io_result!(ArrayView3::from_shape(
                (n_lats, n_lons, n_targets),
                output_buffer.as_slice()
            ))
            .with_path(temporary_path)?
            .permuted_axes([2, 0, 1]);

            writer
                .write_variable_at_time(&field.name, time, output_values.into_dyn())
                .with_path(temporary_path)?;
        }
        progress_bar.finish_and_clear();

        Ok(n_times * n_columns_per_slab)
    }
}

impl FieldLayout {
    fn new(reader: &dyn DatasetReader, grid: &VerticalGrid, name: String) -> PlevelResult<Self> {
        let schema = reader.schema();
        let variable = schema
            .variable(&name)
            .ok_or_else(|| PlevelError::MissingField {
                name: name.clone(),
                path: reader.path().to_path_buf(),
            })?;
        let unsupported = |reason: String| PlevelError::UnsupportedField {
            name: name.clone(),
            reason,
        };

        let dimensions = variable.dimensions().to_vec();
        if dimensions.len() != 4 || dimensions[0] != TIME_DIMENSION_NAME {
            return Err(unsupported(format!(
                "dimensions ({}) are not (time, level, lat, lon)",
                dimensions.join(", ")
            )));
        }
        let kind = LevelKind::from_dimension_name(&dimensions[1]).ok_or_else(|| {
            unsupported(format!(
                "dimension {} is not a native vertical dimension",
                dimensions[1]
            ))
        })?;

        let shape = schema.shape_of(&name).with_path(reader.path())?;
        let shape = [shape[0], shape[1], shape[2], shape[3]];
        match grid.n_levels(kind) {
            Some(n_levels) if n_levels == shape[1] => {}
            Some(n_levels) => {
                return Err(unsupported(format!(
                    "field has {} levels but the grid has {}",
                    shape[1], n_levels
                )))
            }
            None => {
                return Err(unsupported(format!(
                    "grid has no {} levels",
                    kind.dimension_name()
                )))
            }
        }

        let missing_values = ["missing_value", "_FillValue"]
            .iter()
            .filter_map(|attribute_name| variable.attributes().get(attribute_name))
            .flat_map(|value| match value {
                AttributeValue::Floats(values) => values.clone(),
                AttributeValue::Integers(values) => values.iter().map(|&v| v as f64).collect(),
                AttributeValue::Text(_) => Vec::new(),
            })
            .collect();

        Ok(Self {
            name,
            kind,
            dimensions,
            shape,
            missing_values,
        })
    }

    fn is_missing(&self, value: f64) -> bool {
        is_missing(value) || self.missing_values.contains(&value)
    }
}

impl SurfacePressure {
    fn at(&self, column: &Column) -> f64 {
        match self {
            Self::Field(values) => values[[column.time, column.lat, column.lon]],
            Self::Uniform(value) => *value,
        }
    }
}

fn has_native_vertical_dimension(variable: &VariableInfo) -> bool {
    variable
        .dimensions()
        .iter()
        .any(|dimension| LevelKind::from_dimension_name(dimension).is_some())
}

fn is_on_native_levels(variable: &VariableInfo) -> bool {
    let dimensions = variable.dimensions();
    dimensions.len() == 4
        && dimensions[0] == TIME_DIMENSION_NAME
        && LevelKind::from_dimension_name(&dimensions[1]).is_some()
}

fn read_surface_pressure(
    reader: &dyn DatasetReader,
    grid: &VerticalGrid,
    fields: &[FieldLayout],
) -> PlevelResult<SurfacePressure> {
    let variable = match reader.schema().variable(grid::SURFACE_PRESSURE_NAME) {
        Some(variable) => variable,
        None if grid.requires_surface_pressure() => {
            return Err(PlevelError::MissingCoordinate {
                name: grid::SURFACE_PRESSURE_NAME.to_string(),
                path: reader.path().to_path_buf(),
            })
        }
        None => {
            return grid
                .bottom_pressure()
                .map(SurfacePressure::Uniform)
                .ok_or_else(|| {
                    PlevelError::InvalidGrid("Grid has no bottom pressure".to_string())
                })
        }
    };

    let factor = grid::pressure_unit_factor(variable.attributes());
    let mut values = reader
        .read_variable(grid::SURFACE_PRESSURE_NAME)
        .with_path(reader.path())?
        .into_dimensionality::<Ix3>()
        .map_err(|_| {
            PlevelError::InvalidGrid(format!(
                "{} does not have dimensions (time, lat, lon)",
                grid::SURFACE_PRESSURE_NAME
            ))
        })?;
    if factor != 1.0 {
        values.mapv_inplace(|value| value * factor);
    }

    for field in fields {
        let [n_times, _, n_lats, n_lons] = field.shape;
        if values.dim() != (n_times, n_lats, n_lons) {
            return Err(PlevelError::InvalidGrid(format!(
                "Shape {:?} of {} does not match the columns of {}",
                values.shape(),
                grid::SURFACE_PRESSURE_NAME,
                field.name
            )));
        }
    }
    for &value in values.iter() {
        grid.validate_surface_pressure(value)?;
    }
    Ok(SurfacePressure::Field(values))
}
