//! Format-neutral representation of gridded model output.

#[cfg(feature = "netcdf")]
pub mod netcdf;

#[cfg(feature = "pickle")]
pub mod pickle;

use crate::error::{IoResultExt, PlevelError, PlevelResult};
use ndarray::prelude::*;
use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Standard name of the time dimension.
pub const TIME_DIMENSION_NAME: &str = "time";

/// Value of a dataset or variable attribute.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum AttributeValue {
    Text(String),
    Floats(Vec<f64>),
    Integers(Vec<i64>),
}

impl AttributeValue {
    /// Returns the attribute as text, if it is a text attribute.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Returns the first value of a numerical attribute as a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Floats(values) => values.first().copied(),
            Self::Integers(values) => values.first().map(|&value| value as f64),
            Self::Text(_) => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Floats(vec![value])
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(values: Vec<f64>) -> Self {
        Self::Floats(values)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integers(vec![value])
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{}", text),
            Self::Floats(values) => write!(f, "{:?}", values),
            Self::Integers(values) => write!(f, "{:?}", values),
        }
    }
}

/// Ordered collection of named attributes.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Attributes(Vec<(String, AttributeValue)>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.0
            .iter()
            .find(|(attribute_name, _)| attribute_name == name)
            .map(|(_, value)| value)
    }

    /// Sets the value of the given attribute, replacing any existing value
    /// while keeping its position.
    pub fn set<S, V>(&mut self, name: S, value: V)
    where
        S: Into<String>,
        V: Into<AttributeValue>,
    {
        let name = name.into();
        let value = value.into();
        match self
            .0
            .iter_mut()
            .find(|(attribute_name, _)| *attribute_name == name)
        {
            Some((_, existing_value)) => *existing_value = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        let idx = self
            .0
            .iter()
            .position(|(attribute_name, _)| attribute_name == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>, V: Into<AttributeValue>> FromIterator<(S, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        let mut attributes = Self::new();
        for (name, value) in iter {
            attributes.set(name, value);
        }
        attributes
    }
}

/// A named dataset dimension.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Dimension {
    name: String,
    len: usize,
    is_unlimited: bool,
}

impl Dimension {
    pub fn new<S: Into<String>>(name: S, len: usize, is_unlimited: bool) -> Self {
        Self {
            name: name.into(),
            len,
            is_unlimited,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_unlimited(&self) -> bool {
        self.is_unlimited
    }
}

/// Floating-point precision used when storing a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum Precision {
    Single,
    Double,
}

/// Metadata for a single dataset variable.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct VariableInfo {
    name: String,
    dimensions: Vec<String>,
    attributes: Attributes,
    precision: Precision,
}

impl VariableInfo {
    pub fn new<S: Into<String>>(
        name: S,
        dimensions: Vec<String>,
        attributes: Attributes,
        precision: Precision,
    ) -> Self {
        Self {
            name: name.into(),
            dimensions,
            attributes,
            precision,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Returns a copy with the given dimensions and precision but the same
    /// name and attributes.
    pub fn with_dimensions(
        &self,
        dimensions: Vec<String>,
        precision: Precision,
    ) -> Self {
        Self::new(
            self.name.clone(),
            dimensions,
            self.attributes.clone(),
            precision,
        )
    }
}

/// Dimensions, variables and global attributes of a dataset.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct DatasetSchema {
    dimensions: Vec<Dimension>,
    variables: Vec<VariableInfo>,
    attributes: Attributes,
}

impl DatasetSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dimension(&mut self, dimension: Dimension) {
        self.dimensions.retain(|existing| existing.name != dimension.name);
        self.dimensions.push(dimension);
    }

    pub fn add_variable(&mut self, variable: VariableInfo) {
        self.variables.retain(|existing| existing.name != variable.name);
        self.variables.push(variable);
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|dimension| dimension.name == name)
    }

    pub fn variables(&self) -> &[VariableInfo] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&VariableInfo> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Returns the shape of the given variable as given by the lengths
    /// of its dimensions.
    pub fn shape_of(&self, variable_name: &str) -> io::Result<Vec<usize>> {
        let variable = self.variable(variable_name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Variable {} not present in dataset", variable_name),
            )
        })?;
        variable
            .dimensions()
            .iter()
            .map(|dimension_name| {
                self.dimension(dimension_name)
                    .map(Dimension::len)
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!(
                                "Dimension {} of variable {} not present in dataset",
                                dimension_name, variable_name
                            ),
                        )
                    })
            })
            .collect()
    }
}

/// Read access to a dataset.
pub trait DatasetReader {
    /// Returns the path of the underlying file.
    fn path(&self) -> &Path;

    /// Returns the dimensions, variables and attributes of the dataset.
    fn schema(&self) -> &DatasetSchema;

    /// Reads all values of the given variable.
    fn read_variable(&self, name: &str) -> io::Result<ArrayD<f64>>;

    /// Reads the values of the given variable at one index of its
    /// leading (time) dimension, which is removed from the result.
    fn read_variable_at_time(&self, name: &str, time_index: usize) -> io::Result<ArrayD<f64>>;
}

/// Write access to a new dataset.
pub trait DatasetWriter {
    /// Creates the dimensions, variables and attributes of the dataset.
    fn define(&mut self, schema: &DatasetSchema) -> io::Result<()>;

    /// Writes all values of the given variable.
    fn write_variable(&mut self, name: &str, values: ArrayViewD<f64>) -> io::Result<()>;

    /// Writes the values of the given variable at one index of its leading
    /// (time) dimension.
    fn write_variable_at_time(
        &mut self,
        name: &str,
        time_index: usize,
        values: ArrayViewD<f64>,
    ) -> io::Result<()>;

    /// Completes writing and closes the file.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Supported file formats for datasets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetFormat {
    #[cfg(feature = "netcdf")]
    NetCDF,
    #[cfg(feature = "pickle")]
    Pickle,
}

impl DatasetFormat {
    /// Determines the format from the extension of the given path.
    pub fn from_path<P: AsRef<Path>>(file_path: P) -> PlevelResult<Self> {
        let file_path = file_path.as_ref();
        let extension = file_path.extension().ok_or_else(|| {
            PlevelError::UnsupportedFormat(format!(
                "Missing extension for {}\n\
                 Valid extensions are: {}",
                file_path.display(),
                Self::valid_extensions_string()
            ))
        })?;
        Self::from_extension(&extension.to_string_lossy())
    }

    /// Determines the format from the given file extension.
    pub fn from_extension(extension: &str) -> PlevelResult<Self> {
        match extension {
            "nc" => {
                #[cfg(feature = "netcdf")]
                {
                    Ok(Self::NetCDF)
                }
                #[cfg(not(feature = "netcdf"))]
                Err(PlevelError::UnsupportedFormat(
                    "Compile with the netcdf feature in order to read and write NetCDF files\n\
                     Tip: Use cargo flag --features=netcdf and make sure the NetCDF library is available"
                        .to_string(),
                ))
            }
            "pickle" | "pkl" => {
                #[cfg(feature = "pickle")]
                {
                    Ok(Self::Pickle)
                }
                #[cfg(not(feature = "pickle"))]
                Err(PlevelError::UnsupportedFormat(
                    "Compile with the pickle feature in order to read and write pickle files"
                        .to_string(),
                ))
            }
            invalid => Err(PlevelError::UnsupportedFormat(format!(
                "Invalid extension {}\n\
                 Valid extensions are: {}",
                invalid,
                Self::valid_extensions_string()
            ))),
        }
    }

    /// Returns a string listing the valid extensions.
    pub fn valid_extensions_string() -> String {
        let mut extensions = Vec::new();
        if cfg!(feature = "netcdf") {
            extensions.push("nc");
        }
        if cfg!(feature = "pickle") {
            extensions.push("pickle, pkl");
        }
        extensions.join(", ")
    }
}

/// Opens the dataset at the given path for reading, with the format
/// inferred from the extension.
pub fn open_dataset<P: AsRef<Path>>(file_path: P) -> PlevelResult<Box<dyn DatasetReader>> {
    let file_path = file_path.as_ref();
    match DatasetFormat::from_path(file_path)? {
        #[cfg(feature = "netcdf")]
        DatasetFormat::NetCDF => netcdf::NetCDFDatasetReader::open(file_path)
            .map(|reader| Box::new(reader) as Box<dyn DatasetReader>)
            .with_path(file_path),
        #[cfg(feature = "pickle")]
        DatasetFormat::Pickle => pickle::read_dataset(file_path)
            .map(|dataset| Box::new(dataset) as Box<dyn DatasetReader>)
            .with_path(file_path),
    }
}

/// Creates a new dataset at the given path using the given format.
pub fn create_dataset<P: AsRef<Path>>(
    file_path: P,
    format: DatasetFormat,
) -> PlevelResult<Box<dyn DatasetWriter>> {
    let file_path = file_path.as_ref();
    match format {
        #[cfg(feature = "netcdf")]
        DatasetFormat::NetCDF => netcdf::NetCDFDatasetWriter::create(file_path)
            .map(|writer| Box::new(writer) as Box<dyn DatasetWriter>)
            .with_path(file_path),
        #[cfg(feature = "pickle")]
        DatasetFormat::Pickle => Ok(Box::new(pickle::PickleDatasetWriter::new(file_path))),
    }
}

/// A dataset held entirely in memory.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Dataset {
    #[cfg_attr(feature = "serialization", serde(skip))]
    path: PathBuf,
    schema: DatasetSchema,
    values: BTreeMap<String, ArrayD<f64>>,
}

impl Dataset {
    /// Creates an empty dataset with the given schema.
    pub fn new(schema: DatasetSchema) -> Self {
        Self {
            path: PathBuf::new(),
            schema,
            values: BTreeMap::new(),
        }
    }

    pub fn set_path<P: AsRef<Path>>(&mut self, file_path: P) {
        self.path = file_path.as_ref().to_path_buf();
    }

    /// Assigns values to the given variable, which must have a shape
    /// consistent with the schema.
    pub fn assign_variable<D: ndarray::Dimension>(
        &mut self,
        name: &str,
        values: Array<f64, D>,
    ) -> io::Result<()> {
        let shape = self.schema.shape_of(name)?;
        let values = values.into_dyn();
        verify_shape(name, &shape, values.shape())?;
        self.values.insert(name.to_string(), values);
        Ok(())
    }

    /// Assigns values to one index of the leading (time) dimension of the
    /// given variable.
    pub fn assign_variable_at_time(
        &mut self,
        name: &str,
        time_index: usize,
        values: ArrayViewD<f64>,
    ) -> io::Result<()> {
        let shape = self.schema.shape_of(name)?;
        if shape.is_empty() || time_index >= shape[0] {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Time index {} out of bounds for variable {}", time_index, name),
            ));
        }
        verify_shape(name, &shape[1..], values.shape())?;
        let stored_values = self
            .values
            .entry(name.to_string())
            .or_insert_with(|| ArrayD::zeros(IxDyn(&shape)));
        stored_values
            .index_axis_mut(Axis(0), time_index)
            .assign(&values);
        Ok(())
    }

    fn stored_values(&self, name: &str) -> io::Result<&ArrayD<f64>> {
        self.values.get(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("No values for variable {} in dataset", name),
            )
        })
    }
}

fn verify_shape(name: &str, expected_shape: &[usize], shape: &[usize]) -> io::Result<()> {
    if expected_shape == shape {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Shape {:?} of values for variable {} does not match shape {:?} of its dimensions",
                shape, name, expected_shape
            ),
        ))
    }
}

impl DatasetReader for Dataset {
    fn path(&self) -> &Path {
        self.path.as_path()
    }

    fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    fn read_variable(&self, name: &str) -> io::Result<ArrayD<f64>> {
        self.stored_values(name).map(Clone::clone)
    }

    fn read_variable_at_time(&self, name: &str, time_index: usize) -> io::Result<ArrayD<f64>> {
        let values = self.stored_values(name)?;
        if values.ndim() == 0 || time_index >= values.shape()[0] {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Time index {} out of bounds for variable {}", time_index, name),
            ));
        }
        Ok(values.index_axis(Axis(0), time_index).to_owned())
    }
}
