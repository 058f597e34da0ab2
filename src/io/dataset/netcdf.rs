//! Datasets stored in the NetCDF format.

use super::{
    AttributeValue, Attributes, DatasetReader, DatasetSchema, DatasetWriter, Dimension, Precision,
    VariableInfo, TIME_DIMENSION_NAME,
};
use crate::io_result;
use ndarray::prelude::*;
use netcdf_rs::{self as nc, Extent, Extents};
use std::{
    io,
    path::{Path, PathBuf},
};

/// Attributes whose type must match the storage type of their variable.
const VALUE_TYPED_ATTRIBUTES: [&str; 4] = ["_FillValue", "missing_value", "valid_min", "valid_max"];

/// Reader for a NetCDF file, reading variable values on demand.
pub struct NetCDFDatasetReader {
    file_path: PathBuf,
    file: nc::File,
    schema: DatasetSchema,
}

impl NetCDFDatasetReader {
    /// Opens the NetCDF file at the given path and reads its metadata.
    pub fn open<P: AsRef<Path>>(file_path: P) -> io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();
        let file = io_result!(nc::open(&file_path))?;
        let schema = read_schema(&file)?;
        Ok(Self {
            file_path,
            file,
            schema,
        })
    }

    fn variable(&self, name: &str) -> io::Result<nc::Variable<'_>> {
        self.file.variable(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Variable {} not found in {}", name, self.file_path.display()),
            )
        })
    }
}

impl DatasetReader for NetCDFDatasetReader {
    fn path(&self) -> &Path {
        self.file_path.as_path()
    }

    fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    fn read_variable(&self, name: &str) -> io::Result<ArrayD<f64>> {
        let variable = self.variable(name)?;
        let shape: Vec<usize> = variable.dimensions().iter().map(|dim| dim.len()).collect();
        let values = io_result!(variable.get_values::<f64, _>(Extents::All))?;
        io_result!(ArrayD::from_shape_vec(IxDyn(&shape), values))
    }

    fn read_variable_at_time(&self, name: &str, time_index: usize) -> io::Result<ArrayD<f64>> {
        let variable = self.variable(name)?;
        let shape: Vec<usize> = variable.dimensions().iter().map(|dim| dim.len()).collect();
        if shape.is_empty() || time_index >= shape[0] {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Time index {} out of bounds for variable {}", time_index, name),
            ));
        }
        let values = io_result!(
            variable.get_values::<f64, _>(time_slab_extents(time_index, &shape[1..]))
        )?;
        io_result!(ArrayD::from_shape_vec(IxDyn(&shape[1..]), values))
    }
}

/// Writer creating a new NetCDF file.
pub struct NetCDFDatasetWriter {
    file: nc::FileMut,
    schema: DatasetSchema,
}

impl NetCDFDatasetWriter {
    /// Creates a new NetCDF file at the given path.
    pub fn create<P: AsRef<Path>>(file_path: P) -> io::Result<Self> {
        let file = io_result!(nc::create(file_path.as_ref()))?;
        Ok(Self {
            file,
            schema: DatasetSchema::new(),
        })
    }

    fn put_values(&mut self, name: &str, values: ArrayViewD<f64>, extents: Extents) -> io::Result<()> {
        let precision = self
            .schema
            .variable(name)
            .map(VariableInfo::precision)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Variable {} has not been defined", name),
                )
            })?;
        let mut variable = self.file.variable_mut(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("Variable {} not present in output file", name),
            )
        })?;
        match precision {
            Precision::Single => {
                let values: Vec<f32> = values.iter().map(|&value| value as f32).collect();
                io_result!(variable.put_values(&values, extents))
            }
            Precision::Double => {
                let values: Vec<f64> = values.iter().copied().collect();
                io_result!(variable.put_values(&values, extents))
            }
        }
    }
}

impl DatasetWriter for NetCDFDatasetWriter {
    fn define(&mut self, schema: &DatasetSchema) -> io::Result<()> {
        for dimension in schema.dimensions() {
            if dimension.is_unlimited() {
                io_result!(self.file.add_unlimited_dimension(dimension.name()))?;
            } else {
                io_result!(self.file.add_dimension(dimension.name(), dimension.len()))?;
            }
        }
        for variable_info in schema.variables() {
            let dimensions: Vec<&str> = variable_info
                .dimensions()
                .iter()
                .map(String::as_str)
                .collect();
            let precision = variable_info.precision();
            let mut variable = match precision {
                Precision::Single => {
                    io_result!(self.file.add_variable::<f32>(variable_info.name(), &dimensions))?
                }
                Precision::Double => {
                    io_result!(self.file.add_variable::<f64>(variable_info.name(), &dimensions))?
                }
            };
            for (name, value) in variable_info.attributes().iter() {
                let value = if VALUE_TYPED_ATTRIBUTES.contains(&name) {
                    value_typed_attribute(value, precision)
                } else {
                    convert_to_netcdf_attribute(value)
                };
                io_result!(variable.put_attribute(name, value))?;
            }
        }
        for (name, value) in schema.attributes().iter() {
            io_result!(self
                .file
                .add_attribute(name, convert_to_netcdf_attribute(value)))?;
        }
        self.schema = schema.clone();
        Ok(())
    }

    fn write_variable(&mut self, name: &str, values: ArrayViewD<f64>) -> io::Result<()> {
        let extents = Extents::Extent(
            values
                .shape()
                .iter()
                .map(|&len| Extent::from(0..len))
                .collect(),
        );
        self.put_values(name, values, extents)
    }

    fn write_variable_at_time(
        &mut self,
        name: &str,
        time_index: usize,
        values: ArrayViewD<f64>,
    ) -> io::Result<()> {
        let extents = time_slab_extents(time_index, values.shape());
        self.put_values(name, values, extents)
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        // The file is closed when dropped
        drop(self.file);
        Ok(())
    }
}

fn time_slab_extents(time_index: usize, slab_shape: &[usize]) -> Extents {
    Extents::Extent(
        std::iter::once(Extent::from(time_index..time_index + 1))
            .chain(slab_shape.iter().map(|&len| Extent::from(0..len)))
            .collect(),
    )
}

fn read_schema(file: &nc::File) -> io::Result<DatasetSchema> {
    let mut schema = DatasetSchema::new();
    for dimension in file.dimensions() {
        let name = dimension.name();
        let is_unlimited = dimension.is_unlimited() || name == TIME_DIMENSION_NAME;
        schema.add_dimension(Dimension::new(name, dimension.len(), is_unlimited));
    }
    for variable in file.variables() {
        let dimensions = variable
            .dimensions()
            .iter()
            .map(|dimension| dimension.name())
            .collect();
        let mut attributes = Attributes::new();
        for attribute in variable.attributes() {
            if let Some(value) = convert_from_netcdf_attribute(io_result!(attribute.value())?) {
                attributes.set(attribute.name(), value);
            }
        }
        schema.add_variable(VariableInfo::new(
            variable.name(),
            dimensions,
            attributes,
            Precision::Double,
        ));
    }
    for attribute in file.attributes() {
        if let Some(value) = convert_from_netcdf_attribute(io_result!(attribute.value())?) {
            schema.attributes_mut().set(attribute.name(), value);
        }
    }
    Ok(schema)
}

fn convert_from_netcdf_attribute(value: nc::AttributeValue) -> Option<AttributeValue> {
    use nc::AttributeValue as V;
    let floats = |values: Vec<f64>| Some(AttributeValue::Floats(values));
    let integers = |values: Vec<i64>| Some(AttributeValue::Integers(values));
    match value {
        V::Str(text) => Some(AttributeValue::Text(text)),
        V::Strs(texts) => Some(AttributeValue::Text(texts.join("\n"))),
        V::Double(value) => floats(vec![value]),
        V::Doubles(values) => floats(values),
        V::Float(value) => floats(vec![value as f64]),
        V::Floats(values) => floats(values.into_iter().map(f64::from).collect()),
        V::Schar(value) => integers(vec![value as i64]),
        V::Schars(values) => integers(values.into_iter().map(i64::from).collect()),
        V::Uchar(value) => integers(vec![value as i64]),
        V::Uchars(values) => integers(values.into_iter().map(i64::from).collect()),
        V::Short(value) => integers(vec![value as i64]),
        V::Shorts(values) => integers(values.into_iter().map(i64::from).collect()),
        V::Ushort(value) => integers(vec![value as i64]),
        V::Ushorts(values) => integers(values.into_iter().map(i64::from).collect()),
        V::Int(value) => integers(vec![value as i64]),
        V::Ints(values) => integers(values.into_iter().map(i64::from).collect()),
        V::Uint(value) => integers(vec![value as i64]),
        V::Uints(values) => integers(values.into_iter().map(i64::from).collect()),
        V::Longlong(value) => integers(vec![value]),
        V::Longlongs(values) => integers(values),
        V::Ulonglong(value) => integers(vec![value as i64]),
        V::Ulonglongs(values) => integers(values.into_iter().map(|v| v as i64).collect()),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

fn convert_to_netcdf_attribute(value: &AttributeValue) -> nc::AttributeValue {
    match value {
        AttributeValue::Text(text) => nc::AttributeValue::Str(text.clone()),
        AttributeValue::Floats(values) if values.len() == 1 => nc::AttributeValue::Double(values[0]),
        AttributeValue::Floats(values) => nc::AttributeValue::Doubles(values.clone()),
        AttributeValue::Integers(values) if values.len() == 1 => {
            nc::AttributeValue::Longlong(values[0])
        }
        AttributeValue::Integers(values) => nc::AttributeValue::Longlongs(values.clone()),
    }
}

fn value_typed_attribute(value: &AttributeValue, precision: Precision) -> nc::AttributeValue {
    let values: Vec<f64> = match value {
        AttributeValue::Floats(values) => values.clone(),
        AttributeValue::Integers(values) => values.iter().map(|&v| v as f64).collect(),
        AttributeValue::Text(_) => return convert_to_netcdf_attribute(value),
    };
    match (precision, values.len()) {
        (Precision::Single, 1) => nc::AttributeValue::Float(values[0] as f32),
        (Precision::Single, _) => {
            nc::AttributeValue::Floats(values.into_iter().map(|v| v as f32).collect())
        }
        (Precision::Double, 1) => nc::AttributeValue::Double(values[0]),
        (Precision::Double, _) => nc::AttributeValue::Doubles(values),
    }
}
