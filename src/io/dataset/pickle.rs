//! Datasets stored as Python pickle files.

use super::{Dataset, DatasetSchema, DatasetWriter};
use crate::{io::utils::open_file_and_map_err, io_result};
use ndarray::prelude::*;
use serde::Serialize;
use serde_pickle::{DeOptions, SerOptions};
use std::{
    fs,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

/// Reads a dataset from the pickle file at the given path.
pub fn read_dataset<P: AsRef<Path>>(file_path: P) -> io::Result<Dataset> {
    let file_path = file_path.as_ref();
    let file = open_file_and_map_err(file_path)?;
    let mut dataset: Dataset =
        io_result!(serde_pickle::from_reader(BufReader::new(file), DeOptions::new()))?;
    dataset.set_path(file_path);
    Ok(dataset)
}

/// Serializes the given dataset into pickle format and saves it at the given path.
pub fn write_dataset<P: AsRef<Path>>(file_path: P, dataset: &Dataset) -> io::Result<()> {
    let mut file = BufWriter::new(fs::File::create(file_path)?);
    write_data_as_pickle(&mut file, dataset)?;
    file.flush()
}

/// Serializes the given data into pickle format and writes it to the given writer.
pub fn write_data_as_pickle<W: Write, T: Serialize>(writer: &mut W, data: &T) -> io::Result<()> {
    match serde_pickle::to_writer(writer, data, SerOptions::new()) {
        Ok(_) => Ok(()),
        Err(serde_pickle::Error::Io(err)) => Err(err),
        Err(err) => Err(io::Error::new(
            io::ErrorKind::Other,
            format!("Unexpected error while serializing data to pickle file: {}", err),
        )),
    }
}

/// Writer that collects a dataset in memory and saves it as a pickle file
/// when finished.
#[derive(Debug)]
pub struct PickleDatasetWriter {
    file_path: PathBuf,
    dataset: Dataset,
}

impl PickleDatasetWriter {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            dataset: Dataset::default(),
        }
    }
}

impl DatasetWriter for PickleDatasetWriter {
    fn define(&mut self, schema: &DatasetSchema) -> io::Result<()> {
        self.dataset = Dataset::new(schema.clone());
        Ok(())
    }

    fn write_variable(&mut self, name: &str, values: ArrayViewD<f64>) -> io::Result<()> {
        self.dataset.assign_variable(name, values.to_owned())
    }

    fn write_variable_at_time(
        &mut self,
        name: &str,
        time_index: usize,
        values: ArrayViewD<f64>,
    ) -> io::Result<()> {
        self.dataset
            .assign_variable_at_time(name, time_index, values)
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        write_dataset(&self.file_path, &self.dataset)
    }
}
