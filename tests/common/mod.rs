use lazy_static::lazy_static;
use ndarray::prelude::*;
use plevel::{
    cli, exit_on_error,
    grid::{LevelKind, VerticalGrid},
    io::{
        dataset::{pickle, Dataset, DatasetReader, DatasetSchema, Dimension, Precision, VariableInfo},
        utils as io_utils,
    },
};
use std::{
    ffi::OsString,
    fs,
    io,
    path::{Path, PathBuf},
};

#[macro_export]
macro_rules! def_test {
    (
        IN[$($in_ident:ident = $in_str:expr),*]
        OUT[$($out_ident:ident = $out_str:expr),*]
        fn $name:ident $test_body:expr
    ) => {
        #[test]
        fn $name() {
            let test = common::Test::new(stringify!($name));

            $( let $in_ident = test.output_path($in_str); )*
            $( let $out_ident = test.output_path($out_str); )*

            let test_body = |$( $in_ident, )* $( $out_ident, )*| $test_body;

            test_body(
                $( path_str!($in_ident), )* $( path_str!($out_ident), )*
            );
        }
    };
}

#[macro_export]
macro_rules! path_str {
    ($path:expr) => {
        $path.to_string_lossy().as_ref()
    };
}

pub fn run<I, T>(args: I)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    cli::run::run_with_args(cli::build::build().no_binary_name(true).get_matches_from(args));
}

pub const A: [f64; 5] = [0.0, 2000.0, 4000.0, 2000.0, 0.0];
pub const B: [f64; 5] = [0.0, 0.0, 0.1, 0.5, 1.0];
pub const SHAPE: (usize, usize, usize) = (2, 2, 3);

pub fn surface_pressure(time: usize, lat: usize, lon: usize) -> f64 {
    8e4 + 1e4 * ((time + lat + lon) % 3) as f64
}

/// Temperature profile that is linear in the logarithm of pressure.
pub fn temperature(pressure: f64) -> f64 {
    200.0 + 10.0 * pressure.ln()
}

fn variable(name: &str, dimensions: &[&str], units: &str) -> VariableInfo {
    VariableInfo::new(
        name,
        dimensions.iter().map(|name| name.to_string()).collect(),
        [("units", units)].into_iter().collect(),
        Precision::Double,
    )
}

/// Writes a small dataset on hybrid sigma-pressure levels with `temp` and
/// `ucomp` on full levels and `ps` at the surface.
pub fn write_hybrid_dataset<P: AsRef<Path>>(file_path: P) {
    let file_path = file_path.as_ref();
    let (n_times, n_lats, n_lons) = SHAPE;
    let n_levels = A.len() - 1;
    let grid = exit_on_error!(
        VerticalGrid::hybrid(A.to_vec(), B.to_vec()),
        "Error: Invalid test grid: {}"
    );

    let mut schema = DatasetSchema::new();
    schema.add_dimension(Dimension::new("time", n_times, true));
    schema.add_dimension(Dimension::new("pfull", n_levels, false));
    schema.add_dimension(Dimension::new("phalf", A.len(), false));
    schema.add_dimension(Dimension::new("lat", n_lats, false));
    schema.add_dimension(Dimension::new("lon", n_lons, false));
    schema.add_variable(variable("time", &["time"], "days since 0000-00-00 00:00:00"));
    schema.add_variable(variable("lat", &["lat"], "degrees_N"));
    schema.add_variable(variable("lon", &["lon"], "degrees_E"));
    schema.add_variable(variable("pk", &["phalf"], "Pa"));
    schema.add_variable(variable("bk", &["phalf"], "none"));
    schema.add_variable(variable("ps", &["time", "lat", "lon"], "Pa"));
    schema.add_variable(variable("temp", &["time", "pfull", "lat", "lon"], "K"));
    schema.add_variable(variable("ucomp", &["time", "pfull", "lat", "lon"], "m/sec"));
    schema.attributes_mut().set("title", "synthetic");

    let mut ps = Array3::zeros(SHAPE);
    let mut temp = Array4::zeros((n_times, n_levels, n_lats, n_lons));
    let mut ucomp = Array4::zeros((n_times, n_levels, n_lats, n_lons));
    for ((time, lat, lon), value) in ps.indexed_iter_mut() {
        *value = surface_pressure(time, lat, lon);
        let pressures = exit_on_error!(
            grid.column_pressures(LevelKind::Full, *value),
            "Error: Invalid test surface pressure: {}"
        );
        for (level, &pressure) in pressures.iter().enumerate() {
            temp[[time, level, lat, lon]] = temperature(pressure);
            ucomp[[time, level, lat, lon]] = 10.0 * level as f64 + lat as f64;
        }
    }

    let mut dataset = Dataset::new(schema);
    let assignments = [
        ("time", arr1(&[15.0, 45.0]).into_dyn()),
        ("lat", arr1(&[-45.0, 45.0]).into_dyn()),
        ("lon", arr1(&[0.0, 120.0, 240.0]).into_dyn()),
        ("pk", arr1(&A).into_dyn()),
        ("bk", arr1(&B).into_dyn()),
        ("ps", ps.into_dyn()),
        ("temp", temp.into_dyn()),
        ("ucomp", ucomp.into_dyn()),
    ];
    for (name, values) in assignments {
        exit_on_error!(
            dataset.assign_variable(name, values),
            "Error: Could not assign test variable: {}"
        );
    }
    exit_on_error!(
        io_utils::create_directory_if_missing(file_path),
        "Error: Could not create test directory: {}"
    );
    exit_on_error!(
        pickle::write_dataset(file_path, &dataset),
        "Error: Could not write test dataset: {}"
    );
}

pub fn read_variable<P: AsRef<Path>>(file_path: P, name: &str) -> ArrayD<f64> {
    let dataset = exit_on_error!(
        pickle::read_dataset(file_path),
        "Error: Could not read dataset: {}"
    );
    exit_on_error!(
        dataset.read_variable(name),
        "Error: Could not read variable: {}"
    )
}

pub fn assert_file_exists<P: AsRef<Path>>(file_path: P) {
    let file_path = file_path.as_ref();
    assert!(
        file_path.exists(),
        "File {} does not exist",
        file_path.to_string_lossy()
    );
}

#[derive(Debug, Clone)]
pub struct Test {
    output_dir: PathBuf,
}

impl Test {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        let name = name.as_ref();
        let output_dir = exit_on_error!(
            CONTEXT.prepared_output_dir(name),
            "Error: Could not prepare output directory for test {}: {}",
            name
        );
        Self { output_dir }
    }

    pub fn output_path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.output_dir.join(file_name.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct TestContext {
    base_output_dir: PathBuf,
}

impl TestContext {
    const BASE_OUTPUT_DIR_PATH_COMPONENTS: [&'static str; 3] = ["tests", "data", "output"];

    fn new() -> Self {
        Self {
            base_output_dir: Self::BASE_OUTPUT_DIR_PATH_COMPONENTS.iter().collect(),
        }
    }

    pub fn output_dir<S: AsRef<str>>(&self, test_name: S) -> PathBuf {
        self.base_output_dir.join(test_name.as_ref())
    }

    pub fn prepared_output_dir<S: AsRef<str>>(&self, test_name: S) -> io::Result<PathBuf> {
        let output_dir = self.output_dir(test_name);
        if output_dir.exists() {
            fs::remove_dir_all(&output_dir)?;
        }
        fs::create_dir_all(&output_dir)?;
        Ok(output_dir)
    }
}

lazy_static! {
    pub static ref CONTEXT: TestContext = TestContext::new();
}
