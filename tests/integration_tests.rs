mod common;

use approx::assert_abs_diff_eq;
use common::run;
use ndarray::prelude::*;
use plevel::{
    batch::{BatchConfig, BatchDriver, BatchOutcome, WorkItem},
    interpolation::{is_missing, LogPressureInterpolator, MaskingPolicy},
    job::FieldSelection,
    levels::LevelSet,
};
use std::{fs, path::Path};

const LEVELS: &str = "--levels=5000,20000,50000,85000";

fn read_temperature(file_path: &str) -> Array4<f64> {
    common::read_variable(file_path, "temp")
        .into_dimensionality::<Ix4>()
        .unwrap()
}

def_test!(
IN[input = "atmos_monthly.pickle"]
OUT[output = "atmos_monthly_interp.pickle"]
fn interpolated_temperature_is_masked_below_surface {
    common::write_hybrid_dataset(input);
    run(["interpolate", input, output, "--fields=temp", LEVELS]);
    common::assert_file_exists(output);

    let temp = read_temperature(output);
    assert_eq!(temp.shape(), &[2, 4, 2, 3]);
    for ((time, level, lat, lon), &value) in temp.indexed_iter() {
        let target_pressure = [5000.0, 20000.0, 50000.0, 85000.0][level];
        let surface_pressure = common::surface_pressure(time, lat, lon);
        if target_pressure > surface_pressure {
            assert!(is_missing(value));
        } else {
            assert!(!is_missing(value));
        }
        if level == 1 || level == 2 {
            assert_abs_diff_eq!(value, common::temperature(target_pressure), epsilon = 1e-3);
        }
    }

    let levels = common::read_variable(output, "pfull");
    assert_eq!(levels.as_slice().unwrap(), &[5000.0, 20000.0, 50000.0, 85000.0]);
    let ps = common::read_variable(output, "ps");
    assert_eq!(ps, common::read_variable(input, "ps"));
});

def_test!(
IN[input = "atmos_daily.pickle"]
OUT[]
fn default_output_path_gets_suffix {
    common::write_hybrid_dataset(input);
    run(["interpolate", input, "--all-fields", "--level-preset=earth30", "-x"]);
    let output = Path::new(input).with_file_name("atmos_daily_interp.pickle");
    common::assert_file_exists(&output);

    let temp = read_temperature(output.to_str().unwrap());
    assert_eq!(temp.shape(), &[2, 30, 2, 3]);
    assert!(temp.iter().all(|&value| !is_missing(value)));
    let ucomp = common::read_variable(&output, "ucomp");
    assert_eq!(ucomp.shape(), &[2, 30, 2, 3]);
});

def_test!(
IN[base_dir = "isca_data"]
OUT[]
fn batch_processes_runs_once {
    for run_name in ["run0001", "run0002"] {
        common::write_hybrid_dataset(
            Path::new(base_dir).join("exp").join(run_name).join("atmos_monthly.pickle"),
        );
    }
    let arguments = [
        "--timing",
        "batch",
        "--base-dir",
        base_dir,
        "--experiments=exp",
        "--runs=1-2",
        "--extension=pickle",
        "--fields=temp,ucomp",
        LEVELS,
    ];
    run(arguments);

    let output = Path::new(base_dir).join("exp/run0002/atmos_monthly_interp.pickle");
    common::assert_file_exists(&output);
    common::assert_file_exists(Path::new(base_dir).join("exp/run0001/atmos_monthly_interp.pickle"));
    let first_content = fs::read(&output).unwrap();

    run(arguments);
    assert_eq!(fs::read(&output).unwrap(), first_content);
});

def_test!(
IN[base_dir = "isca_data"]
OUT[output_dir = "interpolated"]
fn batch_writes_to_separate_output_directory {
    common::write_hybrid_dataset(Path::new(base_dir).join("exp/run0003/atmos_monthly.pickle"));
    run([
        "batch",
        "--base-dir",
        base_dir,
        "--output-dir",
        output_dir,
        "-e",
        "exp",
        "--run-names=run0003",
        "--extension=pickle",
        "--suffix=_plev",
        "--fields=temp",
        "--level-preset=earth25",
    ]);
    common::assert_file_exists(Path::new(output_dir).join("exp/run0003/atmos_monthly_plev.pickle"));
    assert!(!Path::new(base_dir).join("exp/run0003/atmos_monthly_plev.pickle").exists());
});

def_test!(
IN[input = "atmos_monthly.pickle", config = "batch.json"]
OUT[output = "atmos_monthly_interp.pickle", reference = "reference.pickle"]
fn batch_config_file_matches_single_interpolation {
    common::write_hybrid_dataset(input);
    fs::write(
        config,
        format!(
            r#"{{
                "levels": [5000, 20000, 50000, 85000],
                "fields": ["temp"],
                "items": [{{"input": {:?}, "output": {:?}}}]
            }}"#,
            input, output
        ),
    )
    .unwrap();
    run(["batch", "--config-file", config]);
    run(["interpolate", input, reference, "--fields", "temp", LEVELS]);

    assert_eq!(read_temperature(output), read_temperature(reference));
});

def_test!(
IN[good_input = "good.pickle"]
OUT[good_output = "good_interp.pickle", bad_output = "missing_interp.pickle"]
fn failing_items_do_not_stop_batch {
    common::write_hybrid_dataset(good_input);
    let bad_input = Path::new(good_input).with_file_name("missing.pickle");

    let config = BatchConfig::new(
        LevelSet::parse("20000 50000", 1e7).unwrap(),
        FieldSelection::from_list("temp"),
        MaskingPolicy::MaskBelowSurface,
    )
    .with_item(WorkItem::new(&bad_input, bad_output))
    .with_item(WorkItem::new(good_input, good_output));
    config.validate().unwrap();

    let summary = BatchDriver::new(config, LogPressureInterpolator::new()).execute_all();
    assert_eq!(summary.outcome(), BatchOutcome::PartialSuccess);
    assert_eq!(summary.n_completed(), 1);
    let (failed_item, err) = summary.failures().next().unwrap();
    assert_eq!(failed_item.input_path, bad_input);
    assert_eq!(err.kind(), "IOError");
    assert!(summary.to_string().contains("missing.pickle"));

    common::assert_file_exists(good_output);
    assert!(!Path::new(bad_output).exists());
});

def_test!(
IN[input = "atmos_monthly.pickle"]
OUT[output = "atmos_monthly_interp.pickle"]
fn missing_field_leaves_no_output {
    common::write_hybrid_dataset(input);
    let config = BatchConfig::new(
        LevelSet::parse("20000", 1e7).unwrap(),
        FieldSelection::from_list("temp vcomp"),
        MaskingPolicy::MaskBelowSurface,
    )
    .with_item(WorkItem::new(input, output));
    let summary = BatchDriver::new(config, LogPressureInterpolator::new()).execute_all();
    assert_eq!(summary.outcome(), BatchOutcome::NoSuccess);
    assert_eq!(summary.failures().next().unwrap().1.kind(), "MissingFieldError");

    let file_names: Vec<_> = fs::read_dir(Path::new(input).parent().unwrap())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(file_names, vec![std::ffi::OsString::from("atmos_monthly.pickle")]);
});
