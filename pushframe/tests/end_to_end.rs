use jitter_math::{rms, Interpolation};
use pushframe::fit::{fit_polynomial, fit_spline, FitConfig};
use pushframe::model::{HarmonicModel, HarmonicTerm, JitterModel, PolynomialModel, TimeDomain};
use pushframe::pipeline::{inject_jitter, remove_jitter};
use pushframe::raster::{ImageFileStore, Raster, RasterStore};
use pushframe::recovery::{read_residuals, recover_jitter, write_residuals, RecoveryStatistics};
use pushframe::registration::{MaximumCorrelation, RegistrationConfig};
use pushframe::scene::textured_scene;
use pushframe::schedule::{LineSchedule, ScheduleConfig};
use pushframe::tables::LineTimeTable;
use tempfile::tempdir;

/// RMS over normal-line times of (truth - fitted) with the mean removed,
/// alongside the RMS of the demeaned truth, for the line axis
fn line_error(truth: &JitterModel, fitted: &JitterModel, times: &[f64]) -> (f64, f64) {
    let demeaned = |values: Vec<f64>| {
        let m = values.iter().sum::<f64>() / values.len() as f64;
        values.into_iter().map(|v| v - m).collect::<Vec<_>>()
    };
    let truth_line = demeaned(times.iter().map(|&t| truth.evaluate(t).d_line).collect());
    let error = demeaned(
        times
            .iter()
            .map(|&t| truth.evaluate(t).d_line - fitted.evaluate(t).d_line)
            .collect(),
    );
    (rms(&error), rms(&truth_line))
}

#[test]
fn test_file_based_pipeline() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempdir().unwrap();
    let store = ImageFileStore;

    // Schedule
    let schedule = LineSchedule::generate(&ScheduleConfig {
        total_lines: 96,
        check_line_count: 32,
        unique_check_lines: 4,
        exposure_time: 1.0,
    })
    .unwrap();
    let (_, normal_path, check_path) = schedule.write_tables(&dir.path().join("checktable.csv")).unwrap();
    let normal_table = LineTimeTable::read_csv(&normal_path).unwrap();
    let check_table = LineTimeTable::read_csv(&check_path).unwrap();
    assert_eq!(&normal_table, schedule.normal());
    assert_eq!(&check_table, schedule.check());

    // Jitter table
    let jitter_path = dir.path().join("jitter.csv");
    HarmonicModel::new(vec![HarmonicTerm {
        frequency: 0.5,
        amp_x: 1.4,
        phase_x: 0.9,
        amp_y: 1.8,
        phase_y: 0.2,
    }])
    .write_csv(&jitter_path)
    .unwrap();
    let truth: JitterModel = HarmonicModel::read_csv(&jitter_path).unwrap().into();

    // Scene and injection
    let scene_path = dir.path().join("scene.png");
    store
        .create(&scene_path, &Raster::from_band(textured_scene(64, 96, 21)))
        .unwrap();
    let scene = store.open(&scene_path).unwrap();

    let injected = inject_jitter(
        &scene,
        &normal_table,
        &check_table,
        &truth,
        Interpolation::CubicConvolution,
    )
    .unwrap();
    let jittered_path = dir.path().join("jittered.png");
    let check_image_path = dir.path().join("check.png");
    store.create(&jittered_path, &injected.jittered).unwrap();
    store.create(&check_image_path, &injected.check).unwrap();
    let jittered = store.open(&jittered_path).unwrap();
    let check = store.open(&check_image_path).unwrap();

    // Recovery
    let registration = RegistrationConfig::default();
    let records = recover_jitter(
        &jittered,
        &check,
        &check_table,
        &normal_table,
        1.0,
        &MaximumCorrelation::from_config(&registration),
        &registration,
    )
    .unwrap();
    let stats = RecoveryStatistics::from_records(&records);
    assert_eq!(stats.attempted, 32);
    assert!(stats.succeeded >= 24, "only {} registrations succeeded", stats.succeeded);

    let residuals_path = dir.path().join("residuals.csv");
    write_residuals(&residuals_path, &records).unwrap();
    let records = read_residuals(&residuals_path).unwrap();

    // Fit
    let config = FitConfig {
        tolerance: 0.7,
        max_time: Some(1.0),
    };
    let poly = fit_polynomial(&records, 4, &config).unwrap();
    let coefficients_path = dir.path().join("coefficients.csv");
    poly.model.write_coefficients(&coefficients_path).unwrap();
    let reread =
        PolynomialModel::read_coefficients(&coefficients_path, TimeDomain::new(0.0, 1.0).unwrap()).unwrap();
    assert_eq!(reread, poly.model);

    let times = normal_table.times();
    let fitted: JitterModel = reread.into();
    let (error, injected_rms) = line_error(&truth, &fitted, &times);
    assert!(error < 0.3 * injected_rms, "polynomial error {error} vs jitter {injected_rms}");

    let spline = fit_spline(&records, 4, 6, &config).unwrap();
    let spline_model = spline.jitter_model();
    let model_path = dir.path().join("model.json");
    spline_model.save_to_file(&model_path).unwrap();
    let loaded = JitterModel::load_from_file(&model_path).unwrap();
    assert_eq!(loaded.kind(), "spline");
    for &t in times.iter().step_by(7) {
        let (a, b) = (loaded.evaluate(t), spline_model.evaluate(t));
        assert!((a.d_line - b.d_line).abs() < 1e-9 && (a.d_sample - b.d_sample).abs() < 1e-9);
    }
    let (error, _) = line_error(&truth, &spline_model, &times);
    assert!(error < 0.3 * injected_rms, "spline error {error} vs jitter {injected_rms}");

    // Correction
    let (corrected, offsets) =
        remove_jitter(&jittered, &normal_table, &fitted, Interpolation::CubicConvolution).unwrap();
    assert_eq!((corrected.samples(), corrected.lines()), (64, 96));
    assert_eq!(offsets.len(), 96);
    assert_eq!(offsets.offsets()[10], fitted.evaluate(times[10]));
}
