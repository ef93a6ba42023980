//! End-to-end training runs through the public API.

use std::io::Write;

use ndarray::Array1;
use neural_ode_trajectory::data::linspace;
use neural_ode_trajectory::prelude::*;
use neural_ode_trajectory::Error;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

fn quick_config() -> TrainingConfig {
    let mut config = TrainingConfig {
        data_size: 80,
        batch_time: 6,
        batch_size: 5,
        niters: 12,
        test_freq: 4,
        seed: Some(11),
        ..TrainingConfig::default()
    };
    config.model.hidden_dim = 12;
    config
}

#[test]
fn spiral_training_with_dopri5() {
    let config = quick_config();
    let dataset = spiral_dataset(config.data_size).unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    let mut trainer = Trainer::new(config, &dataset, &mut rng).unwrap();
    let report = trainer.run(&mut rng).unwrap();

    assert_eq!(report.iterations(), 12);
    assert_eq!(report.evaluations.len(), 3);
    assert!(report.evaluations.iter().all(|e| e.loss.is_finite() && e.loss > 0.0));
    assert!(report.final_time_avg > 0.0);
}

#[test]
fn adjoint_training_matches_direct() {
    let dataset = spiral_dataset(80).unwrap();

    let run = |adjoint: bool| {
        let mut config = quick_config();
        config.adjoint = adjoint;
        let mut rng = StdRng::seed_from_u64(3);
        let mut trainer = Trainer::new(config, &dataset, &mut rng).unwrap();
        let report = trainer.run(&mut rng).unwrap();
        let params = trainer.model().parameters().unwrap().values().to_vec();
        (report, params)
    };

    let (direct_report, direct) = run(false);
    let (adjoint_report, adjoint) = run(true);

    for (a, b) in direct_report.losses.iter().zip(&adjoint_report.losses) {
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }
    for (a, b) in direct.iter().zip(&adjoint) {
        assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
    }
}

#[test]
fn training_from_demonstration_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("demos.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "# recorded demonstrations").unwrap();
    writeln!(file, "# id t x y").unwrap();
    for (i, t) in linspace(0.0, 3.0, 40).into_iter().enumerate() {
        // times are recorded negated
        writeln!(file, "2 {} {} {}", -t, (-t).exp(), 0.5 * (-t).exp()).unwrap();
        writeln!(file, "5 {} 9.0 9.0", i).unwrap();
    }
    drop(file);

    let trajectory = load_trajectory(&path, 2).unwrap();
    assert_eq!(trajectory.len(), 40);
    let dataset = TrajectoryDataset::new(trajectory);

    let config = TrainingConfig {
        method: Method::Rk4,
        batch_time: 5,
        batch_size: 6,
        niters: 6,
        test_freq: 3,
        viz: true,
        ..TrainingConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(0);
    let viz_dir = dir.path().join("viz");
    let mut trainer = Trainer::new(config, &dataset, &mut rng)
        .unwrap()
        .with_visualizer(Box::new(CsvVisualizer::new(&viz_dir).unwrap()));
    let report = trainer.run(&mut rng).unwrap();

    assert_eq!(report.evaluations.len(), 2);
    assert!(viz_dir.join("trajectory_000.csv").exists());
    assert!(viz_dir.join("trajectory_001.csv").exists());
    assert!(viz_dir.join("field_001.csv").exists());
}

#[test]
fn trained_model_survives_save_and_load() {
    let config = quick_config();
    let dataset = spiral_dataset(config.data_size).unwrap();
    let mut rng = StdRng::seed_from_u64(21);

    let mut trainer = Trainer::new(config, &dataset, &mut rng).unwrap();
    let report = trainer.run(&mut rng).unwrap();

    let dir = tempdir().unwrap();
    report.save_json(dir.path().join("report.json")).unwrap();

    let field = trainer.into_model().into_learned().unwrap();
    let path = dir.path().join("model.json");
    field.save_json(&path).unwrap();
    let loaded = LearnedField::load_json(&path).unwrap();

    let y = Array1::from_vec(vec![0.7, -1.3]);
    assert_eq!(field.evaluate(0.0, &y).unwrap(), loaded.evaluate(0.0, &y).unwrap());
}

#[test]
fn infeasible_batch_aborts_run() {
    let dataset = spiral_dataset(20).unwrap();
    let config = TrainingConfig {
        batch_time: 15,
        batch_size: 10,
        niters: 5,
        ..TrainingConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(0);
    let mut trainer = Trainer::new(config, &dataset, &mut rng).unwrap();

    match trainer.run(&mut rng) {
        Err(Error::InsufficientData {
            len,
            batch_time,
            batch_size,
        }) => assert_eq!((len, batch_time, batch_size), (20, 15, 10)),
        other => panic!("expected insufficient data, got {:?}", other),
    }
}
