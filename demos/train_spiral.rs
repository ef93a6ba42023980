//! # Train Spiral Example
//!
//! Fits a learned vector field to the damped cubic spiral and writes the
//! evaluation snapshots as CSV.
//!
//! Run with:
//! ```bash
//! cargo run --example train_spiral
//! ```

use anyhow::Result;
use neural_ode_trajectory::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("=== Neural ODE Spiral Training ===");

    // Configuration
    let config = TrainingConfig {
        data_size: 500,
        niters: 400,
        test_freq: 50,
        viz: true,
        seed: Some(42),
        ..TrainingConfig::default()
    };

    // Ground truth
    let dataset = spiral_dataset(config.data_size)?;
    info!(
        "Ground truth: {} states over t in [0, {}]",
        dataset.len(),
        dataset.times()[dataset.len() - 1]
    );

    // Train
    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or(0));
    let out_dir = std::env::temp_dir().join("neural_ode_spiral");
    let visualizer = CsvVisualizer::new(&out_dir)?;

    let mut trainer = Trainer::new(config, &dataset, &mut rng)?.with_visualizer(Box::new(visualizer));
    let report = trainer.run(&mut rng)?;

    // Results
    info!("=== Training Results ===");
    for eval in &report.evaluations {
        info!("  Iter {:04}: total loss {:.6}", eval.iteration, eval.loss);
    }
    info!("Running batch loss: {:.6}", report.final_loss_avg);
    info!("Seconds per iteration: {:.4}", report.final_time_avg);
    info!("Snapshots written to {}", out_dir.display());

    // Learned field at a few states
    let model = trainer.model();
    for state in [[2.0, 0.0], [0.0, 1.0], [-1.0, -1.0]] {
        let y = ndarray::Array1::from_vec(state.to_vec());
        let dydt = model.evaluate(0.0, &y)?;
        info!("  f({:?}) = [{:.4}, {:.4}]", state, dydt[0], dydt[1]);
    }

    Ok(())
}
