//! # Neural ODE Trajectory CLI
//!
//! Command-line interface for fitting a learned vector field to a trajectory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use neural_ode_trajectory::prelude::*;

/// Neural ODE trajectory fitting
#[derive(Parser)]
#[command(name = "neural_ode_cli")]
#[command(version)]
#[command(about = "Fit a neural vector field to an observed trajectory")]
struct Cli {
    /// Log every iteration
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a learned vector field
    Train(TrainArgs),

    /// Compare ODE solvers on exponential decay
    Solvers {
        /// Fixed step size for Euler, Midpoint and RK4
        #[arg(long, default_value = "0.01")]
        step: f64,
    },
}

#[derive(clap::Args)]
struct TrainArgs {
    /// Demonstration file with `id time x y` rows; the spiral is used when absent
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Trajectory to take from the demonstration file
    #[arg(long, default_value = "0")]
    trajectory_id: i64,

    /// JSON run configuration used as the base for the flags below
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Integration method (euler, midpoint, rk4, dopri5)
    #[arg(short, long)]
    method: Option<Method>,

    /// Number of synthetic ground-truth states
    #[arg(long)]
    data_size: Option<usize>,

    /// Rollout window length
    #[arg(long)]
    batch_time: Option<usize>,

    /// Windows per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Training iterations
    #[arg(short, long)]
    niters: Option<usize>,

    /// Evaluate every N iterations
    #[arg(long)]
    test_freq: Option<usize>,

    /// Write evaluation CSVs into this directory
    #[arg(long)]
    viz: Option<PathBuf>,

    /// CUDA device index
    #[arg(long)]
    gpu: Option<u32>,

    /// Checkpointed gradients through the solver
    #[arg(long)]
    adjoint: bool,

    /// Learning rate
    #[arg(long)]
    lr: Option<f64>,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Save the trained model (JSON)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Save the training report (JSON)
    #[arg(long)]
    report: Option<PathBuf>,
}

impl TrainArgs {
    fn to_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::from_json_file(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => TrainingConfig::default(),
        };

        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(n) = self.data_size {
            config.data_size = n;
        }
        if let Some(n) = self.batch_time {
            config.batch_time = n;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.niters {
            config.niters = n;
        }
        if let Some(n) = self.test_freq {
            config.test_freq = n;
        }
        if let Some(index) = self.gpu {
            config.device = Device::Cuda(index);
        }
        if let Some(lr) = self.lr {
            config.learning_rate = lr;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.viz |= self.viz.is_some();
        config.adjoint |= self.adjoint;

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Train(args) => train(&args)?,
        Commands::Solvers { step } => compare_solvers(step)?,
    }

    Ok(())
}

fn train(args: &TrainArgs) -> Result<()> {
    let config = args.to_config()?;

    let dataset = match &args.data {
        Some(path) => {
            let trajectory = load_trajectory(path, args.trajectory_id)
                .with_context(|| format!("failed to load {}", path.display()))?;
            TrajectoryDataset::new(trajectory)
        }
        None => spiral_dataset(config.data_size)?,
    };

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let viz_dir = args.viz.clone();
    let mut trainer = Trainer::new(config, &dataset, &mut rng)?;
    if let Some(dir) = viz_dir {
        let visualizer = CsvVisualizer::new(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        trainer = trainer.with_visualizer(Box::new(visualizer));
    }

    let report = trainer.run(&mut rng)?;

    if let Some(eval) = report.last_evaluation() {
        info!("Final evaluation at iteration {}: loss {:.6}", eval.iteration, eval.loss);
    }

    if let Some(path) = &args.report {
        report
            .save_json(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        info!("Report saved to {}", path.display());
    }

    if let Some(path) = &args.output {
        if let Some(field) = trainer.into_model().into_learned() {
            field
                .save_json(path)
                .with_context(|| format!("failed to write model {}", path.display()))?;
            info!("Model saved to {}", path.display());
        }
    }

    Ok(())
}

fn compare_solvers(step: f64) -> Result<()> {
    info!("=== ODE Solver Comparison ===");
    info!("Solving: dz/dt = -z, z(0) = 1");
    info!("Exact solution: z(t) = e^(-t)");

    let decay = ExternalDynamics::new("decay", 1, |_t, z| -z);
    let z0 = Array1::from_vec(vec![1.0]);
    let times = neural_ode_trajectory::data::linspace(0.0, 2.0, 21);
    let exact_final = (-2.0_f64).exp();

    let fixed = OdeConfig {
        step_size: Some(step),
        ..OdeConfig::default()
    };

    for method in [Method::Euler, Method::Midpoint, Method::Rk4, Method::Dopri5] {
        let config = if method.is_adaptive() {
            OdeConfig::default()
        } else {
            fixed.clone()
        };
        let integrator = Integrator::new(method, config);

        let start = std::time::Instant::now();
        let states = integrator.integrate(&decay, &z0, &times)?;
        let duration = start.elapsed();

        let final_value = states[[times.len() - 1, 0]];
        let error = (final_value - exact_final).abs();

        info!("{} solver:", method);
        info!("  Final value: {:.10}", final_value);
        info!("  Exact value: {:.10}", exact_final);
        info!("  Error:       {:.2e}", error);
        info!("  Time:        {:?}", duration);
    }

    Ok(())
}
