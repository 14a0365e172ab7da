//! Popmode Demo Application
//!
//! Fits surrogate models to synthetic LIF ensembles and compares surrogate
//! output statistics against the full spiking simulation.
//!
//! # Usage
//!
//! ```bash
//! # Fit a surrogate to a 1-D ensemble and log the fitted parameters
//! popmode fit
//!
//! # Fit a 2-D ensemble with more neurons, write a JSON report
//! popmode fit --dims 2 --neurons 120 --report report.json
//!
//! # Skip noise estimation and fit the bias table only
//! popmode fit --bias-only
//!
//! # Spiking vs surrogate statistics at a fixed represented state
//! popmode compare --state 0.5 --duration 2.0
//! ```

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use popmode_core::stats::{mean, std_dev};
use popmode_core::{LifEnsemble, LifParameters, Population};
use popmode_surrogate::{
    sample_bias, BiasSurrogate, PopulationSurrogate, SurrogateConfig, SurrogateModel,
    TransferFunction,
};

/// Popmode Demo Application
#[derive(Parser, Debug)]
#[command(name = "popmode")]
#[command(author, version, about = "Surrogate models for spiking neural populations", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit a surrogate to a synthetic LIF ensemble (default if no subcommand)
    Fit {
        /// Represented state dimensions
        #[arg(short, long, default_value = "1")]
        dims: usize,

        /// Number of LIF neurons
        #[arg(short, long, default_value = "60")]
        neurons: usize,

        /// Representational radius, shared by every dimension
        #[arg(short, long, default_value = "1.0")]
        radius: f64,

        /// RNG seed for tuning, estimation and fitting
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// JSON surrogate configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write a JSON fit report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Skip noise estimation and fit the bias table only
        #[arg(long)]
        bias_only: bool,
    },

    /// Compare spiking output statistics against the fitted surrogate
    Compare {
        /// Represented state dimensions
        #[arg(short, long, default_value = "1")]
        dims: usize,

        /// Number of LIF neurons
        #[arg(short, long, default_value = "60")]
        neurons: usize,

        /// Representational radius, shared by every dimension
        #[arg(short, long, default_value = "1.0")]
        radius: f64,

        /// RNG seed for tuning, estimation and fitting
        #[arg(short, long, default_value = "42")]
        seed: u64,

        /// Represented state to hold, one value per dimension
        #[arg(long, value_delimiter = ',', default_value = "0.5")]
        state: Vec<f64>,

        /// Comparison duration in simulated seconds
        #[arg(long, default_value = "2.0")]
        duration: f64,

        /// JSON surrogate configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("popmode v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        None | Some(Commands::Fit { .. }) => {
            run_fit(cli.command)?;
        }
        Some(Commands::Compare {
            dims,
            neurons,
            radius,
            seed,
            state,
            duration,
            config,
        }) => {
            run_compare(dims, neurons, radius, seed, &state, duration, config.as_ref())?;
        }
    }

    Ok(())
}

/// JSON summary of a fit, written with `--report`.
#[derive(Serialize)]
struct FitReport {
    dims: usize,
    neurons: usize,
    radius: f64,
    seed: u64,
    grid_points: usize,
    output_dim: usize,
    elapsed_seconds: f64,
    transfer_functions: Vec<TransferFunction>,
    correlation: Vec<Vec<f64>>,
}

/// Build the synthetic ensemble both subcommands fit against: identity
/// decode over `dims` dimensions.
fn build_ensemble(
    dims: usize,
    neurons: usize,
    radius: f64,
    seed: u64,
) -> anyhow::Result<LifEnsemble> {
    let mut ensemble =
        LifEnsemble::new(neurons, vec![radius; dims], LifParameters::default(), seed)?;
    ensemble.add_origin("x", dims, |state: &DVector<f64>| state.clone())?;
    Ok(ensemble)
}

fn load_config(path: Option<&PathBuf>, seed: u64) -> anyhow::Result<SurrogateConfig> {
    let mut config: SurrogateConfig = match path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => SurrogateConfig::default(),
    };
    // The CLI seed applies unless the config file pins its own.
    if config.seed.is_none() {
        config.seed = Some(seed);
    }
    Ok(config)
}

/// Fit a surrogate and log (or dump) the fitted parameters
fn run_fit(command: Option<Commands>) -> anyhow::Result<()> {
    let (dims, neurons, radius, seed, config_path, report, bias_only) = match command {
        Some(Commands::Fit {
            dims,
            neurons,
            radius,
            seed,
            config,
            report,
            bias_only,
        }) => (dims, neurons, radius, seed, config, report, bias_only),
        _ => (1, 60, 1.0, 42, None, None, false),
    };

    let mut ensemble = build_ensemble(dims, neurons, radius, seed)?;
    let config = load_config(config_path.as_ref(), seed)?;

    info!(
        "Fitting {} surrogate: dims={}, neurons={}, radius={}",
        if bias_only { "bias-only" } else { "bias+noise" },
        dims,
        neurons,
        radius
    );

    let start = Instant::now();
    let report_data = if bias_only {
        let surrogate = BiasSurrogate::build(&mut ensemble, &config)?;
        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Bias table fitted in {:.2} s ({} grid points, {} output dims)",
            elapsed,
            surrogate.bias_table().grid().len(),
            surrogate.output_dim()
        );
        FitReport {
            dims,
            neurons,
            radius,
            seed,
            grid_points: surrogate.bias_table().grid().len(),
            output_dim: surrogate.output_dim(),
            elapsed_seconds: elapsed,
            transfer_functions: Vec::new(),
            correlation: Vec::new(),
        }
    } else {
        let surrogate = PopulationSurrogate::build(&mut ensemble, &config)?;
        let elapsed = start.elapsed().as_secs_f64();
        info!(
            "Surrogate fitted in {:.2} s ({} grid points, {} output dims)",
            elapsed,
            surrogate.bias_table().grid().len(),
            surrogate.output_dim()
        );
        for (dim, tf) in surrogate.transfer_functions().iter().enumerate() {
            info!(
                "dim {}: w0={:.1} rad/s, q={:.3}, a0={:.4e}, a1={:.4e}, a2={:.4e}",
                dim, tf.w0, tf.q, tf.a0, tf.a1, tf.a2
            );
        }
        info!("Noise correlation:\n{:.4}", surrogate.correlation());
        FitReport {
            dims,
            neurons,
            radius,
            seed,
            grid_points: surrogate.bias_table().grid().len(),
            output_dim: surrogate.output_dim(),
            elapsed_seconds: elapsed,
            transfer_functions: surrogate.transfer_functions().to_vec(),
            correlation: surrogate
                .correlation()
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect(),
        }
    };

    if let Some(path) = report {
        fs::write(&path, serde_json::to_string_pretty(&report_data)?)?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}

/// Hold a state, run the real spiking population and the surrogate side by
/// side, and report decoded statistics plus wall-clock speedup
fn run_compare(
    dims: usize,
    neurons: usize,
    radius: f64,
    seed: u64,
    state: &[f64],
    duration: f64,
    config_path: Option<&PathBuf>,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        state.len() == dims,
        "--state needs {} values, got {}",
        dims,
        state.len()
    );

    let mut ensemble = build_ensemble(dims, neurons, radius, seed)?;
    let config = load_config(config_path, seed)?;
    let dt = config.estimation.dt;
    let steps = ((duration / dt).round() as usize).max(1);

    let mut surrogate = PopulationSurrogate::build(&mut ensemble, &config)?;
    let output_dim = ensemble.output_dim();

    // Exact ideal + bias at the held state, for the surrogate path.
    let point = DMatrix::from_column_slice(dims, 1, state);
    let ideal = sample_bias(&ensemble, &point).ideal.column(0).into_owned();

    info!(
        "Comparing at state {:?} for {:.2} s ({} steps)",
        state, duration, steps
    );

    // Full spiking run.
    let state_vec = DVector::from_column_slice(state);
    let drive = ensemble.drive(&state_vec);
    ensemble.reset();
    let spiking_start = Instant::now();
    let mut spiking = DMatrix::zeros(output_dim, steps);
    for i in 0..steps {
        let t = i as f64 * dt;
        let activity = ensemble.spike_generator().run(&drive, t, t + dt);
        let mut row = 0;
        for origin in ensemble.origins() {
            let decoded = origin.decode(&activity);
            spiking
                .view_mut((row, i), (origin.dim(), 1))
                .copy_from(&decoded);
            row += origin.dim();
        }
    }
    let spiking_elapsed = spiking_start.elapsed().as_secs_f64();

    // Surrogate run: ideal + table bias + correlated noise per step.
    let surrogate_start = Instant::now();
    let mut approx = DMatrix::zeros(output_dim, steps);
    for i in 0..steps {
        let column = &ideal + surrogate.bias(state) + surrogate.noise(i as f64 * dt);
        approx.column_mut(i).copy_from(&column);
    }
    let surrogate_elapsed = surrogate_start.elapsed().as_secs_f64();

    // Skip the PSC warm-up transient at the start of the spiking run.
    let warmup = ((0.1 / dt).round() as usize).min(steps.saturating_sub(1));
    for dim in 0..output_dim {
        let spike_row: Vec<f64> = spiking.row(dim).iter().copied().collect();
        let approx_row: Vec<f64> = approx.row(dim).iter().copied().collect();
        info!(
            "dim {}: spiking {:.4} ± {:.4}, surrogate {:.4} ± {:.4}",
            dim,
            mean(&spike_row[warmup..]),
            std_dev(&spike_row[warmup..]),
            mean(&approx_row[warmup..]),
            std_dev(&approx_row[warmup..])
        );
    }

    info!(
        "Wall clock: spiking {:.3} s, surrogate {:.3} s ({:.1}x speedup)",
        spiking_elapsed,
        surrogate_elapsed,
        spiking_elapsed / surrogate_elapsed.max(1e-9)
    );

    Ok(())
}
