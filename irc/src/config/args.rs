//! Command-line argument parsing for IRC runs

use clap::Parser;

/// Intrinsic reaction coordinate from a transition state, YAML configured
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Only walk in the forward direction
    #[arg(long, conflicts_with = "backward_only")]
    pub forward_only: bool,

    /// Only walk in the backward direction
    #[arg(long)]
    pub backward_only: bool,

    /// Override step length (Bohr)
    #[arg(long)]
    pub step_length: Option<f64>,

    /// Override maximum number of steps per direction
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Override energy lowering of the initial displacement (Hartree)
    #[arg(long)]
    pub energy_lowering: Option<f64>,

    /// Path stepper (euler or hessian_predictor)
    #[arg(long)]
    pub stepper: Option<String>,

    /// Directory for trajectory, energies and summary
    #[arg(long)]
    pub out_dir: Option<String>,
}
