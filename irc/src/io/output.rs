//! Output formatting and logging utilities

use crate::error::{IrcError, IrcResult};
use crate::irc_impl::{Direction, DirectionalWalk, InitialDisplacement, IrcPath, IrcRun};
use intcoords::constants::BOHR2ANG;
use nalgebra::DVector;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

pub const TRJ_FILE: &str = "irc.trj";
pub const ENERGIES_FILE: &str = "irc_energies";
pub const SUMMARY_FILE: &str = "irc_summary.yaml";

/// Timestamps with whole-second resolution
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let total_seconds = StdSystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Route log output to a file, or to stdout when no path is given
pub fn setup_output(output_path: Option<&String>) {
    match output_path {
        Some(path) => match File::create(path) {
            Ok(log) => {
                let file_layer = layer()
                    .with_writer(log)
                    .with_timer(SecondPrecisionTimer)
                    .with_ansi(false);
                Registry::default().with(file_layer).init();
                info!("Output will be written to: {}", path);
            }
            Err(err) => eprintln!("Could not create output file {}: {}", path, err),
        },
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            Registry::default().with(stdout_layer).init();
            info!("Output will be printed to stdout");
        }
    }
}

/// One XYZ frame in Angstrom; `coords` is a flat 3N vector in Bohr
pub fn print_xyz_frame<W: Write>(
    writer: &mut W,
    atoms: &[String],
    coords: &DVector<f64>,
    comment: &str,
) -> IrcResult<()> {
    if coords.len() != 3 * atoms.len() {
        return Err(IrcError::DimensionMismatch {
            context: "trajectory frame",
            expected: 3 * atoms.len(),
            actual: coords.len(),
        });
    }
    writeln!(writer, "{}", atoms.len())?;
    writeln!(writer, "{}", comment)?;
    for (atom, xyz) in atoms.iter().zip(coords.as_slice().chunks_exact(3)) {
        writeln!(
            writer,
            "{:<2} {:>14.8} {:>14.8} {:>14.8}",
            atom,
            xyz[0] * BOHR2ANG,
            xyz[1] * BOHR2ANG,
            xyz[2] * BOHR2ANG
        )?;
    }
    Ok(())
}

/// Every path point as an XYZ frame with its energy as the comment line
pub fn write_trj(dir: &Path, atoms: &[String], path: &IrcPath) -> IrcResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let target = dir.join(TRJ_FILE);
    let mut writer = BufWriter::new(File::create(&target)?);
    for (coords, energy) in path.coords.iter().zip(&path.energies) {
        print_xyz_frame(&mut writer, atoms, coords, &format!("{:.10}", energy))?;
    }
    writer.flush()?;
    info!("Wrote {} frames to {}", path.len(), target.display());
    Ok(target)
}

/// One energy per line, in path order
pub fn write_energies(dir: &Path, path: &IrcPath) -> IrcResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let target = dir.join(ENERGIES_FILE);
    let mut writer = BufWriter::new(File::create(&target)?);
    for energy in &path.energies {
        writeln!(writer, "{:.18e}", energy)?;
    }
    writer.flush()?;
    Ok(target)
}

#[derive(Debug, Clone, Serialize)]
pub struct WalkSummary {
    pub direction: Direction,
    pub steps: usize,
    pub termination: String,
    pub final_energy: Option<f64>,
    pub internal_rebuilds: usize,
    pub energies: Vec<f64>,
    pub internal_gradient_rms: Vec<f64>,
}

impl From<&DirectionalWalk> for WalkSummary {
    fn from(walk: &DirectionalWalk) -> Self {
        WalkSummary {
            direction: walk.direction,
            steps: walk.steps(),
            termination: walk.termination.to_string(),
            final_energy: walk.energies.last().copied(),
            internal_rebuilds: walk.internal_rebuilds,
            energies: walk.energies.clone(),
            internal_gradient_rms: walk.internal_gradient_rms.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IrcSummary {
    pub ts_energy: f64,
    pub ts_index: usize,
    pub path_length: usize,
    pub transition_mode: usize,
    pub transition_eigenvalue: f64,
    pub initial_step_length: f64,
    pub degenerate_modes: Vec<(usize, f64)>,
    pub walks: Vec<WalkSummary>,
}

impl IrcSummary {
    pub fn new(run: &IrcRun, init: &InitialDisplacement, ts_energy: f64) -> Self {
        let walks = run
            .forward
            .iter()
            .chain(run.backward.iter())
            .map(WalkSummary::from)
            .collect();
        IrcSummary {
            ts_energy,
            ts_index: run.path.ts_index,
            path_length: run.path.len(),
            transition_mode: init.mode_index,
            transition_eigenvalue: init.eigenvalue,
            initial_step_length: init.step_length,
            degenerate_modes: init
                .degeneracy
                .as_ref()
                .map(|d| d.competing.clone())
                .unwrap_or_default(),
            walks,
        }
    }
}

pub fn write_summary(dir: &Path, summary: &IrcSummary) -> IrcResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let target = dir.join(SUMMARY_FILE);
    let yaml = serde_yml::to_string(summary).map_err(|e| IrcError::Io(e.to_string()))?;
    fs::write(&target, yaml)?;
    Ok(target)
}
