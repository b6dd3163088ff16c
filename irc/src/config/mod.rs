//! Configuration management for IRC runs
//!
//! Every section is optional in the YAML file; missing values are filled in
//! by `with_defaults()` so the rest of the application can rely on them.

mod args;

pub use args::Args;

use intcoords::Primitive;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub geometry: Vec<Atom>,
    /// Z-matrix alternative to `geometry`, always in Angstrom and degrees
    pub zmat: Option<String>,
    pub units: Option<Units>,
    #[serde(default)]
    pub irc: IrcParams,
    #[serde(default)]
    pub coordinates: CoordinateParams,
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub output: OutputParams,
}

/// Atomic position configuration
#[derive(Debug, Deserialize, Serialize)]
pub struct Atom {
    pub element: String,
    pub coords: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Angstrom,
    Bohr,
}

/// Path-following parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IrcParams {
    pub step_length: Option<f64>,
    pub max_steps: Option<usize>,
    pub forward: Option<bool>,
    pub backward: Option<bool>,
    pub energy_lowering: Option<f64>,
    pub energy_thresh: Option<f64>,
    pub stepper: Option<String>, // "euler" or "hessian_predictor"
    pub hessian_update: Option<String>, // "bofill" or "none"
    pub hessian_recalc: Option<usize>,
    pub degenerate_mode_ratio: Option<f64>,
}

impl Default for IrcParams {
    fn default() -> Self {
        IrcParams {
            step_length: Some(0.1),
            max_steps: Some(10),
            forward: Some(true),
            backward: Some(true),
            energy_lowering: Some(2.5e-4),
            energy_thresh: Some(1e-5),
            stepper: Some("euler".to_string()),
            hessian_update: Some("bofill".to_string()),
            hessian_recalc: None,
            degenerate_mode_ratio: Some(0.5),
        }
    }
}

impl IrcParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        self.step_length = self.step_length.or(defaults.step_length);
        self.max_steps = self.max_steps.or(defaults.max_steps);
        self.forward = self.forward.or(defaults.forward);
        self.backward = self.backward.or(defaults.backward);
        self.energy_lowering = self.energy_lowering.or(defaults.energy_lowering);
        self.energy_thresh = self.energy_thresh.or(defaults.energy_thresh);
        self.stepper = self.stepper.or(defaults.stepper);
        self.hessian_update = self.hessian_update.or(defaults.hessian_update);
        self.degenerate_mode_ratio = self.degenerate_mode_ratio.or(defaults.degenerate_mode_ratio);
        self
    }
}

/// Primitive validity thresholds and user-defined primitives
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoordinateParams {
    pub bend_min_deg: Option<f64>,
    pub dihedral_max_deg: Option<f64>,
    pub linear_bend_min_deg: Option<f64>,
    pub define_prims: Option<Vec<Primitive>>,
}

impl Default for CoordinateParams {
    fn default() -> Self {
        CoordinateParams {
            bend_min_deg: Some(15.0),
            dihedral_max_deg: Some(175.0),
            linear_bend_min_deg: Some(175.0),
            define_prims: Some(Vec::new()),
        }
    }
}

impl CoordinateParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        self.bend_min_deg = self.bend_min_deg.or(defaults.bend_min_deg);
        self.dihedral_max_deg = self.dihedral_max_deg.or(defaults.dihedral_max_deg);
        self.linear_bend_min_deg = self.linear_bend_min_deg.or(defaults.linear_bend_min_deg);
        self.define_prims = self.define_prims.or(defaults.define_prims);
        self
    }
}

/// Valence force-field parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelSection {
    pub bond_k: Option<f64>,
    pub bend_k: Option<f64>,
    pub torsion_barrier: Option<f64>,
    pub torsion_periodicity: Option<u32>,
}

impl Default for ModelSection {
    fn default() -> Self {
        let params = irc::ModelParams::default();
        ModelSection {
            bond_k: Some(params.bond_k),
            bend_k: Some(params.bend_k),
            torsion_barrier: Some(params.torsion_barrier),
            torsion_periodicity: Some(params.torsion_periodicity),
        }
    }
}

impl ModelSection {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        self.bond_k = self.bond_k.or(defaults.bond_k);
        self.bend_k = self.bend_k.or(defaults.bend_k);
        self.torsion_barrier = self.torsion_barrier.or(defaults.torsion_barrier);
        self.torsion_periodicity = self.torsion_periodicity.or(defaults.torsion_periodicity);
        self
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputParams {
    pub directory: Option<String>,
}

impl Default for OutputParams {
    fn default() -> Self {
        OutputParams {
            directory: Some(".".to_string()),
        }
    }
}

impl OutputParams {
    pub fn with_defaults(mut self) -> Self {
        self.directory = self.directory.or(Self::default().directory);
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.units = self.units.or(Some(Units::default()));
        self.irc = self.irc.with_defaults();
        self.coordinates = self.coordinates.with_defaults();
        self.model = self.model.with_defaults();
        self.output = self.output.with_defaults();
        self
    }
}
