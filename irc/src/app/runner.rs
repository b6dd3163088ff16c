use crate::app::Geometry;
use crate::config::{Args, Config};
use color_eyre::eyre::{Result, WrapErr};
use intcoords::ValidityThresholds;
use irc::hessian_update::HessianUpdate;
use irc::irc_impl::StepperKind;
use irc::{IrcConfig, ModelParams, ValenceForceField};
use std::path::PathBuf;
use tracing::info;

/// Merge the configuration file with the command-line overrides.
pub fn build_irc_config(args: &Args, config: &Config) -> Result<IrcConfig> {
    let defaults = IrcConfig::default();
    let params = &config.irc;
    let coordinates = &config.coordinates;

    let stepper = match args.stepper.as_deref().or(params.stepper.as_deref()) {
        Some(name) => name.parse::<StepperKind>()?,
        None => defaults.stepper,
    };
    let hessian_update = match params.hessian_update.as_deref() {
        Some(name) => name.parse::<HessianUpdate>()?,
        None => defaults.hessian_update,
    };
    let (forward, backward) = if args.forward_only {
        (true, false)
    } else if args.backward_only {
        (false, true)
    } else {
        (
            params.forward.unwrap_or(defaults.forward),
            params.backward.unwrap_or(defaults.backward),
        )
    };
    let default_thresholds = ValidityThresholds::default();

    let irc_config = IrcConfig {
        step_length: args
            .step_length
            .or(params.step_length)
            .unwrap_or(defaults.step_length),
        max_steps: args
            .max_steps
            .or(params.max_steps)
            .unwrap_or(defaults.max_steps),
        forward,
        backward,
        energy_lowering: args
            .energy_lowering
            .or(params.energy_lowering)
            .unwrap_or(defaults.energy_lowering),
        energy_thresh: params.energy_thresh.unwrap_or(defaults.energy_thresh),
        stepper,
        hessian_update,
        hessian_recalc: params.hessian_recalc,
        degenerate_mode_ratio: params
            .degenerate_mode_ratio
            .unwrap_or(defaults.degenerate_mode_ratio),
        thresholds: ValidityThresholds {
            bend_min_deg: coordinates
                .bend_min_deg
                .unwrap_or(default_thresholds.bend_min_deg),
            dihedral_max_deg: coordinates
                .dihedral_max_deg
                .unwrap_or(default_thresholds.dihedral_max_deg),
            linear_bend_min_deg: coordinates
                .linear_bend_min_deg
                .unwrap_or(default_thresholds.linear_bend_min_deg),
        },
        define_prims: coordinates.define_prims.clone().unwrap_or_default(),
    };
    irc_config
        .validate()
        .wrap_err("Invalid IRC parameters")?;

    info!(
        "IRC: step length {}, max steps {}, stepper {:?}, Hessian update {:?}",
        irc_config.step_length, irc_config.max_steps, irc_config.stepper, irc_config.hessian_update
    );
    Ok(irc_config)
}

/// Valence force field with its reference at the transition state.
pub fn build_model(
    config: &Config,
    geometry: &Geometry,
    irc_config: &IrcConfig,
) -> Result<ValenceForceField> {
    let defaults = ModelParams::default();
    let params = ModelParams {
        bond_k: config.model.bond_k.unwrap_or(defaults.bond_k),
        bend_k: config.model.bend_k.unwrap_or(defaults.bend_k),
        torsion_barrier: config
            .model
            .torsion_barrier
            .unwrap_or(defaults.torsion_barrier),
        torsion_periodicity: config
            .model
            .torsion_periodicity
            .unwrap_or(defaults.torsion_periodicity),
    };
    let model = ValenceForceField::new(
        geometry.atoms.clone(),
        &geometry.coords3d,
        params,
        irc_config.thresholds,
    )
    .wrap_err("Failed to build the force field")?;
    info!("Force field with {} terms", model.terms().len());
    Ok(model)
}

pub fn output_directory(args: &Args, config: &Config) -> PathBuf {
    let dir = args
        .out_dir
        .as_deref()
        .or(config.output.directory.as_deref())
        .unwrap_or(".");
    PathBuf::from(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn config(yaml: &str) -> Config {
        serde_yml::from_str::<Config>(yaml).unwrap().with_defaults()
    }

    #[test]
    fn test_arguments_override_file() {
        let cfg = config("irc:\n  step_length: 0.2\n  max_steps: 30\n  stepper: euler\n");
        let args = Args::parse_from([
            "irc",
            "--step-length",
            "0.05",
            "--stepper",
            "hp",
            "--backward-only",
        ]);
        let irc_config = build_irc_config(&args, &cfg).unwrap();
        assert_eq!(irc_config.step_length, 0.05);
        assert_eq!(irc_config.max_steps, 30);
        assert_eq!(irc_config.stepper, StepperKind::HessianPredictor);
        assert!(!irc_config.forward);
        assert!(irc_config.backward);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let args = Args::parse_from(["irc"]);
        assert!(build_irc_config(&args, &config("irc:\n  step_length: -1.0\n")).is_err());
        assert!(build_irc_config(&args, &config("irc:\n  stepper: rk4\n")).is_err());
        assert!(
            build_irc_config(&args, &config("irc:\n  forward: false\n  backward: false\n"))
                .is_err()
        );
    }

    #[test]
    fn test_output_directory_precedence() {
        let cfg = config("output:\n  directory: runs\n");
        assert_eq!(output_directory(&Args::parse_from(["irc"]), &cfg), PathBuf::from("runs"));
        let args = Args::parse_from(["irc", "--out-dir", "elsewhere"]);
        assert_eq!(output_directory(&args, &cfg), PathBuf::from("elsewhere"));
    }
}
