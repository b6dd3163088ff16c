mod geometry;
mod report;
mod runner;

pub use geometry::{build_geometry, Geometry};
pub use runner::{build_irc_config, build_model, output_directory};

use self::report::{report_initial_displacement, report_run};
use crate::config::{Args, Config};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use intcoords::to_cart;
use irc::io::{setup_output, write_energies, write_summary, write_trj, IrcSummary};
use irc::Irc;
use std::fs;
use tracing::info;

pub struct IrcApplication {
    args: Args,
    config: Config,
}

impl IrcApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());
        info!("Configuration loaded from {}", self.args.config_file);

        let geometry = build_geometry(&self.config)?;
        let irc_config = build_irc_config(&self.args, &self.config)?;
        let model = build_model(&self.config, &geometry, &irc_config)?;

        let mut irc = Irc::new(model, to_cart(&geometry.coords3d), irc_config)
            .wrap_err("Failed to set up the IRC at the transition state")?;
        report_initial_displacement(irc.initial_displacement(), irc.ts_energy());

        let run = irc.run();
        report_run(&run);
        info!(
            "Force field evaluations: {}",
            irc.provider().evaluations()
        );

        let out_dir = output_directory(&self.args, &self.config);
        let trj = write_trj(&out_dir, &geometry.atoms, &run.path)
            .wrap_err("Failed to write the trajectory")?;
        let energies =
            write_energies(&out_dir, &run.path).wrap_err("Failed to write the energies")?;
        let summary = IrcSummary::new(&run, irc.initial_displacement(), irc.ts_energy());
        let summary_file =
            write_summary(&out_dir, &summary).wrap_err("Failed to write the summary")?;
        info!(
            "Results written to {}, {} and {}",
            trj.display(),
            energies.display(),
            summary_file.display()
        );

        Ok(())
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults();

    Ok(config)
}
