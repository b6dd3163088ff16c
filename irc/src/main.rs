//! IRC command-line interface
//!
//! Reads a YAML configuration, builds the model force field around the given
//! transition state and follows the reaction path downhill in both directions.

use color_eyre::eyre::Result;

mod app;
mod config;

use app::IrcApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    IrcApplication::from_cli()?.run()
}
