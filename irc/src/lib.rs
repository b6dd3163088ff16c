// Reaction path following on top of redundant internal coordinates

pub mod error;
pub mod hessian_update;
pub mod io;
pub mod irc_impl;
pub mod model;
pub mod provider;

pub use error::{IrcError, IrcResult};
pub use irc_impl::{Direction, Irc, IrcConfig, IrcPath, IrcRun, Termination};
pub use model::{ModelParams, ValenceForceField};
pub use provider::CoordinateProvider;
