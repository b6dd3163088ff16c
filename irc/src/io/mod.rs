//! Logging setup and path output.

mod output;

pub use output::{
    print_xyz_frame, setup_output, write_energies, write_summary, write_trj, IrcSummary, WalkSummary,
    ENERGIES_FILE, SUMMARY_FILE, TRJ_FILE,
};
