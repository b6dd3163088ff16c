use irc::irc_impl::{DirectionalWalk, InitialDisplacement, IrcRun};
use tracing::info;

pub fn report_initial_displacement(init: &InitialDisplacement, ts_energy: f64) {
    info!("\nTransition state energy: {:.10} au", ts_energy);
    info!(
        "Transition mode {} with mass-weighted eigenvalue {:.6e}",
        init.mode_index, init.eigenvalue
    );
    info!("Negative eigenvalues at the TS: {}", init.modes.negative_count());
    info!("Initial displacement length: {:.6} Bohr", init.step_length);
    if let Some(degeneracy) = &init.degeneracy {
        info!("Competing transition modes: {:?}", degeneracy.competing);
    }
}

pub fn report_run(run: &IrcRun) {
    info!("\nIRC finished.");
    for walk in run.forward.iter().chain(run.backward.iter()) {
        report_walk(walk);
    }

    let path = &run.path;
    info!("\nPath with {} points, TS at index {}:", path.len(), path.ts_index);
    let ts_energy = path.energies[path.ts_index];
    for (i, energy) in path.energies.iter().enumerate() {
        let marker = if i == path.ts_index { " <- TS" } else { "" };
        info!(
            "  {:>4}: {:.10} au  dE = {:+.6e}{}",
            i,
            energy,
            energy - ts_energy,
            marker
        );
    }
}

fn report_walk(walk: &DirectionalWalk) {
    let final_energy = walk
        .energies
        .last()
        .map(|e| format!("{:.10} au", e))
        .unwrap_or_else(|| "n/a".to_string());
    info!(
        "  {:<8} {:>3} steps, final energy {}, {}",
        walk.direction.to_string(),
        walk.steps(),
        final_energy,
        walk.termination
    );
    if let Some(rms) = walk.internal_gradient_rms.last() {
        info!("           rms(internal gradient) at the last point {:.6e}", rms);
    }
    if walk.internal_rebuilds > 0 {
        info!(
            "           internal coordinates rebuilt {} times",
            walk.internal_rebuilds
        );
    }
}
