use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use glam::DVec3;
use indicatif::ProgressBar;
use rusty_grains::vtk::write_vtk;
use rusty_grains::{
    ContactLaw, Dimension, LawTable, MaterialParams, MaterialTable, Particle, Result, Scene, Simulation,
    SimulationConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scene file (JSON); a random column is generated when omitted
    #[arg(short, long)]
    scene: Option<PathBuf>,

    /// Number of particles in the generated column
    #[arg(short, long, default_value_t = 500)]
    count: usize,

    /// Number of steps, overriding the scene
    #[arg(long)]
    steps: Option<u64>,

    /// Steps between outputs, overriding the scene
    #[arg(short, long)]
    interval: Option<u64>,

    /// Directory for VTK output
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Worker threads (rayon default when omitted)
    #[arg(short, long)]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            log::warn!("failed to set thread count: {}", e);
        }
    }

    let mut sim = match &args.scene {
        Some(path) => {
            log::info!("loading scene from {}", path.display());
            Simulation::from_scene(&Scene::load(path)?)?
        }
        None => column(args.count)?,
    };

    let steps = args.steps.unwrap_or(sim.config().steps);
    let interval = args.interval.unwrap_or(sim.config().output_interval).max(1);

    fs::create_dir_all(&args.output)?;
    write_vtk(args.output.join("step_00000.vtk"), sim.particles())?;

    let bar = ProgressBar::new(steps);
    let mut written = 0;
    for _ in 0..steps {
        sim.step()?;
        let step = sim.state().step;
        if step % interval == 0 {
            let path = args.output.join(format!("step_{:05}.vtk", step));
            if let Err(e) = write_vtk(&path, sim.particles()) {
                log::warn!("failed to write {}: {}", path.display(), e);
            } else {
                written += 1;
            }
        }
        bar.inc(1);
    }
    bar.finish();

    let d = sim.diagnostics();
    log::info!(
        "done: step {}, t = {:.4}, kinetic energy {:.6e}, {} active contacts, {} files written",
        d.step,
        d.time,
        d.kinetic_energy,
        d.active_contacts,
        written
    );
    Ok(())
}

/// Particles dropped into a column above a fixed floor of disks.
fn column(count: usize) -> Result<Simulation> {
    let radius = 0.02;
    let params = MaterialParams::new(2.0e4, 2.0, 1.0e4, 0.5);
    let mut materials = MaterialTable::new();
    materials.insert(0, params)?;

    let config = SimulationConfig {
        dimension: Dimension::Two,
        skin: 0.5 * radius,
        dt: 1e-4,
        steps: 20_000,
        output_interval: 500,
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(config, materials, LawTable::new(ContactLaw::FRICTION))?;

    // Floor
    let mut x = -0.4;
    while x <= 0.4 {
        sim.add_particle(Particle::new(DVec3::new(x, 0.0, 0.0), radius, 1.0).fixed())?;
        x += 2.0 * radius;
    }

    let mut rng = fastrand::Rng::new();
    for _ in 0..count {
        let x = rng.f64() * 0.7 - 0.35;
        let y = rng.f64() * 3.0 + 0.1;
        let r = radius * (0.75 + 0.25 * rng.f64());
        sim.add_particle(Particle::new(DVec3::new(x, y, 0.0), r, 1.0))?;
    }
    log::info!(
        "generated column with {} particles, contact duration {:.2e} s",
        sim.particles().count(),
        params.contact_duration(1.0, 1.0)
    );
    Ok(sim)
}
