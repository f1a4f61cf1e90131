use anyhow::{Context, Result, bail};
use env_logger::Builder;
use log::{LevelFilter, info};
use mmwave_sidelink_simulator::common::scene::load_scene;
use mmwave_sidelink_simulator::simulation::Simulation;
use std::env;

fn main() -> Result<()> {
    // Logging setup; RUST_LOG overrides the defaults
    let mut builder = Builder::new();
    builder
        .filter_level(LevelFilter::Info)
        .filter(Some("mmwave_sidelink_simulator"), LevelFilter::Debug);
    if let Ok(spec) = env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.init();

    let Some(scene_path) = env::args().nth(1) else {
        bail!("usage: mmwave-sidelink-simulator <scene.json|scene.toml>");
    };

    info!("Starting up with scene {}", scene_path);
    let scene = load_scene(&scene_path).with_context(|| format!("Could not load scene {}", scene_path))?;
    let mut simulation = Simulation::from_scene(&scene).context("Could not build the simulation")?;
    let report = simulation.run().context("Simulation halted")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
