#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs a headless, frame-stepped Thicket simulation.

mod level;

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use glam::DVec2;
use log::info;
use thicket_core::{Aabb, AgentId, CellCoord, ColliderKind, Command, Event, MotionPhase};
use thicket_system_movement::{Agent, Movement};
use thicket_world::{self as world, query, ObstacleKind, SpawnKind, World, WorldConfig};

const AGENT_EXTENT_TILES: f64 = 0.6;

#[derive(Parser, Debug)]
#[command(
    name = "thicket",
    version,
    about = "Step enemies toward the player through a tile level and report where they end up"
)]
struct Cli {
    /// TOML level manifest listing CSV layers; the built-in arena is used when omitted.
    #[arg(long)]
    level: Option<PathBuf>,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 600)]
    frames: u64,

    /// Tile edge length in pixels, overriding the manifest.
    #[arg(long)]
    tile_size: Option<f64>,

    /// Spatial hash bucket edge length in pixels, overriding the manifest.
    #[arg(long)]
    cell_size: Option<f64>,

    /// Enemy speed in pixels per frame.
    #[arg(long, default_value_t = 3.0)]
    speed: f64,

    /// Frame at which every vegetation tile is cleared.
    #[arg(long, default_value_t = 200)]
    clear_frame: u64,

    /// Frame at which every enemy is knocked away from the target.
    #[arg(long, default_value_t = 100)]
    hit_frame: u64,

    /// Knockback strength of the scripted hit in pixels per frame.
    #[arg(long, default_value_t = 8.0)]
    hit_strength: f64,

    /// Route collision checks through a linear scan of every obstacle.
    #[arg(long)]
    linear_scan: bool,

    /// Suppress the per-agent summary.
    #[arg(long)]
    quiet: bool,
}

/// Entry point for the Thicket command-line interface.
fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let loaded = match &cli.level {
        Some(path) => level::load_manifest(path)?,
        None => level::builtin_arena()?,
    };
    let config = WorldConfig {
        tile_size: cli.tile_size.unwrap_or(loaded.world.tile_size),
        spatial_cell_size: cli.cell_size.or(loaded.world.spatial_cell_size),
    };
    let mut world =
        World::from_layout(&loaded.layout, config).context("failed to assemble the level")?;

    let collider = if cli.linear_scan {
        ColliderKind::LinearScan
    } else {
        ColliderKind::SpatialHash
    };
    let (target, mut agents) = populate(&world, cli.speed, collider);
    info!(
        "simulating {} agents for {} frames toward {target:?}",
        agents.len(),
        cli.frames
    );

    let mut movement = Movement::new(loaded.motion);
    let mut tally = Tally::default();
    for frame in 0..cli.frames {
        let mut events = Vec::new();
        if frame == cli.clear_frame {
            for cell in vegetation_cells(&world) {
                world::apply(&mut world, Command::ClearTerrain { cell }, &mut events);
            }
        }
        if frame == cli.hit_frame {
            for agent in &mut agents {
                agent.apply_knockback(target, cli.hit_strength);
            }
        }
        world::apply(&mut world, Command::Tick, &mut events);
        tally.record(&events);

        let mut motion_events = Vec::new();
        movement.handle(&events, &mut agents, target, &world, &mut motion_events);
        tally.record(&motion_events);
    }

    if !cli.quiet {
        print_summary(&world, &agents, target, &tally);
    }
    Ok(())
}

/// Places an agent on every enemy spawn and returns the player position as the target.
fn populate(world: &World, speed: f64, collider: ColliderKind) -> (DVec2, Vec<Agent>) {
    let metrics = query::metrics(world);
    let extent = metrics.tile_size() * AGENT_EXTENT_TILES;
    let grid = query::grid(world);

    let mut target = metrics.cell_center(CellCoord::new(grid.columns() / 2, grid.rows() / 2));
    let mut agents = Vec::new();
    for spawn in query::spawn_points(world) {
        let center = metrics.cell_center(spawn.cell);
        match spawn.kind {
            SpawnKind::Player => target = center,
            SpawnKind::Enemy(_) => {
                let id = AgentId::new(u32::try_from(agents.len()).unwrap_or(u32::MAX));
                agents.push(Agent::new(
                    id,
                    Aabb::from_center(center, extent, extent),
                    speed,
                    collider,
                ));
            }
        }
    }
    (target, agents)
}

fn vegetation_cells(world: &World) -> Vec<CellCoord> {
    query::obstacles(world)
        .iter()
        .filter(|obstacle| obstacle.kind == ObstacleKind::Vegetation)
        .map(|obstacle| obstacle.cell)
        .collect()
}

#[derive(Debug, Default)]
struct Tally {
    plans: BTreeMap<AgentId, usize>,
    cleared: usize,
    knockback_frames: usize,
}

impl Tally {
    fn record(&mut self, events: &[Event]) {
        for event in events {
            match event {
                Event::PathPlanned { agent, .. } => *self.plans.entry(*agent).or_default() += 1,
                Event::TerrainCleared { .. } => self.cleared += 1,
                Event::AgentAdvanced {
                    phase: MotionPhase::Knockback,
                    ..
                } => self.knockback_frames += 1,
                _ => {}
            }
        }
    }
}

fn print_summary(world: &World, agents: &[Agent], target: DVec2, tally: &Tally) {
    let grid = query::grid(world);
    let stats = query::spatial_index(world).stats();
    println!(
        "level {}x{} tiles, {} obstacles, {} walkable cells",
        grid.columns(),
        grid.rows(),
        query::obstacles(world).len(),
        grid.walkable_count()
    );
    println!(
        "spatial index: {} entries in {} buckets (max {} per bucket)",
        stats.entries, stats.occupied_cells, stats.max_bucket_len
    );
    println!(
        "frame {}: target at ({:.1}, {:.1}), {} cells cleared, {} knockback frames",
        query::frame(world),
        target.x,
        target.y,
        tally.cleared,
        tally.knockback_frames
    );

    let reach = query::metrics(world).tile_size();
    for agent in agents {
        let center = agent.center();
        let distance = center.distance(target);
        println!(
            "agent {:>3}: ({:>7.1}, {:>7.1}) {:>7.1}px from target, {} plans{}",
            agent.id().get(),
            center.x,
            center.y,
            distance,
            tally.plans.get(&agent.id()).copied().unwrap_or(0),
            if distance <= reach { ", arrived" } else { "" }
        );
    }
}
