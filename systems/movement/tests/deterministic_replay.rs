use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use thicket_core::{Aabb, AgentId, CellCoord, ColliderKind, Command, Event, MotionPhase};
use thicket_system_movement::{Agent, Movement};
use thicket_world::{self as world, LayerKind, LayoutLayer, LevelLayout, World, WorldConfig};

const BOUNDARY: &str = "\
0,0,0,0,0,0,0,0,0,0
0,-1,-1,-1,-1,-1,-1,-1,-1,0
0,-1,-1,-1,-1,-1,-1,-1,-1,0
0,-1,-1,-1,-1,-1,-1,-1,-1,0
0,-1,-1,-1,-1,-1,-1,-1,-1,0
0,0,0,0,0,0,0,0,0,0
";

const OBJECTS: &str = "\
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,3,-1,-1,-1,-1,-1,-1
-1,-1,-1,3,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
";

const VEGETATION: &str = "\
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,8,-1,-1,-1
-1,-1,-1,-1,-1,-1,8,-1,-1,-1
-1,-1,-1,-1,-1,-1,8,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
";

const FRAMES: u64 = 180;

#[test]
fn deterministic_replay_produces_identical_fingerprints() {
    let first = replay(scripted_commands());
    let second = replay(scripted_commands());

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert!(first
        .events
        .iter()
        .any(|event| matches!(event, EventRecord::TerrainCleared { .. })));
    assert!(first.events.iter().any(|event| matches!(
        event,
        EventRecord::AgentAdvanced {
            phase: MotionPhase::Knockback,
            ..
        }
    )));
}

#[test]
fn replay_is_independent_of_agent_submission_order() {
    let forward = replay(scripted_commands());
    let reversed = replay_with(scripted_commands(), true);

    assert_eq!(forward.fingerprint(), reversed.fingerprint());
}

fn replay(commands: Vec<Scripted>) -> ReplayOutcome {
    replay_with(commands, false)
}

fn replay_with(commands: Vec<Scripted>, reverse_agents: bool) -> ReplayOutcome {
    let mut world = World::from_layout(&level(), WorldConfig::default()).expect("world");
    let mut agents = spawn_agents();
    if reverse_agents {
        agents.reverse();
    }
    let mut movement = Movement::default();
    let target = DVec2::new(8.5 * 64.0, 2.5 * 64.0);
    let mut log = Vec::new();

    for command in commands {
        match command {
            Scripted::World(command) => {
                let mut events = Vec::new();
                world::apply(&mut world, command, &mut events);
                record_events(&events, &mut log);

                let mut motion_events = Vec::new();
                movement.handle(&events, &mut agents, target, &world, &mut motion_events);
                record_events(&motion_events, &mut log);
            }
            Scripted::Knockback { agent, source } => {
                if let Some(agent) = agents.iter_mut().find(|candidate| candidate.id() == agent) {
                    agent.apply_knockback(source, 9.0);
                }
            }
        }
    }

    agents.sort_by_key(Agent::id);
    let agents = agents.iter().map(AgentState::from).collect();
    ReplayOutcome { agents, events: log }
}

fn level() -> LevelLayout {
    LevelLayout::new(vec![
        LayoutLayer::from_csv_str(LayerKind::Boundary, BOUNDARY).expect("boundary"),
        LayoutLayer::from_csv_str(LayerKind::Object, OBJECTS).expect("objects"),
        LayoutLayer::from_csv_str(LayerKind::Vegetation, VEGETATION).expect("vegetation"),
    ])
    .expect("layout")
}

fn spawn_agents() -> Vec<Agent> {
    let mut rng = ChaCha8Rng::seed_from_u64(0x0dd5_eed5);
    (0..4_u32)
        .map(|id| {
            let center = DVec2::new(
                rng.gen_range(80.0..180.0),
                rng.gen_range(80.0..300.0),
            );
            let collider = if id % 2 == 0 {
                ColliderKind::SpatialHash
            } else {
                ColliderKind::LinearScan
            };
            Agent::new(
                AgentId::new(id),
                Aabb::from_center(center, 22.0, 22.0),
                rng.gen_range(2.0..4.0),
                collider,
            )
        })
        .collect()
}

enum Scripted {
    World(Command),
    Knockback { agent: AgentId, source: DVec2 },
}

fn scripted_commands() -> Vec<Scripted> {
    let mut commands = Vec::new();
    for frame in 0..FRAMES {
        if frame == 40 {
            for row in 1..=3 {
                commands.push(Scripted::World(Command::ClearTerrain {
                    cell: CellCoord::new(6, row),
                }));
            }
        }
        if frame == 70 {
            commands.push(Scripted::Knockback {
                agent: AgentId::new(1),
                source: DVec2::new(600.0, 160.0),
            });
        }
        commands.push(Scripted::World(Command::Tick));
    }
    commands
}

fn record_events(events: &[Event], log: &mut Vec<EventRecord>) {
    log.extend(events.iter().map(EventRecord::from));
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ReplayOutcome {
    agents: Vec<AgentState>,
    events: Vec<EventRecord>,
}

impl ReplayOutcome {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct AgentState {
    id: AgentId,
    hitbox_bits: [u64; 4],
    direction_bits: [u64; 2],
    waypoints: Vec<CellCoord>,
}

impl From<&Agent> for AgentState {
    fn from(agent: &Agent) -> Self {
        let hitbox = agent.hitbox();
        Self {
            id: agent.id(),
            hitbox_bits: [
                hitbox.left().to_bits(),
                hitbox.top().to_bits(),
                hitbox.width().to_bits(),
                hitbox.height().to_bits(),
            ],
            direction_bits: [agent.direction().x.to_bits(), agent.direction().y.to_bits()],
            waypoints: agent.path().iter().copied().collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum EventRecord {
    TimeAdvanced {
        frame: u64,
    },
    SpatialIndexRebuilt {
        entries: usize,
    },
    TerrainCleared {
        cell: CellCoord,
    },
    PathPlanned {
        agent: AgentId,
        waypoints: usize,
    },
    PathDiscarded {
        agent: AgentId,
    },
    AgentAdvanced {
        agent: AgentId,
        phase: MotionPhase,
        to_bits: [u64; 2],
    },
    KnockbackExpired {
        agent: AgentId,
    },
}

impl From<&Event> for EventRecord {
    fn from(event: &Event) -> Self {
        match event {
            Event::TimeAdvanced { frame } => Self::TimeAdvanced { frame: *frame },
            Event::SpatialIndexRebuilt { entries } => Self::SpatialIndexRebuilt { entries: *entries },
            Event::TerrainCleared { cell, .. } => Self::TerrainCleared { cell: *cell },
            Event::PathPlanned { agent, waypoints } => Self::PathPlanned {
                agent: *agent,
                waypoints: *waypoints,
            },
            Event::PathDiscarded { agent } => Self::PathDiscarded { agent: *agent },
            Event::AgentAdvanced {
                agent, phase, to, ..
            } => Self::AgentAdvanced {
                agent: *agent,
                phase: *phase,
                to_bits: [to.x.to_bits(), to.y.to_bits()],
            },
            Event::KnockbackExpired { agent } => Self::KnockbackExpired { agent: *agent },
        }
    }
}
