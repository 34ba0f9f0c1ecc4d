use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use thicket_system_movement::MotionConfig;
use thicket_world::{LayerKind, LayoutLayer, LevelLayout, WorldConfig};

const SUPPORTED_MANIFEST_VERSION: u32 = 1;

/// Arena simulated when no manifest is supplied: a walled field split by a
/// hedge with a single gap, rocks near the player, and three enemy spawns.
const ARENA_BOUNDARY: &str = "\
0,0,0,0,0,0,0,0,0,0,0,0
0,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,0
0,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,0
0,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,0
0,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,0
0,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,0
0,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,0
0,0,0,0,0,0,0,0,0,0,0,0
";

const ARENA_VEGETATION: &str = "\
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,8,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,8,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,8,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,8,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,8,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
";

const ARENA_OBJECTS: &str = "\
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,20,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,20,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
";

const ARENA_ENTITIES: &str = "\
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,390,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,391,-1,-1,-1,-1,-1,-1,-1,394,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,392,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1,-1
";

/// Level layers plus the tunables a manifest carries alongside them.
#[derive(Debug)]
pub(crate) struct LoadedLevel {
    pub(crate) layout: LevelLayout,
    pub(crate) world: WorldConfig,
    pub(crate) motion: MotionConfig,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    version: u32,
    layers: LayerPaths,
    #[serde(default)]
    world: WorldConfig,
    #[serde(default)]
    motion: MotionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayerPaths {
    boundary: Option<PathBuf>,
    vegetation: Option<PathBuf>,
    object: Option<PathBuf>,
    entities: Option<PathBuf>,
}

impl LayerPaths {
    fn entries(&self) -> impl Iterator<Item = (LayerKind, &Path)> {
        [
            (LayerKind::Boundary, self.boundary.as_deref()),
            (LayerKind::Vegetation, self.vegetation.as_deref()),
            (LayerKind::Object, self.object.as_deref()),
            (LayerKind::Entities, self.entities.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.map(|path| (kind, path)))
    }
}

/// Reads a TOML level manifest and the CSV layers it references.
///
/// Layer paths are resolved relative to the manifest's directory.
pub(crate) fn load_manifest(path: impl AsRef<Path>) -> Result<LoadedLevel> {
    let manifest_path = path.as_ref();
    let contents = fs::read_to_string(manifest_path).with_context(|| {
        format!(
            "failed to read level manifest at {}",
            manifest_path.display()
        )
    })?;
    let base = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let manifest = parse_manifest(&contents)?;
    let mut layers = Vec::new();
    for (kind, relative_path) in manifest.layers.entries() {
        let layer_path = base.join(relative_path);
        let csv = fs::read_to_string(&layer_path).with_context(|| {
            format!("failed to read {kind:?} layer at {}", layer_path.display())
        })?;
        let layer = LayoutLayer::from_csv_str(kind, &csv)
            .with_context(|| format!("invalid {kind:?} layer at {}", layer_path.display()))?;
        layers.push(layer);
    }

    let layout = LevelLayout::new(layers)
        .with_context(|| format!("inconsistent layers in {}", manifest_path.display()))?;
    Ok(LoadedLevel {
        layout,
        world: manifest.world,
        motion: manifest.motion,
    })
}

fn parse_manifest(contents: &str) -> Result<Manifest> {
    let manifest: Manifest =
        toml::from_str(contents).context("failed to parse level manifest toml contents")?;
    if manifest.version != SUPPORTED_MANIFEST_VERSION {
        bail!(
            "unsupported level manifest version {}; expected {}",
            manifest.version,
            SUPPORTED_MANIFEST_VERSION
        );
    }
    if manifest.layers.entries().next().is_none() {
        bail!("level manifest does not reference any layers");
    }
    Ok(manifest)
}

/// Built-in arena used when no manifest is supplied.
pub(crate) fn builtin_arena() -> Result<LoadedLevel> {
    let layers = [
        (LayerKind::Boundary, ARENA_BOUNDARY),
        (LayerKind::Vegetation, ARENA_VEGETATION),
        (LayerKind::Object, ARENA_OBJECTS),
        (LayerKind::Entities, ARENA_ENTITIES),
    ]
    .into_iter()
    .map(|(kind, csv)| LayoutLayer::from_csv_str(kind, csv))
    .collect::<Result<Vec<_>, _>>()
    .context("built-in arena layers are malformed")?;

    Ok(LoadedLevel {
        layout: LevelLayout::new(layers).context("built-in arena layers disagree")?,
        world: WorldConfig::default(),
        motion: MotionConfig::default(),
    })
}
