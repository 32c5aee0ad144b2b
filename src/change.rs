//! Change detection between two planet configurations.
//!
//! Rebuilding the terrain is expensive while re-placing decorations is cheap, so a diff tells the
//! two apart. The caller keeps the previous snapshot around and compares it with the current one.

use crate::{
    biome::{BiomeConfig, ScatterConfig},
    noise_field::NoiseSettings,
    planet::PlanetConfig,
};

use serde::{Deserialize, Serialize};

/// Floats closer than this are considered unchanged
const TOLERANCE: f32 = 0.001;

/// Everything that decides how a planet looks
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanetSnapshot {
    /// The planet shape
    pub planet: PlanetConfig,
    /// The biome
    pub biome: BiomeConfig,
}

/// What should happen to one kind of decoration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScatterChange {
    /// Keep the current placements
    #[default]
    Unchanged,
    /// Place the decorations again
    Respawn,
    /// Remove all placements
    Clear,
}

/// The work needed to go from one snapshot to another
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// The terrain geometry must be rebuilt
    pub terrain: bool,
    /// What happens to the vegetation
    pub vegetation: ScatterChange,
    /// What happens to the anomalies
    pub anomalies: ScatterChange,
}

fn differs(a: f32, b: f32) -> bool {
    (a - b).abs() > TOLERANCE
}

fn noise_changed(prev: &NoiseSettings, curr: &NoiseSettings) -> bool {
    prev.kind != curr.kind
        || prev.fractal != curr.fractal
        || prev.octaves != curr.octaves
        || differs(prev.frequency, curr.frequency)
        || differs(prev.lacunarity, curr.lacunarity)
        || differs(prev.gain, curr.gain)
}

fn terrain_changed(prev: &PlanetSnapshot, curr: &PlanetSnapshot) -> bool {
    let (p, c) = (&prev.planet, &curr.planet);
    let (pb, cb) = (&prev.biome, &curr.biome);
    p.subdivisions != c.subdivisions
        || differs(p.radius, c.radius)
        || p.seed != c.seed
        || p.apply_extrusion != c.apply_extrusion
        || pb.number_of_levels != cb.number_of_levels
        || differs(pb.extrusion_amount, cb.extrusion_amount)
        || differs(pb.noise_size, cb.noise_size)
        || pb.gradient != cb.gradient
        || noise_changed(&pb.noise, &cb.noise)
}

fn scatter_change(prev: &ScatterConfig, curr: &ScatterConfig, terrain: bool) -> ScatterChange {
    if prev.enabled != curr.enabled {
        return if curr.enabled {
            ScatterChange::Respawn
        } else {
            ScatterChange::Clear
        };
    }
    if !curr.enabled {
        return ScatterChange::Unchanged;
    }

    if terrain
        || prev.min_level != curr.min_level
        || prev.max_level != curr.max_level
        || prev.variants != curr.variants
        || differs(prev.density, curr.density)
        || differs(prev.density_noise_scale, curr.density_noise_scale)
        || differs(prev.type_noise_scale, curr.type_noise_scale)
    {
        ScatterChange::Respawn
    } else {
        ScatterChange::Unchanged
    }
}

impl ChangeSet {
    /// Compare two snapshots. A terrain change respawns every enabled decoration, since their
    /// placements depend on the triangles underneath
    pub fn diff(prev: &PlanetSnapshot, curr: &PlanetSnapshot) -> Self {
        let terrain = terrain_changed(prev, curr);
        Self {
            terrain,
            vegetation: scatter_change(&prev.biome.vegetation, &curr.biome.vegetation, terrain),
            anomalies: scatter_change(&prev.biome.anomalies, &curr.biome.anomalies, terrain),
        }
    }

    /// Whether nothing has to be done
    pub fn is_empty(&self) -> bool {
        !self.terrain
            && self.vegetation == ScatterChange::Unchanged
            && self.anomalies == ScatterChange::Unchanged
    }
}

#[cfg(test)]
fn enabled_snapshot() -> PlanetSnapshot {
    let mut snapshot = PlanetSnapshot::default();
    snapshot.biome.vegetation.enabled = true;
    snapshot.biome.vegetation.variants = vec!["pine".into()];
    snapshot
}

#[test]
fn test_identical_snapshots() {
    let snapshot = enabled_snapshot();
    assert!(ChangeSet::diff(&snapshot, &snapshot.clone()).is_empty());
}

#[test]
fn test_small_float_changes_are_ignored() {
    let prev = enabled_snapshot();
    let mut curr = prev.clone();
    curr.planet.radius += 0.0005;
    curr.biome.vegetation.density += 0.0005;
    assert!(ChangeSet::diff(&prev, &curr).is_empty());
}

#[test]
fn test_decoration_only_change() {
    let prev = enabled_snapshot();
    let mut curr = prev.clone();
    curr.biome.vegetation.max_level = 2;
    curr.biome.anomalies.density = 0.9;

    let changes = ChangeSet::diff(&prev, &curr);
    assert!(!changes.terrain);
    assert_eq!(ScatterChange::Respawn, changes.vegetation);
    // Anomalies are disabled, their parameters do not matter
    assert_eq!(ScatterChange::Unchanged, changes.anomalies);
}

#[test]
fn test_terrain_change_respawns_decorations() {
    let prev = enabled_snapshot();
    let mut curr = prev.clone();
    curr.biome.noise.octaves += 1;

    let changes = ChangeSet::diff(&prev, &curr);
    assert!(changes.terrain);
    assert_eq!(ScatterChange::Respawn, changes.vegetation);
    assert_eq!(ScatterChange::Unchanged, changes.anomalies);

    let mut curr = prev.clone();
    curr.planet.seed = 7;
    assert!(ChangeSet::diff(&prev, &curr).terrain);
}

#[test]
fn test_toggling_decorations() {
    let prev = enabled_snapshot();
    let mut curr = prev.clone();
    curr.biome.vegetation.enabled = false;
    curr.biome.anomalies.enabled = true;

    let changes = ChangeSet::diff(&prev, &curr);
    assert_eq!(ScatterChange::Clear, changes.vegetation);
    assert_eq!(ScatterChange::Respawn, changes.anomalies);
}
