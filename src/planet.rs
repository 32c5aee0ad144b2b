use crate::{
    biome::BiomeConfig,
    change::{ChangeSet, PlanetSnapshot, ScatterChange},
    icosphere::Icosphere,
    noise_field::NoiseChannel,
    scatter::{scatter_anomalies, scatter_vegetation, Placement},
    surface::ReferenceSurface,
    terrain::{assign_levels, extrude, TerrainMesh, TriangleInfo},
    ConfigError,
};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// The most subdivisions a planet may use, each pass quadruples the triangle count
const MAX_SUBDIVISIONS: u32 = 7;

/// The shape of a planet, independent of its biome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetConfig {
    /// How often the icosahedron is subdivided
    pub subdivisions: u32,
    /// The radius of the base sphere
    pub radius: f32,
    /// The seed all noise channels derive from
    pub seed: i32,
    /// Whether the surface is terraced, a plain sphere is generated otherwise
    pub apply_extrusion: bool,
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            subdivisions: 3,
            radius: 5.,
            seed: 1337,
            apply_extrusion: true,
        }
    }
}

impl PlanetConfig {
    /// Parse a planet from JSON. Missing fields take their default value
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a planet as JSON from a reader
    pub fn from_json_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is in its supported range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subdivisions > MAX_SUBDIVISIONS {
            return Err(ConfigError::invalid(
                "subdivisions",
                format!("{} is above {MAX_SUBDIVISIONS}", self.subdivisions),
            ));
        }
        if !(self.radius.is_finite() && self.radius > 0.) {
            return Err(ConfigError::invalid(
                "radius",
                format!("{} must be positive", self.radius),
            ));
        }
        Ok(())
    }
}

/// A generated planet: the terraced surface mesh and the decorations on top of it.
///
/// The planet owns its configuration, changes go through [Planet::apply_config] so only the
/// affected parts are rebuilt.
#[derive(Resource, Debug)]
pub struct Planet {
    config: PlanetConfig,
    biome: BiomeConfig,
    mesh: TerrainMesh,
    triangles: Vec<TriangleInfo>,
    vegetation: Vec<Placement>,
    anomalies: Vec<Placement>,
}

/// Validate both configurations, logging the first problem found
fn validate_logged(config: &PlanetConfig, biome: &BiomeConfig) -> Result<(), ConfigError> {
    config
        .validate()
        .and_then(|_| biome.validate())
        .map_err(|err| {
            error!("Invalid planet configuration for biome {:?}: {err}", biome.name);
            err
        })
}

impl Planet {
    /// Generate a planet. Without a biome nothing is generated.
    ///
    /// Decoration problems are logged and leave the decoration empty, they never prevent the
    /// terrain from being generated.
    pub fn generate(config: PlanetConfig, biome: Option<BiomeConfig>) -> Result<Self, ConfigError> {
        let Some(biome) = biome else {
            error!("No biome assigned to the planet, nothing generated");
            return Err(ConfigError::MissingBiome);
        };
        validate_logged(&config, &biome)?;

        let mut planet = Self {
            config,
            biome,
            mesh: default(),
            triangles: Vec::new(),
            vegetation: Vec::new(),
            anomalies: Vec::new(),
        };
        planet.build_terrain();
        planet.spawn_vegetation();
        planet.spawn_anomalies();
        Ok(planet)
    }

    fn build_terrain(&mut self) {
        let sphere = Icosphere::new(self.config.subdivisions, self.config.radius);

        if self.config.apply_extrusion {
            let noise = NoiseChannel::Terrain.field(self.config.seed, &self.biome.noise);
            self.triangles = assign_levels(&sphere, &noise, &self.biome, self.config.seed);
            self.mesh = extrude(&sphere, &self.triangles, &self.biome);
        } else {
            self.triangles.clear();
            self.mesh = TerrainMesh::from_icosphere(&sphere);
        }

        info!(
            "Generated planet with {} vertices, {} colors and {} triangles",
            self.mesh.vertices.len(),
            self.mesh.colors.len(),
            self.mesh.triangles.len(),
        );
    }

    fn spawn_vegetation(&mut self) {
        let seed = self.config.seed;
        let density = NoiseChannel::VegetationDensity.field(seed, &self.biome.noise);
        let kind = NoiseChannel::VegetationType.field(seed, &self.biome.noise);
        self.vegetation = scatter_vegetation(&self.triangles, &self.biome, &density, &kind)
            .unwrap_or_default();
    }

    fn spawn_anomalies(&mut self) {
        let seed = self.config.seed;
        let density = NoiseChannel::AnomalyDensity.field(seed, &self.biome.noise);
        let kind = NoiseChannel::AnomalyType.field(seed, &self.biome.noise);
        self.anomalies = scatter_anomalies(&self.triangles, &self.biome, &density, &kind)
            .unwrap_or_default();
    }

    fn apply_scatter(&mut self, change: ScatterChange, vegetation: bool) {
        match (change, vegetation) {
            (ScatterChange::Unchanged, _) => {}
            (ScatterChange::Clear, true) => self.vegetation.clear(),
            (ScatterChange::Clear, false) => self.anomalies.clear(),
            (ScatterChange::Respawn, true) => self.spawn_vegetation(),
            (ScatterChange::Respawn, false) => self.spawn_anomalies(),
        }
    }

    /// Switch to a new configuration, rebuilding only what changed. An invalid configuration is
    /// rejected and the current planet is kept as is
    pub fn apply_config(
        &mut self,
        config: PlanetConfig,
        biome: BiomeConfig,
    ) -> Result<ChangeSet, ConfigError> {
        validate_logged(&config, &biome)?;

        let next = PlanetSnapshot {
            planet: config,
            biome,
        };
        let changes = ChangeSet::diff(&self.snapshot(), &next);
        self.config = next.planet;
        self.biome = next.biome;

        if changes.terrain {
            debug!("Terrain parameters changed, regenerating the planet");
            self.build_terrain();
        }
        self.apply_scatter(changes.vegetation, true);
        self.apply_scatter(changes.anomalies, false);
        Ok(changes)
    }

    /// The configuration the planet was generated from
    pub fn snapshot(&self) -> PlanetSnapshot {
        PlanetSnapshot {
            planet: self.config.clone(),
            biome: self.biome.clone(),
        }
    }

    /// The planet shape
    pub fn config(&self) -> &PlanetConfig {
        &self.config
    }

    /// The biome
    pub fn biome(&self) -> &BiomeConfig {
        &self.biome
    }

    /// The surface mesh, relative to the planet center
    pub fn mesh(&self) -> &TerrainMesh {
        &self.mesh
    }

    /// The base triangles with their elevation levels, empty if the planet is not extruded
    pub fn triangle_infos(&self) -> &[TriangleInfo] {
        &self.triangles
    }

    /// The vegetation placements
    pub fn vegetation(&self) -> &[Placement] {
        &self.vegetation
    }

    /// The anomaly placements
    pub fn anomalies(&self) -> &[Placement] {
        &self.anomalies
    }

    /// The surface mesh as a solid that voxel chunks can be sampled from
    pub fn reference_surface(&self) -> ReferenceSurface {
        ReferenceSurface::new(&self.mesh.vertices, &self.mesh.triangles)
    }
}

#[test]
fn test_missing_biome() {
    assert!(matches!(
        Planet::generate(PlanetConfig::default(), None),
        Err(ConfigError::MissingBiome)
    ));
    let config = PlanetConfig {
        subdivisions: MAX_SUBDIVISIONS + 1,
        ..default()
    };
    assert!(matches!(
        Planet::generate(config, Some(BiomeConfig::default())),
        Err(ConfigError::InvalidValue { field: "subdivisions", .. })
    ));
}

#[test]
fn test_plain_sphere() {
    let planet = Planet::generate(
        PlanetConfig {
            subdivisions: 2,
            apply_extrusion: false,
            ..default()
        },
        Some(BiomeConfig::default()),
    )
    .unwrap();
    let (vertices, triangles) = Icosphere::expected_counts(2);
    assert_eq!(vertices, planet.mesh().vertices.len());
    assert_eq!(triangles, planet.mesh().triangles.len());
    assert!(planet.mesh().colors.is_empty());
    assert!(planet.triangle_infos().is_empty());
}

#[test]
fn test_decoration_errors_keep_terrain() {
    let mut biome = BiomeConfig::default();
    biome.vegetation.enabled = true;
    let planet = Planet::generate(PlanetConfig::default(), Some(biome)).unwrap();
    assert!(planet.vegetation().is_empty());
    assert_eq!(
        Icosphere::expected_counts(3).1,
        planet.triangle_infos().len()
    );
    assert_eq!(planet.mesh().vertices.len(), planet.mesh().colors.len());
}

#[test]
fn test_apply_config_rebuilds_what_changed() {
    let mut biome = BiomeConfig::default();
    biome.anomalies.enabled = true;
    biome.anomalies.density = 1.;
    biome.anomalies.variants = vec!["monolith".into()];
    let mut planet = Planet::generate(PlanetConfig::default(), Some(biome.clone())).unwrap();
    let mesh = planet.mesh().clone();
    assert_eq!(planet.triangle_infos().len(), planet.anomalies().len());

    biome.anomalies.enabled = false;
    let changes = planet
        .apply_config(PlanetConfig::default(), biome.clone())
        .unwrap();
    assert!(!changes.terrain);
    assert_eq!(ScatterChange::Clear, changes.anomalies);
    assert!(planet.anomalies().is_empty());
    assert_eq!(&mesh, planet.mesh());

    let changes = planet
        .apply_config(
            PlanetConfig {
                subdivisions: 1,
                ..default()
            },
            biome.clone(),
        )
        .unwrap();
    assert!(changes.terrain);
    assert_eq!(Icosphere::expected_counts(1).1, planet.triangle_infos().len());

    assert!(planet
        .apply_config(
            PlanetConfig {
                radius: -1.,
                ..default()
            },
            biome
        )
        .is_err());
    assert_eq!(1, planet.config().subdivisions);
}
