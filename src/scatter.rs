//! Decoration placement on top of the terraced surface.
//!
//! Placement only reads the [TriangleInfo] snapshot of a planet, the caller decides what a
//! variant index turns into.

use crate::{
    biome::{BiomeConfig, ScatterConfig},
    noise_field::{to_unit_range, NoiseSampler},
    terrain::TriangleInfo,
    ConfigError,
};

use bevy::prelude::*;

/// Vegetation count per triangle is `floor(density * MAX_PER_TRIANGLE)`, one per extruded edge
const MAX_PER_TRIANGLE: f32 = 3.99;

/// Where a decoration goes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// The position relative to the planet center
    pub position: Vec3,
    /// The direction the decoration stands in
    pub up: Vec3,
    /// The index into the configured variants
    pub variant: usize,
    /// The base triangle the decoration sits on
    pub triangle: usize,
}

fn check(config: &ScatterConfig, kind: &'static str) -> Result<bool, ConfigError> {
    if !config.enabled {
        return Ok(false);
    }
    if config.variants.is_empty() {
        warn!("{kind} placement is enabled but has no variants, skipping");
        return Err(ConfigError::NoVariants(kind));
    }
    Ok(true)
}

fn in_band(config: &ScatterConfig, info: &TriangleInfo) -> bool {
    (config.min_level..=config.max_level).contains(&info.level)
}

fn variant(type_noise: f32, variants: usize) -> usize {
    ((to_unit_range(type_noise) * variants as f32).floor() as usize).min(variants - 1)
}

fn lift(point: Vec3, info: &TriangleInfo, biome: &BiomeConfig) -> Vec3 {
    point + point.normalize_or_zero() * (info.level as f32 * biome.extrusion_amount)
}

/// Place vegetation on the midpoints of the extruded triangle edges. Denser noise places more
/// instances on a triangle, up to three.
pub fn scatter_vegetation(
    infos: &[TriangleInfo],
    biome: &BiomeConfig,
    density_noise: &impl NoiseSampler,
    type_noise: &impl NoiseSampler,
) -> Result<Vec<Placement>, ConfigError> {
    let config = &biome.vegetation;
    if !check(config, "vegetation")? {
        return Ok(Vec::new());
    }

    let mut placements = Vec::new();
    let mut eligible = 0;
    for (triangle, info) in infos.iter().enumerate() {
        if !in_band(config, info) {
            continue;
        }
        eligible += 1;

        let density = to_unit_range(density_noise.evaluate(info.center * config.density_noise_scale));
        let count = (density * config.density * MAX_PER_TRIANGLE).floor() as usize;
        if count == 0 {
            continue;
        }

        let variant = variant(
            type_noise.evaluate(info.center * config.type_noise_scale),
            config.variants.len(),
        );
        let [a, b, c] = info.positions.map(|p| lift(p, info, biome));
        for position in [(a + b) * 0.5, (b + c) * 0.5, (c + a) * 0.5].into_iter().take(count) {
            placements.push(Placement {
                position,
                up: position.normalize_or_zero(),
                variant,
                triangle,
            });
        }
    }

    info!(
        "Placed {} vegetation instances on {eligible} eligible triangles (levels {}..={})",
        placements.len(),
        config.min_level,
        config.max_level,
    );
    Ok(placements)
}

/// Place at most one anomaly per triangle, on triangles where the density noise stays below the
/// configured density
pub fn scatter_anomalies(
    infos: &[TriangleInfo],
    biome: &BiomeConfig,
    density_noise: &impl NoiseSampler,
    type_noise: &impl NoiseSampler,
) -> Result<Vec<Placement>, ConfigError> {
    let config = &biome.anomalies;
    if !check(config, "anomaly")? {
        return Ok(Vec::new());
    }

    let placements: Vec<_> = infos
        .iter()
        .enumerate()
        .filter(|(_, info)| in_band(config, info))
        .filter(|(_, info)| {
            to_unit_range(density_noise.evaluate(info.center * config.density_noise_scale))
                <= config.density
        })
        .map(|(triangle, info)| Placement {
            position: lift(info.center, info, biome),
            up: info.normal,
            variant: variant(
                type_noise.evaluate(info.center * config.type_noise_scale),
                config.variants.len(),
            ),
            triangle,
        })
        .collect();

    info!("Placed {} anomalies", placements.len());
    Ok(placements)
}

#[cfg(test)]
fn flat_infos() -> Vec<TriangleInfo> {
    let sphere = crate::Icosphere::new(1, 2.);
    sphere
        .triangles
        .iter()
        .enumerate()
        .map(|(i, &corners)| {
            let positions = corners.map(|c| sphere.vertices[c as usize]);
            let center = (positions[0] + positions[1] + positions[2]) / 3.;
            TriangleInfo {
                corners,
                positions,
                center,
                normal: center.normalize(),
                level: i as u32 % 3,
            }
        })
        .collect()
}

#[cfg(test)]
fn scatter_biome(enabled: bool, variants: &[&str]) -> BiomeConfig {
    let scatter = ScatterConfig {
        enabled,
        variants: variants.iter().map(|v| v.to_string()).collect(),
        min_level: 1,
        max_level: 2,
        density: 1.,
        ..default()
    };
    BiomeConfig {
        extrusion_amount: 0.5,
        vegetation: scatter.clone(),
        anomalies: scatter,
        ..default()
    }
}

#[test]
fn test_vegetation_count_follows_density() {
    use crate::noise_field::NoiseField;

    let infos = flat_infos();
    let biome = scatter_biome(true, &["pine", "oak"]);
    let eligible = infos.iter().filter(|i| (1..=2).contains(&i.level)).count();

    // Full density noise places three per triangle, on the lifted edge midpoints
    let full = scatter_vegetation(&infos, &biome, &NoiseField::constant(1.), &NoiseField::constant(1.))
        .unwrap();
    assert_eq!(eligible * 3, full.len());
    for placement in &full {
        let info = &infos[placement.triangle];
        assert!((1..=2).contains(&info.level));
        assert_eq!(1, placement.variant);
        let lifted = info.positions.map(|p| p + p.normalize() * info.level as f32 * 0.5);
        let midpoints = [
            (lifted[0] + lifted[1]) * 0.5,
            (lifted[1] + lifted[2]) * 0.5,
            (lifted[2] + lifted[0]) * 0.5,
        ];
        assert!(midpoints.iter().any(|m| m.distance(placement.position) < 1e-5));
    }

    // 0.5 density noise gives floor(0.75 * 3.99) = 2 per triangle
    let half = scatter_vegetation(&infos, &biome, &NoiseField::constant(0.5), &NoiseField::constant(-1.))
        .unwrap();
    assert_eq!(eligible * 2, half.len());
    assert!(half.iter().all(|p| p.variant == 0));

    let none = scatter_vegetation(&infos, &biome, &NoiseField::constant(-1.), &NoiseField::constant(0.))
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_anomalies_below_density() {
    use crate::noise_field::NoiseField;

    let infos = flat_infos();
    let mut biome = scatter_biome(true, &["crystal"]);
    biome.anomalies.density = 0.6;

    let placed = scatter_anomalies(&infos, &biome, &NoiseField::constant(0.), &NoiseField::constant(1.))
        .unwrap();
    assert_eq!(infos.iter().filter(|i| (1..=2).contains(&i.level)).count(), placed.len());
    for placement in &placed {
        let info = &infos[placement.triangle];
        assert_eq!(info.normal, placement.up);
        assert_eq!(0, placement.variant);
        let expected = info.center + info.center.normalize() * info.level as f32 * 0.5;
        assert!(expected.distance(placement.position) < 1e-5);
    }

    // Density noise of 0.75 is above the configured density
    let skipped = scatter_anomalies(&infos, &biome, &NoiseField::constant(0.5), &NoiseField::constant(1.))
        .unwrap();
    assert!(skipped.is_empty());
}

#[test]
fn test_scatter_config_errors() {
    use crate::noise_field::NoiseField;

    let infos = flat_infos();
    let noise = NoiseField::constant(0.);
    assert!(matches!(
        scatter_vegetation(&infos, &scatter_biome(true, &[]), &noise, &noise),
        Err(ConfigError::NoVariants("vegetation"))
    ));
    assert!(scatter_anomalies(&infos, &scatter_biome(false, &[]), &noise, &noise)
        .unwrap()
        .is_empty());
}
