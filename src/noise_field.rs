//! Seeded fractal noise used for elevation and for decoration placement.
//!
//! Every sampler is a pure function of its position, seed and settings, so two samplers built
//! from the same inputs always agree.

use crate::ConfigError;

use bevy::prelude::*;
use enum_dispatch::enum_dispatch;
use noise::{
    Billow, Fbm, MultiFractal, NoiseFn, OpenSimplex, Perlin, RidgedMulti, ScalePoint, Seedable,
    Value,
};
use serde::{Deserialize, Serialize};

/// Multiplier turning an integer seed into a spatial offset for spherical sampling
const SEED_OFFSET_FACTOR: f32 = 0.12345;
/// Seeds are folded into this range before becoming offsets, keeping the offsets small enough for
/// f32 noise coordinates to stay precise
const SEED_OFFSET_WRAP: i32 = 10_000;
/// (sin, cos) of the three rotations around the Y axis used by spherical sampling
const SPHERICAL_ROTATIONS: [(f32, f32); 3] = [(0., 1.), (0.866, -0.5), (-0.866, -0.5)];
/// Extra offset applied to each rotated sample
const ROTATION_OFFSET: f32 = 100.;
/// The most octaves the fractal generators accept
const MAX_OCTAVES: u32 = 32;

/// The base noise function
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseKind {
    /// OpenSimplex gradient noise
    #[default]
    OpenSimplex,
    /// Classic Perlin gradient noise
    Perlin,
    /// Interpolated value noise
    Value,
}

/// How octaves of the base noise are combined
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FractalKind {
    /// A single octave, scaled by the frequency
    None,
    /// Fractal brownian motion
    #[default]
    Fbm,
    /// Ridged multifractal
    Ridged,
    /// Billowing, absolute value octaves
    Billow,
}

/// Parameters for a fractal noise field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSettings {
    /// The base noise function
    pub kind: NoiseKind,
    /// How octaves are combined
    pub fractal: FractalKind,
    /// The number of octaves
    pub octaves: u32,
    /// The frequency of the first octave
    pub frequency: f32,
    /// Frequency multiplier between octaves
    pub lacunarity: f32,
    /// Amplitude multiplier between octaves
    pub gain: f32,
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            kind: NoiseKind::OpenSimplex,
            fractal: FractalKind::Fbm,
            octaves: 3,
            frequency: 0.1,
            lacunarity: 2.,
            gain: 0.5,
        }
    }
}

impl NoiseSettings {
    /// Settings for a single octave of the given noise
    pub fn single(kind: NoiseKind, frequency: f32) -> Self {
        Self {
            kind,
            fractal: FractalKind::None,
            octaves: 1,
            frequency,
            ..default()
        }
    }

    /// Check that the settings describe a usable noise field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_OCTAVES).contains(&self.octaves) {
            return Err(ConfigError::invalid(
                "noise.octaves",
                format!("{} is outside 1..={MAX_OCTAVES}", self.octaves),
            ));
        }
        if !(self.frequency.is_finite() && self.frequency > 0.) {
            return Err(ConfigError::invalid(
                "noise.frequency",
                format!("{} must be positive", self.frequency),
            ));
        }
        if !(self.lacunarity.is_finite() && self.lacunarity > 0.) {
            return Err(ConfigError::invalid(
                "noise.lacunarity",
                format!("{} must be positive", self.lacunarity),
            ));
        }
        if !self.gain.is_finite() {
            return Err(ConfigError::invalid("noise.gain", "must be finite"));
        }
        Ok(())
    }
}

/// A scalar field in [-1, 1]
#[enum_dispatch]
pub trait NoiseSampler {
    /// Evaluate the field at a position. The result is always in [-1, 1]
    fn evaluate(&self, pos: Vec3) -> f32;

    /// Sample the field on a sphere. The normalized position is sampled three times, rotated by
    /// 0, 120 and 240 degrees around the Y axis, and the samples are averaged to hide the seams
    /// and poles of plain 3D noise.
    fn sample_spherical(&self, pos: Vec3, scale: f32, seed: i32) -> f32 {
        let p = pos.normalize_or_zero();
        let seed_offset = seed.rem_euclid(SEED_OFFSET_WRAP) as f32 * SEED_OFFSET_FACTOR;

        let mut total = 0.;
        for (k, (sin, cos)) in SPHERICAL_ROTATIONS.iter().enumerate() {
            let rotated = Vec3::new(p.x * cos - p.z * sin, p.y, p.x * sin + p.z * cos);
            let offset = seed_offset + k as f32 * ROTATION_OFFSET;
            total += self.evaluate(rotated * scale + Vec3::splat(offset));
        }
        total / SPHERICAL_ROTATIONS.len() as f32
    }
}

/// A noise field built with the `noise` crate
pub struct FractalNoise {
    source: Box<dyn NoiseFn<f64, 3> + Send + Sync>,
}

impl std::fmt::Debug for FractalNoise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FractalNoise").finish_non_exhaustive()
    }
}

impl FractalNoise {
    /// Build the noise field described by the settings
    pub fn new(settings: &NoiseSettings, seed: i32) -> Self {
        // The noise crate takes unsigned seeds, negative seeds wrap around
        let seed = seed as u32;
        let source = match settings.kind {
            NoiseKind::OpenSimplex => build_source::<OpenSimplex>(settings, seed),
            NoiseKind::Perlin => build_source::<Perlin>(settings, seed),
            NoiseKind::Value => build_source::<Value>(settings, seed),
        };
        Self { source }
    }
}

fn build_source<T>(settings: &NoiseSettings, seed: u32) -> Box<dyn NoiseFn<f64, 3> + Send + Sync>
where
    T: Default + Seedable + NoiseFn<f64, 3> + Send + Sync + 'static,
{
    let octaves = settings.octaves.max(1) as usize;
    let frequency = settings.frequency as f64;
    let lacunarity = settings.lacunarity as f64;
    let gain = settings.gain as f64;

    match settings.fractal {
        FractalKind::None => {
            Box::new(ScalePoint::new(T::default().set_seed(seed)).set_scale(frequency))
        }
        FractalKind::Fbm => Box::new(
            Fbm::<T>::new(seed)
                .set_octaves(octaves)
                .set_frequency(frequency)
                .set_lacunarity(lacunarity)
                .set_persistence(gain),
        ),
        FractalKind::Ridged => Box::new(
            RidgedMulti::<T>::new(seed)
                .set_octaves(octaves)
                .set_frequency(frequency)
                .set_lacunarity(lacunarity)
                .set_persistence(gain),
        ),
        FractalKind::Billow => Box::new(
            Billow::<T>::new(seed)
                .set_octaves(octaves)
                .set_frequency(frequency)
                .set_lacunarity(lacunarity)
                .set_persistence(gain),
        ),
    }
}

impl NoiseSampler for FractalNoise {
    fn evaluate(&self, pos: Vec3) -> f32 {
        let value = self.source.get([pos.x as f64, pos.y as f64, pos.z as f64]) as f32;
        if value.is_finite() {
            value.clamp(-1., 1.)
        } else {
            0.
        }
    }
}

/// A field with the same value everywhere
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantNoise(pub f32);

impl NoiseSampler for ConstantNoise {
    fn evaluate(&self, _pos: Vec3) -> f32 {
        self.0.clamp(-1., 1.)
    }
}

/// An enum with the noise field variants, used to pass samplers around without Box or dynamic
/// dispatch
#[derive(Debug)]
#[enum_dispatch(NoiseSampler)]
pub enum NoiseField {
    /// Noise generated from [NoiseSettings]
    Fractal(FractalNoise),
    /// A constant field
    Constant(ConstantNoise),
}

impl NoiseField {
    /// Build a fractal noise field
    pub fn new(settings: &NoiseSettings, seed: i32) -> Self {
        Self::Fractal(FractalNoise::new(settings, seed))
    }

    /// Build a constant field
    pub fn constant(value: f32) -> Self {
        Self::Constant(ConstantNoise(value))
    }
}

/// The independent noise channels of a planet. Each channel offsets the planet seed so the
/// channels are decorrelated from each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoiseChannel {
    /// Elevation levels
    Terrain,
    /// How much vegetation grows on a triangle
    VegetationDensity,
    /// Which vegetation variant grows on a triangle
    VegetationType,
    /// Whether an anomaly spawns on a triangle
    AnomalyDensity,
    /// Which anomaly variant spawns on a triangle
    AnomalyType,
}

impl NoiseChannel {
    /// The offset added to the planet seed for this channel
    pub fn seed_offset(self) -> i32 {
        match self {
            NoiseChannel::Terrain => 0,
            NoiseChannel::VegetationDensity => 1000,
            NoiseChannel::VegetationType => 2000,
            NoiseChannel::AnomalyDensity => 3000,
            NoiseChannel::AnomalyType => 4000,
        }
    }

    /// Build the field for this channel. Terrain uses the biome settings, the decoration channels
    /// use fixed single octave settings
    pub fn field(self, seed: i32, terrain: &NoiseSettings) -> NoiseField {
        let seed = seed.wrapping_add(self.seed_offset());
        match self {
            NoiseChannel::Terrain => NoiseField::new(terrain, seed),
            NoiseChannel::VegetationDensity | NoiseChannel::AnomalyDensity => {
                NoiseField::new(&NoiseSettings::single(NoiseKind::OpenSimplex, 0.05), seed)
            }
            NoiseChannel::VegetationType | NoiseChannel::AnomalyType => {
                NoiseField::new(&NoiseSettings::single(NoiseKind::Perlin, 0.03), seed)
            }
        }
    }
}

/// Remap a value from [-1, 1] to [0, 1]
pub fn to_unit_range(value: f32) -> f32 {
    ((value + 1.) * 0.5).clamp(0., 1.)
}

#[cfg(test)]
fn sample_points() -> impl Iterator<Item = Vec3> {
    (0..64).map(|i| {
        let i = i as f32;
        Vec3::new(i * 0.37 - 3., (i * 1.3).sin() * 4., i * 0.11 + 0.5)
    })
}

#[test]
fn test_fractal_noise_is_deterministic() {
    let settings = NoiseSettings::default();
    let a = NoiseField::new(&settings, 1337);
    let b = NoiseField::new(&settings, 1337);
    for p in sample_points() {
        assert_eq!(a.evaluate(p), b.evaluate(p));
        assert_eq!(a.sample_spherical(p, 5., 1337), b.sample_spherical(p, 5., 1337));
    }
}

#[test]
fn test_noise_stays_in_range() {
    for fractal in [
        FractalKind::None,
        FractalKind::Fbm,
        FractalKind::Ridged,
        FractalKind::Billow,
    ] {
        for kind in [NoiseKind::OpenSimplex, NoiseKind::Perlin, NoiseKind::Value] {
            let field = NoiseField::new(
                &NoiseSettings {
                    kind,
                    fractal,
                    octaves: 5,
                    frequency: 0.7,
                    ..default()
                },
                -42,
            );
            for p in sample_points() {
                let v = field.evaluate(p);
                assert!((-1. ..=1.).contains(&v), "{kind:?} {fractal:?} gave {v}");
                let s = field.sample_spherical(p, 3., -42);
                assert!((-1. ..=1.).contains(&s));
            }
        }
    }
}

#[test]
fn test_channels_are_decorrelated() {
    let settings = NoiseSettings::default();
    let density = NoiseChannel::VegetationDensity.field(7, &settings);
    let anomaly = NoiseChannel::AnomalyDensity.field(7, &settings);
    assert!(sample_points().any(|p| density.evaluate(p * 10.) != anomaly.evaluate(p * 10.)));
    assert_eq!(NoiseChannel::AnomalyType.seed_offset(), 4000);
}

#[test]
fn test_constant_spherical_sample() {
    let field = NoiseField::constant(0.5);
    assert_eq!(0.5, field.sample_spherical(Vec3::new(3., -2., 1.), 8., 99));
    assert_eq!(1., NoiseField::constant(4.).evaluate(Vec3::ZERO));
}

#[test]
fn test_invalid_settings() {
    let settings = NoiseSettings {
        octaves: 0,
        ..default()
    };
    assert!(settings.validate().is_err());
    let settings = NoiseSettings {
        frequency: -1.,
        ..default()
    };
    assert!(settings.validate().is_err());
    assert!(NoiseSettings::default().validate().is_ok());
}
