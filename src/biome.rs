//! Biome configuration: the read-only data that shapes and colors a planet and decides where
//! decorations are placed. Biomes are usually loaded from JSON.

use crate::{noise_field::NoiseSettings, ConfigError};

use serde::{Deserialize, Serialize};
use std::io::Read;

/// A linear RGBA color
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rgba(pub [f32; 4]);

impl Rgba {
    /// Opaque white
    pub const WHITE: Rgba = Rgba([1., 1., 1., 1.]);

    /// Linearly interpolate towards `other`
    pub fn lerp(self, other: Rgba, t: f32) -> Rgba {
        let mut out = self.0;
        for (c, o) in out.iter_mut().zip(other.0) {
            *c += (o - *c) * t;
        }
        Rgba(out)
    }
}

/// A color at a point of a [ColorGradient]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientKey {
    /// Where the key sits, in [0, 1]
    pub time: f32,
    /// The color at this point
    pub color: Rgba,
}

/// A piecewise linear color ramp keyed by normalized elevation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<GradientKey>", into = "Vec<GradientKey>")]
pub struct ColorGradient {
    keys: Vec<GradientKey>,
}

impl From<Vec<GradientKey>> for ColorGradient {
    fn from(keys: Vec<GradientKey>) -> Self {
        Self::new(keys)
    }
}

impl From<ColorGradient> for Vec<GradientKey> {
    fn from(value: ColorGradient) -> Self {
        value.keys
    }
}

impl ColorGradient {
    /// Construct a gradient, the keys may be given in any order
    pub fn new(mut keys: Vec<GradientKey>) -> Self {
        keys.retain(|k| k.time.is_finite());
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// A gradient going from `from` at 0 to `to` at 1
    pub fn linear(from: Rgba, to: Rgba) -> Self {
        Self::new(vec![
            GradientKey {
                time: 0.,
                color: from,
            },
            GradientKey { time: 1., color: to },
        ])
    }

    /// The keys, sorted by time
    pub fn keys(&self) -> &[GradientKey] {
        &self.keys
    }

    /// Get the color at `t`. Values outside the keyed range take the color of the nearest key,
    /// an empty gradient is white
    pub fn evaluate(&self, t: f32) -> Rgba {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return Rgba::WHITE;
        };
        if !(t > first.time) {
            return first.color;
        }
        if t >= last.time {
            return last.color;
        }

        let upper = self.keys.partition_point(|k| k.time <= t);
        let (a, b) = (self.keys[upper - 1], self.keys[upper]);
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return b.color;
        }
        a.color.lerp(b.color, (t - a.time) / span)
    }
}

/// Where and how densely one kind of decoration is placed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterConfig {
    /// Whether this decoration is placed at all
    pub enabled: bool,
    /// The names of the variants to choose from, resolved to assets by the caller
    pub variants: Vec<String>,
    /// The lowest elevation level that receives decorations
    pub min_level: u32,
    /// The highest elevation level that receives decorations
    pub max_level: u32,
    /// The overall density, in [0, 1]
    pub density: f32,
    /// Scale of the noise deciding the local density
    pub density_noise_scale: f32,
    /// Scale of the noise deciding the variant
    pub type_noise_scale: f32,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            variants: Vec::new(),
            min_level: 0,
            max_level: 10,
            density: 0.5,
            density_noise_scale: 5.,
            type_noise_scale: 5.,
        }
    }
}

impl ScatterConfig {
    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if !(0. ..=1.).contains(&self.density) {
            return Err(ConfigError::invalid(
                field,
                format!("density {} is outside [0, 1]", self.density),
            ));
        }
        if self.min_level > self.max_level {
            return Err(ConfigError::invalid(
                field,
                format!("min level {} is above max level {}", self.min_level, self.max_level),
            ));
        }
        if !(self.density_noise_scale.is_finite() && self.type_noise_scale.is_finite()) {
            return Err(ConfigError::invalid(field, "noise scales must be finite"));
        }
        Ok(())
    }
}

/// Everything a biome decides about a planet
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiomeConfig {
    /// A display name
    pub name: String,
    /// Surface colors by normalized elevation
    pub gradient: ColorGradient,
    /// The highest elevation level
    pub number_of_levels: u32,
    /// The height of a single elevation level, in world units
    pub extrusion_amount: f32,
    /// Scale applied to the unit sphere before sampling elevation noise
    pub noise_size: f32,
    /// The elevation noise
    pub noise: NoiseSettings,
    /// Trees and other vegetation
    pub vegetation: ScatterConfig,
    /// Anomalies
    pub anomalies: ScatterConfig,
}

impl Default for BiomeConfig {
    fn default() -> Self {
        Self {
            name: "Default".into(),
            gradient: ColorGradient::linear(Rgba([0.2, 0.3, 0.15, 1.]), Rgba([0.9, 0.9, 0.85, 1.])),
            number_of_levels: 4,
            extrusion_amount: 0.2,
            noise_size: 5.,
            noise: NoiseSettings::default(),
            vegetation: ScatterConfig::default(),
            anomalies: ScatterConfig::default(),
        }
    }
}

impl BiomeConfig {
    /// Parse a biome from JSON. Missing fields take their default value
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let biome: Self = serde_json::from_str(json)?;
        biome.validate()?;
        Ok(biome)
    }

    /// Read a biome as JSON from a reader
    pub fn from_json_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let biome: Self = serde_json::from_reader(reader)?;
        biome.validate()?;
        Ok(biome)
    }

    /// Check that every value is in its supported range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.noise.validate()?;
        if !self.extrusion_amount.is_finite() {
            return Err(ConfigError::invalid("extrusion_amount", "must be finite"));
        }
        if !(self.noise_size.is_finite() && self.noise_size > 0.) {
            return Err(ConfigError::invalid(
                "noise_size",
                format!("{} must be positive", self.noise_size),
            ));
        }
        self.vegetation.validate("vegetation")?;
        self.anomalies.validate("anomalies")?;
        Ok(())
    }

    /// The normalized elevation of a level, used to look up gradient colors
    pub fn normalized_level(&self, level: u32) -> f32 {
        if self.number_of_levels == 0 {
            return 0.;
        }
        level as f32 / self.number_of_levels as f32
    }

    /// The surface color of a level
    pub fn level_color(&self, level: u32) -> Rgba {
        self.gradient.evaluate(self.normalized_level(level))
    }
}

#[test]
fn test_gradient_evaluate() {
    let gradient = ColorGradient::new(vec![
        GradientKey {
            time: 1.,
            color: Rgba([1., 1., 1., 1.]),
        },
        GradientKey {
            time: 0.,
            color: Rgba([0., 0., 0., 1.]),
        },
    ]);
    assert_eq!(Rgba([0., 0., 0., 1.]), gradient.evaluate(-3.));
    assert_eq!(Rgba([0.25, 0.25, 0.25, 1.]), gradient.evaluate(0.25));
    assert_eq!(Rgba([1., 1., 1., 1.]), gradient.evaluate(2.));
    assert_eq!(Rgba::WHITE, ColorGradient::default().evaluate(0.5));
}

#[test]
fn test_biome_from_json() {
    let biome = BiomeConfig::from_json_str(
        r#"{
            "name": "Desert",
            "number_of_levels": 3,
            "gradient": [
                { "time": 0.0, "color": [0.8, 0.6, 0.3, 1.0] },
                { "time": 1.0, "color": [1.0, 0.9, 0.7, 1.0] }
            ],
            "noise": { "kind": "Perlin", "fractal": "Ridged", "octaves": 4 },
            "vegetation": { "enabled": true, "variants": ["cactus"], "max_level": 2 }
        }"#,
    )
    .unwrap();
    assert_eq!("Desert", biome.name);
    assert_eq!(3, biome.number_of_levels);
    assert_eq!(4, biome.noise.octaves);
    assert_eq!(2, biome.gradient.keys().len());
    assert_eq!(vec!["cactus".to_string()], biome.vegetation.variants);
    assert!(!biome.anomalies.enabled);
}

#[test]
fn test_biome_rejects_invalid_values() {
    assert!(matches!(
        BiomeConfig::from_json_str(r#"{ "noise_size": 0.0 }"#),
        Err(ConfigError::InvalidValue { field: "noise_size", .. })
    ));
    assert!(matches!(
        BiomeConfig::from_json_str(r#"{ "anomalies": { "min_level": 5, "max_level": 1 } }"#),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        BiomeConfig::from_json_str("{ not json"),
        Err(ConfigError::Json(_))
    ));
}

#[test]
fn test_level_color_without_levels() {
    let biome = BiomeConfig {
        number_of_levels: 0,
        ..Default::default()
    };
    assert_eq!(0., biome.normalized_level(3));
    assert_eq!(biome.gradient.evaluate(0.), biome.level_color(3));
}
