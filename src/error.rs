use thiserror::Error;

/// Errors caused by missing or invalid terrain configuration.
///
/// None of these are fatal, the caller is expected to log them and keep the previous geometry.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No biome was assigned to the planet
    #[error("no biome assigned to the planet")]
    MissingBiome,
    /// A placement pass is enabled but has nothing to place
    #[error("no variants configured for {0} placement")]
    NoVariants(&'static str),
    /// A value is out of its supported range
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// The name of the offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
    /// The configuration could not be parsed
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// The configuration could not be read
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
