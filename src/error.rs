use std::path::PathBuf;

/// Everything that can go wrong while calibrating a batch.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A malformed entity, such as a reference material with negative uncertainty
    #[error("invalid value: {0}")]
    Validation(String),
    /// A required column or identifier is missing, or the configuration is inconsistent
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A named standard could not be found in the custom or builtin registry
    #[error("standard '{0}' not found in the registry, define it as a custom standard")]
    UnresolvedStandard(String),
    /// The calibration model could not be fitted
    #[error("calibration fit failed: {0}")]
    Fit(String),
    /// An operation was invoked out of pipeline order
    #[error("invalid state: {0}")]
    State(String),
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}
