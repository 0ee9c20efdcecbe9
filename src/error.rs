use thiserror::Error;

/// Failure while compiling MJCF text into a [`crate::physics::Model`].
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid MJCF XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("<{0}> element is missing")]
    MissingElement(&'static str),
    #[error("invalid value {value:?} for attribute `{attribute}` on <{element}>")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
    },
    #[error("<{element}> references unknown {kind} {name:?}")]
    UnknownReference {
        element: String,
        kind: &'static str,
        name: String,
    },
    #[error("model table `{table}` has {actual} entries, expected {expected}")]
    TableSize {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors surfaced by [`crate::viewer::Viewer`] operations.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("scene {0:?} is not in the scene library")]
    SceneNotFound(String),
    #[error("failed to load scene {name:?}: {source}")]
    Model {
        name: String,
        #[source]
        source: ModelError,
    },
    #[error("no scene is loaded")]
    NoScene,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding host messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no `type` field")]
    MissingType,
}

/// Errors raised while reading viewer configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}
