//! Error types for throw3d

use thiserror::Error;

use crate::loader::ModelFormat;

/// Rejected trajectory inputs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimationError {
    #[error("start and end points coincide, no direction to travel")]
    DegenerateTrajectory,

    #[error("duration must be finite and positive, got {0}")]
    InvalidDuration(f32),
}

/// Model loading failures
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no loader registered for {0:?} files")]
    NoLoader(ModelFormat),

    #[error("STL error: {0}")]
    Stl(String),

    #[error("OBJ error on line {line}: {message}")]
    Obj { line: usize, message: String },

    #[error("glTF error: {0}")]
    Gltf(String),

    #[error("FBX error: {0}")]
    Fbx(String),

    #[error("COLLADA error: {0}")]
    Collada(String),

    #[error("COLLADA XML error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("glTF JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model file is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Configuration failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
