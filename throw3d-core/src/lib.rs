/// throw3d Core Library - Scene, raycasting and trajectory logic
///
/// This library provides the front-end independent pieces of the viewer:
/// model loading, the scene graph, ray intersection, and the keyframe tracks
/// that carry thrown balls to the first object in their way.

pub mod animation;
pub mod collada;
pub mod config;
pub mod error;
pub mod fbx;
pub mod geometry;
pub mod gltf;
pub mod interaction;
pub mod loader;
pub mod obj;
pub mod projection;
pub mod raycast;
pub mod scene;
pub mod stl;
pub mod transform;
pub mod viewer;

// Re-export commonly used types
pub use animation::{position_track, AnimationMixer, KeyframeTrack};
pub use config::ViewerConfig;
pub use error::{AnimationError, ConfigError, LoadError};
pub use geometry::{Aabb, Mesh, Triangle, Vertex};
pub use interaction::{ContextMenuHandler, Viewport};
pub use loader::{LoaderRegistry, ModelFormat, ModelLoader};
pub use projection::Camera;
pub use raycast::{Intersection, Ray, Raycast, Raycaster};
pub use scene::{NodeId, NodeKind, Scene, SceneNode};
pub use transform::{OrbitState, Transform};
pub use viewer::Viewer;
