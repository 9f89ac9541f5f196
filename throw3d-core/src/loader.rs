//! Model loading by file extension.
//!
//! The extension picks a [`ModelFormat`]; the registry hands the bytes to the
//! loader registered for that format. Unknown extensions are a soft miss
//! (`Ok(None)`), not an error.

use std::collections::HashMap;
use std::fmt;

use tracing::{info, warn};

use crate::error::LoadError;
use crate::scene::SceneNode;

/// Model formats the viewer knows by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Fbx,
    Collada,
    Gltf,
    Obj,
    Stl,
}

impl ModelFormat {
    /// Match the text after the last `.` of a file name
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = file_name.rsplit('.').next()?;
        Self::from_extension(extension)
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "fbx" => Some(Self::Fbx),
            "dae" => Some(Self::Collada),
            "gltf" | "glb" => Some(Self::Gltf),
            "obj" => Some(Self::Obj),
            "stl" => Some(Self::Stl),
            _ => None,
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fbx => "FBX",
            Self::Collada => "Collada",
            Self::Gltf => "glTF",
            Self::Obj => "OBJ",
            Self::Stl => "STL",
        };
        f.write_str(name)
    }
}

/// Turns the bytes of one model file into a scene node
pub trait ModelLoader {
    fn load(&self, data: &[u8]) -> Result<SceneNode, LoadError>;
}

/// Any plain function with the right shape is a loader
impl<F> ModelLoader for F
where
    F: Fn(&[u8]) -> Result<SceneNode, LoadError>,
{
    fn load(&self, data: &[u8]) -> Result<SceneNode, LoadError> {
        self(data)
    }
}

fn load_obj(data: &[u8]) -> Result<SceneNode, LoadError> {
    crate::obj::parse_obj(std::str::from_utf8(data)?)
}

fn load_collada(data: &[u8]) -> Result<SceneNode, LoadError> {
    crate::collada::parse_collada(std::str::from_utf8(data)?)
}

fn load_stl(data: &[u8]) -> Result<SceneNode, LoadError> {
    Ok(SceneNode::with_mesh("stl", crate::stl::parse_stl(data)?))
}

/// Format to loader table
pub struct LoaderRegistry {
    loaders: HashMap<ModelFormat, Box<dyn ModelLoader>>,
}

impl LoaderRegistry {
    /// Registry without any loaders
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// Registry with a built-in loader for every [`ModelFormat`]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(ModelFormat::Fbx, crate::fbx::parse_fbx);
        registry.register(ModelFormat::Collada, load_collada);
        registry.register(ModelFormat::Obj, load_obj);
        registry.register(ModelFormat::Gltf, crate::gltf::parse_gltf);
        registry.register(ModelFormat::Stl, load_stl);
        registry
    }

    pub fn register(&mut self, format: ModelFormat, loader: impl ModelLoader + 'static) {
        self.loaders.insert(format, Box::new(loader));
    }

    pub fn supports(&self, format: ModelFormat) -> bool {
        self.loaders.contains_key(&format)
    }

    /// Load a model file, dispatching on its extension.
    ///
    /// Returns `Ok(None)` when the extension is not a model format.
    pub fn load(&self, file_name: &str, data: &[u8]) -> Result<Option<SceneNode>, LoadError> {
        let Some(format) = ModelFormat::from_file_name(file_name) else {
            warn!("Not supported file extension: {file_name}");
            return Ok(None);
        };

        let loader = self
            .loaders
            .get(&format)
            .ok_or(LoadError::NoLoader(format))?;

        let mut node = loader.load(data)?;
        node.name = file_name.to_string();
        info!(
            file = file_name,
            %format,
            triangles = node.triangle_count(),
            "model loaded"
        );
        Ok(Some(node))
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
