//! glTF 2.0 reader for `.gltf` (JSON) and `.glb` (binary container) files.
//!
//! Only what a collision scene needs is read: the node hierarchy with its
//! transforms and the positions/indices of triangle primitives. Buffers come
//! from the GLB binary chunk or from base64 `data:` URIs.

use std::collections::HashMap;
use std::ops::Range;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use nalgebra::{Matrix4, Point3, Quaternion, UnitQuaternion, Vector3};
use serde::Deserialize;
use tracing::debug;

use crate::error::LoadError;
use crate::geometry::{Mesh, Triangle};
use crate::scene::SceneNode;
use crate::transform::Transform;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const MODE_TRIANGLES: u32 = 4;
const COMPONENT_U8: u32 = 5121;
const COMPONENT_U16: u32 = 5123;
const COMPONENT_U32: u32 = 5125;
const COMPONENT_F32: u32 = 5126;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    scene: Option<usize>,
    #[serde(default)]
    scenes: Vec<SceneDef>,
    #[serde(default)]
    nodes: Vec<NodeDef>,
    #[serde(default)]
    meshes: Vec<MeshDef>,
    #[serde(default)]
    accessors: Vec<Accessor>,
    #[serde(default)]
    buffer_views: Vec<BufferView>,
    #[serde(default)]
    buffers: Vec<Buffer>,
    #[serde(default)]
    materials: Vec<MaterialDef>,
}

#[derive(Debug, Deserialize)]
struct SceneDef {
    #[serde(default)]
    nodes: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct NodeDef {
    name: Option<String>,
    mesh: Option<usize>,
    #[serde(default)]
    children: Vec<usize>,
    matrix: Option<[f32; 16]>,
    translation: Option<[f32; 3]>,
    /// x, y, z, w
    rotation: Option<[f32; 4]>,
    scale: Option<[f32; 3]>,
}

#[derive(Debug, Deserialize)]
struct MeshDef {
    name: Option<String>,
    primitives: Vec<Primitive>,
}

#[derive(Debug, Deserialize)]
struct Primitive {
    attributes: HashMap<String, usize>,
    indices: Option<usize>,
    material: Option<usize>,
    mode: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaterialDef {
    #[serde(default)]
    double_sided: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Accessor {
    buffer_view: Option<usize>,
    #[serde(default)]
    byte_offset: usize,
    component_type: u32,
    count: usize,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BufferView {
    buffer: usize,
    #[serde(default)]
    byte_offset: usize,
    byte_length: usize,
    byte_stride: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct Buffer {
    uri: Option<String>,
}

/// Parse a `.gltf` or `.glb` file into a group holding the default scene
pub fn parse_gltf(data: &[u8]) -> Result<SceneNode, LoadError> {
    let (json, bin) = if data.starts_with(GLB_MAGIC) {
        split_glb(data)?
    } else {
        (data, None)
    };

    let document: Document = serde_json::from_slice(json)?;
    let buffers = resolve_buffers(&document, bin)?;
    let reader = Reader {
        document: &document,
        buffers,
    };

    let default_scene = document.scene.or((!document.scenes.is_empty()).then_some(0));
    let roots = match default_scene {
        Some(index) => document
            .scenes
            .get(index)
            .ok_or_else(|| LoadError::Gltf(format!("scene {index} does not exist")))?
            .nodes
            .clone(),
        // No scenes: treat every node as a root
        None => (0..document.nodes.len()).collect(),
    };

    let mut group = SceneNode::group("gltf");
    for index in roots {
        group.add_child(reader.node(index, 0)?);
    }

    debug!(
        nodes = document.nodes.len(),
        triangles = group.triangle_count(),
        "parsed glTF"
    );
    Ok(group)
}

/// Split a GLB container into its JSON chunk and optional binary chunk
fn split_glb(data: &[u8]) -> Result<(&[u8], Option<&[u8]>), LoadError> {
    let word = |offset: usize| -> Result<u32, LoadError> {
        data.get(offset..offset + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| LoadError::Gltf("truncated GLB".into()))
    };

    let version = word(4)?;
    if version != 2 {
        return Err(LoadError::Gltf(format!("unsupported GLB version {version}")));
    }
    let total = (word(8)? as usize).min(data.len());

    let mut json = None;
    let mut bin = None;
    let mut offset = 12;
    while offset + 8 <= total {
        let length = word(offset)? as usize;
        let kind = word(offset + 4)?;
        let chunk = span(offset + 8, length)
            .and_then(|range| data.get(range))
            .ok_or_else(|| LoadError::Gltf("GLB chunk overruns file".into()))?;
        match kind {
            CHUNK_JSON => json = Some(chunk),
            CHUNK_BIN => bin = Some(chunk),
            _ => {}
        }
        offset += 8 + chunk.len();
    }

    let json = json.ok_or_else(|| LoadError::Gltf("GLB has no JSON chunk".into()))?;
    Ok((json, bin))
}

/// `start..start + len`, or `None` when the end does not fit in `usize`
fn span(start: usize, len: usize) -> Option<Range<usize>> {
    start.checked_add(len).map(|end| start..end)
}

fn resolve_buffers(document: &Document, bin: Option<&[u8]>) -> Result<Vec<Vec<u8>>, LoadError> {
    document
        .buffers
        .iter()
        .enumerate()
        .map(|(index, buffer)| match buffer.uri.as_deref() {
            None if index == 0 => bin.map(<[u8]>::to_vec).ok_or_else(|| {
                LoadError::Gltf("buffer 0 has no URI and no GLB binary chunk".into())
            }),
            Some(uri) if uri.starts_with("data:") => {
                let (_, payload) = uri
                    .split_once(";base64,")
                    .ok_or_else(|| LoadError::Gltf("only base64 data URIs are supported".into()))?;
                STANDARD
                    .decode(payload)
                    .map_err(|e| LoadError::Gltf(format!("bad base64 in buffer {index}: {e}")))
            }
            Some(uri) => Err(LoadError::Gltf(format!(
                "external buffer '{uri}' cannot be resolved"
            ))),
            None => Err(LoadError::Gltf(format!("buffer {index} has no data"))),
        })
        .collect()
}

struct Reader<'a> {
    document: &'a Document,
    buffers: Vec<Vec<u8>>,
}

impl Reader<'_> {
    fn node(&self, index: usize, depth: usize) -> Result<SceneNode, LoadError> {
        // Valid files are acyclic; this catches ones that are not
        if depth > self.document.nodes.len() {
            return Err(LoadError::Gltf("node hierarchy contains a cycle".into()));
        }
        let def = self
            .document
            .nodes
            .get(index)
            .ok_or_else(|| LoadError::Gltf(format!("node {index} does not exist")))?;

        let name = def.name.clone().unwrap_or_else(|| format!("node_{index}"));
        let mut node = match def.mesh {
            Some(mesh) => SceneNode::with_mesh(name, self.mesh(mesh)?),
            None => SceneNode::group(name),
        }
        .with_transform(node_transform(def));

        for &child in &def.children {
            node.add_child(self.node(child, depth + 1)?);
        }
        Ok(node)
    }

    fn mesh(&self, index: usize) -> Result<Mesh, LoadError> {
        let def = self
            .document
            .meshes
            .get(index)
            .ok_or_else(|| LoadError::Gltf(format!("mesh {index} does not exist")))?;

        let mut mesh = Mesh::new();
        for primitive in &def.primitives {
            if primitive.mode.unwrap_or(MODE_TRIANGLES) != MODE_TRIANGLES {
                debug!(mesh = ?def.name, "skipping non-triangle primitive");
                continue;
            }
            let Some(&position_accessor) = primitive.attributes.get("POSITION") else {
                continue;
            };
            // One double sided primitive makes the whole mesh double sided
            mesh.double_sided |= primitive
                .material
                .and_then(|index| self.document.materials.get(index))
                .is_some_and(|material| material.double_sided);
            let positions = self.positions(position_accessor)?;
            let indices = match primitive.indices {
                Some(accessor) => self.indices(accessor)?,
                None => (0..positions.len() as u32).collect(),
            };

            for corner in indices.chunks_exact(3) {
                let point = |i: u32| {
                    positions
                        .get(i as usize)
                        .copied()
                        .ok_or_else(|| LoadError::Gltf(format!("index {i} out of range")))
                };
                mesh.add_triangle(Triangle::from_points(
                    point(corner[0])?,
                    point(corner[1])?,
                    point(corner[2])?,
                ));
            }
        }
        Ok(mesh)
    }

    fn accessor(&self, index: usize) -> Result<&Accessor, LoadError> {
        self.document
            .accessors
            .get(index)
            .ok_or_else(|| LoadError::Gltf(format!("accessor {index} does not exist")))
    }

    /// Raw bytes of each element of an accessor
    fn elements(&self, index: usize, element_size: usize) -> Result<Vec<&[u8]>, LoadError> {
        let accessor = self.accessor(index)?;
        let view_index = accessor
            .buffer_view
            .ok_or_else(|| LoadError::Gltf(format!("accessor {index} has no buffer view")))?;
        let view = self
            .document
            .buffer_views
            .get(view_index)
            .ok_or_else(|| LoadError::Gltf(format!("buffer view {view_index} does not exist")))?;
        let buffer = self
            .buffers
            .get(view.buffer)
            .ok_or_else(|| LoadError::Gltf(format!("buffer {} does not exist", view.buffer)))?;

        let view_bytes = span(view.byte_offset, view.byte_length)
            .and_then(|range| buffer.get(range))
            .ok_or_else(|| {
                LoadError::Gltf(format!("buffer view {view_index} overruns its buffer"))
            })?;
        let stride = view.byte_stride.unwrap_or(element_size);

        (0..accessor.count)
            .map(|i| {
                i.checked_mul(stride)
                    .and_then(|offset| offset.checked_add(accessor.byte_offset))
                    .and_then(|start| span(start, element_size))
                    .and_then(|range| view_bytes.get(range))
                    .ok_or_else(|| LoadError::Gltf(format!("accessor {index} overruns its view")))
            })
            .collect()
    }

    fn positions(&self, index: usize) -> Result<Vec<Point3<f32>>, LoadError> {
        let accessor = self.accessor(index)?;
        if accessor.component_type != COMPONENT_F32 || accessor.kind != "VEC3" {
            return Err(LoadError::Gltf(format!("POSITION accessor {index} is not a float VEC3")));
        }

        Ok(self
            .elements(index, 12)?
            .into_iter()
            .map(|b| {
                let f = |o: usize| f32::from_le_bytes([b[o], b[o + 1], b[o + 2], b[o + 3]]);
                Point3::new(f(0), f(4), f(8))
            })
            .collect())
    }

    fn indices(&self, index: usize) -> Result<Vec<u32>, LoadError> {
        let decoded = match self.accessor(index)?.component_type {
            COMPONENT_U8 => self.elements(index, 1)?.into_iter().map(|b| b[0] as u32).collect(),
            COMPONENT_U16 => self
                .elements(index, 2)?
                .into_iter()
                .map(|b| u16::from_le_bytes([b[0], b[1]]) as u32)
                .collect(),
            COMPONENT_U32 => self
                .elements(index, 4)?
                .into_iter()
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
            other => {
                return Err(LoadError::Gltf(format!("unsupported index component type {other}")))
            }
        };
        Ok(decoded)
    }
}

fn node_transform(def: &NodeDef) -> Matrix4<f32> {
    if let Some(matrix) = &def.matrix {
        // Stored column-major
        return Matrix4::from_column_slice(matrix);
    }

    let translation = def.translation.map(Vector3::from).unwrap_or_else(Vector3::zeros);
    let rotation = def
        .rotation
        .map(|[x, y, z, w]| UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z)))
        .unwrap_or_else(UnitQuaternion::identity);
    let scale = def.scale.map(Vector3::from).unwrap_or_else(|| Vector3::repeat(1.0));
    Transform::compose(&translation, &rotation, &scale)
}
