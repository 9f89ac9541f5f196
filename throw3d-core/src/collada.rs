//! COLLADA (`.dae`) reader.
//!
//! Reads `triangles`, `polylist` and `polygons` primitives from the geometry
//! library and places them through the visual scene's node hierarchy. The
//! document's up axis and unit are folded into the transform of the returned
//! group. Materials, controllers and animations are skipped.

use std::f32::consts::FRAC_PI_2;
use std::str::FromStr;

use nalgebra::{Matrix4, Point3, Unit, UnitQuaternion, Vector3};
use roxmltree::{Document, Node};
use tracing::debug;

use crate::error::LoadError;
use crate::geometry::{Mesh, Triangle};
use crate::scene::SceneNode;
use crate::transform::Transform;

const MAX_DEPTH: usize = 256;

/// Parse COLLADA XML into a group holding the visual scene
pub fn parse_collada(text: &str) -> Result<SceneNode, LoadError> {
    let document = Document::parse(text)?;
    let root = document.root_element();
    if !is(&root, "COLLADA") {
        return Err(LoadError::Collada(format!(
            "root element is <{}>, not <COLLADA>",
            root.tag_name().name()
        )));
    }

    let mut geometries = Vec::new();
    for library in elements(root, "library_geometries") {
        for geometry in elements(library, "geometry") {
            let Some(id) = geometry.attribute("id") else {
                continue;
            };
            let name = geometry.attribute("name").unwrap_or(id);
            geometries.push(Geometry {
                id,
                name,
                mesh: read_geometry(geometry)?,
            });
        }
    }

    let mut group = SceneNode::group("collada").with_transform(asset_transform(root));
    match visual_scene(root) {
        Some(scene) => {
            for node in elements(scene, "node") {
                group.add_child(read_node(node, &geometries, 0)?);
            }
        }
        None => {
            for geometry in &geometries {
                group.add_child(SceneNode::with_mesh(geometry.name, geometry.mesh.clone()));
            }
        }
    }

    debug!(
        geometries = geometries.len(),
        nodes = group.children.len(),
        "parsed COLLADA"
    );
    Ok(group)
}

struct Geometry<'a> {
    id: &'a str,
    name: &'a str,
    mesh: Mesh,
}

fn is(node: &Node, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

fn elements<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(move |child| is(child, name))
}

fn element<'a, 'input>(node: Node<'a, 'input>, name: &'static str) -> Option<Node<'a, 'input>> {
    elements(node, name).next()
}

/// `#id` references point at elements by id
fn fragment(url: &str) -> &str {
    url.strip_prefix('#').unwrap_or(url)
}

fn numbers<T: FromStr>(node: Node) -> Result<Vec<T>, LoadError> {
    node.text()
        .unwrap_or("")
        .split_ascii_whitespace()
        .map(|token| {
            token.parse().map_err(|_| {
                LoadError::Collada(format!(
                    "bad number '{token}' in <{}>",
                    node.tag_name().name()
                ))
            })
        })
        .collect()
}

/// Scale by `<unit meter>` and turn a Z or X up axis into Y up
fn asset_transform(root: Node) -> Matrix4<f32> {
    let Some(asset) = element(root, "asset") else {
        return Matrix4::identity();
    };
    let meter = element(asset, "unit")
        .and_then(|unit| unit.attribute("meter"))
        .and_then(|meter| meter.parse::<f32>().ok())
        .filter(|meter| meter.is_finite() && *meter > 0.0)
        .unwrap_or(1.0);
    let rotation = match element(asset, "up_axis").and_then(|axis| axis.text()) {
        Some(axis) if axis.trim() == "Z_UP" => {
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2)
        }
        Some(axis) if axis.trim() == "X_UP" => {
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2)
        }
        _ => UnitQuaternion::identity(),
    };
    Transform::compose(&Vector3::zeros(), &rotation, &Vector3::repeat(meter))
}

/// The scene `<instance_visual_scene>` names, else the first one
fn visual_scene<'a, 'input>(root: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    let mut scenes = elements(root, "library_visual_scenes")
        .flat_map(|library| elements(library, "visual_scene"));
    let wanted = element(root, "scene")
        .and_then(|scene| element(scene, "instance_visual_scene"))
        .and_then(|instance| instance.attribute("url"))
        .map(fragment);
    match wanted {
        Some(id) => scenes.find(|scene| scene.attribute("id") == Some(id)),
        None => scenes.next(),
    }
}

fn read_node(node: Node, geometries: &[Geometry], depth: usize) -> Result<SceneNode, LoadError> {
    if depth > MAX_DEPTH {
        return Err(LoadError::Collada("nodes nested too deeply".into()));
    }
    let name = node
        .attribute("name")
        .or_else(|| node.attribute("id"))
        .unwrap_or("node");
    let mut scene_node = SceneNode::group(name).with_transform(node_transform(node)?);

    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "instance_geometry" => {
                let url = child.attribute("url").map(fragment).unwrap_or("");
                let geometry = geometries
                    .iter()
                    .find(|geometry| geometry.id == url)
                    .ok_or_else(|| LoadError::Collada(format!("geometry '{url}' not found")))?;
                if scene_node.mesh.is_none() {
                    scene_node.mesh = Some(geometry.mesh.clone());
                } else {
                    let mesh = geometry.mesh.clone();
                    scene_node.add_child(SceneNode::with_mesh(geometry.name, mesh));
                }
            }
            "node" => scene_node.add_child(read_node(child, geometries, depth + 1)?),
            _ => {}
        }
    }
    Ok(scene_node)
}

/// Product of the node's transform elements in document order
fn node_transform(node: Node) -> Result<Matrix4<f32>, LoadError> {
    let mut transform = Matrix4::identity();
    for child in node.children().filter(Node::is_element) {
        let name = child.tag_name().name();
        let values = match name {
            "matrix" | "translate" | "rotate" | "scale" => numbers::<f32>(child)?,
            _ => continue,
        };
        let step = match (name, values.as_slice()) {
            // Stored row by row
            ("matrix", values) if values.len() == 16 => Matrix4::from_row_slice(values),
            ("translate", &[x, y, z]) => Transform::translation_matrix(x, y, z),
            ("scale", &[x, y, z]) => Transform::scale_matrix(x, y, z),
            ("rotate", &[x, y, z, degrees]) => {
                let axis = Unit::try_new(Vector3::new(x, y, z), f32::EPSILON);
                axis.map(|axis| UnitQuaternion::from_axis_angle(&axis, degrees.to_radians()))
                    .unwrap_or_else(UnitQuaternion::identity)
                    .to_homogeneous()
            }
            _ => {
                return Err(LoadError::Collada(format!(
                    "<{name}> has {} values",
                    values.len()
                )))
            }
        };
        transform *= step;
    }
    Ok(transform)
}

fn read_geometry(geometry: Node) -> Result<Mesh, LoadError> {
    let mut mesh = Mesh::new();
    // Splines and other non-mesh geometry stay empty
    let Some(mesh_node) = element(geometry, "mesh") else {
        return Ok(mesh);
    };
    for primitive in mesh_node.children().filter(Node::is_element) {
        match primitive.tag_name().name() {
            "triangles" | "polylist" | "polygons" => {
                read_primitive(mesh_node, primitive, &mut mesh)?
            }
            "source" | "vertices" => {}
            other => debug!(primitive = other, "skipping COLLADA primitive"),
        }
    }
    Ok(mesh)
}

struct Input<'a> {
    semantic: &'a str,
    source: &'a str,
    offset: usize,
}

fn inputs<'a>(node: Node<'a, '_>) -> Result<Vec<Input<'a>>, LoadError> {
    elements(node, "input")
        .map(|input| -> Result<Input<'a>, LoadError> {
            let offset = match input.attribute("offset") {
                Some(offset) => offset.parse().map_err(|_| {
                    LoadError::Collada(format!("bad input offset '{offset}'"))
                })?,
                None => 0,
            };
            Ok(Input {
                semantic: input.attribute("semantic").unwrap_or(""),
                source: input.attribute("source").map(fragment).unwrap_or(""),
                offset,
            })
        })
        .collect()
}

fn read_primitive(mesh_node: Node, primitive: Node, mesh: &mut Mesh) -> Result<(), LoadError> {
    let inputs = inputs(primitive)?;
    let Some(vertex) = inputs.iter().find(|input| input.semantic == "VERTEX") else {
        return Ok(());
    };
    // Each corner is a tuple of indices, one per input offset
    let stride = inputs.iter().map(|input| input.offset + 1).max().unwrap_or(1);
    let positions = positions(mesh_node, vertex.source)?;

    let polygons: Vec<Vec<usize>> = match primitive.tag_name().name() {
        "triangles" => match element(primitive, "p") {
            Some(p) => {
                let indices: Vec<usize> = numbers(p)?;
                indices
                    .chunks_exact(3 * stride)
                    .map(<[usize]>::to_vec)
                    .collect()
            }
            None => Vec::new(),
        },
        "polylist" => {
            let counts: Vec<usize> = element(primitive, "vcount")
                .map(numbers)
                .transpose()?
                .unwrap_or_default();
            let indices: Vec<usize> = element(primitive, "p")
                .map(numbers)
                .transpose()?
                .unwrap_or_default();
            let mut polygons = Vec::with_capacity(counts.len());
            let mut start: usize = 0;
            for corners in counts {
                let polygon = corners
                    .checked_mul(stride)
                    .and_then(|len| start.checked_add(len))
                    .and_then(|end| indices.get(start..end))
                    .ok_or_else(|| {
                        LoadError::Collada("<vcount> runs past the end of <p>".into())
                    })?;
                start += polygon.len();
                polygons.push(polygon.to_vec());
            }
            polygons
        }
        _ => elements(primitive, "p")
            .map(numbers)
            .collect::<Result<_, _>>()?,
    };

    for polygon in polygons {
        let corners = polygon
            .chunks_exact(stride)
            .map(|corner| positions.get(corner[vertex.offset]).copied())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                LoadError::Collada(format!(
                    "vertex index out of range ({} positions)",
                    positions.len()
                ))
            })?;
        for i in 1..corners.len().saturating_sub(1) {
            mesh.add_triangle(Triangle::from_points(corners[0], corners[i], corners[i + 1]));
        }
    }
    Ok(())
}

/// Positions behind a `VERTEX` input, through its `<vertices>` element
fn positions(mesh_node: Node, vertices_id: &str) -> Result<Vec<Point3<f32>>, LoadError> {
    let vertices = elements(mesh_node, "vertices")
        .find(|vertices| vertices.attribute("id") == Some(vertices_id));
    // Some exporters point VERTEX straight at a source
    let source_id = match vertices {
        Some(vertices) => inputs(vertices)?
            .into_iter()
            .find(|input| input.semantic == "POSITION")
            .map(|input| input.source)
            .ok_or_else(|| {
                LoadError::Collada(format!("<vertices> '{vertices_id}' has no POSITION"))
            })?,
        None => vertices_id,
    };

    let source = elements(mesh_node, "source")
        .find(|source| source.attribute("id") == Some(source_id))
        .ok_or_else(|| LoadError::Collada(format!("source '{source_id}' not found")))?;
    let values: Vec<f32> = element(source, "float_array")
        .map(numbers)
        .transpose()?
        .unwrap_or_default();
    let stride = element(source, "technique_common")
        .and_then(|technique| element(technique, "accessor"))
        .and_then(|accessor| accessor.attribute("stride"))
        .map(|stride| stride.parse::<usize>())
        .transpose()
        .map_err(|_| LoadError::Collada(format!("bad accessor stride in '{source_id}'")))?
        .unwrap_or(3);
    if stride < 3 {
        return Err(LoadError::Collada(format!(
            "source '{source_id}' has stride {stride}, positions need 3"
        )));
    }

    Ok(values
        .chunks_exact(stride)
        .map(|value| Point3::new(value[0], value[1], value[2]))
        .collect())
}
