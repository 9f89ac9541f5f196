//! Binary FBX reader.
//!
//! Decodes the node record tree, then builds one scene node per `Model`
//! object with its local translation, rotation and scaling. `Geometry`
//! objects give the meshes, attached to models through the `Connections`
//! section. ASCII FBX, materials, skins and animation curves are skipped.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use flate2::read::ZlibDecoder;
use nalgebra::{Matrix4, Point3, UnitQuaternion, Vector3};
use nom::{
    bytes::complete::{tag, take},
    multi::{count, length_data},
    number::complete::{le_f32, le_f64, le_i16, le_i32, le_i64, le_u32, le_u64, le_u8},
    sequence::tuple,
    IResult,
};
use tracing::debug;

use crate::error::LoadError;
use crate::geometry::{Mesh, Triangle};
use crate::scene::SceneNode;
use crate::transform::Transform;

const MAGIC: &[u8] = b"Kaydara FBX Binary  \0\x1a\0";

/// First version with 64-bit record offsets
const WIDE_OFFSETS_VERSION: u32 = 7500;

const MAX_DEPTH: usize = 64;

/// Scalar or array value attached to a record
#[derive(Debug, Clone, PartialEq)]
enum Property {
    Int(i64),
    Float(f64),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    String(String),
    Raw,
}

impl Property {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Record {
    name: String,
    properties: Vec<Property>,
    children: Vec<Record>,
}

impl Record {
    fn child(&self, name: &str) -> Option<&Record> {
        self.children.iter().find(|child| child.name == name)
    }

    fn property(&self, index: usize) -> Option<&Property> {
        self.properties.get(index)
    }
}

/// Parse a binary FBX file into a group with one child per root model
pub fn parse_fbx(data: &[u8]) -> Result<SceneNode, LoadError> {
    let (mut input, version) = header(data)
        .map_err(|_| LoadError::Fbx("not a binary FBX file".into()))?;
    let wide = version >= WIDE_OFFSETS_VERSION;

    let mut records = Vec::new();
    while !input.is_empty() {
        let (rest, record) = record(data, input, wide, 0)?;
        input = rest;
        match record {
            Some(record) => records.push(record),
            None => break,
        }
    }

    let objects = records
        .iter()
        .find(|record| record.name == "Objects")
        .ok_or_else(|| LoadError::Fbx("no Objects section".into()))?;
    let connections = records.iter().find(|record| record.name == "Connections");

    let scene = SceneBuilder::new(objects, connections)?;
    let root = scene.build()?;
    debug!(
        version,
        models = scene.models.len(),
        geometries = scene.geometries.len(),
        "parsed FBX"
    );
    Ok(root)
}

fn header(input: &[u8]) -> IResult<&[u8], u32> {
    let (input, _) = tag(MAGIC)(input)?;
    le_u32(input)
}

fn parse<'a, O>(result: IResult<&'a [u8], O>) -> Result<(&'a [u8], O), LoadError> {
    result.map_err(|e| LoadError::Fbx(format!("truncated record: {:?}", e.map(|e| e.code))))
}

/// Offset of `input` from the start of the file
fn offset(file: &[u8], input: &[u8]) -> usize {
    file.len() - input.len()
}

fn record_header(input: &[u8], wide: bool) -> IResult<&[u8], (u64, u64, u64)> {
    if wide {
        tuple((le_u64, le_u64, le_u64))(input)
    } else {
        let (input, (end, properties, length)) = tuple((le_u32, le_u32, le_u32))(input)?;
        Ok((input, (end.into(), properties.into(), length.into())))
    }
}

/// One node record and its nested records. `None` marks the null record
/// that closes a list.
fn record<'a>(
    file: &'a [u8],
    input: &'a [u8],
    wide: bool,
    depth: usize,
) -> Result<(&'a [u8], Option<Record>), LoadError> {
    if depth > MAX_DEPTH {
        return Err(LoadError::Fbx("records nested too deeply".into()));
    }
    let start = offset(file, input);
    let (input, (end, property_count, _)) = parse(record_header(input, wide))?;
    let (mut input, name) = parse(length_data(le_u8)(input))?;
    if end == 0 {
        return Ok((input, None));
    }
    let end = usize::try_from(end)
        .ok()
        .filter(|&end| end > start && end <= file.len())
        .ok_or_else(|| LoadError::Fbx(format!("record at {start} ends outside the file")))?;

    let mut properties = Vec::new();
    for _ in 0..property_count {
        let (rest, value) = property(input)?;
        properties.push(value);
        input = rest;
    }

    let mut children = Vec::new();
    while offset(file, input) < end {
        let (rest, child) = record(file, input, wide, depth + 1)?;
        input = rest;
        match child {
            Some(child) => children.push(child),
            None => break,
        }
    }
    if offset(file, input) > end {
        return Err(LoadError::Fbx(format!("record at {start} overruns its end")));
    }

    let record = Record {
        name: String::from_utf8_lossy(name).into_owned(),
        properties,
        children,
    };
    Ok((&file[end..], Some(record)))
}

fn property(input: &[u8]) -> Result<(&[u8], Property), LoadError> {
    let (input, code) = parse(le_u8(input))?;
    let value = match code {
        b'C' => {
            let (input, value) = parse(le_u8(input))?;
            (input, Property::Int(value.into()))
        }
        b'Y' => {
            let (input, value) = parse(le_i16(input))?;
            (input, Property::Int(value.into()))
        }
        b'I' => {
            let (input, value) = parse(le_i32(input))?;
            (input, Property::Int(value.into()))
        }
        b'L' => {
            let (input, value) = parse(le_i64(input))?;
            (input, Property::Int(value))
        }
        b'F' => {
            let (input, value) = parse(le_f32(input))?;
            (input, Property::Float(value.into()))
        }
        b'D' => {
            let (input, value) = parse(le_f64(input))?;
            (input, Property::Float(value))
        }
        b'f' => {
            let (input, (length, bytes)) = array(input, 4)?;
            let (_, values) = parse(count(le_f32, length)(&bytes[..]))?;
            (input, Property::Floats(values.into_iter().map(f64::from).collect()))
        }
        b'd' => {
            let (input, (length, bytes)) = array(input, 8)?;
            let (_, values) = parse(count(le_f64, length)(&bytes[..]))?;
            (input, Property::Floats(values))
        }
        b'i' => {
            let (input, (length, bytes)) = array(input, 4)?;
            let (_, values) = parse(count(le_i32, length)(&bytes[..]))?;
            (input, Property::Ints(values.into_iter().map(i64::from).collect()))
        }
        b'l' => {
            let (input, (length, bytes)) = array(input, 8)?;
            let (_, values) = parse(count(le_i64, length)(&bytes[..]))?;
            (input, Property::Ints(values))
        }
        b'b' => {
            let (input, (_, bytes)) = array(input, 1)?;
            (input, Property::Ints(bytes.into_iter().map(i64::from).collect()))
        }
        b'S' => {
            let (input, bytes) = parse(length_data(le_u32)(input))?;
            (input, Property::String(String::from_utf8_lossy(bytes).into_owned()))
        }
        b'R' => {
            let (input, _) = parse(length_data(le_u32)(input))?;
            (input, Property::Raw)
        }
        other => {
            return Err(LoadError::Fbx(format!(
                "unknown property type '{}'",
                char::from(other)
            )))
        }
    };
    Ok(value)
}

/// Array payload as raw little-endian bytes, inflated when compressed
fn array(input: &[u8], element_size: usize) -> Result<(&[u8], (usize, Vec<u8>)), LoadError> {
    let (input, (length, encoding, stored)) = parse(tuple((le_u32, le_u32, le_u32))(input))?;
    let (input, payload) = parse(take(stored)(input))?;
    let length = length as usize;
    let expected = length
        .checked_mul(element_size)
        .ok_or_else(|| LoadError::Fbx(format!("array of {length} elements is too large")))?;

    let bytes = match encoding {
        0 => payload.to_vec(),
        1 => {
            let mut bytes = Vec::with_capacity(expected.min(payload.len().saturating_mul(4)));
            // One byte past the expected size is enough to detect overlong data
            ZlibDecoder::new(payload)
                .take(expected as u64 + 1)
                .read_to_end(&mut bytes)
                .map_err(|e| LoadError::Fbx(format!("bad compressed array: {e}")))?;
            bytes
        }
        other => return Err(LoadError::Fbx(format!("unknown array encoding {other}"))),
    };
    if bytes.len() != expected {
        return Err(LoadError::Fbx(format!(
            "array holds {} bytes, expected {expected}",
            bytes.len()
        )));
    }
    Ok((input, (length, bytes)))
}

/// FBX names carry a `\0\x01Class` suffix
fn object_name(record: &Record) -> String {
    let full = record.property(1).and_then(Property::as_str).unwrap_or("");
    full.split('\0').next().unwrap_or(full).to_string()
}

struct Model {
    name: String,
    transform: Matrix4<f32>,
}

struct SceneBuilder {
    models: HashMap<i64, Model>,
    geometries: HashMap<i64, (String, Mesh)>,
    /// Object ids in file order, so children keep a stable order
    order: Vec<i64>,
    /// Parent id to child ids; `0` is the scene root
    links: HashMap<i64, Vec<i64>>,
}

impl SceneBuilder {
    fn new(objects: &Record, connections: Option<&Record>) -> Result<Self, LoadError> {
        let mut builder = Self {
            models: HashMap::new(),
            geometries: HashMap::new(),
            order: Vec::new(),
            links: HashMap::new(),
        };

        for object in &objects.children {
            let Some(id) = object.property(0).and_then(Property::as_i64) else {
                continue;
            };
            match object.name.as_str() {
                "Model" => {
                    let model = Model {
                        name: object_name(object),
                        transform: model_transform(object),
                    };
                    builder.models.insert(id, model);
                }
                "Geometry" => {
                    let mesh = geometry_mesh(object)?;
                    builder.geometries.insert(id, (object_name(object), mesh));
                }
                _ => continue,
            }
            builder.order.push(id);
        }

        let links = connections.map_or(&[][..], |record| record.children.as_slice());
        for link in links.iter().filter(|link| link.name == "C") {
            let kind = link.property(0).and_then(Property::as_str);
            let child = link.property(1).and_then(Property::as_i64);
            let parent = link.property(2).and_then(Property::as_i64);
            if let (Some("OO"), Some(child), Some(parent)) = (kind, child, parent) {
                builder.links.entry(parent).or_default().push(child);
            }
        }
        Ok(builder)
    }

    fn build(&self) -> Result<SceneNode, LoadError> {
        let mut root = SceneNode::group("fbx");
        let placed: HashSet<i64> = self
            .links
            .iter()
            .filter(|(parent, _)| self.models.contains_key(parent))
            .flat_map(|(_, children)| children.iter().copied())
            .collect();
        for id in self.order.iter().filter(|id| !placed.contains(id)) {
            if self.models.contains_key(id) {
                root.add_child(self.model(*id, 0)?);
            } else if let Some((name, mesh)) = self.geometries.get(id) {
                // Geometry that no model instances
                root.add_child(SceneNode::with_mesh(name.clone(), mesh.clone()));
            }
        }
        Ok(root)
    }

    fn model(&self, id: i64, depth: usize) -> Result<SceneNode, LoadError> {
        // Valid files are acyclic; this catches ones that are not
        if depth > self.models.len() {
            return Err(LoadError::Fbx("model hierarchy contains a cycle".into()));
        }
        let model = self
            .models
            .get(&id)
            .ok_or_else(|| LoadError::Fbx(format!("model {id} does not exist")))?;
        let mut node = SceneNode::group(model.name.clone()).with_transform(model.transform);

        let children = self.links.get(&id).map_or(&[][..], Vec::as_slice);
        for child in children {
            if let Some((name, mesh)) = self.geometries.get(child) {
                if node.mesh.is_none() {
                    node.mesh = Some(mesh.clone());
                } else {
                    node.add_child(SceneNode::with_mesh(name.clone(), mesh.clone()));
                }
            } else if self.models.contains_key(child) {
                node.add_child(self.model(*child, depth + 1)?);
            }
        }
        Ok(node)
    }
}

/// Local transform from the model's `Properties70` block
fn model_transform(model: &Record) -> Matrix4<f32> {
    let mut translation = Vector3::zeros();
    let mut rotation = Vector3::zeros();
    let mut scale = Vector3::repeat(1.0);

    let entries = model.child("Properties70").map_or(&[][..], |p| p.children.as_slice());
    for entry in entries.iter().filter(|entry| entry.name == "P") {
        let Some(name) = entry.property(0).and_then(Property::as_str) else {
            continue;
        };
        let target = match name {
            "Lcl Translation" => &mut translation,
            "Lcl Rotation" => &mut rotation,
            "Lcl Scaling" => &mut scale,
            _ => continue,
        };
        // Values follow the name, type, label and flags
        let values: Option<Vec<f64>> = (4..7)
            .map(|index| entry.property(index).and_then(Property::as_f64))
            .collect();
        if let Some(values) = values {
            *target = Vector3::new(values[0] as f32, values[1] as f32, values[2] as f32);
        }
    }

    let rotation = rotation.map(f32::to_radians);
    let rotation = UnitQuaternion::from_euler_angles(rotation.x, rotation.y, rotation.z);
    Transform::compose(&translation, &rotation, &scale)
}

/// Triangles of a `Geometry` object; a negative index `!i` closes a polygon
fn geometry_mesh(geometry: &Record) -> Result<Mesh, LoadError> {
    let name = object_name(geometry);
    let vertices = match geometry.child("Vertices").and_then(|v| v.property(0)) {
        Some(Property::Floats(values)) => values,
        _ => return Ok(Mesh::new()),
    };
    let positions: Vec<Point3<f32>> = vertices
        .chunks_exact(3)
        .map(|c| Point3::new(c[0] as f32, c[1] as f32, c[2] as f32))
        .collect();
    let indices = match geometry.child("PolygonVertexIndex").and_then(|p| p.property(0)) {
        Some(Property::Ints(values)) => values,
        _ => return Ok(Mesh::new()),
    };

    let mut mesh = Mesh::new();
    let mut polygon = Vec::new();
    for &index in indices {
        let (index, last) = if index < 0 { (!index, true) } else { (index, false) };
        let corner = usize::try_from(index)
            .ok()
            .and_then(|i| positions.get(i))
            .copied()
            .ok_or_else(|| {
                LoadError::Fbx(format!(
                    "geometry '{name}' index {index} out of range ({} vertices)",
                    positions.len()
                ))
            })?;
        polygon.push(corner);
        if last {
            for i in 1..polygon.len().saturating_sub(1) {
                mesh.add_triangle(Triangle::from_points(polygon[0], polygon[i], polygon[i + 1]));
            }
            polygon.clear();
        }
    }
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write;

    struct Node {
        name: &'static str,
        properties: Vec<Vec<u8>>,
        children: Vec<Node>,
    }

    fn node(name: &'static str, properties: Vec<Vec<u8>>, children: Vec<Node>) -> Node {
        Node {
            name,
            properties,
            children,
        }
    }

    fn long(value: i64) -> Vec<u8> {
        [&[b'L'][..], &value.to_le_bytes()[..]].concat()
    }

    fn double(value: f64) -> Vec<u8> {
        [&[b'D'][..], &value.to_le_bytes()[..]].concat()
    }

    fn string(value: &str) -> Vec<u8> {
        let length = (value.len() as u32).to_le_bytes();
        [&[b'S'][..], &length[..], value.as_bytes()].concat()
    }

    fn array(code: u8, length: usize, encoding: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![code];
        bytes.extend((length as u32).to_le_bytes());
        bytes.extend(encoding.to_le_bytes());
        bytes.extend((payload.len() as u32).to_le_bytes());
        bytes.extend(payload);
        bytes
    }

    fn doubles(values: &[f64]) -> Vec<u8> {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        array(b'd', values.len(), 0, &payload)
    }

    fn compressed_doubles(values: &[f64]) -> Vec<u8> {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        array(b'd', values.len(), 1, &encoder.finish().unwrap())
    }

    fn ints(values: &[i32]) -> Vec<u8> {
        let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        array(b'i', values.len(), 0, &payload)
    }

    /// Version 7400 record: u32 end offset, property count, property bytes
    fn write(out: &mut Vec<u8>, node: &Node) {
        let start = out.len();
        out.extend([0u8; 12]);
        out.push(node.name.len() as u8);
        out.extend(node.name.as_bytes());
        let properties_start = out.len();
        for property in &node.properties {
            out.extend(property);
        }
        let properties_len = (out.len() - properties_start) as u32;
        if !node.children.is_empty() {
            for child in &node.children {
                write(out, child);
            }
            out.extend([0u8; 13]);
        }
        let end = out.len() as u32;
        out[start..start + 4].copy_from_slice(&end.to_le_bytes());
        out[start + 4..start + 8].copy_from_slice(&(node.properties.len() as u32).to_le_bytes());
        out[start + 8..start + 12].copy_from_slice(&properties_len.to_le_bytes());
    }

    fn file(nodes: &[Node]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend(7400u32.to_le_bytes());
        for node in nodes {
            write(&mut out, node);
        }
        out.extend([0u8; 13]);
        out
    }

    fn triangle_geometry(id: i64, indices: &[i32]) -> Node {
        node(
            "Geometry",
            vec![long(id), string("Tri\0\x01Geometry"), string("Mesh")],
            vec![
                node(
                    "Vertices",
                    vec![doubles(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0])],
                    vec![],
                ),
                node("PolygonVertexIndex", vec![ints(indices)], vec![]),
            ],
        )
    }

    fn translation(x: f64, y: f64, z: f64) -> Node {
        node(
            "P",
            vec![
                string("Lcl Translation"),
                string("Lcl Translation"),
                string(""),
                string("A"),
                double(x),
                double(y),
                double(z),
            ],
            vec![],
        )
    }

    fn model(id: i64, name: &str, properties: Vec<Node>) -> Node {
        let full_name = format!("{name}\0\x01Model");
        node(
            "Model",
            vec![long(id), string(&full_name), string("Mesh")],
            vec![node("Properties70", vec![], properties)],
        )
    }

    fn link(child: i64, parent: i64) -> Node {
        node("C", vec![string("OO"), long(child), long(parent)], vec![])
    }

    #[test]
    fn test_model_with_geometry_and_translation() {
        let data = file(&[
            node(
                "Objects",
                vec![],
                vec![
                    triangle_geometry(10, &[0, 1, -3]),
                    model(20, "Tri", vec![translation(1.0, 2.0, 3.0)]),
                ],
            ),
            node("Connections", vec![], vec![link(10, 20), link(20, 0)]),
        ]);

        let root = parse_fbx(&data).unwrap();
        assert_eq!(root.name, "fbx");
        assert_eq!(root.children.len(), 1);
        let tri = &root.children[0];
        assert_eq!(tri.name, "Tri");
        assert_eq!(tri.triangle_count(), 1);
        assert_relative_eq!(tri.position(), Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_nested_models() {
        let data = file(&[
            node(
                "Objects",
                vec![],
                vec![
                    triangle_geometry(10, &[0, 1, -3]),
                    model(20, "Arm", vec![translation(1.0, 0.0, 0.0)]),
                    model(30, "Hand", vec![translation(0.0, 2.0, 0.0)]),
                ],
            ),
            node(
                "Connections",
                vec![],
                vec![link(20, 0), link(30, 20), link(10, 30)],
            ),
        ]);

        let root = parse_fbx(&data).unwrap();
        assert_eq!(root.children.len(), 1);
        let arm = &root.children[0];
        assert!(arm.mesh.is_none());
        assert_eq!(arm.children[0].name, "Hand");
        assert_eq!(root.triangle_count(), 1);
    }

    #[test]
    fn test_quad_from_compressed_vertices_without_model() {
        let quad = node(
            "Geometry",
            vec![long(5), string("Quad\0\x01Geometry"), string("Mesh")],
            vec![
                node(
                    "Vertices",
                    vec![compressed_doubles(&[
                        0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
                    ])],
                    vec![],
                ),
                node("PolygonVertexIndex", vec![ints(&[0, 1, 2, -4])], vec![]),
            ],
        );
        let data = file(&[node("Objects", vec![], vec![quad])]);

        let root = parse_fbx(&data).unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].name, "Quad");
        assert_eq!(root.triangle_count(), 2);
    }

    #[test]
    fn test_index_out_of_range() {
        let data = file(&[node("Objects", vec![], vec![triangle_geometry(10, &[0, 1, -9])])]);
        assert!(matches!(parse_fbx(&data), Err(LoadError::Fbx(_))));
    }

    #[test]
    fn test_rejects_ascii_and_truncated_files() {
        assert!(matches!(
            parse_fbx(b"; FBX 7.4.0 project file"),
            Err(LoadError::Fbx(_))
        ));

        let data = file(&[node("Objects", vec![], vec![triangle_geometry(10, &[0, 1, -3])])]);
        assert!(matches!(parse_fbx(&data[..60]), Err(LoadError::Fbx(_))));
    }

    #[test]
    fn test_array_length_mismatch() {
        // Claims four doubles but stores three
        let mut bad = doubles(&[0.0, 1.0, 2.0]);
        bad[1..5].copy_from_slice(&4u32.to_le_bytes());
        let geometry = node(
            "Geometry",
            vec![long(1), string("Bad\0\x01Geometry"), string("Mesh")],
            vec![node("Vertices", vec![bad], vec![])],
        );
        let data = file(&[node("Objects", vec![], vec![geometry])]);
        assert!(matches!(parse_fbx(&data), Err(LoadError::Fbx(_))));
    }
}
