//! Wavefront OBJ reader.
//!
//! Reads vertex positions and polygon faces. Each `o` or `g` record starts a
//! new child node of the returned group; polygons are fan-triangulated and
//! flat shaded. Texture coordinates, normals and materials are skipped.

use nalgebra::Point3;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, i64 as signed, space0, space1},
    combinator::{opt, recognize, rest},
    multi::separated_list1,
    number::complete::float,
    sequence::{pair, preceded, terminated},
    IResult,
};
use tracing::debug;

use crate::error::LoadError;
use crate::geometry::{Mesh, Triangle};
use crate::scene::SceneNode;

enum Record<'a> {
    Vertex(Point3<f32>),
    Face(Vec<i64>),
    Object(&'a str),
    Other,
}

/// Parse OBJ text into a group with one child per object
pub fn parse_obj(text: &str) -> Result<SceneNode, LoadError> {
    let mut root = SceneNode::group("obj");
    let mut positions: Vec<Point3<f32>> = Vec::new();
    let mut current = SceneNode::with_mesh("default", Mesh::new());

    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let (_, record) = record(line).map_err(|e| LoadError::Obj {
            line: line_number,
            message: format!("{e:?}"),
        })?;

        match record {
            Record::Vertex(point) => positions.push(point),
            Record::Face(indices) => {
                let corners = indices
                    .iter()
                    .map(|&i| resolve(i, &positions))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| LoadError::Obj {
                        line: line_number,
                        message: format!(
                            "face index out of range ({} vertices)",
                            positions.len()
                        ),
                    })?;
                if corners.len() < 3 {
                    return Err(LoadError::Obj {
                        line: line_number,
                        message: "face needs at least three corners".into(),
                    });
                }
                if let Some(mesh) = current.mesh.as_mut() {
                    for i in 1..corners.len() - 1 {
                        mesh.add_triangle(Triangle::from_points(
                            corners[0],
                            corners[i],
                            corners[i + 1],
                        ));
                    }
                }
            }
            Record::Object(name) => {
                let previous =
                    std::mem::replace(&mut current, SceneNode::with_mesh(name, Mesh::new()));
                push_if_meshed(&mut root, previous);
            }
            Record::Other => {}
        }
    }
    push_if_meshed(&mut root, current);

    debug!(
        vertices = positions.len(),
        objects = root.children.len(),
        "parsed OBJ"
    );
    Ok(root)
}

fn push_if_meshed(root: &mut SceneNode, node: SceneNode) {
    if node.mesh.as_ref().is_some_and(|mesh| !mesh.is_empty()) {
        root.add_child(node);
    }
}

/// OBJ indices are 1-based; negative ones count back from the latest vertex
fn resolve(index: i64, positions: &[Point3<f32>]) -> Option<Point3<f32>> {
    let resolved = match index {
        i if i > 0 => i - 1,
        i if i < 0 => positions.len() as i64 + i,
        _ => return None,
    };
    usize::try_from(resolved)
        .ok()
        .and_then(|i| positions.get(i))
        .copied()
}

fn record(line: &str) -> IResult<&str, Record<'_>> {
    alt((vertex, face, object, other))(line)
}

fn vertex(input: &str) -> IResult<&str, Record<'_>> {
    let (input, _) = terminated(tag("v"), space1)(input)?;
    let (input, x) = float(input)?;
    let (input, y) = preceded(space1, float)(input)?;
    let (input, z) = preceded(space1, float)(input)?;
    // Optional w component
    let (input, _) = opt(preceded(space1, float))(input)?;
    Ok((input, Record::Vertex(Point3::new(x, y, z))))
}

fn face(input: &str) -> IResult<&str, Record<'_>> {
    let (input, _) = terminated(tag("f"), space1)(input)?;
    let (input, indices) = separated_list1(space1, face_corner)(input)?;
    let (input, _) = space0(input)?;
    Ok((input, Record::Face(indices)))
}

/// `v`, `v/vt`, `v//vn` or `v/vt/vn`; only the position index is kept
fn face_corner(input: &str) -> IResult<&str, i64> {
    let (input, index) = signed(input)?;
    let (input, _) = opt(recognize(pair(
        char('/'),
        take_while1(|c: char| c == '/' || c == '-' || c.is_ascii_digit()),
    )))(input)?;
    Ok((input, index))
}

fn object(input: &str) -> IResult<&str, Record<'_>> {
    let (input, _) = terminated(alt((tag("o"), tag("g"))), space1)(input)?;
    let (input, name) = rest(input)?;
    Ok((input, Record::Object(name.trim())))
}

/// Normals, texture coordinates, materials, smoothing groups
fn other(input: &str) -> IResult<&str, Record<'_>> {
    let (input, _) = alt((
        tag("vn"),
        tag("vt"),
        tag("vp"),
        tag("mtllib"),
        tag("usemtl"),
        tag("s"),
        tag("l"),
    ))(input)?;
    let (input, _) = rest(input)?;
    Ok((input, Record::Other))
}
