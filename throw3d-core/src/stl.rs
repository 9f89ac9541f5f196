/// STL file parser for binary and ASCII formats
use nalgebra::{Point3, Vector3};
use nom::{
    bytes::complete::{tag, take, take_till},
    character::complete::{multispace0, multispace1},
    multi::{count, many0},
    number::complete::{float, le_f32, le_u32},
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::LoadError;
use crate::geometry::{Mesh, Triangle, Vertex};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// Parse a binary STL file
pub fn parse_binary_stl(data: &[u8]) -> Result<Mesh, LoadError> {
    if data.len() < HEADER_LEN + 4 {
        return Err(LoadError::Stl("file too small to be a valid STL".into()));
    }

    let (body, triangle_count) = binary_header(data)
        .map_err(|e| LoadError::Stl(format!("bad header: {e:?}")))?;
    let triangle_count = triangle_count as usize;

    let needed = triangle_count.checked_mul(FACET_LEN);
    if needed.map_or(true, |needed| body.len() < needed) {
        return Err(LoadError::Stl(format!(
            "header announces {triangle_count} facets but only {} bytes follow",
            body.len()
        )));
    }

    let (_, triangles) = count(binary_facet, triangle_count)(body)
        .map_err(|e| LoadError::Stl(format!("bad facet: {e:?}")))?;

    let mut mesh = Mesh::with_capacity(triangles.len());
    for triangle in triangles {
        mesh.add_triangle(triangle);
    }
    Ok(mesh)
}

fn binary_header(input: &[u8]) -> IResult<&[u8], u32> {
    preceded(take(HEADER_LEN), le_u32)(input)
}

fn binary_vector(input: &[u8]) -> IResult<&[u8], (f32, f32, f32)> {
    tuple((le_f32, le_f32, le_f32))(input)
}

fn binary_facet(input: &[u8]) -> IResult<&[u8], Triangle> {
    let (input, normal) = binary_vector(input)?;
    let (input, corners) = count(binary_vector, 3)(input)?;
    // Attribute byte count, unused
    let (input, _) = take(2usize)(input)?;
    Ok((input, facet(normal, &corners)))
}

/// Parse an ASCII STL file
pub fn parse_ascii_stl(input: &str) -> Result<Mesh, LoadError> {
    match ascii_solid(input) {
        Ok((_, mesh)) => Ok(mesh),
        Err(e) => Err(LoadError::Stl(format!("failed to parse ASCII STL: {e:?}"))),
    }
}

fn ascii_solid(input: &str) -> IResult<&str, Mesh> {
    let (input, _) = preceded(multispace0, tag("solid"))(input)?;
    // Optional name, up to the end of the line
    let (input, _) = take_till(|c: char| c == '\n')(input)?;
    let (input, triangles) = many0(ascii_facet)(input)?;
    let (input, _) = preceded(multispace0, tag("endsolid"))(input)?;

    let mut mesh = Mesh::with_capacity(triangles.len());
    for triangle in triangles {
        mesh.add_triangle(triangle);
    }

    Ok((input, mesh))
}

fn ascii_facet(input: &str) -> IResult<&str, Triangle> {
    let (input, _) = preceded(multispace0, tag("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag("normal"))(input)?;
    let (input, normal) = ascii_vector(input)?;
    let (input, _) = preceded(multispace0, tag("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag("loop"))(input)?;
    let (input, corners) = count(ascii_vertex, 3)(input)?;
    let (input, _) = preceded(multispace0, tag("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag("endfacet"))(input)?;

    Ok((input, facet(normal, &corners)))
}

fn ascii_vertex(input: &str) -> IResult<&str, (f32, f32, f32)> {
    preceded(preceded(multispace0, tag("vertex")), ascii_vector)(input)
}

fn ascii_vector(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, _) = multispace0(input)?;
    let (input, x) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, z) = float(input)?;
    Ok((input, (x, y, z)))
}

/// Triangle from a stored normal and three corners. Exporters often write a
/// zero normal, in which case it is recomputed from the winding.
fn facet(normal: (f32, f32, f32), corners: &[(f32, f32, f32)]) -> Triangle {
    let points: Vec<Point3<f32>> = corners.iter().map(|&(x, y, z)| Point3::new(x, y, z)).collect();
    let stored = Vector3::new(normal.0, normal.1, normal.2);
    if stored.norm_squared() < f32::EPSILON {
        return Triangle::from_points(points[0], points[1], points[2]);
    }
    Triangle::new(
        Vertex::new(points[0], stored),
        Vertex::new(points[1], stored),
        Vertex::new(points[2], stored),
    )
}

/// Detect and parse STL file (binary or ASCII)
pub fn parse_stl(data: &[u8]) -> Result<Mesh, LoadError> {
    // Binary files may also start with "solid", so fall back on failure
    if data.starts_with(b"solid") {
        if let Ok(text) = std::str::from_utf8(data) {
            if let Ok(mesh) = parse_ascii_stl(text) {
                return Ok(mesh);
            }
        }
    }

    parse_binary_stl(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_with_facets(facets: &[[f32; 12]]) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&(facets.len() as u32).to_le_bytes());
        for facet in facets {
            for value in facet {
                data.extend_from_slice(&value.to_le_bytes());
            }
            data.extend_from_slice(&[0, 0]);
        }
        data
    }

    #[test]
    fn test_parse_binary_header() {
        let data = binary_with_facets(&[]);
        let mesh = parse_binary_stl(&data).unwrap();
        assert_eq!(mesh.triangles.len(), 0);
    }

    #[test]
    fn test_parse_binary_facet() {
        let data = binary_with_facets(&[[
            0.0, 0.0, 1.0, // normal
            0.0, 0.0, 0.0, //
            1.0, 0.0, 0.0, //
            0.0, 1.0, 0.0,
        ]]);
        let mesh = parse_stl(&data).unwrap();
        assert_eq!(mesh.triangles.len(), 1);
        assert_eq!(mesh.triangles[0].vertices[1].position, Point3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.triangles[0].vertices[2].normal, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_truncated_binary() {
        let mut data = binary_with_facets(&[[0.0; 12]]);
        data.truncate(data.len() - 10);
        assert!(matches!(parse_binary_stl(&data), Err(LoadError::Stl(_))));
        assert!(parse_binary_stl(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_facet_count_beyond_data() {
        let mut data = binary_with_facets(&[[0.0; 12]]);
        data[HEADER_LEN..HEADER_LEN + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(parse_binary_stl(&data), Err(LoadError::Stl(_))));
    }

    #[test]
    fn test_parse_ascii() {
        let text = "solid tri\n\
            facet normal 0 0 0\n\
              outer loop\n\
                vertex 0 0 0\n\
                vertex 2 0 0\n\
                vertex 0 2 0\n\
              endloop\n\
            endfacet\n\
            endsolid tri\n";
        let mesh = parse_stl(text.as_bytes()).unwrap();
        assert_eq!(mesh.triangles.len(), 1);
        // Zero normal replaced by the winding normal
        assert_eq!(mesh.triangles[0].vertices[0].normal, Vector3::new(0.0, 0.0, 1.0));
    }
}
