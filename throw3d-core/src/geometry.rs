/// Geometry primitives for scene objects
use nalgebra::{Point3, Vector3};
use std::f32::consts::PI;

/// A 3D vertex with position and normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
}

impl Vertex {
    pub fn new(position: Point3<f32>, normal: Vector3<f32>) -> Self {
        Self { position, normal }
    }
}

/// A triangle face defined by three vertices
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub vertices: [Vertex; 3],
}

impl Triangle {
    pub fn new(v0: Vertex, v1: Vertex, v2: Vertex) -> Self {
        Self {
            vertices: [v0, v1, v2],
        }
    }

    /// Build a flat-shaded triangle, the normal taken from the winding
    pub fn from_points(a: Point3<f32>, b: Point3<f32>, c: Point3<f32>) -> Self {
        let normal = face_normal(&a, &b, &c);
        Self::new(
            Vertex::new(a, normal),
            Vertex::new(b, normal),
            Vertex::new(c, normal),
        )
    }

    /// Calculate the face normal from the triangle's vertices
    pub fn calculate_normal(&self) -> Vector3<f32> {
        let [v0, v1, v2] = &self.vertices;
        face_normal(&v0.position, &v1.position, &v2.position)
    }
}

/// Unit normal of a counter-clockwise triangle, zero when degenerate
pub fn face_normal(a: &Point3<f32>, b: &Point3<f32>, c: &Point3<f32>) -> Vector3<f32> {
    (b - a)
        .cross(&(c - a))
        .try_normalize(f32::EPSILON)
        .unwrap_or_else(Vector3::zeros)
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand(&mut self, point: &Point3<f32>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Slab test; returns the entry and exit ray parameters.
    /// The direction does not need to be normalized.
    pub fn intersect_ray(
        &self,
        origin: &Point3<f32>,
        direction: &Vector3<f32>,
    ) -> Option<(f32, f32)> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let inv = 1.0 / direction[axis];
            let mut t0 = (self.min[axis] - origin[axis]) * inv;
            let mut t1 = (self.max[axis] - origin[axis]) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            // NaN appears when the ray runs inside a slab plane; max/min skip it
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_max < t_min {
                return None;
            }
        }

        if t_max < 0.0 {
            None
        } else {
            Some((t_min, t_max))
        }
    }
}

/// A 3D mesh composed of triangles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub triangles: Vec<Triangle>,
    /// Rays hit back faces too; otherwise only faces wound towards the ray
    pub double_sided: bool,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            triangles: Vec::with_capacity(capacity),
            double_sided: false,
        }
    }

    pub fn with_double_sided(mut self, double_sided: bool) -> Self {
        self.double_sided = double_sided;
        self
    }

    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.triangles.push(triangle);
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for vertex in self.triangles.iter().flat_map(|t| t.vertices.iter()) {
            aabb.expand(&vertex.position);
        }
        aabb
    }

    /// Axis-aligned cube centred on the origin
    pub fn cube(size: f32) -> Self {
        let half = size / 2.0;
        let mut mesh = Self::with_capacity(12);

        for axis in 0..3 {
            for sign in [1.0f32, -1.0] {
                let mut normal = Vector3::zeros();
                normal[axis] = sign;
                // Two in-plane axes ordered so that u x v == normal
                let mut u = Vector3::zeros();
                let mut v = Vector3::zeros();
                u[(axis + 1) % 3] = 1.0;
                v[(axis + 2) % 3] = sign;

                let center = Point3::from(normal * half);
                let corner = |a: f32, b: f32| center + u * (a * half) + v * (b * half);
                let quad = [
                    corner(-1.0, -1.0),
                    corner(1.0, -1.0),
                    corner(1.0, 1.0),
                    corner(-1.0, 1.0),
                ];

                for (a, b, c) in [(0, 1, 2), (0, 2, 3)] {
                    mesh.add_triangle(Triangle::new(
                        Vertex::new(quad[a], normal),
                        Vertex::new(quad[b], normal),
                        Vertex::new(quad[c], normal),
                    ));
                }
            }
        }

        mesh
    }

    /// UV sphere centred on the origin with smooth normals
    pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);

        let point = |ix: u32, iy: u32| {
            let u = ix as f32 / width_segments as f32;
            let v = iy as f32 / height_segments as f32;
            let phi = u * 2.0 * PI;
            let theta = v * PI;
            let normal = Vector3::new(
                -phi.cos() * theta.sin(),
                theta.cos(),
                phi.sin() * theta.sin(),
            );
            Vertex::new(Point3::from(normal * radius), normal)
        };

        let mut mesh = Self::with_capacity((width_segments * height_segments * 2) as usize);
        for iy in 0..height_segments {
            for ix in 0..width_segments {
                let a = point(ix + 1, iy);
                let b = point(ix, iy);
                let c = point(ix, iy + 1);
                let d = point(ix + 1, iy + 1);

                // The pole rows collapse to a single triangle
                if iy != 0 {
                    mesh.add_triangle(Triangle::new(a, b, d));
                }
                if iy != height_segments - 1 {
                    mesh.add_triangle(Triangle::new(b, c, d));
                }
            }
        }

        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cube_faces_point_outward() {
        let cube = Mesh::cube(2.0);
        assert_eq!(cube.triangles.len(), 12);
        for triangle in &cube.triangles {
            let stored = triangle.vertices[0].normal;
            let computed = triangle.calculate_normal();
            assert_relative_eq!(stored, computed, epsilon = 1e-6);
            let centroid = triangle
                .vertices
                .iter()
                .fold(Vector3::zeros(), |acc, v| acc + v.position.coords)
                / 3.0;
            assert!(centroid.dot(&stored) > 0.0);
        }
    }

    #[test]
    fn test_cube_bounds() {
        let bounds = Mesh::cube(4.0).bounds();
        assert_eq!(bounds.min, Point3::new(-2.0, -2.0, -2.0));
        assert_eq!(bounds.max, Point3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let sphere = Mesh::sphere(1.5, 16, 8);
        // 16 * 8 * 2 minus one row of triangles at each pole
        assert_eq!(sphere.triangles.len(), 16 * 8 * 2 - 2 * 16);
        for vertex in sphere.triangles.iter().flat_map(|t| t.vertices.iter()) {
            assert_relative_eq!(vertex.position.coords.norm(), 1.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_empty_mesh_bounds() {
        assert!(Mesh::new().bounds().is_empty());
    }

    #[test]
    fn test_aabb_ray() {
        let bounds = Mesh::cube(2.0).bounds();
        let hit = bounds.intersect_ray(&Point3::new(-5.0, 0.0, 0.0), &Vector3::new(1.0, 0.0, 0.0));
        let (t0, t1) = hit.unwrap();
        assert_relative_eq!(t0, 4.0);
        assert_relative_eq!(t1, 6.0);

        let miss = bounds.intersect_ray(&Point3::new(-5.0, 3.0, 0.0), &Vector3::new(1.0, 0.0, 0.0));
        assert!(miss.is_none());

        let behind =
            bounds.intersect_ray(&Point3::new(5.0, 0.0, 0.0), &Vector3::new(1.0, 0.0, 0.0));
        assert!(behind.is_none());
    }
}
