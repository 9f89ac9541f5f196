//! Ray casting against scene hierarchies.
//!
//! Finds where a ray meets the triangles of a set of objects, searching each
//! object's children recursively. Hits are reported nearest first.

use nalgebra::{Matrix4, Point3, Unit, Vector3};
use tracing::trace;

use crate::geometry::Triangle;
use crate::scene::SceneNode;

/// Rejects rays parallel to a triangle's plane
const PARALLEL_EPSILON: f32 = 1e-7;

/// Half-line from an origin along a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Unit<Vector3<f32>>,
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Unit<Vector3<f32>>) -> Self {
        Self { origin, direction }
    }

    pub fn at(&self, distance: f32) -> Point3<f32> {
        self.origin + self.direction.into_inner() * distance
    }
}

/// A single ray hit
#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    /// Distance from the ray origin to the hit point
    pub distance: f32,
    /// Hit point in world coordinates
    pub point: Point3<f32>,
    /// Index of the triangle within its mesh
    pub face_index: usize,
    /// Name of the node owning the mesh
    pub object: String,
}

/// Ray with an accepted distance range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Raycaster {
    pub ray: Ray,
    pub near: f32,
    pub far: f32,
}

impl Raycaster {
    pub fn new(origin: Point3<f32>, direction: Unit<Vector3<f32>>) -> Self {
        Self {
            ray: Ray::new(origin, direction),
            near: 0.0,
            far: f32::INFINITY,
        }
    }

    pub fn with_far(mut self, far: f32) -> Self {
        self.far = far;
        self
    }

    /// All hits against `objects` (and their descendants), nearest first
    pub fn intersect_objects<O: Raycast + ?Sized>(&self, objects: &O) -> Vec<Intersection> {
        let mut hits = Vec::new();
        objects.raycast(self, &mut hits);
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        trace!(hits = hits.len(), "raycast complete");
        hits
    }

    fn accepts(&self, distance: f32) -> bool {
        distance >= self.near && distance <= self.far
    }
}

/// Anything a ray can be tested against
pub trait Raycast {
    /// Append every hit with this object, in no particular order
    fn raycast(&self, raycaster: &Raycaster, hits: &mut Vec<Intersection>);
}

impl Raycast for SceneNode {
    fn raycast(&self, raycaster: &Raycaster, hits: &mut Vec<Intersection>) {
        raycast_node(self, &Matrix4::identity(), raycaster, hits);
    }
}

impl<T: Raycast> Raycast for [T] {
    fn raycast(&self, raycaster: &Raycaster, hits: &mut Vec<Intersection>) {
        for object in self {
            object.raycast(raycaster, hits);
        }
    }
}

impl<T: Raycast> Raycast for Vec<T> {
    fn raycast(&self, raycaster: &Raycaster, hits: &mut Vec<Intersection>) {
        self.as_slice().raycast(raycaster, hits);
    }
}

impl<T: Raycast + ?Sized> Raycast for &T {
    fn raycast(&self, raycaster: &Raycaster, hits: &mut Vec<Intersection>) {
        (**self).raycast(raycaster, hits);
    }
}

fn raycast_node(
    node: &SceneNode,
    parent: &Matrix4<f32>,
    raycaster: &Raycaster,
    hits: &mut Vec<Intersection>,
) {
    let world = parent * node.transform;

    if let Some(mesh) = node.mesh.as_ref().filter(|mesh| !mesh.is_empty()) {
        // Test in the mesh's local space, measure distances in world space
        if let Some(inverse) = world.try_inverse() {
            let origin = inverse.transform_point(&raycaster.ray.origin);
            let direction = inverse.transform_vector(&raycaster.ray.direction.into_inner());

            if mesh.bounds().intersect_ray(&origin, &direction).is_some() {
                for (face_index, triangle) in mesh.triangles.iter().enumerate() {
                    let hit = intersect_triangle(&origin, &direction, triangle, mesh.double_sided);
                    let Some(t) = hit else {
                        continue;
                    };
                    let point = world.transform_point(&(origin + direction * t));
                    let distance = nalgebra::distance(&raycaster.ray.origin, &point);
                    if raycaster.accepts(distance) {
                        hits.push(Intersection {
                            distance,
                            point,
                            face_index,
                            object: node.name.clone(),
                        });
                    }
                }
            }
        }
    }

    for child in &node.children {
        raycast_node(child, &world, raycaster, hits);
    }
}

/// Möller-Trumbore test. Returns the ray parameter of the hit in units of
/// `direction`. Single sided tests only accept triangles whose
/// counter-clockwise side faces the ray.
pub fn intersect_triangle(
    origin: &Point3<f32>,
    direction: &Vector3<f32>,
    triangle: &Triangle,
    double_sided: bool,
) -> Option<f32> {
    let [a, b, c] = triangle.vertices.map(|v| v.position);
    let edge1 = b - a;
    let edge2 = c - a;

    let p = direction.cross(&edge2);
    // Positive when the ray meets the front face
    let det = edge1.dot(&p);
    if det.abs() < PARALLEL_EPSILON || (!double_sided && det < 0.0) {
        return None;
    }
    let inv_det = 1.0 / det;

    let s = origin - a;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = direction.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(&q) * inv_det;
    (t >= 0.0).then_some(t)
}
