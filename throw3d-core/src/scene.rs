//! Scene graph: top-level objects, each a hierarchy of transformed meshes.

use nalgebra::{Matrix4, Point3};

use crate::geometry::{Aabb, Mesh};
use crate::transform::Transform;

/// Handle to a top-level object in a [`Scene`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// What a top-level object is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Loaded model content; thrown objects collide with it
    Model,
    /// A thrown ball
    Projectile,
}

/// A transformed, optionally meshed node with children
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Local transform relative to the parent
    pub transform: Matrix4<f32>,
    pub mesh: Option<Mesh>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    /// Empty group node
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Matrix4::identity(),
            mesh: None,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            mesh: Some(mesh),
            ..Self::group(name)
        }
    }

    pub fn with_transform(mut self, transform: Matrix4<f32>) -> Self {
        self.transform = transform;
        self
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    pub fn position(&self) -> Point3<f32> {
        Transform::translation_of(&self.transform)
    }

    pub fn set_position(&mut self, position: &Point3<f32>) {
        Transform::set_translation(&mut self.transform, position);
    }

    /// Visit every meshed node in this hierarchy with its world transform
    pub fn traverse_meshes<'a, F>(&'a self, parent: &Matrix4<f32>, visit: &mut F)
    where
        F: FnMut(&'a SceneNode, &'a Mesh, &Matrix4<f32>),
    {
        let world = parent * self.transform;
        if let Some(mesh) = &self.mesh {
            visit(self, mesh, &world);
        }
        for child in &self.children {
            child.traverse_meshes(&world, visit);
        }
    }

    pub fn triangle_count(&self) -> usize {
        let mut count = 0;
        self.traverse_meshes(&Matrix4::identity(), &mut |_, mesh, _| {
            count += mesh.triangles.len();
        });
        count
    }

    /// World-space bounds of every mesh in the hierarchy
    pub fn bounds(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        self.traverse_meshes(&Matrix4::identity(), &mut |_, mesh, world| {
            for vertex in mesh.triangles.iter().flat_map(|t| t.vertices.iter()) {
                aabb.expand(&world.transform_point(&vertex.position));
            }
        });
        aabb
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SceneEntry {
    kind: NodeKind,
    node: SceneNode,
}

/// Ordered collection of top-level objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    entries: Vec<SceneEntry>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: NodeKind, node: SceneNode) -> NodeId {
        self.entries.push(SceneEntry { kind, node });
        NodeId(self.entries.len() - 1)
    }

    pub fn add_model(&mut self, node: SceneNode) -> NodeId {
        self.add(NodeKind::Model, node)
    }

    pub fn add_projectile(&mut self, node: SceneNode) -> NodeId {
        self.add(NodeKind::Projectile, node)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.entries.get(id.0).map(|entry| &entry.node)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.entries.get_mut(id.0).map(|entry| &mut entry.node)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.entries.get(id.0).map(|entry| entry.kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, NodeKind, &SceneNode)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (NodeId(index), entry.kind, &entry.node))
    }

    /// Objects a thrown ball can collide with
    pub fn obstacles(&self) -> Vec<&SceneNode> {
        self.iter()
            .filter(|(_, kind, _)| *kind == NodeKind::Model)
            .map(|(_, _, node)| node)
            .collect()
    }

    pub fn projectiles(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.iter()
            .filter(|(_, kind, _)| *kind == NodeKind::Projectile)
            .map(|(id, _, node)| (id, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obstacles_exclude_projectiles() {
        let mut scene = Scene::new();
        let model = scene.add_model(SceneNode::with_mesh("box", Mesh::cube(1.0)));
        let ball = scene.add_projectile(SceneNode::with_mesh("ball", Mesh::sphere(1.0, 8, 4)));

        assert_eq!(scene.len(), 2);
        assert_eq!(scene.kind(model), Some(NodeKind::Model));
        assert_eq!(scene.kind(ball), Some(NodeKind::Projectile));

        let obstacles = scene.obstacles();
        assert_eq!(obstacles.len(), 1);
        assert_eq!(obstacles[0].name, "box");
        assert_eq!(scene.projectiles().count(), 1);
    }

    #[test]
    fn test_position_roundtrip() {
        let mut node = SceneNode::group("group");
        node.set_position(&Point3::new(1.0, -2.0, 3.0));
        assert_eq!(node.position(), Point3::new(1.0, -2.0, 3.0));
    }

    #[test]
    fn test_hierarchy_bounds_and_counts() {
        let mut root = SceneNode::group("root")
            .with_transform(Transform::translation_matrix(10.0, 0.0, 0.0));
        root.add_child(
            SceneNode::with_mesh("child", Mesh::cube(2.0))
                .with_transform(Transform::scale_matrix(2.0, 2.0, 2.0)),
        );

        assert_eq!(root.triangle_count(), 12);
        let bounds = root.bounds();
        assert_eq!(bounds.min, Point3::new(8.0, -2.0, -2.0));
        assert_eq!(bounds.max, Point3::new(12.0, 2.0, 2.0));
    }
}
