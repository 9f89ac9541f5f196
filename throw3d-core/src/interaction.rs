//! Right-click handling: spawn a ball where the user clicked.

use crate::config::SphereConfig;
use crate::geometry::Mesh;
use crate::projection::Camera;
use crate::scene::{NodeId, Scene, SceneNode};

/// Pixel size of the element receiving pointer events
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub client_width: f32,
    pub client_height: f32,
}

impl Viewport {
    pub fn new(client_width: f32, client_height: f32) -> Self {
        Self {
            client_width,
            client_height,
        }
    }

    /// Offset of a client position from the centre, as a fraction of the
    /// viewport. Positive x is left of centre, positive y above it.
    pub fn relative(&self, client_x: f32, client_y: f32) -> (f32, f32) {
        (
            (self.client_width / 2.0 - client_x) / self.client_width,
            (self.client_height / 2.0 - client_y) / self.client_height,
        )
    }
}

/// Everything a context-menu click needs, borrowed for the duration of one
/// event. `callback` receives the scene and the freshly placed ball.
pub struct ContextMenuHandler<'a, F>
where
    F: FnMut(&Scene, NodeId),
{
    pub container: Option<Viewport>,
    pub scene: &'a mut Scene,
    pub camera: &'a Camera,
    pub sphere: &'a SphereConfig,
    pub callback: F,
}

impl<F> ContextMenuHandler<'_, F>
where
    F: FnMut(&Scene, NodeId),
{
    /// Spawn a ball for a click at a client position. Nothing happens when
    /// there is no container to measure the click against.
    pub fn on_context_menu(&mut self, client_x: f32, client_y: f32) -> Option<NodeId> {
        let container = self.container?;
        if container.client_width <= 0.0 || container.client_height <= 0.0 {
            return None;
        }
        let (relative_x, relative_y) = container.relative(client_x, client_y);

        let mut ball = SceneNode::with_mesh(
            "ball",
            Mesh::sphere(
                self.sphere.radius,
                self.sphere.width_segments,
                self.sphere.height_segments,
            ),
        );
        ball.set_position(&self.camera.launch_point(relative_x, relative_y));
        let id = self.scene.add_projectile(ball);

        (self.callback)(&*self.scene, id);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::NodeKind;
    use approx::assert_relative_eq;

    fn small_sphere() -> SphereConfig {
        SphereConfig {
            radius: 0.5,
            width_segments: 8,
            height_segments: 4,
        }
    }

    #[test]
    fn test_relative_offsets() {
        let viewport = Viewport::new(800.0, 600.0);
        assert_eq!(viewport.relative(400.0, 300.0), (0.0, 0.0));
        assert_eq!(viewport.relative(0.0, 0.0), (0.5, 0.5));
        assert_eq!(viewport.relative(800.0, 600.0), (-0.5, -0.5));
    }

    #[test]
    fn test_click_spawns_ball_and_calls_back() {
        let mut scene = Scene::new();
        let camera = Camera::new(800, 600);
        let sphere = small_sphere();
        let mut seen = Vec::new();

        let id = {
            let mut handler = ContextMenuHandler {
                container: Some(Viewport::new(800.0, 600.0)),
                scene: &mut scene,
                camera: &camera,
                sphere: &sphere,
                callback: |scene: &Scene, id: NodeId| seen.push((id, scene.len())),
            };
            handler.on_context_menu(400.0, 300.0)
        }
        .unwrap();

        assert_eq!(seen, vec![(id, 1)]);
        assert_eq!(scene.kind(id), Some(NodeKind::Projectile));
        let ball = scene.node(id).unwrap();
        assert_relative_eq!(ball.position(), camera.launch_point(0.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_no_container_does_nothing() {
        let mut scene = Scene::new();
        let camera = Camera::new(800, 600);
        let sphere = small_sphere();
        let mut calls = 0;

        let mut handler = ContextMenuHandler {
            container: None,
            scene: &mut scene,
            camera: &camera,
            sphere: &sphere,
            callback: |_: &Scene, _: NodeId| calls += 1,
        };
        assert!(handler.on_context_menu(10.0, 10.0).is_none());
        drop(handler);

        assert_eq!(calls, 0);
        assert!(scene.is_empty());
    }
}
