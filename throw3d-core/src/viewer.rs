//! Front-end independent viewer state: the scene, its camera and the balls
//! in flight.

use tracing::{debug, warn};

use crate::animation::{position_track, AnimationMixer};
use crate::config::ViewerConfig;
use crate::error::LoadError;
use crate::interaction::{ContextMenuHandler, Viewport};
use crate::loader::LoaderRegistry;
use crate::projection::Camera;
use crate::scene::{NodeId, Scene};

pub struct Viewer {
    pub config: ViewerConfig,
    pub scene: Scene,
    pub camera: Camera,
    pub mixer: AnimationMixer,
    loaders: LoaderRegistry,
}

impl Viewer {
    pub fn new(config: ViewerConfig, width: u32, height: u32) -> Self {
        let camera = Camera::from_config(&config.camera, width, height);
        Self {
            config,
            scene: Scene::new(),
            camera,
            mixer: AnimationMixer::new(),
            loaders: LoaderRegistry::new(),
        }
    }

    pub fn with_loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = loaders;
        self
    }

    /// Load a model file into the scene. Returns `Ok(false)` when the file
    /// extension is not a model format.
    pub fn load_model(&mut self, file_name: &str, data: &[u8]) -> Result<bool, LoadError> {
        match self.loaders.load(file_name, data)? {
            Some(node) => {
                self.scene.add_model(node);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Throw a ball for a right-click at a client position. The ball flies
    /// towards the point under the cursor, out to the far plane, and stops
    /// at the first model in its way.
    pub fn throw_from(
        &mut self,
        container: Option<Viewport>,
        client_x: f32,
        client_y: f32,
    ) -> Option<NodeId> {
        let camera = &self.camera;
        let mixer = &mut self.mixer;
        let duration = self.config.animation_duration;
        let aim = container.map(|viewport| {
            let (relative_x, relative_y) = viewport.relative(client_x, client_y);
            camera.position + camera.cursor_direction(relative_x, relative_y) * camera.far
        });

        let mut handler = ContextMenuHandler {
            container,
            scene: &mut self.scene,
            camera,
            sphere: &self.config.sphere,
            callback: |scene: &Scene, ball: NodeId| {
                let (Some(start), Some(end)) = (scene.node(ball).map(|node| node.position()), aim)
                else {
                    return;
                };
                match position_track(&start, &end, duration, &scene.obstacles()) {
                    Ok(track) => {
                        debug!(?ball, keys = track.len(), "ball thrown");
                        mixer.play(ball, track);
                    }
                    Err(e) => warn!(?ball, "cannot throw ball: {e}"),
                }
            },
        };
        handler.on_context_menu(client_x, client_y)
    }

    /// Advance running animations; returns balls that came to rest
    pub fn update(&mut self, delta: f32) -> Vec<NodeId> {
        self.mixer.update(delta, &mut self.scene)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
    }
}
