/// throw3d Web - WASM bindings around the core viewer
///
/// The page owns rendering; this module keeps the scene, answers context-menu
/// clicks by throwing balls, and reports where the balls are each frame.
use nalgebra::Point3;
use throw3d_core::{NodeId, Scene, Viewer, ViewerConfig, Viewport};
use wasm_bindgen::prelude::*;
use web_sys::{HtmlElement, MouseEvent};

#[wasm_bindgen]
pub struct WebViewer {
    viewer: Viewer,
}

#[wasm_bindgen]
impl WebViewer {
    #[wasm_bindgen(constructor)]
    pub fn new(width: u32, height: u32) -> WebViewer {
        WebViewer {
            viewer: Viewer::new(ViewerConfig::default(), width, height),
        }
    }

    /// Viewer configured from TOML text, same keys as the terminal's
    /// `--config` file
    #[wasm_bindgen(js_name = "withConfig")]
    pub fn with_config(toml: &str, width: u32, height: u32) -> Result<WebViewer, JsValue> {
        let config =
            ViewerConfig::from_toml(toml).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(WebViewer {
            viewer: Viewer::new(config, width, height),
        })
    }

    /// Move the camera; the page should call this whenever its own camera
    /// moves so throws start from the right place
    #[wasm_bindgen(js_name = "setCamera")]
    pub fn set_camera(
        &mut self,
        x: f32,
        y: f32,
        z: f32,
        target_x: f32,
        target_y: f32,
        target_z: f32,
    ) {
        let camera = &mut self.viewer.camera;
        camera.position = Point3::new(x, y, z);
        camera.target = Point3::new(target_x, target_y, target_z);
    }

    /// `[x, y, z, target_x, target_y, target_z]`
    #[wasm_bindgen(js_name = "cameraPose")]
    pub fn camera_pose(&self) -> Vec<f32> {
        let camera = &self.viewer.camera;
        vec![
            camera.position.x,
            camera.position.y,
            camera.position.z,
            camera.target.x,
            camera.target.y,
            camera.target.z,
        ]
    }

    /// Load a dropped or fetched model file. Resolves to `false` when the
    /// extension is not a model format.
    #[wasm_bindgen(js_name = "loadModel")]
    pub fn load_model(&mut self, file_name: &str, bytes: &[u8]) -> Result<bool, JsValue> {
        match self.viewer.load_model(file_name, bytes) {
            Ok(true) => {
                web_sys::console::log_1(&format!("Model loaded: {}", file_name).into());
                Ok(true)
            }
            Ok(false) => {
                web_sys::console::log_1(
                    &format!("Not supported file extension: {}", file_name).into(),
                );
                Ok(false)
            }
            Err(e) => {
                web_sys::console::error_1(&format!("Failed to load {}: {}", file_name, e).into());
                Err(JsValue::from_str(&e.to_string()))
            }
        }
    }

    /// Right-click handler. Returns the number of balls in the scene.
    #[wasm_bindgen(js_name = "onContextMenu")]
    pub fn on_context_menu(&mut self, event: &MouseEvent, container: Option<HtmlElement>) -> usize {
        event.prevent_default();
        let viewport = container.map(|element| {
            Viewport::new(element.client_width() as f32, element.client_height() as f32)
        });
        self.throw_at(viewport, event.client_x() as f32, event.client_y() as f32);
        self.viewer.scene.projectiles().count()
    }

    /// Advance ball animations by `dt` seconds. Returns how many balls
    /// came to rest during this step.
    pub fn update(&mut self, dt: f32) -> usize {
        self.viewer.update(dt).len()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewer.resize(width, height);
    }

    /// Flat `[x, y, z, x, y, z, ...]` ball positions in spawn order
    #[wasm_bindgen(js_name = "projectilePositions")]
    pub fn projectile_positions(&self) -> Vec<f32> {
        projectile_positions(&self.viewer.scene)
    }
}

impl WebViewer {
    fn throw_at(&mut self, viewport: Option<Viewport>, x: f32, y: f32) -> Option<NodeId> {
        self.viewer.throw_from(viewport, x, y)
    }
}

fn projectile_positions(scene: &Scene) -> Vec<f32> {
    scene
        .projectiles()
        .flat_map(|(_, node)| {
            let position = node.position();
            [position.x, position.y, position.z]
        })
        .collect()
}

#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}
