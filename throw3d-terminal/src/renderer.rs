/// ASCII rasterizer for terminal rendering
use crossterm::{
    style::{Color, Print, ResetColor, SetForegroundColor},
    QueueableCommand,
};
use nalgebra::{Matrix4, Point3, Vector3};
use std::io::Write;
use throw3d_core::{Camera, NodeKind, Triangle, Viewer};

/// Character luminosity ramp for depth/shading (darkest to lightest)
const LUMINOSITY_RAMP: &[char] = &['.', ':', '-', '=', '+', '*', '#', '%', '@'];

const GRID_CHAR: char = '·';

/// Per-frame lighting shared by every triangle
struct Lighting {
    direction: Vector3<f32>,
    ambient: f32,
}

/// ASCII renderer that converts scenes to terminal characters
pub struct AsciiRenderer {
    width: usize,
    height: usize,
    depth_buffer: Vec<f32>,
    char_buffer: Vec<char>,
    color_buffer: Vec<Color>,
}

impl AsciiRenderer {
    pub fn new(width: usize, height: usize) -> Self {
        let size = width * height;
        Self {
            width,
            height,
            depth_buffer: vec![f32::INFINITY; size],
            char_buffer: vec![' '; size],
            color_buffer: vec![Color::Reset; size],
        }
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        *self = Self::new(width, height);
    }

    pub fn clear(&mut self) {
        self.depth_buffer.fill(f32::INFINITY);
        self.char_buffer.fill(' ');
        self.color_buffer.fill(Color::Reset);
    }

    /// Draw every object in the viewer's scene
    pub fn render_viewer(&mut self, viewer: &Viewer) {
        let light = viewer.config.light_position();
        let lighting = Lighting {
            direction: light
                .coords
                .try_normalize(f32::EPSILON)
                .unwrap_or_else(Vector3::y),
            ambient: viewer.config.ambient_intensity.clamp(0.0, 1.0),
        };

        for (_, kind, node) in viewer.scene.iter() {
            node.traverse_meshes(&Matrix4::identity(), &mut |_, mesh, world| {
                for triangle in &mesh.triangles {
                    self.render_triangle(triangle, world, &viewer.camera, &lighting, kind);
                }
            });
        }
    }

    /// Dots where the ground grid lines cross, on the y = 0 plane
    pub fn render_grid(&mut self, camera: &Camera, size: f32, divisions: u32) {
        if divisions == 0 {
            return;
        }
        let half = size / 2.0;
        let step = size / divisions as f32;
        let identity = Matrix4::identity();
        let (width, height) = (self.width as u32, self.height as u32);

        for i in 0..=divisions {
            for j in 0..=divisions {
                let point = Point3::new(-half + i as f32 * step, 0.0, -half + j as f32 * step);
                let projected = camera.project_to_screen(&point, &identity, width, height);
                if let Some((x, y, depth)) = projected {
                    self.plot(x as i32, y as i32, depth, GRID_CHAR, Color::DarkGrey);
                }
            }
        }
    }

    fn render_triangle(
        &mut self,
        triangle: &Triangle,
        world: &Matrix4<f32>,
        camera: &Camera,
        lighting: &Lighting,
        kind: NodeKind,
    ) {
        // Project vertices to screen space
        let mut screen_coords = [(0.0, 0.0, 0.0); 3];
        for (slot, vertex) in screen_coords.iter_mut().zip(&triangle.vertices) {
            match camera.project_to_screen(
                &vertex.position,
                world,
                self.width as u32,
                self.height as u32,
            ) {
                Some(coords) => *slot = coords,
                None => return, // Triangle is clipped
            }
        }

        // Face normal in world space for shading
        let normal = world
            .transform_vector(&triangle.calculate_normal())
            .try_normalize(f32::EPSILON)
            .unwrap_or_else(Vector3::zeros);
        let diffuse = normal.dot(&lighting.direction).max(0.0);
        let brightness = lighting.ambient + (1.0 - lighting.ambient) * diffuse;

        // Map brightness to character
        let char_index = (brightness * (LUMINOSITY_RAMP.len() - 1) as f32) as usize;
        let character = LUMINOSITY_RAMP[char_index.min(LUMINOSITY_RAMP.len() - 1)];
        let color = match kind {
            NodeKind::Projectile => Color::Yellow,
            NodeKind::Model => shade_color(character),
        };

        self.rasterize_triangle(&screen_coords, character, color);
    }

    fn rasterize_triangle(&mut self, coords: &[(f32, f32, f32); 3], character: char, color: Color) {
        let [v0, v1, v2] = *coords;

        // Bounding box, clipped to screen bounds
        let min_x = (v0.0.min(v1.0).min(v2.0).floor() as i32).max(0);
        let max_x = (v0.0.max(v1.0).max(v2.0).ceil() as i32).min(self.width as i32 - 1);
        let min_y = (v0.1.min(v1.1).min(v2.1).floor() as i32).max(0);
        let max_y = (v0.1.max(v1.1).max(v2.1).ceil() as i32).min(self.height as i32 - 1);

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;

                if let Some((w0, w1, w2)) =
                    barycentric((v0.0, v0.1), (v1.0, v1.1), (v2.0, v2.1), (px, py))
                {
                    if w0 >= 0.0 && w1 >= 0.0 && w2 >= 0.0 {
                        let depth = w0 * v0.2 + w1 * v1.2 + w2 * v2.2;
                        self.plot(x, y, depth, character, color);
                    }
                }
            }
        }
    }

    /// Depth-tested write of one cell
    fn plot(&mut self, x: i32, y: i32, depth: f32, character: char, color: Color) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        if depth < self.depth_buffer[idx] {
            self.depth_buffer[idx] = depth;
            self.char_buffer[idx] = character;
            self.color_buffer[idx] = color;
        }
    }

    pub fn char_at(&self, x: usize, y: usize) -> Option<char> {
        (x < self.width && y < self.height).then(|| self.char_buffer[y * self.width + x])
    }

    pub fn draw<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for y in 0..self.height {
            for x in 0..self.width {
                let idx = y * self.width + x;
                writer.queue(SetForegroundColor(self.color_buffer[idx]))?;
                writer.queue(Print(self.char_buffer[idx]))?;
            }
            if y + 1 < self.height {
                writer.queue(Print("\r\n"))?;
            }
        }
        writer.queue(ResetColor)?;
        Ok(())
    }
}

/// Color based on character intensity
fn shade_color(c: char) -> Color {
    match c {
        '.' | ':' => Color::DarkGrey,
        '-' | '=' => Color::Grey,
        '+' | '*' => Color::White,
        '#' | '%' | '@' => Color::Cyan,
        _ => Color::White,
    }
}

/// Calculate barycentric coordinates for a point in a triangle
fn barycentric(
    v0: (f32, f32),
    v1: (f32, f32),
    v2: (f32, f32),
    p: (f32, f32),
) -> Option<(f32, f32, f32)> {
    let denom = (v1.1 - v2.1) * (v0.0 - v2.0) + (v2.0 - v1.0) * (v0.1 - v2.1);

    if denom.abs() < 1e-6 {
        return None;
    }

    let w0 = ((v1.1 - v2.1) * (p.0 - v2.0) + (v2.0 - v1.0) * (p.1 - v2.1)) / denom;
    let w1 = ((v2.1 - v0.1) * (p.0 - v2.0) + (v0.0 - v2.0) * (p.1 - v2.1)) / denom;
    let w2 = 1.0 - w0 - w1;

    Some((w0, w1, w2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use throw3d_core::{Mesh, SceneNode, ViewerConfig};

    fn viewer_with_cube() -> Viewer {
        let mut viewer = Viewer::new(ViewerConfig::default(), 80, 48);
        viewer.scene.add_model(SceneNode::with_mesh("cube", Mesh::cube(4.0)));
        viewer
    }

    #[test]
    fn test_cube_covers_screen_centre() {
        let viewer = viewer_with_cube();
        let mut renderer = AsciiRenderer::new(80, 24);
        renderer.render_viewer(&viewer);
        let centre = renderer.char_at(40, 12).unwrap();
        assert_ne!(centre, ' ');
        assert_eq!(renderer.char_at(0, 0), Some(' '));
    }

    #[test]
    fn test_clear_resets_buffers() {
        let viewer = viewer_with_cube();
        let mut renderer = AsciiRenderer::new(80, 24);
        renderer.render_viewer(&viewer);
        renderer.clear();
        assert_eq!(renderer.char_at(40, 12), Some(' '));
    }

    #[test]
    fn test_grid_behind_cube() {
        let viewer = viewer_with_cube();
        let mut renderer = AsciiRenderer::new(80, 24);
        renderer.render_viewer(&viewer);
        let before = renderer.char_at(40, 12);
        // The grid point at the origin lies inside the cube and must not show
        renderer.render_grid(&viewer.camera, 50.0, 10);
        assert_eq!(renderer.char_at(40, 12), before);
    }

    #[test]
    fn test_barycentric_degenerate() {
        assert!(barycentric((0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.5, 0.5)).is_none());
        let (w0, w1, w2) = barycentric((0.0, 0.0), (4.0, 0.0), (0.0, 4.0), (1.0, 1.0)).unwrap();
        assert!((w0 + w1 + w2 - 1.0).abs() < 1e-6);
    }
}
