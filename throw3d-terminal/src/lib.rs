/// Terminal front-end: ASCII rendering of the scene with mouse throwing
use crossterm::{
    cursor,
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, MouseButton,
        MouseEvent, MouseEventKind,
    },
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal,
};
use std::io::{self, stdout, Write};
use std::time::{Duration, Instant};
use throw3d_core::{OrbitState, Viewer, Viewport};
use tracing::{debug, info};

pub mod renderer;

pub use renderer::AsciiRenderer;

/// Terminal cells are roughly twice as tall as they are wide
const CELL_ASPECT: u32 = 2;

const ORBIT_STEP: f32 = 0.1;
const ZOOM_STEP: f32 = 1.1;

const HELP: &str = "WASD/Arrows=Orbit +/-=Zoom RightClick=Throw Q=Quit";

/// Main application struct for terminal 3D rendering
pub struct TerminalApp {
    viewer: Viewer,
    orbit: OrbitState,
    renderer: AsciiRenderer,
    columns: u16,
    rows: u16,
    running: bool,
    last_frame: Instant,
    frame_count: u32,
    fps: f32,
}

impl TerminalApp {
    pub fn new(mut viewer: Viewer) -> io::Result<Self> {
        let (columns, rows) = terminal::size()?;
        viewer.resize(columns as u32, rows as u32 * CELL_ASPECT);
        let orbit = OrbitState::from_eye(&viewer.camera.position, &viewer.camera.target);

        Ok(Self {
            viewer,
            orbit,
            renderer: AsciiRenderer::new(columns as usize, rows as usize),
            columns,
            rows,
            running: true,
            last_frame: Instant::now(),
            frame_count: 0,
            fps: 0.0,
        })
    }

    pub fn run(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        execute!(
            stdout(),
            terminal::EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide
        )?;

        let result = self.main_loop();

        // Cleanup
        execute!(
            stdout(),
            DisableMouseCapture,
            terminal::LeaveAlternateScreen,
            cursor::Show
        )?;
        terminal::disable_raw_mode()?;

        result
    }

    fn main_loop(&mut self) -> io::Result<()> {
        let target_frame_time = Duration::from_millis(1000 / 30); // 30 FPS target
        let mut previous = Instant::now();

        while self.running {
            let frame_start = Instant::now();

            // Handle input
            while event::poll(Duration::from_millis(0))? {
                let event = event::read()?;
                self.handle_event(event);
            }

            // Update
            let delta = (frame_start - previous).as_secs_f32();
            previous = frame_start;
            self.update(delta);

            // Render
            self.render()?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            // Update FPS counter
            let now = Instant::now();
            if (now - self.last_frame).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_frame).as_secs_f32();
                self.frame_count = 0;
                self.last_frame = now;
            }
        }

        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(KeyEvent { code, .. }) => self.handle_key(code),
            Event::Mouse(MouseEvent {
                kind: MouseEventKind::Down(MouseButton::Right),
                column,
                row,
                ..
            }) => self.throw_at(column, row),
            Event::Resize(columns, rows) => self.resize(columns, rows),
            _ => {}
        }
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.running = false;
            }
            KeyCode::Char('w') | KeyCode::Up => self.orbit.rotate(0.0, ORBIT_STEP),
            KeyCode::Char('s') | KeyCode::Down => self.orbit.rotate(0.0, -ORBIT_STEP),
            KeyCode::Char('a') | KeyCode::Left => self.orbit.rotate(-ORBIT_STEP, 0.0),
            KeyCode::Char('d') | KeyCode::Right => self.orbit.rotate(ORBIT_STEP, 0.0),
            KeyCode::Char('+') | KeyCode::Char('=') => self.orbit.zoom(1.0 / ZOOM_STEP),
            KeyCode::Char('-') => self.orbit.zoom(ZOOM_STEP),
            _ => {}
        }
    }

    /// Right-click on a cell; the click lands in the cell centre
    fn throw_at(&mut self, column: u16, row: u16) {
        let viewport = Viewport::new(
            self.columns as f32,
            (self.rows as u32 * CELL_ASPECT) as f32,
        );
        let x = column as f32 + 0.5;
        let y = (row as f32 + 0.5) * CELL_ASPECT as f32;
        if let Some(ball) = self.viewer.throw_from(Some(viewport), x, y) {
            debug!(?ball, column, row, "right-click throw");
        }
    }

    fn resize(&mut self, columns: u16, rows: u16) {
        self.columns = columns;
        self.rows = rows;
        self.renderer.resize(columns as usize, rows as usize);
        self.viewer.resize(columns as u32, rows as u32 * CELL_ASPECT);
    }

    fn update(&mut self, delta: f32) {
        let camera = &mut self.viewer.camera;
        camera.position = self.orbit.eye(&camera.target);

        for ball in self.viewer.update(delta) {
            info!(?ball, "ball came to rest");
        }
    }

    fn render(&mut self) -> io::Result<()> {
        // Clear renderer
        self.renderer.clear();

        // Render grid and scene
        let config = &self.viewer.config;
        self.renderer
            .render_grid(&self.viewer.camera, config.grid_size, config.grid_divisions);
        self.renderer.render_viewer(&self.viewer);

        // Output to terminal
        let mut stdout = stdout();
        queue!(stdout, cursor::MoveTo(0, 0))?;

        self.renderer.draw(&mut stdout)?;

        // Draw UI overlay
        let balls = self.viewer.scene.projectiles().count();
        queue!(
            stdout,
            cursor::MoveTo(0, 0),
            SetForegroundColor(Color::Yellow),
            Print(format!(
                "throw3d | FPS: {:.1} | Balls: {} | {HELP}",
                self.fps, balls
            )),
            ResetColor
        )?;

        stdout.flush()?;
        Ok(())
    }
}
