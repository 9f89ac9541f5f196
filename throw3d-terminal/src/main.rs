//! throw3d terminal viewer
//!
//! Loads a model file (OBJ, glTF/GLB, STL, FBX, COLLADA) into an ASCII
//! scene and throws balls at it with a right-click.
//! Controls:
//!   - WASD / Arrow Keys: Orbit the camera
//!   - +/-: Zoom
//!   - Right click: Throw a ball
//!   - Q/ESC: Quit

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use throw3d_core::{Mesh, SceneNode, Viewer, ViewerConfig};
use throw3d_terminal::TerminalApp;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Edge length of the stand-in cube when no model is loaded
const FALLBACK_CUBE_SIZE: f32 = 4.0;

/// Terminal 3D viewer that throws balls at models
#[derive(Parser)]
#[command(name = "throw3d-terminal")]
#[command(about = "ASCII 3D viewer: right-click to throw balls at a model")]
#[command(version)]
struct Cli {
    /// Model file to load (.obj, .gltf, .glb, .stl, .fbx, .dae)
    model: Option<PathBuf>,

    /// TOML file overriding the viewer defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(cli: &Cli) -> Result<()> {
    match &cli.log_file {
        Some(path) => {
            let filter = if cli.verbose {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("info")
            };
            let file = File::create(path)
                .with_context(|| format!("cannot create log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            // stderr shares the terminal with the renderer, keep it quiet
            let filter = if cli.verbose {
                EnvFilter::new("info")
            } else {
                EnvFilter::new("warn")
            };
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn load_model(viewer: &mut Viewer, path: &Path) -> Result<bool> {
    let data =
        std::fs::read(path).with_context(|| format!("cannot read model {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    viewer
        .load_model(file_name, &data)
        .with_context(|| format!("cannot load model {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let config = match &cli.config {
        Some(path) => ViewerConfig::load(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => ViewerConfig::default(),
    };

    let mut viewer = Viewer::new(config, 80, 48);

    let loaded = match &cli.model {
        Some(path) => load_model(&mut viewer, path)?,
        None => false,
    };
    if !loaded {
        if let Some(path) = &cli.model {
            warn!("{} is not a model file, showing a cube", path.display());
        }
        viewer.scene.add_model(SceneNode::with_mesh(
            "cube",
            Mesh::cube(FALLBACK_CUBE_SIZE),
        ));
    }
    info!(objects = viewer.scene.len(), "scene ready");

    let mut app = TerminalApp::new(viewer)?;
    app.run()?;

    Ok(())
}
