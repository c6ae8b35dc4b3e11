//! Command-line configuration and logging setup.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::geometry::DEFAULT_THRESHOLD_DEG;
use crate::import::ModelType;
use crate::viewer::{LineColor, StyleEdit, StyleParams};

pub const DEFAULT_SNAPSHOT: &str = "sample.png";

#[derive(Parser, Debug, Clone)]
#[command(name = "lineart")]
#[command(author, version, about = "Draws 3D models as crease and silhouette line-art", long_about = None)]
pub struct ViewerArgs {
    /// Model to open at startup (file or folder); the demo scene otherwise
    #[arg(long, short)]
    pub model: Option<PathBuf>,

    /// Format expected among opened or dropped files
    #[arg(long, value_enum, default_value_t = ModelType::Gltf)]
    pub model_type: ModelType,

    /// Crease angle in degrees above which an edge is drawn (0-120)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_DEG)]
    pub threshold: f32,

    /// Line width in pixels (0-5)
    #[arg(long, default_value_t = 1.0)]
    pub thickness: f32,

    /// Line color as hex, e.g. "#000000"
    #[arg(long, default_value = "#000000")]
    pub line_color: LineColor,

    /// Vertical field of view in degrees
    #[arg(long, default_value_t = 40.0)]
    pub fov: f32,

    /// Start with the shaded model instead of line-art
    #[arg(long)]
    pub textured: bool,

    /// Where the download button writes the PNG snapshot
    #[arg(long, default_value = DEFAULT_SNAPSHOT)]
    pub snapshot: PathBuf,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(long, short)]
    pub quiet: bool,
}

impl ViewerArgs {
    pub fn initial_style(&self) -> StyleParams {
        let mut style = StyleParams::default();
        style.apply(StyleEdit {
            line_color: self.line_color,
            threshold: self.threshold,
            thickness: self.thickness,
            fov: self.fov,
            use_shader: !self.textured,
            model_type: self.model_type,
        });
        style
    }
}

/// `RUST_LOG` wins; otherwise the `-v` count picks the level.
pub fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn,lineart=info",
            1 => "info,wgpu_core=warn,wgpu_hal=warn",
            2 => "lineart=debug,info,wgpu_core=warn,wgpu_hal=warn",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_seed_the_default_style() {
        let args = ViewerArgs::parse_from(["lineart"]);
        assert_eq!(args.initial_style(), StyleParams::default());
        assert_eq!(args.snapshot, PathBuf::from(DEFAULT_SNAPSHOT));
    }

    #[test]
    fn flags_override_style() {
        let args = ViewerArgs::parse_from([
            "lineart",
            "--model-type",
            "obj",
            "--threshold",
            "15",
            "--line-color",
            "#ff0000",
            "--textured",
            "-vv",
        ]);
        let style = args.initial_style();
        assert_eq!(style.model_type(), ModelType::Obj);
        assert_eq!(style.threshold(), 15.0);
        assert_eq!(style.line_color(), LineColor([255, 0, 0]));
        assert!(!style.use_shader());
        assert_eq!(args.verbose, 2);
    }
}
