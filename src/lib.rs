//! Line-art model viewer: imports a mesh, extracts its crease and
//! silhouette edges, and draws them as constant-width screen-space lines.

pub mod config;
pub mod error;
pub mod geometry;
pub mod import;
pub mod renderer;
pub mod scene;
pub mod ui;
pub mod viewer;

pub use error::{CaptureError, GpuError, LoadError, PackageError};
