//! Error types for model loading, GLB packaging and frame capture.
//!
//! None of these are fatal to the viewer: a failed load keeps the current
//! model on screen and the message is surfaced in the control panel.

use std::path::PathBuf;
use thiserror::Error;

pub type LoadResult<T> = Result<T, LoadError>;
pub type PackageResult<T> = Result<T, PackageError>;

/// Errors raised while turning a dropped file or path into a scene graph.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No decoder is available for this format.
    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),

    /// Nothing among the dropped items matches the selected model type.
    #[error("could not find any .{extension} file among the dropped items")]
    NoMatchingFile { extension: &'static str },

    #[error("invalid glTF: {0}")]
    InvalidGltf(String),

    #[error("failed to parse OBJ {name}: {details}")]
    Obj { name: String, details: String },

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error("model loader thread is not running")]
    LoaderStopped,
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while packaging a dropped glTF folder into a GLB payload.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("no .gltf file found among the dropped items")]
    MissingGltf,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {name}: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("glTF root is not a JSON object")]
    NotAnObject,

    #[error("a file reader thread panicked")]
    ReaderPanicked,

    #[error("GLB payload exceeds 4 GiB ({0} bytes)")]
    TooLarge(usize),
}

/// Errors raised while saving a snapshot of the current frame.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("surface does not support copying frames back to the CPU")]
    Unsupported,

    #[error("surface format {0:?} cannot be written as PNG")]
    Format(wgpu::TextureFormat),

    #[error("mapping the readback buffer failed: {0}")]
    Map(String),

    #[error("readback buffer does not match a {width}x{height} frame")]
    BufferSize { width: u32, height: u32 },

    #[error("failed to encode PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// Errors raised while bringing up the GPU for a window.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to create a surface for the window: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no GPU adapter can present to this window")]
    NoAdapter,

    #[error("failed to open the GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("the window surface reports no usable texture format")]
    NoSurfaceFormat,
}
