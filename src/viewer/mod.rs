//! Viewer state shared between the UI, the frame loop and the renderer.

pub mod frame;
pub mod style;
pub mod variants;

pub use frame::{FrameLoop, FrameReport, OrbitRecenter};
pub use style::{LineColor, StyleChange, StyleEdit, StyleParams};
pub use variants::{MaterialId, MaterialRegistry, ModelVariant, ModelVariants, Stage, VariantContent};
