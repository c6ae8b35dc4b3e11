//! Flattening of imported scenes and edge extraction for line-art rendering.

pub mod conditional;
pub mod edges;
pub mod flatten;
pub mod weld;

pub use conditional::{ConditionalSegment, extract_conditional_edges};
pub use edges::{DEFAULT_THRESHOLD_DEG, LineSegment, MAX_THRESHOLD_DEG, extract_hard_edges};
pub use flatten::{FlatMesh, FlattenedModel, bake_mesh, flatten_scene};
pub use weld::{WELD_EPSILON, WeldedMesh};
