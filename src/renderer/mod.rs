pub mod buffers;
pub mod camera;
pub mod capture;
pub mod gpu;
pub mod lines;

pub use camera::Camera;
pub use capture::PendingCapture;
pub use gpu::GpuState;
pub use lines::LineMaterial;
