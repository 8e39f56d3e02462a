//! WebGPU rendering module
//!
//! Scenes are tessellated into colored triangles on the CPU and drawn with a
//! single pass-through pipeline.

pub mod pipeline;
pub mod shapes;
pub mod vertex;

pub use pipeline::{SceneRenderer, pixel_to_ndc};
pub use shapes::scene_vertices;
pub use vertex::{Vertex, colors};
