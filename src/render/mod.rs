mod common;
mod gpu;
mod shaders;

pub use common::{draw_list, CameraParams, DrawItem, LightParams};
pub use gpu::Renderer;
