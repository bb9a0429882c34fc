//! Interactive 3D showcase scene.
//!
//! An animated character, a prop that follows the pointer and a ball that
//! rolls towards the camera when clicked. The scene logic (asset loading,
//! picking, per-frame motion) is plain data and can be driven headless; the
//! [`render`] and [`app`] modules put it on screen with wgpu and winit.

pub mod animation;
pub mod app;
pub mod assets;
pub mod camera;
pub mod frame;
pub mod gltf_loader;
pub mod input;
pub mod interaction;
pub mod model;
pub mod raycast;
pub mod render;
pub mod scene;
pub mod state;
pub mod viewport;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use animation::{AnimationClip, AnimationMixer};
pub use assets::{
    requests_for, AssetError, AssetKind, AssetLoader, AssetRequest, ImageData, LoadOutcome,
    LoadedAsset, PendingAssets,
};
pub use camera::Camera;
pub use frame::{FrameClock, LoopHandle};
pub use input::{ButtonState, MouseButton, PointerEvent, PointerTracker};
pub use interaction::{BallMotion, CharacterMotion, ClickOutcome, InteractionMode, PointerMode};
pub use model::{MeshData, ModelAsset, ModelInstance, SceneNode};
pub use raycast::{Plane, Ray};
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::SceneDescription;
pub use state::SceneState;
pub use viewport::{StaticViewport, ViewportProvider, WindowViewport};
