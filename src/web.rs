#![cfg(target_arch = "wasm32")]

use std::sync::Arc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use winit::dpi::LogicalSize;
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::web::{EventLoopExtWebSys, WindowAttributesExtWebSys};
use winit::window::Window;

use crate::app::{final_state_lines, ShowcaseApp};
use crate::assets::{requests_for, AssetLoader};
use crate::frame::LoopHandle;
use crate::render::Renderer;
use crate::scene::SceneDescription;
use crate::state::SceneState;
use crate::viewport::WindowViewport;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Returned by [`run`]; lets the page stop the frame loop.
#[wasm_bindgen]
pub struct SceneHandle {
    handle: LoopHandle,
}

#[wasm_bindgen]
impl SceneHandle {
    pub fn stop(&self) {
        self.handle.cancel();
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        !self.handle.is_cancelled()
    }
}

/// Starts the showcase on the canvas with id `canvas_id`, fetching assets
/// relative to `asset_root`.
#[wasm_bindgen]
pub async fn run(canvas_id: String, asset_root: String) -> Result<SceneHandle, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("missing window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("missing document"))?;
    let canvas: web_sys::HtmlCanvasElement = document
        .get_element_by_id(&canvas_id)
        .ok_or_else(|| JsValue::from_str("canvas element not found"))?
        .dyn_into()
        .map_err(|_| JsValue::from_str("element is not a canvas"))?;

    // Logical size times device pixel ratio, like the page's own layout.
    let ratio = window.device_pixel_ratio();
    let logical = LogicalSize::new(
        f64::from(canvas.client_width().max(1)),
        f64::from(canvas.client_height().max(1)),
    );
    canvas.set_width((logical.width * ratio) as u32);
    canvas.set_height((logical.height * ratio) as u32);

    let event_loop = EventLoop::new()
        .map_err(|err| JsValue::from_str(&format!("failed to create event loop: {err}")))?;
    #[allow(deprecated)]
    let window = Arc::new(
        event_loop
            .create_window(
                Window::default_attributes()
                    .with_canvas(Some(canvas))
                    .with_title("Showcase Scene")
                    .with_inner_size(logical),
            )
            .map_err(|err| JsValue::from_str(&format!("window error: {err}")))?,
    );

    let renderer = Renderer::new(Arc::clone(&window))
        .await
        .map_err(|err| JsValue::from_str(&format!("renderer error: {err}")))?;

    let size = window.inner_size();
    let viewport = Arc::new(WindowViewport::new(size.width, size.height));
    let description = SceneDescription::default();
    let pending = AssetLoader::spawn(requests_for(&description, &asset_root));
    let state = SceneState::new(description, viewport.clone());
    let handle = LoopHandle::new();
    let mut app = ShowcaseApp::new(renderer, state, viewport, pending, handle.clone());

    log::info!("showcase started on #{canvas_id}, assets from {asset_root:?}");

    #[allow(deprecated)]
    event_loop.spawn(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        let exiting = matches!(event, winit::event::Event::LoopExiting);
        if let Err(err) = app.process_event(&event, elwt) {
            log::error!("frame loop stopped: {err:?}");
            elwt.exit();
        }
        if exiting {
            for line in final_state_lines(app.state()) {
                log::info!("{line}");
            }
        }
    });

    Ok(SceneHandle { handle })
}
