//! Window glue shared by the native binary and the browser entry point.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use glam::Vec2;
use winit::event::{ElementState, Event, MouseButton as WinitMouseButton, WindowEvent};
use winit::event_loop::ActiveEventLoop;

use crate::assets::PendingAssets;
use crate::frame::{FrameClock, LoopHandle};
use crate::input::{ButtonState, MouseButton, PointerTracker};
use crate::interaction::InteractionMode;
use crate::render::Renderer;
use crate::state::SceneState;
use crate::viewport::WindowViewport;

/// A running showcase: scene state, its renderer and the loads still in flight.
pub struct ShowcaseApp {
    renderer: Renderer,
    state: SceneState,
    viewport: Arc<WindowViewport>,
    pending: PendingAssets,
    pointer: PointerTracker,
    clock: FrameClock,
    handle: LoopHandle,
    last_mode: InteractionMode,
}

impl ShowcaseApp {
    pub fn new(
        renderer: Renderer,
        state: SceneState,
        viewport: Arc<WindowViewport>,
        pending: PendingAssets,
        handle: LoopHandle,
    ) -> Self {
        let last_mode = state.mode();
        Self {
            renderer,
            state,
            viewport,
            pending,
            pointer: PointerTracker::new(),
            clock: FrameClock::new(),
            handle,
            last_mode,
        }
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    pub fn process_event(&mut self, event: &Event<()>, elwt: &ActiveEventLoop) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if *window_id == self.renderer.window_id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        self.handle.cancel();
                        elwt.exit();
                    }
                    WindowEvent::Resized(size) => {
                        self.renderer.resize(*size);
                        self.viewport.update(size.width, size.height);
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = self.renderer.window().inner_size();
                        self.renderer.resize(size);
                        self.viewport.update(size.width, size.height);
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        let position = Vec2::new(position.x as f32, position.y as f32);
                        let event = self.pointer.cursor_moved(position);
                        self.state.absorb(&mut self.pending);
                        self.state.handle_pointer(event);
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        let event = self
                            .pointer
                            .button(map_mouse_button(*button), map_button_state(*state));
                        if let Some(event) = event {
                            self.state.absorb(&mut self.pending);
                            self.state.handle_pointer(event);
                        }
                    }
                    WindowEvent::RedrawRequested => self.draw_frame()?,
                    _ => {}
                }
            }
            Event::AboutToWait => {
                if self.handle.is_cancelled() {
                    elwt.exit();
                } else {
                    self.renderer.window().request_redraw();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn draw_frame(&mut self) -> Result<()> {
        self.state.absorb(&mut self.pending);
        let dt = self.clock.delta();
        self.state.advance(dt);

        let mode = self.state.mode();
        if mode != self.last_mode {
            log::debug!("interaction mode: {} -> {mode}", self.last_mode);
            self.last_mode = mode;
        }

        if let Err(err) = self.renderer.render(&self.state) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = self.renderer.window().inner_size();
                    self.renderer.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    return Err(anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    log::warn!("surface timeout; retrying next frame");
                }
                wgpu::SurfaceError::Other => {
                    log::warn!("surface reported an unknown error; retrying next frame");
                }
            }
        }
        Ok(())
    }
}

pub fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    let index = match button {
        WinitMouseButton::Left => 0,
        WinitMouseButton::Right => 1,
        WinitMouseButton::Middle => 2,
        WinitMouseButton::Back => 3,
        WinitMouseButton::Forward => 4,
        WinitMouseButton::Other(value) => value.min(u8::MAX as u16) as u8,
    };
    MouseButton::new(index)
}

pub fn map_button_state(state: ElementState) -> ButtonState {
    match state {
        ElementState::Pressed => ButtonState::Pressed,
        ElementState::Released => ButtonState::Released,
    }
}

/// Human-readable final state: the interaction mode followed by one line per
/// scene subject.
pub fn final_state_lines(state: &SceneState) -> Vec<String> {
    let mut lines = vec![format!("Interaction mode: {}", state.mode())];
    lines.extend(state.node_summaries().iter().map(|summary| format!(" - {summary}")));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneDescription;
    use crate::viewport::StaticViewport;

    #[test]
    fn primary_button_maps_to_left() {
        assert_eq!(map_mouse_button(WinitMouseButton::Left), MouseButton::LEFT);
        assert_eq!(map_mouse_button(WinitMouseButton::Other(900)).index(), u8::MAX);
        assert_eq!(map_button_state(ElementState::Released), ButtonState::Released);
    }

    #[test]
    fn final_state_lists_every_subject() {
        let state = SceneState::new(
            SceneDescription::default(),
            Arc::new(StaticViewport::new(800, 600)),
        );
        let lines = final_state_lines(&state);
        assert_eq!(lines[0], "Interaction mode: idle");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].starts_with(" - ball"));
    }
}
