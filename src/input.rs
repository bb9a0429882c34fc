use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Pointer activity in surface pixel coordinates (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Moved(Vec2),
    Clicked(Vec2),
}

/// Turns raw cursor and button notifications into [`PointerEvent`]s.
///
/// A click is a primary-button press followed by its release; it is reported
/// at the cursor position seen at release time.
#[derive(Debug, Default)]
pub struct PointerTracker {
    position: Vec2,
    primary_down: bool,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor_moved(&mut self, position: Vec2) -> PointerEvent {
        self.position = position;
        PointerEvent::Moved(position)
    }

    pub fn button(&mut self, button: MouseButton, state: ButtonState) -> Option<PointerEvent> {
        if button != MouseButton::LEFT {
            return None;
        }
        match state {
            ButtonState::Pressed => {
                self.primary_down = true;
                None
            }
            ButtonState::Released => {
                let was_down = std::mem::replace(&mut self.primary_down, false);
                was_down.then_some(PointerEvent::Clicked(self.position))
            }
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }
}

/// Maps surface pixels to normalized device coordinates in [-1, 1], y up.
pub fn pointer_to_ndc(position: Vec2, viewport: (u32, u32)) -> Vec2 {
    let width = viewport.0.max(1) as f32;
    let height = viewport.1.max(1) as f32;
    Vec2::new(
        position.x / width * 2.0 - 1.0,
        -(position.y / height) * 2.0 + 1.0,
    )
}
