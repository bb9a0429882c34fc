//! Pointer handling: hover-dragging the prop and click-to-animate.

use std::fmt;

use glam::Vec2;

use crate::input::{pointer_to_ndc, PointerEvent};
use crate::raycast::Ray;
use crate::state::SceneState;

/// Whether the pointer currently sits over the draggable prop. While
/// dragging, clicks are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointerMode {
    #[default]
    Idle,
    Dragging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharacterMotion {
    /// Spinning in place about Y.
    #[default]
    IdleRotating,
    /// Running towards the camera until it crosses the reset depth.
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BallMotion {
    #[default]
    Spinning,
    /// Spinning and drifting towards the camera.
    Rolling,
}

/// Single-word summary of what the scene is doing, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    Idle,
    Dragging,
    AnimatingCharacter,
    AnimatingBall,
}

impl InteractionMode {
    pub fn derive(pointer: PointerMode, character: CharacterMotion, ball: BallMotion) -> Self {
        match (pointer, character, ball) {
            (PointerMode::Dragging, _, _) => InteractionMode::Dragging,
            (_, CharacterMotion::Running, _) => InteractionMode::AnimatingCharacter,
            (_, _, BallMotion::Rolling) => InteractionMode::AnimatingBall,
            _ => InteractionMode::Idle,
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InteractionMode::Idle => "idle",
            InteractionMode::Dragging => "dragging",
            InteractionMode::AnimatingCharacter => "animating character",
            InteractionMode::AnimatingBall => "animating ball",
        };
        f.write_str(name)
    }
}

/// What a click did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClickOutcome {
    pub suppressed: bool,
    pub character_hit: bool,
    pub ball_hit: bool,
}

impl SceneState {
    pub fn mode(&self) -> InteractionMode {
        InteractionMode::derive(self.pointer, self.character_motion, self.ball_motion)
    }

    /// World-space ray under a pointer position given in surface pixels.
    pub fn pointer_ray(&self, position: Vec2) -> Ray {
        let ndc = pointer_to_ndc(position, self.viewport.viewport_size());
        self.camera.ray_through(ndc, self.viewport.aspect_ratio())
    }

    pub fn handle_pointer(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Moved(position) => {
                self.pointer_moved(position);
            }
            PointerEvent::Clicked(position) => {
                self.pointer_clicked(position);
            }
        }
    }

    /// Hover test against the draggable prop. On a hit the prop's origin
    /// snaps to where the pointer ray meets the drag plane.
    pub fn pointer_moved(&mut self, position: Vec2) -> PointerMode {
        let ray = self.pointer_ray(position);
        let previous = self.pointer;
        self.pointer = match self.draggable.as_mut() {
            Some(draggable) if draggable.raycast(&ray).is_some() => {
                if let Some(point) = self.drag_plane.and_then(|plane| ray.intersect_plane(&plane)) {
                    draggable.node.position = point;
                }
                PointerMode::Dragging
            }
            _ => PointerMode::Idle,
        };
        if previous != self.pointer {
            log::debug!("pointer mode {previous:?} -> {:?}", self.pointer);
        }
        self.pointer
    }

    /// Click handling. The character and ball are tested independently, so
    /// one click can set both off.
    pub fn pointer_clicked(&mut self, position: Vec2) -> ClickOutcome {
        if self.pointer == PointerMode::Dragging {
            log::debug!("click ignored while dragging");
            return ClickOutcome {
                suppressed: true,
                ..ClickOutcome::default()
            };
        }

        let ray = self.pointer_ray(position);
        let mut outcome = ClickOutcome::default();

        if let Some(character) = &self.character {
            if character.raycast(&ray).is_some() {
                outcome.character_hit = true;
                self.character_motion = CharacterMotion::Running;
                if let Some(mixer) = self.mixer.as_mut() {
                    let run = &self.description.clips.run;
                    if !mixer.play_exclusive(run) {
                        log::warn!("cannot play missing clip {run:?}");
                    }
                }
            }
        }

        if let Some(ball) = &self.ball {
            if ball.raycast(&ray).is_some() {
                outcome.ball_hit = true;
                self.ball_motion = BallMotion::Rolling;
            }
        }

        if outcome.character_hit || outcome.ball_hit {
            log::debug!("click at {position}: {outcome:?}, mode now {}", self.mode());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;

    use super::*;
    use crate::animation::AnimationClip;
    use crate::assets::AssetKind;
    use crate::model::{MeshData, ModelAsset};
    use crate::scene::SceneDescription;
    use crate::viewport::StaticViewport;

    const WIDTH: u32 = 800;
    const HEIGHT: u32 = 600;

    fn cube(clips: &[&str]) -> Arc<ModelAsset> {
        let clips = clips
            .iter()
            .map(|name| AnimationClip::new(*name, Vec::new()))
            .collect();
        Arc::new(ModelAsset::single_mesh("cube", MeshData::unit_cube([1.0; 4])).with_clips(clips))
    }

    fn empty_state() -> SceneState {
        SceneState::new(
            SceneDescription::default(),
            Arc::new(StaticViewport::new(WIDTH, HEIGHT)),
        )
    }

    fn loaded_state() -> SceneState {
        let mut state = empty_state();
        state.attach_model(AssetKind::Character, cube(&["tpose", "Run Look Back"]));
        state.attach_model(AssetKind::Draggable, cube(&[]));
        state.attach_model(AssetKind::Ball, cube(&[]));
        state
    }

    /// Pixel position at which `point` appears on screen.
    fn screen_point(state: &SceneState, point: Vec3) -> Vec2 {
        let ndc = state
            .camera()
            .project(point, WIDTH as f32 / HEIGHT as f32);
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * WIDTH as f32,
            (1.0 - ndc.y) * 0.5 * HEIGHT as f32,
        )
    }

    #[test]
    fn mode_precedence() {
        use BallMotion::*;
        use CharacterMotion::*;
        assert_eq!(
            InteractionMode::derive(PointerMode::Dragging, Running, Rolling),
            InteractionMode::Dragging
        );
        assert_eq!(
            InteractionMode::derive(PointerMode::Idle, Running, Rolling),
            InteractionMode::AnimatingCharacter
        );
        assert_eq!(
            InteractionMode::derive(PointerMode::Idle, IdleRotating, Rolling),
            InteractionMode::AnimatingBall
        );
        assert_eq!(
            InteractionMode::derive(PointerMode::Idle, IdleRotating, Spinning),
            InteractionMode::Idle
        );
    }

    #[test]
    fn hovering_snaps_prop_onto_drag_plane() {
        let mut state = loaded_state();
        let start = state.draggable().unwrap().node.position;
        let over = screen_point(&state, start);

        for pointer in [over, over + Vec2::new(2.0, 1.0), over + Vec2::new(-1.0, 2.0)] {
            let plane = *state.drag_plane().unwrap();
            let expected = state.pointer_ray(pointer).intersect_plane(&plane).unwrap();
            assert_eq!(state.pointer_moved(pointer), PointerMode::Dragging);
            assert_eq!(state.draggable().unwrap().node.position, expected);
            assert!((expected.y - start.y).abs() < 1e-3);
        }
        assert_eq!(state.mode(), InteractionMode::Dragging);

        let parked = state.draggable().unwrap().node.position;
        assert_eq!(state.pointer_moved(Vec2::new(5.0, 5.0)), PointerMode::Idle);
        assert_eq!(state.draggable().unwrap().node.position, parked);
    }

    #[test]
    fn click_while_dragging_is_suppressed() {
        let mut state = loaded_state();
        let over = screen_point(&state, state.draggable().unwrap().node.position);
        state.pointer_moved(over);

        let outcome = state.pointer_clicked(over);
        assert!(outcome.suppressed);
        assert_eq!(state.character_motion(), CharacterMotion::IdleRotating);
        // The ray to the prop also passes through the ball.
        assert_eq!(state.ball_motion(), BallMotion::Spinning);
        let mixer = state.mixer().unwrap();
        assert!(mixer.is_playing("tpose"));
        assert!(!mixer.is_playing("Run Look Back"));
    }

    #[test]
    fn clicking_character_starts_run_clip() {
        let mut state = loaded_state();
        state.ball = None;
        let over = screen_point(&state, state.character().unwrap().node.position);

        let outcome = state.pointer_clicked(over);
        assert!(outcome.character_hit);
        assert!(!outcome.ball_hit);
        assert_eq!(state.character_motion(), CharacterMotion::Running);
        assert_eq!(state.mode(), InteractionMode::AnimatingCharacter);
        let mixer = state.mixer().unwrap();
        assert!(mixer.is_playing("Run Look Back"));
        assert!(!mixer.is_playing("tpose"));
    }

    #[test]
    fn one_click_can_hit_character_and_ball() {
        let mut state = loaded_state();
        let over = screen_point(&state, state.character().unwrap().node.position);
        let outcome = state.pointer_clicked(over);
        assert!(outcome.character_hit && outcome.ball_hit);
        assert_eq!(state.ball_motion(), BallMotion::Rolling);
    }

    #[test]
    fn clicking_ball_starts_rolling() {
        let mut state = loaded_state();
        let centre = Vec2::new(WIDTH as f32 / 2.0, HEIGHT as f32 / 2.0);
        let outcome = state.pointer_clicked(centre);
        assert!(outcome.ball_hit);
        assert!(!outcome.character_hit);
        assert_eq!(state.ball_motion(), BallMotion::Rolling);
        assert_eq!(state.character_motion(), CharacterMotion::IdleRotating);
        assert_eq!(state.mode(), InteractionMode::AnimatingBall);
    }

    #[test]
    fn unloaded_models_are_skipped() {
        let mut state = empty_state();
        let centre = Vec2::new(WIDTH as f32 / 2.0, HEIGHT as f32 / 2.0);
        assert_eq!(state.pointer_moved(centre), PointerMode::Idle);
        assert_eq!(state.pointer_clicked(centre), ClickOutcome::default());
        assert_eq!(state.mode(), InteractionMode::Idle);
    }
}
