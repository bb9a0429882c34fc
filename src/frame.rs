//! Per-frame scene update plus the clock and cancellation handle of the
//! frame loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::interaction::{BallMotion, CharacterMotion};
use crate::state::SceneState;

impl SceneState {
    /// Advances the scene by `dt` seconds: animation time first, then the
    /// character and ball behaviours, then the character's pose.
    pub fn advance(&mut self, dt: f32) {
        if let Some(mixer) = self.mixer.as_mut() {
            mixer.update(dt);
        }
        self.advance_character(dt);
        self.advance_ball(dt);

        if let (Some(character), Some(mixer)) = (self.character.as_mut(), self.mixer.as_ref()) {
            let rest = character.asset.rest_pose();
            mixer.apply(&rest, &mut character.pose);
        }
    }

    fn advance_character(&mut self, dt: f32) {
        let Some(character) = self.character.as_mut() else {
            return;
        };
        let motion = self.description.motion;
        match self.character_motion {
            CharacterMotion::IdleRotating => {
                character.node.rotation.y += motion.idle_spin * dt;
            }
            CharacterMotion::Running => {
                character.node.position += motion.run_velocity * dt;
                if character.node.position.z >= motion.reset_z {
                    character.node.position = self.description.character.position;
                    self.character_motion = CharacterMotion::IdleRotating;
                    if let Some(mixer) = self.mixer.as_mut() {
                        mixer.stop_all();
                        mixer.restart(&self.description.clips.idle);
                    }
                    log::debug!("character reached z {} and returned to its anchor", motion.reset_z);
                }
            }
        }
    }

    fn advance_ball(&mut self, dt: f32) {
        let Some(ball) = self.ball.as_mut() else {
            return;
        };
        let motion = self.description.motion;
        let spin = motion.ball_spin * dt;
        ball.node.rotation.x += spin;
        ball.node.rotation.y += spin;

        if self.ball_motion == BallMotion::Rolling {
            ball.node.position.z += motion.ball_step;
            ball.node.position.y -= motion.ball_step;
            if ball.node.position.z >= motion.ball_stop_z {
                self.ball_motion = BallMotion::Spinning;
                log::debug!("ball stopped at z {}", ball.node.position.z);
            }
        }
    }
}

/// Measures the time between frames. The first reading is zero.
#[derive(Debug)]
pub struct FrameClock {
    #[cfg(not(target_arch = "wasm32"))]
    origin: std::time::Instant,
    last: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            origin: std::time::Instant::now(),
            last: None,
        }
    }

    /// Seconds since the previous call.
    pub fn delta(&mut self) -> f32 {
        let now = self.now();
        let delta = self.last.map_or(0.0, |last| (now - last).max(0.0));
        self.last = Some(now);
        delta as f32
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    #[cfg(target_arch = "wasm32")]
    fn now(&self) -> f64 {
        web_sys::window()
            .and_then(|window| window.performance())
            .map(|performance| performance.now() / 1000.0)
            .unwrap_or(0.0)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared stop flag for a running frame loop.
#[derive(Debug, Clone, Default)]
pub struct LoopHandle {
    cancelled: Arc<AtomicBool>,
}

impl LoopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
