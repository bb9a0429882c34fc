//! Keyframed node animation and a small mixer that plays named clips.

use std::collections::HashMap;

use glam::{Quat, Vec4};

use crate::model::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
    /// Values are stored as `[in-tangent, value, out-tangent]` per keyframe.
    CubicSpline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelTarget {
    Translation,
    Rotation,
    Scale,
}

/// Keyframes driving one property of one node.
///
/// Translation and scale keys use `xyz` of each value; rotation keys are
/// quaternions stored as `xyzw`.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub node: usize,
    pub target: ChannelTarget,
    pub interpolation: Interpolation,
    pub times: Vec<f32>,
    pub values: Vec<Vec4>,
}

impl Channel {
    fn key_count(&self) -> usize {
        let per_key = match self.interpolation {
            Interpolation::CubicSpline => 3,
            _ => 1,
        };
        self.times.len().min(self.values.len() / per_key)
    }

    fn value(&self, key: usize) -> Vec4 {
        match self.interpolation {
            Interpolation::CubicSpline => self.values[key * 3 + 1],
            _ => self.values[key],
        }
    }

    pub fn sample(&self, time: f32) -> Option<Vec4> {
        let count = self.key_count();
        if count == 0 {
            return None;
        }
        if count == 1 || time <= self.times[0] {
            return Some(self.value(0));
        }
        if time >= self.times[count - 1] {
            return Some(self.value(count - 1));
        }

        let next = self.times[..count].partition_point(|&t| t <= time);
        let prev = next - 1;
        let span = self.times[next] - self.times[prev];
        let s = if span > 0.0 {
            (time - self.times[prev]) / span
        } else {
            0.0
        };

        let (a, b) = (self.value(prev), self.value(next));
        let sampled = match self.interpolation {
            Interpolation::Step => a,
            Interpolation::Linear => match self.target {
                ChannelTarget::Rotation => {
                    Vec4::from(Quat::from_vec4(a).slerp(Quat::from_vec4(b), s))
                }
                _ => a.lerp(b, s),
            },
            Interpolation::CubicSpline => {
                let out_tangent = self.values[prev * 3 + 2] * span;
                let in_tangent = self.values[next * 3] * span;
                let s2 = s * s;
                let s3 = s2 * s;
                let value = a * (2.0 * s3 - 3.0 * s2 + 1.0)
                    + out_tangent * (s3 - 2.0 * s2 + s)
                    + b * (-2.0 * s3 + 3.0 * s2)
                    + in_tangent * (s3 - s2);
                match self.target {
                    ChannelTarget::Rotation => value.normalize_or_zero(),
                    _ => value,
                }
            }
        };
        Some(sampled)
    }
}

/// A named, time-parameterised pose sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub duration: f32,
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|channel| channel.times.last().copied())
            .fold(0.0, f32::max);
        Self {
            name: name.into(),
            duration,
            channels,
        }
    }

    pub fn find_by_name<'a>(clips: &'a [AnimationClip], name: &str) -> Option<&'a AnimationClip> {
        clips.iter().find(|clip| clip.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Action {
    time: f32,
    weight: f32,
    playing: bool,
}

impl Default for Action {
    fn default() -> Self {
        Self {
            time: 0.0,
            weight: 1.0,
            playing: false,
        }
    }
}

/// Plays clips of one model and blends the playing ones into a pose.
///
/// Every clip owns exactly one action. Playing actions loop.
#[derive(Debug, Clone)]
pub struct AnimationMixer {
    clips: Vec<AnimationClip>,
    actions: Vec<Action>,
}

impl AnimationMixer {
    pub fn new(clips: Vec<AnimationClip>) -> Self {
        let actions = vec![Action::default(); clips.len()];
        Self { clips, actions }
    }

    fn index(&self, name: &str) -> Option<usize> {
        self.clips.iter().position(|clip| clip.name == name)
    }

    pub fn has_clip(&self, name: &str) -> bool {
        self.index(name).is_some()
    }

    /// Starts the clip from wherever its action currently is.
    pub fn play(&mut self, name: &str) -> bool {
        self.with_action(name, |action| action.playing = true)
    }

    /// Stops the clip and rewinds it.
    pub fn stop(&mut self, name: &str) -> bool {
        self.with_action(name, |action| {
            action.playing = false;
            action.time = 0.0;
        })
    }

    /// Rewinds the clip and plays it from the first keyframe.
    pub fn restart(&mut self, name: &str) -> bool {
        self.with_action(name, |action| {
            action.time = 0.0;
            action.weight = 1.0;
            action.playing = true;
        })
    }

    /// Stops every other clip and restarts `name`. Returns false when the
    /// clip is unknown, in which case nothing changes.
    pub fn play_exclusive(&mut self, name: &str) -> bool {
        let Some(index) = self.index(name) else {
            return false;
        };
        for (i, action) in self.actions.iter_mut().enumerate() {
            if i != index {
                *action = Action::default();
            }
        }
        self.restart(name)
    }

    pub fn stop_all(&mut self) {
        self.actions.fill(Action::default());
    }

    pub fn set_weight(&mut self, name: &str, weight: f32) -> bool {
        self.with_action(name, |action| action.weight = weight.max(0.0))
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.index(name)
            .map(|index| self.actions[index].playing)
            .unwrap_or(false)
    }

    pub fn time(&self, name: &str) -> Option<f32> {
        self.index(name).map(|index| self.actions[index].time)
    }

    pub fn playing_clips(&self) -> impl Iterator<Item = &str> {
        self.clips
            .iter()
            .zip(&self.actions)
            .filter(|(_, action)| action.playing)
            .map(|(clip, _)| clip.name.as_str())
    }

    /// Advances every playing action by `delta` seconds.
    pub fn update(&mut self, delta: f32) {
        for (clip, action) in self.clips.iter().zip(self.actions.iter_mut()) {
            if !action.playing {
                continue;
            }
            action.time += delta;
            if clip.duration > 0.0 {
                action.time = action.time.rem_euclid(clip.duration);
            } else {
                action.time = 0.0;
            }
        }
    }

    /// Writes the blended pose of all playing clips into `pose`.
    ///
    /// Properties no playing clip animates keep their `rest` value; when the
    /// weights on a property sum below one, the remainder comes from `rest`.
    pub fn apply(&self, rest: &[Transform], pose: &mut [Transform]) {
        let mut accum: HashMap<(usize, ChannelTarget), (Vec4, f32)> = HashMap::new();
        for (clip, action) in self.clips.iter().zip(&self.actions) {
            if !action.playing || action.weight <= 0.0 {
                continue;
            }
            for channel in &clip.channels {
                let Some(value) = channel.sample(action.time) else {
                    continue;
                };
                let entry = accum
                    .entry((channel.node, channel.target))
                    .or_insert((Vec4::ZERO, 0.0));
                let value = align_rotation(channel.target, entry.0, value);
                entry.0 += value * action.weight;
                entry.1 += action.weight;
            }
        }

        let shared = pose.len().min(rest.len());
        pose[..shared].copy_from_slice(&rest[..shared]);
        for ((node, target), (sum, weight)) in accum {
            let (Some(rest), Some(out)) = (rest.get(node), pose.get_mut(node)) else {
                continue;
            };
            let rest_value = match target {
                ChannelTarget::Translation => rest.translation.extend(0.0),
                ChannelTarget::Rotation => Vec4::from(rest.rotation),
                ChannelTarget::Scale => rest.scale.extend(0.0),
            };
            let blended = if weight < 1.0 {
                sum + align_rotation(target, sum, rest_value) * (1.0 - weight)
            } else {
                sum / weight
            };
            match target {
                ChannelTarget::Translation => out.translation = blended.truncate(),
                ChannelTarget::Rotation => {
                    out.rotation = Quat::from_vec4(blended.normalize_or_zero());
                    if !out.rotation.is_finite() || out.rotation.length_squared() == 0.0 {
                        out.rotation = rest.rotation;
                    }
                }
                ChannelTarget::Scale => out.scale = blended.truncate(),
            }
        }
    }

    fn with_action(&mut self, name: &str, f: impl FnOnce(&mut Action)) -> bool {
        match self.index(name) {
            Some(index) => {
                f(&mut self.actions[index]);
                true
            }
            None => false,
        }
    }
}

/// Flips a quaternion into the hemisphere of the running sum so blending
/// takes the short way round.
fn align_rotation(target: ChannelTarget, reference: Vec4, value: Vec4) -> Vec4 {
    if target == ChannelTarget::Rotation && reference.dot(value) < 0.0 {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn slide(name: &str, to: f32) -> AnimationClip {
        AnimationClip::new(
            name,
            vec![Channel {
                node: 0,
                target: ChannelTarget::Translation,
                interpolation: Interpolation::Linear,
                times: vec![0.0, 1.0],
                values: vec![Vec4::ZERO, Vec4::new(to, 0.0, 0.0, 0.0)],
            }],
        )
    }

    #[test]
    fn linear_and_step_sampling() {
        let mut clip = slide("slide", 2.0);
        assert_eq!(clip.duration, 1.0);
        let channel = &clip.channels[0];
        assert_eq!(channel.sample(0.25), Some(Vec4::new(0.5, 0.0, 0.0, 0.0)));
        assert_eq!(channel.sample(-1.0), Some(Vec4::ZERO));
        assert_eq!(channel.sample(5.0), Some(Vec4::new(2.0, 0.0, 0.0, 0.0)));

        clip.channels[0].interpolation = Interpolation::Step;
        assert_eq!(clip.channels[0].sample(0.75), Some(Vec4::ZERO));
    }

    #[test]
    fn cubic_spline_passes_through_keys() {
        let channel = Channel {
            node: 0,
            target: ChannelTarget::Scale,
            interpolation: Interpolation::CubicSpline,
            times: vec![0.0, 2.0],
            values: vec![
                Vec4::ZERO,
                Vec4::splat(1.0),
                Vec4::ZERO,
                Vec4::ZERO,
                Vec4::splat(3.0),
                Vec4::ZERO,
            ],
        };
        assert_eq!(channel.sample(0.0), Some(Vec4::splat(1.0)));
        assert_eq!(channel.sample(2.0), Some(Vec4::splat(3.0)));
        let mid = channel.sample(1.0).unwrap();
        assert!((mid.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn rotation_slerps() {
        let channel = Channel {
            node: 0,
            target: ChannelTarget::Rotation,
            interpolation: Interpolation::Linear,
            times: vec![0.0, 1.0],
            values: vec![
                Vec4::from(Quat::IDENTITY),
                Vec4::from(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)),
            ],
        };
        let half = Quat::from_vec4(channel.sample(0.5).unwrap());
        let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        assert!(half.angle_between(expected) < 1e-4);
    }

    #[test]
    fn update_loops_playing_actions_only() {
        let mut mixer = AnimationMixer::new(vec![slide("a", 1.0), slide("b", 1.0)]);
        assert!(mixer.play("a"));
        mixer.update(1.25);
        assert!((mixer.time("a").unwrap() - 0.25).abs() < 1e-6);
        assert_eq!(mixer.time("b"), Some(0.0));
        assert!(!mixer.play("missing"));
    }

    #[test]
    fn play_exclusive_stops_the_rest() {
        let mut mixer = AnimationMixer::new(vec![slide("idle", 1.0), slide("run", 1.0)]);
        mixer.play("idle");
        mixer.update(0.5);
        mixer.play("run");
        mixer.update(0.2);
        assert!(mixer.play_exclusive("run"));
        assert_eq!(mixer.playing_clips().collect::<Vec<_>>(), vec!["run"]);
        assert_eq!(mixer.time("run"), Some(0.0));
        assert_eq!(mixer.time("idle"), Some(0.0));

        assert!(!mixer.play_exclusive("fly"));
        assert!(mixer.is_playing("run"));

        mixer.stop_all();
        assert_eq!(mixer.playing_clips().count(), 0);
    }

    #[test]
    fn apply_poses_animated_nodes_and_keeps_rest_elsewhere() {
        let mut mixer = AnimationMixer::new(vec![slide("slide", 4.0)]);
        let rest = vec![
            Transform::IDENTITY,
            Transform {
                translation: Vec3::new(0.0, 1.0, 0.0),
                ..Transform::IDENTITY
            },
        ];
        let mut pose = rest.clone();
        mixer.restart("slide");
        mixer.update(0.5);
        mixer.apply(&rest, &mut pose);
        assert_eq!(pose[0].translation, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(pose[1], rest[1]);

        mixer.stop_all();
        mixer.apply(&rest, &mut pose);
        assert_eq!(pose, rest);
    }

    #[test]
    fn partial_weight_blends_with_rest() {
        let mut mixer = AnimationMixer::new(vec![slide("slide", 4.0)]);
        let rest = vec![Transform::IDENTITY];
        let mut pose = rest.clone();
        mixer.restart("slide");
        mixer.set_weight("slide", 0.5);
        mixer.update(1.0 - f32::EPSILON);
        mixer.apply(&rest, &mut pose);
        assert!(pose[0].translation.x > 1.9 && pose[0].translation.x < 2.01);
    }
}
