use std::fmt;
use std::sync::Arc;

use glam::Vec3;

use crate::animation::AnimationMixer;
use crate::assets::{AssetKind, ImageData, LoadOutcome, LoadedAsset, PendingAssets};
use crate::camera::Camera;
use crate::interaction::{BallMotion, CharacterMotion, PointerMode};
use crate::model::{ModelAsset, ModelInstance, SceneNode};
use crate::raycast::Plane;
use crate::scene::{ModelPlacement, SceneDescription};
use crate::viewport::ViewportProvider;

/// All mutable scene data, owned by whoever drives the frame loop.
///
/// Models are `None` until their bundle finishes loading and stay `None`
/// when it fails; every consumer checks before touching them.
pub struct SceneState {
    pub(crate) description: SceneDescription,
    pub(crate) camera: Camera,
    pub(crate) viewport: Arc<dyn ViewportProvider>,
    pub(crate) character: Option<ModelInstance>,
    pub(crate) draggable: Option<ModelInstance>,
    pub(crate) ball: Option<ModelInstance>,
    pub(crate) mixer: Option<AnimationMixer>,
    pub(crate) drag_plane: Option<Plane>,
    pub(crate) background: Option<Arc<ImageData>>,
    pub(crate) pointer: PointerMode,
    pub(crate) character_motion: CharacterMotion,
    pub(crate) ball_motion: BallMotion,
}

impl SceneState {
    pub fn new(description: SceneDescription, viewport: Arc<dyn ViewportProvider>) -> Self {
        Self {
            camera: Camera::from(description.camera),
            description,
            viewport,
            character: None,
            draggable: None,
            ball: None,
            mixer: None,
            drag_plane: None,
            background: None,
            pointer: PointerMode::Idle,
            character_motion: CharacterMotion::IdleRotating,
            ball_motion: BallMotion::Spinning,
        }
    }

    pub fn description(&self) -> &SceneDescription {
        &self.description
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn viewport(&self) -> &Arc<dyn ViewportProvider> {
        &self.viewport
    }

    pub fn character(&self) -> Option<&ModelInstance> {
        self.character.as_ref()
    }

    pub fn draggable(&self) -> Option<&ModelInstance> {
        self.draggable.as_ref()
    }

    pub fn ball(&self) -> Option<&ModelInstance> {
        self.ball.as_ref()
    }

    pub fn model(&self, kind: AssetKind) -> Option<&ModelInstance> {
        match kind {
            AssetKind::Character => self.character(),
            AssetKind::Draggable => self.draggable(),
            AssetKind::Ball => self.ball(),
            AssetKind::Background => None,
        }
    }

    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.mixer.as_ref()
    }

    pub fn drag_plane(&self) -> Option<&Plane> {
        self.drag_plane.as_ref()
    }

    pub fn background(&self) -> Option<&Arc<ImageData>> {
        self.background.as_ref()
    }

    pub fn pointer_mode(&self) -> PointerMode {
        self.pointer
    }

    pub fn character_motion(&self) -> CharacterMotion {
        self.character_motion
    }

    pub fn ball_motion(&self) -> BallMotion {
        self.ball_motion
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.character.is_some() && self.draggable.is_some() && self.ball.is_some()
    }

    /// Takes one finished load. Failures are logged and leave the slot empty.
    /// Returns whether anything was attached.
    pub fn apply_outcome(&mut self, outcome: LoadOutcome) -> bool {
        let LoadOutcome {
            kind,
            location,
            result,
        } = outcome;
        match (kind, result) {
            (AssetKind::Background, Ok(LoadedAsset::Background(image))) => {
                log::info!(
                    "loaded background {location} ({}x{})",
                    image.width,
                    image.height
                );
                self.attach_background(image);
                true
            }
            (AssetKind::Background, Ok(LoadedAsset::Model(_))) => {
                log::error!("{location} is a model, expected a background image");
                false
            }
            (kind, Ok(LoadedAsset::Model(model))) => {
                log::info!(
                    "loaded {kind} {location}: {} node(s), {} mesh(es), {} clip(s)",
                    model.nodes.len(),
                    model.meshes.len(),
                    model.clips.len()
                );
                self.attach_model(kind, model);
                true
            }
            (kind, Ok(LoadedAsset::Background(_))) => {
                log::error!("{location} is an image, expected a model for the {kind}");
                false
            }
            (kind, Err(err)) => {
                log::error!("{kind} failed to load: {err}");
                false
            }
        }
    }

    /// Applies every load that has finished so far. Returns how many
    /// outcomes were taken.
    pub fn absorb(&mut self, pending: &mut PendingAssets) -> usize {
        let outcomes = pending.poll();
        let count = outcomes.len();
        for outcome in outcomes {
            self.apply_outcome(outcome);
        }
        count
    }

    /// Places a model at its configured spot. The character also gets an
    /// animation mixer with the idle clip playing; the draggable fixes the
    /// drag plane through its starting position.
    pub fn attach_model(&mut self, kind: AssetKind, model: Arc<ModelAsset>) {
        match kind {
            AssetKind::Character => {
                let mut mixer = AnimationMixer::new(model.clips.clone());
                let idle = &self.description.clips.idle;
                if !mixer.restart(idle) {
                    log::warn!("character has no clip named {idle:?}");
                }
                if !mixer.has_clip(&self.description.clips.run) {
                    log::warn!(
                        "character has no clip named {:?}",
                        self.description.clips.run
                    );
                }
                let mut instance = instance_at(model, &self.description.character);
                mixer.apply(&instance.asset.rest_pose(), &mut instance.pose);
                self.character = Some(instance);
                self.mixer = Some(mixer);
            }
            AssetKind::Draggable => {
                let instance = instance_at(model, &self.description.draggable);
                self.drag_plane = Some(Plane::from_normal_and_coplanar_point(
                    Vec3::Y,
                    instance.node.position,
                ));
                self.draggable = Some(instance);
            }
            AssetKind::Ball => {
                self.ball = Some(instance_at(model, &self.description.ball));
            }
            AssetKind::Background => {
                log::error!("cannot attach model {} as the background", model.name);
            }
        }
    }

    pub fn attach_background(&mut self, image: Arc<ImageData>) {
        self.background = Some(image);
    }

    /// One line per scene subject, in a fixed order.
    pub fn node_summaries(&self) -> Vec<NodeSummary> {
        AssetKind::MODELS
            .iter()
            .map(|&kind| {
                let instance = self.model(kind);
                let clips = match (kind, &self.mixer) {
                    (AssetKind::Character, Some(mixer)) => {
                        mixer.playing_clips().map(str::to_string).collect()
                    }
                    _ => Vec::new(),
                };
                NodeSummary {
                    kind,
                    node: instance.map(|instance| instance.node),
                    playing: clips,
                }
            })
            .collect()
    }
}

fn instance_at(model: Arc<ModelAsset>, placement: &ModelPlacement) -> ModelInstance {
    ModelInstance::new(model, SceneNode::from_placement(placement))
}

/// Printable snapshot of one scene subject.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub kind: AssetKind,
    pub node: Option<SceneNode>,
    pub playing: Vec<String>,
}

impl fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<10}", self.kind.label())?;
        let Some(node) = &self.node else {
            return write!(f, " not loaded");
        };
        write!(
            f,
            " position={} rotation={} scale={}",
            triple(node.position),
            triple(node.rotation),
            triple(node.scale)
        )?;
        if !self.playing.is_empty() {
            write!(f, " playing=[{}]", self.playing.join(", "))?;
        }
        Ok(())
    }
}

fn triple(v: Vec3) -> String {
    format!("({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)
}
