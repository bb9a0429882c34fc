use glam::{Mat3, Mat4, Vec3};

use crate::assets::AssetKind;
use crate::scene::SceneDescription;
use crate::state::SceneState;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct LightParams {
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    /// Cut-off range; zero means the light reaches everything.
    pub distance: f32,
    pub decay: f32,
}

impl LightParams {
    pub fn from_scene(scene: &SceneDescription) -> Self {
        Self {
            ambient_color: scene.ambient.color,
            ambient_intensity: scene.ambient.intensity,
            position: scene.point_light.position,
            color: scene.point_light.color,
            intensity: scene.point_light.intensity,
            distance: scene.point_light.distance,
            decay: scene.point_light.decay,
        }
    }

    /// How much of the point light reaches something `distance` away. The
    /// scene shader evaluates the same curve.
    pub fn attenuation(&self, distance: f32) -> f32 {
        let mut falloff = 1.0 / distance.powf(self.decay).max(0.01);
        if self.distance > 0.0 {
            let window = (1.0 - (distance / self.distance).powi(4)).clamp(0.0, 1.0);
            falloff *= window * window;
        }
        falloff
    }
}

/// One mesh of one scene subject, ready for the GPU.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawItem {
    pub kind: AssetKind,
    /// Index into the owning model's mesh list.
    pub mesh: usize,
    /// Identity for skinned meshes; their palette is already in world space.
    pub model: Mat4,
    pub color: [f32; 4],
    /// Index into the owning model's texture list.
    pub texture: Option<usize>,
    /// Joint palette of a skinned mesh, empty for rigid ones.
    pub joints: Vec<Mat4>,
}

impl DrawItem {
    /// Inverse-transpose of the model matrix, or identity when it is singular.
    pub fn normal_matrix(&self) -> Mat3 {
        let linear = Mat3::from_mat4(self.model);
        if linear.determinant().abs() <= f32::EPSILON {
            Mat3::IDENTITY
        } else {
            linear.inverse().transpose()
        }
    }
}

/// Every mesh of every loaded model with its world transform.
pub fn draw_list(state: &SceneState) -> Vec<DrawItem> {
    let mut items = Vec::new();
    for kind in AssetKind::MODELS {
        let Some(instance) = state.model(kind) else {
            continue;
        };
        let world = instance.world_matrices();
        for (node, model) in instance.asset.nodes.iter().zip(&world) {
            let palette = instance.asset.joint_matrices(node, &world);
            for &mesh in &node.meshes {
                let Some(data) = instance.asset.meshes.get(mesh) else {
                    continue;
                };
                let (model, joints) = match (&palette, &data.skin) {
                    (Some(palette), Some(_)) => (Mat4::IDENTITY, palette.clone()),
                    _ => (*model, Vec::new()),
                };
                items.push(DrawItem {
                    kind,
                    mesh,
                    model,
                    color: data.base_color,
                    texture: data.texture,
                    joints,
                });
            }
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::animation::{AnimationClip, Channel, ChannelTarget, Interpolation};
    use crate::model::{MeshData, ModelAsset, ModelNode, Skin, SkinWeights, Transform};
    use crate::viewport::StaticViewport;
    use glam::Vec4;

    /// A character whose mesh hangs off a "Hips" joint. The run clip lifts
    /// the joint by 5 over one second; the idle clip holds it still.
    fn rigged_character() -> ModelAsset {
        let mesh = MeshData::unit_cube([1.0; 4]);
        let count = mesh.vertex_count();
        let mesh = mesh.with_skin(SkinWeights::new(
            vec![[0; 4]; count],
            vec![[1.0, 0.0, 0.0, 0.0]; count],
        ));
        let mut asset = ModelAsset::single_mesh("girl", mesh);
        asset.nodes[0].skin = Some(0);
        asset.nodes.push(ModelNode {
            name: Some("Hips".to_string()),
            children: Vec::new(),
            rest: Transform::IDENTITY,
            meshes: Vec::new(),
            skin: None,
        });
        asset.roots.push(1);
        asset.skins.push(Skin {
            joints: vec![1],
            inverse_bind: vec![Mat4::IDENTITY],
        });
        let lift = |to: f32| Channel {
            node: 1,
            target: ChannelTarget::Translation,
            interpolation: Interpolation::Linear,
            times: vec![0.0, 1.0],
            values: vec![Vec4::ZERO, Vec4::new(0.0, to, 0.0, 0.0)],
        };
        asset.with_clips(vec![
            AnimationClip::new("tpose", vec![lift(0.0)]),
            AnimationClip::new("Run Look Back", vec![lift(5.0)]),
        ])
    }

    #[test]
    fn default_point_light_falls_off_linearly() {
        let light = LightParams::from_scene(&SceneDescription::default());
        assert_eq!(light.intensity, 80.0);
        assert!((light.attenuation(40.0) - 1.0 / 40.0).abs() < 1e-6);
        assert_eq!(light.attenuation(0.0), 100.0);
    }

    #[test]
    fn ranged_light_reaches_zero_at_its_distance() {
        let light = LightParams {
            distance: 10.0,
            ..LightParams::from_scene(&SceneDescription::default())
        };
        assert_eq!(light.attenuation(10.0), 0.0);
        assert_eq!(light.attenuation(25.0), 0.0);
        assert!(light.attenuation(5.0) > 0.0);
    }

    #[test]
    fn draw_list_skips_unloaded_models() {
        let mut state = SceneState::new(
            SceneDescription::default(),
            Arc::new(StaticViewport::new(640, 480)),
        );
        assert!(draw_list(&state).is_empty());

        let color = [0.2, 0.4, 0.6, 1.0];
        state.attach_model(
            AssetKind::Ball,
            Arc::new(ModelAsset::single_mesh("ball", MeshData::unit_cube(color))),
        );
        let items = draw_list(&state);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, AssetKind::Ball);
        assert_eq!(items[0].color, color);
        assert_eq!(
            items[0].model.transform_point3(Vec3::ZERO),
            Vec3::new(-3.0, 1.9, -7.0)
        );
    }

    #[test]
    fn normal_matrix_handles_degenerate_scale() {
        let item = DrawItem {
            kind: AssetKind::Ball,
            mesh: 0,
            model: Mat4::from_scale(Vec3::new(2.0, 0.0, 1.0)),
            color: [1.0; 4],
            texture: None,
            joints: Vec::new(),
        };
        assert_eq!(item.normal_matrix(), Mat3::IDENTITY);
    }

    #[test]
    fn running_clip_moves_skinned_geometry() {
        let mut state = SceneState::new(
            SceneDescription::default(),
            Arc::new(StaticViewport::new(640, 480)),
        );
        state.attach_model(AssetKind::Character, Arc::new(rigged_character()));

        let corner = Vec3::splat(0.5);
        let skinned_corner = |state: &SceneState| {
            let items = draw_list(state);
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].model, Mat4::IDENTITY);
            assert_eq!(items[0].joints.len(), 1);
            items[0].joints[0].transform_point3(corner)
        };
        let before = skinned_corner(&state);

        assert!(state
            .mixer
            .as_mut()
            .unwrap()
            .play_exclusive("Run Look Back"));
        state.advance(0.5);
        let after = skinned_corner(&state);

        // Half way through the clip the joint is 2.5 up, times the scale.
        let scale = SceneDescription::default().character.scale.y;
        assert!((after.y - before.y - 2.5 * scale).abs() < 1e-3);
    }

    #[test]
    fn textured_meshes_carry_their_texture_slot() {
        let mut state = SceneState::new(
            SceneDescription::default(),
            Arc::new(StaticViewport::new(640, 480)),
        );
        let cube = MeshData::unit_cube([1.0; 4]);
        let count = cube.vertex_count();
        let cube = cube.with_tex_coords(vec![[0.5, 0.5]; count], Some(0));
        state.attach_model(
            AssetKind::Draggable,
            Arc::new(ModelAsset::single_mesh("teddy", cube)),
        );
        let items = draw_list(&state);
        assert_eq!(items[0].texture, Some(0));
        assert!(items[0].joints.is_empty());
    }
}
