use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::animation::AnimationClip;
use crate::assets::ImageData;
use crate::raycast::{Aabb, Ray};
use crate::scene::ModelPlacement;

/// Translation/rotation/scale of a node relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Transform of a top-level scene subject. Rotation is Euler XYZ in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl SceneNode {
    pub fn from_placement(placement: &ModelPlacement) -> Self {
        Self {
            position: placement.position,
            rotation: placement.rotation,
            scale: placement.scale,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        let rotation = Mat4::from_rotation_x(self.rotation.x)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_z(self.rotation.z);
        Mat4::from_translation(self.position) * rotation * Mat4::from_scale(self.scale)
    }
}

/// Up to four joint influences per vertex. Indices refer to the owning
/// node's [`Skin::joints`].
#[derive(Debug, Clone, PartialEq)]
pub struct SkinWeights {
    pub joints: Vec<[u16; 4]>,
    pub weights: Vec<[f32; 4]>,
}

impl SkinWeights {
    /// Normalizes every weight set to sum to one. A vertex with no weight at
    /// all follows its first joint.
    pub fn new(joints: Vec<[u16; 4]>, weights: Vec<[f32; 4]>) -> Self {
        let weights = weights
            .into_iter()
            .map(|set| {
                let sum: f32 = set.iter().sum();
                if sum > f32::EPSILON {
                    set.map(|weight| weight / sum)
                } else {
                    [1.0, 0.0, 0.0, 0.0]
                }
            })
            .collect();
        Self { joints, weights }
    }

    /// Blended skinning matrix of one vertex.
    fn blend(&self, vertex: usize, palette: &[Mat4]) -> Option<Mat4> {
        let joints = self.joints.get(vertex)?;
        let weights = self.weights.get(vertex)?;
        Some(
            joints
                .iter()
                .zip(weights)
                .filter(|&(_, &weight)| weight != 0.0)
                .fold(Mat4::ZERO, |acc, (&joint, &weight)| {
                    acc + palette.get(joint as usize).copied().unwrap_or(Mat4::IDENTITY) * weight
                }),
        )
    }
}

/// Joint nodes of a skeleton and the inverse bind matrix of each.
#[derive(Debug, Clone, PartialEq)]
pub struct Skin {
    pub joints: Vec<usize>,
    pub inverse_bind: Vec<Mat4>,
}

impl Skin {
    /// Joints the scene shader can address in one draw.
    pub const MAX_JOINTS: usize = 128;

    /// World-space skinning matrix of every joint for the posed world
    /// matrices of the whole model.
    pub fn joint_matrices(&self, world: &[Mat4]) -> Vec<Mat4> {
        self.joints
            .iter()
            .enumerate()
            .map(|(slot, &joint)| {
                let joint_world = world.get(joint).copied().unwrap_or(Mat4::IDENTITY);
                joint_world * self.inverse_bind.get(slot).copied().unwrap_or(Mat4::IDENTITY)
            })
            .collect()
    }
}

/// Triangle mesh with interleaved `position.xyz` + `normal.xyz` vertices.
///
/// Texture coordinates and skin weights, when present, hold one entry per
/// vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub base_color: [f32; 4],
    pub bounds: Aabb,
    pub tex_coords: Vec<[f32; 2]>,
    /// Index into [`ModelAsset::textures`].
    pub texture: Option<usize>,
    pub skin: Option<SkinWeights>,
}

impl MeshData {
    pub const STRIDE: usize = 6;

    /// Builds a mesh, deriving smooth normals when every normal is zero.
    pub fn new(vertices: Vec<f32>, indices: Vec<u32>, base_color: [f32; 4]) -> Self {
        let bounds = Aabb::from_points(
            vertices
                .chunks_exact(Self::STRIDE)
                .map(|chunk| Vec3::from_slice(&chunk[..3])),
        )
        .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));
        let mut mesh = Self {
            vertices,
            indices,
            base_color,
            bounds,
            tex_coords: Vec::new(),
            texture: None,
            skin: None,
        };
        if mesh.lacks_normals() {
            mesh.compute_normals();
        }
        mesh
    }

    /// Axis-aligned unit cube centred on the origin.
    pub fn unit_cube(base_color: [f32; 4]) -> Self {
        const FACES: [(Vec3, Vec3, Vec3); 6] = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];
        let mut vertices = Vec::with_capacity(24 * Self::STRIDE);
        let mut indices = Vec::with_capacity(36);
        for (face, (normal, right, up)) in FACES.iter().enumerate() {
            let centre = *normal * 0.5;
            for (sx, sy) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let corner = centre + *right * sx + *up * sy;
                vertices.extend_from_slice(&corner.to_array());
                vertices.extend_from_slice(&normal.to_array());
            }
            let base = face as u32 * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices, base_color)
    }

    /// Attaches texture coordinates and the base colour texture they sample.
    /// Coordinates that do not cover every vertex are dropped.
    pub fn with_tex_coords(mut self, tex_coords: Vec<[f32; 2]>, texture: Option<usize>) -> Self {
        if tex_coords.len() != self.vertex_count() {
            log::debug!(
                "ignoring {} texture coordinates for {} vertices",
                tex_coords.len(),
                self.vertex_count()
            );
            return self;
        }
        self.tex_coords = tex_coords;
        self.texture = texture;
        self
    }

    pub fn with_skin(mut self, skin: SkinWeights) -> Self {
        let count = self.vertex_count();
        if skin.joints.len() != count || skin.weights.len() != count {
            log::debug!("ignoring skin weights that do not match {count} vertices");
            return self;
        }
        self.skin = Some(skin);
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / Self::STRIDE
    }

    /// Vertex positions deformed by a joint palette. Rigid meshes come back
    /// unchanged.
    pub fn skinned_positions(&self, palette: &[Mat4]) -> Vec<Vec3> {
        (0..self.vertex_count())
            .filter_map(|vertex| {
                let position = self.position(vertex as u32)?;
                let blended = self
                    .skin
                    .as_ref()
                    .and_then(|skin| skin.blend(vertex, palette));
                Some(match blended {
                    Some(matrix) => matrix.transform_point3(position),
                    None => position,
                })
            })
            .collect()
    }

    fn position(&self, index: u32) -> Option<Vec3> {
        let start = index as usize * Self::STRIDE;
        self.vertices
            .get(start..start + 3)
            .map(Vec3::from_slice)
    }

    /// Closest hit of a ray given in mesh space, as a ray parameter.
    pub fn raycast(&self, ray: &Ray) -> Option<f32> {
        self.bounds.intersect_ray(ray)?;
        self.raycast_triangles(ray, |index| self.position(index))
    }

    /// Closest hit against the mesh deformed by `palette`. The palette is in
    /// world space, so the ray is too.
    pub fn raycast_skinned(&self, palette: &[Mat4], ray: &Ray) -> Option<f32> {
        let positions = self.skinned_positions(palette);
        self.raycast_triangles(ray, |index| positions.get(index as usize).copied())
    }

    fn raycast_triangles(&self, ray: &Ray, position: impl Fn(u32) -> Option<Vec3>) -> Option<f32> {
        self.indices
            .chunks_exact(3)
            .filter_map(|triangle| {
                let a = position(triangle[0])?;
                let b = position(triangle[1])?;
                let c = position(triangle[2])?;
                ray.intersect_triangle(a, b, c)
            })
            .min_by(f32::total_cmp)
    }

    fn lacks_normals(&self) -> bool {
        self.vertices
            .chunks_exact(Self::STRIDE)
            .all(|chunk| chunk[3] == 0.0 && chunk[4] == 0.0 && chunk[5] == 0.0)
    }

    fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertex_count()];
        for triangle in self.indices.chunks_exact(3) {
            let (Some(p0), Some(p1), Some(p2)) = (
                self.position(triangle[0]),
                self.position(triangle[1]),
                self.position(triangle[2]),
            ) else {
                continue;
            };
            let normal = (p1 - p0).cross(p2 - p0);
            if normal.length_squared() > f32::EPSILON {
                for &index in triangle {
                    accum[index as usize] += normal.normalize();
                }
            }
        }
        for (i, normal) in accum.into_iter().enumerate() {
            let normal = normal.normalize_or_zero();
            self.vertices[i * Self::STRIDE + 3..i * Self::STRIDE + 6]
                .copy_from_slice(&normal.to_array());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    pub name: Option<String>,
    pub children: Vec<usize>,
    pub rest: Transform,
    /// Indices into [`ModelAsset::meshes`].
    pub meshes: Vec<usize>,
    /// Index into [`ModelAsset::skins`] for skinned meshes.
    pub skin: Option<usize>,
}

/// Decoded model bundle: node hierarchy, meshes, skeletons, textures and
/// animation clips.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    pub name: String,
    pub nodes: Vec<ModelNode>,
    pub roots: Vec<usize>,
    pub meshes: Vec<MeshData>,
    pub skins: Vec<Skin>,
    pub textures: Vec<Arc<ImageData>>,
    pub clips: Vec<AnimationClip>,
}

impl ModelAsset {
    /// Model made of one root node carrying one mesh.
    pub fn single_mesh(name: impl Into<String>, mesh: MeshData) -> Self {
        Self {
            name: name.into(),
            nodes: vec![ModelNode {
                name: None,
                children: Vec::new(),
                rest: Transform::IDENTITY,
                meshes: vec![0],
                skin: None,
            }],
            roots: vec![0],
            meshes: vec![mesh],
            skins: Vec::new(),
            textures: Vec::new(),
            clips: Vec::new(),
        }
    }

    pub fn with_clips(mut self, clips: Vec<AnimationClip>) -> Self {
        self.clips = clips;
        self
    }

    pub fn rest_pose(&self) -> Vec<Transform> {
        self.nodes.iter().map(|node| node.rest).collect()
    }

    /// World matrix of every node for the given local pose.
    pub fn world_matrices(&self, root: Mat4, pose: &[Transform]) -> Vec<Mat4> {
        let mut world = vec![Mat4::IDENTITY; self.nodes.len()];
        let mut stack: Vec<(usize, Mat4)> = self.roots.iter().map(|&r| (r, root)).collect();
        while let Some((index, parent)) = stack.pop() {
            let Some(node) = self.nodes.get(index) else {
                continue;
            };
            let local = pose.get(index).unwrap_or(&node.rest).matrix();
            let matrix = parent * local;
            world[index] = matrix;
            stack.extend(node.children.iter().map(|&child| (child, matrix)));
        }
        world
    }

    /// Joint palette of a skinned node, given the world matrices of the
    /// current pose.
    pub fn joint_matrices(&self, node: &ModelNode, world: &[Mat4]) -> Option<Vec<Mat4>> {
        let skin = self.skins.get(node.skin?)?;
        Some(skin.joint_matrices(world))
    }

    /// Distance from the ray origin to the closest mesh hit, in world units.
    ///
    /// Skinned meshes are tested in their posed shape.
    pub fn raycast(&self, root: Mat4, pose: &[Transform], ray: &Ray) -> Option<f32> {
        let world = self.world_matrices(root, pose);
        let mut closest: Option<f32> = None;
        for (node, matrix) in self.nodes.iter().zip(&world) {
            if node.meshes.is_empty() {
                continue;
            }
            let palette = self.joint_matrices(node, &world);
            for &mesh in &node.meshes {
                let Some(data) = self.meshes.get(mesh) else {
                    continue;
                };
                let hit = match (&palette, &data.skin) {
                    (Some(palette), Some(_)) => data.raycast_skinned(palette, ray),
                    _ if matrix.determinant().abs() > 1e-12 => {
                        let local_ray = ray.transformed(&matrix.inverse());
                        data.raycast(&local_ray).map(|t| {
                            matrix
                                .transform_point3(local_ray.point_at(t))
                                .distance(ray.origin)
                        })
                    }
                    _ => None,
                };
                if let Some(distance) = hit {
                    closest = Some(closest.map_or(distance, |best| best.min(distance)));
                }
            }
        }
        closest
    }
}

/// A loaded model placed in the scene, with its current animation pose.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub asset: Arc<ModelAsset>,
    pub node: SceneNode,
    pub pose: Vec<Transform>,
}

impl ModelInstance {
    pub fn new(asset: Arc<ModelAsset>, node: SceneNode) -> Self {
        let pose = asset.rest_pose();
        Self { asset, node, pose }
    }

    pub fn world_matrices(&self) -> Vec<Mat4> {
        self.asset.world_matrices(self.node.matrix(), &self.pose)
    }

    /// Tests the ray against every mesh in the instance's subtree.
    pub fn raycast(&self, ray: &Ray) -> Option<f32> {
        self.asset.raycast(self.node.matrix(), &self.pose, ray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

    #[test]
    fn unit_cube_bounds_and_normals() {
        let cube = MeshData::unit_cube(WHITE);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(cube.bounds, Aabb::new(Vec3::splat(-0.5), Vec3::splat(0.5)));
        for chunk in cube.vertices.chunks_exact(MeshData::STRIDE) {
            assert!((Vec3::from_slice(&chunk[3..]).length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_normals_are_derived() {
        let mesh = MeshData::new(
            vec![
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
                0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
            ],
            vec![0, 1, 2],
            WHITE,
        );
        for chunk in mesh.vertices.chunks_exact(MeshData::STRIDE) {
            assert_eq!(Vec3::from_slice(&chunk[3..]), Vec3::Z);
        }
    }

    #[test]
    fn instance_raycast_respects_scene_transform() {
        let asset = Arc::new(ModelAsset::single_mesh("cube", MeshData::unit_cube(WHITE)));
        let node = SceneNode {
            position: Vec3::new(0.0, 0.0, -10.0),
            rotation: Vec3::ZERO,
            scale: Vec3::splat(4.0),
        };
        let instance = ModelInstance::new(asset, node);
        let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z);
        let distance = instance.raycast(&ray).unwrap();
        assert!((distance - 8.0).abs() < 1e-4);

        let miss = Ray::new(Vec3::new(3.0, 0.0, 0.0), Vec3::NEG_Z);
        assert_eq!(instance.raycast(&miss), None);
    }

    #[test]
    fn child_nodes_inherit_parent_transform() {
        let mut asset = ModelAsset::single_mesh("pair", MeshData::unit_cube(WHITE));
        asset.nodes[0].meshes.clear();
        asset.nodes[0].children.push(1);
        asset.nodes.push(ModelNode {
            name: Some("child".to_string()),
            children: Vec::new(),
            rest: Transform {
                translation: Vec3::new(2.0, 0.0, 0.0),
                ..Transform::IDENTITY
            },
            meshes: vec![0],
            skin: None,
        });
        let root = Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0));
        let world = asset.world_matrices(root, &asset.rest_pose());
        assert_eq!(world[1].transform_point3(Vec3::ZERO), Vec3::new(2.0, 5.0, 0.0));
    }

    /// A quad on node 0 skinned to a single joint on node 1, with the
    /// joint bound at (0, 1, 0).
    fn skinned_quad() -> ModelAsset {
        let mut quad = MeshData::new(
            vec![
                -0.5, -0.5, 0.0, 0.0, 0.0, 1.0, //
                0.5, -0.5, 0.0, 0.0, 0.0, 1.0, //
                0.5, 0.5, 0.0, 0.0, 0.0, 1.0, //
                -0.5, 0.5, 0.0, 0.0, 0.0, 1.0,
            ],
            vec![0, 1, 2, 0, 2, 3],
            WHITE,
        );
        quad = quad.with_skin(SkinWeights::new(vec![[0; 4]; 4], vec![[1.0, 0.0, 0.0, 0.0]; 4]));
        let mut asset = ModelAsset::single_mesh("rig", quad);
        asset.nodes[0].skin = Some(0);
        asset.nodes.push(ModelNode {
            name: Some("Hips".to_string()),
            children: Vec::new(),
            rest: Transform {
                translation: Vec3::Y,
                ..Transform::IDENTITY
            },
            meshes: Vec::new(),
            skin: None,
        });
        asset.roots.push(1);
        asset.skins.push(Skin {
            joints: vec![1],
            inverse_bind: vec![Mat4::from_translation(Vec3::NEG_Y)],
        });
        asset
    }

    #[test]
    fn skin_weights_are_normalized() {
        let skin = SkinWeights::new(
            vec![[0, 1, 0, 0], [0; 4]],
            vec![[3.0, 1.0, 0.0, 0.0], [0.0; 4]],
        );
        assert_eq!(skin.weights[0], [0.75, 0.25, 0.0, 0.0]);
        assert_eq!(skin.weights[1], [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn mismatched_vertex_streams_are_dropped() {
        let cube = MeshData::unit_cube(WHITE)
            .with_tex_coords(vec![[0.0, 0.0]; 3], Some(0))
            .with_skin(SkinWeights::new(vec![[0; 4]; 2], vec![[1.0, 0.0, 0.0, 0.0]; 2]));
        assert!(cube.tex_coords.is_empty());
        assert_eq!(cube.texture, None);
        assert_eq!(cube.skin, None);
    }

    #[test]
    fn bind_pose_leaves_skinned_vertices_in_place() {
        let asset = skinned_quad();
        let world = asset.world_matrices(Mat4::IDENTITY, &asset.rest_pose());
        let palette = asset.joint_matrices(&asset.nodes[0], &world).unwrap();
        let positions = asset.meshes[0].skinned_positions(&palette);
        assert_eq!(positions[2], Vec3::new(0.5, 0.5, 0.0));
    }

    #[test]
    fn raycast_follows_posed_joints() {
        let asset = skinned_quad();
        let mut pose = asset.rest_pose();
        pose[1].translation = Vec3::new(0.0, 4.0, 0.0);
        let ray_at_rest = Ray::new(Vec3::new(0.1, 0.2, 5.0), Vec3::NEG_Z);
        let ray_at_pose = Ray::new(Vec3::new(0.1, 3.2, 5.0), Vec3::NEG_Z);

        assert!(asset.raycast(Mat4::IDENTITY, &asset.rest_pose(), &ray_at_rest).is_some());
        assert_eq!(asset.raycast(Mat4::IDENTITY, &pose, &ray_at_rest), None);
        let distance = asset.raycast(Mat4::IDENTITY, &pose, &ray_at_pose).unwrap();
        assert!((distance - 5.0).abs() < 1e-5);
    }
}
