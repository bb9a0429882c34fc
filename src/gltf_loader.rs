//! Decodes binary glTF bundles into [`ModelAsset`]s.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3, Vec4};
use gltf::animation::util::ReadOutputs;
use gltf::animation::Interpolation as GltfInterpolation;
use gltf::image::Source;
use gltf::mesh::Mode;

use crate::animation::{AnimationClip, Channel, ChannelTarget, Interpolation};
use crate::assets::{AssetError, ImageData};
use crate::model::{MeshData, ModelAsset, ModelNode, Skin, SkinWeights, Transform};

/// Parses a `.glb` (or self-contained `.gltf`) bundle.
///
/// `label` names the bundle in errors and becomes the model name.
pub fn load_model(label: &str, bytes: &[u8]) -> Result<ModelAsset, AssetError> {
    let gltf_error = |source| AssetError::Gltf {
        path: label.to_string(),
        source,
    };
    let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(bytes).map_err(gltf_error)?;
    let buffers = gltf::import_buffers(&document, None, blob).map_err(gltf_error)?;
    let buffer_data = |buffer: gltf::Buffer<'_>| buffers.get(buffer.index()).map(|data| &data.0[..]);

    // Only images used as base colour are decoded.
    let base_color_images: HashSet<usize> = document
        .materials()
        .filter_map(|material| material.pbr_metallic_roughness().base_color_texture())
        .map(|info| info.texture().source().index())
        .collect();
    let mut textures = Vec::new();
    let mut texture_slots = HashMap::new();
    for image in document.images() {
        if !base_color_images.contains(&image.index()) {
            continue;
        }
        if let Some(decoded) = decode_image(label, &image, &buffers) {
            texture_slots.insert(image.index(), textures.len());
            textures.push(Arc::new(decoded));
        }
    }

    // Each glTF mesh may hold several primitives; they are flattened and the
    // owning node keeps the list of indices.
    let mut meshes = Vec::new();
    let mut mesh_primitives: Vec<Vec<usize>> = Vec::new();
    for mesh in document.meshes() {
        let mut indices = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != Mode::Triangles {
                log::debug!("{label}: skipping non-triangle primitive in mesh {}", mesh.index());
                continue;
            }
            let reader = primitive.reader(buffer_data);
            let Some(positions) = reader.read_positions() else {
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals: Vec<[f32; 3]> = reader
                .read_normals()
                .map(Iterator::collect)
                .unwrap_or_default();

            let mut vertices = Vec::with_capacity(positions.len() * MeshData::STRIDE);
            for (i, position) in positions.iter().enumerate() {
                vertices.extend_from_slice(position);
                vertices.extend_from_slice(&normals.get(i).copied().unwrap_or([0.0; 3]));
            }
            let triangle_indices: Vec<u32> = match reader.read_indices() {
                Some(read) => read.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };
            let material = primitive.material();
            let pbr = material.pbr_metallic_roughness();
            let base_color_texture = pbr.base_color_texture();
            let tex_coords: Vec<[f32; 2]> = base_color_texture
                .as_ref()
                .and_then(|info| reader.read_tex_coords(info.tex_coord()))
                .map(|coords| coords.into_f32().collect())
                .unwrap_or_default();
            let texture = base_color_texture
                .and_then(|info| texture_slots.get(&info.texture().source().index()).copied());

            let mut mesh = MeshData::new(vertices, triangle_indices, pbr.base_color_factor())
                .with_tex_coords(tex_coords, texture);
            if let (Some(joints), Some(weights)) = (reader.read_joints(0), reader.read_weights(0)) {
                mesh = mesh.with_skin(SkinWeights::new(
                    joints.into_u16().collect(),
                    weights.into_f32().collect(),
                ));
            }

            indices.push(meshes.len());
            meshes.push(mesh);
        }
        mesh_primitives.push(indices);
    }

    if meshes.is_empty() {
        return Err(AssetError::Empty {
            path: label.to_string(),
        });
    }

    let nodes: Vec<ModelNode> = document
        .nodes()
        .map(|node| {
            let (translation, rotation, scale) = node.transform().decomposed();
            ModelNode {
                name: node.name().map(str::to_string),
                children: node.children().map(|child| child.index()).collect(),
                rest: Transform {
                    translation: Vec3::from(translation),
                    rotation: Quat::from_array(rotation),
                    scale: Vec3::from(scale),
                },
                meshes: node
                    .mesh()
                    .and_then(|mesh| mesh_primitives.get(mesh.index()).cloned())
                    .unwrap_or_default(),
                skin: node.skin().map(|skin| skin.index()),
            }
        })
        .collect();

    let skins = document
        .skins()
        .map(|skin| {
            let joints: Vec<usize> = skin.joints().map(|joint| joint.index()).collect();
            if joints.len() > Skin::MAX_JOINTS {
                log::warn!(
                    "{label}: skin {} has {} joints; only the first {} deform the mesh",
                    skin.index(),
                    joints.len(),
                    Skin::MAX_JOINTS
                );
            }
            let inverse_bind = skin
                .reader(buffer_data)
                .read_inverse_bind_matrices()
                .map(|matrices| matrices.map(|m| Mat4::from_cols_array_2d(&m)).collect())
                .unwrap_or_default();
            Skin {
                joints,
                inverse_bind,
            }
        })
        .collect();

    let roots = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().map(|node| node.index()).collect(),
        None => {
            let children: HashSet<usize> =
                nodes.iter().flat_map(|node| node.children.iter().copied()).collect();
            (0..nodes.len()).filter(|index| !children.contains(index)).collect()
        }
    };

    let clips = document
        .animations()
        .map(|animation| {
            let name = animation
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("animation{}", animation.index()));
            let channels = animation
                .channels()
                .filter_map(|channel| {
                    let reader = channel.reader(buffer_data);
                    let times: Vec<f32> = reader.read_inputs()?.collect();
                    let (target, values): (ChannelTarget, Vec<Vec4>) =
                        match reader.read_outputs()? {
                            ReadOutputs::Translations(values) => (
                                ChannelTarget::Translation,
                                values.map(|v| Vec3::from(v).extend(0.0)).collect(),
                            ),
                            ReadOutputs::Rotations(values) => (
                                ChannelTarget::Rotation,
                                values.into_f32().map(Vec4::from).collect(),
                            ),
                            ReadOutputs::Scales(values) => (
                                ChannelTarget::Scale,
                                values.map(|v| Vec3::from(v).extend(0.0)).collect(),
                            ),
                            ReadOutputs::MorphTargetWeights(_) => return None,
                        };
                    Some(Channel {
                        node: channel.target().node().index(),
                        target,
                        interpolation: match channel.sampler().interpolation() {
                            GltfInterpolation::Step => Interpolation::Step,
                            GltfInterpolation::Linear => Interpolation::Linear,
                            GltfInterpolation::CubicSpline => Interpolation::CubicSpline,
                        },
                        times,
                        values,
                    })
                })
                .collect();
            AnimationClip::new(name, channels)
        })
        .collect();

    Ok(ModelAsset {
        name: label.to_string(),
        nodes,
        roots,
        meshes,
        skins,
        textures,
        clips,
    })
}

/// Decodes an image stored inside the bundle. External files are not
/// fetched.
fn decode_image(
    label: &str,
    image: &gltf::Image<'_>,
    buffers: &[gltf::buffer::Data],
) -> Option<ImageData> {
    match image.source() {
        Source::View { view, .. } => {
            let data = buffers.get(view.buffer().index())?;
            let bytes = data.0.get(view.offset()..view.offset() + view.length())?;
            ImageData::decode(bytes)
                .map_err(|err| log::warn!("{label}: texture image {} not decoded: {err}", image.index()))
                .ok()
        }
        Source::Uri { uri, .. } => {
            log::warn!("{label}: external texture image {uri} is not loaded");
            None
        }
    }
}
