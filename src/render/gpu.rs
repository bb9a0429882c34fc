use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat3, Mat4};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::assets::{AssetKind, ImageData};
use crate::model::{MeshData, Skin};
use crate::state::SceneState;

use super::common::{draw_list, CameraParams, LightParams};
use super::shaders::{BACKGROUND_SHADER, SCENE_SHADER};

#[cfg(not(target_arch = "wasm32"))]
const BACKENDS: wgpu::Backends = wgpu::Backends::PRIMARY;
#[cfg(target_arch = "wasm32")]
const BACKENDS: wgpu::Backends = wgpu::Backends::GL;

/// GPU renderer backed by wgpu that draws the loaded models over the
/// background image.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    pipeline: wgpu::RenderPipeline,
    global_buffer: wgpu::Buffer,
    global_bind_group: wgpu::BindGroup,
    object_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    texture_sampler: wgpu::Sampler,
    /// Bound for rigid meshes.
    identity_palette: wgpu::Buffer,
    /// Bound for untextured meshes.
    white_texture: wgpu::BindGroup,
    mesh_cache: HashMap<(AssetKind, usize), MeshBuffers>,
    texture_cache: HashMap<(AssetKind, usize), wgpu::BindGroup>,
    background: BackgroundPass,
}

impl Renderer {
    /// Initializes the GPU renderer for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: BACKENDS,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        #[cfg(not(target_arch = "wasm32"))]
        let required_limits = wgpu::Limits::default();
        #[cfg(target_arch = "wasm32")]
        let required_limits = wgpu::Limits::downlevel_webgl2_defaults();

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("showcase-device"),
            required_features: wgpu::Features::empty(),
            required_limits,
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| anyhow!("surface reports no supported formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene-shader"),
            source: wgpu::ShaderSource::Wgsl(SCENE_SHADER.into()),
        });

        let global_layout = uniform_layout::<GlobalUniform>(&device, "global-bind-layout");
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[
                uniform_entry(
                    0,
                    wgpu::ShaderStages::VERTEX_FRAGMENT,
                    std::mem::size_of::<ObjectConstants>(),
                ),
                uniform_entry(1, wgpu::ShaderStages::VERTEX, JointPalette::SIZE),
            ],
        });
        let texture_layout = texture_layout(&device, "material-bind-layout");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("scene-pipeline-layout"),
            bind_group_layouts: &[&global_layout, &object_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let global_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global-bind-group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("scene-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: (MeshData::STRIDE * std::mem::size_of::<f32>()) as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                                shader_location: 0,
                            },
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: (3 * std::mem::size_of::<f32>()) as u64,
                                shader_location: 1,
                            },
                        ],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x2,
                            offset: 0,
                            shader_location: 2,
                        }],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<SkinVertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Uint16x4,
                                offset: 0,
                                shader_location: 3,
                            },
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x4,
                                offset: std::mem::size_of::<[u16; 4]>() as u64,
                                shader_location: 4,
                            },
                        ],
                    },
                ],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let texture_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let identity_palette = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("identity-palette"),
            contents: bytes_of(&JointPalette::from_joints(&[])),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let white = ImageData {
            width: 1,
            height: 1,
            pixels: vec![255; 4],
        };
        let white_texture = create_texture_bind_group(
            &device,
            &queue,
            &texture_layout,
            &texture_sampler,
            &white,
            "white-texture",
        );

        let background = BackgroundPass::new(&device, surface_format);

        log::info!(
            "renderer ready: {} ({:?}), {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            size.width,
            size.height
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            pipeline,
            global_buffer,
            global_bind_group,
            object_layout,
            texture_layout,
            texture_sampler,
            identity_palette,
            white_texture,
            mesh_cache: HashMap::new(),
            texture_cache: HashMap::new(),
            background,
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Updates the camera and lighting uniforms before rendering.
    pub fn update_globals(&self, camera: &CameraParams, light: &LightParams) {
        let uniform = GlobalUniform {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            ambient: (light.ambient_color * light.ambient_intensity)
                .extend(1.0)
                .into(),
            light_position: light.position.extend(light.distance).into(),
            light_color: light.color.extend(light.intensity).into(),
            light_falloff: [light.decay, 0.0, 0.0, 0.0],
        };
        self.queue
            .write_buffer(&self.global_buffer, 0, bytes_of(&uniform));
    }

    /// Draws one frame of the scene.
    pub fn render(&mut self, state: &SceneState) -> Result<(), wgpu::SurfaceError> {
        let aspect = self.size.width as f32 / self.size.height.max(1) as f32;
        self.update_globals(
            &state.camera().params(aspect),
            &LightParams::from_scene(state.description()),
        );
        if let Some(image) = state.background() {
            self.background.upload(&self.device, &self.queue, image);
        }

        let draw_list = draw_list(state);
        for item in &draw_list {
            self.ensure_mesh_cached(state, item.kind, item.mesh);
            if let Some(texture) = item.texture {
                self.ensure_texture_cached(state, item.kind, texture);
            }
        }

        let mut bind_groups = Vec::with_capacity(draw_list.len());
        for item in &draw_list {
            let constants = ObjectConstants {
                model: item.model.to_cols_array_2d(),
                normal: mat3_to_3x4(item.normal_matrix()),
                color: item.color,
            };
            let object_buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("object-uniform"),
                    contents: bytes_of(&constants),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
            let palette_buffer = if item.joints.is_empty() {
                None
            } else {
                Some(
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("joint-palette"),
                            contents: bytes_of(&JointPalette::from_joints(&item.joints)),
                            usage: wgpu::BufferUsages::UNIFORM,
                        }),
                )
            };
            let palette = palette_buffer.as_ref().unwrap_or(&self.identity_palette);
            bind_groups.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.object_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: object_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: palette.as_entire_binding(),
                    },
                ],
                label: Some("object-bind-group"),
            }));
        }

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("showcase-encoder"),
            });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        self.background.draw(&mut pass);

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.global_bind_group, &[]);
        for (item, bind_group) in draw_list.iter().zip(bind_groups.iter()) {
            let Some(mesh) = self.mesh_cache.get(&(item.kind, item.mesh)) else {
                continue;
            };
            let material = item
                .texture
                .and_then(|texture| self.texture_cache.get(&(item.kind, texture)))
                .unwrap_or(&self.white_texture);
            pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            pass.set_vertex_buffer(1, mesh.tex_coords.slice(..));
            pass.set_vertex_buffer(2, mesh.skin.slice(..));
            pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(1, bind_group, &[]);
            pass.set_bind_group(2, material, &[]);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }

        drop(pass);
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn ensure_mesh_cached(&mut self, state: &SceneState, kind: AssetKind, mesh: usize) {
        if self.mesh_cache.contains_key(&(kind, mesh)) {
            return;
        }
        let Some(data) = state
            .model(kind)
            .and_then(|instance| instance.asset.meshes.get(mesh))
        else {
            return;
        };
        if data.indices.is_empty() {
            return;
        }
        let label = format!("{kind}-mesh-{mesh}");
        self.mesh_cache
            .insert((kind, mesh), MeshBuffers::from_mesh(&self.device, data, &label));
    }

    fn ensure_texture_cached(&mut self, state: &SceneState, kind: AssetKind, texture: usize) {
        if self.texture_cache.contains_key(&(kind, texture)) {
            return;
        }
        let Some(image) = state
            .model(kind)
            .and_then(|instance| instance.asset.textures.get(texture))
        else {
            return;
        };
        let bind_group = create_texture_bind_group(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.texture_sampler,
            image,
            &format!("{kind}-texture-{texture}"),
        );
        self.texture_cache.insert((kind, texture), bind_group);
    }
}

fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    size: usize,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size as u64),
        },
        count: None,
    }
}

fn uniform_layout<T>(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[uniform_entry(
            0,
            wgpu::ShaderStages::VERTEX_FRAGMENT,
            std::mem::size_of::<T>(),
        )],
    })
}

/// Sampled texture at binding 0 and its sampler at binding 1.
fn texture_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// Uploads an sRGB image, shrinking it first if the device cannot hold it.
fn create_texture_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    image: &ImageData,
    label: &str,
) -> wgpu::BindGroup {
    let max = device.limits().max_texture_dimension_2d;
    let fitted = image.fit_within(max);
    if fitted.is_some() {
        log::info!(
            "{label}: {}x{} exceeds the device limit of {max}; downscaling",
            image.width,
            image.height
        );
    }
    let image = fitted.as_ref().unwrap_or(image);

    let size = wgpu::Extent3d {
        width: image.width.max(1),
        height: image.height.max(1),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    if image.pixels.len() as u64 == 4 * u64::from(image.width) * u64::from(image.height) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
    } else {
        log::warn!("{label}: pixel data does not match {}x{}", image.width, image.height);
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    tex_coords: wgpu::Buffer,
    skin: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let tex_coords = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-uvs")),
            contents: bytemuck::cast_slice(&tex_coord_stream(mesh)),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let skin = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-skin")),
            contents: bytemuck::cast_slice(&skin_stream(mesh)),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            tex_coords,
            skin,
            index,
            index_count: mesh.indices.len() as u32,
        }
    }
}

/// Texture coordinates for every vertex, zero when the mesh has none.
fn tex_coord_stream(mesh: &MeshData) -> Vec<[f32; 2]> {
    if mesh.tex_coords.len() == mesh.vertex_count() {
        mesh.tex_coords.clone()
    } else {
        vec![[0.0; 2]; mesh.vertex_count()]
    }
}

/// Joint influences for every vertex. Rigid meshes follow joint 0 of the
/// identity palette.
fn skin_stream(mesh: &MeshData) -> Vec<SkinVertex> {
    match &mesh.skin {
        Some(skin) => skin
            .joints
            .iter()
            .zip(&skin.weights)
            .map(|(&joints, &weights)| SkinVertex { joints, weights })
            .collect(),
        None => vec![
            SkinVertex {
                joints: [0; 4],
                weights: [1.0, 0.0, 0.0, 0.0],
            };
            mesh.vertex_count()
        ],
    }
}

/// Full-screen layer drawn before the models once an image is uploaded.
struct BackgroundPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    bind_group: Option<wgpu::BindGroup>,
    uploaded: Option<Arc<ImageData>>,
}

impl BackgroundPass {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("background-shader"),
            source: wgpu::ShaderSource::Wgsl(BACKGROUND_SHADER.into()),
        });
        let layout = texture_layout(device, "background-bind-layout");
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("background-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("background-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_background"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_background"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("background-sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            pipeline,
            layout,
            sampler,
            bind_group: None,
            uploaded: None,
        }
    }

    /// Copies the image to the GPU the first time it is seen.
    fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, image: &Arc<ImageData>) {
        if self
            .uploaded
            .as_ref()
            .is_some_and(|uploaded| Arc::ptr_eq(uploaded, image))
        {
            return;
        }
        self.uploaded = Some(Arc::clone(image));
        if image.width == 0 || image.height == 0 {
            log::warn!("background image is empty; skipping");
            self.bind_group = None;
            return;
        }
        self.bind_group = Some(create_texture_bind_group(
            device,
            queue,
            &self.layout,
            &self.sampler,
            image,
            "background-texture",
        ));
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if let Some(bind_group) = &self.bind_group {
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GlobalUniform {
    view_proj: [[f32; 4]; 4],
    camera_position: [f32; 4],
    ambient: [f32; 4],
    light_position: [f32; 4],
    light_color: [f32; 4],
    light_falloff: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ObjectConstants {
    model: [[f32; 4]; 4],
    normal: [[f32; 4]; 3],
    color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SkinVertex {
    joints: [u16; 4],
    weights: [f32; 4],
}

/// Fixed-size joint array the scene shader indexes.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct JointPalette {
    joints: [[[f32; 4]; 4]; Skin::MAX_JOINTS],
}

impl JointPalette {
    const SIZE: usize = std::mem::size_of::<Self>();

    /// Joints past the limit are dropped; unused slots hold identity.
    fn from_joints(joints: &[Mat4]) -> Self {
        let mut palette = Self {
            joints: [Mat4::IDENTITY.to_cols_array_2d(); Skin::MAX_JOINTS],
        };
        for (slot, joint) in palette.joints.iter_mut().zip(joints) {
            *slot = joint.to_cols_array_2d();
        }
        palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_match_wgsl_sizes() {
        // mat4x4 + 5 x vec4
        assert_eq!(std::mem::size_of::<GlobalUniform>(), 64 + 5 * 16);
        // mat4x4 + mat3x4 + vec4
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 64 + 48 + 16);
    }

    #[test]
    fn vertex_streams_match_attribute_formats() {
        // Uint16x4 joints followed by Float32x4 weights.
        assert_eq!(std::mem::size_of::<SkinVertex>(), 8 + 16);
        assert_eq!(JointPalette::SIZE, Skin::MAX_JOINTS * 64);
    }

    #[test]
    fn rigid_meshes_get_default_streams() {
        let cube = MeshData::unit_cube([1.0; 4]);
        assert_eq!(tex_coord_stream(&cube).len(), 24);
        let skin = skin_stream(&cube);
        assert_eq!(skin.len(), 24);
        assert_eq!(skin[0].weights, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn palette_pads_with_identity() {
        let lifted = Mat4::from_translation(glam::Vec3::Y);
        let palette = JointPalette::from_joints(&[lifted]);
        assert_eq!(palette.joints[0], lifted.to_cols_array_2d());
        assert_eq!(palette.joints[1], Mat4::IDENTITY.to_cols_array_2d());
    }

    #[test]
    fn normal_columns_are_padded() {
        let padded = mat3_to_3x4(Mat3::from_diagonal(glam::Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(padded[1], [0.0, 2.0, 0.0, 0.0]);
        assert_eq!(padded[2][3], 0.0);
    }
}
