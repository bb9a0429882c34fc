pub(crate) const SCENE_SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    // rgb = colour * intensity
    ambient: vec4<f32>,
    // w = range, 0 for unlimited
    light_position: vec4<f32>,
    // w = intensity
    light_color: vec4<f32>,
    // x = decay exponent
    light_falloff: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

// Rigid meshes bind an identity palette and weight joint 0 fully.
@group(1) @binding(1)
var<uniform> joint_palette: array<mat4x4<f32>, 128>;

@group(2) @binding(0)
var base_texture: texture_2d<f32>;

@group(2) @binding(1)
var base_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) joints: vec4<u32>,
    @location(4) weights: vec4<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

const INV_PI: f32 = 0.31830988618;

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    let skin = joint_palette[input.joints.x] * input.weights.x
        + joint_palette[input.joints.y] * input.weights.y
        + joint_palette[input.joints.z] * input.weights.z
        + joint_palette[input.joints.w] * input.weights.w;

    var out: VertexOutput;
    let world_position = object.model * skin * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let skinned_normal = (skin * vec4<f32>(input.normal, 0.0)).xyz;
    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * skinned_normal;

    out.normal = normalize(world_normal);
    out.uv = input.uv;
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let to_light = globals.light_position.xyz - input.world_pos;
    let distance = length(to_light);
    let light_dir = to_light / max(distance, 0.0001);

    var falloff = 1.0 / max(pow(distance, globals.light_falloff.x), 0.01);
    let range = globals.light_position.w;
    if (range > 0.0) {
        let window = clamp(1.0 - pow(distance / range, 4.0), 0.0, 1.0);
        falloff = falloff * window * window;
    }

    let normal = normalize(input.normal);
    let direct = max(dot(normal, light_dir), 0.0) * falloff * globals.light_color.w;
    let irradiance = globals.ambient.rgb + globals.light_color.rgb * direct;
    let albedo = object.color * textureSample(base_texture, base_sampler, input.uv);
    let lit_color = albedo.rgb * INV_PI * irradiance;
    return vec4<f32>(lit_color, albedo.a);
}
"#;

/// Full-screen triangle sampling the background image, stretched to fit.
pub(crate) const BACKGROUND_SHADER: &str = r#"
@group(0) @binding(0)
var background_texture: texture_2d<f32>;

@group(0) @binding(1)
var background_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_background(@builtin(vertex_index) index: u32) -> VertexOutput {
    let corner = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(corner * 2.0 - 1.0, 1.0, 1.0);
    out.uv = vec2<f32>(corner.x, 1.0 - corner.y);
    return out;
}

@fragment
fn fs_background(input: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(background_texture, background_sampler, input.uv);
}
"#;
