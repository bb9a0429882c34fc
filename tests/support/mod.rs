#![allow(dead_code)]

use std::path::Path;

/// A unit quad in the XY plane facing +Z, with optional named clips that
/// hold the node still.
pub fn quad_glb(clips: &[&str]) -> Vec<u8> {
    let mut bin = Vec::new();
    for value in [
        -0.5f32, -0.5, 0.0, 0.5, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0,
    ] {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    for index in [0u16, 1, 2, 0, 2, 3] {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    for time in [0.0f32, 1.0] {
        bin.extend_from_slice(&time.to_le_bytes());
    }
    for value in [0.0f32; 6] {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    assert_eq!(bin.len(), 92);

    let animations: Vec<String> = clips
        .iter()
        .map(|name| {
            format!(
                r#"{{"name": "{name}", "channels": [{{"sampler": 0, "target": {{"node": 0, "path": "translation"}}}}], "samplers": [{{"input": 2, "output": 3}}]}}"#
            )
        })
        .collect();
    let animations = if animations.is_empty() {
        String::new()
    } else {
        format!(r#", "animations": [{}]"#, animations.join(", "))
    };

    let json = format!(
        r#"{{
            "asset": {{"version": "2.0"}},
            "scene": 0,
            "scenes": [{{"nodes": [0]}}],
            "nodes": [{{"name": "Quad", "mesh": 0}}],
            "meshes": [{{"primitives": [{{"attributes": {{"POSITION": 0}}, "indices": 1}}]}}],
            "buffers": [{{"byteLength": 92}}],
            "bufferViews": [
                {{"buffer": 0, "byteOffset": 0, "byteLength": 48}},
                {{"buffer": 0, "byteOffset": 48, "byteLength": 12}},
                {{"buffer": 0, "byteOffset": 60, "byteLength": 8}},
                {{"buffer": 0, "byteOffset": 68, "byteLength": 24}}
            ],
            "accessors": [
                {{"bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3", "min": [-0.5, -0.5, 0], "max": [0.5, 0.5, 0]}},
                {{"bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR"}},
                {{"bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0], "max": [1]}},
                {{"bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3"}}
            ]{animations}
        }}"#
    );
    glb(&json, &bin)
}

fn glb(json: &str, bin: &[u8]) -> Vec<u8> {
    let mut json = json.as_bytes().to_vec();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }
    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(b"JSON");
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(b"BIN\0");
    out.extend_from_slice(&bin);
    out
}

/// Writes the stock asset layout under `root`.
pub fn write_assets(root: &Path) {
    let assets = root.join("assets");
    std::fs::create_dir_all(&assets).unwrap();
    std::fs::write(
        assets.join("Girl_threejs.glb"),
        quad_glb(&["tpose", "Run Look Back"]),
    )
    .unwrap();
    std::fs::write(assets.join("teddy_bear.glb"), quad_glb(&[])).unwrap();
    std::fs::write(assets.join("ball.glb"), quad_glb(&[])).unwrap();
    image::RgbaImage::from_pixel(2, 2, image::Rgba([40, 60, 90, 255]))
        .save(root.join("glass.png"))
        .unwrap();
}
