use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use serde_json::{Value, json};

use lineart::geometry::flatten_scene;
use lineart::import::gltf::{decode_gltf, split_glb};
use lineart::import::package::package_gltf;
use lineart::import::{ModelType, resolve_drop};
use lineart::import::ModelSource;

const PNG_STUB: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

fn quad_bin() -> Vec<u8> {
    let positions: [[f32; 3]; 4] = [
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
    let mut bin: Vec<u8> = bytemuck::cast_slice(&positions).to_vec();
    bin.extend_from_slice(bytemuck::cast_slice(&indices));
    bin
}

fn quad_gltf() -> Value {
    json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [1.0, 2.0, 0.0] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1 }] }],
        "buffers": [{ "uri": "quad%20data.bin", "byteLength": 60 }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 48, "target": 34962 },
            { "buffer": 0, "byteOffset": 48, "byteLength": 12, "target": 34963 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 4, "type": "VEC3" },
            { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
        ],
        "images": [{ "uri": "textures/albedo.png" }]
    })
}

fn write_folder(dir: &Path) {
    fs::write(dir.join("quad.gltf"), serde_json::to_vec_pretty(&quad_gltf()).unwrap()).unwrap();
    fs::write(dir.join("quad data.bin"), quad_bin()).unwrap();
    fs::create_dir(dir.join("textures")).unwrap();
    fs::write(dir.join("textures").join("albedo.png"), PNG_STUB).unwrap();
}

#[test]
fn packaged_folder_decodes_like_the_gltf() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path());

    let json_bytes = fs::read(dir.path().join("quad.gltf")).unwrap();
    let mut direct = decode_gltf(&json_bytes, Some(dir.path())).unwrap();

    let (name, glb) = package_gltf(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(name, "quad.gltf");
    let mut packaged = decode_gltf(&glb, None).unwrap();

    let direct = flatten_scene(&mut direct);
    let packaged = flatten_scene(&mut packaged);

    assert_eq!(direct.mesh.vertex_count(), 6);
    assert_eq!(direct.mesh.vertex_count(), packaged.mesh.vertex_count());
    for (a, b) in direct.mesh.positions.iter().zip(&packaged.mesh.positions) {
        assert_relative_eq!(a.x, b.x, epsilon = 1e-6);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-6);
        assert_relative_eq!(a.z, b.z, epsilon = 1e-6);
    }
    assert_relative_eq!(direct.translation.x, packaged.translation.x, epsilon = 1e-6);
    assert_relative_eq!(direct.translation.y, packaged.translation.y, epsilon = 1e-6);
}

#[test]
fn packaged_glb_embeds_images_in_the_bin_chunk() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path());

    let (_, glb) = package_gltf(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(glb.len() % 4, 0);

    let chunks = split_glb(&glb).unwrap();
    let json: Value = serde_json::from_slice(chunks.json).unwrap();
    let image = &json["images"][0];
    assert!(image.get("uri").is_none());
    assert_eq!(image["mimeType"], "image/png");

    let view = &json["bufferViews"][image["bufferView"].as_u64().unwrap() as usize];
    let offset = view["byteOffset"].as_u64().unwrap_or(0) as usize;
    let length = view["byteLength"].as_u64().unwrap() as usize;
    let bin = chunks.bin.unwrap();
    assert_eq!(&bin[offset..offset + length], PNG_STUB);
    assert_eq!(json["buffers"].as_array().unwrap().len(), 1);
}

#[test]
fn gltf_drop_resolves_to_an_in_memory_glb() {
    let dir = tempfile::tempdir().unwrap();
    write_folder(dir.path());

    let source = resolve_drop(&[dir.path().to_path_buf()], ModelType::Gltf).unwrap();
    match source {
        ModelSource::Memory { name, bytes, format } => {
            assert_eq!(name, "quad.gltf");
            assert_eq!(format, ModelType::Glb);
            assert!(lineart::import::gltf::is_glb(&bytes));
        }
        other => panic!("expected packaged bytes, got {other:?}"),
    }
}
