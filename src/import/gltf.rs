//! glTF 2.0 decoding for `.gltf` (external or data-URI buffers) and `.glb`.
//!
//! Only what the line-art pipeline consumes is read: the node hierarchy with
//! its transforms, triangle primitives, base color factors and punctual
//! lights. Animation, skins and textures are ignored.

use std::borrow::Cow;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use glam::{Mat4, Quat, Vec3};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LoadError, LoadResult};
use crate::scene::{Light, LightKind, MeshGeometry, MeshNode, NodeKind, SceneNode};

pub const GLB_MAGIC: u32 = 0x46546C67; // "glTF"
pub const GLB_VERSION: u32 = 2;
pub const GLB_CHUNK_JSON: u32 = 0x4E4F534A; // "JSON"
pub const GLB_CHUNK_BIN: u32 = 0x004E4942; // "BIN\0"
pub const GLB_HEADER_LEN: usize = 12;

const BYTE: u64 = 5120;
const UNSIGNED_BYTE: u64 = 5121;
const SHORT: u64 = 5122;
const UNSIGNED_SHORT: u64 = 5123;
const UNSIGNED_INT: u64 = 5125;
const FLOAT: u64 = 5126;

const MODE_TRIANGLES: u64 = 4;
const MAX_NODE_DEPTH: usize = 256;
// Accessors with no buffer view are zero-filled; larger ones are rejected.
const MAX_UNBACKED_VALUES: usize = 1 << 26;

pub fn is_glb(bytes: &[u8]) -> bool {
    read_u32(bytes, 0) == Some(GLB_MAGIC)
}

/// The two chunks of a binary glTF container.
#[derive(Debug, Clone, Copy)]
pub struct GlbChunks<'a> {
    pub json: &'a [u8],
    pub bin: Option<&'a [u8]>,
}

pub fn split_glb(bytes: &[u8]) -> LoadResult<GlbChunks<'_>> {
    let invalid = |msg: &str| LoadError::InvalidGltf(msg.to_string());

    if read_u32(bytes, 0) != Some(GLB_MAGIC) {
        return Err(invalid("missing GLB magic"));
    }
    let version = read_u32(bytes, 4).ok_or_else(|| invalid("GLB header truncated"))?;
    if version != GLB_VERSION {
        return Err(LoadError::InvalidGltf(format!(
            "unsupported GLB version {version}"
        )));
    }
    let length = read_u32(bytes, 8).ok_or_else(|| invalid("GLB header truncated"))? as usize;
    if length > bytes.len() {
        return Err(invalid("GLB shorter than its declared length"));
    }

    let mut json = None;
    let mut bin = None;
    let mut offset = GLB_HEADER_LEN;
    while offset + 8 <= length {
        let (Some(chunk_len), Some(chunk_type)) = (read_u32(bytes, offset), read_u32(bytes, offset + 4))
        else {
            break;
        };
        let start = offset + 8;
        let end = start + chunk_len as usize;
        if end > length {
            return Err(invalid("GLB chunk runs past the end of the file"));
        }
        match chunk_type {
            GLB_CHUNK_JSON if json.is_none() => json = Some(&bytes[start..end]),
            GLB_CHUNK_BIN if bin.is_none() => bin = Some(&bytes[start..end]),
            _ => {}
        }
        offset = end;
    }

    Ok(GlbChunks {
        json: json.ok_or_else(|| invalid("GLB has no JSON chunk"))?,
        bin,
    })
}

/// Decodes `.gltf` JSON or a `.glb` container. External buffer URIs are
/// resolved against `base_dir`.
pub fn decode_gltf(bytes: &[u8], base_dir: Option<&Path>) -> LoadResult<SceneNode> {
    let (json, bin) = if is_glb(bytes) {
        let chunks = split_glb(bytes)?;
        (chunks.json, chunks.bin)
    } else {
        (bytes, None)
    };

    let root: Value =
        serde_json::from_slice(json).map_err(|e| LoadError::InvalidGltf(e.to_string()))?;
    let document = Document::load(root, bin, base_dir)?;
    document.scene()
}

struct Document<'a> {
    root: Value,
    buffers: Vec<Cow<'a, [u8]>>,
}

impl<'a> Document<'a> {
    fn load(root: Value, bin: Option<&'a [u8]>, base_dir: Option<&Path>) -> LoadResult<Self> {
        let mut buffers = Vec::new();
        for (index, buffer) in array(&root, "buffers").iter().enumerate() {
            let data = match buffer.get("uri").and_then(Value::as_str) {
                Some(uri) if uri.starts_with("data:") => {
                    let (_, bytes) = decode_data_uri(uri).ok_or_else(|| {
                        LoadError::InvalidGltf(format!("buffer {index} has a malformed data URI"))
                    })?;
                    Cow::Owned(bytes)
                }
                Some(uri) => {
                    let Some(dir) = base_dir else {
                        return Err(LoadError::InvalidGltf(format!(
                            "buffer {index} references {uri} but the model has no base directory"
                        )));
                    };
                    let path = dir.join(decode_uri_path(uri));
                    Cow::Owned(std::fs::read(&path).map_err(|e| LoadError::io(path, e))?)
                }
                None if index == 0 => Cow::Borrowed(bin.ok_or_else(|| {
                    LoadError::InvalidGltf("buffer 0 has no uri and there is no BIN chunk".into())
                })?),
                None => {
                    return Err(LoadError::InvalidGltf(format!("buffer {index} has no uri")));
                }
            };
            buffers.push(data);
        }
        debug!(buffers = buffers.len(), "loaded glTF buffers");
        Ok(Self { root, buffers })
    }

    fn scene(&self) -> LoadResult<SceneNode> {
        let scenes = array(&self.root, "scenes");
        let scene_index = usize_field(&self.root, "scene").unwrap_or(0);

        let (name, roots): (String, Vec<usize>) = match scenes.get(scene_index) {
            Some(scene) => (
                str_field(scene, "name").unwrap_or("glTF").to_string(),
                indices(scene, "nodes"),
            ),
            None => ("glTF".to_string(), self.parentless_nodes()),
        };

        let mut group = SceneNode::group(name);
        let mut path = Vec::new();
        for index in roots {
            group.add_child(self.node(index, &mut path)?);
        }
        Ok(group)
    }

    fn parentless_nodes(&self) -> Vec<usize> {
        let nodes = array(&self.root, "nodes");
        let mut has_parent = vec![false; nodes.len()];
        for node in nodes {
            for child in indices(node, "children") {
                if let Some(flag) = has_parent.get_mut(child) {
                    *flag = true;
                }
            }
        }
        (0..nodes.len()).filter(|&i| !has_parent[i]).collect()
    }

    fn node(&self, index: usize, path: &mut Vec<usize>) -> LoadResult<SceneNode> {
        let node = array(&self.root, "nodes")
            .get(index)
            .ok_or_else(|| LoadError::InvalidGltf(format!("node {index} does not exist")))?;
        if path.contains(&index) || path.len() >= MAX_NODE_DEPTH {
            return Err(LoadError::InvalidGltf(format!(
                "node hierarchy loops back to node {index}"
            )));
        }

        let name = str_field(node, "name")
            .map(str::to_string)
            .unwrap_or_else(|| format!("node{index}"));

        let mut out = if let Some(mesh_index) = usize_field(node, "mesh") {
            let mut primitives = self.mesh(mesh_index)?;
            match primitives.len() {
                1 => SceneNode::mesh(name, primitives.swap_remove(0)),
                _ => {
                    let mut group = SceneNode::group(name.clone());
                    for (i, primitive) in primitives.into_iter().enumerate() {
                        group.add_child(SceneNode::mesh(format!("{name}.{i}"), primitive));
                    }
                    group
                }
            }
        } else if let Some(light) = self.light(node) {
            SceneNode::new(name, NodeKind::Light(light))
        } else {
            SceneNode::group(name)
        };
        out.local = node_transform(node);

        path.push(index);
        for child in indices(node, "children") {
            out.add_child(self.node(child, path)?);
        }
        path.pop();
        Ok(out)
    }

    fn mesh(&self, index: usize) -> LoadResult<Vec<MeshNode>> {
        let mesh = array(&self.root, "meshes")
            .get(index)
            .ok_or_else(|| LoadError::InvalidGltf(format!("mesh {index} does not exist")))?;

        let mut out = Vec::new();
        for primitive in array(mesh, "primitives") {
            let mode = primitive.get("mode").and_then(Value::as_u64).unwrap_or(MODE_TRIANGLES);
            if mode != MODE_TRIANGLES {
                warn!(mesh = index, mode, "skipping non-triangle primitive");
                continue;
            }
            let attributes = primitive.get("attributes").unwrap_or(&Value::Null);
            let Some(position) = usize_field(attributes, "POSITION") else {
                warn!(mesh = index, "skipping primitive without POSITION");
                continue;
            };

            let positions = self.accessor(position)?.vectors::<3>();
            let normals = usize_field(attributes, "NORMAL")
                .map(|i| self.accessor(i).map(|a| a.vectors::<3>()))
                .transpose()?;
            let uvs = usize_field(attributes, "TEXCOORD_0")
                .map(|i| self.accessor(i).map(|a| a.vectors::<2>()))
                .transpose()?;
            let colors = usize_field(attributes, "COLOR_0")
                .map(|i| self.accessor(i).map(|a| a.colors()))
                .transpose()?;
            let indices = usize_field(primitive, "indices")
                .map(|i| self.accessor(i).map(|a| a.indices()))
                .transpose()?;

            let geometry = MeshGeometry {
                positions,
                normals,
                uvs,
                colors,
                indices,
            };
            let base_color = usize_field(primitive, "material")
                .and_then(|m| array(&self.root, "materials").get(m))
                .and_then(|m| m.get("pbrMetallicRoughness"))
                .and_then(|pbr| floats::<4>(pbr.get("baseColorFactor")))
                .unwrap_or([1.0; 4]);
            out.push(MeshNode::new(geometry).with_color(base_color));
        }
        Ok(out)
    }

    fn light(&self, node: &Value) -> Option<Light> {
        let index = node
            .pointer("/extensions/KHR_lights_punctual/light")
            .and_then(Value::as_u64)? as usize;
        let light = self
            .root
            .pointer("/extensions/KHR_lights_punctual/lights")?
            .as_array()?
            .get(index)?;
        let kind = match str_field(light, "type")? {
            "directional" => LightKind::Directional,
            "point" => LightKind::Point,
            "spot" => LightKind::Spot,
            _ => return None,
        };
        Some(Light {
            kind,
            color: floats::<3>(light.get("color")).unwrap_or([1.0; 3]),
            intensity: light.get("intensity").and_then(Value::as_f64).unwrap_or(1.0) as f32,
        })
    }

    fn accessor(&self, index: usize) -> LoadResult<Accessor> {
        let invalid = |msg: String| LoadError::InvalidGltf(format!("accessor {index}: {msg}"));
        let accessor = array(&self.root, "accessors")
            .get(index)
            .ok_or_else(|| invalid("does not exist".into()))?;

        let count = usize_field(accessor, "count").ok_or_else(|| invalid("missing count".into()))?;
        let components = match str_field(accessor, "type") {
            Some("SCALAR") => 1,
            Some("VEC2") => 2,
            Some("VEC3") => 3,
            Some("VEC4") | Some("MAT2") => 4,
            Some("MAT3") => 9,
            Some("MAT4") => 16,
            other => return Err(invalid(format!("unknown type {other:?}"))),
        };
        let component_type = accessor
            .get("componentType")
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid("missing componentType".into()))?;
        let format = ComponentFormat {
            component_type,
            size: component_size(component_type)
                .ok_or_else(|| invalid(format!("unknown componentType {component_type}")))?,
            normalized: accessor.get("normalized").and_then(Value::as_bool).unwrap_or(false),
        };

        let len = count
            .checked_mul(components)
            .ok_or_else(|| invalid(format!("count {count} is too large")))?;
        let backing = match usize_field(accessor, "bufferView") {
            Some(view) => {
                let (data, stride) = self.view(view)?;
                let offset = usize_field(accessor, "byteOffset").unwrap_or(0);
                let element = format.size * components;
                let stride = stride.unwrap_or(element);
                if stride < element {
                    return Err(invalid(format!("byteStride {stride} is shorter than one element")));
                }
                element_span(count, stride, element, offset)
                    .filter(|&end| end <= data.len())
                    .ok_or_else(|| invalid(format!("{count} elements do not fit its buffer view")))?;
                Some((data, stride, offset))
            }
            None if len > MAX_UNBACKED_VALUES => {
                return Err(invalid(format!("{count} elements without a buffer view")));
            }
            None => None,
        };

        // An accessor without a buffer view reads as zeros.
        let mut values = vec![0.0; len];
        if let Some((data, stride, offset)) = backing {
            for i in 0..count {
                for c in 0..components {
                    let at = offset + i * stride + c * format.size;
                    values[i * components + c] = format.read(data, at).ok_or_else(|| {
                        invalid("reads past the end of its buffer view".into())
                    })?;
                }
            }
        }

        if let Some(sparse) = accessor.get("sparse") {
            self.apply_sparse(sparse, &format, components, &mut values)
                .map_err(|e| invalid(e.to_string()))?;
        }

        Ok(Accessor { values, components })
    }

    fn apply_sparse(
        &self,
        sparse: &Value,
        format: &ComponentFormat,
        components: usize,
        values: &mut [f64],
    ) -> LoadResult<()> {
        let missing = || LoadError::InvalidGltf("incomplete sparse block".into());
        let count = usize_field(sparse, "count").ok_or_else(missing)?;
        let index_block = sparse.get("indices").ok_or_else(missing)?;
        let value_block = sparse.get("values").ok_or_else(missing)?;

        let index_type = index_block
            .get("componentType")
            .and_then(Value::as_u64)
            .ok_or_else(missing)?;
        let index_format = ComponentFormat {
            component_type: index_type,
            size: component_size(index_type).ok_or_else(missing)?,
            normalized: false,
        };
        let (index_data, _) = self.view(usize_field(index_block, "bufferView").ok_or_else(missing)?)?;
        let (value_data, _) = self.view(usize_field(value_block, "bufferView").ok_or_else(missing)?)?;
        let index_offset = usize_field(index_block, "byteOffset").unwrap_or(0);
        let value_offset = usize_field(value_block, "byteOffset").unwrap_or(0);

        for i in 0..count {
            let target = index_format
                .read(index_data, index_offset + i * index_format.size)
                .ok_or_else(missing)? as usize;
            for c in 0..components {
                let at = value_offset + (i * components + c) * format.size;
                let value = format.read(value_data, at).ok_or_else(missing)?;
                if let Some(slot) = values.get_mut(target * components + c) {
                    *slot = value;
                }
            }
        }
        Ok(())
    }

    fn view(&self, index: usize) -> LoadResult<(&[u8], Option<usize>)> {
        let invalid = |msg: &str| LoadError::InvalidGltf(format!("buffer view {index}: {msg}"));
        let view = array(&self.root, "bufferViews")
            .get(index)
            .ok_or_else(|| invalid("does not exist"))?;
        let buffer = usize_field(view, "buffer")
            .and_then(|b| self.buffers.get(b))
            .ok_or_else(|| invalid("references a missing buffer"))?;
        let offset = usize_field(view, "byteOffset").unwrap_or(0);
        let length = usize_field(view, "byteLength").ok_or_else(|| invalid("missing byteLength"))?;
        let data = offset
            .checked_add(length)
            .and_then(|end| buffer.get(offset..end))
            .ok_or_else(|| invalid("extends past the end of its buffer"))?;
        Ok((data, usize_field(view, "byteStride")))
    }
}

struct ComponentFormat {
    component_type: u64,
    size: usize,
    normalized: bool,
}

impl ComponentFormat {
    fn read(&self, data: &[u8], at: usize) -> Option<f64> {
        let bytes = data.get(at..at.checked_add(self.size)?)?;
        let value = match self.component_type {
            FLOAT => f32::from_le_bytes(bytes.try_into().ok()?) as f64,
            UNSIGNED_INT => u32::from_le_bytes(bytes.try_into().ok()?) as f64,
            UNSIGNED_SHORT => {
                let v = u16::from_le_bytes(bytes.try_into().ok()?) as f64;
                if self.normalized { v / 65535.0 } else { v }
            }
            SHORT => {
                let v = i16::from_le_bytes(bytes.try_into().ok()?) as f64;
                if self.normalized { (v / 32767.0).max(-1.0) } else { v }
            }
            UNSIGNED_BYTE => {
                let v = bytes[0] as f64;
                if self.normalized { v / 255.0 } else { v }
            }
            BYTE => {
                let v = bytes[0] as i8 as f64;
                if self.normalized { (v / 127.0).max(-1.0) } else { v }
            }
            _ => return None,
        };
        Some(value)
    }
}

fn component_size(component_type: u64) -> Option<usize> {
    match component_type {
        BYTE | UNSIGNED_BYTE => Some(1),
        SHORT | UNSIGNED_SHORT => Some(2),
        UNSIGNED_INT | FLOAT => Some(4),
        _ => None,
    }
}

/// Decoded accessor contents, one `f64` per component so `u32` indices
/// survive unchanged.
struct Accessor {
    values: Vec<f64>,
    components: usize,
}

impl Accessor {
    fn vectors<const N: usize>(&self) -> Vec<[f32; N]> {
        self.values
            .chunks_exact(self.components)
            .map(|chunk| std::array::from_fn(|i| chunk.get(i).copied().unwrap_or(0.0) as f32))
            .collect()
    }

    fn colors(&self) -> Vec<[f32; 4]> {
        self.values
            .chunks_exact(self.components)
            .map(|chunk| std::array::from_fn(|i| chunk.get(i).copied().unwrap_or(1.0) as f32))
            .collect()
    }

    fn indices(&self) -> Vec<u32> {
        self.values.iter().map(|&v| v as u32).collect()
    }
}

fn node_transform(node: &Value) -> Mat4 {
    if let Some(matrix) = floats::<16>(node.get("matrix")) {
        return Mat4::from_cols_array(&matrix);
    }
    let translation = floats::<3>(node.get("translation")).map_or(Vec3::ZERO, Vec3::from_array);
    let rotation = floats::<4>(node.get("rotation"))
        .map(|[x, y, z, w]| Quat::from_xyzw(x, y, z, w))
        .filter(|q| q.length_squared() > 0.0)
        .map_or(Quat::IDENTITY, Quat::normalize);
    let scale = floats::<3>(node.get("scale")).map_or(Vec3::ONE, Vec3::from_array);
    Mat4::from_scale_rotation_translation(scale, rotation, translation)
}

/// Splits a `data:` URI into its MIME type and decoded payload.
pub(crate) fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.split(';').next().unwrap_or_default().to_string();
    if header.ends_with(";base64") {
        STANDARD.decode(payload.trim()).ok().map(|bytes| (mime, bytes))
    } else {
        Some((mime, percent_decode(payload)))
    }
}

/// Relative URI to a file path, undoing `%XX` escapes.
pub(crate) fn decode_uri_path(uri: &str) -> String {
    String::from_utf8_lossy(&percent_decode(uri)).into_owned()
}

fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

/// End of the last element's bytes, or `None` on overflow.
fn element_span(count: usize, stride: usize, element: usize, offset: usize) -> Option<usize> {
    if count == 0 {
        return Some(offset);
    }
    (count - 1).checked_mul(stride)?.checked_add(element)?.checked_add(offset)
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let chunk = bytes.get(offset..offset + 4)?;
    Some(u32::from_le_bytes(chunk.try_into().ok()?))
}

pub(crate) fn array<'v>(value: &'v Value, key: &str) -> &'v [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub(crate) fn usize_field(value: &Value, key: &str) -> Option<usize> {
    value.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

fn str_field<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
    value.get(key).and_then(Value::as_str)
}

fn indices(value: &Value, key: &str) -> Vec<usize> {
    array(value, key)
        .iter()
        .filter_map(|v| v.as_u64().map(|v| v as usize))
        .collect()
}

fn floats<const N: usize>(value: Option<&Value>) -> Option<[f32; N]> {
    let items = value?.as_array()?;
    if items.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(out)
}
