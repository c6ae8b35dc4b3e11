//! Packs a dropped `.gltf` together with its sidecar files into one GLB.
//!
//! All referenced buffers are concatenated into the single BIN chunk and
//! every image becomes a buffer view inside it, so the result decodes
//! without touching the file system again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::gltf::{
    GLB_CHUNK_BIN, GLB_CHUNK_JSON, GLB_HEADER_LEN, GLB_MAGIC, GLB_VERSION, decode_data_uri,
    decode_uri_path, usize_field,
};
use crate::error::{PackageError, PackageResult};

/// Files gathered from a drop: the first `.gltf` document plus every other
/// file keyed by its lowercased file name.
#[derive(Debug, Default)]
pub struct DroppedBundle {
    pub gltf_name: String,
    pub gltf: Value,
    pub gltf_dir: Option<PathBuf>,
    pub blobs: HashMap<String, Vec<u8>>,
}

impl DroppedBundle {
    /// Bytes for a URI: data URIs are decoded in place, anything else is
    /// matched by file name against the dropped files, then against the
    /// `.gltf`'s own directory.
    pub fn resolve(&self, uri: &str) -> Option<Vec<u8>> {
        if uri.starts_with("data:") {
            return decode_data_uri(uri).map(|(_, bytes)| bytes);
        }
        let path = decode_uri_path(uri);
        let leaf = path.rsplit(['/', '\\']).next().unwrap_or(&path).to_lowercase();
        if let Some(bytes) = self.blobs.get(&leaf) {
            return Some(bytes.clone());
        }
        let dir = self.gltf_dir.as_ref()?;
        std::fs::read(dir.join(&path)).ok()
    }
}

/// Every regular file under the dropped paths, directories walked
/// recursively, in drop order.
pub fn collect_leaf_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        for entry in WalkDir::new(path).follow_links(true).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable drop entry: {e}"),
            }
        }
    }
    files
}

/// Reads all leaves concurrently and waits for every reader before
/// assembling the bundle.
pub fn read_bundle(paths: &[PathBuf]) -> PackageResult<DroppedBundle> {
    let files = collect_leaf_files(paths);
    let workers = std::thread::available_parallelism().map_or(4, |n| n.get()).max(1);
    let chunk_size = files.len().div_ceil(workers).max(1);

    let results: Vec<(PathBuf, std::io::Result<Vec<u8>>)> = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = files
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move |_| {
                    chunk
                        .iter()
                        .map(|path| (path.clone(), std::fs::read(path)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut out = Vec::with_capacity(files.len());
        for handle in handles {
            out.extend(handle.join().map_err(|_| PackageError::ReaderPanicked)?);
        }
        Ok::<_, PackageError>(out)
    })
    .map_err(|_| PackageError::ReaderPanicked)??;

    let mut bundle = DroppedBundle::default();
    let mut gltf: Option<(PathBuf, Vec<u8>)> = None;
    for (path, data) in results {
        let data = data.map_err(|source| PackageError::Io {
            path: path.clone(),
            source,
        })?;
        let is_gltf = extension_of(&path).as_deref() == Some("gltf");
        if is_gltf && gltf.is_none() {
            gltf = Some((path, data));
        } else if let Some(name) = path.file_name() {
            bundle
                .blobs
                .insert(name.to_string_lossy().to_lowercase(), data);
        }
    }

    let (gltf_path, gltf_bytes) = gltf.ok_or(PackageError::MissingGltf)?;
    bundle.gltf_name = gltf_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    bundle.gltf = serde_json::from_slice(&gltf_bytes).map_err(|source| PackageError::Json {
        name: bundle.gltf_name.clone(),
        source,
    })?;
    bundle.gltf_dir = gltf_path.parent().map(Path::to_path_buf);
    debug!(
        gltf = %bundle.gltf_name,
        sidecars = bundle.blobs.len(),
        "read dropped glTF bundle"
    );
    Ok(bundle)
}

/// Reads the dropped paths and packs them into GLB bytes.
pub fn package_gltf(paths: &[PathBuf]) -> PackageResult<(String, Vec<u8>)> {
    let bundle = read_bundle(paths)?;
    let name = bundle.gltf_name.clone();
    let glb = build_glb(bundle.gltf.clone(), |uri| bundle.resolve(uri))?;
    info!(gltf = %name, bytes = glb.len(), "packaged glTF as GLB");
    Ok((name, glb))
}

/// Rewrites `gltf` so that all buffers live in one BIN chunk and images are
/// embedded as buffer views, then serializes the GLB container.
///
/// Buffers that cannot be resolved are dropped along with their views and
/// every reference to those views. Images that cannot be resolved lose
/// their `uri` and carry no data.
pub fn build_glb(mut gltf: Value, resolve: impl Fn(&str) -> Option<Vec<u8>>) -> PackageResult<Vec<u8>> {
    let root = gltf.as_object_mut().ok_or(PackageError::NotAnObject)?;
    let mut bin: Vec<u8> = Vec::new();

    // Base offset of each original buffer inside the BIN chunk.
    let buffers = root
        .get("buffers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut bases: Vec<Option<usize>> = Vec::with_capacity(buffers.len());
    for (index, buffer) in buffers.iter().enumerate() {
        let data = buffer.get("uri").and_then(Value::as_str).and_then(|uri| resolve(uri));
        match data {
            Some(data) => {
                bases.push(Some(bin.len()));
                bin.extend_from_slice(&data);
                pad_to_four(&mut bin, 0);
            }
            None => {
                warn!(buffer = index, "buffer could not be resolved; dropping its views");
                bases.push(None);
            }
        }
    }

    let view_remap = rebase_buffer_views(root, &bases);
    remap_view_references(root, &view_remap);
    embed_images(root, &mut bin, &resolve);

    if bin.is_empty() {
        root.remove("buffers");
    } else {
        root.insert("buffers".into(), json!([{ "byteLength": bin.len() }]));
    }

    let mut json_bytes = serde_json::to_vec(&gltf).map_err(|source| PackageError::Json {
        name: "packaged glTF".into(),
        source,
    })?;
    pad_to_four(&mut json_bytes, b' ');

    let total = GLB_HEADER_LEN + 8 + json_bytes.len() + 8 + bin.len();
    let total_u32 = u32::try_from(total).map_err(|_| PackageError::TooLarge(total))?;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total_u32.to_le_bytes());
    out.extend_from_slice(&(json_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&GLB_CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_bytes);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&GLB_CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);
    Ok(out)
}

/// Moves every surviving view onto buffer 0 at its rebased offset and
/// returns the old-to-new view index map.
fn rebase_buffer_views(root: &mut Map<String, Value>, bases: &[Option<usize>]) -> Vec<Option<usize>> {
    let Some(Value::Array(views)) = root.remove("bufferViews") else {
        return Vec::new();
    };

    let mut remap = Vec::with_capacity(views.len());
    let mut kept = Vec::with_capacity(views.len());
    for (index, mut view) in views.into_iter().enumerate() {
        let base = usize_field(&view, "buffer").and_then(|b| bases.get(b).copied().flatten());
        let (Some(base), Some(fields)) = (base, view.as_object_mut()) else {
            debug!(view = index, "dropping buffer view of a missing buffer");
            remap.push(None);
            continue;
        };
        let offset = fields.get("byteOffset").and_then(Value::as_u64).unwrap_or(0) as usize;
        fields.insert("byteOffset".into(), json!(offset + base));
        fields.insert("buffer".into(), json!(0));
        remap.push(Some(kept.len()));
        kept.push(view);
    }
    root.insert("bufferViews".into(), Value::Array(kept));
    remap
}

fn remap_view_references(root: &mut Map<String, Value>, remap: &[Option<usize>]) {
    let lookup = |value: &Value| -> Option<usize> {
        usize_field(value, "bufferView").and_then(|v| remap.get(v).copied().flatten())
    };

    if let Some(Value::Array(accessors)) = root.get_mut("accessors") {
        for accessor in accessors.iter_mut() {
            let new_view = lookup(accessor);
            let Some(fields) = accessor.as_object_mut() else {
                continue;
            };
            if fields.contains_key("bufferView") {
                match new_view {
                    Some(view) => {
                        fields.insert("bufferView".into(), json!(view));
                    }
                    None => {
                        fields.remove("bufferView");
                        fields.remove("byteOffset");
                    }
                }
            }

            let sparse_views = fields.get("sparse").map(|sparse| {
                let indices = sparse.get("indices").and_then(|v| lookup(v));
                let values = sparse.get("values").and_then(|v| lookup(v));
                (indices, values)
            });
            match sparse_views {
                Some((Some(indices), Some(values))) => {
                    if let Some(sparse) = fields.get_mut("sparse") {
                        set_view(sparse, "indices", indices);
                        set_view(sparse, "values", values);
                    }
                }
                Some(_) => {
                    fields.remove("sparse");
                }
                None => {}
            }
        }
    }

    if let Some(Value::Array(images)) = root.get_mut("images") {
        for image in images.iter_mut() {
            let new_view = lookup(image);
            let Some(fields) = image.as_object_mut() else {
                continue;
            };
            if fields.contains_key("bufferView") {
                match new_view {
                    Some(view) => {
                        fields.insert("bufferView".into(), json!(view));
                    }
                    None => {
                        fields.remove("bufferView");
                    }
                }
            }
        }
    }
}

fn set_view(parent: &mut Value, key: &str, view: usize) {
    if let Some(fields) = parent.get_mut(key).and_then(Value::as_object_mut) {
        fields.insert("bufferView".into(), json!(view));
    }
}

fn embed_images(root: &mut Map<String, Value>, bin: &mut Vec<u8>, resolve: &impl Fn(&str) -> Option<Vec<u8>>) {
    let Some(Value::Array(mut images)) = root.remove("images") else {
        return;
    };
    let mut new_views = Vec::new();
    let first_view = root.get("bufferViews").map_or(0, |v| array_len(v));

    for (index, image) in images.iter_mut().enumerate() {
        let Some(fields) = image.as_object_mut() else {
            continue;
        };
        let Some(uri) = fields.get("uri").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        fields.remove("uri");
        let Some(data) = resolve(&uri) else {
            warn!(image = index, %uri, "image could not be resolved; omitting its data");
            continue;
        };

        new_views.push(json!({
            "buffer": 0,
            "byteOffset": bin.len(),
            "byteLength": data.len(),
        }));
        bin.extend_from_slice(&data);
        pad_to_four(bin, 0);

        fields.insert("bufferView".into(), json!(first_view + new_views.len() - 1));
        fields.insert("mimeType".into(), json!(mime_type(&uri)));
    }

    root.insert("images".into(), Value::Array(images));
    if !new_views.is_empty() {
        match root.get_mut("bufferViews") {
            Some(Value::Array(views)) => views.extend(new_views),
            _ => {
                root.insert("bufferViews".into(), Value::Array(new_views));
            }
        }
    }
}

/// MIME type by file extension; data URIs keep their declared type.
pub fn mime_type(uri: &str) -> String {
    if let Some(rest) = uri.strip_prefix("data:") {
        let declared = rest.split([';', ',']).next().unwrap_or_default();
        if !declared.is_empty() {
            return declared.to_string();
        }
    }
    let extension = uri.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "glsl" | "vert" | "vs" | "frag" | "fs" | "txt" => "text/plain",
        "dds" => "image/vnd-ms.dds",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn pad_to_four(bytes: &mut Vec<u8>, fill: u8) {
    while bytes.len() % 4 != 0 {
        bytes.push(fill);
    }
}

fn array_len(value: &Value) -> usize {
    value.as_array().map_or(0, Vec::len)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}
