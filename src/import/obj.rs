use std::io::BufReader;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{LoadError, LoadResult};
use crate::scene::{MeshGeometry, MeshNode, SceneNode};

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    }
}

/// Loads an OBJ file; every object becomes one mesh child of the returned
/// group. Diffuse colors from a referenced `.mtl` are kept when it loads.
pub fn decode_obj_file(path: &Path) -> LoadResult<SceneNode> {
    let name = display_name(path);
    let (models, materials) =
        tobj::load_obj(path, &load_options()).map_err(|e| LoadError::Obj {
            name: name.clone(),
            details: e.to_string(),
        })?;

    let materials = materials.unwrap_or_else(|e| {
        warn!(path = %path.display(), "ignoring OBJ materials: {e}");
        Vec::new()
    });
    Ok(build_scene(name, models, &materials))
}

/// Loads OBJ text held in memory. Material libraries cannot be resolved.
pub fn decode_obj_bytes(name: &str, bytes: &[u8]) -> LoadResult<SceneNode> {
    let mut reader = BufReader::new(bytes);
    let (models, _) = tobj::load_obj_buf(&mut reader, &load_options(), |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })
    .map_err(|e| LoadError::Obj {
        name: name.to_string(),
        details: e.to_string(),
    })?;
    Ok(build_scene(name.to_string(), models, &[]))
}

fn build_scene(name: String, models: Vec<tobj::Model>, materials: &[tobj::Material]) -> SceneNode {
    let mut root = SceneNode::group(name);
    for model in models {
        let mesh = model.mesh;
        debug!(object = %model.name, triangles = mesh.indices.len() / 3, "OBJ object");

        let positions: Vec<[f32; 3]> = mesh
            .positions
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let normals = (mesh.normals.len() == mesh.positions.len()).then(|| {
            mesh.normals
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect()
        });
        let uvs = (!mesh.texcoords.is_empty()).then(|| {
            mesh.texcoords
                .chunks_exact(2)
                .map(|c| [c[0], c[1]])
                .collect()
        });

        let base_color = mesh
            .material_id
            .and_then(|id| materials.get(id))
            .and_then(|m| m.diffuse)
            .map_or([0.8, 0.8, 0.8, 1.0], |[r, g, b]| [r, g, b, 1.0]);

        let geometry = MeshGeometry {
            positions,
            normals,
            uvs,
            colors: None,
            indices: Some(mesh.indices),
        };
        root.add_child(SceneNode::mesh(
            model.name,
            MeshNode::new(geometry).with_color(base_color),
        ));
    }
    root
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
