//! Model sources, decoders and the background loader.

pub mod drop;
pub mod gltf;
pub mod loader;
pub mod obj;
pub mod package;

use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::info;

use crate::error::{LoadError, LoadResult};
use crate::scene::SceneNode;

pub use drop::resolve_drop;
pub use loader::{LoadInput, LoadOutcome, LoadedModel, ModelLoader};

/// The file format a drop is expected to contain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum ModelType {
    #[default]
    Gltf,
    Glb,
    Fbx,
    Obj,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [ModelType::Gltf, ModelType::Glb, ModelType::Fbx, ModelType::Obj];

    pub fn extension(self) -> &'static str {
        match self {
            ModelType::Gltf => "gltf",
            ModelType::Glb => "glb",
            ModelType::Fbx => "fbx",
            ModelType::Obj => "obj",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        Self::ALL.into_iter().find(|t| t.extension() == ext)
    }

    pub fn matches(self, path: &Path) -> bool {
        Self::from_path(path) == Some(self)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Something a decoder can read: a path on disk or bytes already in memory
/// (a packaged GLB, for instance).
#[derive(Clone, Debug, PartialEq)]
pub enum ModelSource {
    File(PathBuf),
    Memory {
        name: String,
        bytes: Vec<u8>,
        format: ModelType,
    },
}

impl ModelSource {
    pub fn name(&self) -> String {
        match self {
            ModelSource::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ModelSource::Memory { name, .. } => name.clone(),
        }
    }
}

/// Decodes `source` as `model_type`. glTF and GLB share one decoder that
/// sniffs the container, so a packaged GLB loads under either type.
pub fn decode(source: &ModelSource, model_type: ModelType) -> LoadResult<SceneNode> {
    let scene = match (model_type, source) {
        (ModelType::Fbx, _) => {
            return Err(LoadError::UnsupportedFormat(
                "FBX models cannot be decoded by this viewer".into(),
            ));
        }
        (ModelType::Gltf | ModelType::Glb, ModelSource::File(path)) => {
            let bytes = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
            gltf::decode_gltf(&bytes, path.parent())?
        }
        (ModelType::Gltf | ModelType::Glb, ModelSource::Memory { bytes, .. }) => {
            gltf::decode_gltf(bytes, None)?
        }
        (ModelType::Obj, ModelSource::File(path)) => obj::decode_obj_file(path)?,
        (ModelType::Obj, ModelSource::Memory { name, bytes, .. }) => {
            obj::decode_obj_bytes(name, bytes)?
        }
    };
    info!(
        model = %source.name(),
        %model_type,
        triangles = scene.triangle_count(),
        "decoded model"
    );
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_type_from_extension() {
        assert_eq!(ModelType::from_path(Path::new("a/B.GLTF")), Some(ModelType::Gltf));
        assert_eq!(ModelType::from_path(Path::new("m.obj")), Some(ModelType::Obj));
        assert_eq!(ModelType::from_path(Path::new("m.stl")), None);
        assert!(ModelType::Glb.matches(Path::new("x.glb")));
    }

    #[test]
    fn fbx_is_reported_as_unsupported() {
        let source = ModelSource::File(PathBuf::from("model.fbx"));
        assert!(matches!(
            decode(&source, ModelType::Fbx),
            Err(LoadError::UnsupportedFormat(_))
        ));
    }
}
