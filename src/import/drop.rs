use std::path::PathBuf;

use tracing::debug;

use super::package::{collect_leaf_files, package_gltf};
use super::{ModelSource, ModelType};
use crate::error::{LoadError, LoadResult};

/// Turns one batch of dropped paths into a loadable source.
///
/// For `gltf` the whole drop is packaged into a GLB so sidecar buffers and
/// images travel with it. For every other type the first dropped file with
/// the matching extension is used.
pub fn resolve_drop(paths: &[PathBuf], model_type: ModelType) -> LoadResult<ModelSource> {
    if model_type == ModelType::Gltf {
        let (name, bytes) = package_gltf(paths)?;
        return Ok(ModelSource::Memory {
            name,
            bytes,
            format: ModelType::Glb,
        });
    }

    let file = collect_leaf_files(paths)
        .into_iter()
        .find(|path| model_type.matches(path))
        .ok_or(LoadError::NoMatchingFile {
            extension: model_type.extension(),
        })?;
    debug!(path = %file.display(), "resolved dropped model");
    Ok(ModelSource::File(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackageError;

    #[test]
    fn first_matching_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.obj");
        let b = dir.path().join("b.obj");
        let readme = dir.path().join("readme.txt");
        for path in [&a, &b, &readme] {
            std::fs::write(path, "").unwrap();
        }

        let source = resolve_drop(&[readme.clone(), b.clone(), a.clone()], ModelType::Obj).unwrap();
        assert_eq!(source, ModelSource::File(b));
    }

    #[test]
    fn directories_are_searched() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("model.GLB"), b"glTF").unwrap();

        let source = resolve_drop(&[dir.path().to_path_buf()], ModelType::Glb).unwrap();
        assert_eq!(source, ModelSource::File(nested.join("model.GLB")));
    }

    #[test]
    fn no_match_is_a_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.obj");
        std::fs::write(&path, "").unwrap();

        let err = resolve_drop(&[path.clone()], ModelType::Glb).unwrap_err();
        assert!(matches!(err, LoadError::NoMatchingFile { extension: "glb" }));

        let err = resolve_drop(&[path], ModelType::Gltf).unwrap_err();
        assert!(matches!(err, LoadError::Package(PackageError::MissingGltf)));
    }
}
