use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info};

use super::{ModelSource, ModelType, decode, resolve_drop};
use crate::error::{LoadError, LoadResult};
use crate::geometry::{
    ConditionalSegment, FlatMesh, FlattenedModel, LineSegment, WELD_EPSILON, WeldedMesh, bake_mesh,
    extract_conditional_edges, extract_hard_edges, flatten_scene,
};
use crate::scene::SceneNode;

pub enum LoadInput {
    /// Paths from one batch of drop events.
    Dropped(Vec<PathBuf>),
    Source(ModelSource),
    /// An already built scene, such as the demo model.
    Scene { name: String, scene: SceneNode },
}

pub struct LoadRequest {
    pub generation: u64,
    pub input: LoadInput,
    pub model_type: ModelType,
    pub threshold: f32,
}

/// One shaded part of the textured variant, already centered.
#[derive(Clone, Debug)]
pub struct ShadedPart {
    pub mesh: FlatMesh,
    pub base_color: [f32; 4],
}

/// Everything the stage needs to build the four variants of one model.
#[derive(Clone, Debug)]
pub struct LoadedModel {
    pub generation: u64,
    pub name: String,
    pub flattened: FlattenedModel,
    pub welded: WeldedMesh,
    pub parts: Vec<ShadedPart>,
    pub hard_edges: Vec<LineSegment>,
    pub threshold: f32,
    pub conditional_edges: Vec<ConditionalSegment>,
}

pub enum LoadOutcome {
    Loaded(Box<LoadedModel>),
    Failed { generation: u64, error: LoadError },
}

impl LoadOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            LoadOutcome::Loaded(model) => model.generation,
            LoadOutcome::Failed { generation, .. } => *generation,
        }
    }
}

/// Stamps requests so only the newest completion is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenerationGuard {
    latest: u64,
    settled: u64,
}

impl GenerationGuard {
    pub fn issue(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    /// True exactly once, for the completion of the latest request.
    pub fn accept(&mut self, generation: u64) -> bool {
        if generation == self.latest && generation > self.settled {
            self.settled = generation;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.settled < self.latest
    }

    pub fn latest(&self) -> u64 {
        self.latest
    }
}

enum LoaderCommand {
    Load(LoadRequest),
    Stop,
}

/// Decodes, flattens and extracts edges on a worker thread.
pub struct ModelLoader {
    tx_cmd: Sender<LoaderCommand>,
    rx_result: Receiver<LoadOutcome>,
    guard: GenerationGuard,
    last_error: Arc<Mutex<Option<String>>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ModelLoader {
    pub fn new() -> Self {
        let (tx_cmd, rx_cmd) = channel::unbounded::<LoaderCommand>();
        let (tx_result, rx_result) = channel::bounded::<LoadOutcome>(4);
        let last_error = Arc::new(Mutex::new(None));
        let last_error_clone = Arc::clone(&last_error);

        let thread_handle = thread::Builder::new()
            .name("model-loader".into())
            .spawn(move || loader_thread(rx_cmd, tx_result, last_error_clone))
            .map_err(|e| error!("failed to spawn model loader: {e}"))
            .ok();

        Self {
            tx_cmd,
            rx_result,
            guard: GenerationGuard::default(),
            last_error,
            thread_handle,
        }
    }

    /// Queues a load and returns its generation. Any earlier request still
    /// in flight becomes stale.
    pub fn request(&mut self, input: LoadInput, model_type: ModelType, threshold: f32) -> u64 {
        let generation = self.guard.issue();
        let request = LoadRequest {
            generation,
            input,
            model_type,
            threshold,
        };
        if self.thread_handle.is_none() || self.tx_cmd.send(LoaderCommand::Load(request)).is_err() {
            *self.last_error.lock() = Some(LoadError::LoaderStopped.to_string());
            self.guard.accept(generation);
        }
        generation
    }

    /// Next completion of the latest request, skipping stale ones.
    pub fn try_recv(&mut self) -> Option<LoadOutcome> {
        while let Ok(outcome) = self.rx_result.try_recv() {
            let generation = outcome.generation();
            if self.guard.accept(generation) {
                return Some(outcome);
            }
            debug!(generation, latest = self.guard.latest(), "discarding stale load");
        }
        None
    }

    pub fn is_loading(&self) -> bool {
        self.guard.is_pending()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn stop(&self) {
        let _ = self.tx_cmd.send(LoaderCommand::Stop);
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ModelLoader {
    fn drop(&mut self) {
        let _ = self.tx_cmd.send(LoaderCommand::Stop);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

fn loader_thread(
    rx_cmd: Receiver<LoaderCommand>,
    tx_result: Sender<LoadOutcome>,
    last_error: Arc<Mutex<Option<String>>>,
) {
    loop {
        let cmd = match rx_cmd.recv() {
            Ok(c) => c,
            Err(_) => return,
        };

        match cmd {
            LoaderCommand::Load(request) => {
                let generation = request.generation;
                let outcome = match build_model(request) {
                    Ok(model) => {
                        *last_error.lock() = None;
                        LoadOutcome::Loaded(Box::new(model))
                    }
                    Err(e) => {
                        error!(generation, "model load failed: {e}");
                        *last_error.lock() = Some(e.to_string());
                        LoadOutcome::Failed { generation, error: e }
                    }
                };
                if tx_result.send(outcome).is_err() {
                    return;
                }
            }
            LoaderCommand::Stop => return,
        }
    }
}

/// Runs the whole load pipeline synchronously: resolve, decode, flatten,
/// weld and extract both edge sets.
pub fn build_model(request: LoadRequest) -> LoadResult<LoadedModel> {
    let started = Instant::now();
    let LoadRequest {
        generation,
        input,
        model_type,
        threshold,
    } = request;

    let (name, mut scene) = match input {
        LoadInput::Scene { name, scene } => (name, scene),
        LoadInput::Source(source) => {
            let scene = decode_source(&source, model_type)?;
            (source.name(), scene)
        }
        LoadInput::Dropped(paths) => {
            let source = resolve_drop(&paths, model_type)?;
            let scene = decode_source(&source, model_type)?;
            (source.name(), scene)
        }
    };

    let flattened = flatten_scene(&mut scene);
    let parts = scene
        .meshes()
        .into_iter()
        .map(|(world, node)| {
            let mut mesh = bake_mesh(&node.geometry, world);
            mesh.translate(-flattened.translation);
            ShadedPart {
                mesh,
                base_color: node.base_color,
            }
        })
        .filter(|part| !part.mesh.is_empty())
        .collect();

    let welded = WeldedMesh::from_flat(&flattened.mesh, WELD_EPSILON);
    let hard_edges = extract_hard_edges(&welded, threshold);
    let conditional_edges = extract_conditional_edges(&welded);

    info!(
        generation,
        model = %name,
        triangles = flattened.mesh.triangle_count(),
        hard_edges = hard_edges.len(),
        conditional_edges = conditional_edges.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "model ready"
    );

    Ok(LoadedModel {
        generation,
        name,
        flattened,
        welded,
        parts,
        hard_edges,
        threshold,
        conditional_edges,
    })
}

// A packaged drop knows its own container format.
fn decode_source(source: &ModelSource, model_type: ModelType) -> LoadResult<SceneNode> {
    let model_type = match source {
        ModelSource::Memory { format, .. } => *format,
        ModelSource::File(_) => model_type,
    };
    decode(source, model_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::demo::demo_scene;
    use std::time::Duration;

    #[test]
    fn guard_accepts_only_the_latest_generation_once() {
        let mut guard = GenerationGuard::default();
        let first = guard.issue();
        let second = guard.issue();
        assert!(guard.is_pending());
        assert!(!guard.accept(first));
        assert!(guard.accept(second));
        assert!(!guard.accept(second));
        assert!(!guard.is_pending());
    }

    #[test]
    fn builds_demo_scene_synchronously() {
        let model = build_model(LoadRequest {
            generation: 1,
            input: LoadInput::Scene {
                name: "demo".into(),
                scene: demo_scene(),
            },
            model_type: ModelType::Gltf,
            threshold: 40.0,
        })
        .unwrap();
        assert_eq!(model.parts.len(), 2);
        assert!(!model.hard_edges.is_empty());
        assert!(model.conditional_edges.len() >= model.hard_edges.len());
    }

    #[test]
    fn failed_load_reports_its_generation() {
        let mut loader = ModelLoader::new();
        let generation = loader.request(
            LoadInput::Dropped(vec![PathBuf::from("/nonexistent/drop")]),
            ModelType::Obj,
            40.0,
        );

        let deadline = Instant::now() + Duration::from_secs(10);
        let outcome = loop {
            if let Some(outcome) = loader.try_recv() {
                break outcome;
            }
            assert!(Instant::now() < deadline, "loader did not answer");
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(outcome.generation(), generation);
        assert!(matches!(
            outcome,
            LoadOutcome::Failed {
                error: LoadError::NoMatchingFile { .. },
                ..
            }
        ));
        assert!(!loader.is_loading());
        assert!(loader.last_error().is_some());
    }

    #[test]
    fn superseded_loads_are_discarded() {
        let mut loader = ModelLoader::new();
        let scene = || LoadInput::Scene {
            name: "demo".into(),
            scene: demo_scene(),
        };
        loader.request(scene(), ModelType::Gltf, 40.0);
        let latest = loader.request(scene(), ModelType::Gltf, 40.0);

        let deadline = Instant::now() + Duration::from_secs(10);
        while loader.is_loading() {
            if let Some(outcome) = loader.try_recv() {
                assert_eq!(outcome.generation(), latest);
            }
            assert!(Instant::now() < deadline, "loader did not answer");
            thread::sleep(Duration::from_millis(5));
        }
    }
}
