use std::fs;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use glam::{Vec2, Vec3};

use lineart::LoadError;
use lineart::geometry::{WELD_EPSILON, WeldedMesh, extract_hard_edges, flatten_scene};
use lineart::import::loader::{LoadRequest, build_model};
use lineart::import::{LoadInput, LoadOutcome, LoadedModel, ModelLoader, ModelType};
use lineart::renderer::Camera;
use lineart::renderer::lines::pixel_width;
use lineart::scene::demo::{box_geometry, demo_scene};
use lineart::scene::{MeshNode, SceneNode};
use lineart::viewer::{FrameLoop, LineColor, ModelVariant, Stage, StyleEdit, StyleParams, VariantContent};

fn demo_model(generation: u64, threshold: f32) -> LoadedModel {
    build_model(LoadRequest {
        generation,
        input: LoadInput::Scene {
            name: "demo".into(),
            scene: demo_scene(),
        },
        model_type: ModelType::Gltf,
        threshold,
    })
    .unwrap()
}

fn cube_scene(offset: Vec3) -> SceneNode {
    SceneNode::group("root").with_child(
        SceneNode::mesh("cube", MeshNode::new(box_geometry(Vec3::ONE))).with_translation(offset),
    )
}

#[test]
fn flattening_bakes_transforms_and_recenters() {
    let mut moved = cube_scene(Vec3::new(1.0, 0.0, 0.0));
    let mut still = cube_scene(Vec3::ZERO);
    let moved = flatten_scene(&mut moved);
    let still = flatten_scene(&mut still);

    assert_eq!(moved.mesh.vertex_count(), 36);
    assert_eq!(moved.mesh.positions, still.mesh.positions);
    assert_relative_eq!(moved.translation.x, 1.0, epsilon = 1e-6);
    assert_relative_eq!(still.translation.length(), 0.0, epsilon = 1e-6);
}

#[test]
fn edge_count_never_grows_with_threshold() {
    let mut scene = demo_scene();
    let flattened = flatten_scene(&mut scene);
    let welded = WeldedMesh::from_flat(&flattened.mesh, WELD_EPSILON);

    let counts: Vec<usize> = (0..=120)
        .step_by(5)
        .map(|deg| extract_hard_edges(&welded, deg as f32).len())
        .collect();
    assert!(counts.windows(2).all(|w| w[0] >= w[1]), "{counts:?}");
    assert!(counts[0] >= extract_hard_edges(&welded, 90.0).len());
}

#[test]
fn resize_updates_line_resolution_in_the_same_frame() {
    let mut stage = Stage::new();
    stage.attach(demo_model(1, 40.0));
    let mut style = StyleParams::default();
    style.apply(StyleEdit {
        thickness: 3.0,
        ..StyleEdit::default()
    });
    let mut camera = Camera::default();
    let mut frames = FrameLoop::new();

    for resolution in [Vec2::new(800.0, 600.0), Vec2::new(1920.0, 1080.0)] {
        frames.tick(&mut stage, &style, &mut camera, resolution);
        let variants = stage.variants().unwrap();
        for variant in [&variants.hard_edges, &variants.conditional] {
            let material = match &variant.content {
                VariantContent::HardEdges { material, .. }
                | VariantContent::ConditionalEdges { material, .. } => material,
                _ => unreachable!(),
            };
            assert_eq!(material.resolution, resolution);
            assert_eq!(material.linewidth, 3.0);
            let width = pixel_width(Vec2::new(-0.2, 0.1), Vec2::new(0.5, -0.3), material.resolution, material.linewidth);
            assert_relative_eq!(width, 3.0, epsilon = 1e-3);
        }
        assert_relative_eq!(camera.aspect, resolution.x / resolution.y, epsilon = 1e-6);
    }
}

#[test]
fn panel_edit_reaches_materials_and_camera_in_the_same_frame() {
    let mut stage = Stage::new();
    stage.attach(demo_model(1, 40.0));
    let mut style = StyleParams::default();
    let mut camera = Camera::default();
    let mut frames = FrameLoop::new();
    let resolution = Vec2::new(1024.0, 768.0);
    frames.tick(&mut stage, &style, &mut camera, resolution);

    let edit = StyleEdit {
        line_color: LineColor([255, 0, 0]),
        thickness: 5.0,
        fov: 60.0,
        threshold: 80.0,
        ..style.edit()
    };
    let (change, report) = frames.tick_with_edit(&mut stage, &mut style, edit, &mut camera, resolution);
    assert!(change.any && change.threshold);
    assert_eq!(report.style_version, style.version());

    let variants = stage.variants().unwrap();
    assert_eq!(variants.hard_edge_count(), demo_model(2, 80.0).hard_edges.len());
    for variant in [&variants.hard_edges, &variants.conditional] {
        let material = match &variant.content {
            VariantContent::HardEdges { material, .. }
            | VariantContent::ConditionalEdges { material, .. } => material,
            _ => unreachable!(),
        };
        assert_eq!(material.color, LineColor([255, 0, 0]).to_linear());
        assert_eq!(material.linewidth, 5.0);
        assert_eq!(material.resolution, resolution);
    }
    assert_relative_eq!(camera.fov, 60.0_f32.to_radians(), epsilon = 1e-6);
}

#[test]
fn shader_toggle_swaps_visible_variants() {
    let mut stage = Stage::new();
    stage.attach(demo_model(1, 40.0));
    let mut style = StyleParams::default();
    let mut camera = Camera::default();
    let mut frames = FrameLoop::new();

    let report = frames.tick(&mut stage, &style, &mut camera, Vec2::new(640.0, 480.0));
    assert!(report.line_art);
    let variants = stage.variants().unwrap();
    assert!(!variants.textured.visible);
    assert!(variants.background.visible && variants.hard_edges.visible && variants.conditional.visible);

    style.apply(StyleEdit {
        use_shader: false,
        ..style.edit()
    });
    frames.tick(&mut stage, &style, &mut camera, Vec2::new(640.0, 480.0));
    let visible: Vec<bool> = stage.variants().unwrap().iter().map(|v| v.visible).collect();
    assert_eq!(visible, vec![true, false, false, false]);
}

#[test]
fn recentering_triggers_only_when_close_and_steady() {
    let mut stage = Stage::new();
    let style = StyleParams::default();
    let mut frames = FrameLoop::new();
    let resolution = Vec2::new(800.0, 600.0);

    let mut camera = Camera::default();
    camera.position = Vec3::new(0.0, 0.0, 0.9);
    camera.set_target(Vec3::ZERO);
    assert!(!frames.tick(&mut stage, &style, &mut camera, resolution).recentered);

    camera.position = Vec3::new(0.0, 0.0, 0.7);
    let report = frames.tick(&mut stage, &style, &mut camera, resolution);
    assert!(report.recentered);
    assert_relative_eq!(camera.target.z, 0.7 - 3.0 * 0.7, epsilon = 1e-5);

    // Far away: nothing happens however steady the camera is.
    let mut frames = FrameLoop::new();
    let mut camera = Camera::default();
    camera.position = Vec3::new(0.0, 0.0, 4.0);
    camera.set_target(Vec3::ZERO);
    frames.tick(&mut stage, &style, &mut camera, resolution);
    assert!(!frames.tick(&mut stage, &style, &mut camera, resolution).recentered);
    assert_eq!(camera.target, Vec3::ZERO);
}

#[test]
fn new_model_disposes_previous_materials_first() {
    let mut stage = Stage::new();
    stage.attach(demo_model(1, 40.0));
    let old: Vec<_> = stage
        .variants()
        .unwrap()
        .iter()
        .flat_map(ModelVariant::materials)
        .collect();

    let report = stage.attach(demo_model(2, 40.0));
    assert_eq!(report.disposed, old.len());
    assert_eq!(report.live_after_dispose, 0);
    assert!(old.iter().all(|&id| !stage.registry().is_live(id)));
}

#[test]
fn dropped_obj_loads_and_wrong_type_keeps_nothing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("tri.obj"),
        "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
    )
    .unwrap();

    let model = build_model(LoadRequest {
        generation: 1,
        input: LoadInput::Dropped(vec![dir.path().to_path_buf()]),
        model_type: ModelType::Obj,
        threshold: 40.0,
    })
    .unwrap();
    assert_eq!(model.name, "tri.obj");
    assert_eq!(model.hard_edges.len(), 3);

    let err = build_model(LoadRequest {
        generation: 2,
        input: LoadInput::Dropped(vec![dir.path().to_path_buf()]),
        model_type: ModelType::Glb,
        threshold: 40.0,
    })
    .err()
    .unwrap();
    assert!(matches!(err, LoadError::NoMatchingFile { extension: "glb" }));
}

fn wait_for(loader: &mut ModelLoader) -> LoadOutcome {
    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        if let Some(outcome) = loader.try_recv() {
            return outcome;
        }
        assert!(Instant::now() < deadline, "loader did not answer");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn loader_delivers_only_the_latest_request() {
    let mut loader = ModelLoader::new();
    let scene = |name: &str| LoadInput::Scene {
        name: name.into(),
        scene: demo_scene(),
    };
    let first = loader.request(scene("first"), ModelType::Gltf, 40.0);
    let second = loader.request(scene("second"), ModelType::Gltf, 40.0);
    assert!(second > first);
    assert!(loader.is_loading());

    match wait_for(&mut loader) {
        LoadOutcome::Loaded(model) => {
            assert_eq!(model.generation, second);
            assert_eq!(model.name, "second");
        }
        LoadOutcome::Failed { error, .. } => panic!("load failed: {error}"),
    }
    assert!(!loader.is_loading());
}

#[test]
fn failed_load_reports_and_keeps_stage() {
    let mut stage = Stage::new();
    stage.attach(demo_model(1, 40.0));
    let revision = stage.content_revision();

    let mut loader = ModelLoader::new();
    loader.request(LoadInput::Dropped(Vec::new()), ModelType::Fbx, 40.0);
    match wait_for(&mut loader) {
        LoadOutcome::Failed { error, .. } => {
            assert!(matches!(error, LoadError::NoMatchingFile { extension: "fbx" }));
        }
        LoadOutcome::Loaded(_) => panic!("empty drop must not load"),
    }
    assert!(loader.last_error().is_some());
    assert_eq!(stage.content_revision(), revision);
}
