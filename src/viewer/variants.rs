//! The four renderable variants of a loaded model and their materials.
//!
//! Every variant owns its geometry and materials outright. Replacing the
//! model releases all materials of the old variants before the new ones are
//! attached, and the registry keeps count so leaks show up in tests.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::geometry::{ConditionalSegment, FlatMesh, LineSegment, WeldedMesh, extract_hard_edges};
use crate::import::LoadedModel;
use crate::import::loader::ShadedPart;
use crate::renderer::lines::LineMaterial;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaterialId(u64);

#[derive(Debug, Default)]
pub struct MaterialRegistry {
    next: u64,
    live: BTreeSet<MaterialId>,
    released: u64,
}

impl MaterialRegistry {
    pub fn alloc(&mut self) -> MaterialId {
        self.next += 1;
        let id = MaterialId(self.next);
        self.live.insert(id);
        id
    }

    /// Returns false for an id that was already released.
    pub fn release(&mut self, id: MaterialId) -> bool {
        let removed = self.live.remove(&id);
        if removed {
            self.released += 1;
        }
        removed
    }

    pub fn is_live(&self, id: MaterialId) -> bool {
        self.live.contains(&id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn released_count(&self) -> u64 {
        self.released
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariantKind {
    Textured,
    Background,
    HardEdges,
    ConditionalEdges,
}

#[derive(Clone, Debug)]
pub struct SurfacePart {
    pub mesh: FlatMesh,
    pub base_color: [f32; 4],
    pub material: MaterialId,
}

#[derive(Clone, Debug)]
pub enum VariantContent {
    /// The original meshes, lit with their base colors.
    Textured(Vec<SurfacePart>),
    /// The merged mesh in flat white, pushed back in depth so lines on its
    /// surface win the depth test.
    Background(SurfacePart),
    HardEdges {
        segments: Vec<LineSegment>,
        threshold: f32,
        material: LineMaterial,
    },
    ConditionalEdges {
        segments: Vec<ConditionalSegment>,
        material: LineMaterial,
    },
}

#[derive(Clone, Debug)]
pub struct ModelVariant {
    pub visible: bool,
    pub content: VariantContent,
}

impl ModelVariant {
    fn new(content: VariantContent) -> Self {
        Self {
            visible: true,
            content,
        }
    }

    pub fn kind(&self) -> VariantKind {
        match self.content {
            VariantContent::Textured(_) => VariantKind::Textured,
            VariantContent::Background(_) => VariantKind::Background,
            VariantContent::HardEdges { .. } => VariantKind::HardEdges,
            VariantContent::ConditionalEdges { .. } => VariantKind::ConditionalEdges,
        }
    }

    pub fn materials(&self) -> Vec<MaterialId> {
        match &self.content {
            VariantContent::Textured(parts) => parts.iter().map(|p| p.material).collect(),
            VariantContent::Background(part) => vec![part.material],
            VariantContent::HardEdges { material, .. }
            | VariantContent::ConditionalEdges { material, .. } => vec![material.id],
        }
    }

    pub fn line_material_mut(&mut self) -> Option<&mut LineMaterial> {
        match &mut self.content {
            VariantContent::HardEdges { material, .. }
            | VariantContent::ConditionalEdges { material, .. } => Some(material),
            VariantContent::Textured(_) | VariantContent::Background(_) => None,
        }
    }

    /// Releases every material this variant owns; returns how many.
    fn dispose(self, registry: &mut MaterialRegistry) -> usize {
        self.materials()
            .into_iter()
            .filter(|&id| registry.release(id))
            .count()
    }
}

#[derive(Clone, Debug)]
pub struct ModelVariants {
    pub textured: ModelVariant,
    pub background: ModelVariant,
    pub hard_edges: ModelVariant,
    pub conditional: ModelVariant,
}

impl ModelVariants {
    fn build(model: &LoadedModel, registry: &mut MaterialRegistry) -> Self {
        let parts = model
            .parts
            .iter()
            .map(|ShadedPart { mesh, base_color }| SurfacePart {
                mesh: mesh.clone(),
                base_color: *base_color,
                material: registry.alloc(),
            })
            .collect();

        Self {
            textured: ModelVariant::new(VariantContent::Textured(parts)),
            background: ModelVariant::new(VariantContent::Background(SurfacePart {
                mesh: model.flattened.mesh.clone(),
                base_color: [1.0; 4],
                material: registry.alloc(),
            })),
            hard_edges: ModelVariant::new(VariantContent::HardEdges {
                segments: model.hard_edges.clone(),
                threshold: model.threshold,
                material: LineMaterial::new(registry.alloc()),
            }),
            conditional: ModelVariant::new(VariantContent::ConditionalEdges {
                segments: model.conditional_edges.clone(),
                material: LineMaterial::new(registry.alloc()),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelVariant> {
        [&self.textured, &self.background, &self.hard_edges, &self.conditional].into_iter()
    }

    pub fn line_materials_mut(&mut self) -> impl Iterator<Item = &mut LineMaterial> {
        [&mut self.hard_edges, &mut self.conditional]
            .into_iter()
            .filter_map(ModelVariant::line_material_mut)
    }

    pub fn hard_edge_count(&self) -> usize {
        match &self.hard_edges.content {
            VariantContent::HardEdges { segments, .. } => segments.len(),
            _ => 0,
        }
    }

    pub fn conditional_edge_count(&self) -> usize {
        match &self.conditional.content {
            VariantContent::ConditionalEdges { segments, .. } => segments.len(),
            _ => 0,
        }
    }

    fn dispose(self, registry: &mut MaterialRegistry) -> usize {
        [self.textured, self.background, self.hard_edges, self.conditional]
            .into_iter()
            .map(|variant| variant.dispose(registry))
            .sum()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AttachReport {
    pub disposed: usize,
    pub live_after_dispose: usize,
}

/// The currently displayed model. Holds the welded mesh so the hard edges
/// can be re-extracted when the threshold moves.
#[derive(Debug, Default)]
pub struct Stage {
    registry: MaterialRegistry,
    variants: Option<ModelVariants>,
    welded: Option<WeldedMesh>,
    name: Option<String>,
    triangles: usize,
    content_revision: u64,
    edges_revision: u64,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the displayed model. The previous variants are disposed
    /// first; a failed load never reaches here, so the old model stays.
    pub fn attach(&mut self, model: LoadedModel) -> AttachReport {
        let mut report = AttachReport::default();
        if let Some(old) = self.variants.take() {
            report.disposed = old.dispose(&mut self.registry);
        }
        report.live_after_dispose = self.registry.live_count();

        let variants = ModelVariants::build(&model, &mut self.registry);
        info!(
            model = %model.name,
            disposed = report.disposed,
            materials = self.registry.live_count(),
            "attached model variants"
        );
        self.variants = Some(variants);
        self.triangles = model.flattened.mesh.triangle_count();
        self.name = Some(model.name);
        self.welded = Some(model.welded);
        self.content_revision += 1;
        self.edges_revision += 1;
        report
    }

    /// Re-runs hard-edge extraction at `threshold` and swaps the hard-edge
    /// variant's content, keeping its style. Returns the new edge count.
    pub fn rebuild_hard_edges(&mut self, threshold: f32) -> Option<usize> {
        let welded = self.welded.as_ref()?;
        let variants = self.variants.as_mut()?;
        let VariantContent::HardEdges {
            threshold: current,
            material,
            ..
        } = &variants.hard_edges.content
        else {
            return None;
        };
        if *current == threshold {
            return None;
        }
        let mut material = material.clone();

        let segments = extract_hard_edges(welded, threshold);
        let count = segments.len();
        self.registry.release(material.id);
        material.id = self.registry.alloc();

        variants.hard_edges.content = VariantContent::HardEdges {
            segments,
            threshold,
            material,
        };
        self.edges_revision += 1;
        debug!(threshold, edges = count, "rebuilt hard edges");
        Some(count)
    }

    pub fn variants(&self) -> Option<&ModelVariants> {
        self.variants.as_ref()
    }

    pub fn variants_mut(&mut self) -> Option<&mut ModelVariants> {
        self.variants.as_mut()
    }

    pub fn registry(&self) -> &MaterialRegistry {
        &self.registry
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles
    }

    /// Bumped whenever all variants are replaced.
    pub fn content_revision(&self) -> u64 {
        self.content_revision
    }

    /// Bumped whenever the hard-edge geometry changes.
    pub fn edges_revision(&self) -> u64 {
        self.edges_revision
    }
}
