//! Scene graph produced by the importers.
//!
//! Nodes are a tagged variant over group, mesh and light so every traversal is
//! an exhaustive match rather than attribute probing.

pub mod demo;

use glam::{Mat4, Vec3};

/// Raw vertex data of one imported primitive, in the node's local space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub colors: Option<Vec<[f32; 4]>>,
    pub indices: Option<Vec<u32>>,
}

impl MeshGeometry {
    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / 3,
            None => self.positions.len() / 3,
        }
    }

    /// Vertex ids of every triangle in draw order. Index triples that point
    /// past the vertex list are skipped, as is a trailing partial triangle.
    pub fn triangle_vertex_ids(&self) -> Vec<[usize; 3]> {
        let count = self.positions.len();
        match &self.indices {
            Some(indices) => indices
                .chunks_exact(3)
                .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
                .filter(|t| t.iter().all(|&i| i < count))
                .collect(),
            None => (0..count / 3).map(|t| [t * 3, t * 3 + 1, t * 3 + 2]).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeshNode {
    pub geometry: MeshGeometry,
    pub base_color: [f32; 4],
}

impl MeshNode {
    pub fn new(geometry: MeshGeometry) -> Self {
        Self {
            geometry,
            base_color: [0.8, 0.8, 0.8, 1.0],
        }
    }

    pub fn with_color(mut self, base_color: [f32; 4]) -> Self {
        self.base_color = base_color;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Group,
    Mesh(MeshNode),
    Light(Light),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub local: Mat4,
    /// Accumulated transform, valid after `update_world_transforms`.
    pub world: Mat4,
    pub kind: NodeKind,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            kind,
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, mesh: MeshNode) -> Self {
        Self::new(name, NodeKind::Mesh(mesh))
    }

    pub fn with_transform(mut self, local: Mat4) -> Self {
        self.local = local;
        self
    }

    pub fn with_translation(self, translation: Vec3) -> Self {
        self.with_transform(Mat4::from_translation(translation))
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    /// Recomputes `world` for this node and all descendants, top-down.
    pub fn update_world_transforms(&mut self) {
        self.update_world(Mat4::IDENTITY);
    }

    fn update_world(&mut self, parent: Mat4) {
        self.world = parent * self.local;
        let world = self.world;
        for child in &mut self.children {
            child.update_world(world);
        }
    }

    /// Depth-first, pre-order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a SceneNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    /// Every mesh node together with its world transform.
    pub fn meshes(&self) -> Vec<(Mat4, &MeshNode)> {
        let mut out = Vec::new();
        self.visit(&mut |node| match &node.kind {
            NodeKind::Mesh(mesh) => out.push((node.world, mesh)),
            NodeKind::Group | NodeKind::Light(_) => {}
        });
        out
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes()
            .iter()
            .map(|(_, mesh)| mesh.geometry.triangle_count())
            .sum()
    }
}
