use bytemuck::{Pod, Zeroable};

use crate::geometry::{ConditionalSegment, FlatMesh, LineSegment};
use crate::renderer::lines::LineMaterial;

/// Vertices of the quad each line instance expands into.
pub const LINE_QUAD_VERTICES: u32 = 6;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SurfaceUniform {
    pub color: [f32; 4],
    /// 1.0 for the directional-light shading, 0.0 for flat color.
    pub lit: f32,
    pub _padding: [f32; 3],
}

impl SurfaceUniform {
    pub fn lit(color: [f32; 4]) -> Self {
        Self {
            color,
            lit: 1.0,
            _padding: [0.0; 3],
        }
    }

    pub fn flat(color: [f32; 4]) -> Self {
        Self {
            color,
            lit: 0.0,
            _padding: [0.0; 3],
        }
    }
}

fn uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    })
}

/// Vertex data plus style uniform of one shaded mesh.
pub struct MeshBuffers {
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl MeshBuffers {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        mesh: &FlatMesh,
        uniform: SurfaceUniform,
        label: &str,
    ) -> Self {
        let vertices = mesh.interleaved();
        let byte_len = std::mem::size_of_val(vertices.as_slice()).max(24);
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: byte_len as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if !vertices.is_empty() {
            queue.write_buffer(&vertex_buffer, 0, bytemuck::cast_slice(&vertices));
        }

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Surface Uniform Buffer"),
            size: std::mem::size_of::<SurfaceUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&uniform_buffer, 0, bytemuck::cast_slice(&[uniform]));
        let bind_group = uniform_bind_group(device, layout, &uniform_buffer, "Surface Bind Group");

        Self {
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            uniform_buffer,
            bind_group,
        }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.vertex_count == 0 {
            return;
        }
        pass.set_bind_group(1, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }

    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
        self.uniform_buffer.destroy();
    }
}

/// Instance buffer plus material uniform of one line model.
pub struct LineBuffers {
    instance_buffer: wgpu::Buffer,
    instance_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl LineBuffers {
    pub fn new<T: Pod>(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        instances: &[T],
        label: &str,
    ) -> Self {
        // Always room for one instance so the slice stays bindable.
        let byte_len = std::mem::size_of_val(instances).max(std::mem::size_of::<T>());
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: byte_len as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if !instances.is_empty() {
            queue.write_buffer(&instance_buffer, 0, bytemuck::cast_slice(instances));
        }

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Line Uniform Buffer"),
            size: std::mem::size_of::<crate::renderer::lines::LineUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = uniform_bind_group(device, layout, &uniform_buffer, "Line Bind Group");

        Self {
            instance_buffer,
            instance_count: instances.len() as u32,
            uniform_buffer,
            bind_group,
        }
    }

    pub fn write_material(&self, queue: &wgpu::Queue, material: &LineMaterial) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[material.uniform()]));
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.instance_count == 0 {
            return;
        }
        pass.set_bind_group(1, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, self.instance_buffer.slice(..));
        pass.draw(0..LINE_QUAD_VERTICES, 0..self.instance_count);
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    pub fn destroy(&self) {
        self.instance_buffer.destroy();
        self.uniform_buffer.destroy();
    }
}

pub fn mesh_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: 24,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
        ],
    }
}

pub fn segment_instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<LineSegment>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
        ],
    }
}

// start, end, control0, control1
const CONDITIONAL_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x3,
    1 => Float32x3,
    2 => Float32x3,
    3 => Float32x3,
];

pub fn conditional_instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<ConditionalSegment>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &CONDITIONAL_ATTRIBUTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_strides_match_geometry_types() {
        assert_eq!(segment_instance_layout().array_stride, 24);
        assert_eq!(conditional_instance_layout().array_stride, 48);
        assert_eq!(std::mem::size_of::<SurfaceUniform>(), 32);
    }

    #[test]
    fn conditional_attributes_follow_segment_fields() {
        let layout = conditional_instance_layout();
        let offsets: Vec<_> = layout.attributes.iter().map(|a| a.offset).collect();
        let locations: Vec<_> = layout.attributes.iter().map(|a| a.shader_location).collect();
        assert_eq!(offsets, [0, 12, 24, 36]);
        assert_eq!(locations, [0, 1, 2, 3]);
    }
}
