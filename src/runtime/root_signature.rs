//! The global root signature: bind group 0 of every node.

use std::sync::Arc;

use crate::error::Result;
use crate::gpu::GpuContext;
use crate::state_object::{RootParameter, RootSignatureDesc};

/// Constants shared by every node of a dispatch.
///
/// # WGSL Declaration
///
/// ```wgsl
/// struct RootConstants {
///     resolution: vec2f,
///     time: f32,
///     _pad: f32,
/// }
/// @group(0) @binding(0) var<uniform> root: RootConstants;
/// ```
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RootConstants {
    /// Render target resolution in pixels `[width, height]`.
    pub resolution: [f32; 2],
    /// Seconds since the session started.
    pub time: f32,
    pub _pad: f32,
}

struct Inner {
    desc: RootSignatureDesc,
    buffers: Vec<wgpu::Buffer>,
    bind_group: wgpu::BindGroup,
}

/// A created root signature with its constant buffers bound.
///
/// Clones share the same GPU objects.
#[derive(Clone)]
pub struct RootSignature {
    inner: Arc<Inner>,
}

impl RootSignature {
    pub fn new(gpu: &GpuContext, desc: &RootSignatureDesc) -> Result<Self> {
        gpu.scoped("global root signature", |device| {
            let layout = layout(device, desc);
            let buffers: Vec<wgpu::Buffer> = desc
                .parameters
                .iter()
                .map(|RootParameter::ConstantBuffer { binding, size }| {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(&format!("Root Constants b{binding}")),
                        size: *size,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    })
                })
                .collect();
            let entries: Vec<wgpu::BindGroupEntry<'_>> = desc
                .parameters
                .iter()
                .zip(&buffers)
                .map(|(RootParameter::ConstantBuffer { binding, .. }, buffer)| {
                    wgpu::BindGroupEntry {
                        binding: *binding,
                        resource: buffer.as_entire_binding(),
                    }
                })
                .collect();
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Global Root Signature"),
                layout: &layout,
                entries: &entries,
            });
            Inner {
                desc: desc.clone(),
                buffers,
                bind_group,
            }
        })
        .map(|inner| Self {
            inner: Arc::new(inner),
        })
    }

    pub fn desc(&self) -> &RootSignatureDesc {
        &self.inner.desc
    }

    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.inner.bind_group
    }

    /// Uploads `constants` to the first constant buffer parameter.
    pub fn write_constants(&self, queue: &wgpu::Queue, constants: &RootConstants) {
        if let Some(buffer) = self.inner.buffers.first() {
            queue.write_buffer(buffer, 0, bytemuck::bytes_of(constants));
        }
    }
}

/// Bind group layout for `desc`, visible to every stage a node can run in.
pub(crate) fn layout(device: &wgpu::Device, desc: &RootSignatureDesc) -> wgpu::BindGroupLayout {
    let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
        .parameters
        .iter()
        .map(|RootParameter::ConstantBuffer { binding, .. }| wgpu::BindGroupLayoutEntry {
            binding: *binding,
            visibility: wgpu::ShaderStages::COMPUTE
                | wgpu::ShaderStages::VERTEX
                | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect();
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Global Root Signature Layout"),
        entries: &entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_constants_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<RootConstants>(), 16);
        let constants = RootConstants {
            resolution: [720.0, 720.0],
            time: 1.5,
            _pad: 0.0,
        };
        let bytes = bytemuck::bytes_of(&constants);
        assert_eq!(&bytes[8..12], &1.5f32.to_ne_bytes());
    }
}
