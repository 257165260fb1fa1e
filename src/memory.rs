//! Buffer allocation behind a trait.
//!
//! Sizing and binding only need to ask for "a default-heap buffer of N bytes
//! that shaders may write". [`BufferAllocator`] is that request, so the binder can
//! run against the GPU in the application and against a recording allocator in
//! tests.

/// Memory pool a buffer is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeapType {
    /// Device local, not mappable.
    #[default]
    Default,
    /// Host writable staging memory.
    Upload,
    /// Host readable memory.
    Readback,
}

/// Access a buffer must allow beyond plain copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceFlags {
    #[default]
    None,
    /// Shaders may write the buffer.
    AllowUnorderedAccess,
}

/// Description of a buffer to allocate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub heap: HeapType,
    pub flags: ResourceFlags,
}

impl BufferDesc {
    /// A device local buffer that shaders can read and write.
    pub fn unordered_access(label: impl Into<String>, size: u64) -> Self {
        Self {
            label: label.into(),
            size,
            heap: HeapType::Default,
            flags: ResourceFlags::AllowUnorderedAccess,
        }
    }

    pub(crate) fn usages(&self) -> wgpu::BufferUsages {
        let mut usage = match self.heap {
            HeapType::Default => wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            HeapType::Upload => wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
            HeapType::Readback => wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        };
        if self.flags == ResourceFlags::AllowUnorderedAccess && self.heap == HeapType::Default {
            usage |= wgpu::BufferUsages::STORAGE;
        }
        usage
    }
}

/// Creates buffers on some device.
pub trait BufferAllocator {
    type Buffer: Clone;

    fn create_buffer(&mut self, desc: &BufferDesc) -> crate::Result<Self::Buffer>;
}

/// A byte range of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRange<B> {
    pub buffer: B,
    pub offset: u64,
    pub size: u64,
}

impl<B> BufferRange<B> {
    /// The whole of a buffer of `size` bytes.
    pub fn whole(buffer: B, size: u64) -> Self {
        Self {
            buffer,
            offset: 0,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unordered_access_buffers_are_storage() {
        let desc = BufferDesc::unordered_access("backing", 4096);
        let usage = desc.usages();
        assert!(usage.contains(wgpu::BufferUsages::STORAGE));
        assert!(usage.contains(wgpu::BufferUsages::COPY_DST));
        assert!(!usage.contains(wgpu::BufferUsages::MAP_READ));
    }

    #[test]
    fn upload_heaps_never_become_storage() {
        let desc = BufferDesc {
            label: "staging".into(),
            size: 256,
            heap: HeapType::Upload,
            flags: ResourceFlags::AllowUnorderedAccess,
        };
        assert!(!desc.usages().contains(wgpu::BufferUsages::STORAGE));
        assert!(desc.usages().contains(wgpu::BufferUsages::MAP_WRITE));
    }
}
