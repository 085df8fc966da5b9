//! A `vk::Buffer` bound to an [`Allocation`] from the suballocator.

use ash::vk;

use crate::error::{VkError, VkResult};
use crate::memory::{Allocation, AllocationStrategy, Allocator, MemoryUsage};

pub struct BufferCreateOptions {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub sharing_mode: vk::SharingMode,
    pub memory_usage: MemoryUsage,
    pub strategy: AllocationStrategy,
}

impl Default for BufferCreateOptions {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            memory_usage: MemoryUsage::CpuOnly,
            strategy: AllocationStrategy::FirstFit,
        }
    }
}

pub struct ManagedBuffer {
    buffer: vk::Buffer,
    allocation: Allocation,
    size: u64,
    coherent: bool,
    destroyed: bool,
}

impl ManagedBuffer {
    pub fn create(device: &ash::Device, allocator: &Allocator, opts: &BufferCreateOptions) -> VkResult<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(opts.size)
            .usage(opts.usage)
            .sharing_mode(opts.sharing_mode);
        let buffer = unsafe { device.create_buffer(&create_info, None) }.map_err(VkError::from)?;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let allocation = match allocator.allocate(requirements, opts.memory_usage, opts.strategy, false) {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, allocation.memory, allocation.offset) } {
            allocator.free(&allocation);
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(VkError::from(e));
        }

        let coherent = allocator.memory_properties().memory_types[allocation.memory_type_index as usize]
            .property_flags
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT);

        Ok(Self { buffer, allocation, size: opts.size, coherent, destroyed: false })
    }

    pub fn raw(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// The buffer's mapped base pointer, or `None` if its backing memory is
    /// not host-visible. Exposed for callers (e.g. the glyph atlas) that
    /// need to hand a raw staging region to a caller-supplied fill callback
    /// rather than going through [`Self::write`].
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation.mapped_ptr
    }

    /// Copies `data` into the buffer's mapped region at `offset` and, for
    /// non-coherent memory, flushes the written range. Fails with
    /// [`VkError::MemoryMapFailed`] if the backing allocation was never
    /// mapped (the memory type is not host-visible).
    pub fn write(&self, device: &ash::Device, offset: u64, data: &[u8]) -> VkResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let base = self.allocation.mapped_ptr.ok_or(VkError::MemoryMapFailed)?;
        if offset + data.len() as u64 > self.size {
            return Err(VkError::MemoryMapFailed);
        }
        unsafe {
            let dst = base.add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        if !self.coherent {
            self.flush(device, offset, data.len() as u64)?;
        }
        Ok(())
    }

    pub fn flush(&self, device: &ash::Device, offset: u64, size: u64) -> VkResult<()> {
        let range = vk::MappedMemoryRange::default()
            .memory(self.allocation.memory)
            .offset(self.allocation.offset + offset)
            .size(size);
        unsafe { device.flush_mapped_memory_ranges(&[range]) }.map_err(VkError::from)
    }

    /// # Safety
    /// The buffer must not be referenced by any pending command buffer.
    pub unsafe fn destroy(&mut self, device: &ash::Device, allocator: &Allocator) {
        if self.destroyed {
            return;
        }
        unsafe { device.destroy_buffer(self.buffer, None) };
        allocator.free(&self.allocation);
        self.destroyed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_host_visible_coherent_and_first_fit() {
        let opts = BufferCreateOptions::default();
        assert_eq!(opts.strategy, AllocationStrategy::FirstFit);
        assert_eq!(opts.memory_usage, MemoryUsage::CpuOnly);
    }
}
