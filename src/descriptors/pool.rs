//! Grows a chain of `vk::DescriptorPool`s on demand: try the current pool,
//! scan older pools for room, and only create a new pool as a last resort.

use ash::vk;

use crate::error::{VkError, VkResult};

#[derive(Debug, Clone)]
pub struct PoolSizes {
    pub sizes: Vec<vk::DescriptorPoolSize>,
    pub max_sets: u32,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            sizes: vec![
                vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER, descriptor_count: 256 },
                vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_BUFFER, descriptor_count: 256 },
                vk::DescriptorPoolSize { ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count: 256 },
            ],
            max_sets: 256,
        }
    }
}

pub struct DescriptorPoolAllocator {
    template: PoolSizes,
    pools: Vec<vk::DescriptorPool>,
    current: usize,
}

impl DescriptorPoolAllocator {
    pub fn new(device: &ash::Device, template: PoolSizes) -> VkResult<Self> {
        let first = create_pool(device, &template)?;
        Ok(Self { template, pools: vec![first], current: 0 })
    }

    /// Tries the current pool first; on `FRAGMENTED_POOL`/`OUT_OF_POOL_MEMORY`
    /// scans earlier pools for room, and only allocates a fresh pool once
    /// every existing one has been tried and failed.
    pub fn allocate(&mut self, device: &ash::Device, layouts: &[vk::DescriptorSetLayout]) -> VkResult<Vec<vk::DescriptorSet>> {
        if let Some(sets) = self.try_allocate_from(device, self.current, layouts) {
            return sets;
        }
        for i in 0..self.pools.len() {
            if i == self.current {
                continue;
            }
            if let Some(sets) = self.try_allocate_from(device, i, layouts) {
                self.current = i;
                return sets;
            }
        }

        let pool = create_pool(device, &self.template)?;
        self.pools.push(pool);
        self.current = self.pools.len() - 1;
        self.try_allocate_from(device, self.current, layouts)
            .unwrap_or(Err(VkError::FragmentedPool))
    }

    fn try_allocate_from(
        &self,
        device: &ash::Device,
        pool_index: usize,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Option<VkResult<Vec<vk::DescriptorSet>>> {
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pools[pool_index])
            .set_layouts(layouts);
        match unsafe { device.allocate_descriptor_sets(&info) } {
            Ok(sets) => Some(Ok(sets)),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) | Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => None,
            Err(e) => Some(Err(VkError::from(e))),
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// # Safety
    /// Every set allocated from these pools must no longer be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for pool in self.pools.drain(..) {
            unsafe { device.destroy_descriptor_pool(pool, None) };
        }
    }
}

fn create_pool(device: &ash::Device, template: &PoolSizes) -> VkResult<vk::DescriptorPool> {
    let info = vk::DescriptorPoolCreateInfo::default()
        .pool_sizes(&template.sizes)
        .max_sets(template.max_sets)
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);
    unsafe { device.create_descriptor_pool(&info, None) }.map_err(VkError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_sizes_are_nonempty() {
        let sizes = PoolSizes::default();
        assert!(!sizes.sizes.is_empty());
        assert!(sizes.max_sets > 0);
    }
}
