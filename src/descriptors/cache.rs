//! Content-addressed descriptor-set cache: a set is only rebuilt when its
//! layout, buffer binding, range, image view/layout, or sampler actually
//! changes (spec.md §4.7).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use parking_lot::Mutex;

use crate::descriptors::pool::DescriptorPoolAllocator;
use crate::error::{VkError, VkResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorKey {
    pub layout: vk::DescriptorSetLayout,
    pub buffer: Option<vk::Buffer>,
    pub range: Option<(u64, u64)>,
    pub image_view: Option<vk::ImageView>,
    pub sampler: Option<vk::Sampler>,
    pub image_layout: vk::ImageLayout,
}

impl DescriptorKey {
    /// Image view and sampler must be supplied together or not at all — a
    /// lone image view (no sampler) or lone sampler (no image view) is not
    /// a valid combined-image-sampler binding.
    pub fn new(
        layout: vk::DescriptorSetLayout,
        buffer: Option<vk::Buffer>,
        range: Option<(u64, u64)>,
        image_view: Option<vk::ImageView>,
        sampler: Option<vk::Sampler>,
        image_layout: vk::ImageLayout,
    ) -> VkResult<Self> {
        if image_view.is_some() != sampler.is_some() {
            return Err(VkError::FeatureNotPresent);
        }
        Ok(Self { layout, buffer, range, image_view, sampler, image_layout })
    }

    /// Binding index for the combined-image-sampler write: 1 if a uniform
    /// buffer also occupies binding 0, else 0.
    fn image_sampler_binding(&self) -> u32 {
        if self.buffer.is_some() {
            1
        } else {
            0
        }
    }
}

#[derive(Debug, Default)]
pub struct DescriptorCache {
    sets: Mutex<HashMap<DescriptorKey, vk::DescriptorSet>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self { sets: Mutex::new(HashMap::new()), hits: AtomicU64::new(0), misses: AtomicU64::new(0) }
    }

    /// Returns the cached set for `key`, or allocates one from
    /// `pool_allocator` and writes it. On a miss, builds up to two writes —
    /// a uniform buffer at binding 0 if `key.buffer` is set, a
    /// combined-image-sampler at [`DescriptorKey::image_sampler_binding`] if
    /// both `key.image_view` and `key.sampler` are set — and submits them in
    /// a single `update_descriptor_sets` call.
    pub fn get_or_create(
        &self,
        device: &ash::Device,
        pool_allocator: &mut DescriptorPoolAllocator,
        key: DescriptorKey,
    ) -> VkResult<vk::DescriptorSet> {
        if let Some(set) = self.sets.lock().get(&key).copied() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(set);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let set = pool_allocator.allocate(device, std::slice::from_ref(&key.layout))?[0];

        let buffer_info = key.buffer.map(|buffer| {
            let (offset, range) = key.range.unwrap_or((0, vk::WHOLE_SIZE));
            [vk::DescriptorBufferInfo { buffer, offset, range }]
        });
        let image_info = match (key.image_view, key.sampler) {
            (Some(image_view), Some(sampler)) => {
                Some([vk::DescriptorImageInfo { sampler, image_view, image_layout: key.image_layout }])
            }
            _ => None,
        };

        let mut writes = Vec::with_capacity(2);
        if let Some(info) = buffer_info.as_ref() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(info),
            );
        }
        if let Some(info) = image_info.as_ref() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(key.image_sampler_binding())
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(info),
            );
        }
        if !writes.is_empty() {
            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }

        self.sets.lock().insert(key, set);
        Ok(set)
    }

    pub fn invalidate(&self, key: &DescriptorKey) -> Option<vk::DescriptorSet> {
        self.sets.lock().remove(key)
    }

    pub fn clear(&self) {
        self.sets.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.sets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_layout(raw: u64) -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::from_raw(raw)
    }

    fn dummy_set(raw: u64) -> vk::DescriptorSet {
        vk::DescriptorSet::from_raw(raw)
    }

    fn dummy_image_key(raw: u64, buffer: Option<vk::Buffer>) -> DescriptorKey {
        DescriptorKey::new(
            dummy_layout(raw),
            buffer,
            None,
            Some(vk::ImageView::from_raw(raw)),
            Some(vk::Sampler::from_raw(raw)),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap()
    }

    #[test]
    fn image_view_without_sampler_is_rejected() {
        let err = DescriptorKey::new(
            dummy_layout(1),
            None,
            None,
            Some(vk::ImageView::from_raw(1)),
            None,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(err, VkError::FeatureNotPresent));
    }

    #[test]
    fn sampler_without_image_view_is_rejected() {
        let err = DescriptorKey::new(
            dummy_layout(1),
            None,
            None,
            None,
            Some(vk::Sampler::from_raw(1)),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(err, VkError::FeatureNotPresent));
    }

    #[test]
    fn matching_view_and_sampler_pair_is_accepted() {
        let key = DescriptorKey::new(
            dummy_layout(1),
            None,
            None,
            Some(vk::ImageView::from_raw(1)),
            Some(vk::Sampler::from_raw(1)),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(key.is_ok());
    }

    #[test]
    fn image_sampler_binding_is_zero_without_a_buffer_and_one_with_one() {
        assert_eq!(dummy_image_key(1, None).image_sampler_binding(), 0);
        assert_eq!(dummy_image_key(1, Some(vk::Buffer::from_raw(1))).image_sampler_binding(), 1);
    }

    #[test]
    fn distinct_keys_do_not_collide_in_the_map() {
        let key_a = DescriptorKey::new(dummy_layout(1), Some(vk::Buffer::from_raw(1)), Some((0, 64)), None, None, vk::ImageLayout::UNDEFINED)
            .unwrap();
        let key_b = DescriptorKey::new(dummy_layout(1), Some(vk::Buffer::from_raw(1)), Some((64, 64)), None, None, vk::ImageLayout::UNDEFINED)
            .unwrap();

        let cache = DescriptorCache::new();
        cache.sets.lock().insert(key_a, dummy_set(1));
        cache.sets.lock().insert(key_b, dummy_set(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidate_and_clear_operate_on_the_cached_map() {
        let key = DescriptorKey::new(dummy_layout(1), Some(vk::Buffer::from_raw(1)), Some((0, 64)), None, None, vk::ImageLayout::UNDEFINED)
            .unwrap();

        let cache = DescriptorCache::new();
        cache.sets.lock().insert(key, dummy_set(1));
        assert!(!cache.is_empty());

        assert_eq!(cache.invalidate(&key), Some(dummy_set(1)));
        assert!(cache.is_empty());

        cache.sets.lock().insert(key, dummy_set(2));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn hit_rate_reports_the_hit_fraction() {
        let cache = DescriptorCache::new();
        assert_eq!(cache.hit_rate(), 0.0);

        cache.misses.fetch_add(1, Ordering::Relaxed);
        cache.hits.fetch_add(1, Ordering::Relaxed);
        assert_eq!(cache.hit_rate(), 0.5);
    }
}
