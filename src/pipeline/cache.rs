//! Pipeline-cache blob persistence: load on construction, save on demand
//! (spec.md §4.10).

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use ash::vk;

use crate::error::{VkError, VkResult};

/// Bounds how much of an on-disk blob we'll trust as initial data. A blob
/// this large is either corrupt or not ours; falling back to an empty cache
/// is cheaper than OOM-ing on a bogus multi-gigabyte file.
const MAX_BLOB_SIZE: u64 = 16 * 1024 * 1024;

pub struct PipelineCache {
    raw: vk::PipelineCache,
    path: Option<PathBuf>,
    dirty: bool,
    destroyed: bool,
}

impl PipelineCache {
    /// Loads `path` (if given and readable, bounded at [`MAX_BLOB_SIZE`]) as
    /// initial data for `vkCreatePipelineCache`. A missing file, an
    /// oversized file, or one the driver rejects as foreign (different
    /// device/driver UUID) all fall back to an empty cache — the driver is
    /// trusted to validate its own header, so rejection is not distinguished
    /// from "no file" beyond the log line.
    pub fn load(device: &ash::Device, path: Option<&Path>) -> VkResult<Self> {
        let initial_data = path.and_then(|p| read_bounded(p, MAX_BLOB_SIZE));
        let had_initial_data = initial_data.is_some();

        let create_with = |data: &[u8]| -> VkResult<vk::PipelineCache> {
            let info = vk::PipelineCacheCreateInfo::default().initial_data(data);
            unsafe { device.create_pipeline_cache(&info, None) }.map_err(VkError::from)
        };

        let raw = match initial_data {
            Some(data) => match create_with(&data) {
                Ok(cache) => cache,
                Err(e) => {
                    tracing::warn!(
                        target: "zeus_vk::pipeline_cache",
                        error = ?e,
                        "driver rejected on-disk pipeline cache blob; falling back to empty cache"
                    );
                    create_with(&[])?
                }
            },
            None => create_with(&[])?,
        };

        tracing::info!(
            target: "zeus_vk::pipeline_cache",
            path = ?path,
            seeded_from_disk = had_initial_data,
            "pipeline cache ready"
        );

        Ok(Self { raw, path: path.map(Path::to_path_buf), dirty: !had_initial_data, destroyed: false })
    }

    pub fn raw(&self) -> vk::PipelineCache {
        self.raw
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Queries the cache's current byte blob and writes it atomically
    /// (write-then-rename would require a sibling temp path; the teacher's
    /// scope-guarded writes just truncate in place, which is sufficient
    /// since this file has exactly one writer per process). No-op if not
    /// dirty or no path is configured.
    pub fn persist(&mut self, device: &ash::Device) -> VkResult<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        let data = unsafe { device.get_pipeline_cache_data(self.raw) }.map_err(VkError::from)?;

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(target: "zeus_vk::pipeline_cache", error = %e, dir = %parent.display(), "failed to create pipeline cache directory");
                return Ok(());
            }
        }
        match fs::File::create(path).and_then(|mut f| f.write_all(&data)) {
            Ok(()) => {
                self.dirty = false;
                tracing::debug!(target: "zeus_vk::pipeline_cache", bytes = data.len(), path = %path.display(), "pipeline cache persisted");
            }
            Err(e) => {
                tracing::warn!(target: "zeus_vk::pipeline_cache", error = %e, path = %path.display(), "failed to write pipeline cache");
            }
        }
        Ok(())
    }

    /// # Safety
    /// No pipeline created against this cache may still be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.destroyed {
            return;
        }
        unsafe { device.destroy_pipeline_cache(self.raw, None) };
        self.destroyed = true;
    }
}

fn read_bounded(path: &Path, max_size: u64) -> Option<Vec<u8>> {
    let metadata = fs::metadata(path).ok()?;
    if metadata.len() > max_size {
        tracing::warn!(
            target: "zeus_vk::pipeline_cache",
            path = %path.display(),
            size = metadata.len(),
            max = max_size,
            "on-disk pipeline cache exceeds size bound; ignoring"
        );
        return None;
    }
    fs::read(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn read_bounded_rejects_oversized_files() {
        let dir = std::env::temp_dir().join(format!("zeus-vk-pcache-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("oversized.bin");
        {
            let mut f = fs::File::create(&path).unwrap();
            f.write_all(&vec![0u8; 128]).unwrap();
        }
        assert!(read_bounded(&path, 64).is_none());
        assert!(read_bounded(&path, 256).is_some());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn read_bounded_returns_none_for_missing_file() {
        assert!(read_bounded(Path::new("/nonexistent/zeus-vk-pipeline.cache"), MAX_BLOB_SIZE).is_none());
    }
}
