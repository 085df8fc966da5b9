//! Process-start configuration derived from the environment.
//!
//! Grounded in spirit (not in literal mechanism — see DESIGN.md for why
//! `once_cell` itself was dropped) on the teacher's single centralized
//! global in `logging/mod.rs` (`static LOG_STORE: OnceCell<...>`): one
//! place owns environment-derived state, handed down by the caller as an
//! explicit struct rather than re-read ad hoc throughout the crate.

use std::env;
use std::path::PathBuf;

/// `ZEUS_SAFE_OVERLAY=1|true` (case-insensitive) forces a conservative
/// presentation configuration: FIFO present mode, `B8G8R8A8_SRGB` with
/// `SRGB_NONLINEAR` color space, HDR extensions dropped, dynamic-rendering
/// dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SafeOverlayConfig {
    pub enabled: bool,
}

impl SafeOverlayConfig {
    /// Reads `ZEUS_SAFE_OVERLAY` once. Call this at startup and thread the
    /// result down explicitly; do not re-read the environment per call site.
    pub fn from_env() -> Self {
        let enabled = env::var("ZEUS_SAFE_OVERLAY")
            .map(|v| {
                let v = v.trim().to_ascii_lowercase();
                v == "1" || v == "true"
            })
            .unwrap_or(false);
        Self { enabled }
    }

    pub fn forced_present_mode(&self) -> Option<ash::vk::PresentModeKHR> {
        self.enabled.then_some(ash::vk::PresentModeKHR::FIFO)
    }

    pub fn forced_surface_format(&self) -> Option<ash::vk::SurfaceFormatKHR> {
        self.enabled.then_some(ash::vk::SurfaceFormatKHR {
            format: ash::vk::Format::B8G8R8A8_SRGB,
            color_space: ash::vk::ColorSpaceKHR::SRGB_NONLINEAR,
        })
    }

    /// Whether HDR and dynamic-rendering extensions should be dropped from
    /// the enabled-extension request before device creation.
    pub fn drops_advanced_extensions(&self) -> bool {
        self.enabled
    }
}

/// Directory for the persisted pipeline-cache blob: `$XDG_CACHE_HOME`, else
/// `$HOME/.cache`, else `/tmp/zeus-cache`. The file itself always lives at
/// `<dir>/pipeline.cache`.
pub fn pipeline_cache_dir() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg);
        }
    }
    if let Ok(home) = env::var("HOME") {
        if !home.is_empty() {
            return PathBuf::from(home).join(".cache");
        }
    }
    PathBuf::from("/tmp/zeus-cache")
}

pub fn pipeline_cache_path() -> PathBuf {
    pipeline_cache_dir().join("pipeline.cache")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment-variable mutation races across tests in the same binary;
    // serialize the handful of tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn safe_overlay_recognizes_case_insensitive_truthy_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        for v in ["1", "true", "TRUE", "True"] {
            env::set_var("ZEUS_SAFE_OVERLAY", v);
            assert!(SafeOverlayConfig::from_env().enabled, "{v} should enable overlay");
        }
        env::remove_var("ZEUS_SAFE_OVERLAY");
        assert!(!SafeOverlayConfig::from_env().enabled);
    }

    #[test]
    fn safe_overlay_forces_fifo_and_srgb() {
        let cfg = SafeOverlayConfig { enabled: true };
        assert_eq!(cfg.forced_present_mode(), Some(ash::vk::PresentModeKHR::FIFO));
        let fmt = cfg.forced_surface_format().unwrap();
        assert_eq!(fmt.format, ash::vk::Format::B8G8R8A8_SRGB);
        assert_eq!(fmt.color_space, ash::vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn disabled_overlay_forces_nothing() {
        let cfg = SafeOverlayConfig { enabled: false };
        assert_eq!(cfg.forced_present_mode(), None);
        assert_eq!(cfg.forced_surface_format(), None);
    }

    #[test]
    fn cache_dir_prefers_xdg_then_home_then_tmp() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("XDG_CACHE_HOME", "/custom/cache");
        assert_eq!(pipeline_cache_dir(), PathBuf::from("/custom/cache"));
        env::remove_var("XDG_CACHE_HOME");

        env::set_var("HOME", "/home/someone");
        assert_eq!(pipeline_cache_dir(), PathBuf::from("/home/someone/.cache"));
        env::remove_var("HOME");

        assert_eq!(pipeline_cache_dir(), PathBuf::from("/tmp/zeus-cache"));
    }
}
