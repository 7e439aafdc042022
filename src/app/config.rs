//! Preview configuration
//!
//! Settings live in a TOML file in the platform config directory. Every
//! section and field has a default, so a partial file (or none at all) is
//! valid.
//!
//! ```toml
//! [runtime]
//! max_heap_size_mb = 256
//! timeout_ms = 5000
//! capture_console = true
//!
//! [capabilities]
//! react = true
//! timers = true
//! animation_frames = true
//! strict_modules = false
//!
//! [render]
//! max_render_passes = 25
//!
//! [output]
//! title = "Live Preview"
//! stylesheets = []
//! scripts = ["https://cdn.tailwindcss.com"]
//! ```

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::preview::{DocumentStyle, PreviewSandbox, TsxTransform, DEFAULT_MAX_RENDER_PASSES};
use crate::app::v8_bindings::{Capability, CapabilitySet, RuntimeConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub runtime: RuntimeSection,
    pub capabilities: CapabilitiesSection,
    pub render: RenderSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub max_heap_size_mb: usize,
    pub timeout_ms: u64,
    pub capture_console: bool,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            max_heap_size_mb: 256,
            timeout_ms: 5000,
            capture_console: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitiesSection {
    pub react: bool,
    pub timers: bool,
    pub animation_frames: bool,
    /// Throw on `require` of anything not granted instead of returning `{}`
    pub strict_modules: bool,
}

impl Default for CapabilitiesSection {
    fn default() -> Self {
        Self {
            react: true,
            timers: true,
            animation_frames: true,
            strict_modules: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSection {
    pub max_render_passes: u32,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            max_render_passes: DEFAULT_MAX_RENDER_PASSES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub title: String,
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
}

impl Default for OutputSection {
    fn default() -> Self {
        let style = DocumentStyle::default();
        Self {
            title: style.title,
            stylesheets: style.stylesheets,
            scripts: style.scripts,
        }
    }
}

impl PreviewConfig {
    /// `<config dir>/config.toml`, when the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "", "preview-sandbox")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load settings from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PreviewConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Save settings to a TOML file, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        log_info!("Preview config saved to {}", path.display());
        Ok(())
    }

    /// Load `path` (or the default location); a missing file gives defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    log_warn!("No config directory available, using default preview settings");
                    return Ok(Self::default());
                }
            },
        };

        if path.exists() {
            let config = Self::load_from_file(&path)?;
            log_info!("Loaded preview config from {}", path.display());
            Ok(config)
        } else {
            log_debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            max_heap_size_bytes: self.runtime.max_heap_size_mb.max(1) * 1024 * 1024,
            timeout: Duration::from_millis(self.runtime.timeout_ms.max(1)),
            capture_console: self.runtime.capture_console,
        }
    }

    pub fn capability_set(&self) -> CapabilitySet {
        let mut set = CapabilitySet::none().with_strict_modules(self.capabilities.strict_modules);
        if self.capabilities.react {
            set = set.with(Capability::ReactLibrary);
        }
        if self.capabilities.timers {
            set = set.with(Capability::Timers);
        }
        if self.capabilities.animation_frames {
            set = set.with(Capability::AnimationFrames);
        }
        set
    }

    pub fn document_style(&self) -> DocumentStyle {
        DocumentStyle {
            title: self.output.title.clone(),
            stylesheets: self.output.stylesheets.clone(),
            scripts: self.output.scripts.clone(),
        }
    }

    /// A sandbox built from these settings with the TSX transform
    pub fn build_sandbox(&self) -> PreviewSandbox {
        PreviewSandbox::with_settings(
            Box::new(TsxTransform::new()),
            self.runtime_config(),
            self.capability_set(),
        )
        .with_max_render_passes(self.render.max_render_passes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let config = PreviewConfig::default();
        assert_eq!(config.runtime_config(), RuntimeConfig::default());
        assert_eq!(config.capability_set(), CapabilitySet::rendering_library());
        assert_eq!(config.document_style(), DocumentStyle::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: PreviewConfig = toml::from_str("[runtime]\ntimeout_ms = 250\n").unwrap();
        assert_eq!(config.runtime.timeout_ms, 250);
        assert_eq!(config.runtime.max_heap_size_mb, 256);
        assert_eq!(config.render, RenderSection::default());
    }

    #[test]
    fn test_capability_flags() {
        let config: PreviewConfig =
            toml::from_str("[capabilities]\ntimers = false\nstrict_modules = true\n").unwrap();
        let set = config.capability_set();
        assert!(set.contains(Capability::ReactLibrary));
        assert!(!set.contains(Capability::Timers));
        assert!(set.strict_modules());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PreviewConfig::default();
        config.render.max_render_passes = 7;
        config.output.stylesheets.push("https://example.com/site.css".to_string());
        config.save_to_file(&path).unwrap();

        let loaded = PreviewConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PreviewConfig::load_or_default(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, PreviewConfig::default());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "runtime = 3").unwrap();
        let err = PreviewConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }
}
