//! Boot Configuration
//!
//! Decides which XR runtime backend the runner drives and what the session
//! creates at startup.
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables: `VOID_XR_BACKEND=stub`, `VOID_XR_DEBUG=1`
//! 2. Config file: `$VOID_XR_CONFIG`, `./void-xr.toml`, `/etc/void-xr/void-xr.toml`
//! 3. Auto-detection of an installed OpenXR runtime
//!
//! # Example Config File
//!
//! ```toml
//! backend = "openxr"       # openxr, stub, auto
//! app_name = "viewer"
//! api_version = "1.0.34"
//! event_policy = "ignore"  # ignore, fail
//!
//! [[session.swapchains]]
//! name = "color"
//! format = 37
//! width = 2048
//! height = 2048
//!
//! [[session.spaces]]
//! name = "stage"
//! type = "stage"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use void_xr::{formats, ContextCreation, ReferenceSpaceSpec, ReferenceSpaceType, SessionConfig, SwapchainSpec, UnknownEventPolicy, Version};

const CONFIG_ENV: &str = "VOID_XR_CONFIG";
const CONFIG_PATHS: [&str; 2] = ["void-xr.toml", "/etc/void-xr/void-xr.toml"];

/// Errors raised while reading the boot configuration
#[derive(Debug, Error)]
pub enum BootError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid api_version: {0}")]
    Version(String),
}

/// XR runtime backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// System OpenXR loader and runtime
    OpenXr,

    /// Simulated runtime walking the session lifecycle on its own
    Stub,

    /// OpenXR when a runtime is installed and compiled in, stub otherwise
    #[default]
    Auto,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenXr => write!(f, "openxr"),
            Self::Stub => write!(f, "stub"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openxr" | "xr" => Ok(Self::OpenXr),
            "stub" | "sim" | "simulated" => Ok(Self::Stub),
            "auto" | "" => Ok(Self::Auto),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Complete boot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    pub backend: Backend,
    pub debug: bool,
    pub app_name: String,
    pub app_version: u32,
    /// OpenXR API version requested at instance creation
    pub api_version: String,
    /// Extra instance extensions
    pub extensions: Vec<String>,
    pub event_policy: UnknownEventPolicy,
    /// Frames the stub runtime renders before stopping; unset runs until Ctrl+C
    pub stub_frames: Option<u32>,
    pub session: SessionConfig,
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            debug: false,
            app_name: "void-xr".to_string(),
            app_version: 1,
            api_version: "1.0.34".to_string(),
            extensions: Vec::new(),
            event_policy: UnknownEventPolicy::Ignore,
            stub_frames: None,
            session: SessionConfig::new()
                .add_swapchain(
                    SwapchainSpec::new("color")
                        .format(formats::R8G8B8A8_UNORM)
                        .size(1024, 1024)
                        .color_attachment(),
                )
                .add_space(ReferenceSpaceSpec::new("local", ReferenceSpaceType::Local)),
            config_path: None,
        }
    }
}

impl BootConfig {
    /// Load boot configuration from all sources
    pub fn load() -> Result<Self, BootError> {
        let mut config = Self::default();

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.is_empty() {
                candidates.push(PathBuf::from(path));
            }
        }
        candidates.extend(CONFIG_PATHS.iter().map(PathBuf::from));

        for path in candidates {
            if path.exists() {
                config = Self::load_from_file(&path)?;
                log::info!("Loaded boot config from {}", path.display());
                break;
            }
        }

        if let Ok(backend) = std::env::var("VOID_XR_BACKEND") {
            match backend.parse() {
                Ok(b) => {
                    config.backend = b;
                    log::info!("Backend from env: {}", config.backend);
                }
                Err(e) => log::warn!("Ignoring VOID_XR_BACKEND: {}", e),
            }
        }

        if std::env::var("VOID_XR_DEBUG").map(|v| v != "0" && v != "false").unwrap_or(false) {
            config.debug = true;
        }

        if config.backend == Backend::Auto {
            config.backend = Self::detect_backend();
            log::info!("Auto-detected backend: {}", config.backend);
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, BootError> {
        let content = std::fs::read_to_string(path).map_err(|source| BootError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content).map_err(|source| BootError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Instance creation request for a headless graphics binding
    pub fn context_creation(&self) -> Result<ContextCreation, BootError> {
        let api_version: Version = self.api_version.parse().map_err(BootError::Version)?;
        Ok(self
            .extensions
            .iter()
            .fold(ContextCreation::headless(), |creation, ext| creation.add_extension(ext.clone()))
            .app_name(self.app_name.clone())
            .app_version(self.app_version)
            .api_version(api_version))
    }

    fn detect_backend() -> Backend {
        if cfg!(feature = "openxr") && Self::has_xr_runtime() {
            Backend::OpenXr
        } else {
            Backend::Stub
        }
    }

    /// Check for an installed OpenXR runtime manifest
    fn has_xr_runtime() -> bool {
        if let Ok(env_path) = std::env::var("XR_RUNTIME_JSON") {
            if !env_path.is_empty() && Path::new(&env_path).exists() {
                log::debug!("Found OpenXR runtime at: {}", env_path);
                return true;
            }
        }

        #[cfg(target_os = "linux")]
        {
            for path in ["/etc/xdg/openxr/1/active_runtime.json", "/usr/share/openxr/1/active_runtime.json"] {
                if Path::new(path).exists() {
                    log::debug!("Found OpenXR runtime at: {}", path);
                    return true;
                }
            }
        }

        false
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        log::info!("=== Boot Configuration ===");
        log::info!("  Backend: {}", self.backend);
        log::info!("  Application: {} v{}", self.app_name, self.app_version);
        log::info!("  API version: {}", self.api_version);
        if !self.extensions.is_empty() {
            log::info!("  Extensions: {}", self.extensions.join(", "));
        }
        log::info!("  Unknown events: {:?}", self.event_policy);
        log::info!(
            "  Session: {} swapchain(s), {} space(s), {} action(s)",
            self.session.swapchains.len(),
            self.session.spaces.len(),
            self.session.action_count()
        );
        if let Some(frames) = self.stub_frames {
            log::info!("  Stub frames: {}", frames);
        }
        if let Some(path) = &self.config_path {
            log::info!("  Config: {}", path.display());
        }
        log::info!("  Debug: {}", self.debug);
        log::info!("==========================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!("openxr".parse::<Backend>().unwrap(), Backend::OpenXr);
        assert_eq!("XR".parse::<Backend>().unwrap(), Backend::OpenXr);
        assert_eq!("sim".parse::<Backend>().unwrap(), Backend::Stub);
        assert_eq!("".parse::<Backend>().unwrap(), Backend::Auto);
        assert!("vulkan".parse::<Backend>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = BootConfig::default();
        assert_eq!(config.backend, Backend::Auto);
        assert!(!config.debug);
        assert_eq!(config.session.swapchains.len(), 1);
        assert_eq!(config.session.swapchains[0].format, formats::R8G8B8A8_UNORM);
        assert!(config.session.validate().is_ok());
    }

    #[test]
    fn test_parse_file() {
        let config = BootConfig::parse(
            r#"
            backend = "stub"
            app_name = "viewer"
            event_policy = "fail"
            stub_frames = 30

            [[session.swapchains]]
            name = "color"
            width = 2048
            height = 1024

            [[session.spaces]]
            name = "stage"
            type = "stage"
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, Backend::Stub);
        assert_eq!(config.app_name, "viewer");
        assert_eq!(config.event_policy, UnknownEventPolicy::Fail);
        assert_eq!(config.stub_frames, Some(30));
        assert_eq!(config.session.swapchains[0].width, 2048);
        assert_eq!(config.session.spaces[0].space_type, ReferenceSpaceType::Stage);
        // unset keys keep their defaults
        assert_eq!(config.api_version, "1.0.34");
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        assert!(BootConfig::parse("backend = \"drm\"").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = BootConfig::load_from_file(Path::new("/nonexistent/void-xr.toml")).unwrap_err();
        assert!(matches!(err, BootError::Io { .. }));
    }

    #[test]
    fn test_context_creation() {
        let mut config = BootConfig::default();
        config.api_version = "1.1".to_string();
        config.extensions = vec!["XR_KHR_composition_layer_depth".to_string()];

        let creation = config.context_creation().unwrap();
        assert_eq!(creation.api_version, Version::new(1, 1, 0));
        assert_eq!(creation.extensions, vec!["XR_KHR_composition_layer_depth".to_string()]);
        assert_eq!(creation.app_name, "void-xr");

        config.api_version = "one".to_string();
        assert!(matches!(config.context_creation(), Err(BootError::Version(_))));
    }
}
