use anyhow::Result;
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Directory name used under the platform config dir and the home dir.
pub const APP_DIR_NAME: &str = "doc-upload-injector";

/// DOM ids owned by the host application.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnchorIds {
    /// Header region the upload container lives in.
    pub header: String,
    /// Sibling the upload container is placed in front of when present.
    pub readme_button: String,
    /// Settings button the informational tip is placed after.
    pub settings_button: String,
}

impl Default for AnchorIds {
    fn default() -> Self {
        Self {
            header: "header".into(),
            readme_button: "readme-button".into(),
            settings_button: "chat-settings-open-modal".into(),
        }
    }
}

/// How the file picker hands files to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickerMode {
    /// Multiple selection, uploaded sequentially with a live counter.
    Batch,
    /// One file, no counter.
    Single,
}

impl PickerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Single => "single",
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Timings {
    pub pacing_ms: u64,
    pub result_display_ms: u64,
    pub tip_visible_ms: u64,
    pub tip_fade_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            pacing_ms: 300,
            result_display_ms: 2000,
            tip_visible_ms: 5000,
            tip_fade_ms: 1000,
        }
    }
}

impl Timings {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn result_display(&self) -> Duration {
        Duration::from_millis(self.result_display_ms)
    }

    pub fn tip_visible(&self) -> Duration {
        Duration::from_millis(self.tip_visible_ms)
    }

    pub fn tip_fade(&self) -> Duration {
        Duration::from_millis(self.tip_fade_ms)
    }
}

/// Top-level configuration for the injector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
    /// Base URL of the host chat application.
    pub app_url: String,
    /// Attach to an already-running Chrome on this DevTools port instead of launching one.
    pub debug_port: Option<u16>,
    pub chrome_path: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
    /// Group that unlocks the upload control.
    pub admin_group: String,
    /// Groups never offered as upload targets (the admin group is always added).
    pub reserved_groups: Vec<String>,
    pub session_cookie: String,
    pub groups_path: String,
    pub upload_path: String,
    pub anchors: AnchorIds,
    pub accepted_extensions: Vec<String>,
    pub picker_mode: PickerMode,
    pub button_label: String,
    pub tip_text: String,
    pub timings: Timings,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:8000/".into(),
            debug_port: None,
            chrome_path: None,
            profile_dir: None,
            admin_group: "pod_admin".into(),
            reserved_groups: vec!["default".into()],
            session_cookie: "chainlit_session".into(),
            groups_path: "/api/user-groups".into(),
            upload_path: "/api/upload-milvus".into(),
            anchors: AnchorIds::default(),
            accepted_extensions: vec![".docx".into()],
            picker_mode: PickerMode::Batch,
            button_label: "Upload DOCX".into(),
            tip_text: "<--change organization to query docs".into(),
            timings: Timings::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("app_url is not a valid URL: {0}")]
    AppUrl(String),
}

impl InjectorConfig {
    /// Load from an explicit path, else the default config file if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let config = match path {
            Some(path) => {
                let body = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                let config = Self::from_json(&body).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
                info!("Loaded config from {}", path.display());
                config
            }
            None => {
                info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.app_url).map_err(|_| ConfigError::AppUrl(self.app_url.clone()))?;
        Ok(())
    }

    /// Every group name that must never be offered as a target.
    pub fn excluded_targets(&self) -> Vec<String> {
        let mut names = self.reserved_groups.clone();
        if !names.contains(&self.admin_group) {
            names.push(self.admin_group.clone());
        }
        names
    }

    /// Chrome profile directory, created on demand.
    pub fn resolve_profile_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.profile_dir {
            std::fs::create_dir_all(dir)?;
            return Ok(dir.clone());
        }
        crate::browser::chrome::default_profile_dir()
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.json"))
}
