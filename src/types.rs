use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Crate-wide error taxonomy. Every failure is recovered at the boundary
/// nearest its cause; `main()` only prints and sets the exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ShellError {
    #[error("network error: {0}")]
    Network(String),
    #[error("an incomplete update was detected and has been discarded; run `splitshell update check` again")]
    IncompleteBundle,
    #[error("could not launch the update helper: {0}")]
    HelperSpawn(String),
    #[error("invalid format: {0}")]
    Format(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One entry in the site list. `base` is the dedup key: the URL host,
/// lowercased, without a leading `www.` and without a port. Ids are a dense
/// 1-based sequence and are shown to the user as ordinals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SiteRecord {
    #[serde(default)]
    pub(crate) id: u32,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) url: String,
    #[serde(default)]
    pub(crate) base: String,
    #[serde(default = "default_site_category")]
    pub(crate) category: String,
    #[serde(default = "default_true")]
    pub(crate) free_tier: bool,
    #[serde(default)]
    pub(crate) notes: String,
}

/// A prompt template. `id` stays `None` for entries that never carried an
/// explicit id; their stable identity is derived by hashing title and text
/// (see `template::prompt_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PromptRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) title: String,
    #[serde(default = "default_prompt_category")]
    pub(crate) category: String,
    #[serde(default)]
    pub(crate) tags: Vec<String>,
    #[serde(default)]
    pub(crate) text: String,
}

/// Character name joined with its base-layer category. Categories are never
/// persisted in the override file; they are looked up by case-insensitive
/// name at read time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CharacterRecord {
    pub(crate) name: String,
    pub(crate) category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WindowConfig {
    #[serde(default = "default_width")]
    pub(crate) width: u32,
    #[serde(default = "default_height")]
    pub(crate) height: u32,
    #[serde(default)]
    pub(crate) fullscreen: bool,
    #[serde(default = "default_orientation")]
    pub(crate) orientation: String,
    #[serde(default = "default_pane_ratio")]
    pub(crate) pane_ratio: f64,
    #[serde(default = "default_ua_label")]
    pub(crate) user_agent: String,
    #[serde(default = "default_window_title")]
    pub(crate) window_title: String,
    #[serde(default = "default_mail_url")]
    pub(crate) mail_url: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: default_width(),
            height: default_height(),
            fullscreen: false,
            orientation: default_orientation(),
            pane_ratio: default_pane_ratio(),
            user_agent: default_ua_label(),
            window_title: default_window_title(),
            mail_url: default_mail_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UiConfig {
    #[serde(default = "default_splitter_sizes")]
    pub(crate) prompts_splitter_sizes: Vec<u32>,
    #[serde(default = "default_true")]
    pub(crate) link_splitters: bool,
    #[serde(default = "default_zoom_levels")]
    pub(crate) zoom_levels: Vec<f64>,
    #[serde(default)]
    pub(crate) download_path: String,
    #[serde(default)]
    pub(crate) hotkeys: BTreeMap<String, String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            prompts_splitter_sizes: default_splitter_sizes(),
            link_splitters: true,
            zoom_levels: default_zoom_levels(),
            download_path: String::new(),
            hotkeys: BTreeMap::new(),
        }
    }
}

/// The shipped base configuration document. `version`, `window` and `ui` are
/// mutable at runtime; the four collections are the read-only default layer
/// and are kept as raw JSON until the store layer normalizes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BaseConfig {
    #[serde(default = "default_version")]
    pub(crate) version: String,
    #[serde(default)]
    pub(crate) window: WindowConfig,
    #[serde(default)]
    pub(crate) ui: UiConfig,
    #[serde(default)]
    pub(crate) sites: Vec<serde_json::Value>,
    #[serde(default)]
    pub(crate) prompts: Vec<serde_json::Value>,
    #[serde(default)]
    pub(crate) characters: Vec<serde_json::Value>,
    #[serde(default)]
    pub(crate) mail_sites: Vec<serde_json::Value>,
}

impl Default for BaseConfig {
    fn default() -> Self {
        BaseConfig {
            version: default_version(),
            window: WindowConfig::default(),
            ui: UiConfig::default(),
            sites: Vec::new(),
            prompts: Vec::new(),
            characters: Vec::new(),
            mail_sites: Vec::new(),
        }
    }
}

pub(crate) fn default_version() -> String {
    "0.0.0".to_string()
}

pub(crate) fn default_site_category() -> String {
    "generator".to_string()
}

pub(crate) fn default_prompt_category() -> String {
    "Base".to_string()
}

fn default_true() -> bool {
    true
}

fn default_width() -> u32 {
    1440
}

fn default_height() -> u32 {
    900
}

fn default_orientation() -> String {
    "horizontal".to_string()
}

fn default_pane_ratio() -> f64 {
    0.5
}

fn default_ua_label() -> String {
    "Default (Engine)".to_string()
}

fn default_window_title() -> String {
    "Splitshell".to_string()
}

fn default_mail_url() -> String {
    "https://www.guerrillamail.com/inbox".to_string()
}

fn default_splitter_sizes() -> Vec<u32> {
    vec![680, 520]
}

fn default_zoom_levels() -> Vec<f64> {
    vec![1.0, 1.0]
}
