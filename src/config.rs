use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use anyhow::{Result, anyhow};

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TITLE: &str = "ChatGPT";
pub const DEFAULT_PLACEHOLDER: &str = "Type a message...";

/// How the chat screen arranges the settings panel. Behavior is identical.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PanelLayout {
    /// Settings open inline above the conversation
    #[default]
    Single,
    /// Settings open in a side panel next to the conversation
    Split,
}

impl FromStr for PanelLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(PanelLayout::Single),
            "split" => Ok(PanelLayout::Split),
            other => Err(format!("unknown layout '{}', expected 'single' or 'split'", other)),
        }
    }
}

impl fmt::Display for PanelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelLayout::Single => write!(f, "single"),
            PanelLayout::Split => write!(f, "split"),
        }
    }
}

/// On-disk configuration. Every field is optional; see [`Settings`] for the
/// resolved values.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<PanelLayout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

/// Configuration after defaults are applied
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub default_model: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub layout: PanelLayout,
    pub title: String,
    pub placeholder: String,
}

impl Settings {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            default_model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            layout: PanelLayout::default(),
            title: DEFAULT_TITLE.to_string(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)
            .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Persist a new default model, keeping the rest of the file intact
    pub fn save_default_model(path: &Path, model: &str) -> Result<()> {
        let mut config = Self::load_from(path).unwrap_or_else(|_| Self::new());
        config.default_model = Some(model.to_string());
        config.save_to(path)
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("gpt-playground").join("config.json"))
    }

    /// Apply defaults. The endpoint URL has no default and must be set.
    pub fn resolve(&self) -> Result<Settings> {
        let api_url = self
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| anyhow!("No API URL configured. Pass --api-url or set \"api_url\" in the config file"))?;

        let mut settings = Settings::new(api_url);
        if let Some(model) = self.default_model.as_deref().filter(|m| !m.trim().is_empty()) {
            settings.default_model = model.to_string();
        }
        settings.system_prompt = self.system_prompt.clone().filter(|p| !p.trim().is_empty());
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature.clamp(0.0, 2.0);
        }
        settings.max_tokens = self.max_tokens.filter(|&n| n > 0);
        settings.layout = self.layout.unwrap_or_default();
        if let Some(title) = &self.title {
            settings.title = title.clone();
        }
        if let Some(placeholder) = &self.placeholder {
            settings.placeholder = placeholder.clone();
        }
        Ok(settings)
    }
}
