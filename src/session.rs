use std::fmt;

use crate::agent::tools::ToolRegistry;
use crate::model::ToolSpec;

pub const ALLOWED_MODELS: &[&str] = &[
    "gpt-4o-mini",
    "gpt-4o",
    "gpt-4.1-nano",
    "gpt-4.1-mini",
    "gpt-4.1",
];
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    UnknownKey(String),
    ModelNotAllowed(String),
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey(key) => {
                write!(f, "unknown setting '{key}' (expected model, web or stats)")
            }
            Self::ModelNotAllowed(model) => write!(
                f,
                "model '{model}' not in allowed list ({})",
                ALLOWED_MODELS.join(", ")
            ),
        }
    }
}

impl std::error::Error for SettingError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingKey {
    Model,
    Web,
    Stats,
}

impl SettingKey {
    fn parse(raw: &str) -> Result<Self, SettingError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "model" => Ok(Self::Model),
            "web" => Ok(Self::Web),
            "stats" => Ok(Self::Stats),
            _ => Err(SettingError::UnknownKey(raw.trim().to_string())),
        }
    }
}

pub fn is_allowed_model(model: &str) -> bool {
    ALLOWED_MODELS.contains(&model)
}

/// `1`, `true`, `on` and `yes` (any case) enable; everything else disables.
pub fn parse_bool_like(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

/// Settings the user can change mid-session with `:set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    model: String,
    web: bool,
    stats: bool,
}

impl SessionSettings {
    pub fn new(model: impl Into<String>, web: bool, stats: bool) -> Result<Self, SettingError> {
        let model = model.into();
        if !is_allowed_model(&model) {
            return Err(SettingError::ModelNotAllowed(model));
        }
        Ok(Self { model, web, stats })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn stats(&self) -> bool {
        self.stats
    }

    /// Applies `key=value`; on error nothing changes.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingError> {
        match SettingKey::parse(key)? {
            SettingKey::Model => {
                let model = value.trim();
                if !is_allowed_model(model) {
                    return Err(SettingError::ModelNotAllowed(model.to_string()));
                }
                self.model = model.to_string();
            }
            SettingKey::Web => self.web = parse_bool_like(value),
            SettingKey::Stats => self.stats = parse_bool_like(value),
        }
        Ok(())
    }

    pub fn show(&self, key: &str) -> Result<String, SettingError> {
        let value = match SettingKey::parse(key)? {
            SettingKey::Model => self.model.clone(),
            SettingKey::Web => on_off(self.web).to_string(),
            SettingKey::Stats => on_off(self.stats).to_string(),
        };
        Ok(value)
    }

    /// Function tools from the registry, plus web search when enabled.
    pub fn tool_specs(&self, registry: &ToolRegistry) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = registry
            .definitions()
            .cloned()
            .map(ToolSpec::Function)
            .collect();
        if self.web {
            specs.push(ToolSpec::web_search());
        }
        specs
    }
}
