//! Controller configuration.

use serde::{Deserialize, Serialize};

use crate::backend::ICON_BASE_COMMAND;
use crate::theme::ResolvedTheme;

/// What the session does when the engine rejects an overlay emoji.
///
/// The version counter advances either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "kebab-case")]
pub enum EmojiFailurePolicy {
    /// Log the rejection and report success to the caller.
    #[default]
    Log,
    /// Return the rejection to the caller like every other mutator.
    Propagate,
}

/// Settings for [`SessionController`](crate::SessionController).
///
/// ```json
/// { "iconBaseCommand": "get_folder_icon_base", "emojiFailurePolicy": "log" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Backend command answered with the icon base.
    pub icon_base_command: String,

    pub emoji_failure_policy: EmojiFailurePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            icon_base_command: ICON_BASE_COMMAND.to_string(),
            emoji_failure_policy: EmojiFailurePolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Settings for [`ThemeController`](crate::ThemeController).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase", default)]
pub struct ThemeConfig {
    /// Key under which the preference is persisted.
    pub storage_key: String,

    /// Theme applied when the OS does not report one.
    pub fallback: ResolvedTheme,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            storage_key: "theme-preference".to_string(),
            fallback: ResolvedTheme::Light,
        }
    }
}

impl ThemeConfig {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
