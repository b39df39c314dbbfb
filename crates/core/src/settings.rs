//! Generation settings and their domains.

use std::fmt::{self, Display};
use std::ops::RangeInclusive;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Allowed range of the sampling temperature.
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = 0.0..=1.0;

/// Allowed range of top-K.
pub const TOP_K_RANGE: RangeInclusive<u32> = 0..=500;

/// The models a session can talk to.
///
/// This is a closed set: a model id that isn't listed here cannot be
/// selected.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum ModelChoice {
    /// Claude 3.5 Sonnet.
    #[default]
    Claude35Sonnet,
    /// Claude 3 Haiku.
    Claude3Haiku,
    /// Claude 3 Sonnet.
    Claude3Sonnet,
    /// Claude 2.1.
    Claude21,
    /// Claude 2.0.
    Claude20,
    /// Claude Instant.
    ClaudeInstant,
}

impl ModelChoice {
    /// All models, in display order.
    pub const ALL: [ModelChoice; 6] = [
        ModelChoice::Claude35Sonnet,
        ModelChoice::Claude3Haiku,
        ModelChoice::Claude3Sonnet,
        ModelChoice::Claude21,
        ModelChoice::Claude20,
        ModelChoice::ClaudeInstant,
    ];

    /// Returns the human readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelChoice::Claude35Sonnet => "Claude 3.5 Sonnet",
            ModelChoice::Claude3Haiku => "Claude 3 Haiku",
            ModelChoice::Claude3Sonnet => "Claude 3 Sonnet",
            ModelChoice::Claude21 => "Claude 2.1",
            ModelChoice::Claude20 => "Claude 2.0",
            ModelChoice::ClaudeInstant => "Claude Instant",
        }
    }

    /// Returns the opaque id the provider knows the model by.
    pub fn model_id(self) -> &'static str {
        match self {
            ModelChoice::Claude35Sonnet => {
                "anthropic.claude-3-5-sonnet-20240620-v1:0"
            }
            ModelChoice::Claude3Haiku => {
                "anthropic.claude-3-haiku-20240307-v1:0"
            }
            ModelChoice::Claude3Sonnet => {
                "anthropic.claude-3-sonnet-20240229-v1:0"
            }
            ModelChoice::Claude21 => "anthropic.claude-v2:1",
            ModelChoice::Claude20 => "anthropic.claude-v2",
            ModelChoice::ClaudeInstant => "anthropic.claude-instant-v1",
        }
    }
}

impl Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelChoice {
    type Err = ValidationError;

    /// Accepts either the display name (case-insensitive) or the model id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| {
                m.model_id() == s || m.display_name().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| ValidationError::UnknownModel(s.to_owned()))
    }
}

/// The predefined system prompts.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum SystemPromptPreset {
    /// A general purpose assistant.
    #[default]
    DefaultAssistant,
    /// A programming helper.
    CodingAssistant,
    /// A creative writing helper.
    CreativeWriter,
    /// Free text typed by the user.
    Custom,
}

impl SystemPromptPreset {
    /// All presets, in display order.
    pub const ALL: [SystemPromptPreset; 4] = [
        SystemPromptPreset::DefaultAssistant,
        SystemPromptPreset::CodingAssistant,
        SystemPromptPreset::CreativeWriter,
        SystemPromptPreset::Custom,
    ];

    /// Returns the human readable name.
    pub fn name(self) -> &'static str {
        match self {
            SystemPromptPreset::DefaultAssistant => "Default Assistant",
            SystemPromptPreset::CodingAssistant => "Coding Assistant",
            SystemPromptPreset::CreativeWriter => "Creative Writer",
            SystemPromptPreset::Custom => "Custom",
        }
    }

    /// Returns the fixed prompt text, or `None` for [`Self::Custom`].
    pub fn text(self) -> Option<&'static str> {
        match self {
            SystemPromptPreset::DefaultAssistant => Some(
                "You are Claude, an AI assistant created by Anthropic to be \
                 helpful, harmless, and honest.",
            ),
            SystemPromptPreset::CodingAssistant => Some(
                "You are a coding assistant, expert in multiple programming \
                 languages. Provide clear, concise, and efficient code \
                 solutions.",
            ),
            SystemPromptPreset::CreativeWriter => Some(
                "You are a creative writing assistant, skilled in various \
                 genres and styles. Help users craft engaging stories and \
                 narratives.",
            ),
            SystemPromptPreset::Custom => None,
        }
    }
}

impl Display for SystemPromptPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SystemPromptPreset {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::UnknownPreset(s.to_owned()))
    }
}

/// The settings a request is built from.
///
/// Values can only be changed through
/// [`ChatSession::update_setting`](crate::ChatSession::update_setting),
/// which keeps every field within its domain.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationConfig {
    pub(crate) model: ModelChoice,
    pub(crate) temperature: f32,
    pub(crate) top_k: u32,
    pub(crate) system_prompt: String,
    pub(crate) streaming: bool,
}

impl GenerationConfig {
    /// Returns the selected model.
    #[inline]
    pub fn model(&self) -> ModelChoice {
        self.model
    }

    /// Returns the sampling temperature.
    #[inline]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Returns top-K.
    #[inline]
    pub fn top_k(&self) -> u32 {
        self.top_k
    }

    /// Returns the effective system prompt.
    #[inline]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Returns whether responses are streamed.
    #[inline]
    pub fn streaming(&self) -> bool {
        self.streaming
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: ModelChoice::default(),
            temperature: 0.5,
            top_k: 100,
            system_prompt: SystemPromptPreset::default()
                .text()
                .unwrap_or_default()
                .to_owned(),
            streaming: true,
        }
    }
}

/// A settable field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingField {
    /// See [`Setting::Model`].
    Model,
    /// See [`Setting::Temperature`].
    Temperature,
    /// See [`Setting::TopK`].
    TopK,
    /// See [`Setting::SystemPromptPreset`].
    SystemPromptPreset,
    /// See [`Setting::CustomSystemPrompt`].
    CustomSystemPrompt,
    /// See [`Setting::Streaming`].
    Streaming,
}

impl SettingField {
    /// Returns the name used by the options surface.
    pub fn name(self) -> &'static str {
        match self {
            SettingField::Model => "modelId",
            SettingField::Temperature => "temperature",
            SettingField::TopK => "topK",
            SettingField::SystemPromptPreset => "systemPromptPreset",
            SettingField::CustomSystemPrompt => "customSystemPromptText",
            SettingField::Streaming => "streamingEnabled",
        }
    }
}

impl Display for SettingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingField {
    type Err = ValidationError;

    /// Accepts the options surface names plus a few short aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let field = match normalized.as_str() {
            "model" | "modelid" => SettingField::Model,
            "temperature" | "temp" => SettingField::Temperature,
            "topk" => SettingField::TopK,
            "systempromptpreset" | "preset" | "prompt" => {
                SettingField::SystemPromptPreset
            }
            "customsystemprompttext" | "customsystemprompt" | "custom" => {
                SettingField::CustomSystemPrompt
            }
            "streamingenabled" | "streaming" | "stream" => {
                SettingField::Streaming
            }
            _ => return Err(ValidationError::UnknownField(s.to_owned())),
        };
        Ok(field)
    }
}

/// A single settings change.
#[derive(Clone, Debug, PartialEq)]
pub enum Setting {
    /// Selects the model.
    Model(ModelChoice),
    /// Sets the sampling temperature, within [`TEMPERATURE_RANGE`].
    Temperature(f32),
    /// Sets top-K, within [`TOP_K_RANGE`].
    TopK(u32),
    /// Selects a system prompt preset.
    SystemPromptPreset(SystemPromptPreset),
    /// Edits the custom system prompt. Only allowed while the custom preset
    /// is selected.
    CustomSystemPrompt(String),
    /// Turns streaming responses on or off.
    Streaming(bool),
}

impl Setting {
    /// Parses a setting from textual field and value.
    pub fn parse(field: &str, value: &str) -> Result<Self, ValidationError> {
        let field: SettingField = field.parse()?;
        let invalid = || ValidationError::InvalidValue {
            field,
            value: value.to_owned(),
        };
        let setting = match field {
            SettingField::Model => Setting::Model(value.parse()?),
            SettingField::Temperature => Setting::Temperature(
                value.trim().parse().map_err(|_| invalid())?,
            ),
            SettingField::TopK => {
                Setting::TopK(value.trim().parse().map_err(|_| invalid())?)
            }
            SettingField::SystemPromptPreset => {
                Setting::SystemPromptPreset(value.parse()?)
            }
            SettingField::CustomSystemPrompt => {
                Setting::CustomSystemPrompt(value.to_owned())
            }
            SettingField::Streaming => {
                Setting::Streaming(parse_bool(value).ok_or_else(invalid)?)
            }
        };
        setting.validate()?;
        Ok(setting)
    }

    /// Returns the field this setting changes.
    pub fn field(&self) -> SettingField {
        match self {
            Setting::Model(_) => SettingField::Model,
            Setting::Temperature(_) => SettingField::Temperature,
            Setting::TopK(_) => SettingField::TopK,
            Setting::SystemPromptPreset(_) => SettingField::SystemPromptPreset,
            Setting::CustomSystemPrompt(_) => SettingField::CustomSystemPrompt,
            Setting::Streaming(_) => SettingField::Streaming,
        }
    }

    /// Checks the value against the field's domain.
    ///
    /// Whether the custom prompt is editable depends on the session and is
    /// checked there.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Setting::Temperature(t)
                if !t.is_finite() || !TEMPERATURE_RANGE.contains(&t) =>
            {
                Err(ValidationError::OutOfRange {
                    field: SettingField::Temperature,
                    value: t.to_string(),
                })
            }
            Setting::TopK(k) if !TOP_K_RANGE.contains(&k) => {
                Err(ValidationError::OutOfRange {
                    field: SettingField::TopK,
                    value: k.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Parses a switch value such as `on`, `off`, `true` or `0`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// The configuration surface of a session.
///
/// Every option is optional; missing ones keep their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatOptions {
    /// Display name or id of the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Top-K.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Name of the system prompt preset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_preset: Option<String>,
    /// Text of the custom system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_system_prompt_text: Option<String>,
    /// Whether responses are streamed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_enabled: Option<bool>,
}

impl ChatOptions {
    /// Converts the options to settings, validating every value.
    ///
    /// The preset comes after the custom text, so that selecting the custom
    /// preset picks the text up.
    pub fn to_settings(&self) -> Result<Vec<Setting>, ValidationError> {
        let mut settings = vec![];
        if let Some(model) = &self.model_id {
            settings.push(Setting::Model(model.parse()?));
        }
        if let Some(temperature) = self.temperature {
            settings.push(Setting::Temperature(temperature));
        }
        if let Some(top_k) = self.top_k {
            settings.push(Setting::TopK(top_k));
        }
        if let Some(streaming) = self.streaming_enabled {
            settings.push(Setting::Streaming(streaming));
        }
        if let Some(text) = &self.custom_system_prompt_text {
            settings.push(Setting::CustomSystemPrompt(text.clone()));
        }
        if let Some(preset) = &self.system_prompt_preset {
            settings.push(Setting::SystemPromptPreset(preset.parse()?));
        }
        for setting in &settings {
            setting.validate()?;
        }
        Ok(settings)
    }
}

/// A settings value outside its allowed domain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// No such setting.
    UnknownField(String),
    /// The value cannot be read as the field's type.
    InvalidValue {
        /// The field being set.
        field: SettingField,
        /// The rejected input.
        value: String,
    },
    /// The value is outside the field's range.
    OutOfRange {
        /// The field being set.
        field: SettingField,
        /// The rejected value.
        value: String,
    },
    /// The model is not in the catalog.
    UnknownModel(String),
    /// No such system prompt preset.
    UnknownPreset(String),
    /// The custom prompt was edited while a fixed preset is selected.
    PromptNotEditable,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::UnknownField(name) => {
                write!(f, "unknown setting `{name}`")
            }
            ValidationError::InvalidValue { field, value } => {
                write!(f, "invalid value `{value}` for {field}")
            }
            ValidationError::OutOfRange { field, value } => {
                let range = match field {
                    SettingField::Temperature => "between 0 and 1",
                    SettingField::TopK => "between 0 and 500",
                    _ => "in range",
                };
                write!(f, "{field} must be {range}, got {value}")
            }
            ValidationError::UnknownModel(name) => {
                write!(f, "unknown model `{name}`")
            }
            ValidationError::UnknownPreset(name) => {
                write!(f, "unknown system prompt preset `{name}`")
            }
            ValidationError::PromptNotEditable => write!(
                f,
                "the system prompt can only be edited with the Custom preset"
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_model_lookup() {
        assert_eq!(
            "claude 3 haiku".parse::<ModelChoice>(),
            Ok(ModelChoice::Claude3Haiku)
        );
        assert_eq!(
            "anthropic.claude-v2:1".parse::<ModelChoice>(),
            Ok(ModelChoice::Claude21)
        );
        assert_eq!(
            "gpt-4".parse::<ModelChoice>(),
            Err(ValidationError::UnknownModel("gpt-4".to_owned()))
        );
        for model in ModelChoice::ALL {
            assert_eq!(model.model_id().parse::<ModelChoice>(), Ok(model));
        }
    }

    #[test]
    fn test_custom_preset_has_no_text() {
        assert_eq!(SystemPromptPreset::Custom.text(), None);
        for preset in &SystemPromptPreset::ALL[..3] {
            assert!(!preset.text().unwrap_or_default().is_empty());
        }
    }

    #[test]
    fn test_parse_setting() {
        assert_eq!(
            Setting::parse("temperature", "0.7"),
            Ok(Setting::Temperature(0.7))
        );
        assert_eq!(Setting::parse("top-k", "250"), Ok(Setting::TopK(250)));
        assert_eq!(
            Setting::parse("stream", "off"),
            Ok(Setting::Streaming(false))
        );
        assert_eq!(
            Setting::parse("preset", "coding assistant"),
            Ok(Setting::SystemPromptPreset(
                SystemPromptPreset::CodingAssistant
            ))
        );
        assert_eq!(
            Setting::parse("temperature", "1.5"),
            Err(ValidationError::OutOfRange {
                field: SettingField::Temperature,
                value: "1.5".to_owned(),
            })
        );
        assert_eq!(
            Setting::parse("topK", "501"),
            Err(ValidationError::OutOfRange {
                field: SettingField::TopK,
                value: "501".to_owned(),
            })
        );
        assert_eq!(
            Setting::parse("topK", "-1"),
            Err(ValidationError::InvalidValue {
                field: SettingField::TopK,
                value: "-1".to_owned(),
            })
        );
        assert!(matches!(
            Setting::parse("temperature", "NaN"),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert_eq!(
            Setting::parse("color", "blue"),
            Err(ValidationError::UnknownField("color".to_owned()))
        );
    }

    #[test]
    fn test_options_surface() {
        let options: ChatOptions = serde_json::from_value(json!({
            "modelId": "Claude Instant",
            "temperature": 0.2,
            "topK": 10,
            "systemPromptPreset": "Custom",
            "customSystemPromptText": "Answer in French.",
            "streamingEnabled": false
        }))
        .unwrap();
        let settings = options.to_settings().unwrap();
        assert_eq!(
            settings,
            vec![
                Setting::Model(ModelChoice::ClaudeInstant),
                Setting::Temperature(0.2),
                Setting::TopK(10),
                Setting::Streaming(false),
                Setting::CustomSystemPrompt("Answer in French.".to_owned()),
                Setting::SystemPromptPreset(SystemPromptPreset::Custom),
            ]
        );

        let unknown = serde_json::from_value::<ChatOptions>(json!({
            "maxTokens": 100
        }));
        assert!(unknown.is_err());

        let out_of_range = ChatOptions {
            top_k: Some(1000),
            ..Default::default()
        };
        assert!(out_of_range.to_settings().is_err());
    }
}
