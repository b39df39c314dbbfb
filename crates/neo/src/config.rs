//! Configuration from the environment.

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::{env, fs};

use neo_bedrock_model::{BedrockConfig, BedrockConfigBuilder};
use neo_core::settings::{self, ChatOptions};

/// Variable holding the Bedrock API key.
pub const API_KEY_VAR: &str = "AWS_BEARER_TOKEN_BEDROCK";
const REGION_VAR: &str = "AWS_REGION";
const ENDPOINT_VAR: &str = "BEDROCK_ENDPOINT";
const CONFIG_FILE_VAR: &str = "NEO_CONFIG";

/// Errors while reading the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A required variable is not set.
    MissingVar(&'static str),
    /// A variable cannot be parsed.
    InvalidVar {
        /// Name of the variable.
        name: &'static str,
        /// Its value.
        value: String,
    },
    /// The options file cannot be read or parsed.
    File {
        /// Path of the file.
        path: String,
        /// What went wrong.
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingVar(name) => {
                write!(f, "{name} environment variable is not set")
            }
            ConfigError::InvalidVar { name, value } => {
                write!(f, "invalid value {value:?} for {name}")
            }
            ConfigError::File { path, message } => {
                write!(f, "cannot load options from {path}: {message}")
            }
        }
    }
}

impl StdError for ConfigError {}

/// Builds the provider configuration from the process environment.
#[inline]
pub fn bedrock_config_from_env() -> Result<BedrockConfig, ConfigError> {
    bedrock_config_from_vars(|name| env::var(name).ok())
}

/// Builds the provider configuration from variables given by `lookup`.
pub fn bedrock_config_from_vars<F>(
    lookup: F,
) -> Result<BedrockConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = lookup(API_KEY_VAR)
        .filter(|key| !key.is_empty())
        .ok_or(ConfigError::MissingVar(API_KEY_VAR))?;
    let mut builder = BedrockConfigBuilder::with_api_key(api_key);
    if let Some(region) = lookup(REGION_VAR) {
        builder = builder.with_region(region);
    }
    if let Some(endpoint) = lookup(ENDPOINT_VAR) {
        builder = builder.with_endpoint(endpoint);
    }
    Ok(builder.build())
}

/// Reads the chat options from the process environment.
#[inline]
pub fn options_from_env() -> Result<ChatOptions, ConfigError> {
    options_from_vars(|name| env::var(name).ok())
}

/// Reads the chat options from variables given by `lookup`.
///
/// The JSON file named by `NEO_CONFIG` is loaded first, then the single
/// `NEO_*` variables override its entries. Values are only parsed here;
/// their ranges are checked when they are applied to a session.
pub fn options_from_vars<F>(lookup: F) -> Result<ChatOptions, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut options = match lookup(CONFIG_FILE_VAR) {
        Some(path) => load_options_file(&path)?,
        None => ChatOptions::default(),
    };

    if let Some(model) = lookup("NEO_MODEL") {
        options.model_id = Some(model);
    }
    if let Some(temperature) = parse_var(&lookup, "NEO_TEMPERATURE")? {
        options.temperature = Some(temperature);
    }
    if let Some(top_k) = parse_var(&lookup, "NEO_TOP_K")? {
        options.top_k = Some(top_k);
    }
    if let Some(preset) = lookup("NEO_SYSTEM_PROMPT_PRESET") {
        options.system_prompt_preset = Some(preset);
    }
    if let Some(prompt) = lookup("NEO_CUSTOM_SYSTEM_PROMPT") {
        options.custom_system_prompt_text = Some(prompt);
    }
    if let Some(value) = lookup("NEO_STREAMING") {
        let Some(streaming) = settings::parse_bool(&value) else {
            return Err(ConfigError::InvalidVar {
                name: "NEO_STREAMING",
                value,
            });
        };
        options.streaming_enabled = Some(streaming);
    }

    debug!("loaded options: {options:?}");
    Ok(options)
}

fn parse_var<F, T>(
    lookup: &F,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(value) = lookup(name) else {
        return Ok(None);
    };
    match value.trim().parse() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Err(ConfigError::InvalidVar { name, value }),
    }
}

fn load_options_file(path: &str) -> Result<ChatOptions, ConfigError> {
    let file_error = |message: String| ConfigError::File {
        path: path.to_owned(),
        message,
    };
    let content =
        fs::read_to_string(path).map_err(|err| file_error(err.to_string()))?;
    serde_json::from_str(&content).map_err(|err| file_error(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_bedrock_config() {
        let config = bedrock_config_from_vars(vars(&[
            (API_KEY_VAR, "secret"),
            (REGION_VAR, "eu-west-1"),
        ]))
        .unwrap();
        assert_eq!(config.region(), "eu-west-1");
        assert_eq!(
            config.endpoint(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com"
        );

        let err = bedrock_config_from_vars(vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(API_KEY_VAR)));
    }

    #[test]
    fn test_options() {
        let options = options_from_vars(vars(&[
            ("NEO_MODEL", "Claude 3 Haiku"),
            ("NEO_TEMPERATURE", "0.3"),
            ("NEO_TOP_K", "50"),
            ("NEO_STREAMING", "off"),
        ]))
        .unwrap();
        assert_eq!(options.model_id.as_deref(), Some("Claude 3 Haiku"));
        assert_eq!(options.temperature, Some(0.3));
        assert_eq!(options.top_k, Some(50));
        assert_eq!(options.streaming_enabled, Some(false));
        assert_eq!(options.system_prompt_preset, None);

        let err =
            options_from_vars(vars(&[("NEO_TOP_K", "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                name: "NEO_TOP_K",
                ..
            }
        ));

        let err = options_from_vars(vars(&[(
            CONFIG_FILE_VAR,
            "/nonexistent/neo.json",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::File { .. }));
    }

    #[test]
    fn test_streaming_var() {
        let options =
            options_from_vars(vars(&[("NEO_STREAMING", " YES ")])).unwrap();
        assert_eq!(options.streaming_enabled, Some(true));

        let err =
            options_from_vars(vars(&[("NEO_STREAMING", "maybe")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                name: "NEO_STREAMING",
                ..
            }
        ));
    }
}
