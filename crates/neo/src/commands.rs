//! Parsing of the lines typed into the chat prompt.

use std::error::Error as StdError;
use std::fmt::{self, Display};

use neo_core::settings::{Setting, ValidationError};

/// The command help, one line per command.
pub const HELP: &str = "\
/model <name|id>        select the model
/temperature <0..1>     set the sampling temperature
/top-k <0..500>         set top-K
/preset <name>          select a system prompt preset
/custom <text>          edit the custom system prompt
/stream <on|off>        toggle streaming responses
/settings               show the current settings
/models                 list the available models
/presets                list the system prompt presets
/clear                  clear the chat history
/help                   show this help
/quit                   exit";

/// A parsed line of input.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A message for the model.
    Send(String),
    /// A settings change.
    Update(Setting),
    /// Clears the chat history.
    Clear,
    /// Shows the current settings.
    ShowSettings,
    /// Lists the models.
    ListModels,
    /// Lists the system prompt presets.
    ListPresets,
    /// Shows the help.
    Help,
    /// Exits.
    Quit,
}

/// Errors from [`parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError {
    /// No such command.
    UnknownCommand(String),
    /// The command needs an argument.
    MissingArgument(&'static str),
    /// The argument is not a valid value.
    InvalidSetting(ValidationError),
}

impl Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownCommand(name) => {
                write!(f, "unknown command `/{name}`, try /help")
            }
            CommandError::MissingArgument(usage) => {
                write!(f, "missing argument, usage: {usage}")
            }
            CommandError::InvalidSetting(err) => write!(f, "{err}"),
        }
    }
}

impl StdError for CommandError {}

impl From<ValidationError> for CommandError {
    #[inline]
    fn from(err: ValidationError) -> Self {
        CommandError::InvalidSetting(err)
    }
}

/// Parses a line of input.
///
/// Lines starting with `/` are commands, anything else is a message. Blank
/// lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_owned())));
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    let command = match name.to_ascii_lowercase().as_str() {
        "model" => update("model", arg, "/model <name|id>")?,
        "temperature" | "temp" => {
            update("temperature", arg, "/temperature <0..1>")?
        }
        "top-k" | "topk" => update("topK", arg, "/top-k <0..500>")?,
        "preset" => update("preset", arg, "/preset <name>")?,
        // The custom prompt may legitimately be cleared.
        "custom" => {
            Command::Update(Setting::CustomSystemPrompt(arg.to_owned()))
        }
        "stream" | "streaming" => {
            update("streaming", arg, "/stream <on|off>")?
        }
        "settings" => Command::ShowSettings,
        "models" => Command::ListModels,
        "presets" => Command::ListPresets,
        "clear" => Command::Clear,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => return Err(CommandError::UnknownCommand(name.to_owned())),
    };
    Ok(Some(command))
}

fn update(
    field: &str,
    arg: &str,
    usage: &'static str,
) -> Result<Command, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingArgument(usage));
    }
    Ok(Command::Update(Setting::parse(field, arg)?))
}

#[cfg(test)]
mod tests {
    use neo_core::settings::{ModelChoice, SettingField, SystemPromptPreset};

    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(
            parse("  What is Rust?\n"),
            Ok(Some(Command::Send("What is Rust?".to_owned())))
        );
    }

    #[test]
    fn test_settings_commands() {
        assert_eq!(
            parse("/model Claude 3 Haiku"),
            Ok(Some(Command::Update(Setting::Model(
                ModelChoice::Claude3Haiku
            ))))
        );
        assert_eq!(
            parse("/temp 0.25"),
            Ok(Some(Command::Update(Setting::Temperature(0.25))))
        );
        assert_eq!(
            parse("/top-k 7"),
            Ok(Some(Command::Update(Setting::TopK(7))))
        );
        assert_eq!(
            parse("/preset creative writer"),
            Ok(Some(Command::Update(Setting::SystemPromptPreset(
                SystemPromptPreset::CreativeWriter
            ))))
        );
        assert_eq!(
            parse("/custom Reply   in haiku."),
            Ok(Some(Command::Update(Setting::CustomSystemPrompt(
                "Reply   in haiku.".to_owned()
            ))))
        );
        assert_eq!(
            parse("/STREAM off"),
            Ok(Some(Command::Update(Setting::Streaming(false))))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse("/temperature"),
            Err(CommandError::MissingArgument("/temperature <0..1>"))
        );
        assert_eq!(
            parse("/temperature 3"),
            Err(CommandError::InvalidSetting(ValidationError::OutOfRange {
                field: SettingField::Temperature,
                value: "3".to_owned(),
            }))
        );
        assert_eq!(
            parse("/model gpt"),
            Err(CommandError::InvalidSetting(ValidationError::UnknownModel(
                "gpt".to_owned()
            )))
        );
        assert_eq!(
            parse("/dance"),
            Err(CommandError::UnknownCommand("dance".to_owned()))
        );
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse("/clear"), Ok(Some(Command::Clear)));
        assert_eq!(parse("/settings"), Ok(Some(Command::ShowSettings)));
        assert_eq!(parse("/models"), Ok(Some(Command::ListModels)));
        assert_eq!(parse("/presets"), Ok(Some(Command::ListPresets)));
        assert_eq!(parse("/help"), Ok(Some(Command::Help)));
        assert_eq!(parse("/exit"), Ok(Some(Command::Quit)));
    }
}
