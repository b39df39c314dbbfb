//! A terminal chat with models hosted on Bedrock.

#[macro_use]
extern crate tracing;

use std::fmt::Display;
use std::io::Write as _;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use neo::commands::{self, Command, HELP};
use neo::config;
use neo::core::SettingOutcome;
use neo::core::settings::{ModelChoice, SystemPromptPreset};
use neo::{Session, SessionBuilder};
use neo_bedrock_model::BedrockProvider;
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Stdin};

const BAR_CHAR: &str = "▎";
const CURSOR: &str = "▌";
// Moves back over the cursor glyph and blanks it.
const ERASE_CURSOR: &str = "\x08 \x08";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bedrock_config = match config::bedrock_config_from_env() {
        Ok(config) => config,
        Err(err) => return print_error(err),
    };
    let options = match config::options_from_env() {
        Ok(options) => options,
        Err(err) => return print_error(err),
    };
    debug!("using {bedrock_config:?}");

    let provider = BedrockProvider::new(bedrock_config);
    let mut session = match SessionBuilder::with_model_provider(provider)
        .with_options(options)
        .build()
    {
        Ok(session) => session,
        Err(err) => return print_error(err),
    };

    let progress_style =
        match ProgressStyle::with_template("{spinner} {wide_msg}") {
            Ok(style) => style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
            Err(err) => return print_error(err),
        };

    println!(
        "{}",
        format!(
            "Chatting with {}. Type /help for commands.",
            session.config().model()
        )
        .dimmed()
    );

    let mut stdin = BufReader::new(io::stdin());
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line(&mut stdin).await else {
            break;
        };
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                print_error(err);
                continue;
            }
        };

        match command {
            Command::Send(message) => {
                chat(&mut session, &message, &progress_style).await;
            }
            Command::Update(setting) => {
                let field = setting.field();
                match session.update_setting(setting) {
                    Ok(SettingOutcome::Changed) => {
                        println!("{}", format!("{field} updated").dimmed());
                    }
                    Ok(SettingOutcome::Unchanged) => {
                        println!("{}", format!("{field} unchanged").dimmed());
                    }
                    Ok(SettingOutcome::Queued) => {
                        println!("{}", format!("{field} queued").dimmed());
                    }
                    Err(err) => print_error(err),
                }
            }
            Command::Clear => {
                session.clear_history();
                println!("{}", "History cleared.".dimmed());
            }
            Command::ShowSettings => {
                println!("{}", session.describe_settings());
            }
            Command::ListModels => {
                let current = session.config().model();
                for model in ModelChoice::ALL {
                    let marker = if model == current { "*" } else { " " };
                    println!(
                        "{marker} {:<18} {}",
                        model.display_name(),
                        model.model_id().dimmed()
                    );
                }
            }
            Command::ListPresets => {
                let current = session.preset();
                for preset in SystemPromptPreset::ALL {
                    let marker = if preset == current { "*" } else { " " };
                    println!(
                        "{marker} {:<18} {}",
                        preset.name(),
                        preset.text().unwrap_or("(editable)").dimmed()
                    );
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }
}

/// Sends a message and renders the reply.
///
/// Streamed replies are printed as they grow, followed by a cursor glyph
/// that is removed once the reply is complete.
async fn chat(session: &mut Session, message: &str, style: &ProgressStyle) {
    let streaming = session.config().streaming();
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(style.clone());
    progress_bar.set_message("🤔 Thinking...");
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let mut printed = 0;
    let result = session
        .send_message(message, |text| {
            if printed == 0 {
                progress_bar.finish_and_clear();
                print!("{}🤖 ", BAR_CHAR.bright_cyan());
            } else {
                print!("{ERASE_CURSOR}");
            }
            let delta = text.get(printed..).unwrap_or_default();
            print!("{}{CURSOR}", delta.bright_white());
            printed = text.len();
            std::io::stdout().flush().ok();
        })
        .await;
    progress_bar.finish_and_clear();
    if printed > 0 {
        println!("{ERASE_CURSOR}");
    }

    match result {
        Ok(reply) if !streaming => {
            println!("{}🤖 {}", BAR_CHAR.bright_cyan(), reply.bright_white());
        }
        Ok(_) => {}
        Err(err) => print_error(err),
    }
}

fn print_error(err: impl Display) {
    eprintln!("{} {err}", "error:".bright_red().bold());
}

async fn read_line(stdin: &mut BufReader<Stdin>) -> Option<String> {
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
