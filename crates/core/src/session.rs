
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::StreamExt;
use neo_model::ModelRequest;

use crate::conversation::{Conversation, Message, Role};
use crate::error::Error;
use crate::model_client::{ModelClient, build_request};
use crate::settings::{
    ChatOptions, GenerationConfig, Setting, SystemPromptPreset,
    ValidationError,
};

const SUMMARY_WIDTH: usize = 1000;
const SUMMARY_PLACEHOLDER: &str = "...";

// Turn ids are unique across sessions, so a turn can only be finished by the
// session that started it.
static NEXT_TURN_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum TurnStage {
    #[default]
    Idle,
    AwaitingResponse {
        turn_id: u64,
    },
}

/// The result of a settings update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingOutcome {
    /// The value was changed.
    Changed,
    /// The value was already set.
    Unchanged,
    /// A turn is in flight; the change is applied once it finishes.
    Queued,
}

/// A turn that has been started and waits for its outcome.
///
/// Pass it back to [`ChatSession::finish_turn`] once the request is done.
#[derive(Debug)]
#[must_use = "a started turn must be finished"]
pub struct PendingTurn {
    ticket: TurnTicket,
    request: ModelRequest,
    streaming: bool,
}

#[derive(Clone, Copy, Debug)]
struct TurnTicket {
    id: u64,
    epoch: u64,
    user_index: usize,
}

impl PendingTurn {
    /// Returns the request built for this turn.
    #[inline]
    pub fn request(&self) -> &ModelRequest {
        &self.request
    }

    /// Returns whether the reply should be streamed.
    #[inline]
    pub fn streaming(&self) -> bool {
        self.streaming
    }
}

/// The state of one chat: the history, the generation settings and the
/// current turn.
///
/// All changes go through the named transitions on this type. While a turn
/// is in flight, the settings stay as they were when the request was built;
/// updates made in the meantime are validated right away and applied once
/// the turn finishes.
#[derive(Debug)]
pub struct ChatSession {
    conversation: Conversation,
    config: GenerationConfig,
    preset: SystemPromptPreset,
    last_custom_prompt: String,
    stage: TurnStage,
    pending_settings: VecDeque<Setting>,
    // Bumped when the history is cleared, so that turns started before are
    // recognized as stale.
    epoch: u64,
}

impl ChatSession {
    /// Creates a session with default settings.
    pub fn new() -> Self {
        let session = Self {
            conversation: Conversation::default(),
            config: GenerationConfig::default(),
            preset: SystemPromptPreset::default(),
            last_custom_prompt: String::new(),
            stage: TurnStage::Idle,
            pending_settings: VecDeque::new(),
            epoch: 0,
        };
        info!(
            "session started: model={}, temperature={}, top_k={}, preset={}, \
             streaming={}",
            session.config.model(),
            session.config.temperature(),
            session.config.top_k(),
            session.preset,
            session.config.streaming(),
        );
        session
    }

    /// Creates a session and applies the given options.
    pub fn with_options(options: &ChatOptions) -> Result<Self, Error> {
        let mut session = Self::new();
        session.apply_options(options)?;
        Ok(session)
    }

    /// Returns the history.
    #[inline]
    pub fn history(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns the current generation settings.
    #[inline]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Returns the selected system prompt preset.
    #[inline]
    pub fn preset(&self) -> SystemPromptPreset {
        self.preset
    }

    /// Returns the last custom system prompt the user typed.
    #[inline]
    pub fn custom_prompt(&self) -> &str {
        &self.last_custom_prompt
    }

    /// Returns `true` if a turn is in flight.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.stage != TurnStage::Idle
    }

    /// Appends a message to the history.
    pub fn append_message<S: Into<String>>(&mut self, role: Role, text: S) {
        let msg = Message::new(role, text);
        trace!("appending {} message: {:?}", msg.role(), msg.text());
        self.conversation.push(msg);
    }

    /// Empties the history. Settings are left untouched.
    ///
    /// A turn in flight keeps running, but its outcome will be dropped.
    pub fn clear_history(&mut self) {
        self.conversation.clear();
        self.epoch += 1;
        info!("chat history cleared");
    }

    /// Changes one setting.
    ///
    /// Invalid values are rejected and leave the session untouched.
    pub fn update_setting(
        &mut self,
        setting: Setting,
    ) -> Result<SettingOutcome, Error> {
        if matches!(setting, Setting::CustomSystemPrompt(_))
            && self.effective_preset() != SystemPromptPreset::Custom
        {
            return Err(ValidationError::PromptNotEditable.into());
        }
        self.submit_setting(setting)
    }

    /// Applies a whole set of options.
    ///
    /// All options are validated before any of them is applied. A custom
    /// prompt text is remembered even when another preset is selected, so
    /// that switching to the custom preset later picks it up.
    pub fn apply_options(
        &mut self,
        options: &ChatOptions,
    ) -> Result<(), Error> {
        for setting in options.to_settings()? {
            self.submit_setting(setting)?;
        }
        Ok(())
    }

    /// Starts a turn: appends the user message and builds the request from
    /// the current settings.
    pub fn begin_turn<S: Into<String>>(
        &mut self,
        input: S,
    ) -> Result<PendingTurn, Error> {
        if let TurnStage::AwaitingResponse { turn_id } = self.stage {
            warn!("turn {turn_id} is still in flight");
            return Err(Error::TurnInProgress);
        }

        let msg = Message::new(Role::User, input);
        info!("received user input: {}", shorten(msg.text(), SUMMARY_WIDTH));
        let user_index = self.conversation.push(msg);
        let request = build_request(&self.conversation, &self.config);
        let streaming = self.config.streaming();
        let id = NEXT_TURN_ID.fetch_add(1, Ordering::Relaxed);
        self.stage = TurnStage::AwaitingResponse { turn_id: id };
        info!(
            "generating {} response with {}",
            if streaming { "streaming" } else { "non-streaming" },
            self.config.model()
        );
        debug!(
            "turn {id} started with {} request messages",
            request.messages.len()
        );

        Ok(PendingTurn {
            ticket: TurnTicket {
                id,
                epoch: self.epoch,
                user_index,
            },
            request,
            streaming,
        })
    }

    /// Finishes a turn with the assembled assistant text or the failure.
    ///
    /// On success exactly one assistant message is appended and returned.
    /// On failure nothing is appended and the user message of the turn is
    /// taken back out of the history. Either way the session becomes idle
    /// and queued settings are applied.
    pub fn finish_turn(
        &mut self,
        turn: PendingTurn,
        outcome: Result<String, Error>,
    ) -> Result<&Message, Error> {
        let turn = turn.ticket;
        if !self.is_current(turn) {
            warn!("turn {} is not the current turn", turn.id);
            return Err(Error::TurnDiscarded);
        }
        self.stage = TurnStage::Idle;

        let result = if turn.epoch != self.epoch {
            info!(
                "dropping the response of turn {}, history was cleared",
                turn.id
            );
            Err(Error::TurnDiscarded)
        } else {
            match outcome {
                Ok(text) if text.is_empty() => {
                    warn!("turn {} got an empty response", turn.id);
                    self.conversation.remove(turn.user_index);
                    Err(Error::EmptyResponse)
                }
                Ok(text) => {
                    info!(
                        "assistant response: {}",
                        shorten(&text, SUMMARY_WIDTH)
                    );
                    let msg = Message::new(Role::Assistant, text);
                    Ok(self.conversation.push(msg))
                }
                Err(err) => {
                    error!("turn {} failed: {err}", turn.id);
                    self.conversation.remove(turn.user_index);
                    Err(err)
                }
            }
        };

        self.drain_pending_settings();
        result.map(|idx| &self.conversation.messages()[idx])
    }

    /// Gives up a turn without an outcome.
    ///
    /// The user message of the turn is taken back out of the history, the
    /// session becomes idle and queued settings are applied. Turns that are
    /// not in flight in this session are ignored.
    pub fn abort_turn(&mut self, turn: PendingTurn) {
        self.abort(turn.ticket);
    }

    /// Runs a whole turn against `client`.
    ///
    /// When streaming, `on_partial` is called with the text accumulated so
    /// far after every received delta. If the returned future is dropped
    /// before it completes, the turn is aborted.
    pub async fn send_message<S, F>(
        &mut self,
        client: &ModelClient,
        input: S,
        mut on_partial: F,
    ) -> Result<&Message, Error>
    where
        S: Into<String>,
        F: FnMut(&str),
    {
        let turn = self.begin_turn(input)?;
        let guard = TurnGuard {
            session: Some(self),
            ticket: turn.ticket,
        };
        let outcome = if turn.streaming() {
            let mut stream = client.stream(turn.request());
            let mut failure = None;
            while let Some(delta) = stream.next().await {
                match delta {
                    Ok(_) => on_partial(stream.accumulated()),
                    Err(err) => failure = Some(err),
                }
            }
            match failure {
                Some(err) => Err(err),
                None => Ok(stream.into_text()),
            }
        } else {
            client.complete(turn.request()).await
        };
        guard.finish(turn, outcome)
    }

    fn is_current(&self, turn: TurnTicket) -> bool {
        self.stage == (TurnStage::AwaitingResponse { turn_id: turn.id })
    }

    fn abort(&mut self, turn: TurnTicket) {
        if !self.is_current(turn) {
            warn!("turn {} is not the current turn", turn.id);
            return;
        }
        self.stage = TurnStage::Idle;
        if turn.epoch == self.epoch {
            self.conversation.remove(turn.user_index);
        }
        info!("turn {} cancelled", turn.id);
        self.drain_pending_settings();
    }

    /// The preset that will be selected once queued settings are applied.
    fn effective_preset(&self) -> SystemPromptPreset {
        self.pending_settings
            .iter()
            .rev()
            .find_map(|s| match s {
                Setting::SystemPromptPreset(p) => Some(*p),
                _ => None,
            })
            .unwrap_or(self.preset)
    }

    fn submit_setting(
        &mut self,
        setting: Setting,
    ) -> Result<SettingOutcome, Error> {
        setting.validate()?;
        if self.is_busy() {
            info!(
                "{} change queued until the response is complete",
                setting.field()
            );
            self.pending_settings.push_back(setting);
            return Ok(SettingOutcome::Queued);
        }
        Ok(self.apply_setting(setting))
    }

    fn drain_pending_settings(&mut self) {
        while let Some(setting) = self.pending_settings.pop_front() {
            self.apply_setting(setting);
        }
    }

    /// Applies a validated setting.
    fn apply_setting(&mut self, setting: Setting) -> SettingOutcome {
        let config = &mut self.config;
        match setting {
            Setting::Model(model) => {
                if config.model == model {
                    return SettingOutcome::Unchanged;
                }
                info!("model changed: {} -> {model}", config.model);
                config.model = model;
            }
            Setting::Temperature(temperature) => {
                if config.temperature == temperature {
                    return SettingOutcome::Unchanged;
                }
                info!(
                    "temperature changed: {} -> {temperature}",
                    config.temperature
                );
                config.temperature = temperature;
            }
            Setting::TopK(top_k) => {
                if config.top_k == top_k {
                    return SettingOutcome::Unchanged;
                }
                info!("top_k changed: {} -> {top_k}", config.top_k);
                config.top_k = top_k;
            }
            Setting::Streaming(streaming) => {
                if config.streaming == streaming {
                    return SettingOutcome::Unchanged;
                }
                info!(
                    "streaming changed: {} -> {streaming}",
                    config.streaming
                );
                config.streaming = streaming;
            }
            Setting::SystemPromptPreset(preset) => {
                if self.preset == preset {
                    return SettingOutcome::Unchanged;
                }
                info!(
                    "system prompt preset changed: {} -> {preset}",
                    self.preset
                );
                self.preset = preset;
                config.system_prompt = match preset.text() {
                    Some(text) => text.to_owned(),
                    None => self.last_custom_prompt.clone(),
                };
            }
            Setting::CustomSystemPrompt(text) => {
                if self.last_custom_prompt == text {
                    return SettingOutcome::Unchanged;
                }
                info!(
                    "custom system prompt changed: {:?} -> {:?}",
                    shorten(&self.last_custom_prompt, SUMMARY_WIDTH),
                    shorten(&text, SUMMARY_WIDTH)
                );
                if self.preset == SystemPromptPreset::Custom {
                    config.system_prompt = text.clone();
                }
                self.last_custom_prompt = text;
            }
        }
        SettingOutcome::Changed
    }
}

/// Aborts the turn when dropped before [`TurnGuard::finish`].
struct TurnGuard<'a> {
    session: Option<&'a mut ChatSession>,
    ticket: TurnTicket,
}

impl<'a> TurnGuard<'a> {
    fn finish(
        mut self,
        turn: PendingTurn,
        outcome: Result<String, Error>,
    ) -> Result<&'a Message, Error> {
        match self.session.take() {
            Some(session) => session.finish_turn(turn, outcome),
            None => Err(Error::TurnDiscarded),
        }
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.abort(self.ticket);
        }
    }
}

impl Default for ChatSession {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Collapses whitespace and truncates `text` at a word boundary so that it
/// fits in `width` characters, placeholder included.
pub(crate) fn shorten(text: &str, width: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let full_len =
        words.iter().map(|w| w.chars().count()).sum::<usize>()
            + words.len().saturating_sub(1);
    if full_len <= width {
        return words.join(" ");
    }

    let budget = width.saturating_sub(SUMMARY_PLACEHOLDER.len());
    let mut out = String::new();
    let mut len = 0;
    for word in words {
        let sep = usize::from(len > 0);
        let word_len = word.chars().count();
        if len + sep + word_len > budget {
            break;
        }
        if sep > 0 {
            out.push(' ');
        }
        out.push_str(word);
        len += sep + word_len;
    }
    out.push_str(SUMMARY_PLACEHOLDER);
    out
}
