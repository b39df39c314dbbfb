use neo_core::conversation::{Conversation, Role};
use neo_core::settings::{
    ChatOptions, GenerationConfig, Setting, SystemPromptPreset,
};
use neo_core::{ChatSession, Error, ModelClient, SettingOutcome};
use neo_model::ModelProvider;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    client: ModelClient,
    options: ChatOptions,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self {
            client: ModelClient::new(provider),
            options: ChatOptions::default(),
        }
    }

    /// Sets the initial options of the session.
    #[inline]
    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds a new session.
    ///
    /// Fails if any of the options is outside its domain.
    pub fn build(self) -> Result<Session, Error> {
        let chat = ChatSession::with_options(&self.options)?;
        Ok(Session {
            client: self.client,
            chat,
        })
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session pairs the conversation state with a model client, and it is
/// basically a wrapper around [`ChatSession`].
pub struct Session {
    client: ModelClient,
    chat: ChatSession,
}

impl Session {
    /// Sends a message and waits for the assistant's reply.
    ///
    /// With streaming enabled, `on_partial` receives the text accumulated
    /// so far each time a fragment arrives.
    pub async fn send_message(
        &mut self,
        message: &str,
        on_partial: impl FnMut(&str),
    ) -> Result<String, Error> {
        let msg = self
            .chat
            .send_message(&self.client, message, on_partial)
            .await?;
        Ok(msg.text().to_owned())
    }

    /// Changes one setting.
    #[inline]
    pub fn update_setting(
        &mut self,
        setting: Setting,
    ) -> Result<SettingOutcome, Error> {
        self.chat.update_setting(setting)
    }

    /// Empties the history.
    #[inline]
    pub fn clear_history(&mut self) {
        self.chat.clear_history();
    }

    /// Returns the history.
    #[inline]
    pub fn history(&self) -> &Conversation {
        self.chat.history()
    }

    /// Returns the current generation settings.
    #[inline]
    pub fn config(&self) -> &GenerationConfig {
        self.chat.config()
    }

    /// Returns the selected system prompt preset.
    #[inline]
    pub fn preset(&self) -> SystemPromptPreset {
        self.chat.preset()
    }

    /// Returns a printable summary of the current settings.
    pub fn describe_settings(&self) -> String {
        let config = self.config();
        let mut lines = vec![
            format!(
                "model:       {} ({})",
                config.model(),
                config.model().model_id()
            ),
            format!("temperature: {}", config.temperature()),
            format!("top-k:       {}", config.top_k()),
            format!("streaming:   {}", on_off(config.streaming())),
            format!("preset:      {}", self.preset()),
        ];
        if self.preset() == SystemPromptPreset::Custom {
            lines.push(format!("prompt:      {:?}", config.system_prompt()));
        }
        let turns = self
            .history()
            .iter()
            .filter(|m| m.role() == Role::User)
            .count();
        lines.push(format!("history:     {turns} user messages"));
        lines.join("\n")
    }
}

#[inline]
fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use neo_core::settings::ModelChoice;
    use neo_test_model::{PresetResponse, TestModelProvider};

    use super::*;

    #[tokio::test]
    async fn test_send_message() {
        let provider = TestModelProvider::single_turn(
            PresetResponse::with_deltas(["Hi ", "there"]),
        );
        let mut session = SessionBuilder::with_model_provider(provider)
            .build()
            .unwrap();
        let mut last_partial = String::new();
        let reply = session
            .send_message("Hello", |text| last_partial = text.to_owned())
            .await
            .unwrap();
        assert_eq!(reply, "Hi there");
        assert_eq!(last_partial, "Hi there");
        assert_eq!(session.history().len(), 2);
        assert!(session.describe_settings().contains("1 user messages"));
    }

    #[test]
    fn test_build_with_options() {
        let options = ChatOptions {
            model_id: Some("Claude 2.1".to_owned()),
            streaming_enabled: Some(false),
            ..Default::default()
        };
        let session =
            SessionBuilder::with_model_provider(TestModelProvider::default())
                .with_options(options)
                .build()
                .unwrap();
        assert_eq!(session.config().model(), ModelChoice::Claude21);
        assert!(session.describe_settings().contains("streaming:   off"));

        let options = ChatOptions {
            temperature: Some(2.0),
            ..Default::default()
        };
        let result =
            SessionBuilder::with_model_provider(TestModelProvider::default())
                .with_options(options)
                .build();
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
