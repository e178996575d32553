//! Conversation state for one chat screen
//!
//! `ChatSession` owns the transcript, the draft being typed, and the
//! generation settings. It performs no I/O: `submit` hands back the request
//! to send, and the caller reports the outcome through `complete`.

use tracing::debug;

use crate::api::{GenerateParams, Generation, ModelInfo, ModelList};
use crate::config::Settings;
use crate::error::ClientError;
use crate::state::{ChatMessage, ChatRole, WireMessage};

pub const TEMPERATURE_MIN: f32 = 0.0;
pub const TEMPERATURE_MAX: f32 = 2.0;
pub const TEMPERATURE_STEP: f32 = 0.1;
pub const MAX_TOKENS_STEP: i64 = 256;
pub const MAX_TOKENS_LIMIT: u32 = 32_768;

/// Identifies one generation request.
///
/// The epoch changes on every reset, so a result for a request issued
/// before the reset never matches the current ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
    seq: u64,
}

/// A submission that is ready to be sent
#[derive(Debug, Clone)]
pub struct PendingGeneration {
    pub ticket: Ticket,
    pub params: GenerateParams,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    draft: String,
    cursor: usize, // in chars

    selected_model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,

    models: Vec<ModelInfo>,
    provider: Option<String>,
    models_loading: bool,

    show_settings: bool,
    error: Option<String>,

    pending: Option<Ticket>,
    epoch: u64,
    next_seq: u64,
}

impl ChatSession {
    pub fn new(settings: &Settings) -> Self {
        Self {
            messages: Vec::new(),
            draft: String::new(),
            cursor: 0,
            selected_model: settings.default_model.clone(),
            temperature: settings.temperature.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX),
            max_tokens: settings.max_tokens,
            system_prompt: settings.system_prompt.clone(),
            models: Vec::new(),
            provider: None,
            models_loading: false,
            show_settings: false,
            error: None,
            pending: None,
            epoch: 0,
            next_seq: 0,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn models_loading(&self) -> bool {
        self.models_loading
    }

    pub fn show_settings(&self) -> bool {
        self.show_settings
    }

    /// Banner text for the most recent failure
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_generating(&self) -> bool {
        self.pending.is_some()
    }

    // Draft editing

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
        self.cursor = self.draft.chars().count();
    }

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.draft, self.cursor);
        self.draft.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        let byte_pos = char_to_byte_index(&self.draft, self.cursor);
        self.draft.insert_str(byte_pos, text);
        self.cursor += text.chars().count();
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.draft, self.cursor);
            self.draft.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.draft.chars().count() {
            let byte_pos = char_to_byte_index(&self.draft, self.cursor);
            self.draft.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.draft.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.draft.chars().count();
    }

    // Conversation

    /// Messages to replay for a new user turn: the system directive (if
    /// any), then the transcript as it stands, then the new message.
    pub fn build_messages(&self, user_content: &str) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(self.messages.len() + 2);

        if let Some(system_prompt) = &self.system_prompt {
            messages.push(WireMessage::new(ChatRole::System, system_prompt.as_str()));
        }

        messages.extend(self.messages.iter().map(ChatMessage::to_wire));
        messages.push(WireMessage::new(ChatRole::User, user_content));
        messages
    }

    /// Turn the draft into a user message and the request to send.
    ///
    /// Returns `None` without touching any state when the draft is blank or
    /// a generation is already in flight.
    pub fn submit(&mut self) -> Option<PendingGeneration> {
        let content = self.draft.trim().to_string();
        if content.is_empty() || self.pending.is_some() {
            return None;
        }

        let messages = self.build_messages(&content);
        self.messages.push(ChatMessage::user(content));
        self.draft.clear();
        self.cursor = 0;
        self.error = None;

        let ticket = Ticket {
            epoch: self.epoch,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending = Some(ticket);

        let params = GenerateParams {
            messages,
            model: Some(self.selected_model.clone()),
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
        };

        Some(PendingGeneration { ticket, params })
    }

    /// Apply the outcome of the request identified by `ticket`.
    ///
    /// Returns `false` when the result is stale (the transcript was reset
    /// after the request went out) and was dropped.
    pub fn complete(&mut self, ticket: Ticket, result: Result<Generation, ClientError>) -> bool {
        if self.pending != Some(ticket) {
            debug!(?ticket, "discarding result of abandoned generation");
            return false;
        }
        self.pending = None;

        match result {
            Ok(generation) => {
                self.messages.push(ChatMessage::assistant(generation.content));
            }
            Err(err) => {
                let message = err.to_string();
                self.messages.push(ChatMessage::failure(&message));
                self.error = Some(message);
            }
        }
        true
    }

    /// Clear the transcript. An in-flight generation is abandoned and its
    /// result will be discarded on arrival.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.pending = None;
        self.epoch += 1;
    }

    pub fn dismiss_error(&mut self) {
        self.error = None;
    }

    // Models

    pub fn begin_models_load(&mut self) {
        self.models_loading = true;
    }

    pub fn finish_models_load(&mut self, result: Result<ModelList, ClientError>) {
        self.models_loading = false;
        match result {
            Ok(list) => {
                self.models = list.models;
                self.provider = Some(list.provider).filter(|p| !p.is_empty());
            }
            Err(err) => {
                self.error = Some(err.to_string());
            }
        }
    }

    /// Display name of the selected model, or its id until the list is known
    pub fn selected_model_label(&self) -> &str {
        if self.models_loading {
            return &self.selected_model;
        }
        self.models
            .iter()
            .find(|m| m.id == self.selected_model)
            .map(|m| m.name.as_str())
            .unwrap_or(&self.selected_model)
    }

    pub fn selected_model_index(&self) -> Option<usize> {
        self.models.iter().position(|m| m.id == self.selected_model)
    }

    pub fn select_model(&mut self, id: &str) {
        self.selected_model = id.to_string();
    }

    // Settings

    pub fn toggle_settings(&mut self) {
        self.show_settings = !self.show_settings;
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = temperature.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);
    }

    /// Step the temperature, keeping it on one decimal place
    pub fn adjust_temperature(&mut self, delta: f32) {
        let stepped = ((self.temperature + delta) * 10.0).round() / 10.0;
        self.set_temperature(stepped);
    }

    /// `None` (or zero) leaves the cap to the endpoint
    pub fn set_max_tokens(&mut self, max_tokens: Option<u32>) {
        self.max_tokens = max_tokens
            .map(|n| n.min(MAX_TOKENS_LIMIT))
            .filter(|&n| n > 0);
    }

    /// Step the token cap. Stepping down past zero removes the cap.
    pub fn adjust_max_tokens(&mut self, delta: i64) {
        let current = i64::from(self.max_tokens.unwrap_or(0));
        let stepped = (current + delta).clamp(0, i64::from(MAX_TOKENS_LIMIT));
        self.set_max_tokens(u32::try_from(stepped).ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Usage;

    fn session() -> ChatSession {
        ChatSession::new(&Settings::new("http://localhost/chat"))
    }

    fn generation(content: &str) -> Generation {
        Generation {
            content: content.to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            usage: Usage::default(),
            finish_reason: "stop".to_string(),
        }
    }

    fn network_error() -> ClientError {
        ClientError::Transport("error sending request".to_string())
    }

    #[test]
    fn test_submit_appends_user_message_and_clears_draft() {
        let mut s = session();
        s.set_draft("  Hello  ");

        let pending = s.submit().unwrap();

        assert_eq!(s.messages().len(), 1);
        assert_eq!(s.messages()[0].role, ChatRole::User);
        assert_eq!(s.messages()[0].content, "Hello");
        assert_eq!(s.draft(), "");
        assert_eq!(s.cursor(), 0);
        assert!(s.is_generating());
        assert_eq!(pending.params.model.as_deref(), Some("openai/gpt-4o-mini"));
        assert_eq!(pending.params.temperature, Some(0.7));
    }

    #[test]
    fn test_hello_on_empty_transcript_payload() {
        let mut s = session();
        s.set_draft("Hello");

        let pending = s.submit().unwrap();
        assert_eq!(pending.params.messages, vec![WireMessage::new(ChatRole::User, "Hello")]);
    }

    #[test]
    fn test_submit_blank_draft_is_noop() {
        let mut s = session();
        s.set_draft("   \n\t ");

        assert!(s.submit().is_none());
        assert!(s.messages().is_empty());
        assert_eq!(s.draft(), "   \n\t ");
        assert!(!s.is_generating());
    }

    #[test]
    fn test_submit_while_generating_is_noop() {
        let mut s = session();
        s.set_draft("first");
        s.submit().unwrap();

        s.set_draft("second");
        assert!(s.submit().is_none());
        assert_eq!(s.messages().len(), 1);
        assert_eq!(s.draft(), "second");
    }

    #[test]
    fn test_payload_replays_history_in_order() {
        let mut s = session();
        for (question, answer) in [("one", "uno"), ("two", "dos")] {
            s.set_draft(question);
            let pending = s.submit().unwrap();
            s.complete(pending.ticket, Ok(generation(answer)));
        }

        let prior: Vec<WireMessage> = s.messages().iter().map(ChatMessage::to_wire).collect();
        s.set_draft("three");
        let pending = s.submit().unwrap();

        assert_eq!(pending.params.messages.len(), prior.len() + 1);
        assert_eq!(&pending.params.messages[..prior.len()], prior.as_slice());
        assert_eq!(
            pending.params.messages.last(),
            Some(&WireMessage::new(ChatRole::User, "three"))
        );
    }

    #[test]
    fn test_payload_starts_with_system_directive() {
        let mut settings = Settings::new("http://localhost/chat");
        settings.system_prompt = Some("Answer briefly.".to_string());
        let mut s = ChatSession::new(&settings);
        s.set_draft("Hi");

        let pending = s.submit().unwrap();
        assert_eq!(
            pending.params.messages,
            vec![
                WireMessage::new(ChatRole::System, "Answer briefly."),
                WireMessage::new(ChatRole::User, "Hi"),
            ]
        );
        // The directive is sent, never stored
        assert_eq!(s.messages().len(), 1);
    }

    #[test]
    fn test_success_appends_assistant_message() {
        let mut s = session();
        s.set_draft("Hello");
        let pending = s.submit().unwrap();

        assert!(s.complete(pending.ticket, Ok(generation("Hi! How can I help?"))));

        assert_eq!(s.messages().len(), 2);
        assert_eq!(s.messages()[1].role, ChatRole::Assistant);
        assert_eq!(s.messages()[1].content, "Hi! How can I help?");
        assert!(!s.messages()[1].failed);
        assert_eq!(s.error(), None);
        assert!(!s.is_generating());
    }

    #[test]
    fn test_failure_is_visible_in_transcript_and_banner() {
        let mut s = session();
        s.set_draft("Hello");
        let pending = s.submit().unwrap();

        s.complete(pending.ticket, Err(network_error()));

        let last = s.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "Error: error sending request");
        assert!(last.failed);
        assert_eq!(s.error(), Some("error sending request"));
        assert!(!s.is_generating());
    }

    #[test]
    fn test_next_submit_clears_banner() {
        let mut s = session();
        s.set_draft("Hello");
        let pending = s.submit().unwrap();
        s.complete(pending.ticket, Err(network_error()));

        s.set_draft("again");
        s.submit().unwrap();
        assert_eq!(s.error(), None);
    }

    #[test]
    fn test_reset_is_idempotent_and_keeps_draft_and_model() {
        let mut s = session();
        s.set_draft("Hello");
        let pending = s.submit().unwrap();
        s.complete(pending.ticket, Ok(generation("Hi")));
        s.select_model("openai/gpt-4o");
        s.set_draft("unsent");

        s.reset();
        assert!(s.messages().is_empty());
        s.reset();
        assert!(s.messages().is_empty());
        assert_eq!(s.draft(), "unsent");
        assert_eq!(s.selected_model(), "openai/gpt-4o");
    }

    #[test]
    fn test_result_after_reset_is_discarded() {
        let mut s = session();
        s.set_draft("Hello");
        let stale = s.submit().unwrap();

        s.reset();
        assert!(!s.is_generating());

        s.set_draft("Fresh start");
        let current = s.submit().unwrap();

        assert!(!s.complete(stale.ticket, Ok(generation("late reply"))));
        assert_eq!(s.messages().len(), 1);
        assert!(s.is_generating());

        assert!(s.complete(current.ticket, Ok(generation("on time"))));
        assert_eq!(s.messages()[1].content, "on time");
    }

    #[test]
    fn test_model_label_prefers_display_name_once_loaded() {
        let mut s = session();
        s.begin_models_load();
        assert!(s.models_loading());
        assert_eq!(s.selected_model_label(), "openai/gpt-4o-mini");

        s.finish_models_load(Ok(ModelList {
            models: vec![ModelInfo {
                id: "openai/gpt-4o-mini".to_string(),
                name: "GPT-4o mini".to_string(),
                description: None,
            }],
            provider: "polza.ai".to_string(),
        }));

        assert!(!s.models_loading());
        assert_eq!(s.selected_model_label(), "GPT-4o mini");
        assert_eq!(s.provider(), Some("polza.ai"));
        assert_eq!(s.selected_model_index(), Some(0));
    }

    #[test]
    fn test_models_failure_sets_banner() {
        let mut s = session();
        s.begin_models_load();
        s.finish_models_load(Err(ClientError::Api {
            status: 503,
            message: "API unavailable".to_string(),
        }));

        assert!(!s.models_loading());
        assert!(s.models().is_empty());
        assert_eq!(s.error(), Some("API unavailable"));
        assert_eq!(s.selected_model_label(), "openai/gpt-4o-mini");
    }

    #[test]
    fn test_temperature_stays_in_range() {
        let mut s = session();
        for _ in 0..30 {
            s.adjust_temperature(TEMPERATURE_STEP);
        }
        assert_eq!(s.temperature(), TEMPERATURE_MAX);

        for _ in 0..30 {
            s.adjust_temperature(-TEMPERATURE_STEP);
        }
        assert_eq!(s.temperature(), TEMPERATURE_MIN);

        s.set_temperature(0.7);
        s.adjust_temperature(TEMPERATURE_STEP);
        assert_eq!(s.temperature(), 0.8);
    }

    #[test]
    fn test_token_cap_steps_and_clears() {
        let mut s = session();
        assert_eq!(s.max_tokens(), None);

        s.adjust_max_tokens(MAX_TOKENS_STEP);
        assert_eq!(s.max_tokens(), Some(256));
        s.adjust_max_tokens(MAX_TOKENS_STEP);
        s.set_draft("Hello");
        assert_eq!(s.submit().unwrap().params.max_tokens, Some(512));

        s.adjust_max_tokens(-3 * MAX_TOKENS_STEP);
        assert_eq!(s.max_tokens(), None);

        s.set_max_tokens(Some(1_000_000));
        assert_eq!(s.max_tokens(), Some(MAX_TOKENS_LIMIT));
        s.set_max_tokens(Some(0));
        assert_eq!(s.max_tokens(), None);
    }

    #[test]
    fn test_draft_editing_is_utf8_safe() {
        let mut s = session();
        s.insert_str("héllo");
        s.cursor_home();
        s.cursor_right();
        s.delete();
        assert_eq!(s.draft(), "hllo");

        s.insert_char('é');
        s.cursor_end();
        s.backspace();
        assert_eq!(s.draft(), "héll");
        assert_eq!(s.cursor(), 4);

        s.cursor_home();
        s.backspace();
        assert_eq!(s.draft(), "héll");
    }
}
