use std::path::PathBuf;

use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::ui::message_lines;
use gpt_playground::{
    ChatSession, ClientError, Config, Generation, ModelList, PanelLayout,
    PlaygroundClient, Settings, Ticket,
};

/// Rows a line of `width` columns takes when wrapped; empty lines still take one
fn wrapped_rows(width: usize, wrap_width: usize) -> u16 {
    width.div_ceil(wrap_width).max(1).try_into().unwrap_or(u16::MAX)
}

type GenerationTask = JoinHandle<Result<Generation, ClientError>>;
type ModelsTask = JoinHandle<Result<ModelList, ClientError>>;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub session: ChatSession,
    pub client: PlaygroundClient,

    // Presentation
    pub layout: PanelLayout,
    pub title: String,
    pub placeholder: String,
    config_path: Option<PathBuf>,

    // In-flight requests
    generation_task: Option<(Ticket, GenerationTask)>,
    models_task: Option<ModelsTask>,

    // Chat view state
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of the chat area, set during render
    pub chat_width: u16,  // inner width, for wrap calculations
    pub chat_area: Option<Rect>,
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Model picker state
    pub show_model_picker: bool,
    pub model_picker_state: ListState,
}

impl App {
    pub fn new(settings: &Settings, client: PlaygroundClient, config_path: Option<PathBuf>) -> Self {
        Self {
            should_quit: false,
            session: ChatSession::new(settings),
            client,

            layout: settings.layout,
            title: settings.title.clone(),
            placeholder: settings.placeholder.clone(),
            config_path,

            generation_task: None,
            models_task: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,

            show_model_picker: false,
            model_picker_state: ListState::default(),
        }
    }

    /// Start loading the model list, unless a load is already running
    pub fn mount(&mut self) {
        if self.models_task.is_some() {
            return;
        }

        self.session.begin_models_load();
        let client = self.client.clone();
        self.models_task = Some(tokio::spawn(async move { client.get_models().await }));
    }

    pub fn submit(&mut self) {
        let Some(pending) = self.session.submit() else {
            return;
        };

        info!(
            model = pending.params.model.as_deref().unwrap_or_default(),
            messages = pending.params.messages.len(),
            "submitting generation"
        );

        let client = self.client.clone();
        let params = pending.params;
        let task = tokio::spawn(async move { client.generate(&params).await });
        self.generation_task = Some((pending.ticket, task));
        self.scroll_chat_to_bottom();
    }

    /// Clear the conversation and abandon any request still running
    pub fn reset(&mut self) {
        if let Some((_, task)) = self.generation_task.take() {
            task.abort();
            info!("abandoned in-flight generation");
        }
        self.session.reset();
        self.chat_scroll = 0;
    }

    /// Fold finished requests back into the session
    pub async fn poll_tasks(&mut self) {
        if self.models_task.as_ref().is_some_and(|task| task.is_finished()) {
            if let Some(task) = self.models_task.take() {
                let result = task.await.unwrap_or_else(|err| Err(ClientError::transport(err)));
                match &result {
                    Ok(list) => info!(count = list.models.len(), provider = %list.provider, "models loaded"),
                    Err(err) => warn!(error = %err, "could not load models"),
                }
                self.session.finish_models_load(result);
            }
        }

        if self.generation_task.as_ref().is_some_and(|(_, task)| task.is_finished()) {
            if let Some((ticket, task)) = self.generation_task.take() {
                let result = task.await.unwrap_or_else(|err| Err(ClientError::transport(err)));
                if let Ok(generation) = &result {
                    info!(
                        model = %generation.model,
                        total_tokens = generation.usage.total_tokens,
                        finish_reason = %generation.finish_reason,
                        "generation finished"
                    );
                }
                if self.session.complete(ticket, result) {
                    self.scroll_chat_to_bottom();
                }
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_generating() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    /// Number of rendered lines the chat needs at the current width
    pub fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.session.messages() {
            for line in message_lines(msg) {
                total_lines = total_lines.saturating_add(wrapped_rows(line.width(), wrap_width));
            }
        }

        if self.session.is_generating() {
            total_lines = total_lines.saturating_add(2); // "AI:" + "Thinking..."
        }
        total_lines
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_scroll = self.chat_line_count().saturating_sub(visible_height);
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        let max_scroll = self.chat_line_count().saturating_sub(visible_height);
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max_scroll);
    }

    // Model picker methods
    pub fn open_model_picker(&mut self) {
        if self.session.models().is_empty() {
            // Nothing to pick from yet; try loading again
            if !self.session.models_loading() {
                self.mount();
            }
            return;
        }
        self.model_picker_state
            .select(Some(self.session.selected_model_index().unwrap_or(0)));
        self.show_model_picker = true;
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.session.models().len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        let Some(model) = self
            .model_picker_state
            .selected()
            .and_then(|i| self.session.models().get(i))
            .map(|m| m.id.clone())
        else {
            return;
        };

        self.session.select_model(&model);
        self.show_model_picker = false;

        if let Some(path) = &self.config_path {
            if let Err(err) = Config::save_default_model(path, &model) {
                warn!(error = %err, "could not save default model");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpt_playground::{ChatRole, ModelInfo};

    fn app_for(api_url: &str) -> App {
        let settings = Settings::new(api_url);
        let client = PlaygroundClient::new(&settings.api_url);
        App::new(&settings, client, None)
    }

    fn app() -> App {
        app_for("http://127.0.0.1:1/chat")
    }

    /// An address nothing is listening on
    async fn dead_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/chat", addr)
    }

    fn reply(content: &str) -> Generation {
        Generation {
            content: content.to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            usage: Default::default(),
            finish_reason: "stop".to_string(),
        }
    }

    fn loaded_models() -> ModelList {
        ModelList {
            models: vec![
                ModelInfo {
                    id: "openai/gpt-4o-mini".to_string(),
                    name: "GPT-4o mini".to_string(),
                    description: None,
                },
                ModelInfo {
                    id: "openai/gpt-4o".to_string(),
                    name: "GPT-4o".to_string(),
                    description: Some("Flagship".to_string()),
                },
            ],
            provider: "polza.ai".to_string(),
        }
    }

    #[tokio::test]
    async fn test_reset_abandons_running_generation() {
        let mut app = app();
        app.session.set_draft("Hello");
        app.submit();
        assert!(app.session.is_generating());

        app.reset();
        assert!(!app.session.is_generating());
        assert!(app.session.messages().is_empty());

        // Nothing is left to poll
        app.poll_tasks().await;
        assert!(app.session.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_generation_surfaces_after_poll() {
        let mut app = app_for(&dead_endpoint().await);
        app.session.set_draft("Hello");
        app.submit();

        for _ in 0..100 {
            app.poll_tasks().await;
            if !app.session.is_generating() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        assert!(!app.session.is_generating());
        assert!(!app.client.is_loading());
        let last = app.session.messages().last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert!(last.content.starts_with("Error: "));
        assert!(app.session.error().is_some());
    }

    #[test]
    fn test_model_picker_selects_and_closes() {
        let mut app = app();
        app.session.finish_models_load(Ok(loaded_models()));

        app.open_model_picker();
        assert!(app.show_model_picker);
        assert_eq!(app.model_picker_state.selected(), Some(0));

        app.model_picker_nav_down();
        app.model_picker_nav_down();
        app.select_model();

        assert!(!app.show_model_picker);
        assert_eq!(app.session.selected_model(), "openai/gpt-4o");
        assert_eq!(app.session.selected_model_label(), "GPT-4o");
    }

    #[test]
    fn test_chat_line_count_wraps_long_lines() {
        let mut app = app();
        app.chat_width = 10;
        app.session.set_draft("x".repeat(25));
        assert!(app.session.submit().is_some());

        // role line + 3 wrapped lines + blank line + thinking indicator
        assert_eq!(app.chat_line_count(), 1 + 3 + 1 + 2);
    }

    #[test]
    fn test_chat_line_count_matches_rendered_rows() {
        let mut app = app();
        app.chat_width = 10;

        // Exactly one row wide, then an empty reply
        app.session.set_draft("x".repeat(10));
        let pending = app.session.submit().unwrap();
        assert_eq!(app.chat_line_count(), 1 + 1 + 1 + 2);
        app.session.complete(pending.ticket, Ok(reply("")));
        assert_eq!(app.chat_line_count(), 3 + 3);

        // A failure spanning two lines is drawn, and counted, line by line
        app.session.set_draft("again");
        let pending = app.session.submit().unwrap();
        app.session.complete(
            pending.ticket,
            Err(ClientError::Transport("bad\ngateway".to_string())),
        );
        assert_eq!(app.chat_line_count(), 3 + 3 + 3 + 4);
    }
}
