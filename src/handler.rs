use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use gpt_playground::session::{MAX_TOKENS_STEP, TEMPERATURE_STEP};
use crate::app::App;
use crate::tui::AppEvent;

const MOUSE_SCROLL_LINES: u16 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => {
            // Terminals deliver pasted newlines as \r
            let text = text.replace("\r\n", "\n").replace('\r', "\n");
            app.session.insert_str(&text);
        }
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if app.show_model_picker {
        handle_model_picker(app, key);
        return;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        handle_control(app, key);
        return;
    }

    match key.code {
        // Esc peels back one layer at a time: banner, settings, then quit
        KeyCode::Esc => {
            if app.session.error().is_some() {
                app.session.dismiss_error();
            } else if app.session.show_settings() {
                app.session.toggle_settings();
            } else {
                app.should_quit = true;
            }
        }

        KeyCode::Enter => {
            if key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) {
                app.session.insert_char('\n');
            } else {
                app.submit();
            }
        }

        // Chat scrolling
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::PageUp => app.scroll_chat_up((app.chat_height / 2).max(1)),
        KeyCode::PageDown => app.scroll_chat_down((app.chat_height / 2).max(1)),

        // Draft editing
        KeyCode::Backspace => app.session.backspace(),
        KeyCode::Delete => app.session.delete(),
        KeyCode::Left => app.session.cursor_left(),
        KeyCode::Right => app.session.cursor_right(),
        KeyCode::Home => app.session.cursor_home(),
        KeyCode::End => app.session.cursor_end(),
        KeyCode::Char(c) => app.session.insert_char(c),

        _ => {}
    }
}

fn handle_control(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('l') => app.reset(),
        KeyCode::Char('s') => app.session.toggle_settings(),
        KeyCode::Char('o') => app.open_model_picker(),
        KeyCode::Char('r') => app.mount(),
        KeyCode::Char('u') => app.session.set_draft(""),

        // Temperature and token cap, only while the settings are on screen
        KeyCode::Up if app.session.show_settings() => {
            app.session.adjust_temperature(TEMPERATURE_STEP);
        }
        KeyCode::Down if app.session.show_settings() => {
            app.session.adjust_temperature(-TEMPERATURE_STEP);
        }
        KeyCode::Right if app.session.show_settings() => {
            app.session.adjust_max_tokens(MAX_TOKENS_STEP);
        }
        KeyCode::Left if app.session.show_settings() => {
            app.session.adjust_max_tokens(-MAX_TOKENS_STEP);
        }
        _ => {}
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_chat_down(MOUSE_SCROLL_LINES),
        MouseEventKind::ScrollUp => app.scroll_chat_up(MOUSE_SCROLL_LINES),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpt_playground::{ModelInfo, ModelList, PlaygroundClient, Settings};

    fn app() -> App {
        let settings = Settings::new("http://127.0.0.1:1/chat");
        let client = PlaygroundClient::new(&settings.api_url);
        App::new(&settings, client, None)
    }

    fn press(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        handle_event(app, AppEvent::Key(KeyEvent::new(code, modifiers)));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    #[test]
    fn test_shift_enter_inserts_newline() {
        let mut app = app();
        type_text(&mut app, "one");
        press(&mut app, KeyCode::Enter, KeyModifiers::SHIFT);
        type_text(&mut app, "two");

        assert_eq!(app.session.draft(), "one\ntwo");
        assert!(app.session.messages().is_empty());
    }

    #[test]
    fn test_enter_on_blank_draft_does_nothing() {
        let mut app = app();
        type_text(&mut app, "   ");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        assert!(app.session.messages().is_empty());
        assert!(!app.session.is_generating());
    }

    #[tokio::test]
    async fn test_enter_submits_draft() {
        let mut app = app();
        type_text(&mut app, "Hello");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);

        assert_eq!(app.session.messages().len(), 1);
        assert_eq!(app.session.draft(), "");
        assert!(app.session.is_generating());

        app.reset();
    }

    #[test]
    fn test_ctrl_l_clears_transcript_but_not_draft() {
        let mut app = app();
        type_text(&mut app, "draft");
        press(&mut app, KeyCode::Char('l'), KeyModifiers::CONTROL);

        assert!(app.session.messages().is_empty());
        assert_eq!(app.session.draft(), "draft");
    }

    #[test]
    fn test_temperature_keys_need_open_settings() {
        let mut app = app();
        press(&mut app, KeyCode::Up, KeyModifiers::CONTROL);
        assert_eq!(app.session.temperature(), 0.7);

        press(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL);
        assert!(app.session.show_settings());
        press(&mut app, KeyCode::Up, KeyModifiers::CONTROL);
        assert_eq!(app.session.temperature(), 0.8);
    }

    #[test]
    fn test_token_cap_keys_need_open_settings() {
        let mut app = app();
        press(&mut app, KeyCode::Right, KeyModifiers::CONTROL);
        assert_eq!(app.session.max_tokens(), None);

        press(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Right, KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Right, KeyModifiers::CONTROL);
        assert_eq!(app.session.max_tokens(), Some(512));

        press(&mut app, KeyCode::Left, KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Left, KeyModifiers::CONTROL);
        assert_eq!(app.session.max_tokens(), None);
    }

    #[test]
    fn test_esc_layers() {
        let mut app = app();
        press(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL);

        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(!app.session.show_settings());
        assert!(!app.should_quit);

        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(app.should_quit);
    }

    #[test]
    fn test_model_picker_swallows_typing() {
        let mut app = app();
        app.session.finish_models_load(Ok(ModelList {
            models: vec![ModelInfo {
                id: "openai/gpt-4o".to_string(),
                name: "GPT-4o".to_string(),
                description: None,
            }],
            provider: String::new(),
        }));

        press(&mut app, KeyCode::Char('o'), KeyModifiers::CONTROL);
        assert!(app.show_model_picker);

        type_text(&mut app, "jk");
        assert_eq!(app.session.draft(), "");

        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        assert!(!app.show_model_picker);
        assert_eq!(app.session.selected_model(), "openai/gpt-4o");
    }

    #[test]
    fn test_paste_normalizes_line_endings() {
        let mut app = app();
        handle_event(&mut app, AppEvent::Paste("a\r\nb\rc".to_string()));
        assert_eq!(app.session.draft(), "a\nb\nc");
    }
}
