use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
};
use gpt_playground::{ChatMessage, ChatRole, PanelLayout};
use gpt_playground::session::TEMPERATURE_MAX;
use crate::app::App;

/// Most draft lines shown before the input box stops growing
const MAX_INPUT_LINES: u16 = 6;

/// Style `**bold**` and `` `code` `` spans in one line of a reply.
/// Unclosed markers are kept as literal text.
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let next_bold = rest.find("**");
        let next_code = rest.find('`');

        let (start, marker, style) = match (next_bold, next_code) {
            (Some(b), Some(c)) if c < b => (c, "`", Style::default().fg(Color::Green)),
            (Some(b), _) => (b, "**", Style::default().add_modifier(Modifier::BOLD)),
            (None, Some(c)) => (c, "`", Style::default().fg(Color::Green)),
            (None, None) => break,
        };

        let after_open = &rest[start + marker.len()..];
        match after_open.find(marker) {
            Some(end) if end > 0 => {
                if start > 0 {
                    spans.push(Span::raw(rest[..start].to_string()));
                }
                spans.push(Span::styled(after_open[..end].to_string(), style));
                rest = &after_open[end + marker.len()..];
            }
            _ => {
                // No closing marker: emit through the opener as plain text
                spans.push(Span::raw(rest[..start + marker.len()].to_string()));
                rest = after_open;
            }
        }
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

/// Lines one transcript entry occupies: role header, content, blank separator
pub fn message_lines(msg: &ChatMessage) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let content = msg.content.split('\n');

    match msg.role {
        ChatRole::User => {
            lines.push(Line::from(Span::styled(
                "You:",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            lines.extend(content.map(|line| Line::from(line.to_string())));
        }
        ChatRole::Assistant => {
            lines.push(Line::from(vec![
                Span::styled("AI:", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::styled(
                    format!(" {}", msg.timestamp.format("%H:%M")),
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
            if msg.failed {
                let style = Style::default().fg(Color::Red);
                lines.extend(content.map(|line| Line::from(Span::styled(line.to_string(), style))));
            } else {
                lines.extend(content.map(parse_markdown_line));
            }
        }
        ChatRole::System => {
            lines.push(Line::from(Span::styled(
                "System:",
                Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
            )));
            let style = Style::default().fg(Color::DarkGray);
            lines.extend(content.map(|line| Line::from(Span::styled(line.to_string(), style))));
        }
    }

    lines.push(Line::default());
    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match (app.layout, app.session.show_settings()) {
        (PanelLayout::Single, true) => {
            let [settings_area, conversation_area] = Layout::vertical([
                Constraint::Length(7),
                Constraint::Min(0),
            ])
            .areas(body_area);
            render_settings(app, frame, settings_area);
            render_conversation(app, frame, conversation_area);
        }
        (PanelLayout::Split, true) => {
            let [conversation_area, settings_area] = Layout::horizontal([
                Constraint::Percentage(70),
                Constraint::Percentage(30),
            ])
            .areas(body_area);
            render_conversation(app, frame, conversation_area);
            render_settings(app, frame, settings_area);
        }
        (_, false) => render_conversation(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let model = if app.session.models_loading() {
        format!("{} (loading models...)", app.session.selected_model_label())
    } else {
        app.session.selected_model_label().to_string()
    };

    let mut spans = vec![
        Span::styled(format!(" {} ", app.title), Style::default().fg(Color::Green).bold()),
        Span::styled(model, Style::default().fg(Color::Cyan)),
    ];
    if let Some(provider) = app.session.provider() {
        spans.push(Span::styled(format!(" via {}", provider), Style::default().fg(Color::DarkGray)));
    }
    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_conversation(app: &mut App, frame: &mut Frame, area: Rect) {
    let banner_height = if app.session.error().is_some() { 1 } else { 0 };
    let draft_lines = app.session.draft().split('\n').count() as u16;
    let input_height = draft_lines.clamp(1, MAX_INPUT_LINES) + 2;

    let [banner_area, chat_area, input_area] = Layout::vertical([
        Constraint::Length(banner_height),
        Constraint::Min(0),
        Constraint::Length(input_height),
    ])
    .areas(area);

    if let Some(error) = app.session.error() {
        let banner = Paragraph::new(Line::from(vec![
            Span::styled(" Error ", Style::default().bg(Color::Red).fg(Color::White).bold()),
            Span::styled(format!(" {} ", error), Style::default().fg(Color::Red)),
            Span::styled("(Esc to dismiss)", Style::default().fg(Color::DarkGray)),
        ]));
        frame.render_widget(banner, banner_area);
    }

    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing and inner size for scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Conversation ({}) ", app.session.messages().len()));

    let text = if app.session.messages().is_empty() && !app.session.is_generating() {
        Text::from(Span::styled(
            "Start a conversation by typing a message below.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in app.session.messages() {
            lines.extend(message_lines(msg));
        }

        if app.session.is_generating() {
            lines.push(Line::from(Span::styled(
                "AI:",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let generating = app.session.is_generating();
    let (border_color, title) = if generating {
        (Color::DarkGray, " Waiting for reply... ")
    } else {
        (Color::Yellow, " Message (Enter send, Shift+Enter newline) ")
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let draft = app.session.draft();
    if draft.is_empty() {
        let placeholder = Paragraph::new(Span::styled(
            app.placeholder.as_str(),
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(placeholder, area);
        frame.set_cursor_position((area.x + 1, area.y + 1));
        return;
    }

    // Locate the cursor as (row, column) within the draft's lines
    let before_cursor: String = draft.chars().take(app.session.cursor()).collect();
    let cursor_row = before_cursor.matches('\n').count();
    let cursor_col = before_cursor.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0);

    let inner_width = area.width.saturating_sub(2) as usize;
    let inner_height = area.height.saturating_sub(2) as usize;

    // Scroll so the cursor stays visible both ways
    let col_offset = if inner_width > 0 && cursor_col >= inner_width {
        cursor_col - inner_width + 1
    } else {
        0
    };
    let row_offset = if inner_height > 0 && cursor_row >= inner_height {
        cursor_row - inner_height + 1
    } else {
        0
    };

    let visible: Vec<Line> = draft
        .split('\n')
        .skip(row_offset)
        .take(inner_height)
        .map(|line| Line::from(line.chars().skip(col_offset).take(inner_width).collect::<String>()))
        .collect();

    let input = Paragraph::new(visible)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    frame.set_cursor_position((
        area.x + 1 + (cursor_col - col_offset) as u16,
        area.y + 1 + (cursor_row - row_offset) as u16,
    ));
}

fn render_settings(app: &App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Settings ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [model_area, temperature_area, tokens_area, prompt_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(inner);

    let label_style = Style::default().fg(Color::DarkGray);

    let model_value = if app.session.models_loading() {
        Span::styled("loading...", Style::default().fg(Color::DarkGray).italic())
    } else {
        Span::styled(app.session.selected_model_label().to_string(), Style::default().fg(Color::Cyan))
    };
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Model        ", label_style),
            model_value,
            Span::styled("  (Ctrl+O)", label_style),
        ])),
        model_area,
    );

    let [temp_label_area, temp_gauge_area] = Layout::horizontal([
        Constraint::Length(13),
        Constraint::Min(0),
    ])
    .areas(temperature_area);
    frame.render_widget(Paragraph::new(Span::styled("Temperature", label_style)), temp_label_area);
    let temperature = app.session.temperature();
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Yellow).bg(Color::Black))
        .ratio(f64::from(temperature / TEMPERATURE_MAX))
        .label(format!("{:.1} (Ctrl+Up/Down)", temperature));
    frame.render_widget(gauge, temp_gauge_area);

    let tokens = app
        .session
        .max_tokens()
        .map(|n| n.to_string())
        .unwrap_or_else(|| "endpoint default".to_string());
    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("Max tokens   ", label_style),
            Span::raw(tokens),
            Span::styled("  (Ctrl+Left/Right)", label_style),
        ])),
        tokens_area,
    );

    let prompt = match app.session.system_prompt() {
        Some(prompt) => Line::from(vec![
            Span::styled("System       ", label_style),
            Span::styled(prompt.to_string(), Style::default().italic()),
        ]),
        None => Line::from(vec![
            Span::styled("System       ", label_style),
            Span::styled("none", label_style),
        ]),
    };
    frame.render_widget(Paragraph::new(prompt).wrap(Wrap { trim: true }), prompt_area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = if app.show_model_picker {
        &[("j/k", "nav"), ("Enter", "select"), ("Esc", "cancel")]
    } else {
        &[
            ("Enter", "send"),
            ("Ctrl+S", if app.session.show_settings() { "hide settings" } else { "settings" }),
            ("Ctrl+O", "model"),
            ("Ctrl+L", "clear chat"),
            ("Ctrl+R", "reload models"),
            ("Ctrl+C", "quit"),
        ]
    };

    let mut spans = Vec::with_capacity(hints.len() * 2);
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let models = app.session.models();

    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = (models.len() as u16 * 2 + 2).min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    let selected = app.session.selected_model();
    let items: Vec<ListItem> = models
        .iter()
        .map(|model| {
            let style = if model.id == selected {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let detail = model.description.as_deref().unwrap_or(model.id.as_str());
            ListItem::new(vec![
                Line::from(Span::styled(format!(" {} ", model.name), style)),
                Line::from(Span::styled(format!("   {}", detail), Style::default().fg(Color::DarkGray))),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}
