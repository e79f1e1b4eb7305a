use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation,
        ScrollbarState, Wrap,
    },
};

use crate::app::{App, FocusPane, InputMode};
use crate::markdown;
use crate::message::Role;
use crate::theme::ThemeName;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if app.show_history_panel {
        render_history_panel(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let theme_label = match app.theme_name {
        ThemeName::Light => "light",
        ThemeName::Dark => "dark",
    };
    let title = Line::from(vec![
        Span::styled(" mathchat ", Style::default().fg(app.theme.accent).bold()),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(app.theme.dim),
        ),
        Span::raw(" "),
        Span::styled(format!("[{}]", theme_label), Style::default().fg(app.theme.dim)),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(app.theme.background));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let border_color = if app.focus == FocusPane::Select {
        app.theme.border_focus
    } else {
        app.theme.border
    };
    let title = if app.focus == FocusPane::Select {
        " Chat (select) "
    } else {
        " Chat "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let inner_area = block.inner(area);
    app.chat_height = inner_area.height;
    app.chat_width = inner_area.width;

    if app.messages.is_empty() && !app.is_loading {
        render_empty_chat(app, frame, area, block);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for (idx, msg) in app.messages.iter().enumerate() {
        let is_selected = app.selected_message == Some(idx);
        let (prefix, prefix_color) = match msg.role {
            Role::User => ("You:", app.theme.user_prefix),
            Role::Assistant | Role::System => ("AI:", app.theme.assistant_prefix),
        };
        let prefix_style = if is_selected {
            Style::default()
                .fg(app.theme.background)
                .bg(prefix_color)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(prefix_color).add_modifier(Modifier::BOLD)
        };
        lines.push(Line::from(Span::styled(prefix, prefix_style)));

        match msg.role {
            Role::User => {
                for line in msg.content.lines() {
                    lines.push(Line::styled(
                        line.to_string(),
                        Style::default().fg(app.theme.text),
                    ));
                }
            }
            Role::Assistant | Role::System => {
                let rendered = markdown::render_message(&msg.content, &app.theme);
                lines.extend(rendered.lines);
            }
        }
        lines.push(Line::default());
    }

    if app.is_loading {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(app.theme.dim).add_modifier(Modifier::ITALIC),
        )));
    }

    let total_lines = lines.len() as u16;

    let chat = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);

    if total_lines > app.chat_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state =
            ScrollbarState::new(total_lines as usize).position(app.chat_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

/// Greeting plus numbered suggestion chips when there is nothing to show yet.
fn render_empty_chat(app: &App, frame: &mut Frame, area: Rect, block: Block) {
    let mut lines = vec![
        Line::default(),
        Line::from(Span::styled(
            "  Ask me anything. Math renders right here in the terminal.",
            Style::default().fg(app.theme.dim),
        )),
    ];

    if !app.suggestions.is_empty() {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(
            "  Suggestions:",
            Style::default().fg(app.theme.accent).bold(),
        )));
        for (i, suggestion) in app.suggestions.iter().enumerate().take(3) {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("  [{}] ", i + 1),
                    Style::default().fg(app.theme.accent),
                ),
                Span::styled(suggestion.clone(), Style::default().fg(app.theme.text)),
            ]));
        }
    }

    let placeholder = Paragraph::new(lines).block(block);
    frame.render_widget(placeholder, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.input_mode == InputMode::Editing && app.focus == FocusPane::Chat {
        app.theme.border_focus
    } else {
        app.theme.border
    };
    let title = if app.is_loading {
        " Message (Enter to stop) "
    } else {
        " Message "
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Horizontal scroll keeps the cursor visible in a long input
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(app.theme.user_prefix))
        .block(input_block);

    frame.render_widget(input, area);

    if app.input_mode == InputMode::Editing && app.focus == FocusPane::Chat {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // A fresh copy notice takes over the whole footer until it expires
    if let Some(notice) = app.status_text() {
        let footer = Paragraph::new(Line::from(Span::styled(
            format!(" {} ", notice),
            Style::default()
                .fg(app.theme.background)
                .bg(app.theme.accent)
                .bold(),
        )));
        frame.render_widget(footer, area);
        return;
    }

    let key_style = Style::default().bg(app.theme.dim).fg(app.theme.background);
    let label_style = Style::default().fg(app.theme.dim);

    let hints: Vec<Span> = match app.focus {
        FocusPane::History => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" open ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" close ", label_style),
        ],
        FocusPane::Select => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" message ", label_style),
            Span::styled(" t ", key_style),
            Span::styled(" text ", label_style),
            Span::styled(" m ", key_style),
            Span::styled(" markdown ", label_style),
            Span::styled(" y ", key_style),
            Span::styled(" html ", label_style),
            Span::styled(" c ", key_style),
            Span::styled(" code ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" back ", label_style),
        ],
        FocusPane::Chat => match app.input_mode {
            InputMode::Editing => vec![
                Span::styled(" Enter ", key_style),
                Span::styled(
                    if app.is_loading { " stop " } else { " send " },
                    label_style,
                ),
                Span::styled(" Esc ", key_style),
                Span::styled(" normal ", label_style),
            ],
            InputMode::Normal => vec![
                Span::styled(" i ", key_style),
                Span::styled(" type ", label_style),
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" n ", key_style),
                Span::styled(" new ", label_style),
                Span::styled(" h ", key_style),
                Span::styled(" history ", label_style),
                Span::styled(" s ", key_style),
                Span::styled(" copy ", label_style),
                Span::styled(" t ", key_style),
                Span::styled(" theme ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ],
        },
    };

    let footer = Paragraph::new(Line::from(hints));
    frame.render_widget(footer, area);
}

fn render_history_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_width = 50.min(area.width.saturating_sub(4));
    let popup_height = (app.history.records().len() as u16 + 2)
        .max(3)
        .min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.border_focus))
        .title(format!(" History ({}) ", app.history.records().len()));

    if app.history.is_empty() {
        let placeholder = Paragraph::new("No saved conversations yet.")
            .style(Style::default().fg(app.theme.dim))
            .block(block);
        frame.render_widget(placeholder, popup_area);
        return;
    }

    let items: Vec<ListItem> = app
        .history
        .records()
        .iter()
        .map(|record| ListItem::new(format!(" {} ", record.title)))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(app.theme.accent)
                .fg(app.theme.background)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.history_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatClient;
    use crate::config::Config;
    use crate::history::HistoryStore;
    use ratatui::{backend::TestBackend, Terminal};
    use tempfile::TempDir;

    fn test_app(dir: &TempDir) -> App {
        let history = HistoryStore::open_at(dir.path().join("history.json"));
        let config = Config {
            api_url: None,
            api_key: Some("test-key".to_string()),
            model: None,
            theme: None,
        };
        let client = ChatClient::new(&config).unwrap();
        App::new(&config, history, client)
    }

    #[test]
    fn renders_empty_chat_without_panicking() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| render(&mut app, f)).unwrap();
    }

    #[test]
    fn renders_conversation_with_math_and_code() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.begin_stream("what is $x^2$?".to_string());
        app.apply_delta("The square: $$x \\cdot x$$\n```rust\nlet y = x * x;\n```");
        app.finish_stream();

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| render(&mut app, f)).unwrap();
    }

    #[test]
    fn renders_history_panel_over_the_chat() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.begin_stream("hello".to_string());
        app.apply_delta("hi");
        app.finish_stream();
        app.start_new_chat();
        app.toggle_history_panel();

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|f| render(&mut app, f)).unwrap();
    }
}
