use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use tokio::sync::mpsc::UnboundedSender;

use crate::app::{App, FocusPane, InputMode};
use crate::format::{self, CopyFormat};
use crate::markdown;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, tx)?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
        AppEvent::Delta(delta) => {
            app.apply_delta(&delta);
        }
        AppEvent::Done => {
            app.finish_stream();
        }
        AppEvent::Interrupted => {
            app.finish_interrupted();
        }
        AppEvent::StreamError(reason) => {
            tracing::error!("stream failed: {reason}");
            app.finish_failed();
        }
        AppEvent::Suggestions(items) => {
            // Only relevant while the new chat is still empty
            if app.messages.is_empty() {
                app.suggestions = items;
            }
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    match app.focus {
        FocusPane::History => handle_history_keys(app, key),
        FocusPane::Select => handle_select_keys(app, key),
        FocusPane::Chat => match app.input_mode {
            InputMode::Normal => handle_normal_mode(app, key, tx)?,
            InputMode::Editing => handle_editing_mode(app, key, tx)?,
        },
    }

    Ok(())
}

fn handle_normal_mode(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        // Scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Stop the reply in flight
        KeyCode::Esc | KeyCode::Enter if app.is_loading => {
            app.request_stop();
        }

        KeyCode::Char('n') => start_new_chat(app, tx),
        KeyCode::Char('h') => app.toggle_history_panel(),
        KeyCode::Char('t') => app.toggle_theme(),
        KeyCode::Char('s') => app.enter_select_mode(),

        // Suggestion shortcuts on the empty-chat screen: populate the
        // composer, ready to send
        KeyCode::Char(c @ '1'..='3') if app.messages.is_empty() => {
            let idx = (c as usize) - ('1' as usize);
            if let Some(suggestion) = app.suggestions.get(idx).cloned() {
                app.input = suggestion;
                app.input_cursor = app.input.chars().count();
                app.input_mode = InputMode::Editing;
            }
        }

        _ => {}
    }
    Ok(())
}

fn handle_editing_mode(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) -> Result<()> {
    match key.code {
        KeyCode::Esc => {
            if app.is_loading {
                app.request_stop();
            } else {
                app.input_mode = InputMode::Normal;
            }
        }
        // Enter sends, or stops the reply in flight
        KeyCode::Enter => {
            if app.is_loading {
                app.request_stop();
            } else {
                send_message(app, tx);
            }
        }
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
    Ok(())
}

fn handle_history_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('q') => {
            app.toggle_history_panel();
        }
        KeyCode::Char('j') | KeyCode::Down => app.history_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.history_nav_up(),
        KeyCode::Enter => app.load_selected_history(),
        _ => {}
    }
}

fn handle_select_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('s') | KeyCode::Char('q') => app.leave_select_mode(),
        KeyCode::Char('j') | KeyCode::Down => app.select_next_message(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev_message(),

        KeyCode::Char('t') => copy_selected(app, CopyFormat::Text),
        KeyCode::Char('m') | KeyCode::Enter => copy_selected(app, CopyFormat::Markdown),
        KeyCode::Char('y') => copy_selected(app, CopyFormat::Html),

        // Copy just the code blocks of the selected message
        KeyCode::Char('c') => {
            let Some(content) = app.selected_message_content() else {
                return;
            };
            let blocks = markdown::code_blocks(content);
            if blocks.is_empty() {
                app.set_status("no code blocks in message");
                return;
            }
            let joined = blocks
                .iter()
                .map(|b| b.code.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            match format::copy_to_clipboard(&joined) {
                Ok(()) => app.set_status(format!("copied {} code block(s)", blocks.len())),
                Err(e) => {
                    tracing::warn!("clipboard copy failed: {e}");
                    app.set_status("copy failed");
                }
            }
        }

        _ => {}
    }
}

fn copy_selected(app: &mut App, copy_format: CopyFormat) {
    let Some(content) = app.selected_message_content() else {
        return;
    };
    let formatted = format::format_content(content, copy_format);
    match format::copy_to_clipboard(&formatted) {
        Ok(()) => app.set_status(format!("copied as {}", copy_format.label())),
        Err(e) => {
            tracing::warn!("clipboard copy failed: {e}");
            app.set_status("copy failed");
        }
    }
}

/// Send the composer content as a new user message and spawn the streaming
/// task. Rejected while a reply is in flight.
fn send_message(app: &mut App, tx: &UnboundedSender<AppEvent>) {
    if !app.can_send() {
        return;
    }
    let user_text = std::mem::take(&mut app.input).trim().to_string();
    app.input_cursor = 0;

    let cancel = app.begin_stream(user_text);
    // Request body carries the conversation up to the user turn, not the
    // empty reply placeholder.
    let outgoing = app.messages[..app.messages.len() - 1].to_vec();

    let client = app.client.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        client.stream_chat(outgoing, cancel, tx).await;
    });

    app.scroll_chat_to_bottom();
}

/// Archive the conversation, then ask for follow-up suggestions based on it.
fn start_new_chat(app: &mut App, tx: &UnboundedSender<AppEvent>) {
    let Some(archived) = app.start_new_chat() else {
        return;
    };
    let client = app.client.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        match client.fetch_suggestions(archived).await {
            Ok(items) => {
                let _ = tx.send(AppEvent::Suggestions(items));
            }
            Err(e) => tracing::warn!("suggestion fetch failed: {e}"),
        }
    });
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if app.show_history_panel {
                app.history_nav_down();
            } else {
                app.scroll_down();
                app.scroll_down();
                app.scroll_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if app.show_history_panel {
                app.history_nav_up();
            } else {
                app.scroll_up();
                app.scroll_up();
                app.scroll_up();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_to_byte_index_handles_multibyte_text() {
        let s = "数学 math";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 3);
        assert_eq!(char_to_byte_index(s, 2), 6);
        assert_eq!(char_to_byte_index(s, 100), s.len());
    }
}
