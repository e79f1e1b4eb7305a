use std::time::{Duration, Instant};

use ratatui::widgets::ListState;
use tokio_util::sync::CancellationToken;

use crate::api::ChatClient;
use crate::config::Config;
use crate::history::HistoryStore;
use crate::message::{Message, Role};
use crate::theme::{Theme, ThemeName};

/// Appended to a reply the user stopped mid-stream.
pub const INTERRUPTED_MARKER: &str = "\n[回复已中断]";
/// Shown in place of (or after) a reply that failed.
pub const ERROR_REPLY: &str = "抱歉，发生了错误。请重试。";

const STATUS_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Chat,
    History,
    /// Message selection for copy actions.
    Select,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub focus: FocusPane,

    // Composer state
    pub input: String,
    pub input_cursor: usize, // char index into input

    // Conversation state
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub cancel: Option<CancellationToken>,
    pub suggestions: Vec<String>,

    // History panel state
    pub history: HistoryStore,
    pub show_history_panel: bool,
    pub history_state: ListState,

    // Message selection (for copy actions)
    pub selected_message: Option<usize>,

    // Chat viewport state
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Transient footer notice (copy acknowledgments)
    pub status: Option<(String, Instant)>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub theme_name: ThemeName,
    pub theme: Theme,

    pub client: ChatClient,
}

impl App {
    pub fn new(config: &Config, history: HistoryStore, client: ChatClient) -> Self {
        let theme_name = config.theme_name();
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            focus: FocusPane::Chat,

            input: String::new(),
            input_cursor: 0,

            messages: Vec::new(),
            is_loading: false,
            cancel: None,
            suggestions: Vec::new(),

            history,
            show_history_panel: false,
            history_state: ListState::default(),

            selected_message: None,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            status: None,

            animation_frame: 0,

            theme_name,
            theme: Theme::for_name(theme_name),

            client,
        }
    }

    /// One streaming session at a time; the composer also needs content.
    pub fn can_send(&self) -> bool {
        !self.is_loading && !self.input.trim().is_empty()
    }

    /// Record the outgoing message and the empty reply the stream will fill.
    /// Returns the token the streaming task watches for a stop request.
    pub fn begin_stream(&mut self, user_text: String) -> CancellationToken {
        self.messages.push(Message::user(user_text));
        self.messages.push(Message::assistant(String::new()));
        self.is_loading = true;
        self.suggestions.clear();
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        token
    }

    /// Signal the streaming task to stop. The reply stays loading until the
    /// task confirms with its terminal event.
    pub fn request_stop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }

    pub fn apply_delta(&mut self, delta: &str) {
        if !self.is_loading {
            return;
        }
        if let Some(reply) = self.current_reply_mut() {
            reply.content.push_str(delta);
        }
        self.scroll_chat_to_bottom();
    }

    pub fn finish_stream(&mut self) {
        self.is_loading = false;
        self.cancel = None;
    }

    /// The stream stopped on the user's request. The loading gate makes the
    /// marker append at most once even if duplicate events arrive.
    pub fn finish_interrupted(&mut self) {
        if !self.is_loading {
            return;
        }
        if let Some(reply) = self.current_reply_mut() {
            reply.content.push_str(INTERRUPTED_MARKER);
        }
        self.finish_stream();
    }

    /// The stream failed. An empty reply is replaced by the error notice; a
    /// partial reply keeps what arrived and the notice becomes its own
    /// assistant turn.
    pub fn finish_failed(&mut self) {
        if !self.is_loading {
            return;
        }
        match self.current_reply_mut() {
            Some(reply) if reply.content.is_empty() => {
                reply.content = ERROR_REPLY.to_string();
            }
            _ => self.messages.push(Message::assistant(ERROR_REPLY)),
        }
        self.finish_stream();
    }

    fn current_reply_mut(&mut self) -> Option<&mut Message> {
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant)
    }

    /// Archive the current conversation and reset to an empty chat. Returns
    /// the archived messages so the caller can request follow-up suggestions.
    pub fn start_new_chat(&mut self) -> Option<Vec<Message>> {
        if self.is_loading {
            return None;
        }
        if self.messages.is_empty() {
            return None;
        }
        if let Err(e) = self.history.save(&self.messages) {
            tracing::warn!("failed to save conversation: {e}");
        }
        let archived = std::mem::take(&mut self.messages);
        self.input.clear();
        self.input_cursor = 0;
        self.chat_scroll = 0;
        self.selected_message = None;
        self.focus = FocusPane::Chat;
        Some(archived)
    }

    // History panel
    pub fn toggle_history_panel(&mut self) {
        self.show_history_panel = !self.show_history_panel;
        if self.show_history_panel {
            self.focus = FocusPane::History;
            if !self.history.is_empty() {
                self.history_state.select(Some(0));
            }
        } else {
            self.focus = FocusPane::Chat;
        }
    }

    pub fn history_nav_down(&mut self) {
        let len = self.history.records().len();
        if len > 0 {
            let i = self.history_state.selected().unwrap_or(0);
            self.history_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn history_nav_up(&mut self) {
        let i = self.history_state.selected().unwrap_or(0);
        self.history_state.select(Some(i.saturating_sub(1)));
    }

    /// Load the selected conversation into the chat view, replacing whatever
    /// is currently open. Records are only ever created by the new-chat
    /// action, so browsing history never mints one.
    pub fn load_selected_history(&mut self) {
        if self.is_loading {
            return;
        }
        let Some(id) = self
            .history_state
            .selected()
            .and_then(|i| self.history.records().get(i))
            .map(|r| r.id.clone())
        else {
            return;
        };
        if let Some(messages) = self.history.load(&id) {
            self.messages = messages;
        }
        self.show_history_panel = false;
        self.focus = FocusPane::Chat;
        self.suggestions.clear();
        self.scroll_chat_to_bottom();
    }

    // Message selection
    pub fn enter_select_mode(&mut self) {
        if self.messages.is_empty() {
            return;
        }
        self.focus = FocusPane::Select;
        self.selected_message = Some(self.messages.len() - 1);
    }

    pub fn leave_select_mode(&mut self) {
        self.focus = FocusPane::Chat;
        self.selected_message = None;
    }

    pub fn select_prev_message(&mut self) {
        if let Some(i) = self.selected_message {
            self.selected_message = Some(i.saturating_sub(1));
        }
    }

    pub fn select_next_message(&mut self) {
        if let Some(i) = self.selected_message {
            self.selected_message = Some((i + 1).min(self.messages.len().saturating_sub(1)));
        }
    }

    pub fn selected_message_content(&self) -> Option<&str> {
        self.selected_message
            .and_then(|i| self.messages.get(i))
            .map(|m| m.content.as_str())
    }

    pub fn toggle_theme(&mut self) {
        self.theme_name = self.theme_name.toggled();
        self.theme = Theme::for_name(self.theme_name);
        if let Err(e) = Config::save_theme(self.theme_name) {
            tracing::warn!("failed to persist theme: {e}");
        }
    }

    pub fn set_status(&mut self, notice: impl Into<String>) {
        self.status = Some((notice.into(), Instant::now()));
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status.as_ref().map(|(s, _)| s.as_str())
    }

    /// Tick animation frame and expire stale notices (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_loading {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        if let Some((_, since)) = &self.status {
            if since.elapsed() >= STATUS_TTL {
                self.status = None;
            }
        }
    }

    // Chat scrolling
    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        let max_scroll = self.total_chat_lines().saturating_sub(self.chat_height);
        if self.chat_scroll < max_scroll {
            self.chat_scroll += 1;
        }
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        let total = self.total_chat_lines();
        let visible = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_scroll = total.saturating_sub(visible);
    }

    /// Estimate of the rendered chat height, counting wrapped lines.
    fn total_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total: u16 = 0;
        for msg in &self.messages {
            total += 1; // prefix line
            for line in msg.content.lines() {
                // Character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total += 1;
                } else {
                    total += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total += 1; // blank line after message
        }
        if self.is_loading {
            total += 1; // thinking indicator
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryStore;
    use tempfile::TempDir;

    fn test_app() -> (App, TempDir) {
        let dir = TempDir::new().unwrap();
        let history = HistoryStore::open_at(dir.path().join("history.json"));
        let config = Config {
            api_url: None,
            api_key: Some("test-key".to_string()),
            model: None,
            theme: None,
        };
        let client = ChatClient::new(&config).unwrap();
        (App::new(&config, history, client), dir)
    }

    #[test]
    fn deltas_concatenate_into_the_open_reply() {
        let (mut app, _dir) = test_app();
        app.begin_stream("hi".to_string());
        app.apply_delta("Hel");
        app.apply_delta("lo");
        app.finish_stream();
        assert_eq!(app.messages.last().unwrap().content, "Hello");
    }

    #[test]
    fn cannot_send_while_loading_or_with_blank_input() {
        let (mut app, _dir) = test_app();
        app.input = "  ".to_string();
        assert!(!app.can_send());
        app.input = "question".to_string();
        assert!(app.can_send());
        app.begin_stream("question".to_string());
        assert!(!app.can_send());
    }

    #[test]
    fn interruption_appends_marker_exactly_once() {
        let (mut app, _dir) = test_app();
        app.begin_stream("hi".to_string());
        app.apply_delta("partial");
        app.finish_interrupted();
        app.finish_interrupted();
        assert_eq!(
            app.messages.last().unwrap().content,
            format!("partial{INTERRUPTED_MARKER}")
        );
        assert!(!app.is_loading);
    }

    #[test]
    fn failure_replaces_empty_reply_or_adds_an_error_turn() {
        let (mut app, _dir) = test_app();
        app.begin_stream("hi".to_string());
        app.finish_failed();
        assert_eq!(app.messages.last().unwrap().content, ERROR_REPLY);
        assert_eq!(app.messages.len(), 2);

        app.begin_stream("again".to_string());
        app.apply_delta("some text");
        app.finish_failed();
        // partial reply keeps what arrived, apology is a separate turn
        let count = app.messages.len();
        assert_eq!(app.messages[count - 2].content, "some text");
        assert_eq!(app.messages[count - 1].content, ERROR_REPLY);
    }

    #[test]
    fn deltas_after_finish_are_ignored() {
        let (mut app, _dir) = test_app();
        app.begin_stream("hi".to_string());
        app.apply_delta("done");
        app.finish_stream();
        app.apply_delta(" late");
        assert_eq!(app.messages.last().unwrap().content, "done");
    }

    #[test]
    fn new_chat_archives_the_conversation() {
        let (mut app, _dir) = test_app();
        app.begin_stream("hello".to_string());
        app.apply_delta("reply");
        app.finish_stream();

        let archived = app.start_new_chat().unwrap();
        assert_eq!(archived.len(), 2);
        assert!(app.messages.is_empty());
        assert_eq!(app.history.records().len(), 1);
        assert_eq!(app.history.records()[0].title, "hello...");
    }

    #[test]
    fn new_chat_is_a_no_op_on_an_empty_conversation() {
        let (mut app, _dir) = test_app();
        assert!(app.start_new_chat().is_none());
        assert!(app.history.is_empty());
    }

    #[test]
    fn loading_history_restores_messages() {
        let (mut app, _dir) = test_app();
        app.begin_stream("saved question".to_string());
        app.apply_delta("saved answer");
        app.finish_stream();
        app.start_new_chat();

        app.toggle_history_panel();
        app.load_selected_history();
        assert_eq!(app.messages.len(), 2);
        assert_eq!(app.messages[0].content, "saved question");
        assert!(!app.show_history_panel);
    }

    #[test]
    fn browsing_history_never_creates_records() {
        let (mut app, _dir) = test_app();
        app.begin_stream("saved".to_string());
        app.apply_delta("answer");
        app.finish_stream();
        app.start_new_chat();
        assert_eq!(app.history.records().len(), 1);

        // A different conversation is open when the stored one is loaded
        app.begin_stream("open but unsaved".to_string());
        app.apply_delta("reply");
        app.finish_stream();

        app.toggle_history_panel();
        app.load_selected_history();
        app.toggle_history_panel();
        app.load_selected_history();

        assert_eq!(app.history.records().len(), 1);
        assert_eq!(app.messages[0].content, "saved");
    }

    #[test]
    fn theme_toggle_flips_palette() {
        let (mut app, _dir) = test_app();
        let before = app.theme_name;
        app.toggle_theme();
        assert_ne!(app.theme_name, before);
    }
}
