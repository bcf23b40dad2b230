use enclave_core::{
    ControlPlaneClient, DataPlaneClient, Deployment, KeyAction, Notice, Session,
};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tokio::sync::mpsc::UnboundedSender;

use crate::tui::AppEvent;

/// Ticks a notice stays on screen (300ms each).
const NOTICE_TICKS: u16 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Keys,
    Chat,
    Input,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub focus: FocusPane,
    pub session: Session,
    pub deployment: Deployment,

    // Key panel
    pub key_state: ListState,
    /// Destructive action waiting for a y/n answer
    pub pending_confirm: Option<KeyAction>,

    // Chat state
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Notice expiry
    shown_notice: Option<Notice>,
    notice_age: u16,

    // Panel areas for mouse hit-testing (updated during render)
    pub keys_area: Option<Rect>,
    pub chat_area: Option<Rect>,

    // Services
    pub control: ControlPlaneClient,
    pub data: DataPlaneClient,
    pub events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        session: Session,
        deployment: Deployment,
        control: ControlPlaneClient,
        data: DataPlaneClient,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        let mut key_state = ListState::default();
        key_state.select(Some(0));

        Self {
            should_quit: false,
            focus: FocusPane::Keys,
            session,
            deployment,
            key_state,
            pending_confirm: None,
            input: String::new(),
            cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            animation_frame: 0,
            shown_notice: None,
            notice_age: 0,
            keys_area: None,
            chat_area: None,
            control,
            data,
            events,
        }
    }

    pub fn selected_action(&self) -> Option<KeyAction> {
        self.key_state.selected().and_then(|i| KeyAction::ALL.get(i).copied())
    }

    pub fn key_nav_down(&mut self) {
        let i = self.key_state.selected().map_or(0, |i| (i + 1).min(KeyAction::ALL.len() - 1));
        self.key_state.select(Some(i));
    }

    pub fn key_nav_up(&mut self) {
        let i = self.key_state.selected().map_or(0, |i| i.saturating_sub(1));
        self.key_state.select(Some(i));
    }

    pub fn key_nav_first(&mut self) {
        self.key_state.select(Some(0));
    }

    pub fn key_nav_last(&mut self) {
        self.key_state.select(Some(KeyAction::ALL.len() - 1));
    }

    pub fn cycle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Keys => FocusPane::Chat,
            FocusPane::Chat => FocusPane::Input,
            FocusPane::Input => FocusPane::Keys,
        };
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_loading() || self.session.key_busy().is_some()
    }

    /// Advance animations and expire the current notice.
    pub fn tick(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }

        let current = self.session.notice().cloned();
        if current != self.shown_notice {
            self.shown_notice = current;
            self.notice_age = 0;
        } else if self.shown_notice.is_some() {
            self.notice_age += 1;
            if self.notice_age >= NOTICE_TICKS {
                self.session.take_notice();
                self.shown_notice = None;
                self.notice_age = 0;
            }
        }
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        let max = self.chat_line_count().saturating_sub(self.visible_chat_height());
        self.chat_scroll = self.chat_scroll.saturating_add(lines).min(max);
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    /// Scroll chat to bottom so the newest message is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.chat_line_count();
        let visible_height = self.visible_chat_height();
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_chat_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered height of the chat log, mirroring the layout in `ui`.
    fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width as usize } else { 50 };

        // Saturates: the log is never pruned
        let mut total_lines: u16 = 0;
        for msg in self.session.messages() {
            total_lines = total_lines.saturating_add(1); // Role line
            for line in msg.content.lines() {
                let wrapped = line.chars().count() / wrap_width + 1;
                total_lines = total_lines.saturating_add(u16::try_from(wrapped).unwrap_or(u16::MAX));
            }
            total_lines = total_lines.saturating_add(1); // Blank line after message
        }

        if self.session.is_loading() {
            total_lines = total_lines.saturating_add(2);
        }
        total_lines
    }
}

/// App wired to services on a port nothing listens on.
#[cfg(test)]
pub(crate) fn test_app(session: Session) -> (App, tokio::sync::mpsc::UnboundedReceiver<AppEvent>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let app = App::new(
        session,
        Deployment::Development,
        ControlPlaneClient::new("http://127.0.0.1:9/api"),
        DataPlaneClient::new("http://127.0.0.1:9/api", "http://127.0.0.1:9"),
        tx,
    );
    (app, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_navigation_is_clamped() {
        let (mut app, _rx) = test_app(Session::default());
        app.key_nav_up();
        assert_eq!(app.selected_action(), Some(KeyAction::CreateDirectory));

        app.key_nav_last();
        app.key_nav_down();
        assert_eq!(app.selected_action(), Some(KeyAction::DeleteAllKeys));
    }

    #[test]
    fn test_focus_cycles_through_panes() {
        let (mut app, _rx) = test_app(Session::default());
        app.cycle_focus();
        assert_eq!(app.focus, FocusPane::Chat);
        app.cycle_focus();
        assert_eq!(app.focus, FocusPane::Input);
        app.cycle_focus();
        assert_eq!(app.focus, FocusPane::Keys);
    }

    #[test]
    fn test_huge_log_scroll_saturates() {
        let mut session = Session::default();
        // 4 million chars wrap to more rows than a u16 holds
        let turn = session.begin_turn(&"a".repeat(4_000_000)).unwrap();
        session.fail_turn(turn, "offline");
        let (mut app, _rx) = test_app(session);
        app.chat_width = 50;
        app.chat_height = 20;

        app.scroll_chat_to_bottom();
        assert_eq!(app.chat_scroll, u16::MAX - 20);

        app.scroll_chat_down(u16::MAX);
        assert_eq!(app.chat_scroll, u16::MAX - 20);
    }

    #[test]
    fn test_notice_expires_after_ticks() {
        let (mut app, _rx) = test_app(Session::default());
        app.session.set_notice(Notice::info("hello"));

        for _ in 0..NOTICE_TICKS {
            app.tick();
            assert!(app.session.notice().is_some());
        }
        app.tick();
        assert!(app.session.notice().is_none());
    }
}
