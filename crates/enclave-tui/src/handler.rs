use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use enclave_core::{DataPlane, KeyAction, KeyOpResult, Notice, Progress};
use ratatui::layout::Rect;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::app::{App, FocusPane};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::KeyActionDone { action, result } => {
            app.session.complete_key_action(action, result);
        }
        AppEvent::Pipeline(event) => {
            app.session.apply_pipeline_event(event);
        }
        AppEvent::ChatDone { turn, response } => {
            app.session.complete_turn(turn, response);
            app.scroll_chat_to_bottom();
        }
        AppEvent::ChatFailed { turn, reason } => {
            app.session.fail_turn(turn, &reason);
            app.scroll_chat_to_bottom();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    if let Some(action) = app.pending_confirm {
        handle_confirm(app, action, key);
        return;
    }

    match app.focus {
        FocusPane::Keys => handle_keys_pane(app, key),
        FocusPane::Chat => handle_chat_pane(app, key),
        FocusPane::Input => handle_input(app, key),
    }
}

fn handle_confirm(app: &mut App, action: KeyAction, key: KeyEvent) {
    app.pending_confirm = None;
    if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
        start_key_action(app, action);
    }
}

/// Bindings shared by the two non-editing panes. Returns true if handled.
fn handle_common(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Tab => app.cycle_focus(),
        KeyCode::Char('i') | KeyCode::Char('/') => app.focus = FocusPane::Input,
        KeyCode::Char('C') => clear_chat(app),
        _ => return false,
    }
    true
}

fn handle_keys_pane(app: &mut App, key: KeyEvent) {
    if handle_common(app, key) {
        return;
    }
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.key_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.key_nav_up(),
        KeyCode::Char('g') => app.key_nav_first(),
        KeyCode::Char('G') => app.key_nav_last(),
        KeyCode::Enter | KeyCode::Char(' ') => {
            if let Some(action) = app.selected_action() {
                request_key_action(app, action);
            }
        }
        _ => {}
    }
}

fn handle_chat_pane(app: &mut App, key: KeyEvent) {
    if handle_common(app, key) {
        return;
    }
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_down(app.chat_height / 2);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_up(app.chat_height / 2);
        }
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        _ => {}
    }
}

fn handle_input(app: &mut App, key: KeyEvent) {
    // The box is read-only while a turn is in flight
    let editing = matches!(key.code, KeyCode::Char(_) | KeyCode::Backspace | KeyCode::Delete);
    if editing && app.session.is_loading() {
        return;
    }

    match key.code {
        KeyCode::Esc => {
            app.focus = FocusPane::Keys;
        }
        KeyCode::Enter => {
            submit_prompt(app);
        }
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn clear_chat(app: &mut App) {
    // Mirrors the disabled "Clear chat history" button
    if app.session.key_busy().is_some() {
        return;
    }
    app.session.clear_chat();
    app.chat_scroll = 0;
}

fn request_key_action(app: &mut App, action: KeyAction) {
    if !app.session.can_run(action) {
        debug!(?action, "ignoring disabled key action");
        return;
    }
    if action.is_destructive() {
        app.pending_confirm = Some(action);
    } else {
        start_key_action(app, action);
    }
}

/// Begin the action and run its control-plane call on a background task.
fn start_key_action(app: &mut App, action: KeyAction) {
    if let Err(e) = app.session.begin_key_action(action) {
        app.session.set_notice(Notice::error(e.to_string()));
        return;
    }

    let control = app.control.clone();
    let events = app.events.clone();
    tokio::spawn(async move {
        let task = tokio::spawn(async move { action.invoke(&control).await });
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                warn!(?action, error = %e, "key action task failed");
                KeyOpResult::failed(format!("Error: {}", e))
            }
        };
        let _ = events.send(AppEvent::KeyActionDone { action, result });
    });
}

fn submit_prompt(app: &mut App) {
    let prompt = app.input.clone();
    let Ok(turn) = app.session.begin_turn(&prompt) else {
        // Rejection is already surfaced as a notice
        return;
    };

    app.input.clear();
    app.cursor = 0;
    app.scroll_chat_to_bottom();

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let data = app.data.clone();
    let events = app.events.clone();

    tokio::spawn(async move {
        let task = tokio::spawn(async move {
            data.encrypt_and_send_prompt(&prompt, Progress::new(turn, progress_tx)).await
        });

        // The channel closes once the pipeline future is dropped, so every
        // stage event is forwarded before the result.
        while let Some(event) = progress_rx.recv().await {
            if events.send(AppEvent::Pipeline(event)).is_err() {
                return;
            }
        }

        let event = match task.await {
            Ok(response) => AppEvent::ChatDone { turn, response },
            Err(e) => AppEvent::ChatFailed { turn, reason: e.to_string() },
        };
        let _ = events.send(event);
    });
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_keys = app.keys_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.scroll_chat_down(3);
            } else if in_keys {
                app.key_nav_down();
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.scroll_chat_up(3);
            } else if in_keys {
                app.key_nav_up();
            }
        }
        _ => {}
    }
}
