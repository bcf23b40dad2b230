use enclave_core::{ChatRole, KeyAction, NoticeLevel, ProcessingStage};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, FocusPane};

const WELCOME: &str = "Welcome to the secure enclave chat. Complete the key setup on the left, \
then type a message. Your prompt is encrypted before it leaves this machine.";

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

    let [keys_area, main_area] = Layout::horizontal([
        Constraint::Length(36),
        Constraint::Min(0),
    ])
    .areas(body_area);

    let [chat_area, stage_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(ProcessingStage::STEPS.len() as u16 + 2),
        Constraint::Length(3),
    ])
    .areas(main_area);

    render_key_panel(app, frame, keys_area);
    render_chat(app, frame, chat_area);
    render_processing(app, frame, stage_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    if let Some(action) = app.pending_confirm {
        render_confirm(action, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (status, status_color) = if app.session.ready_to_chat() {
        ("ready", Color::Green)
    } else {
        ("key setup required", Color::Yellow)
    };

    let title = Line::from(vec![
        Span::styled(" Secure Enclave Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!("[{}] ", app.deployment.as_str()), Style::default().fg(Color::Gray)),
        Span::styled(status, Style::default().fg(status_color)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_key_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    app.keys_area = Some(area);

    let focused = app.focus == FocusPane::Keys;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Key Management ");

    let keys = *app.session.keys();
    let busy = app.session.key_busy();
    let dots = ".".repeat(app.animation_frame as usize + 1);

    let items: Vec<ListItem> = KeyAction::ALL
        .iter()
        .map(|&action| {
            let (marker, label, style) = if busy == Some(action) {
                (
                    "…",
                    format!("{}{}", action.progress_label(), dots),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
                )
            } else if keys.is_done(action) {
                ("✓", action.display_name().to_string(), Style::default().fg(Color::Green))
            } else if app.session.can_run(action) {
                let color = if action.is_destructive() { Color::Red } else { Color::White };
                (" ", action.display_name().to_string(), Style::default().fg(color))
            } else {
                (" ", action.display_name().to_string(), Style::default().fg(Color::DarkGray))
            };
            ListItem::new(format!(" {} {}", marker, label)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol(if focused { "> " } else { "  " });

    frame.render_stateful_widget(list, area, &mut app.key_state);
}

fn role_style(role: ChatRole) -> Style {
    match role {
        ChatRole::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ChatRole::Assistant => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ChatRole::Encrypted => Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD),
        ChatRole::Decrypted => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    }
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let focused = app.focus == FocusPane::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Chat ({} messages) ", app.session.messages().len()));

    let text = if app.session.messages().is_empty() && !app.session.is_loading() {
        Text::from(Span::styled(WELCOME, Style::default().fg(Color::DarkGray)))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in app.session.messages() {
            let mut heading = vec![
                Span::styled(format!("{}:", msg.role.display_name()), role_style(msg.role)),
                Span::styled(
                    format!(" {}", msg.timestamp.format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
            ];
            if msg.simulated {
                heading.push(Span::styled(
                    " [simulated]",
                    Style::default().fg(Color::Red).add_modifier(Modifier::ITALIC),
                ));
            }
            lines.push(Line::from(heading));

            let body_style = match msg.role {
                ChatRole::Encrypted => Style::default().fg(Color::Magenta),
                _ => Style::default(),
            };
            for line in msg.content.lines() {
                lines.push(Line::from(Span::styled(line.to_string(), body_style)));
            }
            lines.push(Line::default());
        }

        if app.session.is_loading() {
            lines.push(Line::from(Span::styled("Assistant:", role_style(ChatRole::Assistant))));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat(app.animation_frame as usize + 1);
            lines.push(Line::from(Span::styled(
                format!("Processing in the enclave{}", dots),
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

fn render_processing(app: &App, frame: &mut Frame, area: Rect) {
    let current = app.session.stage();
    let title = if current == ProcessingStage::Idle {
        " Processing (idle) ".to_string()
    } else {
        format!(" Processing (step {}/{}) ", current, ProcessingStage::STEPS.len())
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title);

    let lines: Vec<Line> = ProcessingStage::STEPS
        .iter()
        .map(|&step| {
            let (marker, style) = if step.is_completed_at(current) {
                ("✓", Style::default().fg(Color::Green))
            } else if step == current {
                ("▶", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            } else {
                ("·", Style::default().fg(Color::DarkGray))
            };
            Line::from(Span::styled(format!(" {} {}. {}", marker, step.number(), step.label()), style))
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == FocusPane::Input;
    let border_color = if focused { Color::Yellow } else { Color::DarkGray };

    let title = if app.session.is_loading() {
        " Message (waiting for response) "
    } else if !app.session.ready_to_chat() {
        " Message (complete key setup first) "
    } else {
        " Message (Enter to send) "
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let input = Paragraph::new(app.input.as_str()).block(block);
    frame.render_widget(input, area);

    if focused {
        // Cursor after the character at `cursor`, inside the border
        let offset = u16::try_from(app.cursor).unwrap_or(u16::MAX);
        let x = area.x.saturating_add(1).saturating_add(offset);
        frame.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    if let Some(notice) = app.session.notice() {
        let style = match notice.level {
            NoticeLevel::Success => Style::default().bg(Color::Green).fg(Color::Black),
            NoticeLevel::Error => Style::default().bg(Color::Red).fg(Color::White),
            NoticeLevel::Info => Style::default().bg(Color::Blue).fg(Color::White),
        };
        let line = Line::from(Span::styled(format!(" {} ", notice.text), style));
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: &[(&str, &str)] = match app.focus {
        FocusPane::Keys => &[("j/k", "nav"), ("Enter", "run"), ("Tab", "focus"), ("i", "type"), ("C", "clear"), ("q", "quit")],
        FocusPane::Chat => &[("j/k", "scroll"), ("g/G", "top/bottom"), ("Tab", "focus"), ("C", "clear"), ("q", "quit")],
        FocusPane::Input => &[("Enter", "send"), ("Esc", "back"), ("Ctrl+C", "quit")],
    };

    let spans: Vec<Span> = hints
        .iter()
        .flat_map(|(key, label)| {
            [
                Span::styled(format!(" {} ", key), key_style),
                Span::styled(format!(" {} ", label), label_style),
            ]
        })
        .collect();

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_confirm(action: KeyAction, frame: &mut Frame, area: Rect) {
    let popup_width = 44.min(area.width.saturating_sub(4));
    let popup_height = 5.min(area.height.saturating_sub(2));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Confirm ");

    let text = Text::from(vec![
        Line::from(format!("{}?", action.display_name())),
        Line::from(Span::styled("y to confirm, any other key to cancel", Style::default().fg(Color::DarkGray))),
    ]);

    frame.render_widget(Paragraph::new(text).block(block).wrap(Wrap { trim: true }), popup_area);
}
