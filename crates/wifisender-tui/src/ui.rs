//! UI rendering module

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Tabs, Wrap},
};
use wifisender_core::{LogLevel, SessionState};

use crate::app::{App, Field, Mode, Tab};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_main(frame, app, chunks[1]);
    draw_status_bar(frame, app, chunks[2]);

    if let Some(popup) = &app.popup {
        draw_popup(frame, &popup.title, &popup.message);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let titles = vec!["传输 [1]", "日志 [2]"];
    let selected = match app.tab {
        Tab::Transfer => 0,
        Tab::Log => 1,
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" WifiSender │ {} │ {} ", app.hostname, app.local_ip)),
        )
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).bold());

    frame.render_widget(tabs, area);
}

fn draw_main(frame: &mut Frame, app: &App, area: Rect) {
    match app.tab {
        Tab::Transfer => draw_transfer_tab(frame, app, area),
        Tab::Log => draw_log_tab(frame, app, area),
    }
}

fn draw_transfer_tab(frame: &mut Frame, app: &App, area: Rect) {
    let connection_height = match app.mode {
        Mode::Send => 5,
        Mode::Receive => 4,
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),                 // Mode
            Constraint::Length(connection_height), // Connection
            Constraint::Min(4),                    // Files / folder
            Constraint::Length(3),                 // Progress
            Constraint::Length(3),                 // Status
        ])
        .split(area);

    draw_mode_selector(frame, app, chunks[0]);
    draw_connection(frame, app, chunks[1]);
    match app.mode {
        Mode::Send => draw_file_list(frame, app, chunks[2]),
        Mode::Receive => draw_download_dir(frame, app, chunks[2]),
    }
    draw_progress(frame, app, chunks[3]);

    let status = Paragraph::new(app.status_message.as_str())
        .style(Style::default().fg(state_color(app.state)))
        .block(Block::default().borders(Borders::ALL).title(" 状态 "))
        .wrap(Wrap { trim: true });
    frame.render_widget(status, chunks[4]);
}

fn draw_mode_selector(frame: &mut Frame, app: &App, area: Rect) {
    let tab = |label: &'static str, active: bool| {
        if active {
            Span::styled(
                format!(" {label} "),
                Style::default().fg(Color::Black).bg(Color::Green).bold(),
            )
        } else {
            Span::styled(format!(" {label} "), Style::default().fg(Color::DarkGray))
        }
    };
    let line = Line::from(vec![
        tab("SEND", app.mode == Mode::Send),
        Span::raw("  "),
        tab("RECEIVE", app.mode == Mode::Receive),
    ]);

    let selector =
        Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(" 模式 [m] "));
    frame.render_widget(selector, area);
}

fn draw_connection(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from(vec![
            Span::raw("Your IP Address: "),
            Span::styled(app.local_ip.to_string(), Style::default().fg(Color::Cyan)),
        ]),
        field_line(app, Field::Port, &app.port_input, 'p'),
    ];
    if app.mode == Mode::Send {
        lines.push(field_line(app, Field::Recipient, &app.recipient, 'a'));
    }

    let block = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Connection "));
    frame.render_widget(block, area);
}

/// 输入框一行：编辑时显示缓冲区和光标
fn field_line<'a>(app: &'a App, field: Field, value: &'a str, key: char) -> Line<'a> {
    let label = Span::raw(format!("{}: ", field.label()));
    if app.editing == Some(field) {
        Line::from(vec![
            label,
            Span::styled(
                format!("{}█", app.input_buffer),
                Style::default().fg(Color::Yellow),
            ),
        ])
    } else {
        Line::from(vec![
            label,
            Span::raw(value),
            Span::styled(format!("  [{key}]"), Style::default().fg(Color::DarkGray)),
        ])
    }
}

fn draw_file_list(frame: &mut Frame, app: &App, area: Rect) {
    let mut items: Vec<ListItem> = app
        .files
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let style = if i == app.selected_file {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            } else {
                Style::default()
            };
            ListItem::new(path.display().to_string()).style(style)
        })
        .collect();

    if app.editing == Some(Field::AddFile) {
        items.push(ListItem::new(field_line(app, Field::AddFile, "", 'f')));
    } else if items.is_empty() {
        items.push(
            ListItem::new("No files selected  [f] 添加文件").style(Style::default().fg(Color::DarkGray)),
        );
    }

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Files ({}) [f]添加 [r]移除 ", app.files.len())),
    );
    frame.render_widget(list, area);
}

fn draw_download_dir(frame: &mut Frame, app: &App, area: Rect) {
    let dir = app.settings.download_dir.display().to_string();
    let line = field_line(app, Field::DownloadDir, &dir, 'o');

    let folder = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL).title(" Download Folder "))
        .wrap(Wrap { trim: false });
    frame.render_widget(folder, area);
}

fn draw_progress(frame: &mut Frame, app: &App, area: Rect) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = app.progress.clamp(0.0, 100.0) as u16;

    let gauge = Gauge::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} [Enter] ", app.action_label())),
        )
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .percent(percent)
        .label(format!("{percent}%"));

    frame.render_widget(gauge, area);
}

fn draw_log_tab(frame: &mut Frame, app: &App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .visible_logs()
        .rev()
        .take(height)
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("{:<5} ", entry.level),
                    Style::default().fg(level_color(entry.level)),
                ),
                Span::styled(
                    format!("{} ", entry.short_target()),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(entry.message.as_str()),
            ]))
        })
        .collect();

    let title = format!(" 日志 ({}) [v]级别 [c]清空 ", app.log_level);
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));

    frame.render_widget(list, area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_text = match app.mode {
        Mode::Send => " 📤 发送 ",
        Mode::Receive => " 📥 接收 ",
    };
    let keys = if app.editing.is_some() {
        "[Enter]确认 [Esc]放弃"
    } else if app.is_busy() {
        "[x]取消 [Tab]切换 [q]退出"
    } else {
        "[Enter]开始 [m]模式 [Tab]切换 [q]退出"
    };

    let status = Paragraph::new(format!("{}│ {} │ {}", mode_text, app.state, keys))
        .block(Block::default().borders(Borders::ALL));

    frame.render_widget(status, area);
}

fn draw_popup(frame: &mut Frame, title: &str, message: &str) {
    let area = centered_rect(60, 5, frame.area());
    let popup = Paragraph::new(message)
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(format!(" {title} ")),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(Clear, area);
    frame.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(height),
        Constraint::Fill(1),
    ])
    .split(area);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(vertical[1])[1]
}

fn state_color(state: SessionState) -> Color {
    match state {
        SessionState::Complete => Color::Green,
        SessionState::Failed => Color::Red,
        SessionState::Cancelled => Color::Yellow,
        _ => Color::White,
    }
}

fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Error => Color::Red,
        LogLevel::Warn => Color::Yellow,
        LogLevel::Info => Color::Green,
        LogLevel::Debug => Color::Blue,
        LogLevel::Trace => Color::DarkGray,
    }
}
