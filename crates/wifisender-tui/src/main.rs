//! Wifisender TUI - 交互式终端界面
//!
//! 使用 ratatui 提供发送/接收两种模式的传输界面。
//! 命令行参数中的路径会被预先加入发送列表。
//!
//! # 日志
//!
//! 日志默认显示在 TUI 的"日志"标签页中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug cargo run -p wifisender-tui 2>> /tmp/wifisender.log
//! ```

mod app;
mod tui_log;
mod ui;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wifisender_core::AppSettings;

use app::{App, Field, Tab};
use tui_log::TuiLogLayer;

#[tokio::main]
async fn main() -> Result<()> {
    let mut app = App::new(AppSettings::load());
    for path in std::env::args().skip(1) {
        app.add_file(PathBuf::from(path));
    }

    // 初始化日志系统，发送到 TUI 日志面板
    init_logging(app.event_tx.clone());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run app
    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到 TUI 日志面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: tokio::sync::mpsc::Sender<app::AppEvent>) {
    // 桥接 log crate（wifisender-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let tui_layer = TuiLogLayer::new(log_tx);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wifisender_core=debug"));

    if std::env::var("RUST_LOG").is_ok() {
        use tracing_subscriber::fmt;

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .with(stderr_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .try_init();
    }
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        // 使用 poll 避免无限阻塞
        if event::poll(Duration::from_millis(100))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            // 提示框拦截所有按键以关闭它
            if app.popup.is_some() {
                app.dismiss_popup();
                continue;
            }

            if app.editing.is_some() {
                match key.code {
                    KeyCode::Esc => app.cancel_edit(),
                    KeyCode::Enter => app.commit_edit(),
                    KeyCode::Char(c) => app.input_buffer.push(c),
                    KeyCode::Backspace => {
                        app.input_buffer.pop();
                    }
                    _ => {}
                }
            } else {
                match key.code {
                    KeyCode::Char('q') => {
                        app.shutdown();
                        return Ok(());
                    }
                    KeyCode::Esc | KeyCode::Char('x') => app.cancel_session(),
                    KeyCode::Enter => app.start(),
                    KeyCode::Char('m') => app.toggle_mode(),
                    KeyCode::Char('p') => app.begin_edit(Field::Port),
                    KeyCode::Char('a') => app.begin_edit(Field::Recipient),
                    KeyCode::Char('f') => app.begin_edit(Field::AddFile),
                    KeyCode::Char('o') => app.begin_edit(Field::DownloadDir),
                    KeyCode::Char('r') | KeyCode::Delete => app.remove_selected_file(),
                    KeyCode::Up | KeyCode::Char('k') => app.previous_file(),
                    KeyCode::Down | KeyCode::Char('j') => app.next_file(),
                    KeyCode::Tab => app.next_tab(),
                    KeyCode::Char('1') => app.tab = Tab::Transfer,
                    KeyCode::Char('2') => app.tab = Tab::Log,
                    KeyCode::Char('v') => app.toggle_log_level(),
                    KeyCode::Char('c') => app.clear_logs(),
                    _ => {}
                }
            }
        }

        // 处理后台事件
        app.tick();
    }
}
