//! 会话事件的终端输出
//!
//! 默认使用 indicatif 进度条；`--json` 时每个事件输出一行 JSON。

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use wifisender_core::{SessionEvent, SessionState};

pub enum Renderer {
    Bar(BarRenderer),
    Json,
}

impl Renderer {
    pub fn new(json: bool) -> Result<Self> {
        if json {
            Ok(Self::Json)
        } else {
            Ok(Self::Bar(BarRenderer::new()?))
        }
    }

    pub fn handle(&self, event: &SessionEvent) -> Result<()> {
        match self {
            Self::Json => {
                println!("{}", serde_json::to_string(event)?);
                Ok(())
            }
            Self::Bar(bar) => {
                bar.handle(event);
                Ok(())
            }
        }
    }

    pub fn finish(&self) {
        if let Self::Bar(bar) = self {
            bar.finish();
        }
    }
}

pub struct BarRenderer {
    bar: ProgressBar,
}

impl BarRenderer {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(120));
        Ok(Self { bar })
    }

    fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::State { state } => {
                if matches!(state, SessionState::Cancelled | SessionState::Failed) {
                    self.bar.abandon();
                }
            }
            SessionEvent::Status { message } => {
                self.bar.set_message(message.clone());
            }
            // 接收端的进度按文件计算，每个文件从 0 重新开始
            SessionEvent::Progress { percent, .. } => {
                self.bar.set_position(bar_position(*percent));
            }
            SessionEvent::FileComplete { file } => {
                self.bar.println(format!(
                    "  ✓ {} ({})",
                    file.name,
                    format_size(file.transferred)
                ));
            }
            SessionEvent::Error { message } => {
                self.bar.println(format!("  ✗ {message}"));
            }
        }
    }

    fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish();
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bar_position(percent: f64) -> u64 {
    percent.clamp(0.0, 100.0).floor() as u64
}

/// 以二进制单位格式化字节数
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
