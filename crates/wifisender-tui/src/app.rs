//! Application state

use std::net::IpAddr;
use std::path::PathBuf;
use tokio::sync::mpsc;
use wifisender_core::{
    AppSettings, LogEntry, LogLevel, SessionEvent, SessionHandle, SessionState, TransferSession,
};

/// 日志面板最多保留的条目
const MAX_LOGS: usize = 500;

/// 后台发往界面的事件
#[derive(Debug)]
pub enum AppEvent {
    LogMessage {
        level: String,
        target: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Send,
    Receive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Transfer,
    Log,
}

/// 可编辑的输入框
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Port,
    Recipient,
    AddFile,
    DownloadDir,
}

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::Port => "Port",
            Field::Recipient => "Recipient IP",
            Field::AddFile => "Add file",
            Field::DownloadDir => "Download folder",
        }
    }
}

/// 模态提示框，任意键关闭
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    pub title: String,
    pub message: String,
}

pub struct App {
    pub mode: Mode,
    pub tab: Tab,
    pub settings: AppSettings,
    pub port_input: String,
    pub recipient: String,
    pub files: Vec<PathBuf>,
    pub selected_file: usize,
    pub editing: Option<Field>,
    pub input_buffer: String,
    pub session: Option<SessionHandle>,
    pub state: SessionState,
    pub progress: f64,
    pub status_message: String,
    pub popup: Option<Popup>,
    pub logs: Vec<LogEntry>,
    pub log_level: LogLevel,
    pub hostname: String,
    pub local_ip: IpAddr,
    pub event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
}

impl App {
    pub fn new(settings: AppSettings) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let mut app = Self {
            mode: Mode::Send,
            tab: Tab::Transfer,
            port_input: settings.port.to_string(),
            recipient: settings.recipient.clone().unwrap_or_default(),
            settings,
            files: Vec::new(),
            selected_file: 0,
            editing: None,
            input_buffer: String::new(),
            session: None,
            state: SessionState::Idle,
            progress: 0.0,
            status_message: "Ready".to_string(),
            popup: None,
            logs: Vec::new(),
            log_level: LogLevel::Info,
            hostname,
            local_ip: wifisender_core::net::local_ip(),
            event_tx,
            event_rx,
        };
        app.add_log(LogLevel::Info, "WifiSender TUI 启动");
        app.add_log(
            LogLevel::Info,
            "按 'm' 切换发送/接收, Enter 开始, 'x' 取消, 'q' 退出",
        );
        app
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_some()
    }

    /// 当前模式下动作按钮的文字
    pub fn action_label(&self) -> &'static str {
        match (self.mode, self.is_busy()) {
            (Mode::Send, false) => "SEND FILES",
            (Mode::Send, true) => "SENDING...",
            (Mode::Receive, false) => "START RECEIVING",
            (Mode::Receive, true) => "LISTENING...",
        }
    }

    pub fn toggle_mode(&mut self) {
        if self.is_busy() {
            self.add_log(LogLevel::Warn, "传输进行中，无法切换模式");
            return;
        }
        self.mode = match self.mode {
            Mode::Send => Mode::Receive,
            Mode::Receive => Mode::Send,
        };
        self.state = SessionState::Idle;
        self.progress = 0.0;
        self.status_message = "Ready".to_string();
    }

    /// 开始编辑输入框；不属于当前模式的输入框被忽略
    pub fn begin_edit(&mut self, field: Field) {
        if self.is_busy() {
            return;
        }
        self.input_buffer = match (field, self.mode) {
            (Field::Port, _) => self.port_input.clone(),
            (Field::Recipient, Mode::Send) => self.recipient.clone(),
            (Field::AddFile, Mode::Send) => String::new(),
            (Field::DownloadDir, Mode::Receive) => {
                self.settings.download_dir.display().to_string()
            }
            _ => return,
        };
        self.tab = Tab::Transfer;
        self.editing = Some(field);
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
        self.input_buffer.clear();
    }

    pub fn commit_edit(&mut self) {
        let Some(field) = self.editing.take() else {
            return;
        };
        let value = std::mem::take(&mut self.input_buffer).trim().to_string();
        match field {
            Field::Port => self.port_input = value,
            Field::Recipient => self.recipient = value,
            Field::AddFile => {
                if !value.is_empty() {
                    self.add_file(PathBuf::from(value));
                }
            }
            Field::DownloadDir => {
                if !value.is_empty() {
                    self.settings.download_dir = PathBuf::from(value);
                    self.add_log(
                        LogLevel::Info,
                        format!("下载目录: {}", self.settings.download_dir.display()),
                    );
                }
            }
        }
    }

    pub fn add_file(&mut self, path: PathBuf) {
        if !path.is_file() {
            self.show_popup("File not found", format!("{} is not a file", path.display()));
            return;
        }
        if self.files.contains(&path) {
            return;
        }
        self.add_log(LogLevel::Info, format!("添加文件: {}", path.display()));
        self.files.push(path);
        self.selected_file = self.files.len() - 1;
    }

    pub fn remove_selected_file(&mut self) {
        if self.is_busy() || self.selected_file >= self.files.len() {
            return;
        }
        let removed = self.files.remove(self.selected_file);
        self.add_log(LogLevel::Info, format!("移除文件: {}", removed.display()));
        if self.selected_file >= self.files.len() {
            self.selected_file = self.files.len().saturating_sub(1);
        }
    }

    pub fn next_file(&mut self) {
        if !self.files.is_empty() {
            self.selected_file = (self.selected_file + 1) % self.files.len();
        }
    }

    pub fn previous_file(&mut self) {
        if !self.files.is_empty() {
            self.selected_file = self
                .selected_file
                .checked_sub(1)
                .unwrap_or(self.files.len() - 1);
        }
    }

    /// 动作按钮：按当前模式开始发送或接收
    pub fn start(&mut self) {
        if self.is_busy() {
            return;
        }
        match self.mode {
            Mode::Send => self.start_send(),
            Mode::Receive => self.start_receive(),
        }
    }

    fn parse_port(&self) -> Option<u16> {
        self.port_input.trim().parse().ok().filter(|p| *p != 0)
    }

    fn start_send(&mut self) {
        if self.files.is_empty() {
            self.show_popup("No Files", "Please select files to send");
            return;
        }
        if self.recipient.trim().is_empty() {
            self.show_popup("Missing IP", "Please enter recipient IP address");
            return;
        }
        let Some(port) = self.parse_port() else {
            self.show_popup("Invalid Port", "Please enter a valid port number");
            return;
        };

        let recipient = self.recipient.trim().to_string();
        self.settings.port = port;
        self.settings.recipient = Some(recipient.clone());
        self.save_settings();

        self.reset_progress();
        let handle = TransferSession::send(
            self.settings.send_options(),
            recipient,
            port,
            self.files.clone(),
        );
        tracing::info!("Send session {} started", handle.id());
        self.session = Some(handle);
    }

    fn start_receive(&mut self) {
        let Some(port) = self.parse_port() else {
            self.show_popup("Invalid Port", "Please enter a valid port number");
            return;
        };

        self.settings.port = port;
        self.save_settings();

        self.reset_progress();
        let handle = TransferSession::receive(self.settings.receive_options());
        tracing::info!("Receive session {} started", handle.id());
        self.session = Some(handle);
    }

    pub fn cancel_session(&mut self) {
        if let Some(session) = &self.session {
            session.cancel();
            self.add_log(LogLevel::Info, "正在取消...");
        }
    }

    /// 退出前取消正在运行的会话
    pub fn shutdown(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel();
        }
    }

    fn reset_progress(&mut self) {
        self.state = SessionState::Idle;
        self.progress = 0.0;
    }

    fn save_settings(&mut self) {
        if let Err(e) = self.settings.save() {
            self.add_log(LogLevel::Warn, format!("保存设置失败: {e}"));
        }
    }

    pub fn show_popup(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.popup = Some(Popup {
            title: title.into(),
            message: message.into(),
        });
    }

    pub fn dismiss_popup(&mut self) {
        self.popup = None;
    }

    pub fn next_tab(&mut self) {
        self.tab = match self.tab {
            Tab::Transfer => Tab::Log,
            Tab::Log => Tab::Transfer,
        };
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.push_log(LogEntry::new(level, "wifisender_tui", message));
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.logs.push(entry);
        if self.logs.len() > MAX_LOGS {
            let excess = self.logs.len() - MAX_LOGS;
            self.logs.drain(..excess);
        }
    }

    pub fn visible_logs(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.logs.iter().filter(|e| self.log_level.allows(e.level))
    }

    pub fn toggle_log_level(&mut self) {
        self.log_level = self.log_level.toggle_verbose();
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    /// 处理后台事件（日志、会话进度）
    pub fn tick(&mut self) {
        while let Ok(AppEvent::LogMessage {
            level,
            target,
            message,
        }) = self.event_rx.try_recv()
        {
            let level = level.parse().unwrap_or(LogLevel::Info);
            self.push_log(LogEntry::new(level, target, message));
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        // 任务结束后所有事件都已在 channel 中
        let finished = session.is_finished();
        let mut events = Vec::new();
        while let Some(event) = session.try_next_event() {
            events.push(event);
        }
        for event in events {
            self.handle_session_event(event);
        }
        if finished {
            self.session = None;
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::State { state } => self.state = state,
            SessionEvent::Status { message } => self.status_message = message,
            SessionEvent::Progress { percent, .. } => self.progress = percent,
            SessionEvent::FileComplete { file } => {
                self.add_log(
                    LogLevel::Info,
                    format!("✓ {} ({} bytes)", file.name, file.transferred),
                );
            }
            SessionEvent::Error { message } => self.show_popup("Error", message),
        }
    }
}
