//! 会话运行器
//!
//! 每个会话（一次发送或一次接收）在自己的后台任务中运行。
//! 工作任务不直接接触界面状态：所有通知都通过 channel 转交给
//! 持有 [`SessionHandle`] 的一方，界面只能取消会话和读取事件。

use log::{info, warn};

use crate::error::TransferError;
use crate::transfer::{
    FileReceiver, FileSender, ReceiveOptions, SendOptions, SessionOutcome, SessionRole,
    SessionState, TransferCallback, TransferProgress, TransferredFile,
};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 工作任务发往界面的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    State { state: SessionState },
    Status { message: String },
    Progress {
        percent: f64,
        progress: TransferProgress,
    },
    FileComplete { file: TransferredFile },
    Error { message: String },
}

/// 把回调转成 channel 消息的适配器
///
/// 使用无界 channel：工作任务从不阻塞，终止事件也不会被丢弃。
#[derive(Clone)]
pub struct ChannelCallback {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelCallback {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: SessionEvent) {
        // 接收方已经离开时直接丢弃
        let _ = self.tx.send(event);
    }
}

impl TransferCallback for ChannelCallback {
    fn on_state(&self, state: SessionState) {
        self.emit(SessionEvent::State { state });
    }

    fn on_status(&self, status: &str) {
        self.emit(SessionEvent::Status {
            message: status.to_string(),
        });
    }

    fn on_progress(&self, percent: f64, progress: &TransferProgress) {
        self.emit(SessionEvent::Progress {
            percent,
            progress: *progress,
        });
    }

    fn on_file_complete(&self, file: &TransferredFile) {
        self.emit(SessionEvent::FileComplete { file: file.clone() });
    }

    fn on_error(&self, error: &TransferError) {
        self.emit(SessionEvent::Error {
            message: error.to_string(),
        });
    }
}

/// 正在运行的会话
///
/// 丢弃句柄会取消会话（正在监听的端口随之释放）。
pub struct SessionHandle {
    id: Uuid,
    role: SessionRole,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: Option<JoinHandle<Result<SessionOutcome, TransferError>>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// 请求协作式取消
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 等待下一个事件；会话结束且事件取完后返回 `None`
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// 非阻塞地取一个事件
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// 等待会话结束
    pub async fn join(mut self) -> Result<SessionOutcome, TransferError> {
        let Some(task) = self.task.take() else {
            return Err(TransferError::Io(io::Error::other("session already joined")));
        };
        match task.await {
            Ok(result) => result,
            Err(e) => Err(TransferError::Io(io::Error::other(e))),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 会话入口
pub struct TransferSession;

impl TransferSession {
    /// 在后台发送 `files` 到 `address:port`
    pub fn send(
        options: SendOptions,
        address: impl Into<String>,
        port: u16,
        files: Vec<PathBuf>,
    ) -> SessionHandle {
        let address = address.into();
        Self::spawn(SessionRole::Send, move |callback, cancel, id| async move {
            info!(
                "Session {} started: send {} file(s) to {}:{}",
                id,
                files.len(),
                address,
                port
            );
            FileSender::new(options)
                .send(&address, port, &files, &callback, &cancel)
                .await
        })
    }

    /// 在后台绑定端口并接收
    pub fn receive(options: ReceiveOptions) -> SessionHandle {
        Self::spawn(SessionRole::Receive, move |callback, cancel, id| async move {
            info!(
                "Session {} started: receive on port {} into {}",
                id,
                options.port,
                options.output_dir.display()
            );
            FileReceiver::run(options, &callback, &cancel).await
        })
    }

    /// 使用已绑定的接收端（例如由系统分配端口时）
    pub fn serve(receiver: FileReceiver) -> SessionHandle {
        Self::spawn(SessionRole::Receive, move |callback, cancel, id| async move {
            info!(
                "Session {} started: receive on {}",
                id,
                receiver.local_addr()
            );
            receiver.serve(&callback, &cancel).await
        })
    }

    fn spawn<F, Fut>(role: SessionRole, work: F) -> SessionHandle
    where
        F: FnOnce(ChannelCallback, CancellationToken, Uuid) -> Fut,
        Fut: Future<Output = Result<SessionOutcome, TransferError>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (callback, events) = ChannelCallback::new();

        let fut = work(callback, cancel.clone(), id);
        let task = tokio::spawn(async move {
            let result = fut.await;
            match &result {
                Ok(outcome) => info!(
                    "Session {} ({}) finished: {}, {} file(s)",
                    id,
                    role,
                    outcome.state,
                    outcome.completed_files()
                ),
                Err(e) => warn!("Session {} ({}) failed: {}", id, role, e),
            }
            result
        });

        SessionHandle {
            id,
            role,
            cancel,
            events,
            task: Some(task),
        }
    }
}
