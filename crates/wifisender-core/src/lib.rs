//! Wifisender Core Library
//!
//! 局域网内点对点文件传输的核心实现：一条 TCP 连接，逐帧发送文件。
//!
//! # 模块
//!
//! - **transfer**: 帧编解码、进度计算、发送端与接收端状态机
//! - **workflow**: 在后台任务中运行会话，并通过 channel 转交进度
//! - **config**: 设置的持久化
//! - **logging**: 前端共用的日志级别与条目
//! - **net**: 本机地址探测
//!
//! # 使用示例
//!
//! ## 发送文件
//!
//! ```ignore
//! use wifisender_core::{SendOptions, TransferSession};
//!
//! let mut session = TransferSession::send(
//!     SendOptions::default(),
//!     "192.168.1.20",
//!     5555,
//!     vec!["/home/user/a.txt".into()],
//! );
//! while let Some(event) = session.next_event().await {
//!     println!("{event:?}");
//! }
//! let outcome = session.join().await?;
//! ```
//!
//! ## 接收文件
//!
//! ```ignore
//! use wifisender_core::{ReceiveOptions, TransferSession};
//!
//! let session = TransferSession::receive(ReceiveOptions {
//!     output_dir: "/home/user/Downloads".into(),
//!     ..Default::default()
//! });
//! let outcome = session.join().await?;
//! println!("received {} file(s)", outcome.completed_files());
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod net;
pub mod transfer;
pub mod workflow;

pub use config::AppSettings;
pub use error::TransferError;
pub use logging::{LogEntry, LogLevel};

// Transfer re-exports
pub use transfer::{
    FileReceiver, FileSender, FrameCodec, NoopCallback, ReceiveOptions, SendOptions,
    SessionOutcome, SessionRole, SessionState, TransferCallback, TransferProgress,
    TransferredFile, WireFormat,
};

// Workflow re-exports
pub use workflow::{ChannelCallback, SessionEvent, SessionHandle, TransferSession};

// 会话取消令牌
pub use tokio_util::sync::CancellationToken;
