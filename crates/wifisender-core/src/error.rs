//! 传输错误类型
//!
//! 所有失败都局限于当前会话：终止该会话的工作任务，
//! 并以一条状态文本加一次错误通知的形式报告给界面层。

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// 会话级错误
#[derive(Debug, Error)]
pub enum TransferError {
    /// 对端在连接超时内没有接受连接
    #[error("connection to {addr} timed out after {}s", .timeout.as_secs())]
    ConnectionTimeout { addr: String, timeout: Duration },

    /// 对端主动拒绝连接（没有监听者）
    #[error("connection to {addr} refused")]
    ConnectionRefused { addr: String },

    /// 监听端口已被占用
    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    /// 流关闭前收到/发出的字节少于声明的大小
    #[error("truncated transfer of '{name}': {transferred} of {expected} bytes")]
    Truncated {
        name: String,
        expected: u64,
        transferred: u64,
    },

    /// 文件名或大小字段无法解码
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// 其他文件系统或 socket 错误
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransferError {
    /// 面向用户的简短状态文本
    pub fn status_text(&self) -> String {
        match self {
            TransferError::ConnectionTimeout { .. } => "Connection timeout".to_string(),
            TransferError::ConnectionRefused { .. } => "Connection refused".to_string(),
            TransferError::PortInUse { .. } => "Port already in use".to_string(),
            other => format!("Error: {other}"),
        }
    }

    /// 将连接阶段的 I/O 错误归类
    pub(crate) fn from_connect(err: io::Error, addr: &str, timeout: Duration) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => TransferError::ConnectionRefused {
                addr: addr.to_string(),
            },
            io::ErrorKind::TimedOut => TransferError::ConnectionTimeout {
                addr: addr.to_string(),
                timeout,
            },
            _ => TransferError::Io(err),
        }
    }

    /// 将绑定阶段的 I/O 错误归类
    pub(crate) fn from_bind(err: io::Error, addr: SocketAddr) -> Self {
        if err.kind() == io::ErrorKind::AddrInUse {
            TransferError::PortInUse { port: addr.port() }
        } else {
            TransferError::Io(err)
        }
    }
}
