//! 会话状态机
//!
//! `Idle → Connecting/Listening → Transferring(i) → {Transferring(i+1) | Complete | Cancelled | Failed}`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 会话角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Send,
    Receive,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionRole::Send => f.write_str("send"),
            SessionRole::Receive => f.write_str("receive"),
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Listening,
    Transferring {
        index: usize,
    },
    Complete,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Cancelled | SessionState::Failed
        )
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Listening | SessionState::Transferring { .. }
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Listening => f.write_str("listening"),
            SessionState::Transferring { index } => write!(f, "transferring file #{}", index + 1),
            SessionState::Complete => f.write_str("complete"),
            SessionState::Cancelled => f.write_str("cancelled"),
            SessionState::Failed => f.write_str("failed"),
        }
    }
}

/// 一个已处理（或部分处理）的文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferredFile {
    pub name: String,
    /// 发送端为源路径，接收端为落盘路径
    pub path: PathBuf,
    /// 帧头声明的大小
    pub size: u64,
    /// 实际传输的字节数
    pub transferred: u64,
}

impl TransferredFile {
    pub fn is_complete(&self) -> bool {
        self.transferred == self.size
    }
}

/// 会话结束结果
///
/// `state` 只会是 `Complete` 或 `Cancelled`，失败通过 `Err` 返回。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub role: SessionRole,
    pub state: SessionState,
    pub files: Vec<TransferredFile>,
}

impl SessionOutcome {
    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    /// 完整传输的文件数
    pub fn completed_files(&self) -> usize {
        self.files.iter().filter(|f| f.is_complete()).count()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.transferred).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Transferring { index: 2 }.is_terminal());
        assert!(SessionState::Complete.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(SessionState::Listening.is_busy());
    }

    #[test]
    fn test_outcome_counts() {
        let outcome = SessionOutcome {
            role: SessionRole::Receive,
            state: SessionState::Cancelled,
            files: vec![
                TransferredFile {
                    name: "a.txt".to_string(),
                    path: PathBuf::from("/tmp/a.txt"),
                    size: 11,
                    transferred: 11,
                },
                TransferredFile {
                    name: "big.iso".to_string(),
                    path: PathBuf::from("/tmp/big.iso"),
                    size: 1000,
                    transferred: 400,
                },
            ],
        };

        assert!(!outcome.is_complete());
        assert_eq!(outcome.completed_files(), 1);
        assert_eq!(outcome.total_bytes(), 411);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            SessionState::Transferring { index: 0 }.to_string(),
            "transferring file #1"
        );
        assert_eq!(SessionRole::Receive.to_string(), "receive");
    }
}
