//! 工作流模块
//!
//! 提供高层 API：在后台任务中运行完整的发送/接收会话

pub mod session;

pub use session::{ChannelCallback, SessionEvent, SessionHandle, TransferSession};
