//! 文件传输模块
//!
//! 包含:
//! - 帧编解码 (文件名 + 大小 + 内容，哨兵结束)
//! - 进度计算与回调
//! - 会话状态机
//! - TCP 发送端与接收端

pub mod progress;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod state;

pub use progress::{NoopCallback, TransferCallback, TransferProgress};
pub use protocol::{CHUNK_SIZE, END_SENTINEL, FrameCodec, MAX_FILENAME_LEN, NameField, WireFormat};
pub use receiver::{DEFAULT_ACCEPT_TIMEOUT, DEFAULT_PORT, FileReceiver, ReceiveOptions};
pub use sender::{DEFAULT_CONNECT_TIMEOUT, FileSender, SendOptions};
pub use state::{SessionOutcome, SessionRole, SessionState, TransferredFile};
