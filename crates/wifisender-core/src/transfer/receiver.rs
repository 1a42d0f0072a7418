//! 接收端
//!
//! 在所有接口上监听，只接受一条连接:
//! - accept 超时后重新等待，并报告 "Waiting for connection..."
//! - 逐帧读取文件名、大小和内容，写入目标目录
//! - 收到结束哨兵或对端断开后关闭连接，不再接受新的连接
//!
//! 对端中途断开与取消等价：已写入的部分文件保留在磁盘上。
//! 等待帧头或数据时同样响应取消，停滞的对端不会拖住会话。

use log::{debug, info, warn};

use crate::error::TransferError;
use crate::transfer::progress::{TransferCallback, TransferProgress, report_failure};
use crate::transfer::protocol::{CHUNK_SIZE, FrameCodec, NameField, WireFormat};
use crate::transfer::state::{SessionOutcome, SessionRole, SessionState, TransferredFile};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;

/// 默认端口
pub const DEFAULT_PORT: u16 = 5555;

/// 默认 accept 超时
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(60);

/// 接收选项
#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    /// 监听地址（默认所有接口）
    pub bind_addr: IpAddr,
    /// 监听端口，0 表示由系统分配
    pub port: u16,
    /// 文件保存目录
    pub output_dir: PathBuf,
    /// accept 超时，超时后重新等待
    pub accept_timeout: Duration,
    /// 单次读取上限
    pub chunk_size: usize,
    /// 文件名字段格式
    pub wire_format: WireFormat,
    /// 截断的文件视为失败而不是取消
    pub strict: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            output_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
            chunk_size: CHUNK_SIZE,
            wire_format: WireFormat::default(),
            strict: false,
        }
    }
}

/// 帧循环的结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEnd {
    /// 收到结束哨兵
    Finished,
    /// 对端关闭或重置了连接
    Disconnected,
    /// 本地取消
    Cancelled,
}

/// 已绑定端口的文件接收端
pub struct FileReceiver {
    listener: TcpListener,
    local_addr: SocketAddr,
    options: ReceiveOptions,
}

impl FileReceiver {
    /// 绑定监听端口（启用地址复用，backlog 为 1）
    pub async fn bind(options: ReceiveOptions) -> Result<Self, TransferError> {
        let addr = SocketAddr::new(options.bind_addr, options.port);

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket
            .bind(addr)
            .map_err(|e| TransferError::from_bind(e, addr))?;
        let listener = socket
            .listen(1)
            .map_err(|e| TransferError::from_bind(e, addr))?;
        let local_addr = listener.local_addr()?;

        info!("Receiver bound to {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            options,
        })
    }

    /// 绑定并接收；绑定失败同样通过回调报告
    pub async fn run<C: TransferCallback + ?Sized>(
        options: ReceiveOptions,
        callback: &C,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, TransferError> {
        let receiver = match Self::bind(options).await {
            Ok(receiver) => receiver,
            Err(e) => {
                report_failure(callback, &e);
                return Err(e);
            }
        };
        receiver.serve(callback, cancel).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 等待一条连接并接收其中的所有文件
    ///
    /// 返回时监听 socket 已关闭，端口立即释放。
    pub async fn serve<C: TransferCallback + ?Sized>(
        self,
        callback: &C,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, TransferError> {
        match self.serve_inner(callback, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                report_failure(callback, &e);
                Err(e)
            }
        }
    }

    async fn serve_inner<C: TransferCallback + ?Sized>(
        self,
        callback: &C,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, TransferError> {
        callback.on_state(SessionState::Listening);
        callback.on_status(&format!("Listening on port {}...", self.local_addr.port()));

        let accepted = self.accept(callback, cancel).await?;

        // 每个会话只接受一条连接
        let FileReceiver {
            listener, options, ..
        } = self;
        drop(listener);

        let Some((mut stream, peer)) = accepted else {
            info!("Receive cancelled while waiting for a connection");
            return Ok(finish(callback, LoopEnd::Cancelled, Vec::new()));
        };

        info!("Connection from {}", peer);
        callback.on_status(&format!("Connection from {}", peer.ip()));

        let mut files = Vec::new();
        let end = receive_frames(&mut stream, &options, callback, cancel, &mut files).await?;
        drop(stream);

        Ok(finish(callback, end, files))
    }

    /// 等待连接；超时后重新等待，取消时返回 `Ok(None)`
    async fn accept<C: TransferCallback + ?Sized>(
        &self,
        callback: &C,
        cancel: &CancellationToken,
    ) -> Result<Option<(TcpStream, SocketAddr)>, TransferError> {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(None),
                res = tokio::time::timeout(self.options.accept_timeout, self.listener.accept()) => {
                    match res {
                        Ok(Ok(pair)) => return Ok(Some(pair)),
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_) => {
                            debug!("Accept timed out on {}, waiting again", self.local_addr);
                            callback.on_status("Waiting for connection...");
                        }
                    }
                }
            }
        }
    }
}

/// 逐帧读取直到哨兵、断开或取消
async fn receive_frames<C: TransferCallback + ?Sized>(
    stream: &mut TcpStream,
    options: &ReceiveOptions,
    callback: &C,
    cancel: &CancellationToken,
    files: &mut Vec<TransferredFile>,
) -> Result<LoopEnd, TransferError> {
    tokio::fs::create_dir_all(&options.output_dir).await?;

    let codec = FrameCodec::new(options.wire_format);
    let mut buf = vec![0u8; options.chunk_size.max(1)];

    loop {
        if cancel.is_cancelled() {
            return Ok(LoopEnd::Cancelled);
        }

        // 对端停滞时等待帧头不能阻塞取消
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(LoopEnd::Cancelled),
            read = codec.read_name(stream) => read,
        };
        let name = match read {
            Ok(Some(NameField::File(name))) => name,
            Ok(Some(NameField::End)) => {
                debug!("End marker received");
                return Ok(LoopEnd::Finished);
            }
            Ok(None) => return Ok(LoopEnd::Disconnected),
            Err(TransferError::Io(e)) if is_disconnect(&e) => return Ok(LoopEnd::Disconnected),
            Err(e) => return Err(e),
        };
        let size = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(LoopEnd::Cancelled),
            size = codec.read_size(stream) => size?,
        };

        let index = files.len();
        callback.on_state(SessionState::Transferring { index });
        debug!("Receiving '{}' ({} bytes)", name, size);

        let file = receive_file(stream, name, size, index, options, &mut buf, callback, cancel).await?;
        callback.on_file_complete(&file);

        if file.is_complete() {
            callback.on_status(&format!("Received: {}", file.name));
            files.push(file);
            continue;
        }

        let cancelled = cancel.is_cancelled();
        if options.strict && !cancelled {
            return Err(TransferError::Truncated {
                name: file.name,
                expected: file.size,
                transferred: file.transferred,
            });
        }

        warn!(
            "'{}' is incomplete: {} of {} bytes written to {}",
            file.name,
            file.transferred,
            file.size,
            file.path.display()
        );
        callback.on_status(&format!(
            "Truncated: {} ({}/{} bytes)",
            file.name, file.transferred, file.size
        ));
        files.push(file);

        return Ok(if cancelled {
            LoopEnd::Cancelled
        } else {
            LoopEnd::Disconnected
        });
    }
}

/// 接收单个文件的内容
///
/// 每次读取都不超过本帧剩余字节数，不会吞掉下一帧的帧头。
#[allow(clippy::too_many_arguments)]
async fn receive_file<C: TransferCallback + ?Sized>(
    stream: &mut TcpStream,
    name: String,
    size: u64,
    index: usize,
    options: &ReceiveOptions,
    buf: &mut [u8],
    callback: &C,
    cancel: &CancellationToken,
) -> Result<TransferredFile, TransferError> {
    let path = options.output_dir.join(&name);
    let mut file = File::create(&path).await?;

    let mut progress = TransferProgress::new(index, None, size);
    if size == 0 {
        callback.on_progress(progress.percent(), &progress);
    }

    while !progress.is_file_done() {
        let remaining = size - progress.bytes_transferred;
        let want = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));

        // 取消只打断等待中的读取，已读到的块总会写入文件
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            read = stream.read(&mut buf[..want]) => read,
        };
        let n = match read {
            Ok(n) => n,
            Err(e) if is_disconnect(&e) => 0,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            break;
        }

        file.write_all(&buf[..n]).await?;
        progress.advance(n as u64);
        callback.on_progress(progress.percent(), &progress);
    }

    file.flush().await?;

    Ok(TransferredFile {
        name,
        path,
        size,
        transferred: progress.bytes_transferred,
    })
}

fn finish<C: TransferCallback + ?Sized>(
    callback: &C,
    end: LoopEnd,
    files: Vec<TransferredFile>,
) -> SessionOutcome {
    let state = match end {
        LoopEnd::Finished => {
            let done = TransferProgress {
                file_index: files.len().saturating_sub(1),
                total_files: None,
                bytes_transferred: 0,
                file_size: 0,
            };
            callback.on_state(SessionState::Complete);
            callback.on_status("Transfer complete!");
            callback.on_progress(100.0, &done);
            info!("Received {} file(s)", files.len());
            SessionState::Complete
        }
        LoopEnd::Disconnected => {
            callback.on_state(SessionState::Cancelled);
            callback.on_status("Connection closed by sender");
            info!(
                "Sender disconnected after {} file(s)",
                files.iter().filter(|f| f.is_complete()).count()
            );
            SessionState::Cancelled
        }
        LoopEnd::Cancelled => {
            callback.on_state(SessionState::Cancelled);
            callback.on_status("Receive cancelled");
            SessionState::Cancelled
        }
    };

    SessionOutcome {
        role: SessionRole::Receive,
        state,
        files,
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
