//! 发送端
//!
//! 打开一条出站连接，按选择顺序逐个发送文件:
//! 1. 帧头（文件名 + 大小）
//! 2. 以 64 KiB 分块发送文件内容，每块之后报告进度
//! 3. 最后一个文件之后发送结束哨兵并关闭连接
//!
//! 取消只在文件之间检查；取消时不发送哨兵，直接丢弃连接。

use log::{debug, info};

use crate::error::TransferError;
use crate::transfer::progress::{TransferCallback, TransferProgress, report_failure};
use crate::transfer::protocol::{CHUNK_SIZE, FrameCodec, WireFormat};
use crate::transfer::state::{SessionOutcome, SessionRole, SessionState, TransferredFile};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// 默认连接超时
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// 发送选项
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// 连接超时
    pub connect_timeout: Duration,
    /// 分块大小
    pub chunk_size: usize,
    /// 文件名字段格式
    pub wire_format: WireFormat,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            chunk_size: CHUNK_SIZE,
            wire_format: WireFormat::default(),
        }
    }
}

/// 文件发送端
pub struct FileSender {
    options: SendOptions,
}

impl FileSender {
    pub fn new(options: SendOptions) -> Self {
        Self { options }
    }

    /// 发送文件到 `address:port`
    ///
    /// 失败时会先通过回调报告，再返回错误。
    pub async fn send<C: TransferCallback + ?Sized>(
        &self,
        address: &str,
        port: u16,
        files: &[PathBuf],
        callback: &C,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, TransferError> {
        match self.run(address, port, files, callback, cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                report_failure(callback, &e);
                Err(e)
            }
        }
    }

    async fn run<C: TransferCallback + ?Sized>(
        &self,
        address: &str,
        port: u16,
        files: &[PathBuf],
        callback: &C,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome, TransferError> {
        let target = display_target(address, port);

        callback.on_state(SessionState::Connecting);
        callback.on_status(&format!("Connecting to {target}..."));
        info!("Connecting to {}", target);

        let Some(mut stream) = self.connect(address, port, &target, cancel).await? else {
            info!("Send cancelled while connecting to {}", target);
            return Ok(cancelled(callback, Vec::new()));
        };
        stream.set_nodelay(true)?;

        callback.on_status("Connected! Sending files...");
        info!("Connected to {}, sending {} file(s)", target, files.len());

        let codec = FrameCodec::new(self.options.wire_format);
        let total = files.len();
        let mut buf = vec![0u8; self.options.chunk_size.max(1)];
        let mut sent = Vec::with_capacity(total);

        for (index, path) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Send cancelled before file {}/{}", index + 1, total);
                // 不发送哨兵，连接随 stream 一起被丢弃
                return Ok(cancelled(callback, sent));
            }

            callback.on_state(SessionState::Transferring { index });
            let file = send_file(&mut stream, &codec, path, index, total, &mut buf, callback).await?;

            callback.on_status(&format!("Sent {}/{}: {}", index + 1, total, file.name));
            callback.on_file_complete(&file);
            sent.push(file);
        }

        stream.write_all(&codec.encode_end()).await?;
        stream.flush().await?;
        stream.shutdown().await?;
        debug!("End marker sent to {}", target);

        let done = TransferProgress {
            file_index: total.saturating_sub(1),
            total_files: Some(total),
            bytes_transferred: 0,
            file_size: 0,
        };
        callback.on_state(SessionState::Complete);
        callback.on_status("All files sent successfully!");
        callback.on_progress(100.0, &done);
        info!("Sent {} file(s) to {}", total, target);

        Ok(SessionOutcome {
            role: SessionRole::Send,
            state: SessionState::Complete,
            files: sent,
        })
    }

    /// 建立连接；等待期间被取消时返回 `Ok(None)`
    async fn connect(
        &self,
        address: &str,
        port: u16,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<TcpStream>, TransferError> {
        connect_within(
            TcpStream::connect((address, port)),
            self.options.connect_timeout,
            target,
            cancel,
        )
        .await
    }
}

/// 在超时内等待 `connecting` 完成，同时观察取消
async fn connect_within<F>(
    connecting: F,
    timeout: Duration,
    target: &str,
    cancel: &CancellationToken,
) -> Result<Option<TcpStream>, TransferError>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Ok(None),
        res = tokio::time::timeout(timeout, connecting) => match res {
            Err(_) => Err(TransferError::ConnectionTimeout {
                addr: target.to_string(),
                timeout,
            }),
            Ok(Err(e)) => Err(TransferError::from_connect(e, target, timeout)),
            Ok(Ok(stream)) => Ok(Some(stream)),
        },
    }
}

/// 发送单个文件帧
async fn send_file<C: TransferCallback + ?Sized>(
    stream: &mut TcpStream,
    codec: &FrameCodec,
    path: &Path,
    index: usize,
    total: usize,
    buf: &mut [u8],
    callback: &C,
) -> Result<TransferredFile, TransferError> {
    let name = file_name_of(path)?;
    let file = File::open(path).await?;
    let metadata = file.metadata().await?;
    // 目录也能打开，必须在写出帧头之前拒绝
    if !metadata.is_file() {
        return Err(TransferError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' is not a regular file", path.display()),
        )));
    }
    let size = metadata.len();

    // 旧版对端依赖文件名单独到达，两个字段分开写出
    stream.write_all(&codec.encode_name(&name)?).await?;
    stream.write_all(&FrameCodec::encode_size(size)).await?;
    debug!("Sending '{}' ({} bytes)", name, size);

    let mut progress = TransferProgress::new(index, Some(total), size);
    if size == 0 {
        callback.on_progress(progress.percent(), &progress);
    }

    // 文件在发送过程中变大时只发送声明的大小
    let mut reader = file.take(size);
    while !progress.is_file_done() {
        let n = reader.read(buf).await?;
        if n == 0 {
            return Err(TransferError::Truncated {
                name,
                expected: size,
                transferred: progress.bytes_transferred,
            });
        }
        stream.write_all(&buf[..n]).await?;
        progress.advance(n as u64);
        callback.on_progress(progress.percent(), &progress);
    }

    Ok(TransferredFile {
        name,
        path: path.to_path_buf(),
        size,
        transferred: size,
    })
}

fn cancelled<C: TransferCallback + ?Sized>(
    callback: &C,
    files: Vec<TransferredFile>,
) -> SessionOutcome {
    callback.on_state(SessionState::Cancelled);
    callback.on_status("Send cancelled");
    SessionOutcome {
        role: SessionRole::Send,
        state: SessionState::Cancelled,
        files,
    }
}

/// 取路径的最后一个组件作为线上文件名
fn file_name_of(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            TransferError::MalformedFrame(format!(
                "'{}' has no UTF-8 file name",
                path.display()
            ))
        })
}

fn display_target(address: &str, port: u16) -> String {
    if address.contains(':') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}
