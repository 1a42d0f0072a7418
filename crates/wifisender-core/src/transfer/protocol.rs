//! 帧编解码
//!
//! 每个文件在线路上是一帧:
//!
//! ```text
//! [文件名字段][8 字节大端 u64: 文件大小][size 字节: 文件内容]
//! ```
//!
//! 发送端没有更多文件时，在文件名字段的位置发送 7 字节哨兵 `__END__`。
//!
//! 文件名字段有两种编码:
//! - `LengthPrefixed`: 2 字节大端长度 + UTF-8 字节（默认）
//! - `Legacy`: 裸 UTF-8 字节，接收端用一次最多 1024 字节的读取取出。
//!   只有当一次读取恰好返回一个文件名时才正确，仅用于与旧版对端互通。

use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// 会话结束哨兵
pub const END_SENTINEL: &[u8; 7] = b"__END__";

/// 文件名字段最大字节数
pub const MAX_FILENAME_LEN: usize = 1024;

/// 文件数据分块大小 (64 KiB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// 文件名字段的线格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireFormat {
    #[default]
    LengthPrefixed,
    Legacy,
}

impl WireFormat {
    pub fn name(&self) -> &'static str {
        match self {
            WireFormat::LengthPrefixed => "length-prefixed",
            WireFormat::Legacy => "legacy",
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "length-prefixed" | "framed" => Ok(WireFormat::LengthPrefixed),
            "legacy" => Ok(WireFormat::Legacy),
            other => Err(format!("unknown wire format '{other}'")),
        }
    }
}

/// 解码出的文件名字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameField {
    File(String),
    /// 哨兵：传输结束
    End,
}

/// 帧编解码器，除线格式外不持有状态
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    format: WireFormat,
}

impl FrameCodec {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// 编码帧头（文件名 + 大小）
    pub fn encode_header(&self, name: &str, size: u64) -> Result<Vec<u8>, TransferError> {
        let mut buf = self.encode_name(name)?;
        buf.extend_from_slice(&Self::encode_size(size));
        Ok(buf)
    }

    /// 编码文件名字段
    pub fn encode_name(&self, name: &str) -> Result<Vec<u8>, TransferError> {
        validate_filename(name)?;

        let mut buf = Vec::with_capacity(2 + name.len() + 8);
        self.put_name(&mut buf, name.as_bytes());
        Ok(buf)
    }

    /// 编码大小字段
    pub fn encode_size(size: u64) -> [u8; 8] {
        size.to_be_bytes()
    }

    /// 编码结束哨兵
    pub fn encode_end(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + END_SENTINEL.len());
        self.put_name(&mut buf, END_SENTINEL);
        buf
    }

    fn put_name(&self, buf: &mut Vec<u8>, bytes: &[u8]) {
        if self.format == WireFormat::LengthPrefixed {
            // 长度已由 validate_filename 限制在 MAX_FILENAME_LEN 以内
            let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
            buf.extend_from_slice(&len.to_be_bytes());
        }
        buf.extend_from_slice(bytes);
    }

    /// 读取文件名字段
    ///
    /// 对端在帧边界干净地关闭连接时返回 `Ok(None)`。
    pub async fn read_name<R>(&self, reader: &mut R) -> Result<Option<NameField>, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let bytes = match self.format {
            WireFormat::LengthPrefixed => {
                let mut len_buf = [0u8; 2];
                if !read_exact_or_eof(reader, &mut len_buf)
                    .await
                    .map_err(header_eof)?
                {
                    return Ok(None);
                }

                let len = usize::from(u16::from_be_bytes(len_buf));
                if len == 0 || len > MAX_FILENAME_LEN {
                    return Err(TransferError::MalformedFrame(format!(
                        "filename length {len} out of range"
                    )));
                }

                let mut name = vec![0u8; len];
                reader.read_exact(&mut name).await.map_err(header_eof)?;
                name
            }
            WireFormat::Legacy => {
                let mut buf = vec![0u8; MAX_FILENAME_LEN];
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                buf
            }
        };

        decode_name(bytes).map(Some)
    }

    /// 读取 8 字节大端文件大小
    pub async fn read_size<R>(&self, reader: &mut R) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).await.map_err(header_eof)?;
        Ok(u64::from_be_bytes(buf))
    }
}

fn decode_name(bytes: Vec<u8>) -> Result<NameField, TransferError> {
    if bytes.as_slice() == END_SENTINEL {
        return Ok(NameField::End);
    }

    let name = String::from_utf8(bytes)
        .map_err(|_| TransferError::MalformedFrame("filename is not valid UTF-8".to_string()))?;
    validate_filename(&name)?;
    Ok(NameField::File(name))
}

/// 校验文件名可以安全地作为单个路径组件使用
pub fn validate_filename(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::MalformedFrame("empty filename".to_string()));
    }
    if name.len() > MAX_FILENAME_LEN {
        return Err(TransferError::MalformedFrame(format!(
            "filename exceeds {MAX_FILENAME_LEN} bytes"
        )));
    }
    if name.as_bytes() == END_SENTINEL {
        return Err(TransferError::MalformedFrame(format!(
            "'{name}' is reserved as the end marker"
        )));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(TransferError::MalformedFrame(format!(
            "unsafe filename '{}'",
            name.escape_debug()
        )));
    }
    Ok(())
}

fn header_eof(err: io::Error) -> TransferError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        TransferError::MalformedFrame("connection closed inside frame header".to_string())
    } else {
        TransferError::Io(err)
    }
}

/// 填满 `buf`；一个字节都没读到就遇到 EOF 时返回 `false`
async fn read_exact_or_eof<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        filled += n;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_length_prefixed_header_layout() {
        let codec = FrameCodec::default();
        let header = codec.encode_header("a.txt", 11).unwrap();

        assert_eq!(&header[..2], &[0x00, 0x05]);
        assert_eq!(&header[2..7], b"a.txt");
        assert_eq!(&header[7..], &11u64.to_be_bytes());
    }

    #[test]
    fn test_legacy_header_layout() {
        let codec = FrameCodec::new(WireFormat::Legacy);
        let header = codec.encode_header("a.txt", 11).unwrap();

        assert_eq!(&header[..5], b"a.txt");
        assert_eq!(&header[5..], &[0, 0, 0, 0, 0, 0, 0, 11]);
    }

    #[test]
    fn test_end_marker() {
        let framed = FrameCodec::default().encode_end();
        assert_eq!(framed, b"\x00\x07__END__");

        let legacy = FrameCodec::new(WireFormat::Legacy).encode_end();
        assert_eq!(legacy, END_SENTINEL);
    }

    #[test]
    fn test_rejects_unsafe_names() {
        let codec = FrameCodec::default();
        for name in ["", ".", "..", "../etc/passwd", "dir/file", "a\\b", "__END__"] {
            assert!(
                matches!(
                    codec.encode_header(name, 1),
                    Err(TransferError::MalformedFrame(_))
                ),
                "accepted {name:?}"
            );
        }

        let long = "x".repeat(MAX_FILENAME_LEN + 1);
        assert!(codec.encode_header(&long, 1).is_err());
        assert!(codec.encode_header("报告.pdf", 1).is_ok());
    }

    #[tokio::test]
    async fn test_read_frames_in_sequence() {
        let codec = FrameCodec::default();
        let mut wire = codec.encode_header("a.txt", 11).unwrap();
        wire.extend_from_slice(b"hello world");
        wire.extend_from_slice(&codec.encode_end());

        let mut reader = wire.as_slice();
        assert_eq!(
            codec.read_name(&mut reader).await.unwrap(),
            Some(NameField::File("a.txt".to_string()))
        );
        assert_eq!(codec.read_size(&mut reader).await.unwrap(), 11);

        let mut data = [0u8; 11];
        reader.read_exact(&mut data).await.unwrap();
        assert_eq!(&data, b"hello world");

        assert_eq!(
            codec.read_name(&mut reader).await.unwrap(),
            Some(NameField::End)
        );
        assert_eq!(codec.read_name(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clean_eof_at_frame_boundary() {
        let mut reader: &[u8] = &[];
        let name = FrameCodec::default().read_name(&mut reader).await.unwrap();
        assert!(name.is_none());
    }

    #[tokio::test]
    async fn test_eof_inside_header_is_malformed() {
        let codec = FrameCodec::default();

        let mut reader: &[u8] = &[0x00];
        assert!(matches!(
            codec.read_name(&mut reader).await,
            Err(TransferError::MalformedFrame(_))
        ));

        let mut reader: &[u8] = &[0x00, 0x05, b'a', b'b'];
        assert!(matches!(
            codec.read_name(&mut reader).await,
            Err(TransferError::MalformedFrame(_))
        ));

        let mut reader: &[u8] = &[0, 0, 0, 1];
        assert!(matches!(
            codec.read_size(&mut reader).await,
            Err(TransferError::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_decode_rejects_bad_names() {
        let codec = FrameCodec::default();

        let mut reader: &[u8] = &[0x00, 0x02, 0xff, 0xfe];
        assert!(matches!(
            codec.read_name(&mut reader).await,
            Err(TransferError::MalformedFrame(_))
        ));

        let mut reader: &[u8] = b"\x00\x05../ab";
        assert!(matches!(
            codec.read_name(&mut reader).await,
            Err(TransferError::MalformedFrame(_))
        ));

        let mut reader: &[u8] = &[0x00, 0x00];
        assert!(matches!(
            codec.read_name(&mut reader).await,
            Err(TransferError::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_legacy_single_read() {
        let codec = FrameCodec::new(WireFormat::Legacy);
        let (mut tx, mut rx) = tokio::io::duplex(4096);

        tx.write_all(b"notes.md").await.unwrap();
        assert_eq!(
            codec.read_name(&mut rx).await.unwrap(),
            Some(NameField::File("notes.md".to_string()))
        );

        tx.write_all(&42u64.to_be_bytes()).await.unwrap();
        assert_eq!(codec.read_size(&mut rx).await.unwrap(), 42);

        tx.write_all(END_SENTINEL).await.unwrap();
        assert_eq!(
            codec.read_name(&mut rx).await.unwrap(),
            Some(NameField::End)
        );

        drop(tx);
        assert_eq!(codec.read_name(&mut rx).await.unwrap(), None);
    }

    #[test]
    fn test_wire_format_parse() {
        assert_eq!(
            "legacy".parse::<WireFormat>().unwrap(),
            WireFormat::Legacy
        );
        assert_eq!(
            "Length-Prefixed".parse::<WireFormat>().unwrap(),
            WireFormat::LengthPrefixed
        );
        assert!("json".parse::<WireFormat>().is_err());
        assert_eq!(WireFormat::default().to_string(), "length-prefixed");
    }
}
