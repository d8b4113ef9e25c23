//! 行编解码
//!
//! 行格式:
//! ```text
//! ┌──────────────────────────────────────┬──────┐
//! │  Payload (UTF-8, <= MAX_LINE_LEN)    │  \n  │
//! └──────────────────────────────────────┴──────┘
//! ```
//!
//! 没有长度前缀，`\r\n` 与 `\n` 都被视为行结束。

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{ProtocolError, Result};
use crate::MAX_LINE_LEN;

/// 行读取器
///
/// 未读完的半行保存在内部缓冲区中，因此 `read_line` 可以安全地放在
/// `tokio::select!` 分支里：被取消后再次调用会从中断处继续。
pub struct LineReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// 创建新的行读取器
    pub fn new(reader: R) -> Self {
        Self::with_max_len(reader, MAX_LINE_LEN)
    }

    /// 使用自定义的单行上限创建读取器
    pub fn with_max_len(reader: R, max_len: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(max_len.min(MAX_LINE_LEN) + 1),
            max_len,
        }
    }

    /// 读取一行（不含行尾）
    ///
    /// 返回 `Ok(None)` 表示对端已关闭且没有剩余数据。
    /// 对端关闭前最后一段没有换行的数据按一行返回。
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            let available = self.reader.fill_buf().await?;

            if available.is_empty() {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_line()));
            }

            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.buffer.extend_from_slice(&available[..pos]);
                    self.reader.consume(pos + 1);
                    self.check_len()?;
                    return Ok(Some(self.take_line()));
                }
                None => {
                    let len = available.len();
                    self.buffer.extend_from_slice(available);
                    self.reader.consume(len);
                    self.check_len()?;
                }
            }
        }
    }

    /// 缓冲区中尚未凑成一行的字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn check_len(&mut self) -> Result<()> {
        // 行尾的 \r 不计入长度
        let len = match self.buffer.last() {
            Some(b'\r') => self.buffer.len() - 1,
            _ => self.buffer.len(),
        };
        if len > self.max_len {
            self.buffer.clear();
            return Err(ProtocolError::LineTooLong {
                len,
                max: self.max_len,
            });
        }
        Ok(())
    }

    fn take_line(&mut self) -> String {
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        line
    }
}

/// 行写入器
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    /// 创建新的行写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 写入一行，缺少换行符时自动补上
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let payload = line.strip_suffix('\n').unwrap_or(line);
        if payload.len() > MAX_LINE_LEN {
            return Err(ProtocolError::LineTooLong {
                len: payload.len(),
                max: MAX_LINE_LEN,
            });
        }

        self.writer.write_all(payload.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        Ok(())
    }

    /// 关闭写入端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
