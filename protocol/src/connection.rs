//! 连接封装
//!
//! 提供按行收发的接口，封装传输层和编解码。

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::{LineReader, LineWriter};
use crate::error::Result;
use crate::transport::Transport;

/// 连接封装
///
/// 将传输层和行编解码封装在一起，同时记住对端地址。
///
/// # Type Parameters
/// * `R` - 读取端类型
/// * `W` - 写入端类型
pub struct Connection<R, W> {
    reader: LineReader<R>,
    writer: LineWriter<W>,
    peer_addr: SocketAddr,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// 从传输层创建连接
    pub fn new<T: Transport<Reader = R, Writer = W>>(transport: T) -> Self {
        let peer_addr = transport.peer_addr();
        let (reader, writer) = transport.split();
        Self::from_parts(reader, writer, peer_addr)
    }

    /// 从读写端直接创建连接
    pub fn from_parts(reader: R, writer: W, peer_addr: SocketAddr) -> Self {
        Self {
            reader: LineReader::new(reader),
            writer: LineWriter::new(writer),
            peer_addr,
        }
    }

    /// 对端地址
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// 已收到但还没有凑成完整一行的字节数
    pub fn pending_bytes(&self) -> usize {
        self.reader.buffered()
    }

    /// 接收一行，`None` 表示对端已关闭
    pub async fn recv(&mut self) -> Result<Option<String>> {
        self.reader.read_line().await
    }

    /// 发送一行
    pub async fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_line(line).await
    }

    /// 关闭连接的写方向并释放连接
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await
    }
}
