//! 聊天室共享协议库
//!
//! 换行分隔的 UTF-8 文本协议:
//! - 第一行: 客户端显示名
//! - 之后每行: 一条聊天消息
//! - `quit`: 结束会话
//!
//! 包含:
//! - 行类型定义 (ClientLine)
//! - 传输层抽象 (Transport trait)
//! - 行编解码 (LineReader, LineWriter)
//! - 连接封装 (Connection)

mod message;
mod constants;
mod transport;
mod codec;
mod connection;
mod error;

pub use message::{validate_name, ClientLine};
pub use constants::*;
pub use transport::{Transport, TransportListener, TransportConfig, TcpTransport, TcpListener};
pub use codec::{LineReader, LineWriter};
pub use connection::Connection;
pub use error::{ProtocolError, Result};
