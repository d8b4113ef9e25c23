//! 聊天日志子系统
//!
//! 按大小轮转、按数量保留的日志目录，所有写入经由唯一的写入线程串行化。

mod directory;
mod naming;
mod writer;

pub use directory::{LogDirectory, LogPolicy};
pub use naming::{event_timestamp, now};
pub use writer::{LogSink, LogWriter};
