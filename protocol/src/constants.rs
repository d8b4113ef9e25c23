//! 协议常量定义

use std::time::Duration;

/// 单行最大长度（字节，不含换行符）
pub const MAX_LINE_LEN: usize = 1023;

/// 显示名最大长度（字节）
pub const MAX_NAME_LEN: usize = 255;

/// 结束会话的哨兵行
pub const QUIT_COMMAND: &str = "quit";

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
