//! 行类型定义

use crate::error::{ProtocolError, Result};
use crate::{MAX_NAME_LEN, QUIT_COMMAND};

/// 客户端在会话阶段发送的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// 结束会话
    Quit,
    /// 普通聊天消息，原样记录
    Chat(String),
}

impl ClientLine {
    /// 解析一行（行尾已去除）
    pub fn parse(line: String) -> Self {
        if line == QUIT_COMMAND {
            ClientLine::Quit
        } else {
            ClientLine::Chat(line)
        }
    }
}

/// 校验显示名是否符合约束
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ProtocolError::NameEmpty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}
