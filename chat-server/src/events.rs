//! 聊天日志中的事件行
//!
//! 每行格式: `[YYYY-MM-DD HH:MM:SS] <事件文本>`

use std::fmt;
use std::net::IpAddr;

use chrono::NaiveDateTime;

use crate::chatlog;

/// 一条日志事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent<'a> {
    /// 服务端启动
    ServerStartUp,
    /// 服务端关闭
    ServerShutDown,
    /// 客户端连接并报上显示名
    Connected { addr: IpAddr, name: &'a str },
    /// 客户端发送的一条消息
    Message {
        addr: IpAddr,
        name: &'a str,
        text: &'a str,
    },
    /// 客户端发送了 quit
    Quit { addr: IpAddr, name: &'a str },
    /// 对端关闭了连接
    Disconnected { addr: IpAddr, name: &'a str },
    /// 服务端关闭时被要求退出
    Drained { addr: IpAddr, name: &'a str },
}

impl LogEvent<'_> {
    /// 使用当前时间生成日志行
    pub fn stamped(&self) -> String {
        self.stamped_at(chatlog::now())
    }

    /// 使用指定时间生成日志行
    pub fn stamped_at(&self, at: NaiveDateTime) -> String {
        format!("[{}] {}", chatlog::event_timestamp(at), self)
    }
}

impl fmt::Display for LogEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEvent::ServerStartUp => f.write_str("Server start up."),
            LogEvent::ServerShutDown => f.write_str("Server shut down."),
            LogEvent::Connected { addr, name } => {
                write!(f, "Client (IP: {addr}, name: {name}) is connected.")
            }
            LogEvent::Message { addr, name, text } => {
                write!(f, "Client ({addr}) - {name}: {text}")
            }
            LogEvent::Quit { addr, name } => {
                write!(f, "Client (IP: {addr}, name: {name}) sent quit command.")
            }
            LogEvent::Disconnected { addr, name } => {
                write!(f, "Client (IP: {addr}, name: {name}) disconnected.")
            }
            LogEvent::Drained { addr, name } => {
                write!(f, "Client (IP: {addr}, name: {name}) closed by server shutdown.")
            }
        }
    }
}
