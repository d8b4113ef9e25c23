//! 错误类型定义

use std::path::PathBuf;

use thiserror::Error;

/// 日志子系统错误
#[derive(Error, Debug)]
pub enum LogError {
    /// 日志目录或日志文件 IO 失败
    #[error("log I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 写入线程已经退出
    #[error("log writer is closed")]
    WriterClosed,
}

impl LogError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LogError::Io {
            path: path.into(),
            source,
        }
    }
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件读取失败
    #[error("Error opening config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置行格式错误
    #[error("Invalid config line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// 缺少必填项
    #[error("Missing required config value: {0}")]
    Missing(&'static str),

    /// 配置值不合法
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
