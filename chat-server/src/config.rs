//! 服务端配置
//!
//! 来源（优先级从低到高）:
//! 1. 默认值
//! 2. `key=value` 配置文件（默认 `config.txt`）
//! 3. 命令行参数

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::warn;

use crate::chatlog::LogPolicy;
use crate::error::ConfigError;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.txt";

/// 默认轮转阈值: 1 MiB
pub const DEFAULT_LOG_FILE_THRESHOLD: u64 = 1_048_576;

/// 默认保留的日志文件数
pub const DEFAULT_MAX_LOG_FILES: usize = 4;

/// 默认监听地址
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// 服务端配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 日志目录
    pub directory: PathBuf,
    /// 日志文件轮转阈值（字节）
    pub log_file_threshold: u64,
    /// 日志文件保留数量
    pub max_log_files: usize,
}

impl ServerConfig {
    pub fn new(port: u16, directory: impl Into<PathBuf>) -> Self {
        Self {
            host: DEFAULT_BIND_HOST.to_string(),
            port,
            directory: directory.into(),
            log_file_threshold: DEFAULT_LOG_FILE_THRESHOLD,
            max_log_files: DEFAULT_MAX_LOG_FILES,
        }
    }

    /// 监听地址，格式为 "host:port"
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn log_policy(&self) -> LogPolicy {
        LogPolicy {
            threshold: self.log_file_threshold,
            retention: self.max_log_files,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_log_files == 0 {
            return Err(ConfigError::Invalid {
                key: "max_log_files",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.log_file_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "log_file_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "directory",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// 配置文件中出现的值，缺省项为 `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub port: Option<u16>,
    pub directory: Option<PathBuf>,
    pub log_file_threshold: Option<u64>,
    pub max_log_files: Option<usize>,
}

impl ConfigFile {
    /// 读取并解析配置文件
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// 解析 `key=value` 文本，空行和 `#` 开头的行被忽略
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut file = ConfigFile::default();

        for (index, raw) in contents.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Parse {
                line: line_no,
                reason: format!("expected key=value, got {line:?}"),
            })?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                "port" => file.port = Some(parse_value("port", value)?),
                "directory" => file.directory = Some(PathBuf::from(value)),
                "log_file_threshold" => {
                    file.log_file_threshold = Some(parse_value("log_file_threshold", value)?)
                }
                "max_log_files" => {
                    file.max_log_files = Some(parse_value("max_log_files", value)?)
                }
                other => warn!("Ignoring unknown config key {:?} on line {}", other, line_no),
            }
        }

        Ok(file)
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: format!("{value:?}: {e}"),
    })
}

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "chat-server", version, about = "Line-oriented TCP chat log server")]
pub struct Cli {
    /// 监听端口（与 DIRECTORY 同时给出时不读取配置文件）
    pub port: Option<u16>,

    /// 日志目录
    pub directory: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// 日志文件轮转阈值（字节）
    #[arg(long)]
    pub threshold: Option<u64>,

    /// 日志文件保留数量
    #[arg(long)]
    pub max_files: Option<usize>,

    /// 监听主机
    #[arg(long, default_value = DEFAULT_BIND_HOST)]
    pub bind: String,
}

impl Cli {
    /// 合并命令行与配置文件，得到最终配置
    pub fn into_config(self) -> Result<ServerConfig, ConfigError> {
        let file = match (self.port, &self.directory) {
            (Some(_), Some(_)) => ConfigFile::default(),
            _ => ConfigFile::load(&self.config)?,
        };
        self.merge(file)
    }

    fn merge(self, file: ConfigFile) -> Result<ServerConfig, ConfigError> {
        let port = self
            .port
            .or(file.port)
            .ok_or(ConfigError::Missing("port"))?;
        let directory = self
            .directory
            .or(file.directory)
            .ok_or(ConfigError::Missing("directory"))?;

        let mut config = ServerConfig::new(port, directory);
        config.host = self.bind;
        if let Some(threshold) = self.threshold.or(file.log_file_threshold) {
            config.log_file_threshold = threshold;
        }
        if let Some(max_files) = self.max_files.or(file.max_log_files) {
            config.max_log_files = max_files;
        }

        config.validate()?;
        Ok(config)
    }
}
