//! 终端聊天客户端核心实现
//!
//! 把标准输入的每一行转发给服务端，服务端不回传任何内容，
//! 只需监听连接是否被关闭。

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use protocol::{Connection, QUIT_COMMAND};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config.txt";

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "chat-client", version, about = "Line-oriented chat client")]
pub struct Cli {
    /// 服务器地址（与 PORT 同时给出时不读取配置文件）
    #[arg(requires = "port")]
    pub host: Option<String>,

    /// 服务器端口
    pub port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

impl Cli {
    /// 目标服务器地址，格式为 "host:port"
    pub fn server_addr(&self) -> Result<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) => Ok(format!("{host}:{port}")),
            _ => load_server_addr(&self.config),
        }
    }
}

/// 会话结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// 用户输入了 quit
    Quit,
    /// 标准输入结束
    InputClosed,
    /// 收到 Ctrl+C
    Interrupted,
    /// 服务端关闭了连接
    ServerClosed,
}

/// 从 `ip_address=` / `port=` 配置文件读取服务器地址
pub fn load_server_addr(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Error opening config file {}", path.display()))?;

    let mut host = None;
    let mut port = None;
    for line in contents.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            "ip_address" => host = Some(value.trim().to_string()),
            "port" => {
                let value: u16 = value
                    .trim()
                    .parse()
                    .map_err(|e| anyhow!("invalid port {:?}: {}", value.trim(), e))?;
                port = Some(value);
            }
            _ => {}
        }
    }

    match (host, port) {
        (Some(host), Some(port)) => Ok(format!("{host}:{port}")),
        (None, _) => bail!("config file is missing ip_address"),
        (_, None) => bail!("config file is missing port"),
    }
}

/// 发送显示名后转发输入，直到会话结束
///
/// `input` 的每一项是标准输入的一行，通道关闭等同于输入结束。
pub async fn run_session<R, W, F>(
    mut conn: Connection<R, W>,
    name: &str,
    mut input: mpsc::Receiver<String>,
    interrupt: F,
) -> Result<SessionEnd>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    conn.send(name).await.context("failed to send name")?;
    tokio::pin!(interrupt);

    let end = loop {
        tokio::select! {
            line = input.recv() => {
                match line {
                    Some(line) => {
                        conn.send(&line).await.context("failed to send message")?;
                        if line == QUIT_COMMAND {
                            break SessionEnd::Quit;
                        }
                    }
                    None => {
                        send_quit(&mut conn).await;
                        break SessionEnd::InputClosed;
                    }
                }
            }

            result = conn.recv() => {
                match result {
                    Ok(Some(line)) => debug!("Ignoring server output {:?}", line),
                    Ok(None) => break SessionEnd::ServerClosed,
                    Err(e) => {
                        warn!("Error reading from server: {}", e);
                        break SessionEnd::ServerClosed;
                    }
                }
            }

            _ = &mut interrupt => {
                send_quit(&mut conn).await;
                break SessionEnd::Interrupted;
            }
        }
    };

    if end != SessionEnd::ServerClosed {
        if let Err(e) = conn.close().await {
            debug!("Failed to close connection: {}", e);
        }
    }
    Ok(end)
}

async fn send_quit<R, W>(conn: &mut Connection<R, W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = conn.send(QUIT_COMMAND).await {
        debug!("Failed to send quit: {}", e);
    }
}
