//! 聊天室服务端
//!
//! 基于 Tokio 的 TCP 服务器，每个连接的消息写入按大小轮转的日志目录

mod chatlog;
mod config;
mod error;
mod events;
mod server;
mod shutdown;
mod worker;

use anyhow::Result;
use clap::Parser;
use config::Cli;
use server::ChatServer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_server=info".parse()?)
                .add_directive("protocol=info".parse()?),
        )
        .init();

    let config = Cli::parse().into_config()?;

    let server = ChatServer::bind(&config).await?;
    info!(
        "Chat Server listening on {} (log dir: {}, threshold: {} bytes, max files: {})",
        server.local_addr()?,
        config.directory.display(),
        config.log_file_threshold,
        config.max_log_files
    );

    let report = server.run().await?;
    info!(
        "Shutdown by {:?}: served {} connections ({} finished early, {} drained), {} log lines written, {} still connected",
        report.trigger,
        report.accepted,
        report.reaped_while_running.total(),
        report.drained.total(),
        report.log_lines,
        report.connections
    );

    Ok(())
}
