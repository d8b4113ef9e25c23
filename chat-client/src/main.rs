//! 聊天室客户端
//!
//! 终端客户端: 先发送显示名，然后逐行转发标准输入

mod client;

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use protocol::{validate_name, Connection, TcpTransport, Transport, TransportConfig};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use client::{run_session, Cli, SessionEnd};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志，默认只输出警告，避免干扰输入
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chat_client=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let addr = Cli::parse().server_addr()?;

    let transport = TcpTransport::connect(&addr, &TransportConfig::default())
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    info!("Connected to {}", transport.peer_addr());
    let conn = Connection::new(transport);

    let mut input = stdin_lines();
    let Some(name) = prompt_name(&mut input).await? else {
        debug!("Input closed before a name was entered");
        return conn.close().await.map_err(Into::into);
    };

    let end = run_session(conn, &name, input, interrupted()).await?;
    match end {
        SessionEnd::ServerClosed => println!("Server has closed the connection. Exiting..."),
        _ => println!("Closing the connection to the server..."),
    }

    Ok(())
}

/// 提示输入显示名，直到得到一个合法的名字
async fn prompt_name(input: &mut mpsc::Receiver<String>) -> Result<Option<String>> {
    loop {
        print!("Enter your name: ");
        std::io::stdout().flush()?;

        let Some(line) = input.recv().await else {
            return Ok(None);
        };
        match validate_name(&line) {
            Ok(()) => return Ok(Some(line)),
            Err(e) => eprintln!("{e}"),
        }
    }
}

/// 在独立线程中读取标准输入，逐行送入通道
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().split(b'\n') {
            let Ok(mut line) = line else { break };
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
