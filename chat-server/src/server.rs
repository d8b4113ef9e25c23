//! 聊天服务器核心实现
//!
//! 单一的 Dispatcher 循环同时等待三类事件: 新连接、控制输入、终止信号。
//! 每个连接交给一个独立的 Worker 任务，连接计数只在本循环内修改。

use std::future::Future;
use std::io::BufRead;
use std::net::SocketAddr;

use protocol::{Connection, TcpListener, TransportListener, QUIT_COMMAND};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::chatlog::{LogDirectory, LogWriter};
use crate::config::ServerConfig;
use crate::events::LogEvent;
use crate::shutdown::{ReapStats, ShutdownCoordinator, ShutdownTrigger};
use crate::worker::{Worker, WorkerResult};

/// 一次运行结束后的汇总
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeReport {
    /// 触发关闭的来源
    pub trigger: ShutdownTrigger,
    /// 运行期间接受的连接总数
    pub accepted: usize,
    /// Running 期间提前回收的 Worker
    pub reaped_while_running: ReapStats,
    /// Draining 期间回收的 Worker
    pub drained: ReapStats,
    /// 关闭完成后的连接计数
    pub connections: usize,
    /// 日志写入线程累计写入的行数
    pub log_lines: u64,
}

/// 聊天服务器
pub struct ChatServer {
    listener: TcpListener,
    log: LogWriter,
    coordinator: ShutdownCoordinator,
}

impl ChatServer {
    /// 绑定监听地址并打开日志目录
    ///
    /// 任何一步失败都在创建 Worker 之前返回。
    pub async fn bind(config: &ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr()).await?;
        let directory = LogDirectory::open(&config.directory, config.log_policy())?;
        debug!(dir = %config.directory.display(), policy = ?config.log_policy(), "log directory opened");

        Ok(Self {
            listener,
            log: LogWriter::spawn(directory),
            coordinator: ShutdownCoordinator::new(),
        })
    }

    /// 获取本地绑定地址
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 以标准输入为控制通道、以 Ctrl+C / SIGTERM 为终止信号运行
    pub async fn run(self) -> anyhow::Result<ServeReport> {
        let report = self.serve(stdin_control(), shutdown_signal()).await?;
        println!("Server is closed.");
        Ok(report)
    }

    /// 运行 Dispatcher 循环直到关闭完成
    ///
    /// `control` 中的每一项是控制输入的一行，通道关闭等同于输入结束。
    pub async fn serve<F>(
        self,
        mut control: mpsc::Receiver<String>,
        terminate: F,
    ) -> anyhow::Result<ServeReport>
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            log,
            mut coordinator,
        } = self;
        let sink = log.sink();

        sink.append(LogEvent::ServerStartUp.stamped()).await?;

        let mut workers: JoinSet<WorkerResult> = JoinSet::new();
        let mut connections = 0usize;
        let mut accepted = 0usize;
        let mut reaped_while_running = ReapStats::default();

        tokio::pin!(terminate);

        let trigger = loop {
            tokio::select! {
                // 接受新连接
                result = listener.accept() => {
                    match result {
                        Ok(transport) => {
                            let conn = Connection::new(transport);
                            let peer = conn.peer_addr();
                            let worker = Worker::new(conn, sink.clone(), coordinator.subscribe());
                            workers.spawn(worker.run());
                            connections += 1;
                            accepted += 1;
                            info!(%peer, connections, "Accepted connection");
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                // 控制输入
                line = control.recv() => {
                    match line {
                        Some(line) if line.trim_end() == QUIT_COMMAND => {
                            break ShutdownTrigger::ControlQuit;
                        }
                        Some(line) => debug!("Ignoring control input {:?}", line),
                        None => break ShutdownTrigger::ControlEof,
                    }
                }

                // 终止信号
                _ = &mut terminate => {
                    break ShutdownTrigger::Signal;
                }

                // 提前回收已经结束的 Worker，仅在 Running 期间
                Some(result) = workers.join_next(), if !workers.is_empty() => {
                    let kind = coordinator.reap_one(result, &mut connections);
                    reaped_while_running.record(kind);
                }
            }
        };

        coordinator.begin_drain(trigger);
        let drained = coordinator.drain(&mut workers, &mut connections).await;

        // 关闭监听 socket
        drop(listener);

        let shutdown_result = sink.append(LogEvent::ServerShutDown.stamped()).await;
        drop(sink);
        let log_lines = coordinator.close(log).await?;
        debug!(state = ?coordinator.state(), "dispatcher finished");
        shutdown_result?;

        Ok(ServeReport {
            trigger,
            accepted,
            reaped_while_running,
            drained,
            connections,
            log_lines,
        })
    }
}

/// 在独立线程中逐行读取标准输入
///
/// 该线程会一直阻塞在读取上，进程退出时随之结束。
fn stdin_control() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        forward_control(stdin.lock(), &tx);
    });
    rx
}

/// 把控制输入逐行送入通道，直到输入结束或接收端关闭
///
/// 按字节切分行，非 UTF-8 内容被有损转换后照常转发，只有真正的
/// 输入结束或读取错误才会关闭通道。
fn forward_control<R: BufRead>(input: R, tx: &mpsc::Sender<String>) {
    for line in input.split(b'\n') {
        let mut line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Failed to read control input: {}", e);
                break;
            }
        };
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let line = String::from_utf8_lossy(&line).into_owned();
        if tx.blocking_send(line).is_err() {
            break;
        }
    }
}

/// Ctrl+C、SIGTERM 或 SIGUSR1
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = unix_signal(tokio::signal::unix::SignalKind::terminate(), "SIGTERM");
    #[cfg(unix)]
    let user1 = unix_signal(tokio::signal::unix::SignalKind::user_defined1(), "SIGUSR1");

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    #[cfg(not(unix))]
    let user1 = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received"),
        _ = terminate => info!("SIGTERM received"),
        _ = user1 => info!("SIGUSR1 received, draining active connections"),
    }
}

/// 等待一次指定的 unix 信号，注册失败时永远挂起
#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind, name: &'static str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut signal) => {
            signal.recv().await;
        }
        Err(e) => {
            error!("Failed to listen for {}: {}", name, e);
            std::future::pending::<()>().await;
        }
    }
}
