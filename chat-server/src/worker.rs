//! 单个客户端连接的处理
//!
//! Worker 独占自己的连接，与 Dispatcher 和其他 Worker 之间只共享
//! `LogSink` 以及只读的 "drain now" 广播。

use protocol::{validate_name, ClientLine, Connection, ProtocolError};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chatlog::LogSink;
use crate::error::LogError;
use crate::events::LogEvent;

/// Worker 正常结束的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// 客户端发送了 quit
    Quit,
    /// 对端关闭了连接
    PeerClosed,
    /// 收到服务端的 drain 广播
    Drained,
}

/// Worker 异常结束的原因
#[derive(Error, Debug)]
pub enum WorkerError {
    /// 读写连接失败或输入不合法
    #[error("connection error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 日志写入失败，对当前 Worker 是致命的
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// 发送显示名之前连接已关闭
    #[error("connection closed before a name was received")]
    NameMissing,
}

pub type WorkerResult = Result<WorkerExit, WorkerError>;

/// 单个连接的处理器
pub struct Worker<R, W> {
    conn: Connection<R, W>,
    log: LogSink,
    drain_rx: watch::Receiver<bool>,
}

impl<R, W> Worker<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(conn: Connection<R, W>, log: LogSink, drain_rx: watch::Receiver<bool>) -> Self {
        Self {
            conn,
            log,
            drain_rx,
        }
    }

    /// 运行直到 quit、对端关闭、出错或收到 drain 广播
    pub async fn run(self) -> WorkerResult {
        let peer = self.conn.peer_addr();
        let result = self.serve().await;
        match &result {
            Ok(exit) => debug!(%peer, ?exit, "worker finished"),
            Err(e) => warn!(%peer, "worker failed: {}", e),
        }
        result
    }

    async fn serve(self) -> WorkerResult {
        let Self {
            mut conn,
            log,
            mut drain_rx,
        } = self;
        let addr = conn.peer_addr().ip();

        // 第一行是显示名
        let name = tokio::select! {
            biased;
            _ = drain_requested(&mut drain_rx) => {
                log_discarded(&conn);
                return Ok(WorkerExit::Drained);
            }
            line = conn.recv() => line?.ok_or(WorkerError::NameMissing)?,
        };
        validate_name(&name)?;
        let name = name.as_str();

        log.append(LogEvent::Connected { addr, name }.stamped())
            .await?;
        info!("Client {} ({}) connected", name, addr);

        loop {
            // drain 在每次等待读取时都会被检查，未读完的半行被丢弃
            let line = tokio::select! {
                biased;
                _ = drain_requested(&mut drain_rx) => {
                    log_discarded(&conn);
                    log.append(LogEvent::Drained { addr, name }.stamped()).await?;
                    info!("Shutdown signal received, closing connection for {}", name);
                    close(conn).await;
                    return Ok(WorkerExit::Drained);
                }
                line = conn.recv() => line?,
            };

            let Some(line) = line else {
                log.append(LogEvent::Disconnected { addr, name }.stamped())
                    .await?;
                info!("Client {} ({}) disconnected", name, addr);
                return Ok(WorkerExit::PeerClosed);
            };

            match ClientLine::parse(line) {
                ClientLine::Quit => {
                    log.append(LogEvent::Quit { addr, name }.stamped()).await?;
                    info!("Client {} ({}) sent quit", name, addr);
                    close(conn).await;
                    return Ok(WorkerExit::Quit);
                }
                ClientLine::Chat(text) => {
                    debug!("Client {} sent: {}", name, text);
                    log.append(
                        LogEvent::Message {
                            addr,
                            name,
                            text: &text,
                        }
                        .stamped(),
                    )
                    .await?;
                }
            }
        }
    }
}

/// drain 广播置位后返回；广播端被丢弃也视为 drain
async fn drain_requested(drain_rx: &mut watch::Receiver<bool>) {
    let _ = drain_rx.wait_for(|drain| *drain).await;
}

/// drain 打断读取时，半行数据被丢弃
fn log_discarded<R, W>(conn: &Connection<R, W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let discarded = conn.pending_bytes();
    if discarded > 0 {
        debug!(
            peer = %conn.peer_addr(),
            discarded,
            "Discarding partial line on shutdown"
        );
    }
}

async fn close<R, W>(conn: Connection<R, W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(e) = conn.close().await {
        debug!("Failed to close connection: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chatlog::{LogDirectory, LogPolicy, LogWriter};
    use std::fs;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    type TestWorker = Worker<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn peer() -> SocketAddr {
        "10.1.2.3:50000".parse().unwrap()
    }

    fn log_writer(tmp: &TempDir) -> LogWriter {
        let dir = LogDirectory::open(
            tmp.path(),
            LogPolicy {
                threshold: 1 << 20,
                retention: 4,
            },
        )
        .unwrap();
        LogWriter::spawn(dir)
    }

    /// 返回 (worker, 客户端一侧的流, drain 广播发送端)
    fn worker(writer: &LogWriter) -> (TestWorker, DuplexStream, watch::Sender<bool>) {
        let (client, server) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(server);
        let (drain_tx, drain_rx) = watch::channel(false);
        let conn = Connection::from_parts(read, write, peer());
        (Worker::new(conn, writer.sink(), drain_rx), client, drain_tx)
    }

    /// 去掉时间戳后的日志内容
    fn logged(tmp: &TempDir) -> Vec<String> {
        let dir = LogDirectory::open(
            tmp.path(),
            LogPolicy {
                threshold: u64::MAX,
                retention: usize::MAX,
            },
        )
        .unwrap();
        dir.scan()
            .unwrap()
            .iter()
            .flat_map(|f| {
                fs::read_to_string(&f.path)
                    .unwrap()
                    .lines()
                    .map(|l| l.get(22..).unwrap_or(l).to_string())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_quit_session() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, mut client, _drain_tx) = worker(&writer);

        client.write_all(b"Alice\nhello\nquit\n").await.unwrap();
        assert_eq!(worker.run().await.unwrap(), WorkerExit::Quit);

        // 服务端关闭了连接
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        writer.release().await.unwrap();
        assert_eq!(
            logged(&tmp),
            vec![
                "Client (IP: 10.1.2.3, name: Alice) is connected.",
                "Client (10.1.2.3) - Alice: hello",
                "Client (IP: 10.1.2.3, name: Alice) sent quit command.",
            ]
        );
    }

    #[tokio::test]
    async fn test_peer_close_ends_worker() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, mut client, _drain_tx) = worker(&writer);

        client.write_all(b"Bob\r\nfirst\r\n").await.unwrap();
        drop(client);

        assert_eq!(worker.run().await.unwrap(), WorkerExit::PeerClosed);
        writer.release().await.unwrap();
        assert_eq!(
            logged(&tmp),
            vec![
                "Client (IP: 10.1.2.3, name: Bob) is connected.",
                "Client (10.1.2.3) - Bob: first",
                "Client (IP: 10.1.2.3, name: Bob) disconnected.",
            ]
        );
    }

    #[tokio::test]
    async fn test_drain_between_reads() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, mut client, drain_tx) = worker(&writer);

        let handle = tokio::spawn(worker.run());
        client.write_all(b"Carol\nbefore drain\n").await.unwrap();

        // 等消息落盘后再广播
        loop {
            if logged(&tmp).len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        drain_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), WorkerExit::Drained);

        writer.release().await.unwrap();
        assert_eq!(
            logged(&tmp).last().map(String::as_str),
            Some("Client (IP: 10.1.2.3, name: Carol) closed by server shutdown.")
        );
    }

    #[tokio::test]
    async fn test_drain_discards_partial_line() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, mut client, drain_tx) = worker(&writer);

        let handle = tokio::spawn(worker.run());
        client.write_all(b"Frank\nhalf a li").await.unwrap();

        loop {
            if logged(&tmp).len() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        // 让 worker 把半行读进缓冲区
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drain_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), WorkerExit::Drained);

        writer.release().await.unwrap();
        assert_eq!(
            logged(&tmp),
            vec![
                "Client (IP: 10.1.2.3, name: Frank) is connected.",
                "Client (IP: 10.1.2.3, name: Frank) closed by server shutdown.",
            ]
        );
    }

    #[tokio::test]
    async fn test_drain_before_name() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, _client, drain_tx) = worker(&writer);

        drain_tx.send(true).unwrap();
        assert_eq!(worker.run().await.unwrap(), WorkerExit::Drained);

        writer.release().await.unwrap();
        assert!(logged(&tmp).is_empty());
    }

    #[tokio::test]
    async fn test_close_before_name() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, client, _drain_tx) = worker(&writer);

        drop(client);
        assert!(matches!(
            worker.run().await,
            Err(WorkerError::NameMissing)
        ));
        writer.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, mut client, _drain_tx) = worker(&writer);

        client.write_all(b"\nhello\n").await.unwrap();
        assert!(matches!(
            worker.run().await,
            Err(WorkerError::Protocol(ProtocolError::NameEmpty))
        ));
        writer.release().await.unwrap();
        assert!(logged(&tmp).is_empty());
    }

    #[tokio::test]
    async fn test_overlong_line_terminates_only_this_worker() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, mut client, _drain_tx) = worker(&writer);

        let handle = tokio::spawn(worker.run());
        client.write_all(b"Dave\n").await.unwrap();
        client
            .write_all(&vec![b'x'; protocol::MAX_LINE_LEN + 10])
            .await
            .unwrap();

        assert!(matches!(
            handle.await.unwrap(),
            Err(WorkerError::Protocol(ProtocolError::LineTooLong { .. }))
        ));
        writer.release().await.unwrap();
        assert_eq!(
            logged(&tmp),
            vec!["Client (IP: 10.1.2.3, name: Dave) is connected."]
        );
    }

    #[tokio::test]
    async fn test_log_failure_is_fatal_to_worker() {
        let tmp = TempDir::new().unwrap();
        let writer = log_writer(&tmp);
        let (worker, mut client, _drain_tx) = worker(&writer);

        fs::remove_dir_all(tmp.path()).unwrap();
        client.write_all(b"Eve\n").await.unwrap();
        assert!(matches!(worker.run().await, Err(WorkerError::Log(_))));
        writer.release().await.unwrap();
    }
}
