//! 日志写入线程
//!
//! 唯一持有 `LogDirectory` 的阻塞线程。所有追加请求经 mpsc 队列送达，
//! 逐个执行完整的 "选择当前文件 → 追加 → 轮转" 序列，因此整段临界区
//! 相对其他写入者是原子的。入队即获取，收到应答即释放。

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::directory::{AppendOutcome, LogDirectory};
use crate::error::LogError;

/// 写入队列容量
const QUEUE_CAPACITY: usize = 1024;

/// 一次追加请求
struct AppendRequest {
    line: String,
    ack: oneshot::Sender<Result<AppendOutcome, LogError>>,
}

/// 追加日志的句柄，可廉价克隆给每个 Worker
#[derive(Clone, Debug)]
pub struct LogSink {
    tx: mpsc::Sender<AppendRequest>,
}

impl LogSink {
    /// 追加一行并等待写入线程完成整段临界区
    pub async fn append(&self, line: impl Into<String>) -> Result<AppendOutcome, LogError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(AppendRequest {
                line: line.into(),
                ack,
            })
            .await
            .map_err(|_| LogError::WriterClosed)?;
        done.await.map_err(|_| LogError::WriterClosed)?
    }
}

/// 写入线程的所有者
///
/// 持有者负责在所有 Worker 退出后调用 [`LogWriter::release`]。
pub struct LogWriter {
    sink: LogSink,
    handle: JoinHandle<u64>,
}

impl LogWriter {
    /// 启动写入线程
    pub fn spawn(mut directory: LogDirectory) -> Self {
        let (tx, mut rx) = mpsc::channel::<AppendRequest>(QUEUE_CAPACITY);

        let handle = tokio::task::spawn_blocking(move || {
            let mut appended = 0u64;
            while let Some(request) = rx.blocking_recv() {
                let result = directory.append(&request.line);
                match &result {
                    Ok(outcome) => {
                        appended += 1;
                        if let Some(rotation) = &outcome.rotation {
                            info!(
                                from = %outcome.file.display(),
                                to = %rotation.created.display(),
                                evicted = ?rotation.evicted.as_ref().map(|p| p.display().to_string()),
                                "log file rotated"
                            );
                        }
                    }
                    Err(e) => error!("Log append failed: {}", e),
                }
                if request.ack.send(result).is_err() {
                    debug!("Log append caller went away before acknowledgement");
                }
            }
            info!(
                dir = %directory.path().display(),
                appended,
                "log writer stopped"
            );
            appended
        });

        Self {
            sink: LogSink { tx },
            handle,
        }
    }

    /// 获取一个新的追加句柄
    pub fn sink(&self) -> LogSink {
        self.sink.clone()
    }

    /// 释放写入线程，返回累计写入行数
    ///
    /// 只有在所有 `LogSink` 克隆都被丢弃后才会返回。
    pub async fn release(self) -> Result<u64, LogError> {
        drop(self.sink);
        self.handle.await.map_err(|e| {
            error!("Log writer thread failed: {}", e);
            LogError::WriterClosed
        })
    }
}
