//! 优雅关闭
//!
//! 状态机: Running → Draining → Closed
//!
//! - 进入 Draining: 停止 Dispatcher 循环，向所有 Worker 广播 drain
//! - Draining → Closed: 回收全部 Worker，随后释放日志写入线程

use std::fmt;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};

use crate::chatlog::LogWriter;
use crate::error::LogError;
use crate::worker::{WorkerExit, WorkerResult};

/// 关闭状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Closed,
}

/// 触发关闭的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// Ctrl+C / SIGTERM 或调用方提供的终止信号
    Signal,
    /// 控制输入收到 quit
    ControlQuit,
    /// 控制输入结束
    ControlEof,
}

/// Worker 退出分类，仅用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// quit 或对端关闭
    Normal,
    /// 被 drain 广播或任务取消打断
    Interrupted,
    /// 出错或 panic
    Abnormal,
}

impl ExitKind {
    /// 对一个已结束的 Worker 任务分类
    pub fn classify(result: &Result<WorkerResult, JoinError>) -> Self {
        match result {
            Ok(Ok(WorkerExit::Quit | WorkerExit::PeerClosed)) => ExitKind::Normal,
            Ok(Ok(WorkerExit::Drained)) => ExitKind::Interrupted,
            Ok(Err(_)) => ExitKind::Abnormal,
            Err(e) if e.is_cancelled() => ExitKind::Interrupted,
            Err(_) => ExitKind::Abnormal,
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::Normal => f.write_str("exited normally"),
            ExitKind::Interrupted => f.write_str("was interrupted"),
            ExitKind::Abnormal => f.write_str("exited abnormally"),
        }
    }
}

/// 一轮回收的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapStats {
    pub normal: usize,
    pub interrupted: usize,
    pub abnormal: usize,
}

impl ReapStats {
    pub fn record(&mut self, kind: ExitKind) {
        match kind {
            ExitKind::Normal => self.normal += 1,
            ExitKind::Interrupted => self.interrupted += 1,
            ExitKind::Abnormal => self.abnormal += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.normal + self.interrupted + self.abnormal
    }
}

/// 关闭协调器
pub struct ShutdownCoordinator {
    state: ShutdownState,
    drain_tx: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (drain_tx, _) = watch::channel(false);
        Self {
            state: ShutdownState::Running,
            drain_tx,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.state
    }

    /// 新 Worker 订阅 drain 广播
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.drain_tx.subscribe()
    }

    /// Running 期间的单个回收，返回退出分类
    pub fn reap_one(
        &self,
        result: Result<WorkerResult, JoinError>,
        connections: &mut usize,
    ) -> ExitKind {
        let kind = ExitKind::classify(&result);
        *connections = connections.saturating_sub(1);
        if let Err(e) = &result {
            warn!("Worker task failed: {}", e);
        }
        info!(
            "Worker {}. Number of clients still connected: {}.",
            kind, connections
        );
        kind
    }

    /// Running → Draining: 向所有存活的 Worker 广播 drain
    pub fn begin_drain(&mut self, trigger: ShutdownTrigger) {
        if self.state != ShutdownState::Running {
            return;
        }
        info!(?trigger, "Received shutdown signal, initiating graceful shutdown...");
        self.state = ShutdownState::Draining;
        // 没有订阅者时也要更新值，之后订阅的 Worker 才能看到
        self.drain_tx.send_replace(true);
    }

    /// 回收全部 Worker，直到一个不剩
    pub async fn drain(
        &mut self,
        workers: &mut JoinSet<WorkerResult>,
        connections: &mut usize,
    ) -> ReapStats {
        debug_assert_eq!(self.state, ShutdownState::Draining);

        let mut stats = ReapStats::default();
        while let Some(result) = workers.join_next().await {
            let kind = ExitKind::classify(&result);
            if let Err(e) = &result {
                warn!("Worker task failed during shutdown: {}", e);
            }
            stats.record(kind);
            *connections = connections.saturating_sub(1);
        }

        info!(
            normal = stats.normal,
            interrupted = stats.interrupted,
            abnormal = stats.abnormal,
            "all workers drained"
        );
        stats
    }

    /// Draining → Closed: 释放日志写入线程
    pub async fn close(&mut self, log: LogWriter) -> Result<u64, LogError> {
        let appended = log.release().await?;
        self.state = ShutdownState::Closed;
        info!(appended, "Server shutdown complete");
        Ok(appended)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
