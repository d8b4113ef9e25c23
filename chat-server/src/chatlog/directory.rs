//! 日志目录: 选择当前文件、追加、按大小轮转、按数量淘汰
//!
//! 当前文件不做缓存，每次追加都重新扫描目录，取时间戳最新的文件。
//! `LogDirectory` 本身不加锁，调用方（写入线程）负责串行化。

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use tracing::debug;

use super::naming::{self, LogFileName};
use crate::error::LogError;

/// 轮转与保留策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPolicy {
    /// 文件超过该大小（字节）后轮转
    pub threshold: u64,
    /// 最多保留的日志文件数
    pub retention: usize,
}

/// 目录中的一个日志文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub name: LogFileName,
    pub path: PathBuf,
    pub size: u64,
}

/// 一次轮转的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    /// 新建的文件
    pub created: PathBuf,
    /// 为满足保留上限而删除的最旧文件
    pub evicted: Option<PathBuf>,
}

/// 一次追加的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// 写入的文件
    pub file: PathBuf,
    /// 写入后触发的轮转
    pub rotation: Option<Rotation>,
}

/// 日志目录
#[derive(Debug)]
pub struct LogDirectory {
    dir: PathBuf,
    policy: LogPolicy,
}

impl LogDirectory {
    /// 打开日志目录，不存在时创建
    pub fn open(dir: impl Into<PathBuf>, policy: LogPolicy) -> Result<Self, LogError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| LogError::io(&dir, e))?;
        Ok(Self { dir, policy })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// 扫描目录中的日志文件，按 (时间戳, seq) 从旧到新排序
    pub fn scan(&self) -> Result<Vec<LogFile>, LogError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| LogError::io(&self.dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LogError::io(&self.dir, e))?;
            let Some(name) = entry.file_name().to_str().and_then(LogFileName::parse) else {
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                // 扫描期间被外部删除
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(LogError::io(entry.path(), e)),
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(LogFile {
                name,
                path: entry.path(),
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// 时间戳最新的日志文件
    pub fn current(&self) -> Result<Option<LogFile>, LogError> {
        Ok(self.scan()?.pop())
    }

    /// 追加一行到当前文件，必要时轮转
    pub fn append(&mut self, message: &str) -> Result<AppendOutcome, LogError> {
        self.append_at(message, naming::now())
    }

    pub(crate) fn append_at(
        &mut self,
        message: &str,
        now: NaiveDateTime,
    ) -> Result<AppendOutcome, LogError> {
        let current = match self.current()? {
            Some(file) => file,
            None => self.create_file(now, &[])?,
        };

        {
            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&current.path)
                .map_err(|e| LogError::io(&current.path, e))?;
            file.write_all(message.as_bytes())
                .map_err(|e| LogError::io(&current.path, e))?;
            if !message.ends_with('\n') {
                file.write_all(b"\n")
                    .map_err(|e| LogError::io(&current.path, e))?;
            }
        }

        // 重新扫描以拿到写入后的大小
        let written = match self.current()? {
            Some(file) => file,
            None => {
                return Ok(AppendOutcome {
                    file: current.path,
                    rotation: None,
                })
            }
        };
        debug!(file = %written.path.display(), size = written.size, "appended log line");

        let rotation = if written.size > self.policy.threshold {
            Some(self.rotate(now)?)
        } else {
            None
        };

        Ok(AppendOutcome {
            file: current.path,
            rotation,
        })
    }

    /// 轮转: 达到保留上限时先删除最旧文件，再创建新文件
    fn rotate(&mut self, now: NaiveDateTime) -> Result<Rotation, LogError> {
        let mut files = self.scan()?;

        let evicted = if files.len() >= self.policy.retention && !files.is_empty() {
            let oldest = files.remove(0);
            match fs::remove_file(&oldest.path) {
                Ok(()) => Some(oldest.path),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(LogError::io(&oldest.path, e)),
            }
        } else {
            None
        };

        let created = self.create_file(now, &files)?;

        Ok(Rotation {
            created: created.path,
            evicted,
        })
    }

    /// 创建一个空的新日志文件，保证它比 `existing` 中的任何文件都新
    fn create_file(&self, now: NaiveDateTime, existing: &[LogFile]) -> Result<LogFile, LogError> {
        let mut name = LogFileName::new(now);
        if let Some(latest) = existing.last() {
            if latest.name >= name {
                name = latest.name.next_seq();
            }
        }

        loop {
            let path = self.dir.join(name.to_string());
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    debug!(file = %path.display(), "created log file");
                    return Ok(LogFile { name, path, size: 0 });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => name = name.next_seq(),
                Err(e) => return Err(LogError::io(&path, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn policy(threshold: u64, retention: usize) -> LogPolicy {
        LogPolicy {
            threshold,
            retention,
        }
    }

    /// 在目录中放一个指定时间戳和内容的日志文件
    fn seed(dir: &TempDir, created: NaiveDateTime, contents: &str) -> PathBuf {
        let path = dir.path().join(LogFileName::new(created).to_string());
        fs::write(&path, contents).unwrap();
        path
    }

    fn file_names(log: &LogDirectory) -> Vec<String> {
        log.scan()
            .unwrap()
            .into_iter()
            .map(|f| f.name.to_string())
            .collect()
    }

    #[test]
    fn test_open_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("logs");
        let log = LogDirectory::open(&dir, policy(100, 4)).unwrap();
        assert!(dir.is_dir());
        assert!(log.scan().unwrap().is_empty());
    }

    #[test]
    fn test_first_append_creates_file() {
        let tmp = TempDir::new().unwrap();
        let mut log = LogDirectory::open(tmp.path(), policy(1024, 4)).unwrap();

        let outcome = log.append_at("[t] hello", at(10, 0, 0)).unwrap();
        assert!(outcome.rotation.is_none());
        assert_eq!(
            outcome.file,
            tmp.path().join("server_log_2024-03-01|10:00:00.txt")
        );
        assert_eq!(fs::read_to_string(&outcome.file).unwrap(), "[t] hello\n");
    }

    #[test]
    fn test_scan_ignores_foreign_entries() {
        let tmp = TempDir::new().unwrap();
        seed(&tmp, at(8, 0, 0), "a\n");
        fs::write(tmp.path().join("README.md"), "x").unwrap();
        fs::create_dir(tmp.path().join("server_log_2024-03-01|09:00:00.txt")).unwrap();

        let log = LogDirectory::open(tmp.path(), policy(1024, 4)).unwrap();
        assert_eq!(file_names(&log), vec!["server_log_2024-03-01|08:00:00.txt"]);
    }

    #[test]
    fn test_append_targets_latest_timestamp() {
        let tmp = TempDir::new().unwrap();
        let old = seed(&tmp, at(8, 0, 0), "");
        let newest = seed(&tmp, at(9, 30, 0), "");
        let middle = seed(&tmp, at(9, 0, 0), "");

        let mut log = LogDirectory::open(tmp.path(), policy(1024, 4)).unwrap();
        let outcome = log.append_at("line", at(12, 0, 0)).unwrap();

        assert_eq!(outcome.file, newest);
        assert_eq!(fs::read_to_string(&newest).unwrap(), "line\n");
        assert_eq!(fs::read_to_string(&old).unwrap(), "");
        assert_eq!(fs::read_to_string(&middle).unwrap(), "");
    }

    #[test]
    fn test_reopen_resumes_existing_file() {
        let tmp = TempDir::new().unwrap();
        let existing = seed(&tmp, at(8, 0, 0), "[t] before restart\n");

        let mut log = LogDirectory::open(tmp.path(), policy(1024, 4)).unwrap();
        log.append_at("[t] after restart", at(9, 0, 0)).unwrap();

        assert_eq!(log.scan().unwrap().len(), 1);
        assert_eq!(
            fs::read_to_string(&existing).unwrap(),
            "[t] before restart\n[t] after restart\n"
        );
    }

    #[test]
    fn test_file_at_threshold_does_not_rotate() {
        let tmp = TempDir::new().unwrap();
        let mut log = LogDirectory::open(tmp.path(), policy(10, 4)).unwrap();

        // 9 字节 + 换行 = 正好 10 字节
        let outcome = log.append_at("123456789", at(10, 0, 0)).unwrap();
        assert!(outcome.rotation.is_none());
        assert_eq!(log.scan().unwrap().len(), 1);
        assert_eq!(log.current().unwrap().unwrap().size, 10);
    }

    #[test]
    fn test_file_one_byte_over_threshold_rotates() {
        let tmp = TempDir::new().unwrap();
        let first = seed(&tmp, at(9, 0, 0), "123456789\n");
        let mut log = LogDirectory::open(tmp.path(), policy(10, 4)).unwrap();

        // 现有文件正好在阈值上，下一次追加后超出
        let outcome = log.append_at("x", at(10, 0, 0)).unwrap();
        assert_eq!(outcome.file, first);
        let rotation = outcome.rotation.unwrap();
        assert!(rotation.evicted.is_none());
        assert_eq!(
            rotation.created,
            tmp.path().join("server_log_2024-03-01|10:00:00.txt")
        );

        // 下一行写入新文件
        let outcome = log.append_at("next", at(10, 0, 1)).unwrap();
        assert_eq!(outcome.file, rotation.created);
        assert_eq!(fs::read_to_string(&rotation.created).unwrap(), "next\n");
        assert_eq!(fs::read_to_string(&first).unwrap(), "123456789\nx\n");
    }

    #[test]
    fn test_rotation_at_retention_evicts_oldest() {
        let tmp = TempDir::new().unwrap();
        let oldest = seed(&tmp, at(7, 0, 0), "old\n");
        seed(&tmp, at(8, 0, 0), "a\n");
        seed(&tmp, at(8, 30, 0), "b\n");
        let latest = seed(&tmp, at(9, 0, 0), "c\n");

        let mut log = LogDirectory::open(tmp.path(), policy(4, 4)).unwrap();
        let outcome = log.append_at("overflow", at(10, 0, 0)).unwrap();

        assert_eq!(outcome.file, latest);
        let rotation = outcome.rotation.unwrap();
        assert_eq!(rotation.evicted.as_deref(), Some(oldest.as_path()));
        assert!(!oldest.exists());
        assert!(rotation.created.exists());
        assert_eq!(log.scan().unwrap().len(), 4);
        // 新文件排在最后，成为当前文件
        assert_eq!(log.current().unwrap().unwrap().path, rotation.created);
    }

    #[test]
    fn test_retention_never_exceeded() {
        let tmp = TempDir::new().unwrap();
        let mut log = LogDirectory::open(tmp.path(), policy(8, 3)).unwrap();

        for i in 0..50u32 {
            let now = at(10, 0, 0) + chrono::Duration::seconds(i64::from(i / 7));
            let outcome = log.append_at(&format!("line {i:02}"), now).unwrap();
            if outcome.rotation.is_some() {
                assert!(log.scan().unwrap().len() <= 3);
            }
        }
        assert_eq!(log.scan().unwrap().len(), 3);
    }

    #[test]
    fn test_same_second_rotation_gets_suffix() {
        let tmp = TempDir::new().unwrap();
        let mut log = LogDirectory::open(tmp.path(), policy(1, 10)).unwrap();

        let now = at(10, 0, 0);
        log.append_at("a", now).unwrap();
        log.append_at("b", now).unwrap();

        assert_eq!(
            file_names(&log),
            vec![
                "server_log_2024-03-01|10:00:00.txt",
                "server_log_2024-03-01|10:00:00-1.txt",
                "server_log_2024-03-01|10:00:00-2.txt",
            ]
        );
        let contents: Vec<String> = log
            .scan()
            .unwrap()
            .iter()
            .map(|f| fs::read_to_string(&f.path).unwrap())
            .collect();
        assert_eq!(contents, vec!["a\n", "b\n", ""]);
    }

    #[test]
    fn test_new_file_is_newer_than_future_dated_file() {
        let tmp = TempDir::new().unwrap();
        let future = seed(&tmp, at(23, 0, 0), "0123456789\n");
        let mut log = LogDirectory::open(tmp.path(), policy(5, 4)).unwrap();

        let outcome = log.append_at("x", at(10, 0, 0)).unwrap();
        assert_eq!(outcome.file, future);
        let created = outcome.rotation.unwrap().created;
        assert_eq!(
            created,
            tmp.path().join("server_log_2024-03-01|23:00:00-1.txt")
        );
        assert_eq!(log.current().unwrap().unwrap().path, created);
    }
}
