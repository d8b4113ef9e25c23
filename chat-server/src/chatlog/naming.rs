//! 时间戳格式与日志文件命名
//!
//! 文件名格式: `server_log_<YYYY>-<MM>-<DD>|<HH>:<MM>:<SS>[-<seq>].txt`
//!
//! 同一秒内创建的多个文件用 `-<seq>` 后缀区分，排序按 (时间戳, seq)。

use std::fmt;

use chrono::{Local, NaiveDateTime, SubsecRound};

/// 日志文件名前缀
pub const FILE_PREFIX: &str = "server_log_";

/// 日志文件扩展名
pub const FILE_SUFFIX: &str = ".txt";

/// 文件名中的时间格式
const FILE_TIME_FORMAT: &str = "%Y-%m-%d|%H:%M:%S";

/// 日志行中的时间格式
const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `FILE_TIME_FORMAT` 渲染后的固定长度
const FILE_TIME_LEN: usize = 19;

/// 当前本地时间，截断到秒
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// 日志行使用的时间戳，例如 `2024-03-01 12:00:00`
pub fn event_timestamp(at: NaiveDateTime) -> String {
    at.format(EVENT_TIME_FORMAT).to_string()
}

/// 解析后的日志文件名
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogFileName {
    /// 文件创建时间（秒精度）
    pub created: NaiveDateTime,
    /// 同一秒内的序号，0 表示没有后缀
    pub seq: u32,
}

impl LogFileName {
    pub fn new(created: NaiveDateTime) -> Self {
        Self {
            created: created.trunc_subsecs(0),
            seq: 0,
        }
    }

    /// 同一时间戳的下一个序号
    pub fn next_seq(self) -> Self {
        Self {
            created: self.created,
            seq: self.seq + 1,
        }
    }

    /// 从文件名解析，不符合格式返回 `None`
    pub fn parse(file_name: &str) -> Option<Self> {
        let rest = file_name.strip_prefix(FILE_PREFIX)?;
        let rest = rest.strip_suffix(FILE_SUFFIX)?;
        if rest.len() < FILE_TIME_LEN || !rest.is_char_boundary(FILE_TIME_LEN) {
            return None;
        }

        let (time, tail) = rest.split_at(FILE_TIME_LEN);
        let created = NaiveDateTime::parse_from_str(time, FILE_TIME_FORMAT).ok()?;
        let seq = match tail {
            "" => 0,
            tail => {
                let digits = tail.strip_prefix('-')?;
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                digits.parse().ok()?
            }
        };

        Some(Self { created, seq })
    }
}

impl fmt::Display for LogFileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", FILE_PREFIX, self.created.format(FILE_TIME_FORMAT))?;
        if self.seq > 0 {
            write!(f, "-{}", self.seq)?;
        }
        f.write_str(FILE_SUFFIX)
    }
}
