//! 日志系统配置
//!
//! 控制台输出 + 可选的文件持久化。日志文件按启动时间命名、按大小滚动，
//! 启动时清理超过保留天数的旧文件

use crate::config::LogConfig;
use chrono::Local;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "manga-uploader.";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 滚动文件状态
struct RollingFile {
    /// 启动时间戳（YYYY-MM-DD-HHMMSS）
    start_timestamp: String,
    log_dir: PathBuf,
    file: Option<File>,
    /// 0 为基础文件，之后每次滚动加一
    index: u32,
    max_file_size: u64,
    written: u64,
}

impl RollingFile {
    fn open(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        let mut rolling = Self {
            start_timestamp: Local::now().format("%Y-%m-%d-%H%M%S").to_string(),
            log_dir,
            file: None,
            index: 0,
            max_file_size,
            written: 0,
        };
        rolling.open_current()?;
        Ok(rolling)
    }

    fn path_for(&self, index: u32) -> PathBuf {
        let filename = if index == 0 {
            format!("{}{}.log", LOG_FILE_PREFIX, self.start_timestamp)
        } else {
            format!("{}{}_{}.log", LOG_FILE_PREFIX, self.start_timestamp, index)
        };
        self.log_dir.join(filename)
    }

    fn open_current(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(self.index))?;
        self.file = Some(file);
        self.written = 0;
        Ok(())
    }

    fn write_data(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 当前文件非空且写入后超限时滚动，单条超大日志也能写进去
        if self.written > 0 && self.written + buf.len() as u64 > self.max_file_size {
            if let Some(mut file) = self.file.take() {
                file.flush()?;
            }
            self.index += 1;
            self.open_current()?;
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "日志文件未打开"))?;
        let written = file.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// 按大小滚动的日志文件写入器
///
/// 文件名: manga-uploader.YYYY-MM-DD-HHMMSS.log, 滚动后追加 _N
#[derive(Clone)]
pub struct LogFileManager {
    inner: Arc<Mutex<RollingFile>>,
}

impl LogFileManager {
    pub fn new(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingFile::open(log_dir, max_file_size)?)),
        })
    }

    /// 当前正在写入的文件
    pub fn current_path(&self) -> PathBuf {
        let inner = self.inner.lock();
        inner.path_for(inner.index)
    }
}

impl Write for LogFileManager {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write_data(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// 日志系统守卫
/// 必须保持存活，否则日志写入线程会终止
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 打开文件写入器，失败时返回 None（回退到仅控制台输出）
fn open_file_writer(config: &LogConfig) -> Option<LogFileManager> {
    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        eprintln!("创建日志目录失败: {:?}, 错误: {}", config.log_dir, e);
        return None;
    }
    match LogFileManager::new(config.log_dir.clone(), config.max_file_size) {
        Ok(manager) => Some(manager),
        Err(e) => {
            eprintln!("创建日志文件失败: {}, 回退到仅控制台输出", e);
            None
        }
    }
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先于配置中的日志级别。返回的守卫需要保持存活直到程序结束
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_ansi(true);

    let file_writer = if config.enabled {
        open_file_writer(config)
    } else {
        None
    };

    let (file_layer, file_guard) = match file_writer {
        Some(writer) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(writer);
            let layer = fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let file_enabled = file_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if file_enabled {
        info!(
            "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}, 单文件最大={:.1}MB",
            config.log_dir,
            config.retention_days,
            config.level,
            config.max_file_size as f64 / 1024.0 / 1024.0
        );
        cleanup_old_logs(&config.log_dir, config.retention_days);
    } else {
        info!("日志系统初始化完成（仅控制台输出）");
    }

    LogGuard {
        _file_guard: file_guard,
    }
}

/// 清理过期日志文件，返回删除的文件数
///
/// 日期优先从文件名解析，解析不出来时看修改时间
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> usize {
    let today = Local::now().date_naive();
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let mut deleted = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !filename.starts_with(LOG_FILE_PREFIX) || !filename.ends_with(".log") {
            continue;
        }

        let expired = match log_file_date(filename) {
            Some(date) => today.signed_duration_since(date) > retention,
            None => expired_by_modified_time(&entry, retention),
        };
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                deleted += 1;
                tracing::debug!("已删除过期日志文件: {:?}", path);
            }
            Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
        }
    }

    if deleted > 0 {
        info!("已清理 {} 个过期日志文件", deleted);
    }
    deleted
}

/// 从日志文件名解析日期
///
/// `manga-uploader.2024-01-02-153000_3.log` -> 2024-01-02
fn log_file_date(filename: &str) -> Option<chrono::NaiveDate> {
    let name = filename
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(".log")?;
    let date = name.get(..10)?;
    chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

fn expired_by_modified_time(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    entry
        .metadata()
        .and_then(|m| m.modified())
        .map(|modified| {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            chrono::Utc::now().signed_duration_since(modified) > retention
        })
        .unwrap_or(false)
}
