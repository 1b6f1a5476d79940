// 配置管理模块

use crate::hosts::UploadTarget;
use crate::uploader::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 🔥 日志配置
    #[serde(default)]
    pub log: LogConfig,
    /// GitHub 索引仓库配置
    #[serde(default)]
    pub github: GithubConfig,
    /// 图床凭证
    #[serde(default)]
    pub hosts: HostsConfig,
    /// 上传策略
    #[serde(default)]
    pub strategy: StrategyConfig,
    /// 图片压缩配置
    #[serde(default)]
    pub compression: CompressionSettings,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// CORS允许的源
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18890,
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// GitHub 索引仓库配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GithubConfig {
    /// Personal Access Token
    #[serde(default)]
    pub pat: String,
    /// 仓库所有者
    #[serde(default)]
    pub owner: String,
    /// 仓库名
    #[serde(default)]
    pub repo: String,
    /// 索引文件路径
    #[serde(default = "default_index_filename")]
    pub filename: String,
}

fn default_index_filename() -> String {
    "manga-index.json".to_string()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            pat: String::new(),
            owner: String::new(),
            repo: String::new(),
            filename: default_index_filename(),
        }
    }
}

impl GithubConfig {
    /// token/owner/repo/filename 是否都已填写
    pub fn is_complete(&self) -> bool {
        ![&self.pat, &self.owner, &self.repo, &self.filename]
            .iter()
            .any(|v| v.trim().is_empty())
    }
}

/// Catbox 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatboxConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub userhash: String,
}

/// 图床凭证配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostsConfig {
    /// ImgBB API key
    #[serde(default)]
    pub imgbb: String,
    /// Imgur client id
    #[serde(default)]
    pub imgur: String,
    #[serde(default)]
    pub catbox: CatboxConfig,
}

impl HostsConfig {
    /// 获取图床凭证
    ///
    /// 只有启用（如适用）且凭证非空时返回 Some
    pub fn credential(&self, target: UploadTarget) -> Option<&str> {
        let value = match target {
            UploadTarget::Catbox => {
                if !self.catbox.enabled {
                    return None;
                }
                self.catbox.userhash.as_str()
            }
            UploadTarget::Imgbb => self.imgbb.as_str(),
            UploadTarget::Imgur => self.imgur.as_str(),
        };
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    /// 图床是否可用
    pub fn is_available(&self, target: UploadTarget) -> bool {
        self.credential(target).is_some()
    }
}

/// 上传模式
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// 全部文件上传到首选图床
    #[default]
    SingleHost,
    /// 按文件序号轮流分配到可用图床
    RoundRobin,
    /// 冗余上传（未实现，启动时拒绝）
    Redundant,
}

impl UploadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadMode::SingleHost => "single_host",
            UploadMode::RoundRobin => "round_robin",
            UploadMode::Redundant => "redundant",
        }
    }
}

/// 上传策略配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StrategyConfig {
    #[serde(default)]
    pub current: UploadMode,
    #[serde(default = "default_preferred_host")]
    pub preferred_host: UploadTarget,
    /// 备用图床（按顺序，取第一个可用的）
    #[serde(default = "default_fallback_hosts")]
    pub fallback_hosts: Vec<UploadTarget>,
}

fn default_preferred_host() -> UploadTarget {
    UploadTarget::Catbox
}

fn default_fallback_hosts() -> Vec<UploadTarget> {
    vec![UploadTarget::Imgbb, UploadTarget::Imgur]
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            current: UploadMode::default(),
            preferred_host: default_preferred_host(),
            fallback_hosts: default_fallback_hosts(),
        }
    }
}

/// 图片压缩配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompressionSettings {
    #[serde(default = "default_compression_enabled")]
    pub enabled: bool,
    /// 质量百分比 (0-100)
    #[serde(default = "default_compression_quality")]
    pub quality: u8,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
}

fn default_compression_enabled() -> bool {
    true
}

fn default_compression_quality() -> u8 {
    85
}

fn default_max_width() -> u32 {
    1920
}

fn default_max_height() -> u32 {
    1080
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: default_compression_enabled(),
            quality: default_compression_quality(),
            max_width: default_max_width(),
            max_height: default_max_height(),
        }
    }
}

impl CompressionSettings {
    /// 质量百分比转换为编码器使用的 0.0-1.0
    pub fn encoder_quality(&self) -> f32 {
        f32::from(self.quality.min(100)) / 100.0
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadConfig {
    /// 单文件最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 首次重试等待时间（毫秒）
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 退避倍数
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// 最大退避时间（毫秒）
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// 单文件最大大小（字节）
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// 单次最多文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// 请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 模拟浏览器来源（设置后校验图床返回的 Access-Control-Allow-Origin）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_origin: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_max_files() -> usize {
    100
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
            request_timeout_secs: default_request_timeout_secs(),
            browser_origin: None,
        }
    }
}

impl UploadConfig {
    /// 转换为重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// 配置校验结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log: LogConfig::default(),
            github: GithubConfig::default(),
            hosts: HostsConfig::default(),
            strategy: StrategyConfig::default(),
            compression: CompressionSettings::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {}", e);
                let default_config = Self::default();

                // 尝试保存默认配置
                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {}", e);
                }

                default_config
            }
        }
    }

    /// 按点分路径更新单个配置项，如 `hosts.catbox.userhash`
    ///
    /// 路径中任何一段不存在都视为无效路径，配置保持不变
    pub fn update_path(&mut self, path: &str, value: Value) -> Result<()> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| anyhow::anyhow!("无效的配置路径: {:?}", path))?;

        let mut root = serde_json::to_value(&*self).context("序列化配置失败")?;

        let mut current = &mut root;
        for segment in parents {
            current = current
                .as_object_mut()
                .and_then(|obj| obj.get_mut(*segment))
                .ok_or_else(|| anyhow::anyhow!("无效的配置路径: {}", path))?;
        }

        let parent = current
            .as_object_mut()
            .ok_or_else(|| anyhow::anyhow!("无效的配置路径: {}", path))?;
        if !parent.contains_key(*last) {
            anyhow::bail!("无效的配置路径: {}", path);
        }
        parent.insert((*last).to_string(), value);

        let updated: AppConfig =
            serde_json::from_value(root).with_context(|| format!("配置值类型不匹配: {}", path))?;
        *self = updated;

        tracing::debug!("配置项已更新: {}", path);
        Ok(())
    }

    /// 导出为格式化 JSON
    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("导出配置失败")
    }

    /// 从 JSON 导入（顶层字段覆盖默认配置）
    pub fn import_json(json: &str) -> Result<Self> {
        let imported: Value = serde_json::from_str(json).context("导入配置失败：JSON 格式错误")?;
        let imported = match imported {
            Value::Object(map) => map,
            _ => anyhow::bail!("导入配置失败：顶层必须是对象"),
        };

        let mut merged = serde_json::to_value(Self::default()).context("序列化默认配置失败")?;
        if let Value::Object(base) = &mut merged {
            for (key, value) in imported {
                base.insert(key, value);
            }
        }

        serde_json::from_value(merged).context("导入配置失败：字段类型不匹配")
    }

    /// 校验配置是否可以开始上传
    pub fn validate(&self) -> ConfigValidation {
        let mut errors = Vec::new();

        if self.github.pat.trim().is_empty() {
            errors.push("GitHub Personal Access Token 为必填项".to_string());
        }
        if self.github.owner.trim().is_empty() {
            errors.push("GitHub Owner 为必填项".to_string());
        }
        if self.github.repo.trim().is_empty() {
            errors.push("GitHub Repository 为必填项".to_string());
        }

        let has_any_host = self.hosts.catbox.enabled
            || !self.hosts.imgbb.trim().is_empty()
            || !self.hosts.imgur.trim().is_empty();
        if !has_any_host {
            errors.push("至少需要配置一个图床".to_string());
        }

        if self.hosts.catbox.enabled && self.hosts.catbox.userhash.trim().is_empty() {
            errors.push("启用 Catbox 时必须填写 userhash".to_string());
        }

        ConfigValidation {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
