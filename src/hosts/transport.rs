// 图床共享的 HTTP 传输层
//
// 所有图床共用一个 reqwest::Client，取消令牌在这里统一处理：
// 请求进行中被取消时立即放弃，返回 Cancelled

use crate::error::UploadError;
use crate::hosts::UploadTarget;
use crate::uploader::ImageFile;
use anyhow::{Context, Result};
use reqwest::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN};
use reqwest::multipart;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 默认请求超时（秒）
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const USER_AGENT: &str = concat!("manga-uploader/", env!("CARGO_PKG_VERSION"));

/// 创建图床上传使用的 HTTP 客户端
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    let timeout = if timeout_secs == 0 {
        DEFAULT_REQUEST_TIMEOUT_SECS
    } else {
        timeout_secs
    };

    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("Failed to create HTTP client")
}

/// 图床响应（状态码 + 原始文本）
#[derive(Debug, Clone)]
pub struct HostResponse {
    pub status: StatusCode,
    pub body: String,
}

/// 共享传输层
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    /// 模拟浏览器来源
    ///
    /// 设置后每个请求都会带上 Origin 头，并且要求响应的
    /// Access-Control-Allow-Origin 允许该来源，否则视为跨域拒绝
    browser_origin: Option<String>,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            browser_origin: None,
        }
    }

    pub fn with_browser_origin(mut self, origin: Option<String>) -> Self {
        self.browser_origin = origin.filter(|o| !o.trim().is_empty());
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// 发送请求并读取响应文本
    ///
    /// 请求与读取响应体两个阶段都可以被取消
    pub async fn execute(
        &self,
        target: UploadTarget,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<HostResponse, UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let request = match &self.browser_origin {
            Some(origin) => request.header(ORIGIN, origin.as_str()),
            None => request,
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("{} 上传请求已取消", target);
                return Err(UploadError::Cancelled);
            }
            result = request.send() => result.map_err(map_reqwest_error)?,
        };

        let status = response.status();

        if let Some(origin) = &self.browser_origin {
            let allowed = response
                .headers()
                .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim() == "*" || v.trim() == origin.as_str())
                .unwrap_or(false);
            if !allowed {
                warn!("{} 未允许来源 {} 的跨域请求", target, origin);
                return Err(UploadError::CrossOriginBlocked {
                    host: target.to_string(),
                });
            }
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = response.text() => result.map_err(map_reqwest_error)?,
        };

        debug!("{} 响应: status={}, body_len={}", target, status, body.len());

        Ok(HostResponse { status, body })
    }
}

/// reqwest 错误统一转换为传输失败
pub(crate) fn map_reqwest_error(e: reqwest::Error) -> UploadError {
    if e.is_timeout() {
        UploadError::TransportFailure("请求超时".to_string())
    } else if e.is_connect() {
        UploadError::TransportFailure(format!("连接失败: {}", e))
    } else {
        UploadError::TransportFailure(e.to_string())
    }
}

/// 构建图片 multipart 字段
///
/// MIME 无法解析时退回 application/octet-stream
pub(crate) fn image_part(file: &ImageFile) -> multipart::Part {
    let part = multipart::Part::bytes(file.data.clone()).file_name(file.name.clone());
    match part.mime_str(&file.mime) {
        Ok(part) => part,
        Err(_) => multipart::Part::bytes(file.data.clone())
            .file_name(file.name.clone())
            .mime_str("application/octet-stream")
            .unwrap_or_else(|_| multipart::Part::bytes(file.data.clone())),
    }
}

/// 截断过长的错误文本
pub(crate) fn truncate_message(text: &str) -> String {
    const MAX_CHARS: usize = 200;
    let text = text.trim();
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(MAX_CHARS).collect();
        truncated.push('…');
        truncated
    }
}
