// ImgBB 图床
//
// 请求：POST {endpoint}?key=<api key>，multipart 字段 image
// 响应：{"success": true, "data": {"url": "..."}}
//       失败时 {"success": false, "error": {"message": "..."}}

use super::transport::{image_part, truncate_message, HttpTransport};
use super::{require_credential, ImageHost, UploadTarget};
use crate::config::HostsConfig;
use crate::error::UploadError;
use crate::uploader::ImageFile;
use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// ImgBB 上传接口
pub const IMGBB_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

#[derive(Debug, Deserialize)]
struct ImgbbResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ImgbbData>,
    #[serde(default)]
    error: Option<ImgbbError>,
}

#[derive(Debug, Deserialize)]
struct ImgbbData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImgbbError {
    #[serde(default)]
    message: Option<String>,
}

pub struct ImgbbHost {
    transport: HttpTransport,
    endpoint: String,
}

impl ImgbbHost {
    pub fn new(transport: HttpTransport) -> Self {
        Self::with_endpoint(transport, IMGBB_ENDPOINT)
    }

    pub fn with_endpoint(transport: HttpTransport, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }
}

fn rejected(message: String) -> UploadError {
    UploadError::HostRejected {
        host: UploadTarget::Imgbb.to_string(),
        message,
    }
}

/// 解析 imgbb 响应
fn parse_imgbb_response(status: reqwest::StatusCode, body: &str) -> Result<String, UploadError> {
    let parsed: ImgbbResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => {
            let message = if status.is_success() {
                format!("无法解析响应: {}", truncate_message(body))
            } else {
                format!("HTTP {}", status.as_u16())
            };
            return Err(rejected(message));
        }
    };

    if status.is_success() && parsed.success {
        if let Some(url) = parsed.data.and_then(|d| d.url).filter(|u| !u.is_empty()) {
            return Ok(url);
        }
        return Err(rejected("响应中缺少图片地址".to_string()));
    }

    let message = parsed
        .error
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    Err(rejected(message))
}

#[async_trait]
impl ImageHost for ImgbbHost {
    fn target(&self) -> UploadTarget {
        UploadTarget::Imgbb
    }

    async fn send(
        &self,
        file: &ImageFile,
        hosts: &HostsConfig,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        let key = require_credential(hosts, UploadTarget::Imgbb)?;

        let form = multipart::Form::new().part("image", image_part(file));

        debug!("上传到 imgbb: {} ({} bytes)", file.name, file.data.len());

        let request = self
            .transport
            .client()
            .post(&self.endpoint)
            .query(&[("key", key.as_str())])
            .multipart(form);
        let response = self
            .transport
            .execute(UploadTarget::Imgbb, request, cancel)
            .await?;

        let url = parse_imgbb_response(response.status, &response.body)?;
        info!("imgbb 上传成功: {} -> {}", file.name, url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::transport::build_http_client;
    use crate::hosts::transport::test_support::spawn_mock;
    use axum::body::Bytes;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn imgbb_hosts(key: &str) -> HostsConfig {
        HostsConfig {
            imgbb: key.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_success_and_failure() {
        let ok = r#"{"success":true,"data":{"url":"https://i.ibb.co/a/b.jpg"}}"#;
        assert_eq!(
            parse_imgbb_response(reqwest::StatusCode::OK, ok).unwrap(),
            "https://i.ibb.co/a/b.jpg"
        );

        let bad = r#"{"success":false,"status_code":400,"error":{"message":"Invalid API v1 key.","code":100}}"#;
        let err = parse_imgbb_response(reqwest::StatusCode::BAD_REQUEST, bad).unwrap_err();
        assert_eq!(err.to_string(), "imgbb 上传失败: Invalid API v1 key.");

        let err = parse_imgbb_response(reqwest::StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert_eq!(err.to_string(), "imgbb 上传失败: HTTP 502");
    }

    #[tokio::test]
    async fn test_send_passes_key_in_query() {
        let router = Router::new().route(
            "/1/upload",
            post(
                |Query(params): Query<HashMap<String, String>>, body: Bytes| async move {
                    let text = String::from_utf8_lossy(&body).to_string();
                    if params.get("key").map(String::as_str) == Some("api-key")
                        && text.contains("name=\"image\"")
                    {
                        (
                            StatusCode::OK,
                            Json(json!({"success": true, "data": {"url": "https://i.ibb.co/x.png"}})),
                        )
                    } else {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"success": false, "error": {"message": "bad request"}})),
                        )
                    }
                },
            ),
        );
        let base = spawn_mock(router).await;

        let transport = HttpTransport::new(build_http_client(5).unwrap());
        let host = ImgbbHost::with_endpoint(transport, format!("{}/1/upload", base));
        let file = ImageFile::new("cover.png", "image/png", vec![1, 2, 3]);
        let url = host
            .send(&file, &imgbb_hosts("api-key"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(url, "https://i.ibb.co/x.png");
    }

    #[tokio::test]
    async fn test_send_without_key_is_not_configured() {
        let transport = HttpTransport::new(build_http_client(5).unwrap());
        let host = ImgbbHost::with_endpoint(transport, "http://127.0.0.1:9/1/upload");
        let file = ImageFile::new("cover.png", "image/png", vec![1]);

        let err = host
            .send(&file, &imgbb_hosts(""), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UploadError::NotConfigured(UploadTarget::Imgbb.not_configured_message())
        );
    }
}
