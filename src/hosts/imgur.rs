// Imgur 图床
//
// 请求：Authorization: Client-ID <id>，multipart 字段 image
// 响应：{"success": true, "data": {"link": "..."}}
//       失败时 {"success": false, "data": {"error": "..."}}

use super::transport::{image_part, truncate_message, HttpTransport};
use super::{require_credential, ImageHost, UploadTarget};
use crate::config::HostsConfig;
use crate::error::UploadError;
use crate::uploader::ImageFile;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Imgur 上传接口
pub const IMGUR_ENDPOINT: &str = "https://api.imgur.com/3/image";

#[derive(Debug, Deserialize)]
struct ImgurResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ImgurData>,
}

#[derive(Debug, Deserialize)]
struct ImgurData {
    #[serde(default)]
    link: Option<String>,
    /// 失败时可能是字符串，也可能是 {message: ...}
    #[serde(default)]
    error: Option<Value>,
}

pub struct ImgurHost {
    transport: HttpTransport,
    endpoint: String,
}

impl ImgurHost {
    pub fn new(transport: HttpTransport) -> Self {
        Self::with_endpoint(transport, IMGUR_ENDPOINT)
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
        host: UploadTarget::Imgur.to_string(),
        message,
    }
}

fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// 解析 imgur 响应
fn parse_imgur_response(status: reqwest::StatusCode, body: &str) -> Result<String, UploadError> {
    let parsed: ImgurResponse = match serde_json::from_str(body) {
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

    let data = parsed.data;
    if status.is_success() && parsed.success {
        if let Some(link) = data
            .as_ref()
            .and_then(|d| d.link.clone())
            .filter(|l| !l.is_empty())
        {
            return Ok(link);
        }
        return Err(rejected("响应中缺少图片地址".to_string()));
    }

    let message = data
        .and_then(|d| d.error)
        .as_ref()
        .and_then(error_text)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    Err(rejected(message))
}

#[async_trait]
impl ImageHost for ImgurHost {
    fn target(&self) -> UploadTarget {
        UploadTarget::Imgur
    }

    async fn send(
        &self,
        file: &ImageFile,
        hosts: &HostsConfig,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        let client_id = require_credential(hosts, UploadTarget::Imgur)?;

        let form = multipart::Form::new().part("image", image_part(file));

        debug!("上传到 imgur: {} ({} bytes)", file.name, file.data.len());

        let request = self
            .transport
            .client()
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Client-ID {}", client_id))
            .multipart(form);
        let response = self
            .transport
            .execute(UploadTarget::Imgur, request, cancel)
            .await?;

        let url = parse_imgur_response(response.status, &response.body)?;
        info!("imgur 上传成功: {} -> {}", file.name, url);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::transport::build_http_client;
    use crate::hosts::transport::test_support::spawn_mock;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn test_parse_error_shapes() {
        let err = parse_imgur_response(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"success":false,"status":400,"data":{"error":"File is over the size limit"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "imgur 上传失败: File is over the size limit");

        let err = parse_imgur_response(
            reqwest::StatusCode::FORBIDDEN,
            r#"{"success":false,"data":{"error":{"message":"Invalid client_id"}}}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "imgur 上传失败: Invalid client_id");

        // success 为 true 但没有 link
        let err = parse_imgur_response(reqwest::StatusCode::OK, r#"{"success":true,"data":{}}"#)
            .unwrap_err();
        assert!(matches!(err, UploadError::HostRejected { .. }));
    }

    #[tokio::test]
    async fn test_send_uses_client_id_header() {
        let router = Router::new().route(
            "/3/image",
            post(|headers: HeaderMap, body: Bytes| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let text = String::from_utf8_lossy(&body).to_string();
                if auth == "Client-ID cid-42" && text.contains("name=\"image\"") {
                    (
                        StatusCode::OK,
                        Json(json!({"success": true, "status": 200, "data": {"link": "https://i.imgur.com/abc.jpg"}})),
                    )
                } else {
                    (
                        StatusCode::FORBIDDEN,
                        Json(json!({"success": false, "data": {"error": "unauthorized"}})),
                    )
                }
            }),
        );
        let base = spawn_mock(router).await;

        let transport = HttpTransport::new(build_http_client(5).unwrap());
        let host = ImgurHost::with_endpoint(transport, format!("{}/3/image", base));
        let hosts = HostsConfig {
            imgur: "cid-42".to_string(),
            ..Default::default()
        };
        let file = ImageFile::new("01.jpg", "image/jpeg", vec![0xFF, 0xD8]);

        let url = host
            .send(&file, &hosts, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(url, "https://i.imgur.com/abc.jpg");
    }

    #[tokio::test]
    async fn test_send_rejection_message_from_host() {
        let router = Router::new().route(
            "/3/image",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"success": false, "data": {"error": "Rate limit exceeded"}})),
                )
            }),
        );
        let base = spawn_mock(router).await;

        let transport = HttpTransport::new(build_http_client(5).unwrap());
        let host = ImgurHost::with_endpoint(transport, format!("{}/3/image", base));
        let hosts = HostsConfig {
            imgur: "cid".to_string(),
            ..Default::default()
        };
        let file = ImageFile::new("01.jpg", "image/jpeg", vec![0xFF]);

        let err = host
            .send(&file, &hosts, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            UploadError::HostRejected {
                host: "imgur".into(),
                message: "Rate limit exceeded".into()
            }
        );
        assert!(err.is_retriable());
    }
}
