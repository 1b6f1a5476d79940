// Catbox 图床
//
// 请求：multipart 表单 reqtype=fileupload + userhash + fileToUpload
// 响应：纯文本，成功时是 https:// 开头的图片地址，失败时是错误描述

use super::transport::{image_part, truncate_message, HttpTransport};
use super::{require_credential, ImageHost, UploadTarget};
use crate::config::HostsConfig;
use crate::error::UploadError;
use crate::uploader::ImageFile;
use async_trait::async_trait;
use reqwest::multipart;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Catbox 上传接口
pub const CATBOX_ENDPOINT: &str = "https://catbox.moe/user/api.php";

pub struct CatboxHost {
    transport: HttpTransport,
    endpoint: String,
}

impl CatboxHost {
    pub fn new(transport: HttpTransport) -> Self {
        Self::with_endpoint(transport, CATBOX_ENDPOINT)
    }

    pub fn with_endpoint(transport: HttpTransport, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }
}

/// 解析 catbox 响应文本
fn parse_catbox_response(status_ok: bool, body: &str) -> Result<String, UploadError> {
    let text = body.trim();
    if status_ok && text.starts_with("https://") {
        return Ok(text.to_string());
    }

    let message = if text.is_empty() {
        "响应为空".to_string()
    } else {
        truncate_message(text)
    };
    Err(UploadError::HostRejected {
        host: UploadTarget::Catbox.to_string(),
        message,
    })
}

#[async_trait]
impl ImageHost for CatboxHost {
    fn target(&self) -> UploadTarget {
        UploadTarget::Catbox
    }

    async fn send(
        &self,
        file: &ImageFile,
        hosts: &HostsConfig,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError> {
        let userhash = require_credential(hosts, UploadTarget::Catbox)?;

        let form = multipart::Form::new()
            .text("reqtype", "fileupload")
            .text("userhash", userhash)
            .part("fileToUpload", image_part(file));

        debug!("上传到 catbox: {} ({} bytes)", file.name, file.data.len());

        let request = self.transport.client().post(&self.endpoint).multipart(form);
        let response = self
            .transport
            .execute(UploadTarget::Catbox, request, cancel)
            .await?;

        let url = parse_catbox_response(response.status.is_success(), &response.body)?;
        info!("catbox 上传成功: {} -> {}", file.name, url);
        Ok(url)
    }
}
