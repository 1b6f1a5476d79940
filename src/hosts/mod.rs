// 图床模块
//
// 每个图床一个 ImageHost 实现，新增图床 = 新增 UploadTarget 变体 + 新的实现
// - catbox: multipart 表单字段携带 userhash，响应为纯文本 URL
// - imgbb: query 参数携带 key，响应为 JSON {success, data.url}
// - imgur: Authorization 头携带 Client-ID，响应为 JSON {success, data.link}

pub mod catbox;
pub mod imgbb;
pub mod imgur;
pub mod registry;
pub mod transport;

use crate::config::HostsConfig;
use crate::error::UploadError;
use crate::uploader::ImageFile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

pub use catbox::CatboxHost;
pub use imgbb::ImgbbHost;
pub use imgur::ImgurHost;
pub use registry::{
    available_targets, check_run_preconditions, first_available_fallback, pick_target_for_index,
    test_connectivity, HostRegistry,
};
pub use transport::{build_http_client, HttpTransport};

/// 上传目标图床
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadTarget {
    Catbox,
    Imgbb,
    Imgur,
}

impl UploadTarget {
    /// 固定顺序：catbox 优先，其次 imgbb、imgur
    pub const ALL: [UploadTarget; 3] = [UploadTarget::Catbox, UploadTarget::Imgbb, UploadTarget::Imgur];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadTarget::Catbox => "catbox",
            UploadTarget::Imgbb => "imgbb",
            UploadTarget::Imgur => "imgur",
        }
    }

    /// 未配置时给用户的提示
    pub fn not_configured_message(&self) -> String {
        match self {
            UploadTarget::Catbox => "Catbox 未正确配置（需要启用并填写 userhash）".to_string(),
            UploadTarget::Imgbb => "ImgBB API key 未配置".to_string(),
            UploadTarget::Imgur => "Imgur client ID 未配置".to_string(),
        }
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次上传（不含重试）
///
/// 实现方需要：
/// - 在任何网络请求之前检查凭证，缺失时返回 `NotConfigured`
/// - 响应取消令牌，及时中止正在进行的请求
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// 对应的图床
    fn target(&self) -> UploadTarget;

    /// 上传一个文件，返回图片 URL
    async fn send(
        &self,
        file: &ImageFile,
        hosts: &HostsConfig,
        cancel: &CancellationToken,
    ) -> Result<String, UploadError>;
}

/// 取出凭证，缺失时返回 NotConfigured
pub(crate) fn require_credential(
    hosts: &HostsConfig,
    target: UploadTarget,
) -> Result<String, UploadError> {
    hosts
        .credential(target)
        .map(str::to_string)
        .ok_or_else(|| UploadError::NotConfigured(target.not_configured_message()))
}
