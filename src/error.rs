// 错误类型定义
//
// 上传链路（图床）与索引更新（GitHub）各自一套错误分类，
// 所有变体的 Display 都是可以直接展示给用户的信息

use thiserror::Error;

/// 上传错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// 图床未配置（需要用户修正设置，不重试）
    #[error("{0}")]
    NotConfigured(String),
    /// 网络层失败（可重试）
    #[error("网络请求失败: {0}")]
    TransportFailure(String),
    /// 跨域请求被拒绝（重试无效，需要更换传输方式）
    #[error("{host} 拒绝了跨域请求，重试无法解决，请改用服务端中继上传")]
    CrossOriginBlocked { host: String },
    /// 图床返回失败（可重试，但大概率会再次失败）
    #[error("{host} 上传失败: {message}")]
    HostRejected { host: String, message: String },
    /// 没有可用图床（启动前置条件失败）
    #[error("没有可用的图床，请至少配置一个图床")]
    NoHostsAvailable,
    /// 不支持的上传策略
    #[error("不支持的上传策略: {0}")]
    UnsupportedStrategy(String),
    /// 已取消
    #[error("上传已取消")]
    Cancelled,
    /// 本地文件读取失败
    #[error("读取文件失败: {0}")]
    Io(String),
}

impl UploadError {
    /// 是否值得重试
    ///
    /// 配置错误、跨域拒绝、取消：重试不会改变结果
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UploadError::TransportFailure(_) | UploadError::HostRejected { .. }
        )
    }

    /// 是否为运行级前置条件错误（发生时不会尝试任何文件）
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            UploadError::NoHostsAvailable
                | UploadError::UnsupportedStrategy(_)
                | UploadError::NotConfigured(_)
        )
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io(e.to_string())
    }
}

/// 索引文件更新错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// GitHub 配置不完整
    #[error("GitHub 配置不完整: {0}")]
    NotConfigured(String),
    /// 401
    #[error("Token 无效或已过期，请检查 Personal Access Token")]
    Unauthorized,
    /// 403
    #[error("没有权限，请检查 Token 的仓库权限")]
    Forbidden,
    /// 404（仓库或路径不存在）
    #[error("仓库不存在，请检查 owner/repo")]
    RepositoryNotFound,
    /// 版本冲突：远端文件在读取后已被修改
    #[error("索引文件 {path} 已被其他人修改，请重新加载后再试")]
    VersionConflict { path: String },
    /// 5xx
    #[error("GitHub 服务器错误 ({0})，请稍后重试")]
    Server(u16),
    /// 其他 HTTP 错误
    #[error("GitHub API 错误: {status} {message}")]
    Http { status: u16, message: String },
    /// 网络层失败
    #[error("GitHub 请求失败: {0}")]
    Transport(String),
    /// 内容解码失败
    #[error("索引文件解析失败: {0}")]
    Decode(String),
}

impl IndexError {
    /// 是否为版本冲突
    pub fn is_conflict(&self) -> bool {
        matches!(self, IndexError::VersionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(UploadError::TransportFailure("reset".into()).is_retriable());
        assert!(UploadError::HostRejected {
            host: "imgbb".into(),
            message: "busy".into()
        }
        .is_retriable());

        assert!(!UploadError::NotConfigured("x".into()).is_retriable());
        assert!(!UploadError::CrossOriginBlocked { host: "imgur".into() }.is_retriable());
        assert!(!UploadError::Cancelled.is_retriable());
        assert!(!UploadError::NoHostsAvailable.is_retriable());
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = UploadError::HostRejected {
            host: "imgbb".into(),
            message: "Invalid API v1 key.".into(),
        };
        assert_eq!(err.to_string(), "imgbb 上传失败: Invalid API v1 key.");

        let err = UploadError::CrossOriginBlocked { host: "catbox".into() };
        assert!(err.to_string().contains("重试无法解决"));

        let err = IndexError::VersionConflict {
            path: "manga-index.json".into(),
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("manga-index.json"));
    }
}
