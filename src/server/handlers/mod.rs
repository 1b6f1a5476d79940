// API处理器模块

pub mod config;
pub mod hosts;
pub mod index;
pub mod upload;

pub use config::*;
pub use hosts::*;
pub use index::*;
pub use upload::*;

use serde::{Deserialize, Serialize};

/// 统一API响应格式
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// 状态码 (0: 成功, 其他: 错误码)
    pub code: i32,
    /// 消息
    pub message: String,
    /// 数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: String) -> Self {
        Self {
            code,
            message,
            data: None,
        }
    }
}
