//! 事件模块
//!
//! - `types.rs`: 上传事件与通知类型

mod types;

pub use types::*;
