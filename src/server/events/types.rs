//! 上传事件类型定义
//!
//! 进度条目的每次变化、运行开始/结束、索引更新以及通知
//! 都以 UploadEvent 的形式广播，WebSocket 原样推送 JSON

use crate::uploader::{UploadProgressEntry, UploadResult};
use serde::{Deserialize, Serialize};

/// 通知级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    Info,
}

/// 上传事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 运行开始（进度面板已重置）
    RunStarted {
        run_id: String,
        total_files: usize,
        /// 批量上传时的章节键
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chapter_key: Option<String>,
    },
    /// 单个文件进度变化
    Progress {
        run_id: String,
        entry: UploadProgressEntry,
    },
    /// 运行结束
    RunCompleted { run_id: String, result: UploadResult },
    /// 索引文件已更新
    IndexUpdated { run_id: String, url: String },
    /// 用户通知
    Notice {
        level: NoticeLevel,
        title: String,
        message: String,
    },
}

impl UploadEvent {
    pub fn notice(level: NoticeLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        UploadEvent::Notice {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    /// 事件类型名（日志用）
    pub fn event_type(&self) -> &'static str {
        match self {
            UploadEvent::RunStarted { .. } => "run_started",
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::RunCompleted { .. } => "run_completed",
            UploadEvent::IndexUpdated { .. } => "index_updated",
            UploadEvent::Notice { .. } => "notice",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::UploadStatus;

    #[test]
    fn test_event_json_shape() {
        let event = UploadEvent::Progress {
            run_id: "r1".into(),
            entry: UploadProgressEntry {
                file_id: "f1".into(),
                file_name: "001.jpg".into(),
                status: UploadStatus::Uploading,
                progress: 25,
                url: None,
                error: None,
                retry_count: 0,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "progress");
        assert_eq!(json["entry"]["status"], "uploading");
        assert_eq!(json["entry"]["progress"], 25);
        assert!(json["entry"].get("url").is_none());
    }

    #[test]
    fn test_notice_roundtrip() {
        let event = UploadEvent::notice(NoticeLevel::Warning, "索引更新失败", "409");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"notice\""));
        assert!(json.contains("\"level\":\"warning\""));
        let back: UploadEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.event_type(), "notice");
    }
}
