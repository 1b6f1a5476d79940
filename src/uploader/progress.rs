// 上传进度面板
//
// 保存当前运行每个文件的进度条目，并把每次变化广播出去。
// 锁只在同步代码里短暂持有，不跨 await

use crate::server::events::UploadEvent;
use crate::uploader::{FileWorkItem, UploadProgressEntry};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::trace;

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 512;

#[derive(Debug)]
pub struct ProgressBoard {
    run_id: RwLock<String>,
    entries: RwLock<Vec<UploadProgressEntry>>,
    events: broadcast::Sender<UploadEvent>,
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBoard {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            run_id: RwLock::new(String::new()),
            entries: RwLock::new(Vec::new()),
            events,
        }
    }

    /// 订阅事件流
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// 当前订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// 发布事件（没有订阅者时忽略）
    pub fn publish(&self, event: UploadEvent) {
        trace!("发布事件: {}", event.event_type());
        let _ = self.events.send(event);
    }

    /// 开始新的运行：替换全部条目，每个文件一个 pending
    pub fn reset(&self, run_id: &str, items: &[FileWorkItem]) {
        *self.run_id.write() = run_id.to_string();
        *self.entries.write() = items.iter().map(UploadProgressEntry::pending).collect();
    }

    pub fn run_id(&self) -> String {
        self.run_id.read().clone()
    }

    /// 修改第 index 个条目并广播修改后的快照
    pub fn update<F>(&self, index: usize, f: F) -> Option<UploadProgressEntry>
    where
        F: FnOnce(&mut UploadProgressEntry),
    {
        let updated = {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(index)?;
            f(entry);
            entry.clone()
        };

        self.publish(UploadEvent::Progress {
            run_id: self.run_id(),
            entry: updated.clone(),
        });
        Some(updated)
    }

    /// 当前所有条目的快照
    pub fn snapshot(&self) -> Vec<UploadProgressEntry> {
        self.entries.read().clone()
    }

    pub fn get(&self, index: usize) -> Option<UploadProgressEntry> {
        self.entries.read().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
