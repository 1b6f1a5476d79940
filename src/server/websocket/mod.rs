//! WebSocket 模块
//!
//! 把上传事件实时推送给前端

mod handler;
mod message;

pub use handler::handle_websocket;
pub use message::{WsClientMessage, WsServerMessage};
