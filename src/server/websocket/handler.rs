//! WebSocket 路由处理器

use crate::server::websocket::message::{WsClientMessage, WsServerMessage};
use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// WebSocket 路由处理器
///
/// 升级 HTTP 连接为 WebSocket，推送进度面板广播的所有上传事件
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// 处理 WebSocket 连接
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4().to_string();
    info!("新的 WebSocket 连接: {}", connection_id);

    // 先订阅，保证连接建立后的事件不会丢
    let mut events = state.progress.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WsServerMessage>();

    let (mut sender, mut receiver) = socket.split();

    let connected_msg = WsServerMessage::connected(connection_id.clone());
    if let Ok(json) = serde_json::to_string(&connected_msg) {
        if sender.send(Message::Text(json)).await.is_err() {
            error!("发送连接成功消息失败");
            return;
        }
    }

    let conn_id_send = connection_id.clone();

    // 启动发送任务：广播事件 + 对客户端请求的回复
    let mut send_task = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => WsServerMessage::event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("WebSocket 推送落后，丢弃 {} 个事件: {}", skipped, conn_id_send);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => reply,
                    None => break,
                },
            };

            match serde_json::to_string(&message) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("序列化消息失败: {}", e);
                }
            }
        }
    });

    let state_recv = state.clone();
    let conn_id_recv = connection_id.clone();

    // 启动接收任务
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let reply = match message {
                Message::Text(text) => handle_client_message(&state_recv, &conn_id_recv, &text),
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => handle_client_message(&state_recv, &conn_id_recv, &text),
                    Err(_) => continue,
                },
                Message::Ping(_) | Message::Pong(_) => {
                    debug!("收到心跳: {}", conn_id_recv);
                    continue;
                }
                Message::Close(_) => {
                    info!("收到关闭消息: {}", conn_id_recv);
                    break;
                }
            };
            if reply_tx.send(reply).is_err() {
                break;
            }
        }
    });

    // 等待任一任务结束，另一个随之中止，释放广播订阅
    tokio::select! {
        _ = &mut send_task => {
            debug!("发送任务结束: {}", connection_id);
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!("接收任务结束: {}", connection_id);
            send_task.abort();
        }
    }

    info!("WebSocket 连接已关闭: {}", connection_id);
}

/// 处理客户端消息，返回要回复的消息
fn handle_client_message(state: &AppState, connection_id: &str, text: &str) -> WsServerMessage {
    match serde_json::from_str::<WsClientMessage>(text) {
        Ok(WsClientMessage::Ping { timestamp }) => WsServerMessage::pong(Some(timestamp)),
        Ok(WsClientMessage::RequestSnapshot) => {
            debug!("收到进度快照请求: {}", connection_id);
            WsServerMessage::Snapshot {
                run_id: state.progress.run_id(),
                running: state.is_running(),
                entries: state.progress.snapshot(),
            }
        }
        Err(e) => {
            warn!("解析客户端消息失败: {} - {}", connection_id, e);
            WsServerMessage::error("PARSE_ERROR", format!("消息解析失败: {}", e))
        }
    }
}
