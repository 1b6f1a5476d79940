use anyhow::Context;
use manga_uploader::{
    config::{LogConfig, DEFAULT_CONFIG_PATH},
    logging,
    server::build_router,
    AppState,
};
use tracing::info;

/// 在初始化日志之前单独读取日志配置
///
/// 配置文件不存在或解析失败时使用默认日志配置
async fn load_log_config() -> LogConfig {
    let Ok(content) = tokio::fs::read_to_string(DEFAULT_CONFIG_PATH).await else {
        return LogConfig::default();
    };
    toml::from_str::<toml::Value>(&content)
        .ok()
        .and_then(|value| value.get("log").cloned())
        .and_then(|log_table| log_table.try_into::<LogConfig>().ok())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 🔥 先加载日志配置，日志守卫必须保持存活
    let log_config = load_log_config().await;
    let _log_guard = logging::init_logging(&log_config);

    info!("Manga Uploader v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let app_state = AppState::new().await.context("初始化应用状态失败")?;
    let config = app_state.config.read().await.clone();
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let validation = config.validate();
    if !validation.is_valid {
        for error in &validation.errors {
            tracing::warn!("配置不完整: {}", error);
        }
    }

    let app = build_router(app_state.clone(), &config.server.cors_origins);

    info!("服务器启动在: http://{}", addr);
    info!("API 基础路径: http://{}/api/v1", addr);
    info!("WebSocket: ws://{}/ws", addr);
    info!("健康检查: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;

    // 🔥 使用 select! 监听关闭信号
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始关闭...");
        }
    }

    // 取消进行中的上传，已上传的图片不会回滚
    if app_state.cancel_run() {
        info!("已取消进行中的上传");
    }
    info!("应用已安全退出");

    Ok(())
}
