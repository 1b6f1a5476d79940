// 重试控制
//
// 指数退避：第 n 次重试前等待 initial_delay * multiplier^n，不超过 max_delay
// 总尝试次数 = max_retries + 1，耗尽后返回最后一次的错误

use crate::error::UploadError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 默认初始退避 1 秒
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1000;

/// 默认退避上限 30 秒
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            multiplier: 2.0,
            max_delay: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// 第 retry 次重试（从 0 开始）之前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        if capped.is_finite() && capped > 0.0 {
            Duration::from_millis(capped as u64)
        } else {
            Duration::ZERO
        }
    }
}

/// 重试任何失败
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    attempt: F,
) -> Result<T, UploadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, UploadError>>,
{
    with_retry_if(policy, cancel, |_| true, |_, _| {}, attempt).await
}

/// 只重试 should_retry 返回 true 的失败
///
/// - attempt 参数为尝试序号（从 0 开始）
/// - on_retry 在每次等待前调用，参数为即将进行的重试序号（从 1 开始）和上次的错误
/// - Cancelled 永远不重试；等待期间被取消立即返回 Cancelled
pub async fn with_retry_if<T, F, Fut, P, H>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    should_retry: P,
    mut on_retry: H,
    mut attempt: F,
) -> Result<T, UploadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, UploadError>>,
    P: Fn(&UploadError) -> bool,
    H: FnMut(u32, &UploadError),
{
    let mut last_error = None;

    for retry in 0..=policy.max_retries {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        match attempt(retry).await {
            Ok(value) => {
                if retry > 0 {
                    debug!("第 {} 次重试成功", retry);
                }
                return Ok(value);
            }
            Err(UploadError::Cancelled) => return Err(UploadError::Cancelled),
            Err(e) => {
                if !should_retry(&e) {
                    debug!("错误不可重试，直接失败: {}", e);
                    return Err(e);
                }

                if retry < policy.max_retries {
                    let delay = policy.delay_for(retry);
                    warn!(
                        "上传失败，等待 {}ms 后重试 ({}/{}): {}",
                        delay.as_millis(),
                        retry + 1,
                        policy.max_retries,
                        e
                    );
                    on_retry(retry + 1, &e);

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }

                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| UploadError::TransportFailure("上传失败".to_string())))
}
