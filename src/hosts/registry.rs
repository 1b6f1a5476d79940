// 图床注册表与选择器

use super::transport::HttpTransport;
use super::{CatboxHost, ImageHost, ImgbbHost, ImgurHost, UploadTarget};
use crate::config::{HostsConfig, StrategyConfig, UploadMode};
use crate::error::UploadError;
use crate::uploader::ImageFile;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 当前可用的图床（按 catbox、imgbb、imgur 顺序）
///
/// 每次调用都根据最新配置重新计算
pub fn available_targets(hosts: &HostsConfig) -> Vec<UploadTarget> {
    UploadTarget::ALL
        .into_iter()
        .filter(|target| hosts.is_available(*target))
        .collect()
}

/// 备用图床中第一个可用的
pub fn first_available_fallback(
    hosts: &HostsConfig,
    strategy: &StrategyConfig,
) -> Option<UploadTarget> {
    strategy
        .fallback_hosts
        .iter()
        .copied()
        .find(|target| hosts.is_available(*target))
}

/// 为第 index 个文件选择图床
///
/// - single_host: 始终返回首选图床，即使它不可用（由上传时报 NotConfigured）
/// - 其他模式: 在可用图床间按序号轮转
pub fn pick_target_for_index(
    hosts: &HostsConfig,
    strategy: &StrategyConfig,
    index: usize,
) -> Result<UploadTarget, UploadError> {
    let available = available_targets(hosts);
    if available.is_empty() {
        return Err(UploadError::NoHostsAvailable);
    }

    match strategy.current {
        UploadMode::SingleHost => Ok(strategy.preferred_host),
        UploadMode::RoundRobin | UploadMode::Redundant => Ok(available[index % available.len()]),
    }
}

/// 运行前置条件检查
///
/// 失败时一个文件都不会尝试
pub fn check_run_preconditions(
    hosts: &HostsConfig,
    strategy: &StrategyConfig,
) -> Result<(), UploadError> {
    if available_targets(hosts).is_empty() {
        return Err(UploadError::NoHostsAvailable);
    }

    match strategy.current {
        UploadMode::Redundant => Err(UploadError::UnsupportedStrategy(
            "redundant 模式尚未支持，请使用 single_host 或 round_robin".to_string(),
        )),
        UploadMode::SingleHost if !hosts.is_available(strategy.preferred_host) => {
            let base = strategy.preferred_host.not_configured_message();
            let message = match first_available_fallback(hosts, strategy) {
                Some(fallback) => format!("{}，可以将首选图床切换为 {}", base, fallback),
                None => base,
            };
            Err(UploadError::NotConfigured(message))
        }
        _ => Ok(()),
    }
}

/// 图床注册表：UploadTarget -> 实现
#[derive(Clone, Default)]
pub struct HostRegistry {
    hosts: HashMap<UploadTarget, Arc<dyn ImageHost>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册三个真实图床，共用同一个传输层
    pub fn http(transport: HttpTransport) -> Self {
        Self::new()
            .with_host(Arc::new(CatboxHost::new(transport.clone())))
            .with_host(Arc::new(ImgbbHost::new(transport.clone())))
            .with_host(Arc::new(ImgurHost::new(transport)))
    }

    /// 注册（或替换）一个图床实现
    pub fn with_host(mut self, host: Arc<dyn ImageHost>) -> Self {
        self.hosts.insert(host.target(), host);
        self
    }

    pub fn get(&self, target: UploadTarget) -> Result<Arc<dyn ImageHost>, UploadError> {
        self.hosts
            .get(&target)
            .cloned()
            .ok_or_else(|| UploadError::NotConfigured(format!("图床 {} 没有注册上传实现", target)))
    }

    pub fn targets(&self) -> Vec<UploadTarget> {
        let mut targets: Vec<UploadTarget> = self.hosts.keys().copied().collect();
        targets.sort();
        targets
    }
}

/// 连通性测试用的 1x1 PNG
fn probe_file() -> ImageFile {
    let mut data = Vec::new();
    let image = DynamicImage::ImageRgb8(RgbImage::new(1, 1));
    if let Err(e) = image.write_to(&mut Cursor::new(&mut data), ImageOutputFormat::Png) {
        warn!("生成测试图片失败: {}", e);
    }
    ImageFile::new("connectivity-test.png", "image/png", data)
}

/// 测试各图床连通性
///
/// 对每个可用图床上传一张测试图片，不可用的图床直接记为 false
pub async fn test_connectivity(
    registry: &HostRegistry,
    hosts: &HostsConfig,
    cancel: &CancellationToken,
) -> BTreeMap<UploadTarget, bool> {
    let probe = probe_file();
    let mut results = BTreeMap::new();

    for target in UploadTarget::ALL {
        if !hosts.is_available(target) {
            results.insert(target, false);
            continue;
        }

        let ok = match registry.get(target) {
            Ok(host) => match host.send(&probe, hosts, cancel).await {
                Ok(url) => {
                    info!("图床 {} 连通性测试通过: {}", target, url);
                    true
                }
                Err(e) => {
                    warn!("图床 {} 连通性测试失败: {}", target, e);
                    false
                }
            },
            Err(e) => {
                warn!("{}", e);
                false
            }
        };
        results.insert(target, ok);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatboxConfig;
    use async_trait::async_trait;
    use proptest::prelude::*;

    fn all_hosts() -> HostsConfig {
        HostsConfig {
            imgbb: "key".into(),
            imgur: "cid".into(),
            catbox: CatboxConfig {
                enabled: true,
                userhash: "hash".into(),
            },
        }
    }

    fn strategy(mode: UploadMode, preferred: UploadTarget) -> StrategyConfig {
        StrategyConfig {
            current: mode,
            preferred_host: preferred,
            ..Default::default()
        }
    }

    #[test]
    fn test_available_targets_order_and_filtering() {
        assert_eq!(
            available_targets(&all_hosts()),
            vec![UploadTarget::Catbox, UploadTarget::Imgbb, UploadTarget::Imgur]
        );

        let mut hosts = all_hosts();
        hosts.catbox.enabled = false;
        hosts.imgur = "   ".into();
        assert_eq!(available_targets(&hosts), vec![UploadTarget::Imgbb]);

        assert!(available_targets(&HostsConfig::default()).is_empty());
    }

    #[test]
    fn test_round_robin_cycles_available_hosts() {
        let mut hosts = all_hosts();
        hosts.catbox.enabled = false;
        let strategy = strategy(UploadMode::RoundRobin, UploadTarget::Catbox);

        let picks: Vec<UploadTarget> = (0..4)
            .map(|i| pick_target_for_index(&hosts, &strategy, i).unwrap())
            .collect();
        assert_eq!(
            picks,
            vec![
                UploadTarget::Imgbb,
                UploadTarget::Imgur,
                UploadTarget::Imgbb,
                UploadTarget::Imgur
            ]
        );
    }

    #[test]
    fn test_single_host_returns_preferred_even_if_unavailable() {
        let hosts = HostsConfig {
            imgbb: "key".into(),
            ..Default::default()
        };
        let strategy = strategy(UploadMode::SingleHost, UploadTarget::Imgur);
        assert_eq!(
            pick_target_for_index(&hosts, &strategy, 7).unwrap(),
            UploadTarget::Imgur
        );
    }

    #[test]
    fn test_no_hosts_available() {
        let strategy = StrategyConfig::default();
        assert_eq!(
            pick_target_for_index(&HostsConfig::default(), &strategy, 0),
            Err(UploadError::NoHostsAvailable)
        );
        assert_eq!(
            check_run_preconditions(&HostsConfig::default(), &strategy),
            Err(UploadError::NoHostsAvailable)
        );
    }

    #[test]
    fn test_preconditions() {
        let hosts = all_hosts();
        assert!(check_run_preconditions(&hosts, &StrategyConfig::default()).is_ok());

        let err = check_run_preconditions(
            &hosts,
            &strategy(UploadMode::Redundant, UploadTarget::Catbox),
        )
        .unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedStrategy(_)));

        // 首选 catbox 未启用，提示切换到第一个可用的备用图床
        let mut hosts = all_hosts();
        hosts.catbox.enabled = false;
        let err = check_run_preconditions(&hosts, &StrategyConfig::default()).unwrap_err();
        match err {
            UploadError::NotConfigured(msg) => assert!(msg.contains("imgbb")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_first_available_fallback_respects_order() {
        let mut hosts = all_hosts();
        hosts.imgbb.clear();
        assert_eq!(
            first_available_fallback(&hosts, &StrategyConfig::default()),
            Some(UploadTarget::Imgur)
        );
        hosts.imgur.clear();
        assert_eq!(first_available_fallback(&hosts, &StrategyConfig::default()), None);
    }

    struct FixedHost(UploadTarget, Result<String, UploadError>);

    #[async_trait]
    impl ImageHost for FixedHost {
        fn target(&self) -> UploadTarget {
            self.0
        }

        async fn send(
            &self,
            _file: &ImageFile,
            _hosts: &HostsConfig,
            _cancel: &CancellationToken,
        ) -> Result<String, UploadError> {
            self.1.clone()
        }
    }

    #[test]
    fn test_registry_with_host_replaces() {
        let registry = HostRegistry::new()
            .with_host(Arc::new(FixedHost(UploadTarget::Imgbb, Ok("a".into()))))
            .with_host(Arc::new(FixedHost(UploadTarget::Imgbb, Ok("b".into()))));
        assert_eq!(registry.targets(), vec![UploadTarget::Imgbb]);
        assert!(matches!(
            registry.get(UploadTarget::Imgur),
            Err(UploadError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_connectivity_reports_each_target() {
        let registry = HostRegistry::new()
            .with_host(Arc::new(FixedHost(UploadTarget::Catbox, Ok("https://c".into()))))
            .with_host(Arc::new(FixedHost(
                UploadTarget::Imgbb,
                Err(UploadError::TransportFailure("down".into())),
            )));
        let mut hosts = all_hosts();
        hosts.imgur.clear();

        let results = test_connectivity(&registry, &hosts, &CancellationToken::new()).await;
        assert_eq!(results.get(&UploadTarget::Catbox), Some(&true));
        assert_eq!(results.get(&UploadTarget::Imgbb), Some(&false));
        assert_eq!(results.get(&UploadTarget::Imgur), Some(&false));
    }

    #[test]
    fn test_probe_file_is_png() {
        let probe = probe_file();
        assert!(probe.data.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    fn arb_hosts() -> impl Strategy<Value = HostsConfig> {
        (any::<bool>(), any::<bool>(), any::<bool>()).prop_map(|(c, b, u)| HostsConfig {
            imgbb: if b { "key".into() } else { String::new() },
            imgur: if u { "cid".into() } else { String::new() },
            catbox: CatboxConfig {
                enabled: c,
                userhash: "hash".into(),
            },
        })
    }

    fn arb_target() -> impl Strategy<Value = UploadTarget> {
        prop_oneof![
            Just(UploadTarget::Catbox),
            Just(UploadTarget::Imgbb),
            Just(UploadTarget::Imgur)
        ]
    }

    proptest! {
        #[test]
        fn prop_round_robin_is_periodic(hosts in arb_hosts(), index in 0usize..1000) {
            let strategy = strategy(UploadMode::RoundRobin, UploadTarget::Catbox);
            let available = available_targets(&hosts);
            prop_assume!(!available.is_empty());

            let a = pick_target_for_index(&hosts, &strategy, index).unwrap();
            let b = pick_target_for_index(&hosts, &strategy, index + available.len()).unwrap();
            prop_assert_eq!(a, b);
            prop_assert!(available.contains(&a));
        }

        #[test]
        fn prop_single_host_is_constant(
            hosts in arb_hosts(),
            preferred in arb_target(),
            index in 0usize..1000,
        ) {
            let strategy = strategy(UploadMode::SingleHost, preferred);
            prop_assume!(!available_targets(&hosts).is_empty());
            prop_assert_eq!(
                pick_target_for_index(&hosts, &strategy, index).unwrap(),
                preferred
            );
        }
    }
}
