//! 중복 제거 윈도우
//!
//! 디스패처가 같은 장비의 같은 본문을 짧은 시간 안에 두 번 워커로 보내지 않도록
//! 지문(`base64("{os}/{host}/{body}")`)을 TTL 동안 기억합니다.
//!
//! 저장소는 [`DedupStore`] 뒤에 숨겨져 있습니다.
//! - [`MemoryDedup`]: 프로세스 내부 맵. 읽을 때 만료를 확인하고 주기적으로 정리합니다.
//! - [`RedisDedup`]: `SET key 1 NX EX ttl` 로 여러 인스턴스가 한 창을 공유합니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use netlog_core::config::DedupConfig;
use netlog_core::pipeline::BoxFuture;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Redis 키 접두어
pub const REDIS_KEY_PREFIX: &str = "netlog:dedup:";

/// 중복 제거 지문을 계산합니다.
pub fn fingerprint(os: &str, host: &str, body: &str) -> String {
    STANDARD.encode(format!("{os}/{host}/{body}"))
}

/// 지문 저장소
pub trait DedupStore: Send + Sync {
    /// 지문이 창 안에 있으면 `true`, 없으면 기록하고 `false` 를 반환합니다.
    fn check_and_insert<'a>(&'a self, fingerprint: &'a str) -> BoxFuture<'a, Result<bool, EngineError>>;

    /// 만료된 지문을 정리하고 정리한 수를 반환합니다.
    fn sweep(&self) -> usize {
        0
    }

    /// 저장소 이름 (로그용)
    fn name(&self) -> &'static str;
}

/// 프로세스 내부 저장소
pub struct MemoryDedup {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl MemoryDedup {
    /// TTL 로 저장소를 만듭니다.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 기억 중인 지문 수 (만료 전 정리되지 않은 것 포함)
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn check(&self, fingerprint: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(inserted) = entries.get(fingerprint)
            && now.duration_since(*inserted) < self.ttl
        {
            return true;
        }
        entries.insert(fingerprint.to_owned(), now);
        false
    }
}

impl DedupStore for MemoryDedup {
    fn check_and_insert<'a>(&'a self, fingerprint: &'a str) -> BoxFuture<'a, Result<bool, EngineError>> {
        let seen = self.check(fingerprint);
        Box::pin(async move { Ok(seen) })
    }

    fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, inserted| now.duration_since(*inserted) < self.ttl);
        before - entries.len()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Redis 저장소
pub struct RedisDedup {
    connection: redis::aio::MultiplexedConnection,
    ttl_secs: u64,
}

impl RedisDedup {
    /// Redis 에 연결합니다.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, EngineError> {
        let client = redis::Client::open(url).map_err(|e| EngineError::Dedup(e.to_string()))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| EngineError::Dedup(format!("failed to connect to {url}: {e}")))?;
        Ok(Self {
            connection,
            ttl_secs: ttl.as_secs().max(1),
        })
    }
}

impl DedupStore for RedisDedup {
    fn check_and_insert<'a>(&'a self, fingerprint: &'a str) -> BoxFuture<'a, Result<bool, EngineError>> {
        Box::pin(async move {
            let mut conn = self.connection.clone();
            // SET ... NX 는 새로 기록하면 "OK", 이미 있으면 nil
            let stored: Option<String> = redis::cmd("SET")
                .arg(format!("{REDIS_KEY_PREFIX}{fingerprint}"))
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async(&mut conn)
                .await
                .map_err(|e| EngineError::Dedup(e.to_string()))?;
            Ok(stored.is_none())
        })
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// 디스패처가 쓰는 중복 제거 창
#[derive(Clone)]
pub struct DedupWindow {
    store: Arc<dyn DedupStore>,
    sweep_interval: Duration,
}

impl DedupWindow {
    /// 저장소와 정리 주기로 창을 만듭니다.
    pub fn new(store: Arc<dyn DedupStore>, sweep_interval: Duration) -> Self {
        Self {
            store,
            sweep_interval,
        }
    }

    /// 메모리 저장소 창
    pub fn memory(ttl: Duration, sweep_interval: Duration) -> Self {
        Self::new(Arc::new(MemoryDedup::new(ttl)), sweep_interval)
    }

    /// 설정에 따라 창을 만듭니다. 비활성이면 `None`.
    pub async fn from_config(config: &DedupConfig) -> Result<Option<Self>, EngineError> {
        if !config.enabled {
            return Ok(None);
        }
        let ttl = Duration::from_secs(config.ttl_secs);
        let sweep = Duration::from_secs(config.sweep_interval_secs.max(1));
        let window = match config.backend.as_str() {
            "memory" => Self::memory(ttl, sweep),
            "redis" => Self::new(Arc::new(RedisDedup::connect(&config.redis_url, ttl).await?), sweep),
            other => {
                return Err(EngineError::Config {
                    field: "engine.dedup.backend".to_owned(),
                    reason: format!("unknown backend '{other}'"),
                });
            }
        };
        tracing::info!(backend = window.store.name(), ttl_secs = config.ttl_secs, "dedup window enabled");
        Ok(Some(window))
    }

    /// 메시지가 창 안에서 이미 전달되었는지 확인하고, 아니면 기록합니다.
    ///
    /// 저장소 에러는 경고 후 전달하는 쪽으로 처리합니다.
    pub async fn seen(&self, os: &str, host: &str, body: &str) -> bool {
        let key = fingerprint(os, host, body);
        match self.store.check_and_insert(&key).await {
            Ok(seen) => seen,
            Err(e) => {
                tracing::warn!(os, error = %e, "dedup lookup failed, forwarding message");
                false
            }
        }
    }

    /// 취소될 때까지 주기적으로 만료 지문을 정리합니다.
    pub async fn run_sweeper(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.sweep_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.store.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, "swept expired dedup fingerprints");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}

impl fmt::Debug for DedupWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupWindow")
            .field("store", &self.store.name())
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}
