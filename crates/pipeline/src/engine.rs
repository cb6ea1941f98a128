//! 엔진 -- 모든 실행 단위의 생명주기와 감시를 담당합니다.
//!
//! [`Engine`]은 core의 [`Pipeline`] trait을 구현하여 `netlog-daemon`에서
//! 동일한 생명주기(start/stop/health_check)로 관리됩니다.
//!
//! # 실행 단위
//! ```text
//! Listener* ─▶ Dispatcher ─▶ DeviceWorker[os × N] ─▶ FanoutBus ─▶ Publisher*
//!                  │                                     ▲
//!                  └────────────── UNKNOWN ──────────────┘
//! AuthServer (보안 켜짐) · DedupSweeper (중복 제거 켜짐)
//! ```
//!
//! 모든 단위는 하나의 `CancellationToken` 을 공유합니다. 감시 루프가
//! `JoinHandle` 을 주기적으로 확인하다가 실행 중에 끝난 단위가 있으면
//! 전체를 취소하고 [`PipelineError::UnitExited`] 를 보고합니다.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use netlog_auth::{AuthServer, AuthServerConfig, Codec, KeyMaterial};
use netlog_core::config::{NetlogConfig, PublisherConfig};
use netlog_core::envelope::{RAW, UNKNOWN};
use netlog_core::error::{NetlogError, PipelineError};
use netlog_core::pipeline::{HealthStatus, Pipeline};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupWindow;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::fanout::{FanoutBus, FanoutReceiver};
use crate::filter::any_publisher_admits;
use crate::listener::Listener;
use crate::pattern::{DeviceTables, FunctionRegistry, PatternCompiler};
use crate::profile::{ProfileLoader, ProfileSet};
use crate::publisher::Publisher;
use crate::transport::{Transport, TransportFactory};
use crate::worker::{DeviceWorker, shared_queue};

/// 감시 루프가 단위를 확인하는 주기
pub const LIVENESS_INTERVAL: Duration = Duration::from_millis(250);

/// 정지 시 단위 종료를 기다리는 최대 시간
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 엔진 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 감시 대상 실행 단위
struct Unit {
    name: String,
    handle: JoinHandle<Result<(), EngineError>>,
}

/// 실행 중 죽은 단위
#[derive(Debug, Clone)]
struct Failure {
    unit: String,
    reason: String,
}

/// netlog 엔진
///
/// # 사용 예시
/// ```ignore
/// use netlog_pipeline::EngineBuilder;
///
/// let mut engine = EngineBuilder::new().config(config).build().await?;
/// engine.start().await?;
/// engine.wait().await;
/// engine.stop().await?;
/// ```
pub struct Engine {
    config: NetlogConfig,
    state: EngineState,
    tables: Vec<Arc<DeviceTables>>,
    codec: Codec,
    fanout: FanoutBus,
    transports: HashMap<String, TransportFactory>,
    keys: Option<Arc<KeyMaterial>>,
    liveness_interval: Duration,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
    failure: Arc<Mutex<Option<Failure>>>,
    listener_addrs: Vec<SocketAddr>,
    auth_addr: Option<SocketAddr>,
}

impl Engine {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            EngineState::Initialized => "initialized",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        }
    }

    /// 로드된 장비 OS 이름 (디스패치 순서)
    pub fn devices(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.os.as_str()).collect()
    }

    /// 바인드된 리스너 주소 (설정 순서)
    pub fn listener_addrs(&self) -> &[SocketAddr] {
        &self.listener_addrs
    }

    /// 키 교환 서버 주소 (보안이 꺼져 있으면 `None`)
    pub fn auth_addr(&self) -> Option<SocketAddr> {
        self.auth_addr
    }

    /// 보안 키 자료 (보안이 꺼져 있거나 시작 전이면 `None`)
    pub fn keys(&self) -> Option<Arc<KeyMaterial>> {
        self.keys.clone()
    }

    /// 프로세스 내부 구독자를 붙입니다. 필터 없이 모든 엔벨로프를 받습니다.
    ///
    /// 구독자 큐도 `engine.hwm` 크기이며, 읽지 않고 쌓아 두면 워커가 멈춥니다.
    /// 더 이상 읽지 않을 구독자는 버려야 합니다.
    pub fn subscribe(&self, name: &str) -> FanoutReceiver {
        self.fanout.subscribe(name)
    }

    /// 엔진이 멈출 때까지 기다립니다 (정지 요청 또는 단위 사망).
    pub async fn wait(&self) {
        self.cancel.cancelled().await;
    }

    /// 실행 중 죽은 단위가 있으면 그 에러를 돌려줍니다.
    pub fn failure(&self) -> Option<PipelineError> {
        self.failure.lock().as_ref().map(|f| PipelineError::UnitExited {
            unit: f.unit.clone(),
            reason: f.reason.clone(),
        })
    }

    async fn launch(&mut self) -> Result<(), EngineError> {
        let cancel = CancellationToken::new();
        let hwm = self.config.engine.hwm;

        // 바인드가 필요한 것부터: 실패하면 아무 단위도 뜨지 않습니다.
        let auth = if self.config.auth.disable_security {
            tracing::warn!("security disabled, envelopes are published in clear text");
            self.keys = None;
            None
        } else {
            let keys = self
                .keys
                .get_or_insert_with(|| Arc::new(KeyMaterial::generate()))
                .clone();
            let tls = netlog_auth::tls::server_config(
                &self.config.auth.certificate,
                &self.config.auth.keyfile,
            )?;
            let server =
                AuthServer::bind(AuthServerConfig::from(&self.config.auth), tls, keys).await?;
            self.auth_addr = Some(server.local_addr()?);
            Some(server)
        };

        let mut listeners = Vec::with_capacity(self.config.listeners.len());
        for config in &self.config.listeners {
            listeners.push(Listener::bind(config).await?);
        }
        self.listener_addrs = listeners.iter().map(Listener::local_addr).collect();

        let dedup = DedupWindow::from_config(&self.config.engine.dedup).await?;

        let mut publishers = Vec::with_capacity(self.config.publishers.len());
        for config in &self.config.publishers {
            let publisher = match self.transports.get(&config.name) {
                Some(factory) => {
                    Publisher::with_transport(config, self.codec, self.keys.clone(), factory(config))?
                }
                None => Publisher::new(config, self.codec, self.keys.clone())?,
            };
            publishers.push(publisher);
        }

        // 단위 생성
        let mut units = Vec::new();
        let mut spawn = |name: String, fut: UnitFuture| {
            tracing::debug!(unit = %name, "spawning unit");
            units.push(Unit {
                name,
                handle: tokio::spawn(fut),
            });
        };

        for publisher in publishers {
            let rx = self.fanout.subscribe(publisher.name());
            spawn(
                format!("publisher:{}", publisher.name()),
                Box::pin(publisher.run(rx, cancel.clone())),
            );
        }

        let forward_raw = any_publisher_admits(&self.config.publishers, RAW);
        let mut dispatcher = Dispatcher::new(self.tables.clone(), self.fanout.clone())
            .dedup(dedup.clone())
            .forward_unknown(any_publisher_admits(&self.config.publishers, UNKNOWN));
        let replicas = self.config.engine.device_worker_processes.max(1);
        for tables in &self.tables {
            let (tx, rx) = mpsc::channel(hwm);
            dispatcher = dispatcher.route(tables.os.clone(), tx);
            let queue = shared_queue(rx);
            let worker = DeviceWorker::new(tables.clone(), self.config.engine.delimiter.clone())
                .forward_raw(forward_raw);
            for replica in 0..replicas {
                spawn(
                    format!("device:{}:{replica}", tables.os),
                    Box::pin(worker.clone().run(
                        replica,
                        queue.clone(),
                        self.fanout.clone(),
                        cancel.clone(),
                    )),
                );
            }
        }

        let (raw_tx, raw_rx) = mpsc::channel(hwm);
        spawn("dispatcher".to_owned(), Box::pin(dispatcher.run(raw_rx, cancel.clone())));

        for (listener, addr) in listeners.into_iter().zip(&self.listener_addrs) {
            spawn(
                format!("listener:{}:{addr}", listener.kind()),
                Box::pin(listener.run(raw_tx.clone(), cancel.clone())),
            );
        }
        drop(raw_tx);

        if let Some(window) = dedup {
            let token = cancel.clone();
            spawn(
                "dedup-sweeper".to_owned(),
                Box::pin(async move {
                    window.run_sweeper(token).await;
                    Ok(())
                }),
            );
        }

        if let Some(server) = auth {
            let token = cancel.clone();
            spawn(
                "auth".to_owned(),
                Box::pin(async move { server.run(token).await.map_err(EngineError::from) }),
            );
        }

        let unit_count = units.len();
        self.supervisor = Some(tokio::spawn(supervise(
            units,
            cancel.clone(),
            self.failure.clone(),
            self.liveness_interval,
        )));
        self.cancel = cancel;

        tracing::info!(
            devices = self.tables.len(),
            units = unit_count,
            listeners = self.listener_addrs.len(),
            publishers = self.config.publishers.len(),
            secure = self.keys.is_some(),
            "engine started"
        );
        Ok(())
    }
}

type UnitFuture = std::pin::Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>;

/// 감시 루프: 실행 중에 끝난 단위가 생기면 모두 취소하고 정리합니다.
async fn supervise(
    mut units: Vec<Unit>,
    cancel: CancellationToken,
    failure: Arc<Mutex<Option<Failure>>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(pos) = units.iter().position(|u| u.handle.is_finished()) else {
                    continue;
                };
                let unit = units.swap_remove(pos);
                let reason = match unit.handle.await {
                    Ok(Ok(())) => "exited".to_owned(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => format!("task failed: {e}"),
                };
                tracing::error!(unit = %unit.name, reason = %reason, "unit exited while running, tearing down engine");
                *failure.lock() = Some(Failure {
                    unit: unit.name,
                    reason,
                });
                cancel.cancel();
                break;
            }
        }
    }

    let deadline = tokio::time::Instant::now() + SHUTDOWN_TIMEOUT;
    for unit in units {
        let Unit { name, mut handle } = unit;
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(Ok(()))) => tracing::debug!(unit = %name, "unit stopped"),
            Ok(Ok(Err(e))) => tracing::warn!(unit = %name, error = %e, "unit stopped with error"),
            Ok(Err(e)) => tracing::warn!(unit = %name, error = %e, "unit task failed"),
            Err(_) => {
                tracing::warn!(unit = %name, "unit did not stop in time, aborting");
                handle.abort();
            }
        }
    }
}

impl Pipeline for Engine {
    async fn start(&mut self) -> Result<(), NetlogError> {
        if self.state == EngineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        tracing::info!("starting engine");
        *self.failure.lock() = None;
        self.launch().await?;
        self.state = EngineState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), NetlogError> {
        if self.state != EngineState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        tracing::info!("stopping engine");
        self.cancel.cancel();
        if let Some(supervisor) = self.supervisor.take()
            && let Err(e) = supervisor.await
        {
            tracing::error!(error = %e, "supervisor task failed");
        }
        self.state = EngineState::Stopped;
        tracing::info!("engine stopped");

        match self.failure() {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    async fn health_check(&self) -> HealthStatus {
        if let Some(failure) = self.failure.lock().as_ref() {
            return HealthStatus::Unhealthy(format!(
                "unit '{}' exited: {}",
                failure.unit, failure.reason
            ));
        }
        match self.state {
            EngineState::Running => {
                let expected = self.config.publishers.len();
                let attached = self.fanout.receiver_count();
                if attached < expected {
                    HealthStatus::Degraded(format!(
                        "{attached} of {expected} publishers attached"
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            EngineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            EngineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("devices", &self.devices())
            .field("codec", &self.codec)
            .field("secure", &self.keys.is_some())
            .finish()
    }
}

/// 엔진 빌더
///
/// 설정을 검증하고 프로파일을 로드/컴파일합니다. 소켓 바인드는 `start` 에서 합니다.
pub struct EngineBuilder {
    config: NetlogConfig,
    registry: FunctionRegistry,
    profiles: Option<ProfileSet>,
    transports: HashMap<String, TransportFactory>,
    liveness_interval: Duration,
}

impl EngineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: NetlogConfig::default(),
            registry: FunctionRegistry::default(),
            profiles: None,
            transports: HashMap::new(),
            liveness_interval: LIVENESS_INTERVAL,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: NetlogConfig) -> Self {
        self.config = config;
        self
    }

    /// 사용자 정의 함수 등록소를 지정합니다. 기본값은 내장 함수만 등록된 등록소입니다.
    pub fn registry(mut self, registry: FunctionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// 디렉토리 대신 이미 로드된 프로파일을 씁니다.
    pub fn profiles(mut self, profiles: ProfileSet) -> Self {
        self.profiles = Some(profiles);
        self
    }

    /// 이름이 `publisher` 인 발행자의 전송을 직접 만듭니다.
    ///
    /// 설정의 `transport` 대신 쓰이며, 엔진이 시작될 때마다 새로 호출됩니다.
    pub fn publisher_transport<F>(mut self, publisher: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&PublisherConfig) -> Box<dyn Transport> + Send + Sync + 'static,
    {
        self.transports.insert(publisher.into(), Arc::new(factory));
        self
    }

    /// 감시 주기를 지정합니다.
    pub fn liveness_interval(mut self, interval: Duration) -> Self {
        self.liveness_interval = interval;
        self
    }

    /// 엔진을 빌드합니다.
    ///
    /// 컴파일에 성공한 OS 가 하나도 없으면 [`EngineError::NoProfiles`].
    pub async fn build(self) -> Result<Engine, EngineError> {
        self.config
            .validate()
            .map_err(|e| EngineError::Config {
                field: "config".to_owned(),
                reason: e.to_string(),
            })?;
        let codec = self.config.engine.serializer.parse::<Codec>()?;

        let profiles = match self.profiles {
            Some(profiles) => profiles,
            None => ProfileLoader::from_config(&self.config.engine).load().await?,
        };
        let mut registry = FunctionRegistry::with_builtins()?;
        registry.extend(self.registry);
        let tables = PatternCompiler::new(Arc::new(registry)).compile_all(&profiles);
        if tables.is_empty() {
            return Err(EngineError::NoProfiles {
                dir: self.config.engine.profiles_dir.clone(),
            });
        }

        let fanout = FanoutBus::new(self.config.engine.hwm);
        Ok(Engine {
            config: self.config,
            state: EngineState::Initialized,
            tables,
            codec,
            fanout,
            transports: self.transports,
            keys: None,
            liveness_interval: self.liveness_interval,
            cancel: CancellationToken::new(),
            supervisor: None,
            failure: Arc::new(Mutex::new(None)),
            listener_addrs: Vec::new(),
            auth_addr: None,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
