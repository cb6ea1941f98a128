//! 장비 워커 -- OS 하나의 메시지 테이블로 본문을 분류하고 엔벨로프를 만듭니다.
//!
//! 같은 OS 의 복제본들은 하나의 큐를 나눠 씁니다 ([`SharedQueue`]).
//! 메시지 하나의 매핑/함수 실패는 로그와 메트릭만 남기고 버려지며,
//! 워커는 계속 동작합니다.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use netlog_core::envelope::Envelope;
use netlog_core::metrics as m;
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::emit;
use crate::error::EngineError;
use crate::fanout::FanoutBus;
use crate::message::PrefixMatch;
use crate::pattern::{DeviceTables, MessageExtractor, MessagePattern};
use crate::timestamp;

/// 복제본들이 나눠 쓰는 OS 큐
pub type SharedQueue = Arc<Mutex<mpsc::Receiver<PrefixMatch>>>;

/// 큐 수신 측을 복제본용으로 감쌉니다.
pub fn shared_queue(rx: mpsc::Receiver<PrefixMatch>) -> SharedQueue {
    Arc::new(Mutex::new(rx))
}

/// 분류 결과
struct Classified<'a> {
    entry: &'a MessagePattern,
    object: Value,
}

/// OS 하나의 워커
#[derive(Debug, Clone)]
pub struct DeviceWorker {
    tables: Arc<DeviceTables>,
    delimiter: String,
    forward_raw: bool,
}

impl DeviceWorker {
    /// 컴파일된 테이블로 워커를 만듭니다.
    pub fn new(tables: Arc<DeviceTables>, delimiter: impl Into<String>) -> Self {
        Self {
            tables,
            delimiter: delimiter.into(),
            forward_raw: false,
        }
    }

    /// 분류하지 못한 메시지를 RAW 로 내보낼지
    pub fn forward_raw(mut self, enabled: bool) -> Self {
        self.forward_raw = enabled;
        self
    }

    /// 담당 OS
    pub fn os(&self) -> &str {
        &self.tables.os
    }

    /// 헤더 하나를 엔벨로프로 만듭니다.
    ///
    /// 분류하지 못했고 RAW 전달이 꺼져 있으면 `Ok(None)`.
    pub fn process(&self, header: &PrefixMatch) -> Result<Option<Envelope>, EngineError> {
        self.process_at(header, Utc::now())
    }

    /// 기준 시각을 지정해 처리합니다.
    pub fn process_at(
        &self,
        header: &PrefixMatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Envelope>, EngineError> {
        let classified = self.classify(header)?;

        let time_format = self
            .tables
            .prefixes
            .get(header.prefix_id)
            .and_then(|p| p.time_format.as_deref());
        let mut details = header.fields.clone();
        let ts = timestamp::resolve(&mut details, time_format, now);

        let Some(Classified { entry, object }) = classified else {
            if !self.forward_raw {
                return Ok(None);
            }
            metrics::counter!(m::DEVICE_RAW_PUBLISHED_TOTAL, m::LABEL_DEVICE_OS => self.os().to_owned())
                .increment(1);
            let envelope = Envelope::raw(self.os(), header.host(), &header.source, ts, details)
                .with_priority(header.facility(), header.severity());
            return Ok(Some(envelope));
        };

        let mut envelope = Envelope::raw(self.os(), header.host(), &header.source, ts, details)
            .with_priority(header.facility(), header.severity());
        envelope.error = entry.error.clone();
        envelope.yang_model = entry.model.clone();
        envelope.yang_message = Some(object);
        if entry.state.is_some() {
            envelope.state = entry.state.clone();
            envelope.state_tag = entry.state_tag.clone();
        }
        Ok(Some(envelope))
    }

    fn classify<'a>(&'a self, header: &PrefixMatch) -> Result<Option<Classified<'a>>, EngineError> {
        let mut error_present = false;

        for entry in &self.tables.messages {
            if header.field(&entry.match_on).as_deref() != Some(entry.tag.as_str()) {
                continue;
            }
            match &entry.extractor {
                MessageExtractor::Function { name, function } => {
                    tracing::debug!(os = %self.os(), function = %name, "using custom message function");
                    let object = function
                        .emit(header)
                        .map_err(|e| mapping_error(entry, e.to_string()))?;
                    return Ok(Some(Classified { entry, object }));
                }
                MessageExtractor::Template { template, mapping } => {
                    let Some(fields) = template.extract(header.body()) else {
                        error_present = true;
                        continue;
                    };
                    let object = emit::build_object(mapping, &fields, &self.delimiter)
                        .map_err(|e| mapping_error(entry, e.to_string()))?;
                    return Ok(Some(Classified { entry, object }));
                }
            }
        }

        if error_present {
            tracing::info!(os = %self.os(), tag = ?header.field("tag"), "configured regex did not match for the message");
        } else {
            tracing::debug!(os = %self.os(), tag = ?header.field("tag"), "message not configured for this tag");
        }
        Ok(None)
    }

    /// 큐가 닫히거나 취소될 때까지 처리하고 결과를 버스로 내보냅니다.
    ///
    /// 버스가 가득 차면 자리가 날 때까지 다음 헤더를 꺼내지 않습니다.
    pub async fn run(
        self,
        replica: usize,
        queue: SharedQueue,
        fanout: FanoutBus,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        tracing::info!(os = %self.os(), replica, forward_raw = self.forward_raw, "device worker started");
        loop {
            let next = tokio::select! {
                next = async { queue.lock().await.recv().await } => next,
                _ = cancel.cancelled() => break,
            };
            let Some(header) = next else {
                if cancel.is_cancelled() {
                    break;
                }
                return Err(EngineError::Channel(format!("{} worker queue closed", self.os())));
            };
            // 발행자 큐가 가득 차 기다리는 중에도 취소를 따릅니다.
            tokio::select! {
                _ = self.handle(&header, &fanout) => {}
                _ = cancel.cancelled() => break,
            }
        }
        tracing::info!(os = %self.os(), replica, "device worker stopped");
        Ok(())
    }

    async fn handle(&self, header: &PrefixMatch, fanout: &FanoutBus) {
        let os = self.os().to_owned();
        metrics::counter!(m::DEVICE_MESSAGES_RECEIVED_TOTAL, m::LABEL_DEVICE_OS => os.clone())
            .increment(1);
        let started = Instant::now();

        match self.process(header) {
            Ok(Some(envelope)) => {
                let classified = !envelope.is_raw();
                fanout.publish(envelope).await;
                if classified {
                    metrics::counter!(m::DEVICE_MESSAGES_PUBLISHED_TOTAL, m::LABEL_DEVICE_OS => os.clone())
                        .increment(1);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(os = %os, error = %e, "failed to build structured object, message dropped");
                metrics::counter!(m::DEVICE_FAILED_TOTAL, m::LABEL_DEVICE_OS => os.clone()).increment(1);
            }
        }

        metrics::histogram!(m::DEVICE_PROCESSING_DURATION_SECONDS, m::LABEL_DEVICE_OS => os)
            .record(started.elapsed().as_secs_f64());
    }
}

fn mapping_error(entry: &MessagePattern, reason: String) -> EngineError {
    EngineError::Mapping {
        os: entry.origin.os.clone(),
        tag: entry.tag.clone(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use netlog_core::envelope::MessageDetails;
    use serde_json::json;

    use super::*;
    use crate::pattern::{FunctionRegistry, PatternCompiler};
    use crate::profile::ProfileLoader;

    const PROFILE: &str = r#"
prefixes:
  - values:
      date: '(\w+\s+\d+)'
      time: '(\d\d:\d\d:\d\d)'
      host: '([^ ]+)'
      tag: '(\w+)'
    line: '{date} {time} {host} {tag}: '
messages:
  - error: INTERFACE_DOWN
    tag: LINK_DOWN
    values:
      interface: '(\S+)'
    line: 'Interface {interface} down'
    model: openconfig-interfaces
    mapping:
      variables:
        interfaces//interface//{interface}//state//name: interface
      static:
        interfaces//interface//{interface}//state//oper_status: DOWN
  - error: BROKEN_MAPPING
    tag: BROKEN
    values:
      peer: '(\S+)'
    line: 'peer {peer}'
    model: openconfig-bgp
    mapping:
      variables:
        bgp//neighbors//{peer}//as: missing_field
      static: {}
  - error: ADMIN_STATE
    tag: STATE
    values:
      interface: '(\S+)'
    line: 'Interface {interface} disabled'
    model: openconfig-interfaces
    mapping:
      variables: {}
      static:
        interfaces//interface//{interface}//enabled: false
    state: 0
    state_tag: admin
"#;

    fn tables() -> Arc<DeviceTables> {
        let tree = ProfileLoader::parse_yaml(PROFILE, "init.yml").unwrap();
        let profile = ProfileLoader::build_profile("eos", tree).unwrap().unwrap();
        let compiler = PatternCompiler::new(Arc::new(FunctionRegistry::new()));
        Arc::new(compiler.compile("eos", &profile).unwrap())
    }

    fn header(tag: &str, body: &str) -> PrefixMatch {
        let mut fields = MessageDetails::new();
        fields.insert("tag".to_owned(), tag.into());
        fields.insert("host".to_owned(), "sw1".into());
        fields.insert("message".to_owned(), body.into());
        fields.insert("date".to_owned(), "Mar 30".into());
        fields.insert("time".to_owned(), "12:45:19".into());
        fields.insert("facility".to_owned(), 23.into());
        fields.insert("severity".to_owned(), 3.into());
        PrefixMatch {
            os: Some("eos".to_owned()),
            prefix_id: 0,
            fields,
            source: "10.1.1.1".to_owned(),
            timestamp: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn builds_structured_envelope() {
        let worker = DeviceWorker::new(tables(), "//");
        let env = worker
            .process_at(&header("LINK_DOWN", "Interface Et1 down"), now())
            .unwrap()
            .unwrap();
        assert_eq!(env.error, "INTERFACE_DOWN");
        assert_eq!(env.os, "eos");
        assert_eq!(env.host, "sw1");
        assert_eq!(env.ip, "10.1.1.1");
        assert_eq!(env.yang_model, "openconfig-interfaces");
        assert_eq!(env.facility, Some(23));
        assert_eq!(env.severity, Some(3));
        assert_eq!(
            env.yang_message,
            Some(json!({"interfaces": {"interface": {"Et1": {"state": {"name": "Et1", "oper_status": "DOWN"}}}}}))
        );
        assert_eq!(env.timestamp, Utc.with_ymd_and_hms(2024, 3, 30, 12, 45, 19).unwrap().timestamp());
        assert_eq!(env.message_details["message"], "Interface Et1 down");
        assert!(env.state.is_none());
    }

    #[test]
    fn unconfigured_tag_is_dropped_without_raw() {
        let worker = DeviceWorker::new(tables(), "//");
        assert!(worker.process_at(&header("OTHER", "whatever"), now()).unwrap().is_none());
    }

    #[test]
    fn unparseable_body_becomes_raw_when_enabled() {
        let worker = DeviceWorker::new(tables(), "//").forward_raw(true);
        let env = worker
            .process_at(&header("LINK_DOWN", "something unexpected"), now())
            .unwrap()
            .unwrap();
        assert!(env.is_raw());
        assert_eq!(env.yang_model, "raw");
        assert!(env.yang_message.is_none());
        assert_eq!(env.message_details["tag"], "LINK_DOWN");
        assert_eq!(env.severity, Some(3));
    }

    #[test]
    fn state_is_copied_from_entry() {
        let worker = DeviceWorker::new(tables(), "//");
        let env = worker
            .process_at(&header("STATE", "Interface Et2 disabled"), now())
            .unwrap()
            .unwrap();
        assert_eq!(env.state, Some(json!(0)));
        assert_eq!(env.state_tag.as_deref(), Some("admin"));
    }

    #[test]
    fn match_on_selects_header_field() {
        let yaml = r#"
prefixes:
  - values: {host: '(\S+)', tag: '(\w+)', process: '(\w+)'}
    line: '{host} {process} {tag}: '
messages:
  - error: BY_PROCESS
    tag: rpd
    match_on: process
    values: {}
    line: 'hello'
    model: NO_MODEL
    mapping: {variables: {}, static: {}}
"#;
        let tree = ProfileLoader::parse_yaml(yaml, "init.yml").unwrap();
        let profile = ProfileLoader::build_profile("junos", tree).unwrap().unwrap();
        let tables = PatternCompiler::default().compile("junos", &profile).unwrap();
        let worker = DeviceWorker::new(Arc::new(tables), "//");

        let mut h = header("SOMETHING", "hello");
        h.fields.insert("process".to_owned(), "rpd".into());
        let env = worker.process_at(&h, now()).unwrap().unwrap();
        assert_eq!(env.error, "BY_PROCESS");
    }

    #[test]
    fn custom_function_output_is_the_object() {
        let mut registry = FunctionRegistry::new();
        registry.register_message(
            "echo_host",
            |h: &PrefixMatch| -> Result<Value, crate::pattern::FunctionError> {
                Ok(json!({"host": h.host()}))
            },
        );
        let yaml = r#"
prefixes:
  - values: {tag: '(\w+)'}
    line: '{tag}: '
messages:
  - error: ECHO
    tag: LINK_DOWN
    function: echo_host
"#;
        let tree = ProfileLoader::parse_yaml(yaml, "init.yml").unwrap();
        let profile = ProfileLoader::build_profile("eos", tree).unwrap().unwrap();
        let tables = PatternCompiler::new(Arc::new(registry)).compile("eos", &profile).unwrap();
        let worker = DeviceWorker::new(Arc::new(tables), "//");
        let env = worker.process_at(&header("LINK_DOWN", "x"), now()).unwrap().unwrap();
        assert_eq!(env.error, "ECHO");
        assert_eq!(env.yang_message, Some(json!({"host": "sw1"})));
    }

    #[test]
    fn mapping_failure_names_os_and_tag() {
        let worker = DeviceWorker::new(tables(), "//");
        let err = worker.process_at(&header("BROKEN", "peer 10.0.0.1"), now()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Mapping { ref os, ref tag, .. } if os == "eos" && tag == "BROKEN"
        ));
    }

    #[tokio::test]
    async fn worker_survives_mapping_failure() {
        let (tx, rx) = mpsc::channel(8);
        let bus = FanoutBus::new(8);
        let mut sub = bus.subscribe("test");
        let cancel = CancellationToken::new();

        let worker = DeviceWorker::new(tables(), "//");
        let handle = tokio::spawn(worker.run(0, shared_queue(rx), bus.clone(), cancel.clone()));

        tx.send(header("BROKEN", "peer 10.0.0.1")).await.unwrap();
        tx.send(header("LINK_DOWN", "Interface Et7 down")).await.unwrap();

        let env = sub.recv().await.unwrap();
        assert_eq!(env.error, "INTERFACE_DOWN");

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn full_bus_stalls_worker_until_drained() {
        let (tx, rx) = mpsc::channel(1);
        let bus = FanoutBus::new(1);
        let mut sub = bus.subscribe("slow");
        let cancel = CancellationToken::new();
        let worker = DeviceWorker::new(tables(), "//");
        let handle = tokio::spawn(worker.run(0, shared_queue(rx), bus.clone(), cancel.clone()));

        // 버스에 하나, 워커가 들고 하나, 큐에 하나
        for i in 0..3 {
            tx.send(header("LINK_DOWN", &format!("Interface Et{i} down"))).await.unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(tx.try_send(header("LINK_DOWN", "Interface Et3 down")).is_err());

        for i in 0..3 {
            let env = sub.recv().await.unwrap();
            assert_eq!(env.message_details["message"], format!("Interface Et{i} down"));
        }

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn replicas_share_one_queue() {
        let (tx, rx) = mpsc::channel(8);
        let queue = shared_queue(rx);
        let bus = FanoutBus::new(16);
        let mut sub = bus.subscribe("test");
        let cancel = CancellationToken::new();

        let worker = DeviceWorker::new(tables(), "//");
        let handles: Vec<_> = (0..3)
            .map(|replica| {
                tokio::spawn(worker.clone().run(replica, queue.clone(), bus.clone(), cancel.clone()))
            })
            .collect();

        for i in 0..6 {
            tx.send(header("LINK_DOWN", &format!("Interface Et{i} down"))).await.unwrap();
        }
        let mut seen = 0;
        while seen < 6 {
            sub.recv().await.unwrap();
            seen += 1;
        }

        cancel.cancel();
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
    }
}
