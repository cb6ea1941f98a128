//! 디스패처 -- 헤더로 장비 OS 를 식별하고 OS 별 큐로 보냅니다.
//!
//! ```text
//! RawMessage ─▶ identify ─┬─▶ (os 식별) dedup ─▶ OS 큐 ─▶ DeviceWorker
//!                         └─▶ (식별 실패) UNKNOWN ─▶ FanoutBus
//! ```
//!
//! OS 는 이름 순서로 시도하고, OS 하나 안에서는 첫 번째로 일치한 프리픽스를
//! 씁니다. 여러 OS 에 일치하면 각 OS 가 사본을 받습니다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use netlog_core::envelope::{Envelope, MessageDetails};
use netlog_core::metrics as m;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dedup::DedupWindow;
use crate::error::EngineError;
use crate::fanout::FanoutBus;
use crate::message::{PrefixMatch, RawMessage, value_to_string};
use crate::pattern::DeviceTables;

/// 헤더 식별 + 라우팅 단계
pub struct Dispatcher {
    tables: Vec<Arc<DeviceTables>>,
    queues: HashMap<String, mpsc::Sender<PrefixMatch>>,
    dedup: Option<DedupWindow>,
    fanout: FanoutBus,
    forward_unknown: bool,
}

impl Dispatcher {
    /// 컴파일된 테이블과 팬아웃 버스로 디스패처를 만듭니다.
    pub fn new(tables: Vec<Arc<DeviceTables>>, fanout: FanoutBus) -> Self {
        Self {
            tables,
            queues: HashMap::new(),
            dedup: None,
            fanout,
            forward_unknown: false,
        }
    }

    /// OS 워커 큐를 등록합니다.
    pub fn route(mut self, os: impl Into<String>, queue: mpsc::Sender<PrefixMatch>) -> Self {
        self.queues.insert(os.into(), queue);
        self
    }

    /// 중복 제거 창을 설정합니다.
    pub fn dedup(mut self, window: Option<DedupWindow>) -> Self {
        self.dedup = window;
        self
    }

    /// 식별 실패 메시지를 UNKNOWN 으로 내보낼지
    pub fn forward_unknown(mut self, enabled: bool) -> Self {
        self.forward_unknown = enabled;
        self
    }

    /// 식별 대상 OS 이름 (시도 순서)
    pub fn os_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.os.as_str())
    }

    /// 라인 하나를 식별합니다.
    ///
    /// 일치한 OS 마다 하나씩 돌려주며, 아무 OS 에도 일치하지 않으면
    /// `os == None` 인 항목 하나를 돌려줍니다.
    pub fn identify(&self, text: &str, source: &str) -> Vec<PrefixMatch> {
        let mut out = Vec::new();
        for tables in &self.tables {
            let found = tables
                .prefixes
                .iter()
                .enumerate()
                .find_map(|(id, prefix)| prefix.extract(text).map(|fields| (id, fields)));
            let Some((prefix_id, fields)) = found else {
                tracing::trace!(os = %tables.os, "no prefix matched");
                continue;
            };
            out.push(header(&tables.os, prefix_id, fields, source));
        }
        if out.is_empty() {
            out.push(PrefixMatch::unidentified(text, source));
        }
        out
    }

    /// 원시 메시지 하나를 처리합니다.
    pub async fn dispatch(&self, raw: RawMessage) {
        metrics::counter!(m::DISPATCHER_MESSAGES_RECEIVED_TOTAL).increment(1);
        let text = raw.text();
        let matches = self.identify(&text, &raw.source);
        if matches.len() > 1 {
            metrics::counter!(m::DISPATCHER_MULTI_MATCH_TOTAL).increment(1);
        }

        for header in matches {
            match header.os.clone() {
                Some(os) => self.route_to_worker(os, header).await,
                None => self.handle_unknown(header).await,
            }
        }
    }

    async fn route_to_worker(&self, os: String, header: PrefixMatch) {
        let Some(queue) = self.queues.get(&os).filter(|q| !q.is_closed()) else {
            tracing::error!(os = %os, "unable to queue message, no worker running for this OS");
            metrics::counter!(m::DISPATCHER_FAILED_QUEUING_TOTAL, m::LABEL_DEVICE_OS => os)
                .increment(1);
            return;
        };
        metrics::counter!(m::DISPATCHER_IDENTIFIED_TOTAL, m::LABEL_DEVICE_OS => os.clone())
            .increment(1);

        if let Some(dedup) = &self.dedup
            && dedup.seen(&os, &header.host(), header.body()).await
        {
            tracing::info!(os = %os, message = header.body(), "message already buffered, skipping");
            metrics::counter!(m::DISPATCHER_SKIPPED_TOTAL, m::LABEL_DEVICE_OS => os).increment(1);
            return;
        }

        if queue.send(header).await.is_err() {
            tracing::error!(os = %os, "unable to queue message, worker queue closed");
            metrics::counter!(m::DISPATCHER_FAILED_QUEUING_TOTAL, m::LABEL_DEVICE_OS => os)
                .increment(1);
            return;
        }
        metrics::counter!(m::DISPATCHER_QUEUED_TOTAL, m::LABEL_DEVICE_OS => os).increment(1);
    }

    async fn handle_unknown(&self, header: PrefixMatch) {
        metrics::counter!(m::DISPATCHER_UNKNOWN_TOTAL).increment(1);
        if !self.forward_unknown {
            tracing::debug!(source = %header.source, "dropping message from unidentified device");
            return;
        }
        let envelope = Envelope::unknown(header.source, header.fields, Utc::now().timestamp());
        self.fanout.publish(envelope).await;
    }

    /// 입력 채널이 닫히거나 취소될 때까지 디스패치합니다.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<RawMessage>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        tracing::info!(
            devices = self.tables.len(),
            forward_unknown = self.forward_unknown,
            dedup = self.dedup.is_some(),
            "dispatcher started"
        );
        loop {
            let raw = tokio::select! {
                raw = rx.recv() => raw,
                _ = cancel.cancelled() => break,
            };
            let Some(raw) = raw else {
                if cancel.is_cancelled() {
                    break;
                }
                return Err(EngineError::Channel("listener channel closed".to_owned()));
            };
            // 워커 큐나 발행자 큐가 가득 차 기다리는 중에도 취소를 따릅니다.
            tokio::select! {
                _ = self.dispatch(raw) => {}
                _ = cancel.cancelled() => break,
            }
        }
        tracing::info!("dispatcher stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("devices", &self.os_names().collect::<Vec<_>>())
            .field("routes", &self.queues.len())
            .field("dedup", &self.dedup)
            .field("forward_unknown", &self.forward_unknown)
            .finish()
    }
}

/// 추출한 헤더 필드를 다듬어 [`PrefixMatch`] 로 만듭니다.
fn header(os: &str, prefix_id: usize, mut fields: MessageDetails, source: &str) -> PrefixMatch {
    let body = fields
        .get("message")
        .and_then(value_to_string)
        .unwrap_or_default();
    fields.insert("message".to_owned(), Value::String(body.trim().to_owned()));

    if let Some(pri) = fields
        .get("pri")
        .and_then(value_to_string)
        .and_then(|p| p.parse::<u32>().ok())
    {
        fields.insert("facility".to_owned(), (pri / 8).into());
        fields.insert("severity".to_owned(), (pri % 8).into());
    }

    let timestamp = fields.get("timestamp").and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    PrefixMatch {
        os: Some(os.to_owned()),
        prefix_id,
        fields,
        source: source.to_owned(),
        timestamp,
    }
}
