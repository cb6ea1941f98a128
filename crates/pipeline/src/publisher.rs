//! 발행자 -- 필터, 직렬화, 암호화, 전송
//!
//! ```text
//! FanoutBus ──▶ filter(error) ──▶ strip? ──▶ Codec ──▶ seal? ──▶ Transport
//! ```
//!
//! 발행자끼리는 서로 독립입니다. 한 엔벨로프의 직렬화/전송 실패는 로그와
//! 메트릭만 남기고 다음 엔벨로프로 넘어갑니다.

use std::sync::Arc;

use netlog_auth::{Codec, KeyMaterial};
use netlog_core::config::PublisherConfig;
use netlog_core::envelope::Envelope;
use netlog_core::metrics as m;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::fanout::FanoutReceiver;
use crate::filter::ListFilter;
use crate::transport::{Transport, build_transport};

/// 발행자 하나
pub struct Publisher {
    name: String,
    filter: ListFilter,
    strip_message_details: bool,
    codec: Codec,
    keys: Option<Arc<KeyMaterial>>,
    transport: Box<dyn Transport>,
}

impl Publisher {
    /// 설정으로 발행자를 만듭니다.
    ///
    /// `keys` 가 `None` 이면 보안이 꺼진 것입니다. `default_codec` 은
    /// 발행자가 직렬화 방식을 지정하지 않았을 때 씁니다.
    pub fn new(
        config: &PublisherConfig,
        default_codec: Codec,
        keys: Option<Arc<KeyMaterial>>,
    ) -> Result<Self, EngineError> {
        let transport = build_transport(config)?;
        Self::with_transport(config, default_codec, keys, transport)
    }

    /// 전송을 직접 지정해 발행자를 만듭니다.
    pub fn with_transport(
        config: &PublisherConfig,
        default_codec: Codec,
        keys: Option<Arc<KeyMaterial>>,
        transport: Box<dyn Transport>,
    ) -> Result<Self, EngineError> {
        let codec = if config.serializer.is_empty() {
            default_codec
        } else {
            config.serializer.parse::<Codec>()?
        };
        let keys = if config.disable_security || !transport.requires_encryption() {
            None
        } else {
            keys
        };
        Ok(Self {
            name: config.name.clone(),
            filter: ListFilter::for_publisher(config),
            strip_message_details: config.strip_message_details,
            codec,
            keys,
            transport,
        })
    }

    /// 발행자 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 이 발행자가 암호화해서 내보내는지
    pub fn encrypts(&self) -> bool {
        self.keys.is_some()
    }

    /// 엔벨로프를 전송할 바이트로 만듭니다. 필터에 걸리면 `None`.
    pub fn prepare(&self, envelope: &Envelope) -> Result<Option<Vec<u8>>, EngineError> {
        if !self.filter.admits(&envelope.error) {
            return Ok(None);
        }
        let encoded = if self.strip_message_details {
            self.codec.encode(&envelope.without_message_details())?
        } else {
            self.codec.encode(envelope)?
        };
        match &self.keys {
            Some(keys) => Ok(Some(keys.seal(&encoded)?)),
            None => Ok(Some(encoded)),
        }
    }

    /// 전송을 시작하고 버스가 닫히거나 취소될 때까지 발행합니다.
    pub async fn run(
        mut self,
        mut rx: FanoutReceiver,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        self.transport.start().await?;
        tracing::info!(
            publisher = %self.name,
            transport = self.transport.name(),
            serializer = %self.codec,
            encrypted = self.encrypts(),
            "publisher started"
        );

        loop {
            tokio::select! {
                envelope = rx.recv() => match envelope {
                    Some(envelope) => self.handle(&envelope).await,
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }

        self.transport.stop().await?;
        tracing::info!(publisher = %self.name, "publisher stopped");
        Ok(())
    }

    async fn handle(&mut self, envelope: &Envelope) {
        metrics::counter!(m::PUBLISHER_RECEIVED_TOTAL, m::LABEL_PUBLISHER => self.name.clone())
            .increment(1);

        let payload = match self.prepare(envelope) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tracing::debug!(publisher = %self.name, error = %envelope.error, "envelope filtered");
                metrics::counter!(m::PUBLISHER_FILTERED_TOTAL, m::LABEL_PUBLISHER => self.name.clone())
                    .increment(1);
                return;
            }
            Err(e) => {
                self.record_error(&e);
                return;
            }
        };

        match self.transport.publish(&payload).await {
            Ok(()) => {
                metrics::counter!(
                    m::PUBLISHER_PUBLISHED_TOTAL,
                    m::LABEL_PUBLISHER => self.name.clone(),
                    m::LABEL_TRANSPORT => self.transport.name()
                )
                .increment(1);
            }
            Err(e) => self.record_error(&e),
        }
    }

    fn record_error(&self, error: &EngineError) {
        tracing::error!(publisher = %self.name, error = %error, "unable to publish envelope");
        metrics::counter!(m::PUBLISHER_ERRORS_TOTAL, m::LABEL_PUBLISHER => self.name.clone())
            .increment(1);
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.name)
            .field("transport", &self.transport.name())
            .field("codec", &self.codec)
            .field("encrypted", &self.encrypts())
            .finish()
    }
}
