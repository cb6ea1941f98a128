//! 팬아웃 버스 -- 모든 워커의 엔벨로프를 모든 발행자에게
//!
//! 발행자마다 용량(HWM)만큼의 `mpsc` 큐를 하나씩 둡니다. `publish` 는
//! 구독 순서대로 모든 큐에 넣으며, 가득 찬 큐가 있으면 자리가 날 때까지
//! 기다립니다. 엔벨로프를 버리지 않으므로 느린 발행자는 워커를, 워커는
//! 디스패처를 멈춰 세웁니다.
//!
//! 수신 측을 버린 구독자는 다음 `publish` 에서 정리됩니다.

use std::sync::Arc;

use netlog_core::envelope::Envelope;
use netlog_core::metrics as m;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Debug, Clone)]
struct Subscriber {
    name: String,
    tx: mpsc::Sender<Arc<Envelope>>,
}

/// 팬아웃 버스 송신 측
#[derive(Debug, Clone)]
pub struct FanoutBus {
    capacity: usize,
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl FanoutBus {
    /// 발행자 큐 하나의 용량으로 버스를 만듭니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// 엔벨로프를 모든 구독자에게 넣습니다. 받은 구독자 수를 반환합니다.
    ///
    /// 가득 찬 큐가 있으면 그 큐에 자리가 날 때까지 돌아오지 않습니다.
    pub async fn publish(&self, envelope: Envelope) -> usize {
        let subscribers = self.subscribers.read().clone();
        if subscribers.is_empty() {
            tracing::trace!("no publisher subscribed, envelope dropped");
            return 0;
        }

        let envelope = Arc::new(envelope);
        let mut delivered = 0;
        let mut closed = false;
        for subscriber in &subscribers {
            let sent = match subscriber.tx.try_send(envelope.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(envelope)) => {
                    tracing::debug!(publisher = %subscriber.name, "publisher queue full, waiting");
                    metrics::counter!(m::PUBLISHER_BACKPRESSURE_TOTAL, m::LABEL_PUBLISHER => subscriber.name.clone())
                        .increment(1);
                    subscriber.tx.send(envelope).await.is_ok()
                }
                Err(TrySendError::Closed(_)) => false,
            };
            if sent {
                delivered += 1;
            } else {
                closed = true;
            }
        }

        if closed {
            self.subscribers.write().retain(|s| {
                let open = !s.tx.is_closed();
                if !open {
                    tracing::debug!(publisher = %s.name, "subscriber detached from fanout bus");
                }
                open
            });
        }
        delivered
    }

    /// 발행자 이름으로 구독합니다.
    pub fn subscribe(&self, publisher: impl Into<String>) -> FanoutReceiver {
        let publisher = publisher.into();
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().push(Subscriber {
            name: publisher.clone(),
            tx,
        });
        FanoutReceiver { rx, publisher }
    }

    /// 현재 붙어 있는 구독자 수
    pub fn receiver_count(&self) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|s| !s.tx.is_closed())
            .count()
    }
}

/// 발행자 한 명의 수신 측
#[derive(Debug)]
pub struct FanoutReceiver {
    rx: mpsc::Receiver<Arc<Envelope>>,
    publisher: String,
}

impl FanoutReceiver {
    /// 다음 엔벨로프. 버스가 닫히면 `None`.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }

    /// 구독한 발행자 이름
    pub fn name(&self) -> &str {
        &self.publisher
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use netlog_core::envelope::MessageDetails;
    use tokio::time::timeout;

    use super::*;

    fn envelope(n: i64) -> Envelope {
        Envelope::unknown("10.0.0.1", MessageDetails::new(), n)
    }

    #[tokio::test]
    async fn every_subscriber_sees_emission_order() {
        let bus = FanoutBus::new(16);
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");
        for n in 0..3 {
            assert_eq!(bus.publish(envelope(n)).await, 2);
        }
        for rx in [&mut a, &mut b] {
            for n in 0..3 {
                assert_eq!(rx.recv().await.unwrap().timestamp, n);
            }
        }
    }

    #[tokio::test]
    async fn full_queue_blocks_producer_without_loss() {
        let bus = FanoutBus::new(2);
        let mut rx = bus.subscribe("slow");
        let producer = tokio::spawn({
            let bus = bus.clone();
            async move {
                for n in 0..5 {
                    bus.publish(envelope(n)).await;
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(rx.recv().await.unwrap().timestamp);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        timeout(Duration::from_secs(1), producer).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn slow_subscriber_holds_back_the_others() {
        let bus = FanoutBus::new(1);
        let mut fast = bus.subscribe("fast");
        let mut slow = bus.subscribe("slow");
        let producer = tokio::spawn({
            let bus = bus.clone();
            async move {
                for n in 0..3 {
                    bus.publish(envelope(n)).await;
                }
            }
        });

        assert_eq!(fast.recv().await.unwrap().timestamp, 0);
        assert_eq!(fast.recv().await.unwrap().timestamp, 1);
        assert!(timeout(Duration::from_millis(100), fast.recv()).await.is_err());

        for n in 0..3 {
            assert_eq!(slow.recv().await.unwrap().timestamp, n);
        }
        assert_eq!(fast.recv().await.unwrap().timestamp, 2);
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned() {
        let bus = FanoutBus::new(1);
        let mut kept = bus.subscribe("kept");
        let gone = bus.subscribe("gone");
        assert_eq!(kept.name(), "kept");
        drop(gone);

        assert_eq!(bus.publish(envelope(0)).await, 1);
        assert_eq!(bus.receiver_count(), 1);
        assert_eq!(kept.recv().await.unwrap().timestamp, 0);
    }

    #[tokio::test]
    async fn closed_bus_ends_stream() {
        let bus = FanoutBus::new(4);
        let mut rx = bus.subscribe("p");
        assert_eq!(bus.receiver_count(), 1);
        drop(bus);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        assert_eq!(FanoutBus::new(4).publish(envelope(0)).await, 0);
    }
}
