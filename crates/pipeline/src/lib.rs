//! netlog 파이프라인
//!
//! 네트워크 장비 syslog 를 받아 장비 OS 를 식별하고, OS 별 패턴 테이블로
//! 필드를 추출해 구조화 객체로 만든 뒤, 필터/직렬화/암호화를 거쳐 발행합니다.
//!
//! # 모듈 구성
//!
//! - [`profile`]: 장비 프로파일 YAML 로딩, 병합, 검증
//! - [`pattern`]: 프로파일 → 실행 가능한 매처 컴파일, 사용자 함수 등록소
//! - [`listener`]: UDP / TCP 수신
//! - [`dispatcher`]: 헤더 식별, 중복 제거, OS 별 라우팅
//! - [`worker`]: 본문 분류와 엔벨로프 생성
//! - [`emit`]: 선언형 매핑 → 구조화 객체
//! - [`timestamp`]: 헤더 날짜/시간 해석
//! - [`dedup`]: 중복 제거 창 (메모리 / Redis)
//! - [`fanout`]: 워커 → 발행자별 큐 (가득 차면 생산자가 기다림)
//! - [`publisher`]: 필터, 직렬화, 암호화
//! - [`transport`]: 발행 전송 (log / stdout / TCP)
//! - [`engine`]: 실행 단위 생명주기와 감시 (Pipeline trait 구현)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Listener ─▶ Dispatcher ─▶ DeviceWorker ─▶ FanoutBus ─▶ Publisher ─▶ Transport
//!   udp/tcp     prefix+dedup   message table    per-queue    filter+seal   log/cli/tcp
//! ```

pub mod dedup;
pub mod dispatcher;
pub mod emit;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod filter;
pub mod listener;
pub mod message;
pub mod pattern;
pub mod profile;
pub mod publisher;
pub mod timestamp;
pub mod transport;
pub mod worker;

// --- 주요 타입 re-export ---

// 엔진
pub use engine::{Engine, EngineBuilder};

// 에러
pub use error::EngineError;

// 단계
pub use dedup::{DedupStore, DedupWindow, MemoryDedup, RedisDedup};
pub use dispatcher::Dispatcher;
pub use fanout::{FanoutBus, FanoutReceiver};
pub use filter::ListFilter;
pub use listener::Listener;
pub use message::{PrefixMatch, RawMessage};
pub use publisher::Publisher;
pub use transport::{Transport, TransportFactory, build_transport};
pub use worker::DeviceWorker;

// 프로파일 / 패턴
pub use pattern::{DeviceTables, FunctionRegistry, MessageFunction, PatternCompiler, PrefixFunction};
pub use profile::{DeviceProfile, ProfileLoader, ProfileSet};
