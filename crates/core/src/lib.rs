//! netlog 공통 크레이트
//!
//! 모든 netlog 크레이트가 공유하는 타입, trait, 에러, 설정을 정의합니다.
//!
//! # 모듈 구성
//!
//! - [`envelope`]: 파이프라인을 흐르는 분류 결과 단위 ([`Envelope`])
//! - [`pipeline`]: 생명주기 trait ([`Pipeline`]) 과 [`HealthStatus`]
//! - [`config`]: `netlog.toml` 파싱 및 환경변수 오버라이드
//! - [`metrics`]: Prometheus 메트릭 이름 상수
//! - [`tree`]: 경로 기반 구조화 객체 빌더
//! - [`error`]: 최상위 에러 타입

pub mod config;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod tree;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, NetlogError, PipelineError, TreeError};

// 설정
pub use config::NetlogConfig;

// 엔벨로프
pub use envelope::{Envelope, MessageDetails};

// 파이프라인 trait
pub use pipeline::{BoxFuture, DynPipeline, HealthStatus, Pipeline};
