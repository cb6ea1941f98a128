//! 엔벨로프 -- 분류 결과를 발행자에게 전달하는 단위
//!
//! [`Envelope`]은 장비 워커(또는 미식별 메시지의 경우 디스패처)가 만들어
//! `Arc<Envelope>`로 모든 발행자에게 읽기 전용으로 팬아웃됩니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 접두 헤더에서 추출한 원본 필드 (host, tag, date, time, pri, message 등)
pub type MessageDetails = BTreeMap<String, serde_json::Value>;

/// 패턴 테이블로 분류하지 못한 본문에 붙는 에러 분류
pub const RAW: &str = "RAW";
/// 어떤 장비 OS로도 식별되지 않은 메시지에 붙는 에러 분류
pub const UNKNOWN: &str = "UNKNOWN";
/// 미식별 메시지의 host / os / yang_model 값
pub const UNKNOWN_DEVICE_NAME: &str = "unknown";
/// RAW 엔벨로프의 yang_model 값
pub const RAW_MODEL: &str = "raw";

/// 발행 단위
///
/// `error`는 패턴 테이블의 분류 이름이거나 [`RAW`], [`UNKNOWN`] 중 하나입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// 분류 이름
    pub error: String,
    /// 송신 장비 호스트명
    pub host: String,
    /// 송신 주소
    pub ip: String,
    /// Unix 타임스탬프 (초)
    pub timestamp: i64,
    /// 구조화 객체 (RAW / UNKNOWN 에는 없음)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yang_message: Option<serde_json::Value>,
    /// 원본 헤더 필드
    #[serde(default)]
    pub message_details: MessageDetails,
    /// 구조화 객체의 모델 이름
    pub yang_model: String,
    /// 장비 OS
    pub os: String,
    /// syslog facility (PRI / 8)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility: Option<u8>,
    /// syslog severity (PRI % 8)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    /// 상태 값 (패턴 엔트리가 선언한 경우)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<serde_json::Value>,
    /// 상태 태그
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_tag: Option<String>,
}

impl Envelope {
    /// 어떤 OS로도 식별되지 않은 메시지의 엔벨로프를 만듭니다.
    ///
    /// `message_details`에는 최소한 원문 `message`가 들어 있어야 합니다.
    pub fn unknown(ip: impl Into<String>, message_details: MessageDetails, timestamp: i64) -> Self {
        Self {
            error: UNKNOWN.to_owned(),
            host: UNKNOWN_DEVICE_NAME.to_owned(),
            ip: ip.into(),
            timestamp,
            yang_message: None,
            message_details,
            yang_model: UNKNOWN_DEVICE_NAME.to_owned(),
            os: UNKNOWN_DEVICE_NAME.to_owned(),
            facility: None,
            severity: None,
            state: None,
            state_tag: None,
        }
    }

    /// 장비 OS는 식별했지만 본문을 추출하지 못한 메시지의 엔벨로프를 만듭니다.
    pub fn raw(
        os: impl Into<String>,
        host: impl Into<String>,
        ip: impl Into<String>,
        timestamp: i64,
        message_details: MessageDetails,
    ) -> Self {
        Self {
            error: RAW.to_owned(),
            host: host.into(),
            ip: ip.into(),
            timestamp,
            yang_message: None,
            message_details,
            yang_model: RAW_MODEL.to_owned(),
            os: os.into(),
            facility: None,
            severity: None,
            state: None,
            state_tag: None,
        }
    }

    /// facility / severity 를 설정합니다.
    pub fn with_priority(mut self, facility: Option<u8>, severity: Option<u8>) -> Self {
        self.facility = facility;
        self.severity = severity;
        self
    }

    /// `message_details` 를 비운 사본을 반환합니다.
    pub fn without_message_details(&self) -> Self {
        Self {
            message_details: MessageDetails::new(),
            ..self.clone()
        }
    }

    /// RAW 엔벨로프인지 확인합니다.
    pub fn is_raw(&self) -> bool {
        self.error == RAW
    }

    /// UNKNOWN 엔벨로프인지 확인합니다.
    pub fn is_unknown(&self) -> bool {
        self.error == UNKNOWN
    }
}
