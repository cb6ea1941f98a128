//! 단계 사이를 흐르는 메시지 타입
//!
//! - [`RawMessage`]: 리스너 → 디스패처
//! - [`PrefixMatch`]: 디스패처 → 장비 워커

use bytes::Bytes;
use netlog_core::envelope::MessageDetails;
use serde_json::Value;

/// 리스너가 받은 원시 메시지
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// 원시 바이트 (UDP 데이터그램 하나 또는 TCP 한 줄)
    pub data: Bytes,
    /// 송신 측 주소 (포트 제외 IP)
    pub source: String,
}

impl RawMessage {
    /// 새 원시 메시지를 만듭니다.
    pub fn new(data: impl Into<Bytes>, source: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            source: source.into(),
        }
    }

    /// UTF-8 로 해석한 본문. 잘못된 바이트는 대체 문자로 바뀝니다.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// 헤더 식별 결과
///
/// `fields` 에는 프리픽스에서 추출한 모든 값(`host`, `tag`, `date`, `pri`, …)과
/// 다듬어진 본문 `message`, PRI 에서 계산한 `facility` / `severity` 가 들어갑니다.
/// 이 맵이 그대로 엔벨로프의 `message_details` 가 됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct PrefixMatch {
    /// 식별된 장비 OS (식별 실패 시 `None`)
    pub os: Option<String>,
    /// 일치한 프리픽스 인덱스
    pub prefix_id: usize,
    /// 헤더 필드
    pub fields: MessageDetails,
    /// 송신 측 주소
    pub source: String,
    /// 헤더에 명시된 유닉스 타임스탬프
    pub timestamp: Option<i64>,
}

impl PrefixMatch {
    /// 어떤 OS 로도 식별되지 않은 메시지
    pub fn unidentified(text: &str, source: impl Into<String>) -> Self {
        let mut fields = MessageDetails::new();
        fields.insert("message".to_owned(), Value::String(text.to_owned()));
        Self {
            os: None,
            prefix_id: 0,
            fields,
            source: source.into(),
            timestamp: None,
        }
    }

    /// 문자열 필드를 조회합니다. 숫자 필드는 문자열로 바꿔 돌려줍니다.
    pub fn field(&self, name: &str) -> Option<String> {
        self.fields.get(name).and_then(value_to_string)
    }

    /// 다듬어진 본문
    pub fn body(&self) -> &str {
        self.fields
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// 장비 호스트 이름
    pub fn host(&self) -> String {
        self.field("host").unwrap_or_default()
    }

    /// facility 값
    pub fn facility(&self) -> Option<u8> {
        self.small_int("facility")
    }

    /// severity 값
    pub fn severity(&self) -> Option<u8> {
        self.small_int("severity")
    }

    fn small_int(&self, name: &str) -> Option<u8> {
        self.fields
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok())
    }
}

/// 스칼라 JSON 값을 문자열로 바꿉니다. 맵/리스트/null 은 `None`.
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unidentified_keeps_raw_text_as_message() {
        let m = PrefixMatch::unidentified("garbage line", "192.0.2.1");
        assert_eq!(m.os, None);
        assert_eq!(m.body(), "garbage line");
        assert_eq!(m.host(), "");
    }

    #[test]
    fn numeric_fields_read_as_strings() {
        let mut m = PrefixMatch::unidentified("x", "192.0.2.1");
        m.fields.insert("pri".to_owned(), 149.into());
        m.fields.insert("facility".to_owned(), 18.into());
        assert_eq!(m.field("pri").as_deref(), Some("149"));
        assert_eq!(m.facility(), Some(18));
        assert_eq!(m.severity(), None);
    }

    #[test]
    fn raw_message_text_is_lossy() {
        let raw = RawMessage::new(vec![b'o', b'k', 0xff], "10.0.0.1");
        assert!(raw.text().starts_with("ok"));
    }
}
