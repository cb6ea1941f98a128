//! 장비 프로파일 -- OS 별 프리픽스/메시지 패턴 테이블
//!
//! ```text
//! profiles/
//! ├── junos/
//! │   ├── init.yml                 # prefixes
//! │   └── BGP_PREFIX_THRESH.yml    # messages
//! └── nxos/
//!     └── init.yml
//! ```
//!
//! - [`loader`]: 디렉토리 스캔, 파일 병합, OS 선택
//! - [`merge`]: 기본 디렉토리 ⊕ 확장 디렉토리 깊은 병합
//! - [`schema`]: 필수 키/타입 검증

pub mod loader;
pub mod merge;
pub mod schema;

pub use loader::ProfileLoader;

use std::collections::BTreeMap;

use serde::Deserialize;

/// 프로파일 파일 중 프리픽스 정의로 취급하는 파일 이름 (확장자 제외)
pub const OS_INIT_FILENAMES: [&str; 3] = ["__init__", "init", "index"];

/// 메시지가 구조화 모델을 갖지 않을 때의 모델 이름
pub const NO_MODEL: &str = "NO_MODEL";

/// OS 이름 → 프로파일. 이름 순서가 디스패치 순서입니다.
pub type ProfileSet = BTreeMap<String, DeviceProfile>;

/// 한 장비 OS 의 프로파일
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceProfile {
    /// 헤더 식별 패턴 (위에서부터 첫 일치)
    #[serde(default)]
    pub prefixes: Vec<PrefixSpec>,
    /// 본문 분류 패턴 (순서대로 시도)
    #[serde(default)]
    pub messages: Vec<MessageSpec>,
}

/// 프리픽스 정의
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrefixSpec {
    /// 필드 → 정규식 조각
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// 템플릿 라인 (`{pri}`, `{message}` 는 자동으로 붙습니다)
    #[serde(default)]
    pub line: String,
    /// `date` + `time` 해석 형식 (chrono strftime)
    #[serde(default)]
    pub time_format: Option<String>,
    /// 사용자 정의 프리픽스 함수 이름
    #[serde(default)]
    pub function: Option<String>,
}

/// 메시지 정의
#[derive(Debug, Clone, Deserialize)]
pub struct MessageSpec {
    /// 분류 이름 (엔벨로프 `error`)
    pub error: String,
    /// 비교할 헤더 값
    pub tag: String,
    /// 비교할 헤더 필드 이름
    #[serde(default = "default_match_on")]
    pub match_on: String,
    /// 구조화 모델 이름
    #[serde(default = "default_model")]
    pub model: String,
    /// 필드 → 정규식 조각
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    /// 본문 템플릿 라인
    #[serde(default)]
    pub line: String,
    /// 구조화 객체 매핑
    #[serde(default)]
    pub mapping: MappingSpec,
    /// 상태 값 (있으면 엔벨로프에 복사)
    #[serde(default)]
    pub state: Option<serde_json::Value>,
    /// 상태 태그
    #[serde(default)]
    pub state_tag: Option<String>,
    /// 사용자 정의 메시지 함수 이름
    #[serde(default)]
    pub function: Option<String>,
}

/// 구조화 객체 매핑
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MappingSpec {
    /// 경로 템플릿 → 추출 필드 이름
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// 경로 템플릿 → 고정 값
    #[serde(default, rename = "static")]
    pub statics: BTreeMap<String, serde_json::Value>,
}

fn default_match_on() -> String {
    "tag".to_owned()
}

fn default_model() -> String {
    NO_MODEL.to_owned()
}
