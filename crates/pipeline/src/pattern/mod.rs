//! 패턴 컴파일 -- 프로파일을 실행 가능한 매처로 바꿉니다.
//!
//! - [`template`]: `line` + `values` → 정규식
//! - [`modifier`]: `name|modifier` 후처리
//! - [`registry`]: 사용자 정의 함수 ([`PrefixFunction`], [`MessageFunction`])
//! - [`compiler`]: OS 프로파일 → [`DeviceTables`]
//!
//! 컴파일된 테이블은 시작 시 한 번 만들어지며 `Arc` 로 공유되는 읽기 전용 값입니다.

pub mod builtin;
pub mod compiler;
pub mod modifier;
pub mod registry;
pub mod template;

pub use compiler::PatternCompiler;
pub use modifier::Modifier;
pub use registry::{FunctionError, FunctionRegistry, MessageFunction, PrefixFunction};
pub use template::{CompiledTemplate, TemplateError};

use std::fmt;
use std::sync::Arc;

use netlog_core::envelope::MessageDetails;
use serde_json::Value;

use crate::profile::MappingSpec;

/// 패턴이 정의된 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternOrigin {
    /// 장비 OS
    pub os: String,
    /// 테이블 종류
    pub table: Table,
    /// 테이블 안의 인덱스
    pub index: usize,
}

/// 패턴 테이블 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// 헤더 식별
    Prefix,
    /// 본문 분류
    Message,
}

impl fmt::Display for PatternOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = match self.table {
            Table::Prefix => "prefixes",
            Table::Message => "messages",
        };
        write!(f, "{}/{}[{}]", self.os, table, self.index)
    }
}

/// 헤더 매처
#[derive(Clone)]
pub enum PrefixMatcher {
    /// 정규식 템플릿
    Template(CompiledTemplate),
    /// 사용자 정의 함수
    Function {
        /// 등록 이름
        name: String,
        /// 함수
        function: Arc<dyn PrefixFunction>,
    },
}

/// 컴파일된 프리픽스 하나
#[derive(Clone)]
pub struct PrefixPattern {
    /// 정의 위치
    pub origin: PatternOrigin,
    /// 매처
    pub matcher: PrefixMatcher,
    /// `date` + `time` 해석 형식
    pub time_format: Option<String>,
}

impl PrefixPattern {
    /// 라인에서 헤더 필드를 추출합니다.
    ///
    /// 사용자 함수가 실패하거나 `message` 없이 돌려주면 일치하지 않은 것으로 봅니다.
    pub fn extract(&self, line: &str) -> Option<MessageDetails> {
        match &self.matcher {
            PrefixMatcher::Template(template) => template.extract(line),
            PrefixMatcher::Function { name, function } => match function.extract(line) {
                Ok(Some(fields)) if fields.contains_key("message") => Some(fields),
                Ok(Some(_)) => {
                    tracing::warn!(origin = %self.origin, function = %name, "prefix function returned no 'message' field");
                    None
                }
                Ok(None) => None,
                Err(e) => {
                    tracing::error!(origin = %self.origin, function = %name, error = %e, "prefix function failed");
                    None
                }
            },
        }
    }
}

impl fmt::Debug for PrefixPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let matcher = match &self.matcher {
            PrefixMatcher::Template(t) => t.as_str().to_owned(),
            PrefixMatcher::Function { name, .. } => format!("function:{name}"),
        };
        f.debug_struct("PrefixPattern")
            .field("origin", &self.origin)
            .field("matcher", &matcher)
            .field("time_format", &self.time_format)
            .finish()
    }
}

/// 본문 추출 방식
#[derive(Clone)]
pub enum MessageExtractor {
    /// 정규식 템플릿 + 선언형 매핑
    Template {
        /// 본문 템플릿
        template: CompiledTemplate,
        /// 구조화 객체 매핑
        mapping: MappingSpec,
    },
    /// 사용자 정의 함수
    Function {
        /// 등록 이름
        name: String,
        /// 함수
        function: Arc<dyn MessageFunction>,
    },
}

/// 컴파일된 메시지 하나
#[derive(Clone)]
pub struct MessagePattern {
    /// 정의 위치
    pub origin: PatternOrigin,
    /// 분류 이름
    pub error: String,
    /// 비교할 헤더 값
    pub tag: String,
    /// 비교할 헤더 필드
    pub match_on: String,
    /// 구조화 모델 이름
    pub model: String,
    /// 추출 방식
    pub extractor: MessageExtractor,
    /// 상태 값
    pub state: Option<Value>,
    /// 상태 태그
    pub state_tag: Option<String>,
}

impl fmt::Debug for MessagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extractor = match &self.extractor {
            MessageExtractor::Template { template, .. } => template.as_str().to_owned(),
            MessageExtractor::Function { name, .. } => format!("function:{name}"),
        };
        f.debug_struct("MessagePattern")
            .field("origin", &self.origin)
            .field("error", &self.error)
            .field("tag", &self.tag)
            .field("match_on", &self.match_on)
            .field("extractor", &extractor)
            .finish()
    }
}

/// 한 OS 의 컴파일된 테이블
#[derive(Debug, Clone)]
pub struct DeviceTables {
    /// 장비 OS
    pub os: String,
    /// 헤더 매처 (첫 일치)
    pub prefixes: Vec<PrefixPattern>,
    /// 본문 매처 (순서대로)
    pub messages: Vec<MessagePattern>,
}
