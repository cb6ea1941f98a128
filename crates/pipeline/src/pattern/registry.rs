//! 사용자 정의 추출 함수 등록소
//!
//! 정규식 템플릿으로 표현하기 어려운 프리픽스나 메시지는 이름으로 등록한
//! 함수가 처리합니다. 프로파일은 `function: <name>` 으로 참조합니다.
//! 등록은 프로파일 로딩 전에 끝나야 합니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use netlog_core::envelope::MessageDetails;
use serde_json::Value;

use crate::error::EngineError;
use crate::message::PrefixMatch;

use super::builtin::NxosUserLogin;

/// 사용자 함수가 돌려주는 에러
pub type FunctionError = Box<dyn std::error::Error + Send + Sync>;

/// 원시 라인에서 헤더 필드를 추출하는 함수
///
/// 일치하지 않으면 `Ok(None)`. 반환 맵에는 `message` 가 있어야 합니다.
pub trait PrefixFunction: Send + Sync {
    /// 헤더 필드를 추출합니다.
    fn extract(&self, line: &str) -> Result<Option<MessageDetails>, FunctionError>;
}

/// 헤더 식별 결과로 구조화 객체를 만드는 함수
pub trait MessageFunction: Send + Sync {
    /// 구조화 객체를 만듭니다.
    fn emit(&self, header: &PrefixMatch) -> Result<Value, FunctionError>;
}

impl<F> PrefixFunction for F
where
    F: Fn(&str) -> Result<Option<MessageDetails>, FunctionError> + Send + Sync,
{
    fn extract(&self, line: &str) -> Result<Option<MessageDetails>, FunctionError> {
        self(line)
    }
}

impl<F> MessageFunction for F
where
    F: Fn(&PrefixMatch) -> Result<Value, FunctionError> + Send + Sync,
{
    fn emit(&self, header: &PrefixMatch) -> Result<Value, FunctionError> {
        self(header)
    }
}

/// 이름 → 함수 등록소
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    prefixes: HashMap<String, Arc<dyn PrefixFunction>>,
    messages: HashMap<String, Arc<dyn MessageFunction>>,
}

impl FunctionRegistry {
    /// 빈 등록소를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 내장 함수가 등록된 등록소를 만듭니다.
    ///
    /// - `nxos_user_login`: NX-OS `AUTHPRIV-6-SYSTEM_MSG` 세션 로그인
    pub fn with_builtins() -> Result<Self, EngineError> {
        let mut registry = Self::new();
        registry.register_message(NxosUserLogin::NAME, NxosUserLogin::new()?);
        Ok(registry)
    }

    /// 프리픽스 함수를 등록합니다. 같은 이름은 덮어씁니다.
    pub fn register_prefix(
        &mut self,
        name: impl Into<String>,
        function: impl PrefixFunction + 'static,
    ) -> &mut Self {
        self.prefixes.insert(name.into(), Arc::new(function));
        self
    }

    /// 메시지 함수를 등록합니다. 같은 이름은 덮어씁니다.
    pub fn register_message(
        &mut self,
        name: impl Into<String>,
        function: impl MessageFunction + 'static,
    ) -> &mut Self {
        self.messages.insert(name.into(), Arc::new(function));
        self
    }

    /// 다른 등록소의 함수를 모두 가져옵니다. 같은 이름은 `other` 가 이깁니다.
    pub fn extend(&mut self, other: FunctionRegistry) -> &mut Self {
        self.prefixes.extend(other.prefixes);
        self.messages.extend(other.messages);
        self
    }

    /// 프리픽스 함수를 찾습니다.
    pub fn prefix(&self, name: &str) -> Option<Arc<dyn PrefixFunction>> {
        self.prefixes.get(name).cloned()
    }

    /// 메시지 함수를 찾습니다.
    pub fn message(&self, name: &str) -> Option<Arc<dyn MessageFunction>> {
        self.messages.get(name).cloned()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut prefixes: Vec<_> = self.prefixes.keys().collect();
        let mut messages: Vec<_> = self.messages.keys().collect();
        prefixes.sort();
        messages.sort();
        f.debug_struct("FunctionRegistry")
            .field("prefixes", &prefixes)
            .field("messages", &messages)
            .finish()
    }
}
