//! 프로파일 → 컴파일된 테이블

use std::sync::Arc;

use crate::error::EngineError;
use crate::profile::{DeviceProfile, MessageSpec, PrefixSpec, ProfileSet};

use super::registry::FunctionRegistry;
use super::template::{CompiledTemplate, TemplateError};
use super::{
    DeviceTables, MessageExtractor, MessagePattern, PatternOrigin, PrefixMatcher, PrefixPattern,
    Table,
};

/// 패턴 컴파일러
#[derive(Debug, Clone, Default)]
pub struct PatternCompiler {
    registry: Arc<FunctionRegistry>,
}

impl PatternCompiler {
    /// 함수 등록소로 컴파일러를 만듭니다.
    pub fn new(registry: Arc<FunctionRegistry>) -> Self {
        Self { registry }
    }

    /// 모든 OS 를 컴파일합니다. 실패한 OS 는 에러 로그를 남기고 제외합니다.
    pub fn compile_all(&self, profiles: &ProfileSet) -> Vec<Arc<DeviceTables>> {
        profiles
            .iter()
            .filter_map(|(os, profile)| match self.compile(os, profile) {
                Ok(tables) => Some(Arc::new(tables)),
                Err(e) => {
                    tracing::error!(os = %os, error = %e, "unable to compile device profile, skipping");
                    None
                }
            })
            .collect()
    }

    /// OS 하나를 컴파일합니다.
    pub fn compile(&self, os: &str, profile: &DeviceProfile) -> Result<DeviceTables, EngineError> {
        let prefixes = profile
            .prefixes
            .iter()
            .enumerate()
            .map(|(index, spec)| self.compile_prefix(os, index, spec))
            .collect::<Result<Vec<_>, _>>()?;
        let messages = profile
            .messages
            .iter()
            .enumerate()
            .map(|(index, spec)| self.compile_message(os, index, spec))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            os = %os,
            prefixes = prefixes.len(),
            messages = messages.len(),
            "compiled device profile"
        );
        Ok(DeviceTables {
            os: os.to_owned(),
            prefixes,
            messages,
        })
    }

    fn compile_prefix(
        &self,
        os: &str,
        index: usize,
        spec: &PrefixSpec,
    ) -> Result<PrefixPattern, EngineError> {
        let origin = PatternOrigin {
            os: os.to_owned(),
            table: Table::Prefix,
            index,
        };
        let matcher = match &spec.function {
            Some(name) => PrefixMatcher::Function {
                name: name.clone(),
                function: self.registry.prefix(name).ok_or_else(|| {
                    unregistered(&origin, name)
                })?,
            },
            None => {
                let template = CompiledTemplate::compile_prefix(&spec.line, &spec.values)
                    .map_err(|e| template_error(&origin, None, e))?;
                warn_unknown_modifiers(&origin, &template);
                PrefixMatcher::Template(template)
            }
        };
        Ok(PrefixPattern {
            origin,
            matcher,
            time_format: spec.time_format.clone(),
        })
    }

    fn compile_message(
        &self,
        os: &str,
        index: usize,
        spec: &MessageSpec,
    ) -> Result<MessagePattern, EngineError> {
        let origin = PatternOrigin {
            os: os.to_owned(),
            table: Table::Message,
            index,
        };
        let extractor = match &spec.function {
            Some(name) => MessageExtractor::Function {
                name: name.clone(),
                function: self
                    .registry
                    .message(name)
                    .ok_or_else(|| unregistered(&origin, name))?,
            },
            None => {
                let template = CompiledTemplate::compile(&spec.line, &spec.values)
                    .map_err(|e| template_error(&origin, Some(&spec.error), e))?;
                warn_unknown_modifiers(&origin, &template);
                MessageExtractor::Template {
                    template,
                    mapping: spec.mapping.clone(),
                }
            }
        };
        Ok(MessagePattern {
            origin,
            error: spec.error.clone(),
            tag: spec.tag.clone(),
            match_on: spec.match_on.clone(),
            model: spec.model.clone(),
            extractor,
            state: spec.state.clone(),
            state_tag: spec.state_tag.clone(),
        })
    }
}

fn warn_unknown_modifiers(origin: &PatternOrigin, template: &CompiledTemplate) {
    for (field, modifier) in template.unknown_modifiers() {
        tracing::warn!(
            origin = %origin,
            field,
            modifier,
            "unknown modifier, value will be kept as captured"
        );
    }
}

fn table_path(origin: &PatternOrigin, key: &str) -> String {
    let table = match origin.table {
        Table::Prefix => "prefixes",
        Table::Message => "messages",
    };
    format!("{table}[{}]/{key}", origin.index)
}

fn unregistered(origin: &PatternOrigin, name: &str) -> EngineError {
    EngineError::Profile {
        os: origin.os.clone(),
        path: table_path(origin, "function"),
        reason: format!("function '{name}' is not registered"),
    }
}

fn template_error(origin: &PatternOrigin, error: Option<&str>, err: TemplateError) -> EngineError {
    let key = match err {
        TemplateError::Mismatch { .. } | TemplateError::DuplicateValue(_) => "values",
        TemplateError::DuplicatePlaceholder(_) | TemplateError::Regex { .. } => "line",
    };
    let reason = match error {
        Some(error) => format!("{error}: {err}"),
        None => err.to_string(),
    };
    EngineError::Profile {
        os: origin.os.clone(),
        path: table_path(origin, key),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileLoader;

    fn profile(yaml: &str) -> DeviceProfile {
        let tree = ProfileLoader::parse_yaml(yaml, "test.yml").unwrap();
        ProfileLoader::build_profile("test", tree).unwrap().unwrap()
    }

    const GOOD: &str = r#"
prefixes:
  - values: {host: '(\S+)', tag: '(\w+)'}
    line: '{host} {tag}: '
messages:
  - error: IF_DOWN
    tag: LINK_DOWN
    values: {interface: '(\S+)'}
    line: 'Interface {interface} down'
    model: openconfig-interfaces
    mapping:
      variables:
        interfaces//interface//{interface}//state//oper_status: interface
      static: {}
"#;

    #[test]
    fn compiles_prefixes_and_messages() {
        let compiler = PatternCompiler::default();
        let tables = compiler.compile("eos", &profile(GOOD)).unwrap();
        assert_eq!(tables.prefixes.len(), 1);
        assert_eq!(tables.messages.len(), 1);
        assert_eq!(tables.messages[0].origin.to_string(), "eos/messages[0]");
        let fields = tables.prefixes[0].extract("<30>sw1 LINK_DOWN: Interface Et1 down").unwrap();
        assert_eq!(fields["host"], "sw1");
        assert_eq!(fields["message"], "Interface Et1 down");
    }

    #[test]
    fn placeholder_mismatch_names_os_and_entry() {
        let bad = GOOD.replace("line: 'Interface {interface} down'", "line: 'Interface {port} down'");
        let err = PatternCompiler::default()
            .compile("eos", &profile(&bad))
            .unwrap_err();
        match err {
            EngineError::Profile { os, path, reason } => {
                assert_eq!(os, "eos");
                assert_eq!(path, "messages[0]/values");
                assert!(reason.contains("IF_DOWN"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn one_bad_os_does_not_block_others() {
        let mut set = ProfileSet::new();
        set.insert("eos".to_owned(), profile(GOOD));
        set.insert(
            "broken".to_owned(),
            profile(&GOOD.replace("line: '{host} {tag}: '", "line: '{host}: '")),
        );
        let compiled = PatternCompiler::default().compile_all(&set);
        let names: Vec<_> = compiled.iter().map(|t| t.os.as_str()).collect();
        assert_eq!(names, vec!["eos"]);
    }

    #[test]
    fn unregistered_function_is_rejected() {
        let yaml = "prefixes: [{function: nope}]\nmessages: []";
        let err = PatternCompiler::default()
            .compile("x", &profile(yaml))
            .unwrap_err();
        assert!(err.to_string().contains("prefixes[0]/function"));
    }

    #[test]
    fn registered_message_function_is_used() {
        let registry = Arc::new(FunctionRegistry::with_builtins().unwrap());
        let yaml = "prefixes: []\nmessages: [{error: USER_LOGIN, tag: AUTHPRIV-6-SYSTEM_MSG, function: nxos_user_login}]";
        let tables = PatternCompiler::new(registry).compile("nxos", &profile(yaml)).unwrap();
        assert!(matches!(
            tables.messages[0].extractor,
            MessageExtractor::Function { ref name, .. } if name == "nxos_user_login"
        ));
        assert_eq!(tables.messages[0].model, crate::profile::NO_MODEL);
    }
}
