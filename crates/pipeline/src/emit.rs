//! 선언형 매핑 → 구조화 객체
//!
//! ```yaml
//! mapping:
//!   variables:
//!     bgp//neighbors//neighbor//{peer}//state//peer_as: peer_as
//!   static:
//!     bgp//neighbors//neighbor//{peer}//afi_safis//afi_safi//inet//state//prefixes//received: 0
//! ```
//!
//! 경로 템플릿을 구분자로 나눈 뒤 각 칸의 `{name}` 을 추출된 필드 값으로
//! 치환하고 [`Node`] 트리에 값을 씁니다. 템플릿에 숫자로 적힌 칸만 리스트
//! 인덱스가 되고, 치환된 칸은 값이 숫자여도 맵 키입니다.
//! `variables` 를 먼저, `static` 을 나중에 적용합니다.

use netlog_core::envelope::MessageDetails;
use netlog_core::error::TreeError;
use netlog_core::tree::{Node, PathSegment};
use serde_json::Value;

use crate::message::value_to_string;
use crate::pattern::template::placeholders;
use crate::profile::MappingSpec;

/// 매핑 실패
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// 경로 템플릿이 추출되지 않은 필드를 참조
    #[error("path '{path}' references field '{field}' which has no value")]
    MissingField {
        /// 경로 템플릿
        path: String,
        /// 필드 이름
        field: String,
    },

    /// `variables` 가 추출되지 않은 필드를 가리킴
    #[error("variable '{path}' points to unknown field '{field}'")]
    UnknownVariable {
        /// 경로 템플릿
        path: String,
        /// 필드 이름
        field: String,
    },

    /// 트리 충돌
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// 경로 템플릿의 자리표시자를 필드 값으로 치환합니다.
pub fn format_path(template: &str, fields: &MessageDetails) -> Result<String, MappingError> {
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for placeholder in placeholders(template) {
        out.push_str(&template[cursor..placeholder.start]);
        let value = fields
            .get(&placeholder.name)
            .and_then(value_to_string)
            .ok_or_else(|| MappingError::MissingField {
                path: template.to_owned(),
                field: placeholder.name.clone(),
            })?;
        out.push_str(&value);
        cursor = placeholder.end;
    }
    out.push_str(&template[cursor..]);
    Ok(out)
}

/// 매핑을 적용해 구조화 객체를 만듭니다.
pub fn build_object(
    mapping: &MappingSpec,
    fields: &MessageDetails,
    delimiter: &str,
) -> Result<Value, MappingError> {
    let mut root = Node::default();

    for (template, field) in &mapping.variables {
        let value = fields
            .get(field)
            .cloned()
            .ok_or_else(|| MappingError::UnknownVariable {
                path: template.clone(),
                field: field.clone(),
            })?;
        root.set(&resolve_path(template, fields, delimiter)?, value)?;
    }

    for (template, value) in &mapping.statics {
        root.set(&resolve_path(template, fields, delimiter)?, value.clone())?;
    }

    Ok(root.into_value())
}

fn resolve_path(
    template: &str,
    fields: &MessageDetails,
    delimiter: &str,
) -> Result<Vec<PathSegment>, MappingError> {
    let mut segments = Vec::new();
    for part in template.split(delimiter) {
        if placeholders(part).is_empty() {
            segments.extend(PathSegment::parse(part, delimiter));
        } else {
            let key = format_path(part, fields).map_err(|e| match e {
                MappingError::MissingField { field, .. } => MappingError::MissingField {
                    path: template.to_owned(),
                    field,
                },
                other => other,
            })?;
            segments.push(PathSegment::Key(key));
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn fields(pairs: &[(&str, Value)]) -> MessageDetails {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn mapping(variables: &[(&str, &str)], statics: &[(&str, Value)]) -> MappingSpec {
        MappingSpec {
            variables: variables
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect::<BTreeMap<_, _>>(),
            statics: statics
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn variables_and_statics_share_one_tree() {
        let spec = mapping(&[("a//b", "field1")], &[("a//c", json!("X"))]);
        let out = build_object(&spec, &fields(&[("field1", json!("v"))]), "//").unwrap();
        assert_eq!(out, json!({"a": {"b": "v", "c": "X"}}));
    }

    #[test]
    fn path_placeholders_use_field_values() {
        let spec = mapping(
            &[("bgp//neighbors//neighbor//{peer}//state//peer_as", "asn")],
            &[],
        );
        let f = fields(&[("peer", json!("172.17.17.1")), ("asn", json!(123456))]);
        let out = build_object(&spec, &f, "//").unwrap();
        assert_eq!(
            out["bgp"]["neighbors"]["neighbor"]["172.17.17.1"]["state"]["peer_as"],
            123456
        );
    }

    #[test]
    fn integer_segments_create_lists() {
        let spec = mapping(&[], &[("users//0//name", json!("admin"))]);
        let out = build_object(&spec, &MessageDetails::new(), "//").unwrap();
        assert_eq!(out, json!({"users": [{"name": "admin"}]}));
    }

    #[test]
    fn numeric_field_values_stay_map_keys() {
        let spec = mapping(&[("users//{uid}//name", "name")], &[]);
        let f = fields(&[("uid", json!(1000)), ("name", json!("admin"))]);
        let out = build_object(&spec, &f, "//").unwrap();
        assert_eq!(out, json!({"users": {"1000": {"name": "admin"}}}));
    }

    #[test]
    fn format_path_substitutes_every_placeholder() {
        let f = fields(&[("a", json!("x")), ("b", json!(2))]);
        assert_eq!(format_path("p//{a}//q//{b}", &f).unwrap(), "p//x//q//2");
    }

    #[test]
    fn custom_delimiter() {
        let spec = mapping(&[("a/b", "x")], &[]);
        let out = build_object(&spec, &fields(&[("x", json!(1))]), "/").unwrap();
        assert_eq!(out, json!({"a": {"b": 1}}));
    }

    #[test]
    fn missing_path_field_is_an_error() {
        let spec = mapping(&[], &[("a//{peer}//b", json!(true))]);
        let err = build_object(&spec, &MessageDetails::new(), "//").unwrap_err();
        assert!(matches!(err, MappingError::MissingField { ref field, .. } if field == "peer"));
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let spec = mapping(&[("a//b", "nope")], &[]);
        let err = build_object(&spec, &MessageDetails::new(), "//").unwrap_err();
        assert!(matches!(err, MappingError::UnknownVariable { .. }));
    }

    #[test]
    fn conflicting_paths_are_reported() {
        let spec = mapping(&[], &[("a", json!(1)), ("a//b", json!(2))]);
        let err = build_object(&spec, &MessageDetails::new(), "//").unwrap_err();
        assert!(matches!(err, MappingError::Tree(_)));
    }
}
