//! 프로파일 스키마 검증
//!
//! 병합이 끝난 OS 프로파일 트리가 다음 모양인지 확인합니다.
//!
//! ```yaml
//! prefixes:
//!   - values: {tag: ...}   # function 이 있으면 생략 가능
//!     line: "..."
//! messages:
//!   - error: ...           # function 이 있으면 error, tag 만 필수
//!     tag: ...
//!     values: {...}
//!     line: "..."
//!     model: ...
//!     mapping: {variables: {...}, static: {...}}
//! ```
//!
//! 에러는 OS 이름과 `messages[2]/mapping/static` 같은 키 경로를 담습니다.

use serde_yaml::Value;

use crate::error::EngineError;

#[derive(Clone, Copy)]
enum Kind {
    Str,
    Map,
    List,
}

impl Kind {
    fn name(self) -> &'static str {
        match self {
            Self::Str => "string",
            Self::Map => "mapping",
            Self::List => "list",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Map => value.is_mapping(),
            Self::List => value.is_sequence(),
        }
    }
}

const MESSAGE_KEYS: [(&str, Kind); 5] = [
    ("error", Kind::Str),
    ("tag", Kind::Str),
    ("values", Kind::Map),
    ("line", Kind::Str),
    ("model", Kind::Str),
];

/// OS 프로파일 트리를 검증합니다.
pub fn validate(os: &str, tree: &Value) -> Result<(), EngineError> {
    if !tree.is_mapping() {
        return Err(profile_error(os, "", "profile root should be a mapping"));
    }

    let prefixes = require(os, tree, "prefixes", "", Kind::List)?;
    for (idx, prefix) in seq(prefixes).iter().enumerate() {
        let path = format!("prefixes[{idx}]");
        validate_prefix(os, prefix, &path)?;
    }

    let messages = require(os, tree, "messages", "", Kind::List)?;
    for (idx, message) in seq(messages).iter().enumerate() {
        let path = format!("messages[{idx}]");
        validate_message(os, message, &path)?;
    }

    Ok(())
}

fn validate_prefix(os: &str, prefix: &Value, path: &str) -> Result<(), EngineError> {
    if !prefix.is_mapping() {
        return Err(profile_error(os, path, "should be a mapping"));
    }
    if has_function(prefix) {
        return Ok(());
    }
    let values = require(os, prefix, "values", path, Kind::Map)?;
    require(os, values, "tag", &format!("{path}/values"), Kind::Str)?;
    require(os, prefix, "line", path, Kind::Str)?;
    optional(os, prefix, "time_format", path, Kind::Str)?;
    Ok(())
}

fn validate_message(os: &str, message: &Value, path: &str) -> Result<(), EngineError> {
    if !message.is_mapping() {
        return Err(profile_error(os, path, "should be a mapping"));
    }
    optional(os, message, "match_on", path, Kind::Str)?;
    optional(os, message, "state_tag", path, Kind::Str)?;

    if has_function(message) {
        require(os, message, "error", path, Kind::Str)?;
        require(os, message, "tag", path, Kind::Str)?;
        optional(os, message, "model", path, Kind::Str)?;
        return Ok(());
    }

    for (key, kind) in MESSAGE_KEYS {
        require(os, message, key, path, kind)?;
    }
    let mapping = require(os, message, "mapping", path, Kind::Map)?;
    let mapping_path = format!("{path}/mapping");
    require(os, mapping, "variables", &mapping_path, Kind::Map)?;
    require(os, mapping, "static", &mapping_path, Kind::Map)?;
    Ok(())
}

fn has_function(entry: &Value) -> bool {
    entry.get("function").is_some_and(Value::is_string)
}

fn require<'a>(
    os: &str,
    parent: &'a Value,
    key: &str,
    path: &str,
    kind: Kind,
) -> Result<&'a Value, EngineError> {
    let key_path = join(path, key);
    match parent.get(key) {
        None | Some(Value::Null) => Err(profile_error(os, &key_path, "required key is missing")),
        Some(value) if !kind.accepts(value) => Err(profile_error(
            os,
            &key_path,
            &format!("should be a {}", kind.name()),
        )),
        Some(value) => Ok(value),
    }
}

fn optional(os: &str, parent: &Value, key: &str, path: &str, kind: Kind) -> Result<(), EngineError> {
    match parent.get(key) {
        Some(value) if !value.is_null() && !kind.accepts(value) => Err(profile_error(
            os,
            &join(path, key),
            &format!("should be a {}", kind.name()),
        )),
        _ => Ok(()),
    }
}

fn seq(value: &Value) -> &[Value] {
    value.as_sequence().map(Vec::as_slice).unwrap_or_default()
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}/{key}")
    }
}

fn profile_error(os: &str, path: &str, reason: &str) -> EngineError {
    EngineError::Profile {
        os: os.to_owned(),
        path: path.to_owned(),
        reason: reason.to_owned(),
    }
}
