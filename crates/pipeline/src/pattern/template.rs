//! 선언형 템플릿(`line` + `values`) → 정규식 컴파일
//!
//! ```text
//! line:   "{date} {time} {host} {tag}[{pid}]:"
//! values: {date: "(\w+ +\d+)", time: "(\d\d:\d\d:\d\d)", host: "([^ ]+)", tag: "(\w+)", pid: "(\d+)"}
//! ```
//!
//! 리터럴 부분은 이스케이프하고 공백 한 칸은 `\s+` 로 바꾼 뒤
//! 자리표시자 위치에 값 조각을 끼워 넣습니다. 필드의 캡처 번호는
//! 자리표시자의 등장 순서로 정해집니다.

use std::collections::{BTreeMap, BTreeSet};

use netlog_core::envelope::MessageDetails;
use regex::Regex;
use serde_json::Value;

use super::modifier::Modifier;

/// 프리픽스의 PRI 조각
///
/// `regex` 크레이트에서 `\<` `\>` 는 단어 경계이므로 꺾쇠는 이스케이프하지 않습니다.
pub const PRI_FRAGMENT: &str = r"<(\d+)>";
/// 프리픽스 뒤 나머지 본문 조각
pub const MESSAGE_FRAGMENT: &str = "(.*)";

/// 템플릿 컴파일 에러
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// `line` 의 자리표시자와 `values` 키가 다름
    #[error("values do not match placeholders in line (missing values: {missing:?}, unused values: {unused:?})")]
    Mismatch {
        /// 값이 없는 자리표시자
        missing: Vec<String>,
        /// 자리표시자가 없는 값
        unused: Vec<String>,
    },

    /// 같은 자리표시자가 두 번 이상 등장
    #[error("placeholder '{0}' appears more than once")]
    DuplicatePlaceholder(String),

    /// 수식어를 떼고 나니 같은 이름이 된 값 키
    #[error("value '{0}' is declared more than once")]
    DuplicateValue(String),

    /// 정규식 컴파일 실패
    #[error("invalid regex for '{field}': {source}")]
    Regex {
        /// 문제가 된 필드 (전체 패턴이면 `line`)
        field: String,
        /// 원인
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
struct CaptureField {
    name: String,
    group: usize,
    modifier: Option<Modifier>,
}

/// 컴파일된 템플릿
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    regex: Regex,
    fields: Vec<CaptureField>,
}

impl CompiledTemplate {
    /// 메시지 본문 템플릿을 컴파일합니다.
    pub fn compile(line: &str, values: &BTreeMap<String, String>) -> Result<Self, TemplateError> {
        let values = split_modifiers(values)?;
        Self::build(line, &values)
    }

    /// 프리픽스 템플릿을 컴파일합니다. `{pri}` 와 `{message}` 로 감쌉니다.
    pub fn compile_prefix(
        line: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<Self, TemplateError> {
        let mut values = split_modifiers(values)?;
        values.insert("pri".to_owned(), (PRI_FRAGMENT.to_owned(), None));
        values.insert("message".to_owned(), (MESSAGE_FRAGMENT.to_owned(), None));
        Self::build(&format!("{{pri}}{line}{{message}}"), &values)
    }

    fn build(
        line: &str,
        values: &BTreeMap<String, (String, Option<Modifier>)>,
    ) -> Result<Self, TemplateError> {
        let spots = placeholders(line);

        let mut seen = BTreeSet::new();
        for spot in &spots {
            if !seen.insert(spot.name.as_str()) {
                return Err(TemplateError::DuplicatePlaceholder(spot.name.clone()));
            }
        }
        let declared: BTreeSet<&str> = values.keys().map(String::as_str).collect();
        if seen != declared {
            return Err(TemplateError::Mismatch {
                missing: seen.difference(&declared).map(|s| (*s).to_owned()).collect(),
                unused: declared.difference(&seen).map(|s| (*s).to_owned()).collect(),
            });
        }

        let mut pattern = String::with_capacity(line.len() * 2);
        let mut fields = Vec::with_capacity(spots.len());
        let mut group = 0usize;
        let mut cursor = 0usize;

        for spot in &spots {
            pattern.push_str(&literal(&line[cursor..spot.start]));
            cursor = spot.end;

            // 키 집합이 같음을 위에서 확인했습니다.
            let Some((fragment, modifier)) = values.get(&spot.name) else {
                continue;
            };
            let groups = Regex::new(fragment)
                .map_err(|source| TemplateError::Regex {
                    field: spot.name.clone(),
                    source,
                })?
                .captures_len()
                - 1;

            fields.push(CaptureField {
                name: spot.name.clone(),
                group: group + 1,
                modifier: modifier.clone(),
            });
            if groups == 0 {
                pattern.push('(');
                pattern.push_str(fragment);
                pattern.push(')');
                group += 1;
            } else {
                pattern.push_str(fragment);
                group += groups;
            }
        }
        pattern.push_str(&literal(&line[cursor..]));

        let regex = Regex::new(&pattern).map_err(|source| TemplateError::Regex {
            field: "line".to_owned(),
            source,
        })?;
        Ok(Self { regex, fields })
    }

    /// 컴파일된 정규식 원문
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// 추출 필드 이름 (등장 순서)
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// 텍스트 어디에서든 일치하는 첫 위치를 찾아 필드를 추출합니다.
    ///
    /// 참여하지 않은 선택 그룹은 `null` 이 됩니다.
    pub fn extract(&self, text: &str) -> Option<MessageDetails> {
        let caps = self.regex.captures(text)?;
        let mut out = MessageDetails::new();
        for field in &self.fields {
            let value = match caps.get(field.group) {
                Some(m) => match &field.modifier {
                    Some(modifier) => modifier.apply(m.as_str()),
                    None => Value::String(m.as_str().to_owned()),
                },
                None => Value::Null,
            };
            out.insert(field.name.clone(), value);
        }
        Some(out)
    }

    /// 선언된 수식어 중 알 수 없는 이름들
    pub fn unknown_modifiers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().filter_map(|f| match &f.modifier {
            Some(Modifier::Unknown(name)) => Some((f.name.as_str(), name.as_str())),
            _ => None,
        })
    }
}

/// 라인 안의 `{name}` 자리표시자
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// 필드 이름
    pub name: String,
    /// `{` 의 바이트 오프셋
    pub start: usize,
    /// `}` 다음 바이트 오프셋
    pub end: usize,
}

/// 라인에서 자리표시자를 등장 순서대로 찾습니다.
///
/// 이름은 영문자, 숫자, `_` 로만 이루어져야 하며 그 밖의 중괄호는 리터럴입니다.
pub fn placeholders(line: &str) -> Vec<Placeholder> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let name_start = i + 1;
            let mut j = name_start;
            while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
                j += 1;
            }
            if j > name_start && j < bytes.len() && bytes[j] == b'}' {
                out.push(Placeholder {
                    name: line[name_start..j].to_owned(),
                    start: i,
                    end: j + 1,
                });
                i = j + 1;
                continue;
            }
        }
        i += 1;
    }
    out
}

fn literal(text: &str) -> String {
    regex::escape(text).replace(' ', r"\s+")
}

fn split_modifiers(
    values: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, (String, Option<Modifier>)>, TemplateError> {
    let mut out = BTreeMap::new();
    for (key, fragment) in values {
        let key: String = key.chars().filter(|c| !c.is_whitespace()).collect();
        let (name, modifier) = match key.split_once('|') {
            Some((name, modifier)) => (name.to_owned(), Some(Modifier::parse(modifier))),
            None => (key, None),
        };
        if out.insert(name.clone(), (fragment.clone(), modifier)).is_some() {
            return Err(TemplateError::DuplicateValue(name));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn junos_prefix() -> CompiledTemplate {
        CompiledTemplate::compile_prefix(
            "{date} {time} {hostPrefix}{host} {processName}[{processId}]: {tag}: ",
            &values(&[
                ("date", r"(\w+\s+\d+)"),
                ("time", r"(\d\d:\d\d:\d\d)"),
                ("hostPrefix", r"(re\d.)?"),
                ("host", r"([^ ]+)"),
                ("processName", r"(\w+)"),
                ("processId", r"(\d+)"),
                ("tag", r"([\w\s]+)"),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn prefix_extracts_header_fields() {
        let t = junos_prefix();
        let out = t
            .extract("<149>Mar 30 12:45:19 re0.edge01.bjm01 rpd[2902]: BGP_PREFIX_THRESH_EXCEEDED: 172.17.17.1 (External AS 123456): x")
            .unwrap();
        assert_eq!(out["pri"], json!("149"));
        assert_eq!(out["date"], json!("Mar 30"));
        assert_eq!(out["time"], json!("12:45:19"));
        assert_eq!(out["hostPrefix"], json!("re0."));
        assert_eq!(out["host"], json!("edge01.bjm01"));
        assert_eq!(out["tag"], json!("BGP_PREFIX_THRESH_EXCEEDED"));
        assert_eq!(out["message"], json!("172.17.17.1 (External AS 123456): x"));
    }

    #[test]
    fn capture_order_follows_line_not_values() {
        // BTreeMap 순서(a, b)와 라인 순서(b, a)가 다릅니다.
        let t = CompiledTemplate::compile("{b} then {a}", &values(&[("a", r"(\d+)"), ("b", r"(\w+)")]))
            .unwrap();
        let out = t.extract("word then 42").unwrap();
        assert_eq!(out["a"], json!("42"));
        assert_eq!(out["b"], json!("word"));
        assert_eq!(t.field_names().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn literal_metacharacters_are_escaped_and_spaces_flexible() {
        let t = CompiledTemplate::compile(
            "{peer} (External AS {asn})",
            &values(&[("peer", r"([\d\.]+)"), ("asn", r"(\d+)")]),
        )
        .unwrap();
        let out = t.extract("10.0.0.1   (External  AS 65001)").unwrap();
        assert_eq!(out["asn"], json!("65001"));
        assert!(t.extract("10.0.0.1 External AS 65001").is_none());
    }

    #[test]
    fn modifiers_are_stripped_and_applied() {
        let t = CompiledTemplate::compile(
            "AS {asn} state {state}",
            &values(&[("asn | int", r"(\d+)"), ("state|bgp_state_convert", r"(\w+)")]),
        )
        .unwrap();
        let out = t.extract("AS 123456 state OpenSent").unwrap();
        assert_eq!(out["asn"], json!(123456));
        assert_eq!(out["state"], json!("OPEN_SENT"));
    }

    #[test]
    fn fragments_without_groups_are_wrapped() {
        let t = CompiledTemplate::compile("id {id} end", &values(&[("id", r"\d+")])).unwrap();
        assert_eq!(t.extract("id 7 end").unwrap()["id"], json!("7"));
    }

    #[test]
    fn fragments_with_inner_groups_keep_numbering() {
        let t = CompiledTemplate::compile(
            "{a} {b}",
            &values(&[("a", r"((?:x)(y))"), ("b", r"(\d+)")]),
        )
        .unwrap();
        let out = t.extract("xy 5").unwrap();
        assert_eq!(out["a"], json!("xy"));
        assert_eq!(out["b"], json!("5"));
    }

    #[test]
    fn mismatch_is_reported_both_ways() {
        let err = CompiledTemplate::compile("{a} {b}", &values(&[("a", "(x)"), ("c", "(y)")]))
            .unwrap_err();
        match err {
            TemplateError::Mismatch { missing, unused } => {
                assert_eq!(missing, vec!["b".to_owned()]);
                assert_eq!(unused, vec!["c".to_owned()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_placeholder_is_rejected() {
        let err = CompiledTemplate::compile("{a} {a}", &values(&[("a", "(x)")])).unwrap_err();
        assert!(matches!(err, TemplateError::DuplicatePlaceholder(_)));
    }

    #[test]
    fn bad_fragment_names_the_field() {
        let err = CompiledTemplate::compile("{a}", &values(&[("a", "(x")])).unwrap_err();
        assert!(matches!(err, TemplateError::Regex { ref field, .. } if field == "a"));
    }

    #[test]
    fn placeholder_scanner_ignores_non_identifiers() {
        let spots = placeholders("{a} {not valid} {} {b_2}");
        let names: Vec<_> = spots.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b_2"]);
    }

    #[test]
    fn unknown_modifiers_are_listed() {
        let t = CompiledTemplate::compile("{a}", &values(&[("a|rot13", "(x)")])).unwrap();
        assert_eq!(t.unknown_modifiers().collect::<Vec<_>>(), vec![("a", "rot13")]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn literal_text_is_matched_verbatim(lit in "[a-zA-Z0-9 .*+?()|^$:-]{0,30}", value in "[a-z]{1,12}") {
                let line = format!("{lit}{{a}}");
                let t = CompiledTemplate::compile(&line, &values(&[("a", r"(\w+)")])).unwrap();
                let fields = t.extract(&format!("{lit}{value}")).unwrap();
                prop_assert_eq!(&fields["a"], &Value::String(value));
            }

            #[test]
            fn extract_on_arbitrary_text_does_not_panic(text in ".{0,200}") {
                let t = CompiledTemplate::compile_prefix(
                    "{date} {time} {host} {tag}: ",
                    &values(&[
                        ("date", r"(\w+\s+\d+)"),
                        ("time", r"(\d\d:\d\d:\d\d)"),
                        ("host", r"([^ ]+)"),
                        ("tag", r"(\w+)"),
                    ]),
                )
                .unwrap();
                let _ = t.extract(&text);
            }
        }
    }
}
