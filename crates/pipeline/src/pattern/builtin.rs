//! 내장 메시지 함수

use netlog_core::tree::{Node, PathSegment};
use regex::Regex;
use serde_json::Value;

use crate::message::PrefixMatch;

use super::registry::{FunctionError, MessageFunction};

/// NX-OS `pam_unix(dcos_sshd:session)` 로그인 메시지
///
/// ```text
/// pam_unix(dcos_sshd:session): session opened for user luke by (uid=0) - dcos_sshd[12977]
/// ```
///
/// 결과: `{"users": {"user": {"luke": {"action": {"login": true}, "uid": 0}}}}`
pub struct NxosUserLogin {
    regex: Regex,
}

impl NxosUserLogin {
    /// 등록 이름
    pub const NAME: &'static str = "nxos_user_login";

    /// 정규식을 컴파일합니다.
    pub fn new() -> Result<Self, regex::Error> {
        let regex = Regex::new(
            r"(?i)pam_unix\(dcos_sshd:session\): session opened for user (\w+) by \(uid=(\d+)\) - dcos_sshd\[(\d+)\]",
        )?;
        Ok(Self { regex })
    }
}

impl MessageFunction for NxosUserLogin {
    fn emit(&self, header: &PrefixMatch) -> Result<Value, FunctionError> {
        let Some(caps) = self.regex.captures(header.body()) else {
            return Ok(Value::Object(serde_json::Map::new()));
        };
        let user = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let uid: i64 = caps.get(2).map(|m| m.as_str()).unwrap_or_default().parse()?;

        let user_path = |leaf: &[&str]| {
            let mut path = vec![
                PathSegment::Key("users".to_owned()),
                PathSegment::Key("user".to_owned()),
                PathSegment::Key(user.to_owned()),
            ];
            path.extend(leaf.iter().map(|k| PathSegment::Key((*k).to_owned())));
            path
        };

        let mut root = Node::default();
        root.set(&user_path(&["uid"]), Value::from(uid))?;
        root.set(&user_path(&["action", "login"]), Value::Bool(true))?;
        Ok(root.into_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_login_object() {
        let f = NxosUserLogin::new().unwrap();
        let header = PrefixMatch::unidentified(
            "pam_unix(dcos_sshd:session): session opened for user luke by (uid=0) - dcos_sshd[12977]",
            "10.0.0.1",
        );
        assert_eq!(
            f.emit(&header).unwrap(),
            json!({"users": {"user": {"luke": {"action": {"login": true}, "uid": 0}}}})
        );
    }

    #[test]
    fn unrelated_body_yields_empty_object() {
        let f = NxosUserLogin::new().unwrap();
        let header = PrefixMatch::unidentified("session closed", "10.0.0.1");
        assert_eq!(f.emit(&header).unwrap(), json!({}));
    }
}
