//! 허용/차단 목록 필터
//!
//! 차단 목록을 먼저 확인하고, 허용 목록이 비어 있지 않으면 그다음 확인합니다.
//! 각 항목은 완전 일치 → glob → `\A..\Z` 정규식 순서로 비교합니다.
//!
//! 발행자의 에러 분류 필터와 장비 OS 선택(`device_whitelist` / `device_blacklist`)에
//! 함께 쓰입니다.

use netlog_core::config::PublisherConfig;
use netlog_core::envelope::{RAW, UNKNOWN};
use regex::Regex;

/// 목록 항목 하나
#[derive(Debug, Clone)]
struct Expr {
    text: String,
    glob: Option<glob::Pattern>,
    regex: Option<Regex>,
}

impl Expr {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            glob: glob::Pattern::new(text).ok(),
            regex: Regex::new(&format!(r"\A(?:{text})\z")).ok(),
        }
    }

    fn matches(&self, value: &str) -> bool {
        value == self.text
            || self.glob.as_ref().is_some_and(|g| g.matches(value))
            || self.regex.as_ref().is_some_and(|r| r.is_match(value))
    }
}

/// 허용/차단 목록
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    whitelist: Vec<Expr>,
    blacklist: Vec<Expr>,
}

impl ListFilter {
    /// 목록으로 필터를 만듭니다.
    pub fn new(whitelist: &[String], blacklist: &[String]) -> Self {
        Self {
            whitelist: whitelist.iter().map(|s| Expr::new(s)).collect(),
            blacklist: blacklist.iter().map(|s| Expr::new(s)).collect(),
        }
    }

    /// 발행자 설정으로 에러 분류 필터를 만듭니다.
    ///
    /// 기본 차단 목록에는 `UNKNOWN`, `RAW` 가 들어가며 `send_*` 가 이를 빼고
    /// `only_*` 는 허용 목록을 그 하나로 고정합니다.
    pub fn for_publisher(config: &PublisherConfig) -> Self {
        let mut whitelist = config.error_whitelist.clone();
        let mut blacklist = config.error_blacklist.clone();
        for default in [UNKNOWN, RAW] {
            if !blacklist.iter().any(|b| b == default) {
                blacklist.push(default.to_owned());
            }
        }
        if config.only_unknown {
            whitelist = vec![UNKNOWN.to_owned()];
            blacklist.clear();
        }
        if config.only_raw {
            whitelist = vec![RAW.to_owned()];
            blacklist.clear();
        }
        if config.send_unknown {
            blacklist.retain(|b| b != UNKNOWN);
        }
        if config.send_raw {
            blacklist.retain(|b| b != RAW);
        }
        Self::new(&whitelist, &blacklist)
    }

    /// 값이 필터를 통과하는지 확인합니다.
    pub fn admits(&self, value: &str) -> bool {
        if self.blacklist.iter().any(|e| e.matches(value)) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.iter().any(|e| e.matches(value))
    }
}

/// 발행자 중 하나라도 이 에러 분류를 받는지 확인합니다.
///
/// 디스패처의 UNKNOWN 전달, 워커의 RAW 전달 여부를 정할 때 씁니다.
pub fn any_publisher_admits(publishers: &[PublisherConfig], error: &str) -> bool {
    publishers
        .iter()
        .any(|p| ListFilter::for_publisher(p).admits(error))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn empty_filter_admits_everything() {
        assert!(ListFilter::default().admits("ANYTHING"));
    }

    #[test]
    fn blacklist_wins_over_whitelist() {
        let f = ListFilter::new(&strings(&["BGP_*"]), &strings(&["BGP_MD5_INCORRECT"]));
        assert!(f.admits("BGP_PREFIX_THRESH_EXCEEDED"));
        assert!(!f.admits("BGP_MD5_INCORRECT"));
        assert!(!f.admits("INTERFACE_DOWN"));
    }

    #[test]
    fn glob_and_regex_expressions() {
        let f = ListFilter::new(&[], &strings(&["OSPF_*", "INTERFACE_(UP|DOWN)"]));
        assert!(!f.admits("OSPF_NEIGHBOR_DOWN"));
        assert!(!f.admits("INTERFACE_DOWN"));
        assert!(f.admits("INTERFACE_DOWN_EXTRA"));
        assert!(f.admits("BGP_NEIGHBOR_STATE_CHANGED"));
    }

    #[test]
    fn invalid_regex_falls_back_to_literal() {
        let f = ListFilter::new(&[], &strings(&["(unclosed"]));
        assert!(!f.admits("(unclosed"));
        assert!(f.admits("unclosed"));
    }

    #[test]
    fn publisher_defaults_deny_unknown_and_raw() {
        let f = ListFilter::for_publisher(&PublisherConfig::default());
        assert!(!f.admits(UNKNOWN));
        assert!(!f.admits(RAW));
        assert!(f.admits("BGP_PREFIX_THRESH_EXCEEDED"));
    }

    #[test]
    fn send_flags_lift_default_denials() {
        let config = PublisherConfig {
            send_unknown: true,
            ..PublisherConfig::default()
        };
        let f = ListFilter::for_publisher(&config);
        assert!(f.admits(UNKNOWN));
        assert!(!f.admits(RAW));
    }

    #[test]
    fn explicit_unknown_deny_never_emits_unknown() {
        let config = PublisherConfig {
            send_raw: true,
            error_blacklist: strings(&["UNKNOWN"]),
            ..PublisherConfig::default()
        };
        let f = ListFilter::for_publisher(&config);
        assert!(!f.admits(UNKNOWN));
        assert!(f.admits(RAW));
    }

    #[test]
    fn raw_whitelist_with_default_deny_emits_only_raw() {
        let config = PublisherConfig {
            only_raw: true,
            ..PublisherConfig::default()
        };
        let f = ListFilter::for_publisher(&config);
        assert!(f.admits(RAW));
        assert!(!f.admits(UNKNOWN));
        assert!(!f.admits("BGP_PREFIX_THRESH_EXCEEDED"));
    }

    #[test]
    fn raw_whitelist_alone_stays_denied_by_default_blacklist() {
        let config = PublisherConfig {
            error_whitelist: strings(&["RAW"]),
            ..PublisherConfig::default()
        };
        let f = ListFilter::for_publisher(&config);
        assert!(!f.admits(RAW));
        assert!(!f.admits(UNKNOWN));
        assert!(!f.admits("BGP_PREFIX_THRESH_EXCEEDED"));
        assert!(!any_publisher_admits(&[config], RAW));
    }

    #[test]
    fn raw_whitelist_with_send_raw_admits_only_raw() {
        let config = PublisherConfig {
            send_raw: true,
            error_whitelist: strings(&["RAW"]),
            ..PublisherConfig::default()
        };
        let f = ListFilter::for_publisher(&config);
        assert!(f.admits(RAW));
        assert!(!f.admits(UNKNOWN));
        assert!(!f.admits("BGP_PREFIX_THRESH_EXCEEDED"));
        assert!(any_publisher_admits(&[config], RAW));
    }

    #[test]
    fn device_selection_uses_same_logic() {
        let f = ListFilter::new(&strings(&["junos", "ios*"]), &strings(&["iosxr"]));
        assert!(f.admits("junos"));
        assert!(f.admits("ios"));
        assert!(!f.admits("iosxr"));
        assert!(!f.admits("eos"));
    }

    #[test]
    fn forwarding_is_the_or_across_publishers() {
        let quiet = PublisherConfig::default();
        let audit = PublisherConfig {
            only_raw: true,
            ..PublisherConfig::default()
        };
        assert!(!any_publisher_admits(&[quiet.clone()], RAW));
        assert!(any_publisher_admits(&[quiet.clone(), audit.clone()], RAW));
        assert!(!any_publisher_admits(&[quiet, audit], UNKNOWN));
        assert!(!any_publisher_admits(&[], RAW));
    }
}
