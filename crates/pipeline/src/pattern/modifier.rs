//! 캡처 값 후처리 함수 (`name|modifier` 키)

use std::fmt;

use serde_json::Value;

/// 캡처 문자열에 적용하는 변환
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    /// 정수 변환
    Int,
    /// 실수 변환
    Float,
    /// 문자열 그대로
    Str,
    /// 대문자
    Upper,
    /// 소문자
    Lower,
    /// 단어 첫 글자만 대문자
    Title,
    /// 앞뒤 공백 제거
    Strip,
    /// RED → 3, YELLOW → 4
    ColorToSeverity,
    /// BGP 상태 이름 정규화
    BgpStateConvert,
    /// BFD 상태 이름 정규화
    BfdStateConvert,
    /// 알 수 없는 이름. 값을 바꾸지 않습니다.
    Unknown(String),
}

impl Modifier {
    /// 이름으로 변환을 찾습니다. 모르는 이름은 [`Modifier::Unknown`].
    pub fn parse(name: &str) -> Self {
        match name {
            "int" => Self::Int,
            "float" => Self::Float,
            "str" => Self::Str,
            "upper" => Self::Upper,
            "lower" => Self::Lower,
            "title" => Self::Title,
            "strip" => Self::Strip,
            "color_to_severity" => Self::ColorToSeverity,
            "bgp_state_convert" => Self::BgpStateConvert,
            "bfd_state_convert" => Self::BfdStateConvert,
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// 캡처 문자열에 변환을 적용합니다.
    ///
    /// 숫자 변환에 실패하면 경고를 남기고 원래 문자열을 유지합니다.
    pub fn apply(&self, raw: &str) -> Value {
        match self {
            Self::Int => match raw.trim().parse::<i64>() {
                Ok(n) => Value::from(n),
                Err(e) => cast_failed(self, raw, &e),
            },
            Self::Float => match raw.trim().parse::<f64>() {
                Ok(f) => serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(raw.to_owned())),
                Err(e) => cast_failed(self, raw, &e),
            },
            Self::Str | Self::Unknown(_) => Value::String(raw.to_owned()),
            Self::Upper => Value::String(raw.to_uppercase()),
            Self::Lower => Value::String(raw.to_lowercase()),
            Self::Title => Value::String(title_case(raw)),
            Self::Strip => Value::String(raw.trim().to_owned()),
            Self::ColorToSeverity => match raw {
                "RED" => Value::from(3),
                "YELLOW" => Value::from(4),
                other => Value::String(other.to_owned()),
            },
            Self::BgpStateConvert => Value::String(match raw {
                "OpenSent" => "OPEN_SENT".to_owned(),
                "OpenConfirm" => "OPEN_CONFIRM".to_owned(),
                "Up" => "ESTABLISHED".to_owned(),
                "Down" => "ACTIVE".to_owned(),
                other => other.to_uppercase(),
            }),
            Self::BfdStateConvert => match raw {
                "AdminDown" => Value::String("ADMIN_DOWN".to_owned()),
                other => Value::String(other.to_uppercase()),
            },
        }
    }
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Upper => "upper",
            Self::Lower => "lower",
            Self::Title => "title",
            Self::Strip => "strip",
            Self::ColorToSeverity => "color_to_severity",
            Self::BgpStateConvert => "bgp_state_convert",
            Self::BfdStateConvert => "bfd_state_convert",
            Self::Unknown(name) => name,
        };
        f.write_str(name)
    }
}

fn cast_failed(modifier: &Modifier, raw: &str, err: &dyn fmt::Display) -> Value {
    tracing::error!(modifier = %modifier, value = raw, error = %err, "unable to cast captured value");
    Value::String(raw.to_owned())
}

fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for c in raw.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
