//! 경로 기반 트리 빌더 -- 구조화 객체(`yang_message`) 조립
//!
//! `bgp//neighbors//neighbor//10.0.0.1//state` 같은 구분자 경로를 따라 값을 설정합니다.
//! 정수 세그먼트는 리스트 노드, 나머지는 맵 노드를 만듭니다.
//!
//! ```
//! use netlog_core::tree::{Node, PathSegment};
//!
//! let mut root = Node::default();
//! root.set(&PathSegment::parse("a//b", "//"), "v".into()).unwrap();
//! root.set(&PathSegment::parse("a//c", "//"), "X".into()).unwrap();
//! assert_eq!(root.into_value(), serde_json::json!({"a": {"b": "v", "c": "X"}}));
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::TreeError;

/// 리스트 세그먼트로 쓸 수 있는 가장 큰 인덱스
pub const MAX_LIST_INDEX: usize = 1024;

/// 경로 한 칸
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// 맵 키
    Key(String),
    /// 리스트 인덱스
    Index(usize),
}

impl PathSegment {
    /// 경로 문자열을 세그먼트 목록으로 나눕니다.
    pub fn parse(path: &str, delimiter: &str) -> Vec<Self> {
        path.split(delimiter)
            .map(|part| match part.parse::<usize>() {
                Ok(idx) => Self::Index(idx),
                Err(_) => Self::Key(part.to_owned()),
            })
            .collect()
    }

    fn empty_container(&self) -> Node {
        match self {
            Self::Key(_) => Node::Map(BTreeMap::new()),
            Self::Index(_) => Node::List(Vec::new()),
        }
    }
}

/// 조립 중인 트리 노드
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// 키 → 하위 노드
    Map(BTreeMap<String, Node>),
    /// 인덱스 → 하위 노드
    List(Vec<Node>),
    /// 말단 값
    Scalar(Value),
}

impl Default for Node {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl Node {
    /// 경로 끝에 값을 설정합니다. 중간 노드는 필요하면 만듭니다.
    ///
    /// 말단에 이미 있던 값은 덮어씁니다. 맵 자리에 인덱스가 오거나
    /// 리스트 자리에 키가 오면 [`TreeError::Conflict`] 입니다.
    pub fn set(&mut self, path: &[PathSegment], value: Value) -> Result<(), TreeError> {
        if path.is_empty() {
            return Err(TreeError::EmptyPath);
        }
        self.set_at(path, 0, value)
    }

    fn set_at(&mut self, path: &[PathSegment], depth: usize, value: Value) -> Result<(), TreeError> {
        let segment = &path[depth];
        let is_last = depth + 1 == path.len();
        let slot = self.child_mut(segment, path, depth)?;

        if is_last {
            *slot = Node::Scalar(value);
            return Ok(());
        }

        let next = &path[depth + 1];
        let compatible = matches!(
            (&*slot, next),
            (Node::Map(_), PathSegment::Key(_)) | (Node::List(_), PathSegment::Index(_))
        );
        if !compatible {
            // 새로 만든 빈 자리만 다음 세그먼트 모양으로 바꿉니다.
            let vacant = match &*slot {
                Node::Map(map) => map.is_empty(),
                Node::Scalar(value) => value.is_null(),
                Node::List(_) => false,
            };
            if !vacant {
                return Err(TreeError::Conflict {
                    path: render(&path[..=depth]),
                });
            }
            *slot = next.empty_container();
        }
        slot.set_at(path, depth + 1, value)
    }

    fn child_mut(
        &mut self,
        segment: &PathSegment,
        path: &[PathSegment],
        depth: usize,
    ) -> Result<&mut Node, TreeError> {
        match (self, segment) {
            (Node::Map(map), PathSegment::Key(key)) => Ok(map.entry(key.clone()).or_default()),
            (Node::List(_), PathSegment::Index(idx)) if *idx > MAX_LIST_INDEX => {
                Err(TreeError::IndexOutOfRange {
                    path: render(&path[..=depth]),
                    max: MAX_LIST_INDEX,
                })
            }
            (Node::List(list), PathSegment::Index(idx)) => {
                while list.len() <= *idx {
                    list.push(Node::default());
                }
                Ok(&mut list[*idx])
            }
            _ => Err(TreeError::Conflict {
                path: render(&path[..=depth]),
            }),
        }
    }

    /// JSON 값으로 변환합니다.
    pub fn into_value(self) -> Value {
        match self {
            Node::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
            Node::List(list) => Value::Array(list.into_iter().map(Node::into_value).collect()),
            Node::Scalar(value) => value,
        }
    }
}

fn render(path: &[PathSegment]) -> String {
    path.iter()
        .map(|seg| match seg {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}
