//! 프로파일 트리 깊은 병합
//!
//! - 맵 + 맵: 키별로 재귀 병합
//! - 리스트 + 리스트: 뒤에 이어 붙이되 이미 있는 항목은 건너뜀
//! - 그 밖: 덮어쓰기

use serde_yaml::Value;

/// `update` 를 `dest` 에 병합합니다.
pub fn deep_merge(dest: &mut Value, update: Value) {
    match (dest, update) {
        (Value::Mapping(dest), Value::Mapping(update)) => {
            for (key, value) in update {
                match dest.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        dest.insert(key, value);
                    }
                }
            }
        }
        (Value::Sequence(dest), Value::Sequence(update)) => {
            for item in update {
                if !dest.contains(&item) {
                    dest.push(item);
                }
            }
        }
        (dest, update) => *dest = update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn maps_merge_recursively() {
        let mut base = yaml("a: {b: 1, c: 2}\nd: x");
        deep_merge(&mut base, yaml("a: {c: 3, e: 4}"));
        assert_eq!(base, yaml("a: {b: 1, c: 3, e: 4}\nd: x"));
    }

    #[test]
    fn lists_concatenate_without_duplicates() {
        let mut base = yaml("messages: [{error: A}, {error: B}]");
        deep_merge(&mut base, yaml("messages: [{error: B}, {error: C}]"));
        assert_eq!(
            base,
            yaml("messages: [{error: A}, {error: B}, {error: C}]")
        );
    }

    #[test]
    fn scalars_and_shape_changes_overwrite() {
        let mut base = yaml("a: 1\nb: [1]\nc: {x: 1}");
        deep_merge(&mut base, yaml("a: 2\nb: {y: 2}\nc: 3"));
        assert_eq!(base, yaml("a: 2\nb: {y: 2}\nc: 3"));
    }

    #[test]
    fn merging_into_null_replaces() {
        let mut base = Value::Null;
        deep_merge(&mut base, yaml("prefixes: []"));
        assert_eq!(base, yaml("prefixes: []"));
    }
}
