//! 프로파일 로더 -- 디스크의 OS 디렉토리를 읽어 [`ProfileSet`]을 만듭니다.
//!
//! OS 디렉토리 안의 `.yml`/`.yaml` 파일을 모두 깊은 병합합니다.
//! 초기화 파일(`init`, `index`, `__init__`)을 먼저 읽고 나머지는 이름 순입니다.
//! 초기화 파일 파싱 실패는 그 OS 를 버리고, 나머지 파일 실패는 경고 후 건너뜁니다.
//! `__` 로 시작하는 디렉토리는 무시합니다.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use netlog_core::config::EngineConfig;
use serde_yaml::Value;

use crate::error::EngineError;
use crate::filter::ListFilter;

use super::merge::deep_merge;
use super::schema;
use super::{DeviceProfile, OS_INIT_FILENAMES, ProfileSet};

/// 프로파일 파일 최대 크기
const MAX_PROFILE_FILE_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// 프로파일 로더
#[derive(Debug, Clone)]
pub struct ProfileLoader {
    base: PathBuf,
    extension: Option<PathBuf>,
    devices: ListFilter,
}

impl ProfileLoader {
    /// 기본 디렉토리로 로더를 만듭니다.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            extension: None,
            devices: ListFilter::default(),
        }
    }

    /// 엔진 설정으로 로더를 만듭니다.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut loader = Self::new(&config.profiles_dir)
            .devices(&config.device_whitelist, &config.device_blacklist);
        if !config.extension_dir.is_empty() {
            loader = loader.extension(&config.extension_dir);
        }
        loader
    }

    /// 기본 디렉토리 위에 병합할 확장 디렉토리를 지정합니다.
    pub fn extension(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extension = Some(dir.into());
        self
    }

    /// 로드할 OS 를 허용/차단 목록으로 고릅니다.
    pub fn devices(mut self, whitelist: &[String], blacklist: &[String]) -> Self {
        self.devices = ListFilter::new(whitelist, blacklist);
        self
    }

    /// 프로파일을 읽고 병합하고 검증합니다.
    ///
    /// 잘못된 OS 프로파일은 에러 로그를 남기고 제외합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우 [`EngineError::ProfileLoad`]
    /// - 유효한 OS 가 하나도 없으면 [`EngineError::NoProfiles`]
    pub async fn load(&self) -> Result<ProfileSet, EngineError> {
        let mut trees = self.load_tree(&self.base).await?;

        if let Some(ext) = &self.extension
            && !same_dir(ext, &self.base)
        {
            tracing::info!(dir = %ext.display(), "reading extension profiles");
            for (os, tree) in self.load_tree(ext).await? {
                match trees.get_mut(&os) {
                    Some(existing) => deep_merge(existing, tree),
                    None => {
                        trees.insert(os, tree);
                    }
                }
            }
        }

        let mut profiles = ProfileSet::new();
        for (os, tree) in trees {
            match Self::build_profile(&os, tree) {
                Ok(Some(profile)) => {
                    profiles.insert(os, profile);
                }
                Ok(None) => {
                    tracing::warn!(os = %os, "no profile content found, skipping");
                }
                Err(e) => {
                    tracing::error!(os = %os, error = %e, "invalid device profile, skipping");
                }
            }
        }

        if profiles.is_empty() {
            return Err(EngineError::NoProfiles {
                dir: self.base.display().to_string(),
            });
        }

        tracing::info!(
            dir = %self.base.display(),
            count = profiles.len(),
            devices = ?profiles.keys().collect::<Vec<_>>(),
            "loaded device profiles"
        );
        Ok(profiles)
    }

    /// 병합된 OS 트리를 검증하고 타입으로 바꿉니다. 비어 있으면 `None`.
    pub fn build_profile(os: &str, tree: Value) -> Result<Option<DeviceProfile>, EngineError> {
        if tree.is_null() || tree.as_mapping().is_some_and(|m| m.is_empty()) {
            return Ok(None);
        }
        schema::validate(os, &tree)?;
        let profile = serde_yaml::from_value(tree).map_err(|e| EngineError::Profile {
            os: os.to_owned(),
            path: String::new(),
            reason: e.to_string(),
        })?;
        Ok(Some(profile))
    }

    async fn load_tree(&self, dir: &Path) -> Result<BTreeMap<String, Value>, EngineError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| load_error(dir, format!("failed to read directory: {e}")))?;

        let mut trees = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| load_error(dir, format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            let Some(os) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            if !is_dir || os.starts_with("__") || os.starts_with('.') {
                continue;
            }
            if !self.devices.admits(&os) {
                tracing::debug!(os = %os, "not loading profile (whitelist/blacklist)");
                continue;
            }

            match Self::load_os_dir(&os, &path).await {
                Ok(tree) => {
                    trees.insert(os, tree);
                }
                Err(e) => {
                    tracing::error!(os = %os, error = %e, "failed to load device profile, skipping");
                }
            }
        }

        if trees.is_empty() {
            tracing::warn!(dir = %dir.display(), "no OS subdirectories found");
        }
        Ok(trees)
    }

    /// OS 디렉토리 하나의 YAML 파일을 병합합니다.
    pub async fn load_os_dir(os: &str, dir: &Path) -> Result<Value, EngineError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| load_error(dir, format!("failed to read directory: {e}")))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| load_error(dir, format!("failed to read directory entry: {e}")))?
        {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                files.push(path);
            } else {
                tracing::debug!(path = %path.display(), "ignoring file (extension not allowed)");
            }
        }
        files.sort_by_key(|p| (!is_init_file(p), p.clone()));

        let mut tree = Value::Null;
        for path in files {
            let init = is_init_file(&path);
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if !init && stem.starts_with("__") {
                continue;
            }
            match Self::load_file(&path).await {
                Ok(cfg) => deep_merge(&mut tree, cfg),
                Err(e) if init => {
                    return Err(EngineError::Profile {
                        os: os.to_owned(),
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(os = %os, path = %path.display(), error = %e, "invalid profile file, skipping");
                }
            }
        }
        Ok(tree)
    }

    /// 단일 YAML 파일을 읽습니다.
    pub async fn load_file(path: &Path) -> Result<Value, EngineError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_error(path, format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_PROFILE_FILE_SIZE {
            return Err(load_error(
                path,
                format!(
                    "file too large: {} bytes (max: {MAX_PROFILE_FILE_SIZE})",
                    metadata.len()
                ),
            ));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_error(path, format!("failed to read file: {e}")))?;
        Self::parse_yaml(&content, &path.display().to_string())
    }

    /// YAML 문자열을 트리로 파싱합니다. 빈 문서는 `null` 입니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Value, EngineError> {
        serde_yaml::from_str(yaml_str).map_err(|e| EngineError::ProfileLoad {
            path: source.to_owned(),
            reason: format!("YAML parse error: {e}"),
        })
    }
}

fn is_init_file(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| OS_INIT_FILENAMES.contains(&stem))
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn load_error(path: &Path, reason: String) -> EngineError {
    EngineError::ProfileLoad {
        path: path.display().to_string(),
        reason,
    }
}
