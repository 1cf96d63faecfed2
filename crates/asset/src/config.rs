//! Pipeline configuration: where textures and the txa file are found.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const TXA_FILE_ENV: &str = "SVAROG_TXA_FILE";
pub const MODEL_PATH_ENV: &str = "SVAROG_MODEL_PATH";
pub const DEFAULT_TXA_FILE: &str = "textures.txa";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Texture attribute file read by the txa filter.
    pub txa_file: PathBuf,
    /// Directories searched, in order, for relative paths.
    pub model_path: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            txa_file: PathBuf::from(DEFAULT_TXA_FILE),
            model_path: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `SVAROG_TXA_FILE` and `SVAROG_MODEL_PATH`
    /// (a platform path list).
    pub fn from_env() -> Self {
        Self::from_vars(env::var_os(TXA_FILE_ENV), env::var_os(MODEL_PATH_ENV))
    }

    pub fn from_vars(txa_file: Option<OsString>, model_path: Option<OsString>) -> Self {
        let mut config = Self::default();
        if let Some(txa) = txa_file.filter(|v| !v.is_empty()) {
            config.txa_file = PathBuf::from(txa);
        }
        if let Some(dirs) = model_path {
            config.model_path = env::split_paths(&dirs)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        config
    }

    pub fn with_txa_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.txa_file = path.into();
        self
    }

    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_path.push(dir.into());
        self
    }

    /// Find `path` on disk: as given, then under each model-path directory.
    pub fn resolve(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        if path.is_absolute() {
            return None;
        }
        self.model_path
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vars_override_defaults() {
        let config = PipelineConfig::from_vars(None, None);
        assert_eq!(config, PipelineConfig::default());

        let dirs = env::join_paths(["/a", "/b"]).unwrap();
        let config = PipelineConfig::from_vars(Some("custom.txa".into()), Some(dirs));
        assert_eq!(config.txa_file, PathBuf::from("custom.txa"));
        assert_eq!(config.model_path, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn resolve_searches_model_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("found.txa"), "").unwrap();
        let config = PipelineConfig::default().with_model_dir(dir.path());
        assert_eq!(
            config.resolve(Path::new("found.txa")),
            Some(dir.path().join("found.txa"))
        );
        assert_eq!(config.resolve(Path::new("missing.txa")), None);
    }
}
