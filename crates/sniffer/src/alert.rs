//! 알림 로그 기록기
//!
//! 매칭된 프레임마다 `"<rule.message> ~> <summary>"` 한 줄을 추가합니다.
//! 파일은 시작 시 한 번 열며 (create + append), 기록마다 flush합니다.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use sigwatch_rules::Rule;

use crate::error::AlertError;

/// 알림 로그 파일
#[derive(Debug)]
pub struct AlertSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl AlertSink {
    /// 알림 로그를 엽니다. 상위 디렉토리가 없으면 생성합니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AlertError> {
        let path = path.as_ref();
        let open_err = |source| AlertError::Open {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_err)?;

        tracing::info!(path = %path.display(), "alert log opened");

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    /// 알림 한 줄을 기록합니다.
    pub fn record(&self, rule: &Rule, summary: impl fmt::Display) -> Result<(), AlertError> {
        let line = format!("{} ~> {}\n", rule.message, summary);
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// 알림 로그 경로를 반환합니다.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
