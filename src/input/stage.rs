// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/input/stage.rs - 图像暂存
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! 把外部传入的图像复制到流水线独占的目录中。
//!
//! 外部句柄在调用返回后可能失效，后续阶段和结果展示只使用暂存副本。

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

const FILE_SCHEME: &str = "file";
const IMAGE_SCHEME: &str = "image";
const STAGED_PREFIX: &str = "scan_image";
const DEFAULT_EXTENSION: &str = "jpg";
const MAX_NAME_ATTEMPTS: usize = 8;

#[derive(Error, Debug)]
pub enum StageError {
  #[error("无法打开图像 {path}: {source}")]
  Open { path: String, source: io::Error },
  #[error("无法写入暂存文件 {path}: {source}")]
  Copy { path: String, source: io::Error },
  #[error("不支持的图像来源: {0}")]
  UnsupportedSource(String),
}

/// 暂存后的图像，由流水线独占
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagedImage {
  path: PathBuf,
}

impl StagedImage {
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 读取暂存副本的全部字节
  pub fn read(&self) -> Result<Vec<u8>, StageError> {
    std::fs::read(&self.path).map_err(|e| StageError::Open {
      path: self.path.display().to_string(),
      source: e,
    })
  }

  /// 图像引用，用于展示与历史记录去重
  pub fn uri(&self) -> String {
    Url::from_file_path(&self.path)
      .map(String::from)
      .unwrap_or_else(|_| self.path.display().to_string())
  }
}

pub struct ImageStager {
  directory: PathBuf,
  counter: AtomicU64,
}

impl ImageStager {
  pub fn new<P: AsRef<Path>>(directory: P) -> Self {
    let directory = directory.as_ref();
    let directory = std::path::absolute(directory).unwrap_or_else(|_| directory.to_path_buf());
    Self {
      directory,
      counter: AtomicU64::new(0),
    }
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 支持 `file://` 与 `image://` 两种来源
  pub fn stage_url(&self, source: &Url) -> Result<StagedImage, StageError> {
    let path = match source.scheme() {
      FILE_SCHEME => source
        .to_file_path()
        .map_err(|_| StageError::UnsupportedSource(source.to_string()))?,
      IMAGE_SCHEME => {
        let decoded = urlencoding::decode(source.path())
          .map_err(|e| StageError::UnsupportedSource(format!("{}: {}", source, e)))?;
        PathBuf::from(decoded.into_owned())
      }
      other => {
        error!(
          "URI scheme mismatch: expected '{}' or '{}', found '{}'",
          FILE_SCHEME, IMAGE_SCHEME, other
        );
        return Err(StageError::UnsupportedSource(source.to_string()));
      }
    };
    self.stage_path(&path)
  }

  pub fn stage_path<P: AsRef<Path>>(&self, source: P) -> Result<StagedImage, StageError> {
    let source = source.as_ref();
    let file = File::open(source).map_err(|e| StageError::Open {
      path: source.display().to_string(),
      source: e,
    })?;
    let extension = source
      .extension()
      .and_then(|e| e.to_str())
      .unwrap_or(DEFAULT_EXTENSION);
    self.stage_reader(file, extension)
  }

  /// 从任意可读句柄复制；复制失败时删除残留文件
  pub fn stage_reader<R: Read>(&self, mut reader: R, extension: &str) -> Result<StagedImage, StageError> {
    std::fs::create_dir_all(&self.directory).map_err(|e| StageError::Copy {
      path: self.directory.display().to_string(),
      source: e,
    })?;

    let (path, mut file) = self.create_unique(&sanitize_extension(extension))?;

    let copied = io::copy(&mut reader, &mut file).and_then(|n| file.flush().map(|_| n));
    match copied {
      Ok(bytes) => {
        info!("图像已暂存: {} ({} 字节)", path.display(), bytes);
        Ok(StagedImage { path })
      }
      Err(e) => {
        drop(file);
        if let Err(rm) = std::fs::remove_file(&path) {
          warn!("删除残留暂存文件失败 {}: {}", path.display(), rm);
        }
        Err(StageError::Copy {
          path: path.display().to_string(),
          source: e,
        })
      }
    }
  }

  fn next_name(&self, extension: &str) -> String {
    let id = self.counter.fetch_add(1, Ordering::Relaxed);
    format!(
      "{}_{}-{:04X}.{}",
      STAGED_PREFIX,
      Utc::now().timestamp_millis(),
      id,
      extension
    )
  }

  fn create_unique(&self, extension: &str) -> Result<(PathBuf, File), StageError> {
    let mut last_error = None;
    for _ in 0..MAX_NAME_ATTEMPTS {
      let path = self.directory.join(self.next_name(extension));
      match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => return Ok((path, file)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
          debug!("暂存文件名冲突: {}", path.display());
          last_error = Some((path, e));
        }
        Err(e) => {
          return Err(StageError::Copy {
            path: path.display().to_string(),
            source: e,
          });
        }
      }
    }

    let (path, source) = last_error.unwrap_or_else(|| {
      (
        self.directory.clone(),
        io::Error::from(io::ErrorKind::AlreadyExists),
      )
    });
    Err(StageError::Copy {
      path: path.display().to_string(),
      source,
    })
  }
}

fn sanitize_extension(extension: &str) -> String {
  let ext = extension.trim_start_matches('.').to_lowercase();
  if !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
    ext
  } else {
    DEFAULT_EXTENSION.to_string()
  }
}
