// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/output.rs - 输出定义
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(feature = "directory_history")]
use crate::FromUrlWithScheme;

/// 提交给历史记录的一条扫描结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
  pub device_id: String,
  pub variety: String,
  pub ripeness: String,
  pub confidence: String,
  pub image_uri: String,
  /// 毫秒时间戳
  pub timestamp: i64,
}

#[derive(Error, Debug)]
pub enum HistoryError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("历史记录被拒绝: {0}")]
  Rejected(String),
  #[error("历史记录通道已关闭")]
  Closed,
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 历史记录的外部存储
pub trait HistorySink: Send {
  fn store(&mut self, record: &ScanRecord) -> Result<(), HistoryError>;
}

impl<S: HistorySink + ?Sized> HistorySink for Box<S> {
  fn store(&mut self, record: &ScanRecord) -> Result<(), HistoryError> {
    (**self).store(record)
  }
}

mod history;
pub use self::history::{HistoryRecorder, MemoryHistory, Submission};

#[cfg(feature = "directory_history")]
mod directory_history;
#[cfg(feature = "directory_history")]
pub use self::directory_history::DirectoryHistory;

/// 按 URL 方案选择历史存储
pub enum HistoryWrapper {
  Memory(MemoryHistory),
  #[cfg(feature = "directory_history")]
  Directory(DirectoryHistory),
}

impl FromUrl for HistoryWrapper {
  type Error = HistoryError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "memory" => Ok(HistoryWrapper::Memory(MemoryHistory::default())),
      #[cfg(feature = "directory_history")]
      DirectoryHistory::SCHEME => Ok(HistoryWrapper::Directory(DirectoryHistory::from_url(url)?)),
      _ => Err(HistoryError::SchemeMismatch),
    }
  }
}

impl HistorySink for HistoryWrapper {
  fn store(&mut self, record: &ScanRecord) -> Result<(), HistoryError> {
    match self {
      HistoryWrapper::Memory(sink) => sink.store(record),
      #[cfg(feature = "directory_history")]
      HistoryWrapper::Directory(sink) => sink.store(record),
    }
  }
}
