// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/output/directory_history.rs - 目录历史记录
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

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{HistoryError, HistorySink, ScanRecord},
};

const HISTORY_FILE: &str = "history.jsonl";

/// 以 JSON Lines 追加写入目录下的 `history.jsonl`
#[derive(Debug, Clone)]
pub struct DirectoryHistory {
  directory: PathBuf,
}

impl FromUrlWithScheme for DirectoryHistory {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryHistory {
  type Error = HistoryError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(HistoryError::SchemeMismatch);
    }

    let path = urlencoding::decode(uri.path())
      .map_err(|e| HistoryError::Rejected(format!("路径解码失败: {}", e)))?;
    Ok(DirectoryHistory::new(path.as_ref()))
  }
}

impl DirectoryHistory {
  pub fn new<P: AsRef<Path>>(directory: P) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
    }
  }

  pub fn file_path(&self) -> PathBuf {
    self.directory.join(HISTORY_FILE)
  }

  /// 读取全部记录，无法解析的行会被跳过
  pub fn load_all(&self) -> Result<Vec<ScanRecord>, HistoryError> {
    let path = self.file_path();
    if !path.exists() {
      return Ok(Vec::new());
    }

    let reader = BufReader::new(std::fs::File::open(&path)?);
    let mut records = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      match serde_json::from_str::<ScanRecord>(&line) {
        Ok(record) => records.push(record),
        Err(e) => warn!("跳过第 {} 行无效记录: {}", lineno + 1, e),
      }
    }
    debug!("从 {} 读取 {} 条记录", path.display(), records.len());
    Ok(records)
  }

  /// 指定设备的记录，按时间倒序
  pub fn load_for_device(&self, device_id: &str) -> Result<Vec<ScanRecord>, HistoryError> {
    let mut records: Vec<_> = self
      .load_all()?
      .into_iter()
      .filter(|r| r.device_id == device_id)
      .collect();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(records)
  }
}

impl HistorySink for DirectoryHistory {
  fn store(&mut self, record: &ScanRecord) -> Result<(), HistoryError> {
    std::fs::create_dir_all(&self.directory)?;
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(self.file_path())?;
    file.write_all(line.as_bytes())?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(uri: &str, device: &str, timestamp: i64) -> ScanRecord {
    ScanRecord {
      device_id: device.to_string(),
      variety: "Carabao".to_string(),
      ripeness: "Unripe".to_string(),
      confidence: "64.2".to_string(),
      image_uri: uri.to_string(),
      timestamp,
    }
  }

  #[test]
  fn appends_and_reads_back_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut history = DirectoryHistory::new(dir.path().join("history"));
    history.store(&record("file:///1.jpg", "dev", 100)).unwrap();
    history.store(&record("file:///2.jpg", "other", 200)).unwrap();
    history.store(&record("file:///3.jpg", "dev", 300)).unwrap();

    let records = history.load_for_device("dev").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].image_uri, "file:///3.jpg");
    assert_eq!(records[1].image_uri, "file:///1.jpg");
  }

  #[test]
  fn record_uses_camel_case_fields() {
    let dir = tempfile::tempdir().unwrap();
    let mut history = DirectoryHistory::new(dir.path());
    history.store(&record("file:///1.jpg", "dev", 1)).unwrap();
    let text = std::fs::read_to_string(history.file_path()).unwrap();
    assert!(text.contains("\"deviceId\":\"dev\""));
    assert!(text.contains("\"imageUri\":\"file:///1.jpg\""));
  }

  #[test]
  fn malformed_lines_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut history = DirectoryHistory::new(dir.path());
    history.store(&record("file:///1.jpg", "dev", 1)).unwrap();
    let mut file = OpenOptions::new()
      .append(true)
      .open(history.file_path())
      .unwrap();
    writeln!(file, "{{ broken").unwrap();

    assert_eq!(history.load_all().unwrap().len(), 1);
  }

  #[test]
  fn missing_file_is_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    let history = DirectoryHistory::new(dir.path().join("none"));
    assert!(history.load_all().unwrap().is_empty());
  }

  #[test]
  fn from_url_uses_folder_scheme() {
    let url = url::Url::parse("folder:///var/lib/ripescan%20data").unwrap();
    let history = DirectoryHistory::from_url(&url).unwrap();
    assert_eq!(
      history.file_path(),
      PathBuf::from("/var/lib/ripescan data").join(HISTORY_FILE)
    );
    let url = url::Url::parse("memory://").unwrap();
    assert!(DirectoryHistory::from_url(&url).is_err());
  }
}
