// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/model/label.rs - 标签表与标签拆分
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

use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::ripeness::RipenessToken;

pub const UNKNOWN_LABEL: &str = "Unknown";
const LABEL_SEPARATOR: char = '_';

#[derive(Error, Debug)]
pub enum LabelTableError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件为空: {0}")]
  Empty(String),
}

/// 类别索引到原始标签的映射，顺序与模型训练时一致
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
  labels: Vec<String>,
}

impl LabelTable {
  pub fn new(labels: Vec<String>) -> Self {
    Self { labels }
  }

  /// 每行一个标签，忽略空行与 `#` 注释
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LabelTableError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let labels: Vec<String> = text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty() && !line.starts_with('#'))
      .map(str::to_string)
      .collect();

    if labels.is_empty() {
      return Err(LabelTableError::Empty(path.display().to_string()));
    }
    debug!("从 {} 读取 {} 个标签", path.display(), labels.len());
    Ok(Self { labels })
  }

  /// 越界或缺失的索引返回 `"Unknown"`，不会回绕
  pub fn get(&self, class_id: Option<usize>) -> &str {
    class_id
      .and_then(|idx| self.labels.get(idx))
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

/// 标签按第一个 `_` 拆分后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelParts {
  pub variety: String,
  pub remainder: Option<String>,
  pub token: Option<RipenessToken>,
}

impl LabelParts {
  pub fn parse(label: &str) -> Self {
    let (root, remainder) = match label.split_once(LABEL_SEPARATOR) {
      Some((root, rest)) => (root, Some(rest)),
      None => (label, None),
    };

    let root = root.trim();
    let variety = if root.is_empty() {
      UNKNOWN_LABEL.to_string()
    } else {
      root.to_string()
    };

    let remainder = remainder.filter(|r| !r.is_empty());
    let token = remainder.and_then(RipenessToken::detect);

    Self {
      variety,
      remainder: remainder.map(str::to_string),
      token,
    }
  }

  /// 品种根，大小写不敏感比较用
  pub fn root_key(&self) -> String {
    self.variety.to_lowercase()
  }

  pub fn has_token(&self) -> bool {
    self.token.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> LabelTable {
    LabelTable::new(vec!["Cebu_Ripe".to_string(), "Indian".to_string()])
  }

  #[test]
  fn out_of_range_index_is_unknown() {
    let table = table();
    assert_eq!(table.get(Some(0)), "Cebu_Ripe");
    assert_eq!(table.get(Some(2)), UNKNOWN_LABEL);
    assert_eq!(table.get(Some(usize::MAX)), UNKNOWN_LABEL);
    assert_eq!(table.get(None), UNKNOWN_LABEL);
  }

  #[test]
  fn almost_ripe_label_decomposes() {
    let parts = LabelParts::parse("Cebu_Almost_Ripe");
    assert_eq!(parts.variety, "Cebu");
    assert_eq!(parts.remainder.as_deref(), Some("Almost_Ripe"));
    assert_eq!(parts.token, Some(RipenessToken::Almost));
  }

  #[test]
  fn bare_label_has_no_token() {
    let parts = LabelParts::parse("Kabayo");
    assert_eq!(parts.variety, "Kabayo");
    assert_eq!(parts.remainder, None);
    assert!(!parts.has_token());
  }

  #[test]
  fn suffix_without_stage_word_has_no_token() {
    let parts = LabelParts::parse("Apple_Mango");
    assert_eq!(parts.variety, "Apple");
    assert_eq!(parts.remainder.as_deref(), Some("Mango"));
    assert_eq!(parts.token, None);
  }

  #[test]
  fn empty_root_becomes_unknown() {
    let parts = LabelParts::parse("_Ripe");
    assert_eq!(parts.variety, UNKNOWN_LABEL);
    assert_eq!(parts.token, Some(RipenessToken::Ripe));
  }

  #[test]
  fn label_file_skips_comments_and_blanks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "# mango labels\nCebu_Unripe\n\n  Cebu_Ripe  \n").unwrap();
    let table = LabelTable::from_file(&path).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(Some(1)), "Cebu_Ripe");
  }

  #[test]
  fn empty_label_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.txt");
    std::fs::write(&path, "# nothing\n").unwrap();
    assert!(matches!(
      LabelTable::from_file(&path),
      Err(LabelTableError::Empty(_))
    ));
  }
}
