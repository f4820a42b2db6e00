// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/config.rs - 流水线配置
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

//! 流水线配置。
//!
//! 所有取值都是启动时给定的常量（输入分辨率、归一化参数、置信度阈值、解码模式、
//! 标签表），不会在扫描过程中改变。可以从 JSON 文件加载，缺省字段取参考默认值。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::{DecodeMode, LabelTable, LabelTableError};

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
pub const UNKNOWN_DEVICE: &str = "UNKNOWN_DEVICE";

/// 训练时使用的标签顺序
pub const DEFAULT_LABELS: [&str; 7] = [
  "Carabao_Unripe",
  "Carabao_Ripe",
  "Cebu_Unripe",
  "Cebu_Ripe",
  "Apple_Mango",
  "Indian",
  "Kabayo",
];

pub const DEFAULT_TRACKED_VARIETIES: [&str; 2] = ["cebu", "carabao"];
pub const DEFAULT_SURVEY_VARIETIES: [&str; 3] = ["kabayo", "indian", "apple"];

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标签表错误: {0}")]
  LabelError(#[from] LabelTableError),
  #[error("配置无效: {0}")]
  Invalid(String),
}

/// 像素归一化方式，作用于 `px / 255` 之后的数值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
  /// 直接缩放到 0–1
  #[default]
  UnitScale,
  /// 逐通道减均值除标准差
  MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl Normalization {
  #[inline]
  pub fn apply(&self, channel: usize, value: u8) -> f32 {
    let v = value as f32 / 255.0;
    match self {
      Normalization::UnitScale => v,
      Normalization::MeanStd { mean, std } => (v - mean[channel]) / std[channel],
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub input_width: u32,
  pub input_height: u32,
  pub normalization: Normalization,
  pub decode_mode: DecodeMode,
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  pub labels: Vec<String>,
  /// 若给出则覆盖 `labels`，每行一个标签
  pub label_file: Option<PathBuf>,
  pub tracked_varieties: Vec<String>,
  pub survey_varieties: Vec<String>,
  pub staging_dir: PathBuf,
  pub device_id: Option<String>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      input_width: DEFAULT_INPUT_SIZE,
      input_height: DEFAULT_INPUT_SIZE,
      normalization: Normalization::default(),
      decode_mode: DecodeMode::default(),
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
      label_file: None,
      tracked_varieties: DEFAULT_TRACKED_VARIETIES
        .iter()
        .map(|s| s.to_string())
        .collect(),
      survey_varieties: DEFAULT_SURVEY_VARIETIES
        .iter()
        .map(|s| s.to_string())
        .collect(),
      staging_dir: std::env::temp_dir().join("ripescan"),
      device_id: None,
    }
  }
}

impl PipelineConfig {
  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let mut config: PipelineConfig = serde_json::from_str(&text)?;

    // 标签文件路径相对于配置文件所在目录
    if let Some(label_file) = config.label_file.as_mut()
      && label_file.is_relative()
      && let Some(parent) = path.parent()
    {
      *label_file = parent.join(&*label_file);
    }

    config.validate()?;
    debug!("配置内容: {:?}", config);
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::Invalid(format!(
        "输入分辨率必须为正: {}x{}",
        self.input_width, self.input_height
      )));
    }
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ConfigError::Invalid(format!(
        "置信度阈值必须位于 [0, 1]: {}",
        self.confidence_threshold
      )));
    }
    if !(0.0..=1.0).contains(&self.iou_threshold) {
      return Err(ConfigError::Invalid(format!(
        "IoU 阈值必须位于 [0, 1]: {}",
        self.iou_threshold
      )));
    }
    if let Normalization::MeanStd { std, .. } = &self.normalization
      && std.iter().any(|s| *s == 0.0 || !s.is_finite())
    {
      return Err(ConfigError::Invalid(format!(
        "归一化标准差必须为非零有限值: {:?}",
        std
      )));
    }
    self.decode_mode.validate().map_err(ConfigError::Invalid)?;
    if self.label_file.is_none() && self.labels.is_empty() {
      return Err(ConfigError::Invalid("标签表为空".to_string()));
    }
    Ok(())
  }

  pub fn label_table(&self) -> Result<LabelTable, ConfigError> {
    match &self.label_file {
      Some(path) => Ok(LabelTable::from_file(path)?),
      None => Ok(LabelTable::new(self.labels.clone())),
    }
  }

  pub fn device_id(&self) -> &str {
    match self.device_id.as_deref() {
      Some(id) if !id.trim().is_empty() => id,
      _ => UNKNOWN_DEVICE,
    }
  }
}
