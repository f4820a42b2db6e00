// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/model/decoder.rs - 模型输出解码
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

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  config::{ConfigError, PipelineConfig},
  model::{LabelParts, LabelTable, ScoreBuffer},
};

/// IoU 分母上的平滑项，避免退化框除零
pub const IOU_EPSILON: f32 = 1e-6;

const DETECTION_RECORD_MIN: usize = 6;
const CONF_OFFSET: usize = 4;
const CLASS_OFFSET: usize = 5;

fn default_record_len() -> usize {
  DETECTION_RECORD_MIN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeMode {
  /// 每个类别一个分数，取最大者
  Classification,
  /// 连续的检测记录 `[x1, y1, x2, y2, conf, class, ...]`
  Detection {
    #[serde(default = "default_record_len")]
    record_len: usize,
  },
}

impl Default for DecodeMode {
  fn default() -> Self {
    DecodeMode::Detection {
      record_len: DETECTION_RECORD_MIN,
    }
  }
}

impl DecodeMode {
  pub fn validate(&self) -> Result<(), String> {
    match self {
      DecodeMode::Detection { record_len } if *record_len < DETECTION_RECORD_MIN => Err(format!(
        "检测记录长度至少为 {}, 实际为 {}",
        DETECTION_RECORD_MIN, record_len
      )),
      _ => Ok(()),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecoderError {
  #[error("没有检测结果达到置信度阈值 {threshold}")]
  NoDetection { threshold: f32 },
  #[error("模型输出为空或不包含有效分数")]
  EmptyOutput,
}

/// 置信度百分比，范围 [0, 100]，保留一位小数
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Confidence(f32);

impl Confidence {
  pub fn from_percent(percent: f32) -> Self {
    if percent.is_nan() {
      return Confidence(0.0);
    }
    let clamped = percent.clamp(0.0, 100.0);
    Confidence((clamped * 10.0).round() / 10.0)
  }

  /// 模型分数 (0–1) 转百分比
  pub fn from_score(score: f32) -> Self {
    Self::from_percent(score * 100.0)
  }

  pub fn percent(&self) -> f32 {
    self.0
  }
}

impl fmt::Display for Confidence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.1}", self.0)
  }
}

/// 两个轴对齐框的交并比
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);

  intersection / (area_a + area_b - intersection + IOU_EPSILON)
}

/// 模型给出的一个候选框
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: [f32; 4], // [x1, y1, x2, y2]
  pub confidence: f32,
  pub class_id: Option<usize>,
}

impl Detection {
  fn from_record(record: &[f32]) -> Self {
    let confidence = record[CONF_OFFSET];
    let confidence = if confidence.is_nan() {
      0.0
    } else {
      confidence.clamp(0.0, 1.0)
    };

    Detection {
      bbox: [record[0], record[1], record[2], record[3]],
      confidence,
      class_id: class_index(record[CLASS_OFFSET]),
    }
  }

  pub fn iou(&self, other: &Detection) -> f32 {
    iou(&self.bbox, &other.bbox)
  }
}

fn class_index(value: f32) -> Option<usize> {
  if !value.is_finite() || value < 0.0 {
    return None;
  }
  Some(value.round() as usize)
}

/// 最终选定的标签
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLabel {
  pub label: String,
  pub parts: LabelParts,
  pub class_id: Option<usize>,
  pub score: f32,
  pub bbox: Option<[f32; 4]>,
  /// 是否由重叠合并规则改选
  pub merged: bool,
}

impl DecodedLabel {
  pub fn confidence(&self) -> Confidence {
    Confidence::from_score(self.score)
  }

  pub fn variety(&self) -> &str {
    &self.parts.variety
  }
}

pub struct DetectionDecoder {
  mode: DecodeMode,
  confidence_threshold: f32,
  iou_threshold: f32,
  labels: LabelTable,
}

impl DetectionDecoder {
  /// 检测记录长度不足时拒绝构造
  pub fn new(
    mode: DecodeMode,
    confidence_threshold: f32,
    iou_threshold: f32,
    labels: LabelTable,
  ) -> Result<Self, ConfigError> {
    mode.validate().map_err(ConfigError::Invalid)?;
    Ok(Self {
      mode,
      confidence_threshold,
      iou_threshold,
      labels,
    })
  }

  pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
    Self::new(
      config.decode_mode,
      config.confidence_threshold,
      config.iou_threshold,
      config.label_table()?,
    )
  }

  pub fn mode(&self) -> DecodeMode {
    self.mode
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn decode(&self, scores: &ScoreBuffer) -> Result<DecodedLabel, DecoderError> {
    let decoded = match self.mode {
      DecodeMode::Classification => self.decode_classification(scores.as_ref())?,
      DecodeMode::Detection { record_len } => self.decode_detection(scores.as_ref(), record_len)?,
    };

    info!(
      "预测结果: {} ({}%){}",
      decoded.label,
      decoded.confidence(),
      if decoded.merged { " [合并]" } else { "" }
    );
    Ok(decoded)
  }

  /// 把分数缓冲区解析为检测记录，末尾不完整的记录被丢弃
  fn detections(&self, scores: &[f32], record_len: usize) -> Vec<Detection> {
    let remainder = scores.len() % record_len;
    if remainder != 0 {
      warn!(
        "输出长度 {} 不是记录长度 {} 的整数倍, 丢弃末尾 {} 个值",
        scores.len(),
        record_len,
        remainder
      );
    }

    scores
      .chunks_exact(record_len)
      .map(Detection::from_record)
      .collect()
  }

  fn labelled(&self, class_id: Option<usize>, score: f32, bbox: Option<[f32; 4]>) -> DecodedLabel {
    let label = self.labels.get(class_id).to_string();
    if let Some(id) = class_id
      && id >= self.labels.len()
    {
      warn!("类别索引 {} 超出标签表范围 ({})", id, self.labels.len());
    }
    DecodedLabel {
      parts: LabelParts::parse(&label),
      label,
      class_id,
      score,
      bbox,
      merged: false,
    }
  }

  fn decode_classification(&self, scores: &[f32]) -> Result<DecodedLabel, DecoderError> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
      if score.is_nan() {
        continue;
      }
      if best.map(|(_, s)| score > s).unwrap_or(true) {
        best = Some((idx, score));
      }
    }

    // 空缓冲区或全为 NaN 时没有可选的类别
    let (class_id, score) = best.ok_or(DecoderError::NoDetection {
      threshold: self.confidence_threshold,
    })?;
    debug!("分类模式: 最大分数 {} 位于索引 {}", score, class_id);
    Ok(self.labelled(Some(class_id), score, None))
  }

  fn decode_detection(&self, scores: &[f32], record_len: usize) -> Result<DecodedLabel, DecoderError> {
    if scores.is_empty() {
      return Err(DecoderError::EmptyOutput);
    }

    let detections = self.detections(scores, record_len);
    let total = detections.len();

    let mut survivors: Vec<(Detection, LabelParts)> = detections
      .into_iter()
      .filter(|d| d.confidence >= self.confidence_threshold)
      .map(|d| {
        let parts = LabelParts::parse(self.labels.get(d.class_id));
        (d, parts)
      })
      .collect();
    debug!(
      "检测模式: 共 {} 个候选, {} 个达到阈值 {}",
      total,
      survivors.len(),
      self.confidence_threshold
    );

    if survivors.is_empty() {
      return Err(DecoderError::NoDetection {
        threshold: self.confidence_threshold,
      });
    }

    // 稳定排序，同分时保持输出顺序
    survivors.sort_by(|a, b| b.0.confidence.total_cmp(&a.0.confidence));

    let winner = self.merge_overlapping(&survivors);
    let (detection, _) = &survivors[winner];
    let mut decoded = self.labelled(detection.class_id, detection.confidence, Some(detection.bbox));
    decoded.merged = winner != 0;
    Ok(decoded)
  }

  /// 重叠合并规则，返回胜者在 `survivors` 中的位置
  ///
  /// 仅考察第一个与最高分框 IoU 超过阈值的候选。同一品种根下，带熟度标记的
  /// 细分类别优先于不带标记的品种类别；两者都带或都不带时保留最高分。
  fn merge_overlapping(&self, survivors: &[(Detection, LabelParts)]) -> usize {
    let (best, best_parts) = &survivors[0];

    let Some((idx, (candidate, candidate_parts))) = survivors
      .iter()
      .enumerate()
      .skip(1)
      .find(|(_, (d, _))| best.iou(d) > self.iou_threshold)
    else {
      return 0;
    };

    if candidate_parts.root_key() != best_parts.root_key() {
      debug!(
        "重叠候选品种不同: {} vs {}",
        best_parts.variety, candidate_parts.variety
      );
      return 0;
    }

    if candidate_parts.has_token() && !best_parts.has_token() {
      debug!(
        "重叠候选 {:?} (置信度 {:.3}, IoU {:.3}) 带熟度标记, 取代 {:?}",
        candidate.class_id,
        candidate.confidence,
        best.iou(candidate),
        best.class_id
      );
      return idx;
    }

    0
  }
}
