// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/model.rs - 模型
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

use thiserror::Error;

use crate::frame::TensorFrame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("模型推理错误: {0}")]
  Inference(String),
}

impl ModelError {
  /// 加载阶段出现的任何错误都视为加载错误
  pub fn into_load(self) -> Self {
    match self {
      ModelError::Inference(msg) => ModelError::Load(msg),
      other => other,
    }
  }

  pub fn into_inference(self) -> Self {
    match self {
      ModelError::Load(msg) => ModelError::Inference(msg),
      other => other,
    }
  }
}

/// 模型输出的原始分数缓冲区
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreBuffer {
  data: Box<[f32]>,
}

impl From<Vec<f32>> for ScoreBuffer {
  fn from(data: Vec<f32>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl AsRef<[f32]> for ScoreBuffer {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl ScoreBuffer {
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

/// 不透明的评分模型：给定张量，返回分数缓冲区
pub trait ScoringModel: Send + Sync {
  fn score(&self, input: &TensorFrame) -> Result<ScoreBuffer, ModelError>;

  /// 是否允许多个线程同时调用 `score`
  fn reentrant(&self) -> bool {
    false
  }
}

/// 负责加载模型；每次成功加载都会产生一个新的模型句柄
pub trait ModelLoader: Send + Sync {
  type Model: ScoringModel;

  fn load(&self) -> Result<Self::Model, ModelError>;
}

mod decoder;
mod label;
mod replay;
mod runner;

pub use self::decoder::{
  Confidence, DecodeMode, DecodedLabel, Detection, DetectionDecoder, DecoderError, IOU_EPSILON,
  iou,
};
pub use self::label::{LabelParts, LabelTable, LabelTableError, UNKNOWN_LABEL};
pub use self::replay::{ReplayModel, ReplayModelBuilder};
pub use self::runner::InferenceRunner;
