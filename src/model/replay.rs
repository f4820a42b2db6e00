// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/model/replay.rs - 回放录制的模型输出
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

//! 离线评分后端：从 JSON 文件读取一次录制好的分数缓冲区，对任何输入都返回它。
//!
//! `replay:///path/to/scores.json?size=640x640`，`size` 可选，给出时校验输入张量形状。

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::TensorFrame,
  model::{ModelError, ModelLoader, ScoreBuffer, ScoringModel},
};

#[derive(Deserialize)]
#[serde(untagged)]
enum Recording {
  Plain(Vec<f32>),
  Wrapped { scores: Vec<f32> },
}

pub struct ReplayModel {
  scores: ScoreBuffer,
  input_size: Option<(usize, usize)>,
}

impl ScoringModel for ReplayModel {
  fn score(&self, input: &TensorFrame) -> Result<ScoreBuffer, ModelError> {
    if let Some((width, height)) = self.input_size
      && (input.width() != width || input.height() != height)
    {
      return Err(ModelError::Inference(format!(
        "输入尺寸不匹配: 期望 {}x{}, 实际 {}x{}",
        width,
        height,
        input.width(),
        input.height()
      )));
    }
    Ok(self.scores.clone())
  }

  fn reentrant(&self) -> bool {
    true
  }
}

#[derive(Debug, Clone)]
pub struct ReplayModelBuilder {
  path: PathBuf,
  input_size: Option<(usize, usize)>,
}

impl FromUrlWithScheme for ReplayModelBuilder {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModelBuilder {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelError::Load(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| ModelError::Load(format!("模型路径解码失败: {}", e)))?
      .into_owned();

    let mut input_size = None;
    for (k, v) in url.query_pairs() {
      if k == "size" {
        input_size = Some(parse_size(&v)?);
      }
    }

    Ok(ReplayModelBuilder {
      path: PathBuf::from(path),
      input_size,
    })
  }
}

fn parse_size(value: &str) -> Result<(usize, usize), ModelError> {
  value
    .split_once('x')
    .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)))
    .ok_or_else(|| ModelError::Load(format!("无效的输入尺寸: {}", value)))
}

impl ReplayModelBuilder {
  pub fn new<P: Into<PathBuf>>(path: P) -> Self {
    Self {
      path: path.into(),
      input_size: None,
    }
  }

  pub fn input_size(mut self, width: usize, height: usize) -> Self {
    self.input_size = Some((width, height));
    self
  }
}

impl ModelLoader for ReplayModelBuilder {
  type Model = ReplayModel;

  fn load(&self) -> Result<ReplayModel, ModelError> {
    info!("加载回放文件: {}", self.path.display());
    let data = std::fs::read(&self.path)
      .map_err(|e| ModelError::Load(format!("{}: {}", self.path.display(), e)))?;
    if data.is_empty() {
      return Err(ModelError::Load(format!(
        "模型文件为空: {}",
        self.path.display()
      )));
    }

    let recording: Recording = serde_json::from_slice(&data)
      .map_err(|e| ModelError::Load(format!("{}: {}", self.path.display(), e)))?;
    let scores = match recording {
      Recording::Plain(scores) => scores,
      Recording::Wrapped { scores } => scores,
    };
    debug!("回放分数长度: {}", scores.len());

    Ok(ReplayModel {
      scores: ScoreBuffer::from(scores),
      input_size: self.input_size,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_url_with_size() {
    let url = Url::parse("replay:///tmp/my%20scores.json?size=320x240").unwrap();
    let builder = ReplayModelBuilder::from_url(&url).unwrap();
    assert_eq!(builder.path, PathBuf::from("/tmp/my scores.json"));
    assert_eq!(builder.input_size, Some((320, 240)));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("yolo26:///tmp/model.rknn").unwrap();
    assert!(matches!(
      ReplayModelBuilder::from_url(&url),
      Err(ModelError::Load(_))
    ));
  }

  #[test]
  fn loads_plain_and_wrapped_recordings() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.json");
    let wrapped = dir.path().join("wrapped.json");
    std::fs::write(&plain, "[0.1, 0.9]").unwrap();
    std::fs::write(&wrapped, r#"{ "scores": [0.5] }"#).unwrap();

    let frame = TensorFrame::with_shape(2, 2);
    let model = ReplayModelBuilder::new(&plain).load().unwrap();
    assert_eq!(model.score(&frame).unwrap().as_ref(), &[0.1, 0.9]);
    let model = ReplayModelBuilder::new(&wrapped).load().unwrap();
    assert_eq!(model.score(&frame).unwrap().as_ref(), &[0.5]);
  }

  #[test]
  fn missing_or_empty_file_is_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let empty = dir.path().join("empty.json");
    std::fs::write(&empty, "").unwrap();

    assert!(matches!(
      ReplayModelBuilder::new(dir.path().join("missing.json")).load(),
      Err(ModelError::Load(_))
    ));
    assert!(matches!(
      ReplayModelBuilder::new(&empty).load(),
      Err(ModelError::Load(_))
    ));
  }

  #[test]
  fn size_mismatch_is_inference_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scores.json");
    std::fs::write(&path, "[1.0]").unwrap();

    let model = ReplayModelBuilder::new(&path).input_size(4, 4).load().unwrap();
    assert!(matches!(
      model.score(&TensorFrame::with_shape(2, 2)),
      Err(ModelError::Inference(_))
    ));
  }
}
