// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/pipeline.rs - 扫描流水线
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

//! 暂存 → 预处理 → 推理 → 解码 → 熟度判定。
//!
//! 每次扫描独占自己的中间数据，唯一共享的是推理执行器里的模型句柄。

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  config::{ConfigError, PipelineConfig},
  input::{ImageStager, PreprocessError, Preprocessor, StageError, StagedImage},
  model::{Confidence, DecoderError, DetectionDecoder, InferenceRunner, ModelError, ModelLoader},
  output::ScanRecord,
  ripeness::{Ripeness, RipenessResolver, RipenessStage, SensorySurvey, VarietyClass},
};

#[derive(Error, Debug)]
pub enum ScanError {
  #[error("图像暂存失败: {0}")]
  Io(#[from] StageError),
  #[error("图像解码失败: {0}")]
  Decode(#[from] PreprocessError),
  #[error("模型加载失败: {0}")]
  ModelLoad(String),
  #[error("模型推理失败: {0}")]
  Inference(String),
  #[error("没有检测结果达到置信度阈值 {threshold}")]
  NoDetection { threshold: f32 },
  #[error("配置错误: {0}")]
  Config(String),
}

impl From<ModelError> for ScanError {
  fn from(e: ModelError) -> Self {
    match e {
      ModelError::Load(msg) => ScanError::ModelLoad(msg),
      ModelError::Inference(msg) => ScanError::Inference(msg),
    }
  }
}

impl From<DecoderError> for ScanError {
  fn from(e: DecoderError) -> Self {
    match e {
      DecoderError::NoDetection { threshold } => ScanError::NoDetection { threshold },
      DecoderError::EmptyOutput => ScanError::Inference(e.to_string()),
    }
  }
}

impl From<ConfigError> for ScanError {
  fn from(e: ConfigError) -> Self {
    ScanError::Config(e.to_string())
  }
}

/// 一次扫描的最终结论，创建后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct ScanVerdict {
  pub variety: String,
  /// 胜出的原始标签
  pub label: String,
  pub ripeness: Ripeness,
  pub confidence: Confidence,
  pub image: StagedImage,
  pub class: VarietyClass,
}

impl ScanVerdict {
  /// 该品种需要手动感官评估，且尚未评估
  pub fn survey_required(&self) -> bool {
    self.class == VarietyClass::Survey && self.ripeness == Ripeness::NotTracked
  }

  /// 应用感官评估，返回新的结论；仅对需评估的品种生效
  pub fn with_survey(&self, survey: &SensorySurvey) -> ScanVerdict {
    self.with_stage(survey.stage())
  }

  fn with_stage(&self, stage: RipenessStage) -> ScanVerdict {
    if self.class != VarietyClass::Survey {
      warn!("品种 {} 不需要感官评估, 保留原结论", self.variety);
      return self.clone();
    }
    ScanVerdict {
      ripeness: Ripeness::Stage(stage),
      ..self.clone()
    }
  }
}

/// 组装历史记录
pub fn record_for(verdict: &ScanVerdict, device_id: &str) -> ScanRecord {
  ScanRecord {
    device_id: device_id.to_string(),
    variety: verdict.variety.clone(),
    ripeness: verdict.ripeness.label().to_string(),
    confidence: verdict.confidence.to_string(),
    image_uri: verdict.image.uri(),
    timestamp: Utc::now().timestamp_millis(),
  }
}

pub struct ScanPipeline<L: ModelLoader> {
  stager: ImageStager,
  preprocessor: Preprocessor,
  runner: Arc<InferenceRunner<L>>,
  decoder: DetectionDecoder,
  resolver: RipenessResolver,
}

impl<L: ModelLoader> ScanPipeline<L> {
  pub fn from_config(config: &PipelineConfig, loader: L) -> Result<Self, ScanError> {
    Self::with_runner(config, Arc::new(InferenceRunner::new(loader)))
  }

  /// 多条流水线可以共用同一个推理执行器
  pub fn with_runner(
    config: &PipelineConfig,
    runner: Arc<InferenceRunner<L>>,
  ) -> Result<Self, ScanError> {
    config.validate()?;
    let decoder = DetectionDecoder::from_config(config)?;
    info!(
      "流水线就绪: 输入 {}x{}, 解码模式 {:?}, 标签 {} 个, 暂存目录 {}",
      config.input_width,
      config.input_height,
      decoder.mode(),
      decoder.labels().len(),
      config.staging_dir.display()
    );

    Ok(Self {
      stager: ImageStager::new(&config.staging_dir),
      preprocessor: Preprocessor::from_config(config),
      runner,
      decoder,
      resolver: RipenessResolver::from_config(config),
    })
  }

  pub fn runner(&self) -> &Arc<InferenceRunner<L>> {
    &self.runner
  }

  pub fn scan(&self, source: &Url) -> Result<ScanVerdict, ScanError> {
    info!("开始扫描: {}", source);
    let image = self.stager.stage_url(source)?;
    self.evaluate(image)
  }

  pub fn scan_path<P: AsRef<Path>>(&self, source: P) -> Result<ScanVerdict, ScanError> {
    info!("开始扫描: {}", source.as_ref().display());
    let image = self.stager.stage_path(source)?;
    self.evaluate(image)
  }

  pub fn scan_reader<R: Read>(&self, reader: R, extension: &str) -> Result<ScanVerdict, ScanError> {
    let image = self.stager.stage_reader(reader, extension)?;
    self.evaluate(image)
  }

  /// 手动路径
  pub fn assess(&self, verdict: &ScanVerdict, survey: &SensorySurvey) -> ScanVerdict {
    verdict.with_stage(self.resolver.assess(survey))
  }

  fn evaluate(&self, image: StagedImage) -> Result<ScanVerdict, ScanError> {
    let bytes = image.read()?;
    let frame = self.preprocessor.process_bytes(&bytes)?;

    let now = std::time::Instant::now();
    let scores = self.runner.run(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    let decoded = self.decoder.decode(&scores)?;
    let (class, ripeness) = self.resolver.resolve(&decoded.parts);
    let verdict = ScanVerdict {
      variety: decoded.variety().to_string(),
      confidence: decoded.confidence(),
      label: decoded.label,
      ripeness,
      image,
      class,
    };
    info!(
      "扫描结论: {} / {} ({}%)",
      verdict.variety, verdict.ripeness, verdict.confidence
    );
    Ok(verdict)
  }
}
