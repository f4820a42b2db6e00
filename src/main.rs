// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::{thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use ripescan::{
  FromUrl, PipelineConfig, ScanPipeline,
  model::ReplayModelBuilder,
  output::{HistoryRecorder, HistoryWrapper},
  pipeline::record_for,
  ripeness::SensorySurvey,
  task::{CancelToken, ScanOutcome, ScanTask},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  let mut config = match &args.config {
    Some(path) => PipelineConfig::from_json_file(path)?,
    None => PipelineConfig::default(),
  };
  args.apply(&mut config);
  config.validate()?;

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("暂存目录: {}", config.staging_dir.display());
  info!("置信度阈值: {}", config.confidence_threshold);

  // 先校验评估参数，避免扫描完成后才报错
  let survey = args
    .survey()
    .map(|(firmness, aroma)| SensorySurvey::new(firmness, aroma))
    .transpose()?;

  let loader = ReplayModelBuilder::from_url(&args.model)?;
  let pipeline = ScanPipeline::from_config(&config, loader)?;
  let task = ScanTask::new(pipeline);

  let token = CancelToken::default();
  let interrupt = token.clone();
  ctrlc::set_handler(move || {
    info!("收到中断信号，取消扫描...");
    interrupt.cancel();
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let now = std::time::Instant::now();
  let verdict = match task.spawn_with_token(args.input.clone(), token).wait() {
    ScanOutcome::Completed(verdict) => verdict,
    ScanOutcome::Failed(e) => {
      error!("扫描失败: {}", e);
      return Err(e.into());
    }
    ScanOutcome::Cancelled => {
      warn!("扫描已取消");
      return Ok(());
    }
  };
  info!("扫描完成，耗时: {:.2?}", now.elapsed());

  let verdict = match survey {
    Some(survey) if verdict.survey_required() => {
      info!(
        "感官评估: 硬度 {}, 香气 {}",
        survey.firmness.label(),
        survey.aroma.label()
      );
      task.pipeline().assess(&verdict, &survey)
    }
    Some(_) => {
      warn!("品种 {} 不需要感官评估, 忽略 --firmness/--aroma", verdict.variety);
      verdict
    }
    None => {
      if verdict.survey_required() {
        warn!(
          "品种 {} 需要感官评估, 请通过 --firmness 与 --aroma 提供",
          verdict.variety
        );
      }
      verdict
    }
  };

  info!("品种: {}", verdict.variety);
  info!("熟度: {}", verdict.ripeness);
  info!("置信度: {}%", verdict.confidence);
  if let Some(progress) = verdict.ripeness.progress() {
    info!("进度: {}%", progress);
  }
  for line in verdict.ripeness.remediation().lines() {
    info!("建议: {}", line);
  }
  info!("图像: {}", verdict.image.uri());

  if let Some(history) = &args.history {
    let sink = HistoryWrapper::from_url(history)?;
    let recorder = HistoryRecorder::spawn(sink)?;
    let receipt = recorder.submit(record_for(&verdict, config.device_id()));
    if let Err(e) = receipt.wait() {
      // 历史记录失败不影响已给出的结论
      error!("历史记录保存失败: {}", e);
    }
    recorder.shutdown();
  }

  Ok(())
}
