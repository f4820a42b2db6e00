// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use ripescan::PipelineConfig;

/// RipeScan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 replay:///path/to/scores.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入图像，支持 file:// 与 image://
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// JSON 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 暂存目录，覆盖配置文件
  #[arg(long, value_name = "DIR")]
  pub staging_dir: Option<PathBuf>,

  /// 历史记录地址，例如 folder:///var/lib/ripescan 或 memory://
  #[arg(long, value_name = "HISTORY")]
  pub history: Option<Url>,

  /// 置信度阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,

  /// 感官评估：硬度 (0 - 3)
  #[arg(long, value_name = "LEVEL", requires = "aroma")]
  pub firmness: Option<u8>,

  /// 感官评估：香气 (0 - 3)
  #[arg(long, value_name = "LEVEL", requires = "firmness")]
  pub aroma: Option<u8>,

  /// 设备标识，覆盖配置文件
  #[arg(long, value_name = "ID")]
  pub device_id: Option<String>,
}

impl Args {
  /// 命令行参数覆盖配置文件中的同名项
  pub fn apply(&self, config: &mut PipelineConfig) {
    if let Some(dir) = &self.staging_dir {
      config.staging_dir = dir.clone();
    }
    if let Some(threshold) = self.threshold {
      config.confidence_threshold = threshold;
    }
    if let Some(id) = &self.device_id {
      config.device_id = Some(id.clone());
    }
  }

  pub fn survey(&self) -> Option<(u8, u8)> {
    Some((self.firmness?, self.aroma?))
  }
}
