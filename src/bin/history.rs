// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/bin/history.rs - 扫描历史查看
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

use anyhow::Result;
use chrono::{DateTime, Local};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use ripescan::{FromUrl, config::UNKNOWN_DEVICE, output::DirectoryHistory};

const DATE_FORMAT: &str = "%b %d, %Y %I:%M %p";

/// 按设备列出扫描历史
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 历史记录目录，例如 folder:///var/lib/ripescan
  #[arg(long, value_name = "HISTORY")]
  pub history: Url,

  /// 设备标识
  #[arg(long, value_name = "ID", default_value = UNKNOWN_DEVICE)]
  pub device_id: String,
}

fn format_timestamp(millis: i64) -> String {
  match DateTime::from_timestamp_millis(millis) {
    Some(time) => time.with_timezone(&Local).format(DATE_FORMAT).to_string(),
    None => "-".to_string(),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("历史记录地址: {}", args.history);
  info!("设备标识: {}", args.device_id);

  let history = DirectoryHistory::from_url(&args.history)?;
  let records = history.load_for_device(&args.device_id)?;
  if records.is_empty() {
    warn!("设备 {} 没有扫描记录", args.device_id);
    return Ok(());
  }

  for record in &records {
    println!(
      "{}  {:<12} {:<14} {:>5}%  {}",
      format_timestamp(record.timestamp),
      record.variety,
      record.ripeness,
      record.confidence,
      record.image_uri
    );
  }
  info!("共 {} 条记录", records.len());

  Ok(())
}
