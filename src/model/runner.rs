// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/model/runner.rs - 模型生命周期与推理调用
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

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info};

use crate::{
  frame::TensorFrame,
  model::{ModelError, ModelLoader, ScoreBuffer, ScoringModel},
};

/// 推理执行器
///
/// 首次调用时加载模型，加载过程持有锁，并发的首次调用只会加载一次。
/// 加载失败不会缓存，下一次扫描会重新尝试。
pub struct InferenceRunner<L: ModelLoader> {
  loader: L,
  slot: Mutex<Option<Arc<L::Model>>>,
  // 模型不可重入时串行化调用
  exclusive: Mutex<()>,
}

impl<L: ModelLoader> InferenceRunner<L> {
  pub fn new(loader: L) -> Self {
    Self {
      loader,
      slot: Mutex::new(None),
      exclusive: Mutex::new(()),
    }
  }

  fn lock_slot(&self) -> MutexGuard<'_, Option<Arc<L::Model>>> {
    // 加载函数 panic 后槽位依然保持一致（要么有模型，要么为空）
    self.slot.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// 获取已加载的模型，必要时加载
  pub fn model(&self) -> Result<Arc<L::Model>, ModelError> {
    let mut slot = self.lock_slot();
    if let Some(model) = slot.as_ref() {
      return Ok(Arc::clone(model));
    }

    info!("加载评分模型");
    let model = match self.loader.load() {
      Ok(model) => Arc::new(model),
      Err(e) => {
        error!("模型加载失败: {}", e);
        return Err(e.into_load());
      }
    };
    info!("模型加载完成");
    *slot = Some(Arc::clone(&model));
    Ok(model)
  }

  pub fn run(&self, input: &TensorFrame) -> Result<ScoreBuffer, ModelError> {
    let model = self.model()?;

    let _guard = if model.reentrant() {
      None
    } else {
      Some(self.exclusive.lock().unwrap_or_else(|e| e.into_inner()))
    };

    debug!("执行模型推理, 输入形状: {:?}", input.shape());
    let now = std::time::Instant::now();
    let output = model.score(input).map_err(ModelError::into_inference)?;
    debug!(
      "推理完成，耗时: {:.2?}, 输出长度: {}",
      now.elapsed(),
      output.len()
    );
    Ok(output)
  }

  pub fn is_loaded(&self) -> bool {
    self.lock_slot().is_some()
  }

  /// 释放模型句柄；进行中的调用持有自己的引用，不受影响
  pub fn release(&self) {
    if self.lock_slot().take().is_some() {
      info!("释放评分模型");
    }
  }

  /// 释放后下一次调用会重新加载
  pub fn reset(&self) {
    self.release();
  }
}
