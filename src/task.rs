// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/task.rs - 后台扫描任务
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

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
  mpsc,
};
use std::thread::{self, JoinHandle};

use tracing::{info, warn};
use url::Url;

use crate::{
  model::ModelLoader,
  pipeline::{ScanError, ScanPipeline, ScanVerdict},
};

/// 取消标记；取消后结果不再送达，但不会打断正在进行的推理
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
  cancelled: Arc<AtomicBool>,
}

impl CancelToken {
  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

#[derive(Debug)]
pub enum ScanOutcome {
  Completed(ScanVerdict),
  Failed(ScanError),
  Cancelled,
}

/// 在独立线程上运行扫描
pub struct ScanTask<L: ModelLoader> {
  pipeline: Arc<ScanPipeline<L>>,
}

impl<L: ModelLoader> Clone for ScanTask<L> {
  fn clone(&self) -> Self {
    Self {
      pipeline: Arc::clone(&self.pipeline),
    }
  }
}

impl<L: ModelLoader + 'static> ScanTask<L> {
  pub fn new(pipeline: ScanPipeline<L>) -> Self {
    Self::shared(Arc::new(pipeline))
  }

  pub fn shared(pipeline: Arc<ScanPipeline<L>>) -> Self {
    Self { pipeline }
  }

  pub fn pipeline(&self) -> &Arc<ScanPipeline<L>> {
    &self.pipeline
  }

  pub fn spawn(&self, source: Url) -> ScanHandle {
    self.spawn_with_token(source, CancelToken::default())
  }

  /// 使用外部给定的取消标记，例如由 Ctrl-C 处理函数持有
  pub fn spawn_with_token(&self, source: Url, token: CancelToken) -> ScanHandle {
    let (tx, rx) = mpsc::sync_channel(1);
    let pipeline = Arc::clone(&self.pipeline);
    let worker_token = token.clone();

    let worker = thread::spawn(move || {
      if worker_token.is_cancelled() {
        info!("任务在开始前已取消: {}", source);
        return;
      }
      let result = pipeline.scan(&source);
      if worker_token.is_cancelled() {
        warn!("任务已取消，丢弃结果: {}", source);
        return;
      }
      let _ = tx.send(result);
    });

    ScanHandle {
      token,
      receiver: rx,
      worker: Some(worker),
    }
  }
}

pub struct ScanHandle {
  token: CancelToken,
  receiver: mpsc::Receiver<Result<ScanVerdict, ScanError>>,
  worker: Option<JoinHandle<()>>,
}

impl ScanHandle {
  pub fn cancel(&self) {
    info!("取消扫描任务");
    self.token.cancel();
  }

  pub fn token(&self) -> CancelToken {
    self.token.clone()
  }

  /// 等待结果；取消后即使推理完成也返回 `Cancelled`
  pub fn wait(mut self) -> ScanOutcome {
    let received = self.receiver.recv();
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      return ScanOutcome::Failed(ScanError::Inference("扫描线程异常退出".to_string()));
    }

    if self.token.is_cancelled() {
      return ScanOutcome::Cancelled;
    }
    match received {
      Ok(Ok(verdict)) => ScanOutcome::Completed(verdict),
      Ok(Err(e)) => ScanOutcome::Failed(e),
      Err(_) => ScanOutcome::Cancelled,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::PipelineConfig;
  use crate::frame::TensorFrame;
  use crate::model::{ModelError, ScoreBuffer, ScoringModel};
  use std::sync::Mutex;
  use std::time::Duration;

  /// 推理前等待放行信号
  struct GatedModel {
    gate: Arc<Mutex<mpsc::Receiver<()>>>,
  }

  impl ScoringModel for GatedModel {
    fn score(&self, _input: &TensorFrame) -> Result<ScoreBuffer, ModelError> {
      let gate = self.gate.lock().unwrap();
      let _ = gate.recv_timeout(Duration::from_secs(5));
      Ok(ScoreBuffer::from(vec![0.0, 0.0, 4.0, 4.0, 0.9, 3.0]))
    }
  }

  struct GatedLoader {
    gate: Arc<Mutex<mpsc::Receiver<()>>>,
  }

  impl ModelLoader for GatedLoader {
    type Model = GatedModel;

    fn load(&self) -> Result<GatedModel, ModelError> {
      Ok(GatedModel {
        gate: Arc::clone(&self.gate),
      })
    }
  }

  fn setup(dir: &std::path::Path) -> (ScanTask<GatedLoader>, mpsc::Sender<()>, Url) {
    let (open, gate) = mpsc::channel();
    let config = PipelineConfig {
      input_width: 4,
      input_height: 4,
      staging_dir: dir.join("stage"),
      ..PipelineConfig::default()
    };
    let loader = GatedLoader {
      gate: Arc::new(Mutex::new(gate)),
    };
    let pipeline = ScanPipeline::from_config(&config, loader).unwrap();

    let source = dir.join("mango.png");
    image::RgbImage::from_pixel(6, 6, image::Rgb([10, 200, 30]))
      .save(&source)
      .unwrap();
    let url = Url::from_file_path(&source).unwrap();
    (ScanTask::new(pipeline), open, url)
  }

  #[test]
  fn completed_scan_is_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let (task, open, url) = setup(dir.path());
    let handle = task.spawn(url);
    open.send(()).unwrap();
    match handle.wait() {
      ScanOutcome::Completed(verdict) => assert_eq!(verdict.label, "Cebu_Ripe"),
      other => panic!("unexpected outcome: {:?}", other),
    }
  }

  #[test]
  fn cancelled_scan_discards_result() {
    let dir = tempfile::tempdir().unwrap();
    let (task, open, url) = setup(dir.path());
    let handle = task.spawn(url);
    handle.cancel();
    open.send(()).unwrap();
    assert!(matches!(handle.wait(), ScanOutcome::Cancelled));
  }

  #[test]
  fn failure_is_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let (task, _open, _) = setup(dir.path());
    let missing = Url::from_file_path(dir.path().join("missing.png")).unwrap();
    assert!(matches!(
      task.spawn(missing).wait(),
      ScanOutcome::Failed(ScanError::Io(_))
    ));
  }

  #[test]
  fn token_is_shared_with_handle() {
    let token = CancelToken::default();
    let other = token.clone();
    other.cancel();
    assert!(token.is_cancelled());
  }
}
