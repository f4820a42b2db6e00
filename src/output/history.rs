// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/output/history.rs - 扫描历史提交
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

use std::collections::HashSet;
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, warn};

use crate::output::{HistoryError, HistorySink, ScanRecord};

struct Job {
  record: ScanRecord,
  reply: mpsc::Sender<Result<(), HistoryError>>,
}

/// 一次提交的结果
pub enum Submission {
  /// 已交给后台线程，可选择等待存储结果
  Queued(mpsc::Receiver<Result<(), HistoryError>>),
  /// 同一图像引用已提交过，本次忽略
  Duplicate,
}

impl Submission {
  pub fn is_duplicate(&self) -> bool {
    matches!(self, Submission::Duplicate)
  }

  pub fn wait(self) -> Result<(), HistoryError> {
    match self {
      Submission::Queued(rx) => rx.recv().unwrap_or(Err(HistoryError::Closed)),
      Submission::Duplicate => Ok(()),
    }
  }
}

/// 历史记录提交器
///
/// 存储在独立线程中进行，调用方不会阻塞在存储确认上。
/// 每个图像引用在本次会话内至多提交一次，失败的提交也不会重试。
pub struct HistoryRecorder {
  sender: Mutex<Option<mpsc::Sender<Job>>>,
  submitted: Mutex<HashSet<String>>,
  worker: Mutex<Option<JoinHandle<()>>>,
}

impl HistoryRecorder {
  pub fn spawn<S: HistorySink + 'static>(mut sink: S) -> Result<Self, HistoryError> {
    let (tx, rx) = mpsc::channel::<Job>();

    let worker = thread::Builder::new()
      .name("history-sink".to_string())
      .spawn(move || {
        for job in rx {
          let result = sink.store(&job.record);
          match &result {
            Ok(()) => info!("扫描记录已保存: {}", job.record.image_uri),
            Err(e) => error!("扫描记录保存失败 {}: {}", job.record.image_uri, e),
          }
          let _ = job.reply.send(result);
        }
        debug!("历史记录线程退出");
      })?;

    Ok(Self {
      sender: Mutex::new(Some(tx)),
      submitted: Mutex::new(HashSet::new()),
      worker: Mutex::new(Some(worker)),
    })
  }

  pub fn submit(&self, record: ScanRecord) -> Submission {
    {
      let mut submitted = self.submitted.lock().unwrap_or_else(|e| e.into_inner());
      if !submitted.insert(record.image_uri.clone()) {
        debug!("重复提交, 忽略: {}", record.image_uri);
        return Submission::Duplicate;
      }
    }

    let (reply, receipt) = mpsc::channel();
    let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
    let queued = match sender.as_ref() {
      Some(tx) => tx.send(Job {
        record,
        reply: reply.clone(),
      }),
      None => {
        warn!("历史记录提交器已关闭");
        let _ = reply.send(Err(HistoryError::Closed));
        return Submission::Queued(receipt);
      }
    };

    if queued.is_err() {
      warn!("历史记录线程已退出");
      let _ = reply.send(Err(HistoryError::Closed));
    }
    Submission::Queued(receipt)
  }

  pub fn was_submitted(&self, image_uri: &str) -> bool {
    self
      .submitted
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .contains(image_uri)
  }

  /// 关闭通道并等待剩余记录写完
  pub fn shutdown(&self) {
    drop(self.sender.lock().unwrap_or_else(|e| e.into_inner()).take());
    let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(worker) = worker
      && worker.join().is_err()
    {
      error!("历史记录线程异常退出");
    }
  }
}

impl Drop for HistoryRecorder {
  fn drop(&mut self) {
    self.shutdown();
  }
}

/// 内存中的历史记录，克隆共享同一份存储
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
  records: Arc<Mutex<Vec<ScanRecord>>>,
}

impl MemoryHistory {
  pub fn records(&self) -> Vec<ScanRecord> {
    self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  pub fn len(&self) -> usize {
    self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 指定设备的记录，按时间倒序
  pub fn for_device(&self, device_id: &str) -> Vec<ScanRecord> {
    let mut records: Vec<_> = self
      .records()
      .into_iter()
      .filter(|r| r.device_id == device_id)
      .collect();
    records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    records
  }
}

impl HistorySink for MemoryHistory {
  fn store(&mut self, record: &ScanRecord) -> Result<(), HistoryError> {
    self
      .records
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(record.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(uri: &str, device: &str, timestamp: i64) -> ScanRecord {
    ScanRecord {
      device_id: device.to_string(),
      variety: "Cebu".to_string(),
      ripeness: "Ripe".to_string(),
      confidence: "91.0".to_string(),
      image_uri: uri.to_string(),
      timestamp,
    }
  }

  struct FailingSink;

  impl HistorySink for FailingSink {
    fn store(&mut self, _record: &ScanRecord) -> Result<(), HistoryError> {
      Err(HistoryError::Rejected("offline".to_string()))
    }
  }

  #[test]
  fn same_reference_is_stored_once() {
    let history = MemoryHistory::default();
    let recorder = HistoryRecorder::spawn(history.clone()).unwrap();

    let first = recorder.submit(record("file:///a.jpg", "dev", 1));
    let second = recorder.submit(record("file:///a.jpg", "dev", 2));
    assert!(!first.is_duplicate());
    assert!(second.is_duplicate());
    first.wait().unwrap();
    second.wait().unwrap();

    recorder.shutdown();
    assert_eq!(history.len(), 1);
    assert_eq!(history.records()[0].timestamp, 1);
  }

  #[test]
  fn sink_failure_is_reported_and_not_retried() {
    let recorder = HistoryRecorder::spawn(FailingSink).unwrap();
    let result = recorder.submit(record("file:///b.jpg", "dev", 1)).wait();
    assert!(matches!(result, Err(HistoryError::Rejected(_))));
    assert!(recorder.was_submitted("file:///b.jpg"));
    assert!(recorder.submit(record("file:///b.jpg", "dev", 1)).is_duplicate());
  }

  #[test]
  fn submit_after_shutdown_reports_closed() {
    let recorder = HistoryRecorder::spawn(MemoryHistory::default()).unwrap();
    recorder.shutdown();
    let result = recorder.submit(record("file:///c.jpg", "dev", 1)).wait();
    assert!(matches!(result, Err(HistoryError::Closed)));
  }

  #[test]
  fn shutdown_flushes_pending_records() {
    let history = MemoryHistory::default();
    let recorder = HistoryRecorder::spawn(history.clone()).unwrap();
    for i in 0..20 {
      let _ = recorder.submit(record(&format!("file:///{}.jpg", i), "dev", i));
    }
    drop(recorder);
    assert_eq!(history.len(), 20);
  }

  #[test]
  fn memory_history_filters_by_device_newest_first() {
    let mut history = MemoryHistory::default();
    history.store(&record("file:///1.jpg", "a", 10)).unwrap();
    history.store(&record("file:///2.jpg", "b", 20)).unwrap();
    history.store(&record("file:///3.jpg", "a", 30)).unwrap();

    let records = history.for_device("a");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].timestamp, 30);
    assert_eq!(records[1].timestamp, 10);
  }
}
