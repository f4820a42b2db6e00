// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/frame.rs - NCHW 张量帧定义
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

pub const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

pub trait AsNchwTensor {
  fn as_nchw(&self) -> &[f32];
}

/// 模型输入张量，布局为 [1, 3, H, W]，数值已归一化
#[derive(Debug, Clone, PartialEq)]
pub struct TensorFrame {
  data: Box<[f32]>,
  width: usize,
  height: usize,
}

impl TensorFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let size = RGB_CHANNELS * width * height;
    Self {
      data: vec![0f32; size].into_boxed_slice(),
      width,
      height,
    }
  }

  pub fn from_vec(data: Vec<f32>, height: usize, width: usize) -> Result<Self, FrameError> {
    let expected = RGB_CHANNELS * width * height;
    if data.len() != expected {
      return Err(FrameError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
      width,
      height,
    })
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  /// 张量形状 [N, C, H, W]
  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height, self.width]
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 通道 `c` 的平面数据
  pub fn plane(&self, c: usize) -> &[f32] {
    let plane_size = self.width * self.height;
    &self.data[c * plane_size..(c + 1) * plane_size]
  }
}

impl AsMut<[f32]> for TensorFrame {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

impl AsNchwTensor for TensorFrame {
  fn as_nchw(&self) -> &[f32] {
    &self.data
  }
}
