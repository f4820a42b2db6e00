// 该文件是 RipeScan （熟度扫描） 项目的一部分。
// src/input/preprocess.rs - 图像预处理
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

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::{
  config::{Normalization, PipelineConfig},
  frame::TensorFrame,
};

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("图像解码失败: {0}")]
  DecodeError(#[from] image::ImageError),
}

/// 解码、缩放并归一化为模型输入张量；同一输入与配置总是得到相同的张量
pub struct Preprocessor {
  width: u32,
  height: u32,
  normalization: Normalization,
}

impl Preprocessor {
  pub fn new(width: u32, height: u32, normalization: Normalization) -> Self {
    Self {
      width,
      height,
      normalization,
    }
  }

  pub fn from_config(config: &PipelineConfig) -> Self {
    Self::new(config.input_width, config.input_height, config.normalization)
  }

  pub fn process_bytes(&self, bytes: &[u8]) -> Result<TensorFrame, PreprocessError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    debug!(
      "原始图像尺寸: {}x{}, 缩放至 {}x{}",
      image.width(),
      image.height(),
      self.width,
      self.height
    );
    Ok(self.process_image(&image))
  }

  pub fn process_image(&self, image: &RgbImage) -> TensorFrame {
    let resized = if image.dimensions() == (self.width, self.height) {
      image.clone()
    } else {
      image::imageops::resize(image, self.width, self.height, FilterType::Triangle)
    };

    let height = self.height as usize;
    let width = self.width as usize;
    let mut frame = TensorFrame::with_shape(height, width);
    let plane_size = height * width;
    let slice = frame.as_mut();

    for (idx, pixel) in resized.pixels().enumerate() {
      for c in 0..3 {
        slice[c * plane_size + idx] = self.normalization.apply(c, pixel[c]);
      }
    }
    frame
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::AsNchwTensor;
  use image::Rgb;
  use std::io::Cursor;

  fn png_bytes(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
      .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
      .unwrap();
    bytes
  }

  #[test]
  fn output_is_nchw_with_configured_shape() {
    let image = RgbImage::from_pixel(31, 17, Rgb([255, 0, 51]));
    let frame = Preprocessor::new(8, 4, Normalization::UnitScale).process_image(&image);
    assert_eq!(frame.shape(), [1, 3, 4, 8]);
    assert!(frame.plane(0).iter().all(|v| *v == 1.0));
    assert!(frame.plane(1).iter().all(|v| *v == 0.0));
    assert!(frame.plane(2).iter().all(|v| (*v - 0.2).abs() < 1e-6));
  }

  #[test]
  fn channel_planes_keep_pixel_order() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([0, 0, 0]));
    image.put_pixel(1, 0, Rgb([255, 255, 255]));
    let frame = Preprocessor::new(2, 1, Normalization::UnitScale).process_image(&image);
    assert_eq!(frame.as_nchw(), &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
  }

  #[test]
  fn mean_std_is_applied_per_channel() {
    let image = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
    let normalization = Normalization::MeanStd {
      mean: [0.5, 0.0, 1.0],
      std: [0.5, 2.0, 1.0],
    };
    let frame = Preprocessor::new(1, 1, normalization).process_image(&image);
    assert_eq!(frame.as_nchw(), &[1.0, 0.5, 0.0]);
  }

  #[test]
  fn identical_input_gives_identical_tensor() {
    let image = RgbImage::from_fn(50, 30, |x, y| Rgb([(x * 5) as u8, (y * 8) as u8, 7]));
    let bytes = png_bytes(&image);
    let preprocessor = Preprocessor::new(16, 16, Normalization::UnitScale);
    let a = preprocessor.process_bytes(&bytes).unwrap();
    let b = preprocessor.process_bytes(&bytes).unwrap();
    let bits = |f: &TensorFrame| f.as_nchw().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&a), bits(&b));
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    let preprocessor = Preprocessor::new(16, 16, Normalization::UnitScale);
    assert!(matches!(
      preprocessor.process_bytes(b"definitely not an image"),
      Err(PreprocessError::DecodeError(_))
    ));
  }
}
