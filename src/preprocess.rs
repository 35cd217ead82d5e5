// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/preprocess.rs - 输入图像预处理
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

use std::borrow::Cow;

use image::{ImageBuffer, Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
  config::ResizeMode,
  frame::{FrameError, ImageGeometry, Letterbox, NchwTensor},
};

const LETTERBOX_FILL: u8 = 114;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("输入图像为空: {0}x{1}")]
  EmptyImage(u32, u32),
  #[error("缓冲区大小不匹配: {width}x{height} 需要 {expected} 字节, 实际 {actual} 字节")]
  BufferSize {
    width: u32,
    height: u32,
    expected: usize,
    actual: usize,
  },
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 将图像缩放并归一化为网络输入张量，同时记录原始尺寸
///
/// 像素值除以 255，通道顺序为 RGB，排布为 NCHW。
pub fn preprocess<const W: u32, const H: u32>(
  image: &RgbImage,
  mode: ResizeMode,
) -> Result<(NchwTensor<W, H>, ImageGeometry), PreprocessError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    return Err(PreprocessError::EmptyImage(width, height));
  }

  let geometry = ImageGeometry::new(width, height, W, H)?;
  trace!(width, height, input_width = W, input_height = H, mode = ?mode, "预处理图像");

  let (resized, geometry) = match mode {
    ResizeMode::Stretch => (stretch(image, W, H), geometry),
    ResizeMode::Letterbox => {
      let (canvas, letterbox) = letterbox(image, W, H);
      debug!(
        "letterbox 缩放比例: {:.4}, 填充: ({:.1}, {:.1})",
        letterbox.scale, letterbox.pad_x, letterbox.pad_y
      );
      (Cow::Owned(canvas), geometry.with_letterbox(letterbox))
    }
  };

  let mut tensor = NchwTensor::<W, H>::default();
  let plane_size = W as usize * H as usize;
  let slice = tensor.as_mut();

  for (x, y, pixel) in resized.enumerate_pixels() {
    let idx = y as usize * W as usize + x as usize;
    slice[idx] = pixel[0] as f32 / 255.0;
    slice[plane_size + idx] = pixel[1] as f32 / 255.0;
    slice[2 * plane_size + idx] = pixel[2] as f32 / 255.0;
  }

  Ok((tensor, geometry))
}

fn stretch(image: &RgbImage, width: u32, height: u32) -> Cow<'_, RgbImage> {
  if image.dimensions() == (width, height) {
    return Cow::Borrowed(image);
  }
  Cow::Owned(image::imageops::resize(
    image,
    width,
    height,
    FilterType::Triangle,
  ))
}

fn letterbox(image: &RgbImage, width: u32, height: u32) -> (RgbImage, Letterbox) {
  let (src_w, src_h) = image.dimensions();
  let scale = (width as f32 / src_w as f32).min(height as f32 / src_h as f32);
  let new_width = ((src_w as f32 * scale) as u32).clamp(1, width);
  let new_height = ((src_h as f32 * scale) as u32).clamp(1, height);

  let resized = image::imageops::resize(image, new_width, new_height, FilterType::Triangle);

  let mut canvas = ImageBuffer::from_pixel(
    width,
    height,
    Rgb([LETTERBOX_FILL, LETTERBOX_FILL, LETTERBOX_FILL]),
  );
  let offset_x = (width - new_width) / 2;
  let offset_y = (height - new_height) / 2;
  image::imageops::overlay(&mut canvas, &resized, offset_x as i64, offset_y as i64);

  (
    canvas,
    Letterbox {
      scale,
      pad_x: offset_x as f32,
      pad_y: offset_y as f32,
    },
  )
}

/// 将 BGR 排列的像素缓冲区转换为 RGB 图像
pub fn bgr_to_rgb(width: u32, height: u32, pixels: &[u8]) -> Result<RgbImage, PreprocessError> {
  let expected = width as usize * height as usize * 3;
  if pixels.len() != expected {
    return Err(PreprocessError::BufferSize {
      width,
      height,
      expected,
      actual: pixels.len(),
    });
  }

  let rgb: Vec<u8> = pixels
    .chunks_exact(3)
    .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
    .collect();

  ImageBuffer::from_raw(width, height, rgb).ok_or(PreprocessError::BufferSize {
    width,
    height,
    expected,
    actual: pixels.len(),
  })
}
