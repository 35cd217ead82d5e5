// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/frame.rs - NCHW 输入张量与图像几何信息
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

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error("网络输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
  #[error("原始图像尺寸无效: {0}x{1}")]
  InvalidOriginalSize(u32, u32),
}

/// 归一化到 [0, 1] 的 RGB 浮点张量，排布为 `[1, 3, H, W]`
#[derive(Debug, Clone)]
pub struct NchwTensor<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> NchwTensor<W, H> {
  const LEN: usize = RGB_CHANNELS * W as usize * H as usize;

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, H as usize, W as usize]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 单个通道平面
  pub fn plane(&self, channel: usize) -> &[f32] {
    let size = W as usize * H as usize;
    &self.data[channel * size..(channel + 1) * size]
  }
}

impl<const W: u32, const H: u32> Default for NchwTensor<W, H> {
  fn default() -> Self {
    Self {
      data: vec![0.0f32; Self::LEN].into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> TryFrom<Vec<f32>> for NchwTensor<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    if data.len() != Self::LEN {
      return Err(FrameError::LengthMismatch {
        expected: Self::LEN,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> AsMut<[f32]> for NchwTensor<W, H> {
  fn as_mut(&mut self) -> &mut [f32] {
    &mut self.data
  }
}

/// 保持长宽比缩放时的缩放比例和填充偏移
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
}

/// 每次检测调用记录一次的图像尺寸信息
///
/// 只能通过 [`ImageGeometry::new`] 构造，原始尺寸与输入尺寸均不为零。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageGeometry {
  original_width: u32,
  original_height: u32,
  input_width: u32,
  input_height: u32,
  letterbox: Option<Letterbox>,
}

impl ImageGeometry {
  pub fn new(
    original_width: u32,
    original_height: u32,
    input_width: u32,
    input_height: u32,
  ) -> Result<Self, FrameError> {
    if input_width == 0 || input_height == 0 {
      return Err(FrameError::InvalidInputSize(input_width, input_height));
    }
    if original_width == 0 || original_height == 0 {
      return Err(FrameError::InvalidOriginalSize(
        original_width,
        original_height,
      ));
    }

    Ok(Self {
      original_width,
      original_height,
      input_width,
      input_height,
      letterbox: None,
    })
  }

  pub fn with_letterbox(mut self, letterbox: Letterbox) -> Self {
    self.letterbox = Some(letterbox);
    self
  }

  pub fn original_width(&self) -> u32 {
    self.original_width
  }

  pub fn original_height(&self) -> u32 {
    self.original_height
  }

  pub fn input_width(&self) -> u32 {
    self.input_width
  }

  pub fn input_height(&self) -> u32 {
    self.input_height
  }

  pub fn letterbox(&self) -> Option<Letterbox> {
    self.letterbox
  }

  pub fn scale_x(&self) -> f32 {
    self.original_width as f32 / self.input_width as f32
  }

  pub fn scale_y(&self) -> f32 {
    self.original_height as f32 / self.input_height as f32
  }
}
