// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/rescale.rs - 坐标还原到原始图像
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

use serde::Serialize;

use crate::{decode::Candidate, frame::ImageGeometry};

/// 原始图像像素空间中的整数边界框，(x, y) 为左上角
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct PixelBox {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

impl PixelBox {
  pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn right(&self) -> u32 {
    self.x + self.width
  }

  pub fn bottom(&self) -> u32 {
    self.y + self.height
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }
}

/// 将网络输入空间中的中心点形式边界框映射到原始图像像素空间
///
/// 坐标先转换为左上角形式，再按几何信息缩放并向零取整。
/// 起点被限制在 `[0, W-1] x [0, H-1]` 内，宽高至少为 1 且不超出图像。
pub fn rescale(candidate: &Candidate, geometry: &ImageGeometry) -> PixelBox {
  let left = candidate.x_center - candidate.width / 2.0;
  let top = candidate.y_center - candidate.height / 2.0;

  let (x, y, w, h) = match geometry.letterbox() {
    Some(letterbox) => (
      (left - letterbox.pad_x) / letterbox.scale,
      (top - letterbox.pad_y) / letterbox.scale,
      candidate.width / letterbox.scale,
      candidate.height / letterbox.scale,
    ),
    None => {
      let (scale_x, scale_y) = (geometry.scale_x(), geometry.scale_y());
      (
        left * scale_x,
        top * scale_y,
        candidate.width * scale_x,
        candidate.height * scale_y,
      )
    }
  };

  let image_w = geometry.original_width() as i64;
  let image_h = geometry.original_height() as i64;

  let x = (x as i64).clamp(0, image_w - 1);
  let y = (y as i64).clamp(0, image_h - 1);
  let w = (w as i64).min(image_w - x).max(1);
  let h = (h as i64).min(image_h - y).max(1);

  PixelBox::new(x as u32, y as u32, w as u32, h as u32)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Letterbox;

  fn candidate(x_center: f32, y_center: f32, width: f32, height: f32) -> Candidate {
    Candidate {
      x_center,
      y_center,
      width,
      height,
      class_id: 0,
      confidence: 0.9,
    }
  }

  #[test]
  fn identity_scaling() {
    let geometry = ImageGeometry::new(640, 640, 640, 640).unwrap();
    let bbox = rescale(&candidate(320.0, 320.0, 100.0, 50.0), &geometry);
    assert_eq!(bbox, PixelBox::new(270, 295, 100, 50));
  }

  #[test]
  fn upscaling_by_two() {
    let geometry = ImageGeometry::new(1280, 1280, 640, 640).unwrap();
    let bbox = rescale(&candidate(320.0, 320.0, 100.0, 50.0), &geometry);
    assert_eq!(bbox, PixelBox::new(540, 590, 200, 100));
  }

  #[test]
  fn non_square_scaling_is_per_axis() {
    let geometry = ImageGeometry::new(1280, 320, 640, 640).unwrap();
    let bbox = rescale(&candidate(320.0, 320.0, 100.0, 50.0), &geometry);
    assert_eq!(bbox, PixelBox::new(540, 147, 200, 25));
  }

  #[test]
  fn box_past_right_edge_is_clamped() {
    let geometry = ImageGeometry::new(640, 480, 640, 640).unwrap();
    let bbox = rescale(&candidate(630.0, 100.0, 60.0, 40.0), &geometry);
    assert_eq!(bbox.x, 600);
    assert_eq!(bbox.right(), 640);
  }

  #[test]
  fn box_past_origin_is_clamped() {
    let geometry = ImageGeometry::new(640, 640, 640, 640).unwrap();
    let bbox = rescale(&candidate(10.0, 5.0, 40.0, 30.0), &geometry);
    assert_eq!(bbox.x, 0);
    assert_eq!(bbox.y, 0);
    assert_eq!(bbox.width, 40);
    assert_eq!(bbox.height, 30);
  }

  #[test]
  fn box_outside_image_keeps_minimum_size() {
    let geometry = ImageGeometry::new(100, 100, 640, 640).unwrap();
    let bbox = rescale(&candidate(2000.0, 2000.0, 10.0, 10.0), &geometry);
    assert_eq!(bbox, PixelBox::new(99, 99, 1, 1));
  }

  #[test]
  fn single_pixel_image_is_the_smallest_geometry() {
    assert!(ImageGeometry::new(0, 0, 640, 640).is_err());

    let geometry = ImageGeometry::new(1, 1, 640, 640).unwrap();
    for c in [
      candidate(320.0, 320.0, 100.0, 50.0),
      candidate(-50.0, 9000.0, 10.0, 10.0),
    ] {
      assert_eq!(rescale(&c, &geometry), PixelBox::new(0, 0, 1, 1));
    }
  }

  #[test]
  fn degenerate_box_is_floored_to_one_pixel() {
    let geometry = ImageGeometry::new(640, 640, 640, 640).unwrap();
    let bbox = rescale(&candidate(100.0, 100.0, 0.0, -4.0), &geometry);
    assert_eq!(bbox.width, 1);
    assert_eq!(bbox.height, 1);
  }

  #[test]
  fn letterbox_offsets_are_removed() {
    let geometry = ImageGeometry::new(1280, 640, 640, 640)
      .unwrap()
      .with_letterbox(Letterbox {
        scale: 0.5,
        pad_x: 0.0,
        pad_y: 160.0,
      });
    let bbox = rescale(&candidate(320.0, 320.0, 100.0, 50.0), &geometry);
    assert_eq!(bbox, PixelBox::new(540, 270, 200, 100));
  }
}
