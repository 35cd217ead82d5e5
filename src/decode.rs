// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/decode.rs - 检测输出张量解码
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
use tracing::{debug, error};

use crate::{
  config::TensorLayout,
  frame::ImageGeometry,
  label::ClassTable,
  model::{Detection, RawOutputTensor},
  rescale::rescale,
};

/// 每行中边界框属性的数量: x_center, y_center, width, height
pub const BOX_ATTRS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出张量形状不匹配: {shape:?}, 期望有一维为 {expected} (4 + {classes} 个类别)")]
  ShapeMismatch {
    shape: Vec<usize>,
    expected: usize,
    classes: usize,
  },
  #[error("输出张量形状 {shape:?} 两个维度都等于 {attrs}, 无法自动判断排布, 请显式指定")]
  AmbiguousLayout { shape: Vec<usize>, attrs: usize },
  #[error("不支持的输出张量维度: {0:?}")]
  UnsupportedRank(Vec<usize>),
  #[error("批大小必须为 1, 实际为 {0}")]
  BatchSize(usize),
  #[error("类别表为空")]
  EmptyClassTable,
}

/// 由输出张量一行解码出的候选框，坐标位于网络输入空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub x_center: f32,
  pub y_center: f32,
  pub width: f32,
  pub height: f32,
  pub class_id: usize,
  pub confidence: f32,
}

/// 统一按 `[候选, 属性]` 访问的输出张量视图
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
  data: &'a [f32],
  rows: usize,
  attrs: usize,
  attributes_first: bool,
}

impl<'a> RowView<'a> {
  /// 校验张量形状并确定排布，形状与类别数不一致时整体失败
  pub fn new(
    tensor: &'a RawOutputTensor,
    num_classes: usize,
    layout: TensorLayout,
  ) -> Result<Self, DecodeError> {
    if num_classes == 0 {
      return Err(DecodeError::EmptyClassTable);
    }

    let shape = tensor.shape();
    let (a, b) = match *shape {
      [a, b] => (a, b),
      [batch, a, b] if batch == 1 => (a, b),
      [batch, _, _] => return Err(DecodeError::BatchSize(batch)),
      _ => return Err(DecodeError::UnsupportedRank(shape.to_vec())),
    };

    let attrs = BOX_ATTRS + num_classes;
    let mismatch = || {
      error!("输出张量形状 {:?} 与类别数 {} 不一致", shape, num_classes);
      DecodeError::ShapeMismatch {
        shape: shape.to_vec(),
        expected: attrs,
        classes: num_classes,
      }
    };

    let (rows, attributes_first) = match layout {
      TensorLayout::CandidatesFirst if b == attrs => (a, false),
      TensorLayout::AttributesFirst if a == attrs => (b, true),
      TensorLayout::Auto if a == attrs && b == attrs => {
        error!("输出张量形状 {:?} 的排布有歧义", shape);
        return Err(DecodeError::AmbiguousLayout {
          shape: shape.to_vec(),
          attrs,
        });
      }
      TensorLayout::Auto if a == attrs => (b, true),
      TensorLayout::Auto if b == attrs => (a, false),
      _ => return Err(mismatch()),
    };

    debug!(
      "输出张量: {} 个候选, {} 个属性, 属性优先: {}",
      rows, attrs, attributes_first
    );

    Ok(Self {
      data: tensor.data(),
      rows,
      attrs,
      attributes_first,
    })
  }

  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn get(&self, row: usize, attr: usize) -> f32 {
    if self.attributes_first {
      self.data[attr * self.rows + row]
    } else {
      self.data[row * self.attrs + attr]
    }
  }

  /// 取一行中得分最高的类别，得分相同时取索引最小者
  fn best_class(&self, row: usize) -> (usize, f32) {
    let mut best = (0, self.get(row, BOX_ATTRS));
    for class_id in 1..(self.attrs - BOX_ATTRS) {
      let score = self.get(row, BOX_ATTRS + class_id);
      if score > best.1 {
        best = (class_id, score);
      }
    }
    best
  }
}

/// 解码出网络输入空间中的候选框，只保留 `threshold <= confidence <= 1.0` 的行
pub fn decode_candidates(
  tensor: &RawOutputTensor,
  num_classes: usize,
  confidence_threshold: f32,
  layout: TensorLayout,
) -> Result<Vec<Candidate>, DecodeError> {
  let view = RowView::new(tensor, num_classes, layout)?;

  let candidates: Vec<Candidate> = (0..view.rows())
    .filter_map(|row| {
      let (class_id, confidence) = view.best_class(row);
      if !(confidence >= confidence_threshold && confidence <= 1.0) {
        return None;
      }
      Some(Candidate {
        x_center: view.get(row, 0),
        y_center: view.get(row, 1),
        width: view.get(row, 2),
        height: view.get(row, 3),
        class_id,
        confidence,
      })
    })
    .collect();

  debug!(
    "置信度过滤: {} / {} 个候选保留",
    candidates.len(),
    view.rows()
  );
  Ok(candidates)
}

/// 解码输出张量并还原到原始图像像素空间，类别数取自类别表
pub fn decode(
  tensor: &RawOutputTensor,
  geometry: &ImageGeometry,
  classes: &ClassTable,
  confidence_threshold: f32,
  layout: TensorLayout,
) -> Result<Vec<Detection>, DecodeError> {
  let candidates = decode_candidates(tensor, classes.len(), confidence_threshold, layout)?;

  Ok(
    candidates
      .iter()
      .map(|candidate| Detection {
        bbox: rescale(candidate, geometry),
        class_id: candidate.class_id,
        class_name: classes.name(candidate.class_id).to_string(),
        confidence: candidate.confidence,
      })
      .collect(),
  )
}
