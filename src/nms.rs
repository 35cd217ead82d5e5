// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::{config::SuppressionScope, model::Detection, rescale::PixelBox};

/// 计算两个边界框的 IoU，面积为零的框与任何框的 IoU 均为 0
pub fn iou(a: &PixelBox, b: &PixelBox) -> f32 {
  let x1 = a.x.max(b.x);
  let y1 = a.y.max(b.y);
  let x2 = a.right().min(b.right());
  let y2 = a.bottom().min(b.bottom());

  let intersection = x2.saturating_sub(x1) as u64 * y2.saturating_sub(y1) as u64;
  let union = a.area() + b.area() - intersection;

  if union > 0 {
    (intersection as f64 / union as f64) as f32
  } else {
    0.0
  }
}

/// 贪心非极大值抑制
///
/// 候选按置信度降序稳定排序（相同置信度保持输入顺序），依次与已保留的框比较，
/// 与任意保留框的 IoU 大于 0 且不小于 `nms_threshold` 时被丢弃。
/// `nms_threshold >= 1.0` 时不做抑制。返回值按保留顺序排列。
pub fn suppress(
  candidates: Vec<Detection>,
  confidence_threshold: f32,
  nms_threshold: f32,
  scope: SuppressionScope,
) -> Vec<Detection> {
  let total = candidates.len();
  let mut ordered: Vec<Detection> = candidates
    .into_iter()
    .filter(|det| det.confidence >= confidence_threshold)
    .collect();
  ordered.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  if nms_threshold >= 1.0 {
    debug!("NMS 阈值为 {}, 跳过抑制", nms_threshold);
    return ordered;
  }

  let mut kept: Vec<Detection> = Vec::with_capacity(ordered.len());
  for det in ordered {
    let suppressed = kept
      .iter()
      .any(|best| overlaps(best, &det, nms_threshold, scope));
    if !suppressed {
      kept.push(det);
    }
  }

  debug!("NMS: {} 个候选, 保留 {} 个", total, kept.len());
  kept
}

fn overlaps(kept: &Detection, det: &Detection, nms_threshold: f32, scope: SuppressionScope) -> bool {
  if scope == SuppressionScope::PerClass && kept.class_id != det.class_id {
    return false;
  }
  let overlap = iou(&kept.bbox, &det.bbox);
  overlap > 0.0 && overlap >= nms_threshold
}
