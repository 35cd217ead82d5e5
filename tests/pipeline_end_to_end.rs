// 该文件是 Kuangxuan （框选） 项目的一部分。
// tests/pipeline_end_to_end.rs - 检测流程端到端测试
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

use std::{convert::Infallible, sync::Arc};

use image::RgbImage;
use rand::{Rng, SeedableRng, rngs::StdRng};

use kuangxuan::{
  ClassTable, Detect, DetectConfig, DetectError, Detector, InferenceEngine, PixelBox,
  RawOutputTensor, ResizeMode, SuppressionScope, frame::NchwTensor, nms::iou,
};

const NUM_CLASSES: usize = 3;
const ATTRS: usize = 4 + NUM_CLASSES;

/// 返回固定张量并记录收到的输入形状
struct StubEngine {
  output: RawOutputTensor,
  seen_shapes: Vec<[usize; 4]>,
}

impl StubEngine {
  fn candidates_first(rows: &[[f32; ATTRS]]) -> Self {
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    Self {
      output: RawOutputTensor::new(vec![1, rows.len(), ATTRS], data).unwrap(),
      seen_shapes: Vec::new(),
    }
  }

  fn attributes_first(rows: &[[f32; ATTRS]]) -> Self {
    let mut data = Vec::with_capacity(rows.len() * ATTRS);
    for attr in 0..ATTRS {
      data.extend(rows.iter().map(|row| row[attr]));
    }
    Self {
      output: RawOutputTensor::new(vec![1, ATTRS, rows.len()], data).unwrap(),
      seen_shapes: Vec::new(),
    }
  }
}

impl InferenceEngine for StubEngine {
  type Error = Infallible;

  fn infer<const W: u32, const H: u32>(
    &mut self,
    input: &NchwTensor<W, H>,
  ) -> Result<RawOutputTensor, Self::Error> {
    self.seen_shapes.push(input.shape());
    Ok(self.output.clone())
  }
}

#[derive(Debug, thiserror::Error)]
#[error("设备断开")]
struct DeviceLost;

struct FailingEngine;

impl InferenceEngine for FailingEngine {
  type Error = DeviceLost;

  fn infer<const W: u32, const H: u32>(
    &mut self,
    _input: &NchwTensor<W, H>,
  ) -> Result<RawOutputTensor, Self::Error> {
    Err(DeviceLost)
  }
}

fn classes() -> Arc<ClassTable> {
  Arc::new(ClassTable::new(["person", "car", "dog"]).unwrap())
}

fn detector<E>(config: DetectConfig, engine: E) -> Detector<640, 640, E> {
  Detector::new(config, classes()).unwrap().with_engine(engine)
}

#[test]
fn upscaled_image_maps_boxes_back() {
  let mut det = detector(
    DetectConfig::default(),
    StubEngine::candidates_first(&[[320.0, 320.0, 100.0, 50.0, 0.9, 0.0, 0.0]]),
  );

  let result = det.detect(&RgbImage::new(1280, 1280)).unwrap();
  assert_eq!(result.len(), 1);
  assert_eq!(result.items[0].bbox, PixelBox::new(540, 590, 200, 100));
  assert_eq!(result.items[0].class_name, "person");
}

#[test]
fn edge_box_is_clamped_into_image() {
  let mut det = detector(
    DetectConfig::default(),
    StubEngine::candidates_first(&[
      [630.0, 320.0, 100.0, 50.0, 0.0, 0.9, 0.0],
      [-20.0, -20.0, 30.0, 30.0, 0.0, 0.0, 0.8],
    ]),
  );

  let result = det.detect(&RgbImage::new(640, 640)).unwrap();
  assert_eq!(result.len(), 2);
  assert_eq!(result.items[0].bbox, PixelBox::new(580, 295, 60, 50));
  assert_eq!(result.items[1].bbox, PixelBox::new(0, 0, 30, 30));
}

#[test]
fn empty_tensor_yields_empty_result() {
  let mut det = detector(DetectConfig::default(), StubEngine::candidates_first(&[]));
  let result = det.detect(&RgbImage::new(320, 240)).unwrap();
  assert!(result.is_empty());
}

#[test]
fn engine_sees_network_sized_nchw_input() {
  let mut det = detector(DetectConfig::default(), StubEngine::candidates_first(&[]));
  det.detect(&RgbImage::new(1920, 1080)).unwrap();
  det.detect(&RgbImage::new(17, 33)).unwrap();

  let engine = det.model_mut().engine_mut().unwrap();
  assert_eq!(engine.seen_shapes, vec![[1, 3, 640, 640], [1, 3, 640, 640]]);
}

#[test]
fn attribute_first_tensor_matches_candidate_first() {
  let rows = [
    [100.0, 100.0, 50.0, 50.0, 0.8, 0.1, 0.0],
    [105.0, 100.0, 50.0, 50.0, 0.6, 0.0, 0.0],
    [400.0, 300.0, 80.0, 40.0, 0.0, 0.0, 0.7],
  ];
  let image = RgbImage::new(800, 600);

  let mut nc = detector(DetectConfig::default(), StubEngine::candidates_first(&rows));
  let mut cn = detector(DetectConfig::default(), StubEngine::attributes_first(&rows));

  let a = nc.detect(&image).unwrap();
  let b = cn.detect(&image).unwrap();
  assert_eq!(a, b);
  assert_eq!(a.len(), 2);
}

#[test]
fn inference_failure_is_reported() {
  let mut det = detector(DetectConfig::default(), FailingEngine);
  let err = det.detect(&RgbImage::new(64, 64)).unwrap_err();
  assert!(matches!(err, DetectError::InferenceError(_)));
}

#[test]
fn letterbox_round_trips_box_on_wide_image() {
  // 1280x640 缩放 0.5 后上下各填充 160 行
  let mut det = detector(
    DetectConfig::default().resize(ResizeMode::Letterbox),
    StubEngine::candidates_first(&[[320.0, 320.0, 100.0, 50.0, 0.9, 0.0, 0.0]]),
  );

  let result = det.detect(&RgbImage::new(1280, 640)).unwrap();
  assert_eq!(result.items[0].bbox, PixelBox::new(540, 270, 200, 100));
}

fn random_rows(rng: &mut StdRng, count: usize) -> Vec<[f32; ATTRS]> {
  (0..count)
    .map(|_| {
      let mut row = [0.0f32; ATTRS];
      row[0] = rng.random_range(0.0..640.0);
      row[1] = rng.random_range(0.0..640.0);
      row[2] = rng.random_range(1.0..200.0);
      row[3] = rng.random_range(1.0..200.0);
      for score in row.iter_mut().skip(4) {
        *score = rng.random_range(0.0..1.0);
      }
      row
    })
    .collect()
}

#[test]
fn random_tensors_satisfy_pipeline_properties() {
  let mut rng = StdRng::seed_from_u64(0x6b78);

  for round in 0..12 {
    let rows = random_rows(&mut rng, 300);
    let scope = if round % 2 == 0 {
      SuppressionScope::Joint
    } else {
      SuppressionScope::PerClass
    };
    let config = DetectConfig::default()
      .confidence(0.3)
      .nms(0.45)
      .suppression(scope);
    let (width, height) = (rng.random_range(1..1200), rng.random_range(1..1200));
    let image = RgbImage::new(width, height);

    let mut pipeline = detector(config, StubEngine::candidates_first(&rows));
    let first = pipeline.detect(&image).unwrap();
    let second = pipeline.detect(&image).unwrap();
    assert_eq!(first, second, "结果应当确定");

    let items = &first.items;
    for det in items.iter() {
      assert!(det.confidence >= 0.3 && det.confidence <= 1.0);
      assert!(det.class_id < NUM_CLASSES);
      assert!(det.bbox.width >= 1 && det.bbox.height >= 1);
      assert!(det.bbox.right() <= width && det.bbox.bottom() <= height);
    }

    for pair in items.windows(2) {
      assert!(pair[0].confidence >= pair[1].confidence);
    }

    for (i, a) in items.iter().enumerate() {
      for b in items.iter().skip(i + 1) {
        if scope == SuppressionScope::PerClass && a.class_id != b.class_id {
          continue;
        }
        let overlap = iou(&a.bbox, &b.bbox);
        assert!(overlap < 0.45, "存活框之间 IoU 过大: {}", overlap);
      }
    }
  }
}
