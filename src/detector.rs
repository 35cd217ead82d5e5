// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/detector.rs - 目标检测器
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

use std::{fmt::Display, sync::Arc};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  config::{ConfigError, DEFAULT_INPUT_HEIGHT, DEFAULT_INPUT_WIDTH, DetectConfig},
  decode::{DecodeError, decode},
  frame::ImageGeometry,
  label::ClassTable,
  model::{DetectResult, InferenceEngine, ModelSlot, RawOutputTensor},
  nms::suppress,
  preprocess::{PreprocessError, bgr_to_rgb, preprocess},
};

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("未加载模型")]
  NoModelLoaded,
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("预处理错误: {0}")]
  PreprocessError(#[from] PreprocessError),
  #[error("推理错误: {0}")]
  InferenceError(Box<dyn std::error::Error + Send + Sync>),
  #[error("解码错误: {0}")]
  DecodeError(#[from] DecodeError),
}

/// 可执行检测的对象
pub trait Detect {
  type Error;

  fn detect(&mut self, image: &RgbImage) -> Result<DetectResult, Self::Error>;
}

/// 使用默认 640x640 输入尺寸的检测器
pub type DefaultDetector<E> = Detector<DEFAULT_INPUT_WIDTH, DEFAULT_INPUT_HEIGHT, E>;

/// 目标检测器
///
/// 持有配置、只读类别表和可替换的模型。`W`、`H` 为网络输入尺寸。
pub struct Detector<const W: u32, const H: u32, E> {
  config: DetectConfig,
  classes: Arc<ClassTable>,
  model: ModelSlot<E>,
}

impl<const W: u32, const H: u32, E> Detector<W, H, E> {
  /// 创建未加载模型的检测器
  pub fn new(config: DetectConfig, classes: Arc<ClassTable>) -> Result<Self, ConfigError> {
    config.validate()?;
    Ok(Self {
      config,
      classes,
      model: ModelSlot::empty(),
    })
  }

  pub fn with_engine(mut self, engine: E) -> Self {
    self.model.replace(engine);
    self
  }

  pub fn config(&self) -> &DetectConfig {
    &self.config
  }

  pub fn classes(&self) -> &Arc<ClassTable> {
    &self.classes
  }

  pub fn model(&self) -> &ModelSlot<E> {
    &self.model
  }

  pub fn model_mut(&mut self) -> &mut ModelSlot<E> {
    &mut self.model
  }

  pub fn is_model_loaded(&self) -> bool {
    self.model.is_loaded()
  }

  pub fn set_config(&mut self, config: DetectConfig) -> Result<(), ConfigError> {
    config.validate()?;
    self.config = config;
    Ok(())
  }

  pub fn set_confidence(&mut self, threshold: f32) -> Result<(), ConfigError> {
    self.set_config(self.config.confidence(threshold))
  }

  pub fn set_nms_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
    self.set_config(self.config.nms(threshold))
  }
}

impl<const W: u32, const H: u32, E> Detector<W, H, E>
where
  E: FromUrl,
  E::Error: Display,
{
  /// 热替换模型，失败时保留之前的模型
  pub fn set_model(&mut self, url: &Url) -> Result<(), E::Error> {
    self.model.load(url)
  }
}

impl<const W: u32, const H: u32, E: InferenceEngine> Detect for Detector<W, H, E> {
  type Error = DetectError;

  fn detect(&mut self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    let config = self.config;
    let Some(engine) = self.model.engine_mut() else {
      error!("检测前未加载模型");
      return Err(DetectError::NoModelLoaded);
    };
    run_pipeline::<W, H, E>(engine, image, &config, &self.classes)
  }
}

impl<const W: u32, const H: u32, E: InferenceEngine> Detector<W, H, E> {
  /// 对按 BGR 顺序排列的紧凑像素缓冲区执行检测
  pub fn detect_bgr(
    &mut self,
    width: u32,
    height: u32,
    pixels: &[u8],
  ) -> Result<DetectResult, DetectError> {
    let image = bgr_to_rgb(width, height, pixels)?;
    self.detect(&image)
  }
}

/// 预处理 → 推理 → 解码 → 抑制，依次执行
pub fn run_pipeline<const W: u32, const H: u32, E: InferenceEngine>(
  engine: &mut E,
  image: &RgbImage,
  config: &DetectConfig,
  classes: &ClassTable,
) -> Result<DetectResult, DetectError> {
  let (tensor, geometry) = preprocess::<W, H>(image, config.resize)?;

  debug!("执行模型推理");
  let raw = engine
    .infer(&tensor)
    .map_err(|e| DetectError::InferenceError(Box::new(e)))?;

  Ok(postprocess(&raw, &geometry, config, classes)?)
}

/// 对原始输出张量做解码和非极大值抑制
pub fn postprocess(
  raw: &RawOutputTensor,
  geometry: &ImageGeometry,
  config: &DetectConfig,
  classes: &ClassTable,
) -> Result<DetectResult, DecodeError> {
  let candidates = decode(
    raw,
    geometry,
    classes,
    config.confidence_threshold,
    config.layout,
  )?;
  let kept = suppress(
    candidates,
    config.confidence_threshold,
    config.nms_threshold,
    config.suppression,
  );

  info!("检测到 {} 个物体", kept.len());
  Ok(DetectResult::from(kept))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::ReplayEngine;
  use crate::rescale::PixelBox;

  fn engine(rows: &[[f32; 7]]) -> ReplayEngine {
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    ReplayEngine::new(RawOutputTensor::new(vec![1, rows.len(), 7], data).unwrap())
  }

  fn classes() -> Arc<ClassTable> {
    Arc::new(ClassTable::new(["a", "b", "c"]).unwrap())
  }

  #[test]
  fn detect_without_model_fails_fast() {
    let mut detector = Detector::<64, 64, ReplayEngine>::new(DetectConfig::default(), classes()).unwrap();
    let image = RgbImage::new(64, 64);
    assert!(matches!(
      detector.detect(&image),
      Err(DetectError::NoModelLoaded)
    ));
  }

  #[test]
  fn failed_first_load_reports_no_model() {
    let mut detector = Detector::<64, 64, ReplayEngine>::new(DetectConfig::default(), classes()).unwrap();
    let missing = Url::parse("replay:///definitely/not/here.json").unwrap();

    assert!(detector.set_model(&missing).is_err());
    assert!(!detector.is_model_loaded());
    assert!(detector.model().source().is_none());
    assert!(matches!(
      detector.detect(&RgbImage::new(64, 64)),
      Err(DetectError::NoModelLoaded)
    ));
  }

  #[test]
  fn identity_scenario_through_detector() {
    let mut detector = Detector::<640, 640, _>::new(DetectConfig::default(), classes())
      .unwrap()
      .with_engine(engine(&[[320.0, 320.0, 100.0, 50.0, 0.0, 0.0, 0.9]]));

    let result = detector.detect(&RgbImage::new(640, 640)).unwrap();
    assert_eq!(result.len(), 1);
    let det = &result.items[0];
    assert_eq!(det.bbox, PixelBox::new(270, 295, 100, 50));
    assert_eq!(det.class_id, 2);
    assert_eq!(det.class_name, "c");
    assert_eq!(det.confidence, 0.9);
  }

  #[test]
  fn bgr_buffer_is_detected_like_rgb_image() {
    let mut detector = Detector::<640, 640, _>::new(DetectConfig::default(), classes())
      .unwrap()
      .with_engine(engine(&[[320.0, 320.0, 100.0, 50.0, 0.0, 0.0, 0.9]]));

    let pixels = vec![0u8; 1280 * 1280 * 3];
    let result = detector.detect_bgr(1280, 1280, &pixels).unwrap();
    assert_eq!(result.items[0].bbox, PixelBox::new(540, 590, 200, 100));

    assert!(matches!(
      detector.detect_bgr(4, 4, &pixels[..10]),
      Err(DetectError::PreprocessError(PreprocessError::BufferSize { .. }))
    ));
  }

  #[test]
  fn thresholds_are_read_per_call() {
    let mut detector = Detector::<640, 640, _>::new(DetectConfig::default(), classes())
      .unwrap()
      .with_engine(engine(&[
        [100.0, 100.0, 50.0, 50.0, 0.8, 0.0, 0.0],
        [105.0, 100.0, 50.0, 50.0, 0.6, 0.0, 0.0],
      ]));
    let image = RgbImage::new(640, 640);

    assert_eq!(detector.detect(&image).unwrap().len(), 1);

    detector.set_nms_threshold(1.0).unwrap();
    assert_eq!(detector.detect(&image).unwrap().len(), 2);

    detector.set_confidence(0.7).unwrap();
    assert_eq!(detector.detect(&image).unwrap().len(), 1);
  }

  #[test]
  fn invalid_threshold_leaves_config_unchanged() {
    let mut detector = Detector::<640, 640, ReplayEngine>::new(DetectConfig::default(), classes()).unwrap();
    assert!(detector.set_confidence(2.0).is_err());
    assert_eq!(detector.config().confidence_threshold, 0.5);
    assert!(Detector::<640, 640, ReplayEngine>::new(DetectConfig::default().nms(-1.0), classes()).is_err());
  }

  #[test]
  fn structural_mismatch_is_surfaced() {
    let data = vec![0.0f32; 2 * 6];
    let replay = ReplayEngine::new(RawOutputTensor::new(vec![1, 2, 6], data).unwrap());
    let mut detector = Detector::<640, 640, _>::new(DetectConfig::default(), classes())
      .unwrap()
      .with_engine(replay);
    assert!(matches!(
      detector.detect(&RgbImage::new(32, 32)),
      Err(DetectError::DecodeError(DecodeError::ShapeMismatch { .. }))
    ));
  }
}
