// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/config.rs - 检测配置
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

use std::str::FromStr;

use thiserror::Error;
use tracing::error;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值无效: {0}, 应在 [0, 1] 范围内")]
  InvalidConfidence(f32),
  #[error("NMS 阈值无效: {0}, 应在 [0, 1] 范围内")]
  InvalidNmsThreshold(f32),
  #[error("未知的张量布局: {0}")]
  UnknownLayout(String),
}

/// 非极大值抑制的作用范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuppressionScope {
  /// 所有类别共同参与抑制
  #[default]
  Joint,
  /// 仅在同一类别内抑制
  PerClass,
}

/// 推理输出张量的排布方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  /// 根据形状和类别数自动判断
  #[default]
  Auto,
  /// `[N, 4 + C]`
  CandidatesFirst,
  /// `[4 + C, N]`
  AttributesFirst,
}

impl FromStr for TensorLayout {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "auto" => Ok(TensorLayout::Auto),
      "candidates" | "nc" => Ok(TensorLayout::CandidatesFirst),
      "attributes" | "cn" => Ok(TensorLayout::AttributesFirst),
      other => Err(ConfigError::UnknownLayout(other.to_string())),
    }
  }
}

/// 输入图像缩放方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
  /// 两轴独立拉伸到网络输入尺寸
  #[default]
  Stretch,
  /// 保持长宽比并以灰色填充
  Letterbox,
}

/// 单次检测调用所使用的配置，调用开始时读取一次
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectConfig {
  pub confidence_threshold: f32,
  pub nms_threshold: f32,
  pub suppression: SuppressionScope,
  pub layout: TensorLayout,
  pub resize: ResizeMode,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      suppression: SuppressionScope::default(),
      layout: TensorLayout::default(),
      resize: ResizeMode::default(),
    }
  }
}

impl DetectConfig {
  pub fn confidence(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn nms(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn suppression(mut self, scope: SuppressionScope) -> Self {
    self.suppression = scope;
    self
  }

  pub fn layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn resize(mut self, resize: ResizeMode) -> Self {
    self.resize = resize;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      error!("置信度阈值超出范围: {}", self.confidence_threshold);
      return Err(ConfigError::InvalidConfidence(self.confidence_threshold));
    }
    if !(0.0..=1.0).contains(&self.nms_threshold) {
      error!("NMS 阈值超出范围: {}", self.nms_threshold);
      return Err(ConfigError::InvalidNmsThreshold(self.nms_threshold));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_thresholds() {
    let config = DetectConfig::default();
    assert_eq!(config.confidence_threshold, 0.5);
    assert_eq!(config.nms_threshold, 0.4);
    assert_eq!(config.suppression, SuppressionScope::Joint);
    assert_eq!(config.layout, TensorLayout::Auto);
    assert_eq!(config.resize, ResizeMode::Stretch);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn boundary_thresholds_are_valid() {
    assert!(DetectConfig::default().nms(0.0).validate().is_ok());
    assert!(DetectConfig::default().nms(1.0).validate().is_ok());
    assert!(DetectConfig::default().confidence(0.0).validate().is_ok());
    assert!(DetectConfig::default().confidence(1.0).validate().is_ok());
  }

  #[test]
  fn out_of_range_thresholds_are_rejected() {
    assert_eq!(
      DetectConfig::default().confidence(1.5).validate(),
      Err(ConfigError::InvalidConfidence(1.5))
    );
    assert_eq!(
      DetectConfig::default().nms(-0.1).validate(),
      Err(ConfigError::InvalidNmsThreshold(-0.1))
    );
    assert!(DetectConfig::default().nms(f32::NAN).validate().is_err());
  }

  #[test]
  fn layout_parses_from_cli_names() {
    assert_eq!("auto".parse::<TensorLayout>(), Ok(TensorLayout::Auto));
    assert_eq!("NC".parse::<TensorLayout>(), Ok(TensorLayout::CandidatesFirst));
    assert_eq!(
      "attributes".parse::<TensorLayout>(),
      Ok(TensorLayout::AttributesFirst)
    );
    assert!("nhwc".parse::<TensorLayout>().is_err());
  }
}
