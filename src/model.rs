// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/model.rs - 模型
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

use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, frame::NchwTensor, rescale::PixelBox};

mod replay;
pub use self::replay::{ReplayEngine, ReplayError};

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxEngine, OnnxEngineBuilder, OnnxError};

/// 推理引擎边界：给定归一化输入张量，返回原始输出张量
pub trait InferenceEngine {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer<const W: u32, const H: u32>(
    &mut self,
    input: &NchwTensor<W, H>,
  ) -> Result<RawOutputTensor, Self::Error>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("张量数据长度不匹配: 形状 {shape:?} 需要 {expected} 个元素, 实际 {actual} 个")]
pub struct TensorSizeError {
  pub shape: Vec<usize>,
  pub expected: usize,
  pub actual: usize,
}

/// 推理引擎产生的原始输出张量，构造后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutputTensor {
  shape: Box<[usize]>,
  data: Box<[f32]>,
}

impl RawOutputTensor {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, TensorSizeError> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
      return Err(TensorSizeError {
        shape,
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      shape: shape.into_boxed_slice(),
      data: data.into_boxed_slice(),
    })
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }
}

/// 最终检测结果，边界框位于原始图像像素空间
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: PixelBox,
  pub class_id: usize,
  pub class_name: String,
  pub confidence: f32,
}

/// 单次检测调用的结果，按 NMS 保留顺序排列
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 可热替换的模型槽位
///
/// 替换失败时保留之前加载的模型；从未加载过模型时为空状态。
pub struct ModelSlot<E> {
  engine: Option<E>,
  source: Option<Url>,
}

impl<E> Default for ModelSlot<E> {
  fn default() -> Self {
    Self::empty()
  }
}

impl<E> ModelSlot<E> {
  pub fn empty() -> Self {
    Self {
      engine: None,
      source: None,
    }
  }

  pub fn is_loaded(&self) -> bool {
    self.engine.is_some()
  }

  /// 当前模型的来源，直接注入的引擎没有来源
  pub fn source(&self) -> Option<&Url> {
    self.source.as_ref()
  }

  pub fn engine_mut(&mut self) -> Option<&mut E> {
    self.engine.as_mut()
  }

  /// 直接替换引擎，返回之前的引擎
  pub fn replace(&mut self, engine: E) -> Option<E> {
    self.source = None;
    self.engine.replace(engine)
  }
}

impl<E> ModelSlot<E>
where
  E: FromUrl,
  E::Error: Display,
{
  /// 从 URL 加载新模型，成功后才替换当前模型
  pub fn load(&mut self, url: &Url) -> Result<(), E::Error> {
    info!("加载模型: {}", url);
    match E::from_url(url) {
      Ok(engine) => {
        self.engine = Some(engine);
        self.source = Some(url.clone());
        info!("模型加载完成");
        Ok(())
      }
      Err(e) => {
        error!("模型加载失败: {}", e);
        if self.is_loaded() {
          warn!("继续使用之前的模型: {:?}", self.source.as_ref().map(Url::as_str));
        }
        Err(e)
      }
    }
  }
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("回放模型错误: {0}")]
  ReplayError(#[from] ReplayError),
  #[cfg(feature = "model_onnx")]
  #[error("ONNX 模型错误: {0}")]
  OnnxError(#[from] OnnxError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 按 URL 方案选择的推理引擎
pub enum EngineWrapper {
  Replay(ReplayEngine),
  #[cfg(feature = "model_onnx")]
  Onnx(OnnxEngine),
}

impl FromUrl for EngineWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    match url.scheme() {
      ReplayEngine::SCHEME => Ok(EngineWrapper::Replay(ReplayEngine::from_url(url)?)),
      #[cfg(feature = "model_onnx")]
      OnnxEngine::SCHEME => Ok(EngineWrapper::Onnx(OnnxEngine::from_url(url)?)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InferenceEngine for EngineWrapper {
  type Error = ModelError;

  fn infer<const W: u32, const H: u32>(
    &mut self,
    input: &NchwTensor<W, H>,
  ) -> Result<RawOutputTensor, Self::Error> {
    match self {
      EngineWrapper::Replay(engine) => engine.infer(input).map_err(ModelError::from),
      #[cfg(feature = "model_onnx")]
      EngineWrapper::Onnx(engine) => engine.infer(input).map_err(ModelError::from),
    }
  }
}
