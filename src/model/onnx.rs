// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
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

use std::path::PathBuf;

use ndarray::ArrayView4;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::NchwTensor,
  model::{InferenceEngine, RawOutputTensor, TensorSizeError},
  url_to_path,
};

const DEFAULT_INTRA_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("ONNX Runtime 错误: {0}")]
  RuntimeError(String),
  #[error("输入张量形状错误: {0}")]
  InputShape(#[from] ndarray::ShapeError),
  #[error("模型没有输出")]
  NoOutput,
  #[error("输出张量形状无效: {0:?}")]
  OutputShape(Vec<i64>),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorSizeError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl OnnxError {
  fn runtime(e: impl std::fmt::Display) -> Self {
    OnnxError::RuntimeError(e.to_string())
  }
}

pub struct OnnxEngineBuilder {
  model_path: PathBuf,
  intra_threads: usize,
}

impl FromUrl for OnnxEngineBuilder {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != OnnxEngine::SCHEME {
      return Err(OnnxError::SchemeMismatch(url.scheme().to_string()));
    }

    let intra_threads = url
      .query_pairs()
      .find(|(k, _)| k == "threads")
      .and_then(|(_, v)| v.parse().ok())
      .unwrap_or(DEFAULT_INTRA_THREADS);

    Ok(OnnxEngineBuilder {
      model_path: url_to_path(url),
      intra_threads,
    })
  }
}

impl OnnxEngineBuilder {
  pub fn build(self) -> Result<OnnxEngine, OnnxError> {
    if !self.model_path.exists() {
      error!("模型文件不存在: {}", self.model_path.display());
      return Err(OnnxError::ModelNotFound(self.model_path));
    }

    info!("加载 ONNX 模型: {}", self.model_path.display());
    let session = Session::builder()
      .map_err(OnnxError::runtime)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(OnnxError::runtime)?
      .with_intra_threads(self.intra_threads)
      .map_err(OnnxError::runtime)?
      .commit_from_file(&self.model_path)
      .map_err(OnnxError::runtime)?;
    info!("ONNX 模型加载完成, 线程数: {}", self.intra_threads);

    Ok(OnnxEngine { session })
  }
}

/// 单输入单输出的 ONNX 检测模型，第一个输出作为原始输出张量
pub struct OnnxEngine {
  session: Session,
}

impl FromUrlWithScheme for OnnxEngine {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxEngine {
  type Error = OnnxError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    OnnxEngineBuilder::from_url(url)?.build()
  }
}

impl InferenceEngine for OnnxEngine {
  type Error = OnnxError;

  fn infer<const W: u32, const H: u32>(
    &mut self,
    input: &NchwTensor<W, H>,
  ) -> Result<RawOutputTensor, Self::Error> {
    let [n, c, h, w] = input.shape();
    let view = ArrayView4::from_shape((n, c, h, w), input.as_slice())?;

    debug!("执行 ONNX 推理");
    let outputs = self
      .session
      .run(ort::inputs![
        TensorRef::from_array_view(view).map_err(OnnxError::runtime)?
      ])
      .map_err(OnnxError::runtime)?;

    if outputs.len() == 0 {
      return Err(OnnxError::NoOutput);
    }

    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(OnnxError::runtime)?;

    let dims: Vec<i64> = shape.iter().copied().collect();
    if dims.iter().any(|&d| d < 0) {
      return Err(OnnxError::OutputShape(dims));
    }
    debug!("ONNX 输出形状: {:?}", dims);

    let output = RawOutputTensor::new(
      dims.iter().map(|&d| d as usize).collect(),
      data.to_vec(),
    )?;
    Ok(output)
  }
}
