// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/model/replay.rs - 回放固定输出张量的推理引擎
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

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::NchwTensor,
  model::{InferenceEngine, RawOutputTensor, TensorSizeError},
  url_to_path,
};

#[derive(Error, Debug)]
pub enum ReplayError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("张量错误: {0}")]
  TensorError(#[from] TensorSizeError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Deserialize)]
struct ReplayDump {
  shape: Vec<usize>,
  data: Vec<f32>,
}

/// 忽略输入、每次返回同一输出张量的推理引擎
///
/// 输出张量可直接构造，或从 `{"shape": [...], "data": [...]}` 格式的 JSON 文件加载。
#[derive(Debug, Clone)]
pub struct ReplayEngine {
  output: RawOutputTensor,
  calls: usize,
}

impl ReplayEngine {
  pub fn new(output: RawOutputTensor) -> Self {
    Self { output, calls: 0 }
  }

  pub fn from_file(path: &Path) -> Result<Self, ReplayError> {
    info!("加载回放张量: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let dump: ReplayDump = serde_json::from_str(&content)?;
    let output = RawOutputTensor::new(dump.shape, dump.data)?;
    debug!("回放张量形状: {:?}", output.shape());
    Ok(Self::new(output))
  }

  /// 已执行的推理次数
  pub fn calls(&self) -> usize {
    self.calls
  }
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayEngine {
  type Error = ReplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayError::SchemeMismatch(url.scheme().to_string()));
    }

    Self::from_file(&url_to_path(url))
  }
}

impl InferenceEngine for ReplayEngine {
  type Error = ReplayError;

  fn infer<const W: u32, const H: u32>(
    &mut self,
    input: &NchwTensor<W, H>,
  ) -> Result<RawOutputTensor, Self::Error> {
    debug!("回放推理, 输入形状: {:?}", input.shape());
    self.calls += 1;
    Ok(self.output.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn replays_same_tensor_for_every_call() {
    let output = RawOutputTensor::new(vec![1, 2], vec![0.5, 0.25]).unwrap();
    let mut engine = ReplayEngine::new(output.clone());
    let input = NchwTensor::<4, 4>::default();

    assert_eq!(engine.infer(&input).unwrap(), output);
    assert_eq!(engine.infer(&input).unwrap(), output);
    assert_eq!(engine.calls(), 2);
  }

  #[test]
  fn rejects_dump_with_wrong_length() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"{{"shape": [2, 2], "data": [1.0, 2.0, 3.0]}}"#).unwrap();
    assert!(matches!(
      ReplayEngine::from_file(file.path()),
      Err(ReplayError::TensorError(TensorSizeError { expected: 4, actual: 3, .. }))
    ));
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("onnx:///model.onnx").unwrap();
    assert!(matches!(
      ReplayEngine::from_url(&url),
      Err(ReplayError::SchemeMismatch(_))
    ));
  }
}
