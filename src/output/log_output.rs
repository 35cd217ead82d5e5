// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::convert::Infallible;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::Frame, model::DetectResult, output::Render};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 把检测结果逐条写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    Ok(LogOutput)
  }
}

impl Render<Frame, DetectResult> for LogOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    if result.is_empty() {
      info!("帧 {} ({}): 未检测到物体", frame.index, frame.name);
      return Ok(());
    }

    info!(
      "帧 {} ({}): 检测到 {} 个物体",
      frame.index,
      frame.name,
      result.len()
    );
    for det in result.iter() {
      info!(
        "  - {}: {:.2}% at ({}, {}, {}x{})",
        det.class_name,
        det.confidence * 100.0,
        det.bbox.x,
        det.bbox.y,
        det.bbox.width,
        det.bbox.height
      );
    }
    Ok(())
  }
}
