// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/output/json_file.rs - JSON Lines 文件输出
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

use std::{
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  path::Path,
  sync::Mutex,
};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::Frame,
  model::{DetectResult, Detection},
  output::Render,
  url_to_path,
};

#[derive(Error, Debug)]
pub enum JsonFileOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输出文件锁已损坏")]
  Poisoned,
}

/// 单帧记录，每帧占一行
#[derive(Serialize)]
struct FrameRecord<'a> {
  source: &'a str,
  frame: u64,
  timestamp: String,
  detections: &'a [Detection],
}

/// 以 JSON Lines 格式追加写入检测结果
///
/// `json:///path/to/out.jsonl` 默认截断已有文件，带 `append` 查询参数时追加。
pub struct JsonFileOutput {
  writer: Mutex<BufWriter<File>>,
}

impl FromUrlWithScheme for JsonFileOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonFileOutput {
  type Error = JsonFileOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(JsonFileOutputError::SchemeMismatch);
    }

    let append = url.query_pairs().any(|(k, _)| k == "append");
    Self::create(&url_to_path(url), append)
  }
}

impl JsonFileOutput {
  pub fn create(path: &Path, append: bool) -> Result<Self, JsonFileOutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .append(append)
      .truncate(!append)
      .open(path)?;
    info!("检测结果将写入 {}", path.display());

    Ok(JsonFileOutput {
      writer: Mutex::new(BufWriter::new(file)),
    })
  }
}

impl Render<Frame, DetectResult> for JsonFileOutput {
  type Error = JsonFileOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let record = FrameRecord {
      source: &frame.name,
      frame: frame.index,
      timestamp: Utc::now().to_rfc3339(),
      detections: &result.items,
    };

    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonFileOutputError::Poisoned)?;
    serde_json::to_writer(&mut *writer, &record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    debug!("第 {} 帧写入 {} 条检测结果", frame.index, result.len());
    Ok(())
  }
}
