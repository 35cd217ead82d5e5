// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, input::Frame, model::DetectResult, output::Render, url_to_path,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("帧计数器锁已损坏")]
  Poisoned,
}

/// 记录中类别的写法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
  Id,
  Name,
}

/// 把帧图像与检测记录按日期归档到目录
///
/// 文件布局为 `YYYY/MM/DD/HH-MM-SS-NNNN.png` 及同名 `.txt`，
/// 每行记录 `类别, 置信度, x, y, 宽, 高`。
/// 查询参数 `record=id` 以类别编号记录，`always` 时空结果也会保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  label: LabelStyle,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let label = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| {
        if v == "id" {
          LabelStyle::Id
        } else {
          LabelStyle::Name
        }
      })
      .unwrap_or(LabelStyle::Name);
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(url_to_path(uri), label, always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: PathBuf, label: LabelStyle, always: bool) -> Self {
    DirectoryRecordOutput {
      directory,
      label,
      frame_counter: Mutex::new(0),
      always,
    }
  }

  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::Poisoned)?;
    *counter = counter.wrapping_add(1);
    Ok(*counter)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }

  fn record(&self, result: &DetectResult, path: &Path) -> Result<(), std::io::Error> {
    let records: Vec<String> = result
      .iter()
      .map(|item| {
        let name = match self.label {
          LabelStyle::Name => item.class_name.clone(),
          LabelStyle::Id => item.class_id.to_string(),
        };
        format!(
          "{}, {:.4}, {}, {}, {}, {}",
          name, item.confidence, item.bbox.x, item.bbox.y, item.bbox.width, item.bbox.height
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), records.join("\n"))
  }
}

impl Render<Frame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    frame.image.save(&path)?;
    self.record(result, &path)?;
    debug!("第 {} 帧记录到 {}", frame.index, path.display());
    Ok(())
  }
}
