// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/input/image_directory.rs - 图像目录输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{
    Frame,
    image_file::{ImageFileInputError, file_name, load_rgb},
  },
  url_to_path,
};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("读取 {path} 失败: {source}")]
  FrameError {
    path: PathBuf,
    source: ImageFileInputError,
  },
}

/// 按文件名顺序逐张读取目录中的图像
pub struct ImageDirectoryInput {
  paths: std::vec::IntoIter<PathBuf>,
  index: u64,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "dir";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemeMismatch);
    }
    Self::open(&url_to_path(url))
  }
}

impl ImageDirectoryInput {
  pub fn open(directory: &Path) -> Result<Self, ImageDirectoryInputError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      if path.is_file() && is_image(&path) {
        paths.push(path);
      }
    }
    paths.sort();

    info!("目录 {} 中共有 {} 张图像", directory.display(), paths.len());

    Ok(ImageDirectoryInput {
      paths: paths.into_iter(),
      index: 0,
    })
  }

  /// 尚未读取的图像数量
  pub fn remaining(&self) -> usize {
    self.paths.len()
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
    })
    .unwrap_or(false)
}

impl Iterator for ImageDirectoryInput {
  type Item = Result<Frame, ImageDirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.next()?;
    let index = self.index;
    self.index += 1;

    debug!("读取第 {} 张图像: {}", index, path.display());
    Some(
      load_rgb(&path)
        .map(|image| Frame {
          image,
          index,
          name: file_name(&path),
        })
        .map_err(|source| ImageDirectoryInputError::FrameError { path, source }),
    )
  }
}
