// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/input.rs - 图像输入
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

use image::RgbImage;
use thiserror::Error;

use crate::FromUrl;
#[cfg(feature = "read_image_file")]
use crate::FromUrlWithScheme;

#[cfg(feature = "read_image_file")]
mod image_directory;
#[cfg(feature = "read_image_file")]
mod image_file;

#[cfg(feature = "read_image_file")]
pub use self::image_directory::{ImageDirectoryInput, ImageDirectoryInputError};
#[cfg(feature = "read_image_file")]
pub use self::image_file::{ImageFileInput, ImageFileInputError};

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 帧来源名称（通常为文件名）
  pub name: String,
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "read_image_file")]
  #[error("图像目录输入错误: {0}")]
  ImageDirectoryInputError(#[from] ImageDirectoryInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  ImageDirectory(ImageDirectoryInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "read_image_file")]
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      #[cfg(feature = "read_image_file")]
      ImageDirectoryInput::SCHEME => Ok(InputWrapper::ImageDirectory(
        ImageDirectoryInput::from_url(url)?,
      )),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InputWrapper {
  /// 是否为多帧输入
  pub fn is_sequence(&self) -> bool {
    #[cfg(feature = "read_image_file")]
    if matches!(self, InputWrapper::ImageDirectory(_)) {
      return true;
    }
    false
  }
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match *self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(ref mut input) => input.next().map(Ok),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageDirectory(ref mut input) => {
        input.next().map(|r| r.map_err(InputError::from))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use url::Url;

  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("v4l2:///dev/video0").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(scheme)) if scheme == "v4l2"
    ));
  }

  #[cfg(feature = "read_image_file")]
  #[test]
  fn dispatches_file_and_directory_sources() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.png");
    RgbImage::new(3, 2).save(&path).unwrap();

    let mut file_url = Url::parse("image:///").unwrap();
    file_url.set_path(&path.to_string_lossy());
    let mut single = InputWrapper::from_url(&file_url).unwrap();
    assert!(!single.is_sequence());
    let frame = single.next().unwrap().unwrap();
    assert_eq!(frame.name, "one.png");
    assert_eq!(frame.image.dimensions(), (3, 2));
    assert!(single.next().is_none());

    let mut dir_url = Url::parse("dir:///").unwrap();
    dir_url.set_path(&dir.path().to_string_lossy());
    let mut sequence = InputWrapper::from_url(&dir_url).unwrap();
    assert!(sequence.is_sequence());
    assert_eq!(sequence.next().unwrap().unwrap().index, 0);
  }
}
