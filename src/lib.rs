// 该文件是 Kuangxuan （框选） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod config;
pub mod decode;
pub mod detector;
pub mod frame;
pub mod input;
pub mod label;
pub mod model;
pub mod nms;
pub mod output;
pub mod preprocess;
pub mod rescale;
pub mod task;

pub use self::config::{DetectConfig, ResizeMode, SuppressionScope, TensorLayout};
pub use self::detector::{Detect, DetectError, Detector};
pub use self::frame::ImageGeometry;
pub use self::label::ClassTable;
pub use self::model::{DetectResult, Detection, InferenceEngine, RawOutputTensor};
pub use self::rescale::PixelBox;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 将 URL 中经过百分号编码的路径还原为本地路径
pub fn url_to_path(url: &url::Url) -> PathBuf {
  match urlencoding::decode(url.path()) {
    Ok(path) => PathBuf::from(path.into_owned()),
    Err(_) => PathBuf::from(url.path()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_is_percent_decoded() {
    let url = url::Url::parse("replay:///tmp/my%20dump.json").unwrap();
    assert_eq!(url_to_path(&url), PathBuf::from("/tmp/my dump.json"));
  }
}
