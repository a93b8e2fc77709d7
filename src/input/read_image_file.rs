// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, url_file_path};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 单张图像输入，迭代一次后结束
pub struct ImageFileInput {
  image: Option<RgbImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url_file_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    info!(
      "读取图像文件: {} ({}x{})",
      path.display(),
      image.width(),
      image.height()
    );

    Ok(ImageFileInput {
      image: Some(image.into_rgb8()),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take().map(RgbFrame::from)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_a_single_frame() {
    let path = std::env::temp_dir().join("dexined_edge_read_image_file_test.png");
    RgbImage::from_pixel(5, 3, image::Rgb([1, 2, 3]))
      .save(&path)
      .unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let mut url_string = url.to_string();
    url_string.replace_range(..4, "image");
    let mut input = ImageFileInput::from_url(&Url::parse(&url_string).unwrap()).unwrap();

    let frame = input.next().unwrap();
    assert_eq!((frame.width(), frame.height()), (5, 3));
    assert_eq!(frame.pixel(4, 2), [1, 2, 3]);
    assert!(input.next().is_none());

    let _ = std::fs::remove_file(path);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("gst://file/tmp/a.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
