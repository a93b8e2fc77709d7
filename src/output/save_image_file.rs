// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::{EdgeMaps, EdgeView},
  output::{Render, compose::compose_result, url_view},
  url_file_path, url_flag,
};

/// 把每一帧的边缘图写到同一个文件，后一帧覆盖前一帧
///
/// `image:///tmp/edges.png?view=averaged&compose`
pub struct SaveImageFileOutput {
  path: PathBuf,
  view: EdgeView,
  compose: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: url_file_path(uri),
      view: url_view(uri),
      compose: url_flag(uri, "compose"),
    })
  }
}

impl SaveImageFileOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(SaveImageFileError::IoError)?;
    }

    image
      .save(&self.path)
      .map_err(SaveImageFileError::ImageError)?;

    info!("保存边缘图到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<RgbFrame, EdgeMaps> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbFrame, result: &EdgeMaps) -> Result<(), Self::Error> {
    self.save_image(compose_result(frame, result, self.view, self.compose))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, Luma, Rgb, RgbImage};

  fn maps() -> EdgeMaps {
    EdgeMaps {
      fused: GrayImage::from_pixel(4, 2, Luma([255])),
      averaged: GrayImage::from_pixel(4, 2, Luma([100])),
      heads: 3,
    }
  }

  fn output_url(path: &Path, query: &str) -> Url {
    Url::parse(&format!("image://{}{}", path.display(), query)).unwrap()
  }

  #[test]
  fn writes_selected_view() {
    let dir = std::env::temp_dir().join("dexined_edge_save_image_view");
    let path = dir.join("nested").join("edges.png");
    let _ = std::fs::remove_dir_all(&dir);

    let output = SaveImageFileOutput::from_url(&output_url(&path, "?view=averaged")).unwrap();
    assert_eq!(output.path(), path.as_path());

    let frame = RgbFrame::from(RgbImage::from_pixel(4, 2, Rgb([1, 2, 3])));
    output.render_result(&frame, &maps()).unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (4, 2));
    assert_eq!(saved.get_pixel(3, 1), &Rgb([100, 100, 100]));

    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn compose_puts_input_on_the_left() {
    let dir = std::env::temp_dir().join("dexined_edge_save_image_compose");
    let path = dir.join("both.png");
    let _ = std::fs::remove_dir_all(&dir);

    let output = SaveImageFileOutput::from_url(&output_url(&path, "?compose")).unwrap();
    let frame = RgbFrame::from(RgbImage::from_pixel(4, 2, Rgb([1, 2, 3])));
    output.render_result(&frame, &maps()).unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (8, 2));
    assert_eq!(saved.get_pixel(0, 0), &Rgb([1, 2, 3]));
    assert_eq!(saved.get_pixel(7, 1), &Rgb([255, 255, 255]));

    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn scheme_must_match() {
    let url = Url::parse("folder:///tmp/x").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
