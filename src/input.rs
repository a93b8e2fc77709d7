// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::{convert::Infallible, path::PathBuf, str::FromStr};

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, frame::RgbFrame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

/// 命令行给出的输入来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
  /// 摄像头设备序号，对应 `/dev/videoN`
  Camera(u32),
  /// 图像或视频文件
  File(PathBuf),
  /// 带 scheme 的完整描述，如 `gst://camera/dev/video0?width=640`
  Url(Url),
}

impl Default for SourceSpec {
  fn default() -> Self {
    SourceSpec::Camera(0)
  }
}

impl FromStr for SourceSpec {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if let Ok(index) = s.parse::<u32>() {
      return Ok(SourceSpec::Camera(index));
    }
    if s.contains("://")
      && let Ok(url) = Url::parse(s)
    {
      return Ok(SourceSpec::Url(url));
    }
    Ok(SourceSpec::File(PathBuf::from(s)))
  }
}

impl SourceSpec {
  pub fn is_image_file(&self) -> bool {
    match self {
      SourceSpec::File(path) => path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false),
      _ => false,
    }
  }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("Input file not found: {0}")]
  NotFound(PathBuf),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("No input backend enabled for: {0}")]
  Unsupported(String),
}

pub enum InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl InputWrapper {
  /// 按命令行的输入来源打开输入
  pub fn open(spec: &SourceSpec) -> Result<Self, InputError> {
    info!("打开输入来源: {:?}", spec);
    match spec {
      SourceSpec::Url(url) => Self::from_url(url),
      SourceSpec::File(path) if !path.exists() => Err(InputError::NotFound(path.clone())),
      #[cfg(feature = "read_image_file")]
      SourceSpec::File(path) if spec.is_image_file() => {
        Ok(InputWrapper::ReadImageFile(ImageFileInput::open(path)?))
      }
      #[cfg(feature = "gstreamer_input")]
      SourceSpec::File(path) => {
        let input = GStreamerInputPipelineBuilder::file(&path.to_string_lossy()).build()?;
        Ok(InputWrapper::GStreamerInput(input))
      }
      #[cfg(feature = "gstreamer_input")]
      SourceSpec::Camera(index) => {
        let device = format!("/dev/video{}", index);
        let input = GStreamerInputPipelineBuilder::camera(&device).build()?;
        Ok(InputWrapper::GStreamerInput(input))
      }
      #[allow(unreachable_patterns)]
      other => Err(InputError::Unsupported(format!("{:?}", other))),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn digits_select_a_camera() {
    assert_eq!("0".parse::<SourceSpec>().unwrap(), SourceSpec::Camera(0));
    assert_eq!("2".parse::<SourceSpec>().unwrap(), SourceSpec::Camera(2));
    assert_eq!(SourceSpec::default(), SourceSpec::Camera(0));
  }

  #[test]
  fn urls_are_kept() {
    let spec: SourceSpec = "gst://camera/dev/video1?width=640".parse().unwrap();
    match spec {
      SourceSpec::Url(url) => {
        assert_eq!(url.scheme(), "gst");
        assert_eq!(url.host_str(), Some("camera"));
      }
      other => panic!("unexpected spec: {:?}", other),
    }
  }

  #[test]
  fn plain_paths_are_files() {
    let spec: SourceSpec = "samples/ball.JPG".parse().unwrap();
    assert_eq!(spec, SourceSpec::File(PathBuf::from("samples/ball.JPG")));
    assert!(spec.is_image_file());

    let spec: SourceSpec = "samples/vtest.avi".parse().unwrap();
    assert!(!spec.is_image_file());
  }

  #[test]
  fn missing_file_is_reported_before_opening() {
    let spec = SourceSpec::File(PathBuf::from("no/such/video.mp4"));
    assert!(matches!(
      InputWrapper::open(&spec),
      Err(InputError::NotFound(_))
    ));
  }
}
