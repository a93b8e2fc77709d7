// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/output.rs - 输出定义
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

use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{
  FromUrl,
  frame::RgbFrame,
  model::{EdgeMaps, EdgeView},
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;

  /// 等待至多 `timeout` 读取一次按键，非交互输出始终返回 `None`
  fn poll_key(&self, _timeout: Duration) -> Option<Key> {
    None
  }

  fn is_interactive(&self) -> bool {
    false
  }
}

/// 显示窗口产生的按键
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
  Escape,
  Char(char),
  Named(String),
  /// 窗口被关闭或显示管道出错
  WindowClosed,
}

impl Key {
  pub fn from_name(name: &str) -> Self {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
      _ if name == "Escape" => Key::Escape,
      (Some(c), None) => Key::Char(c),
      _ => Key::Named(name.to_string()),
    }
  }

  /// Esc、`q` 或关闭窗口表示退出
  pub fn is_quit(&self) -> bool {
    matches!(self, Key::Escape | Key::Char('q') | Key::WindowClosed)
  }
}

pub mod compose;

#[cfg(feature = "gstreamer_output")]
mod display_window;
#[cfg(feature = "gstreamer_output")]
pub use self::display_window::{DisplayError, DisplayOutput, DisplayWindow};

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

/// 读取 `view` 查询参数，缺省为融合图
pub fn url_view(url: &Url) -> EdgeView {
  match url.query_pairs().find(|(k, _)| k == "view") {
    Some((_, v)) => v.parse().unwrap_or_else(|e| {
      warn!("{}，使用融合图", e);
      EdgeView::Fused
    }),
    None => EdgeView::Fused,
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "gstreamer_output")]
  #[error("显示窗口错误: {0}")]
  DisplayError(#[from] DisplayError),
  #[cfg(feature = "save_image_file")]
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

pub enum OutputWrapper {
  #[cfg(feature = "gstreamer_output")]
  DisplayOutput(DisplayOutput),
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[allow(unused_imports)]
    use crate::FromUrlWithScheme;

    match url.scheme() {
      #[cfg(feature = "gstreamer_output")]
      DisplayOutput::SCHEME => Ok(OutputWrapper::DisplayOutput(DisplayOutput::from_url(url)?)),
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => Ok(OutputWrapper::SaveImageFileOutput(
        SaveImageFileOutput::from_url(url)?,
      )),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecordOutput(
        DirectoryRecordOutput::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl Render<RgbFrame, EdgeMaps> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbFrame, result: &EdgeMaps) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::DisplayOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }

  fn poll_key(&self, timeout: Duration) -> Option<Key> {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::DisplayOutput(output) => output.wait_key(timeout),
      #[allow(unreachable_patterns)]
      _ => {
        let _ = timeout;
        None
      }
    }
  }

  fn is_interactive(&self) -> bool {
    match self {
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::DisplayOutput(_) => true,
      #[allow(unreachable_patterns)]
      _ => false,
    }
  }
}
