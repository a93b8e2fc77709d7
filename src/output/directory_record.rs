// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
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

//! 按日期归档每一帧的边缘图
//!
//! `folder:///var/edges?view=fused&compose&record` 会写出
//! `/var/edges/2026/10/19/08-30-12-0001.png`，`record` 时再写同名 `.json`。

use std::{
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::{DateTime, Datelike, Utc};
use image::GrayImage;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::{EdgeMaps, EdgeView},
  output::{Render, compose::compose_result, url_view},
  url_file_path, url_flag,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("帧计数器锁已失效")]
  CounterPoisoned,
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  view: EdgeView,
  compose: bool,
  record: bool,
  frame_counter: Mutex<u16>,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        uri.scheme()
      );
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput {
      directory: url_file_path(uri),
      view: url_view(uri),
      compose: url_flag(uri, "compose"),
      record: url_flag(uri, "record"),
      frame_counter: Mutex::new(0),
    })
  }
}

fn mean(image: &GrayImage) -> f64 {
  let raw = image.as_raw();
  if raw.is_empty() {
    return 0.0;
  }
  raw.iter().map(|&v| f64::from(v)).sum::<f64>() / raw.len() as f64
}

impl DirectoryRecordOutput {
  pub fn directory(&self) -> &Path {
    &self.directory
  }

  /// 计数器溢出后从 0 重新开始
  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::CounterPoisoned)?;
    *counter = counter.wrapping_add(1);
    Ok(*counter)
  }

  fn frame_path(&self, now: &DateTime<Utc>, id: u16) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!("{}-{:04X}.png", now.format("%H-%M-%S"), id)))
  }

  fn write_record(
    &self,
    path: &Path,
    id: u16,
    now: &DateTime<Utc>,
    result: &EdgeMaps,
  ) -> Result<(), DirectoryRecordOutputError> {
    let record = json!({
      "frame": id,
      "width": result.fused.width(),
      "height": result.fused.height(),
      "heads": result.heads,
      "view": self.view.as_str(),
      "fused_mean": mean(&result.fused),
      "averaged_mean": mean(&result.averaged),
      "timestamp": now.to_rfc3339(),
    });
    std::fs::write(path.with_extension("json"), serde_json::to_vec_pretty(&record)?)?;
    Ok(())
  }
}

impl Render<RgbFrame, EdgeMaps> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &EdgeMaps) -> Result<(), Self::Error> {
    let now = Utc::now();
    let id = self.frame_id()?;
    let path = self.frame_path(&now, id)?;

    compose_result(frame, result, self.view, self.compose).save(&path)?;
    if self.record {
      self.write_record(&path, id, &now, result)?;
    }
    debug!("记录帧 {} 到 {}", id, path.display());
    Ok(())
  }
}
