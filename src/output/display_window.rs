// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/output/display_window.rs - GStreamer 窗口显示
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

//! # GStreamer 窗口显示模块
//!
//! 每个窗口是一条 `appsrc ! videoconvert ! autovideosink` 管道。帧尺寸可以
//! 随时变化，caps 在尺寸或格式变化时重新设置。
//!
//! 按键来自视频 sink 未处理的 navigation 事件，它们以
//! `GstNavigationMessage` 元素消息的形式出现在管道总线上。
//!
//! ## URL Scheme
//!
//! `display:?view=averaged`

use std::{
  sync::Mutex,
  time::{Duration, Instant},
};

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  model::{EdgeMaps, EdgeView},
  output::{Key, Render, url_view},
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::GrayImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

/// GStreamer 显示错误类型
#[derive(Error, Debug)]
pub enum DisplayError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

const NAVIGATION_MESSAGE: &str = "GstNavigationMessage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawCaps {
  format: &'static str,
  width: u32,
  height: u32,
}

/// 单个显示窗口
pub struct DisplayWindow {
  name: String,
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  caps: Mutex<Option<RawCaps>>,
}

impl DisplayWindow {
  pub fn open(name: &str) -> Result<Self, DisplayError> {
    gst::init()?;

    let pipeline_desc =
      "appsrc name=src is-live=true do-timestamp=true format=time ! videoconvert ! autovideosink sync=false";
    info!("Creating display window '{}': {}", name, pipeline_desc);

    let pipeline = gst::parse::launch(pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| DisplayError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(DisplayError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| DisplayError::AppSrcConversionFailed)?;
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    Ok(DisplayWindow {
      name: name.to_string(),
      pipeline,
      appsrc,
      caps: Mutex::new(None),
    })
  }

  pub fn show_rgb(&self, frame: &RgbFrame) -> Result<(), DisplayError> {
    self.push(
      RawCaps {
        format: "RGB",
        width: frame.width(),
        height: frame.height(),
      },
      frame.channels(),
      frame.as_nhwc(),
    )
  }

  pub fn show_gray(&self, image: &GrayImage) -> Result<(), DisplayError> {
    self.push(
      RawCaps {
        format: "GRAY8",
        width: image.width(),
        height: image.height(),
      },
      1,
      image.as_raw(),
    )
  }

  fn push(&self, caps: RawCaps, channels: usize, data: &[u8]) -> Result<(), DisplayError> {
    {
      let mut current = self
        .caps
        .lock()
        .map_err(|_| DisplayError::PipelineError("caps lock poisoned".to_string()))?;
      if current.as_ref() != Some(&caps) {
        debug!(
          "Window '{}' caps: {} {}x{}",
          self.name, caps.format, caps.width, caps.height
        );
        let gst_caps = gst::Caps::builder("video/x-raw")
          .field("format", caps.format)
          .field("width", caps.width as i32)
          .field("height", caps.height as i32)
          .field("framerate", gst::Fraction::new(0, 1))
          .build();
        self.appsrc.set_caps(Some(&gst_caps));
        *current = Some(caps);
      }
    }

    let row_bytes = caps.width as usize * channels;
    let padded = pad_rows(data, row_bytes, caps.height as usize);
    let buffer = gst::Buffer::from_mut_slice(padded);

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| DisplayError::PipelineError(format!("Failed to push buffer: {:?}", e)))?;
    Ok(())
  }

  /// 等待至多 `timeout`，返回窗口上的按键
  pub fn poll_key(&self, timeout: Duration) -> Option<Key> {
    let bus = self.pipeline.bus()?;
    let deadline = Instant::now() + timeout;

    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());
      let msg = bus.timed_pop(gst::ClockTime::from_nseconds(remaining.as_nanos() as u64))?;

      match msg.view() {
        gst::MessageView::Eos(..) => {
          info!("Window '{}' reached end of stream", self.name);
          return Some(Key::WindowClosed);
        }
        gst::MessageView::Error(err) => {
          error!(
            "Window '{}' error from {:?}: {}",
            self.name,
            err.src().map(|s| s.path_string()),
            err.error()
          );
          return Some(Key::WindowClosed);
        }
        gst::MessageView::Element(..) => {
          if let Some(key) = navigation_key(&msg) {
            debug!("Window '{}' key: {:?}", self.name, key);
            return Some(key);
          }
        }
        _ => {}
      }

      if remaining.is_zero() {
        return None;
      }
    }
  }
}

impl Drop for DisplayWindow {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop display window '{}': {}", self.name, e);
    }
    info!("Display window '{}' closed", self.name);
  }
}

fn navigation_key(msg: &gst::MessageRef) -> Option<Key> {
  let s = msg.structure()?;
  if !s.has_name(NAVIGATION_MESSAGE) {
    return None;
  }
  let event = s.get::<gst::Event>("event").ok()?;
  let es = event.structure()?;
  if es.get::<String>("event").ok()? != "key-press" {
    return None;
  }
  es.get::<String>("key").ok().map(|key| Key::from_name(&key))
}

/// 原始视频每行按 4 字节对齐
fn pad_rows(data: &[u8], row_bytes: usize, height: usize) -> Vec<u8> {
  let stride = (row_bytes + 3) & !3;
  if stride == row_bytes {
    return data[..row_bytes * height].to_vec();
  }
  let mut padded = vec![0u8; stride * height];
  for (dst, src) in padded
    .chunks_exact_mut(stride)
    .zip(data.chunks_exact(row_bytes))
  {
    dst[..row_bytes].copy_from_slice(src);
  }
  padded
}

/// 输入窗口与输出窗口
pub struct DisplayOutput {
  input: DisplayWindow,
  output: DisplayWindow,
  view: EdgeView,
}

impl FromUrlWithScheme for DisplayOutput {
  const SCHEME: &'static str = "display";
}

impl FromUrl for DisplayOutput {
  type Error = DisplayError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DisplayError::SchemeMismatch);
    }

    Ok(DisplayOutput {
      input: DisplayWindow::open("Input")?,
      output: DisplayWindow::open("Output")?,
      view: url_view(url),
    })
  }
}

impl DisplayOutput {
  pub fn wait_key(&self, timeout: Duration) -> Option<Key> {
    self
      .output
      .poll_key(timeout)
      .or_else(|| self.input.poll_key(Duration::ZERO))
  }
}

impl Render<RgbFrame, EdgeMaps> for DisplayOutput {
  type Error = DisplayError;

  fn render_result(&self, frame: &RgbFrame, result: &EdgeMaps) -> Result<(), Self::Error> {
    self.input.show_rgb(frame)?;
    self.output.show_gray(result.view(self.view))
  }

  fn poll_key(&self, timeout: Duration) -> Option<Key> {
    self.wait_key(timeout)
  }

  fn is_interactive(&self) -> bool {
    true
  }
}
