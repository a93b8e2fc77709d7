// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 为边缘检测循环提供视频帧，支持两类来源：
//! - 视频文件（`decodebin` 解码）
//! - 摄像头捕获（V4L2）
//!
//! ## URL 格式
//!
//! - `gst://file/path/to/video.mp4?rotate=90`
//! - `gst://camera/dev/video0?width=640&height=480&fps=30&format=YUY2&io-mode=2`
//!
//! 所有帧都在管道末端转换为 RGB，尺寸保持来源的原始尺寸。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::collections::HashMap;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, url_file_path};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    caps: Option<CameraCaps>,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraCaps {
  format: Option<String>,
  width: u32,
  height: u32,
  fps: u32,
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path.replace('"', "\\\""))
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        caps,
      } => {
        let io_mode_str = if let Some(mode) = io_mode {
          format!(" io-mode={}", mode)
        } else {
          "".to_string()
        };
        match caps {
          Some(CameraCaps {
            format,
            width,
            height,
            fps,
          }) => {
            let format_str = format
              .as_ref()
              .map(|f| format!(",format={}", f))
              .unwrap_or_default();
            format!(
              "v4l2src device={}{} ! video/x-raw{},width={},height={},framerate={}/1",
              camera, io_mode_str, format_str, width, height, fps
            )
          }
          None => format!("v4l2src device={}{}", camera, io_mode_str),
        }
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
    }
  }
}

/// GStreamer 输入管道构建器
///
/// ```no_run
/// use dexined_edge::input::GStreamerInputPipelineBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let input = GStreamerInputPipelineBuilder::camera("/dev/video0").build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  live: bool,
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl GStreamerInputPipelineBuilder {
  /// 摄像头，使用设备默认格式
  pub fn camera(device: &str) -> Self {
    GStreamerInputPipelineBuilder {
      items: vec![GStreamerInputBuilderItem::CameraSource {
        camera: device.to_string(),
        io_mode: None,
        caps: None,
      }],
      live: true,
    }
  }

  pub fn file(path: &str) -> Self {
    GStreamerInputPipelineBuilder {
      items: vec![GStreamerInputBuilderItem::FileSource(path.to_string())],
      live: false,
    }
  }

  fn build_camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let io_mode = query.get("io-mode").and_then(|v| v.parse::<u32>().ok());
    let width = query.get("width").and_then(|v| v.parse::<u32>().ok());
    let height = query.get("height").and_then(|v| v.parse::<u32>().ok());
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(30);

    let caps = match (width, height) {
      (Some(width), Some(height)) => Some(CameraCaps {
        format: query.get("format").cloned(),
        width,
        height,
        fps,
      }),
      _ => None,
    };

    let mut builder = GStreamerInputPipelineBuilder {
      items: vec![GStreamerInputBuilderItem::CameraSource {
        camera: path.to_string(),
        io_mode,
        caps,
      }],
      live: true,
    };
    builder.push_flip(query);
    builder
  }

  fn build_file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut builder = Self::file(path);
    builder.push_flip(query);
    builder
  }

  fn push_flip(&mut self, query: &HashMap<String, String>) {
    let method = match query.get("rotate").map(|s| s.as_str()) {
      Some("90") => 1,
      Some("180") => 2,
      Some("270") => 3,
      _ => return,
    };
    self
      .items
      .push(GStreamerInputBuilderItem::VideoFlip { method });
  }

  pub fn describe(&self) -> String {
    let mut items = self.items.clone();
    items.push(GStreamerInputBuilderItem::TargetFormat {
      format: "RGB".to_string(),
    });
    let basic_pipeline = items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");

    // 摄像头丢弃旧帧保证实时，文件逐帧处理
    if self.live {
      format!(
        "{} ! appsink max-buffers=2 drop=true sync=false name=sink",
        basic_pipeline
      )
    } else {
      format!(
        "{} ! appsink max-buffers=2 drop=false sync=false name=sink",
        basic_pipeline
      )
    }
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.describe();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput { pipeline, appsink })
  }
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let path = url_file_path(url);
    let path = path.to_string_lossy();

    match url.host_str() {
      Some("camera") => Ok(Self::build_camera_pipeline(&path, &query)),
      Some("file") => Ok(Self::build_file_pipeline(&path, &query)),
      _ => Err(GStreamerInputError::SchemeMismatch),
    }
  }
}

/// GStreamer 视频输入
///
/// 管理 GStreamer 管道和 appsink，逐帧产出 RGB 帧；流结束时迭代结束。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      tracing::warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  fn pull_sample(&self) -> Option<gst::Sample> {
    match self.appsink.pull_sample() {
      Ok(sample) => Some(sample),
      Err(_) if self.appsink.is_eos() => {
        info!("GStreamer input reached end of stream");
        None
      }
      Err(e) => {
        error!("Failed to pull sample: {}", e);
        None
      }
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.pull_sample()?;
    convert_sample_to_frame(sample)
      .map_err(|e| {
        error!("Failed to fetch sample: {}", e);
        e
      })
      .ok()
  }
}

fn convert_sample_to_frame(sample: gst::Sample) -> Result<RgbFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();
  debug!("sample {}x{} stride {} bytes {}", width, height, stride, data.len());

  let swap = match video_info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let mut frame = RgbFrame::with_shape(height as u32, width as u32);
  unpack_rows(data, stride, swap, &mut frame)?;
  Ok(frame)
}

/// 去掉行尾对齐填充，把紧密排列的 RGB 数据写入 `frame`；`swap` 为真时把 BGR 转为 RGB
fn unpack_rows(
  data: &[u8],
  stride: usize,
  swap: bool,
  frame: &mut RgbFrame,
) -> Result<(), GStreamerInputError> {
  let height = frame.height() as usize;
  let row_bytes = frame.width() as usize * frame.channels();
  let expected = if height == 0 {
    0
  } else {
    stride * (height - 1) + row_bytes
  };
  if stride < row_bytes || data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }
  if row_bytes == 0 {
    return Ok(());
  }

  for (row, dst) in frame.as_mut().chunks_exact_mut(row_bytes).enumerate() {
    let line = &data[row * stride..row * stride + row_bytes];
    if swap {
      for (d, px) in dst.chunks_exact_mut(3).zip(line.chunks_exact(3)) {
        d.copy_from_slice(&[px[2], px[1], px[0]]);
      }
    } else {
      dst.copy_from_slice(line);
    }
  }
  Ok(())
}
