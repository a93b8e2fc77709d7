// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

use dexined_edge::{
  input::SourceSpec,
  model::{EdgeView, FusedHead},
};

pub const DEFAULT_MODEL: &str = "edge_detection_dexined_2024sep.onnx";
pub const DEFAULT_OUTPUT: &str = "display:";

/// 使用 DexiNed 对摄像头、视频或图像做边缘检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，缺省为摄像头 0
  /// 支持格式:
  /// - 摄像头序号: 0, 1, ...
  /// - 图片: *.jpg, *.jpeg, *.png, *.bmp, *.gif, *.webp, *.tiff
  /// - 视频: *.mp4, *.avi, *.mkv 等
  /// - URL: image:///a.png, gst://camera/dev/video0?width=640&height=480
  #[arg(short, long, value_name = "SOURCE")]
  pub input: Option<SourceSpec>,

  /// ONNX 模型文件路径
  #[arg(long, value_name = "FILE", default_value = DEFAULT_MODEL)]
  pub model: PathBuf,

  /// 输出，缺省为显示窗口
  /// 支持格式:
  /// - 显示窗口: display:
  /// - 图片: image:///tmp/edges.png?compose
  /// - 目录: folder:///tmp/edges?record
  #[arg(long, value_name = "URL")]
  pub output: Option<Url>,

  /// 展示的边缘图
  #[arg(long, value_enum, default_value_t = EdgeView::Fused)]
  pub view: EdgeView,

  /// 作为融合结果的输出下标，缺省为最后一个输出
  #[arg(long, value_name = "INDEX")]
  pub fused_head: Option<usize>,

  /// 最大处理帧数
  #[arg(long, value_name = "COUNT")]
  pub frame_number: Option<usize>,
}

impl Args {
  pub fn source(&self) -> SourceSpec {
    self.input.clone().unwrap_or_default()
  }

  pub fn fused_head(&self) -> FusedHead {
    self.fused_head.map(FusedHead::Index).unwrap_or_default()
  }

  /// 输出 URL，未指定 `view` 时使用 `--view`
  pub fn output(&self) -> Result<Url, url::ParseError> {
    let mut url = match &self.output {
      Some(url) => url.clone(),
      None => Url::parse(DEFAULT_OUTPUT)?,
    };
    if !url.query_pairs().any(|(k, _)| k == "view") {
      url.query_pairs_mut().append_pair("view", self.view.as_str());
    }
    Ok(url)
  }
}
