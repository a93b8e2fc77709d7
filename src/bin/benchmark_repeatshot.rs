// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理基准
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use dexined_edge::{
  FromUrl,
  input::{InputWrapper, SourceSpec},
  model::DexinedBuilder,
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// 对同一帧重复推理并统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, value_name = "MODEL", default_value = "edge_detection_dexined_2024sep.onnx")]
  pub model: PathBuf,
  /// 输入来源，只使用第一帧
  #[arg(long, value_name = "SOURCE")]
  pub input: SourceSpec,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 重复次数
  #[arg(long, value_name = "COUNT", default_value_t = 1000)]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("输入来源: {:?}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::open(&args.input)?;
  let model = DexinedBuilder::new(&args.model).build()?;
  info!(
    "模型 {} 输出: {:?}",
    model.engine().model_path().display(),
    model.engine().output_names()
  );
  let output = OutputWrapper::from_url(&args.output)?;

  RepeatShotTask::new(args.repeat).run_task(input, model, output)?;

  Ok(())
}
