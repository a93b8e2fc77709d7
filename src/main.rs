// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::{Parser, error::ErrorKind};
use tracing::{error, info};

use dexined_edge::{
  FromUrl,
  input::InputWrapper,
  model::DexinedBuilder,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = match args::Args::try_parse() {
    Ok(args) => args,
    // 帮助信息以 -1 退出
    Err(err) if err.kind() == ErrorKind::DisplayHelp => {
      if let Err(e) = err.print() {
        error!("无法输出帮助信息: {}", e);
      }
      std::process::exit(-1);
    }
    Err(err) => err.exit(),
  };

  let source = args.source();
  let output_url = args.output()?;
  info!("模型文件路径: {}", args.model.display());
  info!("输入来源: {:?}", source);
  info!("输出: {}", output_url);

  let model = DexinedBuilder::new(&args.model)
    .fused_head(args.fused_head())
    .build()?;
  info!(
    "模型 {} 输出: {:?}",
    model.engine().model_path().display(),
    model.engine().output_names()
  );
  let input = InputWrapper::open(&source)?;
  let output = OutputWrapper::from_url(&output_url)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_ctrlc()?
    .run_task(input, model, output)?;

  Ok(())
}
