// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/task.rs - 任务循环
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

use std::{
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
  model::{Model, Recoverable},
  output::Render,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 对同一帧重复推理，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    RepeatShotTask { repeat: 1000 }
  }
}

impl RepeatShotTask {
  pub fn new(repeat: usize) -> Self {
    RepeatShotTask {
      repeat: repeat.max(1),
    }
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    // 前两次包含模型预热
    const WARMUP: usize = 2;

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    let measured = if times.len() > WARMUP {
      &times[WARMUP..]
    } else {
      &times[..]
    };
    warn!(
      "平均推理时间: {:.2?} ({} 次)",
      measured.iter().sum::<Duration>() / measured.len() as u32,
      measured.len()
    );

    Ok(())
  }
}

/// 逐帧推理直到输入结束、按下退出键、收到中断或达到帧数上限
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

impl ContinuousTask {
  const KEY_TIMEOUT: Duration = Duration::from_millis(1);
  const END_OF_STREAM_TIMEOUT: Duration = Duration::from_millis(100);

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 收到消息时停止循环
  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  /// 安装 Ctrl-C 处理器，每个进程只能调用一次
  pub fn with_ctrlc(self) -> Result<Self, ctrlc::Error> {
    let (tx, rx) = mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    Ok(self.with_interrupt(rx))
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }

  fn wait_for_key<F, D, O: Render<F, D>>(&self, output: &O) {
    info!("输入已结束，按任意键退出");
    loop {
      if let Some(key) = output.poll_key(Self::END_OF_STREAM_TIMEOUT) {
        debug!("按键 {:?}，退出", key);
        return;
      }
      if self.interrupted() {
        return;
      }
    }
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Recoverable + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");

    let mut frame_index = 0usize;
    let mut skipped = 0usize;
    let mut stopped = false;
    let mut now = Instant::now();
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      debug!("处理第 {} 帧图像", frame_index);

      match model.infer(&frame) {
        Ok(result) => {
          let elapsed_a = now.elapsed();
          output.render_result(&frame, &result)?;
          let elapsed_b = now.elapsed();
          info!("第 {} 帧完成，耗时: {:.2?} / {:.2?}", frame_index, elapsed_a, elapsed_b);
        }
        Err(e) if e.is_recoverable() => {
          skipped += 1;
          warn!("跳过第 {} 帧: {}", frame_index, e);
        }
        Err(e) => return Err(e.into()),
      }
      now = Instant::now();

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        stopped = true;
        break;
      }
      match output.poll_key(Self::KEY_TIMEOUT) {
        Some(key) if key.is_quit() => {
          info!("按键 {:?}，退出任务循环", key);
          stopped = true;
          break;
        }
        Some(key) => debug!("忽略按键 {:?}", key),
        None => {}
      }
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        stopped = true;
        break;
      }
    }

    if !stopped && output.is_interactive() {
      self.wait_for_key::<F, D, O>(&output);
    }

    if skipped > 0 {
      warn!("共跳过 {} / {} 帧", skipped, frame_index);
    }
    info!("任务完成，退出");
    Ok(())
  }
}
