// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/model.rs - 模型
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

use std::str::FromStr;

use image::GrayImage;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 错误是否只影响当前帧（跳过该帧后循环可以继续）
pub trait Recoverable {
  fn is_recoverable(&self) -> bool;
}

/// 选择哪一个输出头作为融合结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusedHead {
  /// 最后一个输出（DexiNed 的融合层）
  #[default]
  Last,
  Index(usize),
}

impl FusedHead {
  /// 在 `heads` 个输出中解析出下标
  pub fn resolve(self, heads: usize) -> Option<usize> {
    match self {
      FusedHead::Last => heads.checked_sub(1),
      FusedHead::Index(idx) if idx < heads => Some(idx),
      FusedHead::Index(_) => None,
    }
  }
}

/// 展示哪一张边缘图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EdgeView {
  #[default]
  Fused,
  Averaged,
}

impl EdgeView {
  pub fn as_str(&self) -> &'static str {
    match self {
      EdgeView::Fused => "fused",
      EdgeView::Averaged => "averaged",
    }
  }
}

impl FromStr for EdgeView {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "fused" | "fuse" => Ok(EdgeView::Fused),
      "averaged" | "average" | "ave" => Ok(EdgeView::Averaged),
      other => Err(format!("未知的边缘图类型: {}", other)),
    }
  }
}

/// 一帧的边缘检测结果，尺寸与原始帧一致
#[derive(Debug, Clone)]
pub struct EdgeMaps {
  pub fused: GrayImage,
  pub averaged: GrayImage,
  pub heads: usize,
}

impl EdgeMaps {
  pub fn view(&self, view: EdgeView) -> &GrayImage {
    match view {
      EdgeView::Fused => &self.fused,
      EdgeView::Averaged => &self.averaged,
    }
  }
}

mod dexined;
pub mod engine;
pub mod postprocess;

pub use self::dexined::{Dexined, DexinedBuilder, DexinedError};
pub use self::engine::{EngineError, InferenceEngine, OrtEngine};
pub use self::postprocess::{PostprocessError, postprocess, sigmoid};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fused_head_resolution() {
    assert_eq!(FusedHead::Last.resolve(7), Some(6));
    assert_eq!(FusedHead::Last.resolve(0), None);
    assert_eq!(FusedHead::Index(2).resolve(7), Some(2));
    assert_eq!(FusedHead::Index(7).resolve(7), None);
  }

  #[test]
  fn edge_view_parsing() {
    assert_eq!("averaged".parse::<EdgeView>(), Ok(EdgeView::Averaged));
    assert_eq!("Fused".parse::<EdgeView>(), Ok(EdgeView::Fused));
    assert!("sobel".parse::<EdgeView>().is_err());
  }
}
