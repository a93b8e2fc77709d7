// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/output/compose.rs - 边缘检测结果可视化
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

use image::{GrayImage, Rgb, RgbImage, imageops};

use crate::{
  frame::RgbFrame,
  model::{EdgeMaps, EdgeView},
};

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl ToRgbImage for RgbFrame {
  fn to_rgb_image(&self) -> RgbImage {
    RgbFrame::to_rgb_image(self)
  }
}

impl ToRgbImage for GrayImage {
  fn to_rgb_image(&self) -> RgbImage {
    RgbImage::from_fn(self.width(), self.height(), |x, y| {
      let v = self.get_pixel(x, y)[0];
      Rgb([v, v, v])
    })
  }
}

/// 左右拼接两张图，高度取较大者，空白处为黑色
pub fn side_by_side(left: &RgbImage, right: &RgbImage) -> RgbImage {
  let width = left.width() + right.width();
  let height = left.height().max(right.height());
  let mut canvas = RgbImage::new(width, height);
  imageops::replace(&mut canvas, left, 0, 0);
  imageops::replace(&mut canvas, right, i64::from(left.width()), 0);
  canvas
}

/// 输出图：单独的边缘图，或原图与边缘图并排
pub fn compose_result<F: ToRgbImage>(
  frame: &F,
  maps: &EdgeMaps,
  view: EdgeView,
  with_input: bool,
) -> RgbImage {
  let edges = maps.view(view).to_rgb_image();
  if with_input {
    side_by_side(&frame.to_rgb_image(), &edges)
  } else {
    edges
  }
}
