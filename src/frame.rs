// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::{Rgb, RgbImage};

const RGB_CHANNELS: usize = 3;

/// 紧密排列的 RGB 帧（HWC 布局），尺寸由输入源决定
#[derive(Debug, Clone)]
pub struct RgbFrame {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl RgbFrame {
  pub fn with_shape(height: u32, width: u32) -> Self {
    let size = RGB_CHANNELS * (width as usize) * (height as usize);
    Self {
      width,
      height,
      data: vec![0u8; size].into_boxed_slice(),
    }
  }

  /// 数据长度与尺寸不符时返回 `None`
  pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
    if data.len() != RGB_CHANNELS * (width as usize) * (height as usize) {
      return None;
    }
    Some(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
    let idx = ((y as usize) * (self.width as usize) + (x as usize)) * RGB_CHANNELS;
    [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    RgbImage::from_fn(self.width, self.height, |x, y| Rgb(self.pixel(x, y)))
  }
}

impl AsMut<[u8]> for RgbFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_raw_checks_length() {
    assert!(RgbFrame::from_raw(2, 2, vec![0; 12]).is_some());
    assert!(RgbFrame::from_raw(2, 2, vec![0; 11]).is_none());
  }

  #[test]
  fn zeroed_frame_is_filled_in_place() {
    let mut frame = RgbFrame::with_shape(2, 3);
    assert_eq!((frame.width(), frame.height(), frame.channels()), (3, 2, 3));
    assert!(frame.as_nhwc().iter().all(|&v| v == 0));

    frame.as_mut()[15..18].copy_from_slice(&[4, 5, 6]);
    assert_eq!(frame.pixel(2, 1), [4, 5, 6]);
  }

  #[test]
  fn image_conversion_keeps_pixels() {
    let image = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8, y as u8, 7]));
    let frame = RgbFrame::from(image.clone());
    assert_eq!((frame.width(), frame.height()), (3, 2));
    assert_eq!(frame.pixel(2, 1), [2, 1, 7]);
    assert_eq!(frame.to_rgb_image(), image);
  }
}
