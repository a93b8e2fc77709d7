// 该文件是 DexiNed Edge （边缘检测演示） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod task;

use std::path::PathBuf;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 取出 URL 中的文件路径，并做百分号解码
///
/// `image:///tmp/my%20photo.png` 得到 `/tmp/my photo.png`。
pub fn url_file_path(url: &url::Url) -> PathBuf {
  let path = url.path();
  match urlencoding::decode(path) {
    Ok(decoded) => PathBuf::from(decoded.into_owned()),
    Err(_) => PathBuf::from(path),
  }
}

/// 查询参数中的布尔开关：出现即为真，除非显式写成 `false`/`0`
pub fn url_flag(url: &url::Url, key: &str) -> bool {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v != "false" && v != "0")
    .unwrap_or(false)
}
