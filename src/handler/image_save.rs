// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/handler/image_save.rs - 事件图像保存
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
  path::PathBuf,
  sync::atomic::{AtomicU32, Ordering},
};

use chrono::Local;
use image::RgbImage;
use serde::Deserialize;
use tracing::info;

use crate::{
  frame::FrameBuffer,
  handler::{Handler, HandlerError},
  vision::{
    Centroid, Region,
    draw::{Axis, Marker, OUTLINE_COLOR, composite, draw_marker, draw_outlines},
    largest_region, weighted_centroid,
  },
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H_%M_%S";

/// 带时间戳的图像持久化
pub trait Persistence: Send {
  fn write_timestamped(&self, image: &RgbImage, prefix: &str) -> Result<PathBuf, HandlerError>;
}

/// 写入 `<目录>/<前缀><时间>-<序号>.<扩展名>`
///
/// 同一秒内的多次写入靠序号区分。
pub struct TimestampedDirectory {
  directory: PathBuf,
  extension: String,
  counter: AtomicU32,
}

impl TimestampedDirectory {
  pub fn new(directory: PathBuf, extension: String) -> Self {
    Self {
      directory,
      extension,
      counter: AtomicU32::new(0),
    }
  }

  fn next_path(&self, prefix: &str) -> PathBuf {
    let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
    let filename = format!(
      "{}{}-{:04}.{}",
      prefix,
      Local::now().format(TIMESTAMP_FORMAT),
      seq,
      self.extension
    );
    self.directory.join(filename)
  }
}

impl Persistence for TimestampedDirectory {
  fn write_timestamped(&self, image: &RgbImage, prefix: &str) -> Result<PathBuf, HandlerError> {
    if !self.directory.exists() {
      std::fs::create_dir_all(&self.directory)?;
    }
    let path = self.next_path(prefix);
    image.save(&path)?;
    Ok(path)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageSaveConfig {
  pub directory: String,
  pub prefix: String,
  pub axis: Axis,
  pub extension: String,
}

impl Default for ImageSaveConfig {
  fn default() -> Self {
    Self {
      directory: ".".to_string(),
      prefix: "Event_".to_string(),
      axis: Axis::Horizontal,
      extension: "jpeg".to_string(),
    }
  }
}

pub struct ImageSaveHandler<P> {
  config: ImageSaveConfig,
  persistence: P,
}

impl<P: Persistence> ImageSaveHandler<P> {
  pub fn new(config: ImageSaveConfig, persistence: P) -> Self {
    Self {
      config,
      persistence,
    }
  }

  /// 在所有缓冲帧的副本上标注区域、目标与画面中心，并按配置方向拼接
  pub fn annotate(
    &self,
    regions: &[Region],
    frames: &FrameBuffer,
    index: usize,
  ) -> Result<RgbImage, HandlerError> {
    if regions.is_empty() {
      return Err(HandlerError::EmptyRegions);
    }
    let target = weighted_centroid(regions)
      .or_else(|| largest_region(regions).map(|region| region.centroid))
      .ok_or(HandlerError::DegenerateRegions)?;

    let annotated = frames
      .chronological(index)
      .into_iter()
      .map(|frame| {
        let mut image = frame.to_rgb_image();
        let center = Centroid::new(image.width() as f64 / 2.0, image.height() as f64 / 2.0);
        draw_outlines(&mut image, regions, OUTLINE_COLOR);
        draw_marker(&mut image, target, Marker::target());
        draw_marker(&mut image, center, Marker::center());
        image
      })
      .collect::<Vec<_>>();

    if annotated.is_empty() {
      return Err(HandlerError::MissingFrame { index });
    }
    Ok(composite(&annotated, self.config.axis))
  }
}

impl<P: Persistence> Handler for ImageSaveHandler<P> {
  fn handle(
    &mut self,
    regions: &[Region],
    frames: &FrameBuffer,
    index: usize,
  ) -> Result<(), HandlerError> {
    let result = self.annotate(regions, frames, index)?;
    let path = self
      .persistence
      .write_timestamped(&result, &self.config.prefix)?;
    info!("已写入 {}", path.display());
    Ok(())
  }
}
