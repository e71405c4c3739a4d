// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/vision/draw.rs - 检测区域可视化
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
use imageproc::drawing::draw_line_segment_mut;
use serde::Deserialize;

use super::{Centroid, Region};

pub const OUTLINE_COLOR: [u8; 3] = [255, 128, 25];
pub const TARGET_COLOR: [u8; 3] = [255, 255, 255];
pub const CENTER_COLOR: [u8; 3] = [0x10, 0xFF, 0xC0];
const SHADOW_COLOR: [u8; 3] = [0, 0, 0];

/// 拼接方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
  #[default]
  Horizontal,
  Vertical,
}

/// X 形标记的样式
#[derive(Debug, Clone, Copy)]
pub struct Marker {
  pub length: f32,
  pub thickness: u32,
  pub shadow: bool,
  pub color: [u8; 3],
}

impl Marker {
  /// 目标质心标记
  pub fn target() -> Self {
    Self {
      length: 9.0,
      thickness: 2,
      shadow: true,
      color: TARGET_COLOR,
    }
  }

  /// 画面中心标记
  pub fn center() -> Self {
    Self {
      length: 9.0,
      thickness: 1,
      shadow: false,
      color: CENTER_COLOR,
    }
  }
}

/// 沿轮廓画出所有区域
pub fn draw_outlines(image: &mut RgbImage, regions: &[Region], color: [u8; 3]) {
  for region in regions {
    let points = &region.outline;
    if points.len() < 2 {
      continue;
    }
    for (i, p) in points.iter().enumerate() {
      let q = points[(i + 1) % points.len()];
      draw_line_segment_mut(
        image,
        (p.x as f32, p.y as f32),
        (q.x as f32, q.y as f32),
        Rgb(color),
      );
    }
  }
}

/// 在指定位置画 X 形标记
pub fn draw_marker(image: &mut RgbImage, at: Centroid, marker: Marker) {
  let half = marker.length / 2.0;
  let (cx, cy) = (at.x as f32, at.y as f32);

  if marker.shadow {
    draw_cross(image, cx + 1.0, cy + 1.0, half, marker.thickness, SHADOW_COLOR);
  }
  draw_cross(image, cx, cy, half, marker.thickness, marker.color);
}

fn draw_cross(image: &mut RgbImage, cx: f32, cy: f32, half: f32, thickness: u32, color: [u8; 3]) {
  // 粗线由水平平移的多条细线叠成
  for t in 0..thickness.max(1) {
    let dx = t as f32;
    draw_line_segment_mut(
      image,
      (cx - half + dx, cy - half),
      (cx + half + dx, cy + half),
      Rgb(color),
    );
    draw_line_segment_mut(
      image,
      (cx - half + dx, cy + half),
      (cx + half + dx, cy - half),
      Rgb(color),
    );
  }
}

/// 把多幅图像沿指定方向拼接，尺寸不一致时以黑色补齐
pub fn composite(images: &[RgbImage], axis: Axis) -> RgbImage {
  let (width, height) = match axis {
    Axis::Horizontal => (
      images.iter().map(RgbImage::width).sum(),
      images.iter().map(RgbImage::height).max().unwrap_or(0),
    ),
    Axis::Vertical => (
      images.iter().map(RgbImage::width).max().unwrap_or(0),
      images.iter().map(RgbImage::height).sum(),
    ),
  };

  let mut canvas = RgbImage::new(width, height);
  let mut offset = 0i64;
  for image in images {
    match axis {
      Axis::Horizontal => {
        image::imageops::replace(&mut canvas, image, offset, 0);
        offset += image.width() as i64;
      }
      Axis::Vertical => {
        image::imageops::replace(&mut canvas, image, 0, offset);
        offset += image.height() as i64;
      }
    }
  }
  canvas
}
