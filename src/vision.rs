// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/vision.rs - 区域提取与基础图像运算
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

//! 帧处理器与处理器共用的视觉原语。
//!
//! 区域提取流程为：二值化 → 腐蚀/膨胀 → 外轮廓 → 面积与质心，
//! 底层由 `imageproc` 完成。

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::{
  contours::{BorderType, find_contours},
  contrast::{ThresholdType, threshold},
  distance_transform::Norm,
  morphology::{dilate, erode},
  point::Point,
};
use serde::Deserialize;

pub mod draw;

const ERODE_ITERATIONS: u8 = 1;
const DILATE_ITERATIONS: u8 = 2;

/// 质心坐标（像素）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Centroid {
  pub x: f64,
  pub y: f64,
}

impl Centroid {
  pub fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }
}

/// 一个检测到的感兴趣区域
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
  pub area: f64,
  pub centroid: Centroid,
  /// 外轮廓点，仅用于绘制
  pub outline: Vec<Point<i32>>,
}

impl Region {
  pub fn new(area: f64, centroid: Centroid) -> Self {
    Self {
      area,
      centroid,
      outline: Vec::new(),
    }
  }

  /// 由闭合轮廓计算面积（鞋带公式）与多边形质心
  pub fn from_outline(outline: Vec<Point<i32>>) -> Self {
    let n = outline.len();
    let mut twice_area = 0.0f64;
    let mut cx = 0.0f64;
    let mut cy = 0.0f64;
    for i in 0..n {
      let p = outline[i];
      let q = outline[(i + 1) % n];
      let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
      let cross = x0 * y1 - x1 * y0;
      twice_area += cross;
      cx += (x0 + x1) * cross;
      cy += (y0 + y1) * cross;
    }

    let centroid = if twice_area.abs() > f64::EPSILON {
      Centroid::new(cx / (3.0 * twice_area), cy / (3.0 * twice_area))
    } else {
      // 退化轮廓（线段或单点）：使用轮廓点均值
      mean_point(&outline)
    };

    Self {
      area: twice_area.abs() / 2.0,
      centroid,
      outline,
    }
  }
}

fn mean_point(points: &[Point<i32>]) -> Centroid {
  if points.is_empty() {
    return Centroid::default();
  }
  let n = points.len() as f64;
  let (sx, sy) = points
    .iter()
    .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
  Centroid::new(sx / n, sy / n)
}

/// 形态学开关
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Morphology {
  pub erode: bool,
  pub dilate: bool,
}

impl Default for Morphology {
  fn default() -> Self {
    Self {
      erode: true,
      dilate: true,
    }
  }
}

/// 在单通道强度图上提取区域
///
/// 像素值严格大于 `thresh` 视为前景；只返回最外层轮廓，顺序与轮廓扫描顺序一致。
pub fn find_regions(image: &GrayImage, thresh: u8, morphology: Morphology) -> Vec<Region> {
  let mut mask = threshold(image, thresh, ThresholdType::Binary);
  if morphology.erode {
    mask = erode(&mask, Norm::LInf, ERODE_ITERATIONS);
  }
  if morphology.dilate {
    mask = dilate(&mask, Norm::LInf, DILATE_ITERATIONS);
  }

  find_contours::<i32>(&mask)
    .into_iter()
    .filter(|contour| contour.parent.is_none() && contour.border_type == BorderType::Outer)
    .map(|contour| Region::from_outline(contour.points))
    .collect()
}

/// 面积最大的区域，面积相同时取先出现者
pub fn largest_region(regions: &[Region]) -> Option<&Region> {
  regions.iter().fold(None, |best: Option<&Region>, region| match best {
    Some(best) if best.area >= region.area => Some(best),
    _ => Some(region),
  })
}

/// 按面积加权的平均质心，总面积为零时无定义
pub fn weighted_centroid(regions: &[Region]) -> Option<Centroid> {
  let total: f64 = regions.iter().map(|region| region.area).sum();
  if total <= 0.0 || !total.is_finite() {
    return None;
  }
  let (sx, sy) = regions.iter().fold((0.0, 0.0), |(sx, sy), region| {
    (
      sx + region.centroid.x * region.area,
      sy + region.centroid.y * region.area,
    )
  });
  Some(Centroid::new(sx / total, sy / total))
}

/// 逐通道绝对差，同时返回其灰度图
///
/// 两帧尺寸必须一致，由调用方保证。
pub fn frame_diff(a: &RgbImage, b: &RgbImage) -> (RgbImage, GrayImage) {
  let diff = RgbImage::from_fn(a.width(), a.height(), |x, y| {
    let p = a.get_pixel(x, y);
    let q = b.get_pixel(x, y);
    Rgb([p[0].abs_diff(q[0]), p[1].abs_diff(q[1]), p[2].abs_diff(q[2])])
  });
  let gray = image::imageops::grayscale(&diff);
  (diff, gray)
}

/// RGB 转 HSV，采用 8 位约定：H ∈ [0, 179]，S、V ∈ [0, 255]
pub fn rgb_to_hsv(image: &RgbImage) -> RgbImage {
  RgbImage::from_fn(image.width(), image.height(), |x, y| {
    Rgb(hsv_pixel(image.get_pixel(x, y).0))
  })
}

fn hsv_pixel([r, g, b]: [u8; 3]) -> [u8; 3] {
  let (rf, gf, bf) = (r as f32, g as f32, b as f32);
  let v = rf.max(gf).max(bf);
  let min = rf.min(gf).min(bf);
  let delta = v - min;

  let s = if v > 0.0 { delta * 255.0 / v } else { 0.0 };
  let h = if delta == 0.0 {
    0.0
  } else if v == rf {
    60.0 * (gf - bf) / delta
  } else if v == gf {
    120.0 + 60.0 * (bf - rf) / delta
  } else {
    240.0 + 60.0 * (rf - gf) / delta
  };
  let h = if h < 0.0 { h + 360.0 } else { h };

  [
    ((h / 2.0).round() as u32 % 180) as u8,
    s.round() as u8,
    v as u8,
  ]
}

/// 三通道均落在 `[lower, upper]`（含边界）内的像素置 255
pub fn in_range(image: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
  GrayImage::from_fn(image.width(), image.height(), |x, y| {
    let p = image.get_pixel(x, y).0;
    let inside = (0..3).all(|c| p[c] >= lower[c] && p[c] <= upper[c]);
    Luma([if inside { 255 } else { 0 }])
  })
}

/// 只保留掩码非零处的像素
pub fn apply_mask(image: &RgbImage, mask: &GrayImage) -> RgbImage {
  RgbImage::from_fn(image.width(), image.height(), |x, y| {
    if mask.get_pixel(x, y)[0] > 0 {
      *image.get_pixel(x, y)
    } else {
      Rgb([0, 0, 0])
    }
  })
}

/// 取出单个颜色通道
pub fn extract_plane(image: &RgbImage, plane: usize) -> GrayImage {
  GrayImage::from_fn(image.width(), image.height(), |x, y| {
    Luma([image.get_pixel(x, y)[plane]])
  })
}

/// 减去全图均值，低于均值的像素截断为 0
pub fn mean_remove(image: &GrayImage) -> GrayImage {
  let count = (image.width() as u64 * image.height() as u64).max(1);
  let sum: u64 = image.pixels().map(|p| p[0] as u64).sum();
  let mean = ((sum as f64) / (count as f64)).round() as u8;
  GrayImage::from_fn(image.width(), image.height(), |x, y| {
    Luma([image.get_pixel(x, y)[0].saturating_sub(mean)])
  })
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  /// 黑底上画一个实心矩形
  pub(crate) fn square(w: u32, h: u32, x0: u32, y0: u32, size: u32, color: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| {
      if x >= x0 && x < x0 + size && y >= y0 && y < y0 + size {
        Rgb(color)
      } else {
        Rgb([0, 0, 0])
      }
    })
  }

  #[test]
  fn single_square_yields_one_region() {
    let gray = image::imageops::grayscale(&square(64, 48, 20, 10, 12, [255, 255, 255]));
    let regions = find_regions(&gray, 25, Morphology::default());

    assert_eq!(regions.len(), 1);
    let region = &regions[0];
    assert!(region.area > 100.0, "area = {}", region.area);
    assert!((region.centroid.x - 25.5).abs() < 1.0, "{:?}", region.centroid);
    assert!((region.centroid.y - 15.5).abs() < 1.0, "{:?}", region.centroid);
  }

  #[test]
  fn black_image_has_no_regions() {
    let gray = GrayImage::new(32, 32);
    assert!(find_regions(&gray, 25, Morphology::default()).is_empty());
  }

  #[test]
  fn erosion_removes_single_pixel_noise() {
    let mut gray = GrayImage::new(32, 32);
    gray.put_pixel(10, 10, Luma([255]));
    let eroded = Morphology {
      erode: true,
      dilate: false,
    };
    assert!(find_regions(&gray, 25, eroded).is_empty());
  }

  #[test]
  fn weighted_centroid_of_equal_regions_is_midpoint() {
    let regions = vec![
      Region::new(100.0, Centroid::new(0.0, 0.0)),
      Region::new(100.0, Centroid::new(10.0, 10.0)),
    ];
    assert_eq!(weighted_centroid(&regions), Some(Centroid::new(5.0, 5.0)));
  }

  #[test]
  fn weighted_centroid_rejects_zero_total_area() {
    let regions = vec![
      Region::new(0.0, Centroid::new(1.0, 1.0)),
      Region::new(0.0, Centroid::new(3.0, 3.0)),
    ];
    assert_eq!(weighted_centroid(&regions), None);
    assert_eq!(weighted_centroid(&[]), None);
  }

  #[test]
  fn largest_region_prefers_first_on_ties() {
    let regions = vec![
      Region::new(10.0, Centroid::new(1.0, 0.0)),
      Region::new(30.0, Centroid::new(2.0, 0.0)),
      Region::new(30.0, Centroid::new(3.0, 0.0)),
    ];
    assert_eq!(
      largest_region(&regions).map(|r| r.centroid.x),
      Some(2.0)
    );
    assert!(largest_region(&[]).is_none());
  }

  #[test]
  fn hsv_follows_eight_bit_convention() {
    assert_eq!(hsv_pixel([255, 0, 0]), [0, 255, 255]);
    assert_eq!(hsv_pixel([0, 255, 0]), [60, 255, 255]);
    assert_eq!(hsv_pixel([0, 0, 255]), [120, 255, 255]);
    assert_eq!(hsv_pixel([0, 0, 0]), [0, 0, 0]);
    assert_eq!(hsv_pixel([128, 128, 128]), [0, 0, 128]);
  }

  #[test]
  fn mean_remove_saturates_at_zero() {
    let mut gray = GrayImage::from_pixel(4, 1, Luma([10]));
    gray.put_pixel(0, 0, Luma([50]));
    // 均值 20
    let residual = mean_remove(&gray);
    assert_eq!(residual.get_pixel(0, 0)[0], 30);
    assert_eq!(residual.get_pixel(1, 0)[0], 0);
  }

  #[test]
  fn degenerate_outline_falls_back_to_point_mean() {
    let region = Region::from_outline(vec![Point::new(2, 4), Point::new(6, 4)]);
    assert_eq!(region.area, 0.0);
    assert_eq!(region.centroid, Centroid::new(4.0, 4.0));
  }
}
