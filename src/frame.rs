// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/frame.rs - 帧与帧环形缓冲定义
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

use std::{sync::Arc, time::Instant};

use image::RgbImage;
use thiserror::Error;

const RGB_CHANNELS: usize = 3;

/// 一帧采集到的图像
///
/// 像素数据以 `Arc` 共享，扇出到多个订阅者时不复制；
/// 方向校正在包装之前完成，之后帧只读，处理器需要标注时请先复制。
#[derive(Debug, Clone)]
pub struct Frame {
  image: Arc<RgbImage>,
  index: u64,
  captured_at: Instant,
}

impl Frame {
  pub fn new(image: RgbImage, index: u64) -> Self {
    Self::captured_at(image, index, Instant::now())
  }

  pub fn captured_at(image: RgbImage, index: u64, captured_at: Instant) -> Self {
    Self {
      image: Arc::new(image),
      index,
      captured_at,
    }
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  /// 复制出可修改的 RGB 图像
  pub fn to_rgb_image(&self) -> RgbImage {
    self.image.as_ref().clone()
  }

  /// 采集序号（从 1 开始）
  pub fn index(&self) -> u64 {
    self.index
  }

  pub fn timestamp(&self) -> Instant {
    self.captured_at
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn dimensions(&self) -> (u32, u32) {
    self.image.dimensions()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::new(image, 0)
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameBufferError {
  #[error("帧缓冲容量必须至少为 1")]
  ZeroCapacity,
}

/// 固定容量的帧环形缓冲
///
/// 按轮转顺序覆盖最旧的帧，创建后不再改变容量。
#[derive(Debug, Clone)]
pub struct FrameBuffer {
  slots: Box<[Option<Frame>]>,
  next: usize,
  current: Option<usize>,
}

impl FrameBuffer {
  pub fn new(capacity: usize) -> Result<Self, FrameBufferError> {
    if capacity == 0 {
      return Err(FrameBufferError::ZeroCapacity);
    }
    Ok(Self {
      slots: vec![None; capacity].into_boxed_slice(),
      next: 0,
      current: None,
    })
  }

  /// 写入一帧，返回写入的槽位（即新的当前索引）
  pub fn push(&mut self, frame: Frame) -> usize {
    let index = self.next;
    self.slots[index] = Some(frame);
    self.current = Some(index);
    self.next = (index + 1) % self.slots.len();
    index
  }

  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  /// 已填充的槽位数
  pub fn len(&self) -> usize {
    self.slots.iter().filter(|slot| slot.is_some()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.current.is_none()
  }

  pub fn current_index(&self) -> Option<usize> {
    self.current
  }

  pub fn current(&self) -> Option<&Frame> {
    self.current.and_then(|index| self.get(index))
  }

  pub fn get(&self, index: usize) -> Option<&Frame> {
    self.slots.get(index).and_then(Option::as_ref)
  }

  /// `index` 之前一个槽位（环绕）
  pub fn previous_index(&self, index: usize) -> usize {
    let capacity = self.slots.len();
    (index % capacity + capacity - 1) % capacity
  }

  pub fn previous(&self, index: usize) -> Option<&Frame> {
    self.get(self.previous_index(index))
  }

  /// 以 `index` 结尾，从旧到新排列的已缓冲帧
  pub fn chronological(&self, index: usize) -> Vec<&Frame> {
    let capacity = self.slots.len();
    (1..=capacity)
      .filter_map(|offset| self.get((index + offset) % capacity))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn frame(index: u64) -> Frame {
    Frame::new(RgbImage::new(4, 3), index)
  }

  #[test]
  fn zero_capacity_is_rejected() {
    assert_eq!(
      FrameBuffer::new(0).unwrap_err(),
      FrameBufferError::ZeroCapacity
    );
  }

  #[test]
  fn push_overwrites_oldest_first() {
    let mut buffer = FrameBuffer::new(3).unwrap();
    assert!(buffer.is_empty());

    for index in 1..=4 {
      buffer.push(frame(index));
    }

    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.current_index(), Some(0));
    assert_eq!(buffer.current().map(Frame::index), Some(4));
    assert_eq!(buffer.get(1).map(Frame::index), Some(2));
    assert_eq!(buffer.get(2).map(Frame::index), Some(3));
  }

  #[test]
  fn previous_wraps_around() {
    let mut buffer = FrameBuffer::new(2).unwrap();
    let first = buffer.push(frame(1));
    assert_eq!(first, 0);
    assert!(buffer.previous(first).is_none());

    let second = buffer.push(frame(2));
    assert_eq!(buffer.previous(second).map(Frame::index), Some(1));

    let third = buffer.push(frame(3));
    assert_eq!(third, 0);
    assert_eq!(buffer.previous(third).map(Frame::index), Some(2));
  }

  #[test]
  fn chronological_ends_with_current() {
    let mut buffer = FrameBuffer::new(3).unwrap();
    buffer.push(frame(1));
    let index = buffer.push(frame(2));
    let order: Vec<u64> = buffer.chronological(index).iter().map(|f| f.index()).collect();
    assert_eq!(order, vec![1, 2]);

    buffer.push(frame(3));
    let index = buffer.push(frame(4));
    let order: Vec<u64> = buffer.chronological(index).iter().map(|f| f.index()).collect();
    assert_eq!(order, vec![2, 3, 4]);
  }
}
