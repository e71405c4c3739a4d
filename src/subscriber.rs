// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/subscriber.rs - 订阅者：从帧到事件处理
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

//! 每个订阅者独占一个帧缓冲、一个帧处理器、一个事件检测器和一个可选的处理器。
//!
//! 订阅者运行在自己的工作线程上（见 [`worker`]），所有状态都不与其他订阅者共享。

use std::{
  fmt,
  panic::{self, AssertUnwindSafe},
  time::Instant,
};

use thiserror::Error;
use tracing::{Span, debug, error, info, info_span, warn};

use crate::{
  detector::{DetectorConfig, DetectorConfigError, EventDetector, EventMetadata, Verdict},
  frame::{Frame, FrameBuffer, FrameBufferError},
  handler::{Handler, HandlerError},
  processor::{FrameProcessor, MotionProcessor, ProcessError},
};

pub mod worker;

pub use self::worker::{Backpressure, Dispatch, SubscriberWorker};

pub const DEFAULT_CAPACITY: usize = 2;

#[derive(Error, Debug)]
pub enum SubscriberError {
  #[error("帧缓冲容量 {capacity} 不足, 处理器至少需要 {required} 帧")]
  BufferTooSmall { required: usize, capacity: usize },
  #[error("帧缓冲错误: {0}")]
  FrameBufferError(#[from] FrameBufferError),
  #[error("检测器配置错误: {0}")]
  DetectorConfigError(#[from] DetectorConfigError),
  #[error("帧处理器配置错误: {0}")]
  ProcessError(#[from] ProcessError),
  #[error("处理器构建失败: {0}")]
  HandlerError(#[from] HandlerError),
  #[error("无法启动订阅者 {name} 的工作线程: {source}")]
  Spawn {
    name: String,
    source: std::io::Error,
  },
  #[error("订阅者 {name} 的工作线程异常退出")]
  WorkerPanicked { name: String },
}

/// 订阅者运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
  pub frames_seen: u64,
  pub frames_processed: u64,
  pub skipped_in_cooldown: u64,
  pub insufficient_history: u64,
  pub events: u64,
  pub handler_failures: u64,
}

pub struct Subscriber {
  name: String,
  frames: FrameBuffer,
  processor: Box<dyn FrameProcessor>,
  detector: EventDetector,
  handler: Option<Box<dyn Handler>>,
  skip_during_cooldown: bool,
  stats: SubscriberStats,
  last_event: Option<EventMetadata>,
  span: Span,
}

impl fmt::Debug for Subscriber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Subscriber")
      .field("name", &self.name)
      .field("capacity", &self.frames.capacity())
      .field("processor", &self.processor.name())
      .field("detector", &self.detector)
      .field("handler", &self.handler.is_some())
      .field("stats", &self.stats)
      .finish_non_exhaustive()
  }
}

impl Subscriber {
  pub fn builder() -> SubscriberBuilder {
    SubscriberBuilder::default()
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn stats(&self) -> SubscriberStats {
    self.stats
  }

  pub fn last_event(&self) -> Option<&EventMetadata> {
    self.last_event.as_ref()
  }

  pub fn frames(&self) -> &FrameBuffer {
    &self.frames
  }

  pub fn detector(&self) -> &EventDetector {
    &self.detector
  }

  pub fn span(&self) -> &Span {
    &self.span
  }

  pub fn update(&mut self, frame: Frame) -> Option<EventMetadata> {
    self.update_at(frame, Instant::now())
  }

  /// 处理一帧，确认事件时返回其描述
  pub fn update_at(&mut self, frame: Frame, now: Instant) -> Option<EventMetadata> {
    let span = self.span.clone();
    let _enter = span.enter();

    self.stats.frames_seen += 1;
    let index = self.frames.push(frame);

    if self.skips_at(now) {
      self.stats.skipped_in_cooldown += 1;
      return None;
    }

    let processed = match self.processor.process(&self.frames, index) {
      Ok(processed) => processed,
      Err(ProcessError::InsufficientHistory {
        required,
        available,
      }) => {
        debug!("历史帧不足: 需要 {}, 现有 {}", required, available);
        self.stats.insufficient_history += 1;
        return None;
      }
      Err(err) => {
        warn!("帧处理失败: {}", err);
        return None;
      }
    };
    self.stats.frames_processed += 1;

    let Verdict::Confirmed(metadata) = self.detector.detect_at(&processed.regions, now) else {
      return None;
    };
    self.stats.events += 1;
    info!("[{}] 检测到事件", self.name);
    debug!("{}", metadata);

    if let Some(handler) = self.handler.as_mut() {
      let frames = &self.frames;
      let regions = processed.regions.as_slice();
      let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.handle(regions, frames, index)
      }));
      match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
          self.stats.handler_failures += 1;
          error!("[{}] 事件处理失败: {}", self.name, err);
        }
        Err(_) => {
          self.stats.handler_failures += 1;
          error!("[{}] 事件处理器发生 panic", self.name);
        }
      }
    }

    self.last_event = Some(metadata.clone());
    Some(metadata)
  }

  // 只要求单帧确认时，冷却期内的计数不会影响冷却结束后的确认时刻
  fn skips_at(&self, now: Instant) -> bool {
    self.skip_during_cooldown
      && self.detector.config().min_sequential_frames <= 1
      && !self.detector.is_ready_at(now)
  }
}

/// 订阅者构建器，未指定的部分使用默认值
pub struct SubscriberBuilder {
  name: String,
  capacity: usize,
  processor: Option<Box<dyn FrameProcessor>>,
  detector: DetectorConfig,
  handler: Option<Box<dyn Handler>>,
  parent: Option<Span>,
  skip_during_cooldown: bool,
  start: Option<Instant>,
}

impl Default for SubscriberBuilder {
  fn default() -> Self {
    Self {
      name: "subscriber1".to_string(),
      capacity: DEFAULT_CAPACITY,
      processor: None,
      detector: DetectorConfig::default(),
      handler: None,
      parent: None,
      skip_during_cooldown: true,
      start: None,
    }
  }
}

impl SubscriberBuilder {
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn with_processor(mut self, processor: impl FrameProcessor + 'static) -> Self {
    self.processor = Some(Box::new(processor));
    self
  }

  pub fn with_detector(mut self, detector: DetectorConfig) -> Self {
    self.detector = detector;
    self
  }

  pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
    self.handler = Some(Box::new(handler));
    self
  }

  pub fn with_boxed_handler(mut self, handler: Box<dyn Handler>) -> Self {
    self.handler = Some(handler);
    self
  }

  /// 订阅者日志挂在 `parent` 之下
  pub fn with_parent_span(mut self, parent: &Span) -> Self {
    self.parent = Some(parent.clone());
    self
  }

  /// 冷却期内是否跳过帧处理，仅在 `min_sequential_frames <= 1` 时生效；
  /// 需要多帧确认时冷却期内始终累计连续帧数
  pub fn skip_during_cooldown(mut self, skip: bool) -> Self {
    self.skip_during_cooldown = skip;
    self
  }

  /// 检测器的冷却起点，默认为构建时刻
  pub fn starting_at(mut self, start: Instant) -> Self {
    self.start = Some(start);
    self
  }

  pub fn build(self) -> Result<Subscriber, SubscriberError> {
    let processor = self
      .processor
      .unwrap_or_else(|| Box::new(MotionProcessor::default()));
    let required = processor.min_history();
    if required > self.capacity {
      return Err(SubscriberError::BufferTooSmall {
        required,
        capacity: self.capacity,
      });
    }

    let frames = FrameBuffer::new(self.capacity)?;
    let detector = EventDetector::starting_at(
      self.detector,
      self.start.unwrap_or_else(Instant::now),
    )?;
    let span = match &self.parent {
      Some(parent) => info_span!(parent: parent, "subscriber", name = %self.name),
      None => info_span!("subscriber", name = %self.name),
    };

    debug!(
      "订阅者 {}: 缓冲 {} 帧, 处理器 {}",
      self.name,
      self.capacity,
      processor.name()
    );

    Ok(Subscriber {
      name: self.name,
      frames,
      processor,
      detector,
      handler: self.handler,
      skip_during_cooldown: self.skip_during_cooldown,
      stats: SubscriberStats::default(),
      last_event: None,
      span,
    })
  }
}
