// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/tracker.rs - 帧采集循环与分发
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Instant,
};

use image::{RgbImage, imageops};
use serde::Deserialize;
use thiserror::Error;
use tracing::{Span, debug, error, info, info_span, warn};

use crate::{
  frame::Frame,
  input::{FrameSource, InputError},
  subscriber::{Backpressure, Dispatch, Subscriber, SubscriberError, SubscriberWorker},
};

pub const DEFAULT_HEARTBEAT_FRAMES: u64 = 500;
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum TrackerError {
  #[error("帧源错误: {0}")]
  Source(#[from] InputError),
  #[error("订阅者错误: {0}")]
  Subscriber(#[from] SubscriberError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
  pub hflip: bool,
  pub vflip: bool,
  /// 每隔多少帧输出一次心跳，0 表示关闭
  pub heartbeat_frames: u64,
  pub queue_depth: usize,
  pub backpressure: Backpressure,
  pub max_frames: Option<u64>,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      hflip: false,
      vflip: false,
      heartbeat_frames: DEFAULT_HEARTBEAT_FRAMES,
      queue_depth: DEFAULT_QUEUE_DEPTH,
      backpressure: Backpressure::Drop,
      max_frames: None,
    }
  }
}

impl TrackerConfig {
  pub fn orientation(&self) -> Orientation {
    Orientation {
      hflip: self.hflip,
      vflip: self.vflip,
    }
  }
}

/// 摄像头安装方向校正
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Orientation {
  pub hflip: bool,
  pub vflip: bool,
}

impl Orientation {
  pub fn apply(&self, image: &mut RgbImage) {
    if self.hflip {
      imageops::flip_horizontal_in_place(image);
    }
    if self.vflip {
      imageops::flip_vertical_in_place(image);
    }
  }
}

/// 每 `interval` 帧给出一次帧率
#[derive(Debug, Clone)]
pub struct Heartbeat {
  interval: u64,
  last: Instant,
}

impl Heartbeat {
  pub fn new(interval: u64, start: Instant) -> Self {
    Self {
      interval,
      last: start,
    }
  }

  pub fn tick(&mut self, count: u64, now: Instant) -> Option<f64> {
    if self.interval == 0 || count == 0 || count % self.interval != 0 {
      return None;
    }
    let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
    self.last = now;
    (elapsed > 0.0).then(|| self.interval as f64 / elapsed)
  }
}

/// 可跨线程请求停止采集循环
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
  flag: Arc<AtomicBool>,
}

impl StopHandle {
  pub fn stop(&self) {
    self.flag.store(true, Ordering::SeqCst);
  }

  pub fn is_stopped(&self) -> bool {
    self.flag.load(Ordering::SeqCst)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  Stopped,
  MaxFrames,
  EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerReport {
  pub frames: u64,
  pub skipped_reads: u64,
  pub dropped_dispatches: u64,
  pub reason: StopReason,
}

pub struct Tracker {
  config: TrackerConfig,
  subscribers: Vec<Subscriber>,
  stop: StopHandle,
  span: Span,
}

impl Tracker {
  pub fn new(config: TrackerConfig) -> Self {
    Self {
      config,
      subscribers: Vec::new(),
      stop: StopHandle::default(),
      span: info_span!("tracker"),
    }
  }

  pub fn config(&self) -> &TrackerConfig {
    &self.config
  }

  /// 订阅者日志的父 span
  pub fn span(&self) -> &Span {
    &self.span
  }

  pub fn add_subscriber(&mut self, subscriber: Subscriber) {
    self
      .span
      .in_scope(|| info!("Added subscriber {}", subscriber.name()));
    self.subscribers.push(subscriber);
  }

  /// 采集循环结束后订阅者回到这里，统计数据可继续查看
  pub fn subscribers(&self) -> &[Subscriber] {
    &self.subscribers
  }

  pub fn stop_handle(&self) -> StopHandle {
    self.stop.clone()
  }

  /// 在下一次阻塞读取之前停止；不会打断正在进行的读取或处理
  pub fn stop(&self) {
    self.stop.stop();
  }

  fn spawn_workers(&mut self) -> Result<Vec<SubscriberWorker>, SubscriberError> {
    let mut workers = Vec::with_capacity(self.subscribers.len());
    for subscriber in std::mem::take(&mut self.subscribers) {
      match SubscriberWorker::spawn(subscriber, self.config.queue_depth) {
        Ok(worker) => workers.push(worker),
        Err(err) => {
          self.join_workers(workers);
          return Err(err);
        }
      }
    }
    Ok(workers)
  }

  fn join_workers(&mut self, workers: Vec<SubscriberWorker>) {
    for worker in workers {
      match worker.join() {
        Ok(subscriber) => self.subscribers.push(subscriber),
        Err(err) => error!("{}", err),
      }
    }
  }

  /// 运行采集循环直到停止、达到帧数上限或帧源结束
  ///
  /// 帧源的致命错误会在所有订阅者处理完已分发的帧之后返回。
  pub fn start<S: FrameSource + ?Sized>(
    &mut self,
    source: &mut S,
  ) -> Result<TrackerReport, TrackerError> {
    let span = self.span.clone();
    let _enter = span.enter();

    let mut workers = self.spawn_workers()?;
    info!("开始采集, 订阅者 {} 个", workers.len());

    let orientation = self.config.orientation();
    let backpressure = self.config.backpressure;
    let mut heartbeat = Heartbeat::new(self.config.heartbeat_frames, Instant::now());
    let mut frames = 0u64;
    let mut skipped_reads = 0u64;
    let mut dropped_dispatches = 0u64;
    let mut failure = None;

    let reason = loop {
      if self.stop.is_stopped() {
        info!("收到停止请求, 退出采集循环");
        break StopReason::Stopped;
      }
      if self.config.max_frames.is_some_and(|max| frames >= max) {
        info!("达到指定帧数 {}, 退出采集循环", frames);
        break StopReason::MaxFrames;
      }

      let mut image = match source.next_frame() {
        Ok(Some(image)) => image,
        Ok(None) => {
          skipped_reads += 1;
          debug!("本次读取没有数据, 跳过");
          continue;
        }
        Err(InputError::EndOfStream) => {
          info!("帧源结束");
          break StopReason::EndOfStream;
        }
        Err(err) => {
          error!("帧源错误: {}", err);
          failure = Some(err);
          break StopReason::Stopped;
        }
      };

      orientation.apply(&mut image);
      frames += 1;
      let frame = Frame::new(image, frames);

      for worker in workers.iter_mut() {
        match worker.dispatch(frame.clone(), backpressure) {
          Dispatch::Queued => {}
          Dispatch::Dropped => dropped_dispatches += 1,
          Dispatch::Closed => {
            dropped_dispatches += 1;
            warn!("订阅者 {} 的工作线程已退出", worker.name());
          }
        }
      }

      if let Some(fps) = heartbeat.tick(frames, Instant::now()) {
        info!("[heartbeat] fr={} fps={:.2}", frames, fps);
      }
    };

    self.join_workers(workers);

    if let Some(err) = failure {
      return Err(TrackerError::Source(err));
    }
    Ok(TrackerReport {
      frames,
      skipped_reads,
      dropped_dispatches,
      reason,
    })
  }
}
