// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/subscriber/worker.rs - 订阅者工作线程
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

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, TrySendError};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
  frame::Frame,
  subscriber::{Subscriber, SubscriberError},
};

/// 队列已满时的分发策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
  /// 丢弃该订阅者的这一帧
  #[default]
  Drop,
  /// 等待队列腾出空间
  Block,
}

/// 单次分发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
  Queued,
  Dropped,
  /// 工作线程已退出
  Closed,
}

/// 串行处理一个订阅者全部更新的工作线程
///
/// 帧按分发顺序进入有界队列；关闭队列后线程处理完剩余帧并交还订阅者。
pub struct SubscriberWorker {
  name: String,
  sender: Sender<Frame>,
  handle: JoinHandle<Subscriber>,
  dropped: u64,
}

impl SubscriberWorker {
  pub fn spawn(mut subscriber: Subscriber, queue_depth: usize) -> Result<Self, SubscriberError> {
    let name = subscriber.name().to_string();
    let (sender, receiver) = crossbeam_channel::bounded::<Frame>(queue_depth.max(1));

    let handle = thread::Builder::new()
      .name(format!("sub-{name}"))
      .spawn(move || {
        for frame in receiver.iter() {
          subscriber.update(frame);
        }
        subscriber
          .span()
          .in_scope(|| debug!("队列已关闭, 工作线程退出"));
        subscriber
      })
      .map_err(|source| SubscriberError::Spawn {
        name: name.clone(),
        source,
      })?;

    Ok(Self {
      name,
      sender,
      handle,
      dropped: 0,
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// 队列中等待处理的帧数
  pub fn pending(&self) -> usize {
    self.sender.len()
  }

  pub fn dropped(&self) -> u64 {
    self.dropped
  }

  pub fn dispatch(&mut self, frame: Frame, backpressure: Backpressure) -> Dispatch {
    match backpressure {
      Backpressure::Drop => match self.sender.try_send(frame) {
        Ok(()) => Dispatch::Queued,
        Err(TrySendError::Full(frame)) => {
          self.dropped += 1;
          warn!(
            "订阅者 {} 队列已满, 丢弃第 {} 帧 (累计 {})",
            self.name,
            frame.index(),
            self.dropped
          );
          Dispatch::Dropped
        }
        Err(TrySendError::Disconnected(_)) => Dispatch::Closed,
      },
      Backpressure::Block => match self.sender.send(frame) {
        Ok(()) => Dispatch::Queued,
        Err(_) => Dispatch::Closed,
      },
    }
  }

  /// 关闭队列，等待剩余帧处理完毕后取回订阅者
  pub fn join(self) -> Result<Subscriber, SubscriberError> {
    let Self {
      name,
      sender,
      handle,
      ..
    } = self;
    drop(sender);
    handle
      .join()
      .map_err(|_| SubscriberError::WorkerPanicked { name })
  }
}
