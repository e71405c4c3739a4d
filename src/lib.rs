// 该文件是 Shaobing （哨兵） 项目的一部分。
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

//! # Shaobing 哨兵
//!
//! 运动触发的实时反应流水线：
//!
//! ```text
//! FrameSource -> Tracker --(扇出)--> Subscriber { FrameBuffer -> FrameProcessor -> EventDetector -> Handler }
//! ```
//!
//! 每个 [`subscriber::Subscriber`] 拥有独立的帧环形缓冲、检测策略、去抖状态机
//! 和反应处理器，并运行在自己的工作线程中。

pub mod config;
pub mod detector;
pub mod frame;
pub mod handler;
pub mod input;
pub mod processor;
pub mod subscriber;
pub mod tracker;
pub mod vision;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}
