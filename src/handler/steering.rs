// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/handler/steering.rs - 舵机转向处理器
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

//! 把检测目标的质心转换为两轴舵机的增量转向。
//!
//! 舵机位置以 100µs 脉宽为单位，15 对应标准舵机 1500µs 的中位。

use serde::Deserialize;
use tracing::debug;

use crate::{
  frame::FrameBuffer,
  handler::{Handler, HandlerError, spawn_detached},
  vision::{Centroid, Region, largest_region, weighted_centroid},
};

/// 归中时每轴发送的脉冲数
pub const CENTERING_PULSES: u32 = 25;

/// 舵机执行接口：只负责发出命令，不等待完成
pub trait Actuator: Send {
  fn set_position(&self, channel: u8, pulses: u32, position: f64) -> Result<(), HandlerError>;
}

/// 通过 `gpio_pwm <pin> <period_us> <pulses> <position>` 驱动舵机
#[derive(Debug, Clone)]
pub struct GpioPwmActuator {
  program: String,
  period_us: u32,
}

impl GpioPwmActuator {
  pub fn new(program: &str, period_us: u32) -> Self {
    Self {
      program: program.to_string(),
      period_us,
    }
  }
}

impl Actuator for GpioPwmActuator {
  fn set_position(&self, channel: u8, pulses: u32, position: f64) -> Result<(), HandlerError> {
    let args = [
      channel.to_string(),
      self.period_us.to_string(),
      pulses.to_string(),
      format!("{position:.2}"),
    ];
    spawn_detached(&self.program, &args)
  }
}

/// 瞄准方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
  /// 最大区域的质心
  #[default]
  Largest,
  /// 所有区域按面积加权的平均质心
  Weighted,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AxisBounds {
  pub min: f64,
  pub max: f64,
}

impl Default for AxisBounds {
  fn default() -> Self {
    Self {
      min: 8.0,
      max: 22.0,
    }
  }
}

impl AxisBounds {
  pub fn clamp(&self, value: f64) -> f64 {
    value.clamp(self.min, self.max)
  }
}

/// 两轴舵机的持久位置，每次修改后都限制在边界内
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorState {
  x: f64,
  y: f64,
  bounds: AxisBounds,
}

impl ActuatorState {
  pub fn new(neutral: f64, bounds: AxisBounds) -> Self {
    Self {
      x: bounds.clamp(neutral),
      y: bounds.clamp(neutral),
      bounds,
    }
  }

  pub fn x(&self) -> f64 {
    self.x
  }

  pub fn y(&self) -> f64 {
    self.y
  }

  pub fn bounds(&self) -> AxisBounds {
    self.bounds
  }

  pub fn offset(&mut self, dx: f64, dy: f64) {
    self.x = self.bounds.clamp(self.x + dx);
    self.y = self.bounds.clamp(self.y + dy);
  }

  pub fn set(&mut self, x: f64, y: f64) {
    self.x = self.bounds.clamp(x);
    self.y = self.bounds.clamp(y);
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
  /// 水平转向通道（GPIO 引脚）
  pub h_channel: u8,
  /// 垂直转向通道
  pub v_channel: u8,
  /// 转向灵敏度，随舵机和镜头视角而变
  pub gain: f64,
  /// 相对画面中心的瞄准偏移（像素）
  pub bias_x: f64,
  pub bias_y: f64,
  pub target: TargetMode,
  pub neutral: f64,
  pub bounds: AxisBounds,
  pub center_on_start: bool,
  pub program: String,
  pub period_us: u32,
}

impl Default for SteeringConfig {
  fn default() -> Self {
    Self {
      h_channel: 20,
      v_channel: 21,
      gain: 10.0,
      bias_x: 0.0,
      bias_y: 0.0,
      target: TargetMode::Largest,
      neutral: 15.0,
      bounds: AxisBounds::default(),
      center_on_start: true,
      program: "gpio_pwm".to_string(),
      period_us: 10000,
    }
  }
}

/// 一次转向计算的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringCommand {
  pub h_delta: f64,
  pub v_delta: f64,
  pub h_pulses: u32,
  pub v_pulses: u32,
}

pub struct SteeringHandler<A> {
  config: SteeringConfig,
  state: ActuatorState,
  actuator: A,
}

impl<A: Actuator> SteeringHandler<A> {
  pub fn new(config: SteeringConfig, actuator: A) -> Self {
    let state = ActuatorState::new(config.neutral, config.bounds);
    Self {
      config,
      state,
      actuator,
    }
  }

  pub fn state(&self) -> ActuatorState {
    self.state
  }

  /// 两轴回到中位
  pub fn center(&mut self) -> Result<(), HandlerError> {
    self.state.set(self.config.neutral, self.config.neutral);
    self
      .actuator
      .set_position(self.config.h_channel, CENTERING_PULSES, self.state.x())?;
    self
      .actuator
      .set_position(self.config.v_channel, CENTERING_PULSES, self.state.y())
  }

  fn target(&self, regions: &[Region]) -> Result<Centroid, HandlerError> {
    match self.config.target {
      TargetMode::Largest => largest_region(regions)
        .map(|region| region.centroid)
        .ok_or(HandlerError::EmptyRegions),
      TargetMode::Weighted => {
        if regions.is_empty() {
          return Err(HandlerError::EmptyRegions);
        }
        weighted_centroid(regions).ok_or(HandlerError::DegenerateRegions)
      }
    }
  }

  /// 根据目标质心更新持久位置并返回本次命令
  pub fn steer(
    &mut self,
    centroid: Centroid,
    (width, height): (u32, u32),
  ) -> Result<SteeringCommand, HandlerError> {
    let h_res = width as f64 / 2.0;
    let v_res = height as f64 / 2.0;
    let target_x = h_res + self.config.bias_x;
    let target_y = v_res + self.config.bias_y;

    // 归一化到 [-1, 1] 附近，再做平方非线性
    let h_pos = (centroid.x - target_x) / h_res;
    let v_pos = (centroid.y - target_y) / v_res;
    let h_delta = self.config.gain * h_pos * h_pos.abs();
    let v_delta = self.config.gain * v_pos * v_pos.abs();
    // 空帧或非有限质心会得到 NaN，clamp 无法约束
    if !h_delta.is_finite() || !v_delta.is_finite() {
      return Err(HandlerError::InvalidSteering { h_delta, v_delta });
    }

    self.state.offset(-h_delta, v_delta);

    Ok(SteeringCommand {
      h_delta,
      v_delta,
      h_pulses: pulse_count(h_delta),
      v_pulses: pulse_count(v_delta),
    })
  }
}

fn pulse_count(delta: f64) -> u32 {
  (delta.abs().ceil() as u32).saturating_add(1)
}

impl<A: Actuator> Handler for SteeringHandler<A> {
  fn handle(
    &mut self,
    regions: &[Region],
    frames: &FrameBuffer,
    index: usize,
  ) -> Result<(), HandlerError> {
    let frame = frames
      .get(index)
      .ok_or(HandlerError::MissingFrame { index })?;
    let centroid = self.target(regions)?;
    let command = self.steer(centroid, frame.dimensions())?;

    debug!(
      "N={} centroid=({:.1}, {:.1}) hdelta={:.2} vdelta={:.2} hpc={} vpc={} htgt={:.2} vtgt={:.2}",
      regions.len(),
      centroid.x,
      centroid.y,
      command.h_delta,
      command.v_delta,
      command.h_pulses,
      command.v_pulses,
      self.state.x(),
      self.state.y()
    );

    self
      .actuator
      .set_position(self.config.h_channel, command.h_pulses, self.state.x())?;
    self
      .actuator
      .set_position(self.config.v_channel, command.v_pulses, self.state.y())
  }
}
