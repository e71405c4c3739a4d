// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头输入
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

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use v4l::{
  Device, FourCC, buffer::Type, io::mmap::Stream, io::traits::CaptureStream, video::Capture,
};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{FrameSource, InputError},
};

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid query parameter {key}={value}")]
  InvalidParameter { key: String, value: String },
  #[error("Unsupported pixel format {0}")]
  UnsupportedPixelFormat(String),
}

/// V4L2 摄像头，按 YUYV 请求格式，驱动给出 RGB3 或 MJPG 时同样可用
pub struct V4lInput {
  stream: Stream<'static>,
  fourcc: FourCC,
  width: u32,
  height: u32,
  // stream 依赖设备句柄，放在最后以保证先释放 stream
  _device: Device,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    // v4l:///dev/video0?width=640&height=480
    let device_path = if url.path().is_empty() || url.path() == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      url.path().to_string()
    };

    let mut width = DEFAULT_WIDTH;
    let mut height = DEFAULT_HEIGHT;
    for (key, value) in url.query_pairs() {
      let target = match &*key {
        "width" => &mut width,
        "height" => &mut height,
        _ => continue,
      };
      *target = value
        .parse()
        .map_err(|_| V4lInputError::InvalidParameter {
          key: key.to_string(),
          value: value.to_string(),
        })?;
    }

    Self::open(&device_path, width, height)
  }
}

impl V4lInput {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, V4lInputError> {
    let device = Device::with_path(device_path)?;

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    info!(
      "打开摄像头 {}: {}x{} {}",
      device_path, format.width, format.height, format.fourcc
    );

    let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;

    Ok(Self {
      stream,
      fourcc: format.fourcc,
      width: format.width,
      height: format.height,
      _device: device,
    })
  }

  fn decode(&self, data: &[u8]) -> Result<Option<RgbImage>, V4lInputError> {
    match &self.fourcc.repr {
      b"RGB3" => Ok(RgbImage::from_raw(self.width, self.height, data.to_vec())),
      b"YUYV" => Ok(RgbImage::from_raw(
        self.width,
        self.height,
        yuyv_to_rgb(data),
      )),
      b"MJPG" => match image::load_from_memory_with_format(data, ImageFormat::Jpeg) {
        Ok(image) => Ok(Some(image.into_rgb8())),
        Err(err) => {
          warn!("MJPG 帧解码失败: {}", err);
          Ok(None)
        }
      },
      _ => Err(V4lInputError::UnsupportedPixelFormat(self.fourcc.to_string())),
    }
  }
}

impl FrameSource for V4lInput {
  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    let data = {
      let (buffer, _meta) = CaptureStream::next(&mut self.stream).map_err(V4lInputError::from)?;
      buffer.to_vec()
    };
    Ok(self.decode(&data)?)
  }
}

/// YUYV 4:2:2 转 RGB，两个像素共用一组色度
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);
  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
      rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
      rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
    }
  }
  rgb
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gray_yuyv_stays_gray() {
    let rgb = yuyv_to_rgb(&[100, 128, 200, 128]);
    assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
  }
}
