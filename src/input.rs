// 该文件是 Shaobing （哨兵） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use image::RgbImage;
use thiserror::Error;

use crate::FromUrl;

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{FolderInput, ImageFileInput, ImageFileInputError};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lInput, V4lInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L input error: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[error("End of stream")]
  EndOfStream,
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

/// 阻塞式帧源
///
/// `Ok(None)` 表示本次读取没有数据，调用方跳过即可；
/// [`InputError::EndOfStream`] 表示输入正常结束，其余错误都视为致命。
pub trait FrameSource {
  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    (**self).next_frame()
  }
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  Folder(FolderInput),
  #[cfg(feature = "v4l_input")]
  V4l(V4lInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "v4l_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == V4lInput::SCHEME {
        return Ok(InputWrapper::V4l(V4lInput::from_url(url)?));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        return Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?));
      }
      if url.scheme() == FolderInput::SCHEME {
        return Ok(InputWrapper::Folder(FolderInput::from_url(url)?));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl FrameSource for InputWrapper {
  fn next_frame(&mut self) -> Result<Option<RgbImage>, InputError> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next_frame(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::Folder(input) => input.next_frame(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.next_frame(),
      #[allow(unreachable_patterns)]
      _ => Err(InputError::EndOfStream),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = url::Url::parse("rtsp://camera.local/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }
}
