//! Error type shared by every layer of the splash pipeline.

use std::fmt;

use crate::context::Channels;
use crate::program::ShaderKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The drawing surface could not hand out any rendering context.
    NoContext,
    /// Not even the four-channel fallback could be attached to a framebuffer.
    NoRenderableFormat(Channels),
    ShaderCompile { kind: ShaderKind, log: String },
    ProgramLink { log: String },
    Config(serde_json::Error),
    Io(std::io::Error),
    Image(image::ImageError),
    Gpu(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoContext => write!(f, "no rendering context available for the drawing surface"),
            Error::NoRenderableFormat(channels) => {
                write!(f, "no renderable texture format for {:?} fields", channels)
            }
            Error::ShaderCompile { kind, log } => write!(f, "{:?} shader failed to compile: {}", kind, log),
            Error::ProgramLink { log } => write!(f, "program failed to link: {}", log),
            Error::Config(err) => write!(f, "invalid configuration: {}", err),
            Error::Io(err) => write!(f, "i/o error: {}", err),
            Error::Image(err) => write!(f, "image error: {}", err),
            Error::Gpu(msg) => write!(f, "gpu error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Image(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err)
    }
}
