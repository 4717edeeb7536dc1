#[cfg(feature = "stream")]
pub mod callback;
#[cfg(feature = "decoder")]
pub mod decoder;
#[cfg(feature = "encoder")]
pub mod encoder;
pub mod error;
#[cfg(feature = "stream")]
pub mod stream;

use std::ffi::CStr;

pub use media_core::{error::Error, Result};
use media_opusfile_sys as opus_sys;

#[cfg(feature = "decoder")]
pub use crate::decoder::Decoder;
#[cfg(feature = "encoder")]
pub use crate::encoder::Encoder;
#[cfg(feature = "stream")]
pub use crate::{error::StreamError, stream::Stream};

// RFC 6716 caps a single packet at 120ms
pub const MAX_FRAME_DURATION_MS: u32 = 120;

// libopus and libopusfile always decode Ogg Opus streams at 48kHz
pub const STREAM_SAMPLE_RATE: u32 = 48000;

pub(crate) fn opus_error_string(error: i32) -> String {
    unsafe { CStr::from_ptr(opus_sys::opus_strerror(error)).to_string_lossy().into_owned() }
}

/// Version string of the linked libopus, e.g. `libopus 1.4`.
pub fn version() -> String {
    unsafe { CStr::from_ptr(opus_sys::opus_get_version_string()).to_string_lossy().into_owned() }
}

#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Application {
    VoIP     = opus_sys::OPUS_APPLICATION_VOIP,
    Audio    = opus_sys::OPUS_APPLICATION_AUDIO,
    LowDelay = opus_sys::OPUS_APPLICATION_RESTRICTED_LOWDELAY,
}

impl Application {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            opus_sys::OPUS_APPLICATION_VOIP => Some(Application::VoIP),
            opus_sys::OPUS_APPLICATION_AUDIO => Some(Application::Audio),
            opus_sys::OPUS_APPLICATION_RESTRICTED_LOWDELAY => Some(Application::LowDelay),
            _ => None,
        }
    }
}

/// Audio passband of an encoded stream.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bandwidth {
    /// 4 kHz
    Narrowband    = opus_sys::OPUS_BANDWIDTH_NARROWBAND,
    /// 6 kHz
    Mediumband    = opus_sys::OPUS_BANDWIDTH_MEDIUMBAND,
    /// 8 kHz
    Wideband      = opus_sys::OPUS_BANDWIDTH_WIDEBAND,
    /// 12 kHz
    Superwideband = opus_sys::OPUS_BANDWIDTH_SUPERWIDEBAND,
    /// 20 kHz
    Fullband      = opus_sys::OPUS_BANDWIDTH_FULLBAND,
}

impl Bandwidth {
    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            opus_sys::OPUS_BANDWIDTH_NARROWBAND => Some(Bandwidth::Narrowband),
            opus_sys::OPUS_BANDWIDTH_MEDIUMBAND => Some(Bandwidth::Mediumband),
            opus_sys::OPUS_BANDWIDTH_WIDEBAND => Some(Bandwidth::Wideband),
            opus_sys::OPUS_BANDWIDTH_SUPERWIDEBAND => Some(Bandwidth::Superwideband),
            opus_sys::OPUS_BANDWIDTH_FULLBAND => Some(Bandwidth::Fullband),
            _ => None,
        }
    }
}
