use std::os::raw::c_int;

use log::debug;
use media_core::{error::Error, invalid_param_error, unsupported_error, variant::Variant, Result};

use crate::{error::opus_failed, opus_error_string, opus_sys, Application, Bandwidth};

struct OpusOptions {
    application: i32,
    bit_rate: Option<i32>,
    packet_loss: i32,
    fec: bool,
    dtx: bool,
    vbr: u32,
    max_bandwidth: u32,
    complexity: u32,
}

impl Default for OpusOptions {
    fn default() -> Self {
        OpusOptions {
            application: opus_sys::OPUS_APPLICATION_AUDIO,
            bit_rate: None,
            packet_loss: 0,
            fec: false,
            dtx: false,
            vbr: 1,
            max_bandwidth: 0,
            complexity: 10,
        }
    }
}

impl OpusOptions {
    fn from_variant(variant: Option<&Variant>) -> Self {
        if let Some(variant) = variant {
            OpusOptions {
                application: variant["application"].get_int32().unwrap_or(opus_sys::OPUS_APPLICATION_AUDIO),
                bit_rate: variant["bit_rate"].get_int32(),
                packet_loss: variant["packet_loss"].get_int32().unwrap_or(0),
                fec: variant["fec"].get_bool().unwrap_or(false),
                dtx: variant["dtx"].get_bool().unwrap_or(false),
                vbr: variant["vbr"].get_uint32().unwrap_or(1),
                max_bandwidth: variant["max_bandwidth"].get_uint32().unwrap_or(0),
                complexity: variant["complexity"].get_uint32().unwrap_or(10),
            }
        } else {
            Self::default()
        }
    }
}

// The maximum frame size is 1275 bytes
const MAX_FRAME_SIZE: usize = 1275;
// 120ms packets consist of 6 frames in one packet
const MAX_FRAMES: usize = 6;
// The packet header size is 7 bytes
const PACKET_HEADER_SIZE: usize = 7;

/// Size of the largest packet the encoder can produce.
pub const MAX_PACKET_SIZE: usize = PACKET_HEADER_SIZE + MAX_FRAME_SIZE * MAX_FRAMES;

trait EncodeSample: Copy {
    unsafe fn encode(encoder: *mut opus_sys::OpusEncoder, pcm: *const Self, frame_size: c_int, data: *mut u8, max_bytes: opus_sys::opus_int32) -> opus_sys::opus_int32;
}

impl EncodeSample for i16 {
    unsafe fn encode(encoder: *mut opus_sys::OpusEncoder, pcm: *const Self, frame_size: c_int, data: *mut u8, max_bytes: opus_sys::opus_int32) -> opus_sys::opus_int32 {
        opus_sys::opus_encode(encoder, pcm, frame_size, data, max_bytes)
    }
}

impl EncodeSample for f32 {
    unsafe fn encode(encoder: *mut opus_sys::OpusEncoder, pcm: *const Self, frame_size: c_int, data: *mut u8, max_bytes: opus_sys::opus_int32) -> opus_sys::opus_int32 {
        opus_sys::opus_encode_float(encoder, pcm, frame_size, data, max_bytes)
    }
}

/// Encodes interleaved PCM frames into Opus packets.
pub struct Encoder {
    encoder: *mut opus_sys::OpusEncoder,
    channels: usize,
    options: OpusOptions,
}

unsafe impl Send for Encoder {}
unsafe impl Sync for Encoder {}

impl Drop for Encoder {
    fn drop(&mut self) {
        unsafe { opus_sys::opus_encoder_destroy(self.encoder) }
    }
}

impl Encoder {
    pub fn new(sample_rate: u32, channels: usize, application: Application) -> Result<Self> {
        let options = OpusOptions {
            application: application as i32,
            ..Default::default()
        };

        Self::create(sample_rate, channels, options)
    }

    /// Creates an encoder configured from an option dictionary. Recognized keys are
    /// `application`, `bit_rate`, `complexity`, `vbr` (0 off, 1 on, 2 constrained),
    /// `fec`, `packet_loss`, `dtx` and `max_bandwidth`.
    pub fn with_options(sample_rate: u32, channels: usize, options: Option<&Variant>) -> Result<Self> {
        Self::create(sample_rate, channels, OpusOptions::from_variant(options))
    }

    fn create(sample_rate: u32, channels: usize, options: OpusOptions) -> Result<Self> {
        if channels != 1 && channels != 2 {
            return Err(Error::Invalid(format!("channels must be 1 or 2: {}", channels)));
        }

        if Application::from_raw(options.application).is_none() {
            return Err(invalid_param_error!(options.application));
        }

        let mut error = 0;
        let opus_encoder = unsafe { opus_sys::opus_encoder_create(sample_rate as opus_sys::opus_int32, channels as c_int, options.application, &mut error) };
        if opus_encoder.is_null() || error != opus_sys::OPUS_OK {
            return Err(Error::CreationFailed(opus_error_string(error)));
        }

        let mut encoder = Encoder {
            encoder: opus_encoder,
            channels,
            options,
        };

        encoder.update_options()?;

        debug!("created opus encoder: {} Hz, {} channel(s)", sample_rate, channels);

        Ok(encoder)
    }

    pub fn set_option(&mut self, key: &str, value: &Variant) -> Result<()> {
        let value = match value {
            Variant::Bool(value) => *value as i32,
            _ => value.get_int32().ok_or_else(|| invalid_param_error!(key))?,
        };

        match key {
            "bit_rate" => {
                self.options.bit_rate = Some(value);
                self.encoder_ctl(opus_sys::OPUS_SET_BITRATE_REQUEST, value)
            }
            "packet_loss" => {
                self.options.packet_loss = value;
                self.encoder_ctl(opus_sys::OPUS_SET_PACKET_LOSS_PERC_REQUEST, value)
            }
            "fec" => {
                self.options.fec = value != 0;
                self.encoder_ctl(opus_sys::OPUS_SET_INBAND_FEC_REQUEST, value)
            }
            "dtx" => {
                self.options.dtx = value != 0;
                self.encoder_ctl(opus_sys::OPUS_SET_DTX_REQUEST, value)
            }
            "vbr" => {
                self.options.vbr = value as u32;
                self.encoder_ctl(opus_sys::OPUS_SET_VBR_REQUEST, (value > 0) as i32)?;
                self.encoder_ctl(opus_sys::OPUS_SET_VBR_CONSTRAINT_REQUEST, (value == 2) as i32)
            }
            "max_bandwidth" => {
                self.options.max_bandwidth = value as u32;
                self.encoder_ctl(opus_sys::OPUS_SET_MAX_BANDWIDTH_REQUEST, value)
            }
            "complexity" => {
                self.options.complexity = value as u32;
                self.encoder_ctl(opus_sys::OPUS_SET_COMPLEXITY_REQUEST, value)
            }
            _ => Err(unsupported_error!(key)),
        }
    }

    fn update_options(&mut self) -> Result<()> {
        self.encoder_ctl(opus_sys::OPUS_SET_VBR_REQUEST, (self.options.vbr > 0) as i32)?;
        self.encoder_ctl(opus_sys::OPUS_SET_VBR_CONSTRAINT_REQUEST, (self.options.vbr == 2) as i32)?;
        self.encoder_ctl(opus_sys::OPUS_SET_PACKET_LOSS_PERC_REQUEST, self.options.packet_loss)?;
        self.encoder_ctl(opus_sys::OPUS_SET_INBAND_FEC_REQUEST, self.options.fec as i32)?;
        self.encoder_ctl(opus_sys::OPUS_SET_DTX_REQUEST, self.options.dtx as i32)?;

        if let Some(bit_rate) = self.options.bit_rate {
            self.encoder_ctl(opus_sys::OPUS_SET_BITRATE_REQUEST, bit_rate)?;
        }

        if self.options.complexity > 0 {
            self.encoder_ctl(opus_sys::OPUS_SET_COMPLEXITY_REQUEST, self.options.complexity.min(10) as i32)?;
        }

        if self.options.max_bandwidth > 0 {
            self.encoder_ctl(opus_sys::OPUS_SET_MAX_BANDWIDTH_REQUEST, self.options.max_bandwidth as i32)?;
        }

        Ok(())
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn application(&self) -> Application {
        Application::from_raw(self.options.application).unwrap_or(Application::Audio)
    }

    /// Sample rate the encoder was created with, as reported by libopus.
    pub fn sample_rate(&mut self) -> Result<u32> {
        self.encoder_get(opus_sys::OPUS_GET_SAMPLE_RATE_REQUEST).map(|rate| rate as u32)
    }

    /// Samples per channel the encoder delays its input by. Ogg Opus writers use it
    /// as the pre-skip.
    pub fn lookahead(&mut self) -> Result<usize> {
        self.encoder_get(opus_sys::OPUS_GET_LOOKAHEAD_REQUEST).map(|lookahead| lookahead as usize)
    }

    pub fn set_bitrate(&mut self, bit_rate: i32) -> Result<()> {
        self.options.bit_rate = Some(bit_rate);
        self.encoder_ctl(opus_sys::OPUS_SET_BITRATE_REQUEST, bit_rate)
    }

    pub fn bitrate(&mut self) -> Result<i32> {
        self.encoder_get(opus_sys::OPUS_GET_BITRATE_REQUEST)
    }

    pub fn set_complexity(&mut self, complexity: u32) -> Result<()> {
        self.options.complexity = complexity;
        self.encoder_ctl(opus_sys::OPUS_SET_COMPLEXITY_REQUEST, complexity as i32)
    }

    pub fn complexity(&mut self) -> Result<u32> {
        self.encoder_get(opus_sys::OPUS_GET_COMPLEXITY_REQUEST).map(|complexity| complexity as u32)
    }

    /// Discontinuous transmission: silence is sent as tiny packets.
    pub fn set_dtx(&mut self, dtx: bool) -> Result<()> {
        self.options.dtx = dtx;
        self.encoder_ctl(opus_sys::OPUS_SET_DTX_REQUEST, dtx as i32)
    }

    pub fn dtx(&mut self) -> Result<bool> {
        self.encoder_get(opus_sys::OPUS_GET_DTX_REQUEST).map(|dtx| dtx != 0)
    }

    /// Whether the last encoded frame was a DTX frame.
    pub fn in_dtx(&mut self) -> Result<bool> {
        self.encoder_get(opus_sys::OPUS_GET_IN_DTX_REQUEST).map(|in_dtx| in_dtx != 0)
    }

    pub fn set_inband_fec(&mut self, fec: bool) -> Result<()> {
        self.options.fec = fec;
        self.encoder_ctl(opus_sys::OPUS_SET_INBAND_FEC_REQUEST, fec as i32)
    }

    pub fn inband_fec(&mut self) -> Result<bool> {
        self.encoder_get(opus_sys::OPUS_GET_INBAND_FEC_REQUEST).map(|fec| fec != 0)
    }

    pub fn set_packet_loss_perc(&mut self, percent: i32) -> Result<()> {
        self.options.packet_loss = percent;
        self.encoder_ctl(opus_sys::OPUS_SET_PACKET_LOSS_PERC_REQUEST, percent)
    }

    pub fn packet_loss_perc(&mut self) -> Result<i32> {
        self.encoder_get(opus_sys::OPUS_GET_PACKET_LOSS_PERC_REQUEST)
    }

    pub fn set_max_bandwidth(&mut self, bandwidth: Bandwidth) -> Result<()> {
        self.options.max_bandwidth = bandwidth as u32;
        self.encoder_ctl(opus_sys::OPUS_SET_MAX_BANDWIDTH_REQUEST, bandwidth as i32)
    }

    pub fn max_bandwidth(&mut self) -> Result<Bandwidth> {
        let value = self.encoder_get(opus_sys::OPUS_GET_MAX_BANDWIDTH_REQUEST)?;
        Bandwidth::from_raw(value).ok_or_else(|| Error::Failed(format!("unknown bandwidth: {}", value)))
    }

    pub fn reset(&mut self) -> Result<()> {
        let ret = unsafe { opus_sys::opus_encoder_ctl(self.encoder, opus_sys::OPUS_RESET_STATE) };
        if ret != opus_sys::OPUS_OK {
            return Err(opus_failed(ret));
        }

        Ok(())
    }

    /// Encodes one frame of interleaved samples into `data` and returns the packet
    /// length. The frame must last 2.5, 5, 10, 20, 40, 60, 80, 100 or 120 ms.
    pub fn encode(&mut self, pcm: &[i16], data: &mut [u8]) -> Result<usize> {
        self.encode_frame(pcm, data)
    }

    pub fn encode_float(&mut self, pcm: &[f32], data: &mut [u8]) -> Result<usize> {
        self.encode_frame(pcm, data)
    }

    pub fn encode_to_vec(&mut self, pcm: &[i16]) -> Result<Vec<u8>> {
        let mut data = vec![0u8; MAX_PACKET_SIZE];
        let len = self.encode_frame(pcm, &mut data)?;
        data.truncate(len);
        Ok(data)
    }

    pub fn encode_float_to_vec(&mut self, pcm: &[f32]) -> Result<Vec<u8>> {
        let mut data = vec![0u8; MAX_PACKET_SIZE];
        let len = self.encode_frame(pcm, &mut data)?;
        data.truncate(len);
        Ok(data)
    }

    fn encode_frame<S: EncodeSample>(&mut self, pcm: &[S], data: &mut [u8]) -> Result<usize> {
        if pcm.is_empty() {
            return Err(Error::Invalid("no data supplied".to_string()));
        }

        if pcm.len() % self.channels != 0 {
            return Err(Error::Invalid(format!("{} samples do not split into {} channel(s)", pcm.len(), self.channels)));
        }

        if data.is_empty() {
            return Err(Error::Invalid("packet buffer is empty".to_string()));
        }

        let frame_size = (pcm.len() / self.channels).min(c_int::MAX as usize) as c_int;
        let max_bytes = data.len().min(opus_sys::opus_int32::MAX as usize) as opus_sys::opus_int32;
        let ret = unsafe { S::encode(self.encoder, pcm.as_ptr(), frame_size, data.as_mut_ptr(), max_bytes) };

        if ret < 0 {
            return Err(opus_failed(ret));
        }

        Ok(ret as usize)
    }

    fn encoder_ctl(&mut self, key: i32, value: i32) -> Result<()> {
        let ret = unsafe { opus_sys::opus_encoder_ctl(self.encoder, key, value) };

        if ret != opus_sys::OPUS_OK {
            return Err(Error::SetFailed(opus_error_string(ret)));
        }

        Ok(())
    }

    fn encoder_get(&mut self, key: i32) -> Result<i32> {
        let mut value: opus_sys::opus_int32 = 0;
        let ret = unsafe { opus_sys::opus_encoder_ctl(self.encoder, key, &mut value as *mut opus_sys::opus_int32) };

        if ret != opus_sys::OPUS_OK {
            return Err(opus_failed(ret));
        }

        Ok(value)
    }
}
