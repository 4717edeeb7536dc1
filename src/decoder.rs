use std::{os::raw::c_int, ptr};

use log::debug;
use media_core::{error::Error, invalid_param_error, unsupported_error, variant::Variant, Result};

use crate::{error::opus_failed, opus_error_string, opus_sys, MAX_FRAME_DURATION_MS};

trait DecodeSample: Copy {
    unsafe fn decode(decoder: *mut opus_sys::OpusDecoder, data: *const u8, len: opus_sys::opus_int32, pcm: *mut Self, frame_size: c_int, fec: c_int) -> c_int;
}

impl DecodeSample for i16 {
    unsafe fn decode(decoder: *mut opus_sys::OpusDecoder, data: *const u8, len: opus_sys::opus_int32, pcm: *mut Self, frame_size: c_int, fec: c_int) -> c_int {
        opus_sys::opus_decode(decoder, data, len, pcm, frame_size, fec)
    }
}

impl DecodeSample for f32 {
    unsafe fn decode(decoder: *mut opus_sys::OpusDecoder, data: *const u8, len: opus_sys::opus_int32, pcm: *mut Self, frame_size: c_int, fec: c_int) -> c_int {
        opus_sys::opus_decode_float(decoder, data, len, pcm, frame_size, fec)
    }
}

/// Decodes individual Opus packets.
pub struct Decoder {
    decoder: *mut opus_sys::OpusDecoder,
    sample_rate: u32,
    channels: usize,
    packet_loss: bool,
    fec: bool,
}

unsafe impl Send for Decoder {}
unsafe impl Sync for Decoder {}

impl Drop for Decoder {
    fn drop(&mut self) {
        unsafe { opus_sys::opus_decoder_destroy(self.decoder) }
    }
}

impl Decoder {
    /// Creates a decoder producing `channels` interleaved channels at `sample_rate`,
    /// which must be one of 8000, 12000, 16000, 24000 or 48000.
    pub fn new(sample_rate: u32, channels: usize) -> Result<Self> {
        if channels != 1 && channels != 2 {
            return Err(Error::Invalid(format!("channels must be 1 or 2: {}", channels)));
        }

        let mut ret = 0;
        let decoder = unsafe { opus_sys::opus_decoder_create(sample_rate as opus_sys::opus_int32, channels as c_int, &mut ret) };
        if decoder.is_null() || ret != opus_sys::OPUS_OK {
            return Err(Error::CreationFailed(opus_error_string(ret)));
        }

        debug!("created opus decoder: {} Hz, {} channel(s)", sample_rate, channels);

        Ok(Decoder {
            decoder,
            sample_rate,
            channels,
            packet_loss: false,
            fec: false,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel in the longest possible packet.
    pub fn max_frame_samples(&self) -> usize {
        (self.sample_rate * MAX_FRAME_DURATION_MS / 1000) as usize
    }

    pub fn set_option(&mut self, key: &str, value: &Variant) -> Result<()> {
        let value = match value {
            Variant::Bool(value) => *value as i32,
            _ => value.get_int32().ok_or_else(|| invalid_param_error!(key))?,
        };

        match key {
            "gain" => self.set_gain(value),
            "packet_loss" => {
                self.packet_loss = value != 0;
                Ok(())
            }
            "fec" => {
                self.fec = value != 0;
                Ok(())
            }
            _ => Err(unsupported_error!(key)),
        }
    }

    /// Marks the packet preceding the next one as lost.
    pub fn set_packet_loss(&mut self, lost: bool) {
        self.packet_loss = lost;
    }

    /// Output gain in Q8 dB.
    pub fn set_gain(&mut self, gain: i32) -> Result<()> {
        self.decoder_ctl(opus_sys::OPUS_SET_GAIN_REQUEST, gain)
    }

    pub fn gain(&mut self) -> Result<i32> {
        self.decoder_get(opus_sys::OPUS_GET_GAIN_REQUEST)
    }

    /// Duration in samples per channel of the last decoded or concealed packet.
    pub fn last_packet_duration(&mut self) -> Result<usize> {
        self.decoder_get(opus_sys::OPUS_GET_LAST_PACKET_DURATION_REQUEST).map(|duration| duration as usize)
    }

    pub fn reset(&mut self) -> Result<()> {
        let ret = unsafe { opus_sys::opus_decoder_ctl(self.decoder, opus_sys::OPUS_RESET_STATE) };
        if ret != opus_sys::OPUS_OK {
            return Err(opus_failed(ret));
        }

        self.packet_loss = false;

        Ok(())
    }

    /// Decodes one packet into `pcm` and returns the number of samples per channel.
    ///
    /// When both the `fec` option and the packet loss flag are set, the lost
    /// packet is first recovered from `data` and written ahead of it.
    pub fn decode(&mut self, data: &[u8], pcm: &mut [i16]) -> Result<usize> {
        self.decode_packet(data, pcm)
    }

    pub fn decode_float(&mut self, data: &[u8], pcm: &mut [f32]) -> Result<usize> {
        self.decode_packet(data, pcm)
    }

    /// Recovers the packet lost before `data` using its in-band FEC data.
    pub fn decode_fec(&mut self, data: &[u8], pcm: &mut [i16]) -> Result<usize> {
        self.recover(data, pcm)
    }

    pub fn decode_fec_float(&mut self, data: &[u8], pcm: &mut [f32]) -> Result<usize> {
        self.recover(data, pcm)
    }

    /// Conceals a lost packet, filling `pcm` entirely.
    pub fn decode_plc(&mut self, pcm: &mut [i16]) -> Result<usize> {
        let frame_size = self.frame_capacity(pcm)?;
        self.decode_raw(None, pcm, frame_size, false)
    }

    pub fn decode_plc_float(&mut self, pcm: &mut [f32]) -> Result<usize> {
        let frame_size = self.frame_capacity(pcm)?;
        self.decode_raw(None, pcm, frame_size, false)
    }

    fn decode_packet<S: DecodeSample>(&mut self, data: &[u8], pcm: &mut [S]) -> Result<usize> {
        if data.is_empty() {
            return Err(Error::Invalid("no data supplied".to_string()));
        }

        let mut offset = 0;
        if self.fec && self.packet_loss {
            offset = self.recover(data, pcm)? * self.channels;
        }

        let frame_size = self.frame_capacity(&pcm[offset..])?;
        let samples = self.decode_raw(Some(data), &mut pcm[offset..], frame_size, false)?;

        // the loss stays flagged until the packet after it is decoded as well
        self.packet_loss = false;

        Ok(offset / self.channels + samples)
    }

    fn recover<S: DecodeSample>(&mut self, data: &[u8], pcm: &mut [S]) -> Result<usize> {
        if data.is_empty() {
            return Err(Error::Invalid("no data supplied".to_string()));
        }

        let frame_size = unsafe { opus_sys::opus_packet_get_samples_per_frame(data.as_ptr(), self.sample_rate as opus_sys::opus_int32) };
        if frame_size as usize * self.channels > pcm.len() {
            return Err(Error::Invalid("pcm buffer too small".to_string()));
        }

        self.decode_raw(Some(data), pcm, frame_size, true)
    }

    fn frame_capacity<S>(&self, pcm: &[S]) -> Result<c_int> {
        let frame_size = (pcm.len() / self.channels).min(c_int::MAX as usize);
        if frame_size == 0 {
            return Err(Error::Invalid("pcm buffer too small".to_string()));
        }

        Ok(frame_size as c_int)
    }

    fn decode_raw<S: DecodeSample>(&mut self, data: Option<&[u8]>, pcm: &mut [S], frame_size: c_int, fec: bool) -> Result<usize> {
        let (data, len) = match data {
            Some(data) => (data.as_ptr(), data.len().min(opus_sys::opus_int32::MAX as usize) as opus_sys::opus_int32),
            None => (ptr::null(), 0),
        };

        let ret = unsafe { S::decode(self.decoder, data, len, pcm.as_mut_ptr(), frame_size, fec as c_int) };
        if ret < 0 {
            return Err(opus_failed(ret));
        }

        Ok(ret as usize)
    }

    fn decoder_ctl(&mut self, key: i32, value: i32) -> Result<()> {
        let ret = unsafe { opus_sys::opus_decoder_ctl(self.decoder, key, value) };

        if ret != opus_sys::OPUS_OK {
            return Err(Error::SetFailed(opus_error_string(ret)));
        }

        Ok(())
    }

    fn decoder_get(&mut self, key: i32) -> Result<i32> {
        let mut value: opus_sys::opus_int32 = 0;
        let ret = unsafe { opus_sys::opus_decoder_ctl(self.decoder, key, &mut value as *mut opus_sys::opus_int32) };

        if ret != opus_sys::OPUS_OK {
            return Err(opus_failed(ret));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create() {
        let decoder = Decoder::new(48000, 1).unwrap();
        assert_eq!(decoder.sample_rate(), 48000);
        assert_eq!(decoder.channels(), 1);
        assert_eq!(decoder.max_frame_samples(), 5760);

        assert!(Decoder::new(12345, 1).is_err());
        assert!(matches!(Decoder::new(48000, 3), Err(Error::Invalid(_))));
    }

    #[test]
    fn empty_packet_is_rejected() {
        let mut decoder = Decoder::new(48000, 1).unwrap();
        let mut pcm = vec![0i16; decoder.max_frame_samples()];
        assert!(matches!(decoder.decode(&[], &mut pcm), Err(Error::Invalid(_))));

        let mut pcm = vec![0f32; decoder.max_frame_samples()];
        assert!(matches!(decoder.decode_float(&[], &mut pcm), Err(Error::Invalid(_))));
    }

    #[test]
    fn empty_pcm_is_rejected() {
        let mut decoder = Decoder::new(48000, 2).unwrap();
        let mut pcm = [0i16; 1];
        assert!(decoder.decode_plc(&mut pcm).is_err());
    }

    #[test]
    fn concealment_fills_requested_frame() {
        let mut decoder = Decoder::new(16000, 1).unwrap();
        let mut pcm = vec![0i16; 320];
        assert_eq!(decoder.decode_plc(&mut pcm).unwrap(), 320);
        assert_eq!(decoder.last_packet_duration().unwrap(), 320);
    }

    #[test]
    fn gain_round_trips() {
        let mut decoder = Decoder::new(48000, 2).unwrap();
        assert_eq!(decoder.gain().unwrap(), 0);
        decoder.set_gain(256).unwrap();
        assert_eq!(decoder.gain().unwrap(), 256);
        decoder.set_option("gain", &Variant::Bool(false)).unwrap();
        assert_eq!(decoder.gain().unwrap(), 0);
        assert!(decoder.set_option("volume", &Variant::Bool(true)).is_err());
        decoder.reset().unwrap();
    }

    #[cfg(feature = "encoder")]
    fn fec_packets(count: usize) -> Vec<Vec<u8>> {
        use crate::{Application, Encoder};

        let mut encoder = Encoder::new(48000, 1, Application::VoIP).unwrap();
        encoder.set_bitrate(32000).unwrap();
        encoder.set_inband_fec(true).unwrap();
        encoder.set_packet_loss_perc(20).unwrap();

        (0..count)
            .map(|i| {
                let pcm: Vec<i16> = (0..960).map(|j| (((i * 960 + j) as f64 * 0.0576).sin() * 8000.0) as i16).collect();
                encoder.encode_to_vec(&pcm).unwrap()
            })
            .collect()
    }

    #[cfg(feature = "encoder")]
    #[test]
    fn lost_packet_is_recovered_ahead_of_next() {
        let packets = fec_packets(6);
        let mut decoder = Decoder::new(48000, 1).unwrap();
        let mut pcm = vec![0i16; decoder.max_frame_samples()];
        for packet in &packets[..4] {
            assert_eq!(decoder.decode(packet, &mut pcm).unwrap(), 960);
        }

        decoder.set_option("fec", &Variant::Bool(true)).unwrap();
        decoder.set_packet_loss(true);
        assert_eq!(decoder.decode(&packets[5], &mut pcm).unwrap(), 2 * 960);

        // the flag is consumed by the recovery
        assert_eq!(decoder.decode(&packets[5], &mut pcm).unwrap(), 960);
    }

    #[cfg(feature = "encoder")]
    #[test]
    fn loss_survives_failed_decode() {
        let packets = fec_packets(3);
        let mut decoder = Decoder::new(48000, 1).unwrap();
        decoder.set_option("fec", &Variant::Bool(true)).unwrap();
        let mut pcm = vec![0i16; decoder.max_frame_samples()];
        assert_eq!(decoder.decode(&packets[0], &mut pcm).unwrap(), 960);

        decoder.set_packet_loss(true);
        let mut short = vec![0i16; 960];
        assert!(matches!(decoder.decode(&packets[2], &mut short), Err(Error::Invalid(_))));
        assert_eq!(decoder.decode(&packets[2], &mut pcm).unwrap(), 2 * 960);
    }

    #[cfg(feature = "encoder")]
    #[test]
    fn fec_decodes_one_frame() {
        let packets = fec_packets(3);
        let mut decoder = Decoder::new(48000, 1).unwrap();
        let mut pcm = vec![0i16; decoder.max_frame_samples()];
        assert_eq!(decoder.decode(&packets[0], &mut pcm).unwrap(), 960);
        assert_eq!(decoder.decode_fec(&packets[2], &mut pcm).unwrap(), 960);

        let mut pcm = vec![0f32; 960];
        assert_eq!(decoder.decode_fec_float(&packets[2], &mut pcm).unwrap(), 960);

        let mut short = vec![0i16; 480];
        assert!(matches!(decoder.decode_fec(&packets[2], &mut short), Err(Error::Invalid(_))));
        assert!(matches!(decoder.decode_fec(&[], &mut short), Err(Error::Invalid(_))));
    }
}
