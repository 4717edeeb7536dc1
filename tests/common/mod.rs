#![allow(dead_code)]

use std::f64::consts::PI;

use media_opusfile::{Application, Encoder};

pub const SAMPLE_RATE: u32 = 48000;
pub const FRAME_SIZE: usize = 960;
pub const VENDOR: &str = "media-opusfile tests";

const PAGE_HEADER_SIGNATURE: &[u8] = b"OggS";
const PAGE_HEADER_SIZE: usize = 27;
const PAGE_HEADER_TYPE_FRESH: u8 = 0x00;
const PAGE_HEADER_TYPE_BOS: u8 = 0x02;
const PAGE_HEADER_TYPE_EOS: u8 = 0x04;
const SERIAL_NO: u32 = 0x6f707573;

pub struct Encoded {
    pub data: Vec<u8>,
    pub channels: usize,
    pub frames: usize,
    pub pre_skip: usize,
}

impl Encoded {
    /// Samples per channel libopusfile should hand back for this stream.
    pub fn expected_samples(&self) -> usize {
        self.frames * FRAME_SIZE - self.pre_skip
    }
}

pub fn sine(frames: usize, channels: usize, freq: f64) -> Vec<i16> {
    let factor = 2.0 * PI * freq / SAMPLE_RATE as f64;
    (0..frames * FRAME_SIZE)
        .flat_map(|i| {
            let sample = ((i as f64 * factor).sin() * 0.5 * i16::MAX as f64) as i16;
            std::iter::repeat(sample).take(channels)
        })
        .collect()
}

/// Encodes `frames` 20ms frames of a sine tone into a complete Ogg Opus file.
pub fn ogg_opus(frames: usize, channels: usize, comments: &[&str]) -> Encoded {
    let mut encoder = Encoder::new(SAMPLE_RATE, channels, Application::Audio).unwrap();
    let pre_skip = encoder.lookahead().unwrap();
    let pcm = sine(frames, channels, 440.0);

    let mut writer = OggWriter::new(channels, pre_skip, comments);
    for (i, frame) in pcm.chunks(FRAME_SIZE * channels).enumerate() {
        let packet = encoder.encode_to_vec(frame).unwrap();
        writer.write_packet(&packet, FRAME_SIZE as u64, i + 1 == frames);
    }

    Encoded {
        data: writer.finish(),
        channels,
        frames,
        pre_skip,
    }
}

struct OggWriter {
    data: Vec<u8>,
    checksum_table: [u32; 256],
    page_index: u32,
    granule: u64,
}

impl OggWriter {
    fn new(channels: usize, pre_skip: usize, comments: &[&str]) -> Self {
        let mut writer = OggWriter {
            data: Vec::new(),
            checksum_table: generate_checksum_table(),
            page_index: 0,
            granule: 0,
        };

        let mut id_header = Vec::with_capacity(19);
        id_header.extend_from_slice(b"OpusHead");
        id_header.push(1);
        id_header.push(channels as u8);
        id_header.extend_from_slice(&(pre_skip as u16).to_le_bytes());
        id_header.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
        id_header.extend_from_slice(&0i16.to_le_bytes());
        id_header.push(0);
        writer.write_page(&id_header, PAGE_HEADER_TYPE_BOS);

        let mut comment_header = Vec::new();
        comment_header.extend_from_slice(b"OpusTags");
        comment_header.extend_from_slice(&(VENDOR.len() as u32).to_le_bytes());
        comment_header.extend_from_slice(VENDOR.as_bytes());
        comment_header.extend_from_slice(&(comments.len() as u32).to_le_bytes());
        for comment in comments {
            comment_header.extend_from_slice(&(comment.len() as u32).to_le_bytes());
            comment_header.extend_from_slice(comment.as_bytes());
        }
        writer.write_page(&comment_header, PAGE_HEADER_TYPE_FRESH);

        writer
    }

    fn write_packet(&mut self, packet: &[u8], duration: u64, last: bool) {
        self.granule += duration;
        let header_type = if last {
            PAGE_HEADER_TYPE_EOS
        } else {
            PAGE_HEADER_TYPE_FRESH
        };
        self.write_page(packet, header_type);
    }

    fn write_page(&mut self, payload: &[u8], header_type: u8) {
        let n_segments = payload.len() / 255 + 1;
        assert!(n_segments <= 255, "packet too large for a single page");

        let start = self.data.len();
        self.data.extend_from_slice(PAGE_HEADER_SIGNATURE);
        self.data.push(0);
        self.data.push(header_type);
        self.data.extend_from_slice(&self.granule.to_le_bytes());
        self.data.extend_from_slice(&SERIAL_NO.to_le_bytes());
        self.data.extend_from_slice(&self.page_index.to_le_bytes());
        self.data.extend_from_slice(&[0; 4]);
        self.data.push(n_segments as u8);
        self.data.extend(std::iter::repeat(255).take(n_segments - 1));
        self.data.push((payload.len() % 255) as u8);
        debug_assert_eq!(self.data.len() - start, PAGE_HEADER_SIZE + n_segments);
        self.data.extend_from_slice(payload);

        let mut checksum: u32 = 0;
        for &b in &self.data[start..] {
            checksum = (checksum << 8) ^ self.checksum_table[((checksum >> 24) as u8 ^ b) as usize];
        }
        self.data[start + 22..start + 26].copy_from_slice(&checksum.to_le_bytes());

        self.page_index += 1;
    }

    fn finish(self) -> Vec<u8> {
        self.data
    }
}

fn generate_checksum_table() -> [u32; 256] {
    const POLY: u32 = 0x04c11db7;

    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut r = (i as u32) << 24;
        for _ in 0..8 {
            r = if r & 0x80000000 != 0 {
                (r << 1) ^ POLY
            } else {
                r << 1
            };
        }
        *entry = r;
    }
    table
}
