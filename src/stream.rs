use std::{
    ffi::CStr,
    io::{self, Read},
    os::raw::c_int,
    ptr::{self, NonNull},
    slice,
};

use log::{debug, warn};
use media_core::{error::Error, Result};

use crate::{
    callback::{open_with_context, BoxedSource, ContextHandle, StreamSource},
    error::stream_error_message,
    opus_sys,
};

struct ReaderSource<R> {
    reader: R,
    error: Option<io::Error>,
}

impl<R: Read + Send> StreamSource for ReaderSource<R> {
    fn read_into(&mut self, buf: &mut [u8]) -> c_int {
        loop {
            match self.reader.read(buf) {
                Ok(n) => return n.min(buf.len()) as c_int,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!("opus stream reader failed: {}", err);
                    self.error = Some(err);
                    return -1;
                }
            }
        }
    }

    fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }
}

/// Information from the `OpusHead` packet of a link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Head {
    pub version: i32,
    pub channel_count: usize,
    pub pre_skip: u32,
    /// Sample rate of the original input, informational only. Output is always 48kHz.
    pub input_sample_rate: u32,
    /// Q7.8 gain in dB, already applied by the decoder.
    pub output_gain: i32,
    pub mapping_family: i32,
    pub stream_count: usize,
    pub coupled_count: usize,
}

/// Contents of the `OpusTags` packet of a link.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tags {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl Tags {
    /// Values of all `tag=value` comments matching `tag`, compared case-insensitively.
    pub fn get<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.comments.iter().filter_map(move |comment| {
            let (name, value) = comment.split_once('=')?;
            name.eq_ignore_ascii_case(tag).then_some(value)
        })
    }
}

trait StreamSample: Copy {
    unsafe fn read(file: *mut opus_sys::OggOpusFile, pcm: *mut Self, len: c_int) -> c_int;
    unsafe fn read_stereo(file: *mut opus_sys::OggOpusFile, pcm: *mut Self, len: c_int) -> c_int;
}

impl StreamSample for i16 {
    unsafe fn read(file: *mut opus_sys::OggOpusFile, pcm: *mut Self, len: c_int) -> c_int {
        opus_sys::op_read(file, pcm, len, ptr::null_mut())
    }

    unsafe fn read_stereo(file: *mut opus_sys::OggOpusFile, pcm: *mut Self, len: c_int) -> c_int {
        opus_sys::op_read_stereo(file, pcm, len)
    }
}

impl StreamSample for f32 {
    unsafe fn read(file: *mut opus_sys::OggOpusFile, pcm: *mut Self, len: c_int) -> c_int {
        opus_sys::op_read_float(file, pcm, len, ptr::null_mut())
    }

    unsafe fn read_stereo(file: *mut opus_sys::OggOpusFile, pcm: *mut Self, len: c_int) -> c_int {
        opus_sys::op_read_float_stereo(file, pcm, len)
    }
}

/// Decodes an Ogg Opus stream pulled from a reader.
///
/// Output is always 48kHz interleaved PCM. The reader is dropped together with
/// the stream.
pub struct Stream {
    file: NonNull<opus_sys::OggOpusFile>,
    source: *mut BoxedSource,
}

unsafe impl Send for Stream {}

impl Drop for Stream {
    fn drop(&mut self) {
        debug!("closing opus stream {:?}", ContextHandle::for_source(self.source));
        unsafe {
            opus_sys::op_free(self.file.as_ptr());
            drop(Box::from_raw(self.source));
        }
    }
}

impl Stream {
    /// Opens the stream and parses its headers. This reads from `reader` until
    /// the first audio data is found.
    pub fn new<R>(reader: R) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let source: BoxedSource = Box::new(ReaderSource {
            reader,
            error: None,
        });
        let source = Box::into_raw(Box::new(source));
        let handle = ContextHandle::for_source(source);

        match unsafe { open_with_context(handle) } {
            Ok(file) => {
                let stream = Stream {
                    file,
                    source,
                };
                debug!("opened opus stream {:?}: {} channel(s)", handle, stream.channel_count());
                Ok(stream)
            }
            Err(code) => {
                let mut source = unsafe { Box::from_raw(source) };
                Err(Error::CreationFailed(stream_error_message(code, source.take_error())))
            }
        }
    }

    fn failed(&mut self, code: c_int) -> Error {
        let io_error = unsafe { (*self.source).take_error() };
        Error::Failed(stream_error_message(code, io_error))
    }

    fn read_samples<S: StreamSample>(&mut self, pcm: &mut [S], stereo: bool) -> Result<usize> {
        if pcm.is_empty() {
            return Ok(0);
        }

        // libopusfile only hands out whole frames and would report 0 for a shorter buffer
        let channels = if stereo { 2 } else { self.channel_count() };
        if pcm.len() < channels {
            return Err(Error::Invalid(format!("pcm buffer too small for {} channel(s)", channels)));
        }

        let len = pcm.len().min(c_int::MAX as usize) as c_int;
        let ret = unsafe {
            if stereo {
                S::read_stereo(self.file.as_ptr(), pcm.as_mut_ptr(), len)
            } else {
                S::read(self.file.as_ptr(), pcm.as_mut_ptr(), len)
            }
        };

        if ret < 0 {
            return Err(self.failed(ret));
        }

        Ok(ret as usize)
    }

    /// Decodes interleaved 16-bit samples into `pcm`.
    ///
    /// Returns the number of samples per channel, so a stereo stream fills twice
    /// as many values as returned. `Ok(0)` marks the end of the stream. A buffer
    /// holding at least one value per channel never yields `Ok(0)` before that,
    /// and a non-empty buffer holding less is rejected.
    pub fn read(&mut self, pcm: &mut [i16]) -> Result<usize> {
        self.read_samples(pcm, false)
    }

    pub fn read_float(&mut self, pcm: &mut [f32]) -> Result<usize> {
        self.read_samples(pcm, false)
    }

    /// Like [`Stream::read`], but always produces two interleaved channels.
    pub fn read_stereo(&mut self, pcm: &mut [i16]) -> Result<usize> {
        self.read_samples(pcm, true)
    }

    pub fn read_float_stereo(&mut self, pcm: &mut [f32]) -> Result<usize> {
        self.read_samples(pcm, true)
    }

    /// Channel count of the link currently being decoded.
    pub fn channel_count(&self) -> usize {
        unsafe { opus_sys::op_channel_count(self.file.as_ptr(), -1) as usize }
    }

    pub fn link_count(&self) -> usize {
        unsafe { opus_sys::op_link_count(self.file.as_ptr()) as usize }
    }

    pub fn current_link(&self) -> Result<usize> {
        let ret = unsafe { opus_sys::op_current_link(self.file.as_ptr()) };
        if ret < 0 {
            return Err(Error::Failed(stream_error_message(ret, None)));
        }

        Ok(ret as usize)
    }

    /// PCM offset (at 48kHz, per channel) of the next sample to be read.
    pub fn position(&self) -> Result<u64> {
        let ret = unsafe { opus_sys::op_pcm_tell(self.file.as_ptr()) };
        if ret < 0 {
            return Err(Error::Failed(stream_error_message(ret as c_int, None)));
        }

        Ok(ret as u64)
    }

    /// Bitrate over the data decoded since the previous call, or `None` if
    /// nothing was decoded in between.
    pub fn bitrate_instant(&mut self) -> Result<Option<u32>> {
        let ret = unsafe { opus_sys::op_bitrate_instant(self.file.as_ptr()) };
        match ret {
            opus_sys::OP_FALSE => Ok(None),
            ret if ret < 0 => Err(Error::Failed(stream_error_message(ret, None))),
            ret => Ok(Some(ret as u32)),
        }
    }

    /// Header of `link`, or of the current link when `None`. Unseekable streams
    /// only expose the link being decoded.
    pub fn head(&self, link: Option<usize>) -> Option<Head> {
        let head = unsafe { opus_sys::op_head(self.file.as_ptr(), link_index(link)).as_ref()? };

        Some(Head {
            version: head.version,
            channel_count: head.channel_count as usize,
            pre_skip: head.pre_skip,
            input_sample_rate: head.input_sample_rate,
            output_gain: head.output_gain,
            mapping_family: head.mapping_family,
            stream_count: head.stream_count as usize,
            coupled_count: head.coupled_count as usize,
        })
    }

    /// Comment header of `link`, or of the current link when `None`.
    pub fn tags(&self, link: Option<usize>) -> Option<Tags> {
        let tags = unsafe { opus_sys::op_tags(self.file.as_ptr(), link_index(link)).as_ref()? };

        let vendor = if tags.vendor.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(tags.vendor).to_string_lossy().into_owned() }
        };

        let count = tags.comments.max(0) as usize;
        let comments = if count == 0 || tags.user_comments.is_null() || tags.comment_lengths.is_null() {
            Vec::new()
        } else {
            let (user_comments, lengths) = unsafe { (slice::from_raw_parts(tags.user_comments, count), slice::from_raw_parts(tags.comment_lengths, count)) };
            user_comments
                .iter()
                .zip(lengths)
                .filter(|(comment, _)| !comment.is_null())
                .map(|(comment, len)| {
                    let bytes = unsafe { slice::from_raw_parts(comment.cast::<u8>(), (*len).max(0) as usize) };
                    String::from_utf8_lossy(bytes).into_owned()
                })
                .collect()
        };

        Some(Tags {
            vendor,
            comments,
        })
    }
}

fn link_index(link: Option<usize>) -> c_int {
    link.map_or(-1, |link| link.min(c_int::MAX as usize) as c_int)
}
