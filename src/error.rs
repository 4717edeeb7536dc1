#[cfg(any(feature = "decoder", feature = "encoder"))]
pub(crate) fn opus_failed(code: i32) -> media_core::error::Error {
    media_core::error::Error::Failed(crate::opus_error_string(code))
}

#[cfg(feature = "stream")]
pub use self::stream_error::StreamError;
#[cfg(feature = "stream")]
pub(crate) use self::stream_error::stream_error_message;

#[cfg(feature = "stream")]
mod stream_error {
    use std::{fmt, io, os::raw::c_int};

    use crate::opus_sys;

    /// Error codes reported by libopusfile. Names follow the library's macros.
    #[repr(i32)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum StreamError {
        False        = opus_sys::OP_FALSE,
        Eof          = opus_sys::OP_EOF,
        Hole         = opus_sys::OP_HOLE,
        Read         = opus_sys::OP_EREAD,
        Fault        = opus_sys::OP_EFAULT,
        Impl         = opus_sys::OP_EIMPL,
        Inval        = opus_sys::OP_EINVAL,
        NotFormat    = opus_sys::OP_ENOTFORMAT,
        BadHeader    = opus_sys::OP_EBADHEADER,
        Version      = opus_sys::OP_EVERSION,
        NotAudio     = opus_sys::OP_ENOTAUDIO,
        BadPacket    = opus_sys::OP_EBADPACKET,
        BadLink      = opus_sys::OP_EBADLINK,
        NoSeek       = opus_sys::OP_ENOSEEK,
        BadTimestamp = opus_sys::OP_EBADTIMESTAMP,
    }

    const ALL: [StreamError; 15] = [
        StreamError::False,
        StreamError::Eof,
        StreamError::Hole,
        StreamError::Read,
        StreamError::Fault,
        StreamError::Impl,
        StreamError::Inval,
        StreamError::NotFormat,
        StreamError::BadHeader,
        StreamError::Version,
        StreamError::NotAudio,
        StreamError::BadPacket,
        StreamError::BadLink,
        StreamError::NoSeek,
        StreamError::BadTimestamp,
    ];

    impl StreamError {
        pub fn from_code(code: c_int) -> Option<Self> {
            ALL.iter().copied().find(|err| *err as c_int == code)
        }

        pub fn code(self) -> c_int {
            self as c_int
        }

        pub fn name(self) -> &'static str {
            match self {
                StreamError::False => "OP_FALSE",
                StreamError::Eof => "OP_EOF",
                StreamError::Hole => "OP_HOLE",
                StreamError::Read => "OP_EREAD",
                StreamError::Fault => "OP_EFAULT",
                StreamError::Impl => "OP_EIMPL",
                StreamError::Inval => "OP_EINVAL",
                StreamError::NotFormat => "OP_ENOTFORMAT",
                StreamError::BadHeader => "OP_EBADHEADER",
                StreamError::Version => "OP_EVERSION",
                StreamError::NotAudio => "OP_ENOTAUDIO",
                StreamError::BadPacket => "OP_EBADPACKET",
                StreamError::BadLink => "OP_EBADLINK",
                StreamError::NoSeek => "OP_ENOSEEK",
                StreamError::BadTimestamp => "OP_EBADTIMESTAMP",
            }
        }
    }

    impl fmt::Display for StreamError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name())
        }
    }

    impl std::error::Error for StreamError {}

    pub(crate) fn stream_error_message(code: c_int, io_error: Option<io::Error>) -> String {
        let code = match StreamError::from_code(code) {
            Some(err) => err.to_string(),
            None => format!("libopusfile error: {} (unknown code)", code),
        };

        match io_error {
            Some(io_error) => format!("opusfile: {}: {}", code, io_error),
            None => format!("opusfile: {}", code),
        }
    }
}
