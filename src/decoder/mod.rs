//! Decoder module for VobPlayer
//!
//! This module owns everything between the container file and the two
//! consumers: the bounded video frame queue, the section-driven decode loop
//! and the FFmpeg-backed media source behind the [`MediaSource`] trait.

pub mod decode_loop;
mod ffmpeg_source;
mod frame_queue;

pub use decode_loop::{DecodeLoop, DecoderEvent};
pub use ffmpeg_source::FfmpegSource;
pub use frame_queue::{FrameQueue, QueueGuard};

use crate::utils::error::Result;

/// Container time base, one tick is `num / den` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Milliseconds per tick
    pub fn ms_per_tick(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        1000.0 * self.num as f64 / self.den as f64
    }
}

impl Default for TimeBase {
    /// MPEG program streams tick at 90 kHz
    fn default() -> Self {
        Self::new(1, 90_000)
    }
}

/// One plane of a planar image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plane {
    /// Pixel rows, `stride` bytes apart
    pub data: Vec<u8>,

    /// Bytes per row including padding
    pub stride: usize,

    /// Visible width of this plane in pixels
    pub width: u32,

    /// Visible height of this plane in rows
    pub height: u32,
}

/// A decoded YUV 4:2:0 picture
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Y, U and V planes in that order
    pub planes: [Plane; 3],

    /// Luma width in pixels
    pub width: u32,

    /// Luma height in pixels
    pub height: u32,

    /// Presentation timestamp in container time-base ticks
    pub pts: i64,

    /// Section generation the frame was decoded in
    pub epoch: u64,
}

impl Frame {
    /// Total bytes held by the three planes
    pub fn byte_len(&self) -> usize {
        self.planes.iter().map(|p| p.data.len()).sum()
    }
}

/// Interleaved 16-bit stereo PCM at the output rate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PcmBuffer {
    pub samples: Vec<i16>,

    /// Sample frames, one per channel group
    pub frames: usize,
}

/// Which decoder a packet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Audio,
    Video,
    /// Subtitles, navigation and anything else the player ignores
    Other,
}

/// Demuxer bookkeeping for one compressed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInfo {
    pub stream: StreamKind,

    /// Compressed payload size, used to track the byte position
    pub size: usize,
}

/// Demux and decode backend for one open container
///
/// A source is created on the decoder thread and stays there; codec state
/// lives across sections and only the byte position changes.
pub trait MediaSource {
    /// Compressed packet handed back to the decode calls
    type Packet;

    /// Time base of the video stream's timestamps
    fn video_time_base(&self) -> TimeBase;

    /// Reposition the demuxer at a byte offset
    fn seek_to_byte(&mut self, offset: u64) -> Result<()>;

    /// Drop frames buffered inside the codecs
    fn flush(&mut self);

    /// Next packet, or `None` at end of file
    fn read_packet(&mut self) -> Result<Option<(PacketInfo, Self::Packet)>>;

    /// Decode and resample an audio packet into `out`
    fn decode_audio(&mut self, packet: &Self::Packet, out: &mut Vec<PcmBuffer>) -> Result<()>;

    /// Decode a video packet into `out`
    fn decode_video(&mut self, packet: &Self::Packet, out: &mut Vec<Frame>) -> Result<()>;

    /// Signal end of stream and collect the frames the codecs still hold
    ///
    /// Called once the file has ended. The next [`MediaSource::flush`] makes
    /// the codecs usable again.
    fn drain_decoders(&mut self, audio: &mut Vec<PcmBuffer>, video: &mut Vec<Frame>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_base_conversion() {
        let tb = TimeBase::default();
        assert_eq!(tb, TimeBase::new(1, 90_000));
        assert!((tb.ms_per_tick() * 90_000.0 - 1000.0).abs() < 1e-9);
        assert_eq!(TimeBase::new(1, 0).ms_per_tick(), 0.0);
    }

    #[test]
    fn test_frame_byte_len() {
        let plane = |len: usize| Plane { data: vec![0; len], stride: 4, width: 4, height: 1 };
        let frame = Frame {
            planes: [plane(16), plane(4), plane(4)],
            width: 4,
            height: 4,
            pts: 0,
            epoch: 0,
        };
        assert_eq!(frame.byte_len(), 24);
    }
}
