//! Test doubles for the pipeline seams
//!
//! A scripted [`MediaSource`], an in-memory [`AudioSink`] and a recording
//! [`VideoSurface`]. Compiled for unit tests and, through the `testing`
//! feature, for the integration crate.

use crate::audio::{AudioFormat, AudioSink};
use crate::decoder::{Frame, MediaSource, PacketInfo, PcmBuffer, Plane, StreamKind, TimeBase};
use crate::renderer::VideoSurface;
use crate::utils::error::{Result, VobPlayerError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A 4x2 YUV 4:2:0 frame
pub fn test_frame(pts: i64, epoch: u64) -> Frame {
    let plane = |width: u32, height: u32, value: u8| Plane {
        data: vec![value; (width * height) as usize],
        stride: width as usize,
        width,
        height,
    };
    Frame {
        planes: [plane(4, 2, 235), plane(2, 1, 128), plane(2, 1, 128)],
        width: 4,
        height: 2,
        pts,
        epoch,
    }
}

/// What a scripted packet decodes to
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedPayload {
    /// Interleaved stereo samples
    Audio(Vec<i16>),
    /// One video frame with this timestamp
    Video { pts: i64 },
    /// Decoding fails with a transient error
    Corrupt,
    /// Decoding fails with a fatal error
    Fatal,
    /// A stream the player does not decode
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedPacket {
    /// Bytes this packet occupies in the file
    pub size: usize,
    pub payload: ScriptedPayload,
}

impl ScriptedPacket {
    /// `frames` stereo sample frames of silence
    pub fn audio(size: usize, frames: usize) -> Self {
        Self { size, payload: ScriptedPayload::Audio(vec![0; frames * 2]) }
    }

    pub fn video(size: usize, pts: i64) -> Self {
        Self { size, payload: ScriptedPayload::Video { pts } }
    }

    pub fn corrupt(size: usize) -> Self {
        Self { size, payload: ScriptedPayload::Corrupt }
    }

    pub fn fatal(size: usize) -> Self {
        Self { size, payload: ScriptedPayload::Fatal }
    }

    pub fn other(size: usize) -> Self {
        Self { size, payload: ScriptedPayload::Other }
    }

    fn stream(&self) -> StreamKind {
        match self.payload {
            ScriptedPayload::Audio(_) => StreamKind::Audio,
            ScriptedPayload::Video { .. } | ScriptedPayload::Corrupt | ScriptedPayload::Fatal => StreamKind::Video,
            ScriptedPayload::Other => StreamKind::Other,
        }
    }
}

/// What the decoder did to a [`ScriptedSource`], readable after it moved threads
#[derive(Debug, Default)]
pub struct SourceLog {
    seeks: Mutex<Vec<u64>>,
    flushes: AtomicUsize,
    packets_read: AtomicUsize,
    drains: AtomicUsize,
}

impl SourceLog {
    pub fn seeks(&self) -> Vec<u64> {
        self.seeks.lock().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn packets_read(&self) -> usize {
        self.packets_read.load(Ordering::SeqCst)
    }

    pub fn drains(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }
}

/// A container made of scripted packets laid out back to back
pub struct ScriptedSource {
    /// Start offset and packet
    packets: Vec<(u64, ScriptedPacket)>,
    position: usize,
    time_base: TimeBase,
    log: Arc<SourceLog>,

    /// Sleep before handing out each packet
    read_delay: Duration,

    /// Decoded only when the decoders are drained at end of file
    trailing: Vec<ScriptedPayload>,
}

impl ScriptedSource {
    pub fn new(packets: Vec<ScriptedPacket>) -> Self {
        let mut offset = 0u64;
        let packets = packets
            .into_iter()
            .map(|packet| {
                let start = offset;
                offset += packet.size as u64;
                (start, packet)
            })
            .collect();

        Self {
            packets,
            position: 0,
            // Millisecond ticks keep test timestamps readable
            time_base: TimeBase::new(1, 1000),
            log: Arc::new(SourceLog::default()),
            read_delay: Duration::ZERO,
            trailing: Vec::new(),
        }
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn with_time_base(mut self, time_base: TimeBase) -> Self {
        self.time_base = time_base;
        self
    }

    /// Output the codecs hold back until end of stream, such as reordered pictures
    pub fn with_trailing(mut self, payloads: Vec<ScriptedPayload>) -> Self {
        self.trailing = payloads;
        self
    }

    pub fn log(&self) -> Arc<SourceLog> {
        Arc::clone(&self.log)
    }
}

impl MediaSource for ScriptedSource {
    type Packet = ScriptedPacket;

    fn video_time_base(&self) -> TimeBase {
        self.time_base
    }

    fn seek_to_byte(&mut self, offset: u64) -> Result<()> {
        self.log.seeks.lock().push(offset);
        self.position = self
            .packets
            .iter()
            .position(|(start, _)| *start >= offset)
            .unwrap_or(self.packets.len());
        Ok(())
    }

    fn flush(&mut self) {
        self.log.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn read_packet(&mut self) -> Result<Option<(PacketInfo, Self::Packet)>> {
        let Some((_, packet)) = self.packets.get(self.position) else {
            return Ok(None);
        };
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }

        self.position += 1;
        self.log.packets_read.fetch_add(1, Ordering::SeqCst);
        let info = PacketInfo { stream: packet.stream(), size: packet.size };
        Ok(Some((info, packet.clone())))
    }

    fn decode_audio(&mut self, packet: &Self::Packet, out: &mut Vec<PcmBuffer>) -> Result<()> {
        if let ScriptedPayload::Audio(samples) = &packet.payload {
            out.push(PcmBuffer { samples: samples.clone(), frames: samples.len() / 2 });
        }
        Ok(())
    }

    fn decode_video(&mut self, packet: &Self::Packet, out: &mut Vec<Frame>) -> Result<()> {
        match &packet.payload {
            ScriptedPayload::Video { pts } => {
                out.push(test_frame(*pts, 0));
                Ok(())
            }
            ScriptedPayload::Corrupt => Err(VobPlayerError::CorruptPacket("scripted corruption".to_string())),
            ScriptedPayload::Fatal => Err(VobPlayerError::Decoder("scripted failure".to_string())),
            _ => Ok(()),
        }
    }

    fn drain_decoders(&mut self, audio: &mut Vec<PcmBuffer>, video: &mut Vec<Frame>) -> Result<()> {
        self.log.drains.fetch_add(1, Ordering::SeqCst);
        for payload in &self.trailing {
            match payload {
                ScriptedPayload::Audio(samples) => {
                    audio.push(PcmBuffer { samples: samples.clone(), frames: samples.len() / 2 })
                }
                ScriptedPayload::Video { pts } => video.push(test_frame(*pts, 0)),
                _ => {}
            }
        }
        Ok(())
    }
}

/// In-memory audio device
///
/// An instant sink plays everything the moment it is queued. A bounded sink
/// holds samples until [`MemorySink::play`] consumes them.
pub struct MemorySink {
    format: AudioFormat,

    /// `None` for an instant sink
    capacity: Option<usize>,

    queued: Mutex<usize>,
    accepted: AtomicU64,
    clears: AtomicUsize,
}

impl MemorySink {
    pub fn instant() -> Self {
        Self::with_capacity(None)
    }

    /// Holds at most `samples` interleaved samples
    pub fn bounded(samples: usize) -> Self {
        Self::with_capacity(Some(samples))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            format: AudioFormat::STEREO_S16_48K,
            capacity,
            queued: Mutex::new(0),
            accepted: AtomicU64::new(0),
            clears: AtomicUsize::new(0),
        }
    }

    /// Pretend the device played `samples`; returns how many it had
    pub fn play(&self, samples: usize) -> usize {
        let mut queued = self.queued.lock();
        let played = samples.min(*queued);
        *queued -= played;
        played
    }

    /// Interleaved samples accepted over the sink's lifetime
    pub fn accepted_samples(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl AudioSink for MemorySink {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn try_queue(&self, samples: &[i16]) -> usize {
        let channels = self.format.channels as usize;
        let mut queued = self.queued.lock();

        let accepted = match self.capacity {
            None => samples.len(),
            Some(capacity) => samples.len().min(capacity - *queued) / channels * channels,
        };
        if self.capacity.is_some() {
            *queued += accepted;
        }
        self.accepted.fetch_add(accepted as u64, Ordering::SeqCst);
        accepted
    }

    fn queued_bytes(&self) -> usize {
        *self.queued.lock() * self.format.bytes_per_sample as usize
    }

    fn clear(&self) {
        *self.queued.lock() = 0;
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// A frame the surface was asked to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presented {
    pub pts: i64,
    pub epoch: u64,
}

/// Shared record of what a [`RecordingSurface`] presented
#[derive(Debug, Default)]
pub struct PresentLog {
    frames: Mutex<Vec<Presented>>,
}

impl PresentLog {
    pub fn frames(&self) -> Vec<Presented> {
        self.frames.lock().clone()
    }

    pub fn pts(&self) -> Vec<i64> {
        self.frames.lock().iter().map(|p| p.pts).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Video surface that records instead of drawing
#[derive(Default)]
pub struct RecordingSurface {
    uploaded: Option<Presented>,
    log: Arc<PresentLog>,

    /// Fail `present` once this many frames were shown
    fail_after: Option<usize>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(presents: usize) -> Self {
        Self { fail_after: Some(presents), ..Self::default() }
    }

    pub fn log(&self) -> Arc<PresentLog> {
        Arc::clone(&self.log)
    }
}

impl VideoSurface for RecordingSurface {
    fn upload(&mut self, frame: &Frame) -> Result<()> {
        self.uploaded = Some(Presented { pts: frame.pts, epoch: frame.epoch });
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        if self.fail_after.is_some_and(|limit| self.log.len() >= limit) {
            return Err(VobPlayerError::Renderer("scripted surface loss".to_string()));
        }
        if let Some(frame) = self.uploaded.take() {
            self.log.frames.lock().push(frame);
        }
        Ok(())
    }
}
