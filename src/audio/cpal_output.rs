//! CPAL audio output implementation for VobPlayer
//!
//! The decoder thread pushes interleaved PCM into a ring buffer and the cpal
//! callback pulls from it. The stream itself must stay on the thread that
//! built it, so the shareable part lives in [`CpalAudioQueue`].

use crate::audio::{AudioFormat, AudioSink};
use crate::utils::error::{IntoPlayerError, Result, VobPlayerError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shareable half of the audio output: ring buffer plus fill accounting
pub struct CpalAudioQueue {
    /// Decoder side of the ring
    producer: Mutex<HeapProd<i16>>,

    /// Callback side of the ring; the callback only ever try-locks it
    consumer: Mutex<HeapCons<i16>>,

    /// Samples pushed but not yet pulled by the callback
    ///
    /// Signed because the callback can observe a push before the producer
    /// has accounted for it.
    queued_samples: AtomicI64,

    /// Callbacks that ran out of data mid-buffer
    underruns: AtomicU64,

    format: AudioFormat,
    capacity: usize,
}

impl CpalAudioQueue {
    /// Create a queue holding `buffer` worth of audio
    pub fn new(format: AudioFormat, buffer: Duration) -> Result<Self> {
        let capacity = format.samples_for(buffer);
        if capacity == 0 {
            return Err(VobPlayerError::Audio("Audio buffer must hold at least one sample".to_string()));
        }

        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();

        Ok(Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            queued_samples: AtomicI64::new(0),
            underruns: AtomicU64::new(0),
            format,
            capacity,
        })
    }

    /// Ring capacity in interleaved samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Fill a device buffer, padding with silence
    ///
    /// Called from the cpal callback. Never blocks: if a clear is in
    /// progress the buffer is silence for this period.
    pub fn fill_output(&self, out: &mut [i16]) -> usize {
        let popped = match self.consumer.try_lock() {
            Some(mut consumer) => consumer.pop_slice(out),
            None => 0,
        };

        if popped > 0 {
            self.queued_samples.fetch_sub(popped as i64, Ordering::AcqRel);
        }
        if popped < out.len() {
            out[popped..].fill(0);
            if popped > 0 {
                self.underruns.fetch_add(1, Ordering::Relaxed);
            }
        }
        popped
    }

    fn queued_samples(&self) -> usize {
        self.queued_samples.load(Ordering::Acquire).max(0) as usize
    }
}

impl AudioSink for CpalAudioQueue {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn try_queue(&self, samples: &[i16]) -> usize {
        let channels = self.format.channels.max(1) as usize;
        let mut producer = self.producer.lock();

        // Only whole sample frames go in so channels never swap
        let take = samples.len().min(producer.vacant_len()) / channels * channels;
        let pushed = producer.push_slice(&samples[..take]);

        self.queued_samples.fetch_add(pushed as i64, Ordering::AcqRel);
        pushed
    }

    fn queued_bytes(&self) -> usize {
        self.queued_samples() * self.format.bytes_per_sample as usize
    }

    fn clear(&self) {
        let mut consumer = self.consumer.lock();
        let removed = consumer.clear();
        self.queued_samples.fetch_sub(removed as i64, Ordering::AcqRel);
    }
}

/// Owner of the cpal output stream
///
/// Not `Send`; keep it on the thread that created it and hand
/// [`CpalAudioOutput::queue`] to the worker threads.
pub struct CpalAudioOutput {
    /// Kept alive for the lifetime of playback
    _stream: Stream,

    queue: Arc<CpalAudioQueue>,
}

impl CpalAudioOutput {
    /// Open the default output device and start the stream
    pub fn open(format: AudioFormat, buffer: Duration) -> Result<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()
            .ok_or_else(|| VobPlayerError::Audio("No default output device found".to_string()))?;

        let preferred = device.default_output_config().ok().map(|c| c.sample_format());
        let ranges: Vec<OutputRange> = device.supported_output_configs()
            .audio_err("Failed to query output configs")?
            .map(|range| OutputRange::from(&range))
            .collect();
        let sample_format = pick_sample_format(&ranges, &format, preferred)?;

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue = Arc::new(CpalAudioQueue::new(format, buffer)?);

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, Arc::clone(&queue))?,
            SampleFormat::F32 => build_stream::<f32>(&device, &config, Arc::clone(&queue))?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, Arc::clone(&queue))?,
            other => {
                return Err(VobPlayerError::Audio(format!(
                    "Unsupported device sample format {:?}",
                    other
                )))
            }
        };

        stream.play().audio_err("Failed to start audio stream")?;

        log::info!(
            "Audio output: {} ({} Hz, {} ch, {:?} device samples, {} sample ring)",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            format.sample_rate,
            format.channels,
            sample_format,
            queue.capacity()
        );

        Ok(Self {
            _stream: stream,
            queue,
        })
    }

    /// Shareable sink for the decoder and render threads
    pub fn queue(&self) -> Arc<CpalAudioQueue> {
        Arc::clone(&self.queue)
    }
}

/// One supported config range as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputRange {
    channels: u16,
    min_rate: u32,
    max_rate: u32,
    sample_format: SampleFormat,
}

impl From<&cpal::SupportedStreamConfigRange> for OutputRange {
    fn from(range: &cpal::SupportedStreamConfigRange) -> Self {
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate().0,
            max_rate: range.max_sample_rate().0,
            sample_format: range.sample_format(),
        }
    }
}

/// Device sample formats the callback can convert to, best first
const PLAYABLE_FORMATS: [SampleFormat; 3] = [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16];

/// Sample format to open a stream with, given what the device supports
///
/// Only ranges with the exact channel count and a rate span covering the
/// output rate qualify. The device default wins when it qualifies.
fn pick_sample_format(
    ranges: &[OutputRange],
    format: &AudioFormat,
    preferred: Option<SampleFormat>,
) -> Result<SampleFormat> {
    let usable: Vec<SampleFormat> = ranges
        .iter()
        .filter(|r| r.channels == format.channels)
        .filter(|r| (r.min_rate..=r.max_rate).contains(&format.sample_rate))
        .map(|r| r.sample_format)
        .filter(|f| PLAYABLE_FORMATS.contains(f))
        .collect();

    if let Some(preferred) = preferred.filter(|f| usable.contains(f)) {
        return Ok(preferred);
    }

    PLAYABLE_FORMATS
        .into_iter()
        .find(|f| usable.contains(f))
        .ok_or_else(|| {
            VobPlayerError::Audio(format!(
                "Output device cannot play {} Hz {}-channel audio in any supported sample format",
                format.sample_rate, format.channels
            ))
        })
}

fn build_stream<S>(device: &cpal::Device, config: &StreamConfig, queue: Arc<CpalAudioQueue>) -> Result<Stream>
where
    S: SizedSample + FromSample<i16> + Send + 'static,
{
    // Reused between callbacks, only grows
    let mut scratch: Vec<i16> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [S], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0);
            }
            let pcm = &mut scratch[..data.len()];
            queue.fill_output(pcm);
            for (out, sample) in data.iter_mut().zip(pcm.iter()) {
                *out = S::from_sample(*sample);
            }
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    ).audio_err("Failed to create audio stream")
}
