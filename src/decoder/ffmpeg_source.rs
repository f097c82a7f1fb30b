//! FFmpeg-backed media source for VobPlayer
//!
//! Opens the container once, keeps both codecs alive across sections and
//! converts their output to the formats the rest of the player consumes:
//! planar YUV 4:2:0 for video and packed 16-bit stereo at 48 kHz for audio.

use crate::audio::AudioFormat;
use crate::decoder::{Frame, MediaSource, PacketInfo, PcmBuffer, Plane, StreamKind, TimeBase};
use crate::utils::error::{IntoPlayerError, Result, VobPlayerError};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format::{sample, Pixel, Sample};
use ffmpeg_next::software::{resampling, scaling};
use ffmpeg_next::{format, media, ChannelLayout};
use log::{debug, info};
use once_cell::sync::OnceCell;
use std::path::Path;

static FFMPEG_INIT: OnceCell<()> = OnceCell::new();

/// Initialize FFmpeg once per process
fn init_ffmpeg() -> Result<()> {
    FFMPEG_INIT
        .get_or_try_init(|| {
            ffmpeg::init().decoder_err("Failed to initialize FFmpeg")?;
            ffmpeg::log::set_level(ffmpeg::log::Level::Warning);
            Ok::<(), VobPlayerError>(())
        })
        .map(|_| ())
}

/// Video decoder state
struct VideoDecoder {
    decoder: ffmpeg::decoder::Video,
    stream_index: usize,
    time_base: TimeBase,

    /// Built on the first frame that is not already YUV 4:2:0
    scaler: Option<(scaling::Context, ScalerKey)>,
}

/// Source geometry a scaler was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScalerKey {
    format: Pixel,
    width: u32,
    height: u32,
}

/// Audio decoder state
struct AudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,

    /// Built from the first decoded frame's format
    resampler: Option<(resampling::Context, ResamplerKey)>,
}

/// Source layout a resampler was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResamplerKey {
    format: Sample,
    layout: ChannelLayout,
    rate: u32,
}

/// An open container with its audio and video decoders
pub struct FfmpegSource {
    input: format::context::Input,
    video: Option<VideoDecoder>,
    audio: Option<AudioDecoder>,
    output: AudioFormat,
}

impl FfmpegSource {
    /// Open a container and set up decoders for its best audio and video streams
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg()?;

        if !path.exists() {
            return Err(VobPlayerError::InvalidInput(format!(
                "Media file not found: {}",
                path.display()
            )));
        }

        let input = format::input(&path)
            .decoder_err(&format!("Failed to open {}", path.display()))?;

        let video = match input.streams().best(media::Type::Video) {
            Some(stream) => {
                let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
                let decoder = context.decoder().video()?;
                let tb = stream.time_base();
                Some(VideoDecoder {
                    decoder,
                    stream_index: stream.index(),
                    time_base: TimeBase::new(tb.numerator(), tb.denominator()),
                    scaler: None,
                })
            }
            None => None,
        };

        let audio = match input.streams().best(media::Type::Audio) {
            Some(stream) => {
                let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
                let decoder = context.decoder().audio()?;
                Some(AudioDecoder {
                    decoder,
                    stream_index: stream.index(),
                    resampler: None,
                })
            }
            None => None,
        };

        if video.is_none() && audio.is_none() {
            return Err(VobPlayerError::decoder_error(format!(
                "No audio or video stream in {}",
                path.display()
            )));
        }

        info!(
            "Opened {}: video stream {:?}, audio stream {:?}",
            path.display(),
            video.as_ref().map(|v| v.stream_index),
            audio.as_ref().map(|a| a.stream_index)
        );

        Ok(Self {
            input,
            video,
            audio,
            output: AudioFormat::STEREO_S16_48K,
        })
    }

    /// Format of the PCM produced by [`MediaSource::decode_audio`]
    pub fn output_format(&self) -> AudioFormat {
        self.output
    }

    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}

impl MediaSource for FfmpegSource {
    type Packet = ffmpeg::Packet;

    fn video_time_base(&self) -> TimeBase {
        self.video.as_ref().map(|v| v.time_base).unwrap_or_default()
    }

    fn seek_to_byte(&mut self, offset: u64) -> Result<()> {
        let target = i64::try_from(offset)
            .map_err(|_| VobPlayerError::InvalidInput(format!("Seek offset {} out of range", offset)))?;

        // Byte seeks are not exposed by the safe wrapper
        let ret = unsafe {
            ffmpeg_sys_next::avformat_seek_file(
                self.input.as_mut_ptr(),
                -1,
                i64::MIN,
                target,
                i64::MAX,
                ffmpeg_sys_next::AVSEEK_FLAG_BYTE as i32,
            )
        };

        if ret < 0 {
            return Err(VobPlayerError::Decoder(format!(
                "Seek to byte {} failed: {}",
                offset,
                ffmpeg::Error::from(ret)
            )));
        }

        debug!("Seeked to byte {}", offset);
        Ok(())
    }

    fn flush(&mut self) {
        if let Some(video) = self.video.as_mut() {
            video.decoder.flush();
        }
        if let Some(audio) = self.audio.as_mut() {
            audio.decoder.flush();
            // Its buffered tail belongs to the old position
            audio.resampler = None;
        }
    }

    fn read_packet(&mut self) -> Result<Option<(PacketInfo, Self::Packet)>> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let index = packet.stream();
        let stream = if self.video.as_ref().is_some_and(|v| v.stream_index == index) {
            StreamKind::Video
        } else if self.audio.as_ref().is_some_and(|a| a.stream_index == index) {
            StreamKind::Audio
        } else {
            StreamKind::Other
        };

        let info = PacketInfo { stream, size: packet.size() };
        Ok(Some((info, packet)))
    }

    fn decode_audio(&mut self, packet: &Self::Packet, out: &mut Vec<PcmBuffer>) -> Result<()> {
        let Some(audio) = self.audio.as_mut() else {
            return Ok(());
        };

        audio.decoder.send_packet(packet)?;
        audio.receive(self.output, out)
    }

    fn decode_video(&mut self, packet: &Self::Packet, out: &mut Vec<Frame>) -> Result<()> {
        let Some(video) = self.video.as_mut() else {
            return Ok(());
        };

        video.decoder.send_packet(packet)?;
        video.receive(out)
    }

    fn drain_decoders(&mut self, audio_out: &mut Vec<PcmBuffer>, video_out: &mut Vec<Frame>) -> Result<()> {
        if let Some(video) = self.video.as_mut() {
            video.decoder.send_eof()?;
            video.receive(video_out)?;
        }

        if let Some(audio) = self.audio.as_mut() {
            audio.decoder.send_eof()?;
            audio.receive(self.output, audio_out)?;
            audio.flush_resampler(self.output, audio_out)?;
        }

        debug!(
            "Decoders drained: {} audio buffers, {} frames",
            audio_out.len(),
            video_out.len()
        );
        Ok(())
    }
}

impl AudioDecoder {
    /// Resample every frame the codec has ready into `out`
    fn receive(&mut self, output: AudioFormat, out: &mut Vec<PcmBuffer>) -> Result<()> {
        let mut decoded = ffmpeg::frame::Audio::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let key = ResamplerKey {
                format: decoded.format(),
                layout: source_layout(&decoded),
                rate: decoded.rate(),
            };

            if self.resampler.as_ref().map(|(_, k)| *k) != Some(key) {
                let context = resampling::Context::get(
                    key.format,
                    key.layout,
                    key.rate,
                    Sample::I16(sample::Type::Packed),
                    ChannelLayout::STEREO,
                    output.sample_rate,
                )?;
                debug!("Audio resampler {:?} -> {} Hz stereo s16", key, output.sample_rate);
                self.resampler = Some((context, key));
            }

            let Some((resampler, _)) = self.resampler.as_mut() else {
                continue;
            };

            // An unallocated frame would cap the output at the input's sample count
            let capacity = resample_capacity(decoded.samples(), key.rate, output.sample_rate, pending_output(resampler));
            let mut converted = stereo_frame(capacity);
            resampler.run(&decoded, &mut converted)?;
            push_pcm(&converted, output, out);
        }

        Ok(())
    }

    /// Emit whatever the resampler still buffers
    fn flush_resampler(&mut self, output: AudioFormat, out: &mut Vec<PcmBuffer>) -> Result<()> {
        let Some((resampler, _)) = self.resampler.as_mut() else {
            return Ok(());
        };

        let pending = pending_output(resampler);
        if pending == 0 {
            return Ok(());
        }

        let mut converted = stereo_frame(pending + RESAMPLE_HEADROOM);
        resampler.flush(&mut converted)?;
        push_pcm(&converted, output, out);
        Ok(())
    }
}

impl VideoDecoder {
    /// Convert every picture the codec has ready into `out`
    fn receive(&mut self, out: &mut Vec<Frame>) -> Result<()> {
        let mut decoded = ffmpeg::frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            let pts = decoded.timestamp().or_else(|| decoded.pts()).unwrap_or(0);

            let frame = if decoded.format() == Pixel::YUV420P {
                copy_planes(&decoded, pts)
            } else {
                let key = ScalerKey {
                    format: decoded.format(),
                    width: decoded.width(),
                    height: decoded.height(),
                };

                if self.scaler.as_ref().map(|(_, k)| *k) != Some(key) {
                    let context = scaling::Context::get(
                        key.format,
                        key.width,
                        key.height,
                        Pixel::YUV420P,
                        key.width,
                        key.height,
                        scaling::Flags::BILINEAR,
                    )?;
                    debug!("Video scaler {:?} -> YUV420P", key);
                    self.scaler = Some((context, key));
                }

                let Some((scaler, _)) = self.scaler.as_mut() else {
                    continue;
                };
                let mut converted = ffmpeg::frame::Video::empty();
                scaler.run(&decoded, &mut converted)?;
                copy_planes(&converted, pts)
            };

            out.push(frame);
        }

        Ok(())
    }
}

/// Extra output samples allowed for filter rounding
const RESAMPLE_HEADROOM: usize = 32;

/// Output samples one resampler call may produce
///
/// `pending` is what the resampler already holds from earlier input.
fn resample_capacity(in_samples: usize, in_rate: u32, out_rate: u32, pending: usize) -> usize {
    let scaled = in_samples as u64 * u64::from(out_rate) / u64::from(in_rate.max(1));
    scaled as usize + pending + RESAMPLE_HEADROOM
}

/// Samples buffered inside the resampler, in output rate
fn pending_output(resampler: &resampling::Context) -> usize {
    resampler.delay().map_or(0, |delay| delay.output.max(0) as usize)
}

/// Packed s16 stereo frame with room for `samples` sample frames
fn stereo_frame(samples: usize) -> ffmpeg::frame::Audio {
    ffmpeg::frame::Audio::new(Sample::I16(sample::Type::Packed), samples, ChannelLayout::STEREO)
}

fn push_pcm(converted: &ffmpeg::frame::Audio, output: AudioFormat, out: &mut Vec<PcmBuffer>) {
    let frames = converted.samples();
    let bytes = frames * output.bytes_per_frame();
    let data = converted.data(0);
    if frames == 0 || data.len() < bytes {
        return;
    }

    out.push(PcmBuffer {
        samples: bytemuck::pod_collect_to_vec(&data[..bytes]),
        frames,
    });
}

/// Channel layout of a decoded frame, guessed from the channel count when unset
fn source_layout(frame: &ffmpeg::frame::Audio) -> ChannelLayout {
    let layout = frame.channel_layout();
    if layout.is_empty() {
        ChannelLayout::default(i32::from(frame.channels()))
    } else {
        layout
    }
}

/// Copy a YUV 4:2:0 picture out of FFmpeg's buffers
fn copy_planes(picture: &ffmpeg::frame::Video, pts: i64) -> Frame {
    let width = picture.width();
    let height = picture.height();

    let plane = |index: usize| {
        let stride = picture.stride(index);
        let (w, h) = if index == 0 {
            (width, height)
        } else {
            (width.div_ceil(2), height.div_ceil(2))
        };
        let data = picture.data(index);
        let len = (stride * h as usize).min(data.len());
        Plane {
            data: data[..len].to_vec(),
            stride,
            width: w,
            height: h,
        }
    };

    Frame {
        planes: [plane(0), plane(1), plane(2)],
        width,
        height,
        pts,
        epoch: 0,
    }
}
