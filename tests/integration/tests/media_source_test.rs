//! FFmpeg media source against generated audio files

use once_cell::sync::Lazy;
use vobplayer::decoder::{FfmpegSource, MediaSource, PcmBuffer, StreamKind};
use vobplayer::VobPlayerError;
use vobplayer_integration_tests::TestFixture;

static FIXTURE: Lazy<TestFixture> = Lazy::new(|| TestFixture::new().expect("Failed to generate test media"));

/// Read to end of file and drain the codecs, returning packet count and decoded sample frames
fn decode_all(source: &mut FfmpegSource) -> (usize, Vec<PcmBuffer>) {
    let mut packets = 0;
    let mut pcm = Vec::new();
    while let Some((info, packet)) = source.read_packet().unwrap() {
        assert_eq!(info.stream, StreamKind::Audio);
        assert!(info.size > 0);
        packets += 1;
        source.decode_audio(&packet, &mut pcm).unwrap();
    }

    let mut video = Vec::new();
    source.drain_decoders(&mut pcm, &mut video).unwrap();
    assert!(video.is_empty());
    (packets, pcm)
}

#[test]
fn test_open_audio_only_file() {
    let source = FfmpegSource::open(&FIXTURE.media_files.tone_48k_stereo).unwrap();

    assert!(source.has_audio());
    assert!(!source.has_video());

    let format = source.output_format();
    assert_eq!(format.sample_rate, 48_000);
    assert_eq!(format.channels, 2);
    assert_eq!(format.bytes_per_sample, 2);
}

#[test]
fn test_decodes_stereo_pcm_unchanged_in_length() {
    let mut source = FfmpegSource::open(&FIXTURE.media_files.tone_48k_stereo).unwrap();
    let (packets, pcm) = decode_all(&mut source);

    assert!(packets > 0);
    for buffer in &pcm {
        assert_eq!(buffer.samples.len(), buffer.frames * 2);
    }

    let frames: usize = pcm.iter().map(|b| b.frames).sum();
    assert!((47_000..=48_000).contains(&frames), "decoded {} frames", frames);

    // A 440 Hz tone at this level is neither silent nor clipped
    let peak = pcm.iter().flat_map(|b| b.samples.iter()).map(|s| s.unsigned_abs()).max().unwrap();
    assert!((6_000..=10_000).contains(&peak), "peak {}", peak);
}

#[test]
fn test_resamples_mono_to_stereo_48k() {
    let mut source = FfmpegSource::open(&FIXTURE.media_files.tone_44k_mono).unwrap();
    let (_, pcm) = decode_all(&mut source);

    // Half a second at 48 kHz; upsampled output is not capped at the input size
    let frames: usize = pcm.iter().map(|b| b.frames).sum();
    assert!((23_800..=24_100).contains(&frames), "decoded {} frames", frames);

    // Mono is duplicated into both channels
    for buffer in &pcm {
        assert!(buffer.samples.chunks_exact(2).all(|lr| lr[0] == lr[1]));
    }
}

#[test]
fn test_resampled_stream_restarts_cleanly_after_drain() {
    let mut source = FfmpegSource::open(&FIXTURE.media_files.tone_44k_mono).unwrap();
    let total = |pcm: &[PcmBuffer]| pcm.iter().map(|b| b.frames).sum::<usize>();

    // Stop partway so codec and resampler hold a backlog, then restart
    let mut partial = Vec::new();
    for _ in 0..3 {
        let (_, packet) = source.read_packet().unwrap().unwrap();
        source.decode_audio(&packet, &mut partial).unwrap();
    }
    source.seek_to_byte(0).unwrap();
    source.flush();
    let (_, first) = decode_all(&mut source);
    assert!(total(&first) > 0);

    // Same pass again, this time from fully drained codecs
    source.seek_to_byte(0).unwrap();
    source.flush();
    let (_, second) = decode_all(&mut source);

    // Nothing buffered before the first restart leaked into it
    assert_eq!(total(&first), total(&second));
}

#[test]
fn test_seek_back_to_start_rereads_packets() {
    let mut source = FfmpegSource::open(&FIXTURE.media_files.tone_48k_stereo).unwrap();
    let (first_pass, _) = decode_all(&mut source);
    assert!(source.read_packet().unwrap().is_none());

    source.seek_to_byte(0).unwrap();
    source.flush();

    let (second_pass, _) = decode_all(&mut source);
    assert!(second_pass > 0);
    assert!(second_pass <= first_pass + 1);
}

#[test]
fn test_missing_file_is_invalid_input() {
    let missing = FIXTURE.path().join("missing.vob");
    assert!(matches!(FfmpegSource::open(&missing), Err(VobPlayerError::InvalidInput(_))));
}

#[test]
fn test_unreadable_container_is_rejected() {
    assert!(FfmpegSource::open(&FIXTURE.media_files.garbage).is_err());
}
