//! WAV container handling and audio normalization.

use crate::error::VoiceError;
use coach_types::{parse_sample_rate, DEFAULT_SAMPLE_RATE};
use std::io::Cursor;
use std::sync::OnceLock;

pub const WAV_MIME: &str = "audio/wav";

const TONE_DURATION_MS: u32 = 180;
const TONE_FREQUENCY_HZ: f64 = 440.0;
const TONE_AMPLITUDE: f64 = 0.2;

/// Wraps little-endian PCM16 mono samples in a WAV container.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, VoiceError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for pair in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Merges WAV chunks by concatenating their sample data under one header.
///
/// Returns `None` if any chunk fails to parse or the chunks disagree on
/// channels, sample rate, bit depth, or sample format.
pub fn merge_wav_chunks(chunks: &[Vec<u8>]) -> Option<Vec<u8>> {
    match chunks {
        [] => return None,
        [single] => return Some(single.clone()),
        _ => {}
    }

    let mut spec: Option<hound::WavSpec> = None;
    let mut samples: Vec<i32> = Vec::new();
    for chunk in chunks {
        let reader = hound::WavReader::new(Cursor::new(chunk.as_slice())).ok()?;
        let current = reader.spec();
        match spec {
            None => spec = Some(current),
            Some(expected) if expected != current => return None,
            Some(_) => {}
        }
        if current.sample_format != hound::SampleFormat::Int {
            return None;
        }
        for sample in reader.into_samples::<i32>() {
            samples.push(sample.ok()?);
        }
    }

    let spec = spec?;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).ok()?;
        for sample in samples {
            writer.write_sample(sample).ok()?;
        }
        writer.finalize().ok()?;
    }
    Some(cursor.into_inner())
}

/// Reassembles the inline audio chunks of a single provider response.
///
/// WAV chunks are merged when their formats agree; everything else is
/// concatenated as-is. The first non-empty mime type wins.
pub fn reassemble_chunks(
    chunks: Vec<Vec<u8>>,
    mime_type: Option<String>,
) -> Option<(Vec<u8>, Option<String>)> {
    let chunks: Vec<Vec<u8>> = chunks.into_iter().filter(|c| !c.is_empty()).collect();
    if chunks.is_empty() {
        return None;
    }
    if chunks.len() == 1 {
        return chunks.into_iter().next().map(|c| (c, mime_type));
    }

    let is_wav = mime_type
        .as_deref()
        .is_some_and(|mime| mime.to_ascii_lowercase().contains("wav"));
    if is_wav {
        if let Some(merged) = merge_wav_chunks(&chunks) {
            return Some((merged, mime_type));
        }
    }
    Some((chunks.concat(), mime_type))
}

/// Wraps raw `audio/L16` or `audio/pcm` output in a WAV container at the
/// rate named by the mime type. Other formats pass through.
pub fn normalize_for_playback(
    audio: Vec<u8>,
    mime_type: Option<&str>,
) -> Result<(Vec<u8>, String), VoiceError> {
    let lowered = mime_type.unwrap_or_default().to_ascii_lowercase();
    if !lowered.contains("audio/l16") && !lowered.contains("audio/pcm") {
        let mime = mime_type
            .filter(|m| !m.is_empty())
            .unwrap_or(WAV_MIME)
            .to_string();
        return Ok((audio, mime));
    }
    let rate = parse_sample_rate(mime_type, DEFAULT_SAMPLE_RATE);
    Ok((pcm16_to_wav(&audio, rate)?, WAV_MIME.to_string()))
}

/// Maps an OpenAI `response_format` to its mime type.
pub fn format_to_mime(format: &str) -> &'static str {
    match format.trim().to_ascii_lowercase().as_str() {
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "opus" => "audio/opus",
        "flac" => "audio/flac",
        _ => WAV_MIME,
    }
}

/// PCM16 bytes of a short sine tone, computed once per process.
pub fn mock_tone_pcm() -> &'static [u8] {
    static TONE: OnceLock<Vec<u8>> = OnceLock::new();
    TONE.get_or_init(|| {
        let total = (DEFAULT_SAMPLE_RATE * TONE_DURATION_MS / 1000) as usize;
        let mut pcm = Vec::with_capacity(total * 2);
        for n in 0..total {
            let t = n as f64 / DEFAULT_SAMPLE_RATE as f64;
            let value = (2.0 * std::f64::consts::PI * TONE_FREQUENCY_HZ * t).sin();
            let sample = (value * TONE_AMPLITUDE * i16::MAX as f64) as i16;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
        pcm
    })
}

/// The mock tone wrapped as WAV, computed once per process.
pub fn mock_tone_wav() -> &'static [u8] {
    static WAV: OnceLock<Vec<u8>> = OnceLock::new();
    WAV.get_or_init(|| pcm16_to_wav(mock_tone_pcm(), DEFAULT_SAMPLE_RATE).unwrap_or_default())
}
