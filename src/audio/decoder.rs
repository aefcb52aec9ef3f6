use std::io::Cursor;

use crate::error::ShadowError;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::DecoderOptions,
    errors::Error,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

/// Fully decoded stream, downmixed to mono for analysis and shadow rendering.
#[derive(Clone, Debug)]
pub struct DecodedTrack {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedTrack {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Extension hint from the path part of a stream URL (`.../track.mp3?sig=...` → `mp3`).
pub fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<DecodedTrack, ShadowError> {
    if bytes.is_empty() {
        return Err(ShadowError::Decode("empty stream body".to_string()));
    }
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ShadowError::Decode(format!("Format probe failed: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| ShadowError::Decode("No default audio track found".to_string()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ShadowError::Decode(format!("Decoder creation failed: {e}")))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ShadowError::Decode("Track has no sample-rate metadata".to_string()))?;

    let mut samples = Vec::<f32>::new();
    let mut sample_buffer: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::ResetRequired) => {
                return Err(ShadowError::Decode(
                    "Decoder reset required; unsupported stream transition".to_string(),
                ))
            }
            Err(Error::IoError(_)) => break,
            Err(err) => return Err(ShadowError::Decode(format!("Error reading packet: {err}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::DecodeError(_)) => continue,
            Err(err) => return Err(ShadowError::Decode(format!("Decode failure: {err}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let duration = decoded.capacity() as u64;
        let buffer = sample_buffer.get_or_insert_with(|| SampleBuffer::<f32>::new(duration, spec));
        buffer.copy_interleaved_ref(decoded);
        samples.extend(downmix(buffer.samples(), channels));
    }

    if samples.is_empty() {
        return Err(ShadowError::Decode("stream produced no audio".to_string()));
    }

    Ok(DecodedTrack {
        sample_rate,
        samples,
    })
}

fn downmix(interleaved: &[f32], channels: usize) -> impl Iterator<Item = f32> + '_ {
    interleaved
        .chunks(channels)
        .map(move |frame| frame.iter().sum::<f32>() / channels as f32)
}
