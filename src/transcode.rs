//! Inbound audio chunk handling.
//!
//! Chunks arrive as opaque binary frames from the transport. Before they can
//! be forwarded to the transcription provider they need a content type the
//! provider understands, and PCM float audio needs packing into 16-bit
//! little-endian samples. Everything here is pure and stateless.

/// Wire encoding of an inbound audio chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioEncoding {
    /// WebM container with Opus audio, the browser MediaRecorder default.
    #[default]
    WebmOpus,
    /// Raw 16-bit little-endian PCM at 16kHz mono.
    LinearPcm16,
}

impl AudioEncoding {
    /// Content type sent to the transcription provider.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioEncoding::WebmOpus => "audio/webm;codecs=opus",
            AudioEncoding::LinearPcm16 => "audio/l16;rate=16000",
        }
    }

    /// Encoding name used in the provider's query string.
    pub fn query_name(&self) -> &'static str {
        match self {
            AudioEncoding::WebmOpus => "webm",
            AudioEncoding::LinearPcm16 => "linear16",
        }
    }
}

/// One inbound audio chunk, as received from the transport.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

impl AudioChunk {
    pub fn new(bytes: Vec<u8>, encoding: AudioEncoding) -> Self {
        Self { bytes, encoding }
    }
}

/// Audio ready for the transcription provider.
#[derive(Debug, Clone)]
pub struct TranscodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub encoding: AudioEncoding,
}

/// Prepare an inbound chunk for the transcription provider.
///
/// Container formats pass through untouched; the provider decodes them
/// itself. The mapping only pins down the content type it needs to do so.
pub fn transcode_chunk(chunk: AudioChunk) -> TranscodedAudio {
    TranscodedAudio {
        mime_type: chunk.encoding.mime_type(),
        encoding: chunk.encoding,
        bytes: chunk.bytes,
    }
}

/// Convert f32 samples to PCM 16-bit little-endian format
pub fn samples_to_pcm(samples: &[f32]) -> Vec<u8> {
    let mut pcm_data = Vec::with_capacity(samples.len() * 2);

    for &sample in samples {
        let sample_i16 = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        pcm_data.extend_from_slice(&sample_i16.to_le_bytes());
    }

    pcm_data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_mapping() {
        assert_eq!(AudioEncoding::WebmOpus.mime_type(), "audio/webm;codecs=opus");
        assert_eq!(AudioEncoding::LinearPcm16.mime_type(), "audio/l16;rate=16000");
        assert_eq!(AudioEncoding::WebmOpus.query_name(), "webm");
        assert_eq!(AudioEncoding::LinearPcm16.query_name(), "linear16");
    }

    #[test]
    fn test_transcode_passthrough() {
        let chunk = AudioChunk::new(vec![1, 2, 3, 4], AudioEncoding::WebmOpus);
        let out = transcode_chunk(chunk);
        assert_eq!(out.bytes, vec![1, 2, 3, 4]);
        assert_eq!(out.mime_type, "audio/webm;codecs=opus");
    }

    #[test]
    fn test_samples_to_pcm() {
        let samples = vec![0.0f32, 0.5f32, -0.5f32, 1.0f32];
        let pcm_data = samples_to_pcm(&samples);
        assert_eq!(pcm_data.len(), samples.len() * 2); // 2 bytes per sample (16-bit)

        // Full-scale positive clamps to i16::MAX
        let last = i16::from_le_bytes([pcm_data[6], pcm_data[7]]);
        assert_eq!(last, i16::MAX);
    }

    #[test]
    fn test_samples_to_pcm_clamps_out_of_range() {
        let pcm_data = samples_to_pcm(&[2.0f32, -2.0f32]);
        let first = i16::from_le_bytes([pcm_data[0], pcm_data[1]]);
        let second = i16::from_le_bytes([pcm_data[2], pcm_data[3]]);
        assert_eq!(first, i16::MAX);
        assert_eq!(second, -i16::MAX);
    }
}
