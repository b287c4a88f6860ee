//! PCM sample serialization helpers

/// Serialize interleaved i16 samples to little-endian PCM bytes
pub fn pcm16_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Rebuild i16 samples from little-endian PCM bytes; a trailing odd byte is
/// discarded
pub fn pcm16_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
