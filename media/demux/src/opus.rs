/*!
    Opus packet duration from the TOC byte (RFC 6716, section 3.1).

    Containers do not always carry per-packet durations for Opus. The pacing
    in the writer tasks needs them, so the demuxer fills them in from the
    packet header.
*/

use media_types::Rational;

/// Opus timestamps are always counted at 48 kHz.
pub const SAMPLE_RATE: i32 = 48_000;

/**
    Number of 48 kHz samples in an Opus packet.

    Returns `None` for an empty packet, or for a code 3 packet missing its
    frame count byte.
*/
pub fn packet_samples(data: &[u8]) -> Option<u32> {
    let toc = *data.first()?;
    let config = (toc >> 3) as usize;
    let frame_samples = match config {
        // SILK: 10, 20, 40, 60 ms
        0..=11 => [480, 960, 1920, 2880][config % 4],
        // Hybrid: 10, 20 ms
        12..=15 => [480, 960][config % 2],
        // CELT: 2.5, 5, 10, 20 ms
        _ => [120, 240, 480, 960][config % 4],
    };
    let frames = match toc & 0x03 {
        0 => 1,
        1 | 2 => 2,
        _ => u32::from(*data.get(1)? & 0x3F),
    };
    Some(frame_samples * frames)
}

/**
    Packet duration in `time_base` units.
*/
pub fn packet_duration(data: &[u8], time_base: Rational) -> Option<i64> {
    let samples = packet_samples(data)?;
    Some(Rational::new(1, SAMPLE_RATE).rescale(i64::from(samples), time_base))
}
