//! G.711 μ-law algorithm aka. PCMU

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Encode an i16 audio sample to a μ-law sample
pub fn encode(x: i16) -> u8 {
    let mut magnitude = i32::from(x);

    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    let magnitude = magnitude.min(CLIP) + BIAS;

    // magnitude >> 7 is in 1..=255, its highest set bit is the segment
    let exponent = 31 - ((magnitude >> 7) as u32).leading_zeros() as i32;
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;

    !(sign | (exponent << 4) | mantissa) as u8
}

/// Decode a μ-law sample to an i16 audio sample
pub fn decode(y: u8) -> i16 {
    let y = !y;

    let exponent = i32::from((y >> 4) & 0x07);
    let mantissa = i32::from(y & 0x0F);

    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if y & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}
