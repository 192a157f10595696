//! G.711 μ-law companding.
//!
//! Compresses 16 bit linear PCM samples into 8 bit logarithmic samples, halving the
//! payload size of an audio chunk.

#![warn(unreachable_pub)]

pub mod mulaw;

/// Compress `samples` and append the result to `out`
pub fn encode_samples(samples: &[i16], out: &mut Vec<u8>) {
    out.extend(samples.iter().copied().map(mulaw::encode));
}

/// Expand μ-law `bytes` and append the linear samples to `out`
pub fn decode_samples(bytes: &[u8], out: &mut Vec<i16>) {
    out.extend(bytes.iter().copied().map(mulaw::decode));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn halves_payload() {
        let samples = [0i16; 160];
        let mut encoded = Vec::new();

        encode_samples(&samples, &mut encoded);

        assert_eq!(encoded.len(), 160);
        assert_eq!(encoded.len() * 2, std::mem::size_of_val(&samples));
    }

    #[test]
    fn buffer_roundtrip() {
        let samples: Vec<i16> = (0..320).map(|i| ((i * 211) % 20000 - 10000) as i16).collect();

        let mut encoded = Vec::new();
        encode_samples(&samples, &mut encoded);

        let mut decoded = Vec::new();
        decode_samples(&encoded, &mut decoded);

        assert_eq!(decoded.len(), samples.len());

        for (original, decoded) in samples.iter().zip(&decoded) {
            let error = (i32::from(*original) - i32::from(*decoded)).abs();
            assert!(error <= 1024, "{original} decoded as {decoded}");
        }
    }
}
