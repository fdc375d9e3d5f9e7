//! Block loudness computation
//!
//! Converts raw 16-bit PCM sample blocks into the logarithmic loudness
//! value the voice detector classifies against.

/// Root-mean-square amplitude over a block of samples
///
/// Operates on the raw 16-bit amplitude scale (no normalization); the
/// threshold this feeds is calibrated against the same scale.
pub fn block_rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_squares / samples.len() as f64).sqrt()
}

/// Loudness of a block in dB: `20 * log10(rms)`
///
/// A silent block (RMS 0) yields negative infinity, which compares below
/// any finite threshold.
pub fn block_level_db(samples: &[i16]) -> f64 {
    20.0 * block_rms(samples).log10()
}
