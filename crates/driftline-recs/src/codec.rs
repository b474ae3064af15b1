//! Lossy int8 feature codec.
//!
//! Dense float embeddings are stored as symmetric int8 with a
//! percentile-derived scale and a power-law companding curve:
//!
//! ```text
//! q = round(127 * sign(x) * (min(|x|, s) / s)^gamma)      s = percentile(|x|)
//! x' = sign(q) * (|q| / 127)^(1/gamma)
//! ```
//!
//! Using an order statistic rather than the max makes the scale robust to
//! outlier components; the gamma curve spends resolution near zero, where
//! most normalized-embedding mass lives. The codec is lossy and
//! fixed-point: round-trip is exact only at -1, 0, and 1. The emitted
//! range is symmetric — -128 never appears.

use crate::error::CodecError;

/// Quantize a float vector to `dim` int8 components.
///
/// The input is padded with zeros or truncated to `dim`. `percentile`
/// selects the order statistic of component magnitudes used as the scale;
/// `gamma` is the companding exponent (see
/// [`RecsConfig::quant_gamma`](crate::config::RecsConfig::quant_gamma)).
///
/// # Errors
///
/// - [`CodecError::NonFinite`] if any input component is NaN or infinite
/// - [`CodecError::InvalidPercentile`] if `percentile` is outside [0, 1]
/// - [`CodecError::ZeroDimension`] if `dim` is 0
/// - [`CodecError::DegenerateScale`] if the selected scale is not a finite
///   positive number (e.g. an all-zero input)
pub fn encode(
    vector: &[f32],
    dim: usize,
    percentile: f32,
    gamma: f32,
) -> Result<Vec<i8>, CodecError> {
    if dim == 0 {
        return Err(CodecError::ZeroDimension);
    }
    if !(0.0..=1.0).contains(&percentile) || percentile.is_nan() {
        return Err(CodecError::InvalidPercentile { value: percentile });
    }
    for (index, &x) in vector.iter().enumerate() {
        if !x.is_finite() {
            return Err(CodecError::NonFinite { index });
        }
    }

    // Pad or truncate to the target dimension; missing components are 0.
    let mut padded = vec![0.0f32; dim];
    let n = vector.len().min(dim);
    padded[..n].copy_from_slice(&vector[..n]);

    let mut magnitudes: Vec<f32> = padded.iter().map(|x| x.abs()).collect();
    magnitudes.sort_by(f32::total_cmp);
    let idx = ((dim - 1) as f32 * percentile).round() as usize;
    let scale = magnitudes[idx.min(dim - 1)];
    if !scale.is_finite() || scale <= 0.0 {
        return Err(CodecError::DegenerateScale { value: scale });
    }

    let quantized = padded
        .iter()
        .map(|&x| {
            let clipped = x.abs().min(scale) / scale;
            let companded = clipped.powf(gamma);
            let q = (companded * 127.0).round() * x.signum();
            // signum() of -0.0 is -1, but companded is 0 there, so q is 0.
            (q as i16).clamp(-127, 127) as i8
        })
        .collect();
    Ok(quantized)
}

/// Dequantize int8 components back to floats strictly within [-1, 1].
///
/// Applies the inverse companding power `1/gamma`, preserving sign.
///
/// # Errors
///
/// [`CodecError::ComponentOutOfRange`] if any component is outside
/// [-127, 127] (i.e. the asymmetric -128 is rejected).
pub fn decode(quantized: &[i8], gamma: f32) -> Result<Vec<f32>, CodecError> {
    if let Some((index, &q)) = quantized.iter().enumerate().find(|(_, &q)| q == i8::MIN) {
        return Err(CodecError::ComponentOutOfRange {
            index,
            value: q as i16,
        });
    }
    let inv = 1.0 / gamma;
    Ok(quantized
        .iter()
        .map(|&q| {
            let mag = (q.unsigned_abs() as f32 / 127.0).powf(inv);
            if q < 0 {
                -mag
            } else {
                mag
            }
        })
        .collect())
}
