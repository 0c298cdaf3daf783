//! Predictive delta encoding for float fields, plus analog-stick quantization.
//!
//! Velocity-like fields (self air/ground speed, attack speed, hitlag) are
//! smooth enough frame-to-frame that a linear/quadratic/cubic extrapolation
//! from 2/3/4 buffered history samples usually predicts the next value
//! exactly. When it does, we overwrite the field with [`MAGIC_FLOAT`] xored
//! against the (masked) prediction error instead of the real bytes -- an
//! IEEE-754 float can never legally look like that, so the decoder can tell
//! compressed fields apart from real ones just by inspecting the bit pattern.

/// `0xFF000000`: top byte all-set, remaining exponent/mantissa bits zero.
/// No finite or infinite IEEE-754 value can have this exact bit pattern as a
/// *small* delta encoding, because the exponent byte of a real float is never
/// `0xFF` together with a zero low mantissa top bit in the way we construct it
/// below -- see [`looks_compressed`].
pub const MAGIC_FLOAT: u32 = 0xFF00_0000;

/// Mask applied to a 2-buffer (linear, i.e. velocity) prediction diff.
pub const MAXDIFF_VELOCITY: u32 = 0x3FF;
/// Mask applied to a 3/4-buffer (quadratic/cubic, i.e. accel/jolt) prediction diff.
pub const MAXDIFF_HIGHER_ORDER: u32 = 0xFF;

/// Linear extrapolation from the last two samples.
pub fn predict_linear(h1: f32, h2: f32) -> f32 {
    2.0 * h1 - h2
}

/// Quadratic extrapolation from the last three samples.
pub fn predict_quadratic(h1: f32, h2: f32, h3: f32) -> f32 {
    3.0 * h1 - 3.0 * h2 + h3
}

/// Cubic extrapolation from the last four samples.
pub fn predict_cubic(h1: f32, h2: f32, h3: f32, h4: f32) -> f32 {
    4.0 * h1 - 6.0 * h2 + 4.0 * h3 - h4
}

/// Returns true if `bits` is the reserved magic-float pattern: top byte `0xFF`
/// and the next byte's high bit clear (the only way our own encoder ever
/// produces this exact shape, since it writes `MAGIC_FLOAT ^ (diff & mask)`
/// with `diff & mask` always < `0x0080_0000`).
#[inline]
pub fn looks_compressed(bits: u32) -> bool {
    (bits >> 24) == 0xFF && (bits >> 16) & 0xFF < 0x80
}

/// Attempts to replace `actual` with a magic-float-encoded prediction error
/// against `predicted`. Returns `Some(encoded_bits)` on success, `None` if the
/// diff exceeds `mask` and the field must be left untouched.
pub fn encode_predicted(actual: f32, predicted: f32, mask: u32) -> Option<u32> {
    let diff = actual.to_bits() ^ predicted.to_bits();
    if diff <= mask {
        Some(MAGIC_FLOAT ^ diff)
    } else {
        None
    }
}

/// Reverses [`encode_predicted`]: given the stored bits and the same
/// prediction the encoder used, reconstructs the original float.
pub fn decode_predicted(stored_bits: u32, predicted: f32) -> f32 {
    let diff = stored_bits ^ MAGIC_FLOAT;
    f32::from_bits(predicted.to_bits() ^ diff)
}

/// An analog field's quantum: joystick/c-stick/triggers are reported as
/// `k / divisor` for small integer `k`.
#[derive(Debug, Clone, Copy)]
pub struct AnalogQuantum {
    pub divisor: f32,
    pub signed: bool,
}

pub const STICK_QUANTUM: AnalogQuantum = AnalogQuantum { divisor: 80.0, signed: true };
pub const TRIGGER_QUANTUM: AnalogQuantum = AnalogQuantum { divisor: 140.0, signed: false };

impl AnalogQuantum {
    /// Tries to represent `value` as a single quantized byte. Succeeds only
    /// if doing so and converting back reproduces `value` exactly.
    pub fn quantize(&self, value: f32) -> Option<i16> {
        let k = (value * self.divisor).round();
        if self.signed {
            if !(i8::MIN as f32..=i8::MAX as f32).contains(&k) {
                return None;
            }
        } else if !(0.0..=u8::MAX as f32).contains(&k) {
            return None;
        }
        let reconstructed = k / self.divisor;
        if reconstructed == value {
            Some(k as i16)
        } else {
            None
        }
    }

    pub fn dequantize(&self, k: i16) -> f32 {
        k as f32 / self.divisor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_float_round_trips() {
        let predicted = 1.5f32;
        let actual = 1.5000001f32;
        let mask = MAXDIFF_VELOCITY;
        if let Some(bits) = encode_predicted(actual, predicted, mask) {
            assert!(looks_compressed(bits));
            let restored = decode_predicted(bits, predicted);
            assert_eq!(restored, actual);
        }
    }

    #[test]
    fn stick_quantum_round_trips_common_values() {
        for k in -80i16..=80 {
            let v = k as f32 / 80.0;
            assert_eq!(STICK_QUANTUM.quantize(v), Some(k));
            assert_eq!(STICK_QUANTUM.dequantize(k), v);
        }
    }

    #[test]
    fn unquantizable_value_returns_none() {
        assert_eq!(STICK_QUANTUM.quantize(0.123456), None);
    }
}
