//! IEEE 754 80-bit extended float codec, used to decode the AIFF sample-rate
//! field without precision loss in the integer range the domain uses.
//!
//! Ported from `util::convertFromIeeeExtended` / `convertToIeeeExtended` in
//! `original_source/src/inc/IEEE754.cpp` (itself derived from the classic
//! Apple/Slaney/Turkowski public-domain routine).

/// Decodes a big-endian 10-byte IEEE 754 extended-precision float.
pub fn extended_to_f64(bytes: &[u8; 10]) -> f64 {
    let expon = (((bytes[0] & 0x7F) as i32) << 8) | bytes[1] as i32;
    let hi_mant = ((bytes[2] as u64) << 24)
        | ((bytes[3] as u64) << 16)
        | ((bytes[4] as u64) << 8)
        | (bytes[5] as u64);
    let lo_mant = ((bytes[6] as u64) << 24)
        | ((bytes[7] as u64) << 16)
        | ((bytes[8] as u64) << 8)
        | (bytes[9] as u64);

    let f = if expon == 0 && hi_mant == 0 && lo_mant == 0 {
        0.0
    } else if expon == 0x7FFF {
        f64::INFINITY
    } else {
        let e = expon - 16_383;
        let hi = hi_mant as f64;
        let lo = lo_mant as f64;
        hi * 2f64.powi(e - 31) + lo * 2f64.powi(e - 63)
    };

    if bytes[0] & 0x80 != 0 {
        -f
    } else {
        f
    }
}

/// Encodes a non-negative value as a big-endian 10-byte IEEE 754 extended
/// float, used by tests to round-trip sample rates through the same codec
/// the AIFF parser consumes.
pub fn f64_to_extended(value: f64) -> [u8; 10] {
    let mut bytes = [0u8; 10];
    if value == 0.0 {
        return bytes;
    }

    let sign: u16 = if value < 0.0 { 0x8000 } else { 0 };
    let magnitude = value.abs();
    let expon_unbiased = magnitude.log2().floor() as i32;
    let mantissa = magnitude / 2f64.powi(expon_unbiased);
    let expon = (expon_unbiased + 16_383) as u16 | sign;

    let shifted = mantissa * 2f64.powi(32);
    let hi_mant = shifted.floor() as u64;
    let frac = shifted - shifted.floor();
    let lo_mant = (frac * 2f64.powi(32)).floor() as u64;

    bytes[0] = (expon >> 8) as u8;
    bytes[1] = expon as u8;
    bytes[2] = (hi_mant >> 24) as u8;
    bytes[3] = (hi_mant >> 16) as u8;
    bytes[4] = (hi_mant >> 8) as u8;
    bytes[5] = hi_mant as u8;
    bytes[6] = (lo_mant >> 24) as u8;
    bytes[7] = (lo_mant >> 16) as u8;
    bytes[8] = (lo_mant >> 8) as u8;
    bytes[9] = lo_mant as u8;
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_common_sample_rates() {
        for rate in [44_100.0, 48_000.0, 96_000.0, 192_000.0, 352_800.0] {
            let encoded = f64_to_extended(rate);
            let decoded = extended_to_f64(&encoded);
            assert!(
                (decoded - rate).abs() < 1.0,
                "rate {rate} round-tripped to {decoded}"
            );
        }
    }

    #[test]
    fn zero_round_trips_to_zero() {
        let encoded = f64_to_extended(0.0);
        assert_eq!(extended_to_f64(&encoded), 0.0);
    }
}
