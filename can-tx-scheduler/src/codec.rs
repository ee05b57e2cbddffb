//! Signal Codec
//!
//! Converts a signal's live value into a partial 8-byte payload and back.
//! Every encoded payload is zero outside the cells the signal declares, which
//! is what lets the frame composer combine disjoint signals with a plain OR.
//!
//! Bit placement convention: the raw value is rendered most significant bit
//! first, and bit `i` of that rendering lands on `positions[i]` of the target
//! byte, where bit index 0 is the least significant bit of that byte.

use crate::signal::SignalSpec;
use crate::types::{ConfigError, LiveValue, Payload, Result, Signedness, ValueFormat, Width, FRAME_LEN};
use byteorder::{ByteOrder, LittleEndian};

/// Encode `value` according to `spec`
///
/// Returns a payload where only the signal's own cells may be nonzero.
pub fn encode(spec: &SignalSpec, value: &LiveValue) -> Result<Payload> {
    spec.validate()?;

    match spec.format {
        ValueFormat::Ascii => encode_ascii(spec, &ascii_text(value)),
        ValueFormat::Numeric => {
            let physical = numeric_value(spec, value)?;
            let raw = to_raw(spec, physical)?;
            Ok(place_raw(spec, raw))
        }
    }
}

/// Decode the signal's value from a frame payload
///
/// Numeric signals yield `raw * resolution`; ASCII signals yield the text
/// with trailing pad spaces removed.
pub fn decode(spec: &SignalSpec, payload: &Payload) -> Result<LiveValue> {
    match spec.format {
        ValueFormat::Ascii => {
            spec.validate()?;
            let text: String = spec
                .positions
                .iter()
                .map(|&offset| payload[offset as usize] as char)
                .collect();
            Ok(LiveValue::Text(text.trim_end_matches(' ').to_string()))
        }
        ValueFormat::Numeric => {
            let raw = decode_raw(spec, payload)?;
            Ok(LiveValue::Number(raw as f64 * spec.resolution))
        }
    }
}

/// Extract the raw integer of a numeric signal, sign-extended if signed
pub fn decode_raw(spec: &SignalSpec, payload: &Payload) -> Result<i128> {
    spec.validate()?;

    let bits = match spec.width {
        Width::Bits(_) => {
            let byte = payload[spec.target_byte as usize];
            spec.positions
                .iter()
                .fold(0u64, |acc, &bit| (acc << 1) | u64::from((byte >> bit) & 0x01))
        }
        Width::Bytes(_) => {
            let mut le = [0u8; FRAME_LEN];
            for (i, &offset) in spec.positions.iter().enumerate() {
                le[i] = payload[offset as usize];
            }
            LittleEndian::read_u64(&le)
        }
    };

    let bit_len = spec.width.bit_len();
    Ok(match spec.signedness {
        Signedness::Unsigned => i128::from(bits),
        Signedness::Signed => i128::from(sign_extend(bits, bit_len)),
    })
}

/// Inclusive raw-integer domain of a numeric signal
pub fn raw_range(spec: &SignalSpec) -> (i128, i128) {
    let bit_len = spec.width.bit_len().clamp(1, 64);
    match spec.signedness {
        Signedness::Unsigned => (0, (1i128 << bit_len) - 1),
        Signedness::Signed => (-(1i128 << (bit_len - 1)), (1i128 << (bit_len - 1)) - 1),
    }
}

/// Coerce a live value to a physical number
///
/// Text is accepted because presentation layers hand over raw widget input.
fn numeric_value(spec: &SignalSpec, value: &LiveValue) -> Result<f64> {
    let physical = match value {
        LiveValue::Number(v) => *v,
        LiveValue::Text(text) => text.trim().parse::<f64>().map_err(|_| ConfigError::InvalidValue {
            signal: spec.name.clone(),
            reason: format!("'{}' is not a number", text),
        })?,
    };

    if !physical.is_finite() {
        return Err(ConfigError::InvalidValue {
            signal: spec.name.clone(),
            reason: format!("{} is not finite", physical),
        });
    }

    Ok(physical)
}

/// Scale, round half away from zero and range-check
fn to_raw(spec: &SignalSpec, physical: f64) -> Result<i128> {
    let scaled = physical / spec.resolution;
    if !scaled.is_finite() {
        return Err(ConfigError::InvalidValue {
            signal: spec.name.clone(),
            reason: format!("{} / {} is not finite", physical, spec.resolution),
        });
    }

    // `as` saturates, so anything beyond i128 still fails the range check
    let raw = scaled.round() as i128;
    let (min, max) = raw_range(spec);
    if raw < min || raw > max {
        return Err(ConfigError::ValueOutOfRange {
            signal: spec.name.clone(),
            raw,
            min,
            max,
        });
    }

    Ok(raw)
}

/// Place an in-range raw value into an otherwise zero payload
fn place_raw(spec: &SignalSpec, raw: i128) -> Payload {
    let bit_len = spec.width.bit_len();
    let bits = to_twos_complement(raw, bit_len);
    let mut payload = [0u8; FRAME_LEN];

    match spec.width {
        Width::Bits(n) => {
            let target = &mut payload[spec.target_byte as usize];
            for (i, &bit) in spec.positions.iter().enumerate() {
                let shift = u32::from(n) - 1 - i as u32;
                if (bits >> shift) & 0x01 != 0 {
                    *target |= 1 << bit;
                }
            }
        }
        Width::Bytes(_) => {
            let mut le = [0u8; FRAME_LEN];
            LittleEndian::write_u64(&mut le, bits);
            for (i, &offset) in spec.positions.iter().enumerate() {
                payload[offset as usize] = le[i];
            }
        }
    }

    payload
}

fn encode_ascii(spec: &SignalSpec, text: &str) -> Result<Payload> {
    if let Some(bad) = text.chars().find(|c| !c.is_ascii()) {
        return Err(ConfigError::InvalidValue {
            signal: spec.name.clone(),
            reason: format!("character '{}' is not ASCII", bad),
        });
    }

    let mut payload = [0u8; FRAME_LEN];
    let mut chars = text.bytes();
    for &offset in &spec.positions {
        payload[offset as usize] = chars.next().unwrap_or(b' ');
    }

    Ok(payload)
}

fn ascii_text(value: &LiveValue) -> String {
    match value {
        LiveValue::Text(text) => text.clone(),
        LiveValue::Number(v) => v.to_string(),
    }
}

/// Offset negative values by 2^bit_len so they fit the field unsigned
fn to_twos_complement(raw: i128, bit_len: u32) -> u64 {
    let unsigned = if raw < 0 { raw + (1i128 << bit_len) } else { raw };
    unsigned as u64
}

/// Sign-extend a value from N bits to 64 bits
///
/// If the value's MSB is 1, fill the upper bits with 1s.
fn sign_extend(value: u64, bit_length: u32) -> i64 {
    if bit_length >= 64 {
        return value as i64;
    }

    let sign_bit = 1u64 << (bit_length - 1);
    if (value & sign_bit) != 0 {
        let mask = !0u64 << bit_length;
        (value | mask) as i64
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells_outside(spec: &SignalSpec, payload: &Payload) -> u64 {
        u64::from_le_bytes(*payload) & !spec.cell_mask()
    }

    #[test]
    fn test_single_byte_standard_frame() {
        let spec = SignalSpec::new("A", 0x08, Width::Bytes(1), vec![0]);
        let payload = encode(&spec, &LiveValue::Number(0x11 as f64)).unwrap();
        assert_eq!(payload, [0x11, 0, 0, 0, 0, 0, 0, 0]);
        assert!(!spec.is_extended());
    }

    #[test]
    fn test_single_byte_extended_frame() {
        let spec = SignalSpec::new("B", 0x1853_0902, Width::Bytes(1), vec![1]);
        let payload = encode(&spec, &LiveValue::Number(0x24 as f64)).unwrap();
        assert_eq!(payload, [0, 0x24, 0, 0, 0, 0, 0, 0]);
        assert!(spec.is_extended());
    }

    #[test]
    fn test_bits_msb_first() {
        // 9 = "1001": MSB to bit 0, LSB to bit 3
        let spec = SignalSpec::new("nibble", 0x10, Width::Bits(4), vec![0, 1, 2, 3]).with_target_byte(2);
        let payload = encode(&spec, &LiveValue::Number(9.0)).unwrap();
        assert_eq!(payload, [0, 0, 0b0000_1001, 0, 0, 0, 0, 0]);

        // 8 = "1000": only the MSB is set, and it lands on positions[0]
        let payload = encode(&spec, &LiveValue::Number(8.0)).unwrap();
        assert_eq!(payload[2], 0b0000_0001);

        let reversed = SignalSpec::new("nibble", 0x10, Width::Bits(4), vec![3, 2, 1, 0]).with_target_byte(2);
        let payload = encode(&reversed, &LiveValue::Number(8.0)).unwrap();
        assert_eq!(payload[2], 0b0000_1000);
    }

    #[test]
    fn test_bits_extremes() {
        let spec = SignalSpec::new("all", 0x10, Width::Bits(8), vec![7, 6, 5, 4, 3, 2, 1, 0]).with_target_byte(5);
        assert_eq!(encode(&spec, &LiveValue::Number(0.0)).unwrap(), [0; 8]);
        assert_eq!(encode(&spec, &LiveValue::Number(255.0)).unwrap(), [0, 0, 0, 0, 0, 0xFF, 0, 0]);

        let scattered = SignalSpec::new("some", 0x10, Width::Bits(3), vec![6, 1, 4]);
        assert_eq!(encode(&scattered, &LiveValue::Number(0.0)).unwrap()[0], 0);
        assert_eq!(encode(&scattered, &LiveValue::Number(7.0)).unwrap()[0], 0b0101_0010);
    }

    #[test]
    fn test_bytes_little_endian() {
        let spec = SignalSpec::new("word", 0x10, Width::Bytes(2), vec![6, 2]);
        let payload = encode(&spec, &LiveValue::Number(0x1234 as f64)).unwrap();
        assert_eq!(payload, [0, 0, 0x12, 0, 0, 0, 0x34, 0]);
    }

    #[test]
    fn test_ascii_padding() {
        let spec = SignalSpec::ascii("text", 0x10, vec![2, 1, 0]);
        let payload = encode(&spec, &LiveValue::from("AB")).unwrap();
        assert_eq!(payload, [0x20, 0x42, 0x41, 0, 0, 0, 0, 0]);
        assert_eq!(decode(&spec, &payload).unwrap(), LiveValue::from("AB"));
    }

    #[test]
    fn test_ascii_truncation_and_numbers() {
        let spec = SignalSpec::ascii("text", 0x10, vec![0, 1]);
        assert_eq!(encode(&spec, &LiveValue::from("HELLO")).unwrap()[..2], [b'H', b'E']);
        assert_eq!(encode(&spec, &LiveValue::Number(42.0)).unwrap()[..2], [b'4', b'2']);
        assert!(matches!(
            encode(&spec, &LiveValue::from("é")),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_resolution_rounds_half_away_from_zero() {
        let spec = SignalSpec::new("scaled", 0x10, Width::Bytes(1), vec![0])
            .with_signedness(Signedness::Signed)
            .with_resolution(0.5);
        assert_eq!(encode(&spec, &LiveValue::Number(1.25)).unwrap()[0], 3);
        assert_eq!(encode(&spec, &LiveValue::Number(-1.25)).unwrap()[0], (-3i8) as u8);
        assert_eq!(decode(&spec, &[3, 0, 0, 0, 0, 0, 0, 0]).unwrap(), LiveValue::Number(1.5));
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let unsigned = SignalSpec::new("u", 0x10, Width::Bits(3), vec![0, 1, 2]);
        assert!(matches!(
            encode(&unsigned, &LiveValue::Number(8.0)),
            Err(ConfigError::ValueOutOfRange { raw: 8, min: 0, max: 7, .. })
        ));
        assert!(encode(&unsigned, &LiveValue::Number(-1.0)).is_err());

        let signed = unsigned.clone().with_signedness(Signedness::Signed);
        assert!(encode(&signed, &LiveValue::Number(-4.0)).is_ok());
        assert!(encode(&signed, &LiveValue::Number(-5.0)).is_err());
        assert!(encode(&signed, &LiveValue::Number(4.0)).is_err());
    }

    #[test]
    fn test_text_input_for_numeric_signal() {
        let spec = SignalSpec::new("n", 0x10, Width::Bytes(1), vec![3]);
        assert_eq!(encode(&spec, &LiveValue::from(" 17 ")).unwrap()[3], 17);
        assert!(matches!(
            encode(&spec, &LiveValue::from("abc")),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(encode(&spec, &LiveValue::Number(f64::NAN)).is_err());
    }

    #[test]
    fn test_negative_twos_complement_placement() {
        let spec = SignalSpec::new("s", 0x10, Width::Bytes(2), vec![0, 1]).with_signedness(Signedness::Signed);
        let payload = encode(&spec, &LiveValue::Number(-2.0)).unwrap();
        assert_eq!(payload, [0xFE, 0xFF, 0, 0, 0, 0, 0, 0]);

        let bits = SignalSpec::new("s", 0x10, Width::Bits(4), vec![7, 6, 5, 4]).with_signedness(Signedness::Signed);
        let payload = encode(&bits, &LiveValue::Number(-1.0)).unwrap();
        assert_eq!(payload[0], 0xF0);
    }

    #[test]
    fn test_round_trip_all_bit_widths() {
        for n in 1..=8u8 {
            let positions: Vec<u8> = (0..n).rev().collect();
            for signedness in [Signedness::Unsigned, Signedness::Signed] {
                let spec = SignalSpec::new("rt", 0x10, Width::Bits(n), positions.clone())
                    .with_target_byte(n - 1)
                    .with_signedness(signedness);
                let (min, max) = raw_range(&spec);
                for v in min..=max {
                    let payload = encode(&spec, &LiveValue::Number(v as f64)).unwrap();
                    assert_eq!(decode_raw(&spec, &payload).unwrap(), v);
                    assert_eq!(cells_outside(&spec, &payload), 0);
                }
            }
        }
    }

    #[test]
    fn test_round_trip_two_byte_values() {
        for signedness in [Signedness::Unsigned, Signedness::Signed] {
            let spec = SignalSpec::new("rt", 0x10, Width::Bytes(2), vec![5, 3]).with_signedness(signedness);
            let (min, max) = raw_range(&spec);
            for v in (min..=max).step_by(7).chain([min, max]) {
                let payload = encode(&spec, &LiveValue::Number(v as f64)).unwrap();
                assert_eq!(decode_raw(&spec, &payload).unwrap(), v);
                assert_eq!(cells_outside(&spec, &payload), 0);
            }
        }
    }

    #[test]
    fn test_full_width_extremes() {
        let signed = SignalSpec::new("wide", 0x10, Width::Bytes(8), vec![0, 1, 2, 3, 4, 5, 6, 7])
            .with_signedness(Signedness::Signed);
        let payload = encode(&signed, &LiveValue::Number(-1.0)).unwrap();
        assert_eq!(payload, [0xFF; 8]);
        assert_eq!(decode_raw(&signed, &payload).unwrap(), -1);

        let unsigned = SignalSpec::new("wide", 0x10, Width::Bytes(4), vec![0, 1, 2, 3]);
        let payload = encode(&unsigned, &LiveValue::Number(u32::MAX as f64)).unwrap();
        assert_eq!(payload, [0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
        assert_eq!(decode_raw(&unsigned, &payload).unwrap(), u32::MAX as i128);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0x7F, 8), 127);
        assert_eq!(sign_extend(0xFF, 8), -1);
        assert_eq!(sign_extend(0x8000, 16), -32768);
        assert_eq!(sign_extend(u64::MAX, 64), -1);
    }
}
