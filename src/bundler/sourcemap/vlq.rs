//! Base64-VLQ encoding used by the `mappings` field.

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const VLQ_BASE_SHIFT: u32 = 5;
const VLQ_BASE: i64 = 1 << VLQ_BASE_SHIFT;
const VLQ_BASE_MASK: i64 = VLQ_BASE - 1;
const VLQ_CONTINUATION_BIT: i64 = VLQ_BASE;

fn digit_value(byte: u8) -> Option<i64> {
    let value = match byte {
        b'A'..=b'Z' => byte - b'A',
        b'a'..=b'z' => byte - b'a' + 26,
        b'0'..=b'9' => byte - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(value as i64)
}

/// Appends the VLQ encoding of `value` to `out`.
pub fn encode(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };

    loop {
        let mut digit = vlq & VLQ_BASE_MASK;
        vlq >>= VLQ_BASE_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION_BIT;
        }
        out.push(ALPHABET[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

/// Decodes every VLQ value of one segment (the text between commas).
pub fn decode_segment(segment: &str) -> Result<Vec<i64>, String> {
    let mut values = Vec::with_capacity(5);
    let mut value: i64 = 0;
    let mut shift = 0u32;
    let mut pending = false;

    for byte in segment.bytes() {
        let digit =
            digit_value(byte).ok_or_else(|| format!("invalid base64 character `{}`", byte as char))?;
        if shift > 60 {
            return Err("VLQ value overflows 64 bits".into());
        }
        value += (digit & VLQ_BASE_MASK) << shift;
        pending = true;

        if digit & VLQ_CONTINUATION_BIT != 0 {
            shift += VLQ_BASE_SHIFT;
            continue;
        }

        let negative = value & 1 == 1;
        let magnitude = value >> 1;
        values.push(if negative { -magnitude } else { magnitude });
        value = 0;
        shift = 0;
        pending = false;
    }

    if pending {
        return Err(format!("truncated VLQ value in segment `{segment}`"));
    }
    Ok(values)
}
