// Method descriptor helpers.

use crate::error::{PackError, Result};

/// Local-variable slots taken by the parameters of a method descriptor.
/// `long` and `double` take two slots, everything else one.
pub fn param_slots(descriptor: &[u8]) -> Result<u16> {
    let bad = || {
        PackError::malformed(format!(
            "invalid method descriptor {:?}",
            String::from_utf8_lossy(descriptor)
        ))
    };
    let params = descriptor
        .strip_prefix(b"(")
        .and_then(|rest| rest.iter().position(|&b| b == b')').map(|end| &rest[..end]))
        .ok_or_else(bad)?;

    let mut slots = 0u16;
    let mut i = 0;
    while i < params.len() {
        let mut array = false;
        while params.get(i) == Some(&b'[') {
            array = true;
            i += 1;
        }
        let width = match params.get(i) {
            Some(b'J' | b'D') if !array => 2,
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => 1,
            Some(b'L') => {
                let end = params[i..].iter().position(|&b| b == b';').ok_or_else(bad)?;
                i += end;
                1
            }
            _ => return Err(bad()),
        };
        slots = slots.checked_add(width).ok_or_else(|| {
            PackError::malformed("method parameters take more than 65535 local slots")
        })?;
        i += 1;
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_slots() {
        assert_eq!(param_slots(b"()V").unwrap(), 0);
        assert_eq!(param_slots(b"(IJ)V").unwrap(), 3);
        assert_eq!(param_slots(b"(Ljava/lang/String;D[J)I").unwrap(), 4);
        assert_eq!(param_slots(b"([[Ljava/lang/Object;Z)V").unwrap(), 2);
    }

    #[test]
    fn slot_count_overflow_is_an_error() {
        let mut wide = b"(".to_vec();
        wide.extend(std::iter::repeat_n(b'J', 40_000));
        wide.extend_from_slice(b")V");
        assert!(matches!(param_slots(&wide), Err(PackError::Malformed(_))));

        let mut fits = b"(".to_vec();
        fits.extend(std::iter::repeat_n(b'J', 32_767));
        fits.extend_from_slice(b"I)V");
        assert_eq!(param_slots(&fits).unwrap(), u16::MAX);
    }

    #[test]
    fn rejects_garbage() {
        assert!(param_slots(b"V").is_err());
        assert!(param_slots(b"(Ljava/lang/String)V").is_err());
        assert!(param_slots(b"(Q)V").is_err());
    }
}
