//! Decimal integer parsing at a cursor.
//!
//! Parsers consume ASCII digits (with an optional leading sign for the
//! signed family) directly from the buffer, stopping at the first non-digit
//! byte or the end of the range. When `skip_delimiter` is set, one
//! terminating byte is consumed as well so that repeated calls walk a
//! delimited record. Out-of-range values are recoverable errors, not
//! truncations.

use eyre::{bail, ensure, Result};

use super::buffer::Buffer;
use super::cursor::Cursor;

impl Buffer {
    /// Parses an unsigned decimal integer at the cursor. Zero digits parse
    /// as 0 without moving past non-digit input.
    pub fn parse_u64(&mut self, cur: &mut Cursor, skip_delimiter: bool) -> Result<u64> {
        let value = self.parse_digits(cur)?;
        if skip_delimiter && !self.at_end(cur) {
            self.step(cur, 1)?;
        }
        ensure!(
            value <= u64::MAX as u128,
            "parsed value {value} exceeds u64 range"
        );
        Ok(value as u64)
    }

    /// Parses a signed decimal integer at the cursor, with an optional
    /// leading `+` or `-`.
    pub fn parse_i64(&mut self, cur: &mut Cursor, skip_delimiter: bool) -> Result<i64> {
        ensure!(
            cur.bit() == 0,
            "cursor at bit {} is not byte aligned",
            cur.bit()
        );
        let mut negative = false;
        if !self.at_end(cur) {
            match self.get_u8(cur)? {
                b'-' => {
                    negative = true;
                    self.step(cur, 1)?;
                }
                b'+' => {
                    self.step(cur, 1)?;
                }
                _ => {}
            }
        }
        let magnitude = self.parse_digits(cur)?;
        if skip_delimiter && !self.at_end(cur) {
            self.step(cur, 1)?;
        }
        let value = if negative {
            let min = i64::MIN.unsigned_abs() as u128;
            ensure!(magnitude <= min, "parsed value -{magnitude} exceeds i64 range");
            (magnitude as i128).wrapping_neg() as i64
        } else {
            ensure!(
                magnitude <= i64::MAX as u128,
                "parsed value {magnitude} exceeds i64 range"
            );
            magnitude as i64
        };
        Ok(value)
    }

    fn parse_digits(&mut self, cur: &mut Cursor) -> Result<u128> {
        ensure!(
            cur.bit() == 0,
            "cursor at bit {} is not byte aligned",
            cur.bit()
        );
        let mut value: u128 = 0;
        while !self.at_end(cur) {
            let byte = self.get_u8(cur)?;
            if !byte.is_ascii_digit() {
                break;
            }
            value = match value
                .checked_mul(10)
                .and_then(|v| v.checked_add((byte - b'0') as u128))
            {
                Some(v) => v,
                None => bail!("decimal literal too long for any integer type"),
            };
            self.step(cur, 1)?;
        }
        Ok(value)
    }
}

macro_rules! parse_narrow {
    ($name:ident, $t:ty, signed) => {
        impl Buffer {
            /// Parses a signed decimal integer; values outside the target
            /// range are errors.
            pub fn $name(&mut self, cur: &mut Cursor, skip_delimiter: bool) -> Result<$t> {
                let wide = self.parse_i64(cur, skip_delimiter)?;
                match <$t>::try_from(wide) {
                    Ok(v) => Ok(v),
                    Err(_) => bail!(
                        "parsed value {wide} outside {} range",
                        stringify!($t)
                    ),
                }
            }
        }
    };
    ($name:ident, $t:ty, unsigned) => {
        impl Buffer {
            /// Parses an unsigned decimal integer; values outside the target
            /// range are errors.
            pub fn $name(&mut self, cur: &mut Cursor, skip_delimiter: bool) -> Result<$t> {
                let wide = self.parse_u64(cur, skip_delimiter)?;
                match <$t>::try_from(wide) {
                    Ok(v) => Ok(v),
                    Err(_) => bail!(
                        "parsed value {wide} outside {} range",
                        stringify!($t)
                    ),
                }
            }
        }
    };
}

parse_narrow!(parse_i8, i8, signed);
parse_narrow!(parse_i16, i16, signed);
parse_narrow!(parse_i32, i32, signed);
parse_narrow!(parse_u8, u8, unsigned);
parse_narrow!(parse_u16, u16, unsigned);
parse_narrow!(parse_u32, u32, unsigned);

#[cfg(test)]
mod tests {
    use super::*;

    fn text_buffer(text: &str) -> (Buffer, Cursor) {
        let mut buffer = Buffer::builder()
            .part_size(16)
            .fixed_range(crate::ByteRange::new(0, text.len() as i64))
            .build()
            .unwrap();
        let mut cur = buffer.cursor_at(0).unwrap();
        buffer.write_bytes(&mut cur, text.as_bytes()).unwrap();
        buffer.locate(&mut cur, 0).unwrap();
        (buffer, cur)
    }

    #[test]
    fn parses_delimited_fields() {
        let (mut buffer, mut cur) = text_buffer("42,-17,0");
        assert_eq!(buffer.parse_u64(&mut cur, true).unwrap(), 42);
        assert_eq!(buffer.parse_i64(&mut cur, true).unwrap(), -17);
        assert_eq!(buffer.parse_i64(&mut cur, false).unwrap(), 0);
        assert!(buffer.at_end(&cur));
    }

    #[test]
    fn stops_at_non_digit_without_skip() {
        let (mut buffer, mut cur) = text_buffer("123x");
        assert_eq!(buffer.parse_u64(&mut cur, false).unwrap(), 123);
        assert_eq!(buffer.get_u8(&cur).unwrap(), b'x');
    }

    #[test]
    fn zero_digits_parse_as_zero() {
        let (mut buffer, mut cur) = text_buffer("abc");
        assert_eq!(buffer.parse_i64(&mut cur, false).unwrap(), 0);
        assert_eq!(cur.position(), 0, "non-digit input is not consumed");
    }

    #[test]
    fn leading_plus_is_accepted() {
        let (mut buffer, mut cur) = text_buffer("+250");
        assert_eq!(buffer.parse_i64(&mut cur, false).unwrap(), 250);
    }

    #[test]
    fn extreme_values_round_trip() {
        let (mut buffer, mut cur) = text_buffer("-9223372036854775808 18446744073709551615");
        assert_eq!(buffer.parse_i64(&mut cur, true).unwrap(), i64::MIN);
        assert_eq!(buffer.parse_u64(&mut cur, false).unwrap(), u64::MAX);
    }

    #[test]
    fn out_of_range_is_a_recoverable_error() {
        let (mut buffer, mut cur) = text_buffer("300");
        assert!(buffer.parse_u8(&mut cur, false).is_err());

        let (mut buffer, mut cur) = text_buffer("32768");
        assert!(buffer.parse_i16(&mut cur, false).is_err());
        let (mut buffer, mut cur) = text_buffer("-32768");
        assert_eq!(buffer.parse_i16(&mut cur, false).unwrap(), i16::MIN);
    }

    #[test]
    fn overlong_literal_is_an_error() {
        let (mut buffer, mut cur) = text_buffer("184467440737095516151844674407370955161518446744073709551615");
        assert!(buffer.parse_u64(&mut cur, false).is_err());
    }
}
