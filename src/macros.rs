//! # Internal Macros
//!
//! ## typed_io!
//!
//! Generates the endianness-converting accessor triple for one scalar type
//! on [`crate::Buffer`]: an advancing reader, a non-advancing getter and an
//! advancing writer. Conversion between host order and the buffer's
//! configured byte order happens on every call; raw byte I/O never converts.
//!
//! ### Usage
//!
//! ```ignore
//! impl Buffer {
//!     typed_io!(u32 => read_u32, get_u32, write_u32);
//! }
//!
//! // Generates:
//! // pub fn read_u32(&mut self, cur: &mut Cursor) -> Result<u32>
//! // pub fn get_u32(&mut self, cur: &Cursor) -> Result<u32>
//! // pub fn write_u32(&mut self, cur: &mut Cursor, value: u32) -> Result<()>
//! ```

macro_rules! typed_io {
    ($t:ty => $read:ident, $get:ident, $write:ident) => {
        /// Reads one value at the cursor and advances past it.
        pub fn $read(&mut self, cur: &mut Cursor) -> Result<$t> {
            let mut raw = [0u8; std::mem::size_of::<$t>()];
            self.read_bytes(cur, &mut raw)?;
            Ok(match self.endianness() {
                Endianness::Little => <$t>::from_le_bytes(raw),
                Endianness::Big => <$t>::from_be_bytes(raw),
            })
        }

        /// Reads one value at the cursor without advancing.
        pub fn $get(&mut self, cur: &Cursor) -> Result<$t> {
            let mut raw = [0u8; std::mem::size_of::<$t>()];
            self.peek_bytes(cur, &mut raw)?;
            Ok(match self.endianness() {
                Endianness::Little => <$t>::from_le_bytes(raw),
                Endianness::Big => <$t>::from_be_bytes(raw),
            })
        }

        /// Writes one value at the cursor and advances past it.
        pub fn $write(&mut self, cur: &mut Cursor, value: $t) -> Result<()> {
            let raw = match self.endianness() {
                Endianness::Little => value.to_le_bytes(),
                Endianness::Big => value.to_be_bytes(),
            };
            self.write_bytes(cur, &raw)
        }
    };
}
