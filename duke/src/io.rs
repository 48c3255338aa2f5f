use std::io::{Read, Write};
use anyhow::{bail, Context, Result};

/// The most that is allocated up front for a length read from the data, larger ones grow while reading.
const MAX_PREALLOCATION: usize = 1 << 20;

/// Big endian reading of the primitive types of the class file format.
pub(crate) trait ClassRead: Read {
	fn read_n<const N: usize>(&mut self) -> Result<[u8; N]> {
		let mut buf = [0u8; N];
		self.read_exact(&mut buf)
			.with_context(|| format!("unexpected end of data, expected {N} more bytes"))?;
		Ok(buf)
	}
	fn read_u8(&mut self) -> Result<u8> {
		Ok(u8::from_be_bytes(self.read_n()?))
	}
	fn read_u16(&mut self) -> Result<u16> {
		Ok(u16::from_be_bytes(self.read_n()?))
	}
	fn read_u32(&mut self) -> Result<u32> {
		Ok(u32::from_be_bytes(self.read_n()?))
	}
	fn read_u64(&mut self) -> Result<u64> {
		Ok(u64::from_be_bytes(self.read_n()?))
	}
	fn read_u8_vec(&mut self, size: usize) -> Result<Vec<u8>> {
		let mut vec = Vec::with_capacity(size.min(MAX_PREALLOCATION));
		(&mut *self).take(size as u64).read_to_end(&mut vec)
			.context("failed to read data")?;
		if vec.len() != size {
			bail!("unexpected end of data, expected {size} bytes but got {}", vec.len());
		}
		Ok(vec)
	}
	/// Reads a `u16` length, followed by that many elements.
	fn read_vec<T>(&mut self, mut get_element: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
		let size = self.read_u16()? as usize;
		let mut vec = Vec::with_capacity(size);
		for _ in 0..size {
			vec.push(get_element(self)?);
		}
		Ok(vec)
	}
}
impl<T: Read + ?Sized> ClassRead for T {}

pub(crate) trait ClassWrite: Write {
	fn write_u8(&mut self, value: u8) -> Result<()> {
		Ok(self.write_all(&value.to_be_bytes())?)
	}
	fn write_u16(&mut self, value: u16) -> Result<()> {
		Ok(self.write_all(&value.to_be_bytes())?)
	}
	fn write_u32(&mut self, value: u32) -> Result<()> {
		Ok(self.write_all(&value.to_be_bytes())?)
	}
	fn write_u64(&mut self, value: u64) -> Result<()> {
		Ok(self.write_all(&value.to_be_bytes())?)
	}
	fn write_usize_as_u16(&mut self, value: usize) -> Result<()> {
		let Ok(value) = u16::try_from(value) else {
			bail!("length {value} doesn't fit into an u16");
		};
		self.write_u16(value)
	}
	fn write_usize_as_u32(&mut self, value: usize) -> Result<()> {
		let Ok(value) = u32::try_from(value) else {
			bail!("length {value} doesn't fit into an u32");
		};
		self.write_u32(value)
	}
	/// Writes a `u16` length, followed by the elements.
	fn write_vec<T>(&mut self, vec: &[T], mut put_element: impl FnMut(&mut Self, &T) -> Result<()>) -> Result<()> {
		self.write_usize_as_u16(vec.len())?;
		for element in vec {
			put_element(self, element)?;
		}
		Ok(())
	}
}
impl<T: Write + ?Sized> ClassWrite for T {}

#[cfg(test)]
mod testing {
	use std::io::Cursor;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::io::{ClassRead, ClassWrite};

	#[test]
	fn vec_round_trip() -> Result<()> {
		let mut buf = Vec::new();
		buf.write_vec(&[0x1234u16, 0xabcd], |w, x| w.write_u16(*x))?;
		assert_eq!(buf, vec![0, 2, 0x12, 0x34, 0xab, 0xcd]);

		let read = Cursor::new(&buf).read_vec(|r| r.read_u16())?;
		assert_eq!(read, vec![0x1234, 0xabcd]);
		Ok(())
	}

	#[test]
	fn short_read_fails() {
		assert!(Cursor::new(&[0u8]).read_u16().is_err());
	}

	#[test]
	fn huge_length_fails_without_allocating() -> Result<()> {
		assert!(Cursor::new(&[1u8, 2, 3]).read_u8_vec(usize::MAX).is_err());
		assert!(Cursor::new(&[1u8, 2, 3]).read_u8_vec(u32::MAX as usize).is_err());
		assert_eq!(Cursor::new(&[1u8, 2, 3]).read_u8_vec(2)?, vec![1, 2]);
		Ok(())
	}
}
