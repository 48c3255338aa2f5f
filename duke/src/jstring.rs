//! Conversion between the "modified UTF-8" used by `CONSTANT_Utf8` entries and rust strings.
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.4.7>.

use std::borrow::Cow;
use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};

/// Decodes a `CONSTANT_Utf8` payload into a rust string.
///
/// Names and descriptors never contain unpaired surrogates, so those are rejected here.
pub(crate) fn decode(bytes: &[u8]) -> Result<String> {
	JavaString::from_modified_utf8(bytes.to_vec())
		.with_context(|| anyhow!("invalid java utf8 contents: {bytes:?}"))?
		.into_string()
		.map_err(|_| anyhow!("java string contains unpaired surrogates: {bytes:?}"))
}

/// Encodes a rust string into a `CONSTANT_Utf8` payload.
pub(crate) fn encode(string: &str) -> Cow<'_, [u8]> {
	JavaStr::from_str(string).to_modified_utf8()
}
