//! Layout of the encrypted key package sent to the enclave.
//!
//! Plaintext package, before encryption:
//!
//! ```text
//! [16-byte package id][8-byte LE counter][32-byte query hash][key sections...]
//! ```
//!
//! Each key section carries one decrypted column encryption key:
//!
//! ```text
//! database_id: i32 LE
//! md_version_len: u32 LE
//! cek_md_version: md_version_len bytes
//! cek_id: i32 LE
//! key_len: u32 LE
//! key: key_len bytes
//! ```
//!
//! The transmitted message prepends the 8-byte LE session id to the
//! ciphertext of the package.

use bytes::BufMut;

/// Size of the random package identifier (diagnostic correlation only).
pub const PACKAGE_ID_LEN: usize = 16;

/// Size of the anti-replay counter field.
pub const COUNTER_LEN: usize = 8;

/// Size of the SHA-256 query hash field.
pub const QUERY_HASH_LEN: usize = 32;

/// Size of the session id prefixed to the encrypted package.
pub const SESSION_HANDLE_LEN: usize = 8;

/// Serialized size of one key section with the given variable-length parts.
pub fn key_section_len(md_version_len: usize, key_len: usize) -> usize {
    4 + 4 + md_version_len + 4 + key_len
}

/// Append one key section to `buf` in the fixed layout above.
pub fn put_key_section(
    buf: &mut impl BufMut,
    database_id: i32,
    cek_md_version: &[u8],
    cek_id: i32,
    key: &[u8],
) {
    buf.put_i32_le(database_id);
    buf.put_u32_le(cek_md_version.len() as u32);
    buf.put_slice(cek_md_version);
    buf.put_i32_le(cek_id);
    buf.put_u32_le(key.len() as u32);
    buf.put_slice(key);
}
