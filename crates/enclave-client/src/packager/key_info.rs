//! [`ColumnEncryptionKeyInfo`]: one decrypted CEK ready for the enclave.

use std::sync::Arc;

use bytes::BufMut;
use enclave_wire::package;

use crate::keys::SymmetricKey;

/// A decrypted column encryption key plus the identifiers the enclave uses
/// to register it: database id, key metadata version, and key id.
///
/// The cek id is always taken from the entry's first encrypted value; when a
/// key is wrapped by several column master keys, the id and plaintext are
/// identical across values and only the encrypted bytes differ.
#[derive(Debug)]
pub struct ColumnEncryptionKeyInfo {
    root_key: Arc<SymmetricKey>,
    database_id: i32,
    cek_md_version: Vec<u8>,
    cek_id: i32,
}

impl ColumnEncryptionKeyInfo {
    pub fn new(
        root_key: Arc<SymmetricKey>,
        database_id: i32,
        cek_md_version: Vec<u8>,
        cek_id: i32,
    ) -> Self {
        Self {
            root_key,
            database_id,
            cek_md_version,
            cek_id,
        }
    }

    pub fn database_id(&self) -> i32 {
        self.database_id
    }

    pub fn cek_id(&self) -> i32 {
        self.cek_id
    }

    pub fn cek_md_version(&self) -> &[u8] {
        &self.cek_md_version
    }

    pub fn root_key(&self) -> &[u8] {
        self.root_key.root_key()
    }

    /// Exact size of this key's wire section.
    pub fn serialized_len(&self) -> usize {
        package::key_section_len(self.cek_md_version.len(), self.root_key().len())
    }

    /// Append this key's wire section to `buf`.
    pub fn serialize_into(&self, buf: &mut impl BufMut) {
        package::put_key_section(
            buf,
            self.database_id,
            &self.cek_md_version,
            self.cek_id,
            self.root_key(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn serialized_len_matches_written_bytes() {
        let key = ColumnEncryptionKeyInfo::new(
            Arc::new(SymmetricKey::new(vec![0x33; 32]).unwrap()),
            12,
            vec![0x01; 8],
            4,
        );
        let mut buf = BytesMut::new();
        key.serialize_into(&mut buf);
        assert_eq!(buf.len(), key.serialized_len());
        // 4 (db id) + 4 + 8 (md version) + 4 (cek id) + 4 + 32 (key)
        assert_eq!(key.serialized_len(), 56);
    }
}
