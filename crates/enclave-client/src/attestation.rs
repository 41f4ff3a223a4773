//! Attestation parameters carried from the driver to the external
//! attestation exchange.
//!
//! This crate does not attest anything itself. It hands the exchange a
//! protocol id, any protocol-specific input, and the client's key-agreement
//! public key; the exchange hands back a shared secret and session id which
//! the driver installs via
//! [`EnclaveSessionCache::create_session`](crate::session::EnclaveSessionCache::create_session).

use bytes::{BufMut, BytesMut};
use enclave_wire::keyblob::EccPublicKey;

/// Which attestation protocol the server negotiated for the enclave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationProtocol {
    /// Attestation service for SGX enclaves.
    AzureAttestation,
    /// No attestation; the enclave is trusted as-is.
    Unattested,
    /// Host Guardian Service attestation for VBS enclaves.
    HostGuardianService,
}

impl AttestationProtocol {
    /// Wire identifier of the protocol.
    pub fn id(self) -> u32 {
        match self {
            AttestationProtocol::AzureAttestation => 1,
            AttestationProtocol::Unattested => 2,
            AttestationProtocol::HostGuardianService => 3,
        }
    }
}

/// The client half of the attested key agreement: protocol id,
/// protocol-specific input (e.g. an attestation nonce), and the client's
/// ephemeral P-384 key-agreement public key.
#[derive(Debug, Clone)]
pub struct AttestationParameters {
    protocol: AttestationProtocol,
    attestation_input: Vec<u8>,
    client_key: EccPublicKey,
}

impl AttestationParameters {
    pub fn new(
        protocol: AttestationProtocol,
        attestation_input: Vec<u8>,
        client_key: EccPublicKey,
    ) -> Self {
        Self {
            protocol,
            attestation_input,
            client_key,
        }
    }

    pub fn protocol(&self) -> AttestationProtocol {
        self.protocol
    }

    pub fn attestation_input(&self) -> &[u8] {
        &self.attestation_input
    }

    pub fn client_key(&self) -> &EccPublicKey {
        &self.client_key
    }

    /// Serialize for transmission to the server:
    ///
    /// ```text
    /// protocol: u32 LE | input_len: u32 LE | input |
    /// blob_len: u32 LE | 104-byte ECC public key blob
    /// ```
    pub fn serialize(&self) -> Vec<u8> {
        let blob = self.client_key.encode();
        let total = 4 + 4 + self.attestation_input.len() + 4 + blob.len();
        let mut buf = BytesMut::with_capacity(total);
        buf.put_u32_le(self.protocol.id());
        buf.put_u32_le(self.attestation_input.len() as u32);
        buf.put_slice(&self.attestation_input);
        buf.put_u32_le(blob.len() as u32);
        buf.put_slice(&blob);
        debug_assert_eq!(buf.len(), total);
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enclave_wire::keyblob::ECC_BLOB_LEN;

    fn client_key() -> EccPublicKey {
        EccPublicKey {
            x: [0x0A; 48],
            y: [0x0B; 48],
        }
    }

    #[test]
    fn protocol_ids_match_wire_contract() {
        assert_eq!(AttestationProtocol::AzureAttestation.id(), 1);
        assert_eq!(AttestationProtocol::Unattested.id(), 2);
        assert_eq!(AttestationProtocol::HostGuardianService.id(), 3);
    }

    #[test]
    fn serialization_layout() {
        let nonce = vec![0xCC; 256];
        let params = AttestationParameters::new(
            AttestationProtocol::HostGuardianService,
            nonce.clone(),
            client_key(),
        );
        let bytes = params.serialize();

        assert_eq!(bytes.len(), 4 + 4 + nonce.len() + 4 + ECC_BLOB_LEN);
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &(nonce.len() as u32).to_le_bytes());
        assert_eq!(&bytes[8..8 + nonce.len()], nonce.as_slice());

        let blob_len_offset = 8 + nonce.len();
        assert_eq!(
            &bytes[blob_len_offset..blob_len_offset + 4],
            &(ECC_BLOB_LEN as u32).to_le_bytes()
        );
        // The blob itself round-trips through the codec.
        let blob = &bytes[blob_len_offset + 4..];
        let decoded = EccPublicKey::decode(blob).unwrap();
        assert_eq!(decoded, client_key());
    }

    #[test]
    fn empty_input_serializes_to_header_plus_blob() {
        let params = AttestationParameters::new(
            AttestationProtocol::Unattested,
            Vec::new(),
            client_key(),
        );
        assert_eq!(params.serialize().len(), 12 + ECC_BLOB_LEN);
    }
}
