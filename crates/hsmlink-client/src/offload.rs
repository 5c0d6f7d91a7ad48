//! Crypto offload binding.
//!
//! An algorithm context can run on either locally held key material or a
//! key resident on the server.  The source is a tagged value, so dispatch
//! code must match exhaustively and can never confuse a remote handle with
//! raw bytes.  Binding is a pure assignment with no wire effect; the id is
//! validated when the operation that uses it reaches the server.

use hsmlink_core::KeyId;

/// Where an algorithm context gets its key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Material held by the host and shipped with each operation.
    Local(Vec<u8>),
    /// Material resident on the server, addressed by id.
    Remote(KeyId),
}

/// Algorithms whose key material can be server-resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Rsa,
    Ecc,
    Curve25519,
    Aes,
}

/// An algorithm context's key binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadKey {
    pub algorithm: Algorithm,
    pub source: KeySource,
}

impl OffloadKey {
    pub fn local(algorithm: Algorithm, material: Vec<u8>) -> Self {
        OffloadKey { algorithm, source: KeySource::Local(material) }
    }

    pub fn remote(algorithm: Algorithm, id: KeyId) -> Self {
        OffloadKey { algorithm, source: KeySource::Remote(id) }
    }

    /// Rebinds this context to a server-resident key, dropping any local
    /// material.
    pub fn bind_remote(&mut self, id: KeyId) {
        self.source = KeySource::Remote(id);
    }

    /// The bound remote id, if this context is server-resident.
    pub fn key_id(&self) -> Option<KeyId> {
        match &self.source {
            KeySource::Remote(id) => Some(*id),
            KeySource::Local(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_remote_replaces_local_material() {
        let mut key = OffloadKey::local(Algorithm::Aes, vec![0x11; 16]);
        assert_eq!(key.key_id(), None);

        key.bind_remote(KeyId(9));
        assert_eq!(key.key_id(), Some(KeyId(9)));
        assert_eq!(key.source, KeySource::Remote(KeyId(9)));
    }

    #[test]
    fn test_local_and_remote_sources_never_compare_equal() {
        let local = OffloadKey::local(Algorithm::Rsa, vec![0x09, 0x00]);
        let remote = OffloadKey::remote(Algorithm::Rsa, KeyId(0x0900));
        assert_ne!(local, remote);
    }
}
