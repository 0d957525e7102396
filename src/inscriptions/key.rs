//! One-time key that controls an envelope output until the reveal is signed

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use crate::error::{Result, WasmOrdinalsError};

const MAX_ATTEMPTS: usize = 16;

#[derive(Clone, PartialEq, Eq)]
pub struct EphemeralKey {
    secret: SecretKey,
}

impl EphemeralKey {
    pub fn from_secret_key(secret: SecretKey) -> Self {
        EphemeralKey { secret }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(WasmOrdinalsError::InvalidInput(format!(
                "private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| WasmOrdinalsError::InvalidInput(format!("Invalid private key: {}", e)))?;
        Ok(EphemeralKey { secret })
    }

    /// Fresh key from the platform RNG (`crypto.getRandomValues` under wasm)
    pub fn generate() -> Result<Self> {
        for _ in 0..MAX_ATTEMPTS {
            let mut bytes = [0u8; 32];
            getrandom::getrandom(&mut bytes)
                .map_err(|e| WasmOrdinalsError::External(format!("RNG unavailable: {}", e)))?;
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Ok(EphemeralKey { secret });
            }
        }
        Err(WasmOrdinalsError::invariant(
            "random bytes never produced a valid secret key",
        ))
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn keypair(&self) -> Keypair {
        Keypair::from_secret_key(&Secp256k1::new(), &self.secret)
    }

    pub fn x_only_public_key(&self) -> XOnlyPublicKey {
        self.keypair().x_only_public_key().0
    }
}

impl std::fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKey")
            .field("public", &self.x_only_public_key())
            .finish_non_exhaustive()
    }
}

// Orders persist the key so an interrupted reveal can be resumed
impl Serialize for EphemeralKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.secret.secret_bytes()))
    }
}

impl<'de> Deserialize<'de> for EphemeralKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        EphemeralKey::from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_distinct_keys() {
        let a = EphemeralKey::generate().unwrap();
        let b = EphemeralKey::generate().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_serde_roundtrip_and_debug_hides_secret() {
        let key = EphemeralKey::from_slice(&[7u8; 32]).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        assert_eq!(serde_json::from_str::<EphemeralKey>(&json).unwrap(), key);
        assert!(!format!("{:?}", key).contains(&"07".repeat(32)));
    }

    #[test]
    fn test_rejects_bad_length_and_zero() {
        assert!(EphemeralKey::from_slice(&[1u8; 31]).is_err());
        assert!(EphemeralKey::from_slice(&[0u8; 32]).is_err());
    }
}
