// [libs/infra/store/src/secrets.rs]
/*!
 * =================================================================
 * APARATO: DATA-CLEANUP SECRET CODEC (§6 "Persisted secret layout")
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CIFRADO SIMÉTRICO AUTENTICADO DE SECRETOS EN REPOSO
 *
 * Cubre únicamente el contrato de cable de §6/§9: AES-256-GCM con el
 * nonce antepuesto al texto cifrado, todo codificado en base64. El
 * resto del subsistema de limpieza de datos (colas, programación,
 * configuraciones) es responsabilidad de un estrato externo no
 * cubierto por este núcleo (§1 Non-goals); sólo el formato de secreto
 * persistido cruza la frontera que el núcleo sí posee.
 * =================================================================
 */

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::errors::{StoreError, StoreResult};

const KEY_LENGTH_BYTES: usize = 32;
const NONCE_LENGTH_BYTES: usize = 12;

/// Codec de secretos para configuraciones de data-cleanup. Construido
/// una vez por llamador a partir de `DATA_CLEANUP_KEY` (§3.1); la
/// ausencia o malformación de esa variable no debe impedir el arranque
/// del Hub — sólo falla cuando un llamador de verdad necesita cifrar o
/// descifrar un secreto (§9 "Secrets").
pub struct DataCleanupSecretCodec {
    cipher: Aes256Gcm,
}

impl DataCleanupSecretCodec {
    /// Acepta la llave cruda ya decodificada (base64 o hex resuelto por
    /// el llamador, típicamente `HubConfig`); exige exactamente 32
    /// bytes.
    pub fn from_key_bytes(key: &[u8]) -> StoreResult<Self> {
        if key.len() != KEY_LENGTH_BYTES {
            return Err(StoreError::Configuration(format!(
                "DATA_CLEANUP_KEY must decode to {KEY_LENGTH_BYTES} bytes, got {}",
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        Ok(Self { cipher })
    }

    /// Cifra un secreto en texto plano. Una cadena vacía se almacena
    /// vacía (§6: "Empty plaintext stores empty string"), sin invocar
    /// al motor de cifrado.
    pub fn encrypt(&self, plaintext: &str) -> StoreResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_LENGTH_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher_text = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| StoreError::Configuration("data-cleanup secret encryption failed".into()))?;

        let mut combined = Vec::with_capacity(NONCE_LENGTH_BYTES + cipher_text.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&cipher_text);

        Ok(BASE64.encode(combined))
    }

    /// Descifra un secreto previamente persistido por `encrypt`. Una
    /// cadena vacía descifra a vacía sin tocar el motor (§6).
    pub fn decrypt(&self, stored: &str) -> StoreResult<String> {
        if stored.is_empty() {
            return Ok(String::new());
        }

        let combined = BASE64
            .decode(stored)
            .map_err(|e| StoreError::Configuration(format!("malformed data-cleanup secret encoding -> {e}")))?;

        if combined.len() < NONCE_LENGTH_BYTES {
            return Err(StoreError::Configuration("data-cleanup secret shorter than its nonce".into()));
        }

        let (nonce_bytes, cipher_text) = combined.split_at(NONCE_LENGTH_BYTES);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, cipher_text)
            .map_err(|_| StoreError::Configuration("data-cleanup secret integrity check failed".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| StoreError::Configuration("decrypted data-cleanup secret was not valid utf-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_codec() -> DataCleanupSecretCodec {
        DataCleanupSecretCodec::from_key_bytes(&[7u8; KEY_LENGTH_BYTES]).expect("fixed-length key must be accepted")
    }

    #[test]
    fn rejects_a_key_of_the_wrong_length() {
        let err = DataCleanupSecretCodec::from_key_bytes(&[1, 2, 3]).expect_err("short key must be rejected");
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn empty_plaintext_round_trips_to_empty_string() {
        let codec = test_codec();
        let stored = codec.encrypt("").expect("empty plaintext must not invoke the cipher");
        assert_eq!(stored, "");
        assert_eq!(codec.decrypt("").expect("empty stored secret must decrypt to empty"), "");
    }

    #[test]
    fn a_registry_password_round_trips_through_encrypt_then_decrypt() {
        let codec = test_codec();
        let stored = codec.encrypt("hunter2-registry-token").expect("encryption must succeed");
        assert_ne!(stored, "hunter2-registry-token");
        assert_eq!(codec.decrypt(&stored).expect("decryption must succeed"), "hunter2-registry-token");
    }

    #[test]
    fn tampering_with_the_stored_payload_fails_the_integrity_check() {
        let codec = test_codec();
        let mut stored = codec.encrypt("hunter2-registry-token").expect("encryption must succeed");
        stored.push('x');
        assert!(codec.decrypt(&stored).is_err());
    }
}
