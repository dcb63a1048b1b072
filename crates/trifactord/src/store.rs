use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;
use trifactor_core::Modality;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
    /// Distinct, retryable: the caller may enroll and try again.
    #[error("no reference stored under '{0}'")]
    NotFound(String),
    #[error("reference encryption failed")]
    EncryptionFailed,
    #[error("reference decryption failed — key mismatch or corrupted data")]
    DecryptionFailed,
    #[error("stored reference digest mismatch for '{0}' — data corrupted")]
    DigestMismatch(String),
    #[error("encryption key I/O error: {0}")]
    KeyIo(#[source] std::io::Error),
}

/// Storage key for a user's enrolled reference of one modality.
///
/// The format is shared with the capture apps and must not drift:
/// `face_images/{user}-face.jpg`, `palm_images/{user}-palm.jpg`,
/// `voice_recordings/{user}-voice.wav`.
pub fn object_key(user: &str, modality: Modality) -> String {
    match modality {
        Modality::Face => format!("face_images/{user}-face.jpg"),
        Modality::Palm => format!("palm_images/{user}-palm.jpg"),
        Modality::Voice => format!("voice_recordings/{user}-voice.wav"),
    }
}

/// SQLite-backed reference-sample store with AES-256-GCM encryption.
///
/// Reference payloads are encrypted before storage and decrypted on
/// retrieval; a SHA-256 digest of the plaintext is kept alongside and
/// re-checked after decryption. A per-installation 32-byte key is generated
/// at first use and stored at `{db_dir}/.key` (mode 0600).
#[derive(Clone)]
pub struct ReferenceStore {
    conn: Connection,
    enc_key: [u8; 32],
}

impl ReferenceStore {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let enc_key = if db_path == Path::new(":memory:") {
            // In-memory DB (tests): fixed all-zeros key
            [0u8; 32]
        } else {
            let key_path = db_path
                .parent()
                .unwrap_or(Path::new("/var/lib/trifactor"))
                .join(".key");
            load_or_generate_key(&key_path)?
        };

        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 CREATE TABLE IF NOT EXISTS reference_samples (
                     key TEXT PRIMARY KEY,
                     user TEXT NOT NULL,
                     modality TEXT NOT NULL,
                     payload BLOB NOT NULL,
                     digest TEXT NOT NULL,
                     updated_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_reference_samples_user
                     ON reference_samples(user);",
            )?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, enc_key })
    }

    /// Enroll (or replace) a user's reference for one modality.
    /// Returns the SHA-256 hex digest of the stored payload.
    pub async fn put(
        &self,
        user: &str,
        modality: Modality,
        payload: &[u8],
    ) -> Result<String, StoreError> {
        let key = object_key(user, modality);
        let digest = sha256_hex(payload);
        let blob = self.encrypt(payload)?;
        let updated_at = chrono::Utc::now().to_rfc3339();

        let user = user.to_string();
        let key_clone = key.clone();
        let digest_clone = digest.clone();
        let modality_str = modality.as_str().to_string();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO reference_samples (key, user, modality, payload, digest, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(key) DO UPDATE SET
                         payload = excluded.payload,
                         digest = excluded.digest,
                         updated_at = excluded.updated_at",
                    rusqlite::params![key_clone, user, modality_str, blob, digest_clone, updated_at],
                )?;
                Ok(())
            })
            .await?;

        tracing::info!(key, "reference stored");
        Ok(digest)
    }

    /// Fetch a user's enrolled reference for one modality.
    pub async fn get(&self, user: &str, modality: Modality) -> Result<Vec<u8>, StoreError> {
        let key = object_key(user, modality);
        let key_clone = key.clone();

        let row: Option<(Vec<u8>, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT payload, digest FROM reference_samples WHERE key = ?1",
                )?;
                let mut rows = stmt.query_map([&key_clone], |row| {
                    Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, String>(1)?))
                })?;
                Ok(rows.next().transpose()?)
            })
            .await?;

        let (blob, digest) = row.ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let payload = self.decrypt(&blob)?;
        if sha256_hex(&payload) != digest {
            return Err(StoreError::DigestMismatch(key));
        }
        Ok(payload)
    }

    /// Remove every enrolled reference for a user. Returns the number of
    /// references removed.
    pub async fn remove_user(&self, user: &str) -> Result<u64, StoreError> {
        let user = user.to_string();
        self.conn
            .call(move |conn| {
                let affected =
                    conn.execute("DELETE FROM reference_samples WHERE user = ?1", [&user])?;
                Ok(affected as u64)
            })
            .await
            .map_err(StoreError::from)
    }

    /// Count enrolled references across all users.
    pub async fn count_all(&self) -> Result<u64, StoreError> {
        self.conn
            .call(|conn| {
                let count: u64 = conn.query_row(
                    "SELECT COUNT(*) FROM reference_samples",
                    [],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
            .map_err(StoreError::from)
    }

    // ── Encryption helpers ────────────────────────────────────────────────────

    /// Output: 12-byte random nonce || ciphertext || 16-byte GCM tag.
    fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>, StoreError> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let key = Key::<Aes256Gcm>::from_slice(&self.enc_key);
        let cipher = Aes256Gcm::new(key);

        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|_| StoreError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(12 + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, StoreError> {
        const NONCE_LEN: usize = 12;

        if blob.len() <= NONCE_LEN {
            return Err(StoreError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let key = Key::<Aes256Gcm>::from_slice(&self.enc_key);
        let cipher = Aes256Gcm::new(key);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| StoreError::DecryptionFailed)
    }
}

// ── Key management ────────────────────────────────────────────────────────────

/// Load the encryption key from disk, or generate and persist a new one.
/// Written with mode 0600 (owner-readable only).
fn load_or_generate_key(key_path: &Path) -> Result<[u8; 32], StoreError> {
    if key_path.exists() {
        let bytes = std::fs::read(key_path).map_err(StoreError::KeyIo)?;
        if bytes.len() != 32 {
            return Err(StoreError::KeyIo(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "encryption key file has wrong length ({} bytes, expected 32)",
                    bytes.len()
                ),
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        tracing::debug!(path = %key_path.display(), "loaded encryption key");
        Ok(key)
    } else {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);

        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(key_path)
            .map_err(StoreError::KeyIo)?;
        f.write_all(&key).map_err(StoreError::KeyIo)?;

        tracing::info!(path = %key_path.display(), "generated new AES-256 encryption key");
        Ok(key)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_match_the_shared_format() {
        assert_eq!(object_key("u123", Modality::Face), "face_images/u123-face.jpg");
        assert_eq!(object_key("u123", Modality::Palm), "palm_images/u123-palm.jpg");
        assert_eq!(
            object_key("u123", Modality::Voice),
            "voice_recordings/u123-voice.wav"
        );
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = ReferenceStore::open(Path::new(":memory:")).await.unwrap();

        let payload = vec![7u8; 256];
        let digest = store.put("alice", Modality::Face, &payload).await.unwrap();
        assert_eq!(digest, sha256_hex(&payload));

        let fetched = store.get("alice", Modality::Face).await.unwrap();
        assert_eq!(fetched, payload);
    }

    #[tokio::test]
    async fn put_replaces_an_existing_reference() {
        let store = ReferenceStore::open(Path::new(":memory:")).await.unwrap();

        store.put("alice", Modality::Palm, &[1, 2, 3]).await.unwrap();
        store.put("alice", Modality::Palm, &[9, 9, 9]).await.unwrap();

        assert_eq!(store.get("alice", Modality::Palm).await.unwrap(), vec![9, 9, 9]);
        assert_eq!(store.count_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_reference_is_not_found() {
        let store = ReferenceStore::open(Path::new(":memory:")).await.unwrap();

        let err = store.get("nobody", Modality::Voice).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(key)
            if key == "voice_recordings/nobody-voice.wav"));
    }

    #[tokio::test]
    async fn modalities_are_stored_independently() {
        let store = ReferenceStore::open(Path::new(":memory:")).await.unwrap();

        store.put("alice", Modality::Face, &[1]).await.unwrap();
        store.put("alice", Modality::Voice, &[2]).await.unwrap();

        assert_eq!(store.get("alice", Modality::Face).await.unwrap(), vec![1]);
        assert_eq!(store.get("alice", Modality::Voice).await.unwrap(), vec![2]);
        assert!(store.get("alice", Modality::Palm).await.is_err());
    }

    #[tokio::test]
    async fn remove_user_clears_all_modalities() {
        let store = ReferenceStore::open(Path::new(":memory:")).await.unwrap();

        store.put("alice", Modality::Face, &[1]).await.unwrap();
        store.put("alice", Modality::Palm, &[2]).await.unwrap();
        store.put("bob", Modality::Face, &[3]).await.unwrap();

        assert_eq!(store.remove_user("alice").await.unwrap(), 2);
        assert!(store.get("alice", Modality::Face).await.is_err());
        assert_eq!(store.get("bob", Modality::Face).await.unwrap(), vec![3]);
        assert_eq!(store.remove_user("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_key_fails_decryption() {
        let store1 = ReferenceStore {
            conn: Connection::open(Path::new(":memory:")).await.unwrap(),
            enc_key: [1u8; 32],
        };
        let store2 = ReferenceStore {
            conn: store1.conn.clone(),
            enc_key: [2u8; 32],
        };

        let blob = store1.encrypt(&[42u8; 64]).unwrap();
        assert!(matches!(
            store2.decrypt(&blob).unwrap_err(),
            StoreError::DecryptionFailed
        ));
    }

    #[tokio::test]
    async fn truncated_blob_fails_decryption() {
        let store = ReferenceStore::open(Path::new(":memory:")).await.unwrap();
        assert!(matches!(
            store.decrypt(&[0u8; 8]).unwrap_err(),
            StoreError::DecryptionFailed
        ));
    }
}
