//! ZIP export/import of pool contents. Interacts with the rest of the system
//! only through [`CredentialPool::snapshot`] / [`CredentialPool::add`].
//!
//! Password protection, when requested, uses the archive format's legacy
//! ZipCrypto cipher purely for compatibility with the peripheral feature
//! this mirrors. It is **not** a confidentiality guarantee — ZipCrypto is
//! trivially breakable with known-plaintext attacks — and callers that need
//! real confidentiality should encrypt the archive with something else
//! afterwards.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use coproxy_config::BACKUP_FORMAT_VERSION;
use coproxy_pool::CredentialPool;

use crate::error::BackupError;
use crate::state::{BackupState, OperationType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub accounts_count: usize,
    pub accounts: Vec<String>,
    pub has_password: bool,
}

impl BackupMetadata {
    fn validate(&self) -> Result<(), BackupError> {
        if self.accounts_count != self.accounts.len() {
            return Err(BackupError::InvalidMetadata(format!(
                "accounts_count ({}) does not match accounts.len() ({})",
                self.accounts_count,
                self.accounts.len()
            )));
        }
        Ok(())
    }
}

pub struct BackupEngine;

impl BackupEngine {
    /// Writes every credential in `pool` to a ZIP archive at `out_path`:
    /// `metadata.json` plus one `tokens/account_<N>.txt` per credential, in
    /// insertion order, 1-indexed.
    pub async fn export(
        pool: &CredentialPool,
        state: &BackupState,
        out_path: &Path,
        password: Option<&str>,
    ) -> Result<(), BackupError> {
        state.start(OperationType::Export).await;

        let result = Self::export_inner(pool, out_path, password, state).await;
        match &result {
            Ok(count) => state.complete(*count).await,
            Err(err) => state.fail(err.to_string()).await,
        }
        result.map(|_| ())
    }

    async fn export_inner(
        pool: &CredentialPool,
        out_path: &Path,
        password: Option<&str>,
        state: &BackupState,
    ) -> Result<usize, BackupError> {
        let credentials = pool.snapshot().await;
        let accounts: Vec<String> = (1..=credentials.len())
            .map(|n| format!("account_{n}"))
            .collect();

        let metadata = BackupMetadata {
            version: BACKUP_FORMAT_VERSION.to_string(),
            created_at: OffsetDateTime::now_utc(),
            accounts_count: credentials.len(),
            accounts,
            has_password: password.is_some(),
        };
        let metadata_json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| BackupError::InvalidMetadata(e.to_string()))?;

        let file = std::fs::File::create(out_path)?;
        let mut zip = ZipWriter::new(file);
        let mut options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(password) = password {
            options = options.with_deprecated_encryption(password.as_bytes());
        }

        zip.start_file("metadata.json", options)?;
        zip.write_all(&metadata_json)?;

        let total = credentials.len().max(1);
        for (index, credential) in credentials.iter().enumerate() {
            let name = format!("tokens/account_{}.txt", index + 1);
            zip.start_file(&name, options)?;
            zip.write_all(credential.token.as_bytes())?;
            state.update_progress((index + 1) as f64 / total as f64).await;
        }

        zip.finish()?;
        info!(event = "backup.export_complete", accounts = credentials.len());
        Ok(credentials.len())
    }

    /// Reads an archive written by [`Self::export`] and registers every
    /// credential into `pool`. Duplicate tokens replace the existing entry
    /// per the pool's identity rule rather than double-counting.
    pub async fn import(
        pool: &CredentialPool,
        state: &BackupState,
        in_path: &Path,
        password: Option<&str>,
    ) -> Result<usize, BackupError> {
        state.start(OperationType::Import).await;

        let result = Self::import_inner(pool, in_path, password, state).await;
        match &result {
            Ok(count) => state.complete(*count).await,
            Err(err) => state.fail(err.to_string()).await,
        }
        result
    }

    async fn import_inner(
        pool: &CredentialPool,
        in_path: &Path,
        password: Option<&str>,
        state: &BackupState,
    ) -> Result<usize, BackupError> {
        let file = std::fs::File::open(in_path)?;
        let mut archive = ZipArchive::new(file)?;

        let metadata_bytes = read_entry(&mut archive, "metadata.json", password)?;
        let metadata: BackupMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| BackupError::InvalidMetadata(e.to_string()))?;
        metadata.validate()?;

        let total = metadata.accounts_count.max(1);
        for (index, _account) in metadata.accounts.iter().enumerate() {
            let name = format!("tokens/account_{}.txt", index + 1);
            let bytes = read_entry(&mut archive, &name, password)?;
            let token = String::from_utf8_lossy(&bytes).trim().to_string();
            pool.add(&token, 0, 0).await?;
            state.update_progress((index + 1) as f64 / total as f64).await;
        }

        info!(event = "backup.import_complete", accounts = metadata.accounts_count);
        Ok(metadata.accounts_count)
    }
}

fn read_entry(
    archive: &mut ZipArchive<std::fs::File>,
    name: &str,
    password: Option<&str>,
) -> Result<Vec<u8>, BackupError> {
    let mut buf = Vec::new();
    match password {
        Some(password) => {
            let mut entry = archive
                .by_name_decrypt(name, password.as_bytes())?
                .map_err(|_| BackupError::InvalidPassword)?;
            entry.read_to_end(&mut buf)?;
        }
        None => {
            let mut entry = archive.by_name(name)?;
            entry.read_to_end(&mut buf)?;
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(seed: char) -> String {
        std::iter::repeat(seed).take(24).collect()
    }

    fn tmp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("coproxy-backup-test-{}-{name}", std::process::id()))
    }

    #[tokio::test]
    async fn s10_export_then_import_round_trips() {
        let pool = CredentialPool::new();
        let t1 = tok('a');
        let t2 = tok('b');
        pool.add(&t1, 10, 20).await.unwrap();
        pool.add(&t2, 5, 5).await.unwrap();

        let state = BackupState::new();
        let path = tmp_path("roundtrip.zip");
        BackupEngine::export(&pool, &state, &path, None).await.unwrap();

        let fresh_pool = CredentialPool::new();
        let import_state = BackupState::new();
        let count = BackupEngine::import(&fresh_pool, &import_state, &path, None)
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(fresh_pool.statistics().await.total, 2);

        // The archive only ever persists the raw token string (see
        // `tokens/account_<N>.txt`); quotas are not carried across the
        // round trip and come back zeroed, not equal to the originals'.
        for credential in fresh_pool.snapshot().await {
            assert_eq!(credential.quota_remaining, 0);
            assert_eq!(credential.quota_total, 0);
        }

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn export_then_import_with_password() {
        let pool = CredentialPool::new();
        pool.add(tok('c'), 1, 1).await.unwrap();

        let state = BackupState::new();
        let path = tmp_path("password.zip");
        BackupEngine::export(&pool, &state, &path, Some("s3cr3t")).await.unwrap();

        let fresh_pool = CredentialPool::new();
        let import_state = BackupState::new();
        let count = BackupEngine::import(&fresh_pool, &import_state, &path, Some("s3cr3t"))
            .await
            .unwrap();
        assert_eq!(count, 1);

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn metadata_mismatch_is_rejected() {
        let metadata = BackupMetadata {
            version: "1.0".to_string(),
            created_at: OffsetDateTime::now_utc(),
            accounts_count: 2,
            accounts: vec!["account_1".to_string()],
            has_password: false,
        };
        assert!(metadata.validate().is_err());
    }
}
