use std::{io::Read, path::Path};

use anyhow::{Context, Result, anyhow, bail, ensure};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use tracing::instrument;

/// Leading bytes identifying an encrypted backup archive.
pub const MAGIC: &[u8; 8] = b"MASSAPK\x01";
const NONCE_LEN: usize = 24;
/// Domain-separation context for passphrase-derived keys.
const KEY_CONTEXT: &str = "mass-apk 2025 backup archive encryption v1";

fn derive_key(passphrase: &str) -> Key {
    Key::from(blake3::derive_key(KEY_CONTEXT, passphrase.as_bytes()))
}

/// Encrypts `src` into `dest` under a passphrase-derived key.
///
/// Layout: 8-byte magic, 24-byte random nonce, AEAD ciphertext with the tag
/// appended. The tag authenticates the whole archive, so truncation or a
/// wrong passphrase fails decryption instead of yielding garbage.
#[instrument(skip(passphrase), err)]
pub async fn encrypt(src: &Path, dest: &Path, passphrase: &str) -> Result<()> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    let passphrase = passphrase.to_string();
    tokio::task::spawn_blocking(move || encrypt_blocking(&src, &dest, &passphrase))
        .await
        .context("Encryption task panicked")?
}

fn encrypt_blocking(src: &Path, dest: &Path, passphrase: &str) -> Result<()> {
    let plaintext =
        std::fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;

    let cipher = XChaCha20Poly1305::new(&derive_key(passphrase));
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|_| anyhow!("Encryption failed"))?;

    let mut out = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    std::fs::write(dest, out).with_context(|| format!("Failed to write {}", dest.display()))
}

/// Decrypts a file produced by [`encrypt`].
#[instrument(skip(passphrase), err)]
pub async fn decrypt(src: &Path, dest: &Path, passphrase: &str) -> Result<()> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    let passphrase = passphrase.to_string();
    tokio::task::spawn_blocking(move || decrypt_blocking(&src, &dest, &passphrase))
        .await
        .context("Decryption task panicked")?
}

fn decrypt_blocking(src: &Path, dest: &Path, passphrase: &str) -> Result<()> {
    let data =
        std::fs::read(src).with_context(|| format!("Failed to read {}", src.display()))?;
    ensure!(
        data.len() >= MAGIC.len() + NONCE_LEN && data[..MAGIC.len()] == MAGIC[..],
        "{} is not an encrypted backup archive",
        src.display()
    );

    let (nonce, ciphertext) = data[MAGIC.len()..].split_at(NONCE_LEN);
    let cipher = XChaCha20Poly1305::new(&derive_key(passphrase));
    let plaintext = match cipher.decrypt(XNonce::from_slice(nonce), ciphertext) {
        Ok(plaintext) => plaintext,
        Err(_) => bail!("Decryption failed: wrong passphrase or corrupted archive"),
    };
    std::fs::write(dest, plaintext)
        .with_context(|| format!("Failed to write {}", dest.display()))
}

/// True when `path` starts with the encrypted-archive magic.
pub fn is_encrypted_archive(path: &Path) -> bool {
    let mut head = [0u8; 8];
    std::fs::File::open(path)
        .and_then(|mut file| file.read_exact(&mut head))
        .map(|_| head == *MAGIC)
        .unwrap_or(false)
}
