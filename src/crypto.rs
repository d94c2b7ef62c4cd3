use crate::{
    error::{Error, Result},
    index::{CryptoDescriptor, IntegrityDescriptor},
};
use aes::{
    cipher::{generic_array::GenericArray, BlockDecrypt, KeyInit},
    Aes128,
};
use rayon::prelude::*;
use rsa::{
    pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, traits::PublicKeyParts, BigUint,
    RsaPublicKey,
};
use sha2::{Digest, Sha256};
use std::{fs, path::Path, sync::OnceLock, thread};

const AES_BLOCK: usize = 16;

/// RSA key material used to decrypt an archive index.
///
/// The archives are encrypted with the key pair's private half, so reversing
/// it only needs the public half: each cipher block is the raw public-key
/// operation away from its plaintext.
#[derive(Clone)]
pub struct DecryptionKey {
    key: RsaPublicKey,
}

impl DecryptionKey {
    /// Parses PEM key material, accepting both PKCS#1 (`RSA PUBLIC KEY`) and
    /// SPKI (`PUBLIC KEY`) encodings.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let key = match RsaPublicKey::from_pkcs1_pem(pem) {
            Ok(key) => key,
            Err(_) => RsaPublicKey::from_public_key_pem(pem)
                .map_err(|err| Error::InvalidKey(err.to_string()))?,
        };
        Ok(Self { key })
    }

    pub fn from_pem_file<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let pem = fs::read_to_string(path.as_ref())?;
        Self::from_pem(&pem)
    }

    /// Cipher block size in bytes (the modulus size).
    pub(crate) fn block_size(&self) -> usize {
        self.key.size()
    }

    /// Reverses one raw RSA block. The plaintext number is left-padded to
    /// `block_size - 1` bytes and its first byte dropped, yielding
    /// `block_size - 2` payload bytes for a well-formed block.
    fn decrypt_block(&self, block: &[u8]) -> Vec<u8> {
        let cipher = BigUint::from_bytes_be(block);
        let plain = cipher.modpow(self.key.e(), self.key.n());
        let mut bytes = plain.to_bytes_be();
        let padded_len = self.block_size() - 1;
        if bytes.len() < padded_len {
            let mut padded = vec![0u8; padded_len - bytes.len()];
            padded.extend_from_slice(&bytes);
            bytes = padded;
        }
        bytes.drain(..1);
        bytes
    }
}

/// The worker pool shared by index decryption and threaded payload reads.
pub(crate) fn pool() -> &'static rayon::ThreadPool {
    static POOL: OnceLock<rayon::ThreadPool> = OnceLock::new();
    POOL.get_or_init(|| {
        let cpus = thread::available_parallelism().map_or(1, core::num::NonZeroUsize::get);
        rayon::ThreadPoolBuilder::new()
            .num_threads((cpus / 2).max(4))
            .thread_name(|index| format!("dvdbnd-worker-{index}"))
            .build()
            .expect("failed to build worker thread pool")
    })
}

/// Decrypts a whole index blob. Blocks are independent, so they are fanned
/// out across the pool and reassembled in their original order before
/// returning.
pub(crate) fn decrypt_index(key: &DecryptionKey, cipher: &[u8]) -> Vec<u8> {
    let block_size = key.block_size();
    let blocks: Vec<Vec<u8>> = pool().install(|| {
        cipher
            .par_chunks(block_size)
            .map(|block| key.decrypt_block(block))
            .collect()
    });
    blocks.concat()
}

/// Decrypts the listed ranges of a payload in place with AES-128-ECB. Bytes
/// outside the ranges pass through untouched; trailing partial cipher blocks
/// inside a range are left as-is.
pub(crate) fn decrypt_ranges(buffer: &mut [u8], crypto: &CryptoDescriptor) {
    let cipher = Aes128::new(GenericArray::from_slice(&crypto.key));
    for range in &crypto.ranges {
        if let Some((start, end)) = range.clamped(buffer.len()) {
            for block in buffer[start..end].chunks_exact_mut(AES_BLOCK) {
                cipher.decrypt_block(GenericArray::from_mut_slice(block));
            }
        }
    }
}

/// Same as [`decrypt_ranges`], but each range's cipher blocks are decrypted
/// on the worker pool. ECB blocks are independent and decrypted in place, so
/// order is preserved by construction.
pub(crate) fn decrypt_ranges_parallel(buffer: &mut [u8], crypto: &CryptoDescriptor) {
    let cipher = Aes128::new(GenericArray::from_slice(&crypto.key));
    pool().install(|| {
        for range in &crypto.ranges {
            if let Some((start, end)) = range.clamped(buffer.len()) {
                buffer[start..end]
                    .par_chunks_exact_mut(AES_BLOCK)
                    .for_each(|block| cipher.decrypt_block(GenericArray::from_mut_slice(block)));
            }
        }
    });
}

/// Recomputes the SHA-256 digest over the listed ranges and compares it with
/// the recorded one.
pub(crate) fn verify_ranges(buffer: &[u8], integrity: &IntegrityDescriptor) -> bool {
    let mut hasher = Sha256::new();
    for range in &integrity.ranges {
        if let Some((start, end)) = range.clamped(buffer.len()) {
            hasher.update(&buffer[start..end]);
        }
    }
    hasher.finalize().as_slice() == integrity.digest
}
