//! Fixture builders shared by the per-module test suites: synthetic index
//! blobs assembled byte-by-byte, and RSA helpers that encrypt them the way
//! shipped archives are produced.

use crate::index::Format;
use rsa::BigUint;

pub(crate) const TEST_PUBLIC_PEM: &str = "\
-----BEGIN RSA PUBLIC KEY-----
MIIBCgKCAQEAxHup6jbvCJmJtzr2RT70J36mfN5jX3zAB4ysdKeey1MnWuu6tVw3
chIvc42PBsXSw5UdgwroovwMGZd9ugJpD2uBaE5CeUdHDFSgDXFarv04IAfB5aIJ
JvG+ySWsHRjVuTTlFy8shX42pa3GM2dxD85mcb95wyNBDPg61SpEvSw25/baiZNP
ALlK4ZTEHlpM6JGqZoeFXnw3VUGXmtrOn/fTRhtDDZXa+JwN7Ve4tIUasdeVCjjM
6GkDdG0JTwXGk9wfv44U8U/eXNTM/k6itGoqEH/4ktYWfGSt0n3+0IUzGw2KLJ0U
gZe1xW6Q7TrjJuT9c1vWKquIX3/0zj5SZwIDAQAB
-----END RSA PUBLIC KEY-----
";

const TEST_MODULUS_HEX: &str = "\
c47ba9ea36ef089989b73af6453ef4277ea67cde635f7cc0078cac74a79ecb53\
275aebbab55c3772122f738d8f06c5d2c3951d830ae8a2fc0c19977dba02690f\
6b81684e427947470c54a00d715aaefd382007c1e5a20926f1bec925ac1d18d5\
b934e5172f2c857e36a5adc63367710fce6671bf79c323410cf83ad52a44bd2c\
36e7f6da89934f00b94ae194c41e5a4ce891aa6687855e7c375541979adace9f\
f7d3461b430d95daf89c0ded57b8b4851ab1d7950a38cce86903746d094f05c6\
93dc1fbf8e14f14fde5cd4ccfe4ea2b46a2a107ff892d6167c64add27dfed085\
331b0d8a2c9d148197b5c56e90ed3ae326e4fd735bd62aab885f7ff4ce3e5267";

const TEST_PRIVATE_EXPONENT_HEX: &str = "\
11650953eced188bcf3f637eedfe76cb105158f8af3f82e1d54944f346ebae00\
7c9976091f893c7762d8c49821b36dcc0cf8a496375f051edf4b5cb80ac1afdf\
679b1b4ae263ae45c1f7b3fbbcaf5492a26763886cf5fd6d6f357ec551097a6b\
616c2763f80f2efa4f88376c369ccfcba0703d5dc03fe05d1ff2d1f2913d68a9\
db9d2ae22739ea72460790a17b5442a8370dbc81711706aad5a987719660aa70\
3c3998e2f94a33cb18fb3c8bd7c266889d5efe3788513026a3a46e833cb153d3\
ba103b9674ce8e31f112a50282b0666d563ba2d7d439e365b01de1086db37e03\
8be98b7adb48f21632096106b635d2957d43e83ac713c31bc6e3302984773931";

const RSA_BLOCK: usize = 256;

/// Encrypts with the key pair's private half, mirroring how shipped indexes
/// are produced: each `block - 2` bytes of plaintext become one raw RSA
/// block.
pub(crate) fn encrypt_with_private(plain: &[u8]) -> Vec<u8> {
    let modulus = BigUint::parse_bytes(TEST_MODULUS_HEX.as_bytes(), 16).unwrap();
    let exponent = BigUint::parse_bytes(TEST_PRIVATE_EXPONENT_HEX.as_bytes(), 16).unwrap();
    let mut out = Vec::new();
    for chunk in plain.chunks(RSA_BLOCK - 2) {
        let message = BigUint::from_bytes_be(chunk);
        let cipher = message.modpow(&exponent, &modulus);
        let bytes = cipher.to_bytes_be();
        out.resize(out.len() + RSA_BLOCK - bytes.len(), 0);
        out.extend_from_slice(&bytes);
    }
    out
}

/// One synthetic index entry.
pub(crate) struct TestEntry {
    pub hash: u64,
    pub offset: u64,
    pub padded: u32,
    pub unpadded: i64,
    pub integrity: Option<([u8; 32], Vec<(i64, i64)>)>,
    pub crypto: Option<([u8; 16], Vec<(i64, i64)>)>,
}

impl TestEntry {
    pub fn new(hash: u64, offset: u64, padded: u32) -> Self {
        Self {
            hash,
            offset,
            padded,
            unpadded: i64::from(padded),
            integrity: None,
            crypto: None,
        }
    }

    pub fn unpadded(mut self, unpadded: i64) -> Self {
        self.unpadded = unpadded;
        self
    }

    pub fn integrity(mut self, digest: [u8; 32], ranges: Vec<(i64, i64)>) -> Self {
        self.integrity = Some((digest, ranges));
        self
    }

    pub fn crypto(mut self, key: [u8; 16], ranges: Vec<(i64, i64)>) -> Self {
        self.crypto = Some((key, ranges));
        self
    }
}

const TEST_SALT: &[u8] = b"TESTSALT";

/// Assembles a little-endian index blob with the given bucket layout.
pub(crate) fn build_index(format: Format, buckets: &[Vec<TestEntry>]) -> Vec<u8> {
    let header_len = 0x18 + if format.is_salted() { 4 + TEST_SALT.len() } else { 0 };
    let table_offset = header_len;
    let descriptors_offset = table_offset + buckets.len() * 8;
    let width = format.descriptor_width();

    let mut bucket_offsets = Vec::with_capacity(buckets.len());
    let mut cursor = descriptors_offset;
    for bucket in buckets {
        bucket_offsets.push(cursor);
        cursor += bucket.len() * width;
    }

    // lay out the out-of-line integrity/crypto records after the descriptors
    let mut aux_offsets = Vec::new();
    for bucket in buckets {
        for entry in bucket {
            let integrity = entry.integrity.as_ref().map(|(_, ranges)| {
                let offset = cursor;
                cursor += 32 + 4 + ranges.len() * 16;
                offset
            });
            let crypto = entry.crypto.as_ref().map(|(_, ranges)| {
                let offset = cursor;
                cursor += 16 + 4 + ranges.len() * 16;
                offset
            });
            aux_offsets.push((integrity, crypto));
        }
    }
    let total_len = cursor;

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(b"BHD5");
    out.push(0xFF); // little-endian
    out.extend_from_slice(&[0, 0, 0]);
    push_i32(&mut out, 1);
    push_i32(&mut out, i32::try_from(total_len).unwrap());
    push_i32(&mut out, i32::try_from(buckets.len()).unwrap());
    push_i32(&mut out, i32::try_from(table_offset).unwrap());
    if format.is_salted() {
        push_i32(&mut out, i32::try_from(TEST_SALT.len()).unwrap());
        out.extend_from_slice(TEST_SALT);
    }

    for (bucket, offset) in buckets.iter().zip(&bucket_offsets) {
        push_i32(&mut out, i32::try_from(bucket.len()).unwrap());
        push_i32(&mut out, i32::try_from(*offset).unwrap());
    }

    let mut aux = aux_offsets.iter();
    for bucket in buckets {
        for entry in bucket {
            let (integrity_offset, crypto_offset) = aux.next().unwrap();
            let integrity_offset = integrity_offset.unwrap_or(0) as i64;
            let crypto_offset = crypto_offset.unwrap_or(0) as i64;
            match format {
                Format::DarkSouls | Format::DarkSouls2 => {
                    push_u32(&mut out, u32::try_from(entry.hash).unwrap());
                    push_i32(&mut out, i32::try_from(entry.padded).unwrap());
                    push_i64(&mut out, i64::try_from(entry.offset).unwrap());
                }
                Format::DarkSouls3 => {
                    push_u32(&mut out, u32::try_from(entry.hash).unwrap());
                    push_i32(&mut out, i32::try_from(entry.padded).unwrap());
                    push_i64(&mut out, i64::try_from(entry.offset).unwrap());
                    push_i64(&mut out, integrity_offset);
                    push_i64(&mut out, crypto_offset);
                    push_i64(&mut out, entry.unpadded);
                }
                Format::EldenRing => {
                    push_u64(&mut out, entry.hash);
                    push_i32(&mut out, i32::try_from(entry.padded).unwrap());
                    push_i32(&mut out, i32::try_from(entry.unpadded).unwrap());
                    push_i64(&mut out, i64::try_from(entry.offset).unwrap());
                    push_i64(&mut out, integrity_offset);
                    push_i64(&mut out, crypto_offset);
                }
            }
        }
    }

    for bucket in buckets {
        for entry in bucket {
            if let Some((digest, ranges)) = &entry.integrity {
                out.extend_from_slice(digest);
                push_ranges(&mut out, ranges);
            }
            if let Some((key, ranges)) = &entry.crypto {
                out.extend_from_slice(key);
                push_ranges(&mut out, ranges);
            }
        }
    }

    debug_assert_eq!(out.len(), total_len);
    out
}

fn push_ranges(out: &mut Vec<u8>, ranges: &[(i64, i64)]) {
    push_i32(out, i32::try_from(ranges.len()).unwrap());
    for (start, end) in ranges {
        push_i64(out, *start);
        push_i64(out, *end);
    }
}

fn push_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}
