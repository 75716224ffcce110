use crate::asn1::constants::EncryptionType;
use crate::constants::*;
use crate::error::KrbError;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut};
use hmac::digest::FixedOutput;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3961 section 5.1 n-fold. Stretches or compresses the input to the
/// requested byte length by concatenating 13-bit right rotations and summing
/// the slices with ones-complement addition.
pub(crate) fn n_fold(data: &[u8], out_len: usize) -> Vec<u8> {
    fn gcd(mut a: usize, mut b: usize) -> usize {
        while b != 0 {
            (a, b) = (b, a % b);
        }
        a
    }

    let data_len = data.len();
    let lcm = data_len / gcd(data_len, out_len) * out_len;

    // Concatenate successive 13-bit right rotations of the input until the
    // length reaches lcm(|data|, out_len).
    let bit_len = data_len * 8;
    let mut stretched = Vec::with_capacity(lcm);
    for rep in 0..(lcm / data_len) {
        let step = (13 * rep) % bit_len;
        for i in 0..data_len {
            let hi = data[(i + bit_len - (step / 8 + 1)) % data_len] as u16;
            let lo = data[(i + bit_len - (step / 8)) % data_len] as u16;
            stretched.push((((hi << 8) | lo) >> (step % 8)) as u8);
        }
    }

    let mut out = stretched[..out_len].to_vec();
    for chunk in stretched[out_len..].chunks(out_len) {
        ones_complement_add(&mut out, chunk);
    }
    out
}

fn ones_complement_add(acc: &mut [u8], add: &[u8]) {
    let mut carry = 0u32;
    for i in (0..acc.len()).rev() {
        let sum = acc[i] as u32 + add[i] as u32 + carry;
        acc[i] = sum as u8;
        carry = sum >> 8;
    }
    // End-around carry.
    while carry != 0 {
        let mut c = carry;
        carry = 0;
        for i in (0..acc.len()).rev() {
            let sum = acc[i] as u32 + c;
            acc[i] = sum as u8;
            c = sum >> 8;
            if c == 0 {
                break;
            }
        }
        carry = c;
    }
}

fn usage_constant(key_usage: i32, tag: u8) -> [u8; 5] {
    let mut c = [0u8; 5];
    c[..4].copy_from_slice(&key_usage.to_be_bytes());
    c[4] = tag;
    c
}

// Simplified profile of RFC 3962: both AES widths share the CTS (CS3) mode,
// the HMAC-SHA1-96 integrity tag and the DK function; only the key length
// and the number of DK output blocks differ.
macro_rules! aes_cts_hmac_sha1_96 {
    ($name:ident, $cipher:ty, $key_len:expr) => {
        pub(crate) mod $name {
            use super::*;

            pub(crate) const KEY_LEN: usize = $key_len;

            type CbcEnc = cbc::Encryptor<$cipher>;
            type CbcDec = cbc::Decryptor<$cipher>;
            type Block = GenericArray<u8, <$cipher as aes::cipher::BlockSizeUser>::BlockSize>;

            fn encrypt_block_zero_iv(
                key: &[u8; KEY_LEN],
                plaintext: &[u8; AES_BLOCK_SIZE],
                out: &mut [u8; AES_BLOCK_SIZE],
            ) {
                use aes::cipher::KeyIvInit;
                let mut cipher = CbcEnc::new(key.into(), &IV_ZERO.into());
                cipher.encrypt_block_b2b_mut(plaintext.into(), out.into());
            }

            /// RFC 3961 DK. The constant is n-folded to the block size, then
            /// the derived key is the CBC-chained encryption of that block,
            /// truncated to the key length.
            fn dk(key: &[u8; KEY_LEN], constant: &[u8]) -> [u8; KEY_LEN] {
                let folded = n_fold(constant, AES_BLOCK_SIZE);
                let mut block = [0u8; AES_BLOCK_SIZE];
                block.copy_from_slice(&folded);

                let mut out = [0u8; KEY_LEN];
                let mut filled = 0;
                while filled < KEY_LEN {
                    let mut enc = [0u8; AES_BLOCK_SIZE];
                    encrypt_block_zero_iv(key, &block, &mut enc);
                    let take = (KEY_LEN - filled).min(AES_BLOCK_SIZE);
                    out[filled..filled + take].copy_from_slice(&enc[..take]);
                    block = enc;
                    filled += take;
                }
                out
            }

            fn dk_ki_ke(key: &[u8; KEY_LEN], key_usage: i32) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
                let ki = dk(key, &usage_constant(key_usage, 0x55));
                let ke = dk(key, &usage_constant(key_usage, 0xAA));
                (ki, ke)
            }

            fn dk_kc(key: &[u8; KEY_LEN], key_usage: i32) -> [u8; KEY_LEN] {
                dk(key, &usage_constant(key_usage, 0x99))
            }

            /// Given the users passphrase and salt, derive the long term base
            /// key. Salt is the concatenation of realm + principal components
            /// unless the KDC supplied one in ETYPE-INFO2.
            pub(crate) fn string_to_key(
                passphrase: &[u8],
                salt: &[u8],
                iter_count: u32,
            ) -> [u8; KEY_LEN] {
                let mut buf = [0u8; KEY_LEN];
                pbkdf2_hmac::<Sha1>(passphrase, salt, iter_count, &mut buf);
                dk(&buf, b"kerberos")
            }

            /// Encrypt and authenticate the plaintext under the base key and
            /// key usage number.
            pub(crate) fn encrypt(
                key: &[u8; KEY_LEN],
                plaintext: &[u8],
                key_usage: i32,
            ) -> Result<Vec<u8>, KrbError> {
                if plaintext.is_empty() {
                    return Err(KrbError::PlaintextEmpty);
                };
                let (ki, ke) = dk_ki_ke(key, key_usage);

                let mut confounder = [0u8; AES_BLOCK_SIZE];
                rand::rng().fill(&mut confounder);

                let mut mac =
                    HmacSha1::new_from_slice(&ki).map_err(|_| KrbError::InvalidHmacSha1Key)?;
                mac.update(&confounder);
                mac.update(plaintext);

                let mut buf = [0u8; 20];
                mac.finalize_into((&mut buf).into());

                // Truncate to 96 bits.
                let my_hmac = &buf[0..SHA1_HMAC_LEN];

                let mut ciphertext = vec![0u8; AES_BLOCK_SIZE + plaintext.len() + SHA1_HMAC_LEN];
                let (cipher, hmac) = ciphertext.split_at_mut(AES_BLOCK_SIZE + plaintext.len());

                encrypt_cts(&ke, &confounder, plaintext, cipher)?;
                hmac.copy_from_slice(my_hmac);

                Ok(ciphertext)
            }

            /// Decrypt and authenticate the ciphertext under the base key and
            /// key usage number.
            pub(crate) fn decrypt(
                key: &[u8; KEY_LEN],
                ciphertext: &[u8],
                key_usage: i32,
            ) -> Result<Vec<u8>, KrbError> {
                // Split to get the mac.
                let Some((ciphertext, msg_hmac)) = ciphertext.split_last_chunk::<SHA1_HMAC_LEN>()
                else {
                    return Err(KrbError::InsufficientData);
                };

                if ciphertext.is_empty() {
                    return Err(KrbError::MessageEmpty);
                };

                let (ki, ke) = dk_ki_ke(key, key_usage);

                let mut plaintext = decrypt_cts(&ke, ciphertext)?;

                let mut mac =
                    HmacSha1::new_from_slice(&ki).map_err(|_| KrbError::InvalidHmacSha1Key)?;
                mac.update(&plaintext);

                let mut buf = [0u8; 20];
                mac.finalize_into((&mut buf).into());

                // Truncate to 96 bits.
                let my_hmac = &buf[0..SHA1_HMAC_LEN];

                // The first block is the random confounder that set up the IV
                // for the rest. Discard it.
                let plaintext = plaintext.split_off(AES_BLOCK_SIZE);

                if my_hmac == msg_hmac {
                    Ok(plaintext)
                } else {
                    Err(KrbError::MessageAuthenticationFailed)
                }
            }

            /// HMAC-SHA1-96 keyed checksum (RFC 3961 section 5.4).
            pub(crate) fn checksum(
                key: &[u8; KEY_LEN],
                data: &[u8],
                key_usage: i32,
            ) -> Result<Vec<u8>, KrbError> {
                if data.is_empty() {
                    return Err(KrbError::PlaintextEmpty);
                };

                let kc = dk_kc(key, key_usage);
                let mut mac =
                    HmacSha1::new_from_slice(&kc).map_err(|_| KrbError::InvalidHmacSha1Key)?;
                mac.update(data);

                let mut buf = [0u8; 20];
                mac.finalize_into((&mut buf).into());

                Ok(buf[0..SHA1_HMAC_LEN].to_vec())
            }

            fn encrypt_cts(
                key: &[u8; KEY_LEN],
                confounder: &[u8],
                plaintext: &[u8],
                ciphertext: &mut [u8],
            ) -> Result<(), KrbError> {
                use aes::cipher::{KeyInit, KeyIvInit};

                debug_assert!(ciphertext.len() == plaintext.len() + AES_BLOCK_SIZE);

                let plaintext_chunks = plaintext.chunks(AES_BLOCK_SIZE);
                let mut ciphertext_chunks = ciphertext.chunks_mut(AES_BLOCK_SIZE);

                // There will be one more ciphertext chunk than plaintext -
                // the confounder occupies the first block.
                debug_assert!(plaintext_chunks.len() + 1 == ciphertext_chunks.len());

                let mut previous_chunk = ciphertext_chunks
                    .next()
                    .ok_or(KrbError::InsufficientData)?;

                // Zip the iters now, ciphertext is positioned to match.
                let mut chunks = std::iter::zip(ciphertext_chunks, plaintext_chunks);
                // The last chunk is the only one that may be short of a full
                // block and needs the CTS swap.
                let (c_n_chunk, p_n_star_chunk) =
                    chunks.next_back().ok_or(KrbError::InsufficientData)?;

                let mut cipher = CbcEnc::new(key.into(), &IV_ZERO.into());

                let mut previous_block = [0u8; AES_BLOCK_SIZE];
                previous_block.copy_from_slice(confounder);

                cipher.encrypt_block_mut((&mut previous_block).into());
                previous_chunk.copy_from_slice(&previous_block);

                for (cipher_chunk, plain_chunk) in chunks {
                    previous_block.copy_from_slice(plain_chunk);
                    cipher.encrypt_block_mut((&mut previous_block).into());
                    cipher_chunk.copy_from_slice(&previous_block);
                    previous_chunk = cipher_chunk;
                }

                // previous_chunk and previous_block both hold Cn-1 now.
                let c_n1_chunk = previous_chunk;
                let c_n1_block = previous_block;

                let p_n_star_len = p_n_star_chunk.len();

                let mut c_n_block: Block = [0u8; AES_BLOCK_SIZE].into();

                // Pad the final plaintext with the tail of Cn-1 and XOR in
                // the head, then run the raw cipher over it.
                let (p_n_star, c_n_star_2) = c_n_block.split_at_mut(p_n_star_len);
                p_n_star.copy_from_slice(p_n_star_chunk);

                let (c_n1_star, c_n1_star_2) = c_n1_block.split_at(p_n_star_len);
                c_n_star_2.copy_from_slice(c_n1_star_2);

                for i in 0..p_n_star_len {
                    p_n_star[i] ^= c_n1_star[i];
                }

                let mut raw_cipher = <$cipher>::new(key.into());
                raw_cipher.encrypt_block_mut(&mut c_n_block);

                // CS3: the final two blocks are unconditionally swapped.
                c_n1_chunk.copy_from_slice(&c_n_block);
                c_n_chunk.copy_from_slice(c_n1_star);

                Ok(())
            }

            fn decrypt_cts(key: &[u8; KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, KrbError> {
                use aes::cipher::{KeyInit, KeyIvInit};

                let ctxt_len = ciphertext.len();
                let num_blocks = ctxt_len / AES_BLOCK_SIZE;

                if num_blocks == 0 {
                    // Impossible in krb because the first block is always the
                    // confounder.
                    return Err(KrbError::CtsCiphertextInvalid);
                }

                let mut cipher = CbcDec::new(key.into(), &IV_ZERO.into());

                let mut plaintext = vec![0u8; ctxt_len];

                let plaintext_chunks = plaintext.chunks_mut(AES_BLOCK_SIZE);
                let ciphertext_chunks = ciphertext.chunks(AES_BLOCK_SIZE);

                let mut chunks = std::iter::zip(ciphertext_chunks, plaintext_chunks);

                // The last two blocks are the swapped CTS pair, handled below.
                let (c_n1_chunk, p_n_chunk) =
                    chunks.next_back().ok_or(KrbError::InsufficientData)?;
                let (c_n_chunk, p_n1_chunk) =
                    chunks.next_back().ok_or(KrbError::InsufficientData)?;

                // CTS aka CS3 is just CBC up to the final pair.
                for (cipher_chunk, plain_chunk) in chunks {
                    cipher.decrypt_block_b2b_mut(cipher_chunk.into(), plain_chunk.into())
                }

                // Decrypt Cn with the raw cipher to recover Z = Pn XOR Cn-1.
                // The head of Z gives Pn; Cn-1 restored from the wire head
                // plus the tail of Z then finishes the CBC chain.
                let mut z: Block = [0u8; AES_BLOCK_SIZE].into();
                let mut raw_cipher = <$cipher>::new(key.into());

                let z_star_len = c_n1_chunk.len();

                raw_cipher.decrypt_block_b2b_mut(c_n_chunk.into(), &mut z);

                let (z_star, z_star_2) = z.split_at(z_star_len);

                debug_assert!(z_star.len() == p_n_chunk.len());

                for i in 0..z_star.len() {
                    p_n_chunk[i] = c_n1_chunk[i] ^ z_star[i];
                }

                let mut cn1_block: Block = [0u8; AES_BLOCK_SIZE].into();
                let (cn1_block_star, cn1_block_star_2) = cn1_block.split_at_mut(c_n1_chunk.len());
                cn1_block_star.copy_from_slice(c_n1_chunk);
                cn1_block_star_2.copy_from_slice(z_star_2);

                // The cbc cipher still carries the correct chain state.
                cipher.decrypt_block_b2b_mut(&cn1_block, p_n1_chunk.into());

                Ok(plaintext)
            }
        }
    };
}

aes_cts_hmac_sha1_96!(aes128, aes::Aes128, AES_128_KEY_LEN);
aes_cts_hmac_sha1_96!(aes256, aes::Aes256, AES_256_KEY_LEN);

pub(crate) fn etype_supported(etype: EncryptionType) -> bool {
    matches!(
        etype,
        EncryptionType::AES128_CTS_HMAC_SHA1_96 | EncryptionType::AES256_CTS_HMAC_SHA1_96
    )
}

/// The RFC 3961 checksum type mandated for the given etype.
pub(crate) fn checksum_type_for_etype(etype: EncryptionType) -> Result<i32, KrbError> {
    match etype {
        EncryptionType::AES128_CTS_HMAC_SHA1_96 => Ok(CHECKSUM_HMAC_SHA1_96_AES128),
        EncryptionType::AES256_CTS_HMAC_SHA1_96 => Ok(CHECKSUM_HMAC_SHA1_96_AES256),
        _ => Err(KrbError::UnsupportedChecksumType),
    }
}

fn key_array<const N: usize>(key: &[u8]) -> Result<&[u8; N], KrbError> {
    key.try_into().map_err(|_| KrbError::InvalidEncryptionKey)
}

/// Derive the long term base key for the given etype from a passphrase and
/// salt. `iter_count` comes from the server supplied s2kparams when present.
pub(crate) fn string_to_key(
    etype: EncryptionType,
    passphrase: &[u8],
    salt: &[u8],
    iter_count: Option<u32>,
) -> Result<Vec<u8>, KrbError> {
    let iter_count = iter_count.unwrap_or(RFC_PBKDF2_SHA1_ITER);
    match etype {
        EncryptionType::AES128_CTS_HMAC_SHA1_96 => {
            Ok(aes128::string_to_key(passphrase, salt, iter_count).to_vec())
        }
        EncryptionType::AES256_CTS_HMAC_SHA1_96 => {
            Ok(aes256::string_to_key(passphrase, salt, iter_count).to_vec())
        }
        _ => Err(KrbError::UnsupportedEncryption),
    }
}

pub(crate) fn encrypt_data(
    etype: EncryptionType,
    key: &[u8],
    plaintext: &[u8],
    key_usage: i32,
) -> Result<Vec<u8>, KrbError> {
    match etype {
        EncryptionType::AES128_CTS_HMAC_SHA1_96 => {
            aes128::encrypt(key_array(key)?, plaintext, key_usage)
        }
        EncryptionType::AES256_CTS_HMAC_SHA1_96 => {
            aes256::encrypt(key_array(key)?, plaintext, key_usage)
        }
        _ => Err(KrbError::UnsupportedEncryption),
    }
}

/// Decrypt under the given key usage. Fails with
/// [`KrbError::MessageAuthenticationFailed`] if the integrity tag does not
/// verify - a wrong key, a corrupted response and genuine tampering are
/// indistinguishable here.
pub(crate) fn decrypt_data(
    etype: EncryptionType,
    key: &[u8],
    ciphertext: &[u8],
    key_usage: i32,
) -> Result<Vec<u8>, KrbError> {
    match etype {
        EncryptionType::AES128_CTS_HMAC_SHA1_96 => {
            aes128::decrypt(key_array(key)?, ciphertext, key_usage)
        }
        EncryptionType::AES256_CTS_HMAC_SHA1_96 => {
            aes256::decrypt(key_array(key)?, ciphertext, key_usage)
        }
        _ => Err(KrbError::UnsupportedEncryption),
    }
}

pub(crate) fn checksum_data(
    etype: EncryptionType,
    key: &[u8],
    data: &[u8],
    key_usage: i32,
) -> Result<Vec<u8>, KrbError> {
    match etype {
        EncryptionType::AES128_CTS_HMAC_SHA1_96 => {
            aes128::checksum(key_array(key)?, data, key_usage)
        }
        EncryptionType::AES256_CTS_HMAC_SHA1_96 => {
            aes256::checksum(key_array(key)?, data, key_usage)
        }
        _ => Err(KrbError::UnsupportedChecksumType),
    }
}
