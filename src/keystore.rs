//! Web3 Secret Storage v3 钥匙库编解码。
//!
//! 文件格式（JSON）：
//! - address: 小写 hex 地址（无 0x）。
//! - id: UUID v4。
//! - version: 固定 3。
//! - crypto.cipher: "aes-128-ctr"；crypto.cipherparams.iv: 16 字节 IV（hex）。
//! - crypto.kdf: "scrypt" 或 "pbkdf2"；crypto.kdfparams: 对应参数与 32 字节 salt。
//! - crypto.ciphertext: 私钥经 AES-128-CTR 加密后的 hex。
//! - crypto.mac: keccak256(derivedKey[16..32] ‖ ciphertext)。
//!
//! 加密密钥取 derivedKey 前 16 字节，MAC 密钥取后 16 字节。
//! 所有原语（scrypt / pbkdf2 / AES / Keccak）均来自外部 crate，本模块只做拼装。

use crate::common::Result;
use crate::crypto::keccak256;
use crate::errors::WalletError;
use aes::Aes128;
use chrono::{DateTime, SecondsFormat, Utc};
use ctr::cipher::{KeyIvInit, StreamCipher};
use pbkdf2::pbkdf2_hmac;
use rand::{rngs::OsRng, CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

pub const KEYSTORE_VERSION: u32 = 3;
pub const CIPHER_AES_128_CTR: &str = "aes-128-ctr";
const PRF_HMAC_SHA256: &str = "hmac-sha256";

const DKLEN: usize = 32;
const SALT_LEN: usize = 32;
const IV_LEN: usize = 16;
const SECRET_LEN: usize = 32;

// 解密时对 KDF 参数设上限，拒绝耗尽内存 / CPU 的恶意文件。
// scrypt 内存约为 128·r·n 字节，上限取 geth "standard" 档（n=2^18, r=8）。
const MAX_SCRYPT_LOG_N: u8 = 24;
const MAX_SCRYPT_MEMORY: u64 = 256 * 1024 * 1024;
const MAX_SCRYPT_P: u32 = 16;
const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;

/// 钥匙库使用的密钥派生函数及参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfKind {
    /// n = 2^log_n
    Scrypt { log_n: u8, r: u32, p: u32 },
    /// PBKDF2-HMAC-SHA256
    Pbkdf2 { iterations: u32 },
}

impl KdfKind {
    /// n=131072, r=8, p=1（与主流钱包软件一致）
    pub const SCRYPT_DEFAULT: KdfKind = KdfKind::Scrypt {
        log_n: 17,
        r: 8,
        p: 1,
    };
    pub const PBKDF2_DEFAULT: KdfKind = KdfKind::Pbkdf2 {
        iterations: 262_144,
    };

    /// 写入 `crypto.kdf` 的名称
    pub fn label(&self) -> &'static str {
        match self {
            KdfKind::Scrypt { .. } => "scrypt",
            KdfKind::Pbkdf2 { .. } => "pbkdf2",
        }
    }

    fn check_bounds(&self) -> Result<()> {
        match *self {
            KdfKind::Scrypt { log_n, r, p } => {
                if log_n == 0 || log_n > MAX_SCRYPT_LOG_N || r == 0 || p == 0 || p > MAX_SCRYPT_P {
                    return Err(WalletError::UnsupportedKeystore(format!(
                        "scrypt params out of range: log_n={log_n} r={r} p={p}"
                    )));
                }
                let memory = 128u64
                    .saturating_mul(u64::from(r))
                    .saturating_mul(1u64 << log_n);
                if memory > MAX_SCRYPT_MEMORY {
                    return Err(WalletError::UnsupportedKeystore(format!(
                        "scrypt needs {memory} bytes (log_n={log_n} r={r}), limit {MAX_SCRYPT_MEMORY}"
                    )));
                }
            }
            KdfKind::Pbkdf2 { iterations } => {
                if iterations == 0 || iterations > MAX_PBKDF2_ITERATIONS {
                    return Err(WalletError::UnsupportedKeystore(format!(
                        "pbkdf2 iterations out of range: {iterations}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for KdfKind {
    fn default() -> Self {
        KdfKind::SCRYPT_DEFAULT
    }
}

/// 按名称取默认参数的 KDF（"scrypt" / "pbkdf2"，大小写不敏感）。
pub fn parse_kdf(label: &str) -> Result<KdfKind> {
    match label.trim().to_ascii_lowercase().as_str() {
        "scrypt" => Ok(KdfKind::SCRYPT_DEFAULT),
        "pbkdf2" => Ok(KdfKind::PBKDF2_DEFAULT),
        other => Err(WalletError::UnsupportedKeystore(format!("unsupported kdf: {other}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeystoreFile {
    pub address: String,
    pub id: String,
    pub version: u32,
    // geth 早期版本写的是大写 "Crypto"
    #[serde(alias = "Crypto")]
    pub crypto: CryptoSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoSection {
    pub cipher: String,
    pub cipherparams: CipherParams,
    pub ciphertext: String,
    pub kdf: String,
    pub kdfparams: KdfParams,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    pub iv: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KdfParams {
    Scrypt {
        dklen: usize,
        n: u64,
        p: u32,
        r: u32,
        salt: String,
    },
    Pbkdf2 {
        c: u32,
        dklen: usize,
        prf: String,
        salt: String,
    },
}

impl KeystoreFile {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| WalletError::UnsupportedKeystore(format!("serialize: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| WalletError::UnsupportedKeystore(format!("parse: {e}")))
    }

    /// 从 kdf 名称与 kdfparams 还原 [`KdfKind`] 和 salt，并做参数上限检查。
    fn kdf_and_salt(&self) -> Result<(KdfKind, Vec<u8>)> {
        let (kind, salt, dklen) = match (&*self.crypto.kdf, &self.crypto.kdfparams) {
            ("scrypt", KdfParams::Scrypt { dklen, n, p, r, salt }) => {
                if *n < 2 || !n.is_power_of_two() {
                    return Err(WalletError::UnsupportedKeystore(format!(
                        "scrypt n must be a power of two: {n}"
                    )));
                }
                let log_n = u8::try_from(n.trailing_zeros()).map_err(|_| {
                    WalletError::UnsupportedKeystore(format!("scrypt n too large: {n}"))
                })?;
                (KdfKind::Scrypt { log_n, r: *r, p: *p }, salt, *dklen)
            }
            ("pbkdf2", KdfParams::Pbkdf2 { c, dklen, prf, salt }) => {
                if prf != PRF_HMAC_SHA256 {
                    return Err(WalletError::UnsupportedKeystore(format!(
                        "unsupported prf: {prf}"
                    )));
                }
                (KdfKind::Pbkdf2 { iterations: *c }, salt, *dklen)
            }
            (kdf, _) => {
                return Err(WalletError::UnsupportedKeystore(format!(
                    "unsupported kdf or mismatched kdfparams: {kdf}"
                )))
            }
        };
        if dklen != DKLEN {
            return Err(WalletError::UnsupportedKeystore(format!(
                "dklen must be {DKLEN}, got {dklen}"
            )));
        }
        kind.check_bounds()?;
        let salt = decode_field("salt", salt)?;
        if salt.is_empty() {
            return Err(WalletError::UnsupportedKeystore("empty salt".into()));
        }
        Ok((kind, salt))
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    let body = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(body)
        .map_err(|e| WalletError::UnsupportedKeystore(format!("{name} is not valid hex: {e}")))
}

fn derive_key(password: &[u8], salt: &[u8], kdf: KdfKind) -> Result<Zeroizing<[u8; DKLEN]>> {
    let mut dk = Zeroizing::new([0u8; DKLEN]);
    match kdf {
        KdfKind::Scrypt { log_n, r, p } => {
            let params = scrypt::Params::new(log_n, r, p, DKLEN)
                .map_err(|e| WalletError::UnsupportedKeystore(format!("scrypt params: {e}")))?;
            scrypt::scrypt(password, salt, &params, dk.as_mut_slice())
                .map_err(|e| WalletError::UnsupportedKeystore(format!("scrypt: {e}")))?;
        }
        KdfKind::Pbkdf2 { iterations } => {
            pbkdf2_hmac::<Sha256>(password, salt, iterations, dk.as_mut_slice());
        }
    }
    Ok(dk)
}

fn compute_mac(dk: &[u8; DKLEN], ciphertext: &[u8]) -> [u8; 32] {
    let mut buf = Zeroizing::new(Vec::with_capacity(16 + ciphertext.len()));
    buf.extend_from_slice(&dk[16..32]);
    buf.extend_from_slice(ciphertext);
    keccak256(&buf)
}

fn apply_aes_128_ctr(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    let mut cipher = Aes128Ctr::new_from_slices(key, iv)
        .map_err(|_| WalletError::UnsupportedKeystore(format!("iv must be {IV_LEN} bytes")))?;
    cipher.apply_keystream(data);
    Ok(())
}

/// 用口令加密 32 字节私钥，生成 v3 钥匙库文档。
///
/// `address` 可带或不带 0x，写入时统一为小写无前缀。空口令报 `EncryptionInput`。
pub fn encrypt_key(
    secret: &[u8; SECRET_LEN],
    address: &str,
    password: &str,
    kdf: KdfKind,
) -> Result<KeystoreFile> {
    encrypt_key_with_rng(secret, address, password, kdf, &mut OsRng)
}

pub fn encrypt_key_with_rng<R>(
    secret: &[u8; SECRET_LEN],
    address: &str,
    password: &str,
    kdf: KdfKind,
    rng: &mut R,
) -> Result<KeystoreFile>
where
    R: RngCore + CryptoRng,
{
    if password.is_empty() {
        return Err(WalletError::EncryptionInput);
    }
    kdf.check_bounds()?;

    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    let mut id = [0u8; 16];
    for buf in [&mut salt[..], &mut iv[..], &mut id[..]] {
        rng.try_fill_bytes(buf)
            .map_err(|e| WalletError::EntropySource(e.to_string()))?;
    }

    let dk = derive_key(password.as_bytes(), &salt, kdf)?;
    let mut ciphertext = secret.to_vec();
    apply_aes_128_ctr(&dk[..16], &iv, &mut ciphertext)?;
    let mac = compute_mac(&dk, &ciphertext);

    let kdfparams = match kdf {
        KdfKind::Scrypt { log_n, r, p } => KdfParams::Scrypt {
            dklen: DKLEN,
            n: 1u64 << log_n,
            p,
            r,
            salt: hex::encode(salt),
        },
        KdfKind::Pbkdf2 { iterations } => KdfParams::Pbkdf2 {
            c: iterations,
            dklen: DKLEN,
            prf: PRF_HMAC_SHA256.to_string(),
            salt: hex::encode(salt),
        },
    };
    let address = address
        .strip_prefix("0x")
        .unwrap_or(address)
        .to_ascii_lowercase();

    tracing::debug!(kdf = kdf.label(), "encrypted keystore");
    Ok(KeystoreFile {
        address,
        id: uuid::Builder::from_random_bytes(id).into_uuid().to_string(),
        version: KEYSTORE_VERSION,
        crypto: CryptoSection {
            cipher: CIPHER_AES_128_CTR.to_string(),
            cipherparams: CipherParams {
                iv: hex::encode(iv),
            },
            ciphertext: hex::encode(&ciphertext),
            kdf: kdf.label().to_string(),
            kdfparams,
            mac: hex::encode(mac),
        },
    })
}

/// 解密钥匙库，返回 32 字节私钥。MAC 不符报 `Auth`。
pub fn decrypt_key(file: &KeystoreFile, password: &str) -> Result<Zeroizing<[u8; SECRET_LEN]>> {
    if file.version != KEYSTORE_VERSION {
        return Err(WalletError::UnsupportedKeystore(format!(
            "version {}",
            file.version
        )));
    }
    if file.crypto.cipher != CIPHER_AES_128_CTR {
        return Err(WalletError::UnsupportedKeystore(format!(
            "cipher {}",
            file.crypto.cipher
        )));
    }
    let (kdf, salt) = file.kdf_and_salt()?;
    let iv = decode_field("iv", &file.crypto.cipherparams.iv)?;
    if iv.len() != IV_LEN {
        return Err(WalletError::UnsupportedKeystore(format!(
            "iv must be {IV_LEN} bytes"
        )));
    }
    let ciphertext = decode_field("ciphertext", &file.crypto.ciphertext)?;
    if ciphertext.len() != SECRET_LEN {
        return Err(WalletError::UnsupportedKeystore(format!(
            "ciphertext must be {SECRET_LEN} bytes"
        )));
    }
    let mac = decode_field("mac", &file.crypto.mac)?;

    let dk = derive_key(password.as_bytes(), &salt, kdf)?;
    let expected = compute_mac(&dk, &ciphertext);
    if !bool::from(expected.as_slice().ct_eq(mac.as_slice())) {
        tracing::warn!("keystore mac mismatch");
        return Err(WalletError::Auth);
    }
    let mut secret = Zeroizing::new([0u8; SECRET_LEN]);
    secret.copy_from_slice(&ciphertext);
    apply_aes_128_ctr(&dk[..16], &iv, secret.as_mut_slice())?;
    Ok(secret)
}

/// `UTC--<ISO-8601 UTC>--<address>.json`。
///
/// 时间中的 ':' 换成 '-'（Windows 文件名不允许 ':'），与 geth 写出的
/// `UTC--2016-03-22T12-57-55.920751759Z--<addr>` 相同；因此文件名中的时间并非严格 ISO-8601。
pub fn keystore_file_name(now: DateTime<Utc>, address: &str) -> String {
    let ts = now
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");
    format!("UTC--{ts}--{address}.json")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::TimeZone;

    // 轻量参数，避免测试耗时
    const LIGHT_SCRYPT: KdfKind = KdfKind::Scrypt {
        log_n: 10,
        r: 8,
        p: 1,
    };
    const LIGHT_PBKDF2: KdfKind = KdfKind::Pbkdf2 { iterations: 1024 };

    const VECTOR_KEY: &str = "7a28b5ba57c53603b0b07b56bba752f7784bf506fa95edc395f5cf6c7514fe9d";

    fn vector_pbkdf2() -> KeystoreFile {
        let json = r#"{
            "crypto": {
                "cipher": "aes-128-ctr",
                "cipherparams": { "iv": "6087dab2f9fdbbfaddc31a909735c1e6" },
                "ciphertext": "5318b4d5bcd28de64ee5559e671353e16f075ecae9f99c7a79a38af5f869aa46",
                "kdf": "pbkdf2",
                "kdfparams": {
                    "c": 262144,
                    "dklen": 32,
                    "prf": "hmac-sha256",
                    "salt": "ae3cd4e7013836a3df6bd7241b12db061dbe2c6785853cce422d148a624ce0bd"
                },
                "mac": "517ead924a9d0dc3124507e3393d175ce3ff7c1e96529c6c555ce9e51205e9b2"
            },
            "id": "3198bc9c-6672-5ab3-d995-4942343ae5b6",
            "version": 3,
            "address": "008aeeda4d805471df9b2a5b0f38a0c3bcba786b"
        }"#;
        KeystoreFile::from_json(json).unwrap()
    }

    fn secret() -> [u8; 32] {
        let mut out = [0u8; 32];
        hex::decode_to_slice(VECTOR_KEY, &mut out).unwrap();
        out
    }

    #[test]
    fn web3_pbkdf2_vector_decrypts() {
        let file = vector_pbkdf2();
        let key = decrypt_key(&file, "testpassword").unwrap();
        assert_eq!(hex::encode(key.as_slice()), VECTOR_KEY);
        assert_eq!(decrypt_key(&file, "testpassword!"), Err(WalletError::Auth));
    }

    #[test]
    fn roundtrip_scrypt_and_pbkdf2() {
        for kdf in [LIGHT_SCRYPT, LIGHT_PBKDF2] {
            let file = encrypt_key(&secret(), "0xABCDEF", "hunter22", kdf).unwrap();
            assert_eq!(file.version, 3);
            assert_eq!(file.address, "abcdef");
            assert_eq!(file.crypto.kdf, kdf.label());
            // 经过一次 JSON 序列化再解密
            let reparsed = KeystoreFile::from_json(&file.to_json_pretty().unwrap()).unwrap();
            let key = decrypt_key(&reparsed, "hunter22").unwrap();
            assert_eq!(*key, secret());
            assert_eq!(decrypt_key(&reparsed, "hunter23"), Err(WalletError::Auth));
        }
    }

    #[test]
    fn scrypt_params_serialized_as_n() {
        let file = encrypt_key(&secret(), "00", "pw", LIGHT_SCRYPT).unwrap();
        let v: serde_json::Value = serde_json::from_str(&file.to_json_pretty().unwrap()).unwrap();
        assert_eq!(v["crypto"]["kdfparams"]["n"], 1024);
        assert_eq!(v["crypto"]["kdfparams"]["r"], 8);
        assert_eq!(v["crypto"]["kdfparams"]["dklen"], 32);
        assert_eq!(v["crypto"]["cipher"], "aes-128-ctr");
        assert!(uuid::Uuid::parse_str(v["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn empty_password_rejected() {
        assert_eq!(
            encrypt_key(&secret(), "00", "", LIGHT_PBKDF2),
            Err(WalletError::EncryptionInput)
        );
    }

    #[test]
    fn salt_and_iv_are_fresh() {
        let a = encrypt_key(&secret(), "00", "pw", LIGHT_PBKDF2).unwrap();
        let b = encrypt_key(&secret(), "00", "pw", LIGHT_PBKDF2).unwrap();
        assert_ne!(a.crypto.cipherparams.iv, b.crypto.cipherparams.iv);
        assert_ne!(a.crypto.kdfparams, b.crypto.kdfparams);
        assert_ne!(a.crypto.ciphertext, b.crypto.ciphertext);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn hostile_kdf_params_rejected() {
        let mut file = vector_pbkdf2();
        file.crypto.kdfparams = KdfParams::Scrypt {
            dklen: 32,
            n: 1 << 30,
            p: 1,
            r: 8,
            salt: "00".into(),
        };
        file.crypto.kdf = "scrypt".into();
        assert!(matches!(
            decrypt_key(&file, "x"),
            Err(WalletError::UnsupportedKeystore(_))
        ));

        let mut file = vector_pbkdf2();
        if let KdfParams::Pbkdf2 { c, .. } = &mut file.crypto.kdfparams {
            *c = u32::MAX;
        }
        assert!(matches!(
            decrypt_key(&file, "x"),
            Err(WalletError::UnsupportedKeystore(_))
        ));
    }

    #[test]
    fn scrypt_memory_is_bounded() {
        // 128 * 32 * 2^20 = 4 GiB
        let mut file = vector_pbkdf2();
        file.crypto.kdf = "scrypt".into();
        file.crypto.kdfparams = KdfParams::Scrypt {
            dklen: 32,
            n: 1 << 20,
            p: 1,
            r: 32,
            salt: "00".into(),
        };
        assert!(matches!(
            decrypt_key(&file, "x"),
            Err(WalletError::UnsupportedKeystore(_))
        ));
        // 同样的内存量从 r 或 n 任一方向都拒绝
        assert!(KdfKind::Scrypt { log_n: 19, r: 8, p: 1 }.check_bounds().is_err());
        assert!(KdfKind::Scrypt { log_n: 10, r: 4096, p: 1 }.check_bounds().is_err());
        // geth 的 standard 档恰好在上限内
        assert!(KdfKind::Scrypt { log_n: 18, r: 8, p: 1 }.check_bounds().is_ok());
        assert!(KdfKind::SCRYPT_DEFAULT.check_bounds().is_ok());
        let heavy = KdfKind::Scrypt {
            log_n: 20,
            r: 8,
            p: 1,
        };
        assert!(encrypt_key(&secret(), "00", "pw", heavy).is_err());
    }

    #[test]
    fn mac_mismatch_of_any_length_is_auth() {
        let mut file = vector_pbkdf2();
        file.crypto.mac = "517e".into();
        assert_eq!(decrypt_key(&file, "testpassword"), Err(WalletError::Auth));
        let mut file = vector_pbkdf2();
        file.crypto.mac = "00".repeat(32);
        assert_eq!(decrypt_key(&file, "testpassword"), Err(WalletError::Auth));
    }

    #[test]
    fn unknown_cipher_or_kdf_rejected() {
        let mut file = vector_pbkdf2();
        file.crypto.cipher = "aes-256-gcm".into();
        assert!(matches!(
            decrypt_key(&file, "testpassword"),
            Err(WalletError::UnsupportedKeystore(_))
        ));
        let mut file = vector_pbkdf2();
        file.crypto.kdf = "argon2id".into();
        assert!(matches!(
            decrypt_key(&file, "testpassword"),
            Err(WalletError::UnsupportedKeystore(_))
        ));
        assert!(parse_kdf("argon2").is_err());
        assert_eq!(parse_kdf("SCRYPT").unwrap(), KdfKind::SCRYPT_DEFAULT);
    }

    #[test]
    fn file_name_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            keystore_file_name(now, "0x9A393340673f6c35cDEa5062Dd06197f5799762A"),
            "UTC--2024-03-09T14-05-07.000Z--0x9A393340673f6c35cDEa5062Dd06197f5799762A.json"
        );
    }
}
