use crate::common::Result;
use crate::errors::WalletError;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

/// 地址字节长度（Keccak-256 摘要的后 20 字节）。
pub const ADDRESS_LEN: usize = 20;

/// Keccak-256（以太坊系使用的原始 Keccak，非 NIST SHA3-256）。
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// 由私钥推导公钥。
pub fn public_key_from_secret(secret_key: &SecretKey) -> PublicKey {
    let secp = Secp256k1::signing_only();
    PublicKey::from_secret_key(&secp, secret_key)
}

/// 公钥 -> EVM 地址（EIP-55 大小写校验格式，带 0x 前缀）。
///
/// 地址 = Keccak-256(非压缩公钥去掉 0x04 前缀的 64 字节) 的后 20 字节。
pub fn public_key_to_address(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    checksum_encode(&hash[32 - ADDRESS_LEN..])
}

/// 20 字节地址的 EIP-55 编码。
fn checksum_encode(addr: &[u8]) -> String {
    let lower = hex::encode(addr);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, ch) in lower.chars().enumerate() {
        // 每个十六进制字符对应摘要中的一个半字节
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn decode_address(addr: &str) -> Option<Vec<u8>> {
    let body = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);
    let bytes = hex::decode(body).ok()?;
    (bytes.len() == ADDRESS_LEN).then_some(bytes)
}

/// 任意大小写的地址字符串 -> EIP-55 格式。
pub fn to_checksum_address(addr: &str) -> Result<String> {
    decode_address(addr)
        .map(|bytes| checksum_encode(&bytes))
        .ok_or_else(|| WalletError::InvalidAddress(addr.to_string()))
}

/// 全小写 / 全大写视为未带校验；混合大小写时必须与 EIP-55 完全一致。
pub fn is_checksum_address(addr: &str) -> bool {
    let Some(bytes) = decode_address(addr) else {
        return false;
    };
    let body = &addr[addr.len() - 2 * ADDRESS_LEN..];
    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if !(has_lower && has_upper) {
        return true;
    }
    checksum_encode(&bytes)[2..] == *body
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn keccak_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn eip55_reference_vectors() -> Result<()> {
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            assert_eq!(to_checksum_address(&expected.to_lowercase())?, expected);
            assert!(is_checksum_address(expected));
        }
        Ok(())
    }

    #[test]
    fn tampered_case_fails_checksum() {
        assert!(!is_checksum_address("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(is_checksum_address("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(!is_checksum_address("0x1234"));
        assert!(to_checksum_address("0xzz").is_err());
    }

    #[test]
    fn address_from_known_key() {
        // Hardhat 默认账户 #0
        let sk = SecretKey::from_str(
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        let pk = public_key_from_secret(&sk);
        assert_eq!(
            public_key_to_address(&pk),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }
}
