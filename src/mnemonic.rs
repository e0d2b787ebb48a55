//! BIP39 助记词：随机生成与解析校验。
//!
//! 熵长度（字节）= floor(词数 × 4 / 3)：12→16，15→20，18→24，21→28，24→32。
//! 熵只取自操作系统 CSPRNG（`OsRng`），失败即报错，不回退到普通伪随机数。

use crate::common::{Result, SUPPORTED_WORD_COUNTS};
use crate::errors::WalletError;
use bip39::{Language, Mnemonic};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use zeroize::Zeroizing;

/// 词数对应的熵字节数；词数不受支持时报 `InvalidWordCount`。
pub fn entropy_len(word_count: usize) -> Result<usize> {
    if !SUPPORTED_WORD_COUNTS.contains(&word_count) {
        return Err(WalletError::InvalidWordCount(word_count as i64));
    }
    Ok(word_count * 4 / 3)
}

/// 生成指定词数的英文助记词。
pub fn generate_mnemonic(word_count: usize) -> Result<String> {
    generate_mnemonic_with_rng(word_count, &mut OsRng)
}

/// 同 [`generate_mnemonic`]，但熵来源由调用方提供（必须是 CSPRNG）。
pub fn generate_mnemonic_with_rng<R>(word_count: usize, rng: &mut R) -> Result<String>
where
    R: RngCore + CryptoRng,
{
    let len = entropy_len(word_count)?;
    let mut entropy = Zeroizing::new(vec![0u8; len]);
    rng.try_fill_bytes(&mut entropy)
        .map_err(|e| WalletError::EntropySource(e.to_string()))?;
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
    tracing::debug!(word_count, "generated mnemonic");
    Ok(mnemonic.to_string())
}

/// 规范化：小写，折叠任意空白为单个空格。
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 解析并校验助记词（词表 + 校验和），失败报 `InvalidMnemonic`。
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic> {
    let normalized = Zeroizing::new(normalize_phrase(phrase));
    if normalized.is_empty() {
        return Err(WalletError::InvalidMnemonic("empty phrase".into()));
    }
    Mnemonic::parse_in_normalized(Language::English, &normalized)
        .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))
}

pub fn is_valid_mnemonic(phrase: &str) -> bool {
    parse_mnemonic(phrase).is_ok()
}
