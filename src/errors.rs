use thiserror::Error;

/// 派生 / 助记词 / 钥匙库统一错误。
///
/// 每条消息带固定的 `E_*` 前缀，CLI 与 HTTP 层据此对外暴露稳定的错误码。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("E_WORD_COUNT: invalid word count: {0} (must be 12, 15, 18, 21 or 24)")]
    InvalidWordCount(i64),
    #[error("E_MNEMONIC: invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("E_DERIVE: invalid derivation path: {0}")]
    Derivation(String),
    #[error("E_ENTROPY: secure random source unavailable: {0}")]
    EntropySource(String),
    #[error("E_PASSWORD: password must not be empty")]
    EncryptionInput,
    #[error("E_COUNT: invalid address count: {0}")]
    InvalidCount(i64),
    #[error("E_KEY: invalid private key: {0}")]
    InvalidPrivateKey(String),
    #[error("E_ADDRESS: invalid address: {0}")]
    InvalidAddress(String),
    #[error("E_AUTH: keystore decrypt failed")]
    Auth,
    #[error("E_KEYSTORE: unsupported keystore: {0}")]
    UnsupportedKeystore(String),
    #[error("keystore path is not a regular file")]
    NotRegularFile,
    #[error("keystore file too large: {0} bytes")]
    FileTooLarge(u64),
}

impl WalletError {
    /// 调用方输入问题（4xx）还是服务端问题（5xx）。
    pub fn is_client_error(&self) -> bool {
        !matches!(self, WalletError::EntropySource(_))
    }

    /// 稳定的机器可读错误码（HTTP 响应体的 `error` 字段）。
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::InvalidWordCount(_) => "invalid_word_count",
            WalletError::InvalidMnemonic(_) => "invalid_mnemonic",
            WalletError::Derivation(_) => "derivation_error",
            WalletError::EntropySource(_) => "entropy_source_error",
            WalletError::EncryptionInput => "encryption_input_error",
            WalletError::InvalidCount(_) => "invalid_count",
            WalletError::InvalidPrivateKey(_) => "invalid_private_key",
            WalletError::InvalidAddress(_) => "invalid_address",
            WalletError::Auth => "auth",
            WalletError::UnsupportedKeystore(_) => "unsupported_keystore",
            WalletError::NotRegularFile => "not_regular_file",
            WalletError::FileTooLarge(_) => "file_too_large",
        }
    }
}
