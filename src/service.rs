//! 三个对外操作（generateAddress / generateMnemonic / getPrivateKey）的请求响应类型与校验。
//!
//! 与传输层无关：HTTP 路由和 CLI 都只是把输入转成这里的请求结构再调用。
//! JSON 字段名为 camelCase。

use crate::common::{
    Result, DEFAULT_ADDRESS_COUNT, DEFAULT_BASE_PATH, DEFAULT_WORD_COUNT, MAX_ADDRESS_COUNT,
};
use crate::errors::WalletError;
use crate::hd::{self, AddressEntry, HdPath};
use crate::mnemonic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// 服务参数（命令行 / `ESN_*` 环境变量）
#[derive(Debug, Clone, PartialEq, Eq, clap::Args)]
pub struct ServiceConfig {
    /// 请求未给出 basePath 时使用的基础路径
    #[arg(long, env = "ESN_DEFAULT_BASE_PATH", default_value = DEFAULT_BASE_PATH)]
    pub default_base_path: String,
    /// 请求未给出 count 时派生的地址数
    #[arg(long, env = "ESN_DEFAULT_COUNT", default_value_t = DEFAULT_ADDRESS_COUNT)]
    pub default_count: u32,
    /// 单次请求允许的最大地址数
    #[arg(long, env = "ESN_MAX_COUNT", default_value_t = MAX_ADDRESS_COUNT)]
    pub max_count: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_base_path: DEFAULT_BASE_PATH.to_string(),
            default_count: DEFAULT_ADDRESS_COUNT,
            max_count: MAX_ADDRESS_COUNT,
        }
    }
}

impl ServiceConfig {
    /// 启动时检查：默认路径可解析，默认数量不超过上限。
    pub fn validate(&self) -> Result<()> {
        HdPath::from_str(&self.default_base_path)?;
        if self.default_count > self.max_count {
            return Err(WalletError::InvalidCount(i64::from(self.default_count)));
        }
        Ok(())
    }

    fn base_path<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested.map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => &self.default_base_path,
        }
    }

    fn count(&self, requested: Option<i64>) -> Result<u32> {
        let Some(count) = requested else {
            return Ok(self.default_count);
        };
        match u32::try_from(count) {
            Ok(c) if c <= self.max_count => Ok(c),
            _ => Err(WalletError::InvalidCount(count)),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAddressRequest {
    #[serde(default)]
    pub mnemonic: String,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub base_path: Option<String>,
}

impl fmt::Debug for GenerateAddressRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateAddressRequest")
            .field("mnemonic", &"<redacted>")
            .field("count", &self.count)
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl Drop for GenerateAddressRequest {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateAddressResponse {
    pub addresses: Vec<AddressEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MnemonicQuery {
    #[serde(default)]
    pub word_count: Option<i64>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMnemonicResponse {
    pub mnemonic: String,
    pub word_count: usize,
}

impl fmt::Debug for GenerateMnemonicResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerateMnemonicResponse")
            .field("mnemonic", &"<redacted>")
            .field("word_count", &self.word_count)
            .finish()
    }
}

impl Drop for GenerateMnemonicResponse {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPrivateKeyRequest {
    #[serde(default)]
    pub mnemonic: String,
    pub index: i64,
    #[serde(default)]
    pub base_path: Option<String>,
}

impl fmt::Debug for GetPrivateKeyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetPrivateKeyRequest")
            .field("mnemonic", &"<redacted>")
            .field("index", &self.index)
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl Drop for GetPrivateKeyRequest {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPrivateKeyResponse {
    pub private_key: String,
}

impl fmt::Debug for GetPrivateKeyResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetPrivateKeyResponse").finish_non_exhaustive()
    }
}

impl Drop for GetPrivateKeyResponse {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

/// 由助记词派生地址批次；count 缺省取配置值，负数或超过上限报 `InvalidCount`。
#[tracing::instrument(level = "debug", skip_all, fields(count = ?req.count))]
pub fn generate_address(
    config: &ServiceConfig,
    req: &GenerateAddressRequest,
) -> Result<GenerateAddressResponse> {
    let count = config.count(req.count)?;
    let base_path = config.base_path(req.base_path.as_deref());
    let addresses = hd::derive_addresses(&req.mnemonic, count, base_path)?;
    Ok(GenerateAddressResponse { addresses })
}

/// 生成新助记词；wordCount 缺省为 24。
#[tracing::instrument(level = "debug", skip_all, fields(word_count = ?query.word_count))]
pub fn generate_mnemonic(query: &MnemonicQuery) -> Result<GenerateMnemonicResponse> {
    let word_count = match query.word_count {
        None => DEFAULT_WORD_COUNT,
        Some(wc) => usize::try_from(wc).map_err(|_| WalletError::InvalidWordCount(wc))?,
    };
    let mnemonic = mnemonic::generate_mnemonic(word_count)?;
    Ok(GenerateMnemonicResponse {
        mnemonic,
        word_count,
    })
}

/// 导出 `basePath/index` 的私钥；负数索引报 `Derivation`。
#[tracing::instrument(level = "debug", skip_all, fields(index = req.index))]
pub fn get_private_key(
    config: &ServiceConfig,
    req: &GetPrivateKeyRequest,
) -> Result<GetPrivateKeyResponse> {
    let index = u32::try_from(req.index)
        .map_err(|_| WalletError::Derivation(format!("index {} out of range", req.index)))?;
    let base_path = config.base_path(req.base_path.as_deref());
    let key = hd::derive_private_key(&req.mnemonic, base_path, index)?;
    Ok(GetPrivateKeyResponse {
        private_key: key.as_str().to_owned(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    const TEST_PHRASE: &str = "test test test test test test test test test test test junk";

    fn addr_req(count: Option<i64>, base_path: Option<&str>) -> GenerateAddressRequest {
        GenerateAddressRequest {
            mnemonic: TEST_PHRASE.into(),
            count,
            base_path: base_path.map(String::from),
        }
    }

    #[test]
    fn default_count_and_path() {
        let cfg = ServiceConfig::default();
        let resp = generate_address(&cfg, &addr_req(None, None)).unwrap();
        assert_eq!(resp.addresses.len(), 10);
        assert_eq!(
            resp.addresses[0].address,
            "0x9A393340673f6c35cDEa5062Dd06197f5799762A"
        );
        // 空字符串等同于未给出
        let blank = generate_address(&cfg, &addr_req(Some(1), Some("  "))).unwrap();
        assert_eq!(blank.addresses[0], resp.addresses[0]);
    }

    #[test]
    fn base_path_override() {
        let cfg = ServiceConfig::default();
        let resp = generate_address(&cfg, &addr_req(Some(1), Some("44'/60'/0'/0"))).unwrap();
        assert_eq!(
            resp.addresses[0].address,
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn count_bounds() {
        let cfg = ServiceConfig {
            max_count: 5,
            ..ServiceConfig::default()
        };
        assert!(generate_address(&cfg, &addr_req(Some(0), None))
            .unwrap()
            .addresses
            .is_empty());
        assert_eq!(
            generate_address(&cfg, &addr_req(Some(5), None)).unwrap().addresses.len(),
            5
        );
        assert_eq!(
            generate_address(&cfg, &addr_req(Some(6), None)).unwrap_err(),
            WalletError::InvalidCount(6)
        );
        assert_eq!(
            generate_address(&cfg, &addr_req(Some(-1), None)).unwrap_err(),
            WalletError::InvalidCount(-1)
        );
    }

    #[test]
    fn bad_mnemonic_and_path() {
        let cfg = ServiceConfig::default();
        let mut req = addr_req(Some(1), None);
        req.mnemonic = "not a mnemonic".into();
        assert!(matches!(
            generate_address(&cfg, &req),
            Err(WalletError::InvalidMnemonic(_))
        ));
        assert!(matches!(
            generate_address(&cfg, &addr_req(Some(1), Some("44'/abc"))),
            Err(WalletError::Derivation(_))
        ));
    }

    #[test]
    fn mnemonic_word_counts() {
        let resp = generate_mnemonic(&MnemonicQuery::default()).unwrap();
        assert_eq!(resp.word_count, 24);
        assert_eq!(resp.mnemonic.split(' ').count(), 24);
        let resp = generate_mnemonic(&MnemonicQuery {
            word_count: Some(12),
        })
        .unwrap();
        assert_eq!(resp.mnemonic.split(' ').count(), 12);
        for wc in [13, 0, -1] {
            assert_eq!(
                generate_mnemonic(&MnemonicQuery {
                    word_count: Some(wc)
                })
                .unwrap_err(),
                WalletError::InvalidWordCount(wc)
            );
        }
    }

    #[test]
    fn private_key_matches_address_batch() {
        let cfg = ServiceConfig::default();
        let batch = generate_address(&cfg, &addr_req(Some(3), None)).unwrap();
        for entry in &batch.addresses {
            let resp = get_private_key(
                &cfg,
                &GetPrivateKeyRequest {
                    mnemonic: TEST_PHRASE.into(),
                    index: i64::from(entry.index),
                    base_path: None,
                },
            )
            .unwrap();
            let w = crate::wallet::Wallet::from_private_key_hex(&resp.private_key).unwrap();
            assert_eq!(w.address, entry.address);
        }
    }

    #[test]
    fn private_key_rejects_invalid_mnemonic() {
        let cfg = ServiceConfig::default();
        let bad_checksum = ["test"; 12].join(" ");
        let unknown_word = "test test test test test test test test test test test zzzz";
        for phrase in [bad_checksum.as_str(), unknown_word] {
            let req = GetPrivateKeyRequest {
                mnemonic: phrase.into(),
                index: 0,
                base_path: None,
            };
            assert!(matches!(
                get_private_key(&cfg, &req),
                Err(WalletError::InvalidMnemonic(_))
            ));
            let mut req = addr_req(Some(1), None);
            req.mnemonic = phrase.into();
            assert!(matches!(
                generate_address(&cfg, &req),
                Err(WalletError::InvalidMnemonic(_))
            ));
        }
    }

    #[test]
    fn negative_index_is_derivation_error() {
        let cfg = ServiceConfig::default();
        let req = GetPrivateKeyRequest {
            mnemonic: TEST_PHRASE.into(),
            index: -1,
            base_path: None,
        };
        assert!(matches!(
            get_private_key(&cfg, &req),
            Err(WalletError::Derivation(_))
        ));
    }

    #[test]
    fn camel_case_wire_format() {
        let req: GenerateAddressRequest =
            serde_json::from_str(r#"{"mnemonic":"a b","count":3,"basePath":"44'/60'/0'/0"}"#)
                .unwrap();
        assert_eq!(req.count, Some(3));
        assert_eq!(req.base_path.as_deref(), Some("44'/60'/0'/0"));
        let v = serde_json::to_value(GenerateMnemonicResponse {
            mnemonic: "x".into(),
            word_count: 12,
        })
        .unwrap();
        assert_eq!(v["wordCount"], 12);
        let v = serde_json::to_value(GetPrivateKeyResponse {
            private_key: "0x00".into(),
        })
        .unwrap();
        assert_eq!(v["privateKey"], "0x00");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let dbg = format!("{:?}", addr_req(Some(1), None));
        assert!(!dbg.contains("junk"));
    }

    #[test]
    fn config_validation() {
        assert!(ServiceConfig::default().validate().is_ok());
        let bad_path = ServiceConfig {
            default_base_path: "44'/x".into(),
            ..ServiceConfig::default()
        };
        assert!(bad_path.validate().is_err());
        let bad_count = ServiceConfig {
            default_count: 20,
            max_count: 10,
            ..ServiceConfig::default()
        };
        assert!(bad_count.validate().is_err());
    }
}
