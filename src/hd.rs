//! HD 钱包（BIP39 + BIP32(secp256k1) + BIP44 路径）
//!
//! 用法：
//! let hd = HdWallet::from_phrase(phrase)?;
//! let batch = hd.derive_addresses(10, "44'/31102'/0'/0")?;
//! let key = hd.derive_private_key("44'/31102'/0'/0", 3)?;
//!
//! 地址批次与私钥导出共用 [`HdWallet::derive_at`]，同一 (助记词, 路径, 索引)
//! 得到的地址和私钥必然匹配。

use crate::common::Result;
use crate::errors::WalletError;
use crate::mnemonic::parse_mnemonic;
use crate::wallet::Wallet;
use bip32::{ChildNumber, DerivationPath, XPrv};
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

// 非硬化子索引的个数（0..2^31）
const MAX_BATCH_COUNT: u32 = 0x8000_0000;
const PREALLOC_LIMIT: u32 = 1024;

/// 地址批次中的一项。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressEntry {
    pub index: u32,
    pub address: String,
}

/// 已解析的派生路径（不含 `m` 根）。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HdPath {
    segments: Vec<ChildNumber>,
}

impl HdPath {
    pub fn segments(&self) -> &[ChildNumber] {
        &self.segments
    }

    /// 追加一个非硬化的索引段：`base/index`。
    pub fn child(&self, index: u32) -> Result<Self> {
        let cn = ChildNumber::new(index, false)
            .map_err(|_| WalletError::Derivation(format!("index {index} out of range")))?;
        let mut segments = self.segments.clone();
        segments.push(cn);
        Ok(Self { segments })
    }
}

impl FromStr for HdPath {
    type Err = WalletError;

    /// 接受 `44'/31102'/0'/0` 与 `m/44'/31102'/0'/0` 两种写法；
    /// 硬化标记可为 `'`、`h` 或 `H`；每段索引必须小于 2^31。
    fn from_str(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        let body = match trimmed {
            "m" | "M" | "" => "",
            p => p
                .strip_prefix("m/")
                .or_else(|| p.strip_prefix("M/"))
                .unwrap_or(p),
        };
        // 统一成 bip32 接受的 `m/44'/..` 形式；u32 解析会放过 `+1`，这里先挡掉
        let mut normalized = String::from("m");
        if !body.is_empty() {
            for raw in body.split('/') {
                let (digits, hardened) = match raw.strip_suffix(['\'', 'h', 'H']) {
                    Some(d) => (d, true),
                    None => (raw, false),
                };
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(WalletError::Derivation(format!(
                        "malformed segment {raw:?} in {path:?}"
                    )));
                }
                normalized.push('/');
                normalized.push_str(digits);
                if hardened {
                    normalized.push('\'');
                }
            }
        }
        let dp = DerivationPath::from_str(&normalized)
            .map_err(|e| WalletError::Derivation(format!("bad path {path:?}: {e}")))?;
        Ok(Self {
            segments: dp.iter().collect(),
        })
    }
}

impl fmt::Display for HdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for cn in &self.segments {
            write!(f, "/{}", cn.index())?;
            if cn.is_hardened() {
                f.write_str("'")?;
            }
        }
        Ok(())
    }
}

/// 已校验助记词对应的 BIP32 主扩展私钥。
pub struct HdWallet {
    master: XPrv,
}

impl fmt::Debug for HdWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdWallet").finish_non_exhaustive()
    }
}

impl HdWallet {
    // 从短语构建（空 passphrase）
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        Self::from_phrase_with_passphrase(phrase, "")
    }

    // 带 BIP39 passphrase
    pub fn from_phrase_with_passphrase(phrase: &str, passphrase: &str) -> Result<Self> {
        let mnemonic = parse_mnemonic(phrase)?;
        let seed = Zeroizing::new(mnemonic.to_seed_normalized(passphrase));
        let master = XPrv::new(seed.as_slice())
            .map_err(|e| WalletError::Derivation(format!("master key: {e}")))?;
        Ok(Self { master })
    }

    fn derive_node(&self, path: &HdPath) -> Result<XPrv> {
        let mut cur = self.master.clone();
        for cn in path.segments() {
            cur = cur
                .derive_child(*cn)
                .map_err(|e| WalletError::Derivation(format!("bip32 derive {path}: {e}")))?;
        }
        Ok(cur)
    }

    fn node_to_wallet(node: &XPrv) -> Result<Wallet> {
        let sk_bytes = Zeroizing::new(node.to_bytes());
        let sk = SecretKey::from_slice(sk_bytes.as_slice())
            .map_err(|e| WalletError::Derivation(format!("invalid child key: {e}")))?;
        Ok(Wallet::from_secret_key(sk))
    }

    /// 任意完整路径上的密钥对。
    pub fn derive_path(&self, path: &str) -> Result<Wallet> {
        let path = HdPath::from_str(path)?;
        Self::node_to_wallet(&self.derive_node(&path)?)
    }

    /// `base_path/index` 上的密钥对。
    pub fn derive_at(&self, base_path: &str, index: u32) -> Result<Wallet> {
        let path = HdPath::from_str(base_path)?.child(index)?;
        Self::node_to_wallet(&self.derive_node(&path)?)
    }

    /// 索引 0..count 的地址，升序；count 为 0 时返回空。
    ///
    /// 基础节点只派生一次，每个索引仅多一步非硬化子派生，
    /// 结果与逐条调用 [`derive_at`](Self::derive_at) 完全相同。
    /// 非硬化索引只有 2^31 个，更大的 count 直接报 `Derivation`。
    pub fn derive_addresses(&self, count: u32, base_path: &str) -> Result<Vec<AddressEntry>> {
        let base = HdPath::from_str(base_path)?;
        if count > MAX_BATCH_COUNT {
            return Err(WalletError::Derivation(format!(
                "count {count} exceeds {MAX_BATCH_COUNT} non-hardened indices"
            )));
        }
        if count == 0 {
            return Ok(Vec::new());
        }
        let base_node = self.derive_node(&base)?;
        // 容量按上限截断，不按调用方给的 count 预分配
        let mut out = Vec::with_capacity(count.min(PREALLOC_LIMIT) as usize);
        for index in 0..count {
            let cn = ChildNumber::new(index, false)
                .map_err(|_| WalletError::Derivation(format!("index {index} out of range")))?;
            let child = base_node
                .derive_child(cn)
                .map_err(|e| WalletError::Derivation(format!("bip32 derive {base}/{index}: {e}")))?;
            let wallet = Self::node_to_wallet(&child)?;
            out.push(AddressEntry {
                index,
                address: wallet.address,
            });
        }
        Ok(out)
    }

    /// `base_path/index` 的私钥（0x 前缀小写 hex）。
    pub fn derive_private_key(&self, base_path: &str, index: u32) -> Result<Zeroizing<String>> {
        Ok(self.derive_at(base_path, index)?.private_key_hex())
    }
}

/// 由助记词派生地址批次。
pub fn derive_addresses(mnemonic: &str, count: u32, base_path: &str) -> Result<Vec<AddressEntry>> {
    let hd = HdWallet::from_phrase(mnemonic)?;
    let batch = hd.derive_addresses(count, base_path)?;
    tracing::debug!(count, base_path, "derived address batch");
    Ok(batch)
}

/// 由助记词导出 `base_path/index` 的私钥。
pub fn derive_private_key(mnemonic: &str, base_path: &str, index: u32) -> Result<Zeroizing<String>> {
    let hd = HdWallet::from_phrase(mnemonic)?;
    let key = hd.derive_private_key(base_path, index)?;
    tracing::debug!(base_path, index, "exported private key");
    Ok(key)
}
