//! 交互客户端的会话状态。
//!
//! 状态不可变：每个事件经 [`SessionState::apply`] 产生新状态，没有共享的可变数据。
//! “加载更多”就是用更大的 count 重新派生整批地址，依赖派生结果的前缀稳定性。
//! 同一 epoch 内只接受比当前更长的批次；不能延续当前前缀的长批次整批替换旧数据。

use crate::common::{DEFAULT_ADDRESS_COUNT, DEFAULT_BASE_PATH};
use crate::hd::AddressEntry;
use crate::service::GenerateAddressRequest;
use std::fmt;
use zeroize::Zeroizing;

/// 每次“加载更多”增加的地址数
pub const PAGE_SIZE: u32 = DEFAULT_ADDRESS_COUNT;

#[derive(Clone, PartialEq, Eq)]
pub struct SessionState {
    mnemonic: Option<Zeroizing<String>>,
    base_path: String,
    addresses: Vec<AddressEntry>,
    // 助记词或路径每变一次加一；旧 epoch 的批次视为过期
    epoch: u64,
}

#[derive(Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// 用户输入了助记词
    MnemonicEntered(String),
    /// 新生成了助记词
    MnemonicGenerated(String),
    BasePathChanged(String),
    /// 一次派生请求完成；`epoch` 为发起请求时的状态 epoch
    AddressesLoaded {
        epoch: u64,
        addresses: Vec<AddressEntry>,
    },
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("has_mnemonic", &self.mnemonic.is_some())
            .field("base_path", &self.base_path)
            .field("addresses", &self.addresses.len())
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::MnemonicEntered(_) => f.write_str("MnemonicEntered(..)"),
            SessionEvent::MnemonicGenerated(_) => f.write_str("MnemonicGenerated(..)"),
            SessionEvent::BasePathChanged(p) => f.debug_tuple("BasePathChanged").field(p).finish(),
            SessionEvent::AddressesLoaded { epoch, addresses } => f
                .debug_struct("AddressesLoaded")
                .field("epoch", epoch)
                .field("addresses", &addresses.len())
                .finish(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PATH)
    }
}

impl SessionState {
    pub fn new(base_path: &str) -> Self {
        Self {
            mnemonic: None,
            base_path: base_path.to_string(),
            addresses: Vec::new(),
            epoch: 0,
        }
    }

    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_deref().map(String::as_str)
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn addresses(&self) -> &[AddressEntry] {
        &self.addresses
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// 下一次“加载更多”应请求的总数
    pub fn next_count(&self) -> u32 {
        u32::try_from(self.addresses.len())
            .unwrap_or(u32::MAX)
            .saturating_add(PAGE_SIZE)
    }

    /// 以 `count` 构造派生请求；尚无助记词时返回 None，不发请求。
    pub fn address_request(&self, count: u32) -> Option<GenerateAddressRequest> {
        let mnemonic = self.mnemonic()?;
        Some(GenerateAddressRequest {
            mnemonic: mnemonic.to_string(),
            count: Some(i64::from(count)),
            base_path: Some(self.base_path.clone()),
        })
    }

    /// “加载更多”的请求
    pub fn load_more_request(&self) -> Option<GenerateAddressRequest> {
        self.address_request(self.next_count())
    }

    pub fn apply(self, event: SessionEvent) -> Self {
        match event {
            SessionEvent::MnemonicEntered(m) | SessionEvent::MnemonicGenerated(m) => {
                let trimmed = m.trim();
                let mnemonic = (!trimmed.is_empty()).then(|| Zeroizing::new(trimmed.to_string()));
                Self {
                    mnemonic,
                    base_path: self.base_path,
                    addresses: Vec::new(),
                    epoch: self.epoch + 1,
                }
            }
            SessionEvent::BasePathChanged(p) => Self {
                mnemonic: self.mnemonic,
                base_path: p.trim().to_string(),
                addresses: Vec::new(),
                epoch: self.epoch + 1,
            },
            SessionEvent::AddressesLoaded { epoch, addresses } => {
                if epoch != self.epoch {
                    tracing::debug!(epoch, current = self.epoch, "dropping stale address batch");
                    return self;
                }
                if addresses.len() <= self.addresses.len() {
                    // 晚到的小批次，已显示的更多
                    tracing::debug!(
                        got = addresses.len(),
                        shown = self.addresses.len(),
                        "dropping late address batch"
                    );
                    return self;
                }
                if !addresses.starts_with(&self.addresses) {
                    // 与已显示批次不一致，整批丢弃旧数据
                    tracing::warn!("address batch is not a prefix extension; replacing");
                }
                Self { addresses, ..self }
            }
        }
    }
}
