pub type Result<T> = std::result::Result<T, crate::errors::WalletError>;

/// ESN（Ethersocial Network）在 SLIP-44 中的 coin type。
pub const ESN_COIN_TYPE: u32 = 31102;
/// 默认基础派生路径（末尾索引由调用方追加）。
pub const DEFAULT_BASE_PATH: &str = "44'/31102'/0'/0";
/// 默认助记词长度（32 字节熵）。
pub const DEFAULT_WORD_COUNT: usize = 24;
/// 未指定 count 时一次派生的地址数，也是“加载更多”的步长。
pub const DEFAULT_ADDRESS_COUNT: u32 = 10;
/// 单次请求允许派生的最大地址数。
pub const MAX_ADDRESS_COUNT: u32 = 1000;
pub const SUPPORTED_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];
