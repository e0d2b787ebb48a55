//! ESN 钱包：单个密钥对 + 钥匙库导入导出。
//! 主要功能：由私钥构造钱包、导出 0x 私钥、Web3 v3 钥匙库加密保存 / 解密加载、原子写入。
//!
//! 地址算法（EVM）
//! - 输入：secp256k1 非压缩公钥(65B)，去掉 0x04 前缀得 64B。
//! - H = Keccak-256(64B)，地址为 H 的后 20 字节。
//! - 输出：0x + EIP-55 大小写校验编码。
//!
//! 钥匙库文件
//! - 文件名：`UTC--<时间>--<地址>.json`（见 [`keystore_file_name`]）。
//! - 写入：同目录临时文件 -> fsync -> rename -> fsync 目录；拒绝符号链接目标与父目录。
//! - 读取：最大 1 MiB，Unix 下以 O_NOFOLLOW 打开。
use crate::crypto::{public_key_from_secret, public_key_to_address};
use crate::errors::WalletError;
use crate::keystore::{decrypt_key, encrypt_key, keystore_file_name, KdfKind, KeystoreFile};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use secp256k1::{PublicKey, SecretKey};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// 钥匙库文件大小上限
pub(crate) const MAX_KEYSTORE_FILE_SIZE: u64 = 1024 * 1024;

/// 钱包结构体，包含私钥、公钥和地址
pub struct Wallet {
    pub(crate) secret_key: SecretKey, // 仅 crate 内部可见
    pub public_key: PublicKey,
    pub address: String, // EIP-55 地址
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 只显示地址和公钥前缀
        let comp = self.public_key.serialize();
        let pk_short = format!(
            "{:02x}{:02x}{:02x}{:02x}..",
            comp[0], comp[1], comp[2], comp[3]
        );
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("public_key_prefix", &pk_short)
            .finish()
    }
}

impl Wallet {
    /// 由既有私钥构造钱包（推导公钥和地址）
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = public_key_from_secret(&secret_key);
        let address = public_key_to_address(&public_key);
        Self {
            secret_key,
            public_key,
            address,
        }
    }

    /// 由 hex 私钥构造（可带 0x 前缀）。
    pub fn from_private_key_hex(hex_key: &str) -> crate::common::Result<Self> {
        let body = hex_key.trim();
        let body = body.strip_prefix("0x").unwrap_or(body);
        let mut bytes = Zeroizing::new([0u8; 32]);
        hex::decode_to_slice(body, bytes.as_mut_slice())
            .map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;
        let sk = SecretKey::from_slice(bytes.as_slice())
            .map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_secret_key(sk))
    }

    /// 0x 前缀的小写 hex 私钥
    pub fn private_key_hex(&self) -> Zeroizing<String> {
        let bytes = Zeroizing::new(self.secret_key.secret_bytes());
        Zeroizing::new(format!("0x{}", hex::encode(bytes.as_slice())))
    }

    /// 加密为 v3 钥匙库文档（不落盘）。
    pub fn to_keystore(&self, password: &str, kdf: KdfKind) -> crate::common::Result<KeystoreFile> {
        let bytes = Zeroizing::new(self.secret_key.secret_bytes());
        encrypt_key(&bytes, &self.address, password, kdf)
    }

    /// 从 v3 钥匙库文档解密；文档中的地址若存在，必须与解出的私钥一致。
    pub fn from_keystore(file: &KeystoreFile, password: &str) -> crate::common::Result<Self> {
        let secret = decrypt_key(file, password)?;
        let sk = SecretKey::from_slice(secret.as_slice())
            .map_err(|e| WalletError::InvalidPrivateKey(e.to_string()))?;
        let wallet = Self::from_secret_key(sk);
        if !file.address.is_empty() {
            let declared = file.address.strip_prefix("0x").unwrap_or(&file.address);
            if !declared.eq_ignore_ascii_case(&wallet.address[2..]) {
                return Err(WalletError::InvalidAddress(format!(
                    "keystore address {} does not match decrypted key",
                    file.address
                )));
            }
        }
        Ok(wallet)
    }

    /// 加密并保存到 `dir/UTC--<时间>--<地址>.json`，返回写入的路径。
    pub fn save_keystore<P: AsRef<Path>>(
        &self,
        dir: P,
        password: &str,
        kdf: KdfKind,
    ) -> Result<PathBuf> {
        let file = self.to_keystore(password, kdf)?;
        let json = file.to_json_pretty()?;
        let target = dir
            .as_ref()
            .join(keystore_file_name(Utc::now(), &self.address));
        write_file_atomically(&target, json.as_bytes())?;
        tracing::info!(path = %target.display(), kdf = kdf.label(), "keystore saved");
        Ok(target)
    }

    /// 读取并解密钥匙库文件。
    pub fn load_keystore<P: AsRef<Path>>(path: P, password: &str) -> Result<Self> {
        let path = path.as_ref();
        let raw = read_keystore_file_secure(path)?;
        let text = std::str::from_utf8(&raw).context("keystore is not valid UTF-8")?;
        let file = KeystoreFile::from_json(text)?;
        let wallet = Self::from_keystore(&file, password)?;
        tracing::debug!(path = %path.display(), "keystore loaded");
        Ok(wallet)
    }
}

fn write_file_atomically(target: &Path, data: &[u8]) -> Result<()> {
    // 1. 校验并创建父目录
    if let Some(parent) = target.parent() {
        validate_parent_dir(parent)?;
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("create parent directory")?;
        }
        validate_parent_dir(parent)?; // 创建后再查一次
    }
    validate_target_path_for_write(target)?;

    // 2. 临时文件写入
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let base = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("keystore.json");
    let (mut f, tmp) = create_temp_exclusive(dir, base)?;
    if let Err(e) = f.write_all(data).and_then(|_| f.sync_all()) {
        drop(f);
        let _ = fs::remove_file(&tmp);
        return Err(e).context("write temp file");
    }
    drop(f);

    // 3. 替换前最后检查，然后原子 rename
    #[cfg(unix)]
    if unix_is_symlink(target) {
        let _ = fs::remove_file(&tmp);
        return Err(anyhow!("refuse to overwrite symlinked keystore file (race)"));
    }
    if let Err(e) = fs::rename(&tmp, target) {
        let _ = fs::remove_file(&tmp);
        return Err(e).context("atomic replace tmp -> target");
    }

    #[cfg(unix)]
    sync_dir(dir).context("fsync parent directory")?;
    Ok(())
}

#[cfg(unix)]
fn unix_is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// 父目录若已存在必须是目录；Unix 下不能是符号链接
fn validate_parent_dir(parent: &Path) -> Result<()> {
    if let Ok(meta) = fs::metadata(parent) {
        if !meta.is_dir() {
            return Err(anyhow!("parent is not a directory"));
        }
    }
    #[cfg(unix)]
    if unix_is_symlink(parent) {
        return Err(anyhow!("refuse to write into symlinked parent directory"));
    }
    Ok(())
}

fn validate_target_path_for_write(target: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(target) {
        if meta.file_type().is_symlink() {
            return Err(anyhow!("refuse to overwrite symlinked keystore file"));
        }
        if !meta.is_file() {
            return Err(WalletError::NotRegularFile.into());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

/// 在目录下创建唯一的临时文件（`<base>.<随机>.tmp`），Unix 下权限 600
fn create_temp_exclusive(dir: &Path, base: &str) -> Result<(File, PathBuf)> {
    for _ in 0..8 {
        let mut rnd = [0u8; 8];
        OsRng
            .try_fill_bytes(&mut rnd)
            .map_err(|e| WalletError::EntropySource(e.to_string()))?;
        let candidate = dir.join(format!("{base}.{}.tmp", hex::encode(rnd)));
        let mut opts = OpenOptions::new();
        opts.create_new(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }
        match opts.open(&candidate) {
            Ok(f) => return Ok((f, candidate)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e).context("create temp file"),
        }
    }
    Err(anyhow!("create temp file: too many collisions"))
}

/// 安全读取钥匙库：只接受普通文件，大小受限；Unix 下拒绝符号链接（O_NOFOLLOW）
fn read_keystore_file_secure(path: &Path) -> Result<Vec<u8>> {
    let mut opts = OpenOptions::new();
    opts.read(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC);
    }
    let file = opts
        .open(path)
        .with_context(|| format!("open keystore file {}", path.display()))?;

    let meta = file.metadata().context("fstat keystore file")?;
    if !meta.is_file() {
        return Err(WalletError::NotRegularFile.into());
    }
    if meta.len() > MAX_KEYSTORE_FILE_SIZE {
        return Err(WalletError::FileTooLarge(meta.len()).into());
    }

    // 多读 1 字节，防止 fstat 之后文件被追加
    let mut buf = Vec::with_capacity(meta.len() as usize);
    BufReader::new(file)
        .take(MAX_KEYSTORE_FILE_SIZE + 1)
        .read_to_end(&mut buf)
        .context("read keystore file")?;
    if buf.len() as u64 > MAX_KEYSTORE_FILE_SIZE {
        return Err(WalletError::FileTooLarge(buf.len() as u64).into());
    }
    Ok(buf)
}
