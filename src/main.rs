use clap::{Parser, Subcommand, ValueEnum};
use esn_bip44::common::{
    DEFAULT_ADDRESS_COUNT, DEFAULT_BASE_PATH, DEFAULT_WORD_COUNT, MAX_ADDRESS_COUNT,
};
use esn_bip44::hd::HdWallet;
use esn_bip44::keystore::KdfKind;
use esn_bip44::service::{self, MnemonicQuery, ServiceConfig};
use esn_bip44::session::{SessionEvent, SessionState};
use esn_bip44::wallet::Wallet;
use std::io::{self, BufRead};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "esn_bip44", about = "ESN BIP44 address generator", version)]
struct Cli {
    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,
    /// 输出调试日志（stderr）
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliKdf {
    Scrypt,
    Pbkdf2,
}

#[derive(clap::Args)]
struct PhraseArgs {
    /// 助记词（也可用环境变量 ESN_MNEMONIC，避免出现在进程列表里）
    #[arg(long, env = "ESN_MNEMONIC", hide_env_values = true)]
    phrase: String,
    /// 可选的 BIP39 passphrase（默认空）
    #[arg(long, default_value = "")]
    passphrase: String,
    /// 基础派生路径，末尾索引自动追加
    #[arg(long, default_value = DEFAULT_BASE_PATH)]
    base_path: String,
}

#[derive(clap::Args)]
struct PasswordArgs {
    #[arg(long, conflicts_with_all = ["password_prompt", "password_stdin"])]
    password: Option<String>,
    /// 交互输入（掩码显示）
    #[arg(long)]
    password_prompt: bool,
    /// 从 stdin 读取第一行
    #[arg(long, conflicts_with = "password_prompt")]
    password_stdin: bool,
}

#[derive(clap::Args)]
struct KdfArgs {
    /// 钥匙库 KDF
    #[arg(long, value_enum, default_value = "scrypt")]
    kdf: CliKdf,
    /// scrypt n = 2^log_n
    #[arg(long, env = "ESN_SCRYPT_LOG_N", default_value_t = 17)]
    scrypt_log_n: u8,
    #[arg(long, env = "ESN_PBKDF2_ITERATIONS", default_value_t = 262_144)]
    pbkdf2_iterations: u32,
}

impl KdfArgs {
    fn kind(&self) -> KdfKind {
        match self.kdf {
            CliKdf::Scrypt => KdfKind::Scrypt {
                log_n: self.scrypt_log_n,
                r: 8,
                p: 1,
            },
            CliKdf::Pbkdf2 => KdfKind::Pbkdf2 {
                iterations: self.pbkdf2_iterations,
            },
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 生成助记词
    Mnemonic {
        /// 词数（12 | 15 | 18 | 21 | 24）
        #[arg(long, default_value_t = DEFAULT_WORD_COUNT as i64, allow_negative_numbers = true)]
        words: i64,
    },

    /// 由助记词派生地址批次（索引 0..count）
    Addresses {
        #[command(flatten)]
        phrase: PhraseArgs,
        #[arg(long, default_value_t = DEFAULT_ADDRESS_COUNT,
              value_parser = clap::value_parser!(u32).range(..=i64::from(MAX_ADDRESS_COUNT)))]
        count: u32,
    },

    /// 导出 base_path/index 的私钥
    PrivateKey {
        #[command(flatten)]
        phrase: PhraseArgs,
        #[arg(long)]
        index: u32,
    },

    /// 把 base_path/index 的私钥加密为 Web3 v3 钥匙库文件
    Keystore {
        #[command(flatten)]
        phrase: PhraseArgs,
        #[arg(long)]
        index: u32,
        /// 输出目录（文件名 UTC--<时间>--<地址>.json）
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[command(flatten)]
        kdf: KdfArgs,
        #[command(flatten)]
        password: PasswordArgs,
    },

    /// 解密钥匙库文件，显示地址
    DecryptKeystore {
        #[arg(long)]
        file: PathBuf,
        /// 同时输出私钥
        #[arg(long)]
        show_private_key: bool,
        #[command(flatten)]
        password: PasswordArgs,
    },

    /// 交互模式：输入 / 生成助记词，分页加载地址，导出私钥或钥匙库
    Interactive {
        #[command(flatten)]
        kdf: KdfArgs,
    },

    /// 启动 HTTP 服务
    #[cfg(feature = "server")]
    Serve {
        #[arg(long, env = "ESN_BIND", default_value = "127.0.0.1:3000")]
        bind: std::net::SocketAddr,
        #[command(flatten)]
        config: ServiceConfig,
    },
}

fn init_tracing(debug: bool, serving: bool) {
    let default = match (debug, serving) {
        (true, _) => "esn_bip44=debug,tower_http=debug",
        (false, true) => "esn_bip44=info,tower_http=info",
        (false, false) => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout 只留给结果输出
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    #[cfg(feature = "server")]
    let serving = matches!(cli.command, Commands::Serve { .. });
    #[cfg(not(feature = "server"))]
    let serving = false;
    init_tracing(cli.debug, serving);

    match cli.command {
        Commands::Mnemonic { words } => {
            let resp = service::generate_mnemonic(&MnemonicQuery {
                word_count: Some(words),
            })?;
            if cli.json {
                println!("{}", serde_json::to_string(&resp)?);
            } else {
                println!("{}", resp.mnemonic);
            }
        }
        Commands::Addresses { phrase, count } => {
            let hd = HdWallet::from_phrase_with_passphrase(&phrase.phrase, &phrase.passphrase)?;
            let batch = hd.derive_addresses(count, &phrase.base_path)?;
            if cli.json {
                println!("{}", serde_json::json!({ "addresses": batch }));
            } else {
                for entry in &batch {
                    println!("{}/{}\t{}", phrase.base_path, entry.index, entry.address);
                }
            }
        }
        Commands::PrivateKey { phrase, index } => {
            let hd = HdWallet::from_phrase_with_passphrase(&phrase.phrase, &phrase.passphrase)?;
            let w = hd.derive_at(&phrase.base_path, index)?;
            let key = w.private_key_hex();
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "index": index,
                        "address": w.address,
                        "privateKey": key.as_str(),
                    })
                );
            } else {
                println!("Address: {}", w.address);
                println!("Private key: {}", key.as_str());
            }
        }
        Commands::Keystore {
            phrase,
            index,
            dir,
            kdf,
            password,
        } => {
            let hd = HdWallet::from_phrase_with_passphrase(&phrase.phrase, &phrase.passphrase)?;
            let w = hd.derive_at(&phrase.base_path, index)?;
            let pwd = obtain_password(&password, "Set keystore password", true)?;
            let path = w.save_keystore(&dir, &pwd, kdf.kind())?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "address": w.address, "saved": path })
                );
            } else {
                println!("Address: {}", w.address);
                println!("Saved keystore: {}", path.display());
            }
        }
        Commands::DecryptKeystore {
            file,
            show_private_key,
            password,
        } => {
            let pwd = obtain_password(&password, "Enter keystore password", false)?;
            let w = Wallet::load_keystore(&file, &pwd)?;
            let key = show_private_key.then(|| w.private_key_hex());
            if cli.json {
                let mut out = serde_json::json!({ "address": w.address });
                if let Some(k) = &key {
                    out["privateKey"] = serde_json::Value::from(k.as_str());
                }
                println!("{out}");
            } else {
                println!("Address: {}", w.address);
                if let Some(k) = &key {
                    println!("Private key: {}", k.as_str());
                }
            }
        }
        Commands::Interactive { kdf } => run_interactive(kdf.kind())?,
        #[cfg(feature = "server")]
        Commands::Serve { bind, config } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(esn_bip44::server::start_server(bind, config))?;
        }
    }
    Ok(())
}

fn read_password_interactive(prompt: &str, confirm: bool) -> anyhow::Result<String> {
    use inquire::{Password, PasswordDisplayMode};
    let mut p = Password::new(prompt)
        .with_display_toggle_enabled()
        .with_display_mode(PasswordDisplayMode::Masked);
    if !confirm {
        p = p.without_confirmation();
    }
    Ok(p.prompt()?)
}

fn obtain_password(
    args: &PasswordArgs,
    title: &str,
    confirm: bool,
) -> anyhow::Result<Zeroizing<String>> {
    if let Some(p) = &args.password {
        return Ok(Zeroizing::new(p.clone()));
    }
    if args.password_stdin {
        let mut s = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut s)?;
        let trimmed = s.trim_end_matches(['\r', '\n']).len();
        s.truncate(trimmed);
        return Ok(s);
    }
    if args.password_prompt {
        return read_password_interactive(title, confirm).map(Zeroizing::new);
    }
    anyhow::bail!("no password provided; use --password / --password-stdin / --password-prompt")
}

const MENU_ENTER: &str = "Enter mnemonic";
const MENU_GENERATE: &str = "Generate mnemonic";
const MENU_BASE_PATH: &str = "Change base path";
const MENU_LOAD_MORE: &str = "Load more addresses";
const MENU_PRIVATE_KEY: &str = "Show private key";
const MENU_KEYSTORE: &str = "Export keystore";
const MENU_QUIT: &str = "Quit";

/// 再派生一页地址并打印当前整批；没有助记词或派生失败时状态不变。
fn load_more(state: SessionState, config: &ServiceConfig) -> SessionState {
    let Some(req) = state.load_more_request() else {
        return state;
    };
    match service::generate_address(config, &req) {
        Ok(resp) => {
            let epoch = state.epoch();
            let next = state.apply(SessionEvent::AddressesLoaded {
                epoch,
                addresses: resp.addresses.clone(),
            });
            for entry in next.addresses() {
                println!("{:>4}  {}", entry.index, entry.address);
            }
            next
        }
        Err(e) => {
            eprintln!("{e}");
            state
        }
    }
}

fn run_interactive(kdf: KdfKind) -> anyhow::Result<()> {
    use inquire::{Confirm, CustomType, Password, PasswordDisplayMode, Select, Text};

    let config = ServiceConfig::default();
    let mut state = SessionState::default();
    loop {
        let choice = Select::new(
            &format!("[{}] choose an action", state.base_path()),
            vec![
                MENU_ENTER,
                MENU_GENERATE,
                MENU_BASE_PATH,
                MENU_LOAD_MORE,
                MENU_PRIVATE_KEY,
                MENU_KEYSTORE,
                MENU_QUIT,
            ],
        )
        .prompt()?;

        state = match choice {
            MENU_ENTER => {
                let phrase = Password::new("Mnemonic:")
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .without_confirmation()
                    .prompt()?;
                if let Err(e) = esn_bip44::mnemonic::parse_mnemonic(&phrase) {
                    eprintln!("{e}");
                    state
                } else {
                    state.apply(SessionEvent::MnemonicEntered(phrase))
                }
            }
            MENU_GENERATE => {
                let words: i64 = CustomType::new("Word count:")
                    .with_default(DEFAULT_WORD_COUNT as i64)
                    .prompt()?;
                match service::generate_mnemonic(&MnemonicQuery {
                    word_count: Some(words),
                }) {
                    Ok(resp) => {
                        println!("{}", resp.mnemonic);
                        println!("Write these words down; they are not stored anywhere.");
                        // 新助记词直接显示第一页地址
                        let state =
                            state.apply(SessionEvent::MnemonicGenerated(resp.mnemonic.clone()));
                        load_more(state, &config)
                    }
                    Err(e) => {
                        eprintln!("{e}");
                        state
                    }
                }
            }
            MENU_BASE_PATH => {
                let path = Text::new("Base path:")
                    .with_default(state.base_path())
                    .prompt()?;
                state.apply(SessionEvent::BasePathChanged(path))
            }
            MENU_LOAD_MORE => {
                if state.mnemonic().is_none() {
                    eprintln!("enter or generate a mnemonic first");
                    continue;
                }
                load_more(state, &config)
            }
            MENU_PRIVATE_KEY | MENU_KEYSTORE => {
                let Some(phrase) = state.mnemonic().map(str::to_owned).map(Zeroizing::new) else {
                    eprintln!("enter or generate a mnemonic first");
                    continue;
                };
                let index: u32 = CustomType::new("Address index:").with_default(0).prompt()?;
                let w = match HdWallet::from_phrase(&phrase)
                    .and_then(|hd| hd.derive_at(state.base_path(), index))
                {
                    Ok(w) => w,
                    Err(e) => {
                        eprintln!("{e}");
                        continue;
                    }
                };
                if choice == MENU_PRIVATE_KEY {
                    if Confirm::new("Reveal the private key on screen?")
                        .with_default(false)
                        .prompt()?
                    {
                        println!("{}  {}", w.address, w.private_key_hex().as_str());
                    }
                } else {
                    let pwd = Zeroizing::new(read_password_interactive("Keystore password:", true)?);
                    if pwd.is_empty() {
                        eprintln!("password must not be empty");
                        continue;
                    }
                    let dir: String = Text::new("Output directory:").with_default(".").prompt()?;
                    match w.save_keystore(&dir, &pwd, kdf) {
                        Ok(path) => println!("Saved keystore: {}", path.display()),
                        Err(e) => eprintln!("{e:#}"),
                    }
                }
                state
            }
            _ => break,
        };
    }
    Ok(())
}
