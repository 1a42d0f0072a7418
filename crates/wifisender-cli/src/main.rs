//! Wifisender CLI
//!
//! 直接驱动核心库的命令行前端：发送、接收和查看/修改设置。

mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use wifisender_core::{
    AppSettings, SessionHandle, SessionOutcome, SessionState, TransferSession, WireFormat,
};

use render::{Renderer, format_size};

#[derive(Parser)]
#[command(name = "wifisender", version, about = "局域网文件传输工具")]
struct Cli {
    /// 每个事件输出一行 JSON，代替进度条
    #[arg(long, global = true)]
    json: bool,

    /// 输出核心库的调试日志到 stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送文件
    Send {
        /// 要发送的文件，按给出的顺序发送
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// 接收端地址 (默认使用设置中的 recipient)
        #[arg(short, long)]
        to: Option<String>,
        /// 接收端端口
        #[arg(short, long)]
        port: Option<u16>,
        /// 连接超时 (秒)
        #[arg(long)]
        timeout: Option<u64>,
        /// 使用旧版文件名字段格式
        #[arg(long)]
        legacy: bool,
    },
    /// 接收文件
    Receive {
        /// 保存目录 (默认: 下载目录)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 监听端口
        #[arg(short, long)]
        port: Option<u16>,
        /// 截断的文件视为失败
        #[arg(long)]
        strict: bool,
        /// 使用旧版文件名字段格式
        #[arg(long)]
        legacy: bool,
    },
    /// 查看或修改设置
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// 显示当前设置
    Show,
    /// 显示配置文件路径
    Path,
    /// 修改一项设置
    Set { key: String, value: String },
    /// 恢复默认设置
    Reset,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = AppSettings::load();

    match cli.command {
        Commands::Send {
            files,
            to,
            port,
            timeout,
            legacy,
        } => {
            let address = to
                .or_else(|| settings.recipient.clone())
                .context("no recipient given; use --to or `wifisender config set recipient <addr>`")?;
            for file in &files {
                anyhow::ensure!(file.is_file(), "not a regular file: {}", file.display());
            }

            let mut options = settings.send_options();
            if let Some(secs) = timeout {
                options.connect_timeout = Duration::from_secs(secs);
            }
            if legacy {
                options.wire_format = WireFormat::Legacy;
            }
            let port = port.unwrap_or(settings.port);

            if !cli.json {
                println!("📤 发送 {} 个文件到 {}:{}", files.len(), address, port);
            }
            let handle = TransferSession::send(options, address, port, files);
            let outcome = drive(handle, cli.json).await?;
            if !cli.json {
                println!(
                    "   已发送 {} 个文件 ({})",
                    outcome.completed_files(),
                    format_size(outcome.total_bytes())
                );
            }
            Ok(exit_code(&outcome))
        }
        Commands::Receive {
            output,
            port,
            strict,
            legacy,
        } => {
            let mut options = settings.receive_options();
            if let Some(dir) = output {
                options.output_dir = dir;
            }
            if let Some(port) = port {
                options.port = port;
            }
            options.strict |= strict;
            if legacy {
                options.wire_format = WireFormat::Legacy;
            }

            if !cli.json {
                println!("📥 接收模式 (保存到: {})", options.output_dir.display());
                println!("   Your IP Address: {}", wifisender_core::net::local_ip());
            }
            let handle = TransferSession::receive(options);
            let outcome = drive(handle, cli.json).await?;
            if !cli.json {
                println!(
                    "   已接收 {} 个文件 ({})",
                    outcome.completed_files(),
                    format_size(outcome.total_bytes())
                );
            }
            Ok(exit_code(&outcome))
        }
        Commands::Config { action } => {
            match action.unwrap_or(ConfigAction::Show) {
                ConfigAction::Show => {
                    print!("{}", toml_text(&settings)?);
                }
                ConfigAction::Path => {
                    println!("{}", AppSettings::config_path().display());
                }
                ConfigAction::Set { key, value } => {
                    settings.set(&key, &value)?;
                    settings.save()?;
                    println!("{key} 已更新");
                }
                ConfigAction::Reset => {
                    AppSettings::default().save()?;
                    println!("已恢复默认设置");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// 初始化日志
///
/// 默认只输出警告，避免打乱进度条；`-v` 或 RUST_LOG 打开详细日志。
fn init_logging(verbose: bool) {
    // 桥接 log crate（wifisender-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let default = if verbose {
        "info,wifisender_core=debug"
    } else {
        "warn"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .try_init();
}

/// 输出会话事件直到结束；Ctrl-C 请求取消
async fn drive(mut handle: SessionHandle, json: bool) -> Result<SessionOutcome> {
    let renderer = Renderer::new(json)?;

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling session");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        renderer.handle(&event)?;
    }
    renderer.finish();

    Ok(handle.join().await?)
}

fn exit_code(outcome: &SessionOutcome) -> ExitCode {
    match outcome.state {
        SessionState::Complete => ExitCode::SUCCESS,
        SessionState::Cancelled => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

fn toml_text(settings: &AppSettings) -> Result<String> {
    let mut text = format!("# {}\n", AppSettings::config_path().display());
    text.push_str(&toml::to_string_pretty(settings)?);
    Ok(text)
}
