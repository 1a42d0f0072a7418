use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use xshell::{Shell, cmd};

const BINARIES: [&str; 2] = ["wifisender", "wifisender-tui"];

#[derive(Parser)]
#[command(name = "xtask", about = "Wifisender 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建所有组件 (release)
    Build,
    /// 运行 TUI (开发模式)，日志追加到文件
    Tui {
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "debug")]
        log_level: String,
        /// 日志输出文件 (默认 target/wifisender-tui.log)
        #[arg(short = 'o', long)]
        log_file: Option<PathBuf>,
        /// 预先加入发送列表的文件
        files: Vec<PathBuf>,
    },
    /// 在本机回环上收发一个文件并校验内容
    Smoke {
        /// 测试文件大小 (KiB)
        #[arg(long, default_value_t = 1024)]
        size_kib: usize,
        /// 使用的端口
        #[arg(long, default_value_t = 5599)]
        port: u16,
    },
    /// 打包发布 (tar.gz)
    Dist,
    /// 运行测试
    Test,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;
    sh.change_dir(project_root()?);

    match cli.command {
        Commands::Build => build(&sh),
        Commands::Tui {
            log_level,
            log_file,
            files,
        } => tui(&sh, &log_level, log_file, &files),
        Commands::Smoke { size_kib, port } => smoke(&sh, size_kib, port),
        Commands::Dist => dist(&sh),
        Commands::Test => test(&sh),
        Commands::Clean => clean(&sh),
    }
}

/// xtask 位于工作区根目录下一层
fn project_root() -> Result<PathBuf> {
    match std::env::var_os("CARGO_MANIFEST_DIR") {
        Some(dir) => Path::new(&dir)
            .parent()
            .map(Path::to_path_buf)
            .context("xtask manifest has no parent directory"),
        None => Ok(std::env::current_dir()?),
    }
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建 {}...", BINARIES.join(", "));
    cmd!(sh, "cargo build --release -p wifisender-cli -p wifisender-tui").run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn tui(sh: &Shell, log_level: &str, log_file: Option<PathBuf>, files: &[PathBuf]) -> Result<()> {
    let log_file = log_file.unwrap_or_else(|| sh.current_dir().join("target/wifisender-tui.log"));

    println!("🖥️  启动 TUI，日志级别 {log_level}");
    println!("💡 另一个终端中运行: tail -f {}", log_file.display());

    cmd!(sh, "cargo build -p wifisender-tui").run()?;

    // 设置 RUST_LOG 时 TUI 同时把日志写到 stderr，重定向到文件避免打乱界面
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .with_context(|| format!("cannot open {}", log_file.display()))?;
    let status = Command::new(sh.current_dir().join("target/debug/wifisender-tui"))
        .args(files)
        .env("RUST_LOG", format!("{log_level},wifisender_core={log_level}"))
        .stderr(log)
        .status()?;

    println!("📁 日志已保存到: {}", log_file.display());
    if !status.success() {
        bail!("wifisender-tui exited with {status}");
    }
    Ok(())
}

/// 启动接收端进程，再用 CLI 发送一个随机内容的文件，比较两端内容
fn smoke(sh: &Shell, size_kib: usize, port: u16) -> Result<()> {
    println!("🔁 回环收发测试 ({size_kib} KiB, 端口 {port})...");
    cmd!(sh, "cargo build -p wifisender-cli").run()?;
    let bin = sh.current_dir().join("target/debug/wifisender");

    let work = sh.create_temp_dir()?;
    let inbox = work.path().join("inbox");
    sh.create_dir(&inbox)?;

    let payload = work.path().join("payload.bin");
    let data: Vec<u8> = (0..size_kib * 1024)
        .map(|i| (i.wrapping_mul(31) % 251) as u8)
        .collect();
    sh.write_file(&payload, &data)?;

    let port = port.to_string();
    let mut receiver = Command::new(&bin)
        .args(["receive", "--port", &port, "--output"])
        .arg(&inbox)
        .stdout(Stdio::null())
        .spawn()
        .context("cannot start receiver")?;
    std::thread::sleep(Duration::from_millis(500));

    if let Err(e) = cmd!(sh, "{bin} send {payload} --to 127.0.0.1 --port {port}").run() {
        // 没有发送端连上时接收端会一直等待
        let _ = receiver.kill();
        let _ = receiver.wait();
        return Err(e.into());
    }
    let received = receiver.wait()?;
    if !received.success() {
        bail!("receiver exited with {received}");
    }

    let copy = sh.read_binary_file(inbox.join("payload.bin"))?;
    if copy != data {
        bail!("received {} bytes that differ from the {} sent", copy.len(), data.len());
    }
    println!("✅ 内容一致");
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    build(sh)?;

    let version = env!("CARGO_PKG_VERSION");
    let host = cmd!(sh, "rustc -vV").read()?;
    let triple = host
        .lines()
        .find_map(|line| line.strip_prefix("host: "))
        .context("rustc -vV printed no host triple")?;
    let dist_name = format!("wifisender-{version}-{triple}");

    println!("📦 打包 {dist_name}...");
    let staging = Path::new("dist").join(&dist_name);
    sh.remove_path(&staging)?;
    sh.create_dir(&staging)?;
    for bin in BINARIES {
        sh.copy_file(format!("target/release/{bin}"), &staging)?;
    }

    let _dir = sh.push_dir("dist");
    cmd!(sh, "tar -czf {dist_name}.tar.gz {dist_name}").run()?;

    println!("✅ 打包完成: dist/{dist_name}.tar.gz");
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    sh.remove_path("dist")?;
    println!("✅ 清理完成");
    Ok(())
}
