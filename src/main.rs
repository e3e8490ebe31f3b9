//! qqnt-keyfinder - command line entry point
//!
//! Launches (or attaches to) the QQNT client and prints the database keys
//! recovered from it.

use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;

use keyfinder::app::{CandidateKey, Confidence, ExtractionTarget, DEFAULT_IDLE_TIMEOUT_MS};

/// Recover the QQNT database key from a running client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Attach to this process instead of launching the client
    #[arg(short, long, conflicts_with = "exe")]
    pid: Option<u32>,

    /// Client executable to launch (defaults to the usual install locations)
    #[arg(short, long)]
    exe: Option<PathBuf>,

    /// Module that contains the key routine
    #[arg(long, default_value = keyfinder::app::DEFAULT_MODULE)]
    module: String,

    /// Section holding the key routine's code
    #[arg(long, default_value = keyfinder::app::DEFAULT_CODE_SECTION)]
    code_section: String,

    /// Section holding the marker string
    #[arg(long, default_value = keyfinder::app::DEFAULT_DATA_SECTION)]
    data_section: String,

    /// String referenced by the key routine
    #[arg(long, default_value = keyfinder::app::DEFAULT_MARKER)]
    marker: String,

    /// Key length in bytes
    #[arg(long, default_value_t = keyfinder::app::DEFAULT_KEY_LEN)]
    key_len: usize,

    /// Milliseconds to wait for a launched client to become idle
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT_MS)]
    idle_timeout: u32,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn target(&self) -> ExtractionTarget {
        ExtractionTarget {
            module: self.module.clone(),
            code_section: self.code_section.clone(),
            data_section: self.data_section.clone(),
            marker: self.marker.clone(),
            key_len: self.key_len,
            ..ExtractionTarget::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    // 1. Parse command line arguments
    let args = Args::parse();

    // 2. Initialize logger with verbosity level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        match args.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        },
    ))
    .init();

    log::debug!("{:?}", args);

    let keys = run(&args)?;
    report(&keys);
    Ok(())
}

#[cfg(all(target_os = "windows", target_arch = "x86_64"))]
fn run(args: &Args) -> anyhow::Result<Vec<CandidateKey>> {
    use anyhow::Context;
    use keyfinder::debug::{windows, DebugSession, PlatformBackend};

    let pid = match args.pid {
        Some(pid) => pid,
        None => {
            let exe = match &args.exe {
                Some(exe) => exe.clone(),
                None => keyfinder::app::find_installed_client()
                    .context("QQ.exe not found in the default install locations, use --exe")?,
            };
            windows::launch(&exe, args.idle_timeout)?
        }
    };

    println!("[*] Debugging process {}", pid);
    let mut session = DebugSession::new(pid, PlatformBackend::new());
    let keys = keyfinder::app::extract_keys(&mut session, &args.target())
        .with_context(|| format!("key extraction from process {} failed", pid))?;
    Ok(keys)
}

#[cfg(not(all(target_os = "windows", target_arch = "x86_64")))]
fn run(_args: &Args) -> anyhow::Result<Vec<CandidateKey>> {
    anyhow::bail!("the key finder needs the Win32 debug API (Windows x86_64)")
}

fn report(keys: &[CandidateKey]) {
    if keys.is_empty() {
        println!("{}", "[-] No key found".red());
        return;
    }

    println!("{}", "[+] Keys found:".green());
    for key in keys {
        match key.confidence {
            Confidence::High => println!("    {}", key.value.bold()),
            Confidence::Low => println!("    {}", key.value.dimmed()),
        }
    }

    if keys.len() > 1 {
        if let Some(best) = keys.iter().find(|key| key.confidence == Confidence::High) {
            println!();
            println!("[+] Best key: {}", best.value.bold().green());
        }
    }
}
