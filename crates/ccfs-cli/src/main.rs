//! ccfs: encrypted file relay client
//!
//! Usage:
//!   ccfs upload <path>
//!   ccfs download <object-key> [--output-dir DIR] [--yes] [--overwrite]
//!
//! The password is read from CCFS_PASSWORD if set, otherwise prompted for.

use anyhow::{Context, Result};
use ccfs_core::config::CcfsConfig;
use ccfs_core::{CcfsError, ObjectKey};
use ccfs_relay::{
    download_file, upload_file, DownloadOptions, DownloadState, RelayClient, StateFn, UploadState,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "ccfs",
    version,
    about = "ccfs encrypted file relay client",
    long_about = "ccfs: seal files locally, then move them through a broker \
                  that never sees names or content"
)]
struct Cli {
    /// Path to ccfs.toml configuration file
    #[arg(long, short = 'c', env = "CCFS_CONFIG", default_value = "/etc/ccfs/config.toml")]
    config: PathBuf,

    /// Broker base URL (overrides client.broker_url)
    #[arg(long, short = 'b', env = "CCFS_BROKER_URL")]
    broker_url: Option<String>,

    /// Log level for diagnostics on stderr
    #[arg(long, env = "CCFS_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file and its name, then upload it
    ///
    /// Prints the object key. Keep it: it is the only way to fetch the file.
    Upload {
        /// Local file
        path: PathBuf,
    },

    /// Download an object and decrypt it into a local file
    Download {
        /// Object key printed by `ccfs upload`
        key: String,
        /// Directory to save into
        #[arg(long, short = 'o', default_value = ".")]
        output_dir: PathBuf,
        /// Save without asking for confirmation
        #[arg(long, short = 'y')]
        yes: bool,
        /// Replace an existing file of the same name
        #[arg(long)]
        overwrite: bool,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            if is_user_failure(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = CcfsConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    if let Some(url) = cli.broker_url {
        config.client.broker_url = url;
    }
    let client = RelayClient::from_config(&config.client)?;

    match cli.command {
        Commands::Upload { path } => cmd_upload(&client, &path).await,
        Commands::Download {
            key,
            output_dir,
            yes,
            overwrite,
        } => cmd_download(&client, &key, output_dir, yes, overwrite).await,
    }
}

/// Exit status 2 marks failures the user can fix by retyping something.
fn is_user_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<CcfsError>().is_some_and(CcfsError::is_user_error)
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Password and prompts ──────────────────────────────────────────────────────

fn read_password() -> Result<SecretString> {
    let password = match std::env::var("CCFS_PASSWORD") {
        Ok(pw) => SecretString::from(pw),
        Err(_) => SecretString::from(
            rpassword::prompt_password("Password: ").context("reading password")?,
        ),
    };
    if password.expose_secret().is_empty() {
        anyhow::bail!("password must not be empty");
    }
    Ok(password)
}

fn ask_confirmation(file_name: &str) -> bool {
    eprint!("Save file as '{file_name}'? [y/N] ");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `ccfs upload` ─────────────────────────────────────────────────────────────

async fn cmd_upload(client: &RelayClient, path: &Path) -> Result<()> {
    let password = read_password()?;

    let pb = make_spinner("upload");
    pb.set_message(path.display().to_string());
    let pb_clone = pb.clone();
    let observer: StateFn<UploadState> = Box::new(move |state| {
        pb_clone.set_message(state.to_string());
    });

    let result = upload_file(client, path, &password, Some(&observer)).await;
    pb.finish_and_clear();
    let outcome = result.with_context(|| format!("uploading {}", path.display()))?;

    println!("File uploaded.");
    println!("  bytes:   {}", fmt_bytes(outcome.bytes));
    println!("  key:     {}", outcome.object_key);
    Ok(())
}

// ── `ccfs download` ───────────────────────────────────────────────────────────

async fn cmd_download(
    client: &RelayClient,
    key: &str,
    output_dir: PathBuf,
    yes: bool,
    overwrite: bool,
) -> Result<()> {
    let object_key = parse_object_key(key)?;
    let password = read_password()?;

    let pb = make_spinner("download");
    pb.set_message(object_key.to_string());

    // Prompting needs the spinner out of the way
    let confirm: Option<ccfs_relay::ConfirmFn> = if yes || !std::io::stdin().is_terminal() {
        None
    } else {
        let pb_prompt = pb.clone();
        Some(Box::new(move |name: &str| {
            pb_prompt.suspend(|| ask_confirmation(name))
        }))
    };
    let opts = DownloadOptions {
        output_dir,
        overwrite,
        confirm,
    };

    let pb_clone = pb.clone();
    let observer: StateFn<DownloadState> = Box::new(move |state| {
        pb_clone.set_message(state.to_string());
    });

    let result = download_file(client, &object_key, &password, &opts, Some(&observer)).await;
    pb.finish_and_clear();
    let outcome = result.with_context(|| format!("downloading {object_key}"))?;

    match outcome.saved_path {
        Some(path) => {
            println!("File saved as '{}'.", path.display());
            println!("  bytes:   {}", fmt_bytes(outcome.bytes));
        }
        None => println!("Not saved."),
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_object_key(raw: &str) -> Result<ObjectKey> {
    Ok(raw.trim().parse::<ObjectKey>()?)
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_flags() {
        let cli = Cli::try_parse_from([
            "ccfs",
            "--broker-url",
            "http://broker:5000",
            "download",
            "0f8fad5b-d9cb-469f-a165-70867728950e",
            "-o",
            "/tmp/out",
            "--yes",
        ])
        .unwrap();
        assert_eq!(cli.broker_url.as_deref(), Some("http://broker:5000"));
        match cli.command {
            Commands::Download {
                key,
                output_dir,
                yes,
                overwrite,
            } => {
                assert_eq!(key, "0f8fad5b-d9cb-469f-a165-70867728950e");
                assert_eq!(output_dir, PathBuf::from("/tmp/out"));
                assert!(yes);
                assert!(!overwrite);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_mistyped_key_is_user_failure() {
        let err = parse_object_key("0f8fad5b-not-a-key").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CcfsError>(),
            Some(CcfsError::InvalidObjectKey(_))
        ));
        assert!(is_user_failure(&err));

        let key = parse_object_key(" 0f8fad5b-d9cb-469f-a165-70867728950e\n").unwrap();
        assert_eq!(key.to_string(), "0f8fad5b-d9cb-469f-a165-70867728950e");

        assert!(!is_user_failure(&anyhow::anyhow!("connection refused")));
    }

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(0), "0 B");
        assert_eq!(fmt_bytes(1536), "1.5 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
