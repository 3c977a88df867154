//! gd-upload - upload local files into a Google Drive folder
//!
//! 每个文件上传完成后输出 `<id>\t<name>`。

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drive_client::config::load_config;
use drive_client::{ConsoleProgress, DriveClient, UploadOptions};

/// gd-upload - 上传本地文件到 Google Drive 文件夹
#[derive(Parser, Debug)]
#[command(name = "gd-upload")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_TIME"), ")"))]
#[command(about = "Upload files into a Google Drive folder")]
struct Cli {
    /// Destination folder id (`root` for My Drive)
    #[arg(long, value_name = "FOLDER_ID")]
    output: String,

    /// Files to upload
    #[arg(long = "file", value_name = "PATH", required = true, num_args = 1..)]
    files: Vec<PathBuf>,

    /// Configuration file (default: drive.json, or $DRIVE_CONFIG)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replace the content of same-named files instead of adding duplicates
    #[arg(long)]
    update: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drive_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("加载配置失败")?;
    let client = DriveClient::from_config(&config)?;

    for path in &cli.files {
        let label = path.display().to_string();
        let options = UploadOptions {
            update_existing: cli.update,
            ..Default::default()
        }
        .with_progress(Arc::new(ConsoleProgress::new(label)));

        let file = client
            .upload_file(&cli.output, path, None, &options)
            .await
            .with_context(|| format!("上传失败: {}", path.display()))?;
        println!();
        println!("{}\t{}", file.id, file.name);
    }

    Ok(())
}
