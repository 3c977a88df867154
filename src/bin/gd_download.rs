//! gd-download - download a Google Drive file, or the files of a folder

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drive_client::config::load_config;
use drive_client::utils::safe_file_name;
use drive_client::{mimetypes, DriveClient, File};

/// gd-download - 从 Google Drive 下载文件
#[derive(Parser, Debug)]
#[command(name = "gd-download")]
#[command(version, long_version = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_TIME"), ")"))]
#[command(about = "Download a Google Drive file, or every file directly inside a folder")]
struct Cli {
    /// File or folder id
    #[arg(long, value_name = "ID")]
    input: String,

    /// Local directory to write into
    #[arg(long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Configuration file (default: drive.json, or $DRIVE_CONFIG)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
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

    tokio::fs::create_dir_all(&cli.output)
        .await
        .with_context(|| format!("无法创建目录: {}", cli.output.display()))?;

    let target = client.get_file(&cli.input).await?;
    let files = if target.is_directory() == Some(true) {
        client.list_children(&target.id).await?
    } else {
        vec![target]
    };

    for file in &files {
        download_one(&client, file, &cli.output).await?;
    }
    Ok(())
}

async fn download_one(client: &DriveClient, file: &File, dir: &Path) -> anyhow::Result<()> {
    if file.is_directory() == Some(true) {
        tracing::warn!("跳过文件夹: {} ({})", file.name, file.id);
        return Ok(());
    }
    if file.mime_type.as_deref() == Some(mimetypes::GOOGLE_DRIVE_SHORTCUT) {
        tracing::warn!("跳过快捷方式: {} ({})", file.name, file.id);
        return Ok(());
    }
    if file.is_google_document() {
        tracing::warn!("跳过 Google 文档: {} [{}]", file.name, file.human_type());
        return Ok(());
    }

    let Some(local_name) = safe_file_name(&file.name) else {
        tracing::warn!("跳过无效文件名: {:?} ({})", file.name, file.id);
        return Ok(());
    };
    let path = dir.join(local_name);
    let written = client
        .download_file(&file.id, &path, None)
        .await
        .with_context(|| format!("下载失败: {}", file.name))?;
    println!("{}\t{} bytes", path.display(), written);
    Ok(())
}
