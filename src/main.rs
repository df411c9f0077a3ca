use anyhow::{bail, Context};
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use seal::prelude::*;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), format!("{e:#}").red());
        process::exit(1);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if cli.verbose {
        config.log_level = "debug".to_string();
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(&cli)?;
    init_logging(&config.logging())?;

    // 确保 FFmpeg 可用
    if !cli.no_download {
        let download = tokio::task::spawn_blocking(ffmpeg_sidecar::download::auto_download).await?;
        if let Err(e) = download {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("could not download FFmpeg: {e}").red()
            );
            eprintln!("{}", "make sure ffmpeg and ffprobe are installed".yellow());
        }
    }

    let raw_options = cli.command.raw_options().or(&config.default_options);
    match cli.command {
        Commands::Apply {
            watermark,
            output,
            jobs,
            in_memory,
            files,
            ..
        } => {
            if let Some(jobs) = jobs {
                config.max_parallel_files = jobs;
            }
            let options = WatermarkOptions::from_raw(&raw_options);
            let watermark = tokio::fs::read(&watermark)
                .await
                .with_context(|| format!("failed to read watermark {}", watermark.display()))?;
            let sources = read_sources(&files).await?;
            let service = WatermarkService::new(config)?;

            let status = if in_memory {
                let archive = service.process_batch(watermark, sources, options).await?;
                write_archive(&output, &archive.bytes).await?;
                archive.status
            } else {
                apply_in_background(&service, watermark, sources, options, &output).await?
            };

            report(&status, &output);
        }

        Commands::Probe { input } => {
            let toolchain = FfmpegToolchain::new(config.ffmpeg_path.clone(), config.ffprobe_path.clone());
            if !toolchain.is_available() {
                bail!(
                    "ffmpeg/ffprobe not runnable ({}, {})",
                    toolchain.ffmpeg_path().display(),
                    toolchain.ffprobe_path().display()
                );
            }
            let video = VideoWatermarker::new(Arc::new(toolchain), config.scratch_dir());
            let dimensions = tokio::task::spawn_blocking(move || video.probe_dimensions(&input)).await??;
            println!(
                "{} {}",
                "video stream:".blue().bold(),
                format!("{}x{}", dimensions.width, dimensions.height).cyan()
            );
        }
    }

    Ok(())
}

async fn read_sources(paths: &[PathBuf]) -> anyhow::Result<Vec<SourceFile>> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        sources.push(SourceFile::new(name, content));
    }
    Ok(sources)
}

async fn write_archive(output: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    MediaUtils::ensure_output_dir(output)?;
    tokio::fs::write(output, bytes)
        .await
        .with_context(|| format!("failed to write {}", output.display()))
}

/// Start a disk-backed batch, follow its status, then move the archive to `output`.
async fn apply_in_background(
    service: &WatermarkService,
    watermark: Vec<u8>,
    sources: Vec<SourceFile>,
    options: WatermarkOptions,
    output: &Path,
) -> anyhow::Result<BatchStatus> {
    let total = sources.len() as u64;
    let batch_id = service.start_batch(watermark, sources, options).await?;

    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    progress.set_message(format!("batch {batch_id}"));

    let status = loop {
        let status = match service.get_status(&batch_id) {
            StatusLookup::Found(status) => status,
            StatusLookup::Missing { error } => bail!("batch {batch_id} disappeared: {error}"),
        };
        progress.set_position(status.processed as u64);

        if let Some(failure) = &status.failure {
            progress.abandon_with_message("batch failed".red().to_string());
            service.cleanup(&batch_id).await;
            bail!("{failure}");
        }
        if status.completed {
            progress.finish_with_message("done".green().to_string());
            break status;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    let bytes = service.fetch_archive(&batch_id).await?;
    write_archive(output, &bytes).await?;
    service.cleanup(&batch_id).await;
    Ok(status)
}

fn report(status: &BatchStatus, output: &Path) {
    println!(
        "{} {}",
        "archive:".green().bold(),
        format!("{} ({} of {} files)", output.display(), status.succeeded(), status.total).green()
    );
    for failure in &status.errors {
        println!(
            "{} {} {}",
            "skipped:".yellow().bold(),
            failure.file.cyan(),
            failure.error.red()
        );
    }
}
