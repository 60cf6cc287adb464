mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

use fc_av::{Ffmpeg, MediaTool, ToolRegistry};
use fc_core::config::Config;
use fc_core::{FixedSeconds, Frame, FrameId, JobId, JobStatus};
use fc_db::pool::get_conn;
use fc_db::queries::{frames, jobs};
use fc_pipeline::{BackendDispatcher, DispatcherSettings, HostProbe, JobOutcome};
use fc_store::{BlobStore, LocalBlobStore};
use framecatcher::context::{load_config, open_db, AppContext};

fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "framecatcher=debug,fc_pipeline=debug,fc_av=debug,fc_db=debug,fc_core=debug".to_string()
        } else {
            "framecatcher=info,fc_pipeline=info,fc_av=warn,fc_db=warn,fc_core=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Extract { video, name } => {
            let config = load_config(config_path);
            runtime()?.block_on(extract(config, &video, name))
        }
        Commands::Retry { job } => {
            let config = load_config(config_path);
            runtime()?.block_on(retry(config, job))
        }
        Commands::Probe { file, json } => {
            let config = load_config(config_path);
            runtime()?.block_on(probe_file(&config, &file, json))
        }
        Commands::Jobs {
            status,
            name,
            offset,
            limit,
        } => list_jobs(&load_config(config_path), status, name.as_deref(), offset, limit),
        Commands::Frames {
            job,
            favorites,
            top,
            from,
            to,
            offset,
            limit,
        } => {
            let selection = match (top, from, to) {
                (Some(n), _, _) => FrameSelection::Top(n),
                (None, None, None) => FrameSelection::Page {
                    favorites,
                    offset,
                    limit,
                },
                (None, from, to) => FrameSelection::Range {
                    start: from.map(FixedSeconds::from_secs_f64).unwrap_or(FixedSeconds::ZERO),
                    end: to
                        .map(FixedSeconds::from_secs_f64)
                        .unwrap_or(FixedSeconds::from_millis(i64::MAX)),
                },
            };
            list_frames(&load_config(config_path), job, selection)
        }
        Commands::Favorite { frames, unset } => {
            set_favorites(&load_config(config_path), &frames, !unset)
        }
        Commands::Export {
            frame,
            output,
            thumbnail,
        } => export_frame(&load_config(config_path), frame, &output, thumbnail),
        Commands::Delete { job } => delete_job(&load_config(config_path), job),
        Commands::CheckTools => check_tools(&load_config(config_path)),
        Commands::Backend => {
            let config = load_config(config_path);
            runtime()?.block_on(detect_backend(config))
        }
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("framecatcher {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start tokio runtime")
}

async fn extract(config: Config, video: &Path, name: Option<String>) -> Result<()> {
    let ctx = AppContext::from_config(config)?;
    let backend = ctx.dispatcher.initialize().await;
    println!("Encoding backend: {backend}");

    let job = ctx.register_video(video, name)?;
    println!("Job {} created for {}", job.id, job.original_filename);

    let result = drive(&ctx, job.id, false).await;
    ctx.dispatcher.cleanup().await;
    print_outcome(&result?);
    Ok(())
}

async fn retry(config: Config, job: JobId) -> Result<()> {
    let ctx = AppContext::from_config(config)?;
    ctx.dispatcher.initialize().await;

    let result = drive(&ctx, job, true).await;
    ctx.dispatcher.cleanup().await;
    print_outcome(&result?);
    Ok(())
}

/// Run or retry `job` in the background, printing progress until it ends.
/// Ctrl-C requests cancellation; frames already started still finish.
async fn drive(ctx: &AppContext, job: JobId, retry: bool) -> Result<JobOutcome> {
    let mut handle = if retry {
        ctx.orchestrator.start_retry(job)?
    } else {
        ctx.orchestrator.start_job(job)?
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let outcome = loop {
        tokio::select! {
            joined = &mut handle => break joined.context("Job task panicked")?,
            _ = tokio::signal::ctrl_c() => {
                if ctx.orchestrator.request_cancellation(job) {
                    eprintln!("\nCancelling job {job}; waiting for frames in progress...");
                }
            }
            _ = ticker.tick() => {
                eprint!("\rProgress: {:>5.1}%", ctx.orchestrator.progress(job) * 100.0);
            }
        }
    };
    eprintln!();

    let outcome = outcome.with_context(|| format!("Job {job} failed"))?;
    ctx.orchestrator.clear_progress(job);
    Ok(outcome)
}

fn print_outcome(outcome: &JobOutcome) {
    let job = &outcome.job;
    println!("Job {}: {}", job.id, job.status);
    if let Some(duration) = job.duration {
        println!("  Duration: {duration}s");
    }
    if let (Some(w), Some(h)) = (job.width, job.height) {
        println!("  Resolution: {w}x{h}");
    }
    println!(
        "  Frames: {} saved / {} expected",
        outcome.frames_saved, outcome.frames_expected
    );
    if outcome.frames_skipped > 0 {
        println!("  Skipped after cancellation: {}", outcome.frames_skipped);
    }
    if outcome.frames_dropped > 0 {
        println!("  Dropped on error: {}", outcome.frames_dropped);
    }
}

async fn probe_file(config: &Config, file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let registry = ToolRegistry::discover(&config.tools);
    let ffmpeg = Ffmpeg::from_registry(&registry)?;
    let meta = ffmpeg.extract_metadata(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Size: {} bytes", meta.file_size);
    match meta.duration {
        Some(d) => println!("Duration: {d}s"),
        None => println!("Duration: unknown"),
    }
    if let (Some(w), Some(h)) = (meta.width, meta.height) {
        println!("Resolution: {w}x{h}");
    }
    if let Some(fps) = meta.frame_rate {
        println!("Frame rate: {fps} fps");
    }
    if let Some(ref codec) = meta.codec {
        println!("Codec: {codec}");
    }
    let rate = config.extraction.frames_per_second;
    if let Some(d) = meta.duration {
        println!(
            "Frames at {rate} fps: {}",
            d.expected_samples(rate)
        );
    }
    Ok(())
}

fn list_jobs(
    config: &Config,
    status: Option<JobStatus>,
    name: Option<&str>,
    offset: i64,
    limit: i64,
) -> Result<()> {
    let pool = open_db(config)?;
    let conn = get_conn(&pool)?;

    let rows = jobs::list_jobs(&conn, status, name, offset, limit)?;
    if rows.is_empty() {
        println!("No jobs.");
        return Ok(());
    }

    println!("{:>6}  {:<10}  {:>7}  {:<25}  NAME", "ID", "STATUS", "FRAMES", "CREATED");
    for job in &rows {
        let count = frames::count_frames_by_job(&conn, job.id)?;
        println!(
            "{:>6}  {:<10}  {:>7}  {:<25}  {}",
            job.id.to_string(),
            job.status.as_str(),
            count,
            job.created_at,
            job.name
        );
    }

    let counts = jobs::count_jobs_by_status(&conn)?;
    println!(
        "\n{} total: {} processing, {} completed, {} failed, {} cancelled",
        counts.total(),
        counts.processing,
        counts.completed,
        counts.failed,
        counts.cancelled
    );
    Ok(())
}

/// Which of a job's frames `frames` prints.
enum FrameSelection {
    Page {
        favorites: bool,
        offset: i64,
        limit: i64,
    },
    Top(i64),
    Range {
        start: FixedSeconds,
        end: FixedSeconds,
    },
}

fn list_frames(config: &Config, job: JobId, selection: FrameSelection) -> Result<()> {
    let pool = open_db(config)?;
    let conn = get_conn(&pool)?;

    let Some(found) = jobs::get_job(&conn, job)? else {
        anyhow::bail!("Job {job} not found");
    };
    println!("Job {}: {} ({})", found.id, found.name, found.status);

    let rows = match selection {
        FrameSelection::Page {
            favorites,
            offset,
            limit,
        } => frames::list_frames(&conn, job, favorites, offset, limit)?,
        FrameSelection::Top(n) => frames::top_quality_frames(&conn, job, n)?,
        FrameSelection::Range { start, end } => frames::list_frames_in_range(&conn, job, start, end)?,
    };
    for frame in &rows {
        print_frame(frame);
    }

    let stats = frames::frame_stats(&conn, job)?;
    println!(
        "\n{} frames, {} bytes, {} favorites, average quality {}",
        stats.count,
        stats.total_bytes,
        stats.favorites,
        stats
            .avg_quality
            .map(|q| format!("{q:.3}"))
            .unwrap_or_else(|| "-".into())
    );
    Ok(())
}

fn print_frame(frame: &Frame) {
    println!(
        "{:>6}  #{:<6} {:>9}s  {}x{}  {:<12}  q={:.3}{}  {}",
        frame.id.to_string(),
        frame.frame_number,
        frame.timestamp.to_string(),
        frame.width,
        frame.height,
        frame.format,
        frame.quality_score,
        if frame.is_favorite { " *" } else { "" },
        frame.file_path
    );
}

fn set_favorites(config: &Config, ids: &[FrameId], favorite: bool) -> Result<()> {
    let pool = open_db(config)?;
    let conn = get_conn(&pool)?;

    let mut missing = Vec::new();
    for id in ids {
        if frames::get_frame(&conn, *id)?.is_none() {
            missing.push(id.to_string());
        }
    }
    if !missing.is_empty() {
        anyhow::bail!("Frame {} not found", missing.join(", "));
    }

    let updated = frames::set_favorites(&conn, ids, favorite)?;
    println!(
        "{updated} frame(s) {}",
        if favorite { "marked as favorite" } else { "unmarked" }
    );
    Ok(())
}

fn export_frame(config: &Config, id: FrameId, output: &Path, thumbnail: bool) -> Result<()> {
    let pool = open_db(config)?;
    let conn = get_conn(&pool)?;

    let Some(frame) = frames::get_frame(&conn, id)? else {
        anyhow::bail!("Frame {id} not found");
    };
    let source = if thumbnail {
        frame
            .thumbnail_path
            .with_context(|| format!("Frame {id} has no thumbnail"))?
    } else {
        frame.file_path
    };

    let blobs = LocalBlobStore::new(config.storage.base_path.clone());
    let data = blobs.load(&source)?;
    std::fs::write(output, &data)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Exported frame {id} ({} bytes) to {}", data.len(), output.display());
    Ok(())
}

fn delete_job(config: &Config, job: JobId) -> Result<()> {
    let pool = open_db(config)?;
    let conn = get_conn(&pool)?;

    let Some(found) = jobs::get_job(&conn, job)? else {
        anyhow::bail!("Job {job} not found");
    };
    if !found.status.is_terminal() {
        tracing::warn!(job_id = %job, "Deleting a job still marked processing");
    }

    let blobs = LocalBlobStore::new(config.storage.base_path.clone());
    blobs.delete_job(job)?;
    jobs::delete_job(&conn, job)?;
    println!("Deleted job {job} ({})", found.name);
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let registry = ToolRegistry::discover(&config.tools);
    let mut all_required = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else if tool.required {
            all_required = false;
            "✗"
        } else {
            "-"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_required {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg and ffprobe are required to extract frames.");
    }

    Ok(())
}

async fn detect_backend(config: Config) -> Result<()> {
    let registry = ToolRegistry::discover(&config.tools);
    let probe = Arc::new(HostProbe::from_registry(&registry));
    let media: Arc<dyn MediaTool> = Arc::new(Ffmpeg::from_registry(&registry)?);
    let blobs = Arc::new(LocalBlobStore::new(config.storage.base_path.clone()));
    let dispatcher =
        BackendDispatcher::new(DispatcherSettings::from_config(&config), probe, media, blobs);

    let backend = dispatcher.initialize().await;
    println!("Backend: {backend}");
    println!("Accelerated: {}", dispatcher.is_accelerated());
    if dispatcher.is_accelerated() {
        println!("Utilization: {:.0}%", dispatcher.backend_usage().await * 100.0);
    }
    dispatcher.cleanup().await;
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Frames per second: {}", config.extraction.frames_per_second);
    println!("  Parallel frames: {}", config.extraction.max_parallel_frames);
    println!(
        "  Encode: {} at quality {}",
        config.encode.target_format, config.encode.quality
    );
    println!(
        "  Thumbnails: {}x{} at quality {}",
        config.thumbnail.width, config.thumbnail.height, config.thumbnail.quality
    );
    println!(
        "  Backends: {} (intel {}, nvidia {}, amd {})",
        if config.backends.enabled { "enabled" } else { "disabled" },
        config.backends.intel,
        config.backends.nvidia,
        config.backends.amd
    );
    println!("  Storage: {}", config.storage.base_path.display());
    println!("  Database: {}", config.storage.db_path.display());

    let warnings = config.validate();
    for w in &warnings {
        println!("  warning: {w}");
    }
    Ok(())
}
