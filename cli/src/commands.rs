use std::io::{self, Write};
use std::path::{Path, PathBuf};

use editorlog_core::events::{AssetCategory, LogEvent};
use editorlog_core::live::LocalFileSource;
use editorlog_core::{
    EngineConfigExt, JsonCheckpointStore, JsonLinesSink, LiveSession, MemoryCheckpointStore, MemorySink,
    ParseSummary, parse_file,
};
use editorlog_types::EngineConfig;
use editorlog_types::formatting::{format_bytes, format_duration_ms, format_pct_ratio, format_thousands};

pub fn parse(path: &Path, jsonl: bool) -> Result<(), String> {
    let config = EngineConfig::load();

    if jsonl {
        let mut sink = JsonLinesSink::new(io::stdout().lock());
        parse_file(path, &mut sink, &config.parser).map_err(|e| e.to_string())?;
        if sink.failed() > 0 {
            return Err(format!("Failed to write {} event records", sink.failed()));
        }
        return Ok(());
    }

    let mut sink = MemorySink::new();
    let summary = parse_file(path, &mut sink, &config.parser).map_err(|e| e.to_string())?;
    print_summary(&sink, &summary).map_err(|e| e.to_string())
}

fn print_summary(sink: &MemorySink, summary: &ParseSummary) -> io::Result<()> {
    let mut out = io::stdout().lock();
    let meta = &sink.metadata;
    writeln!(out, "Unity {}", meta.unity_version.as_deref().unwrap_or("(unknown version)"))?;
    if let Some(project) = &meta.project_name {
        writeln!(out, "Project: {project}")?;
    }
    if let (Some(platform), Some(arch)) = (&meta.platform, &meta.architecture) {
        writeln!(out, "Platform: {platform} ({arch})")?;
    }
    writeln!(
        out,
        "{} lines, {} read, {} events{}",
        format_thousands(summary.lines_processed),
        format_bytes(summary.end_offset),
        format_thousands(summary.events_emitted),
        if summary.timestamps_enabled { "" } else { " (synthetic timeline)" }
    )?;

    let imports: Vec<_> = sink.asset_imports().collect();
    let import_ms: f64 = imports.iter().map(|i| i.duration_ms).sum();
    writeln!(out, "\nImports: {} in {}", imports.len(), format_duration_ms(import_ms))?;

    let mut by_category: Vec<(AssetCategory, usize, f64)> = Vec::new();
    for import in &imports {
        match by_category.iter_mut().find(|(c, _, _)| *c == import.category) {
            Some(entry) => {
                entry.1 += 1;
                entry.2 += import.duration_ms;
            }
            None => by_category.push((import.category, 1, import.duration_ms)),
        }
    }
    by_category.sort_by(|a, b| b.2.total_cmp(&a.2));
    for (category, count, ms) in &by_category {
        writeln!(
            out,
            "  {:<20} {:>6}  {:>10}  {:>6}",
            category.as_str(),
            count,
            format_duration_ms(*ms),
            format_pct_ratio(*ms, import_ms)
        )?;
    }

    let mut slowest = imports.clone();
    slowest.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
    if !slowest.is_empty() {
        writeln!(out, "\nSlowest imports:")?;
        for import in slowest.iter().take(10) {
            writeln!(out, "  {:>10}  {}", format_duration_ms(import.duration_ms), import.asset_path)?;
        }
    }

    let refreshes: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            LogEvent::PipelineRefresh(r) => Some(r),
            _ => None,
        })
        .collect();
    if !refreshes.is_empty() {
        let total: f64 = refreshes.iter().map(|r| r.total_ms).sum();
        writeln!(out, "\nPipeline refreshes: {} in {}", refreshes.len(), format_duration_ms(total))?;
    }

    let processes: Vec<_> = sink.processes().collect();
    if !processes.is_empty() {
        writeln!(out, "\nProcesses:")?;
        for process in processes {
            writeln!(out, "  {:>10}  {}", format_duration_ms(process.duration_ms), process.name)?;
        }
    }

    let barriers = sink.worker_barriers().count();
    if barriers > 0 {
        writeln!(out, "\nWorker barriers: {barriers}")?;
    }
    Ok(())
}

pub async fn live(path: Option<PathBuf>, checkpoint_dir: Option<PathBuf>, fresh: bool) -> Result<(), String> {
    let mut config = EngineConfig::load();
    if fresh {
        config.live.resume_from_checkpoint = false;
    }
    let path = path.or_else(|| config.live.log_path.as_ref().map(PathBuf::from));
    let sink = JsonLinesSink::new(io::stdout());
    let checkpoint_dir = checkpoint_dir.or_else(|| config.resolved_checkpoint_dir());

    match checkpoint_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Saving checkpoints");
            let live = LiveSession::new(LocalFileSource::new(), sink, JsonCheckpointStore::new(dir), &config);
            run_live(live, path).await
        }
        None => {
            tracing::warn!("No data directory, checkpoints are kept in memory only");
            let live = LiveSession::new(LocalFileSource::new(), sink, MemoryCheckpointStore::new(), &config);
            run_live(live, path).await
        }
    }
}

async fn run_live<W: Write + Send + 'static>(
    mut live: LiveSession<LocalFileSource, JsonLinesSink<W>>,
    path: Option<PathBuf>,
) -> Result<(), String> {
    let watched = live.start(path).await.map_err(|e| e.to_string())?;
    tracing::info!(path = %watched.display(), "Tailing, press ctrl-c to stop");

    // Catch up right away instead of waiting for the first tick.
    if let Err(e) = live.poll_once().await {
        tracing::warn!(error = %e, "Initial poll failed");
    }

    tokio::signal::ctrl_c().await.map_err(|e| e.to_string())?;
    live.stop().await.map_err(|e| e.to_string())?;
    tracing::info!("Stopped");
    Ok(())
}

pub fn show_config(init: bool) -> Result<(), String> {
    let path = EngineConfig::config_path().map_err(|e| e.to_string())?;
    let config = if init {
        let config = EngineConfig::default();
        config.save().map_err(|e| e.to_string())?;
        println!("Wrote default configuration to {}", path.display());
        config
    } else {
        EngineConfig::load()
    };

    println!("# {}", path.display());
    let text = toml::to_string_pretty(&config).map_err(|e| e.to_string())?;
    println!("{text}");
    match config.resolved_log_path() {
        Some(log) => println!("# log: {}", log.display()),
        None => println!("# log: (no default location on this platform)"),
    }
    Ok(())
}
