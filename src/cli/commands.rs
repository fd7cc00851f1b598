//! CLI command handlers

use anyhow::{anyhow, Context, Result};
use clap_complete::generate;
use colored::Colorize;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::conflict::{ConflictResolver, PlaylistConflict, ResolutionStrategy};
use crate::device::{DevicePair, Side};
use crate::sync::{
    run_scheduler, ConflictOutcome, FileOutcome, Schedule, SyncEngine, SyncReport, SyncState,
};

/// Handle the `init` command
pub async fn init(
    profile: Option<&str>,
    folder_a: Option<PathBuf>,
    folder_b: Option<PathBuf>,
    label_a: Option<String>,
    label_b: Option<String>,
    data_dir: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let existing = AppConfig::load(profile)?;

    if existing.is_some() && !force {
        let overwrite = Confirm::new()
            .with_prompt("A configuration already exists. Overwrite it?")
            .default(false)
            .interact()?;
        if !overwrite {
            println!("{}", "Keeping the existing configuration.".yellow());
            return Ok(());
        }
    }

    let mut config = existing.unwrap_or_default();

    if let Some(label) = label_a {
        config.device_a.label = label;
    }
    if let Some(label) = label_b {
        config.device_b.label = label;
    }

    config.device_a.folder = match folder_a {
        Some(folder) => folder,
        None => prompt_folder(&config.device_a.label)?,
    };
    config.device_b.folder = match folder_b {
        Some(folder) => folder,
        None => prompt_folder(&config.device_b.label)?,
    };

    if data_dir.is_some() {
        config.data_dir = data_dir;
    }

    config.validate()?;
    config.require_folders()?;

    let layout = config.data_layout()?;
    layout.ensure().await?;
    let path = config.save(profile)?;

    println!();
    println!("{}", "Configuration saved!".green().bold());
    println!("  Config: {}", path.display());
    println!(
        "  {}: {}",
        config.device_a.label,
        config.device_a.folder.display()
    );
    println!(
        "  {}: {}",
        config.device_b.label,
        config.device_b.folder.display()
    );
    println!("  Staging: {}", layout.staging.display());
    println!();
    println!("Run {} to sync now.", "m3u-bridge sync".cyan());

    Ok(())
}

/// Handle the `sync` command
pub async fn sync(profile: Option<&str>, dry_run: bool) -> Result<()> {
    let config = load_config(profile)?;
    let engine = build_engine(&config, dry_run)?;

    if dry_run {
        println!("{}", "[DRY RUN] No files will be written".yellow());
    }

    let progress = spinner("Syncing playlists...");
    let result = engine.run_full_pass(&config.sync).await;
    progress.finish_and_clear();

    let report = result.context("Sync pass failed. Run 'm3u-bridge init' to recreate the data folders")?;
    print_report(engine.devices(), &report);

    Ok(())
}

/// Handle the `event` command
pub async fn event(profile: Option<&str>, path: &Path, side: Side, dry_run: bool) -> Result<()> {
    let config = load_config(profile)?;
    let engine = build_engine(&config, dry_run)?;

    let report = engine
        .handle_file_event(path, side, &config.sync)
        .await
        .with_context(|| format!("Failed to handle change to {:?}", path))?;

    println!(
        "{} {}: {}",
        engine.devices().get(side).label().bold(),
        report.name,
        describe_outcome(engine.devices(), &report.outcome)
    );

    Ok(())
}

/// Handle the `daemon` command
pub async fn daemon(profile: Option<&str>, interval: Option<String>, dry_run: bool) -> Result<()> {
    let config = load_config(profile)?;
    let interval = interval.unwrap_or_else(|| config.schedule_interval.clone());
    let schedule = Schedule::parse(&interval)?;

    if schedule == Schedule::Never {
        println!("{}", "Scheduled sync is disabled (interval: never).".yellow());
        return Ok(());
    }

    let engine = Arc::new(build_engine(&config, dry_run)?);

    println!("Scheduled sync started ({}). Press Ctrl+C to stop.", schedule.to_string().cyan());

    tokio::select! {
        _ = run_scheduler(engine, config.sync.clone(), schedule) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            println!();
            println!("{}", "Scheduled sync stopped.".yellow());
        }
    }

    Ok(())
}

/// Handle the `conflicts` command
pub async fn conflicts(profile: Option<&str>) -> Result<()> {
    let config = load_config(profile)?;
    let engine = build_engine(&config, false)?;

    let progress = spinner("Looking for conflicts...");
    let conflicts = engine.detect_conflicts().await;
    progress.finish_and_clear();

    if conflicts.is_empty() {
        println!("{}", "No conflicts found.".green());
        return Ok(());
    }

    println!(
        "{}",
        format!("{} conflicting playlist(s):", conflicts.len())
            .yellow()
            .bold()
    );
    for conflict in &conflicts {
        println!();
        print_conflict(engine.devices(), conflict);
        let strategy = engine
            .resolver()
            .strategy_for(&conflict.playlist_name, config.sync.conflict_resolution);
        if strategy.is_automatic() {
            println!("  Strategy: {}", strategy.to_string().cyan());
        } else {
            println!("  Strategy: {} (left untouched by sync)", strategy.to_string().yellow());
        }
    }

    println!();
    println!("Run {} to resolve them.", "m3u-bridge resolve".cyan());

    Ok(())
}

/// Handle the `resolve` command
pub async fn resolve(profile: Option<&str>, strategy: Option<ResolutionStrategy>) -> Result<()> {
    let config = load_config(profile)?;
    let engine = build_engine(&config, false)?;

    let conflicts = engine.detect_conflicts().await;
    if conflicts.is_empty() {
        println!("{}", "No conflicts to resolve.".green());
        return Ok(());
    }

    for conflict in &conflicts {
        println!();
        print_conflict(engine.devices(), conflict);

        let chosen = match strategy {
            Some(strategy) => strategy,
            None => pick_strategy(&engine, conflict, config.sync.conflict_resolution)?,
        };

        let outcome = engine.resolve_manually(conflict, chosen, &config.sync).await;
        println!(
            "  {}",
            describe_conflict_outcome(&conflict.playlist_name, &outcome)
        );
    }

    Ok(())
}

/// Handle the `duplicates` command
pub async fn duplicates(profile: Option<&str>, remove: bool, dry_run: bool) -> Result<()> {
    let config = load_config(profile)?;
    let engine = build_engine(&config, dry_run)?;

    let progress = spinner("Scanning for duplicates...");
    let reports = engine.scan_duplicates().await;
    progress.finish_and_clear();

    if reports.is_empty() {
        println!("{}", "No duplicates found.".green());
        return Ok(());
    }

    for report in &reports {
        println!(
            "{} {}: {} duplicate entries",
            engine.devices().get(report.side).label().bold(),
            report.name.yellow(),
            report.extra_entries()
        );
        for (track, lines) in &report.duplicates {
            let lines: Vec<String> = lines.iter().map(|i| (i + 1).to_string()).collect();
            println!("    {} (entries {})", track, lines.join(", "));
        }
    }

    println!();
    if remove {
        let removed = engine.remove_duplicates(&config.sync).await;
        if dry_run {
            println!("{} {} duplicate entries", "[DRY RUN] Would remove".yellow(), removed);
        } else {
            println!("{} {} duplicate entries", "Removed".green().bold(), removed);
        }
    } else {
        println!("Run with {} to clean them up.", "--remove".cyan());
    }

    Ok(())
}

/// Handle the `analyze` command
pub async fn analyze(profile: Option<&str>, playlist: &str) -> Result<()> {
    let config = load_config(profile)?;
    let engine = build_engine(&config, false)?;
    let name = playlist_file_name(playlist);

    let (side, stats) = engine
        .analyze_playlist(&name)
        .await
        .ok_or_else(|| anyhow!("Playlist '{}' not found on either device", name))?;

    println!(
        "{} ({})",
        name.green().bold(),
        engine.devices().get(side).label()
    );
    println!("  Lines:            {}", stats.total_lines);
    println!("  Tracks:           {}", stats.content_entries);
    println!("  Comments:         {}", stats.comment_lines);
    println!("  Unique tracks:    {}", stats.unique_entries);
    println!(
        "  Duplicates:       {} entries in {} groups",
        stats.duplicate_entries, stats.duplicate_groups
    );
    for (track, lines) in &stats.duplicates {
        println!("    - {} x{}", track, lines.len());
    }

    Ok(())
}

/// Handle the `rule` command
pub fn rule(
    profile: Option<&str>,
    playlist: &str,
    strategy: Option<ResolutionStrategy>,
    clear: bool,
) -> Result<()> {
    let mut config = AppConfig::load(profile)?
        .ok_or_else(|| anyhow!("No configuration found. Run 'm3u-bridge init' first."))?;
    let name = playlist_file_name(playlist);

    if clear {
        if config.conflict_rules.remove(&name).is_some() {
            config.save(profile)?;
            println!("Removed rule for {}", name.cyan());
        } else {
            println!("No rule set for {}", name.cyan());
        }
        return Ok(());
    }

    match strategy {
        Some(strategy) => {
            config.conflict_rules.insert(name.clone(), strategy);
            config.save(profile)?;
            println!(
                "{} {} -> {}",
                "Rule saved:".green(),
                name,
                strategy.describe(&config.device_a.label, &config.device_b.label)
            );
        }
        None => match config.conflict_rules.get(&name) {
            Some(strategy) => println!("{}: {}", name, strategy.to_string().cyan()),
            None => println!(
                "{}: no rule (default {})",
                name,
                config.sync.conflict_resolution.to_string().cyan()
            ),
        },
    }

    Ok(())
}

/// Handle the `completion` command
pub fn completion(shell: clap_complete::Shell) {
    let mut cmd = <super::Cli as clap::CommandFactory>::command();
    generate(shell, &mut cmd, "m3u-bridge", &mut io::stdout());
}

fn load_config(profile: Option<&str>) -> Result<AppConfig> {
    let config = AppConfig::load(profile)?
        .ok_or_else(|| anyhow!("No configuration found. Run 'm3u-bridge init' first."))?;
    config.validate()?;
    Ok(config)
}

fn build_engine(config: &AppConfig, dry_run: bool) -> Result<SyncEngine> {
    let resolver = ConflictResolver::new(config.sync.conflict_resolution)
        .with_rules(config.conflict_rules.clone());

    Ok(SyncEngine::new(
        config.devices(),
        config.data_layout()?,
        resolver,
        Arc::new(SyncState::new()),
    )
    .with_dry_run(dry_run))
}

fn prompt_folder(label: &str) -> Result<PathBuf> {
    let folder: String = Input::new()
        .with_prompt(format!("{} playlist folder", label))
        .interact_text()
        .with_context(|| format!("Failed to read folder for {}", label))?;
    Ok(PathBuf::from(folder.trim()))
}

fn pick_strategy(
    engine: &SyncEngine,
    conflict: &PlaylistConflict,
    fallback: ResolutionStrategy,
) -> Result<ResolutionStrategy> {
    let devices = engine.devices();
    let (label_a, label_b) = (devices.get(Side::A).label(), devices.get(Side::B).label());

    let items: Vec<String> = ResolutionStrategy::ALL
        .iter()
        .map(|s| s.describe(label_a, label_b))
        .collect();
    let suggested = engine
        .resolver()
        .strategy_for(&conflict.playlist_name, fallback);
    let default = ResolutionStrategy::ALL
        .iter()
        .position(|s| *s == suggested)
        .unwrap_or(0);

    let choice = Select::new()
        .with_prompt(format!("How should {} be resolved?", conflict.playlist_name))
        .items(&items)
        .default(default)
        .interact()?;

    Ok(ResolutionStrategy::ALL[choice])
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn playlist_file_name(playlist: &str) -> String {
    if playlist.to_lowercase().ends_with(".m3u") {
        playlist.to_string()
    } else {
        format!("{}.m3u", playlist)
    }
}

fn print_conflict(devices: &DevicePair, conflict: &PlaylistConflict) {
    let summary = conflict.summary(devices.get(Side::A).label(), devices.get(Side::B).label());
    let mut lines = summary.lines();
    if let Some(first) = lines.next() {
        println!("{}", first.yellow().bold());
    }
    for line in lines {
        println!("  {}", line);
    }
}

fn print_report(devices: &DevicePair, report: &SyncReport) {
    println!("{}", "Sync complete!".green().bold());

    let unchanged = report
        .files
        .iter()
        .filter(|f| f.outcome == FileOutcome::NoChange)
        .count();
    println!("  Playlists synced:   {}", report.synced());
    println!("  Unchanged:          {}", unchanged);
    println!("  Files written:      {}", report.files_written());

    for file in &report.files {
        match &file.outcome {
            FileOutcome::Synced { destination, .. } => println!(
                "    {} {} -> {}",
                file.name.green(),
                devices.get(file.side).label(),
                devices.get(*destination).label()
            ),
            FileOutcome::Failed(reason) => {
                println!("    {} {}", file.name.red(), reason.red())
            }
            _ => {}
        }
    }

    if report.conflicts.is_empty() {
        return;
    }

    println!();
    println!("  Conflicts:          {}", report.conflicts.len());
    for conflict in &report.conflicts {
        println!(
            "    {}",
            describe_conflict_outcome(&conflict.conflict.playlist_name, &conflict.outcome)
        );
    }

    if report.standing_conflicts().next().is_some() {
        println!();
        println!("Run {} to resolve open conflicts.", "m3u-bridge resolve".cyan());
    }
}

fn describe_outcome(devices: &DevicePair, outcome: &FileOutcome) -> String {
    match outcome {
        FileOutcome::Ignored => "not a playlist".dimmed().to_string(),
        FileOutcome::NoChange => "no change".dimmed().to_string(),
        FileOutcome::Debounced => "processed moments ago, skipped".dimmed().to_string(),
        FileOutcome::EchoSuppressed => "our own write, skipped".dimmed().to_string(),
        FileOutcome::SkippedConflict => "handled as a conflict".dimmed().to_string(),
        FileOutcome::Conflict(outcome) => format!("conflict, {}", conflict_state(outcome)),
        FileOutcome::Synced { destination, .. } => format!(
            "{} to {}",
            "synced".green(),
            devices.get(*destination).label()
        ),
        FileOutcome::Failed(reason) => format!("{} {}", "failed:".red(), reason),
    }
}

fn describe_conflict_outcome(name: &str, outcome: &ConflictOutcome) -> String {
    format!("{}: {}", name, conflict_state(outcome))
}

fn conflict_state(outcome: &ConflictOutcome) -> String {
    match outcome {
        ConflictOutcome::Resolved { strategy, .. } => {
            format!("{} ({})", "resolved".green(), strategy)
        }
        ConflictOutcome::Skipped => "skipped, both files left as they are".yellow().to_string(),
        ConflictOutcome::AwaitingManual => "waiting for manual resolution".yellow().to_string(),
        ConflictOutcome::Failed(reason) => format!("{} {}", "failed:".red(), reason),
    }
}
