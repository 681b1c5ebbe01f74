//! archgov: architecture resolution and constraint validation.
//!
//! Source files declare the architecture they belong to with an `@arch <id>`
//! tag. The project registry (`.arch/registry.toml`, `.arch/registry/*.toml`)
//! defines architectures as layered nodes: each may inherit from a parent and
//! pull in mixins, and contributes constraints such as `forbid_import`,
//! `max_file_lines` or `require_test_file`. Validation flattens the chain for
//! each file and runs every constraint against the file's semantic model.
//!
//! # Pipeline
//!
//! 1. [`core::tags`] extracts `@arch`, `@intent` and `@override` tags.
//! 2. [`core::resolver`] flattens the architecture (inheritance, mixins,
//!    merge policy, cycle detection).
//! 3. [`validators`] run each constraint against the [`core::semantic`]
//!    model and the project-wide [`core::project::ProjectIndex`].
//! 4. [`core::overrides`] applies inline overrides under the expiry policy.
//! 5. [`core::engine`] batches files in parallel and reads and writes the
//!    two cache tiers ([`core::session_cache`], [`core::validation_cache`]).
//!
//! # Examples
//!
//! ```bash
//! # Show the flattened constraints of an architecture
//! archgov resolve service
//!
//! # Validate the project
//! archgov check
//!
//! # Validate two files, failing on warnings
//! archgov check src/api.ts src/db.ts --fail-on-warning
//!
//! # Override health
//! archgov audit
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: data model, registry, resolver, engine and caches
//! - [`validators`]: the validator registry and one module per rule family

pub mod core;
pub mod validators;

mod cli;

use crate::cli::{CacheCli, CacheCommand, CheckCli, Cli, Command, FormatCli, ResolveCli, WatchCli};
use crate::core::audit::audit_overrides;
use crate::core::engine::{RunReport, ValidationEngine};
use crate::core::error::ArchError;
use crate::core::output;
use crate::core::project::is_included;
use crate::core::violation::FileStatus;
use crate::core::watch::{WatchScheduler, WatchTarget, classify_change};
use clap::Parser;
use colored::Colorize;
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::warn;

/// Scheduler key for registry and config edits, which re-open the engine.
const RELOAD_KEY: &str = ".arch";

pub fn run() -> Result<(), ArchError> {
    let cli = Cli::parse();
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let root = root.canonicalize()?;

    match cli.command {
        Command::Resolve(args) => run_resolve(&root, args),
        Command::Check(args) => run_check(&root, args),
        Command::Watch(args) => run_watch(&root, args),
        Command::Audit(args) => run_audit(&root, args),
        Command::Cache(CacheCli { command }) => run_cache(&root, command),
    }
}

fn wants_json(format: &str) -> Result<bool, ArchError> {
    match format {
        "json" => Ok(true),
        "text" => Ok(false),
        other => Err(ArchError::ValidationError(format!(
            "unknown format '{}' (expected 'text' or 'json')",
            other
        ))),
    }
}

fn run_resolve(root: &Path, args: ResolveCli) -> Result<(), ArchError> {
    let json = wants_json(&args.format)?;
    let engine = ValidationEngine::open(root)?;
    let flattened = match engine.resolve(&args.arch_id) {
        Ok(flattened) => flattened,
        Err(err) => {
            if let Some(candidate) = engine.registry().closest_id(err.offending_id()) {
                eprintln!("{} did you mean '{}'?", "hint:".bright_cyan(), candidate);
            }
            return Err(err.into());
        }
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&flattened)?);
        return Ok(());
    }

    println!(
        "{} {}",
        flattened.arch_id.bright_white().bold(),
        format!("(chain: {})", flattened.inheritance_chain.join(" -> ")).dimmed()
    );
    if !flattened.applied_mixins.is_empty() {
        println!("  mixins: {}", flattened.applied_mixins.join(", "));
    }
    if let Some(description) = &flattened.description {
        println!("  {}", output::compact_line(description, output::MESSAGE_WIDTH));
    }
    if let Some(dep) = &flattened.deprecation {
        println!("  {} since {}", "deprecated".bright_yellow().bold(), dep.since);
    }
    for c in &flattened.constraints {
        println!(
            "    {} {} = {} {}",
            format!("[{}]", c.severity).dimmed(),
            c.rule.bold(),
            c.value,
            format!("(from {})", c.source.as_deref().unwrap_or("?")).dimmed()
        );
    }
    for hint in &flattened.hints {
        println!("  {} {}", "hint:".bright_cyan(), hint);
    }
    Ok(())
}

fn run_check(root: &Path, args: CheckCli) -> Result<(), ArchError> {
    let json = wants_json(&args.format)?;
    let engine = ValidationEngine::open(root)?.with_cache_enabled(!args.no_cache);
    let report = if args.paths.is_empty() {
        engine.validate_all()?
    } else {
        let mut targets = Vec::with_capacity(args.paths.len());
        for raw in &args.paths {
            let rel = engine.relative_path(raw).ok_or_else(|| {
                ArchError::PathTraversal(format!("{} is outside {}", raw.display(), root.display()))
            })?;
            targets.push(rel);
        }
        engine.validate_paths(&targets)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, args.verbose);
    }

    let fail_on_warning = args.fail_on_warning || engine.config().validation.fail_on_warning;
    if report.succeeded(fail_on_warning) {
        Ok(())
    } else {
        Err(ArchError::ValidationError(format!(
            "{} of {} files failed validation",
            report.summary.failed + if fail_on_warning { report.summary.warned } else { 0 },
            report.summary.files
        )))
    }
}

fn print_report(report: &RunReport, verbose: bool) {
    for result in &report.results {
        if verbose || result.status != FileStatus::Pass {
            println!("{}", output::render_file(result, verbose));
        }
    }
    println!("{}", output::render_summary(&report.summary));
    if verbose && let Some(stats) = &report.cache {
        println!(
            "  {} {} hits, {} misses, {} invalidated{}",
            "cache:".dimmed(),
            stats.hits,
            stats.misses,
            stats.invalidated,
            if stats.full_invalidation { " (full invalidation)" } else { "" }
        );
    }
}

fn run_audit(root: &Path, args: FormatCli) -> Result<(), ArchError> {
    let json = wants_json(&args.format)?;
    let engine = ValidationEngine::open(root)?;
    let records = engine.collect_overrides()?;
    let report = audit_overrides(&records, &engine.config().overrides, engine.today());
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", output::render_audit(&report));
    }
    Ok(())
}

fn run_cache(root: &Path, command: CacheCommand) -> Result<(), ArchError> {
    let engine = ValidationEngine::open(root)?;
    match command {
        CacheCommand::Stats(args) => {
            let info = engine.cache_info();
            if wants_json(&args.format)? {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else if !info.exists {
                println!("{} no cache at {}", "▸".bright_cyan(), info.path.display());
            } else {
                println!(
                    "{} {} entries in {}{}",
                    "▸".bright_cyan(),
                    info.entries,
                    info.path.display(),
                    if info.stale { " (stale: registry or config changed)" } else { "" }
                );
            }
        }
        CacheCommand::Clear => {
            if engine.clear_cache()? {
                println!("{} cache cleared", "✓".bright_green());
            } else {
                println!("{} nothing to clear", "▸".bright_cyan());
            }
        }
    }
    Ok(())
}

/// Queues the project files touched by `event`.
fn schedule_event(engine: &ValidationEngine, scheduler: &mut WatchScheduler, event: &notify::Event) {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return;
    }
    let now = Instant::now();
    for path in &event.paths {
        let Some(rel) = engine.relative_path(path) else {
            continue;
        };
        match classify_change(&rel, |p| is_included(p, &engine.config().files)) {
            WatchTarget::Reload => scheduler.notify(RELOAD_KEY, now),
            WatchTarget::Source(source) if engine.root().join(&source).is_file() => {
                scheduler.notify(&source, now)
            }
            WatchTarget::Source(_) | WatchTarget::Ignore => {}
        }
    }
}

fn run_watch(root: &Path, args: WatchCli) -> Result<(), ArchError> {
    let mut engine = ValidationEngine::open(root)?;
    print_report(&engine.validate_all()?, false);

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let _ = tx.send(res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    println!("{} watching {}", "▸".bright_cyan(), root.display());

    let mut scheduler = WatchScheduler::new(Duration::from_millis(args.debounce_ms));
    loop {
        let timeout = scheduler
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::from_secs(3600));
        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => schedule_event(&engine, &mut scheduler, &event),
            Ok(Err(e)) => warn!(error = %e, "file watcher error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let due = scheduler.due(Instant::now());
        if due.is_empty() {
            continue;
        }
        if due.iter().any(|t| t.path == RELOAD_KEY) {
            match ValidationEngine::open(root) {
                Ok(reopened) => {
                    engine = reopened;
                    println!("{} registry or config changed, re-validating", "▸".bright_cyan());
                    match engine.validate_all() {
                        Ok(report) => print_report(&report, false),
                        Err(e) => eprintln!("{} {}", "error:".bright_red(), e),
                    }
                }
                Err(e) => eprintln!("{} {}", "error:".bright_red(), e),
            }
            continue;
        }

        let paths: Vec<String> = due.iter().map(|t| t.path.clone()).collect();
        let report = match engine.validate_paths(&paths) {
            Ok(report) => report,
            Err(e) => {
                eprintln!("{} {}", "error:".bright_red(), e);
                continue;
            }
        };
        // Events that arrived during validation supersede these results.
        while let Ok(res) = rx.try_recv() {
            if let Ok(event) = res {
                schedule_event(&engine, &mut scheduler, &event);
            }
        }
        for ticket in &due {
            if let Some(result) = report.result(&ticket.path)
                && scheduler.commit(ticket, result.clone())
            {
                println!("{}", output::render_file(result, false));
            }
        }
    }
    Ok(())
}
