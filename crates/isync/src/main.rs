//! `isync` -- mirrors remote tracker issues into a git-backed file tree,
//! one commit per synced issue.
//!
//! This is the entry point: it parses CLI arguments with clap, resolves
//! the runtime context, and dispatches to the batch sync engine.

mod cli;
mod context;
mod output;
mod styles;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use cli::{Cli, Commands, CompletionsArgs, HistoryArgs, RecoverArgs, SyncArgs};
use context::RuntimeContext;
use isync_engine::{BatchEngine, BatchOptions, CancellationToken, ProgressBus};
use isync_filter::Policy;
use isync_repo::{GitRepositoryDriver, RepositoryDriver as _, YamlFileSerializer};
use isync_state::SyncStateStore;

/// Tracks whether a Ctrl+C has already been received.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

fn main() {
    let cli = Cli::parse();

    let ctx = match RuntimeContext::build(
        cli.global.repo.clone(),
        cli.global.json,
        cli.global.verbose,
        cli.global.quiet,
    ) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let default_filter = if ctx.verbose { "isync=debug" } else { "isync=warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("ISYNC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cancellation = CancellationToken::new();
    {
        let token = cancellation.clone();
        let _ = ctrlc::set_handler(move || {
            if CTRLC_RECEIVED.swap(true, Ordering::SeqCst) {
                std::process::exit(1);
            }
            token.cancel();
        });
    }

    let result = match cli.command {
        Some(Commands::Sync(args)) => run_sync(&ctx, &args, &cancellation),
        Some(Commands::Status) => run_status(&ctx),
        Some(Commands::History(args)) => run_history(&ctx, &args),
        Some(Commands::Validate) => run_validate(&ctx),
        Some(Commands::Recover(args)) => run_recover(&ctx, &args),
        Some(Commands::Init) => run_init(&ctx),
        Some(Commands::Completions(args)) => run_completions(&args),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        if ctx.json {
            let err_json = serde_json::json!({ "error": format!("{:#}", e) });
            if let Ok(s) = serde_json::to_string_pretty(&err_json) {
                eprintln!("{}", s);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn build_engine(ctx: &RuntimeContext) -> anyhow::Result<BatchEngine> {
    let fetcher = ctx.fetcher()?;
    Ok(BatchEngine::new(fetcher, Arc::new(YamlFileSerializer), Arc::new(GitRepositoryDriver)))
}

fn parse_duration(input: &str) -> anyhow::Result<Duration> {
    let input = input.trim();
    let (digits, unit) = input.split_at(
        input
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow::anyhow!("duration '{input}' has no unit (expected e.g. '24h', '7d', '30m')"))?,
    );
    let value: u64 = digits.parse()?;
    let secs = match unit {
        "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        "d" => value * 86400,
        other => anyhow::bail!("unknown duration unit '{other}' (expected s, m, h, or d)"),
    };
    Ok(Duration::from_secs(secs))
}

fn run_sync(ctx: &RuntimeContext, args: &SyncArgs, cancellation: &CancellationToken) -> anyhow::Result<()> {
    let engine = build_engine(ctx)?;

    let incremental = if args.force || args.include_new || args.include_modified {
        let since = args
            .since
            .as_deref()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&chrono::Utc)))
            .transpose()?;
        let max_age = args.max_age.as_deref().map(parse_duration).transpose()?;
        Some(Policy {
            force: args.force,
            include_new: args.include_new,
            include_modified: args.include_modified,
            since,
            max_age,
            project_filter: args.project.clone(),
        })
    } else {
        None
    };

    let opts = BatchOptions {
        concurrency: args.concurrency,
        rate_limit: args.rate_limit_ms.map(Duration::from_millis),
        incremental,
    };

    let (bus, receiver) = ProgressBus::new();

    // Always drain the bus on a dedicated consumer thread: the engine's
    // producer side never blocks on a full channel, but a
    // receiver nobody reads from would still let events pile up unread.
    let render = !ctx.quiet && !ctx.json;
    let observer = std::thread::spawn(move || {
        for event in receiver.iter() {
            if render {
                output::render_progress_line(&event);
            }
        }
    });

    let result = if !args.keys.is_empty() {
        engine.run_keys(&args.keys, &ctx.repo_path, &opts, cancellation, &bus)
    } else {
        let query = args.query.as_deref().expect("clap requires keys xor query");
        engine.run_query(query, &ctx.repo_path, &opts, cancellation, &bus)
    };

    drop(bus);
    let _ = observer.join();
    if !ctx.json && !ctx.quiet {
        output::clear_progress_line();
    }

    let result = result?;

    if ctx.json {
        output::output_json(&result);
    } else {
        let summary = format!(
            "synced {}/{} ({} skipped, {} failed) in {:.1}s, {:.2} issues/s, {} workers",
            result.succeeded,
            result.total,
            result.skipped,
            result.failed,
            result.duration.as_secs_f64(),
            result.throughput(),
            result.workers,
        );
        if result.failed == 0 {
            println!("{}", styles::render_pass(&summary));
        } else {
            println!("{}", summary);
        }
        for failure in &result.failures {
            eprintln!(
                "  {} {} at {}: {}",
                styles::render_fail("FAILED"),
                failure.identifier,
                failure.stage,
                failure.message
            );
        }
    }

    if result.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_status(ctx: &RuntimeContext) -> anyhow::Result<()> {
    let store = SyncStateStore::open(&ctx.repo_path, "main")?;
    let snapshot = store.snapshot();
    let stats = snapshot.statistics();

    if ctx.json {
        output::output_json(&serde_json::json!({
            "descriptor": snapshot.descriptor,
            "tracked_issues": snapshot.issues.len(),
            "statistics": stats,
        }));
    } else {
        println!("repository: {}", snapshot.descriptor.path.display());
        println!("branch: {}", snapshot.descriptor.branch);
        println!("tracked issues: {}", snapshot.issues.len());
        println!("operations: {} ({} succeeded, {} failed)", stats.total_operations, stats.successes, stats.failures);
        if let Some(last) = stats.last_successful_sync {
            println!("last successful sync: {}", last.to_rfc3339());
        }
    }
    Ok(())
}

fn run_history(ctx: &RuntimeContext, args: &HistoryArgs) -> anyhow::Result<()> {
    let store = SyncStateStore::open(&ctx.repo_path, "main")?;
    let snapshot = store.snapshot();
    let history = snapshot.history(args.limit);

    if ctx.json {
        output::output_json(&history);
    } else {
        let rows: Vec<Vec<String>> = history
            .iter()
            .map(|op| {
                vec![
                    op.operation_id.clone(),
                    format!("{:?}", op.kind),
                    format!("{:?}", op.terminal_status),
                    op.start.to_rfc3339(),
                    op.results
                        .as_ref()
                        .map(|r| format!("{}/{}", r.succeeded, r.total))
                        .unwrap_or_else(|| "-".to_owned()),
                ]
            })
            .collect();
        output::output_table(&["OPERATION", "KIND", "STATUS", "STARTED", "RESULT"], &rows);
    }
    Ok(())
}

fn run_validate(ctx: &RuntimeContext) -> anyhow::Result<()> {
    let store = SyncStateStore::open(&ctx.repo_path, "main")?;
    let snapshot = store.snapshot();
    let result = isync_state::validate(&snapshot, &ctx.repo_path);

    if ctx.json {
        output::output_json(&result);
    } else if result.is_clean() {
        println!("clean: {} tracked issue(s), no divergence", snapshot.issues.len());
    } else {
        for id in &result.missing_artifacts {
            println!("MISSING artifact for {id}");
        }
        for path in &result.orphan_files {
            println!("ORPHAN file {}", path.display());
        }
    }

    if !result.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_recover(ctx: &RuntimeContext, args: &RecoverArgs) -> anyhow::Result<()> {
    let store = SyncStateStore::open(&ctx.repo_path, "main")?;
    let repo_path = ctx.repo_path.clone();

    let result = store.with_state(|state| {
        isync_state::recover(state, &repo_path, args.dry_run, |path| {
            std::fs::read_to_string(path).ok().and_then(|s| serde_yaml::from_str(&s).ok())
        })
    });

    if !args.dry_run {
        store.save()?;
    }

    if ctx.json {
        output::output_json(&result);
    } else if result.dry_run {
        println!("would recover {} issue(s):", result.recovered.len());
        for id in &result.recovered {
            println!("  {id}");
        }
    } else {
        println!("recovered {} issue(s)", result.recovered.len());
    }
    Ok(())
}

fn run_completions(args: &CompletionsArgs) -> anyhow::Result<()> {
    use clap::CommandFactory;
    let mut cmd = Cli::command();
    clap_complete::generate(args.shell, &mut cmd, "isync", &mut std::io::stdout());
    Ok(())
}

fn run_init(ctx: &RuntimeContext) -> anyhow::Result<()> {
    let driver = GitRepositoryDriver;
    driver.initialize(&ctx.repo_path)?;
    let store = SyncStateStore::open(&ctx.repo_path, "main")?;
    store.save()?;
    isync_config::ensure_isync_dir(&ctx.repo_path)?;

    if ctx.json {
        output::output_json(&serde_json::json!({ "initialized": ctx.repo_path }));
    } else {
        println!("initialized {}", ctx.repo_path.display());
    }
    Ok(())
}
