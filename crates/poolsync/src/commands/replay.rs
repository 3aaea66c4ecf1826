//! Replay handler: page a fixture pool to exhaustion through a headless
//! viewport, reconcile the event log, then render the result.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use poolsync_core::{
    FilterQuery, PageLoader, PagerState, PushEvent, PushHub, PushReconciler, PushStats,
    ResourceKind, ScrollViewport, SentinelRef, SyncError, SyncTuning, TriggerOptions,
    ViewportObserver, ViewportTrigger, WindowedList,
};

use crate::cli::{GlobalOpts, OutputFormat, ReplayArgs};
use crate::config;
use crate::error::CliError;
use crate::fixture::{self, FixturePool, FixtureResource};
use crate::output::{self, ResourceRow};

/// How long any single replay stage may wait for progress.
const STALL_TIMEOUT: Duration = Duration::from_secs(10);

const TAIL_SENTINEL: &str = "pool-tail";

#[derive(Debug, Serialize)]
struct Summary {
    kind: String,
    page_size: u32,
    pages: usize,
    scroll_triggers: usize,
    exhausted: bool,
    items: usize,
    push: PushStats,
    live_events: usize,
    window_steps: usize,
}

#[derive(Serialize)]
struct Report<'a> {
    summary: &'a Summary,
    items: Vec<&'a FixtureResource>,
}

pub async fn handle(args: ReplayArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let mut tuning = cfg.to_tuning()?;
    if let Some(page_size) = args.page_size {
        tuning.page_size = page_size;
        tuning.validate().map_err(|e| CliError::Validation {
            field: "page-size".into(),
            reason: e.to_string(),
        })?;
    }
    validate_geometry(&args)?;
    let filter = parse_filters(&args.filters)?;

    let pool = FixturePool::load(&args.pool)?;
    let kind = args
        .kind
        .clone()
        .or_else(|| pool.kind.clone())
        .unwrap_or_else(|| "vm".into());
    let events = match &args.events {
        Some(path) => fixture::load_events(path)?,
        None => Vec::new(),
    };

    let loader = PageLoader::new(pool, &tuning);
    let scroll_triggers = scroll_to_exhaustion(&loader, filter, &tuning, &args).await?;
    let pager = loader.state();
    loader.unmount();

    let reconciler = PushReconciler::new(loader.collection());
    let push = reconcile(&reconciler, &kind, events).await?;
    let live_events = reconciler.live_events().len();

    let snapshot = reconciler.collection().snapshot();
    let window_steps = grow_window(&tuning, &snapshot).await?;
    reconciler.teardown();

    let summary = Summary {
        kind,
        page_size: tuning.page_size,
        pages: pager.pages(),
        scroll_triggers,
        exhausted: pager.exhausted(),
        items: snapshot.len(),
        push,
        live_events,
        window_steps,
    };
    info!(
        pages = summary.pages,
        items = summary.items,
        applied = summary.push.applied,
        "replay complete"
    );

    let format = config::output_format(global, &cfg);
    let color = output::should_color(config::color_mode(global, &cfg));
    let rows: Vec<ResourceRow> = snapshot
        .iter()
        .enumerate()
        .map(|(i, item)| ResourceRow::new(i + 1, item, color))
        .collect();
    let report = Report {
        summary: &summary,
        items: snapshot.iter().map(AsRef::as_ref).collect(),
    };
    output::print_output(&output::render(format, &report, &rows)?, global.quiet);
    if format == OutputFormat::Table {
        output::print_status(&summary_line(&summary), global.quiet);
    }
    Ok(())
}

// ── Stages ───────────────────────────────────────────────────────────

/// Load the first page, then keep the tail sentinel in view until the
/// pager reports the end. Returns how many near reports drove a fetch.
async fn scroll_to_exhaustion(
    loader: &PageLoader<FixtureResource>,
    filter: Option<FilterQuery>,
    tuning: &SyncTuning,
    args: &ReplayArgs,
) -> Result<usize, CliError> {
    match filter {
        Some(filter) => loader.reset(Some(filter)),
        None => loader.load(),
    }
    let mut state = settle_page(loader).await?;

    let viewport = Arc::new(ScrollViewport::new(args.viewport_height));
    let observer: Arc<dyn ViewportObserver> = viewport.clone();
    let sentinel = SentinelRef::new(TAIL_SENTINEL);
    let options = TriggerOptions {
        once: false,
        ..TriggerOptions::from_tuning(tuning)
    }
    .with_external_ref(sentinel.clone());
    let trigger = ViewportTrigger::new(observer, options);

    let (near_tx, mut near_rx) = mpsc::unbounded_channel();
    let driver = trigger.drive(move || {
        let _ = near_tx.send(());
    });

    let mut triggers = 0;
    while state.can_fetch_more() {
        let rows = loader.collection().len();
        let tail = row_offset(rows, args.row_height);
        viewport.place(sentinel.clone(), tail);
        viewport.scroll_to(tail - viewport.height());

        tokio::time::timeout(STALL_TIMEOUT, near_rx.recv())
            .await
            .ok()
            .flatten()
            .ok_or_else(|| CliError::Stalled {
                stage: format!("tail sentinel never reached the viewport after {rows} rows"),
            })?;
        while near_rx.try_recv().is_ok() {}
        triggers += 1;

        if !loader.fetch_more() {
            break;
        }
        state = settle_page(loader).await?;
        debug!(pages = state.pages(), rows = loader.collection().len(), "scrolled page in");
    }

    trigger.disconnect();
    driver.abort();
    Ok(triggers)
}

async fn settle_page(
    loader: &PageLoader<FixtureResource>,
) -> Result<PagerState, CliError> {
    let state = tokio::time::timeout(STALL_TIMEOUT, loader.settled())
        .await
        .map_err(|_| CliError::Stalled {
            stage: "pool request did not settle".into(),
        })?;
    if state.errored() {
        let err = loader
            .request_state()
            .error
            .unwrap_or_else(|| SyncError::transport("pool request failed"));
        return Err(CliError::Request(err));
    }
    Ok(state)
}

/// Publish every event through a hub and wait until the reconciler has
/// seen all that match `kind`.
async fn reconcile(
    reconciler: &PushReconciler<FixtureResource>,
    kind: &str,
    events: Vec<PushEvent<FixtureResource>>,
) -> Result<PushStats, CliError> {
    let hub = PushHub::with_capacity(events.len().max(1));
    let task = reconciler.attach(&hub, kind);
    let kind = ResourceKind::new(kind);
    let expected = events.iter().filter(|e| e.kind == kind).count();
    let expected = u64::try_from(expected).unwrap_or(u64::MAX);

    for event in events {
        hub.publish(event);
    }

    let mut stats = reconciler.subscribe_stats();
    tokio::time::timeout(STALL_TIMEOUT, stats.wait_for(|s| s.delivered >= expected))
        .await
        .ok()
        .and_then(Result::ok)
        .ok_or_else(|| CliError::Stalled {
            stage: format!("push events not delivered (expected {expected})"),
        })?;
    task.abort();
    Ok(reconciler.stats())
}

/// Grow a window over the reconciled list until it shows everything.
async fn grow_window(
    tuning: &SyncTuning,
    snapshot: &Arc<Vec<Arc<FixtureResource>>>,
) -> Result<usize, CliError> {
    let window = WindowedList::new(tuning);
    window.reset(snapshot.as_ref().clone());
    let mut steps = 0;
    while !window.state().finish() {
        if !window.next_page() {
            return Err(CliError::Stalled {
                stage: "window refused to grow".into(),
            });
        }
        let state = tokio::time::timeout(STALL_TIMEOUT, window.settled())
            .await
            .map_err(|_| CliError::Stalled {
                stage: "window step did not settle".into(),
            })?;
        steps += 1;
        debug!(shown = state.short_list().len(), total = snapshot.len(), "window grew");
    }
    window.unmount();
    Ok(steps)
}

// ── Helpers ──────────────────────────────────────────────────────────

fn parse_filters(raw: &[String]) -> Result<Option<FilterQuery>, CliError> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.iter()
        .try_fold(FilterQuery::new(), |query, pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| CliError::Validation {
                field: "filter".into(),
                reason: format!("expected KEY=VALUE, got '{pair}'"),
            })?;
            Ok(query.param(key.trim(), value.trim()))
        })
        .map(Some)
}

fn validate_geometry(args: &ReplayArgs) -> Result<(), CliError> {
    for (field, value) in [
        ("viewport-height", args.viewport_height),
        ("row-height", args.row_height),
    ] {
        if !value.is_finite() || value <= 0.0 {
            return Err(CliError::Validation {
                field: field.into(),
                reason: format!("must be a positive number, got {value}"),
            });
        }
    }
    Ok(())
}

fn row_offset(rows: usize, row_height: f64) -> f64 {
    f64::from(u32::try_from(rows).unwrap_or(u32::MAX)) * row_height
}

fn summary_line(summary: &Summary) -> String {
    format!(
        "{} {} items in {} pages ({} scroll triggers), {} push events applied, {} duplicates, window grew {} steps",
        summary.items,
        summary.kind,
        summary.pages,
        summary.scroll_triggers,
        summary.push.applied,
        summary.push.duplicates,
        summary.window_steps,
    )
}
