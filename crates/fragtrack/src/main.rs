mod bootstrap;
mod report;

use anyhow::Result;
use frag_core::settings::Settings;
use frag_data::aggregator::{recompute_counters, AggregateFilter, StatsAggregator};
use frag_data::reader::load_history;
use frag_data::streaks::StreakAnalyzer;
use frag_runtime::store::JsonlMatchStore;
use frag_runtime::tracker::{Tracker, TrackerConfig, TrackerUpdate};

/// Rows shown by the history view.
const HISTORY_LIMIT: usize = 50;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_deref())?;

    let data_dir = settings.resolve_data_dir();
    tracing::info!("fragtrack v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "View: {}, data dir: {}, mode: {}",
        settings.view,
        data_dir.display(),
        settings.mode
    );

    match settings.view.as_str() {
        "live" => {
            let config = TrackerConfig::from_settings(&settings);
            let (mut rx, handle) = Tracker::new(config, JsonlMatchStore::new(&data_dir)).start();

            loop {
                tokio::select! {
                    update = rx.recv() => match update {
                        Some(TrackerUpdate::Live(batch)) => {
                            if let Some(latest) = batch.last() {
                                println!("{}", report::render_live(latest));
                            }
                        }
                        Some(TrackerUpdate::MatchFinished { identity, record, summary, saved }) => {
                            println!("{}", report::render_finished(&identity, &record, &summary));
                            if !saved {
                                println!("       (not saved to history)");
                            }
                        }
                        Some(TrackerUpdate::SourceError(message)) => {
                            eprintln!("log source error: {}", message);
                        }
                        Some(TrackerUpdate::Finished { lines, duplicates }) => {
                            tracing::info!(lines, duplicates, "input finished");
                        }
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Ctrl+C received; stopping tracker");
                        handle.abort();
                        break;
                    }
                }
            }
        }

        "summary" => {
            let history = load_history(&data_dir, settings.identity.as_deref(), settings.mode_filter());
            let filter = AggregateFilter {
                mode: settings.mode_filter(),
                map: settings.map.clone(),
            };
            let aggregator = StatsAggregator::new(StreakAnalyzer::new(settings.quick_kill_window_ms));
            let mut summary = aggregator.aggregate(&history.records, &filter);
            summary.skipped_records += history.skipped;

            match settings.identity.as_deref() {
                Some(identity) => {
                    let counters = recompute_counters(&history.records);
                    println!("{}\n", report::render_counters(identity, &counters));
                }
                None => {
                    let identities = JsonlMatchStore::new(&data_dir).identities();
                    println!("{}\n", report::render_identities(&identities));
                }
            }
            print!("{}", report::render_summary(&summary));
        }

        "history" => {
            let history = load_history(&data_dir, settings.identity.as_deref(), settings.mode_filter());
            let filter = AggregateFilter {
                mode: settings.mode_filter(),
                map: settings.map.clone(),
            };
            let records: Vec<_> = history
                .records
                .into_iter()
                .filter(|r| filter.matches(r))
                .collect();
            print!("{}", report::render_history(&records, HISTORY_LIMIT));
            if history.skipped > 0 {
                println!("\n{} corrupt record(s) skipped", history.skipped);
            }
        }

        unknown => {
            eprintln!("Unknown view: {}", unknown);
        }
    }

    Ok(())
}
