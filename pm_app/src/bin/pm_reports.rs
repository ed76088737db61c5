use std::sync::Arc;

use pm_app::config_loader;
use pm_app::tracing_setup;
use pm_client::FetchOutcome;
use pm_client::ReportTransport;
use pm_client::ResilientInvoker;
use pm_types::TtlClass;
use serde_json::Value;
use serde_json::json;
use tracing::Level;
use tracing::info;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = tracing_setup::init("pm_reports", "logs", Level::INFO);

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config/pm_reports.toml".to_string());
    let config = config_loader::load_app_config_or_default(&config_path);

    let transport = Arc::new(ReportTransport::new(config.service.transport_config())?);
    let invoker: ResilientInvoker<Value> = ResilientInvoker::new(config.resilience, |error, attempts| {
        json!({
            "degraded": true,
            "reason": error.to_string(),
            "attempts": attempts,
        })
    })?;

    // One report per stability class, keyed the way callers would key them
    let requests =
        [("project:42", "project:42:weekly", TtlClass::Weekly, "projects/42/reports/weekly"), ("project:42", "project:42:live", TtlClass::Live, "projects/42/status")];

    for (context, cache_key, class, path) in requests {
        let transport = Arc::clone(&transport);
        let report = invoker
            .invoke(context, cache_key, class, move || {
                let transport = Arc::clone(&transport);
                async move {
                    let (value, quota) = transport.fetch_json(path).await?;
                    Ok(match quota {
                        Some(hint) => FetchOutcome::with_quota(value, hint),
                        None => FetchOutcome::new(value),
                    })
                }
            })
            .await;

        match report {
            Ok(report) if report.is_degraded() => warn!(cache_key, "served degraded report"),
            Ok(report) => info!(cache_key, cached = report.is_cached(), "report retrieved"),
            Err(error) => warn!(cache_key, %error, "report unavailable"),
        }
    }

    let metrics = invoker.metrics();
    info!(
        total = metrics.total_requests,
        limited = metrics.rate_limited_requests,
        limited_pct = format!("{:.1}", metrics.rate_limited_percent()),
        avg_wait_ms = format!("{:.1}", metrics.avg_wait_millis()),
        contexts = metrics.active_contexts,
        "rate limiter metrics"
    );

    let stats = invoker.cache_stats();
    info!(hits = stats.hits, misses = stats.misses, hit_rate = format!("{:.2}", stats.hit_rate()), "cache stats");

    Ok(())
}
