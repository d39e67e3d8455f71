// Console output for projections and slate file loading.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tracing::warn;

use kcast_baseball::model::GameRequest;
use kcast_baseball::orchestrator::GameReport;
use kcast_baseball::projection::ProjectionResult;

pub const NO_PROJECTION: &str = "⚠️ No projection available";

/// Threshold whose Over probability is headlined.
const HEADLINE_THRESHOLD: f64 = 6.5;

pub fn format_result(result: &ProjectionResult) -> String {
    let p = &result.percentiles;
    let prov = &result.provenance;
    let over = result
        .prob_over_at(HEADLINE_THRESHOLD)
        .map(|pct| format!("{pct:.1}%"))
        .unwrap_or_else(|| "N/A".to_string());

    let mut lines = vec![
        format!("\n=== {} vs {} ===", result.pitcher, result.opponent),
        format!("Projected Ks: {:.1}", result.mean),
        format!(
            "Vegas Line: {} ({})",
            result.market_line.value, prov.market_source
        ),
        format!("Edge: {:+.2}", result.edge),
        format!("Over {HEADLINE_THRESHOLD} Probability: {over}"),
        format!(
            "Range: p25 {:.1} / p50 {:.1} / p75 {:.1} / p95 {:.1}",
            p.p25, p.p50, p.p75, p.p95
        ),
        format!(
            "Baseline: {:.2} ({} starts), modifier x{:.3}",
            result.baseline, prov.game_logs_used, result.total_modifier
        ),
        format!("Lineup Source: {}", prov.lineup_source),
    ];
    if prov.fallback_batters > 0 {
        lines.push(format!(
            "League-average batters: {} of {}",
            prov.fallback_batters, prov.batters_total
        ));
    }
    lines.join("\n")
}

pub fn format_report(report: &GameReport) -> String {
    match &report.outcome {
        Ok(result) => format_result(result),
        Err(e) => {
            let stage = e
                .stage()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown stage".to_string());
            format!(
                "\n=== {} vs {} ===\n{NO_PROJECTION} ({stage}: {e})",
                report.request.pitcher, report.request.opponent
            )
        }
    }
}

/// Slate reports as a pretty JSON array: full results for projected games,
/// `{pitcher, opponent, error}` for failed ones.
pub fn slate_json(reports: &[GameReport]) -> serde_json::Result<String> {
    let rows = reports
        .iter()
        .map(|r| match &r.outcome {
            Ok(result) => serde_json::to_value(result),
            Err(e) => Ok(serde_json::json!({
                "pitcher": r.request.pitcher,
                "opponent": r.request.opponent,
                "error": e.to_string(),
            })),
        })
        .collect::<serde_json::Result<Vec<_>>>()?;
    serde_json::to_string_pretty(&rows)
}

// ---------------------------------------------------------------------------
// Slate files
// ---------------------------------------------------------------------------

fn load_slate_from_reader<R: Read>(rdr: R) -> Result<Vec<GameRequest>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(rdr);
    let mut games = Vec::new();
    for result in reader.deserialize::<GameRequest>() {
        match result {
            Ok(game) if !game.pitcher.is_empty() && !game.opponent.is_empty() => games.push(game),
            Ok(game) => warn!("skipping slate row without pitcher or opponent: {:?}", game),
            Err(e) => warn!("skipping malformed slate row: {}", e),
        }
    }
    Ok(games)
}

/// Load a slate CSV with `pitcher,opponent[,park]` columns.
pub fn load_slate(path: &Path) -> anyhow::Result<Vec<GameRequest>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open slate file {}", path.display()))?;
    load_slate_from_reader(file).with_context(|| format!("failed to read slate file {}", path.display()))
}
