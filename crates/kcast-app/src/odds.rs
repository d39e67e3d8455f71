// The Odds API provider for pitcher strikeout props (`odds-api`).
//
// Lists today's MLB events, pulls the `pitcher_strikeouts` market for every
// event concurrently and keeps the consensus (median) Over line per pitcher
// for the life of the process. Only registered when an API key is configured.

use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use kcast_core::identity::normalize;
use kcast_core::source::{Source, SourceError};

use crate::http::get_json;

const ODDS_API_BASE: &str = "https://api.the-odds-api.com/v4/sports/baseball_mlb";
const SOURCE_NAME: &str = "odds-api";
const MARKET_KEY: &str = "pitcher_strikeouts";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Event {
    id: String,
}

#[derive(Debug, Deserialize)]
struct EventOdds {
    #[serde(default)]
    bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
struct Bookmaker {
    #[serde(default)]
    markets: Vec<Market>,
}

#[derive(Debug, Deserialize)]
struct Market {
    key: String,
    #[serde(default)]
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    name: String,
    /// Player the prop is about.
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    point: Option<f64>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Add every bookmaker's Over line in `odds` to `lines`, keyed by normalized
/// pitcher name.
fn collect_over_lines(odds: EventOdds, lines: &mut HashMap<String, Vec<f64>>) {
    let outcomes = odds
        .bookmakers
        .into_iter()
        .flat_map(|b| b.markets)
        .filter(|m| m.key == MARKET_KEY)
        .flat_map(|m| m.outcomes);
    for outcome in outcomes {
        if !outcome.name.eq_ignore_ascii_case("over") {
            continue;
        }
        if let (Some(pitcher), Some(point)) = (outcome.description, outcome.point) {
            lines.entry(normalize(&pitcher)).or_default().push(point);
        }
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

fn consensus(lines: HashMap<String, Vec<f64>>) -> HashMap<String, f64> {
    lines
        .into_iter()
        .filter_map(|(pitcher, points)| median(points).map(|m| (pitcher, m)))
        .collect()
}

/// Request every event's odds at once and reduce them to consensus lines.
/// An event whose request fails is skipped.
async fn collect_event_lines<F, Fut>(event_ids: Vec<String>, fetch_event: F) -> HashMap<String, f64>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<EventOdds, SourceError>>,
{
    let responses = join_all(event_ids.into_iter().map(|id| {
        let request = fetch_event(id.clone());
        async move { (id, request.await) }
    }))
    .await;

    let mut lines = HashMap::new();
    for (id, response) in responses {
        match response {
            Ok(odds) => collect_over_lines(odds, &mut lines),
            Err(e) => warn!(event = %id, "skipping event: {e}"),
        }
    }
    consensus(lines)
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

pub struct OddsApi {
    http: reqwest::Client,
    api_key: String,
    lines: OnceCell<HashMap<String, f64>>,
}

impl OddsApi {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            lines: OnceCell::new(),
        }
    }

    async fn event_odds(&self, event_id: String) -> Result<EventOdds, SourceError> {
        let query = [
            ("apiKey", self.api_key.clone()),
            ("regions", "us".to_string()),
            ("markets", MARKET_KEY.to_string()),
            ("oddsFormat", "american".to_string()),
        ];
        let url = format!("{ODDS_API_BASE}/events/{event_id}/odds");
        get_json(&self.http, SOURCE_NAME, &url, &query).await
    }

    async fn lines(&self) -> Result<&HashMap<String, f64>, SourceError> {
        self.lines
            .get_or_try_init(|| async {
                let key = [("apiKey", self.api_key.clone())];
                let events: Vec<Event> =
                    get_json(&self.http, SOURCE_NAME, &format!("{ODDS_API_BASE}/events"), &key).await?;

                let event_count = events.len();
                let ids = events.into_iter().map(|e| e.id).collect();
                let lines = collect_event_lines(ids, |id| self.event_odds(id)).await;
                info!(events = event_count, pitchers = lines.len(), "strikeout props loaded");
                Ok(lines)
            })
            .await
    }
}

#[async_trait]
impl Source<f64> for OddsApi {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, pitcher: &str) -> Result<Option<f64>, SourceError> {
        Ok(self.lines().await?.get(&normalize(pitcher)).copied())
    }
}
