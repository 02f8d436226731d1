//! Public pool statistics for a wallet.

use std::fmt;

use p2pminer_config::PoolStatsConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{WorkerError, WorkerResult};

/// Statistics reported by the pool's miner endpoint.
///
/// Every field is optional and kept as raw JSON since pools disagree on
/// whether figures are numbers or strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Current hashrate
    pub hashrate: Option<Value>,
    /// Average hashrate over the pool's window
    pub avg_hashrate: Option<Value>,
    /// Total amount paid out
    pub amt_paid: Option<Value>,
    /// Balance due
    pub due: Option<Value>,
    /// Number of payments made
    pub payments_total: Option<Value>,
    /// Time of the last payment
    pub last_payment: Option<Value>,
    /// Accepted shares
    pub valid_shares: Option<Value>,
    /// Rejected shares
    pub invalid_shares: Option<Value>,
    /// Workers currently online
    pub workers_online: Option<Value>,
}

impl PoolStats {
    /// Human-readable label and value for every field, `N/A` when absent.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let show = |value: &Option<Value>| match value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => p2pminer_core::UNAVAILABLE.to_string(),
            Some(other) => other.to_string(),
        };

        vec![
            ("hashrate", show(&self.hashrate)),
            ("average hashrate", show(&self.avg_hashrate)),
            ("amount paid", show(&self.amt_paid)),
            ("amount due", show(&self.due)),
            ("payments", show(&self.payments_total)),
            ("last payment", show(&self.last_payment)),
            ("valid shares", show(&self.valid_shares)),
            ("invalid shares", show(&self.invalid_shares)),
            ("workers online", show(&self.workers_online)),
        ]
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .summary()
            .into_iter()
            .map(|(label, value)| format!("{label}: {value}"))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// HTTP client for the pool statistics API.
#[derive(Debug, Clone)]
pub struct PoolStatsClient {
    http: reqwest::Client,
    api_base: Url,
}

impl PoolStatsClient {
    /// Creates a client for `config.api_base`.
    pub fn new(config: &PoolStatsConfig) -> WorkerResult<Self> {
        let api_base = Url::parse(&config.api_base)?;
        if api_base.cannot_be_a_base() {
            return Err(WorkerError::InvalidApiBase(config.api_base.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { http, api_base })
    }

    /// `{api_base}/miner/{wallet}/stats`, with the wallet percent-encoded.
    pub fn stats_url(&self, wallet: &str) -> WorkerResult<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| WorkerError::InvalidApiBase(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(["miner", wallet, "stats"]);
        Ok(url)
    }

    /// Fetches the statistics for `wallet`.
    pub async fn fetch(&self, wallet: &str) -> WorkerResult<PoolStats> {
        let url = self.stats_url(wallet)?;
        debug!(%url, "requesting pool statistics");
        let stats = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<PoolStats>()
            .await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(api_base: String) -> PoolStatsClient {
        PoolStatsClient::new(&PoolStatsConfig {
            api_base,
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_stats_url() {
        let client = client("https://pool.example/api/".to_string());
        assert_eq!(
            client.stats_url("4Abc").unwrap().as_str(),
            "https://pool.example/api/miner/4Abc/stats"
        );
        assert_eq!(
            client.stats_url("a/b").unwrap().as_str(),
            "https://pool.example/api/miner/a%2Fb/stats"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = PoolStatsClient::new(&PoolStatsConfig {
            api_base: "mailto:ops@pool.example".to_string(),
            request_timeout_secs: 5,
        });
        assert!(matches!(result, Err(WorkerError::InvalidApiBase(_))));
    }

    #[test]
    fn test_summary_placeholders() {
        let stats: PoolStats =
            serde_json::from_value(json!({"hashrate": 1200, "amtPaid": "0.5", "due": null}))
                .unwrap();
        let summary = stats.summary();
        assert_eq!(summary[0], ("hashrate", "1200".to_string()));
        assert_eq!(summary[2], ("amount paid", "0.5".to_string()));
        assert_eq!(summary[3], ("amount due", "N/A".to_string()));
        assert_eq!(summary[8], ("workers online", "N/A".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_stats() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/miner/wallet-abc/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hash": 950,
                "hashrate": 950,
                "avgHashrate": 900.5,
                "validShares": 42,
                "invalidShares": 1,
                "workersOnline": 2
            })))
            .mount(&server)
            .await;

        let stats = client(format!("{}/api", server.uri()))
            .fetch("wallet-abc")
            .await
            .unwrap();

        assert_eq!(stats.hashrate, Some(json!(950)));
        assert_eq!(stats.avg_hashrate, Some(json!(900.5)));
        assert_eq!(stats.valid_shares, Some(json!(42)));
        assert_eq!(stats.workers_online, Some(json!(2)));
        assert_eq!(stats.amt_paid, None);
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = client(server.uri()).fetch("unknown").await;
        assert!(matches!(result, Err(WorkerError::Http(_))));
    }
}
