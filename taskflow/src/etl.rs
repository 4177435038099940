//! Market-data ingestion built from taskflow tasks.
//!
//! Three steps share results through the context: extraction writes quotes,
//! normalization reads them, and loading reads the normalized rows.

use crate::config::PipelineConfig;
use crate::context::ExecutionContext;
use crate::errors::PipelineValidationError;
use crate::pipeline::{Pipeline, PipelineBuilder};
use crate::tasks::{Task, Work, WorkResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Name of the ingestion pipeline.
pub const PIPELINE_NAME: &str = "MarketData_Ingestion_Pipeline";
/// Extraction task name.
pub const EXTRACT_TASK: &str = "extract_market_data";
/// Normalization task name.
pub const TRANSFORM_TASK: &str = "transform_normalize";
/// Load task name.
pub const LOAD_TASK: &str = "load_to_warehouse";

/// Simulated upstream API latency.
pub const DEFAULT_EXTRACT_LATENCY: Duration = Duration::from_millis(500);

/// A raw quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol.
    pub ticker: String,
    /// Last price.
    pub price: f64,
}

/// A quote with its price scaled down by 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedQuote {
    /// Ticker symbol.
    pub ticker: String,
    /// Last price.
    pub price: f64,
    /// `price / 100`.
    pub normalized_price: f64,
}

/// Fetches quotes from a simulated market-data API.
#[derive(Debug, Clone)]
pub struct MarketDataExtract {
    latency: Duration,
}

impl MarketDataExtract {
    /// Creates an extractor that waits `latency` per call.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MarketDataExtract {
    fn default() -> Self {
        Self::new(DEFAULT_EXTRACT_LATENCY)
    }
}

#[async_trait]
impl Work for MarketDataExtract {
    async fn run(&self, _ctx: &ExecutionContext) -> WorkResult {
        tokio::time::sleep(self.latency).await;
        extract_market_data()
    }
}

/// The quotes returned by the simulated API.
pub fn extract_market_data() -> WorkResult {
    let quotes = vec![
        Quote {
            ticker: "AAPL".to_string(),
            price: 150.0,
        },
        Quote {
            ticker: "GOOGL".to_string(),
            price: 2800.0,
        },
    ];
    Ok(serde_json::to_value(quotes)?)
}

/// Adds `normalized_price` to every extracted quote.
///
/// # Errors
///
/// Fails when extraction produced nothing, including when it has not run.
pub fn transform_normalize(ctx: &ExecutionContext) -> WorkResult {
    let quotes: Vec<Quote> = match ctx.get(EXTRACT_TASK) {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Vec::new(),
    };
    if quotes.is_empty() {
        anyhow::bail!("No data to transform");
    }

    let normalized: Vec<NormalizedQuote> = quotes
        .into_iter()
        .map(|q| NormalizedQuote {
            normalized_price: q.price / 100.0,
            ticker: q.ticker,
            price: q.price,
        })
        .collect();
    Ok(serde_json::to_value(normalized)?)
}

/// Writes normalized quotes to the warehouse.
///
/// # Errors
///
/// Fails when there is nothing to load.
pub fn load_to_warehouse(ctx: &ExecutionContext) -> WorkResult {
    let rows: Vec<NormalizedQuote> = ctx.require_as(TRANSFORM_TASK)?;
    // Simulated insert
    info!(records = rows.len(), "Inserting {} records into Data Warehouse.", rows.len());
    Ok(serde_json::Value::from("Success"))
}

/// Builds the three-step ingestion pipeline with `config`'s retry defaults.
///
/// # Errors
///
/// Only on an invalid task layout, which this fixed layout never produces.
pub fn market_data_pipeline(config: &PipelineConfig) -> Result<Pipeline, PipelineValidationError> {
    market_data_pipeline_with(config, MarketDataExtract::default())
}

/// Like [`market_data_pipeline`] with a custom extractor.
pub fn market_data_pipeline_with(
    config: &PipelineConfig,
    extract: MarketDataExtract,
) -> Result<Pipeline, PipelineValidationError> {
    let defaults = |task: Task| match config.attempt_timeout() {
        Some(limit) => task.with_retry_policy(config.retry_policy()).with_attempt_timeout(limit),
        None => task.with_retry_policy(config.retry_policy()),
    };

    Ok(PipelineBuilder::new(PIPELINE_NAME)
        .config(config)
        .task(defaults(Task::from_work(EXTRACT_TASK, Arc::new(extract), config.max_retries)))?
        .task(defaults(Task::new(TRANSFORM_TASK, transform_normalize, config.max_retries)).depends_on(EXTRACT_TASK))?
        .task(defaults(Task::new(LOAD_TASK, load_to_warehouse, config.max_retries)).depends_on(TRANSFORM_TASK))?
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{event_types, CollectingEventSink};
    use crate::testing::{assert_context_keys, assert_run_failed_at, assert_run_succeeded};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            retry_delay_ms: 1,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_transform_normalizes_prices() {
        let mut ctx = ExecutionContext::new();
        ctx.insert(EXTRACT_TASK, extract_market_data().unwrap()).unwrap();

        let out = transform_normalize(&ctx).unwrap();

        assert_eq!(
            out,
            json!([
                {"ticker": "AAPL", "price": 150.0, "normalized_price": 1.5},
                {"ticker": "GOOGL", "price": 2800.0, "normalized_price": 28.0},
            ])
        );
    }

    #[test]
    fn test_transform_without_data_fails() {
        let err = transform_normalize(&ExecutionContext::new()).unwrap_err();
        assert_eq!(err.to_string(), "No data to transform");

        let mut ctx = ExecutionContext::new();
        ctx.insert(EXTRACT_TASK, json!([])).unwrap();
        assert!(transform_normalize(&ctx).is_err());
    }

    #[tokio::test]
    async fn test_market_data_pipeline_runs() {
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = market_data_pipeline_with(&fast_config(), MarketDataExtract::new(Duration::from_millis(1)))
            .unwrap()
            .with_event_sink(sink.clone());

        let result = pipeline.run().await;

        assert_run_succeeded(&result);
        assert_context_keys(&result.context, &[EXTRACT_TASK, TRANSFORM_TASK, LOAD_TASK]);
        assert_eq!(result.context.get(LOAD_TASK), Some(&json!("Success")));
        assert_eq!(sink.count(event_types::TASK_SUCCEEDED), 3);
    }

    #[tokio::test]
    async fn test_transform_first_never_loads() {
        let config = PipelineConfig {
            max_retries: 2,
            ..fast_config()
        };
        let sink = Arc::new(CollectingEventSink::new());
        let pipeline = PipelineBuilder::new("misordered")
            .config(&config)
            .event_sink(sink.clone())
            .work(TRANSFORM_TASK, transform_normalize)
            .unwrap()
            .work(EXTRACT_TASK, |_| extract_market_data())
            .unwrap()
            .work(LOAD_TASK, load_to_warehouse)
            .unwrap()
            .build();

        let result = pipeline.run().await;

        assert_run_failed_at(&result, TRANSFORM_TASK);
        assert_eq!(result.failure.as_ref().map(|f| f.attempts), Some(3));
        assert_eq!(sink.count(event_types::TASK_STARTED), 3);
        assert!(sink.task_events(event_types::TASK_STARTED, LOAD_TASK).is_empty());
    }

    #[test]
    fn test_pipeline_layout() {
        let config = PipelineConfig {
            max_retries: 1,
            attempt_timeout_ms: Some(2_000),
            ..PipelineConfig::default()
        };
        let pipeline = market_data_pipeline(&config).unwrap();

        assert_eq!(pipeline.name(), PIPELINE_NAME);
        assert_eq!(pipeline.task_names(), vec![EXTRACT_TASK, TRANSFORM_TASK, LOAD_TASK]);
        assert!(pipeline
            .tasks()
            .iter()
            .all(|t| t.max_retries() == 1 && t.attempt_timeout() == Some(Duration::from_secs(2))));
    }
}
