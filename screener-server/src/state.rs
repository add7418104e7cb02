use chrono::{NaiveDateTime, Utc};
use screener_core::data::{DataError, LogProgress, MarketDataProvider, NseProvider};
use screener_runner::{
    BackfillReport, DailyUpdateOutcome, Pipeline, PipelineError, ScreenerConfig, SummaryCache,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Builds one provider session. Called on blocking threads only.
pub type ProviderFactory =
    Arc<dyn Fn() -> Result<Box<dyn MarketDataProvider>, DataError> + Send + Sync>;

/// Exchange-local wall clock.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub pipeline: Pipeline,
    pub providers: ProviderFactory,
    pub clock: Clock,
    /// Serializes pipeline runs triggered through the API.
    pub run_guard: Mutex<()>,
}

impl AppState {
    /// Production state: NSE sessions and the configured exchange clock.
    pub fn new(config: ScreenerConfig) -> Result<Arc<Self>, PipelineError> {
        let offset = config.pipeline.exchange_offset()?;
        let provider_config = config.provider.clone();

        let providers: ProviderFactory = Arc::new(move || {
            NseProvider::new(provider_config.clone())
                .map(|p| Box::new(p) as Box<dyn MarketDataProvider>)
        });
        let clock: Clock = Arc::new(move || Utc::now().with_timezone(&offset).naive_local());

        Ok(Self::with_parts(config, providers, clock))
    }

    pub fn with_parts(config: ScreenerConfig, providers: ProviderFactory, clock: Clock) -> Arc<Self> {
        Arc::new(Self {
            pipeline: Pipeline::new(config),
            providers,
            clock,
            run_guard: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &ScreenerConfig {
        self.pipeline.config()
    }

    /// Fresh read of the summary cache.
    pub fn summary(&self) -> SummaryCache {
        self.pipeline.summary()
    }

    /// Blocking: one provider per configured worker, then a full backfill.
    pub fn backfill(&self) -> Result<BackfillReport, PipelineError> {
        let workers = self.config().pipeline.workers.max(1);
        let mut providers = (0..workers)
            .map(|_| (self.providers)())
            .collect::<Result<Vec<_>, _>>()?;
        self.pipeline
            .run_backfill(&mut providers, (self.clock)(), &LogProgress)
    }

    /// Blocking: gated daily update.
    pub fn daily_update(&self) -> Result<DailyUpdateOutcome, PipelineError> {
        let mut provider = (self.providers)()?;
        self.pipeline
            .run_daily_update(provider.as_mut(), (self.clock)())
    }
}
