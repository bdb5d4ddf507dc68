//! AI spending tips.
//!
//! A compact, bounded summary of the user's month is turned into a prompt and sent to a
//! [`TextProvider`] exactly once, under a timeout. Any failure degrades to
//! [`Insights::Unavailable`] so the page around the panel still renders.

pub mod providers;

use crate::config::InsightsSettings;
use crate::services::aggregation::{BudgetStatus, CategorySummary, MonthBucket, Totals};
use crate::services::metrics::INSIGHTS_TOTAL;
use providers::gemini::{GeminiConfig, GeminiTextProvider};
use providers::{GenerationParams, ProviderError, TextProvider};
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

/// Hard cap on the prompt sent upstream.
pub const MAX_PROMPT_CHARS: usize = 4000;
/// Cap on the user's own question inside the prompt.
pub const MAX_QUESTION_CHARS: usize = 500;
/// Categories listed in the prompt, highest spend first.
pub const MAX_PROMPT_CATEGORIES: usize = 8;

/// Aggregates the prompt is built from. Never contains raw entries.
#[derive(Debug, Clone, Default)]
pub struct SpendingSnapshot {
    pub month_label: String,
    pub totals: Totals,
    /// (category, expense) sorted by expense descending.
    pub top_categories: Vec<(String, Decimal)>,
    pub trend: Vec<MonthBucket>,
    /// (scope, amount over the limit).
    pub over_budget: Vec<(String, Decimal)>,
}

impl SpendingSnapshot {
    pub fn build(
        month_label: impl Into<String>,
        totals: Totals,
        breakdown: &[CategorySummary],
        statuses: &[BudgetStatus],
        trend: Vec<MonthBucket>,
    ) -> Self {
        let mut top_categories: Vec<(String, Decimal)> = breakdown
            .iter()
            .filter(|c| c.expense > Decimal::ZERO)
            .map(|c| (c.name.clone(), c.expense))
            .collect();
        top_categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_categories.truncate(MAX_PROMPT_CATEGORIES);

        let over_budget = statuses
            .iter()
            .filter(|s| s.is_over())
            .map(|s| (s.label.clone(), -s.remaining()))
            .collect();

        Self {
            month_label: month_label.into(),
            totals,
            top_categories,
            trend,
            over_budget,
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Builds the prompt, never longer than [`MAX_PROMPT_CHARS`] characters.
pub fn build_prompt(snapshot: &SpendingSnapshot, question: Option<&str>) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "You are a friendly personal finance coach. Using only the figures below, give three \
         short, concrete suggestions to improve this person's budget. Plain text, no tables.\n\n",
    );

    let _ = writeln!(prompt, "Month: {}", snapshot.month_label);
    let _ = writeln!(
        prompt,
        "Income: {:.2}; Expenses: {:.2}; Net: {:.2}",
        snapshot.totals.income,
        snapshot.totals.expense,
        snapshot.totals.net()
    );

    if !snapshot.top_categories.is_empty() {
        prompt.push_str("Top spending categories:\n");
        for (name, amount) in &snapshot.top_categories {
            let _ = writeln!(prompt, "- {}: {:.2}", truncate_chars(name, 50), amount);
        }
    }

    if !snapshot.over_budget.is_empty() {
        prompt.push_str("Over budget:\n");
        for (scope, over) in &snapshot.over_budget {
            let _ = writeln!(prompt, "- {} by {:.2}", truncate_chars(scope, 50), over);
        }
    }

    if !snapshot.trend.is_empty() {
        prompt.push_str("Last months (income / expenses):\n");
        for bucket in &snapshot.trend {
            let _ = writeln!(
                prompt,
                "- {}: {:.2} / {:.2}",
                bucket.label(),
                bucket.income,
                bucket.expense
            );
        }
    }

    if let Some(question) = question.map(str::trim).filter(|q| !q.is_empty()) {
        let _ = write!(
            prompt,
            "\nThe user asks: \"{}\"\nAnswer the question directly, using the figures above.",
            truncate_chars(question, MAX_QUESTION_CHARS)
        );
    }

    truncate_chars(&prompt, MAX_PROMPT_CHARS).to_string()
}

/// Why insights could not be produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// No API key configured or the feature switched off.
    Disabled,
    Timeout,
    /// Rate limited or out of quota.
    Quota,
    /// Key rejected upstream.
    Auth,
    Upstream,
}

impl UnavailableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Timeout => "timeout",
            Self::Quota => "quota",
            Self::Auth => "auth",
            Self::Upstream => "upstream",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Disabled => "AI tips are not configured.",
            _ => "Insights are unavailable right now.",
        }
    }
}

impl From<&ProviderError> for UnavailableReason {
    fn from(err: &ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured(_) => Self::Disabled,
            ProviderError::RateLimited => Self::Quota,
            ProviderError::Unauthorized(_) => Self::Auth,
            ProviderError::Timeout => Self::Timeout,
            ProviderError::ApiError(_)
            | ProviderError::ContentFiltered
            | ProviderError::NetworkError(_) => Self::Upstream,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insights {
    Available(String),
    Unavailable(UnavailableReason),
}

impl Insights {
    fn outcome(&self) -> &'static str {
        match self {
            Insights::Available(_) => "available",
            Insights::Unavailable(reason) => reason.as_str(),
        }
    }
}

/// Time-bounded, never-retried access to the configured provider.
#[derive(Clone)]
pub struct InsightsService {
    provider: Option<Arc<dyn TextProvider>>,
    timeout: Duration,
    params: GenerationParams,
}

impl InsightsService {
    pub fn new(provider: Arc<dyn TextProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
            params: GenerationParams {
                temperature: Some(0.4),
                max_tokens: Some(400),
            },
        }
    }

    pub fn disabled() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(1),
            params: GenerationParams::default(),
        }
    }

    /// Gemini when enabled with a key, otherwise disabled.
    pub fn from_settings(settings: &InsightsSettings) -> Result<Self, ProviderError> {
        let api_key = match (&settings.api_key, settings.enabled) {
            (Some(key), true) => key.clone(),
            _ => {
                tracing::info!("Insights disabled: no API key configured");
                return Ok(Self::disabled());
            }
        };

        let timeout = Duration::from_secs(settings.timeout_seconds.max(1));
        let provider = GeminiTextProvider::new(GeminiConfig::new(api_key, &settings.model, timeout))?;

        let mut service = Self::new(Arc::new(provider), timeout);
        service.params.max_tokens = Some(settings.max_output_tokens);
        Ok(service)
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Produces tips for `snapshot`, answering `question` when given.
    pub async fn generate(&self, snapshot: &SpendingSnapshot, question: Option<&str>) -> Insights {
        let insights = match &self.provider {
            None => Insights::Unavailable(UnavailableReason::Disabled),
            Some(provider) => {
                let prompt = build_prompt(snapshot, question);
                match tokio::time::timeout(self.timeout, provider.generate(&prompt, &self.params))
                    .await
                {
                    Err(_) => {
                        tracing::warn!(
                            provider = provider.name(),
                            timeout_ms = self.timeout.as_millis() as u64,
                            "Insights request timed out"
                        );
                        Insights::Unavailable(UnavailableReason::Timeout)
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(provider = provider.name(), error = %e, "Insights request failed");
                        Insights::Unavailable(UnavailableReason::from(&e))
                    }
                    Ok(Ok(response)) => match response.text {
                        Some(text) => {
                            tracing::debug!(
                                input_tokens = response.input_tokens,
                                output_tokens = response.output_tokens,
                                "Insights generated"
                            );
                            Insights::Available(text.trim().to_string())
                        }
                        None => Insights::Unavailable(UnavailableReason::Upstream),
                    },
                }
            }
        };

        INSIGHTS_TOTAL.with_label_values(&[insights.outcome()]).inc();
        insights
    }
}
