use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{OutcomeKind, PlateCandidate, PlateRecord, SourceResult};
use crate::pending::PendingInteractions;
use crate::traits::PlateSource;

/// Which of the two configured sources a match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSlot {
    First,
    Second,
}

#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Upper bound for one source's search or detail fetch.
    pub source_timeout: Duration,
    /// How long matched records stay available for an expand.
    pub retention: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            source_timeout: Duration::from_secs(45),
            retention: Duration::from_secs(3600),
        }
    }
}

/// One source's line in a summary.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source: &'static str,
    pub result: SourceResult,
}

/// Aggregated answer to a search. Lists every source, in a fixed order.
#[derive(Debug)]
pub struct Summary {
    pub candidate: PlateCandidate,
    /// Set when something matched; pass it to [`LookupService::expand`].
    pub interaction: Option<Uuid>,
    pub sources: Vec<SourceOutcome>,
}

impl Summary {
    pub fn any_match(&self) -> bool {
        self.sources
            .iter()
            .any(|s| s.result.kind() == OutcomeKind::Matched)
    }
}

#[derive(Debug)]
pub struct DetailOutcome {
    pub source: &'static str,
    pub result: Result<PlateRecord, AppError>,
}

/// Full records fetched for the sources that matched.
#[derive(Debug)]
pub struct DetailReport {
    pub candidate: PlateCandidate,
    pub sources: Vec<DetailOutcome>,
    /// True when every detail fetch failed and the matches are still available.
    pub retained: bool,
}

/// Events emitted by the lookup service for monitoring/logging.
#[derive(Debug, Clone)]
pub enum LookupEvent<'a> {
    SearchStarted {
        plate: &'a str,
    },
    SourceFinished {
        source: &'static str,
        outcome: OutcomeKind,
        elapsed: Duration,
    },
    SourceTimedOut {
        source: &'static str,
        after: Duration,
    },
    Summarized {
        plate: &'a str,
        matched: usize,
        interaction: Option<Uuid>,
    },
    ExpandIgnored {
        interaction: Uuid,
    },
    DetailFinished {
        source: &'static str,
        error: Option<&'a AppError>,
    },
    ExpandRetained {
        interaction: Uuid,
    },
}

/// Trait for receiving lookup events (decoupled logging).
pub trait LookupReporter: Send + Sync {
    fn report(&self, event: LookupEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLookupReporter;

impl LookupReporter for TracingLookupReporter {
    fn report(&self, event: LookupEvent<'_>) {
        match event {
            LookupEvent::SearchStarted { plate } => {
                tracing::info!(%plate, "Looking up plate");
            }
            LookupEvent::SourceFinished {
                source,
                outcome,
                elapsed,
            } => {
                tracing::debug!(
                    %source,
                    %outcome,
                    elapsed_ms = %elapsed.as_millis(),
                    "Source finished"
                );
            }
            LookupEvent::SourceTimedOut { source, after } => {
                tracing::warn!(%source, after_secs = %after.as_secs(), "Source timed out");
            }
            LookupEvent::Summarized {
                plate,
                matched,
                interaction,
            } => {
                tracing::info!(%plate, matched, ?interaction, "Lookup summarized");
            }
            LookupEvent::ExpandIgnored { interaction } => {
                tracing::debug!(%interaction, "Expand for unknown or expired interaction");
            }
            LookupEvent::DetailFinished { source, error } => match error {
                None => tracing::info!(%source, "Detail fetched"),
                Some(e) => tracing::warn!(%source, error = %e, "Detail fetch failed"),
            },
            LookupEvent::ExpandRetained { interaction } => {
                tracing::info!(
                    %interaction,
                    "All detail fetches failed, keeping matches for retry"
                );
            }
        }
    }
}

/// Fans a plate out to two independent sources and handles follow-up expands.
///
/// Generic over both sources so tests can inject mocks.
pub struct LookupService<A, B>
where
    A: PlateSource,
    B: PlateSource,
{
    first: A,
    second: B,
    pending: PendingInteractions,
    config: LookupConfig,
}

impl<A, B> LookupService<A, B>
where
    A: PlateSource,
    B: PlateSource,
{
    pub fn new(first: A, second: B, config: LookupConfig) -> Self {
        Self {
            pending: PendingInteractions::new(config.retention),
            first,
            second,
            config,
        }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }

    pub fn config(&self) -> &LookupConfig {
        &self.config
    }

    /// Query both sources concurrently and summarize.
    ///
    /// Returns only after both settled; neither source can fail the other.
    pub async fn search<R: LookupReporter>(
        &self,
        candidate: PlateCandidate,
        reporter: &R,
    ) -> Summary {
        reporter.report(LookupEvent::SearchStarted {
            plate: candidate.as_str(),
        });

        let (first, second) = tokio::join!(
            self.bounded_search(&self.first, &candidate, reporter),
            self.bounded_search(&self.second, &candidate, reporter),
        );

        let mut matches = Vec::new();
        if let SourceResult::Match(record) = &first {
            matches.push((SourceSlot::First, record.clone()));
        }
        if let SourceResult::Match(record) = &second {
            matches.push((SourceSlot::Second, record.clone()));
        }

        let matched = matches.len();
        let interaction = if matches.is_empty() {
            None
        } else {
            Some(self.pending.insert(candidate.clone(), matches).await)
        };

        reporter.report(LookupEvent::Summarized {
            plate: candidate.as_str(),
            matched,
            interaction,
        });

        Summary {
            candidate,
            interaction,
            sources: vec![
                SourceOutcome {
                    source: self.first.name(),
                    result: first,
                },
                SourceOutcome {
                    source: self.second.name(),
                    result: second,
                },
            ],
        }
    }

    /// Fetch full detail for every source that matched in the given interaction.
    ///
    /// Unknown, expired, or already-expanded interactions return `None` without
    /// touching the network.
    pub async fn expand<R: LookupReporter>(
        &self,
        interaction: Uuid,
        reporter: &R,
    ) -> Option<DetailReport> {
        let Some(pending) = self.pending.take(interaction).await else {
            reporter.report(LookupEvent::ExpandIgnored { interaction });
            return None;
        };

        let record_for = |slot: SourceSlot| {
            pending
                .matches
                .iter()
                .find(|(s, _)| *s == slot)
                .map(|(_, record)| record)
        };

        let (first, second) = tokio::join!(
            self.bounded_detail(&self.first, record_for(SourceSlot::First)),
            self.bounded_detail(&self.second, record_for(SourceSlot::Second)),
        );

        let sources: Vec<DetailOutcome> = [(self.first.name(), first), (self.second.name(), second)]
            .into_iter()
            .filter_map(|(source, result)| Some(DetailOutcome { source, result: result? }))
            .collect();

        for outcome in &sources {
            reporter.report(LookupEvent::DetailFinished {
                source: outcome.source,
                error: outcome.result.as_ref().err(),
            });
        }

        let retained = !sources.is_empty() && sources.iter().all(|s| s.result.is_err());
        if retained {
            reporter.report(LookupEvent::ExpandRetained { interaction });
            self.pending.restore(interaction, pending.clone()).await;
        }

        Some(DetailReport {
            candidate: pending.candidate.clone(),
            sources,
            retained,
        })
    }

    async fn bounded_search<S: PlateSource, R: LookupReporter>(
        &self,
        source: &S,
        candidate: &PlateCandidate,
        reporter: &R,
    ) -> SourceResult {
        let started = Instant::now();
        let timeout = self.config.source_timeout;
        let result = match tokio::time::timeout(timeout, source.search(candidate)).await {
            Ok(result) => result,
            Err(_) => {
                reporter.report(LookupEvent::SourceTimedOut {
                    source: source.name(),
                    after: timeout,
                });
                SourceResult::Error(AppError::Timeout(timeout.as_secs()))
            }
        };
        reporter.report(LookupEvent::SourceFinished {
            source: source.name(),
            outcome: result.kind(),
            elapsed: started.elapsed(),
        });
        result
    }

    async fn bounded_detail<S: PlateSource>(
        &self,
        source: &S,
        record: Option<&PlateRecord>,
    ) -> Option<Result<PlateRecord, AppError>> {
        let record = record?;
        let timeout = self.config.source_timeout;
        Some(
            tokio::time::timeout(timeout, source.fetch_detail(record))
                .await
                .unwrap_or(Err(AppError::Timeout(timeout.as_secs()))),
        )
    }
}
