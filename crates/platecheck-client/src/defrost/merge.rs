use platecheck_core::error::AppError;
use platecheck_core::models::SourceResult;

/// Combine the two sub-source outcomes into one.
///
/// Matches win over everything else and are merged field by field. Without
/// a match, an error outranks a clean miss, which outranks a skip. The
/// result does not depend on argument order.
pub fn merge_outcomes(a: SourceResult, b: SourceResult) -> SourceResult {
    use SourceResult::*;

    match (a, b) {
        (Match(a), Match(b)) => Match(a.merge(b)),
        (Match(record), other) | (other, Match(record)) => {
            if let Some(e) = other.error() {
                tracing::warn!(error = %e, "Sub-source failed, reporting the other's match");
            }
            Match(record)
        }
        (Error(a), Error(b)) => {
            let mut errors = vec![a, b];
            errors.sort_by_cached_key(ToString::to_string);
            Error(AppError::Aggregate(errors))
        }
        (Error(e), _) | (_, Error(e)) => Error(e),
        (NoMatch, _) | (_, NoMatch) => NoMatch,
        (Skipped, Skipped) => Skipped,
    }
}
