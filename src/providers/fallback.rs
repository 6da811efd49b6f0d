//! Ordered iteration over fallback candidates (model identifiers).
//!
//! Each candidate is attempted strictly after the previous one failed. The
//! state is `{remaining, last_error}`; every attempt either terminates the
//! chain with a success or advances it with a new last error. Running out of
//! candidates terminates with the last recorded error.

use crate::models::AnalysisError;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;

/// Outcome of trying a single candidate.
#[derive(Debug)]
pub(crate) enum Attempt<T> {
    Success(T),
    Advance(AnalysisError),
}

/// Every candidate failed.
#[derive(Debug)]
pub(crate) struct Exhausted<C> {
    pub tried: Vec<C>,
    pub last_error: Option<(C, AnalysisError)>,
}

impl<C: fmt::Display> Exhausted<C> {
    /// `Last error from <candidate>: <message>` for failure details.
    pub fn describe(&self) -> String {
        match &self.last_error {
            Some((candidate, error)) => format!("Last error from {}: {}", candidate, error.message),
            None => "No candidates were available".to_string(),
        }
    }

    pub fn last_status(&self) -> Option<u16> {
        self.last_error.as_ref().and_then(|(_, e)| e.status)
    }
}

pub(crate) struct FallbackChain<C> {
    remaining: VecDeque<C>,
    tried: Vec<C>,
    last_error: Option<(C, AnalysisError)>,
}

impl<C: Clone + fmt::Display> FallbackChain<C> {
    pub fn new(candidates: impl IntoIterator<Item = C>) -> Self {
        Self {
            remaining: candidates.into_iter().collect(),
            tried: Vec::new(),
            last_error: None,
        }
    }

    pub async fn run<T, F, Fut>(
        mut self,
        label: &str,
        mut try_candidate: F,
    ) -> Result<(C, T), Exhausted<C>>
    where
        F: FnMut(C) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        while let Some(candidate) = self.remaining.pop_front() {
            self.tried.push(candidate.clone());
            match try_candidate(candidate.clone()).await {
                Attempt::Success(value) => {
                    tracing::debug!(provider = label, candidate = %candidate, "Candidate succeeded");
                    return Ok((candidate, value));
                }
                Attempt::Advance(error) => {
                    tracing::debug!(
                        provider = label,
                        candidate = %candidate,
                        error = %error,
                        remaining = self.remaining.len(),
                        "Candidate failed, advancing"
                    );
                    self.last_error = Some((candidate, error));
                }
            }
        }

        Err(Exhausted {
            tried: self.tried,
            last_error: self.last_error,
        })
    }
}
