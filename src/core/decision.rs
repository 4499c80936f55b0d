//! Duplicate handling decisions for the `ask` policy.

use crate::models::plan::Classification;
use crate::models::record::RecordId;
use futures::future::BoxFuture;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// A question about one conflicting destination.
#[derive(Debug, Clone)]
pub struct DuplicateQuestion {
    pub id: RecordId,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub classification: Classification,
}

/// Answer to a [`DuplicateQuestion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateDecision {
    Skip,
    Overwrite,
    Rename,
}

/// Supplies decisions for the `ask` policy.
///
/// Only the asking record waits for the answer; records in other folders
/// keep planning.
pub trait DecisionProvider: Send + Sync {
    fn decide<'a>(&'a self, question: &'a DuplicateQuestion) -> BoxFuture<'a, DuplicateDecision>;
}

/// Answers every question the same way. Used for headless runs.
#[derive(Debug, Clone, Copy)]
pub struct AutoDecision(pub DuplicateDecision);

impl Default for AutoDecision {
    fn default() -> Self {
        Self(DuplicateDecision::Skip)
    }
}

impl DecisionProvider for AutoDecision {
    fn decide<'a>(&'a self, _question: &'a DuplicateQuestion) -> BoxFuture<'a, DuplicateDecision> {
        let decision = self.0;
        Box::pin(async move { decision })
    }
}

/// Asks on the terminal. Questions are asked one at a time.
#[derive(Debug, Default)]
pub struct PromptDecision {
    lock: tokio::sync::Mutex<()>,
}

impl PromptDecision {
    /// Create a new terminal prompt.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DecisionProvider for PromptDecision {
    fn decide<'a>(&'a self, question: &'a DuplicateQuestion) -> BoxFuture<'a, DuplicateDecision> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let prompt = format!(
                "{} already exists ({}) for {}.\n[s]kip, [o]verwrite, [r]ename? ",
                question.destination.display(),
                question.classification,
                question.source.display()
            );

            let answer = tokio::task::spawn_blocking(move || {
                let mut stdout = std::io::stdout();
                let _ = write!(stdout, "{}", prompt);
                let _ = stdout.flush();
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line).map(|_| line)
            })
            .await;

            match answer {
                Ok(Ok(line)) => parse_answer(&line),
                _ => {
                    tracing::warn!(
                        "No answer for {}, skipping",
                        question.source.display()
                    );
                    DuplicateDecision::Skip
                }
            }
        })
    }
}

fn parse_answer(line: &str) -> DuplicateDecision {
    match line.trim().to_lowercase().as_str() {
        "o" | "overwrite" => DuplicateDecision::Overwrite,
        "r" | "rename" => DuplicateDecision::Rename,
        _ => DuplicateDecision::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_auto_decision() {
        let question = DuplicateQuestion {
            id: RecordId(0),
            source: PathBuf::from("/a.jpg"),
            destination: PathBuf::from("/dest/a.jpg"),
            classification: Classification::DuplicateContent,
        };
        assert_eq!(
            AutoDecision::default().decide(&question).await,
            DuplicateDecision::Skip
        );
        assert_eq!(
            AutoDecision(DuplicateDecision::Rename).decide(&question).await,
            DuplicateDecision::Rename
        );
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("o\n"), DuplicateDecision::Overwrite);
        assert_eq!(parse_answer(" Rename "), DuplicateDecision::Rename);
        assert_eq!(parse_answer(""), DuplicateDecision::Skip);
    }
}
