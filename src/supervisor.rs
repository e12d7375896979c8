//! Verification and bounded retry.
//!
//! The document is the source of truth: after applying a selection the
//! supervisor checks that the expected links are actually present and, if
//! they are not, re-runs the full resolve-and-apply cycle with a fixed
//! back-off until the retry ceiling is reached.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::document::{LinkCategory, StyleDocument};
use crate::error::SkinError;

/// What the document is expected to contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedSelection {
    pub skin: Option<String>,
    /// Whether the skin resolves to at least one stylesheet.
    pub skin_declares_urls: bool,
    pub theme: Option<String>,
    pub color_scheme: Option<String>,
}

/// A missing piece of the expected selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationIssue {
    MissingSkin(String),
    MissingTheme(String),
    MissingColorScheme(String),
}

impl fmt::Display for VerificationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSkin(name) => write!(f, "no stylesheet for skin '{}'", name),
            Self::MissingTheme(name) => write!(f, "no stylesheet for theme '{}'", name),
            Self::MissingColorScheme(name) => {
                write!(f, "no stylesheet for color scheme '{}'", name)
            }
        }
    }
}

/// Compare the document against `expected`.
pub fn verify(doc: &dyn StyleDocument, expected: &ExpectedSelection) -> Vec<VerificationIssue> {
    let links = doc.links();
    let mut issues = Vec::new();

    if let Some(skin) = &expected.skin {
        if expected.skin_declares_urls
            && !links
                .iter()
                .any(|l| l.is(LinkCategory::Skin) && l.owned_by(skin))
        {
            issues.push(VerificationIssue::MissingSkin(skin.clone()));
        }
    }
    if let Some(theme) = &expected.theme {
        if !links.iter().any(|l| l.is(LinkCategory::Theme)) {
            issues.push(VerificationIssue::MissingTheme(theme.clone()));
        }
    }
    if let Some(scheme) = &expected.color_scheme {
        if !links.iter().any(|l| l.is(LinkCategory::ColorScheme)) {
            issues.push(VerificationIssue::MissingColorScheme(scheme.clone()));
        }
    }
    issues
}

/// Something the supervisor can check and re-apply.
#[async_trait]
pub trait Settle: Send {
    /// Problems with the current document, empty when settled.
    fn verify(&self) -> Vec<VerificationIssue>;
    /// Rebuild tracking from the document and run resolve-and-apply again.
    async fn reapply(&mut self);
}

/// How verification ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Document matched after `retries` re-apply cycles.
    Settled { retries: u32 },
    /// Still wrong after the retry ceiling.
    GaveUp {
        retries: u32,
        issues: Vec<VerificationIssue>,
    },
}

impl SettleOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// Fixed back-off retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Supervisor {
    retry_limit: u32,
    backoff: Duration,
}

impl Supervisor {
    pub fn new(retry_limit: u32, backoff: Duration) -> Self {
        Self {
            retry_limit,
            backoff,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retry_limit, config.retry_backoff())
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Verify `target`, re-applying until it settles or retries run out.
    pub async fn verify_and_settle<T>(&self, target: &mut T) -> SettleOutcome
    where
        T: Settle + ?Sized,
    {
        let mut retries = 0;
        loop {
            let issues = target.verify();
            if issues.is_empty() {
                if retries > 0 {
                    info!(retries, "Document settled after retry");
                } else {
                    debug!("Document verified");
                }
                return SettleOutcome::Settled { retries };
            }

            if retries >= self.retry_limit {
                let summary = issues
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                let e = SkinError::Verification(summary);
                warn!(retries, error = %e, "Giving up on verification");
                return SettleOutcome::GaveUp { retries, issues };
            }

            retries += 1;
            debug!(
                attempt = retries,
                limit = self.retry_limit,
                issues = issues.len(),
                "Verification failed, retrying"
            );
            tokio::time::sleep(self.backoff).await;
            target.reapply().await;
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{HeadDocument, InsertPosition, NewLink};

    /// Settles once `reapply` has run `heal_after` times.
    struct Flaky {
        heal_after: u32,
        reapplied: u32,
    }

    #[async_trait]
    impl Settle for Flaky {
        fn verify(&self) -> Vec<VerificationIssue> {
            if self.reapplied >= self.heal_after {
                Vec::new()
            } else {
                vec![VerificationIssue::MissingSkin("S".to_string())]
            }
        }

        async fn reapply(&mut self) {
            self.reapplied += 1;
        }
    }

    fn link(doc: &mut HeadDocument, href: &str, category: LinkCategory, owner: &str) {
        doc.insert(
            NewLink {
                href: href.to_string(),
                category,
                owner: Some(owner.to_string()),
            },
            InsertPosition::Append,
        );
    }

    #[test]
    fn test_verify_reports_missing_links() {
        let mut doc = HeadDocument::new();
        link(&mut doc, "a.css", LinkCategory::Skin, "Other");
        let expected = ExpectedSelection {
            skin: Some("S".to_string()),
            skin_declares_urls: true,
            theme: Some("Dark".to_string()),
            color_scheme: None,
        };
        assert_eq!(
            verify(&doc, &expected),
            vec![
                VerificationIssue::MissingSkin("S".to_string()),
                VerificationIssue::MissingTheme("Dark".to_string()),
            ]
        );

        link(&mut doc, "s.css", LinkCategory::Skin, "S");
        link(&mut doc, "t.css", LinkCategory::Theme, "Dark");
        assert!(verify(&doc, &expected).is_empty());
    }

    #[test]
    fn test_urlless_skin_needs_no_link() {
        let doc = HeadDocument::new();
        let expected = ExpectedSelection {
            skin: Some("Default".to_string()),
            ..Default::default()
        };
        assert!(verify(&doc, &expected).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_after_retries() {
        let supervisor = Supervisor::new(10, Duration::from_millis(500));
        let mut target = Flaky {
            heal_after: 3,
            reapplied: 0,
        };
        let start = tokio::time::Instant::now();

        let outcome = supervisor.verify_and_settle(&mut target).await;
        assert_eq!(outcome, SettleOutcome::Settled { retries: 3 });
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_limit() {
        let supervisor = Supervisor::new(4, Duration::from_millis(500));
        let mut target = Flaky {
            heal_after: u32::MAX,
            reapplied: 0,
        };

        let outcome = supervisor.verify_and_settle(&mut target).await;
        assert!(!outcome.is_settled());
        assert!(matches!(outcome, SettleOutcome::GaveUp { retries: 4, .. }));
        assert_eq!(target.reapplied, 4);
    }

    #[tokio::test]
    async fn test_already_settled_does_not_sleep() {
        let supervisor = Supervisor::default();
        let mut target = Flaky {
            heal_after: 0,
            reapplied: 0,
        };
        assert_eq!(
            supervisor.verify_and_settle(&mut target).await,
            SettleOutcome::Settled { retries: 0 }
        );
        assert_eq!(supervisor.retry_limit(), 10);
    }
}
