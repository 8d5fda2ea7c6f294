//! Source-specific webhook normalizers
//!
//! Each source has a normalizer module that implements
//! the [`WebhookNormalizer`](super::WebhookNormalizer) trait.
//!
//! | Source | Module | Event types |
//! |--------|--------|-------------|
//! | GitHub | [`github`] | `push`, `pull_request`, `deployment_status` |
//! | GitLab | [`gitlab`] | `Push Hook`, `Merge Request Hook`, `Deployment Hook` |
//! | Manual | [`manual`] | any [`EventKind`](crate::types::EventKind) name |

mod github;
mod gitlab;
mod manual;

pub use github::GitHubNormalizer;
pub use gitlab::GitLabNormalizer;
pub use manual::ManualNormalizer;

use super::WebhookNormalizer;
use crate::types::Source;

/// Create all available normalizers.
pub fn create_all_normalizers() -> Vec<Box<dyn WebhookNormalizer>> {
    [Source::Github, Source::Gitlab, Source::Manual]
        .into_iter()
        .map(normalizer_for)
        .collect()
}

/// Get the normalizer for a specific source.
pub fn normalizer_for(source: Source) -> Box<dyn WebhookNormalizer> {
    match source {
        Source::Github => Box::new(GitHubNormalizer::new()),
        Source::Gitlab => Box::new(GitLabNormalizer::new()),
        Source::Manual => Box::new(ManualNormalizer::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_all_normalizers_covers_every_source() {
        let normalizers = create_all_normalizers();
        for source in [Source::Github, Source::Gitlab, Source::Manual] {
            assert!(normalizers.iter().any(|n| n.source() == source));
        }
    }

    #[test]
    fn test_normalizer_for() {
        assert_eq!(normalizer_for(Source::Gitlab).source(), Source::Gitlab);
    }
}
