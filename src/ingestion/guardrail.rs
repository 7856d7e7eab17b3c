//! Posting eligibility guardrail
//!
//! Pure policy decision for whether a repository may post. Precedence is
//! fixed: privacy outranks missing settings, which outranks the
//! activation switch. Deduplication is a separate concern and never
//! consults this policy.

use crate::models::repository_settings;

/// Outcome of a guardrail evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationDecision {
    pub can_post: bool,
    /// Reason code when posting is refused
    pub reason: Option<&'static str>,
}

impl ActivationDecision {
    fn refused(reason: &'static str) -> Self {
        Self {
            can_post: false,
            reason: Some(reason),
        }
    }
}

/// Evaluates whether a repository is eligible to post.
pub fn evaluate_repository_activation(
    is_private: bool,
    settings: Option<&repository_settings::Model>,
) -> ActivationDecision {
    if is_private {
        return ActivationDecision::refused("repository_private_unsupported");
    }

    let Some(settings) = settings else {
        return ActivationDecision::refused("repository_settings_missing");
    };

    if !settings.is_active {
        return ActivationDecision::refused("repository_inactive");
    }

    ActivationDecision {
        can_post: true,
        reason: None,
    }
}

/// Ledger text for a duplicate-delivery skip.
pub fn duplicate_skip_message(source_key: &str) -> String {
    format!("Duplicate event skipped: {}", source_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn settings(is_active: bool) -> repository_settings::Model {
        let now = Utc::now();
        repository_settings::Model {
            id: Uuid::new_v4(),
            repository_id: Uuid::new_v4(),
            is_active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn private_outranks_everything() {
        let active = settings(true);
        let decision = evaluate_repository_activation(true, Some(&active));
        assert!(!decision.can_post);
        assert_eq!(decision.reason, Some("repository_private_unsupported"));

        let decision = evaluate_repository_activation(true, None);
        assert_eq!(decision.reason, Some("repository_private_unsupported"));
    }

    #[test]
    fn missing_settings_refused() {
        let decision = evaluate_repository_activation(false, None);
        assert!(!decision.can_post);
        assert_eq!(decision.reason, Some("repository_settings_missing"));
    }

    #[test]
    fn inactive_refused() {
        let inactive = settings(false);
        let decision = evaluate_repository_activation(false, Some(&inactive));
        assert!(!decision.can_post);
        assert_eq!(decision.reason, Some("repository_inactive"));
    }

    #[test]
    fn active_public_repository_may_post() {
        let active = settings(true);
        let decision = evaluate_repository_activation(false, Some(&active));
        assert!(decision.can_post);
        assert_eq!(decision.reason, None);
    }

    #[test]
    fn duplicate_skip_message_embeds_key() {
        assert_eq!(
            duplicate_skip_message("release:42:published"),
            "Duplicate event skipped: release:42:published"
        );
    }
}
