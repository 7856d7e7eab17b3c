//! Post text composition
//!
//! Deterministic message generation: a label line derived from the event
//! kind, the target URL, and up to three normalized topic hashtags. No
//! randomness and no model calls; the same event always yields the same
//! text.

use crate::models::EventType;

const MAX_HASHTAGS: usize = 3;
const MAX_TAG_LENGTH: usize = 30;

/// Inputs for one composed post
#[derive(Debug, Clone)]
pub struct ComposeParams<'a> {
    pub event_type: EventType,
    pub project_name: &'a str,
    pub repo_url: &'a str,
    pub topics: &'a [String],
    pub release_tag: Option<&'a str>,
}

/// Normalizes repository topics into hashtags.
///
/// Topics are lowercased, stripped to `[a-z0-9-]`, dropped when empty,
/// over-length, or prefixed `private`/`internal`, capped at three, then
/// rendered with hyphens removed. Duplicates after hyphen removal are
/// collapsed, keeping first occurrence order.
pub fn normalize_topics_to_hashtags(topics: &[String]) -> Vec<String> {
    let tags = topics
        .iter()
        .map(|topic| topic.trim().to_lowercase())
        .map(|topic| {
            topic
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect::<String>()
        })
        .filter(|topic| !topic.is_empty() && topic.len() <= MAX_TAG_LENGTH)
        .filter(|topic| !topic.starts_with("private") && !topic.starts_with("internal"))
        .take(MAX_HASHTAGS)
        .map(|topic| format!("#{}", topic.replace('-', "")));

    let mut unique: Vec<String> = Vec::new();
    for tag in tags {
        if !unique.contains(&tag) {
            unique.push(tag);
        }
    }
    unique
}

fn event_label(event_type: EventType, tag: Option<&str>) -> String {
    match event_type {
        EventType::FirstPublicRelease => "First public release".to_string(),
        EventType::MajorVersion => format!("{} released", tag.unwrap_or("Major version")),
        EventType::VersionTag => format!("{} tagged", tag.unwrap_or("Version tag")),
        EventType::ReleasePublished => "New release".to_string(),
    }
}

/// Composes the post text for an event.
pub fn compose_post(params: ComposeParams<'_>) -> String {
    let header = format!(
        "{}: {}",
        event_label(params.event_type, params.release_tag),
        params.project_name
    );
    let hashtags = normalize_topics_to_hashtags(params.topics);
    let suffix = if hashtags.is_empty() {
        String::new()
    } else {
        format!("\n{}", hashtags.join(" "))
    };

    format!("{}\n{}{}", header, params.repo_url, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn hashtags_drop_guarded_and_overlong_topics() {
        let topics = topics(&[
            "typescript",
            "dev-tools",
            "internal-ops",
            "very-very-very-very-very-very-long-topic",
        ]);

        assert_eq!(
            normalize_topics_to_hashtags(&topics),
            vec!["#typescript".to_string(), "#devtools".to_string()]
        );
    }

    #[test]
    fn hashtags_lowercase_and_strip_punctuation() {
        let topics = topics(&["Rust!", "  Async/Await  "]);
        assert_eq!(
            normalize_topics_to_hashtags(&topics),
            vec!["#rust".to_string(), "#asyncawait".to_string()]
        );
    }

    #[test]
    fn hashtags_cap_at_three_before_dedupe() {
        let topics = topics(&["alpha", "beta", "gamma", "delta"]);
        assert_eq!(
            normalize_topics_to_hashtags(&topics),
            vec![
                "#alpha".to_string(),
                "#beta".to_string(),
                "#gamma".to_string()
            ]
        );
    }

    #[test]
    fn hashtags_collapse_after_hyphen_removal() {
        // "dev-tools" and "devtools" render identically
        let topics = topics(&["dev-tools", "devtools"]);
        assert_eq!(
            normalize_topics_to_hashtags(&topics),
            vec!["#devtools".to_string()]
        );
    }

    #[test]
    fn hashtags_private_prefix_dropped() {
        let topics = topics(&["private-beta", "privateer", "public-api"]);
        assert_eq!(
            normalize_topics_to_hashtags(&topics),
            vec!["#publicapi".to_string()]
        );
    }

    #[test]
    fn release_text_has_label_url_and_tags() {
        let text = compose_post(ComposeParams {
            event_type: EventType::ReleasePublished,
            project_name: "announcer",
            repo_url: "https://github.com/acme/announcer",
            topics: &["rust".to_string()],
            release_tag: Some("v1.2.0"),
        });

        assert_eq!(
            text,
            "New release: announcer\nhttps://github.com/acme/announcer\n#rust"
        );
    }

    #[test]
    fn major_version_label_uses_tag() {
        let text = compose_post(ComposeParams {
            event_type: EventType::MajorVersion,
            project_name: "announcer",
            repo_url: "https://example.com/r",
            topics: &[],
            release_tag: Some("v2.0.0"),
        });

        assert_eq!(text, "v2.0.0 released: announcer\nhttps://example.com/r");
    }

    #[test]
    fn labels_fall_back_without_tag() {
        let major = compose_post(ComposeParams {
            event_type: EventType::MajorVersion,
            project_name: "p",
            repo_url: "u",
            topics: &[],
            release_tag: None,
        });
        assert!(major.starts_with("Major version released: p"));

        let tag = compose_post(ComposeParams {
            event_type: EventType::VersionTag,
            project_name: "p",
            repo_url: "u",
            topics: &[],
            release_tag: None,
        });
        assert!(tag.starts_with("Version tag tagged: p"));

        let first = compose_post(ComposeParams {
            event_type: EventType::FirstPublicRelease,
            project_name: "p",
            repo_url: "u",
            topics: &[],
            release_tag: Some("v1.0.0"),
        });
        assert!(first.starts_with("First public release: p"));
    }

    #[test]
    fn no_topics_means_no_trailing_line() {
        let text = compose_post(ComposeParams {
            event_type: EventType::ReleasePublished,
            project_name: "bare",
            repo_url: "https://example.com",
            topics: &[],
            release_tag: None,
        });

        assert_eq!(text, "New release: bare\nhttps://example.com");
        assert!(!text.ends_with('\n'));
    }
}
