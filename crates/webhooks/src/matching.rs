//! Trigger evaluation. A config matches on its first matching enabled
//! trigger, at most once per message.

use {
    hermod_storage::{MatchType, TriggerType, WebhookConfig, WebhookTrigger},
    tracing::warn,
};

/// The message fields a trigger can inspect.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MatchInput<'a> {
    pub chat_address: &'a str,
    pub sender_address: &'a str,
    /// Bare `user` part of the sender address.
    pub sender_user: &'a str,
    pub text: &'a str,
    /// Normalized media kind; empty when the message has none.
    pub media_kind: &'a str,
}

/// First enabled trigger of an enabled config that matches, if any.
pub(crate) fn first_match<'c>(
    config: &'c WebhookConfig,
    input: &MatchInput<'_>,
) -> Option<&'c WebhookTrigger> {
    if !config.enabled {
        return None;
    }
    config
        .triggers
        .iter()
        .filter(|t| t.enabled)
        .find(|t| trigger_matches(t, input))
}

fn trigger_matches(trigger: &WebhookTrigger, input: &MatchInput<'_>) -> bool {
    match trigger.trigger_type {
        TriggerType::All => true,
        TriggerType::Chat => applies(trigger, input.chat_address),
        TriggerType::Sender => {
            applies(trigger, input.sender_address) || applies(trigger, input.sender_user)
        },
        TriggerType::Keyword => {
            if input.text.is_empty() {
                // An empty body can only match an empty value, and only
                // under the substring-style operators.
                return trigger.value.is_empty()
                    && matches!(trigger.match_type, MatchType::Exact | MatchType::Contains);
            }
            applies(trigger, input.text)
        },
        TriggerType::MediaKind => applies(trigger, input.media_kind),
    }
}

fn applies(trigger: &WebhookTrigger, candidate: &str) -> bool {
    match trigger.match_type {
        MatchType::Exact => candidate == trigger.value,
        MatchType::Contains => candidate
            .to_lowercase()
            .contains(&trigger.value.to_lowercase()),
        MatchType::Regex => match regex::Regex::new(&trigger.value) {
            Ok(re) => re.is_match(candidate),
            Err(e) => {
                // Validation compiles regexes at write time, so this only
                // fires for rows written by an older build.
                warn!(trigger_id = trigger.id, error = %e, "stored trigger regex does not compile");
                false
            },
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(
        id: i64,
        trigger_type: TriggerType,
        value: &str,
        match_type: MatchType,
        enabled: bool,
    ) -> WebhookTrigger {
        WebhookTrigger {
            id,
            config_id: 1,
            trigger_type,
            value: value.into(),
            match_type,
            enabled,
        }
    }

    fn config(enabled: bool, triggers: Vec<WebhookTrigger>) -> WebhookConfig {
        WebhookConfig {
            id: 1,
            name: "test".into(),
            target_url: "https://hooks.example/x".into(),
            secret: None,
            enabled,
            created_at: 0,
            updated_at: 0,
            triggers,
        }
    }

    fn input<'a>() -> MatchInput<'a> {
        MatchInput {
            chat_address: "111@individual",
            sender_address: "222@individual",
            sender_user: "222",
            text: "This is URGENT!",
            media_kind: "",
        }
    }

    #[test]
    fn all_matches_unconditionally() {
        let cfg = config(
            true,
            vec![trigger(1, TriggerType::All, "", MatchType::Exact, true)],
        );
        assert_eq!(first_match(&cfg, &input()).unwrap().id, 1);
    }

    #[test]
    fn disabled_config_never_matches() {
        let cfg = config(
            false,
            vec![trigger(1, TriggerType::All, "", MatchType::Exact, true)],
        );
        assert!(first_match(&cfg, &input()).is_none());
    }

    #[test]
    fn disabled_trigger_never_contributes() {
        let cfg = config(
            true,
            vec![
                trigger(1, TriggerType::All, "", MatchType::Exact, false),
                trigger(2, TriggerType::Keyword, "urgent", MatchType::Contains, true),
            ],
        );
        assert_eq!(first_match(&cfg, &input()).unwrap().id, 2);
    }

    #[test]
    fn first_matching_trigger_wins() {
        let cfg = config(
            true,
            vec![
                trigger(1, TriggerType::Keyword, "urgent", MatchType::Contains, true),
                trigger(2, TriggerType::All, "", MatchType::Exact, true),
            ],
        );
        assert_eq!(first_match(&cfg, &input()).unwrap().id, 1);
    }

    #[test]
    fn contains_is_case_insensitive() {
        let cfg = config(
            true,
            vec![trigger(1, TriggerType::Keyword, "Urgent", MatchType::Contains, true)],
        );
        assert!(first_match(&cfg, &input()).is_some());
    }

    #[test]
    fn exact_is_byte_equal() {
        let mut cfg = config(
            true,
            vec![trigger(1, TriggerType::Chat, "111@individual", MatchType::Exact, true)],
        );
        assert!(first_match(&cfg, &input()).is_some());

        cfg.triggers[0].value = "111@Individual".into();
        assert!(first_match(&cfg, &input()).is_none());
    }

    #[test]
    fn sender_matches_full_address_or_bare_user() {
        for value in ["222@individual", "222"] {
            let cfg = config(
                true,
                vec![trigger(1, TriggerType::Sender, value, MatchType::Exact, true)],
            );
            assert!(first_match(&cfg, &input()).is_some(), "value: {value}");
        }
    }

    #[test]
    fn keyword_regex_applies_full_semantics() {
        let cfg = config(
            true,
            vec![trigger(1, TriggerType::Keyword, r"(?i)^this is", MatchType::Regex, true)],
        );
        assert!(first_match(&cfg, &input()).is_some());
    }

    #[test]
    fn invalid_stored_regex_is_a_non_match() {
        let cfg = config(
            true,
            vec![trigger(1, TriggerType::Keyword, "(unclosed", MatchType::Regex, true)],
        );
        assert!(first_match(&cfg, &input()).is_none());
    }

    #[test]
    fn empty_text_only_matches_empty_substring_style_values() {
        let mut empty = input();
        empty.text = "";

        let cfg = config(
            true,
            vec![trigger(1, TriggerType::Keyword, "", MatchType::Exact, true)],
        );
        assert!(first_match(&cfg, &empty).is_some());

        let cfg = config(
            true,
            vec![trigger(1, TriggerType::Keyword, "", MatchType::Regex, true)],
        );
        assert!(first_match(&cfg, &empty).is_none());

        let cfg = config(
            true,
            vec![trigger(1, TriggerType::Keyword, "urgent", MatchType::Contains, true)],
        );
        assert!(first_match(&cfg, &empty).is_none());
    }

    #[test]
    fn media_kind_compares_the_normalized_kind() {
        let mut with_media = input();
        with_media.media_kind = "image";

        let cfg = config(
            true,
            vec![trigger(1, TriggerType::MediaKind, "image", MatchType::Exact, true)],
        );
        assert!(first_match(&cfg, &with_media).is_some());
        assert!(first_match(&cfg, &input()).is_none());
    }
}
