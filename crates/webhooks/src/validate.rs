//! Config validation, enforced on every create and update.

use hermod_storage::MatchType;

use crate::{
    error::{Error, Result},
    manager::NewWebhook,
};

pub(crate) const MAX_NAME_LEN: usize = 255;
pub(crate) const MAX_URL_LEN: usize = 2048;

/// Shape checks that need no network access. The SSRF check runs separately
/// so its bypass flag stays orthogonal.
pub(crate) fn validate(req: &NewWebhook) -> Result<()> {
    if req.name.is_empty() {
        return Err(Error::Validation("name is required".into()));
    }
    if req.name.len() > MAX_NAME_LEN {
        return Err(Error::Validation(format!(
            "name exceeds {MAX_NAME_LEN} characters"
        )));
    }

    if req.target_url.is_empty() {
        return Err(Error::Validation("target_url is required".into()));
    }
    if req.target_url.len() > MAX_URL_LEN {
        return Err(Error::Validation(format!(
            "target_url exceeds {MAX_URL_LEN} characters"
        )));
    }
    if !req.target_url.starts_with("http://") && !req.target_url.starts_with("https://") {
        return Err(Error::Validation(
            "target_url must start with http:// or https://".into(),
        ));
    }
    if url::Url::parse(&req.target_url).is_err() {
        return Err(Error::Validation("target_url is not a valid URL".into()));
    }

    for trigger in &req.triggers {
        if trigger.match_type == MatchType::Regex
            && let Err(e) = regex::Regex::new(&trigger.value)
        {
            return Err(Error::Validation(format!(
                "trigger regex does not compile: {e}"
            )));
        }
    }

    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use hermod_storage::TriggerType;

    use super::*;
    use crate::manager::NewTrigger;

    fn request() -> NewWebhook {
        NewWebhook {
            name: "alerts".into(),
            target_url: "https://hooks.example/incoming".into(),
            secret: None,
            enabled: true,
            triggers: vec![NewTrigger {
                trigger_type: TriggerType::Keyword,
                value: "urgent".into(),
                match_type: MatchType::Contains,
                enabled: true,
            }],
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(validate(&request()).is_ok());
    }

    #[test]
    fn name_bounds() {
        let mut req = request();
        req.name = String::new();
        assert!(validate(&req).is_err());

        req.name = "x".repeat(MAX_NAME_LEN);
        assert!(validate(&req).is_ok());
        req.name.push('x');
        assert!(validate(&req).is_err());
    }

    #[test]
    fn url_scheme_and_shape() {
        let mut req = request();
        req.target_url = String::new();
        assert!(validate(&req).is_err());

        req.target_url = "ftp://files.example/hook".into();
        assert!(validate(&req).is_err());

        req.target_url = "http://".into();
        assert!(validate(&req).is_err());

        req.target_url = format!("https://hooks.example/{}", "p".repeat(MAX_URL_LEN));
        assert!(validate(&req).is_err());
    }

    #[test]
    fn regex_triggers_compile_at_write_time() {
        let mut req = request();
        req.triggers[0].match_type = MatchType::Regex;
        req.triggers[0].value = "(unclosed".into();
        let err = validate(&req).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        req.triggers[0].value = "^urgent:.*$".into();
        assert!(validate(&req).is_ok());
    }

    #[test]
    fn non_regex_values_are_not_compiled() {
        let mut req = request();
        // A value that would be an invalid regex is fine under contains.
        req.triggers[0].value = "(unclosed".into();
        assert!(validate(&req).is_ok());
    }
}
