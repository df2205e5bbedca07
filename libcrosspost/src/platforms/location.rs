//! Matching a free-text location against a platform's area list

use tracing::debug;

use crate::error::SessionError;
use crate::session::Session;

/// Pick the option that best matches `location`
///
/// A case-insensitive exact match wins over any substring match, so
/// "Phoenix" picks "Phoenix" rather than an earlier "Phoenix East". Failing
/// that, the first option containing the location (or contained in it) is
/// used.
pub fn best_option_index<S: AsRef<str>>(options: &[S], location: &str) -> Option<usize> {
    let wanted = location.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    let normalized: Vec<String> = options
        .iter()
        .map(|o| o.as_ref().trim().to_lowercase())
        .collect();

    if let Some(index) = normalized.iter().position(|o| *o == wanted) {
        return Some(index);
    }
    normalized
        .iter()
        .position(|o| !o.is_empty() && (o.contains(&wanted) || wanted.contains(o.as_str())))
}

/// Choose an area in a `<select>` by its option texts
///
/// Falls back to the first option when nothing matches. Returns the text of
/// the chosen option.
pub async fn select_location(
    session: &dyn Session,
    select: &str,
    location: &str,
) -> Result<Option<String>, SessionError> {
    let options = session.option_texts(select).await;
    let index = match best_option_index(&options, location) {
        Some(index) => index,
        None => {
            debug!("No area matches {:?}, using the first option", location);
            0
        }
    };
    session.select_option(select, index).await?;
    Ok(options.get(index).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::{Call, ScriptedPage, ScriptedSession};

    #[test]
    fn test_exact_match_beats_earlier_substring() {
        let options = ["Phoenix East", "Phoenix", "Flagstaff"];
        assert_eq!(best_option_index(&options, "Phoenix"), Some(1));
    }

    #[test]
    fn test_exact_match_in_listed_order() {
        let options = ["Phoenix", "Phoenix East", "Flagstaff"];
        assert_eq!(best_option_index(&options, "phoenix "), Some(0));
    }

    #[test]
    fn test_substring_fallback() {
        let options = ["central/south phx", "east valley", "west valley"];
        assert_eq!(best_option_index(&options, "East"), Some(1));
        assert_eq!(best_option_index(&options, "Mesa, east valley AZ"), Some(1));
    }

    #[test]
    fn test_no_match() {
        let options = ["Tucson", "Flagstaff"];
        assert_eq!(best_option_index(&options, "Boston"), None);
        assert_eq!(best_option_index(&options, "  "), None);
    }

    #[tokio::test]
    async fn test_select_location_uses_exact_option() {
        let page = ScriptedPage::new()
            .element("select[name=\"area\"]")
            .element_texts(
                "select[name=\"area\"] option",
                &["Phoenix", "Phoenix East", "Flagstaff"],
            );
        let session = ScriptedSession::new(page);

        let chosen = select_location(&session, "select[name=\"area\"]", "Phoenix")
            .await
            .unwrap();
        assert_eq!(chosen.as_deref(), Some("Phoenix"));
        assert!(session
            .snapshot()
            .calls
            .contains(&Call::SelectOption("select[name=\"area\"]".to_string(), 0)));
    }

    #[tokio::test]
    async fn test_blank_placeholder_keeps_option_positions() {
        let page = ScriptedPage::new().element("select").element_texts(
            "select option",
            &["", "Phoenix", "Phoenix East", "Flagstaff"],
        );
        let session = ScriptedSession::new(page);

        assert_eq!(session.texts("select option").await.len(), 3);
        let chosen = select_location(&session, "select", "Phoenix").await.unwrap();
        assert_eq!(chosen.as_deref(), Some("Phoenix"));

        let calls = session.snapshot().calls;
        assert!(calls.contains(&Call::OptionTexts("select".to_string())));
        assert!(calls.contains(&Call::SelectOption("select".to_string(), 1)));
    }

    #[tokio::test]
    async fn test_select_location_defaults_to_first() {
        let page = ScriptedPage::new()
            .element("select")
            .element_texts("select option", &["Tucson", "Yuma"]);
        let session = ScriptedSession::new(page);
        let chosen = select_location(&session, "select", "Boston").await.unwrap();
        assert_eq!(chosen.as_deref(), Some("Tucson"));
    }
}
