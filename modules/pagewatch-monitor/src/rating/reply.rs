use ai_client::util::outermost_json_object;
use pagewatch_common::{RatedItem, Rating, RatingResult};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::RatingFailure;

/// Wire shape of an oracle reply. Scores are checked after parsing.
#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct OracleReply {
    /// Overall interest score, integer 1-5.
    score: i64,
    /// Short explanation of the score.
    explanation: String,
    /// Individually rated items, possibly empty.
    #[serde(default)]
    items: Vec<OracleItem>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct OracleItem {
    title: String,
    date: Option<String>,
    score: i64,
    excerpt: Option<String>,
}

/// Parse and validate a raw oracle reply. Never clamps: any out-of-range
/// score or missing field rejects the whole reply.
pub fn parse_reply(text: &str) -> Result<RatingResult, RatingFailure> {
    let json = outermost_json_object(text)
        .ok_or_else(|| RatingFailure::Invalid("reply contains no JSON object".into()))?;

    let reply: OracleReply = serde_json::from_str(json)
        .map_err(|e| RatingFailure::Invalid(format!("reply does not match schema: {e}")))?;

    let explanation = reply.explanation.trim();
    if explanation.is_empty() {
        return Err(RatingFailure::Invalid("explanation is empty".into()));
    }

    let score = Rating::new(reply.score)
        .map_err(|e| RatingFailure::Invalid(format!("overall score: {e}")))?;

    let items = reply
        .items
        .into_iter()
        .map(|item| {
            let title = item.title.trim().to_string();
            if title.is_empty() {
                return Err(RatingFailure::Invalid("item without title".into()));
            }
            let score = Rating::new(item.score)
                .map_err(|e| RatingFailure::Invalid(format!("item \"{title}\": {e}")))?;
            Ok(RatedItem {
                title,
                date: item.date.filter(|d| !d.trim().is_empty()),
                score,
                excerpt: item.excerpt.filter(|e| !e.trim().is_empty()),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RatingResult {
        score,
        explanation: explanation.to_string(),
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_reply_with_items() {
        let text = r#"Here you go:
```json
{"score": 4, "explanation": "Ny skola byggs.", "items": [
  {"title": "Ny skola", "date": "1 mars", "score": 5, "excerpt": null},
  {"title": "Öppettider", "date": null, "score": 1, "excerpt": ""}
]}
```"#;
        let result = parse_reply(text).unwrap();
        assert_eq!(result.score.value(), 4);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].score.value(), 5);
        assert_eq!(result.items[1].excerpt, None);
    }

    #[test]
    fn zero_items_is_valid() {
        let result = parse_reply(r#"{"score": 2, "explanation": "Rutin."}"#).unwrap();
        assert!(result.items.is_empty());
    }

    #[test]
    fn out_of_range_scores_are_rejected_not_clamped() {
        for text in [
            r#"{"score": 0, "explanation": "x"}"#,
            r#"{"score": 6, "explanation": "x"}"#,
            r#"{"score": 3, "explanation": "x", "items": [{"title": "a", "date": null, "score": 9, "excerpt": null}]}"#,
        ] {
            let err = parse_reply(text).unwrap_err();
            assert_eq!(err.reason_code(), "rating-invalid", "{text}");
        }
    }

    #[test]
    fn missing_or_malformed_fields_are_rejected() {
        for text in [
            r#"{"explanation": "no score"}"#,
            r#"{"score": 3}"#,
            r#"{"score": 3.5, "explanation": "fractional"}"#,
            r#"{"score": "4", "explanation": "string score"}"#,
            r#"{"score": 3, "explanation": "   "}"#,
            "Betyg: 4",
        ] {
            assert!(
                matches!(parse_reply(text), Err(RatingFailure::Invalid(_))),
                "{text}"
            );
        }
    }
}
