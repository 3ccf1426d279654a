//! Extraction of the structured result from free-form LLM analysis text

use super::types::LlmAnalysis;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Parse the structured result out of `text`
///
/// Uses the first fenced ```json block, falling back to the outermost
/// `{...}` object. The error describes why nothing usable was found.
pub fn parse_llm_output(text: &str) -> Result<LlmAnalysis, String> {
    let candidate = fenced_json(text)
        .or_else(|| outermost_object(text))
        .ok_or_else(|| "no JSON object found in LLM response".to_string())?;

    serde_json::from_str(candidate).map_err(|e| format!("invalid JSON structure: {}", e))
}

fn fenced_json(text: &str) -> Option<&str> {
    let start = text.find(JSON_FENCE)? + JSON_FENCE.len();
    let rest = &text[start..];
    let end = rest.find(FENCE)?;
    let block = rest[..end].trim();
    (!block.is_empty()).then_some(block)
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::investigation::types::InvestigationOutcome;

    #[test]
    fn test_fenced_block_preferred() {
        let text = r#"The pod was OOMKilled {not json}.

```json
{"selected_workflow": {"workflow_id": "increase-memory"}, "confidence": 0.85}
```
"#;
        let analysis = parse_llm_output(text).unwrap();
        assert_eq!(
            analysis.selected_workflow.unwrap().workflow_id,
            "increase-memory"
        );
        assert_eq!(analysis.confidence, 0.85);
    }

    #[test]
    fn test_bare_object_fallback() {
        let text = r#"Result: {"investigation_outcome": "resolved", "confidence": 0.95} done"#;
        let analysis = parse_llm_output(text).unwrap();
        assert_eq!(analysis.investigation_outcome, InvestigationOutcome::Resolved);
    }

    #[test]
    fn test_unparseable_text() {
        assert_eq!(
            parse_llm_output("I could not determine anything.").unwrap_err(),
            "no JSON object found in LLM response"
        );

        let err = parse_llm_output("```json\n{\"confidence\": \"high\"}\n```").unwrap_err();
        assert!(err.starts_with("invalid JSON structure"));
    }
}
