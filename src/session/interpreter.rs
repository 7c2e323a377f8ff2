//! Result interpreter. Turns structured agent payloads into editor and output state.
//!
//! Decoding happens once, at the boundary: the payload's `type` picks a wire
//! shape, and every wire shape (including the deprecated combined
//! `code_result`) normalizes into one `StructuredResult`. Nothing downstream
//! ever looks at wire names again.
//!
//! Recognized `type`s:
//! - `code`: `{language, content}`
//! - `summary`: `{content: {what_it_does, components, flow}}`
//! - `code_result` (legacy): `{code, language, summary?: {what_it_does, key_components, how_to_extend}}`
//! - `learn_code_result`: `{code, language, detailed_explanation, step_by_step, key_concepts, rag_sources?}`

use serde::Deserialize;

use super::editor::{
    EditorState, Intent, Language, LearnResult, OutputState, OutputView, SummaryContent,
};

/// Errors from decoding a result payload.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("payload has no string `type` field")]
    MissingType,

    #[error("malformed '{kind}' payload: {source}")]
    Shape {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A result in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredResult {
    /// Generated code. `summary` is only ever set by the legacy combined form.
    Code {
        language: Language,
        content: String,
        summary: Option<SummaryContent>,
    },
    Summary(SummaryContent),
    Learn(LearnResult),
}

/// What `decode` found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Result(StructuredResult),
    /// Well-formed JSON whose `type` this interpreter does not handle.
    Unrecognized(String),
}

#[derive(Deserialize)]
struct CodeWire {
    language: Language,
    content: String,
}

#[derive(Deserialize)]
struct SummaryWire {
    content: SummaryContent,
}

#[derive(Deserialize)]
struct LegacySummaryWire {
    what_it_does: String,
    key_components: String,
    how_to_extend: String,
}

#[derive(Deserialize)]
struct LegacyCodeWire {
    code: String,
    language: Language,
    #[serde(default)]
    summary: Option<LegacySummaryWire>,
}

#[derive(Deserialize)]
struct LearnWire {
    code: String,
    language: Language,
    #[serde(default)]
    detailed_explanation: String,
    #[serde(default)]
    step_by_step: Vec<String>,
    #[serde(default)]
    key_concepts: Vec<String>,
    #[serde(default)]
    rag_sources: Option<Vec<String>>,
}

fn shape<T: for<'de> Deserialize<'de>>(
    kind: &str,
    value: serde_json::Value,
) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Shape {
        kind: kind.to_string(),
        source,
    })
}

/// Decode and normalize one raw payload.
pub fn decode(payload: &[u8]) -> Result<Decoded, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let value: serde_json::Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_string();

    let result = match kind.as_str() {
        "code" => {
            let wire: CodeWire = shape(&kind, value)?;
            StructuredResult::Code {
                language: wire.language,
                content: wire.content,
                summary: None,
            }
        }
        "summary" => {
            let wire: SummaryWire = shape(&kind, value)?;
            StructuredResult::Summary(wire.content)
        }
        "code_result" => {
            let wire: LegacyCodeWire = shape(&kind, value)?;
            StructuredResult::Code {
                language: wire.language,
                content: wire.code,
                summary: wire.summary.map(|s| SummaryContent {
                    what_it_does: s.what_it_does,
                    components: s.key_components,
                    flow: s.how_to_extend,
                }),
            }
        }
        "learn_code_result" => {
            let wire: LearnWire = shape(&kind, value)?;
            StructuredResult::Learn(LearnResult {
                language: wire.language,
                code: wire.code,
                detailed_explanation: wire.detailed_explanation,
                step_by_step: wire.step_by_step,
                key_concepts: wire.key_concepts,
                rag_sources: wire.rag_sources.filter(|s| !s.is_empty()),
            })
        }
        _ => return Ok(Decoded::Unrecognized(kind)),
    };

    Ok(Decoded::Result(result))
}

/// What applying a result asks of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Editor code or language was replaced.
    pub editor_changed: bool,
    /// Code to hand to the execution trigger, at most once per result.
    pub run: Option<String>,
}

impl StructuredResult {
    pub fn kind(&self) -> &'static str {
        match self {
            StructuredResult::Code { .. } => "code",
            StructuredResult::Summary(_) => "summary",
            StructuredResult::Learn(_) => "learn",
        }
    }

    /// Apply to editor and output state. Every field lands somewhere or is
    /// dropped; nothing here can fail halfway.
    pub fn apply(self, editor: &mut EditorState, output: &mut OutputState) -> Applied {
        match self {
            StructuredResult::Summary(summary) => {
                output.summary = Some(summary);
                output.intent = Some(Intent::ExplainCode);
                output.view = OutputView::Summary;
                Applied {
                    editor_changed: false,
                    run: None,
                }
            }
            StructuredResult::Code {
                language,
                content,
                summary,
            } => {
                if let Some(summary) = summary {
                    output.summary = Some(summary);
                }
                output.intent = Some(Intent::GenerateCode);
                output.view = OutputView::Output;
                let run = (language.is_executable() && !content.is_empty()).then(|| content.clone());
                editor.code = content;
                editor.language = language;
                Applied {
                    editor_changed: true,
                    run,
                }
            }
            StructuredResult::Learn(learn) => {
                editor.code = learn.code.clone();
                editor.language = learn.language;
                output.intent = Some(Intent::Generate);
                let run = if learn.language.is_executable() {
                    output.view = OutputView::Explanation;
                    (!learn.code.is_empty()).then(|| learn.code.clone())
                } else {
                    output.view = OutputView::Output;
                    None
                };
                output.learn = Some(learn);
                Applied {
                    editor_changed: true,
                    run,
                }
            }
        }
    }
}
