//! Editor and output-view state owned by the session controller.

use serde::{Deserialize, Serialize};

use crate::backend::RunResult;

/// Editor language. `Python` is the executable kind, `Html` is markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    Html,
}

impl Language {
    /// Whether code in this language can be sent to the run endpoint.
    pub fn is_executable(self) -> bool {
        matches!(self, Language::Python)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Html => "html",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is in the editor right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorState {
    pub code: String,
    pub language: Language,
}

/// Which output pane is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputView {
    #[default]
    Output,
    Summary,
    Explanation,
}

/// What the last agent turn was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    GenerateCode,
    ExplainCode,
    /// Learn-mode generation with an explanation attached.
    Generate,
}

/// Explanation of the code in the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryContent {
    pub what_it_does: String,
    pub components: String,
    pub flow: String,
}

/// A learn-mode result: code plus teaching material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LearnResult {
    pub language: Language,
    pub code: String,
    pub detailed_explanation: String,
    pub step_by_step: Vec<String>,
    pub key_concepts: Vec<String>,
    pub rag_sources: Option<Vec<String>>,
}

/// Everything the output panel renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputState {
    pub summary: Option<SummaryContent>,
    pub learn: Option<LearnResult>,
    pub intent: Option<Intent>,
    pub view: OutputView,
    pub run_result: Option<RunResult>,
    pub run_error: Option<String>,
}

impl OutputState {
    /// Reset for a fresh user turn.
    pub fn clear_for_turn(&mut self) {
        self.summary = None;
        self.learn = None;
        self.intent = None;
        self.run_result = None;
        self.run_error = None;
        self.view = OutputView::Output;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_wire_names() {
        assert_eq!(serde_json::to_string(&Language::Python).unwrap(), "\"python\"");
        let html: Language = serde_json::from_str("\"html\"").unwrap();
        assert_eq!(html, Language::Html);
        assert!(serde_json::from_str::<Language>("\"cobol\"").is_err());
    }

    #[test]
    fn only_python_is_executable() {
        assert!(Language::Python.is_executable());
        assert!(!Language::Html.is_executable());
    }

    #[test]
    fn clear_for_turn_resets_view() {
        let mut out = OutputState {
            summary: Some(SummaryContent {
                what_it_does: "adds".into(),
                components: "fn".into(),
                flow: "linear".into(),
            }),
            intent: Some(Intent::ExplainCode),
            view: OutputView::Summary,
            run_error: Some("boom".into()),
            ..Default::default()
        };
        out.clear_for_turn();
        assert_eq!(out, OutputState::default());
    }
}
