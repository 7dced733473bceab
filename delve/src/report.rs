//! Final assembly: outline, narrative report, and bibliography from a
//! completed graph.
//!
//! Assembly reads the graph, never mutates it. A failure here leaves the graph
//! intact and completed; callers surface it as "graph succeeded, report
//! unavailable".

use std::collections::HashSet;

use crate::graph::{Citation, GraphError, GraphStore, NodeStatus, ResearchNode};

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("cannot assemble: root is not complete")]
    RootNotComplete,
    #[error("cannot assemble: root has no answer text")]
    EmptyRootAnswer,
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// The three assembled artifacts of a successful run.
#[derive(Debug, Clone)]
pub struct ReportBundle {
    pub outline: String,
    pub report: String,
    pub bibliography: Vec<Citation>,
}

/// Turns a completed graph into a [`ReportBundle`].
#[derive(Debug, Default)]
pub struct ReportAssembler;

impl ReportAssembler {
    pub fn new() -> Self {
        Self
    }

    pub async fn assemble(&self, store: &GraphStore) -> Result<ReportBundle, AssemblyError> {
        let root_id = store.root_id().await?;
        let root = store.get(&root_id).await?;
        if root.status != NodeStatus::Complete {
            return Err(AssemblyError::RootNotComplete);
        }
        let answer = match root.answer.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => return Err(AssemblyError::EmptyRootAnswer),
        };

        let mut children = Vec::with_capacity(root.children.len());
        for child_id in &root.children {
            children.push(store.get(child_id).await?);
        }
        let mut grandchildren: Vec<(String, Vec<String>)> = Vec::new();
        for child in &children {
            let mut questions = Vec::with_capacity(child.children.len());
            for grandchild_id in &child.children {
                questions.push(store.get(grandchild_id).await?.question);
            }
            grandchildren.push((child.question.clone(), questions));
        }

        let bibliography = dedup_by_url(&root.cited_documents);
        let outline = render_outline(&grandchildren);
        let report = render_report(&root, &answer, &children, &bibliography);

        Ok(ReportBundle {
            outline,
            report,
            bibliography,
        })
    }
}

fn dedup_by_url(citations: &[Citation]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    citations
        .iter()
        .filter(|c| seen.insert(c.url.clone()))
        .cloned()
        .collect()
}

/// Top two levels of structure: one section per top-level child, its children
/// as bullets. A childless root falls back to a generic outline.
fn render_outline(sections: &[(String, Vec<String>)]) -> String {
    if sections.is_empty() {
        return "## Introduction\n\n## Findings\n\n## Conclusion".to_string();
    }
    let mut parts = Vec::with_capacity(sections.len());
    for (question, sub_questions) in sections {
        let mut section = format!("## {question}");
        for sub in sub_questions {
            section.push_str(&format!("\n- {sub}"));
        }
        parts.push(section);
    }
    parts.join("\n\n")
}

/// Narrative report. The framing leads with the root's own answer so the body
/// cannot contradict it, then walks the top-level children, spelling out
/// unresolved ones.
fn render_report(
    root: &ResearchNode,
    answer: &str,
    children: &[ResearchNode],
    bibliography: &[Citation],
) -> String {
    let mut out = format!("# {}\n\n**Answer:** {answer}", root.question);

    for child in children {
        out.push_str(&format!("\n\n## {}", child.question));
        match child.status {
            NodeStatus::Failed => {
                let reason = child.error.as_deref().unwrap_or("no further detail");
                out.push_str(&format!("\n\nUnresolved in this run: {reason}."));
            }
            _ => match child.answer.as_deref() {
                Some(text) if !text.trim().is_empty() => {
                    out.push_str(&format!("\n\n{text}"));
                }
                _ => out.push_str("\n\nNo answer was recorded."),
            },
        }
    }

    if !bibliography.is_empty() {
        out.push_str("\n\n## References\n");
        for (index, citation) in bibliography.iter().enumerate() {
            out.push_str(&format!(
                "\n[{}] {} - {}",
                index + 1,
                citation.title,
                citation.url
            ));
        }
    }
    out
}
