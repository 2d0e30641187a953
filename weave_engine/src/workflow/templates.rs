//! Pre-built workflows for common pipelines.
//!
//! Task ids are prefixed with the workflow id (`{workflow_id}_{step}`), so two
//! instances of the same template never share ids. Steps that combine earlier
//! results reference them with [`output_of`].

use crate::workflow::dag::Workflow;
use crate::workflow::params::output_of;
use crate::workflow::task::Task;
use serde_json::json;
use uuid::Uuid;

/// Factory for pre-built workflows.
pub struct WorkflowTemplate;

impl WorkflowTemplate {
    /// Linear document pipeline: extract, chunk, embed, analyze, summarize.
    pub fn document_analysis(document_id: &str, user_id: &str) -> Workflow {
        let workflow_id = Uuid::new_v4().to_string();
        let id = |step: &str| format!("{}_{}", workflow_id, step);

        let steps = [
            ("extract", "Extract Document Content", "extract_content"),
            ("chunk", "Chunk Document", "create_chunks"),
            ("embed", "Generate Embeddings", "generate_embeddings"),
            ("analyze", "Analyze Content", "analyze_content"),
            ("summarize", "Generate Summary", "summarize"),
        ];

        let mut workflow = Workflow::with_id(
            workflow_id.clone(),
            "Document Analysis Pipeline",
            "Complete document processing and analysis",
        )
        .created_by(user_id)
        .with_metadata("document_id", json!(document_id));

        let mut previous: Option<String> = None;
        for (step, name, action) in steps {
            let mut task = Task::new(id(step), name, "document", action)
                .with_parameter("document_id", json!(document_id));
            if let Some(prev) = previous.take() {
                task = task.depends_on(prev);
            }
            workflow.add_task(task);
            previous = Some(id(step));
        }
        workflow
    }

    /// Research pipeline: web and document search in parallel, then
    /// synthesis, fact check and a final report.
    pub fn research(query: &str, user_id: &str) -> Workflow {
        let workflow_id = Uuid::new_v4().to_string();
        let id = |step: &str| format!("{}_{}", workflow_id, step);

        Workflow::with_id(
            workflow_id.clone(),
            "Research Pipeline",
            "Comprehensive research using multiple agents",
        )
        .created_by(user_id)
        .with_metadata("query", json!(query))
        .with_task(
            Task::new(id("web_search"), "Web Search", "web", "search")
                .with_parameter("query", json!(query))
                .with_parameter("max_results", json!(10)),
        )
        .with_task(
            Task::new(id("doc_search"), "Document Search", "document", "search")
                .with_parameter("query", json!(query))
                .with_parameter("top_k", json!(5)),
        )
        .with_task(
            Task::new(id("synthesize"), "Synthesize Results", "chat", "synthesize")
                .with_parameter("query", json!(query))
                .with_parameter(
                    "sources",
                    json!([output_of(id("web_search"), None), output_of(id("doc_search"), None)]),
                )
                .depends_on(id("web_search"))
                .depends_on(id("doc_search")),
        )
        .with_task(
            Task::new(id("fact_check"), "Fact Check", "web", "fact_check")
                .with_parameter("content", output_of(id("synthesize"), None))
                .depends_on(id("synthesize")),
        )
        .with_task(
            Task::new(id("final_report"), "Generate Report", "chat", "generate_report")
                .with_parameter("query", json!(query))
                .with_parameter("synthesis", output_of(id("synthesize"), None))
                .with_parameter("fact_check", output_of(id("fact_check"), None))
                .depends_on(id("fact_check"))
                .depends_on(id("synthesize")),
        )
    }

    /// Code review pipeline: four independent checks feeding one report.
    pub fn code_review(code: &str, language: &str, user_id: &str) -> Workflow {
        let workflow_id = Uuid::new_v4().to_string();
        let id = |step: &str| format!("{}_{}", workflow_id, step);

        let checks = [
            ("syntax_check", "Syntax Check", "check_syntax", "syntax"),
            ("style_check", "Style Check", "check_style", "style"),
            ("security_scan", "Security Scan", "security_scan", "security"),
            ("performance_analysis", "Performance Analysis", "analyze_performance", "performance"),
        ];

        let mut workflow = Workflow::with_id(
            workflow_id.clone(),
            "Code Review Pipeline",
            "Comprehensive code review and analysis",
        )
        .created_by(user_id)
        .with_metadata("language", json!(language));

        let mut report = Task::new(id("generate_report"), "Generate Review Report", "chat", "compile_review")
            .with_parameter("code", json!(code))
            .with_parameter("language", json!(language));
        let mut results = serde_json::Map::new();

        for (step, name, action, label) in checks {
            workflow.add_task(
                Task::new(id(step), name, "code", action)
                    .with_parameter("code", json!(code))
                    .with_parameter("language", json!(language)),
            );
            results.insert(label.to_string(), output_of(id(step), None));
            report = report.depends_on(id(step));
        }

        workflow.add_task(report.with_parameter("checks", results.into()));
        workflow
    }
}
