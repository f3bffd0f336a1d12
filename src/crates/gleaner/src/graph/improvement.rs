//! Improvement agent: turns a conversational request into proposed source
//! edits, gated behind a `code_change` key decision.
//!
//! On approval the edits are written under the configured improvement root
//! and committed (and best-effort pushed) when that root is a git
//! repository. A compiled binary cannot hot-reload its own source, so
//! applied changes take effect on the next build/deploy; the responses say
//! so. File writes and git operations are gated by the tool policy.

use crate::context::AppContext;
use crate::error::Result;
use crate::graph::state::{AgentState, StateUpdate};
use crate::model::ModelScope;
use crate::security::wrap_untrusted_content;
use crate::validation::validate_improvement_output;
use llm::ChatRequest;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Current-file content included per change prompt, to bound token use.
const CHANGE_CONTEXT_LIMIT: usize = 4000;

const ANALYSIS_PROMPT: &str = r#"You are a code improvement agent for a Rust service.
Analyze the improvement request in the data block and create a plan.

Your task:
1. Understand what improvement is being requested
2. Identify which files/modules need to be changed
3. Create a step-by-step plan for implementing the improvement
4. Consider the codebase structure (Rust, async/await, explicit error handling)

Project structure:
- src/crates/gleaner/ - the service: supervisor, queue, cost governance, API
- src/crates/kg/ - knowledge graph domain types
- src/crates/llm/ - model clients
- src/crates/tooling/ - shared utilities

Respond with ONLY a JSON object:
{"understanding": "Brief summary of what the user wants",
 "files_to_modify": ["src/crates/gleaner/src/file1.rs"],
 "files_to_read": ["src/crates/gleaner/src/file2.rs"],
 "plan": ["Step 1: ...", "Step 2: ..."],
 "risk_level": "low|medium|high",
 "estimated_changes": "Brief description of code changes"}"#;

fn extract_json_object(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    let fragment = trimmed
        .find('{')
        .and_then(|start| trimmed.rfind('}').map(|end| &trimmed[start..=end]))?;
    serde_json::from_str(fragment).ok()
}

fn extract_code_block(content: &str) -> String {
    for fence in ["```rust", "```toml", "```"] {
        if let Some(start) = content.find(fence) {
            let after = &content[start + fence.len()..];
            let after = after.strip_prefix('\n').unwrap_or(after);
            if let Some(end) = after.find("```") {
                return after[..end].trim_end().to_string();
            }
        }
    }
    content.trim().to_string()
}

fn plan_strings(plan: &Value, key: &str) -> Vec<String> {
    plan.get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|f| f.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Understand an improvement request, read the relevant files, and propose
/// edits. Sets `approval_required` with a `code_change` key decision; never
/// writes anything itself.
pub async fn improvement_agent_node(ctx: &AppContext, state: &AgentState) -> Result<StateUpdate> {
    let user_input = state.user_input.clone().unwrap_or_default();
    info!(
        input = %tooling::logging::truncate_for_transport(&user_input, 100),
        "Improvement agent processing request"
    );

    let Some(model) =
        ctx.model_for_task("code_improvement", ModelScope::agent("improvement_agent"))
    else {
        return Ok(StateUpdate::fail(
            "No model configured",
            "❌ The improvement agent needs a model (set OPENAI_API_KEY or ANTHROPIC_API_KEY).",
        ));
    };

    // Step 1: understand the request and plan the changes.
    let prior_context = state
        .working_notes
        .get("improvement_context")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let mut analysis_input = wrap_untrusted_content(&user_input, 10_000);
    if !prior_context.is_empty() {
        analysis_input.push_str(&format!("\n\nPrior context: {}", prior_context));
    }
    let response = model
        .invoke(ChatRequest::user(format!(
            "{}\n\n{}",
            ANALYSIS_PROMPT, analysis_input
        )))
        .await?;

    let Some(plan) = extract_json_object(&response.content) else {
        return Ok(StateUpdate::fail(
            "Failed to parse improvement plan",
            "❌ Could not understand the improvement request. Please be more specific.",
        ));
    };

    let files_to_modify = plan_strings(&plan, "files_to_modify");
    if files_to_modify.is_empty() {
        let understanding = plan
            .get("understanding")
            .and_then(|v| v.as_str())
            .unwrap_or("No changes needed");
        return Ok(StateUpdate::respond(format!(
            "✅ Analysis complete:\n\n{}\n\nNo files need to be modified.",
            understanding
        )));
    }

    // Step 2: read the relevant files for context. Missing or unreadable
    // files are skipped; the change prompt then starts from empty content.
    let root = Path::new(&ctx.config.improvement_root);
    let mut current_files: BTreeMap<String, String> = BTreeMap::new();
    let mut files_to_read = plan_strings(&plan, "files_to_read");
    files_to_read.extend(files_to_modify.iter().cloned());
    for file_path in &files_to_read {
        if !is_within_root(file_path) {
            warn!(path = %file_path, "Skipping unsafe path from plan");
            continue;
        }
        match tokio::fs::read_to_string(root.join(file_path)).await {
            Ok(content) => {
                current_files.insert(file_path.clone(), content);
            }
            Err(e) => warn!(path = %file_path, error = %e, "Could not read file"),
        }
    }

    // Step 3: generate the modified content for each file.
    let mut proposed_changes: BTreeMap<String, String> = BTreeMap::new();
    for file_path in &files_to_modify {
        let current = current_files.get(file_path).cloned().unwrap_or_default();
        let snippet: String = current.chars().take(CHANGE_CONTEXT_LIMIT).collect();
        let change_prompt = format!(
            "Based on the improvement request and plan, generate the complete modified file.\n\n\
             Improvement plan: {}\n\nFile to modify: {}\nCurrent content:\n```rust\n{}\n```\n\n\
             Requirements:\n\
             1. Make the requested improvement\n\
             2. Match the existing code style and error handling\n\
             3. Preserve existing functionality\n\n\
             Respond with ONLY the complete modified file content in a code block.\n\n{}",
            plan,
            file_path,
            snippet,
            wrap_untrusted_content(&user_input, 10_000)
        );
        let response = model.invoke(ChatRequest::user(change_prompt)).await?;
        proposed_changes.insert(file_path.clone(), extract_code_block(&response.content));
        info!(path = %file_path, "Generated proposed change");
    }

    validate_improvement_output(&proposed_changes, Some(&plan))?;

    let summary = change_summary(&current_files, &proposed_changes, &plan);
    let decision_id = format!("improve-{}", &Uuid::new_v4().simple().to_string()[..8]);

    Ok(StateUpdate {
        proposed_changes: Some(proposed_changes),
        improvement_plan: Some(plan),
        approval_required: Some(true),
        diff_id: Some(decision_id),
        crucial_decision_type: Some("code_change".to_string()),
        final_response: Some(summary),
        ..StateUpdate::default()
    })
}

fn is_within_root(path: &str) -> bool {
    let p = Path::new(path);
    !path.is_empty()
        && !p.is_absolute()
        && p.components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}

fn change_summary(
    current: &BTreeMap<String, String>,
    proposed: &BTreeMap<String, String>,
    plan: &Value,
) -> String {
    let mut parts = vec!["🔧 Proposed code improvements\n".to_string()];
    parts.push(format!(
        "📋 Understanding: {}",
        plan.get("understanding").and_then(|v| v.as_str()).unwrap_or("n/a")
    ));
    parts.push(format!(
        "⚠️ Risk level: {}",
        plan.get("risk_level")
            .and_then(|v| v.as_str())
            .unwrap_or("medium")
            .to_uppercase()
    ));
    parts.push(format!("\n📝 Files to modify: {}", proposed.len()));
    for (path, new_content) in proposed {
        let old_lines = current.get(path).map(|c| c.lines().count()).unwrap_or(0);
        parts.push(format!(
            "  • {} ({} → {} lines)",
            path,
            old_lines,
            new_content.lines().count()
        ));
    }
    let steps = plan_strings(plan, "plan");
    if !steps.is_empty() {
        parts.push("\nPlan:".to_string());
        for step in steps.iter().take(5) {
            parts.push(format!("  • {}", step));
        }
    }
    parts.push(
        "\n⚠️ Review the changes carefully before approving. Approved changes take effect on the next build."
            .to_string(),
    );
    parts.join("\n")
}

/// Apply approved code changes: write the files under the improvement root,
/// then commit (and best-effort push) when the root is a git repository.
pub async fn apply_improvements(ctx: &AppContext, state: &AgentState) -> Result<StateUpdate> {
    let Some(changes) = &state.proposed_changes else {
        return Ok(StateUpdate::fail(
            "No proposed changes to apply",
            "❌ No changes to apply.",
        ));
    };
    validate_improvement_output(changes, state.improvement_plan.as_ref())?;

    if let Err(e) = ctx.tools.require("file_write") {
        return Ok(StateUpdate::fail(
            e.to_string(),
            format!("❌ Security: file writes are not allowed. {}", e),
        ));
    }

    let root = Path::new(&ctx.config.improvement_root);
    let mut applied = Vec::new();
    for (file_path, content) in changes {
        let full_path = root.join(file_path);
        if let Some(parent) = full_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(StateUpdate::fail(
                    format!("Failed to create {}: {}", parent.display(), e),
                    format!("❌ Error applying changes to {}: {}", file_path, e),
                ));
            }
        }
        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return Ok(StateUpdate::fail(
                format!("Failed to write {}: {}", file_path, e),
                format!("❌ Error applying changes to {}: {}", file_path, e),
            ));
        }
        info!(path = %file_path, "Applied change");
        applied.push(file_path.clone());
    }

    let file_list = applied
        .iter()
        .map(|f| format!("  • {}", f))
        .collect::<Vec<_>>()
        .join("\n");
    let understanding = state
        .improvement_plan
        .as_ref()
        .and_then(|p| p.get("understanding"))
        .and_then(|v| v.as_str())
        .unwrap_or("Code improvements")
        .to_string();

    // Commit only when allowed and the root actually is a git repository.
    let response = if ctx.tools.require("git_add_commit").is_err() {
        format!(
            "✅ Improvements applied\n\n📝 Modified files: {}\n{}\n\n\
             ⚠️ Git operations are not allowed; changes are saved but not committed.\n\
             Changes take effect on the next build.",
            applied.len(),
            file_list
        )
    } else if !root.join(".git").exists() {
        format!(
            "✅ Improvements applied\n\n📝 Modified files: {}\n{}\n\n\
             ⚠️ No git repository at the improvement root; changes are saved but not committed.\n\
             Changes take effect on the next build.",
            applied.len(),
            file_list
        )
    } else {
        match git_commit_and_push(root, &applied, &understanding).await {
            Ok(pushed) => format!(
                "✅ Improvements applied and committed\n\n📝 Modified files: {}\n{}\n\n\
                 💾 Committed: Improve: {}\n{}\n\
                 Changes take effect on the next build/deploy.",
                applied.len(),
                file_list,
                understanding,
                if pushed {
                    "🚀 Pushed to the remote."
                } else {
                    "⚠️ Push failed; push manually when ready."
                }
            ),
            Err(e) => format!(
                "✅ Files modified\n\n📝 Modified files: {}\n{}\n\n\
                 ⚠️ Git commit failed: {}\nChanges are saved but not committed.",
                applied.len(),
                file_list,
                tooling::logging::truncate_for_transport(&e, 200)
            ),
        }
    };

    Ok(StateUpdate {
        clear_proposed_diff: true,
        final_response: Some(response),
        ..StateUpdate::default()
    })
}

/// Stage and commit the applied files; returns whether the push succeeded.
async fn git_commit_and_push(
    root: &Path,
    files: &[String],
    understanding: &str,
) -> std::result::Result<bool, String> {
    let mut add = tokio::process::Command::new("git");
    add.arg("-C").arg(root).arg("add");
    for file in files {
        add.arg(file);
    }
    let output = add.output().await.map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).to_string());
    }

    let output = tokio::process::Command::new("git")
        .arg("-C")
        .arg(root)
        .arg("commit")
        .arg("-m")
        .arg(format!("Improve: {}", understanding))
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if !output.status.success() {
        return Err(String::from_utf8_lossy(&output.stderr).to_string());
    }
    info!(files = files.len(), "Committed improvement");

    let pushed = tokio::process::Command::new("git")
        .arg("-C")
        .arg(root)
        .arg("push")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !pushed {
        warn!("Git push failed; changes remain committed locally");
    }
    Ok(pushed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::testing::{test_context, test_context_with_config};
    use serde_json::json;

    const ANALYSIS_RESPONSE: &str = r#"{
        "understanding": "Add clearer logging to the demo module",
        "files_to_modify": ["src/demo.rs"],
        "files_to_read": [],
        "plan": ["Step 1: add tracing calls"],
        "risk_level": "low",
        "estimated_changes": "one function"
    }"#;

    const CHANGE_RESPONSE: &str = "```rust\nfn improved() {}\n```";

    #[test]
    fn test_extract_json_object() {
        assert!(extract_json_object("noise {\"a\": 1} trailing").is_some());
        assert!(extract_json_object("no braces").is_none());
    }

    #[test]
    fn test_extract_code_block() {
        assert_eq!(extract_code_block("```rust\nfn x() {}\n```"), "fn x() {}");
        assert_eq!(extract_code_block("```\nplain\n```"), "plain");
        assert_eq!(extract_code_block("no fences at all"), "no fences at all");
    }

    #[tokio::test]
    async fn test_proposes_changes_behind_code_change_gate() {
        let tc = test_context(vec![ANALYSIS_RESPONSE, CHANGE_RESPONSE]).await;
        let state = AgentState::for_turn("42", "/improve add better logging");

        let update = improvement_agent_node(&tc.ctx, &state).await.unwrap();

        assert_eq!(update.approval_required, Some(true));
        assert_eq!(update.crucial_decision_type.as_deref(), Some("code_change"));
        assert!(update.diff_id.unwrap().starts_with("improve-"));
        let changes = update.proposed_changes.unwrap();
        assert_eq!(changes["src/demo.rs"], "fn improved() {}");
        let summary = update.final_response.unwrap();
        assert!(summary.contains("Files to modify: 1"));
        assert!(summary.contains("next build"));
    }

    #[tokio::test]
    async fn test_analysis_without_files_ends_without_gate() {
        let tc = test_context(vec![
            r#"{"understanding": "Nothing to change", "files_to_modify": [], "plan": []}"#,
        ])
        .await;
        let state = AgentState::for_turn("42", "/improve things");
        let update = improvement_agent_node(&tc.ctx, &state).await.unwrap();
        assert!(update.approval_required.is_none());
        assert!(update.final_response.unwrap().contains("Analysis complete"));
    }

    #[tokio::test]
    async fn test_unparseable_plan_surfaces_clarification() {
        let tc = test_context(vec!["this is not a plan"]).await;
        let state = AgentState::for_turn("42", "/improve something");
        let update = improvement_agent_node(&tc.ctx, &state).await.unwrap();
        assert!(update.error.is_some());
        assert!(update
            .final_response
            .unwrap()
            .contains("Could not understand"));
    }

    #[tokio::test]
    async fn test_apply_writes_files_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            improvement_root: dir.path().to_string_lossy().to_string(),
            ..Config::default()
        };
        let tc = test_context_with_config(vec![], config).await;

        let mut state = AgentState::for_turn("42", "approve");
        state.proposed_changes = Some(std::collections::BTreeMap::from([(
            "src/new_module.rs".to_string(),
            "pub fn hello() {}\n".to_string(),
        )]));
        state.improvement_plan = Some(json!({"understanding": "add hello"}));

        let update = apply_improvements(&tc.ctx, &state).await.unwrap();
        assert!(update.clear_proposed_diff);
        let response = update.final_response.unwrap();
        assert!(response.contains("Improvements applied"));
        // tempdir has no git repo, so the changes stay uncommitted.
        assert!(response.contains("not committed"));

        let written = std::fs::read_to_string(dir.path().join("src/new_module.rs")).unwrap();
        assert_eq!(written, "pub fn hello() {}\n");
    }

    #[tokio::test]
    async fn test_apply_blocked_by_tool_policy() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            improvement_root: dir.path().to_string_lossy().to_string(),
            ..Config::default()
        };
        let tc = test_context_with_config(vec![], config).await;
        tc.ctx.tools.block("file_write");

        let mut state = AgentState::for_turn("42", "approve");
        state.proposed_changes = Some(std::collections::BTreeMap::from([(
            "src/x.rs".to_string(),
            "fn x() {}".to_string(),
        )]));

        let update = apply_improvements(&tc.ctx, &state).await.unwrap();
        assert!(update.final_response.unwrap().contains("Security"));
        assert!(!dir.path().join("src/x.rs").exists());
    }

    #[tokio::test]
    async fn test_apply_rejects_path_traversal() {
        let tc = test_context(vec![]).await;
        let mut state = AgentState::for_turn("42", "approve");
        state.proposed_changes = Some(std::collections::BTreeMap::from([(
            "../outside.rs".to_string(),
            "bad".to_string(),
        )]));

        let err = apply_improvements(&tc.ctx, &state).await.unwrap_err();
        assert!(err.to_string().contains("traversal"));
    }

    #[tokio::test]
    async fn test_apply_without_changes() {
        let tc = test_context(vec![]).await;
        let state = AgentState::for_turn("42", "approve");
        let update = apply_improvements(&tc.ctx, &state).await.unwrap();
        assert!(update.final_response.unwrap().contains("No changes to apply"));
    }
}
