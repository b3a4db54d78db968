use super::check::load_document;
use super::render_tree;
use crate::config::CliConfig;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use folio_editor::{CommitOutcome, EditOp, Editor, EditorState, UpdateRequest, UpdateTags};
use folio_model::NodeRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Edit script (JSON)
    pub script: PathBuf,

    /// Start from this serialized document instead of the script's own
    #[arg(short, long)]
    pub document: Option<PathBuf>,

    /// Write the final document as JSON to this file
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Print the final document as JSON instead of a tree
    #[arg(long)]
    pub json: bool,
}

/// A sequence of edits run through one editor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// Starting document; an empty one when absent
    #[serde(default)]
    pub document: Option<folio_editor::SerializedState>,

    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ScriptStep {
    /// One update request
    Update {
        ops: Vec<EditOp>,
        #[serde(default)]
        tags: UpdateTags,
    },
    Undo,
    Redo,
}

/// Run every step; a rejected update is reported and the replay continues
pub(crate) fn run_script(editor: &mut Editor, script: &Script) -> Vec<(usize, Result<Vec<CommitOutcome>>)> {
    let mut results = Vec::with_capacity(script.steps.len());
    for (i, step) in script.steps.iter().enumerate() {
        let result: Result<Vec<CommitOutcome>> = match step {
            ScriptStep::Update { ops, tags } => editor
                .update(UpdateRequest::ops(ops.clone()).with_tags(tags.clone()))
                .map_err(anyhow::Error::from),
            ScriptStep::Undo => editor.undo().map(|o| o.into_iter().collect()).map_err(anyhow::Error::from),
            ScriptStep::Redo => editor.redo().map(|o| o.into_iter().collect()).map_err(anyhow::Error::from),
        };
        if let Err(err) = &result {
            warn!(step = i, error = %err, "step rejected");
        }
        results.push((i, result));
    }
    results
}

fn print_outcome(step: usize, outcome: &CommitOutcome) -> Result<()> {
    println!(
        "{} step {} → v{} ({:?}{})",
        "●".cyan(),
        step,
        outcome.version,
        outcome.history,
        if outcome.skipped > 0 {
            format!(", {} skipped", outcome.skipped)
        } else {
            String::new()
        }
    );
    for mutation in &outcome.mutations {
        println!("    {}", serde_json::to_string(mutation)?);
    }
    if outcome.mutations.is_empty() && outcome.selection_changed {
        println!("    {}", "selection only".dimmed());
    }
    Ok(())
}

pub fn replay(args: ReplayArgs, cwd: &Path, config: &CliConfig) -> Result<()> {
    let registry = Arc::new(NodeRegistry::with_defaults());
    let script_path = cwd.join(&args.script);
    let content = std::fs::read_to_string(&script_path)
        .with_context(|| format!("cannot read {}", script_path.display()))?;
    let script: Script = serde_json::from_str(&content)
        .with_context(|| format!("{} is not an edit script", script_path.display()))?;

    let state = match (&args.document, &script.document) {
        (Some(path), _) => load_document(&cwd.join(path), Arc::clone(&registry))?,
        (None, Some(serialized)) => EditorState::from_serialized(Arc::clone(&registry), serialized)?,
        (None, None) => EditorState::empty(Arc::clone(&registry))?,
    };
    let mut editor = Editor::with_state(state, config.editor.clone());
    info!(steps = script.steps.len(), "replaying script");

    let mut failures = 0;
    for (step, result) in run_script(&mut editor, &script) {
        match result {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    print_outcome(step, outcome)?;
                }
            }
            Err(err) => {
                failures += 1;
                println!("{} step {} {}", "✗".red(), step, err);
            }
        }
    }

    let serialized = editor.state().to_serialized()?;
    if let Some(out) = &args.out {
        std::fs::write(cwd.join(out), serde_json::to_string_pretty(&serialized)?)?;
    }

    println!();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&serialized)?);
    } else {
        print!("{}", render_tree(editor.state().store()));
    }
    println!();
    println!(
        "{} v{}, {} undo level(s), {} step(s) rejected",
        "Done".green().bold(),
        editor.state().version(),
        editor.history().undo_len(),
        failures
    );
    Ok(())
}
