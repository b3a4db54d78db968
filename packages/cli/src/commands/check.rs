use super::render_tree;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use folio_editor::{EditorState, SerializedState};
use folio_model::NodeRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Serialized document (JSON)
    pub input: PathBuf,

    /// Print the node tree after validating
    #[arg(short, long)]
    pub tree: bool,
}

/// Read and re-validate a serialized document
pub(crate) fn load_document(path: &Path, registry: Arc<NodeRegistry>) -> Result<EditorState> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let serialized: SerializedState =
        serde_json::from_str(&content).with_context(|| format!("{} is not a serialized document", path.display()))?;
    let state = EditorState::from_serialized(registry, &serialized)
        .with_context(|| format!("{} is not a valid document", path.display()))?;
    state.store().validate()?;
    Ok(state)
}

pub fn check(args: CheckArgs, cwd: &Path) -> Result<()> {
    let path = cwd.join(&args.input);
    let state = load_document(&path, Arc::new(NodeRegistry::with_defaults()))?;
    info!(path = %path.display(), nodes = state.store().len(), "document loaded");

    println!(
        "{} {} ({} nodes)",
        "✓".green(),
        args.input.display(),
        state.store().len()
    );
    if args.tree {
        println!();
        print!("{}", render_tree(state.store()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_check_accepts_exported_document() {
        let dir = tempfile::tempdir().unwrap();
        let state = EditorState::empty(Arc::new(NodeRegistry::with_defaults())).unwrap();
        let json = serde_json::to_string_pretty(&state.to_serialized().unwrap()).unwrap();
        fs::write(dir.path().join("doc.json"), json).unwrap();

        let args = CheckArgs {
            input: PathBuf::from("doc.json"),
            tree: true,
        };
        check(args, dir.path()).unwrap();
    }

    #[test]
    fn test_check_rejects_text_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{
            "root": {
                "key": 1,
                "type": "root",
                "content": { "kind": "empty" },
                "children": [
                    { "key": 2, "type": "text", "content": { "kind": "text", "text": "loose", "format": 0 } }
                ]
            }
        }"#;
        fs::write(dir.path().join("bad.json"), json).unwrap();

        let args = CheckArgs {
            input: PathBuf::from("bad.json"),
            tree: false,
        };
        assert!(check(args, dir.path()).is_err());
    }
}
