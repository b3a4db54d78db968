pub mod check;
pub mod init;
pub mod replay;

pub use check::{check, CheckArgs};
pub use init::{init, InitArgs};
pub use replay::{replay, ReplayArgs};

use colored::Colorize;
use folio_model::{walk_node, Node, NodeContent, NodeStore, Visitor};

/// Indented outline of a document, one node per line
#[derive(Debug, Default)]
struct TreePrinter {
    out: String,
    depth: usize,
}

impl Visitor for TreePrinter {
    fn visit_node(&mut self, store: &NodeStore, node: &Node) {
        let label = match node.content() {
            NodeContent::Text(text) if text.format.is_empty() => format!(" {:?}", text.text),
            NodeContent::Text(text) => format!(" {:?} [format {}]", text.text, text.format.bits()),
            NodeContent::Data { value } => format!(" {}", value),
            NodeContent::Empty => String::new(),
        };
        self.out.push_str(&format!(
            "{}{} {}{}\n",
            "  ".repeat(self.depth),
            node.node_type().to_string().bright_white(),
            node.key().to_string().dimmed(),
            label
        ));

        self.depth += 1;
        walk_node(self, store, node);
        self.depth -= 1;
    }
}

pub(crate) fn render_tree(store: &NodeStore) -> String {
    let mut printer = TreePrinter::default();
    folio_model::walk_document(&mut printer, store);
    printer.out
}
