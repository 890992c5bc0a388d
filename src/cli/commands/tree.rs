//! Tree command implementation.

use crate::cli::{CommandContext, TreeArgs};
use crate::error::Result;
use crate::model::{TreeDirection, TreeNode};

/// Print the dependency tree around one task.
///
/// # Errors
///
/// Returns [`crate::StoreError::TaskNotFound`] for an unknown id.
pub fn execute(args: &TreeArgs, ctx: &CommandContext) -> Result<()> {
    let storage = ctx.open()?;
    let nodes = storage.get_dependency_tree(&args.id)?;
    ctx.emit(&nodes, |nodes| print_tree(&args.id, nodes))
}

fn print_tree(origin: &str, nodes: &[TreeNode]) {
    if nodes.is_empty() {
        println!("{origin} has no dependencies.");
        return;
    }
    for direction in [TreeDirection::Upstream, TreeDirection::Downstream] {
        let section: Vec<&TreeNode> = nodes.iter().filter(|n| n.direction == direction).collect();
        if section.is_empty() {
            continue;
        }
        match direction {
            TreeDirection::Upstream => println!("{origin} is blocked by:"),
            TreeDirection::Downstream => println!("{origin} blocks:"),
        }
        for node in section {
            println!(
                "{}{} [{}] {}",
                "  ".repeat(node.depth),
                node.id,
                node.status,
                node.title
            );
        }
    }
}
