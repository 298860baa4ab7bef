//! Permission catalog listing

use crate::gateway::permissions::CATALOG;

pub fn cmd_permissions() {
    println!("Known permissions ({} total)", CATALOG.len());
    println!("{:-<70}", "");

    for permission in CATALOG {
        let marker = if permission.privileged { "⚠" } else { "•" };
        println!("{marker} {:<28} {}", permission.name, permission.description);
    }

    println!();
    println!("Legend: ⚠ Privileged");
}
