use crate::output::{print_json, print_table};
use clap::Subcommand;
use roost_core::manager::ConfigManager;

#[derive(Subcommand)]
pub enum ChangesSubcommand {
    /// List scheduled changes that have not executed yet
    List {
        /// Include changes that already executed
        #[arg(long)]
        all: bool,
    },
    /// Show one scheduled change and its stored updates
    Show { id: i64 },
}

pub fn run(manager: &ConfigManager, subcmd: ChangesSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ChangesSubcommand::List { all } => list(manager, all, json),
        ChangesSubcommand::Show { id } => show(manager, id, json),
    }
}

fn list(manager: &ConfigManager, all: bool, json: bool) -> anyhow::Result<()> {
    let mut changes = manager.store().scheduled_changes()?;
    if !all {
        changes.retain(|c| !c.executed);
    }
    if json {
        return print_json(&changes);
    }
    if changes.is_empty() {
        println!("No scheduled changes.");
        return Ok(());
    }

    let rows = changes
        .iter()
        .map(|change| {
            let updates = change
                .updates
                .iter()
                .map(|u| format!("{}/{}", u.target, u.operation))
                .collect::<Vec<_>>()
                .join(", ");
            vec![
                change.id.to_string(),
                change.deadline.to_rfc3339(),
                change.user_id.to_string(),
                updates,
                if change.executed { "executed" } else { "pending" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "DEADLINE", "USER", "UPDATES", "STATE"], rows);
    Ok(())
}

fn show(manager: &ConfigManager, id: i64, json: bool) -> anyhow::Result<()> {
    let change = manager.store().scheduled_change(id)?;
    if json {
        return print_json(&change);
    }

    println!("Change {}", change.id);
    println!("  Deadline: {}", change.deadline.to_rfc3339());
    println!("  User:     {}", change.user_id);
    println!(
        "  State:    {}",
        if change.executed { "executed" } else { "pending" }
    );
    for update in &change.updates {
        let daemons = update
            .daemon_ids
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "  Update:   {} {} (daemons: {})",
            update.target, update.operation, daemons
        );
    }
    Ok(())
}
