use crate::output::{print_json, print_table};
use chrono::Utc;
use roost_core::manager::ConfigManager;

pub fn run(manager: &ConfigManager, json: bool) -> anyhow::Result<()> {
    let outcomes = manager.commit_due(Utc::now())?;
    if json {
        return print_json(&outcomes);
    }
    if outcomes.is_empty() {
        println!("Nothing due.");
        return Ok(());
    }

    let rows = outcomes
        .iter()
        .map(|outcome| {
            vec![
                outcome.change_id.to_string(),
                outcome.user_id.to_string(),
                outcome.deadline.to_rfc3339(),
                outcome.error.clone().unwrap_or_else(|| "ok".to_string()),
            ]
        })
        .collect();
    print_table(&["CHANGE", "USER", "DEADLINE", "RESULT"], rows);
    Ok(())
}
