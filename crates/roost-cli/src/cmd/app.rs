use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use roost_core::app::{AccessPoint, App, AppKind, AppRef, Daemon};
use roost_core::manager::ConfigManager;

#[derive(Subcommand)]
pub enum AppSubcommand {
    /// Register an app and the daemons it runs
    Register {
        /// App name, e.g. kea@dhcp1.example.org
        name: String,
        /// Control access point address
        #[arg(long)]
        address: String,
        /// Control access point port
        #[arg(long, default_value = "8000")]
        port: u16,
        /// Control channel uses TLS
        #[arg(long)]
        secure: bool,
        /// Daemon as ID:NAME, e.g. --daemon 1:dhcp4 (repeatable)
        #[arg(long = "daemon", value_name = "ID:NAME", required = true)]
        daemons: Vec<String>,
    },
    /// List registered apps
    List,
}

pub fn run(manager: &ConfigManager, subcmd: AppSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AppSubcommand::Register {
            name,
            address,
            port,
            secure,
            daemons,
        } => register(manager, &name, &address, port, secure, &daemons, json),
        AppSubcommand::List => list(manager, json),
    }
}

fn parse_daemon(raw: &str) -> anyhow::Result<Daemon> {
    let (id, name) = raw
        .split_once(':')
        .with_context(|| format!("invalid daemon '{raw}': expected ID:NAME"))?;
    let id: i64 = id
        .parse()
        .with_context(|| format!("invalid daemon id in '{raw}'"))?;
    if name.is_empty() {
        bail!("invalid daemon '{raw}': empty name");
    }
    Ok(Daemon {
        id,
        name: name.to_string(),
    })
}

fn register(
    manager: &ConfigManager,
    name: &str,
    address: &str,
    port: u16,
    secure: bool,
    daemons: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let daemons = daemons
        .iter()
        .map(|raw| parse_daemon(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let app = App {
        id: 0,
        name: name.to_string(),
        kind: AppKind::Kea,
        access_points: vec![AccessPoint::control(address, port, secure)],
        daemons,
    };
    let id = manager
        .store()
        .add_app(&app)
        .context("failed to register app")?;

    if json {
        print_json(&serde_json::json!({ "id": id, "name": name }))?;
    } else {
        println!("Registered app '{name}' as {id}.");
    }
    Ok(())
}

fn list(manager: &ConfigManager, json: bool) -> anyhow::Result<()> {
    let apps = manager.store().apps()?;
    if json {
        return print_json(&apps);
    }

    let rows = apps
        .iter()
        .map(|app| {
            let control = AppRef::from(app).control_url().unwrap_or_default();
            let daemons = app
                .daemons
                .iter()
                .map(|d| format!("{}:{}", d.id, d.name))
                .collect::<Vec<_>>()
                .join(", ");
            vec![app.id.to_string(), app.name.clone(), control, daemons]
        })
        .collect();
    print_table(&["ID", "NAME", "CONTROL", "DAEMONS"], rows);
    Ok(())
}
