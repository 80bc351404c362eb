use crate::output::{print_json, print_table};
use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use roost_core::host::{Host, HostIdentifier, IdentifierKind, LocalHost, LocalSubnet, Subnet};
use roost_core::manager::{ChangeRequest, ConfigManager};

/// Deferral flags shared by every mutating subcommand. Without `--at`
/// the change commits immediately.
#[derive(Args)]
pub struct ScheduleArgs {
    /// Defer execution until this RFC 3339 deadline instead of
    /// committing now
    #[arg(long, value_name = "WHEN")]
    at: Option<DateTime<Utc>>,
    /// User id owning the scheduled change
    #[arg(long, value_name = "ID")]
    user: Option<i64>,
}

#[derive(Args)]
pub struct HostOptions {
    /// Hostname to reserve
    #[arg(long)]
    hostname: Option<String>,
    /// Host identifier as KIND:HEX, e.g. hw-address:01:02:03:04:05:06
    /// (repeatable)
    #[arg(long = "identifier", value_name = "KIND:HEX")]
    identifiers: Vec<String>,
    /// Reserved IP address, or prefix in PREFIX/LEN form (repeatable)
    #[arg(long = "ip", value_name = "ADDR")]
    ips: Vec<String>,
    /// Subnet id the reservation lives in, applied to every daemon
    /// (omit for a global reservation)
    #[arg(long, value_name = "ID")]
    subnet_id: Option<i64>,
    /// Address of the boot server
    #[arg(long, value_name = "ADDR")]
    next_server: Option<String>,
    /// Hostname of the boot server
    #[arg(long, value_name = "NAME")]
    server_hostname: Option<String>,
    /// Boot file name to send to the client
    #[arg(long, value_name = "PATH")]
    boot_file: Option<String>,
    /// Client class to assign (repeatable)
    #[arg(long = "class", value_name = "NAME")]
    classes: Vec<String>,
}

#[derive(Subcommand)]
pub enum HostSubcommand {
    /// Reserve a host on one or more daemons
    Add {
        /// Daemon id that should serve the reservation (repeatable)
        #[arg(long = "daemon", value_name = "ID", required = true)]
        daemons: Vec<i64>,
        #[command(flatten)]
        options: HostOptions,
        #[command(flatten)]
        schedule: ScheduleArgs,
    },
    /// Update an existing reservation
    Update {
        id: i64,
        #[command(flatten)]
        options: HostOptions,
        #[command(flatten)]
        schedule: ScheduleArgs,
    },
    /// Delete a reservation from every daemon serving it
    Delete {
        id: i64,
        #[command(flatten)]
        schedule: ScheduleArgs,
    },
    /// List reservations
    List,
    /// Show one reservation
    Show { id: i64 },
}

pub fn run(manager: &ConfigManager, subcmd: HostSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        HostSubcommand::Add {
            daemons,
            options,
            schedule,
        } => add(manager, &daemons, &options, schedule, json),
        HostSubcommand::Update {
            id,
            options,
            schedule,
        } => update(manager, id, &options, schedule, json),
        HostSubcommand::Delete { id, schedule } => delete(manager, id, schedule, json),
        HostSubcommand::List => list(manager, json),
        HostSubcommand::Show { id } => show(manager, id, json),
    }
}

fn parse_identifiers(raw: &[String]) -> anyhow::Result<Vec<HostIdentifier>> {
    raw.iter()
        .map(|s| {
            let (kind, hex) = s
                .split_once(':')
                .with_context(|| format!("invalid identifier '{s}': expected KIND:HEX"))?;
            let kind: IdentifierKind = kind.parse()?;
            Ok(HostIdentifier::parse(kind, hex)?)
        })
        .collect()
}

fn add(
    manager: &ConfigManager,
    daemons: &[i64],
    options: &HostOptions,
    schedule: ScheduleArgs,
    json: bool,
) -> anyhow::Result<()> {
    let identifiers = parse_identifiers(&options.identifiers)?;
    if identifiers.is_empty() {
        bail!("at least one --identifier is required");
    }

    let mut host = Host {
        hostname: options.hostname.clone().unwrap_or_default(),
        identifiers,
        ip_reservations: options.ips.clone(),
        ..Default::default()
    };
    for &daemon_id in daemons {
        let mut lh = LocalHost::new(daemon_id);
        lh.next_server = options.next_server.clone();
        lh.server_hostname = options.server_hostname.clone();
        lh.boot_file_name = options.boot_file.clone();
        lh.client_classes = options.classes.clone();
        host.local_hosts.push(lh);
    }
    if let Some(subnet_id) = options.subnet_id {
        host.subnet = Some(subnet_on_daemons(daemons, subnet_id));
    }
    manager.store().hydrate_host(&mut host)?;

    let mut request = manager.kea().begin_host_add()?;
    manager.kea().apply_host_add(&mut request, &host)?;
    finish(manager, request, schedule, json, "host add")
}

fn update(
    manager: &ConfigManager,
    id: i64,
    options: &HostOptions,
    schedule: ScheduleArgs,
    json: bool,
) -> anyhow::Result<()> {
    let mut request = manager.kea().begin_host_update(id)?;

    let mut host = manager.store().host(id)?;
    if let Some(hostname) = &options.hostname {
        host.hostname = hostname.clone();
    }
    if !options.identifiers.is_empty() {
        host.identifiers = parse_identifiers(&options.identifiers)?;
    }
    if !options.ips.is_empty() {
        host.ip_reservations = options.ips.clone();
    }
    if let Some(subnet_id) = options.subnet_id {
        let daemons: Vec<i64> = host.daemon_ids();
        host.subnet = Some(subnet_on_daemons(&daemons, subnet_id));
    }
    for lh in &mut host.local_hosts {
        if options.next_server.is_some() {
            lh.next_server = options.next_server.clone();
        }
        if options.server_hostname.is_some() {
            lh.server_hostname = options.server_hostname.clone();
        }
        if options.boot_file.is_some() {
            lh.boot_file_name = options.boot_file.clone();
        }
        if !options.classes.is_empty() {
            lh.client_classes = options.classes.clone();
        }
    }

    manager.kea().apply_host_update(&mut request, &host)?;
    finish(manager, request, schedule, json, "host update")
}

fn delete(
    manager: &ConfigManager,
    id: i64,
    schedule: ScheduleArgs,
    json: bool,
) -> anyhow::Result<()> {
    let host = manager.store().host(id)?;
    let request = manager.kea().apply_host_delete(&host)?;
    finish(manager, request, schedule, json, "host delete")
}

fn subnet_on_daemons(daemons: &[i64], subnet_id: i64) -> Subnet {
    Subnet {
        prefix: None,
        local_subnets: daemons
            .iter()
            .map(|&daemon_id| LocalSubnet {
                daemon_id,
                local_subnet_id: subnet_id,
            })
            .collect(),
    }
}

/// Commit the staged request now, or persist it for the sweep when a
/// deadline was given.
fn finish(
    manager: &ConfigManager,
    mut request: ChangeRequest,
    schedule: ScheduleArgs,
    json: bool,
    what: &str,
) -> anyhow::Result<()> {
    match schedule.at {
        Some(deadline) => {
            if let Some(user) = schedule.user {
                request.set_user(user);
            }
            let id = manager.schedule(request, deadline)?;
            if json {
                print_json(&serde_json::json!({
                    "scheduled_change": id,
                    "deadline": deadline,
                }))?;
            } else {
                println!("Scheduled {what} as change {id}, due {deadline}.");
            }
        }
        None => {
            manager.commit(request)?;
            if json {
                print_json(&serde_json::json!({ "committed": what }))?;
            } else {
                println!("Committed {what}.");
            }
        }
    }
    Ok(())
}

fn list(manager: &ConfigManager, json: bool) -> anyhow::Result<()> {
    let hosts = manager.store().hosts()?;
    if json {
        return print_json(&hosts);
    }

    let rows = hosts
        .iter()
        .map(|host| {
            let identifiers = host
                .identifiers
                .iter()
                .map(|i| format!("{}={}", i.kind, i.to_hex()))
                .collect::<Vec<_>>()
                .join(", ");
            let daemons = host
                .local_hosts
                .iter()
                .map(|lh| match &lh.daemon {
                    Some(daemon) => format!("{} ({})", daemon.id, daemon.name),
                    None => lh.daemon_id.to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            vec![
                host.id.to_string(),
                host.hostname.clone(),
                identifiers,
                host.ip_reservations.join(", "),
                daemons,
            ]
        })
        .collect();
    print_table(&["ID", "HOSTNAME", "IDENTIFIERS", "IPS", "DAEMONS"], rows);
    Ok(())
}

fn show(manager: &ConfigManager, id: i64, json: bool) -> anyhow::Result<()> {
    let host = manager.store().host(id)?;
    if json {
        return print_json(&host);
    }

    println!("Host {}", host.id);
    if !host.hostname.is_empty() {
        println!("  Hostname:    {}", host.hostname);
    }
    for identifier in &host.identifiers {
        println!("  Identifier:  {} {}", identifier.kind, identifier.to_hex());
    }
    for ip in &host.ip_reservations {
        println!("  Reservation: {ip}");
    }
    for lh in &host.local_hosts {
        let subnet_id = host.local_subnet_id(lh.daemon_id);
        let daemon_line = match &lh.daemon {
            Some(daemon) => match &daemon.app {
                Some(app) => format!("{} ({}) on {}", daemon.id, daemon.name, app.name),
                None => format!("{} ({})", daemon.id, daemon.name),
            },
            None => format!("{} (unresolved)", lh.daemon_id),
        };
        println!("  Daemon:      {daemon_line}, subnet {subnet_id}");
    }
    Ok(())
}
