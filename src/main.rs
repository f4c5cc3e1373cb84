mod client;
mod config;
mod credentials;
mod executor;
mod panos;
mod render;
mod ssh;
mod targets;

use crate::client::ApiClient;
use crate::config::{Scope, Settings};
use crate::credentials::CredentialError;
use crate::executor::{BatchOptions, TargetOutcome};
use crate::panos::Firewall;
use crate::render::OutputMode;
use crate::ssh::SshAuth;
use crate::targets::Resolved;
use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "panwctl",
    version,
    about = "CLI utilities for Palo Alto Networks firewalls and Panorama"
)]
struct Cli {
    #[arg(
        long,
        short = 'k',
        global = true,
        value_name = "KEY",
        help = "API key override for this invocation (otherwise read from settings)"
    )]
    key: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Verify TLS certificates (management interfaces are self-signed by default)"
    )]
    verify_tls: bool,

    #[arg(
        long,
        global = true,
        value_name = "N",
        help = "Maximum number of targets queried concurrently"
    )]
    parallel: Option<usize>,

    #[arg(
        long,
        global = true,
        value_name = "N",
        help = "Extra attempts per target after a failed query"
    )]
    retries: Option<u32>,

    #[arg(
        long,
        short = 'o',
        value_enum,
        global = true,
        help = "Output format (defaults to the saved preference, then table)"
    )]
    output: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist preferences to the chosen scope
    Configure {
        #[arg(long = "api-key", value_name = "KEY")]
        api_key: Option<String>,
        #[arg(
            long,
            value_name = "HOST",
            help = "Default firewall for single-target invocations"
        )]
        firewall: Option<String>,
        #[arg(
            long,
            value_name = "HOST",
            help = "Default Panorama host for the firewalls command"
        )]
        panorama: Option<String>,
        #[arg(long, value_name = "NAME", help = "Default API/SSH username")]
        user: Option<String>,
        #[arg(
            long,
            value_name = "DOMAIN",
            help = "DNS suffix appended to unqualified inventory hostnames"
        )]
        domain_suffix: Option<String>,
        #[arg(long, value_enum, value_name = "FORMAT", help = "Preferred output format")]
        default_output: Option<OutputMode>,
        #[arg(long, help = "Prefer SSH key based authentication")]
        key_based_auth: bool,
        #[arg(long, value_name = "FILE", help = "SSH private key file")]
        ssh_key_file: Option<PathBuf>,
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the settings (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Show the merged settings (secrets masked)
    ConfigShow,
    /// Generate API keys for one or more firewalls
    ApiKey {
        #[arg(value_name = "HOST")]
        hosts: Vec<String>,
        #[arg(long, short = 'u', value_name = "NAME", help = "API service account username")]
        user: Option<String>,
        #[arg(
            long,
            short = 'p',
            value_name = "PASSWORD",
            help = "API service account password (prompted when omitted)"
        )]
        password: Option<String>,
        #[arg(long, short = 'v', help = "Prefix each key with the host it came from")]
        verbose: bool,
        #[arg(long, help = "Save the first key to the user scope settings")]
        save: bool,
    },
    /// List firewalls known to a Panorama host
    Firewalls {
        #[arg(value_name = "PANORAMA")]
        panorama: Option<String>,
        #[arg(
            long,
            short = 's',
            value_enum,
            default_value_t = StateFilter::All,
            help = "Connection state filter"
        )]
        state: StateFilter,
        #[arg(long, short = 't', help = "Hostnames only (connected firewalls only)")]
        terse: bool,
        #[arg(long, short = 'r', help = "Raw XML output")]
        raw: bool,
    },
    /// List interfaces for one or more firewalls
    Interfaces {
        #[arg(value_name = "HOST")]
        hosts: Vec<String>,
        #[arg(long, value_enum, value_name = "STATE", help = "Filter on interface state")]
        if_state: Option<IfState>,
        #[arg(long, short = 't', help = "IPv4 addresses only")]
        terse: bool,
        #[arg(long, short = 'r', help = "Raw XML output")]
        raw: bool,
    },
    /// Fetch device configuration (XML over the API, set format over SSH)
    Config {
        #[arg(value_name = "HOST")]
        hosts: Vec<String>,
        #[arg(long, short = 'f', value_enum, default_value_t = ConfigFormat::Xml)]
        format: ConfigFormat,
        #[arg(
            long,
            short = 'x',
            value_name = "XPATH",
            help = "Show only the subtree at XPATH (XML format)"
        )]
        xpath: Option<String>,
        #[arg(
            long = "type",
            short = 'T',
            value_enum,
            default_value_t = ConfigKind::Running,
            help = "Which configuration to show (XML format)"
        )]
        kind: ConfigKind,
        #[arg(long, short = 'u', value_name = "NAME", help = "SSH username (set format)")]
        user: Option<String>,
        #[arg(long, short = 'p', value_name = "PASSWORD", help = "SSH password (set format)")]
        password: Option<String>,
        #[arg(long, short = 'K', help = "Use SSH key based authentication (set format)")]
        key_based_auth: bool,
    },
    /// Run operational CLI commands over SSH
    Run {
        #[arg(value_name = "HOST")]
        hosts: Vec<String>,
        #[arg(
            long,
            short = 'c',
            value_name = "CMD",
            required = true,
            help = "CLI command to execute (can be used multiple times)"
        )]
        command: Vec<String>,
        #[arg(long, short = 'u', value_name = "NAME", help = "SSH username")]
        user: Option<String>,
        #[arg(long, short = 'p', value_name = "PASSWORD", help = "SSH password")]
        password: Option<String>,
        #[arg(long, short = 'K', help = "Use SSH key based authentication")]
        key_based_auth: bool,
    },
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum StateFilter {
    Connected,
    Disconnected,
    NotConnected,
    Any,
    All,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum IfState {
    Up,
    Down,
}

impl IfState {
    fn as_str(self) -> &'static str {
        match self {
            IfState::Up => "up",
            IfState::Down => "down",
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum ConfigFormat {
    Xml,
    Set,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum ConfigKind {
    Running,
    Candidate,
    PushedTemplate,
    PushedSharedPolicy,
    Merged,
    Synced,
    SyncedDiff,
}

impl ConfigKind {
    fn tag(self) -> &'static str {
        match self {
            ConfigKind::Running => "running",
            ConfigKind::Candidate => "candidate",
            ConfigKind::PushedTemplate => "pushed-template",
            ConfigKind::PushedSharedPolicy => "pushed-shared-policy",
            ConfigKind::Merged => "merged",
            ConfigKind::Synced => "synced",
            ConfigKind::SyncedDiff => "synced-diff",
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("reading current directory")?;
    let settings = config::load(&cwd)?;

    let batch_opts = BatchOptions {
        parallelism: cli
            .parallel
            .or(settings.parallel)
            .unwrap_or(executor::DEFAULT_PARALLEL)
            .max(1),
        retries: cli.retries.or(settings.retries).unwrap_or(0),
    };
    let verify_tls = cli.verify_tls || settings.verify_tls;
    let output = cli
        .output
        .or(settings.output)
        .unwrap_or(OutputMode::Table);

    match cli.command {
        Commands::Configure {
            api_key,
            firewall,
            panorama,
            user,
            domain_suffix,
            default_output,
            key_based_auth,
            ssh_key_file,
            scope,
        } => {
            let mut existing = config::load_scope(scope.into(), &cwd)?;
            update(&mut existing.api_key, api_key);
            update(&mut existing.default_firewall, firewall);
            update(&mut existing.panorama, panorama);
            update(&mut existing.default_user, user);
            update(&mut existing.domain_suffix, domain_suffix);
            update(&mut existing.output, default_output);
            if key_based_auth || ssh_key_file.is_some() {
                let mut ssh_cfg = existing.ssh.unwrap_or_default();
                ssh_cfg.key_based_auth = ssh_cfg.key_based_auth || key_based_auth;
                update(&mut ssh_cfg.key_file, ssh_key_file);
                existing.ssh = Some(ssh_cfg);
            }

            let path = config::save(scope.into(), &existing, &cwd)?;
            println!("Saved settings to {}", path.display());
        }
        Commands::ConfigShow => {
            let mut masked = settings.clone();
            if masked.api_key.is_some() {
                masked.api_key = Some("*****".into());
            }
            println!("{}", serde_json::to_string_pretty(&masked)?);
        }
        Commands::ApiKey {
            hosts,
            user,
            password,
            verbose,
            save,
        } => {
            let resolved = targets::resolve(&hosts, settings.default_firewall.as_deref())?;
            run_api_key(
                &resolved,
                &settings,
                &batch_opts,
                verify_tls,
                user,
                password,
                verbose,
                save,
                &cwd,
            )?;
        }
        Commands::Firewalls {
            panorama,
            state,
            terse,
            raw,
        } => {
            let args: Vec<String> = panorama.into_iter().collect();
            let resolved = targets::resolve(
                &args,
                settings
                    .panorama
                    .as_deref()
                    .or(settings.default_firewall.as_deref()),
            )?;
            let mode = pick_mode(terse, raw, output);
            run_firewalls(&resolved, &settings, &batch_opts, verify_tls, cli.key, state, mode)?;
        }
        Commands::Interfaces {
            hosts,
            if_state,
            terse,
            raw,
        } => {
            let resolved = targets::resolve(&hosts, settings.default_firewall.as_deref())?;
            let mode = pick_mode(terse, raw, output);
            run_interfaces(
                &resolved,
                &settings,
                &batch_opts,
                verify_tls,
                cli.key,
                if_state,
                mode,
            )?;
        }
        Commands::Config {
            hosts,
            format,
            xpath,
            kind,
            user,
            password,
            key_based_auth,
        } => {
            let resolved = targets::resolve(&hosts, settings.default_firewall.as_deref())?;
            match format {
                ConfigFormat::Xml => run_config_xml(
                    &resolved,
                    &settings,
                    &batch_opts,
                    verify_tls,
                    cli.key,
                    xpath,
                    kind,
                )?,
                ConfigFormat::Set => {
                    let auth = ssh_auth(&settings, user, password, key_based_auth)?;
                    eprintln!("Connecting via SSH ...");
                    let outcomes = executor::run_batch(&resolved.targets, &batch_opts, |host| {
                        ssh::fetch_set_config(host, &auth)
                    });
                    print_blobs(&outcomes);
                    ensure_partial_success(&outcomes)?;
                }
            }
        }
        Commands::Run {
            hosts,
            command,
            user,
            password,
            key_based_auth,
        } => {
            let resolved = targets::resolve(&hosts, settings.default_firewall.as_deref())?;
            let auth = ssh_auth(&settings, user, password, key_based_auth)?;
            eprintln!("Connecting via SSH ...");
            let outcomes = executor::run_batch(&resolved.targets, &batch_opts, |host| {
                ssh::run_commands(host, &auth, &command)
            });
            for outcome in &outcomes {
                println!("{}", render::banner(&outcome.target));
                match &outcome.result {
                    Ok(sections) => {
                        for section in sections {
                            println!("{}", render::section(&section.command));
                            println!("{}", section.output);
                        }
                    }
                    Err(err) => println!("ERROR: {err}"),
                }
                println!();
            }
            ensure_partial_success(&outcomes)?;
        }
        Commands::Completion { shell } => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => {
                    generate(shells::Bash, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Zsh => {
                    generate(shells::Zsh, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::Fish => {
                    generate(shells::Fish, &mut cmd, bin, &mut std::io::stdout())
                }
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut std::io::stdout())
                }
            }
        }
    }

    Ok(())
}

fn update<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn pick_mode(terse: bool, raw: bool, fallback: OutputMode) -> OutputMode {
    if terse {
        OutputMode::Terse
    } else if raw {
        OutputMode::Raw
    } else {
        fallback
    }
}

/// Interactive prompting is only on the table when nothing is piped in and
/// a terminal is attached.
fn prompting_allowed(resolved: &Resolved) -> bool {
    !resolved.from_stdin && io::stdin().is_terminal()
}

fn resolve_key(
    explicit: Option<String>,
    settings: &Settings,
    resolved: &Resolved,
    client: &ApiClient,
) -> Result<String, CredentialError> {
    let credential = credentials::resolve_key(
        explicit,
        settings,
        prompting_allowed(resolved),
        |user, password| client.keygen(&resolved.targets[0], user, password),
    )?;
    Ok(credential.key)
}

fn ssh_auth(
    settings: &Settings,
    user: Option<String>,
    password: Option<String>,
    key_based_flag: bool,
) -> Result<SshAuth> {
    let username = credentials::resolve_user(user, settings)?;
    let ssh_settings = settings.ssh.clone().unwrap_or_default();
    let key_based = key_based_flag || ssh_settings.key_based_auth;

    if key_based {
        let key_file = ssh_settings
            .key_file
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh").join("id_rsa")))
            .ok_or_else(|| anyhow!("could not determine an SSH key file"))?;
        Ok(SshAuth {
            username,
            password: None,
            key_file: Some(key_file),
        })
    } else {
        let password = credentials::resolve_password(password, &username)?;
        Ok(SshAuth {
            username,
            password: Some(password),
            key_file: None,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn run_api_key(
    resolved: &Resolved,
    settings: &Settings,
    batch_opts: &BatchOptions,
    verify_tls: bool,
    user: Option<String>,
    password: Option<String>,
    verbose: bool,
    save: bool,
    cwd: &Path,
) -> Result<()> {
    let username = match user.or_else(|| settings.default_user.clone()) {
        Some(name) => name,
        None if prompting_allowed(resolved) => credentials::prompt_username(None)?,
        None => return Err(CredentialError::MissingUser.into()),
    };
    let password = credentials::resolve_password(password, &username)?;

    let client = ApiClient::new(verify_tls)?;
    let outcomes = executor::run_batch(resolved.targets.as_slice(), batch_opts, |host| {
        client.keygen(host, &username, &password)
    });

    let verbose = verbose || resolved.from_stdin || outcomes.len() > 1;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(key) if verbose => {
                println!("{:30}{}", format!("{}: ", outcome.target), key);
            }
            Ok(key) => println!("{key}"),
            Err(err) => eprintln!("{}: {}", outcome.target, err),
        }
    }

    if save {
        if let Some(key) = outcomes.iter().find_map(|o| o.result.as_ref().ok()) {
            let mut user_scope = config::load_scope(Scope::User, cwd)?;
            user_scope.api_key = Some(key.clone());
            user_scope.default_user = Some(username.clone());
            let path = config::save(Scope::User, &user_scope, cwd)?;
            eprintln!("Saved API key to {}", path.display());
        } else {
            eprintln!("No key generated; nothing saved");
        }
    }

    ensure_partial_success(&outcomes)
}

fn run_firewalls(
    resolved: &Resolved,
    settings: &Settings,
    batch_opts: &BatchOptions,
    verify_tls: bool,
    explicit_key: Option<String>,
    state: StateFilter,
    mode: OutputMode,
) -> Result<()> {
    let client = ApiClient::new(verify_tls)?;
    let key = resolve_key(explicit_key, settings, resolved, &client)?;

    let cmd = match state {
        StateFilter::Connected => "<show><devices><connected></connected></devices></show>",
        _ => "<show><devices><all></all></devices></show>",
    };
    let outcomes = executor::run_batch(resolved.targets.as_slice(), batch_opts, |host| {
        client.op(host, &key, cmd)
    });

    if mode == OutputMode::Raw {
        print_blobs(&outcomes);
        return ensure_partial_success(&outcomes);
    }

    let mut firewalls: Vec<Firewall> = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(xml) => match panos::parse_firewalls(xml, settings.domain_suffix.as_deref()) {
                Ok(parsed) => firewalls.extend(parsed),
                Err(err) => eprintln!("{}: {}", outcome.target, err),
            },
            Err(err) => eprintln!("{}: {}", outcome.target, err),
        }
    }

    firewalls.retain(|fw| match state {
        StateFilter::Disconnected | StateFilter::NotConnected => !fw.is_connected(),
        _ => true,
    });
    // Unknown hostnames sort last.
    firewalls.sort_by(|a, b| {
        (a.hostname == "n/a", &a.hostname).cmp(&(b.hostname == "n/a", &b.hostname))
    });

    match mode {
        OutputMode::Terse => {
            let names: Vec<&str> = firewalls
                .iter()
                .filter(|fw| fw.is_connected())
                .map(|fw| fw.hostname.as_str())
                .collect();
            print!("{}", render::terse(names));
        }
        _ => {
            let rows: Vec<Vec<String>> = firewalls
                .iter()
                .map(|fw| {
                    vec![
                        fw.hostname.clone(),
                        fw.mgmt_ip.clone(),
                        fw.serial.clone(),
                        fw.model.clone(),
                        fw.connected.clone(),
                        fw.uptime.clone(),
                        fw.sw_version.clone(),
                    ]
                })
                .collect();
            print!(
                "{}",
                render::table(
                    &[
                        "Host",
                        "MgmtIP",
                        "Serial",
                        "Model",
                        "Connected",
                        "Uptime",
                        "SwVersion",
                    ],
                    &rows
                )
            );
        }
    }

    ensure_partial_success(&outcomes)
}

fn run_interfaces(
    resolved: &Resolved,
    settings: &Settings,
    batch_opts: &BatchOptions,
    verify_tls: bool,
    explicit_key: Option<String>,
    if_state: Option<IfState>,
    mode: OutputMode,
) -> Result<()> {
    let client = ApiClient::new(verify_tls)?;
    let key = resolve_key(explicit_key, settings, resolved, &client)?;

    let outcomes = executor::run_batch(resolved.targets.as_slice(), batch_opts, |host| {
        client.op(host, &key, "<show><interface>all</interface></show>")
    });

    if mode == OutputMode::Raw {
        print_blobs(&outcomes);
        return ensure_partial_success(&outcomes);
    }

    let mut rows: Vec<(String, panos::Interface)> = Vec::new();
    for outcome in &outcomes {
        match &outcome.result {
            Ok(xml) => match panos::parse_interfaces(xml) {
                Ok(interfaces) => {
                    rows.extend(
                        interfaces
                            .into_iter()
                            .map(|iface| (outcome.target.clone(), iface)),
                    );
                }
                Err(err) => eprintln!("{}: {}", outcome.target, err),
            },
            Err(err) => eprintln!("{}: {}", outcome.target, err),
        }
    }

    if let Some(wanted) = if_state {
        rows.retain(|(_, iface)| iface.state == wanted.as_str());
    }
    rows.sort_by(|a, b| (&a.0, &a.1.name).cmp(&(&b.0, &b.1.name)));

    match mode {
        OutputMode::Terse => {
            let addresses: Vec<&str> = rows.iter().filter_map(|(_, iface)| iface.ipv4()).collect();
            print!("{}", render::terse(addresses));
        }
        _ => {
            let table_rows: Vec<Vec<String>> = rows
                .iter()
                .map(|(host, iface)| {
                    vec![
                        host.clone(),
                        iface.name.clone(),
                        iface.state.clone(),
                        iface.ip.clone(),
                    ]
                })
                .collect();
            print!(
                "{}",
                render::table(&["Firewall", "Interface", "State", "IpAddress"], &table_rows)
            );
        }
    }

    ensure_partial_success(&outcomes)
}

fn run_config_xml(
    resolved: &Resolved,
    settings: &Settings,
    batch_opts: &BatchOptions,
    verify_tls: bool,
    explicit_key: Option<String>,
    xpath: Option<String>,
    kind: ConfigKind,
) -> Result<()> {
    let client = ApiClient::new(verify_tls)?;
    let key = resolve_key(explicit_key, settings, resolved, &client)?;

    let tag = kind.tag();
    let cmd = format!("<show><config><{tag}></{tag}></config></show>");
    let outcomes = executor::run_batch(resolved.targets.as_slice(), batch_opts, |host| {
        let xml = match &xpath {
            Some(xpath) => client.config_show(host, &key, xpath)?,
            None => client.op(host, &key, &cmd)?,
        };
        panos::parse_config(xml)
    });

    print_blobs(&outcomes);
    ensure_partial_success(&outcomes)
}

/// Opaque per-target text blocks, framed per host in input order. A failed
/// target keeps its frame with an inline error so siblings stay usable.
fn print_blobs(outcomes: &[TargetOutcome<String>]) {
    for outcome in outcomes {
        println!("{}", render::banner(&outcome.target));
        match &outcome.result {
            Ok(body) => println!("{body}"),
            Err(err) => println!("ERROR: {err}"),
        }
        println!();
    }
}

/// Exit code contract: per-target failures keep the run alive, but a batch
/// with zero successes reports failure.
fn ensure_partial_success<T>(outcomes: &[TargetOutcome<T>]) -> Result<()> {
    if !outcomes.is_empty() && outcomes.iter().all(|o| o.result.is_err()) {
        return Err(anyhow!("all {} targets failed", outcomes.len()));
    }
    Ok(())
}
