//! blueprint: command-line client for the support-policy service.
//!
//! Logs in and out, checks sign-up details, and lists or filters policies.
//! The session token is kept between runs in `~/.config/blueprint/session.toml`.

mod config;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blueprint_sdk::{
    ApiClient, FileStore, FilterCriteria, KeyValueStore, Member, MemberRegistration, MemoryStore,
    PolicyDetail, PolicyStore, PolicySummary, SessionStore,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use config::{Config, Resolved};

#[derive(Parser)]
#[command(name = "blueprint", about = "Browse support policies and manage your member session")]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "BLUEPRINT_API_URL", global = true)]
    api_url: Option<String>,

    /// File the session token is stored in
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and remember the session
    Login {
        member_id: String,
        /// Prompted for when omitted
        #[arg(long, env = "BLUEPRINT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Create an account (logs in on success)
    Register {
        member_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "BLUEPRINT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Extra profile field, KEY=VALUE (repeatable)
        #[arg(long = "field", value_parser = parse_key_val)]
        fields: Vec<(String, String)>,
    },
    /// Forget the stored session
    Logout,
    /// Show the member the stored token belongs to
    Whoami,
    /// Fetch the member profile from the server
    Mypage,
    /// Check whether a member id is free
    CheckId { member_id: String },
    /// Check whether an email is free
    CheckEmail { email: String },
    /// Send an email verification code
    SendCode { email: String },
    /// Verify an emailed code
    VerifyCode { email: String, code: String },
    /// Browse support policies
    Policies {
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

#[derive(Subcommand)]
enum PolicyCommand {
    /// List policies, optionally filtered
    List {
        /// Substring of the policy's city
        #[arg(long)]
        region: Option<String>,
        /// Substring of the policy's category text
        #[arg(long)]
        job: Option<String>,
        /// Age that must fall in the policy's "N세 ~ M세" range
        #[arg(long)]
        age: Option<u32>,
        /// Substring of the policy's category text
        #[arg(long)]
        income: Option<String>,
        /// Substring of the policy name
        #[arg(long = "name")]
        policy_name: Option<String>,
    },
    /// Show one policy in detail
    Show { idx: i64 },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}

fn prompt_password() -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "Password: ")?;
    stderr.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn show(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or("-")
}

fn print_policies(policies: &[&PolicySummary]) {
    for p in policies {
        println!("{:>6}  {}  {}", p.idx, show(&p.city), show(&p.name));
        println!("        {}", show(&p.kind));
        if p.apply_start_date.is_some() || p.apply_end_date.is_some() {
            println!(
                "        apply {} ~ {}",
                show(&p.apply_start_date),
                show(&p.apply_end_date)
            );
        }
    }
    println!("{} policies", policies.len());
}

fn print_detail(d: &PolicyDetail) {
    println!("#{} {}", d.idx, show(&d.subject));
    for (label, value) in [
        ("condition", &d.condition),
        ("content", &d.content),
        ("scale", &d.scale),
        ("enquiry", &d.enquiry),
        ("how to apply", &d.way),
        ("documents", &d.document),
        ("url", &d.url),
    ] {
        if let Some(v) = value {
            println!("  {label:<13} {v}");
        }
    }
}

fn describe_member(member: &Member) -> String {
    format!("{} ({})", member.member_name, member.member_id)
}

/// The session file, or an in-memory store when it can't be read at all.
fn open_storage(path: &Path) -> Arc<dyn KeyValueStore> {
    match FileStore::open_or_reset(path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Session will not be saved: {e}");
            Arc::new(MemoryStore::new())
        }
    }
}

fn print_flag(json: bool, key: &str, value: bool, yes: &str, no: &str) -> Result<()> {
    if json {
        print_json(&serde_json::json!({ key: value }))
    } else {
        println!("{}", if value { yes } else { no });
        Ok(())
    }
}

fn init_logging() {
    // Logs go to stderr so stdout stays clean for --json.
    let json_logs = std::env::var("BLUEPRINT_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "blueprint=info,blueprint_sdk=info".into());
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let config = Config::load();
    let resolved = Resolved::merge(cli.api_url.as_deref(), cli.session_file.as_deref(), &config);
    tracing::debug!("Using backend {}", resolved.api_url);

    let api = Arc::new(ApiClient::new(resolved.api_url.as_str()));
    let storage = open_storage(&resolved.session_file);
    let mut session = SessionStore::restore(api.clone(), storage);

    match cli.command {
        Command::Login {
            member_id,
            password,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password()?,
            };
            session
                .login(&member_id, &password)
                .await
                .map_err(|e| anyhow::anyhow!("Login failed: {e}"))?;
            if let Some(m) = session.member() {
                println!("Logged in as {}", describe_member(m));
            }
        }
        Command::Register {
            member_id,
            name,
            email,
            password,
            fields,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password()?,
            };
            let mut form = MemberRegistration {
                member_id,
                password,
                member_name: name,
                email,
                ..Default::default()
            };
            for (k, v) in fields {
                form.extra.insert(k, serde_json::Value::String(v));
            }
            session
                .register(&form)
                .await
                .map_err(|e| anyhow::anyhow!("Registration failed: {e}"))?;
            if let Some(m) = session.member() {
                println!("Registered and logged in as {}", describe_member(m));
            }
        }
        Command::Logout => {
            session.logout();
            println!("Logged out");
        }
        Command::Whoami => match session.member() {
            Some(member) if cli.json => print_json(member)?,
            Some(member) => {
                println!("{}", describe_member(member));
                if let Some(at) = session.claims().and_then(|c| c.expires_at()) {
                    let local = at.with_timezone(&chrono::Local);
                    println!("session expires {}", local.format("%Y-%m-%d %H:%M"));
                }
            }
            None => anyhow::bail!("Not logged in"),
        },
        Command::Mypage => {
            if !session.is_logged_in() {
                anyhow::bail!("Not logged in");
            }
            if !session.fetch_my_page().await {
                anyhow::bail!("Could not fetch profile");
            }
            if let Some(member) = session.member() {
                if cli.json {
                    print_json(member)?;
                } else {
                    println!("{}", describe_member(member));
                    for (k, v) in &member.extra {
                        println!("  {k}: {v}");
                    }
                }
            }
        }
        Command::CheckId { member_id } => {
            let free = session.check_member_id(&member_id).await;
            print_flag(cli.json, "available", free, "available", "unavailable")?;
        }
        Command::CheckEmail { email } => {
            let free = session.check_email_duplicate(&email).await;
            print_flag(cli.json, "available", free, "available", "unavailable")?;
        }
        Command::SendCode { email } => {
            let sent = session.send_email_verification(&email).await;
            print_flag(cli.json, "sent", sent, "verification code sent", "could not send code")?;
        }
        Command::VerifyCode { email, code } => {
            let ok = session.verify_email_code(&email, &code).await;
            print_flag(cli.json, "verified", ok, "email verified", "code rejected")?;
        }
        Command::Policies { command } => {
            let mut policies = PolicyStore::new(api);
            match command {
                PolicyCommand::List {
                    region,
                    job,
                    age,
                    income,
                    policy_name,
                } => {
                    policies
                        .get_policy_info()
                        .await
                        .context("Failed to fetch policy list")?;
                    let criteria = FilterCriteria {
                        region,
                        job,
                        age,
                        income,
                        policy_name,
                    };
                    let found = policies.filter_policies(&criteria);
                    if cli.json {
                        print_json(&found)?;
                    } else {
                        print_policies(&found);
                    }
                }
                PolicyCommand::Show { idx } => {
                    let detail = policies
                        .get_policy_detail(idx)
                        .await
                        .with_context(|| format!("Failed to fetch policy {idx}"))?;
                    if cli.json {
                        print_json(detail)?;
                    } else {
                        print_detail(detail);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("phone=010-1234-5678").unwrap(),
            ("phone".to_string(), "010-1234-5678".to_string())
        );
        assert_eq!(parse_key_val("note=a=b").unwrap().1, "a=b");
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_describe_member() {
        let member = Member {
            member_id: "hong123".into(),
            member_name: "홍길동".into(),
            ..Default::default()
        };
        assert_eq!(describe_member(&member), "홍길동 (hong123)");
    }

    #[test]
    fn test_open_storage_survives_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(&path, "not = = toml").unwrap();
        let storage = open_storage(&path);
        assert_eq!(storage.get("token").unwrap(), None);
        storage.remove("token").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_open_storage_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory can't be read as a file.
        let storage = open_storage(dir.path());
        storage.set("token", "abc").unwrap();
        assert_eq!(storage.get("token").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_policy_filters_parse() {
        let cli = Cli::parse_from([
            "blueprint", "policies", "list", "--region", "서울", "--age", "27", "--name", "청년",
        ]);
        match cli.command {
            Command::Policies {
                command:
                    PolicyCommand::List {
                        region,
                        age,
                        policy_name,
                        job,
                        income,
                    },
            } => {
                assert_eq!(region.as_deref(), Some("서울"));
                assert_eq!(age, Some(27));
                assert_eq!(policy_name.as_deref(), Some("청년"));
                assert!(job.is_none() && income.is_none());
            }
            _ => panic!("expected policies list"),
        }
    }
}
