//! Command-line front end over a [`SessionCore`].

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::application::auth::session_decoder;
use crate::application::calls::CallConfigRequest;
use crate::application::realtime::{EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT};
use crate::domain::aggregates::CallAttemptId;
use crate::domain::entities::CallCredential;
use crate::domain::value_objects::MeetingRole;
use crate::infrastructure::SessionCore;

#[derive(Parser, Debug)]
#[command(name = "session-core")]
#[command(about = "Session, push socket and call credential tool")]
#[command(
    after_help = "Configuration: session-core.toml, SESSION_CORE__* environment variables, .env"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Decode the stored access token
    Status,

    /// Store an access token
    Login {
        /// Encoded access token
        #[arg(env = "SESSION_CORE_TOKEN")]
        token: String,
    },

    /// Remove the stored access token
    Logout,

    /// Route gate decision for a path
    Route { path: String },

    /// Request a meeting signature
    Signature {
        meeting_number: String,

        /// 0 (participant) or 1 (host)
        #[arg(value_parser = parse_role)]
        role: MeetingRole,
    },

    /// Request the credentials for a call
    #[command(subcommand)]
    CallConfig(CallConfigCommand),

    /// Print push events until interrupted
    ///
    /// Examples:
    ///   session-core listen
    ///   session-core listen --for 30 booking_update notification
    Listen {
        /// Stop after this many seconds
        #[arg(long = "for", value_parser = parse_seconds)]
        duration: Option<Duration>,

        /// Event names to print
        #[arg(default_value = "notification")]
        events: Vec<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CallConfigCommand {
    /// Signature based meeting
    Meeting {
        meeting_number: String,

        /// 0 (participant) or 1 (host)
        #[arg(value_parser = parse_role)]
        role: MeetingRole,

        user_name: String,

        password: Option<String>,
    },

    /// Token based channel for a booking
    Channel { booking_id: String },
}

impl From<CallConfigCommand> for CallConfigRequest {
    fn from(command: CallConfigCommand) -> Self {
        match command {
            CallConfigCommand::Meeting {
                meeting_number,
                role,
                user_name,
                password,
            } => CallConfigRequest::Meeting {
                meeting_number,
                role,
                user_name,
                password,
            },
            CallConfigCommand::Channel { booking_id } => CallConfigRequest::Channel { booking_id },
        }
    }
}

fn parse_role(raw: &str) -> Result<MeetingRole, String> {
    raw.parse::<u8>()
        .ok()
        .and_then(MeetingRole::from_wire)
        .ok_or_else(|| format!("role must be 0 (participant) or 1 (host), got {}", raw))
}

fn parse_seconds(raw: &str) -> Result<Duration, String> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| format!("expected whole seconds, got {}", raw))
}

fn credential_json(credential: &CallCredential) -> Value {
    match credential {
        CallCredential::Meeting(m) => json!({
            "provider": credential.provider(),
            "meetingNumber": m.meeting_number,
            "role": m.role.as_wire(),
            "userName": m.user_name,
            "signature": m.signature,
        }),
        CallCredential::Channel(c) => json!({
            "provider": credential.provider(),
            "appId": c.app_id,
            "channelName": c.channel_name,
            "uid": c.uid.value(),
            "token": c.token,
            "expiresAt": c.expires_at,
        }),
    }
}

pub async fn run(core: &SessionCore, command: Commands) -> Result<()> {
    match command {
        Commands::Status => {
            let snapshot = core.session().current();
            let report = json!({
                "storage": core.tokens().is_available(),
                "status": snapshot.status,
                "expired": session_decoder::is_expired(snapshot.claims()),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Login { token } => {
            if session_decoder::decode(&token).is_none() {
                bail!("not a decodable access token");
            }
            core.login(&token);
            info!("access token stored");
        }
        Commands::Logout => {
            core.logout();
            info!("logged out");
        }
        Commands::Route { path } => {
            println!("{}", serde_json::to_string_pretty(&core.access(&path))?);
        }
        Commands::Signature {
            meeting_number,
            role,
        } => {
            let signature = core
                .broker()
                .request_join_signature(&meeting_number, role)
                .await
                .context("signature request failed")?;
            println!("{}", signature);
        }
        Commands::CallConfig(request) => {
            let request = CallConfigRequest::from(request);
            let attempt = CallAttemptId::generate();
            let credential = core
                .broker()
                .request_call_config(request, &attempt, &CancellationToken::new())
                .await
                .context("call config request failed")?;
            println!("{}", serde_json::to_string_pretty(&credential_json(&credential))?);
        }
        Commands::Listen { events, duration } => listen(core, events, duration).await?,
    }
    Ok(())
}

async fn listen(core: &SessionCore, events: Vec<String>, duration: Option<Duration>) -> Result<()> {
    let connection = core.connect_realtime()?;

    for event in events
        .iter()
        .map(String::as_str)
        .chain([EVENT_CONNECT, EVENT_CONNECT_ERROR, EVENT_DISCONNECT])
    {
        let name = event.to_string();
        connection.on(event, move |data| {
            println!("{}", json!({ "event": name, "data": data }));
        });
    }

    connection
        .wait_connected(core.config().realtime.handshake_timeout())
        .await
        .context("push connection failed")?;
    info!(url = %connection.url(), sid = ?connection.sid(), "listening");

    let mut state = connection.state_receiver();
    let ended = async {
        while state.changed().await.is_ok() {
            if state.borrow().is_final() {
                break;
            }
        }
    };
    let limit = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        _ = limit => {}
        _ = ended => info!("push connection ended"),
    }
    connection.close();
    Ok(())
}
