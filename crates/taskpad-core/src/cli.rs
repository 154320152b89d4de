use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::view::Tab;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "taskpad",
    version,
    about = "Taskpad: a terminal client for the Taskpad to-do service",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sign in with username and password.
    Login {
        username: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign in with a Google ID token credential.
    Google { credential: String },
    Logout,
    /// Create an account.
    Register {
        #[arg(long = "name")]
        full_name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long = "confirm")]
        confirm_password: Option<String>,
    },
    /// Ask the server to mail a password reset link.
    ResetPassword { email: String },
    /// Set a new password from the uid and token of a reset link.
    ConfirmReset {
        uid: String,
        token: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long = "confirm")]
        confirm_password: Option<String>,
    },
    VerifyEmail { uid: String, token: String },
    /// Show who is signed in on this machine.
    Whoami,
    /// Show or change the account profile.
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long = "confirm")]
        confirm_password: Option<String>,
    },
    /// List tasks for a tab.
    List {
        /// Defaults to the last tab shown.
        #[arg(long)]
        tab: Option<Tab>,
        #[arg(long, short = 's', default_value = "")]
        search: String,
        /// Read the local cache without contacting the server.
        #[arg(long)]
        offline: bool,
    },
    Add(AddArgs),
    Edit(EditArgs),
    /// Flip a task's completed flag, or its important flag.
    Toggle {
        id: String,
        #[arg(long)]
        important: bool,
    },
    Delete { id: String },
    /// Print the effective configuration.
    Config,
    /// Show or change remembered preferences.
    Prefs {
        #[arg(long)]
        tab: Option<Tab>,
        #[arg(long)]
        sidebar_collapsed: Option<bool>,
    },
}

impl Command {
    /// Name for logs; the variants themselves may carry passwords.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::Google { .. } => "google",
            Command::Logout => "logout",
            Command::Register { .. } => "register",
            Command::ResetPassword { .. } => "reset-password",
            Command::ConfirmReset { .. } => "confirm-reset",
            Command::VerifyEmail { .. } => "verify-email",
            Command::Whoami => "whoami",
            Command::Profile { .. } => "profile",
            Command::List { .. } => "list",
            Command::Add(_) => "add",
            Command::Edit(_) => "edit",
            Command::Toggle { .. } => "toggle",
            Command::Delete { .. } => "delete",
            Command::Config => "config",
            Command::Prefs { .. } => "prefs",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    pub title: String,
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    /// today, tomorrow, a weekday, +3d, +1w or YYYY-MM-DD.
    #[arg(long)]
    pub due: Option<String>,
    /// e.g. "3:30 PM" or 15:30.
    #[arg(long)]
    pub at: Option<String>,
    #[arg(long)]
    pub important: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    /// An empty value clears it.
    #[arg(long, short = 'd')]
    pub description: Option<String>,
    /// "none" clears the due date and time.
    #[arg(long)]
    pub due: Option<String>,
    /// "none" clears the time.
    #[arg(long)]
    pub at: Option<String>,
    #[arg(long)]
    pub important: Option<bool>,
    #[arg(long)]
    pub completed: Option<bool>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
