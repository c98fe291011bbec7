//! Binary entrypoint for the heroledger CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and create the data directory
//! - `register <username> [--name <display>]` - create a local password account
//! - `show` - print the signed-in player's profile
//! - `train` - gain the configured training experience
//! - `assign <stat> <count>` - spend skill points on strength, defense or agility
//! - `rename <name>` - change the display name
//! - `status` - print the profile and process counters
//!
//! Every profile command signs in first, with `--user <name>` (password
//! prompted) or `--anonymous` (this installation's device identity).
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use log::{debug, info, warn};

use heroledger::auth::{AccountDirectory, LocalIdentityProvider, SignInMethod};
use heroledger::auth::local::{PASSWORD_MAX, PASSWORD_MIN};
use heroledger::config::Config;
use heroledger::metrics;
use heroledger::progression::{ProgressionModel, Stat};
use heroledger::session::{SessionEvent, SessionReconciler};
use heroledger::storage::SledProfileStoreBuilder;

#[derive(Parser)]
#[command(name = "heroledger")]
#[command(about = "Player progression with save/load reconciliation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct SignInArgs {
    /// Sign in with a local account (password prompted)
    #[arg(short, long)]
    user: Option<String>,

    /// Sign in with this installation's anonymous identity
    #[arg(short, long)]
    anonymous: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Create a local account
    Register {
        username: String,
        /// Display name (defaults to the username)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print the player's profile
    Show {
        #[command(flatten)]
        who: SignInArgs,
    },
    /// Train once for experience
    Train {
        #[command(flatten)]
        who: SignInArgs,
    },
    /// Spend skill points on a stat
    Assign {
        /// strength, defense or agility
        stat: Stat,
        #[arg(default_value_t = 1)]
        count: u32,
        #[command(flatten)]
        who: SignInArgs,
    },
    /// Change the display name
    Rename {
        name: String,
        #[command(flatten)]
        who: SignInArgs,
    },
    /// Print the profile and process counters
    Status {
        #[command(flatten)]
        who: SignInArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init writes the config, so there is nothing to load yet
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Some(Config::load(&cli.config).await?),
    };
    init_logging(&pre_config, cli.verbose);

    let Some(config) = pre_config else {
        info!("Initializing heroledger configuration");
        Config::create_default(&cli.config).await?;
        let cfg = Config::default();
        tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
        info!("Configuration file created at {}", cli.config);
        println!("Wrote {} (data directory {})", cli.config, cfg.storage.data_dir);
        return Ok(());
    };
    debug!("loaded configuration from {}", cli.config);

    match cli.command {
        Commands::Init => {}
        Commands::Register { username, name } => {
            let accounts = open_accounts(&config).await?;
            let password = prompt_new_password()?;
            let account = accounts
                .register(&username, &password, name.as_deref())
                .await?;
            println!(
                "Registered '{}' as {} ({})",
                account.username, account.display_name, account.player_id
            );
        }
        Commands::Show { who } => {
            let session = sign_in(&config, &who).await?;
            print_profile(&session);
        }
        Commands::Train { who } => {
            let session = sign_in(&config, &who).await?;
            let mut events = session.events();
            let result = session.train().await;
            report_save_failures(&mut events);
            let gained = result?;
            if gained > 0 {
                println!("Level up! (+{} level{})", gained, if gained == 1 { "" } else { "s" });
            }
            print_profile(&session);
        }
        Commands::Assign { stat, count, who } => {
            let session = sign_in(&config, &who).await?;
            let mut events = session.events();
            let result = session.assign_skill_points(stat, count).await;
            report_save_failures(&mut events);
            let value = result?;
            println!("{} is now {}", stat, value);
            print_profile(&session);
        }
        Commands::Rename { name, who } => {
            let session = sign_in(&config, &who).await?;
            let mut events = session.events();
            let result = session.update_display_name(&name).await;
            report_save_failures(&mut events);
            let confirmed = result?;
            println!("Display name is now {}", confirmed);
            print_profile(&session);
        }
        Commands::Status { who } => {
            let session = sign_in(&config, &who).await?;
            print_profile(&session);
            let m = metrics::snapshot();
            println!("--- counters (this process) ---");
            println!(
                "sign-ins: {} started, {} ok, {} failed, {} rejected",
                m.sign_ins_started, m.sign_ins_succeeded, m.sign_ins_failed, m.sign_ins_rejected
            );
            println!(
                "profiles created: {}  saves: {} ok, {} failed  level-ups: {}",
                m.profiles_created, m.saves_ok, m.saves_failed, m.level_ups
            );
        }
    }

    Ok(())
}

async fn open_accounts(config: &Config) -> Result<AccountDirectory> {
    Ok(AccountDirectory::open_with_params(config.storage.accounts_path(), config.argon2_params()).await?)
}

async fn sign_in(config: &Config, who: &SignInArgs) -> Result<SessionReconciler> {
    let method = match &who.user {
        Some(username) => SignInMethod::Password {
            username: username.clone(),
            password: rpassword::prompt_password(format!("Password for {}: ", username))?,
        },
        None if who.anonymous => SignInMethod::Anonymous,
        None => return Err(anyhow!("either --user or --anonymous is required")),
    };
    let accounts = open_accounts(config).await?;
    let store = SledProfileStoreBuilder::new(config.storage.profiles_path())
        .record_key(config.storage.profile_key.clone())
        .open()?;
    let session = SessionReconciler::new(
        Arc::new(LocalIdentityProvider::new(accounts, method)),
        Arc::new(store),
        config.codec()?,
    )
    .with_exp_per_train(config.game.exp_per_train);
    session.subscribe(|| debug!("profile changed"));

    let name = session.sign_in().await?;
    info!("Welcome, {}", name);
    Ok(session)
}

fn prompt_new_password() -> Result<String> {
    // Prompt twice without echo
    let pass1 = rpassword::prompt_password("New password: ")?;
    if pass1.len() < PASSWORD_MIN {
        return Err(anyhow!("password too short (min {})", PASSWORD_MIN));
    }
    if pass1.len() > PASSWORD_MAX {
        return Err(anyhow!("password too long"));
    }
    let pass2 = rpassword::prompt_password("Confirm password: ")?;
    if pass1 != pass2 {
        return Err(anyhow!("passwords do not match"));
    }
    Ok(pass1)
}

fn report_save_failures(events: &mut tokio::sync::broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::SaveFailed { reason } = event {
            warn!("{}", reason);
            eprintln!("Warning: change kept locally but not saved: {}", reason);
        }
    }
}

fn print_profile(session: &SessionReconciler) {
    let Some(text) = session.with_model(render_profile) else {
        println!("(not signed in)");
        return;
    };
    print!("{}", text);
}

fn render_profile(model: &ProgressionModel) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} ({})\n", model.player_name(), model.player_id()));
    out.push_str(&format!(
        "Level {}  EXP {}/{}  Skill points {}\n",
        model.level(),
        model.experience(),
        model.required_exp_for_next_level(),
        model.available_skill_points()
    ));
    for stat in Stat::ALL {
        out.push_str(&format!("  {:<9}{}\n", stat.to_string(), model.stat(stat)));
    }
    out
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level_filter())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // Sled is chatty at debug
    builder.filter_module("sled", log::LevelFilter::Warn);

    let file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    let security_path = config
        .as_ref()
        .and_then(|c| c.logging.security_file.clone());

    match file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Echo to the console only when someone is watching
            let is_tty = atty::is(atty::Stream::Stderr);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
