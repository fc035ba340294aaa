//! Command handlers: wire the CLI to the core operations and print results.

use anyhow::Context;
use tgcli_core::{
    auth,
    chats::list_chats,
    config::{self, Config},
    context::get_context,
    domain::MessageRecord,
    formatting::{self, MessageFlags},
    ports::{Authenticator, Prompter, SessionStore},
    query::{read_messages, search_messages, ReadOptions, SearchOptions},
    session::FileSessionStore,
    update, Error,
};
use tracing::{info, warn};

use crate::{
    cli::{parse_optional_date, AuthCommand, Commands},
    prompt::StdinPrompter,
    transport::{connect, Telegram},
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
const NO_MESSAGES: &str = "No messages found.";
const API_APPS_URL: &str = "https://my.telegram.org/apps";
const OP_VAULT: &str = "Personal";
const OP_ITEM: &str = "Telegram API (tgcli)";

pub async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Chats {
            filter,
            limit,
            pretty,
        } => {
            let tg = connect_authorized().await?;
            let chats = list_chats(&*tg, filter.as_deref(), limit).await?;
            if chats.is_empty() {
                println!("No chats found.");
            } else if pretty {
                print!("{}", formatting::chats_table(&chats));
            } else {
                for c in &chats {
                    println!("{}", formatting::chat_jsonl(c)?);
                }
            }
        }
        Commands::Search {
            query,
            chat,
            from_user,
            limit,
            after,
            before,
            pretty,
        } => {
            let opts = SearchOptions {
                chat,
                sender: from_user,
                limit,
                after: parse_optional_date(after.as_deref())?,
                before: parse_optional_date(before.as_deref())?,
            };
            let tg = connect_authorized().await?;
            let found = search_messages(&*tg, &query, &opts)
                .await
                .context("search failed")?;
            print_messages(&found, pretty)?;
        }
        Commands::Read {
            chat,
            limit,
            after,
            before,
            reverse,
            query,
            from_user,
            pretty,
        } => {
            let opts = ReadOptions {
                limit,
                after: parse_optional_date(after.as_deref())?,
                before: parse_optional_date(before.as_deref())?,
                reverse,
                query,
                sender: from_user,
            };
            let tg = connect_authorized().await?;
            let found = read_messages(&*tg, &chat, &opts)
                .await
                .context("read failed")?;
            print_messages(&found, pretty)?;
        }
        Commands::Thread {
            chat,
            message_id,
            context,
            pretty,
        } => {
            let tg = connect_authorized().await?;
            let ctx = get_context(&*tg, &chat, message_id, context)
                .await
                .context("thread fetch failed")?;
            if ctx.messages.is_empty() {
                println!("{NO_MESSAGES}");
            } else if pretty {
                print!("{}", formatting::thread_view(&ctx));
            } else {
                for line in formatting::thread_jsonl(&ctx)? {
                    println!("{line}");
                }
            }
        }
        Commands::Auth { command } => match command {
            None => auth_smart().await?,
            Some(AuthCommand::Login) => auth_login(&Config::load()?).await?,
            Some(AuthCommand::Logout) => auth_logout().await?,
            Some(AuthCommand::Status) => auth_status().await?,
        },
        Commands::Update => check_update_now().await?,
    }
    Ok(())
}

fn print_messages(found: &[MessageRecord], pretty: bool) -> anyhow::Result<()> {
    if found.is_empty() {
        println!("{NO_MESSAGES}");
    } else if pretty {
        print!("{}", formatting::search_table(found));
    } else {
        for m in found {
            println!("{}", formatting::message_jsonl(m, MessageFlags::default())?);
        }
    }
    Ok(())
}

fn session_store() -> tgcli_core::Result<FileSessionStore> {
    Ok(FileSessionStore::new(config::session_path()?))
}

/// Connect with the stored session and make sure it is still valid.
async fn connect_authorized() -> tgcli_core::Result<Box<dyn Telegram>> {
    let cfg = Config::load()?;
    let store = session_store()?;
    let Some(session) = store.load()? else {
        return Err(Error::Unauthorized("no saved session".to_string()));
    };
    let tg = connect(&cfg, Some(&session)).await?;
    if !tg.is_authorized().await? {
        return Err(Error::Unauthorized("session is no longer valid".to_string()));
    }
    Ok(tg)
}

/// Bootstrap config when missing, then show status or log in.
async fn auth_smart() -> anyhow::Result<()> {
    let config_path = config::default_config_path()?;
    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(Error::Config(_)) if !config_path.exists() => {
            bootstrap_config()?;
            Config::load()?
        }
        Err(e) => return Err(e.into()),
    };

    let store = session_store()?;
    if let Some(session) = store.load()? {
        let tg = connect(&cfg, Some(&session)).await?;
        let status = auth::status(&store, Some(&*tg)).await?;
        if status.authenticated {
            print!("{}", formatting::auth_status_view(&status));
            println!("Run `tg auth logout` to log out.");
            return Ok(());
        }
    }
    auth_login(&cfg).await
}

fn bootstrap_config() -> anyhow::Result<()> {
    let path = config::default_config_path()?;
    eprintln!("No config found at {}\n", path.display());
    eprintln!("You need a Telegram API app to use this tool.");
    eprintln!("Create one at {API_APPS_URL} and copy its credentials.\n");

    let mut prompter = StdinPrompter::stdin();
    let raw = prompter.prompt("API ID")?;
    let api_id = raw
        .trim()
        .parse::<i32>()
        .map_err(|_| Error::InvalidArgument(format!("API ID must be a number, got {raw:?}")))?;
    let api_hash = prompter.prompt("API Hash")?.trim().to_string();

    let written = if prompter.confirm("\nStore credentials in 1Password?", false)? {
        match config::write_config_op(api_id, &api_hash, OP_VAULT, OP_ITEM, &path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("1Password failed: {e}");
                eprintln!("Saving as plain text instead.");
                config::write_config(api_id, &api_hash, &path)?
            }
        }
    } else {
        config::write_config(api_id, &api_hash, &path)?
    };
    eprintln!("Config written to {}\n", written.display());
    Ok(())
}

async fn auth_login(cfg: &Config) -> anyhow::Result<()> {
    let store = session_store()?;
    let session = store.load()?;
    let tg = connect(cfg, session.as_deref()).await?;

    eprintln!(
        "\nLogging in to Telegram. You'll be asked for your phone number\n\
         including country code (e.g. +81 90 1234 5678). The + and any\n\
         spaces/dashes are optional, but the country code is required.\n\
         Telegram will send a verification code to your account, like\n\
         logging in on a new device. Your phone number is sent to\n\
         Telegram's API only; tgcli does not store or transmit it.\n"
    );

    let mut prompter = StdinPrompter::stdin();
    let me = auth::login(&*tg, &mut prompter, &store)
        .await
        .context("login failed")?;

    eprintln!(
        "\nUnofficial API clients are under observation by Telegram. Normal\n\
         interactive use (searching, reading your own messages) is fine. Avoid\n\
         bulk scraping, spamming, or using results for AI/ML model training.\n\
         Full terms: https://core.telegram.org/api/terms\n"
    );
    println!("Login successful. Signed in as {}.", me.display_name());
    Ok(())
}

async fn auth_logout() -> anyhow::Result<()> {
    let store = session_store()?;
    let tg = match (store.load()?, Config::load()) {
        (Some(session), Ok(cfg)) => match connect(&cfg, Some(&session)).await {
            Ok(tg) => Some(tg),
            Err(e) => {
                warn!(error = %e, "could not connect; deleting the local session only");
                None
            }
        },
        _ => None,
    };
    let remote = auth::logout(tg.as_deref(), &store)
        .await
        .context("logout failed")?;
    info!(remote, "session removed");
    println!("Logged out.");
    Ok(())
}

async fn auth_status() -> anyhow::Result<()> {
    let store = session_store()?;
    let tg = match store.load()? {
        Some(session) => Some(connect(&Config::load()?, Some(&session)).await?),
        None => None,
    };
    let status = auth::status(&store, tg.as_deref()).await?;
    print!("{}", formatting::auth_status_view(&status));
    Ok(())
}

async fn check_update_now() -> anyhow::Result<()> {
    let path = config::update_state_path()?;
    update::clear_update_state(&path);
    match update::check_for_update(&path, VERSION).await {
        Some(latest) => println!(
            "{}",
            update::format_update_notice(VERSION, &latest, update::detect_install_method())
        ),
        None => println!("tg {VERSION} is up to date."),
    }
    Ok(())
}

/// Best-effort notice after a successful command; never fails.
pub async fn notify_update() {
    let Ok(path) = config::update_state_path() else {
        return;
    };
    if let Some(latest) = update::check_for_update(&path, VERSION).await {
        eprintln!(
            "{}",
            update::format_update_notice(VERSION, &latest, update::detect_install_method())
        );
    }
}
