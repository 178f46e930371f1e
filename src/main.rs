use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tokio::io::BufReader;

use user_desk::config::ClientConfig;
use user_desk::error::ToEnhanced;
use user_desk::model::{User, UserId};
use user_desk::push::ConnectionManager;
use user_desk::reconciler::Reconciler;
use user_desk::transport::UserApi;
use user_desk::ui::{print_sessions, print_table, ConfirmDialog, ManagementPage, Shell};
use user_desk::logging;

#[derive(Parser)]
#[command(name = "user-desk")]
#[command(about = "Manage user records with live updates from the backend", version)]
#[command(after_help = "Changes made by any client are pushed over the backend's STOMP channel.
`watch` and `shell` keep the list in step with those broadcasts.

Environment:
   USER_DESK_BASE_URL, USER_DESK_WS_URL, USER_DESK_TOPIC, USER_DESK_CONNECT_ATTEMPTS, RUST_LOG")]
struct Cli {
    /// TOML config file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// REST base url, e.g. http://localhost:8080
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Also write logs to a daily file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current users
    List,

    /// Show the user list and redraw it on every broadcast
    Watch,

    /// Interactive add/edit/delete on a live list
    Shell,

    /// Create a user
    Add {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        phone: String,
    },

    /// Change a user's name or phone
    Edit {
        id: UserId,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long)]
        phone: Option<String>,
    },

    /// Delete a user
    Delete {
        id: UserId,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show sessions connected to the push channel
    Sessions,

    /// Check the backend and its database
    Health,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();

    let _guard = match logging::init(cli.log_dir.as_deref()).enhance() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e.display().red());
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli).await.enhance() {
        tracing::debug!("command failed ({:?}): {:?}", e.category, e.error);
        eprintln!("{}", e.display().red());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig::load_with(cli.config.as_deref(), cli.base_url.as_deref())?;
    let api = UserApi::from_config(&config)?;

    match cli.command.unwrap_or(Commands::List) {
        Commands::List => {
            let users = api.list_users().await.context("fetching users")?;
            print_table(&users);
        }

        Commands::Watch => watch(&config, api).await?,

        Commands::Shell => shell(&config, api).await?,

        Commands::Add { name, phone } => {
            let created = api
                .create(&User::new(name, phone))
                .await
                .context("creating user")?;
            println!(
                "{} Created user {}",
                "✓".green(),
                created.id.map(|id| id.to_string()).unwrap_or_default().bright_yellow()
            );
        }

        Commands::Edit { id, name, phone } => {
            if name.is_none() && phone.is_none() {
                bail!("invalid edit: give --name and/or --phone");
            }
            let mut user = api.get(id).await.with_context(|| format!("fetching user {}", id))?;
            if let Some(name) = name {
                user.name = name;
            }
            if let Some(phone) = phone {
                user.phone = phone;
            }
            api.update(&user).await.with_context(|| format!("updating user {}", id))?;
            println!("{} Updated user {}", "✓".green(), id.to_string().bright_yellow());
        }

        Commands::Delete { id, yes } => {
            let user = api.get(id).await.with_context(|| format!("fetching user {}", id))?;
            if !yes && !confirm(&ConfirmDialog::for_delete(&user))? {
                println!("{}", "Kept".yellow());
                return Ok(());
            }
            api.remove(id).await.with_context(|| format!("deleting user {}", id))?;
            println!("{} Deleted user {}", "✓".green(), id.to_string().bright_yellow());
        }

        Commands::Sessions => {
            let sessions = api.active_sessions().await.context("fetching sessions")?;
            print_sessions(&sessions);
        }

        Commands::Health => {
            let health = api.health().await.context("checking backend health")?;
            println!("{} {}", "backend:".bright_white(), health.greeting);
            println!("{} {}", "database:".bright_white(), health.database);
        }
    }

    Ok(())
}

async fn watch(config: &ClientConfig, api: UserApi) -> Result<()> {
    println!("{}", "Connecting to the push channel...".cyan().bold());
    let channel = ConnectionManager::global().get_or_create(config).await?;

    let mut page = ManagementPage::new(Reconciler::new(api));
    page.mount(&channel, &config.users_topic).await?;
    let mut updates = page.reconciler().watch();

    draw(&page);
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                draw(&page);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    page.unmount(&channel)?;
    ConnectionManager::global().reset().await;
    Ok(())
}

fn draw(page: &ManagementPage) {
    print!("\x1b[2J\x1b[H");
    println!(
        "{} {}",
        "Users".cyan().bold(),
        chrono::Local::now().format("(updated %H:%M:%S, Ctrl-C to quit)").to_string().dimmed()
    );
    print_table(&page.users());
}

async fn shell(config: &ClientConfig, api: UserApi) -> Result<()> {
    let channel = ConnectionManager::global().get_or_create(config).await?;

    let mut page = ManagementPage::new(Reconciler::new(api));
    page.mount(&channel, &config.users_topic).await?;

    let mut shell = Shell::new(page, BufReader::new(tokio::io::stdin()), std::io::stdout());
    shell.run().await?;

    let (mut page, _) = shell.into_parts();
    page.unmount(&channel)?;
    ConnectionManager::global().reset().await;
    Ok(())
}

fn confirm(dialog: &ConfirmDialog) -> Result<bool> {
    if let Some(title) = dialog.title() {
        println!("{}", title.yellow().bold());
    }
    print!("{} [y/N] ", dialog.message());
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
