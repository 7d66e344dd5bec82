use clap::{Parser, Subcommand};
use opencharacter::{
    config::{AppConfig, TokenStoreBackend},
    db,
    repositories::{
        ReferralRepository, SqliteReferralRepository, SqliteUserRepository, UserRepository,
    },
    services::{create_email_service, create_token_store, MagicLinkService},
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "opencharacter-cli")]
#[command(about = "CLI tool for managing OpenCharacter sign-in and referrals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a magic link and print it
    IssueLink {
        /// Email address the link signs in
        #[arg(short, long)]
        email: String,
    },

    /// Delete expired magic link tokens
    PurgeTokens,

    /// User commands
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// List the accounts a user referred
    Referrals {
        /// Email address of the referrer
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Show a user
    Show {
        /// Email address of the user
        #[arg(short, long)]
        email: String,
    },
}

fn format_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);

    // Connect to database
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    db::run_migrations(&pool).await?;

    let user_repository = SqliteUserRepository::new(pool.clone());

    // Parse CLI arguments
    let cli = Cli::parse();

    match cli.command {
        Commands::IssueLink { email } => {
            if matches!(config.token_store, TokenStoreBackend::Memory) {
                eprintln!("⚠️  TOKEN_STORE=memory: this link dies when the CLI exits");
            }

            let token_store = create_token_store(&config.token_store, pool.clone())?;
            let service = MagicLinkService::new(
                token_store,
                create_email_service(&config),
                config.clone(),
            );

            match service.issue(&email).await {
                Ok(issued) => {
                    println!("✅ Magic link issued for {}", issued.email);
                    println!("  URL: {}", config.verification_url(&issued.token));
                    println!("  Expires: {}", format_millis(issued.expires_at));
                }
                Err(e) => {
                    eprintln!("❌ Failed to issue magic link: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::PurgeTokens => {
            let service = MagicLinkService::new(
                create_token_store(&config.token_store, pool.clone())?,
                create_email_service(&config),
                config.clone(),
            );
            let removed = service.purge_expired().await?;
            println!("✅ Removed {} expired token(s)", removed);
        }

        Commands::User { command } => match command {
            UserCommands::Show { email } => match user_repository.find_by_email(&email).await? {
                Some(user) => {
                    println!("  ID: {}", user.id);
                    println!("  Email: {}", user.email);
                    println!(
                        "  Verified: {}",
                        user.email_verified
                            .map(format_millis)
                            .unwrap_or_else(|| "no".to_string())
                    );
                    println!(
                        "  Referral code: {}",
                        user.referral_link.as_deref().unwrap_or("-")
                    );
                    println!("  Created: {}", format_millis(user.created_at));
                }
                None => {
                    eprintln!("❌ User not found: {}", email);
                    std::process::exit(1);
                }
            },
        },

        Commands::Referrals { email } => {
            let Some(referrer) = user_repository.find_by_email(&email).await? else {
                eprintln!("❌ User not found: {}", email);
                std::process::exit(1);
            };

            let referrals = SqliteReferralRepository::new(pool.clone())
                .list_by_referrer(&referrer.id)
                .await?;

            if referrals.is_empty() {
                println!("No referrals for {}", email);
                return Ok(());
            }

            println!("{:<38} {:<10} {:<24} {:>10}", "Referred", "Status", "Signed up", "Earnings");
            println!("{}", "-".repeat(86));
            for referral in referrals {
                println!(
                    "{:<38} {:<10} {:<24} {:>10.2}",
                    referral.referred_id,
                    referral.status,
                    format_millis(referral.signup_date),
                    referral.total_earnings
                );
            }
        }
    }

    Ok(())
}
