//! CLI entry point for Homebase.

pub mod auth;

use clap::{Parser, Subcommand};

/// Homebase session CLI
#[derive(Parser, Debug)]
#[command(name = "homebase", version, about = "Homebase session CLI")]
pub struct Cli {
    /// API base URL (overrides HOMEBASE_API_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the current session status
    Status,
    /// Log in with a one-time password sent to a phone number
    Login(LoginArgs),
    /// Clear the stored session
    Logout,
    /// Send an authenticated GET request and print the JSON body
    Get(GetArgs),
}

/// Arguments for `homebase login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Phone number to send the OTP to
    pub phone: String,
}

/// Arguments for `homebase get`.
#[derive(Parser, Debug)]
pub struct GetArgs {
    /// Path relative to the API base URL (e.g. /households)
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login_with_base_url() {
        let cli = Cli::parse_from(["homebase", "--base-url", "http://x", "login", "+15550100"]);
        assert_eq!(cli.base_url.as_deref(), Some("http://x"));
        assert!(matches!(cli.command, Commands::Login(LoginArgs { ref phone }) if phone == "+15550100"));
    }

    #[test]
    fn parses_get() {
        let cli = Cli::parse_from(["homebase", "get", "/households"]);
        assert!(matches!(cli.command, Commands::Get(GetArgs { ref path }) if path == "/households"));
    }
}
