//! CLI entry point for devicegrant.

pub mod auth;
pub mod errors;

use clap::{Parser, Subcommand};

/// Device-grant credential manager
#[derive(Parser, Debug)]
#[command(
    name = "devicegrant",
    version,
    about = "Obtain and maintain an API credential with the OAuth2 device grant"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authorize this machine through the device grant
    Login(LoginArgs),
    /// Show the stored credential
    Status,
    /// Remove the stored credential
    Logout,
    /// Print a valid access token, refreshing it if needed
    Token(TokenArgs),
}

/// Arguments for `devicegrant login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Scope to request (repeatable); defaults to DEVICEGRANT_SCOPES
    #[arg(long = "scope", value_name = "SCOPE")]
    pub scopes: Vec<String>,

    /// Only print the verification URL
    #[arg(long)]
    pub no_browser: bool,
}

/// Arguments for `devicegrant token`.
#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Scope the credential must carry (repeatable)
    #[arg(long = "require", value_name = "SCOPE")]
    pub required: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_login_with_scopes() {
        let cli = Cli::try_parse_from([
            "devicegrant",
            "login",
            "--scope",
            "read:users",
            "--scope",
            "update:users",
        ])
        .unwrap();
        match cli.command {
            Commands::Login(args) => {
                assert_eq!(args.scopes, vec!["read:users", "update:users"]);
                assert!(!args.no_browser);
            }
            other => panic!("expected Login, got {other:?}"),
        }
    }

    #[test]
    fn parse_login_without_browser() {
        let cli = Cli::try_parse_from(["devicegrant", "login", "--no-browser"]).unwrap();
        match cli.command {
            Commands::Login(args) => {
                assert!(args.scopes.is_empty());
                assert!(args.no_browser);
            }
            other => panic!("expected Login, got {other:?}"),
        }
    }

    #[test]
    fn parse_status_and_logout() {
        let cli = Cli::try_parse_from(["devicegrant", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status));
        let cli = Cli::try_parse_from(["devicegrant", "logout"]).unwrap();
        assert!(matches!(cli.command, Commands::Logout));
    }

    #[test]
    fn parse_token_with_required_scopes() {
        let cli =
            Cli::try_parse_from(["devicegrant", "token", "--require", "read:users"]).unwrap();
        match cli.command {
            Commands::Token(args) => assert_eq!(args.required, vec!["read:users"]),
            other => panic!("expected Token, got {other:?}"),
        }
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["devicegrant"]).is_err());
    }

    #[test]
    fn parse_unknown_subcommand_is_error() {
        assert!(Cli::try_parse_from(["devicegrant", "chat"]).is_err());
    }
}
