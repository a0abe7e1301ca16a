//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Authorized, paginated access to the Spotify Web API
#[derive(Parser, Debug)]
#[command(name = "spotify-web-core")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Client configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Token file (JSON); overrides `token_file` from the config
    #[arg(short, long, global = true)]
    pub token_file: Option<PathBuf>,

    /// Scope the request needs (repeatable, or space/comma separated)
    #[arg(short, long = "scope", global = true)]
    pub scopes: Vec<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch one resource and print it as JSON
    Get {
        /// API path (relative to the base URL) or absolute URL
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },

    /// Walk a paginated resource and print one item per line
    Pages {
        /// API path (relative to the base URL) or absolute URL of the first page
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,

        /// Stop after this many pages beyond the first
        #[arg(long)]
        max_extra_pages: Option<usize>,
    },
}

/// Parse a `key=value` argument
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("limit=50", Some(("limit", "50")) ; "simple")]
    #[test_case("q=a=b", Some(("q", "a=b")) ; "value with equals")]
    #[test_case("market=", Some(("market", "")) ; "empty value")]
    #[test_case("=x", None ; "empty key")]
    #[test_case("limit", None ; "no separator")]
    fn test_parse_key_value(raw: &str, expected: Option<(&str, &str)>) {
        let parsed = parse_key_value(raw).ok();
        let expected = expected.map(|(k, v)| (k.to_string(), v.to_string()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_pages_command() {
        let cli = Cli::try_parse_from([
            "spotify-web-core",
            "--scope",
            "user-library-read",
            "pages",
            "me/tracks",
            "--query",
            "limit=50",
            "--max-extra-pages",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.scopes, vec!["user-library-read"]);
        match cli.command {
            Commands::Pages {
                path,
                query,
                max_extra_pages,
            } => {
                assert_eq!(path, "me/tracks");
                assert_eq!(query, vec![("limit".to_string(), "50".to_string())]);
                assert_eq!(max_extra_pages, Some(2));
            }
            Commands::Get { .. } => panic!("Expected Pages command"),
        }
    }
}
