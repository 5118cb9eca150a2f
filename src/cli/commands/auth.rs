use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

use crate::auth::nonce::MAX_NONCE_TTL;

pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_SESSION_TTL: &str = "session-ttl";
pub const ARG_NONCE_TTL: &str = "nonce-ttl";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BASE_URL)
                .long(ARG_BASE_URL)
                .help("Public base URL, used for the OpenID issuer and cookie security")
                .env("ASASHIO_BASE_URL")
                .default_value("http://localhost:8080")
                .value_parser(validate_base_url),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL)
                .long(ARG_SESSION_TTL)
                .help("Session token and cookie TTL in seconds")
                .env("ASASHIO_SESSION_TTL")
                .default_value("259200")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_NONCE_TTL)
                .long(ARG_NONCE_TTL)
                .help("Confirmation nonce TTL in seconds, at most one day")
                .env("ASASHIO_NONCE_TTL")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_NONCE_TTL.as_secs())),
        )
}

fn validate_base_url(value: &str) -> std::result::Result<String, String> {
    let parsed = url::Url::parse(value).map_err(|e| format!("invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(value.trim_end_matches('/').to_string()),
        other => Err(format!("unsupported scheme: {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub base_url: String,
    pub session_ttl_seconds: u64,
    pub nonce_ttl_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a defaulted argument is somehow missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            base_url: matches
                .get_one::<String>(ARG_BASE_URL)
                .cloned()
                .context("missing argument: --base-url")?,
            session_ttl_seconds: matches
                .get_one::<u64>(ARG_SESSION_TTL)
                .copied()
                .context("missing argument: --session-ttl")?,
            nonce_ttl_seconds: matches
                .get_one::<u64>(ARG_NONCE_TTL)
                .copied()
                .context("missing argument: --nonce-ttl")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("asashio"))
    }

    #[test]
    fn base_url_validation() {
        assert_eq!(
            validate_base_url("https://id.example.com/"),
            Ok("https://id.example.com".to_string())
        );
        assert!(validate_base_url("ftp://id.example.com").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let result = command().try_get_matches_from(["asashio", "--nonce-ttl", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn nonce_ttl_above_one_day_is_rejected() {
        temp_env::with_var("ASASHIO_NONCE_TTL", None::<&str>, || {
            assert!(command()
                .try_get_matches_from(["asashio", "--nonce-ttl", "86400"])
                .is_ok());
            assert!(command()
                .try_get_matches_from(["asashio", "--nonce-ttl", "86401"])
                .is_err());
            assert!(command()
                .try_get_matches_from(["asashio", "--nonce-ttl", u64::MAX.to_string().as_str()])
                .is_err());
        });
    }

    #[test]
    fn explicit_values_override_defaults() -> Result<()> {
        temp_env::with_vars(
            [
                ("ASASHIO_BASE_URL", None::<&str>),
                ("ASASHIO_SESSION_TTL", None::<&str>),
                ("ASASHIO_NONCE_TTL", None::<&str>),
            ],
            || {
                let matches = command().try_get_matches_from([
                    "asashio",
                    "--base-url",
                    "https://id.example.com",
                    "--session-ttl",
                    "60",
                    "--nonce-ttl",
                    "30",
                ])?;
                assert_eq!(
                    Options::parse(&matches)?,
                    Options {
                        base_url: "https://id.example.com".to_string(),
                        session_ttl_seconds: 60,
                        nonce_ttl_seconds: 30,
                    }
                );
                Ok(())
            },
        )
    }
}
