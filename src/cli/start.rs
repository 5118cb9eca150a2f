use crate::cli::{
    actions::Action,
    commands::{self, auth, logging},
    dispatch,
    telemetry::{self, OtlpExporter},
};
use anyhow::Result;
use clap::ArgMatches;

/// Map verbosity count to tracing level
const fn get_verbosity_level(verbosity: u8) -> Option<tracing::Level> {
    match verbosity {
        0 => None,
        1 => Some(tracing::Level::WARN),
        2 => Some(tracing::Level::INFO),
        3 => Some(tracing::Level::DEBUG),
        _ => Some(tracing::Level::TRACE),
    }
}

/// Main entry point for the CLI - builds and returns the Action
///
/// # Errors
///
/// Returns an error if argument parsing, telemetry initialization, or action dispatch fails
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity_level = get_verbosity_level(
        matches
            .get_one::<u8>(commands::logging::ARG_VERBOSITY)
            .copied()
            .unwrap_or(0),
    );

    let exporter = otlp_exporter(&matches);
    telemetry::init(verbosity_level, exporter.as_ref())?;

    dispatch::handler(&matches)
}

/// Trace export settings, when a collector endpoint was given.
fn otlp_exporter(matches: &ArgMatches) -> Option<OtlpExporter> {
    let endpoint = matches.get_one::<String>(logging::ARG_OTLP_ENDPOINT)?;
    Some(OtlpExporter {
        endpoint: endpoint.clone(),
        headers: matches
            .get_many::<(String, String)>(logging::ARG_OTLP_HEADER)
            .map(|headers| headers.cloned().collect())
            .unwrap_or_default(),
        issuer: matches
            .get_one::<String>(auth::ARG_BASE_URL)
            .cloned()
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(get_verbosity_level(0), None);
        assert_eq!(get_verbosity_level(1), Some(tracing::Level::WARN));
        assert_eq!(get_verbosity_level(2), Some(tracing::Level::INFO));
        assert_eq!(get_verbosity_level(3), Some(tracing::Level::DEBUG));
        assert_eq!(get_verbosity_level(9), Some(tracing::Level::TRACE));
    }

    fn matches(args: &[&str]) -> ArgMatches {
        temp_env::with_vars(
            [
                ("ASASHIO_BASE_URL", None::<&str>),
                ("ASASHIO_OTLP_ENDPOINT", None::<&str>),
                ("ASASHIO_OTLP_HEADERS", None::<&str>),
            ],
            || commands::new().get_matches_from(args),
        )
    }

    #[test]
    fn no_exporter_without_endpoint() {
        assert_eq!(otlp_exporter(&matches(&["asashio"])), None);
    }

    #[test]
    fn exporter_carries_headers_and_issuer() {
        let exporter = otlp_exporter(&matches(&[
            "asashio",
            "--base-url",
            "https://id.example.com/",
            "--otlp-endpoint",
            "https://otel.example.com:4317",
            "--otlp-header",
            "X-Tenant=asashio",
        ]));
        assert_eq!(
            exporter,
            Some(OtlpExporter {
                endpoint: "https://otel.example.com:4317".to_string(),
                headers: vec![("x-tenant".to_string(), "asashio".to_string())],
                issuer: "https://id.example.com".to_string(),
            })
        );
    }
}
