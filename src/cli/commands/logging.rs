use clap::{builder::ValueParser, Arg, ArgAction, Command};
use tonic::metadata::{Ascii, MetadataKey, MetadataValue};

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_OTLP_ENDPOINT: &str = "otlp-endpoint";
pub const ARG_OTLP_HEADER: &str = "otlp-header";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

/// gRPC collector endpoint. Only `http` and `https` are accepted; `https` turns on TLS.
fn validate_otlp_endpoint(value: &str) -> std::result::Result<String, String> {
    let parsed = url::Url::parse(value).map_err(|e| format!("invalid URL: {e}"))?;
    match (parsed.scheme(), parsed.host_str()) {
        ("http" | "https", Some(_)) => Ok(value.trim_end_matches('/').to_string()),
        ("http" | "https", None) => Err("missing host".to_string()),
        (other, _) => Err(format!("unsupported scheme: {other}")),
    }
}

/// `KEY=VALUE` gRPC metadata sent with every export. Keys are lowercased and
/// binary (`-bin`) keys are refused.
fn validate_otlp_header(value: &str) -> std::result::Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {value:?}"))?;
    let key = key.trim().to_ascii_lowercase();
    let val = val.trim();

    MetadataKey::<Ascii>::from_bytes(key.as_bytes())
        .map_err(|_| format!("invalid metadata key: {key:?}"))?;
    val.parse::<MetadataValue<Ascii>>()
        .map_err(|_| format!("invalid metadata value for {key}"))?;

    Ok((key, val.to_string()))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("ASASHIO_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_OTLP_ENDPOINT)
                .long(ARG_OTLP_ENDPOINT)
                .help("OTLP/gRPC collector to export traces to, e.g. http://localhost:4317")
                .env("ASASHIO_OTLP_ENDPOINT")
                .value_parser(validate_otlp_endpoint),
        )
        .arg(
            Arg::new(ARG_OTLP_HEADER)
                .long(ARG_OTLP_HEADER)
                .help("Metadata sent to the collector as KEY=VALUE, repeatable")
                .env("ASASHIO_OTLP_HEADERS")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .requires(ARG_OTLP_ENDPOINT)
                .value_parser(validate_otlp_header),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("asashio"))
    }

    #[test]
    fn otlp_endpoint_requires_http_scheme() {
        assert_eq!(
            validate_otlp_endpoint("https://otel.example.com:4317/"),
            Ok("https://otel.example.com:4317".to_string())
        );
        assert!(validate_otlp_endpoint("otel.example.com:4317").is_err());
        assert!(validate_otlp_endpoint("grpc://otel.example.com").is_err());
    }

    #[test]
    fn otlp_header_is_lowercased_and_trimmed() {
        assert_eq!(
            validate_otlp_header(" Authorization = Bearer abc "),
            Ok(("authorization".to_string(), "Bearer abc".to_string()))
        );
        assert!(validate_otlp_header("no-separator").is_err());
        assert!(validate_otlp_header("trace-bin=YmluYXJ5").is_err());
        assert!(validate_otlp_header("bad key=value").is_err());
    }

    #[test]
    fn otlp_headers_from_env_are_split() {
        temp_env::with_vars(
            [
                ("ASASHIO_LOG_LEVEL", None),
                ("ASASHIO_OTLP_ENDPOINT", Some("http://localhost:4317")),
                ("ASASHIO_OTLP_HEADERS", Some("x-tenant=asashio,authorization=Bearer abc")),
            ],
            || {
                let matches = command().get_matches_from(["asashio"]);
                let headers: Vec<(String, String)> = matches
                    .get_many::<(String, String)>(ARG_OTLP_HEADER)
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default();
                assert_eq!(
                    headers,
                    [
                        ("x-tenant".to_string(), "asashio".to_string()),
                        ("authorization".to_string(), "Bearer abc".to_string()),
                    ]
                );
            },
        );
    }

    #[test]
    fn otlp_header_without_endpoint_fails() {
        temp_env::with_vars(
            [
                ("ASASHIO_OTLP_ENDPOINT", None::<&str>),
                ("ASASHIO_OTLP_HEADERS", None::<&str>),
            ],
            || {
                let result =
                    command().try_get_matches_from(["asashio", "--otlp-header", "x-tenant=a"]);
                assert!(result.is_err());
            },
        );
    }
}
