//!
//! facegate server configuration
//! -----------------------------
//! Built from defaults, then environment variables, then CLI flags. A value that
//! fails to parse is ignored and the lower layer wins.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_PORT: u16 = 3000;
pub const DEFAULT_ISSUER: &str = "http://localhost:3000";
pub const DEFAULT_FACETEC_URL: &str = "https://api.facetec.com/api/v3.1/biometrics";
pub const DEFAULT_FACE_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MIN_MATCH_LEVEL: u8 = 3;
pub const DEFAULT_INTERACTION_TTL_SECS: u64 = 3600;

pub const USAGE: &str = "facegate Server

USAGE:
  facegate_server [--http-port N] [--issuer URL] [--accounts-file PATH] [--facetec-url URL]
                  [--face-timeout-ms N] [--min-match-level N] [--production]

OPTIONS:
  --http-port N          HTTP port (env: FACEGATE_HTTP_PORT, default 3000)
  --issuer URL           Public issuer URL used for resume redirects (env: FACEGATE_ISSUER)
  --accounts-file PATH   JSON account store; in-memory when unset (env: FACEGATE_ACCOUNTS_FILE)
  --facetec-url URL      Biometric provider base URL (env: FACEGATE_FACETEC_URL)
  --face-timeout-ms N    Biometric call timeout in ms (env: FACEGATE_FACE_TIMEOUT_MS, default 15000)
  --min-match-level N    Lowest accepted match level (env: FACEGATE_MIN_MATCH_LEVEL, default 3)
  --production [bool]    Require https via X-Forwarded-Proto (env: FACEGATE_PRODUCTION)

  FACEGATE_INTERACTION_TTL_SECS sets the interaction lifetime (default 3600).
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_port: u16,
    pub issuer: String,
    pub accounts_file: Option<PathBuf>,
    pub facetec_base_url: String,
    pub biometric_timeout: Duration,
    pub min_match_level: u8,
    pub interaction_ttl: Duration,
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            issuer: DEFAULT_ISSUER.to_string(),
            accounts_file: None,
            facetec_base_url: DEFAULT_FACETEC_URL.to_string(),
            biometric_timeout: Duration::from_millis(DEFAULT_FACE_TIMEOUT_MS),
            min_match_level: DEFAULT_MIN_MATCH_LEVEL,
            interaction_ttl: Duration::from_secs(DEFAULT_INTERACTION_TTL_SECS),
            production: false,
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

/// `--production` alone enables; a following non-flag token is read as a bool.
fn production_arg(args: &[String]) -> Option<bool> {
    let pos = args.iter().position(|a| a == "--production")?;
    match args.get(pos + 1) {
        Some(next) if !next.starts_with('-') => Some(parse_bool(next).unwrap_or(true)),
        _ => Some(true),
    }
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl ServerConfig {
    /// Layers the process environment and `args` over the defaults.
    pub fn load(args: &[String]) -> Self {
        Self::from_sources(|name| std::env::var(name).ok(), args)
    }

    pub fn from_sources<F>(env: F, args: &[String]) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let env_parse = |name: &str| env(name).and_then(|v| v.trim().parse::<u64>().ok());
        let arg_parse = |flag: &str| arg_value(args, flag).and_then(|v| v.trim().parse::<u64>().ok());

        let http_port = arg_value(args, "--http-port")
            .and_then(|v| v.parse::<u16>().ok())
            .or_else(|| env("FACEGATE_HTTP_PORT").and_then(|v| v.parse::<u16>().ok()))
            .unwrap_or(d.http_port);
        let issuer = arg_value(args, "--issuer")
            .map(str::to_string)
            .or_else(|| env("FACEGATE_ISSUER"))
            .unwrap_or(d.issuer);
        let accounts_file = arg_value(args, "--accounts-file")
            .map(PathBuf::from)
            .or_else(|| env("FACEGATE_ACCOUNTS_FILE").filter(|v| !v.is_empty()).map(PathBuf::from));
        let facetec_base_url = arg_value(args, "--facetec-url")
            .map(str::to_string)
            .or_else(|| env("FACEGATE_FACETEC_URL"))
            .unwrap_or(d.facetec_base_url);
        let biometric_timeout = arg_parse("--face-timeout-ms")
            .or_else(|| env_parse("FACEGATE_FACE_TIMEOUT_MS"))
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(d.biometric_timeout);
        let min_match_level = arg_value(args, "--min-match-level")
            .and_then(|v| v.parse::<u8>().ok())
            .or_else(|| env("FACEGATE_MIN_MATCH_LEVEL").and_then(|v| v.parse::<u8>().ok()))
            .unwrap_or(d.min_match_level);
        let interaction_ttl = env_parse("FACEGATE_INTERACTION_TTL_SECS")
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(d.interaction_ttl);
        let production = production_arg(args)
            .or_else(|| env("FACEGATE_PRODUCTION").and_then(|v| parse_bool(&v)))
            .unwrap_or(d.production);

        Self {
            http_port,
            issuer,
            accounts_file,
            facetec_base_url,
            biometric_timeout,
            min_match_level,
            interaction_ttl,
            production,
        }
    }
}
