use std::process;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use bridgelet::transport::http::{ServerConfig, serve};
use bridgelet::{BridgeService, InboundConsumer, RecordEmitter, ResponseRegistry};

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    response_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            host: server.host,
            port: server.port,
            response_timeout_secs: None,
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: bridgelet [options]");
            eprintln!();
            eprintln!("Forwards HTTP requests as JSON records on stdout and serves back");
            eprintln!("response records read from stdin, correlated by request id.");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --host <addr>                  Listen address [default: 0.0.0.0]");
            eprintln!("  --port <port>                  Listen port [default: 8080]");
            eprintln!("  --response-timeout-secs <n>    Give up on unanswered requests after");
            eprintln!("                                 <n> seconds [default: wait forever]");
            process::exit(2);
        }
    };

    // Stdout carries the record protocol; operator logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "bridgelet exited with error");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                config.host = args.get(i).ok_or("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                let value = args.get(i).ok_or("--port requires a value")?;
                config.port = value
                    .parse()
                    .map_err(|_| format!("invalid port: {value}"))?;
            }
            "--response-timeout-secs" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or("--response-timeout-secs requires a value")?;
                let secs: u64 = value
                    .parse()
                    .map_err(|_| format!("invalid timeout: {value}"))?;
                if secs == 0 {
                    return Err("timeout must be at least 1 second".to_string());
                }
                config.response_timeout_secs = Some(secs);
            }
            "--help" | "-h" => return Err("".to_string()),
            arg => return Err(format!("unknown flag: {arg}")),
        }
        i += 1;
    }

    Ok(config)
}

async fn run(config: Config) -> anyhow::Result<()> {
    let registry = ResponseRegistry::new();
    let emitter = RecordEmitter::stdout();

    let consumer = InboundConsumer::new(tokio::io::stdin(), Arc::clone(&registry), emitter.clone());

    let mut service = BridgeService::new(registry, emitter);
    if let Some(secs) = config.response_timeout_secs {
        service = service.with_response_deadline(Duration::from_secs(secs));
    }

    let server_config = ServerConfig {
        host: config.host,
        port: config.port,
    };

    let mut consumer_task = tokio::spawn(consumer.run());
    let server = serve(server_config, Arc::new(service));
    tokio::pin!(server);

    // The server result is the process result. A consumer read error is
    // fatal; end-of-input on stdin leaves the server running with whatever
    // is still pending unresolvable.
    let mut inbound_open = true;
    loop {
        tokio::select! {
            result = &mut server => return result,
            result = &mut consumer_task, if inbound_open => {
                inbound_open = false;
                match result {
                    Ok(Ok(())) => tracing::warn!(
                        "inbound stream reached end of input; in-flight requests will not resolve"
                    ),
                    Ok(Err(e)) => return Err(e.into()),
                    Err(e) => anyhow::bail!("inbound consumer task panicked: {e}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("bridgelet")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_match_server_config() {
        let config = parse_args(&args(&[])).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert!(config.response_timeout_secs.is_none());
    }

    #[test]
    fn parses_all_flags() {
        let config = parse_args(&args(&[
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--response-timeout-secs",
            "30",
        ]))
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert_eq!(config.response_timeout_secs, Some(30));
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
        assert!(parse_args(&args(&["--port"])).is_err());
        assert!(parse_args(&args(&["--port", "not-a-port"])).is_err());
        assert!(parse_args(&args(&["--response-timeout-secs", "0"])).is_err());
    }
}
