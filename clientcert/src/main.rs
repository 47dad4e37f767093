//! clientcert: inspect and validate browser-presented TLS client certificates.

mod config;
mod error;
mod server;
mod tls;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clientcert_lib::verify::find_system_ca_bundle;
use clientcert_lib::{
    sweep_stale_temp_files, CertificateOutcome, CertificateResponse, ChainValidator,
    ParsedCertificate, SourceVerification, ValidationCache,
};
use config::{build_verifier, LogFormat, ServeArgs, VerifierKind};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Temp files left by a previous run are removed once older than this.
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

const DEFAULT_LOG_FILTER: &str = "clientcert=info,clientcert_lib=info,tower_http=warn";

#[derive(Parser)]
#[command(
    name = "clientcert",
    about = "Inspect and validate browser-presented TLS client certificates",
    long_about = "clientcert shows which client certificate a browser presented and\n\
                  checks it against CA certificates.\n\n\
                  `serve` runs the HTTP API, either terminating TLS itself (direct mode)\n\
                  or behind a reverse proxy that forwards the certificate in headers\n\
                  (proxy mode). The other subcommands run the same checks offline.",
    after_help = "EXAMPLES:\n\
                  \n  clientcert serve --mode proxy --listen 127.0.0.1:3000\
                  \n  clientcert serve --mode direct --tls-cert server.pem --tls-key server.key\
                  \n  clientcert inspect client.pem\
                  \n  clientcert validate --ca intermediate.pem --ca root.pem client.pem\
                  \n  clientcert parse-dn 'CN=Old\\C5\\99ich \\C5\\A0v\\C3\\A9da,C=CZ'"
)]
struct Cli {
    /// Log output format
    #[arg(
        long,
        global = true,
        env = "CLIENTCERT_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty
    )]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Print a certificate as the API would report it (JSON)
    #[command(after_help = "EXAMPLES:\n\
                      \n  clientcert inspect client.pem\
                      \n  clientcert inspect --der client.der\
                      \n  cat client.pem | clientcert inspect")]
    Inspect {
        /// Certificate file (PEM or DER). Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Force DER input parsing (default: auto-detect)
        #[arg(long)]
        der: bool,
        /// Force PEM input parsing (default: auto-detect)
        #[arg(long)]
        pem: bool,
    },
    /// Validate a certificate against CA files (exit code 0 = valid, 2 = invalid)
    #[command(after_help = "EXAMPLES:\n\
                      \n  clientcert validate --ca chain.pem client.pem\
                      \n  clientcert validate --ca intermediate.pem --ca root.pem client.pem\
                      \n  clientcert validate --verifier x509 --json --ca root.pem client.pem")]
    Validate {
        /// CA certificate file (PEM); repeat to build a bundle, in order
        #[arg(long = "ca", required = true)]
        ca_files: Vec<PathBuf>,
        /// Certificate file (PEM or bare base64). Reads from stdin if omitted.
        file: Option<PathBuf>,
        /// Chain-verification backend
        #[arg(long, env = "CLIENTCERT_VERIFIER", value_enum, default_value_t = VerifierKind::Openssl)]
        verifier: VerifierKind,
        /// Path of the openssl executable
        #[arg(long, env = "CLIENTCERT_OPENSSL", default_value = "openssl")]
        openssl: PathBuf,
        /// Upper bound on the `openssl verify` run (e.g. 10s, 1m, or plain
        /// seconds; default 10s). Rejected with `--verifier x509`.
        #[arg(long, env = "CLIENTCERT_VERIFY_TIMEOUT", value_parser = parse_duration)]
        verify_timeout: Option<Duration>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Parse a distinguished name as forwarded by nginx (JSON)
    ParseDn {
        /// DN string, e.g. 'CN=Jane Doe,O=Example,C=CZ'
        dn: String,
    },
}

/// Maximum file size for certificate inputs (10 MiB).
const MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => {
            let meta = std::fs::metadata(path)
                .with_context(|| format!("Failed to stat file: {}", path.display()))?;
            if meta.len() > MAX_INPUT_BYTES {
                anyhow::bail!(
                    "File too large ({} bytes, max {} bytes): {}",
                    meta.len(),
                    MAX_INPUT_BYTES,
                    path.display()
                );
            }
            std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .take(MAX_INPUT_BYTES)
                .read_to_end(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn read_text(file: Option<&PathBuf>) -> Result<String> {
    let label = file.map_or_else(|| "stdin".to_string(), |p| p.display().to_string());
    String::from_utf8(read_input(file)?).with_context(|| format!("{} is not UTF-8 text", label))
}

fn parse_input(input: &[u8], der: bool, pem: bool) -> Result<ParsedCertificate> {
    if der {
        Ok(clientcert_lib::parse_der(input)?)
    } else if pem {
        Ok(clientcert_lib::parse_pem(input)?)
    } else {
        Ok(clientcert_lib::parse_cert(input)?)
    }
}

/// Parse a duration string using humantime format.
///
/// Plain numbers (e.g. "3600") default to seconds. Otherwise, standard
/// humantime units are accepted: `s`, `m`, `h`, `d`, `w`, `months`, `y`, etc.
///
/// Examples: "30", "30s", "5m", "2h30m", "7d", "1w", "30days".
fn parse_duration(s: &str) -> Result<Duration> {
    // Plain integer → treat as seconds
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        let secs: u64 = s.parse().context("Invalid duration value")?;
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).with_context(|| format!("Invalid duration: '{s}'"))
}

fn init_logging(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

async fn serve(args: ServeArgs) -> Result<()> {
    let temp_dir = args.temp_dir();
    match sweep_stale_temp_files(&temp_dir, STALE_TEMP_AGE) {
        Ok(0) => {}
        Ok(removed) => {
            tracing::info!(removed, dir = %temp_dir.display(), "removed stale temporary files")
        }
        Err(e) => tracing::warn!(error = %e, dir = %temp_dir.display(), "temp file sweep failed"),
    }

    if !args.ca_dir.is_dir() {
        tracing::warn!(
            ca_dir = %args.ca_dir.display(),
            "CA directory not found; known issuers fall back to the system trust store"
        );
    }
    let validator = ChainValidator::new(args.chain_verifier()?, Arc::new(ValidationCache::new()))
        .with_ca_dir(&args.ca_dir);

    let source = args.certificate_source();
    let state = server::AppState {
        source: Arc::new(source),
        validator: Arc::new(validator),
        listen: args.listen,
        proxy_headers: Arc::new(args.proxy_headers()),
    };
    let mode = state.source.mode();
    let app = server::router(state, args.max_body);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    tracing::info!(
        listen = %args.listen,
        mode,
        verifier = ?args.verifier,
        "clientcert listening"
    );

    match args.mode {
        config::Mode::Proxy => axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?,
        config::Mode::Direct => {
            let cert_path = args
                .tls_cert
                .as_ref()
                .context("--tls-cert is required in direct mode")?;
            let key_path = args
                .tls_key
                .as_ref()
                .context("--tls-key is required in direct mode")?;
            let client_ca = match &args.client_ca {
                Some(path) => path.clone(),
                None => find_system_ca_bundle()
                    .context("No system CA bundle found; pass --client-ca")?,
            };
            let authorizer = tls::ClientAuthorizer::from_bundle(&client_ca)?;
            let config = tls::server_config(
                tls::load_certs(cert_path)?,
                tls::load_private_key(key_path)?,
                &authorizer,
            )?;
            tls::serve(listener, config, authorizer, app, shutdown_signal()).await?;
        }
    }

    Ok(())
}

fn inspect(file: Option<&PathBuf>, der: bool, pem: bool) -> Result<bool> {
    let input = read_input(file)?;
    let outcome = match parse_input(&input, der, pem) {
        Ok(cert) => {
            let raw_pem = cert.to_pem();
            // Nothing vouched for this certificate.
            let record = cert.into_record(
                raw_pem,
                SourceVerification::Invalid {
                    authorization_error: None,
                },
            );
            CertificateOutcome::Presented(Box::new(record))
        }
        Err(e) => CertificateOutcome::Error {
            message: e.to_string(),
        },
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&CertificateResponse::from(&outcome))?
    );
    Ok(outcome.record().is_some())
}

struct ValidateOptions<'a> {
    ca_files: &'a [PathBuf],
    file: Option<&'a PathBuf>,
    verifier: VerifierKind,
    openssl: &'a PathBuf,
    verify_timeout: Option<Duration>,
    json: bool,
}

fn validate(opts: ValidateOptions<'_>) -> Result<bool> {
    let certificate = read_text(opts.file)?;
    let cas = opts
        .ca_files
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read CA file: {}", path.display()))
        })
        .collect::<Result<Vec<String>>>()?;

    let verifier = build_verifier(opts.verifier, opts.openssl, opts.verify_timeout, None)?;
    let validator = ChainValidator::new(verifier, Arc::new(ValidationCache::new()));
    let result = validator.validate(&certificate, &cas)?;

    let label = opts
        .file
        .map_or_else(|| "stdin".to_string(), |p| p.display().to_string());
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if result.valid {
        println!("{}: OK", label);
    } else {
        eprintln!(
            "{}: FAIL ({})",
            label,
            result.error.as_deref().unwrap_or("verification failed")
        );
        if let Some(hint) = &result.message {
            eprintln!("{}", hint);
        }
        if let Some(details) = &result.details {
            eprint!("{}", details);
        }
    }
    Ok(result.valid)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match &cli.command {
        Commands::Serve(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(serve(args.clone()))?;
        }
        Commands::Inspect { file, der, pem } => {
            if !inspect(file.as_ref(), *der, *pem)? {
                std::process::exit(1);
            }
        }
        Commands::Validate {
            ca_files,
            file,
            verifier,
            openssl,
            verify_timeout,
            json,
        } => {
            let valid = validate(ValidateOptions {
                ca_files,
                file: file.as_ref(),
                verifier: *verifier,
                openssl,
                verify_timeout: *verify_timeout,
                json: *json,
            })?;
            if !valid {
                std::process::exit(2);
            }
        }
        Commands::ParseDn { dn } => {
            let parsed = clientcert_lib::parse_dn(dn);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
    }

    Ok(())
}
