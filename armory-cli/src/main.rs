use anyhow::{Context, Result, anyhow};
use armory_core::{
    Backend, DEFAULT_MAX_KEY_BYTES, DEFAULT_MAX_MESSAGE_BYTES, DecryptRequest, EncryptRequest,
    EngineConfig, KeyAlgorithm, KeyGenParams, KeySource, Passphrase, SignRequest, SignerSpec,
    VerificationOutcome, VerifyRequest, sanitize_for_terminal,
};
use armory_pgp::NativeBackend;
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "armory",
    version,
    about = "OpenPGP encryption with fail-closed signature verification"
)]
struct Cli {
    #[arg(long = "passphrase", global = true)]
    passphrase: Option<String>,

    #[arg(long = "passphrase-file", global = true)]
    passphrase_file: Option<String>,

    /// Upper bound for message input and buffered plaintext.
    #[arg(long, global = true, env = "ARMORY_MAX_INPUT_BYTES", default_value_t = DEFAULT_MAX_MESSAGE_BYTES)]
    max_input_bytes: usize,

    #[arg(long, global = true, env = "ARMORY_MAX_KEY_BYTES", default_value_t = DEFAULT_MAX_KEY_BYTES)]
    max_key_bytes: u64,

    /// `Comment:` header added to every armored block written.
    #[arg(long, global = true, env = "ARMORY_ARMOR_COMMENT")]
    armor_comment: Option<String>,

    /// Default log filter; ARMORY_LOG or RUST_LOG take precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a key pair and write `<name>.pub.asc` and `<name>.sec.asc`.
    #[command(alias = "gen")]
    Keygen {
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long, default_value_t = KeyAlgorithm::Cv25519)]
        algo: KeyAlgorithm,
        #[arg(long = "no-passphrase")]
        no_passphrase: bool,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    #[command(alias = "enc")]
    Encrypt {
        #[arg(short = 'r', long = "recipient", value_name = "PUBLIC_KEY")]
        recipient: PathBuf,
        #[arg(long = "sign-with", value_name = "PRIVATE_KEY")]
        sign_with: Option<PathBuf>,
        #[arg(long, alias = "in")]
        input: Option<String>,
        #[arg(short = 'o', long, alias = "out")]
        output: Option<String>,
        #[arg(value_name = "FILE", index = 1)]
        input_file: Option<String>,
    },
    #[command(alias = "dec")]
    Decrypt {
        #[arg(short = 'k', long = "key", value_name = "PRIVATE_KEY")]
        key: PathBuf,
        #[arg(long = "verify-with", value_name = "PUBLIC_KEY")]
        verify_with: Option<PathBuf>,
        #[arg(long, alias = "in")]
        input: Option<String>,
        #[arg(short = 'o', long, alias = "out")]
        output: Option<String>,
        #[arg(value_name = "FILE", index = 1)]
        input_file: Option<String>,
    },
    #[command(alias = "sig")]
    Sign {
        #[arg(short = 'k', long = "key", value_name = "PRIVATE_KEY")]
        key: PathBuf,
        #[arg(long, alias = "in")]
        input: Option<String>,
        #[arg(short = 'o', long, alias = "out")]
        output: Option<String>,
        #[arg(value_name = "FILE", index = 1)]
        input_file: Option<String>,
    },
    #[command(alias = "ver")]
    Verify {
        #[arg(long, value_name = "PUBLIC_KEY")]
        signer: PathBuf,
        #[arg(long)]
        sig: String,
        #[arg(long, alias = "in")]
        input: Option<String>,
        #[arg(value_name = "FILE", index = 1)]
        input_file: Option<String>,
    },
    /// List the keys in an armored key file or key ring.
    #[command(alias = "ls")]
    Inspect { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    if cli.passphrase.is_some() {
        eprintln!("warning: --passphrase can expose secrets in process listings");
    }
    if cli.passphrase.is_some() && cli.passphrase_file.is_some() {
        eprintln!("warning: both --passphrase and --passphrase-file set; using file");
    }
    let passphrase = match &cli.passphrase_file {
        Some(path) => Some(read_passphrase_file(path)?),
        None => cli.passphrase.clone().map(Passphrase::new),
    };

    let config = engine_config(&cli);
    let limit = config.max_message_bytes;
    debug!(?config, "engine configuration");
    let backend = NativeBackend::new(config);

    match cli.cmd {
        Command::Keygen {
            name,
            email,
            comment,
            algo,
            no_passphrase,
            out_dir,
        } => {
            let has_passphrase = passphrase.as_ref().is_some_and(|p| !p.is_empty());
            if !has_passphrase && !no_passphrase {
                return Err(anyhow!(
                    "passphrase required for keygen; use a non-empty --passphrase/--passphrase-file or --no-passphrase"
                ));
            }
            let mut params = KeyGenParams::new(name.clone(), email);
            if let Some(comment) = comment {
                params = params.with_comment(comment);
            }
            if let Some(passphrase) = passphrase {
                params = params.with_passphrase(passphrase);
            }
            let backend = NativeBackend::new(backend.config().clone().with_cipher_suite(algo));
            let pair = backend.generate_key_pair(params)?;

            let stem = key_file_stem(&name);
            let public_path = out_dir.join(format!("{stem}.pub.asc"));
            let secret_path = out_dir.join(format!("{stem}.sec.asc"));
            write_new_file(&public_path, pair.public_key.as_bytes(), false)?;
            write_new_file(&secret_path, pair.private_key.as_bytes(), true)?;
            println!("created key: {}", pair.fingerprint);
            println!("public key: {}", public_path.display());
            println!("private key: {}", secret_path.display());
            Ok(())
        }
        Command::Encrypt {
            recipient,
            sign_with,
            input,
            output,
            input_file,
        } => {
            let input_path = merge_arg("input", input, input_file, "--input", "FILE")?;
            let plaintext = read_input(input_path, limit)?;
            let signer = match sign_with {
                Some(key) => SignerSpec::signing(key, passphrase.unwrap_or_default()),
                None => SignerSpec::None,
            };
            let request = EncryptRequest {
                recipient: KeySource::Path(recipient),
                plaintext,
                signer,
            };
            match output {
                Some(path) => {
                    let mut file = fs::File::create(&path)
                        .with_context(|| format!("failed to create {path}"))?;
                    if let Err(err) = backend.encrypt(&mut file, request) {
                        drop(file);
                        let _ = fs::remove_file(&path);
                        return Err(err.into());
                    }
                    file.sync_all()?;
                }
                None => {
                    let mut stdout = io::stdout();
                    backend.encrypt(&mut stdout, request)?;
                    stdout.flush()?;
                }
            }
            Ok(())
        }
        Command::Decrypt {
            key,
            verify_with,
            input,
            output,
            input_file,
        } => {
            let input_path = merge_arg("input", input, input_file, "--input", "FILE")?;
            let ciphertext = read_input(input_path, limit)?;
            let signer = match verify_with {
                Some(path) => SignerSpec::verifying(path),
                None => SignerSpec::None,
            };
            let decrypted = backend.decrypt(DecryptRequest {
                recipient: KeySource::Path(key),
                passphrase: passphrase.unwrap_or_default(),
                ciphertext,
                signer,
            })?;
            if let VerificationOutcome::Verified {
                key_id,
                fingerprint,
            } = decrypted.verification()
            {
                eprintln!("valid signature from {fingerprint} (key {key_id})");
            }
            write_output(output, decrypted.plaintext())
        }
        Command::Sign {
            key,
            input,
            output,
            input_file,
        } => {
            let input_path = merge_arg("input", input, input_file, "--input", "FILE")?;
            let data = read_input(input_path, limit)?;
            let signature = backend.sign(SignRequest {
                signer: KeySource::Path(key),
                passphrase: passphrase.unwrap_or_default(),
                data,
            })?;
            write_output(output, signature.as_bytes())
        }
        Command::Verify {
            signer,
            sig,
            input,
            input_file,
        } => {
            let input_path = merge_arg("input", input, input_file, "--input", "FILE")?;
            let signature = read_input(Some(sig), limit)?;
            let data = read_input(input_path, limit)?;
            let outcome = backend.verify(VerifyRequest {
                signer: KeySource::Path(signer),
                data,
                signature,
            })?;
            match outcome {
                VerificationOutcome::Verified {
                    key_id,
                    fingerprint,
                } => {
                    println!("valid signature from {fingerprint} (key {key_id})");
                    Ok(())
                }
                other => Err(anyhow!("signature not verified: {other:?}")),
            }
        }
        Command::Inspect { path } => {
            let keys = backend.inspect_keys(&KeySource::Path(path))?;
            for key in keys {
                let user = key
                    .user_ids
                    .first()
                    .map(|u| sanitize_for_terminal(&u.0))
                    .unwrap_or_else(|| "(no user id)".to_string());
                let created = key.created_utc.as_deref().unwrap_or("(unknown)");
                let kind = if key.has_secret { "sec" } else { "pub" };
                let protection = match (key.has_secret, key.secret_encrypted) {
                    (false, _) => "-",
                    (true, true) => "protected",
                    (true, false) => "unprotected",
                };
                println!(
                    "{} | {} | {} | {} | {} | {}",
                    kind, key.fingerprint, user, key.algo, created, protection
                );
                for subkey in &key.subkeys {
                    println!("  sub | {subkey}");
                }
            }
            Ok(())
        }
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_env("ARMORY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

fn engine_config(cli: &Cli) -> EngineConfig {
    EngineConfig::default()
        .with_max_message_bytes(cli.max_input_bytes)
        .with_max_key_bytes(cli.max_key_bytes)
        .with_armor_comment(cli.armor_comment.clone())
}

fn read_input(path: Option<String>, limit: usize) -> Result<Vec<u8>> {
    match path {
        Some(path) if path == "-" => read_to_end_limited(io::stdin(), limit),
        Some(path) => {
            let metadata = fs::metadata(&path).with_context(|| format!("failed to open {path}"))?;
            if metadata.len() > limit as u64 {
                return Err(anyhow!(
                    "input exceeds size limit ({limit} bytes); set ARMORY_MAX_INPUT_BYTES to override"
                ));
            }
            Ok(fs::read(path)?)
        }
        None => read_to_end_limited(io::stdin(), limit),
    }
}

fn read_passphrase_file(path: &str) -> Result<Passphrase> {
    let bytes = fs::read(path)?;
    let mut passphrase = String::from_utf8(bytes)
        .map_err(|err| anyhow!("passphrase file must be valid UTF-8: {err}"))?;
    while passphrase.ends_with('\n') || passphrase.ends_with('\r') {
        passphrase.pop();
    }
    Ok(Passphrase::new(passphrase))
}

fn write_output(path: Option<String>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => write_file_secure(Path::new(&path), bytes),
        None => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn merge_arg(
    label: &str,
    primary: Option<String>,
    secondary: Option<String>,
    primary_name: &str,
    secondary_name: &str,
) -> Result<Option<String>> {
    if primary.is_some() && secondary.is_some() {
        return Err(anyhow!(
            "use either {primary_name} or {secondary_name} for {label}"
        ));
    }
    Ok(primary.or(secondary))
}

fn read_to_end_limited<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        if buf.len() + read > limit {
            return Err(anyhow!(
                "input exceeds size limit ({limit} bytes); set ARMORY_MAX_INPUT_BYTES to override"
            ));
        }
        buf.extend_from_slice(&chunk[..read]);
    }
    Ok(buf)
}

/// File name stem for generated keys: the name with anything outside
/// `[A-Za-z0-9_-]` replaced by `_`.
fn key_file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "key".to_string()
    } else {
        stem
    }
}

fn write_file_secure(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::fs::OpenOptions;

    #[cfg(unix)]
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Writes a key file, refusing to replace an existing one.
fn write_new_file(path: &Path, bytes: &[u8], secret: bool) -> Result<()> {
    use std::fs::OpenOptions;

    #[cfg(unix)]
    use std::os::unix::fs::OpenOptionsExt;

    let mut options = OpenOptions::new();
    options.create_new(true).write(true);
    #[cfg(unix)]
    if secret {
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = secret;
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
