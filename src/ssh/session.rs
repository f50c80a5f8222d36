use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ssh2::{CheckResult, HostKeyType, KnownHostFileKind, Session as Ssh2Session};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// SSH session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub key_path: PathBuf,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval: u32,
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_keepalive() -> u32 {
    20
}

/// Host key verification policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostKeyPolicy {
    /// Unknown hosts are rejected
    Strict,
    /// Unknown hosts are trusted on first use and recorded in known_hosts
    #[default]
    AcceptNew,
    /// Skip host key verification entirely
    Insecure,
}

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connected,
    Disconnected,
}

/// Captured output of one remote command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

/// A connected SSH session
///
/// One TCP connection, one authenticated `ssh2::Session`. Commands run
/// over short-lived exec channels; there is no interactive shell.
pub struct SshSession {
    session: Ssh2Session,
    config: SessionConfig,
    state: SessionState,
}

impl SshSession {
    /// Connect and authenticate. `config_dir` holds the known_hosts file.
    pub fn connect(config: SessionConfig, config_dir: &Path) -> AppResult<Self> {
        tracing::info!(
            "Connecting to {}@{}:{}",
            config.username,
            config.host,
            config.port
        );

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| AppError::Connection(format!("Failed to resolve {}: {}", config.host, e)))?
            .next()
            .ok_or_else(|| {
                AppError::Connection(format!("No addresses found for {}", config.host))
            })?;

        let tcp =
            TcpStream::connect_timeout(&addr, Duration::from_secs(config.connect_timeout_secs))
                .map_err(|e| AppError::Connection(format!("TCP connect failed: {}", e)))?;
        tcp.set_nodelay(true)?;
        tcp.set_write_timeout(Some(Duration::from_secs(config.connect_timeout_secs)))?;

        let mut session = Ssh2Session::new()
            .map_err(|e| AppError::Ssh(format!("Failed to create SSH session: {}", e)))?;

        session.set_tcp_stream(tcp);
        session.set_timeout((config.connect_timeout_secs as u32).saturating_mul(1000));
        session.set_keepalive(true, config.keepalive_interval);

        session
            .handshake()
            .map_err(|e| AppError::Ssh(format!("SSH handshake failed: {}", e)))?;

        verify_host_key(&session, &config, config_dir)?;
        authenticate(&session, &config)?;

        tracing::info!("SSH connected to {}:{}", config.host, config.port);

        Ok(Self {
            session,
            config,
            state: SessionState::Connected,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run a command over a fresh exec channel and collect its output.
    ///
    /// A non-zero exit status is not an error at this layer; callers
    /// inspect [`CommandOutput::exit_status`].
    pub fn run_command(&self, cmd: &str) -> AppResult<CommandOutput> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(|e| AppError::Ssh(format!("Failed to create session channel: {}", e)))?;

        channel
            .exec(cmd)
            .map_err(|e| AppError::Ssh(format!("Failed to execute remote command: {}", e)))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| AppError::Ssh(format!("Failed to read command output: {}", e)))?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| AppError::Ssh(format!("Failed to read command stderr: {}", e)))?;

        channel
            .wait_close()
            .map_err(|e| AppError::Ssh(format!("Failed to close channel: {}", e)))?;

        let exit_status = channel
            .exit_status()
            .map_err(|e| AppError::Ssh(format!("Failed to read exit status: {}", e)))?;

        tracing::debug!(
            "Remote command finished (exit {}, {} bytes stdout)",
            exit_status,
            stdout.len()
        );

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_status,
        })
    }

    /// Best-effort session close
    pub fn disconnect(&mut self) {
        let _ = self
            .session
            .disconnect(None, "closing connection", None);
        self.state = SessionState::Disconnected;
        tracing::info!("Disconnected from {}:{}", self.config.host, self.config.port);
    }
}

/// Authenticate with the private key file from the config
fn authenticate(session: &Ssh2Session, config: &SessionConfig) -> AppResult<()> {
    if !config.key_path.exists() {
        return Err(AppError::Auth(format!(
            "Private key not found: {}",
            config.key_path.display()
        )));
    }

    session
        .userauth_pubkey_file(
            &config.username,
            None,
            &config.key_path,
            config.passphrase.as_deref(),
        )
        .map_err(|e| {
            let msg = e.to_string().to_lowercase();
            if msg.contains("passphrase") || msg.contains("decrypt") || msg.contains("parse") {
                AppError::Auth(
                    "Invalid passphrase or key format. Ensure the key is in PEM or OpenSSH format."
                        .to_string(),
                )
            } else if msg.contains("denied") || msg.contains("auth") {
                AppError::Auth("Private key not accepted by server".to_string())
            } else {
                AppError::Auth("Private key authentication failed".to_string())
            }
        })?;

    if !session.authenticated() {
        return Err(AppError::Auth("Authentication failed".to_string()));
    }

    tracing::info!("SSH authentication successful for {}", config.username);
    Ok(())
}

/// Verify the host key against known_hosts per the configured policy
fn verify_host_key(
    session: &Ssh2Session,
    config: &SessionConfig,
    config_dir: &Path,
) -> AppResult<()> {
    if config.host_key_policy == HostKeyPolicy::Insecure {
        tracing::warn!(
            "Host key verification disabled for {}:{}",
            config.host,
            config.port
        );
        return Ok(());
    }

    let known_hosts_path = config_dir.join("known_hosts");

    let (key, key_type) = session
        .host_key()
        .ok_or_else(|| AppError::Ssh("No host key received".to_string()))?;

    let fingerprint = compute_sha256_fingerprint(key);

    let mut known_hosts = session
        .known_hosts()
        .map_err(|e| AppError::Ssh(format!("Failed to create known_hosts: {}", e)))?;

    if known_hosts_path.exists() {
        let _ = known_hosts.read_file(&known_hosts_path, KnownHostFileKind::OpenSSH);
    }

    match known_hosts.check_port(&config.host, config.port, key) {
        CheckResult::Match => {
            tracing::debug!("Host key matched for {}:{}", config.host, config.port);
            Ok(())
        }
        CheckResult::NotFound => match config.host_key_policy {
            HostKeyPolicy::Strict => Err(AppError::Ssh(format!(
                "Unknown host key for {}:{} ({}). \
                 Re-run without --strict-host-key to trust it on first use.",
                config.host, config.port, fingerprint
            ))),
            HostKeyPolicy::AcceptNew => {
                tracing::info!(
                    "Trusting new host key for {}:{} ({})",
                    config.host,
                    config.port,
                    fingerprint
                );

                let key_format = match key_type {
                    HostKeyType::Rsa => ssh2::KnownHostKeyFormat::SshRsa,
                    HostKeyType::Dss => ssh2::KnownHostKeyFormat::SshDss,
                    _ => ssh2::KnownHostKeyFormat::Unknown,
                };

                known_hosts
                    .add(
                        &config.host,
                        key,
                        &format!("Added by metalite on {}", chrono::Utc::now()),
                        key_format,
                    )
                    .map_err(|e| AppError::Ssh(format!("Failed to add known host: {}", e)))?;

                if let Some(parent) = known_hosts_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                known_hosts
                    .write_file(&known_hosts_path, KnownHostFileKind::OpenSSH)
                    .map_err(|e| AppError::Ssh(format!("Failed to write known_hosts: {}", e)))?;

                Ok(())
            }
            HostKeyPolicy::Insecure => Ok(()),
        },
        CheckResult::Mismatch => {
            tracing::error!(
                "HOST KEY MISMATCH for {}:{}! Possible MITM attack!",
                config.host,
                config.port
            );
            Err(AppError::Ssh(format!(
                "Host key for {}:{} has changed (now {}). \
                 This could indicate a man-in-the-middle attack. \
                 If you trust the change, remove the old entry from {}.",
                config.host,
                config.port,
                fingerprint,
                known_hosts_path.display()
            )))
        }
        CheckResult::Failure => Err(AppError::Ssh("Failed to check known hosts".to_string())),
    }
}

/// Compute SHA256 fingerprint of a host key
fn compute_sha256_fingerprint(key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    let result = hasher.finalize();

    let b64 = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, result);
    format!("SHA256:{}", b64.trim_end_matches('='))
}

/// Split an optional `:port` suffix off a host string.
///
/// Bare IPv6 addresses (more than one colon, or bracketed) are left
/// intact; only `[addr]:port` carries a port for those.
pub fn split_host_port(input: &str, default_port: u16) -> (String, u16) {
    if let Some(rest) = input.strip_prefix('[') {
        if let Some((host, port)) = rest.rsplit_once("]:") {
            if let Ok(port) = port.parse() {
                return (host.to_string(), port);
            }
        }
        return (
            rest.trim_end_matches(']').to_string(),
            default_port,
        );
    }

    if input.matches(':').count() == 1 {
        if let Some((host, port)) = input.rsplit_once(':') {
            if let Ok(port) = port.parse() {
                return (host.to_string(), port);
            }
        }
    }

    (input.to_string(), default_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_format() {
        let test_key = b"test key data";
        let fp = compute_sha256_fingerprint(test_key);
        assert!(fp.starts_with("SHA256:"));
        assert!(!fp.ends_with('='));
    }

    #[test]
    fn test_split_host_port_plain() {
        assert_eq!(split_host_port("db.internal", 22), ("db.internal".into(), 22));
    }

    #[test]
    fn test_split_host_port_explicit() {
        assert_eq!(split_host_port("db.internal:2222", 22), ("db.internal".into(), 2222));
    }

    #[test]
    fn test_split_host_port_ipv6() {
        assert_eq!(split_host_port("::1", 22), ("::1".into(), 22));
        assert_eq!(split_host_port("[::1]", 22), ("::1".into(), 22));
        assert_eq!(split_host_port("[::1]:2200", 22), ("::1".into(), 2200));
    }

    #[test]
    fn test_split_host_port_bad_port_is_host() {
        // "host:stuff" with a non-numeric suffix is treated as a bare host
        assert_eq!(split_host_port("db:prod", 22), ("db:prod".into(), 22));
    }

    #[test]
    fn test_session_config_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"host":"db.internal","username":"deploy","key_path":"/tmp/id_ed25519"}"#,
        )
        .unwrap();
        assert_eq!(config.port, 22);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.host_key_policy, HostKeyPolicy::AcceptNew);
        assert!(config.passphrase.is_none());
    }
}
