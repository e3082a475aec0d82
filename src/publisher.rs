//! Payload delivery to the marquee channel.
//!
//! Both publishers replace the channel file atomically: the payload is
//! written to `<path>.tmp` and renamed over `<path>`, so the reader never sees
//! a partial write.

use crate::config::{PublishConfig, PublishTarget};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Invalid channel path: {0}")]
    InvalidPath(String),

    #[error("Publisher task failed: {0}")]
    Join(String),

    #[error("The sftp target requires building with the `sftp` feature")]
    SftpDisabled,
}

/// Atomically replaces the content of the marquee channel
#[async_trait::async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, payload: &str) -> Result<(), PublishError>;

    /// Human readable destination, for logs
    fn describe(&self) -> String;
}

/// `<path>.tmp`, next to the channel file
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Publisher writing a file on this machine
#[derive(Debug, Clone)]
pub struct LocalFilePublisher {
    path: PathBuf,
}

impl LocalFilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn write_temp(&self, tmp: &Path, payload: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::File::create(tmp).await?;
        file.write_all(payload.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Publisher for LocalFilePublisher {
    async fn publish(&self, payload: &str) -> Result<(), PublishError> {
        let tmp = temp_path(&self.path);

        let result = match self.write_temp(&tmp, payload).await {
            Ok(()) => tokio::fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };

        if let Err(source) = result {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {:?}: {}", tmp, e);
                }
            }
            return Err(PublishError::Io {
                path: self.path.clone(),
                source,
            });
        }

        debug!("Wrote {} bytes to {:?}", payload.len(), self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

#[cfg(feature = "sftp")]
mod sftp {
    use super::*;
    use crate::config::SftpConfig;
    use ssh2::Session;
    use std::io::{Read, Write};
    use std::net::{TcpStream, ToSocketAddrs};
    use std::time::Duration;

    /// Publisher writing the channel file on the marquee host over SFTP
    #[derive(Debug, Clone)]
    pub struct SftpPublisher {
        config: SftpConfig,
        path: PathBuf,
    }

    impl SftpPublisher {
        pub fn new(config: SftpConfig, path: PathBuf) -> Self {
            Self { config, path }
        }

        fn connect(config: &SftpConfig) -> Result<Session, PublishError> {
            let address = (config.host.as_str(), config.port)
                .to_socket_addrs()
                .map_err(|e| PublishError::Connection(format!("{}: {e}", config.host)))?
                .next()
                .ok_or_else(|| {
                    PublishError::Connection(format!("{} did not resolve", config.host))
                })?;

            let timeout = Duration::from_secs(config.connect_timeout_seconds.max(1));
            let tcp = TcpStream::connect_timeout(&address, timeout)
                .map_err(|e| PublishError::Connection(format!("{address}: {e}")))?;
            tcp.set_read_timeout(Some(timeout))
                .and_then(|_| tcp.set_write_timeout(Some(timeout)))
                .map_err(|e| PublishError::Connection(format!("Failed to set timeouts: {e}")))?;

            let mut session =
                Session::new().map_err(|e| PublishError::Connection(e.to_string()))?;
            session.set_tcp_stream(tcp);
            session
                .handshake()
                .map_err(|e| PublishError::Connection(format!("SSH handshake failed: {e}")))?;

            match (&config.password, &config.key_path) {
                (Some(password), _) => session.userauth_password(&config.username, password),
                (None, key_path) => {
                    let key_path = match key_path {
                        Some(path) => path.clone(),
                        None => dirs::home_dir()
                            .ok_or_else(|| {
                                PublishError::Authentication(
                                    "Could not determine home directory".to_string(),
                                )
                            })?
                            .join(".ssh")
                            .join("id_rsa"),
                    };
                    session.userauth_pubkey_file(&config.username, None, &key_path, None)
                }
            }
            .map_err(|e| PublishError::Authentication(e.to_string()))?;

            if !session.authenticated() {
                return Err(PublishError::Authentication(format!(
                    "{} rejected user {}",
                    config.host, config.username
                )));
            }
            Ok(session)
        }

        fn publish_blocking(
            config: &SftpConfig,
            path: &Path,
            payload: &str,
        ) -> Result<(), PublishError> {
            let path_str = path
                .to_str()
                .filter(|p| !p.contains('\''))
                .ok_or_else(|| PublishError::InvalidPath(path.display().to_string()))?;
            let tmp = temp_path(path);
            let tmp_str = tmp
                .to_str()
                .ok_or_else(|| PublishError::InvalidPath(tmp.display().to_string()))?;

            let session = Self::connect(config)?;

            {
                let sftp = session
                    .sftp()
                    .map_err(|e| PublishError::Remote(format!("Failed to open SFTP channel: {e}")))?;
                let mut remote_file = sftp
                    .create(&tmp)
                    .map_err(|e| PublishError::Remote(format!("Failed to create {tmp_str}: {e}")))?;
                remote_file
                    .write_all(payload.as_bytes())
                    .map_err(|e| PublishError::Remote(format!("Failed to write {tmp_str}: {e}")))?;
            }

            // SFTPv3 servers refuse to rename over an existing file
            let mut channel = session
                .channel_session()
                .map_err(|e| PublishError::Remote(format!("Failed to open SSH channel: {e}")))?;
            channel
                .exec(&format!("mv -f '{tmp_str}' '{path_str}'"))
                .map_err(|e| PublishError::Remote(format!("Failed to run rename: {e}")))?;

            let mut stderr = String::new();
            channel.stderr().read_to_string(&mut stderr).ok();
            channel.wait_close().ok();

            let status = channel
                .exit_status()
                .map_err(|e| PublishError::Remote(format!("No rename exit status: {e}")))?;
            if status != 0 {
                return Err(PublishError::Remote(format!(
                    "Rename failed ({status}): {}",
                    stderr.trim()
                )));
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl Publisher for SftpPublisher {
        async fn publish(&self, payload: &str) -> Result<(), PublishError> {
            let config = self.config.clone();
            let path = self.path.clone();
            let payload = payload.to_string();

            tokio::task::spawn_blocking(move || Self::publish_blocking(&config, &path, &payload))
                .await
                .map_err(|e| PublishError::Join(e.to_string()))?
        }

        fn describe(&self) -> String {
            format!(
                "sftp {}@{}:{}{}",
                self.config.username,
                self.config.host,
                self.config.port,
                self.path.display()
            )
        }
    }
}

#[cfg(feature = "sftp")]
pub use sftp::SftpPublisher;

/// Build the publisher selected by the configuration
pub fn build_publisher(config: &PublishConfig) -> Result<Box<dyn Publisher>, PublishError> {
    match config.target {
        PublishTarget::Local => Ok(Box::new(LocalFilePublisher::new(config.path.clone()))),
        #[cfg(feature = "sftp")]
        PublishTarget::Sftp => Ok(Box::new(SftpPublisher::new(
            config.sftp.clone(),
            config.path.clone(),
        ))),
        #[cfg(not(feature = "sftp"))]
        PublishTarget::Sftp => Err(PublishError::SftpDisabled),
    }
}
