//! Bot configuration store. Services are held as plaintext in memory and their
//! sensitive fields are sealed with the store's secret whenever they are written
//! to disk. A store without a secret writes everything as given.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::crypto::secrets::{CipherError, SecretCipher};
use crate::services::{ServiceDescriptor, ServiceType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("config serialization failed: {0}")]
    Serialize(String),
    #[error("a {service_type} service with id '{id}' is already connected")]
    DuplicateService { service_type: ServiceType, id: String },
    #[error("no service found with name or id '{0}'")]
    ServiceNotFound(String),
    #[error("this operation requires a secret")]
    SecretRequired,
    #[error("the secret is incorrect")]
    SecretIncorrect,
    #[error("sensitive field unreadable: {0}")]
    Cipher(#[from] CipherError),
    #[error("no file path bound to this configuration")]
    MissingPath,
}

/// On-disk shape of a bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfigDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "secretVerifier")]
    pub secret_key: String,
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

/// Live configuration: metadata, connected services and the session secret.
///
/// The service list is either entirely plaintext or entirely sealed;
/// `services_sealed` records which.
#[derive(Debug)]
pub struct BotConfig {
    pub name: String,
    pub description: String,
    secret_key: String,
    services: Vec<ServiceDescriptor>,
    services_sealed: bool,
    cipher: Option<SecretCipher>,
    secret_validated: bool,
    path: Option<PathBuf>,
}

impl BotConfig {
    /// Creates an empty store with no backing file. An empty `secret` puts the
    /// store in plaintext mode.
    pub fn new(secret: &str) -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            secret_key: String::new(),
            services: Vec::new(),
            services_sealed: false,
            cipher: SecretCipher::new(secret),
            secret_validated: false,
            path: None,
        }
    }

    /// Reads a configuration file and binds the store to `path`. Sensitive
    /// fields are decrypted only when both `secret` and the stored verifier
    /// are present; otherwise services stay exactly as stored.
    pub fn load(path: impl AsRef<Path>, secret: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw_json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let document: BotConfigDocument = serde_json::from_str(&raw_json)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;

        let services_sealed = !document.secret_key.is_empty();
        let mut config = Self {
            name: document.name,
            description: document.description,
            secret_key: document.secret_key,
            services: document.services,
            services_sealed,
            cipher: SecretCipher::new(secret),
            secret_validated: false,
            path: Some(path.to_path_buf()),
        };
        debug!(
            path = %path.display(),
            services = config.services.len(),
            "loaded bot configuration"
        );

        if config.cipher.is_some() && config.services_sealed {
            config.decrypt_all_services()?;
        } else if config.services_sealed {
            debug!("no secret supplied; sensitive fields left encrypted");
        }
        Ok(config)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Opaque verifier proving which secret sealed this store; empty when none.
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }

    /// Whether the in-memory sensitive fields currently hold ciphertext.
    pub fn services_sealed(&self) -> bool {
        self.services_sealed
    }

    pub fn find_service(&self, service_type: ServiceType, id: &str) -> Option<&ServiceDescriptor> {
        self.services
            .iter()
            .find(|s| s.service_type() == service_type && s.id() == id)
    }

    pub fn find_service_by_name_or_id(&self, token: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.id() == token || s.name() == token)
    }

    /// Appends a service, renaming it with a ` (n)` suffix if its name is
    /// taken. Returns the name it was stored under. When the list is sealed
    /// the new service is sealed too, which needs the secret.
    pub fn connect_service(
        &mut self,
        mut service: ServiceDescriptor,
    ) -> Result<String, ConfigError> {
        let service_type = service.service_type();
        if self.find_service(service_type, service.id()).is_some() {
            return Err(ConfigError::DuplicateService {
                service_type,
                id: service.id().to_string(),
            });
        }

        if self.services_sealed {
            self.validate_secret()?;
            let cipher = self.cipher.as_mut().ok_or(ConfigError::SecretRequired)?;
            for value in service.sensitive_values_mut() {
                *value = cipher.encrypt(value)?;
            }
        }

        let name = self.unique_name(service.name());
        service.set_name(name.clone());
        info!(service_type = %service_type, id = service.id(), name = %name, "connected service");
        self.services.push(service);
        Ok(name)
    }

    /// Removes the first service matching `(service_type, id)`. Absent
    /// services are not an error.
    pub fn disconnect_service(
        &mut self,
        service_type: ServiceType,
        id: &str,
    ) -> Option<ServiceDescriptor> {
        let index = self
            .services
            .iter()
            .position(|s| s.service_type() == service_type && s.id() == id)?;
        let removed = self.services.remove(index);
        info!(service_type = %service_type, id, "disconnected service");
        Some(removed)
    }

    /// Removes the first service whose id or name equals `token`.
    pub fn disconnect_service_by_name_or_id(
        &mut self,
        token: &str,
    ) -> Result<ServiceDescriptor, ConfigError> {
        let index = self
            .services
            .iter()
            .position(|s| s.id() == token || s.name() == token)
            .ok_or_else(|| ConfigError::ServiceNotFound(token.to_string()))?;
        let removed = self.services.remove(index);
        info!(service_type = %removed.service_type(), id = removed.id(), "disconnected service");
        Ok(removed)
    }

    /// Checks the session secret against the stored verifier, creating the
    /// verifier on first use. Success is remembered for this instance.
    pub fn validate_secret(&mut self) -> Result<(), ConfigError> {
        if self.secret_validated {
            return Ok(());
        }
        let cipher = self.cipher.as_mut().ok_or(ConfigError::SecretRequired)?;

        if self.secret_key.is_empty() {
            let token = Uuid::new_v4().to_string();
            self.secret_key = cipher.encrypt(&token)?;
            info!("created secret verifier");
        } else if let Err(err) = cipher.decrypt(&self.secret_key) {
            debug!(error = %err, "secret verifier did not decrypt");
            return Err(ConfigError::SecretIncorrect);
        }

        self.secret_validated = true;
        Ok(())
    }

    /// Drops the secret and its verifier. Later saves write plaintext.
    pub fn clear_secret(&mut self) -> Result<(), ConfigError> {
        self.decrypt_all_services()?;
        self.cipher = None;
        self.secret_key.clear();
        self.secret_validated = false;
        warn!("secret cleared; sensitive fields will be saved unencrypted");
        Ok(())
    }

    /// Replaces a validated secret with `new_secret` and issues a fresh
    /// verifier. The next save re-seals every service under the new secret.
    pub fn rotate_secret(&mut self, new_secret: &str) -> Result<(), ConfigError> {
        self.decrypt_all_services()?;
        let cipher = SecretCipher::new(new_secret).ok_or(ConfigError::SecretRequired)?;
        self.cipher = Some(cipher);
        self.secret_key.clear();
        self.secret_validated = false;
        self.validate_secret()?;
        info!("secret rotated");
        Ok(())
    }

    /// Seals every sensitive field in memory. A no-op when already sealed.
    pub fn encrypt_all_services(&mut self) -> Result<(), ConfigError> {
        self.validate_secret()?;
        if self.services_sealed {
            debug!("services already sealed");
            return Ok(());
        }
        self.services = self.sealed_services()?;
        self.services_sealed = true;
        Ok(())
    }

    /// Opens every sensitive field in memory. A no-op when already plaintext.
    pub fn decrypt_all_services(&mut self) -> Result<(), ConfigError> {
        self.validate_secret()?;
        if !self.services_sealed {
            debug!("services already in plaintext");
            return Ok(());
        }
        let cipher = self.cipher.as_mut().ok_or(ConfigError::SecretRequired)?;
        self.services = transform_services(&self.services, |value| cipher.decrypt(value))?;
        self.services_sealed = false;
        Ok(())
    }

    /// Writes the store to the file it was loaded from.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        let path = self.path.clone().ok_or(ConfigError::MissingPath)?;
        self.save_to(path)
    }

    /// Writes the store to `path` without rebinding it. The in-memory
    /// services are never modified; an encrypted copy is what gets written.
    /// A store carrying a verifier cannot be saved without its secret.
    pub fn save_to(&mut self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let services = match (self.cipher.is_some(), self.services_sealed) {
            (false, _) if !self.secret_key.is_empty() => return Err(ConfigError::SecretRequired),
            (false, _) => {
                warn!(
                    path = %path.display(),
                    "saving without a secret; credentials are stored in plaintext"
                );
                self.services.clone()
            }
            (true, true) => {
                self.validate_secret()?;
                self.services.clone()
            }
            (true, false) => self.sealed_services()?,
        };

        let document = BotConfigDocument {
            name: self.name.clone(),
            description: self.description.clone(),
            secret_key: self.secret_key.clone(),
            services,
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| ConfigError::Serialize(format!("{e}")))?;
        write_atomically(path, json.as_bytes())?;
        debug!(
            path = %path.display(),
            services = document.services.len(),
            "saved bot configuration"
        );
        Ok(())
    }

    fn sealed_services(&mut self) -> Result<Vec<ServiceDescriptor>, ConfigError> {
        self.validate_secret()?;
        let cipher = self.cipher.as_mut().ok_or(ConfigError::SecretRequired)?;
        transform_services(&self.services, |value| cipher.encrypt(value))
    }

    fn unique_name(&self, base: &str) -> String {
        let taken = |candidate: &str| self.services.iter().any(|s| s.name() == candidate);
        if !taken(base) {
            return base.to_string();
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{base} ({suffix})");
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

/// Applies `apply` to every sensitive field of a copy of `services`.
fn transform_services<F>(
    services: &[ServiceDescriptor],
    mut apply: F,
) -> Result<Vec<ServiceDescriptor>, ConfigError>
where
    F: FnMut(&str) -> Result<String, CipherError>,
{
    let mut transformed = services.to_vec();
    for service in transformed.iter_mut() {
        for value in service.sensitive_values_mut() {
            *value = apply(value)?;
        }
    }
    Ok(transformed)
}

/// Replaces `path` with `contents` via a synced temp file in the same directory.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), ConfigError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let io_err = |e: std::io::Error| ConfigError::Io(format!("{}: {e}", path.display()));

    let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
    file.write_all(contents).map_err(io_err)?;
    file.as_file().sync_all().map_err(io_err)?;
    file.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
