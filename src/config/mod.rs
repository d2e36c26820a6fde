pub mod etcd;

use std::fs;
use std::net::SocketAddr;

use log::{debug, trace};
use pingora::server::configuration::{Opt, ServerConf};
use pingora_error::{Error, ErrorType::*, OrErr, Result};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::repository;

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_prefixes"))]
pub struct Config {
    #[serde(default)]
    pub pingora: ServerConf,

    #[validate(nested)]
    pub etcd: Etcd,
    #[serde(default)]
    #[validate(nested)]
    pub queue: Queue,
    #[serde(default)]
    #[validate(nested)]
    pub runtime: Runtime,
    #[serde(default)]
    #[validate(nested)]
    pub shipper: Shipper,
    #[serde(default)]
    pub provisioning: Provisioning,
    #[serde(default)]
    #[validate(nested)]
    pub repository: Repository,

    pub log: Option<Log>,
    pub prometheus: Option<Prometheus>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config file load entry point
    pub fn load_yaml_with_opt_override(opt: &Opt) -> Result<Self> {
        if let Some(path) = &opt.conf {
            let mut conf = Self::load_from_yaml(path)?;
            conf.merge_with_opt(opt);
            Ok(conf)
        } else {
            Error::e_explain(ReadError, "No path specified")
        }
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).or_err_with(ReadError, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()
            .or_err_with(FileReadError, || "Conf file valid failed")?;

        Ok(conf)
    }

    #[allow(dead_code)]
    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }

    pub fn merge_with_opt(&mut self, opt: &Opt) {
        if opt.daemon {
            self.pingora.daemon = true;
        }
    }

    fn validate_prefixes(&self) -> Result<(), ValidationError> {
        let store = self.etcd.prefix.trim_end_matches('/');
        let queue = self.queue.prefix.trim_end_matches('/');
        if store == queue {
            return Err(ValidationError::new("queue_prefix_must_differ_from_store_prefix"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Etcd::validate_auth"))]
pub struct Etcd {
    #[validate(length(min = 1))]
    pub host: Vec<String>,
    #[serde(default = "Etcd::default_prefix")]
    #[validate(length(min = 1))]
    pub prefix: String,
    pub timeout: Option<u32>,
    pub connect_timeout: Option<u32>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for Etcd {
    fn default() -> Self {
        Self {
            host: vec!["http://127.0.0.1:2379".to_string()],
            prefix: Self::default_prefix(),
            timeout: None,
            connect_timeout: None,
            user: None,
            password: None,
        }
    }
}

impl Etcd {
    fn default_prefix() -> String {
        "/provisiond".to_string()
    }

    fn validate_auth(&self) -> Result<(), ValidationError> {
        if self.user.is_some() != self.password.is_some() {
            Err(ValidationError::new("user_and_password_required_together"))
        } else {
            Ok(())
        }
    }
}

/// Key prefix in etcd that carries inbound job messages
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Queue {
    #[serde(default = "Queue::default_prefix")]
    #[validate(length(min = 1))]
    pub prefix: String,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            prefix: Self::default_prefix(),
        }
    }
}

impl Queue {
    fn default_prefix() -> String {
        "/provisiond/queue".to_string()
    }
}

pub const UNIX_SCHEME: &str = "unix://";

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Runtime {
    #[serde(default = "Runtime::default_endpoint")]
    #[validate(custom(function = "Runtime::validate_endpoint"))]
    pub endpoint: String,
    /// Seconds allowed for one create call, connect to response body
    #[serde(default = "Runtime::default_timeout")]
    #[validate(range(min = 1))]
    pub timeout: u64,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            timeout: Self::default_timeout(),
        }
    }
}

impl Runtime {
    fn default_endpoint() -> String {
        "unix:///var/run/docker.sock".to_string()
    }

    fn default_timeout() -> u64 {
        30
    }

    fn validate_endpoint(endpoint: &str) -> Result<(), ValidationError> {
        match endpoint.strip_prefix(UNIX_SCHEME) {
            Some(path) if !path.is_empty() => Ok(()),
            _ => {
                let mut err = ValidationError::new("unsupported_runtime_endpoint");
                err.add_param("endpoint".into(), &endpoint.to_string());
                Err(err)
            }
        }
    }

    /// Filesystem path of the runtime socket
    pub fn socket_path(&self) -> &str {
        self.endpoint
            .strip_prefix(UNIX_SCHEME)
            .unwrap_or(&self.endpoint)
    }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize, Validate)]
pub struct Shipper {
    #[validate(length(min = 1))]
    pub command: Option<String>,
    #[validate(range(min = 1))]
    pub max_inflight: Option<usize>,
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
pub struct Provisioning {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// What a provisioning run does when a container cannot be created
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole run on the first failure, nothing is shipped
    #[default]
    FailFast,
    /// Record the failure, skip the component and keep going
    Continue,
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Repository {
    #[serde(default = "Repository::default_provider")]
    #[validate(custom(function = "Repository::validate_provider"))]
    pub provider: String,
    pub api_server: Option<String>,
}

impl Default for Repository {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            api_server: None,
        }
    }
}

impl Repository {
    fn default_provider() -> String {
        repository::gitlab::PROVIDER_NAME.to_string()
    }

    fn validate_provider(provider: &str) -> Result<(), ValidationError> {
        if repository::manager(provider).is_ok() {
            Ok(())
        } else {
            let mut err = ValidationError::new("unknown_repository_provider");
            err.add_param("provider".into(), &provider.to_string());
            Err(err)
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prometheus {
    pub address: SocketAddr,
}
