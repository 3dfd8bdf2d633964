use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use tracing::Level;

use crate::driver::config::{ConfigError, DriverConfig};
use crate::http::config::{DEFAULT_CONNECT_TIMEOUT, HttpConfig, ProxyConfig, ProxyError};
use crate::transport::Transport;

pub const DEFAULT_INSTANCE_NAME: &str = "default";
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TRANSPORT: &str = "ssh";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provisions the instance described by the configuration file.
    ///
    /// The state file is created when missing and updated with the resource group, the
    /// credentials and the address of the instance.
    Create(DriverArgs),
    /// Removes the instance recorded in the state file.
    Destroy(DriverArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DriverArgs {
    /// Path to the json driver configuration
    #[arg(long, short)]
    config: PathBuf,

    /// Path to the instance state file, a missing file being an empty state
    #[arg(long, short)]
    state: PathBuf,

    /// Name of the instance, used as the default resource group base name
    #[arg(long, short, default_value = DEFAULT_INSTANCE_NAME)]
    instance_name: String,

    /// Name of the test platform. Nano platforms take no WinRM custom data.
    #[arg(long)]
    platform: Option<String>,

    /// Transport used to reach the instance: `ssh` or `winrm`
    #[arg(long, default_value = DEFAULT_TRANSPORT)]
    transport: String,

    /// Private ssh key used to reach the instance. Password logins are disabled when set.
    #[arg(long)]
    ssh_key: Option<PathBuf>,

    /// Public key authorised on the instance. Defaults to the private key path with `.pub` appended.
    #[arg(long, requires = "ssh_key")]
    ssh_public_key: Option<PathBuf>,

    /// Directory holding the `public`, `internal` and `empty` json templates
    #[arg(long, default_value = DEFAULT_TEMPLATES_DIR)]
    templates: PathBuf,

    /// Proxy used to reach Azure. HTTPS_PROXY and HTTP_PROXY are used when not set.
    #[arg(long)]
    proxy_url: Option<String>,

    /// Timeout in seconds of each request sent to Azure
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout: u64,
}

impl DriverArgs {
    pub fn state_path(&self) -> &Path {
        &self.state
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates
    }

    /// Reads the configuration file, taking `AZURE_SUBSCRIPTION_ID` from the process
    /// environment when the file names no subscription.
    pub fn driver_config(&self) -> Result<DriverConfig, ConfigError> {
        let mut config = DriverConfig::load(&self.config, |name| env::var(name))?
            .for_instance(&self.instance_name);
        if let Some(platform) = &self.platform {
            config.platform_name = platform.clone();
        }
        Ok(config)
    }

    pub fn transport(&self) -> Transport {
        Transport {
            name: self.transport.clone(),
            ssh_key: self.ssh_key.clone(),
            ssh_public_key: self.ssh_public_key.clone(),
        }
    }

    pub fn http_config(&self) -> Result<HttpConfig, ProxyError> {
        let proxy = ProxyConfig::new(self.proxy_url.as_deref().unwrap_or_default())?
            .try_with_url_from_env()?;
        Ok(HttpConfig::new(
            Duration::from_secs(self.request_timeout),
            DEFAULT_CONNECT_TIMEOUT,
            proxy,
        ))
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
