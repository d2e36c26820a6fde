use std::time::Duration;

use etcd_client::{Client, ConnectOptions};

use super::Etcd;

/// Connect options derived from the `etcd` section
pub fn connect_options(config: &Etcd) -> ConnectOptions {
    let mut options = ConnectOptions::default();
    if let Some(timeout) = config.timeout {
        options = options.with_timeout(Duration::from_secs(timeout as u64));
    };
    if let Some(connect_timeout) = config.connect_timeout {
        options = options.with_connect_timeout(Duration::from_secs(connect_timeout as u64));
    };
    if let (Some(user), Some(password)) = (&config.user, &config.password) {
        options = options.with_user(user.clone(), password.clone());
    };
    options
}

/// Create a new etcd client
pub async fn create_client(config: &Etcd) -> Result<Client, etcd_client::Error> {
    log::info!("Connecting to etcd at {:?}...", config.host);
    Client::connect(config.host.clone(), Some(connect_options(config))).await
}

/// Join a prefix and key segments with exactly one `/` between them
pub fn join_key(prefix: &str, segments: &[&str]) -> String {
    let mut key = prefix.trim_end_matches('/').to_string();
    for segment in segments {
        key.push('/');
        key.push_str(segment.trim_matches('/'));
    }
    key
}
