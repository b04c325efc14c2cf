//! Connection, credential and option parameters read from configuration.

use crate::config::ConfigParams;

/// Default name of the physical bucket type created on auto-create.
pub const DEFAULT_BUCKET_TYPE: &str = "couchbase";
/// Default RAM quota, in megabytes, for auto-created buckets.
pub const DEFAULT_RAM_QUOTA: usize = 100;
/// Default page size used when paging parameters omit `take`.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// One physical endpoint description.
///
/// Recognized keys are `uri`, `host`, `port`, `protocol`, `database` and
/// `discovery_key`. Any other key is carried through to the synthesized URI
/// as a query parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParams(ConfigParams);

impl ConnectionParams {
    pub fn new(params: ConfigParams) -> Self {
        Self(params)
    }

    pub fn from_tuples<K, V>(tuples: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(ConfigParams::from_tuples(tuples))
    }

    /// Reads every connection entry from `connections.N.*`, falling back to a
    /// single `connection.*` section.
    pub fn many_from_config(config: &ConfigParams) -> Vec<ConnectionParams> {
        many_sections(config, "connections", "connection")
            .into_iter()
            .map(ConnectionParams)
            .collect()
    }

    /// Literal connection URI. When present it wins over every other key.
    pub fn uri(&self) -> Option<&str> {
        self.0.get_non_empty("uri")
    }

    /// Host name or address.
    pub fn host(&self) -> Option<&str> {
        self.0.get_non_empty("host")
    }

    /// Returns the configured port. A zero or unparsable port counts as absent.
    pub fn port(&self) -> Option<u16> {
        self.0
            .get_non_empty("port")
            .and_then(|port| port.trim().parse::<u16>().ok())
            .filter(|port| *port != 0)
    }

    /// URI scheme override.
    pub fn protocol(&self) -> Option<&str> {
        self.0.get_non_empty("protocol")
    }

    /// Database segment appended to the synthesized URI.
    pub fn database(&self) -> Option<&str> {
        self.0.get_non_empty("database")
    }

    /// Key to look the entry up in a discovery service.
    pub fn discovery_key(&self) -> Option<&str> {
        self.0.get_non_empty("discovery_key")
    }

    /// Returns `true` when the entry must be resolved through discovery.
    pub fn uses_discovery(&self) -> bool {
        self.discovery_key().is_some()
    }

    pub fn params(&self) -> &ConfigParams {
        &self.0
    }

    /// Unwraps the raw parameters.
    pub fn into_params(self) -> ConfigParams {
        self.0
    }
}

/// A credential set. Recognized keys are `username`, `password` and `store_key`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialParams(ConfigParams);

impl CredentialParams {
    pub fn new(params: ConfigParams) -> Self {
        Self(params)
    }

    pub fn from_tuples<K, V>(tuples: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(ConfigParams::from_tuples(tuples))
    }

    /// Reads every credential entry from `credentials.N.*`, falling back to a
    /// single `credential.*` section.
    pub fn many_from_config(config: &ConfigParams) -> Vec<CredentialParams> {
        many_sections(config, "credentials", "credential")
            .into_iter()
            .map(CredentialParams)
            .collect()
    }

    /// User name to authenticate with.
    pub fn username(&self) -> Option<&str> {
        self.0.get_non_empty("username")
    }

    pub fn password(&self) -> Option<&str> {
        self.0.get_non_empty("password")
    }

    /// Key to look the credential up in a credential store.
    pub fn store_key(&self) -> Option<&str> {
        self.0.get_non_empty("store_key")
    }

    /// Returns `true` when the credential must be looked up in a store.
    pub fn uses_credential_store(&self) -> bool {
        self.store_key().is_some()
    }

    pub fn params(&self) -> &ConfigParams {
        &self.0
    }
}

fn many_sections(config: &ConfigParams, many: &str, single: &str) -> Vec<ConfigParams> {
    let indexed = config.section(many);
    let names = indexed.section_names();

    if !names.is_empty() {
        return names
            .iter()
            .map(|name| indexed.section(name))
            .filter(|section| !section.is_empty())
            .collect();
    }

    let section = config.section(single);
    if section.is_empty() {
        Vec::new()
    } else {
        vec![section]
    }
}

/// Bucket management options read from the `options.*` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Create the bucket on open when it is missing.
    pub auto_create: bool,
    /// Create a primary index on a bucket created on open.
    pub auto_index: bool,
    /// Allow bucket-wide flush on created buckets.
    pub flush_enabled: bool,
    /// Type of created buckets.
    pub bucket_type: String,
    /// RAM quota of created buckets, in megabytes.
    pub ram_quota: usize,
    /// Upper bound on the page size of paged queries.
    pub max_page_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_create: false,
            auto_index: true,
            flush_enabled: true,
            bucket_type: DEFAULT_BUCKET_TYPE.to_string(),
            ram_quota: DEFAULT_RAM_QUOTA,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }
}

impl ConnectionOptions {
    /// Reads options on top of `self`, keeping current values for missing keys.
    pub fn with_config(&self, config: &ConfigParams) -> Self {
        let options = config.section("options");

        Self {
            auto_create: options.get_as_bool_or("auto_create", self.auto_create),
            auto_index: options.get_as_bool_or("auto_index", self.auto_index),
            flush_enabled: options.get_as_bool_or("flush_enabled", self.flush_enabled),
            bucket_type: options.get_as_string_or("bucket_type", &self.bucket_type),
            ram_quota: options.get_as_usize_or("ram_quota", self.ram_quota),
            max_page_size: options.get_as_usize_or("max_page_size", self.max_page_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_indexed_connections_in_order() {
        let config = ConfigParams::from_tuples([
            ("connections.1.host", "host1"),
            ("connections.1.port", "8091"),
            ("connections.2.host", "host2"),
            ("connections.2.port", "8092"),
            ("connection.host", "ignored"),
        ]);

        let connections = ConnectionParams::many_from_config(&config);
        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].host(), Some("host1"));
        assert_eq!(connections[1].port(), Some(8092));
    }

    #[test]
    fn falls_back_to_single_connection() {
        let config = ConfigParams::from_tuples([
            ("connection.uri", "couchbase://db:8091/test"),
        ]);

        let connections = ConnectionParams::many_from_config(&config);
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].uri(), Some("couchbase://db:8091/test"));
    }

    #[test]
    fn zero_port_is_absent() {
        let connection = ConnectionParams::from_tuples([("host", "localhost"), ("port", "0")]);
        assert_eq!(connection.port(), None);
    }

    #[test]
    fn options_use_defaults() {
        let config = ConfigParams::from_tuples([
            ("options.auto_create", "true"),
            ("options.ram_quota", "256"),
        ]);

        let options = ConnectionOptions::default().with_config(&config);
        assert!(options.auto_create);
        assert!(options.auto_index);
        assert!(options.flush_enabled);
        assert_eq!(options.ram_quota, 256);
        assert_eq!(options.bucket_type, DEFAULT_BUCKET_TYPE);
        assert_eq!(options.max_page_size, DEFAULT_MAX_PAGE_SIZE);
    }
}
