use crate::addressing::{AddressingContext, AddressingMode};
use crate::delivery::{DeliveryLoop, DeliveryReport, VesDelivery};
use crate::state::FeatureState;
use crate::targets;
use crate::ves::{Channel, EnvelopeBuilder, SequenceCounter};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{System, SystemExt};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Datastore paths read by the registration feature
pub mod xpath {
    pub const O1_PNF_REGISTRATION: &str =
        "/nts-network-function:simulation/network-function/ves/o1-pnf-registration";
    pub const MOUNT_POINT_ADDRESSING_METHOD: &str =
        "/nts-network-function:simulation/network-function/mount-point-addressing-method";
    pub const VES_ENDPOINT_PROTOCOL: &str =
        "/nts-network-function:simulation/network-function/ves-endpoint/ves-endpoint-protocol";
    pub const VES_ENDPOINT_IP: &str =
        "/nts-network-function:simulation/network-function/ves-endpoint/ves-endpoint-ip";
    pub const VES_ENDPOINT_PORT: &str =
        "/nts-network-function:simulation/network-function/ves-endpoint/ves-endpoint-port";
    pub const VES_ENDPOINT_USERNAME: &str =
        "/nts-network-function:simulation/network-function/ves-endpoint/ves-endpoint-username";
    pub const VES_ENDPOINT_PASSWORD: &str =
        "/nts-network-function:simulation/network-function/ves-endpoint/ves-endpoint-password";
}

/// Errors reported by the registration subsystem.
///
/// Only configuration, addressing and allocation failures abort a registration run. All other failures during delivery are absorbed by the retry loop.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("mount-point-addressing-method failed: {0}")]
    Addressing(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("datastore error: {0}")]
    Datastore(String),

    #[error("could not build event: {0}")]
    Envelope(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http request failed: {0}")]
    Transport(String),

    #[error("unknown cell: {0}")]
    UnknownCell(String),

    #[error("sector registry error: {0}")]
    Registry(String),

    #[error("O1 PNF registration already started")]
    AlreadyStarted,

    #[error("O1 PNF registration stopped before completion")]
    Stopped,

    #[error("registration task failed: {0}")]
    Join(String),
}

impl RegistrationError {
    /// Fatal errors end the run instead of being retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RegistrationError::Config(_)
                | RegistrationError::Addressing(_)
                | RegistrationError::ResourceExhausted(_)
        )
    }
}

/// A single configuration leaf as returned by the datastore
#[derive(Clone, Debug, PartialEq)]
pub enum Leaf {
    Bool(bool),
    String(String),
    Uint(u64),
}

/// `Datastore` is the subscription based configuration store owned by the hosting process.
///
/// Implementations return `Ok(None)` when the path holds no value, which callers treat
/// as "use the default" rather than as an error.
pub trait Datastore: Send + Sync {
    fn get_item(&self, xpath: &str) -> Result<Option<Leaf>, RegistrationError>;

    fn get_bool(&self, xpath: &str) -> Result<Option<bool>, RegistrationError> {
        match self.get_item(xpath)? {
            Some(Leaf::Bool(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(xpath, "boolean", &other)),
            None => Ok(None),
        }
    }

    fn get_string(&self, xpath: &str) -> Result<Option<String>, RegistrationError> {
        match self.get_item(xpath)? {
            Some(Leaf::String(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(xpath, "string", &other)),
            None => Ok(None),
        }
    }

    fn get_uint(&self, xpath: &str) -> Result<Option<u64>, RegistrationError> {
        match self.get_item(xpath)? {
            Some(Leaf::Uint(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(xpath, "unsigned integer", &other)),
            None => Ok(None),
        }
    }
}

fn mismatch(xpath: &str, expected: &str, found: &Leaf) -> RegistrationError {
    RegistrationError::Datastore(format!(
        "{} holds {:?}, expected a {}",
        xpath, found, expected
    ))
}

/// `Settings` is the read-only environment snapshot of the simulated network function.
///
/// Properties:
///
/// * `hostname`: Identity reported in the common event header and the serial number.
/// * `ip_v4` / `ip_v6`: Container addresses advertised in docker mode.
/// * `ip_v6_enabled`: Selects IPv6 as the active addressing scheme for the whole run.
/// * `host_ip`: The externally visible host address advertised in host-mapped mode.
/// * `host_ssh_base_port` / `host_tls_base_port`: First host-mapped port of each range.
/// * `ssh_connections` / `tls_connections`: Number of NETCONF endpoints of each transport.
/// * `standalone_start_features`: Any non-empty value starts the feature without
/// consulting the datastore.
/// * `retry_interval_ms`: Fixed wait between delivery scans.
/// * `http_timeout_ms`: Per request timeout of the HTTP channel.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    pub hostname: String,
    pub ip_v4: Option<String>,
    pub ip_v6: Option<String>,
    pub ip_v6_enabled: bool,
    pub host_ip: Option<String>,
    pub host_ssh_base_port: u16,
    pub host_tls_base_port: u16,
    pub ssh_connections: u16,
    pub tls_connections: u16,
    pub standalone_start_features: String,
    pub retry_interval_ms: u64,
    pub http_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            hostname: System::new()
                .host_name()
                .unwrap_or_else(|| "localhost".to_string()),
            ip_v4: None,
            ip_v6: None,
            ip_v6_enabled: false,
            host_ip: None,
            host_ssh_base_port: crate::ves::defaults::STANDARD_NETCONF_PORT,
            host_tls_base_port: 6513,
            ssh_connections: 1,
            tls_connections: 0,
            standalone_start_features: "".to_string(),
            retry_interval_ms: 5000,
            http_timeout_ms: 10000,
        }
    }
}

impl Settings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Overlay the process environment on top of the current values
    pub fn apply_env(&mut self) -> Result<(), RegistrationError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`Settings::apply_env`] with an arbitrary variable source
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), RegistrationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(hostname) = lookup("HOSTNAME") {
            self.hostname = hostname;
        }
        if let Some(features) = lookup("NTS_NF_STANDALONE_START_FEATURES") {
            self.standalone_start_features = features;
        }
        if let Some(enabled) = lookup("IPv6Enabled") {
            self.ip_v6_enabled = enabled.eq_ignore_ascii_case("true");
        }
        if let Some(ip) = lookup("NTS_IP_V4").filter(|ip| !ip.is_empty()) {
            self.ip_v4 = Some(ip);
        }
        if let Some(ip) = lookup("NTS_IP_V6").filter(|ip| !ip.is_empty()) {
            self.ip_v6 = Some(ip);
        }
        if let Some(ip) = lookup("NTS_HOST_IP").filter(|ip| !ip.is_empty()) {
            self.host_ip = Some(ip);
        }
        if let Some(count) = lookup("SSH_CONNECTIONS") {
            self.ssh_connections = parse_var("SSH_CONNECTIONS", &count)?;
        }
        if let Some(count) = lookup("TLS_CONNECTIONS") {
            self.tls_connections = parse_var("TLS_CONNECTIONS", &count)?;
        }
        if let Some(port) = lookup("NTS_HOST_NETCONF_SSH_BASE_PORT") {
            self.host_ssh_base_port = parse_var("NTS_HOST_NETCONF_SSH_BASE_PORT", &port)?;
        }
        if let Some(port) = lookup("NTS_HOST_NETCONF_TLS_BASE_PORT") {
            self.host_tls_base_port = parse_var("NTS_HOST_NETCONF_TLS_BASE_PORT", &port)?;
        }
        Ok(())
    }
}

fn parse_var(name: &str, value: &str) -> Result<u16, RegistrationError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| RegistrationError::Config(format!("{}={}: {}", name, value, e)))
}

/// `Registration` is the handle the hosting process uses to run the O1 PNF registration
/// feature. The run itself executes on a dedicated tokio task.
pub struct Registration {
    settings: Arc<Settings>,
    datastore: Arc<dyn Datastore>,
    channel: Arc<dyn Channel>,
    sequence: Arc<SequenceCounter>,
    state: Arc<Mutex<FeatureState>>,
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<Result<DeliveryReport, RegistrationError>>>,
    started: bool,
    instance_id: ulid::Ulid,
}

impl Registration {
    pub fn new(
        settings: Settings,
        datastore: Arc<dyn Datastore>,
        channel: Arc<dyn Channel>,
    ) -> Registration {
        let (stop, _) = watch::channel(false);
        Registration {
            settings: Arc::new(settings),
            datastore,
            channel,
            sequence: Arc::new(SequenceCounter::new()),
            state: Arc::new(Mutex::new(FeatureState::Idle)),
            stop,
            task: None,
            started: false,
            instance_id: crate::ves::util::generate_ulid(),
        }
    }

    /// Checks the enable flag and, when set, launches the background registration task.
    ///
    /// Returns `Ok(false)` when the feature is disabled and `Ok(true)` once the task is
    /// spawned. Must be called from within a tokio runtime. A second call after a task
    /// was spawned fails with [`RegistrationError::AlreadyStarted`].
    pub fn start(&mut self) -> Result<bool, RegistrationError> {
        if self.started {
            return Err(RegistrationError::AlreadyStarted);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RegistrationError::Config(format!("no tokio runtime: {}", e)))?;

        self.sequence.reset();

        let enabled = if !self.settings.standalone_start_features.is_empty() {
            true
        } else {
            self.datastore
                .get_bool(xpath::O1_PNF_REGISTRATION)?
                .unwrap_or(false)
        };

        if !enabled {
            log::debug!("O1 PNF registration (stndDefined) is disabled");
            self.set_state(FeatureState::Disabled);
            return Ok(false);
        }

        self.started = true;
        self.set_state(FeatureState::Running);
        log::debug!("[{}] starting O1 PNF registration (stndDefined)", self.instance_id);

        let settings = self.settings.clone();
        let datastore = self.datastore.clone();
        let channel = self.channel.clone();
        let sequence = self.sequence.clone();
        let state = self.state.clone();
        let stop = self.stop.subscribe();
        let instance_id = self.instance_id;

        self.task = Some(runtime.spawn(async move {
            let result = execute(settings, datastore, channel, sequence, stop).await;
            let next = FeatureState::from_outcome(&result);
            match &result {
                Ok(report) => log::info!(
                    "[{}] O1 PNF registration (stndDefined) finished after {} attempts",
                    instance_id,
                    report.attempts
                ),
                Err(e) => log::error!("[{}] O1 PNF registration aborted: {}", instance_id, e),
            }
            *state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
            result
        }));

        Ok(true)
    }

    pub fn status(&self) -> FeatureState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 1 once every endpoint has been announced, 0 otherwise
    pub fn get_status(&self) -> i32 {
        self.status().status_code()
    }

    /// Asks the running delivery loop to give up at its next check point
    pub fn stop(&self) {
        let status = self.status();
        if status.is_finished() {
            log::debug!("[{}] stop requested after the run ended ({:?})", self.instance_id, status);
        }
        self.stop.send_replace(true);
    }

    /// Waits for the background task, returning its outcome. Later calls return an
    /// empty report.
    pub async fn join(&mut self) -> Result<DeliveryReport, RegistrationError> {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) => Err(RegistrationError::Join(e.to_string())),
            },
            None => Ok(DeliveryReport::default()),
        }
    }

    pub fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }

    fn set_state(&self, next: FeatureState) {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

async fn execute(
    settings: Arc<Settings>,
    datastore: Arc<dyn Datastore>,
    channel: Arc<dyn Channel>,
    sequence: Arc<SequenceCounter>,
    stop: watch::Receiver<bool>,
) -> Result<DeliveryReport, RegistrationError> {
    let mode = AddressingMode::from_datastore(datastore.as_ref());
    let context = AddressingContext::resolve(mode, &settings)?;
    log::debug!("resolved addressing context: {:?}", &context);

    let mut targets = targets::enumerate(
        settings.ssh_connections,
        settings.tls_connections,
        context.ssh_base_port,
        context.tls_base_port,
    )?;

    let delivery = VesDelivery::new(
        EnvelopeBuilder::new(settings.clone(), context, sequence),
        datastore,
        channel,
    );
    DeliveryLoop::new(settings.retry_interval(), stop)
        .run(&mut targets, &delivery)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_settings() {
        let vars: HashMap<&str, &str> = [
            ("HOSTNAME", "o-du-1122"),
            ("SSH_CONNECTIONS", "2"),
            ("TLS_CONNECTIONS", "3"),
            ("IPv6Enabled", "true"),
            ("NTS_IP_V6", "2001:db8::10"),
            ("NTS_HOST_NETCONF_TLS_BASE_PORT", "51000"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings
            .apply_vars(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(settings.hostname, "o-du-1122");
        assert_eq!(settings.ssh_connections, 2);
        assert_eq!(settings.tls_connections, 3);
        assert!(settings.ip_v6_enabled);
        assert_eq!(settings.ip_v6.as_deref(), Some("2001:db8::10"));
        assert_eq!(settings.host_tls_base_port, 51000);
        assert_eq!(settings.retry_interval(), Duration::from_secs(5));
    }

    #[test]
    fn bad_connection_count_is_a_config_error() {
        let mut settings = Settings::default();
        let err = settings
            .apply_vars(|name| (name == "SSH_CONNECTIONS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Config(_)));
        assert!(err.is_fatal());
    }

    struct Leaves(HashMap<&'static str, Leaf>);

    impl Datastore for Leaves {
        fn get_item(&self, xpath: &str) -> Result<Option<Leaf>, RegistrationError> {
            Ok(self.0.get(xpath).cloned())
        }
    }

    #[test]
    fn typed_getters_reject_mismatched_leaves() {
        let store = Leaves(
            [(xpath::O1_PNF_REGISTRATION, Leaf::String("yes".to_string()))]
                .into_iter()
                .collect(),
        );
        assert!(store.get_bool(xpath::O1_PNF_REGISTRATION).is_err());
        assert_eq!(store.get_bool(xpath::MOUNT_POINT_ADDRESSING_METHOD).unwrap(), None);
    }

    struct Discard;

    #[async_trait::async_trait]
    impl Channel for Discard {
        async fn send(
            &self,
            _: &crate::ves::VesEndpoint,
            _: Vec<u8>,
        ) -> Result<(), RegistrationError> {
            Ok(())
        }
    }

    #[test]
    fn state_writes_survive_a_poisoned_lock() {
        let registration = Registration::new(
            Settings::default(),
            Arc::new(Leaves(HashMap::new())),
            Arc::new(Discard),
        );
        let state = registration.state.clone();
        let _ = std::thread::spawn(move || {
            let _guard = state.lock().unwrap();
            panic!("holder died");
        })
        .join();
        assert!(registration.state.is_poisoned());

        registration.set_state(FeatureState::Stopped);
        assert_eq!(registration.status(), FeatureState::Stopped);
    }
}
