use crate::addressing::{AddressingContext, AddressingMode};
use crate::api::{xpath, Datastore, RegistrationError, Settings};
use crate::targets::{RegistrationTarget, Transport};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod spec;

use spec::*;

#[async_trait]
/// The `Channel` trait is what different transports implement to hand a serialized
/// event to the VES collector
pub trait Channel: Send + Sync {
    async fn send(&self, endpoint: &VesEndpoint, body: Vec<u8>) -> Result<(), RegistrationError>;
}

/// Location and basic credentials of the VES collector
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VesEndpoint {
    pub url: url::Url,
    pub username: String,
    pub password: String,
}

impl VesEndpoint {
    /// Builds `{protocol}://{ip}:{port}/eventListener/v7` from the ves-endpoint leaves
    pub fn new(
        protocol: &str,
        ip: &str,
        port: u16,
        username: &str,
        password: &str,
    ) -> Result<VesEndpoint, RegistrationError> {
        let host = if ip.contains(':') && !ip.starts_with('[') {
            format!("[{}]", ip)
        } else {
            ip.to_string()
        };
        let address = format!("{}://{}:{}/eventListener/v7", protocol, host, port);
        let url = url::Url::parse(&address)
            .map_err(|e| RegistrationError::Datastore(format!("{}: {}", address, e)))?;

        Ok(VesEndpoint {
            url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_datastore(datastore: &dyn Datastore) -> Result<VesEndpoint, RegistrationError> {
        let protocol = datastore
            .get_string(xpath::VES_ENDPOINT_PROTOCOL)?
            .unwrap_or_else(|| "https".to_string());
        let ip = datastore
            .get_string(xpath::VES_ENDPOINT_IP)?
            .ok_or_else(|| RegistrationError::Datastore("ves-endpoint-ip is not set".to_string()))?;
        let port = datastore
            .get_uint(xpath::VES_ENDPOINT_PORT)?
            .ok_or_else(|| {
                RegistrationError::Datastore("ves-endpoint-port is not set".to_string())
            })?;
        let port = u16::try_from(port).map_err(|_| {
            RegistrationError::Datastore(format!("ves-endpoint-port {} is out of range", port))
        })?;
        let username = datastore
            .get_string(xpath::VES_ENDPOINT_USERNAME)?
            .unwrap_or_default();
        let password = datastore
            .get_string(xpath::VES_ENDPOINT_PASSWORD)?
            .unwrap_or_default();

        VesEndpoint::new(&protocol, &ip, port, &username, &password)
    }
}

/// Sequence numbers of the common event header. Every construction attempt takes a new
/// value, retries of the same endpoint included.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> SequenceCounter {
        SequenceCounter::default()
    }

    /// Returns the current value and advances the counter
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.next.store(0, Ordering::SeqCst);
    }
}

/// Builds the pnf registration event of one endpoint
pub struct EnvelopeBuilder {
    settings: Arc<Settings>,
    context: AddressingContext,
    sequence: Arc<SequenceCounter>,
}

impl EnvelopeBuilder {
    pub fn new(
        settings: Arc<Settings>,
        context: AddressingContext,
        sequence: Arc<SequenceCounter>,
    ) -> EnvelopeBuilder {
        EnvelopeBuilder {
            settings,
            context,
            sequence,
        }
    }

    /// The port announced for `target`, replacing the implicit port 0
    pub fn effective_port(&self, target: &RegistrationTarget) -> u16 {
        if target.port() != 0 {
            return target.port();
        }
        match self.context.mode {
            AddressingMode::Docker => defaults::STANDARD_NETCONF_PORT,
            _ => match target.transport() {
                Transport::Tls => self.settings.host_tls_base_port,
                Transport::Ssh => self.settings.host_ssh_base_port,
            },
        }
    }

    pub fn build(&self, target: &RegistrationTarget) -> Result<EventEnvelope, RegistrationError> {
        let sequence = self.sequence.next();

        let hostname = self.settings.hostname.as_str();
        if hostname.is_empty() {
            return Err(RegistrationError::Envelope("hostname is empty".to_string()));
        }

        let port = self.effective_port(target);
        let common_event_header = defaults::common_event_header(
            defaults::DOMAIN,
            defaults::NOTIFICATION_TYPE,
            hostname,
            port,
            defaults::PRIORITY,
            sequence,
            defaults::NOTIFICATION_TYPE,
        )?;

        let stnd_defined_fields = StndDefinedFields {
            stnd_defined_fields_version: "1.0".to_string(),
            schema_reference: defaults::SCHEMA_REFERENCE.to_string(),
            data: self.registration_data(target, port)?,
        };

        Ok(EventEnvelope {
            event: Event {
                common_event_header,
                stnd_defined_fields,
            },
        })
    }

    fn registration_data(
        &self,
        target: &RegistrationTarget,
        port: u16,
    ) -> Result<PnfRegistrationData, RegistrationError> {
        let oam_host = if self.context.ip_v6_enabled {
            OamHost::V6(self.required(self.context.ip_v6.as_deref(), "IPv6")?)
        } else {
            OamHost::V4(self.required(self.context.ip_v4.as_deref(), "IPv4")?)
        };

        let transport = match target.transport() {
            Transport::Tls => TransportCredentials::Tls {
                key_reference: defaults::KS_KEY_NAME.to_string(),
            },
            Transport::Ssh => TransportCredentials::Ssh {
                password: defaults::NETCONF_PASSWORD.to_string(),
            },
        };

        Ok(PnfRegistrationData {
            object_class: "manged-function".to_string(),
            object_instance: defaults::MANAGED_ELEMENT.to_string(),
            notification_identifier: 0,
            notification_type: defaults::NOTIFICATION_TYPE.to_string(),
            event_time: util::current_date_and_time(),
            system_distinguished_name: format!("DN:managed-element={}", defaults::MANAGED_ELEMENT),
            o1_specification_version: "v07.00".to_string(),
            serial_number: format!(
                "{}-{}-{}-Simulated Device Melacon",
                self.settings.hostname,
                self.context.ip_v4.as_deref().unwrap_or(""),
                port
            ),
            vendor_pen: defaults::VENDOR_PEN,
            oam_host,
            oam_port: port,
            mac_address: util::rand_mac_address(),
            unit_family: "O-RAN-SC SIM".to_string(),
            unit_type: "O1-Interface".to_string(),
            model_number: "1859a6ea-2520-11ed-861d-0242ac120002".to_string(),
            software_version: "G-Release".to_string(),
            restart_reason: "External trigger".to_string(),
            manufacture_date: "2022-08-26Z".to_string(),
            last_service_date: "2022-08-26Z".to_string(),
            username: defaults::NETCONF_USERNAME.to_string(),
            transport,
            reconnect_on_changed_schema: false,
            connection_timeout: 20000,
            max_connection_attempts: 100,
            between_attempts_timeout: 2000,
            sleep_factor: 1.5,
            keepalive_delay: 120,
        })
    }

    fn required(&self, address: Option<&str>, scheme: &str) -> Result<String, RegistrationError> {
        address
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .ok_or_else(|| RegistrationError::Envelope(format!("no {} oam-host address", scheme)))
    }
}

pub mod util {
    use crate::api::RegistrationError;
    use rand::RngCore;

    pub fn get_time_micros() -> Result<u64, RegistrationError> {
        let since_the_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| RegistrationError::Envelope(format!("time error: {}", e)))?;
        u64::try_from(since_the_epoch.as_micros())
            .map_err(|e| RegistrationError::Envelope(format!("time error: {}", e)))
    }

    /// UTC time as `YYYY-MM-DDTHH:MM:SS.dZ`
    pub fn current_date_and_time() -> String {
        let now = chrono::Utc::now();
        format!(
            "{}.{}Z",
            now.format("%Y-%m-%dT%H:%M:%S"),
            now.timestamp_subsec_millis() / 100
        )
    }

    /// Random locally administered unicast MAC address
    pub fn rand_mac_address() -> String {
        let mut octets = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut octets);
        octets[0] = (octets[0] & 0xfc) | 0x02;
        octets
            .iter()
            .map(|o| format!("{:02x}", o))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn generate_ulid() -> ulid::Ulid {
        ulid::Ulid::new()
    }
}

pub mod defaults {
    use super::spec::CommonEventHeader;
    use crate::api::RegistrationError;

    pub const STANDARD_NETCONF_PORT: u16 = 830;

    pub const DOMAIN: &str = "stndDefined";
    pub const NOTIFICATION_TYPE: &str = "o1-notify-pnf-registration";
    pub const PRIORITY: &str = "Low";
    pub const SCHEMA_REFERENCE: &str = "https://gerrit.o-ran-sc.org/r/gitweb?p=scp/oam/modeling.git;a=blob;f=data-model/yang/working/o-ran-sc/template/yes-o1-notify-pnf-registration.yang#/components/schemas/o1-notify-pnf-registration";
    pub const MANAGED_ELEMENT: &str = "YES-API-PROVIDER";
    pub const VENDOR_PEN: u32 = 57272;
    pub const NETCONF_USERNAME: &str = "netconf";
    pub const NETCONF_PASSWORD: &str = "netconf!";
    pub const KS_KEY_NAME: &str = "melacon_server_key";

    /// VES 7.2.1 common event header. `sourceName` identifies the endpoint as
    /// `{hostname}-{port}`.
    pub fn common_event_header(
        domain: &str,
        event_type: &str,
        hostname: &str,
        port: u16,
        priority: &str,
        sequence: u64,
        stnd_defined_namespace: &str,
    ) -> Result<CommonEventHeader, RegistrationError> {
        let now = super::util::get_time_micros()?;
        let source_name = format!("{}-{}", hostname, port);

        Ok(CommonEventHeader {
            domain: domain.to_string(),
            event_id: format!("{}-{}", event_type, sequence),
            event_name: format!("{}_{}", domain, event_type),
            event_type: event_type.to_string(),
            sequence,
            priority: priority.to_string(),
            reporting_entity_id: "".to_string(),
            reporting_entity_name: source_name.clone(),
            source_id: "".to_string(),
            source_name,
            start_epoch_microsec: now,
            last_epoch_microsec: now,
            nf_naming_code: "".to_string(),
            nf_vendor_name: "ntsim-ng".to_string(),
            time_zone_offset: "+00:00".to_string(),
            version: "4.1".to_string(),
            ves_event_listener_version: "7.2.1".to_string(),
            stnd_defined_namespace: stnd_defined_namespace.to_string(),
        })
    }
}
