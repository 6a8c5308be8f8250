//! Wire types of the VES 7.2.1 stndDefined `o1-notify-pnf-registration` event.
//!
//! Field order follows what collectors have historically received.
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct EventEnvelope {
    pub event: Event,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub common_event_header: CommonEventHeader,
    pub stnd_defined_fields: StndDefinedFields,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonEventHeader {
    pub domain: String,
    pub event_id: String,
    pub event_name: String,
    pub event_type: String,
    pub sequence: u64,
    pub priority: String,
    pub reporting_entity_id: String,
    pub reporting_entity_name: String,
    pub source_id: String,
    pub source_name: String,
    pub start_epoch_microsec: u64,
    pub last_epoch_microsec: u64,
    pub nf_naming_code: String,
    pub nf_vendor_name: String,
    pub time_zone_offset: String,
    pub version: String,
    pub ves_event_listener_version: String,
    pub stnd_defined_namespace: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StndDefinedFields {
    pub stnd_defined_fields_version: String,
    pub schema_reference: String,
    pub data: PnfRegistrationData,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PnfRegistrationData {
    pub object_class: String,
    pub object_instance: String,
    pub notification_identifier: u64,
    pub notification_type: String,
    pub event_time: String,
    pub system_distinguished_name: String,
    pub o1_specification_version: String,
    pub serial_number: String,
    pub vendor_pen: u32,
    pub oam_host: OamHost,
    pub oam_port: u16,
    pub mac_address: String,
    pub unit_family: String,
    pub unit_type: String,
    pub model_number: String,
    pub software_version: String,
    pub restart_reason: String,
    pub manufacture_date: String,
    pub last_service_date: String,
    pub username: String,
    #[serde(flatten)]
    pub transport: TransportCredentials,
    pub reconnect_on_changed_schema: bool,
    pub connection_timeout: u32,
    pub max_connection_attempts: u32,
    pub between_attempts_timeout: u32,
    pub sleep_factor: f64,
    pub keepalive_delay: u32,
}

/// The `oam-host` field, tagged with the addressing scheme it came from
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OamHost {
    V4(String),
    V6(String),
}

impl OamHost {
    pub fn address(&self) -> &str {
        match self {
            OamHost::V4(address) | OamHost::V6(address) => address,
        }
    }
}

/// Credentials the collector uses to mount the endpoint. SSH carries a password and
/// TLS a keystore reference, never both.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "transport-protocol")]
pub enum TransportCredentials {
    #[serde(rename = "tls")]
    Tls {
        #[serde(rename = "key-reference")]
        key_reference: String,
    },
    #[serde(rename = "ssh")]
    Ssh { password: String },
}
