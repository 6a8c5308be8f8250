use crate::api::{xpath, Datastore, RegistrationError, Settings};
use crate::ves::defaults::STANDARD_NETCONF_PORT;

/// How the NETCONF endpoints of this function are reached from outside
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressingMode {
    /// Container addresses, ports start at the standard NETCONF port
    Docker,
    /// Host address, ports are explicitly mapped on the host
    HostMapped,
    Unknown,
}

impl AddressingMode {
    pub fn parse(value: &str) -> AddressingMode {
        match value {
            "docker-mapping" => AddressingMode::Docker,
            "host-mapping" => AddressingMode::HostMapped,
            _ => AddressingMode::Unknown,
        }
    }

    /// Reads the mount-point-addressing-method leaf. Read failures and missing values
    /// both resolve to `Unknown`.
    pub fn from_datastore(datastore: &dyn Datastore) -> AddressingMode {
        match datastore.get_string(xpath::MOUNT_POINT_ADDRESSING_METHOD) {
            Ok(Some(value)) => AddressingMode::parse(&value),
            Ok(None) => AddressingMode::Unknown,
            Err(e) => {
                log::warn!("could not read mount-point-addressing-method: {}", e);
                AddressingMode::Unknown
            }
        }
    }
}

/// Addresses and base ports advertised for one registration run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressingContext {
    pub ip_v4: Option<String>,
    pub ip_v6: Option<String>,
    pub ip_v6_enabled: bool,
    pub mode: AddressingMode,
    pub ssh_base_port: u16,
    pub tls_base_port: u16,
}

impl AddressingContext {
    pub fn resolve(
        mode: AddressingMode,
        settings: &Settings,
    ) -> Result<AddressingContext, RegistrationError> {
        let context = match mode {
            AddressingMode::Unknown => {
                return Err(RegistrationError::Addressing(
                    "unknown addressing mode".to_string(),
                ))
            }
            AddressingMode::Docker => {
                let tls_base_port =
                    u32::from(STANDARD_NETCONF_PORT) + u32::from(settings.ssh_connections);
                let tls_base_port = u16::try_from(tls_base_port).map_err(|_| {
                    RegistrationError::Config(format!(
                        "TLS base port {} is out of range",
                        tls_base_port
                    ))
                })?;
                AddressingContext {
                    ip_v4: settings.ip_v4.clone(),
                    ip_v6: settings.ip_v6.clone().filter(|_| settings.ip_v6_enabled),
                    ip_v6_enabled: settings.ip_v6_enabled,
                    mode,
                    ssh_base_port: STANDARD_NETCONF_PORT,
                    tls_base_port,
                }
            }
            AddressingMode::HostMapped => {
                let (ip_v4, ip_v6) = if settings.ip_v6_enabled {
                    (None, settings.host_ip.clone())
                } else {
                    (settings.host_ip.clone(), None)
                };
                AddressingContext {
                    ip_v4,
                    ip_v6,
                    ip_v6_enabled: settings.ip_v6_enabled,
                    mode,
                    ssh_base_port: settings.host_ssh_base_port,
                    tls_base_port: settings.host_tls_base_port,
                }
            }
        };

        if context.active_address().is_none() {
            return Err(RegistrationError::Addressing(format!(
                "no {} address available in {:?} mode",
                if context.ip_v6_enabled { "IPv6" } else { "IPv4" },
                mode
            )));
        }
        Ok(context)
    }

    /// The address of the active scheme, announced as oam-host
    pub fn active_address(&self) -> Option<&str> {
        let address = if self.ip_v6_enabled {
            self.ip_v6.as_deref()
        } else {
            self.ip_v4.as_deref()
        };
        address.filter(|a| !a.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            hostname: "o-du-1122".to_string(),
            ip_v4: Some("172.17.0.5".to_string()),
            ip_v6: Some("2001:db8::5".to_string()),
            host_ip: Some("10.20.30.40".to_string()),
            host_ssh_base_port: 50000,
            host_tls_base_port: 50500,
            ssh_connections: 2,
            tls_connections: 3,
            ..Settings::default()
        }
    }

    #[test]
    fn docker_mode_allocates_tls_after_ssh_range() {
        let ctx = AddressingContext::resolve(AddressingMode::Docker, &settings()).unwrap();
        assert_eq!(ctx.ssh_base_port, 830);
        assert_eq!(ctx.tls_base_port, 832);
        assert_eq!(ctx.ip_v4.as_deref(), Some("172.17.0.5"));
        // IPv6 literal is ignored unless enabled
        assert_eq!(ctx.ip_v6, None);
    }

    #[test]
    fn docker_mode_keeps_ipv6_when_enabled() {
        let mut s = settings();
        s.ip_v6_enabled = true;
        let ctx = AddressingContext::resolve(AddressingMode::Docker, &s).unwrap();
        assert_eq!(ctx.active_address(), Some("2001:db8::5"));
    }

    #[test]
    fn host_mode_uses_host_ip_and_mapped_ports() {
        let ctx = AddressingContext::resolve(AddressingMode::HostMapped, &settings()).unwrap();
        assert_eq!(ctx.ip_v4.as_deref(), Some("10.20.30.40"));
        assert_eq!(ctx.ip_v6, None);
        assert_eq!((ctx.ssh_base_port, ctx.tls_base_port), (50000, 50500));

        let mut s = settings();
        s.ip_v6_enabled = true;
        let ctx = AddressingContext::resolve(AddressingMode::HostMapped, &s).unwrap();
        assert_eq!(ctx.ip_v4, None);
        assert_eq!(ctx.ip_v6.as_deref(), Some("10.20.30.40"));
    }

    #[test]
    fn unknown_mode_is_fatal() {
        let err = AddressingContext::resolve(AddressingMode::Unknown, &settings()).unwrap_err();
        assert!(matches!(err, RegistrationError::Addressing(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_active_address_is_fatal() {
        let mut s = settings();
        s.ip_v4 = None;
        let err = AddressingContext::resolve(AddressingMode::Docker, &s).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn mode_names() {
        assert_eq!(AddressingMode::parse("docker-mapping"), AddressingMode::Docker);
        assert_eq!(AddressingMode::parse("host-mapping"), AddressingMode::HostMapped);
        assert_eq!(AddressingMode::parse("bridge"), AddressingMode::Unknown);
    }
}
