use crate::api::RegistrationError;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Ssh,
    Tls,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transport::Ssh => write!(f, "ssh"),
            Transport::Tls => write!(f, "tls"),
        }
    }
}

/// One NETCONF endpoint to announce.
///
/// A `port` of 0 means the function exposes a single endpoint and the implicit default
/// port is substituted when the event is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistrationTarget {
    port: u16,
    transport: Transport,
    delivered: bool,
}

impl RegistrationTarget {
    pub fn new(port: u16, transport: Transport) -> RegistrationTarget {
        RegistrationTarget {
            port,
            transport,
            delivered: false,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    /// Delivery is final, a target never goes back to undelivered
    pub fn mark_delivered(&mut self) {
        self.delivered = true;
    }
}

/// Expands the connection counts into the ordered list of endpoints to announce.
///
/// More than one connection in total yields every SSH port ascending from `ssh_base_port`
/// followed by every TLS port ascending from `tls_base_port`. Zero or one connection
/// yields a single implicit port target, TLS only when a TLS connection is configured.
pub fn enumerate(
    ssh_connections: u16,
    tls_connections: u16,
    ssh_base_port: u16,
    tls_base_port: u16,
) -> Result<Vec<RegistrationTarget>, RegistrationError> {
    let total = usize::from(ssh_connections) + usize::from(tls_connections);

    if total <= 1 {
        let transport = if tls_connections > 0 {
            Transport::Tls
        } else {
            Transport::Ssh
        };
        return Ok(vec![RegistrationTarget::new(0, transport)]);
    }

    let mut targets = Vec::new();
    targets
        .try_reserve_exact(total)
        .map_err(|e| RegistrationError::ResourceExhausted(format!("target list: {}", e)))?;

    for (base, count, transport) in [
        (ssh_base_port, ssh_connections, Transport::Ssh),
        (tls_base_port, tls_connections, Transport::Tls),
    ] {
        for offset in 0..count {
            let port = base.checked_add(offset).ok_or_else(|| {
                RegistrationError::Config(format!(
                    "{} port range starting at {} exceeds {}",
                    transport,
                    base,
                    u16::MAX
                ))
            })?;
            targets.push(RegistrationTarget::new(port, transport));
        }
    }

    Ok(targets)
}
