use crate::api::{Datastore, RegistrationError};
use crate::targets::RegistrationTarget;
use crate::ves::{Channel, EnvelopeBuilder, VesEndpoint};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[async_trait]
/// One delivery attempt for one target
pub trait Deliver: Send + Sync {
    async fn deliver(&self, target: &RegistrationTarget) -> Result<(), RegistrationError>;
}

/// Counters of a finished delivery loop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub scans: u64,
    pub attempts: u64,
}

/// `DeliveryLoop` retries undelivered targets on a fixed interval until all of them are
/// acknowledged. There is no attempt cap and no backoff growth, the only way out short
/// of completion is the stop signal. Dropping the signal's sender counts as a stop.
pub struct DeliveryLoop {
    interval: Duration,
    stop: watch::Receiver<bool>,
}

impl DeliveryLoop {
    pub fn new(interval: Duration, stop: watch::Receiver<bool>) -> DeliveryLoop {
        DeliveryLoop { interval, stop }
    }

    pub async fn run(
        &mut self,
        targets: &mut [RegistrationTarget],
        deliver: &dyn Deliver,
    ) -> Result<DeliveryReport, RegistrationError> {
        let mut report = DeliveryReport::default();
        let mut remaining = targets.iter().filter(|t| !t.is_delivered()).count();

        while remaining > 0 {
            if *self.stop.borrow() {
                return Err(RegistrationError::Stopped);
            }

            report.scans += 1;
            for target in targets.iter_mut().filter(|t| !t.is_delivered()) {
                report.attempts += 1;
                match deliver.deliver(target).await {
                    Ok(()) => {
                        target.mark_delivered();
                        remaining -= 1;
                    }
                    Err(e) => log::error!(
                        "O1 pnfRegistration (stndDefined) failed for port={} transport={}: {}",
                        target.port(),
                        target.transport(),
                        e
                    ),
                }
            }

            if remaining > 0 {
                log::error!(
                    "O1 pnfRegistration (stndDefined) could not register all ports ({} left); retrying in {:?}...",
                    remaining,
                    self.interval
                );
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {}
                    _ = stopped(&mut self.stop) => return Err(RegistrationError::Stopped),
                }
            }
        }

        Ok(report)
    }
}

/// Resolves once the stop flag is raised or its sender is gone
async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// The production attempt: read the collector endpoint, build the event, post it
pub struct VesDelivery {
    builder: EnvelopeBuilder,
    datastore: Arc<dyn Datastore>,
    channel: Arc<dyn Channel>,
}

impl VesDelivery {
    pub fn new(
        builder: EnvelopeBuilder,
        datastore: Arc<dyn Datastore>,
        channel: Arc<dyn Channel>,
    ) -> VesDelivery {
        VesDelivery {
            builder,
            datastore,
            channel,
        }
    }
}

#[async_trait]
impl Deliver for VesDelivery {
    async fn deliver(&self, target: &RegistrationTarget) -> Result<(), RegistrationError> {
        let envelope = self.builder.build(target)?;
        let body = serde_json::to_vec(&envelope)?;
        let endpoint = VesEndpoint::from_datastore(self.datastore.as_ref())?;

        let data = &envelope.event.stnd_defined_fields.data;
        log::debug!(
            "posting pnf registration for {}:{} to {}",
            data.oam_host.address(),
            data.oam_port,
            &endpoint.url
        );
        self.channel.send(&endpoint, body).await
    }
}
