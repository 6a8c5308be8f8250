//! # VES O1 PNF Registration
//!
//! Self registration of a simulated network function with a VES collector.
//!
//! A simulated function exposes one or more NETCONF endpoints over SSH and TLS. On startup
//! each of them is announced to the collector as a stndDefined `o1-notify-pnf-registration`
//! event so the controller can mount it. At a high level the crate provides:
//!
//! * Resolution of the advertised addresses and base ports for docker and host-mapped setups
//! * Enumeration of every endpoint to announce
//! * Construction of VES 7.2.1 compliant event payloads
//! * A retry loop that keeps going until every endpoint is acknowledged
//! * Administrative state handling that toggles the visibility of simulated cells
//!
//! ## Not supported
//! The following will *not* be supported by this library
//!
//! * Simulation of the radio behaviour of the element
//! * The datastore schema beyond the leaves read here
//! * CLI parsing or process lifecycle of the hosting simulator
//!
//! # Integrating ves-pnf-registration
//!
//! The hosting process owns the datastore and implements the following trait
//!
//! ```ignore
//! pub trait Datastore: Send + Sync {
//!     fn get_item(&self, xpath: &str) -> Result<Option<Leaf>, RegistrationError>;
//! }
//! ```
//!
//! and starts the feature from within a tokio runtime:
//!
//! ```ignore
//! let mut settings = Settings::default();
//! settings.apply_env()?;
//!
//! let channel = HttpClient::new(settings.http_timeout())?;
//! let mut registration = Registration::new(settings, datastore, Arc::new(channel));
//!
//! if registration.start()? {
//!     // ... other startup work, the registration runs in the background
//!     registration.join().await?;
//! }
//! assert_eq!(registration.get_status(), 1);
//! ```
//!
//! # Under the hood
//!
//! ### Delivery
//!
//! Every scan attempts each endpoint that has not been acknowledged yet. Endpoints that
//! fail stay in the list and are retried after a fixed interval (5 seconds by default).
//! There is no attempt cap: a collector that never answers keeps the loop alive until
//! [`api::Registration::stop`] is called or the process exits.
//!
//! Failures while building an event or fetching the collector endpoint are handled like
//! transport failures. Only addressing and configuration errors end a run early.
//!
//! ### Sequence numbers
//!
//! The `sequence` field of the common header is taken once per construction attempt, so
//! retries of the same endpoint carry new numbers and collectors may observe gaps.
//!
//! ### Administrative state
//!
//! [`admin_state::AdministrativeStateController`] is invoked synchronously by the datastore
//! subscription and never waits on the registration task.
//!

pub mod addressing;
pub mod admin_state;
pub mod api;
pub mod delivery;
pub mod extras;
#[cfg(feature = "http")]
pub mod httpclient;
pub mod state;
pub mod targets;
pub mod ves;
