//! Administrative state handling of simulated cells.
//!
//! The datastore calls [`AdministrativeStateController::on_change`] from its subscription
//! dispatch whenever a cell's `administrative-state` leaf changes. The controller looks the
//! cell up and toggles its visibility. Reactions are synchronous and at most once.
use crate::api::RegistrationError;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

pub const ADMINISTRATIVE_STATE_XPATH: &str =
    "/o-ran-sc-du-hello-world:network-function/distributed-unit-functions/cell/administrative-state";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdministrativeState {
    Enabled,
    Disabled,
}

impl AdministrativeState {
    pub fn is_visible(self) -> bool {
        self == AdministrativeState::Enabled
    }
}

impl FromStr for AdministrativeState {
    type Err = RegistrationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "unlocked" | "enabled" => Ok(AdministrativeState::Enabled),
            "locked" | "shutting-down" | "disabled" => Ok(AdministrativeState::Disabled),
            other => Err(RegistrationError::Datastore(format!(
                "unsupported administrative-state value: {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdministrativeStateEvent {
    pub cell_id: String,
    pub new_state: AdministrativeState,
}

impl AdministrativeStateEvent {
    /// Parses a change of `.../cell[id='<cell>']/administrative-state`
    pub fn from_change(xpath: &str, value: &str) -> Result<Self, RegistrationError> {
        if leaf_name(xpath) != leaf_name(ADMINISTRATIVE_STATE_XPATH) {
            return Err(RegistrationError::Datastore(format!(
                "{} is not an administrative-state change",
                xpath
            )));
        }
        let cell_id = cell_key(xpath).ok_or_else(|| {
            RegistrationError::Datastore(format!("no cell key in {}", xpath))
        })?;
        Ok(AdministrativeStateEvent {
            cell_id: cell_id.to_string(),
            new_state: value.parse()?,
        })
    }
}

fn leaf_name(xpath: &str) -> &str {
    xpath.rsplit('/').next().unwrap_or(xpath)
}

/// Returns the `id` key of the `cell` list entry. The node name may carry a module prefix.
fn cell_key(xpath: &str) -> Option<&str> {
    let predicate = xpath.split('/').find_map(|segment| {
        let (node, rest) = segment.split_once('[')?;
        let name = node.rsplit(':').next().unwrap_or(node);
        (name == "cell").then_some(rest)
    })?;
    let predicate = &predicate[..predicate.find(']')?];
    let (key, value) = predicate.split_once('=')?;
    if key.trim() != "id" {
        return None;
    }
    let value = value.trim();
    let quoted = value.len() >= 2
        && ((value.starts_with('\'') && value.ends_with('\''))
            || (value.starts_with('"') && value.ends_with('"')));
    if quoted {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

/// Registry of simulated cells whose visibility admin state changes toggle
pub trait SectorRegistry: Send + Sync {
    /// Fails with [`RegistrationError::UnknownCell`] for a cell that was never registered
    fn set_visibility(&self, cell_id: &str, visible: bool) -> Result<(), RegistrationError>;
}

/// In-process [`SectorRegistry`]
#[derive(Debug, Default)]
pub struct SectorVisibility {
    cells: RwLock<HashMap<String, bool>>,
}

impl SectorVisibility {
    pub fn new() -> SectorVisibility {
        SectorVisibility::default()
    }

    pub fn register(&self, cell_id: &str, visible: bool) -> Result<(), RegistrationError> {
        self.cells
            .write()
            .map_err(|e| RegistrationError::Registry(e.to_string()))?
            .insert(cell_id.to_string(), visible);
        Ok(())
    }

    pub fn is_visible(&self, cell_id: &str) -> Option<bool> {
        self.cells.read().ok()?.get(cell_id).copied()
    }
}

impl SectorRegistry for SectorVisibility {
    fn set_visibility(&self, cell_id: &str, visible: bool) -> Result<(), RegistrationError> {
        let mut cells = self
            .cells
            .write()
            .map_err(|e| RegistrationError::Registry(e.to_string()))?;
        match cells.get_mut(cell_id) {
            Some(current) => {
                *current = visible;
                Ok(())
            }
            None => Err(RegistrationError::UnknownCell(cell_id.to_string())),
        }
    }
}

pub struct AdministrativeStateController {
    registry: Arc<dyn SectorRegistry>,
}

impl AdministrativeStateController {
    pub fn new(registry: Arc<dyn SectorRegistry>) -> AdministrativeStateController {
        AdministrativeStateController { registry }
    }

    /// Entry point for the datastore change subscription. Failures are logged and the
    /// notification is dropped.
    pub fn on_change(&self, xpath: &str, value: &str) -> Result<(), RegistrationError> {
        let event = AdministrativeStateEvent::from_change(xpath, value).map_err(|e| {
            log::error!("dropping administrative-state change {}={}: {}", xpath, value, e);
            e
        })?;
        self.handle(&event)
    }

    pub fn handle(&self, event: &AdministrativeStateEvent) -> Result<(), RegistrationError> {
        log::debug!(
            "cell {} administrative-state is now {:?}",
            &event.cell_id,
            event.new_state
        );
        self.registry
            .set_visibility(&event.cell_id, event.new_state.is_visible())
            .map_err(|e| {
                log::error!("could not update cell {}: {}", &event.cell_id, e);
                e
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change_path(cell: &str) -> String {
        format!(
            "/o-ran-sc-du-hello-world:network-function/distributed-unit-functions[id='du-1']/cell[id='{}']/administrative-state",
            cell
        )
    }

    fn controller() -> (Arc<SectorVisibility>, AdministrativeStateController) {
        let registry = Arc::new(SectorVisibility::new());
        registry.register("cell-1", true).unwrap();
        registry.register("cell-2", true).unwrap();
        (registry.clone(), AdministrativeStateController::new(registry))
    }

    #[test]
    fn locking_a_cell_hides_it() {
        let (registry, controller) = controller();

        controller.on_change(&change_path("cell-1"), "locked").unwrap();
        assert_eq!(registry.is_visible("cell-1"), Some(false));
        assert_eq!(registry.is_visible("cell-2"), Some(true));

        controller.on_change(&change_path("cell-1"), "unlocked").unwrap();
        assert_eq!(registry.is_visible("cell-1"), Some(true));
    }

    #[test]
    fn unknown_cell_is_reported_and_dropped() {
        let (registry, controller) = controller();
        let err = controller
            .on_change(&change_path("cell-9"), "locked")
            .unwrap_err();
        assert!(matches!(err, RegistrationError::UnknownCell(ref id) if id == "cell-9"));
        assert_eq!(registry.is_visible("cell-9"), None);
    }

    #[test]
    fn change_parsing() {
        let event = AdministrativeStateEvent::from_change(
            "/du:cell[id=\"A1\"]/administrative-state",
            "shutting-down",
        )
        .unwrap();
        assert_eq!(event.cell_id, "A1");
        assert_eq!(event.new_state, AdministrativeState::Disabled);

        assert!(AdministrativeStateEvent::from_change("/du:cell/administrative-state", "locked").is_err());
        assert!(AdministrativeStateEvent::from_change(&change_path("cell-1"), "maybe").is_err());
    }

    #[test]
    fn operational_state_changes_leave_visibility_alone() {
        let (registry, controller) = controller();
        let path = change_path("cell-1").replace("administrative-state", "operational-state");

        let err = controller.on_change(&path, "disabled").unwrap_err();
        assert!(matches!(err, RegistrationError::Datastore(_)));
        assert_eq!(registry.is_visible("cell-1"), Some(true));
    }

    #[test]
    fn cell_key_needs_a_whole_node_name() {
        assert!(AdministrativeStateEvent::from_change(
            "/du:network-function/nr-cell[id='cell-1']/administrative-state",
            "locked"
        )
        .is_err());
        assert!(AdministrativeStateEvent::from_change(
            "/du:network-function/foo-cell[id='cell-1']/administrative-state",
            "locked"
        )
        .is_err());

        let event = AdministrativeStateEvent::from_change(
            "/du:network-function/cell[id='cell-1']/administrative-state",
            "locked",
        )
        .unwrap();
        assert_eq!(event.cell_id, "cell-1");
    }

    #[test]
    fn concurrent_updates_to_distinct_cells() {
        let registry = Arc::new(SectorVisibility::new());
        for i in 0..8 {
            registry.register(&format!("cell-{}", i), true).unwrap();
        }
        let controller = Arc::new(AdministrativeStateController::new(registry.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let controller = controller.clone();
                std::thread::spawn(move || {
                    controller
                        .handle(&AdministrativeStateEvent {
                            cell_id: format!("cell-{}", i),
                            new_state: AdministrativeState::Disabled,
                        })
                        .unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!((0..8).all(|i| registry.is_visible(&format!("cell-{}", i)) == Some(false)));
    }
}
