//! Host-facing entity projections
//!
//! The host platform shows each zone as a media player and a source select,
//! plus one routing overview sensor for the whole matrix. These are pure
//! views over a [`DeviceSnapshot`]; nothing here talks to the device.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use acm200_types::{DeviceSnapshot, Freshness, InputId, MatrixConfig, PowerState, ZoneId};

use crate::store::{FieldKind, StateChange};

pub const SOURCE_ICON: &str = "mdi:video-input-hdmi";
pub const ROUTING_ICON: &str = "mdi:router-network";

/// On/off state shown by a media player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    On,
    Off,
    Unknown,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Media player view of one zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPlayerView {
    pub unique_id: String,
    pub name: String,
    pub zone: ZoneId,
    pub state: PlayerState,
    pub source: Option<String>,
    pub source_list: Vec<String>,
    /// Shown state is not confirmed by the device
    pub assumed_state: bool,
}

/// Source select view of one zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSelectView {
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    pub zone: ZoneId,
    pub options: Vec<String>,
    pub current_option: Option<String>,
}

/// Routing summary sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingOverview {
    pub unique_id: String,
    pub name: String,
    pub icon: &'static str,
    /// e.g. `OUT001→IN002, OUT002→IN002`
    pub value: String,
    /// `output_001` → `input_002`
    pub attributes: BTreeMap<String, String>,
}

/// Entity naming and projection for one matrix
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    key: String,
    /// Unique option labels in input order
    sources: Vec<(String, InputId)>,
    zone_names: BTreeMap<ZoneId, Option<String>>,
}

impl EntityCatalog {
    pub fn new(config: &MatrixConfig) -> Self {
        let inputs = config.inputs();
        let labels = unique_labels(inputs.iter().map(|i| i.label.as_str()));
        let sources = labels
            .into_iter()
            .zip(inputs.iter().map(|i| i.id))
            .collect();

        Self {
            key: config.device_key(),
            sources,
            zone_names: config
                .zone_ids()
                .map(|z| (z, config.zone_label(z)))
                .collect(),
        }
    }

    /// Source labels in input order, duplicates disambiguated
    pub fn source_list(&self) -> Vec<String> {
        self.sources.iter().map(|(label, _)| label.clone()).collect()
    }

    /// Input selected by a source label
    pub fn input_for_option(&self, option: &str) -> Option<InputId> {
        self.sources
            .iter()
            .find(|(label, _)| label == option)
            .map(|(_, id)| *id)
    }

    pub fn label_for_input(&self, input: InputId) -> Option<&str> {
        self.sources
            .iter()
            .find(|(_, id)| *id == input)
            .map(|(label, _)| label.as_str())
    }

    pub fn media_player_id(&self, zone: ZoneId) -> String {
        format!("{}_output_{:03}_media_player", self.key, zone.get())
    }

    pub fn select_id(&self, zone: ZoneId) -> String {
        format!("{}_output_{:03}_source", self.key, zone.get())
    }

    pub fn routing_overview_id(&self) -> String {
        format!("{}_routing_overview", self.key)
    }

    fn zone_name(&self, zone: ZoneId) -> String {
        match self.zone_names.get(&zone) {
            Some(Some(label)) => label.clone(),
            _ => format!("ACM200 Output {:03}", zone.get()),
        }
    }

    /// One media player per zone
    pub fn media_players(&self, snapshot: &DeviceSnapshot) -> Vec<MediaPlayerView> {
        snapshot
            .zones
            .iter()
            .map(|zone| {
                let state = match zone.power.value() {
                    Some(PowerState::On) => PlayerState::On,
                    Some(PowerState::Off) => PlayerState::Off,
                    None => PlayerState::Unknown,
                };
                let assumed_state = !(zone.route.is_confirmed() && zone.power.is_confirmed());

                MediaPlayerView {
                    unique_id: self.media_player_id(zone.id),
                    name: self.zone_name(zone.id),
                    zone: zone.id,
                    state,
                    source: self.current_label(zone.route.value()),
                    source_list: self.source_list(),
                    assumed_state,
                }
            })
            .collect()
    }

    /// One source select per zone
    pub fn selects(&self, snapshot: &DeviceSnapshot) -> Vec<SourceSelectView> {
        snapshot
            .zones
            .iter()
            .map(|zone| SourceSelectView {
                unique_id: self.select_id(zone.id),
                name: format!("{} Source", self.zone_name(zone.id)),
                icon: SOURCE_ICON,
                zone: zone.id,
                options: self.source_list(),
                current_option: self.current_label(zone.route.value()),
            })
            .collect()
    }

    pub fn routing_overview(&self, snapshot: &DeviceSnapshot) -> RoutingOverview {
        let routes = snapshot.routes();

        let value = if routes.is_empty() {
            let anything_known = snapshot
                .zones
                .iter()
                .any(|z| z.route.freshness() != Freshness::Unknown || z.power.value().is_some());
            let value = if anything_known { "No routes" } else { "No data" };
            value.to_string()
        } else {
            routes
                .iter()
                .map(|(zone, input)| format!("OUT{:03}→IN{:03}", zone.get(), input.get()))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let attributes = routes
            .iter()
            .map(|(zone, input)| {
                (
                    format!("output_{:03}", zone.get()),
                    format!("input_{:03}", input.get()),
                )
            })
            .collect();

        RoutingOverview {
            unique_id: self.routing_overview_id(),
            name: "Routing Overview".to_string(),
            icon: ROUTING_ICON,
            value,
            attributes,
        }
    }

    /// Entity ids whose displayed state depends on the changed field
    pub fn affected_by(&self, change: &StateChange) -> Vec<String> {
        let zone = change.zone();
        match change.kind() {
            FieldKind::Route => vec![
                self.media_player_id(zone),
                self.select_id(zone),
                self.routing_overview_id(),
            ],
            FieldKind::Power => vec![self.media_player_id(zone)],
        }
    }

    fn current_label(&self, input: Option<InputId>) -> Option<String> {
        input.and_then(|id| self.label_for_input(id)).map(str::to_string)
    }
}

/// Disambiguate repeated labels: `A`, `A (2)`, `A (3)`
///
/// A generated suffix never reuses a label already handed out, including
/// one the user typed literally.
fn unique_labels<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut taken: BTreeSet<String> = BTreeSet::new();
    labels
        .map(|label| {
            let mut candidate = label.to_string();
            let mut n = 1;
            while taken.contains(&candidate) {
                n += 1;
                candidate = format!("{} ({})", label, n);
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm200_core::ZoneStatus;
    use pretty_assertions::assert_eq;

    use crate::store::{PollResult, StateStore};

    fn zone(n: u16) -> ZoneId {
        ZoneId::new(n).unwrap()
    }

    fn input(n: u16) -> InputId {
        InputId::new(n).unwrap()
    }

    fn config() -> MatrixConfig {
        MatrixConfig::new("192.168.1.50")
            .with_zones(2)
            .with_inputs(3)
            .with_input_label(1, "Apple TV")
            .with_input_label(2, "Apple TV")
            .with_zone_label(1, "Kitchen")
    }

    #[test]
    fn test_unique_labels() {
        let labels = unique_labels(["A", "B", "A", "A"].into_iter());
        assert_eq!(labels, vec!["A", "B", "A (2)", "A (3)"]);
    }

    #[test]
    fn test_suffix_skips_literal_label() {
        let config = MatrixConfig::new("192.168.1.50")
            .with_inputs(3)
            .with_input_label(1, "Apple TV")
            .with_input_label(2, "Apple TV (2)")
            .with_input_label(3, "Apple TV");
        let catalog = EntityCatalog::new(&config);

        assert_eq!(
            catalog.source_list(),
            vec!["Apple TV", "Apple TV (2)", "Apple TV (3)"]
        );
        assert_eq!(catalog.input_for_option("Apple TV (2)"), Some(input(2)));
        assert_eq!(catalog.input_for_option("Apple TV (3)"), Some(input(3)));
    }

    #[test]
    fn test_sources_and_names() {
        let catalog = EntityCatalog::new(&config());
        assert_eq!(catalog.source_list(), vec!["Apple TV", "Apple TV (2)", "Input 3"]);
        assert_eq!(catalog.input_for_option("Apple TV (2)"), Some(input(2)));
        assert_eq!(catalog.input_for_option("Roku"), None);

        let store = StateStore::new(&config());
        let selects = catalog.selects(&store.read());
        assert_eq!(selects[0].name, "Kitchen Source");
        assert_eq!(selects[1].name, "ACM200 Output 002 Source");
        assert_eq!(selects[1].unique_id, "192.168.1.50:23_output_002_source");
        assert_eq!(selects[1].icon, "mdi:video-input-hdmi");
    }

    #[test]
    fn test_media_player_follows_freshness() {
        let catalog = EntityCatalog::new(&config());
        let store = StateStore::new(&config());

        let players = catalog.media_players(&store.read());
        assert_eq!(players[0].state, PlayerState::Unknown);
        assert_eq!(players[0].source, None);
        assert!(players[0].assumed_state);

        store.apply(&PollResult::observed(vec![ZoneStatus::new(
            zone(1),
            Some(input(2)),
            Some(PowerState::On),
        )]));
        let players = catalog.media_players(&store.read());
        assert_eq!(players[0].state, PlayerState::On);
        assert_eq!(players[0].source.as_deref(), Some("Apple TV (2)"));
        assert!(!players[0].assumed_state);
    }

    #[test]
    fn test_routing_overview() {
        let catalog = EntityCatalog::new(&config());
        let store = StateStore::new(&config());
        assert_eq!(catalog.routing_overview(&store.read()).value, "No data");

        store.apply(&PollResult::observed(vec![ZoneStatus::new(
            zone(2),
            None,
            Some(PowerState::Off),
        )]));
        assert_eq!(catalog.routing_overview(&store.read()).value, "No routes");

        store.apply(&PollResult::observed(vec![
            ZoneStatus::new(zone(1), Some(input(2)), None),
            ZoneStatus::new(zone(2), Some(input(3)), None),
        ]));
        let overview = catalog.routing_overview(&store.read());
        assert_eq!(overview.value, "OUT001→IN002, OUT002→IN003");
        assert_eq!(
            overview.attributes.get("output_002").map(String::as_str),
            Some("input_003")
        );
    }

    #[test]
    fn test_affected_by() {
        let catalog = EntityCatalog::new(&config());
        let store = StateStore::new(&config());
        let changes = store.apply(&PollResult::observed(vec![ZoneStatus::new(
            zone(1),
            Some(input(1)),
            Some(PowerState::On),
        )]));
        assert_eq!(changes.len(), 2);

        let route = changes.iter().find(|c| c.kind() == FieldKind::Route).unwrap();
        assert_eq!(
            catalog.affected_by(route),
            vec![
                "192.168.1.50:23_output_001_media_player".to_string(),
                "192.168.1.50:23_output_001_source".to_string(),
                "192.168.1.50:23_routing_overview".to_string(),
            ]
        );

        let power = changes.iter().find(|c| c.kind() == FieldKind::Power).unwrap();
        assert_eq!(catalog.affected_by(power).len(), 1);
    }
}
