use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TYPE_JBOD: &str = "JBOD";
pub const TYPE_INTERNAL: &str = "Internal";
pub const TYPE_UNKNOWN: &str = "Unknown";

/// One physical enclosure as seen by one controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enclosure {
    #[serde(alias = "controller_id")]
    pub controller: String,
    pub enclosure_id: String,
    pub logical_id: String,     // SAS address
    pub product_id: String,     // Inquiry product identification, may carry padding
    pub enclosure_type: String, // Reported type, empty if the controller has none
    #[serde(alias = "num_slots")]
    pub slots: u32,
    pub hw_start_slot: u32, // First slot number the hardware reports
}

impl Default for Enclosure {
    fn default() -> Self {
        Self {
            controller: String::new(),
            enclosure_id: String::new(),
            logical_id: String::new(),
            product_id: String::new(),
            enclosure_type: String::new(),
            slots: 0,
            hw_start_slot: 1,
        }
    }
}

impl Enclosure {
    /// Reported type when it is meaningful, otherwise guessed from the slot count
    pub fn effective_type(&self) -> &str {
        let reported = self.enclosure_type.trim();
        if !reported.is_empty() && reported != TYPE_UNKNOWN {
            reported
        } else {
            classify_by_slots(self.slots)
        }
    }
}

/// Slot-count heuristic: more than 20 bays is a JBOD, up to 8 is a server backplane.
/// A count of zero means the controller did not say.
pub fn classify_by_slots(slots: u32) -> &'static str {
    match slots {
        0 => TYPE_UNKNOWN,
        s if s > 20 => TYPE_JBOD,
        s if s <= 8 => TYPE_INTERNAL,
        _ => TYPE_UNKNOWN,
    }
}

/// User supplied naming and numbering rule for an enclosure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclosureConfig {
    pub id: String, // Matched against product_id, logical_id or enclosure_id
    pub name: String,
    pub start_slot: i64,
    pub max_slots: u32,
    pub offset: i64,
}

impl EnclosureConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            start_slot: 1,
            max_slots: 0,
            offset: 0,
        }
    }
}

impl EnclosureConfig {
    /// Starting point for a user entry: keyed by the identifier `resolve_config`
    /// tries first for this enclosure, named after it.
    pub fn template_for(enclosure: &Enclosure) -> Self {
        let product_id = enclosure.product_id.trim();
        let (id, name) = if !product_id.is_empty() {
            (product_id.to_string(), product_id.to_string())
        } else if !enclosure.logical_id.is_empty() {
            (enclosure.logical_id.clone(), enclosure.logical_id.clone())
        } else {
            (
                enclosure.enclosure_id.clone(),
                format!("Enclosure-{}", enclosure.enclosure_id),
            )
        };
        Self {
            max_slots: enclosure.slots,
            ..Self::new(id, name)
        }
    }
}

/// Discovered enclosures plus the configuration entries that name them.
///
/// Populated once before mapping and only read afterwards.
#[derive(Debug, Default)]
pub struct EnclosureRegistry {
    enclosures: BTreeMap<(String, String), Enclosure>,
    configs: BTreeMap<String, EnclosureConfig>,
}

impl EnclosureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, enclosure: Enclosure) {
        let key = (enclosure.controller.clone(), enclosure.enclosure_id.clone());
        debug!(
            "Registered enclosure {}:{} (product '{}', logical '{}', {} slots, start {})",
            key.0, key.1, enclosure.product_id, enclosure.logical_id, enclosure.slots, enclosure.hw_start_slot
        );
        if self.enclosures.insert(key, enclosure).is_some() {
            debug!("Enclosure reported twice, keeping the latest report");
        }
    }

    /// Add a configuration entry. Entries without an id are rejected; a repeated
    /// id replaces the earlier entry.
    pub fn register_config(&mut self, mut config: EnclosureConfig) -> bool {
        if config.id.trim().is_empty() {
            warn!("Skipping enclosure config without ID");
            return false;
        }
        if config.name.is_empty() {
            debug!("Enclosure config {} has no name, using its id", config.id);
            config.name = config.id.trim().to_string();
        }
        if let Some(previous) = self.configs.get(&config.id) {
            warn!(
                "Duplicate enclosure config for '{}': '{}' replaces '{}'",
                config.id, config.name, previous.name
            );
        }
        debug!("Loaded enclosure config for '{}': {:?}", config.id, config);
        self.configs.insert(config.id.clone(), config);
        true
    }

    pub fn lookup_enclosure(&self, controller: &str, enclosure_id: &str) -> Option<&Enclosure> {
        self.enclosures
            .get(&(controller.to_string(), enclosure_id.to_string()))
    }

    /// Find the configuration entry for an enclosure.
    ///
    /// Priority: product_id (exact, then whitespace-trimmed on both sides),
    /// then logical_id, then enclosure_id. First match wins.
    pub fn resolve_config(&self, enclosure: &Enclosure) -> Option<&EnclosureConfig> {
        if !enclosure.product_id.is_empty() {
            if let Some(config) = self.configs.get(&enclosure.product_id) {
                debug!("Config for product ID (exact) '{}'", enclosure.product_id);
                return Some(config);
            }

            let stripped = enclosure.product_id.trim();
            if !stripped.is_empty() {
                if let Some(config) = self.configs.get(stripped) {
                    debug!("Config for product ID (stripped) '{}'", stripped);
                    return Some(config);
                }
                if let Some(config) = self.configs.values().find(|c| c.id.trim() == stripped) {
                    debug!("Config '{}' matches product ID '{}' when stripped", config.id, stripped);
                    return Some(config);
                }
            }
        }

        if !enclosure.logical_id.is_empty() {
            if let Some(config) = self.configs.get(&enclosure.logical_id) {
                debug!("Config for logical ID {}", enclosure.logical_id);
                return Some(config);
            }
        }

        if !enclosure.enclosure_id.is_empty() {
            if let Some(config) = self.configs.get(&enclosure.enclosure_id) {
                debug!("Config for enclosure ID {}", enclosure.enclosure_id);
                return Some(config);
            }
        }

        None
    }

    /// Enclosures ordered by (controller, enclosure_id)
    pub fn enclosures(&self) -> impl Iterator<Item = &Enclosure> {
        self.enclosures.values()
    }

    pub fn configs(&self) -> impl Iterator<Item = &EnclosureConfig> {
        self.configs.values()
    }

    pub fn has_configs(&self) -> bool {
        !self.configs.is_empty()
    }
}
