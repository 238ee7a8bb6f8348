/// storcli / storcli2 controller source for Broadcom (LSI) MegaRAID and HBA controllers
///
/// Everything is read through the tools' JSON output (`J` suffix). Both the
/// storcli2 layout (`PD LIST`, `Drives List`, `Enclosures`) and the older
/// storcli layout (`Physical Device Information`, `Enclosure /cX/eY`) are handled.

use super::{command, Controller, ControllerFamily, LedAction};
use crate::domain::device::DeviceRecord;
use crate::domain::enclosure::Enclosure;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;

const COMMANDS: [&str; 2] = ["storcli2", "storcli"];

/// Per-drive attributes only present in the detailed listing
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct PdDetail {
    serial: String,
    manufacturer: String,
    wwn: String,
    model: String,
}

type PdDetails = HashMap<(String, String), PdDetail>;

pub struct StorcliController {
    cmd: String,
}

impl StorcliController {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    /// First of storcli2/storcli that is installed and sees at least one controller
    pub fn detect() -> Option<Self> {
        for cmd in COMMANDS {
            if !command::exists(cmd) {
                debug!("{} not found on PATH", cmd);
                continue;
            }
            let controller = Self::new(cmd);
            match controller.controller_count() {
                Ok(count) if count > 0 => {
                    debug!("{} reports {} controllers", cmd, count);
                    return Some(controller);
                }
                Ok(_) => debug!("{} reports no controllers", cmd),
                Err(e) => debug!("{} is not usable: {:#}", cmd, e),
            }
        }
        None
    }

    pub fn command(&self) -> &str {
        &self.cmd
    }

    fn query(&self, args: &[&str]) -> Result<Value> {
        let output = command::run(&self.cmd, args)?;
        serde_json::from_str(&output)
            .with_context(|| format!("Failed to parse {} JSON output for {}", self.cmd, args.join(" ")))
    }

    fn controller_count(&self) -> Result<u64> {
        let json = self.query(&["show", "ctrlcount", "J"])?;
        Ok(parse_controller_count(&json))
    }

    /// Detailed drive attributes from one `show all` query, keyed by (controller, "EID:Slt")
    fn pd_details(&self, path: &str) -> PdDetails {
        let mut details = HashMap::new();
        match self.query(&[path, "show", "all", "J"]) {
            Ok(json) => extract_pd_details(&json, &mut details),
            Err(e) => debug!("Could not get drive details from {}: {:#}", path, e),
        }
        details
    }
}

impl Controller for StorcliController {
    fn family(&self) -> ControllerFamily {
        ControllerFamily::Storcli
    }

    fn get_disks(&self) -> Result<Vec<DeviceRecord>> {
        info!("Getting {} disk information", self.cmd);
        let json = self.query(&["/call", "show", "all", "J"])?;

        // storcli2 only lists models in PD LIST; fetch the details for all controllers once
        let has_pd_list = controllers(&json).any(|c| c["Response Data"].get("PD LIST").is_some());
        let all_details = if has_pd_list {
            self.pd_details("/call/eall/sall")
        } else {
            HashMap::new()
        };

        let mut disks = Vec::new();
        for controller in controllers(&json) {
            let response = &controller["Response Data"];
            if response.get("PD LIST").is_some() {
                let controller_num = text(&controller["Command Status"]["Controller"]);
                let has_details = all_details.keys().any(|(c, _)| *c == controller_num);
                if has_details || controller_num.is_empty() {
                    disks.extend(parse_pd_list(controller, &all_details));
                } else {
                    let details = self.pd_details(&format!("/c{}/eall/sall", controller_num));
                    disks.extend(parse_pd_list(controller, &details));
                }
            } else if response.get("Physical Device Information").is_some() {
                disks.extend(parse_physical_device_information(response));
            }
        }

        debug!("Total {} disks found: {}", self.cmd, disks.len());
        Ok(disks)
    }

    fn get_enclosures(&self) -> Result<Vec<Enclosure>> {
        info!("Getting {} enclosure information", self.cmd);
        let json = self.query(&["/call/eall", "show", "all", "J"])?;
        let enclosures = parse_enclosures(&json);
        debug!("Total {} enclosures found: {}", self.cmd, enclosures.len());
        Ok(enclosures)
    }

    fn locate(&self, disk: &DeviceRecord, action: LedAction) -> Result<()> {
        let verb = match action {
            LedAction::On => "start",
            LedAction::Off => "stop",
        };
        let path = drive_path(disk);
        command::run(&self.cmd, &[&path, verb, "locate"])
            .with_context(|| format!("Failed to {} locate on {}", verb, path))?;
        Ok(())
    }
}

/// "/c0/e252/s4", or "/c0/s4" for directly attached drives
fn drive_path(disk: &DeviceRecord) -> String {
    if disk.enclosure.is_empty() {
        format!("/c{}/s{}", disk.controller, disk.slot)
    } else {
        format!("/c{}/e{}/s{}", disk.controller, disk.enclosure, disk.slot)
    }
}

fn controllers(json: &Value) -> impl Iterator<Item = &Value> {
    json["Controllers"].as_array().into_iter().flatten()
}

/// String, number or missing JSON value as trimmed text
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn parse_slot(value: &str) -> u32 {
    value.trim().parse().unwrap_or(0)
}

fn parse_controller_count(json: &Value) -> u64 {
    controllers(json)
        .filter_map(|c| {
            let count = &c["Response Data"]["Controller Count"];
            count.as_u64().or_else(|| count.as_str().and_then(|s| s.trim().parse().ok()))
        })
        .next()
        .unwrap_or(0)
}

/// Split "252:4" into enclosure and slot; " :4" means no enclosure
fn split_eid_slot(eid_slt: &str) -> Option<(String, u32)> {
    let (enclosure, slot) = eid_slt.split_once(':')?;
    let slot = slot.trim();
    if slot.is_empty() || !slot.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((enclosure.trim().to_string(), parse_slot(slot)))
}

/// Parse "Drive /c0/e252/s4" into (controller, enclosure, slot)
fn parse_drive_key(key: &str) -> Option<(String, String, u32)> {
    let path = key.strip_prefix("Drive ")?.trim();
    let mut controller = None;
    let mut enclosure = String::new();
    let mut slot = None;

    for part in path.split('/').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        let kind = chars.next()?;
        let number = chars.as_str();
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match kind {
            'c' => controller = Some(number.to_string()),
            'e' => enclosure = number.to_string(),
            's' => slot = Some(parse_slot(number)),
            _ => return None,
        }
    }

    Some((controller?, enclosure, slot?))
}

/// storcli2: `PD LIST` rows, enriched with the detailed drive listing
fn parse_pd_list(controller: &Value, details: &PdDetails) -> Vec<DeviceRecord> {
    let controller_num = text(&controller["Command Status"]["Controller"]);
    let pd_list = controller["Response Data"]["PD LIST"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();
    debug!("Controller {}: {} drives in PD LIST", controller_num, pd_list.len());

    let mut disks = Vec::new();
    for entry in pd_list {
        let eid_slt = text(&entry["EID:Slt"]);
        let Some((enclosure, slot)) = split_eid_slot(&eid_slt) else {
            debug!("Skipping PD LIST entry without EID:Slt: {}", entry);
            continue;
        };

        let detail = details
            .get(&(controller_num.clone(), eid_slt))
            .cloned()
            .unwrap_or_default();
        let mut model = text(&entry["Model"]);
        if model.is_empty() {
            model = detail.model.clone();
        }

        let disk = DeviceRecord {
            serial: detail.serial,
            wwn: detail.wwn,
            model,
            manufacturer: detail.manufacturer,
            controller: controller_num.clone(),
            enclosure,
            slot,
        };
        debug!("Found disk: {:?}", disk);
        disks.push(disk);
    }
    disks
}

/// storcli: `Physical Device Information` keyed by "Drive /cX/eY/sZ"
fn parse_physical_device_information(response: &Value) -> Vec<DeviceRecord> {
    let Some(devices) = response["Physical Device Information"].as_object() else {
        return Vec::new();
    };

    let mut disks = Vec::new();
    for (key, value) in devices {
        if !key.starts_with("Drive /c") || key.contains("Detailed Information") {
            continue;
        }
        let summary = &value[0];

        let location = parse_drive_key(key).or_else(|| {
            let controller = key
                .strip_prefix("Drive /c")
                .and_then(|rest| rest.split('/').next())
                .unwrap_or_default()
                .to_string();
            split_eid_slot(&text(&summary["EID:Slt"])).map(|(e, s)| (controller, e, s))
        });
        let Some((controller, enclosure, slot)) = location else {
            debug!("Could not extract enclosure and slot for {}", key);
            continue;
        };

        let attributes = &devices
            .get(&format!("{} - Detailed Information", key))
            .map(|d| d[format!("{} Device attributes", key)].clone())
            .unwrap_or(Value::Null);
        let detail = pd_detail_from_attributes(attributes);

        if detail.serial.is_empty() {
            debug!("Skipping {} without serial number", key);
            continue;
        }

        let mut model = text(&summary["Model"]);
        if model.is_empty() {
            model = detail.model;
        }

        let disk = DeviceRecord {
            serial: detail.serial,
            wwn: detail.wwn,
            model,
            manufacturer: detail.manufacturer,
            controller,
            enclosure,
            slot,
        };
        debug!("Found disk: {:?}", disk);
        disks.push(disk);
    }
    disks
}

fn pd_detail_from_attributes(attributes: &Value) -> PdDetail {
    PdDetail {
        serial: text(&attributes["SN"]),
        manufacturer: text(&attributes["Manufacturer Id"]),
        wwn: text(&attributes["WWN"]),
        model: text(&attributes["Model Number"]),
    }
}

fn extract_pd_details(json: &Value, details: &mut PdDetails) {
    for controller in controllers(json) {
        let response = &controller["Response Data"];
        let controller_num = text(&controller["Command Status"]["Controller"]);

        if let Some(drives) = response["Drives List"].as_array() {
            for drive in drives {
                let eid_slt = text(&drive["Drive Information"]["EID:Slt"]);
                let info = &drive["Drive Detailed Information"];
                if eid_slt.is_empty() || !info.is_object() {
                    continue;
                }
                details.insert(
                    (controller_num.clone(), eid_slt),
                    PdDetail {
                        serial: text(&info["Serial Number"]),
                        manufacturer: text(&info["Vendor"]),
                        wwn: text(&info["WWN"]),
                        model: text(&info["Model"]),
                    },
                );
            }
            continue;
        }

        let Some(devices) = response["Physical Device Information"].as_object() else {
            continue;
        };
        for (key, value) in devices {
            let Some(summary) = value.as_array().and_then(|a| a.first()) else {
                continue;
            };
            let mut eid_slt = text(&summary["EID:Slt"]);
            if eid_slt.is_empty() {
                if let Some((_, enclosure, slot)) = parse_drive_key(key) {
                    eid_slt = format!("{}:{}", enclosure, slot);
                }
            }
            let attributes = devices
                .get(&format!("{} - Detailed Information", key))
                .map(|d| &d[format!("{} Device attributes", key)]);
            if let Some(attributes) = attributes.filter(|a| a.is_object()) {
                details.insert((controller_num.clone(), eid_slt), pd_detail_from_attributes(attributes));
            }
        }
    }
}

fn parse_enclosures(json: &Value) -> Vec<Enclosure> {
    let mut enclosures = Vec::new();

    for controller in controllers(json) {
        let response = &controller["Response Data"];
        let controller_num = text(&controller["Command Status"]["Controller"]);

        let list = response["Enclosures"]
            .as_array()
            .filter(|l| !l.is_empty())
            .or_else(|| response["Enclosure List"].as_array());

        match list {
            Some(list) => enclosures.extend(parse_enclosure_list(list, &controller_num)),
            None => enclosures.extend(parse_enclosure_sections(response)),
        }
    }

    enclosures
}

/// storcli2: list entries with the properties inline or under "Properties"
fn parse_enclosure_list(list: &[Value], controller_num: &str) -> Vec<Enclosure> {
    list.iter()
        .filter_map(|entry| {
            let props = match entry["Properties"].as_array().and_then(|p| p.first()) {
                Some(props) => props,
                None => entry,
            };
            let enclosure_id = text(&props["EID"]);
            if enclosure_id.is_empty() {
                return None;
            }
            Some(Enclosure {
                controller: controller_num.to_string(),
                enclosure_id,
                product_id: text(&props["ProdID"]),
                slots: parse_slot(&text(&props["Slots"])),
                ..Default::default()
            })
        })
        .collect()
}

/// storcli: one "Enclosure /cX/eY" section per enclosure
fn parse_enclosure_sections(response: &Value) -> Vec<Enclosure> {
    let Some(sections) = response.as_object() else {
        return Vec::new();
    };

    let mut enclosures = Vec::new();
    for (key, section) in sections {
        let Some(path) = key.strip_prefix("Enclosure") else {
            continue;
        };
        let path = path.trim().trim_end_matches(':').trim();
        let mut parts = path.split('/').filter(|p| !p.is_empty());
        let (Some(c), Some(e)) = (parts.next(), parts.next()) else {
            continue;
        };
        let (Some(controller), Some(enclosure_id)) = (c.strip_prefix('c'), e.strip_prefix('e')) else {
            continue;
        };

        let product_id = section["Inquiry Data"]["Product Identification"]
            .as_str()
            .unwrap_or_default()
            .trim_end()
            .to_string();
        let slots = parse_slot(&text(&section["Properties"][0]["Slots"]));

        enclosures.push(Enclosure {
            controller: controller.to_string(),
            enclosure_id: enclosure_id.to_string(),
            product_id,
            slots,
            ..Default::default()
        });
    }

    if enclosures.is_empty() {
        warn!("No enclosures found in storcli output");
    }
    enclosures
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn storcli2_disks() -> Value {
        json!({
            "Controllers": [{
                "Command Status": {"Controller": 0, "Status": "Success"},
                "Response Data": {
                    "PD LIST": [
                        {"EID:Slt": "252:0", "DID": 10, "State": "Onln", "Model": "ST12000NM0008   "},
                        {"EID:Slt": "252:1", "DID": 11, "State": "Onln", "Model": ""},
                        {"EID:Slt": "", "DID": 12}
                    ]
                }
            }]
        })
    }

    fn storcli2_details() -> Value {
        json!({
            "Controllers": [{
                "Command Status": {"Controller": 0},
                "Response Data": {
                    "Drives List": [
                        {
                            "Drive Information": {"EID:Slt": "252:0"},
                            "Drive Detailed Information": {
                                "Serial Number": "ZJV0A1B2 ", "Vendor": "SEAGATE",
                                "WWN": "5000C500A1B2C3D4", "Model": "ST12000NM0008"
                            }
                        },
                        {
                            "Drive Information": {"EID:Slt": "252:1"},
                            "Drive Detailed Information": {
                                "Serial Number": "ZJV0A1B3", "Vendor": "SEAGATE",
                                "WWN": "5000C500A1B2C3D5", "Model": "ST12000NM0009"
                            }
                        }
                    ]
                }
            }]
        })
    }

    #[test]
    fn test_storcli2_pd_list_with_details() {
        let mut details = HashMap::new();
        extract_pd_details(&storcli2_details(), &mut details);
        assert_eq!(details.len(), 2);

        let json = storcli2_disks();
        let controller = &json["Controllers"][0];
        let disks = parse_pd_list(controller, &details);
        assert_eq!(disks.len(), 2);

        assert_eq!(disks[0].controller, "0");
        assert_eq!(disks[0].enclosure, "252");
        assert_eq!(disks[0].slot, 0);
        assert_eq!(disks[0].serial, "ZJV0A1B2");
        assert_eq!(disks[0].model, "ST12000NM0008");
        assert_eq!(disks[0].wwn, "5000C500A1B2C3D4");

        // Model falls back to the detailed listing
        assert_eq!(disks[1].model, "ST12000NM0009");
        assert_eq!(disks[1].slot, 1);
    }

    #[test]
    fn test_storcli_physical_device_information() {
        let response = json!({
            "Physical Device Information": {
                "Drive /c0/e8/s3": [{"EID:Slt": "8:3", "Model": "HUH721212AL5200"}],
                "Drive /c0/e8/s3 - Detailed Information": {
                    "Drive /c0/e8/s3 State": {},
                    "Drive /c0/e8/s3 Device attributes": {
                        "SN": "8DHXYZ12", "Manufacturer Id": "HGST    ",
                        "WWN": "5000CCA26B123456", "Model Number": "HUH721212AL5200"
                    }
                },
                "Drive /c0/s5": [{"EID:Slt": " :5", "Model": "INTEL SSD"}],
                "Drive /c0/s5 - Detailed Information": {
                    "Drive /c0/s5 Device attributes": {"SN": "BTWL1234", "WWN": ""}
                },
                "Drive /c0/e8/s4": [{"EID:Slt": "8:4", "Model": "HUH721212AL5200"}]
            }
        });

        let mut disks = parse_physical_device_information(&response);
        disks.sort_by_key(|d| d.slot);
        assert_eq!(disks.len(), 2);

        assert_eq!(disks[0].serial, "8DHXYZ12");
        assert_eq!(disks[0].manufacturer, "HGST");
        assert_eq!(disks[0].enclosure, "8");
        assert_eq!(disks[0].slot, 3);

        assert_eq!(disks[1].serial, "BTWL1234");
        assert_eq!(disks[1].enclosure, "");
        assert_eq!(disks[1].slot, 5);
    }

    #[test]
    fn test_storcli2_enclosures() {
        let json = json!({
            "Controllers": [{
                "Command Status": {"Controller": "0"},
                "Response Data": {
                    "Enclosures": [
                        {"Properties": [{"EID": 252, "ProdID": "SGPIO           ", "Slots": 8}]},
                        {"EID": 8, "ProdID": "SAS3x48Front", "Slots": "48"},
                        {"ProdID": "missing id"}
                    ]
                }
            }]
        });

        let enclosures = parse_enclosures(&json);
        assert_eq!(enclosures.len(), 2);
        assert_eq!(enclosures[0].enclosure_id, "252");
        assert_eq!(enclosures[0].product_id, "SGPIO");
        assert_eq!(enclosures[0].slots, 8);
        assert_eq!(enclosures[0].hw_start_slot, 1);
        assert_eq!(enclosures[1].controller, "0");
        assert_eq!(enclosures[1].slots, 48);
    }

    #[test]
    fn test_storcli_enclosure_sections() {
        let json = json!({
            "Controllers": [{
                "Command Status": {"Controller": 1},
                "Response Data": {
                    "Enclosure /c1/e8  :": {
                        "Information": {},
                        "Inquiry Data": {"Product Identification": "SAS3x48Front    "},
                        "Properties": [{"EID": 8, "Slots": 24}]
                    },
                    "Status Code": 0
                }
            }]
        });

        let enclosures = parse_enclosures(&json);
        assert_eq!(enclosures.len(), 1);
        assert_eq!(enclosures[0].controller, "1");
        assert_eq!(enclosures[0].enclosure_id, "8");
        assert_eq!(enclosures[0].product_id, "SAS3x48Front");
        assert_eq!(enclosures[0].slots, 24);
    }

    #[test]
    fn test_controller_count() {
        let json = json!({"Controllers": [{"Response Data": {"Controller Count": 2}}]});
        assert_eq!(parse_controller_count(&json), 2);
        let json = json!({"Controllers": [{"Response Data": {"Controller Count": "0"}}]});
        assert_eq!(parse_controller_count(&json), 0);
        assert_eq!(parse_controller_count(&json!({})), 0);
    }

    #[test]
    fn test_drive_keys_and_paths() {
        assert_eq!(
            parse_drive_key("Drive /c0/e252/s4"),
            Some(("0".to_string(), "252".to_string(), 4))
        );
        assert_eq!(parse_drive_key("Drive /c2/s7"), Some(("2".to_string(), String::new(), 7)));
        assert_eq!(parse_drive_key("Drive /c0/e252/s4 - Detailed Information"), None);
        assert_eq!(split_eid_slot("252:4"), Some(("252".to_string(), 4)));
        assert_eq!(split_eid_slot("252:"), None);

        let disk = DeviceRecord {
            controller: "0".to_string(),
            enclosure: "252".to_string(),
            slot: 4,
            ..Default::default()
        };
        assert_eq!(drive_path(&disk), "/c0/e252/s4");
    }

    fn two_controller_details() -> Value {
        let drive = |serial: &str| {
            json!({
                "Drive Information": {"EID:Slt": "252:0"},
                "Drive Detailed Information": {"Serial Number": serial, "WWN": "", "Vendor": "", "Model": ""}
            })
        };
        json!({
            "Controllers": [
                {"Command Status": {"Controller": 0}, "Response Data": {"Drives List": [drive("CTRL0DISK")]}},
                {"Command Status": {"Controller": 1}, "Response Data": {"Drives List": [drive("CTRL1DISK")]}}
            ]
        })
    }

    #[test]
    fn test_details_are_kept_apart_per_controller() {
        let mut details = HashMap::new();
        extract_pd_details(&two_controller_details(), &mut details);
        assert_eq!(details.len(), 2);

        let controller = json!({
            "Command Status": {"Controller": 1},
            "Response Data": {"PD LIST": [{"EID:Slt": "252:0", "Model": "X"}]}
        });
        let disks = parse_pd_list(&controller, &details);
        assert_eq!(disks[0].serial, "CTRL1DISK");
        assert_eq!(disks[0].controller, "1");
    }

    #[test]
    fn test_drive_details_are_queried_once() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let disks = json!({
            "Controllers": [
                {"Command Status": {"Controller": 0}, "Response Data": {"PD LIST": [{"EID:Slt": "252:0", "Model": "A"}]}},
                {"Command Status": {"Controller": 1}, "Response Data": {"PD LIST": [{"EID:Slt": "252:0", "Model": "B"}]}}
            ]
        });
        fs::write(dir.path().join("disks.json"), disks.to_string()).unwrap();
        fs::write(dir.path().join("details.json"), two_controller_details().to_string()).unwrap();

        let script = dir.path().join("storcli2");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$*\" >> {log}\ncase \"$1\" in\n  /call) cat {dir}/disks.json ;;\n  /call/eall/sall) cat {dir}/details.json ;;\n  *) echo '{{}}' ;;\nesac\n",
                log = log.display(),
                dir = dir.path().display()
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let controller = StorcliController::new(script.to_string_lossy());
        let records = controller.get_disks().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].serial, "CTRL0DISK");
        assert_eq!(records[1].serial, "CTRL1DISK");

        let calls = fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().filter(|l| l.contains("eall/sall")).count(), 1);
    }
}
