use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use storage_topology::collectors::zpool::annotate_status;
use storage_topology::collectors::{
    detect_controller, or_empty, Controller, LedAction, LsblkCollector, SnapshotController,
    ZpoolCollector,
};
use storage_topology::config::{enclosure_template, Config, DEFAULT_CONFIG_PATH};
use storage_topology::domain::{
    location_updates, sort_for_presentation, DeviceMatcher, DeviceRecord, Disk, EnclosureRegistry,
    LocationMapper, WwnMatching,
};
use storage_topology::TopologyError;

#[derive(Parser, Debug)]
#[command(name = "storage-topology")]
#[command(about = "Map disks to their physical enclosure bays through the storage controller")]
#[command(version)]
struct Args {
    /// Configuration file with enclosure names and custom disk mappings
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Read controller disks and enclosures from a JSON/YAML snapshot instead of the controller
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Print disks as JSON
    #[arg(short, long)]
    json: bool,

    /// Print the location update plan (identifier, enclosure, slot, disk, tag) as JSON
    #[arg(long)]
    update_plan: bool,

    /// Print `zpool status` with the location and serial of every pool member
    #[arg(short, long)]
    zpool: bool,

    /// List enclosures and print a configuration template, optionally for one enclosure id
    #[arg(long, value_name = "ID", num_args = 0..=1, default_missing_value = "")]
    enclosures: Option<String>,

    /// Match WWNs exactly
    #[arg(long, conflicts_with = "lenient_wwn")]
    strict_wwn: bool,

    /// Also match WWNs that differ in a single hex digit
    #[arg(long)]
    lenient_wwn: bool,

    /// Turn on the identify LED of a disk (e.g. sda or /dev/sda)
    #[arg(long, value_name = "DEV", group = "led")]
    locate: Option<String>,

    /// Turn off the identify LED of a disk
    #[arg(long, value_name = "DEV", group = "led")]
    locate_off: Option<String>,

    /// Turn on the identify LEDs of all disks
    #[arg(long, group = "led")]
    locate_all: bool,

    /// Turn off the identify LEDs of all disks
    #[arg(long, group = "led")]
    locate_all_off: bool,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn wwn_override(&self) -> Option<WwnMatching> {
        if self.strict_wwn {
            Some(WwnMatching::Exact)
        } else if self.lenient_wwn {
            Some(WwnMatching::TolerateOneDigit)
        } else {
            None
        }
    }
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Warn
    } else {
        LevelFilter::Info
    };
    // RUST_LOG still wins over the flags
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let config = Config::load(&args.config)?;

    let controller: Box<dyn Controller> = match &args.snapshot {
        Some(path) => Box::new(SnapshotController::load(path)?),
        None => detect_controller()?,
    };

    if args.locate_all || args.locate_all_off {
        let action = if args.locate_all { LedAction::On } else { LedAction::Off };
        let (succeeded, failed) = controller.locate_all(action)?;
        log::info!("Turned {} {} LEDs, {} failed", action, succeeded, failed);
        return Ok(());
    }

    // Without enclosures every disk still gets a positional location
    let enclosures = match controller.get_enclosures() {
        Ok(enclosures) => {
            log::info!("Found {} enclosures", enclosures.len());
            enclosures
        }
        Err(e) if args.enclosures.is_some() => {
            return Err(e.context("Failed to get enclosure information"));
        }
        Err(e) => {
            log::warn!("Failed to get enclosure information: {:#}", e);
            log::warn!("Continuing without enclosure data...");
            Vec::new()
        }
    };

    let mut registry = config.registry;
    for enclosure in enclosures {
        registry.register(enclosure);
    }
    if !registry.has_configs() {
        log::info!("No enclosure configurations loaded, using positional enclosure names");
    }

    if let Some(filter) = &args.enclosures {
        print_enclosures(&registry, filter)?;
        return Ok(());
    }

    let records = or_empty(controller.get_disks(), "controller disk information");
    log::info!("Found {} disks on the {} controller", records.len(), controller.family());

    let devices = or_empty(LsblkCollector::new().collect(), "block devices");

    // Command line beats the configuration file, which beats the controller default
    let wwn_matching = args
        .wwn_override()
        .or(config.wwn_matching)
        .unwrap_or_else(|| controller.wwn_matching());
    log::debug!("WWN matching: {:?}", wwn_matching);

    let disks = DeviceMatcher::new(wwn_matching).correlate(&records, &devices);

    if let Some(dev) = args.locate.as_deref().or(args.locate_off.as_deref()) {
        let action = if args.locate.is_some() { LedAction::On } else { LedAction::Off };
        let disk = find_disk(&disks, dev)?;
        controller.locate(&device_record(disk), action)?;
        log::info!("Turned {} LED for {}", action, disk.dev_name);
        return Ok(());
    }

    let mapper = LocationMapper::new(&registry, &config.overlay).with_numbering(config.numbering);
    let mut disks = mapper.map_all(disks);
    sort_for_presentation(&mut disks);

    if args.zpool {
        let status = ZpoolCollector::new().collect()?;
        println!("{}", annotate_status(&status, &disks));
    } else if args.update_plan {
        let updates = location_updates(&disks);
        println!("{}", serde_json::to_string_pretty(&updates)?);
    } else if args.json {
        let views: Vec<_> = disks.iter().map(Disk::to_view).collect();
        println!("{}", serde_json::to_string_pretty(&views)?);
    } else {
        for disk in &disks {
            println!("{}\t{}\t{}", disk.dev_name, disk.serial, disk.location());
        }
    }

    Ok(())
}

fn find_disk<'a>(disks: &'a [Disk], dev: &str) -> Result<&'a Disk> {
    let short = Path::new(dev)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(dev);
    disks
        .iter()
        .filter(|d| d.matched)
        .find(|d| d.dev_name == dev || d.short_name() == short)
        .ok_or_else(|| {
            TopologyError::DeviceNotFound {
                device: dev.to_string(),
            }
            .into()
        })
}

fn device_record(disk: &Disk) -> DeviceRecord {
    DeviceRecord {
        serial: disk.serial.clone(),
        wwn: disk.wwn.clone(),
        model: disk.model.clone(),
        manufacturer: disk.manufacturer.clone(),
        controller: disk.controller.clone(),
        enclosure: disk.enclosure.clone(),
        slot: disk.slot,
    }
}

fn print_enclosures(registry: &EnclosureRegistry, filter: &str) -> Result<()> {
    let selected: Vec<_> = registry
        .enclosures()
        .filter(|e| filter.is_empty() || e.enclosure_id == filter)
        .collect();

    if selected.is_empty() {
        log::warn!("No enclosures found");
        return Ok(());
    }

    for enc in &selected {
        let configured = registry
            .resolve_config(enc)
            .map(|c| c.name.as_str())
            .unwrap_or("-");
        println!(
            "Controller {} enclosure {}: type {}, {} slots, product '{}', logical id '{}', configured as '{}'",
            enc.controller,
            enc.enclosure_id,
            enc.effective_type(),
            enc.slots,
            enc.product_id.trim(),
            enc.logical_id,
            configured
        );
    }

    println!();
    println!("# Configuration template for {}", DEFAULT_CONFIG_PATH);
    print!("{}", enclosure_template(selected).context("Failed to build configuration template")?);
    Ok(())
}
