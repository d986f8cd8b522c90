//! partscan CLI - MBR partition table inspection
//!
//! Walks the partition table of a disk image, lists its zones, and reports
//! overlapping partitions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use partscan_core::{
    ByteSource, DeclaredKind, DetectionSink, Extent, NestedScanner, ScanConfig, ScanOutcome,
    Verdict, ZoneTable,
};
use partscan_pipeline::MmapPipeline;
use partscan_zones::{check_source, mbr, MbrCheck, MbrZoneTable};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "partscan")]
#[command(about = "MBR partition table walker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON configuration file
    #[arg(long, env = "PARTSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Sector size in bytes (overrides the configuration file)
    #[arg(long)]
    sector_size: Option<u32>,

    /// Maximum partitions examined per scan (overrides the configuration file)
    #[arg(long)]
    max_partitions: Option<u32>,

    /// Report partitions that overlap
    #[arg(long)]
    intersection_heuristic: bool,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Walk the partition table and list every region handed to the scanner
    Scan {
        /// Disk image
        image: PathBuf,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// List partition zones
    Zones {
        /// Disk image
        image: PathBuf,
    },

    /// Validate the master boot record without walking it
    Check {
        /// Disk image
        image: PathBuf,
    },
}

impl Cli {
    /// Configuration file (if any) with command-line overrides applied
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ScanConfig::default(),
        };

        if let Some(sector_size) = self.sector_size {
            config.sector_size = sector_size;
        }
        if let Some(max_partitions) = self.max_partitions {
            config.max_partitions = max_partitions;
        }
        if self.intersection_heuristic {
            config.partition_intersection_heuristic = true;
        }

        Ok(config)
    }
}

fn load_config(path: &Path) -> Result<ScanConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("Invalid configuration {}", path.display()))?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.scan_config()?;
    tracing::debug!("Configuration: {:?}", config);

    match &cli.command {
        Command::Scan { image, json } => cmd_scan(image, &config, *json),
        Command::Zones { image } => cmd_zones(image, &config),
        Command::Check { image } => cmd_check(image, &config),
    }
}

/// Scanner that lists regions instead of inspecting them
#[derive(Default)]
struct RegionLister {
    regions: Vec<(Extent, DeclaredKind)>,
}

impl NestedScanner for RegionLister {
    fn scan(
        &mut self,
        _source: &mut dyn ByteSource,
        extent: Extent,
        kind: DeclaredKind,
    ) -> partscan_core::Result<Verdict> {
        tracing::info!("Region {} ({})", extent, kind);
        self.regions.push((extent, kind));
        Ok(Verdict::Clean)
    }
}

/// Sink that collects detection names
#[derive(Default)]
struct DetectionLog {
    labels: Vec<String>,
}

impl DetectionSink for DetectionLog {
    fn report_potentially_unwanted(&mut self, label: &str) -> partscan_core::Result<Verdict> {
        tracing::warn!("Detected {}", label);
        self.labels.push(label.to_string());
        Ok(Verdict::Clean)
    }
}

fn cmd_scan(image: &Path, config: &ScanConfig, json: bool) -> Result<()> {
    let mut source = MmapPipeline::open(image)
        .with_context(|| format!("Failed to open {}", image.display()))?;
    let mut lister = RegionLister::default();
    let mut detections = DetectionLog::default();

    let outcome = mbr::scan(&mut source, &mut lister, &mut detections, config)
        .with_context(|| format!("Failed to walk {}", image.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("=== Regions ===");
    println!();
    println!("{:<10} {:<15} {:<15}", "Kind", "Offset", "Size");
    println!("{}", "-".repeat(40));
    for (extent, kind) in &lister.regions {
        println!(
            "{:<10} {:<15} {:<15}",
            kind.to_string(),
            format!("0x{:X}", extent.offset),
            format_bytes(extent.length)
        );
    }

    if !detections.labels.is_empty() {
        println!();
        println!("=== Detections ===");
        for label in &detections.labels {
            println!("{}", label);
        }
    }

    println!();
    match &outcome {
        ScanOutcome::DeferToOtherFormat => {
            println!("GPT marker found; this image needs a GPT walker.");
        }
        ScanOutcome::Completed(summary) | ScanOutcome::Stopped(summary) => {
            println!("Partitions examined: {}", summary.partitions_examined);
            println!("Regions dispatched:  {}", summary.regions_dispatched);
            println!("Logical records:     {}", summary.logical_records);
            if summary.budget_exhausted {
                println!("Partition limit of {} reached.", config.max_partitions);
            }
            for anomaly in &summary.anomalies {
                println!("Warning: {}", anomaly);
            }
        }
    }

    Ok(())
}

fn cmd_zones(image: &Path, config: &ScanConfig) -> Result<()> {
    let mut source = MmapPipeline::open(image)
        .with_context(|| format!("Failed to open {}", image.display()))?;
    let table = MbrZoneTable::parse(&mut source, config)
        .with_context(|| format!("Failed to parse partition table of {}", image.display()))?;

    println!("=== Partition Table ===");
    println!("Type:        {}", table.identify());
    println!("Disk Sig:    0x{:08X}", table.disk_signature());
    println!("Boot Sig:    0x{:04X}", table.boot_signature());
    println!("Partitions:  {}", table.enumerate_zones().len());
    println!();

    if table.is_gpt_protective() {
        println!("Note: This disk has a GPT protective MBR.");
        return Ok(());
    }

    if table.enumerate_zones().is_empty() {
        println!("No partitions found.");
        return Ok(());
    }

    println!("{:<5} {:<15} {:<15} {:<20} {:<8}", "Index", "Offset", "Size", "Type", "Logical");
    println!("{}", "-".repeat(68));
    for zone in table.enumerate_zones() {
        println!(
            "{:<5} {:<15} {:<15} {:<20} {:<8}",
            zone.index,
            format_bytes(zone.offset),
            format_bytes(zone.length),
            zone.zone_type,
            if zone.logical { "yes" } else { "no" }
        );
    }

    Ok(())
}

fn cmd_check(image: &Path, config: &ScanConfig) -> Result<()> {
    let mut source = MmapPipeline::open(image)
        .with_context(|| format!("Failed to open {}", image.display()))?;

    match check_source(&mut source, config.sector_size)? {
        MbrCheck::Valid => println!("{}: valid master boot record", image.display()),
        MbrCheck::Gpt => println!("{}: GPT protective or hybrid MBR", image.display()),
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else if bytes < 1_073_741_824 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1_048_576), "5.00 MB");
        assert_eq!(format_bytes(3 * 1_073_741_824), "3.00 GB");
    }

    #[test]
    fn test_load_config_partial() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_partitions": 8}}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.max_partitions, 8);
        assert_eq!(config.sector_size, 0);
        assert!(!config.partition_intersection_heuristic);
    }

    #[test]
    fn test_load_config_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"sector_size": 4096, "max_partitions": 8}}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::parse_from([
            "partscan",
            "--config",
            path,
            "--max-partitions",
            "3",
            "--intersection-heuristic",
            "zones",
            "disk.img",
        ]);
        let config = cli.scan_config().unwrap();

        assert_eq!(config.sector_size, 4096);
        assert_eq!(config.max_partitions, 3);
        assert!(config.partition_intersection_heuristic);
    }
}
