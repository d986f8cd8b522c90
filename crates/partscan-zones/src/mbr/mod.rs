//! MBR (Master Boot Record) partition table walker

pub mod chain;
pub mod intersection;
pub mod types;
pub mod validate;

use partscan_core::{
    ByteSource, DeclaredKind, DetectionSink, Error, Extent, NestedScanner, Result, ScanConfig,
    ScanOutcome, ScanSummary, Verdict, WalkBudget, Zone, ZoneTable,
};
use std::ops::ControlFlow;
use types::{BootRecord, PartitionEntry, SlotKind};

pub use chain::ChainState;
pub use intersection::PARTITION_INTERSECTION_LABEL;
pub use validate::{check_ebr, check_mbr};

/// Sector holding the master boot record
pub const MBR_SECTOR: u64 = 0;

/// Sector size assumed by [`check_buffer`]
pub const MBR_SECTOR_SIZE: u32 = 512;

/// Flow of a walk step: keep going, or stop because a collaborator asked to
pub(crate) type Flow = ControlFlow<()>;

/// Result of a quick MBR check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbrCheck {
    /// A structurally valid MBR
    Valid,
    /// Entry 0 carries a GPT protective or hybrid marker
    Gpt,
}

/// State of one scan, shared by the primary, chain and heuristic passes
///
/// The partition budget is deliberately not stored here: it is owned by
/// [`scan`] and lent to every step.
pub(crate) struct Walk<'a> {
    pub(crate) source: &'a mut dyn ByteSource,
    pub(crate) scanner: &'a mut dyn NestedScanner,
    pub(crate) sink: &'a mut dyn DetectionSink,
    pub(crate) sector_size: u32,
    pub(crate) summary: ScanSummary,
    pub(crate) zones: Vec<Zone>,
}

impl<'a> Walk<'a> {
    /// Hand a region to the nested scanner
    pub(crate) fn dispatch(&mut self, extent: Extent, kind: DeclaredKind) -> Result<Flow> {
        tracing::debug!("Scanning {} region {}", kind, extent);
        self.summary.regions_dispatched += 1;

        if self.scanner.scan(&mut *self.source, extent, kind)?.is_stop() {
            tracing::info!("Scanner requested stop after region {}", extent);
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Record a discovered partition and hand it to the nested scanner
    ///
    /// Zero-length partitions are recorded but not dispatched.
    pub(crate) fn dispatch_partition(
        &mut self,
        entry: &PartitionEntry,
        extent: Extent,
        logical: bool,
    ) -> Result<Flow> {
        let zone = Zone::new(self.zones.len(), extent, entry.partition_type.name().to_string())
            .with_logical(logical);
        self.zones.push(zone);

        if extent.is_empty() {
            tracing::debug!("Skipping zero-length partition at {}", extent);
            return Ok(ControlFlow::Continue(()));
        }

        self.dispatch(extent, DeclaredKind::Partition)
    }

    /// Note a non-fatal irregularity
    pub(crate) fn anomaly(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.summary.anomalies.push(message);
    }

    /// Walk the four primary entries
    fn walk_primary(&mut self, mbr: &BootRecord, budget: &mut WalkBudget) -> Result<Flow> {
        let mut followed_extended = false;

        for (index, entry) in mbr.entries.iter().enumerate() {
            if budget.is_exhausted() {
                break;
            }

            tracing::debug!(
                "MBR partition entry {}: status 0x{:02X}, type {}, blocks [{}, +{})",
                index,
                entry.status,
                entry.partition_type,
                entry.first_lba,
                entry.num_lba
            );

            match entry.kind() {
                SlotKind::Empty => budget.charge(),
                SlotKind::Extended if followed_extended => {
                    self.anomaly(format!(
                        "Master boot record with multiple extended partitions, entry {} not followed",
                        index
                    ));
                    budget.charge();
                }
                SlotKind::Extended => {
                    followed_extended = true;
                    if self.walk_chain(entry, budget)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
                SlotKind::Data => {
                    budget.charge();
                    let extent = entry.extent(self.sector_size)?;
                    if self.dispatch_partition(entry, extent, false)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    /// Bootstrap region, optional heuristic pass, then the partitions
    fn run(&mut self, mbr: &BootRecord, heuristic: bool, budget: &mut WalkBudget) -> Result<Flow> {
        let bootstrap = Extent::new(0, self.sector_size as u64);
        if self.dispatch(bootstrap, DeclaredKind::Any)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }

        if heuristic && self.check_primary_intersections(mbr, budget)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }

        tracing::debug!("MBR signature: 0x{:04X}", mbr.signature);
        self.walk_primary(mbr, budget)
    }
}

/// Size of total image must be a multiple of the sector size
fn check_alignment(maplen: u64, sector_size: u32) -> Result<()> {
    if maplen % sector_size as u64 != 0 {
        tracing::debug!("Image sized {} is not a multiple of sector size {}", maplen, sector_size);
        return Err(Error::MisalignedImage {
            length: maplen,
            sector_size,
        });
    }
    Ok(())
}

/// Everything a walk produced
pub(crate) struct WalkReport {
    pub(crate) outcome: ScanOutcome,
    pub(crate) zones: Vec<Zone>,
    pub(crate) record: Option<BootRecord>,
}

pub(crate) fn walk(
    source: &mut dyn ByteSource,
    scanner: &mut dyn NestedScanner,
    sink: &mut dyn DetectionSink,
    config: &ScanConfig,
) -> Result<WalkReport> {
    let sector_size = config.effective_sector_size()?;

    let maplen = source.length();
    check_alignment(maplen, sector_size)?;

    let mbr = BootRecord::read_sector(source, MBR_SECTOR, sector_size)?;

    // A protective MBR spans the whole disk and would fail the bounds check
    if mbr.has_gpt_marker() {
        tracing::info!("GPT marker {} in MBR entry 0, deferring", mbr.entries[0].partition_type);
        return Ok(WalkReport {
            outcome: ScanOutcome::DeferToOtherFormat,
            zones: Vec::new(),
            record: Some(mbr),
        });
    }

    check_mbr(&mbr, maplen, sector_size)?;

    let mut budget = WalkBudget::new(config.max_partitions);
    let mut walk = Walk {
        source,
        scanner,
        sink,
        sector_size,
        summary: ScanSummary::default(),
        zones: Vec::new(),
    };

    let flow = walk.run(&mbr, config.partition_intersection_heuristic, &mut budget)?;

    let mut summary = walk.summary;
    summary.partitions_examined = budget.examined();
    if budget.is_exhausted() {
        tracing::info!("Maximum partitions reached ({})", budget.limit());
        summary.budget_exhausted = true;
    }

    tracing::info!(
        "MBR walk examined {} partition(s), dispatched {} region(s)",
        summary.partitions_examined,
        summary.regions_dispatched
    );

    let outcome = match flow {
        ControlFlow::Continue(()) => ScanOutcome::Completed(summary),
        ControlFlow::Break(()) => ScanOutcome::Stopped(summary),
    };

    Ok(WalkReport {
        outcome,
        zones: walk.zones,
        record: Some(mbr),
    })
}

/// Walk the MBR of `source` and every partition it describes
///
/// The bootstrap sector and each discovered partition are handed to
/// `scanner`; heuristic detections go to `sink`. Format errors abort the
/// walk; a GPT marker yields [`ScanOutcome::DeferToOtherFormat`] without
/// dispatching anything.
///
/// # Example
///
/// ```rust,no_run
/// use partscan_core::{ByteSource, DeclaredKind, DetectionSink, Extent, NestedScanner, Result, ScanConfig, Verdict};
/// use partscan_zones::mbr;
///
/// struct Printer;
///
/// impl NestedScanner for Printer {
///     fn scan(&mut self, _: &mut dyn ByteSource, extent: Extent, kind: DeclaredKind) -> Result<Verdict> {
///         println!("{} {}", kind, extent);
///         Ok(Verdict::Clean)
///     }
/// }
///
/// impl DetectionSink for Printer {
///     fn report_potentially_unwanted(&mut self, label: &str) -> Result<Verdict> {
///         println!("detected {}", label);
///         Ok(Verdict::Clean)
///     }
/// }
///
/// fn inspect(source: &mut dyn ByteSource) -> Result<()> {
///     let mut scanner = Printer;
///     let mut sink = Printer;
///     let outcome = mbr::scan(source, &mut scanner, &mut sink, &ScanConfig::default())?;
///     println!("{:?}", outcome);
///     Ok(())
/// }
/// ```
pub fn scan(
    source: &mut dyn ByteSource,
    scanner: &mut dyn NestedScanner,
    sink: &mut dyn DetectionSink,
    config: &ScanConfig,
) -> Result<ScanOutcome> {
    walk(source, scanner, sink, config).map(|report| report.outcome)
}

/// Validate an MBR held in memory (512-byte sectors)
///
/// `buf` must contain at least the first sector; `maplen` is the length of
/// the whole image it came from.
pub fn check_buffer(buf: &[u8], maplen: u64) -> Result<MbrCheck> {
    let mbr = BootRecord::from_sector(buf, MBR_SECTOR_SIZE)?;
    if mbr.has_gpt_marker() {
        return Ok(MbrCheck::Gpt);
    }

    check_mbr(&mbr, maplen, MBR_SECTOR_SIZE)?;
    Ok(MbrCheck::Valid)
}

/// Validate the MBR of a backing store without walking it
///
/// A `sector_size` of 0 selects the default.
pub fn check_source(source: &mut dyn ByteSource, sector_size: u32) -> Result<MbrCheck> {
    let sector_size = ScanConfig::default()
        .with_sector_size(sector_size)
        .effective_sector_size()?;

    let maplen = source.length();
    check_alignment(maplen, sector_size)?;

    let mbr = BootRecord::read_sector(source, MBR_SECTOR, sector_size)?;
    if mbr.has_gpt_marker() {
        return Ok(MbrCheck::Gpt);
    }

    check_mbr(&mbr, maplen, sector_size)?;
    Ok(MbrCheck::Valid)
}

/// Scanner used for listing: accepts every region without reading it
struct ListingScanner;

impl NestedScanner for ListingScanner {
    fn scan(&mut self, _: &mut dyn ByteSource, _: Extent, _: DeclaredKind) -> Result<Verdict> {
        Ok(Verdict::Clean)
    }
}

impl DetectionSink for ListingScanner {
    fn report_potentially_unwanted(&mut self, _: &str) -> Result<Verdict> {
        Ok(Verdict::Clean)
    }
}

/// MBR partition table
///
/// The Master Boot Record is the traditional partitioning scheme used by BIOS-based systems.
/// It supports up to 4 primary partitions, or 3 primary partitions and 1 extended partition
/// whose EBR chain holds the logical partitions.
///
/// # Structure
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0x000   440   Bootstrap code
/// 0x1B8   4     Disk signature
/// 0x1BE   16    Partition entry 1
/// 0x1CE   16    Partition entry 2
/// 0x1DE   16    Partition entry 3
/// 0x1EE   16    Partition entry 4
/// 0x1FE   2     Boot signature (0xAA55)
/// ```
#[derive(Debug, Clone)]
pub struct MbrZoneTable {
    zones: Vec<Zone>,
    record: BootRecord,
    disk_signature: u32,
    gpt_protective: bool,
}

impl MbrZoneTable {
    /// Offset of the disk signature relative to the boot record
    const DISK_SIGNATURE_BACKOFF: u64 = 6;

    /// Parse an MBR and its EBR chain from a backing store
    ///
    /// Runs the same walk as [`scan`] without a content scanner, collecting
    /// primary and logical partitions in discovery order. The intersection
    /// heuristic is not run.
    ///
    /// # Errors
    ///
    /// Returns an error if the record or the chain is malformed.
    pub fn parse(source: &mut dyn ByteSource, config: &ScanConfig) -> Result<Self> {
        let config = config.clone().with_intersection_heuristic(false);
        let mut listing = ListingScanner;
        let mut sink = ListingScanner;
        let report = walk(source, &mut listing, &mut sink, &config)?;

        let sector_size = config.effective_sector_size()?;
        let signature_pos = BootRecord::base_offset(sector_size) - Self::DISK_SIGNATURE_BACKOFF;
        let mut raw = [0u8; 4];
        source.read_exact_at(signature_pos, &mut raw)?;

        let record = report
            .record
            .ok_or_else(|| Error::malformed_chain("walk produced no master boot record"))?;

        Ok(Self {
            zones: report.zones,
            record,
            disk_signature: u32::from_le_bytes(raw),
            gpt_protective: report.outcome == ScanOutcome::DeferToOtherFormat,
        })
    }

    /// Get the disk signature
    pub fn disk_signature(&self) -> u32 {
        self.disk_signature
    }

    /// Get the boot signature (should always be 0xAA55)
    pub fn boot_signature(&self) -> u16 {
        self.record.signature
    }

    /// Get the decoded master boot record
    pub fn record(&self) -> &BootRecord {
        &self.record
    }

    /// Check if this MBR is a GPT protective or hybrid MBR
    ///
    /// No zones are listed for such disks; GPT handling applies.
    pub fn is_gpt_protective(&self) -> bool {
        self.gpt_protective
    }
}

impl ZoneTable for MbrZoneTable {
    fn identify(&self) -> &str {
        "Master Boot Record"
    }

    fn enumerate_zones(&self) -> &[Zone] {
        &self.zones
    }
}
