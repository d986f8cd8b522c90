//! Extended boot record chain walker
//!
//! An extended partition holds a linked list of EBRs. Each EBR describes at
//! most one logical partition (entry 0) and a link to the next EBR (entry 1);
//! entries 2 and 3 are reserved. Both addresses in an EBR are relative: the
//! data entry to the EBR itself, the link to the start of the extended
//! partition.
//!
//! Real-world tables do not always follow that layout, so the two used slots
//! are fed through [`ChainState::step`], which tolerates most orderings with
//! a warning and only rejects a record linking twice.

use super::types::{BootRecord, PartitionEntry, SlotKind};
use super::validate::check_ebr;
use super::{Flow, Walk};
use partscan_core::{Error, Extent, Result, WalkBudget};
use std::fmt;
use std::ops::ControlFlow;

/// Slots of an EBR that carry a logical partition or a link
pub const EBR_USED_ENTRIES: usize = 2;

/// What the walker has seen so far in the current EBR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    /// No slot processed yet
    Nothing,
    /// A data entry came first
    SawPartition,
    /// An extended (link) entry came first
    SawExtended,
    /// An empty entry came first
    SawEmpty,
}

/// Effect of a slot on the link to the next EBR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Keep,
    /// Forget any link seen so far
    Clear,
    /// Link to the slot's first LBA
    Follow,
}

/// Irregular slot orderings that are tolerated with a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainAnomaly {
    MultiplePartitions,
    WithoutPartition,
    ExtendedFirst,
    EmptyFirst,
}

impl fmt::Display for ChainAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MultiplePartitions => "logical boot record with multiple partitions",
            Self::WithoutPartition => "logical boot record without a partition record",
            Self::ExtendedFirst => "logical boot record with extended partition record first",
            Self::EmptyFirst => "logical boot record with empty partition record first",
        };
        f.write_str(text)
    }
}

/// One row of the slot transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: ChainState,
    pub link: LinkAction,
    pub anomaly: Option<ChainAnomaly>,
    /// The slot is a logical partition to dispatch
    pub dispatch: bool,
}

impl Transition {
    fn to(next: ChainState) -> Self {
        Self {
            next,
            link: LinkAction::Keep,
            anomaly: None,
            dispatch: false,
        }
    }

    fn link(mut self, link: LinkAction) -> Self {
        self.link = link;
        self
    }

    fn warn(mut self, anomaly: ChainAnomaly) -> Self {
        self.anomaly = Some(anomaly);
        self
    }

    fn dispatching(mut self) -> Self {
        self.dispatch = true;
        self
    }
}

impl ChainState {
    /// Apply one EBR slot to the state
    ///
    /// # Errors
    ///
    /// `MalformedChain` for a second extended slot after an extended slot.
    pub fn step(self, slot: SlotKind) -> Result<Transition> {
        use ChainAnomaly::*;
        use ChainState::*;

        let transition = match (self, slot) {
            (Nothing, SlotKind::Empty) => Transition::to(SawEmpty),
            (Nothing, SlotKind::Extended) => Transition::to(SawExtended).link(LinkAction::Follow),
            (Nothing, SlotKind::Data) => Transition::to(SawPartition).dispatching(),

            (SawPartition, SlotKind::Empty) => Transition::to(SawPartition).link(LinkAction::Clear),
            (SawPartition, SlotKind::Extended) => {
                Transition::to(SawPartition).link(LinkAction::Follow)
            }
            (SawPartition, SlotKind::Data) => Transition::to(SawPartition)
                .link(LinkAction::Clear)
                .warn(MultiplePartitions)
                .dispatching(),

            (SawExtended, SlotKind::Empty) => Transition::to(SawExtended).warn(WithoutPartition),
            (SawExtended, SlotKind::Extended) => {
                return Err(Error::malformed_chain(
                    "logical boot record with multiple extended partition records",
                ))
            }
            (SawExtended, SlotKind::Data) => {
                Transition::to(SawExtended).warn(ExtendedFirst).dispatching()
            }

            (SawEmpty, SlotKind::Empty) => Transition::to(SawEmpty)
                .link(LinkAction::Clear)
                .warn(WithoutPartition),
            (SawEmpty, SlotKind::Extended) => Transition::to(SawEmpty)
                .link(LinkAction::Follow)
                .warn(WithoutPartition),
            (SawEmpty, SlotKind::Data) => Transition::to(SawEmpty)
                .link(LinkAction::Clear)
                .warn(EmptyFirst)
                .dispatching(),
        };

        Ok(transition)
    }
}

/// Read and validate the EBR at `record_lba` within the extended partition
///
/// Any format problem with the record is reported as a broken chain. The
/// reserved slots are checked here too, so no slot of a rejected record is
/// ever dispatched.
fn read_ebr(
    walk: &mut Walk<'_>,
    extended_lba: u64,
    record_lba: u32,
) -> Result<BootRecord> {
    let sector_size = walk.sector_size;
    let sector = extended_lba + record_lba as u64;
    let as_chain_error = |e: Error| {
        if e.is_format_error() {
            Error::malformed_chain(format!("logical boot record at sector {}: {}", sector, e))
        } else {
            e
        }
    };

    let ebr = BootRecord::read_sector(&mut *walk.source, sector, sector_size).map_err(as_chain_error)?;
    check_ebr(&ebr).map_err(as_chain_error)?;

    for (index, entry) in ebr.entries.iter().enumerate().skip(EBR_USED_ENTRIES) {
        if entry.kind() != SlotKind::Empty {
            return Err(Error::malformed_chain(format!(
                "logical boot record at sector {} uses reserved entry {}",
                sector, index
            )));
        }
    }

    Ok(ebr)
}

impl<'a> Walk<'a> {
    /// Byte extent of a logical partition, bounded by its extended partition
    fn logical_extent(
        &self,
        entry: &PartitionEntry,
        extended_lba: u64,
        record_lba: u32,
        bounds: Extent,
    ) -> Result<Extent> {
        let first = extended_lba + record_lba as u64 + entry.first_lba as u64;
        let extent = Extent::from_sectors(first, entry.num_lba as u64, self.sector_size)?;

        let limit = bounds.end()?;
        if !extent.fits_within(bounds.offset, limit) {
            return Err(Error::extent_overflow(format!(
                "logical partition {} exceeds extended partition {}",
                extent, bounds
            )));
        }

        Ok(extent)
    }

    /// Walk the EBR chain of `extended`, dispatching every logical partition
    pub(crate) fn walk_chain(
        &mut self,
        extended: &PartitionEntry,
        budget: &mut WalkBudget,
    ) -> Result<Flow> {
        let extended_lba = extended.first_lba as u64;
        let bounds = extended.extent(self.sector_size)?;

        tracing::debug!(
            "Walking logical boot records of extended partition {} (sector {})",
            bounds,
            extended_lba
        );

        let mut record_lba: u32 = 0;
        loop {
            let ebr = read_ebr(self, extended_lba, record_lba)?;
            budget.charge();
            self.summary.logical_records += 1;

            let mut state = ChainState::Nothing;
            let mut next_lba: u32 = 0;
            let mut dispatched = false;

            for (index, entry) in ebr.entries.iter().take(EBR_USED_ENTRIES).enumerate() {
                tracing::debug!(
                    "EBR at sector {} entry {}: status 0x{:02X}, type {}, blocks [{}, +{})",
                    extended_lba + record_lba as u64,
                    index,
                    entry.status,
                    entry.partition_type,
                    entry.first_lba,
                    entry.num_lba
                );

                let transition = state.step(entry.kind())?;
                if let Some(anomaly) = transition.anomaly {
                    self.anomaly(format!(
                        "{} at sector {}",
                        anomaly,
                        extended_lba + record_lba as u64
                    ));
                }

                match transition.link {
                    LinkAction::Keep => {}
                    LinkAction::Clear => next_lba = 0,
                    LinkAction::Follow => next_lba = entry.first_lba,
                }
                state = transition.next;

                if transition.dispatch {
                    // A second partition in one record costs its own budget slot
                    if dispatched {
                        if budget.is_exhausted() {
                            tracing::debug!("Partition budget exhausted, skipping entry {}", index);
                            break;
                        }
                        budget.charge();
                    }
                    dispatched = true;

                    let extent = self.logical_extent(entry, extended_lba, record_lba, bounds)?;
                    if self.dispatch_partition(entry, extent, true)?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
            }

            if next_lba == 0 {
                break;
            }
            if budget.is_exhausted() {
                tracing::debug!("Partition budget exhausted inside the logical chain");
                break;
            }
            record_lba = next_lba;
        }

        Ok(ControlFlow::Continue(()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::mbr::scan;
    use partscan_core::{ScanConfig, ScanOutcome};
    use partscan_pipeline::MemoryPipeline;

    fn run(img: Vec<u8>, config: &ScanConfig) -> (Result<ScanOutcome>, RecordingScanner) {
        let mut source = MemoryPipeline::new(img);
        let mut scanner = RecordingScanner::default();
        let mut sink = RecordingSink::default();
        let outcome = scan(&mut source, &mut scanner, &mut sink, config);
        (outcome, scanner)
    }

    /// MBR with one extended partition at sectors [10, 60) of a 100-sector image
    fn extended_image() -> Vec<u8> {
        let mut img = image(100);
        put_record(&mut img, 0, [extended(10, 50), empty(), empty(), empty()]);
        img
    }

    #[test]
    fn test_transition_table() {
        use ChainState::*;

        let t = Nothing.step(SlotKind::Data).unwrap();
        assert_eq!((t.next, t.link, t.anomaly, t.dispatch), (SawPartition, LinkAction::Keep, None, true));

        let t = SawPartition.step(SlotKind::Extended).unwrap();
        assert_eq!((t.next, t.link, t.anomaly), (SawPartition, LinkAction::Follow, None));

        let t = SawPartition.step(SlotKind::Empty).unwrap();
        assert_eq!((t.next, t.link, t.dispatch), (SawPartition, LinkAction::Clear, false));

        let t = SawPartition.step(SlotKind::Data).unwrap();
        assert_eq!(t.anomaly, Some(ChainAnomaly::MultiplePartitions));
        assert_eq!(t.link, LinkAction::Clear);
        assert!(t.dispatch);

        let t = Nothing.step(SlotKind::Extended).unwrap();
        assert_eq!((t.next, t.link), (SawExtended, LinkAction::Follow));

        let t = SawExtended.step(SlotKind::Data).unwrap();
        assert_eq!((t.link, t.anomaly, t.dispatch), (LinkAction::Keep, Some(ChainAnomaly::ExtendedFirst), true));

        let t = SawExtended.step(SlotKind::Empty).unwrap();
        assert_eq!((t.link, t.anomaly), (LinkAction::Keep, Some(ChainAnomaly::WithoutPartition)));

        assert!(matches!(SawExtended.step(SlotKind::Extended), Err(Error::MalformedChain(_))));

        let t = Nothing.step(SlotKind::Empty).unwrap();
        assert_eq!((t.next, t.link, t.anomaly), (SawEmpty, LinkAction::Keep, None));

        let t = SawEmpty.step(SlotKind::Empty).unwrap();
        assert_eq!((t.link, t.anomaly), (LinkAction::Clear, Some(ChainAnomaly::WithoutPartition)));

        let t = SawEmpty.step(SlotKind::Extended).unwrap();
        assert_eq!((t.link, t.anomaly), (LinkAction::Follow, Some(ChainAnomaly::WithoutPartition)));

        let t = SawEmpty.step(SlotKind::Data).unwrap();
        assert_eq!((t.link, t.anomaly, t.dispatch), (LinkAction::Clear, Some(ChainAnomaly::EmptyFirst), true));
    }

    #[test]
    fn test_two_level_chain() {
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 10), extended(20, 15), empty(), empty()]);
        put_record(&mut img, 30, [data(1, 10), empty(), empty(), empty()]);

        let (outcome, scanner) = run(img, &ScanConfig::default());
        let outcome = outcome.unwrap();

        assert_eq!(
            scanner.partitions(),
            vec![Extent::new(11 * 512, 10 * 512), Extent::new(31 * 512, 10 * 512)]
        );
        let summary = outcome.summary().unwrap();
        assert_eq!(summary.logical_records, 2);
        assert!(summary.anomalies.is_empty());
        // Two EBRs plus three empty primary entries
        assert_eq!(summary.partitions_examined, 5);
    }

    #[test]
    fn test_link_before_partition_is_tolerated() {
        let mut img = extended_image();
        put_record(&mut img, 10, [extended(20, 15), data(1, 10), empty(), empty()]);
        put_record(&mut img, 30, [empty(), data(2, 5), empty(), empty()]);

        let (outcome, scanner) = run(img, &ScanConfig::default());
        let outcome = outcome.unwrap();

        // Data extents stay relative to the record that holds them
        assert_eq!(
            scanner.partitions(),
            vec![Extent::new(11 * 512, 10 * 512), Extent::new(32 * 512, 5 * 512)]
        );
        assert_eq!(outcome.summary().unwrap().anomalies.len(), 2);
    }

    #[test]
    fn test_double_link_is_fatal() {
        let mut img = extended_image();
        put_record(&mut img, 10, [extended(20, 15), extended(25, 15), empty(), empty()]);

        let (outcome, _) = run(img, &ScanConfig::default());
        assert!(matches!(outcome, Err(Error::MalformedChain(_))));
    }

    #[test]
    fn test_reserved_slots_must_be_empty() {
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 10), empty(), data(20, 5), empty()]);

        let (outcome, scanner) = run(img, &ScanConfig::default());
        assert!(matches!(outcome, Err(Error::MalformedChain(_))));
        assert!(scanner.partitions().is_empty());
    }

    #[test]
    fn test_bad_ebr_is_malformed_chain() {
        // No record at all where the chain should start
        let (outcome, _) = run(extended_image(), &ScanConfig::default());
        assert!(matches!(outcome, Err(Error::MalformedChain(_))));

        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 10).with_status(0x01), empty(), empty(), empty()]);
        let (outcome, _) = run(img, &ScanConfig::default());
        assert!(matches!(outcome, Err(Error::MalformedChain(_))));
    }

    #[test]
    fn test_link_past_image_is_malformed_chain() {
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 10), extended(5000, 10), empty(), empty()]);

        let (outcome, scanner) = run(img, &ScanConfig::default());
        assert!(matches!(outcome, Err(Error::MalformedChain(_))));
        assert_eq!(scanner.partitions().len(), 1);
    }

    #[test]
    fn test_logical_partition_must_fit_extended() {
        let mut img = extended_image();
        // Ends at sector 61, one past the extended partition
        put_record(&mut img, 10, [data(1, 50), empty(), empty(), empty()]);

        let (outcome, scanner) = run(img, &ScanConfig::default());
        assert!(matches!(outcome, Err(Error::ExtentOverflow(_))));
        assert!(scanner.partitions().is_empty());

        // Ending exactly at the boundary is fine
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 49), empty(), empty(), empty()]);
        let (outcome, scanner) = run(img, &ScanConfig::default());
        assert!(outcome.is_ok());
        assert_eq!(scanner.partitions(), vec![Extent::new(11 * 512, 49 * 512)]);
    }

    #[test]
    fn test_zero_length_logical_is_skipped() {
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 0), extended(20, 15), empty(), empty()]);
        put_record(&mut img, 30, [data(1, 10), empty(), empty(), empty()]);

        let (outcome, scanner) = run(img, &ScanConfig::default());
        assert_eq!(outcome.unwrap().summary().unwrap().logical_records, 2);
        assert_eq!(scanner.partitions(), vec![Extent::new(31 * 512, 10 * 512)]);
    }

    #[test]
    fn test_budget_stops_chain() {
        let mut img = image(200);
        put_record(&mut img, 0, [extended(10, 150), empty(), empty(), empty()]);
        // Ten EBRs, each holding one 2-sector logical partition
        for i in 0..10u32 {
            let record = 10 + (i as u64) * 10;
            let link = if i < 9 { extended((i + 1) * 10, 10) } else { empty() };
            put_record(&mut img, record, [data(1, 2), link, empty(), empty()]);
        }

        let config = ScanConfig::default().with_max_partitions(4);
        let (outcome, scanner) = run(img, &config);
        let outcome = outcome.unwrap();

        assert_eq!(scanner.partitions().len(), 4);
        let summary = outcome.summary().unwrap();
        assert!(summary.budget_exhausted);
        assert_eq!(summary.partitions_examined, 4);
        assert_eq!(summary.logical_records, 4);
    }

    #[test]
    fn test_self_link_is_bounded() {
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 5), extended(10, 1), empty(), empty()]);
        // Links back to itself forever
        put_record(&mut img, 20, [data(1, 5), extended(10, 1), empty(), empty()]);

        let config = ScanConfig::default().with_max_partitions(7);
        let (outcome, scanner) = run(img, &config);
        let outcome = outcome.unwrap();

        assert!(outcome.summary().unwrap().budget_exhausted);
        assert_eq!(scanner.partitions().len(), 7);
    }

    #[test]
    fn test_second_partition_in_record_respects_budget() {
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 5), data(10, 5), empty(), empty()]);

        let config = ScanConfig::default().with_max_partitions(1);
        let (outcome, scanner) = run(img, &config);
        let outcome = outcome.unwrap();

        assert_eq!(scanner.partitions(), vec![Extent::new(11 * 512, 5 * 512)]);
        let summary = outcome.summary().unwrap();
        assert!(summary.budget_exhausted);
        assert_eq!(summary.partitions_examined, 1);
    }

    #[test]
    fn test_second_partition_in_record_is_charged() {
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 5), data(10, 5), empty(), empty()]);

        let (outcome, scanner) = run(img, &ScanConfig::default());
        let outcome = outcome.unwrap();

        assert_eq!(
            scanner.partitions(),
            vec![Extent::new(11 * 512, 5 * 512), Extent::new(20 * 512, 5 * 512)]
        );
        let summary = outcome.summary().unwrap();
        // One record, one extra partition, three empty primary entries
        assert_eq!(summary.partitions_examined, 5);
        assert_eq!(summary.anomalies.len(), 1);
    }

    #[test]
    fn test_scanner_stop_inside_chain() {
        let mut img = extended_image();
        put_record(&mut img, 10, [data(1, 10), extended(20, 15), empty(), empty()]);
        put_record(&mut img, 30, [data(1, 10), empty(), empty(), empty()]);

        let mut source = MemoryPipeline::new(img);
        let mut scanner = RecordingScanner {
            stop_after: Some(2),
            ..Default::default()
        };
        let mut sink = RecordingSink::default();
        let outcome = scan(&mut source, &mut scanner, &mut sink, &ScanConfig::default()).unwrap();

        assert!(matches!(outcome, ScanOutcome::Stopped(_)));
        assert_eq!(scanner.partitions().len(), 1);
    }
}
