//! Partition intersection heuristic
//!
//! Overlapping partitions are a known trick for hiding content from tools
//! that trust the table. This pass only reports; it never stops the
//! dispatch walk on its own.

use super::types::{BootRecord, PartitionEntry, SlotKind};
use super::{Flow, Walk};
use partscan_core::{IntervalSet, Overlap, Result, WalkBudget};
use std::ops::ControlFlow;

/// Detection name reported for overlapping partitions
///
/// The spelling is the established signature name and must not change.
pub const PARTITION_INTERSECTION_LABEL: &str = "Heuristics.MBRPartitionnIntersect";

impl<'a> Walk<'a> {
    /// Report one intersection to the sink
    fn report_intersection(&mut self) -> Result<Flow> {
        self.summary.intersections_reported += 1;

        if self
            .sink
            .report_potentially_unwanted(PARTITION_INTERSECTION_LABEL)?
            .is_stop()
        {
            tracing::info!("Detection sink requested stop");
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Check the primary entries (and the first extended chain) for overlaps
    ///
    /// Coordinates are kept in sectors. The budget is shared with the
    /// dispatch walk that follows.
    pub(crate) fn check_primary_intersections(
        &mut self,
        mbr: &BootRecord,
        budget: &mut WalkBudget,
    ) -> Result<Flow> {
        let mut intervals = IntervalSet::new();
        let mut inserted = Vec::new();
        let mut followed_extended = false;

        for (index, entry) in mbr.entries.iter().enumerate() {
            if budget.is_exhausted() {
                break;
            }

            let kind = entry.kind();
            if kind == SlotKind::Empty {
                budget.charge();
                continue;
            }

            let overlap = intervals.insert_and_check(entry.first_lba as u64, entry.num_lba as u64);
            inserted.push(index);
            if let Overlap::Intersects(other) = overlap {
                tracing::debug!(
                    "Intersection between primary partitions {} and {}",
                    inserted[other],
                    index
                );
                if self.report_intersection()?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }

            if kind == SlotKind::Extended && !followed_extended {
                followed_extended = true;
                if self.check_logical_intersections(entry, budget)?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            } else {
                budget.charge();
            }
        }

        Ok(ControlFlow::Continue(()))
    }

    /// Check an EBR chain for records and logical partitions that overlap
    ///
    /// Only decodes; the dispatch walk does the validating. Coordinates are
    /// relative to the start of the extended partition.
    fn check_logical_intersections(
        &mut self,
        extended: &PartitionEntry,
        budget: &mut WalkBudget,
    ) -> Result<Flow> {
        let extended_lba = extended.first_lba as u64;
        let mut intervals = IntervalSet::new();
        let mut record_lba: u32 = 0;

        loop {
            let ebr = BootRecord::read_sector(
                &mut *self.source,
                extended_lba + record_lba as u64,
                self.sector_size,
            )?;
            budget.charge();

            // The record's own sector
            if let Overlap::Intersects(_) = intervals.insert_and_check(record_lba as u64, 1) {
                tracing::debug!("Logical boot record at relative sector {} overlaps", record_lba);
                if self.report_intersection()?.is_break() {
                    return Ok(ControlFlow::Break(()));
                }
            }

            let partition = &ebr.entries[0];
            if partition.kind() == SlotKind::Data {
                let start = record_lba as u64 + partition.first_lba as u64;
                if let Overlap::Intersects(_) =
                    intervals.insert_and_check(start, partition.num_lba as u64)
                {
                    tracing::debug!("Logical partition at relative sector {} overlaps", start);
                    if self.report_intersection()?.is_break() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
            }

            let link = &ebr.entries[1];
            if link.kind() != SlotKind::Extended {
                tracing::debug!("Second entry of logical boot record is not an extended link");
                break;
            }
            if link.first_lba == 0 || budget.is_exhausted() {
                break;
            }
            record_lba = link.first_lba;
        }

        Ok(ControlFlow::Continue(()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::mbr::scan;
    use crate::mbr::types::MbrPartitionType;
    use partscan_core::{Error, Extent, ScanConfig, ScanOutcome, Verdict};
    use partscan_pipeline::MemoryPipeline;

    fn heuristic() -> ScanConfig {
        ScanConfig::default().with_intersection_heuristic(true)
    }

    fn run(
        img: Vec<u8>,
        config: &ScanConfig,
        sink: &mut RecordingSink,
    ) -> (Result<ScanOutcome>, RecordingScanner) {
        let mut source = MemoryPipeline::new(img);
        let mut scanner = RecordingScanner::default();
        let outcome = scan(&mut source, &mut scanner, sink, config);
        (outcome, scanner)
    }

    #[test]
    fn test_overlapping_primaries_report_once() {
        let mut img = image(100);
        put_record(&mut img, 0, [data(1, 20), data(10, 20), empty(), empty()]);

        let mut sink = RecordingSink::default();
        let (outcome, scanner) = run(img, &heuristic(), &mut sink);
        let outcome = outcome.unwrap();

        assert_eq!(sink.reports, vec![PARTITION_INTERSECTION_LABEL.to_string()]);
        assert_eq!(outcome.summary().unwrap().intersections_reported, 1);
        // Reporting does not prevent dispatch
        assert_eq!(scanner.partitions().len(), 2);
    }

    #[test]
    fn test_disjoint_primaries_report_nothing() {
        let mut img = image(100);
        put_record(&mut img, 0, [data(1, 10), data(11, 10), data(21, 10), data(31, 69)]);

        let mut sink = RecordingSink::default();
        let (outcome, _) = run(img, &heuristic(), &mut sink);
        assert!(outcome.is_ok());
        assert!(sink.reports.is_empty());
    }

    #[test]
    fn test_heuristic_disabled_reports_nothing() {
        let mut img = image(100);
        put_record(&mut img, 0, [data(1, 20), data(10, 20), empty(), empty()]);

        let mut sink = RecordingSink::default();
        let (outcome, scanner) = run(img, &ScanConfig::default(), &mut sink);
        assert!(outcome.is_ok());
        assert!(sink.reports.is_empty());
        assert_eq!(scanner.partitions().len(), 2);
    }

    #[test]
    fn test_each_overlapping_insertion_reports() {
        let mut img = image(100);
        put_record(&mut img, 0, [data(1, 30), data(5, 10), data(20, 10), empty()]);

        let mut sink = RecordingSink::default();
        let (outcome, _) = run(img, &heuristic(), &mut sink);
        assert!(outcome.is_ok());
        assert_eq!(sink.reports.len(), 2);
    }

    #[test]
    fn test_extended_overlapping_primary() {
        let mut img = image(100);
        put_record(&mut img, 0, [data(1, 20), extended(15, 40), empty(), empty()]);
        put_record(&mut img, 15, [data(1, 10), empty(), empty(), empty()]);

        let mut sink = RecordingSink::default();
        let (outcome, scanner) = run(img, &heuristic(), &mut sink);
        assert!(outcome.is_ok());
        assert_eq!(sink.reports.len(), 1);
        assert_eq!(scanner.partitions().len(), 2);
    }

    #[test]
    fn test_logical_partition_overlapping_next_record() {
        let mut img = image(100);
        put_record(&mut img, 0, [extended(10, 50), empty(), empty(), empty()]);
        // Logical partition [11, 31) swallows the next EBR at sector 20
        put_record(&mut img, 10, [data(1, 20), extended(10, 10), empty(), empty()]);
        put_record(&mut img, 20, [data(1, 5), empty(), empty(), empty()]);

        let mut sink = RecordingSink::default();
        let (outcome, _) = run(img, &heuristic(), &mut sink);
        assert!(outcome.is_ok());
        // The second EBR overlaps the first partition, and so does its partition
        assert_eq!(sink.reports.len(), 2);
    }

    #[test]
    fn test_well_formed_chain_reports_nothing() {
        let mut img = image(100);
        put_record(&mut img, 0, [extended(10, 50), empty(), empty(), empty()]);
        put_record(&mut img, 10, [data(1, 10), extended(20, 15), empty(), empty()]);
        put_record(&mut img, 30, [data(1, 10), empty(), empty(), empty()]);

        let mut sink = RecordingSink::default();
        let (outcome, _) = run(img, &heuristic(), &mut sink);
        assert!(outcome.is_ok());
        assert!(sink.reports.is_empty());
    }

    #[test]
    fn test_sink_stop_aborts_before_dispatch() {
        let mut img = image(100);
        put_record(&mut img, 0, [data(1, 20), data(10, 20), empty(), empty()]);

        let mut sink = RecordingSink {
            verdict: Verdict::Stop,
            ..Default::default()
        };
        let (outcome, scanner) = run(img, &heuristic(), &mut sink);

        assert!(matches!(outcome.unwrap(), ScanOutcome::Stopped(_)));
        assert_eq!(sink.reports.len(), 1);
        // Only the bootstrap region went out
        assert_eq!(scanner.calls.len(), 1);
        assert!(scanner.partitions().is_empty());
    }

    #[test]
    fn test_sink_stop_inside_chain() {
        let mut img = image(100);
        put_record(&mut img, 0, [extended(10, 50), empty(), empty(), empty()]);
        // Logical partition [11, 31) swallows the next EBR at sector 20
        put_record(&mut img, 10, [data(1, 20), extended(10, 10), empty(), empty()]);
        put_record(&mut img, 20, [data(1, 5), empty(), empty(), empty()]);

        let mut sink = RecordingSink {
            verdict: Verdict::Stop,
            ..Default::default()
        };
        let (outcome, scanner) = run(img, &heuristic(), &mut sink);

        let outcome = outcome.unwrap();
        assert!(matches!(outcome, ScanOutcome::Stopped(_)));
        assert_eq!(outcome.summary().unwrap().intersections_reported, 1);
        assert_eq!(sink.reports.len(), 1);
        assert_eq!(scanner.calls.len(), 1);
        assert!(scanner.partitions().is_empty());
    }

    #[test]
    fn test_lba_extended_entry_is_followed() {
        let mut img = image(100);
        let extended_lba = PartitionEntry::new(MbrPartitionType::ExtendedLba, 10, 50);
        put_record(&mut img, 0, [extended_lba, empty(), empty(), empty()]);
        put_record(&mut img, 10, [data(1, 20), extended(10, 10), empty(), empty()]);
        put_record(&mut img, 20, [data(1, 5), empty(), empty(), empty()]);

        let mut sink = RecordingSink::default();
        let (outcome, scanner) = run(img, &heuristic(), &mut sink);
        assert!(outcome.is_ok());
        assert_eq!(sink.reports.len(), 2);
        assert_eq!(
            scanner.partitions(),
            vec![Extent::new(11 * 512, 20 * 512), Extent::new(21 * 512, 5 * 512)]
        );
    }

    #[test]
    fn test_unreadable_chain_is_short_read() {
        let mut img = image(100);
        put_record(&mut img, 0, [extended(10, 50), empty(), empty(), empty()]);
        put_record(&mut img, 10, [data(1, 10), extended(5000, 10), empty(), empty()]);

        let mut sink = RecordingSink::default();
        let (outcome, _) = run(img, &heuristic(), &mut sink);
        assert!(matches!(outcome, Err(Error::ShortRead { .. })));
    }

    #[test]
    fn test_heuristic_shares_budget() {
        let mut img = image(100);
        put_record(&mut img, 0, [data(1, 10), data(11, 10), data(21, 10), data(31, 10)]);

        let mut sink = RecordingSink::default();
        let config = heuristic().with_max_partitions(6);
        let (outcome, scanner) = run(img, &config, &mut sink);
        let outcome = outcome.unwrap();

        // Four charged by the heuristic, two left for dispatch
        assert_eq!(scanner.partitions().len(), 2);
        let summary = outcome.summary().unwrap();
        assert!(summary.budget_exhausted);
        assert_eq!(summary.partitions_examined, 6);
    }
}
