// SPDX-License-Identifier: GPL-3.0-only

//! Unallocated region derivation for partitioned disks
//!
//! Walks the partitions of one disk in offset order and reports the gaps
//! inside the disklabel's usable range. Gaps inside an extended partition
//! are reported separately as logical regions.

use serde::{Deserialize, Serialize};

use crate::device::PartitionType;

/// Partition start alignment (1 MiB), standard for modern disks
pub const ALIGNMENT_BYTES: u64 = 1024 * 1024;

/// Smallest gap reported as usable free space
pub const MIN_REGION_BYTES: u64 = 1024 * 1024;

/// A byte range representing a contiguous region
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    /// Start byte (inclusive)
    pub start: u64,

    /// End byte (exclusive)
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Clamp this range to fit within a disk of the given size
    pub fn clamp_to_disk(&self, disk_size: u64) -> Self {
        let start = self.start.min(disk_size);
        let end = self.end.min(disk_size);
        Self { start, end }
    }

    /// Get the size of this range in bytes
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// Position of one partition on its disk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionExtent {
    pub start: u64,
    pub size: u64,
    pub partition_type: PartitionType,
}

impl PartitionExtent {
    fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }
}

/// An unallocated, aligned region
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreeRegion {
    pub start: u64,
    pub size: u64,
    /// Region lies inside the extended partition
    pub logical: bool,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

fn push_gap(regions: &mut Vec<FreeRegion>, gap_start: u64, gap_end: u64, logical: bool) {
    if gap_end <= gap_start {
        return;
    }

    let aligned_start = align_up(gap_start, ALIGNMENT_BYTES);
    if aligned_start >= gap_end {
        return;
    }

    let size = gap_end - aligned_start;
    if size < MIN_REGION_BYTES {
        return;
    }

    regions.push(FreeRegion {
        start: aligned_start,
        size,
        logical,
    });
}

fn gaps_within(range: ByteRange, extents: &[PartitionExtent], logical: bool) -> Vec<FreeRegion> {
    let mut regions = Vec::new();
    let mut current = range.start;

    for extent in extents {
        if extent.size == 0 || extent.start >= range.end {
            continue;
        }
        if extent.start > current {
            push_gap(&mut regions, current, extent.start.min(range.end), logical);
        }
        // Overlapping extents never move the cursor backwards
        current = current.max(extent.end());
    }

    if current < range.end {
        push_gap(&mut regions, current, range.end, logical);
    }

    regions
}

/// Compute free regions of one labeled disk, ordered by start offset
pub fn compute_free_regions(
    disk_size: u64,
    usable: ByteRange,
    partitions: &[PartitionExtent],
) -> Vec<FreeRegion> {
    let usable = usable.clamp_to_disk(disk_size);
    if usable.size() == 0 {
        return Vec::new();
    }

    let mut top_level: Vec<PartitionExtent> = partitions
        .iter()
        .filter(|p| p.partition_type != PartitionType::Logical)
        .copied()
        .collect();
    top_level.sort_by_key(|p| p.start);

    let mut regions = gaps_within(usable, &top_level, false);

    if let Some(extended) = top_level
        .iter()
        .find(|p| p.partition_type == PartitionType::Extended)
    {
        let mut logical: Vec<PartitionExtent> = partitions
            .iter()
            .filter(|p| p.partition_type == PartitionType::Logical)
            .copied()
            .collect();
        logical.sort_by_key(|p| p.start);

        let range = ByteRange::new(extended.start, extended.end().min(usable.end));
        regions.extend(gaps_within(range, &logical, true));
    }

    regions.sort_by_key(|r| r.start);
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn extent(start_mib: u64, size_mib: u64, partition_type: PartitionType) -> PartitionExtent {
        PartitionExtent {
            start: start_mib * MIB,
            size: size_mib * MIB,
            partition_type,
        }
    }

    #[test]
    fn empty_label_is_one_region() {
        let regions = compute_free_regions(100 * MIB, ByteRange::new(MIB, 100 * MIB), &[]);
        assert_eq!(
            regions,
            vec![FreeRegion {
                start: MIB,
                size: 99 * MIB,
                logical: false
            }]
        );
    }

    #[test]
    fn gaps_between_partitions_are_reported_in_order() {
        let partitions = [
            extent(50, 10, PartitionType::Primary),
            extent(1, 20, PartitionType::Primary),
        ];
        let regions = compute_free_regions(100 * MIB, ByteRange::new(MIB, 100 * MIB), &partitions);

        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].start, 21 * MIB);
        assert_eq!(regions[0].size, 29 * MIB);
        assert_eq!(regions[1].start, 60 * MIB);
        assert_eq!(regions[1].size, 40 * MIB);
    }

    #[test]
    fn tiny_unaligned_gaps_are_dropped() {
        let partitions = [
            PartitionExtent {
                start: MIB,
                size: 10 * MIB + 512,
                partition_type: PartitionType::Primary,
            },
            extent(12, 88, PartitionType::Primary),
        ];
        let regions = compute_free_regions(100 * MIB, ByteRange::new(MIB, 100 * MIB), &partitions);

        // 11 MiB + 512 aligns up to 12 MiB, which leaves nothing
        assert!(regions.is_empty());
    }

    #[test]
    fn logical_regions_come_from_extended_partition() {
        let partitions = [
            extent(1, 10, PartitionType::Primary),
            extent(11, 50, PartitionType::Extended),
            extent(12, 10, PartitionType::Logical),
        ];
        let regions = compute_free_regions(100 * MIB, ByteRange::new(MIB, 100 * MIB), &partitions);

        let logical: Vec<_> = regions.iter().filter(|r| r.logical).collect();
        let primary: Vec<_> = regions.iter().filter(|r| !r.logical).collect();

        assert_eq!(logical.len(), 2);
        assert_eq!(logical[0].start, 11 * MIB);
        assert_eq!(logical[0].size, MIB);
        assert_eq!(logical[1].start, 22 * MIB);
        assert_eq!(logical[1].size, 39 * MIB);
        assert_eq!(primary.len(), 1);
        assert_eq!(primary[0].start, 61 * MIB);
    }

    #[test]
    fn usable_range_is_clamped_to_disk() {
        let regions = compute_free_regions(10 * MIB, ByteRange::new(MIB, 100 * MIB), &[]);
        assert_eq!(regions[0].size, 9 * MIB);
    }
}
