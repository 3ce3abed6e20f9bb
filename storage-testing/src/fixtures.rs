// SPDX-License-Identifier: GPL-3.0-only

//! Device graph fixtures
//!
//! Builders for the device lists the backend would report. Partitions are
//! laid out back to back from the first usable byte of their disk, logical
//! partitions from one MiB into the extended partition.

use storage_types::{
    ByteRange, Device, DeviceId, DeviceKind, DiskLabelType, Format, PartitionType, Size,
};

const MIB: u64 = Size::MIB;

/// Partitioned disk under construction
#[derive(Debug, Clone)]
pub struct DiskBuilder {
    disk: Device,
    partitions: Vec<Device>,
    cursor: u64,
    logical_cursor: Option<u64>,
}

impl DiskBuilder {
    /// MBR disk, usable from 1 MiB to the end, four primary slots
    pub fn msdos(name: &str, size: Size) -> Self {
        Self::labeled(name, size, DiskLabelType::Msdos, size.bytes(), 4)
    }

    /// GPT disk, the last MiB holds the backup header
    pub fn gpt(name: &str, size: Size) -> Self {
        let end = size.bytes().saturating_sub(MIB);
        Self::labeled(name, size, DiskLabelType::Gpt, end, 128)
    }

    fn labeled(name: &str, size: Size, label_type: DiskLabelType, end: u64, max_primary: u32) -> Self {
        let mut disk = empty_disk(name, size);
        disk.format = Some(Format::DiskLabel {
            label_type,
            usable: ByteRange::new(MIB, end),
            max_primary,
        });

        Self {
            disk,
            partitions: Vec::new(),
            cursor: MIB,
            logical_cursor: None,
        }
    }

    pub fn removable(mut self) -> Self {
        self.disk.kind = DeviceKind::Disk { removable: true };
        self
    }

    pub fn primary(self, name: &str, size: Size) -> Self {
        self.top_level(name, size, PartitionType::Primary)
    }

    pub fn extended(mut self, name: &str, size: Size) -> Self {
        self.logical_cursor = Some(self.cursor + MIB);
        self.top_level(name, size, PartitionType::Extended)
    }

    /// Logical partition inside the extended one; needs [`Self::extended`] first
    pub fn logical(mut self, name: &str, size: Size) -> Self {
        let start = self.logical_cursor.unwrap_or(self.cursor);
        self.logical_cursor = Some(start + size.bytes() + MIB);
        self.push(name, size, PartitionType::Logical, start);
        self
    }

    /// Put `format` on the partition added last
    pub fn format_last(mut self, format: Format) -> Self {
        if let Some(last) = self.partitions.last_mut() {
            last.format = Some(format);
        }
        self
    }

    fn top_level(mut self, name: &str, size: Size, partition_type: PartitionType) -> Self {
        let start = self.cursor;
        self.cursor += size.bytes();
        self.push(name, size, partition_type, start);
        self
    }

    fn push(&mut self, name: &str, size: Size, partition_type: PartitionType, start: u64) {
        self.partitions.push(Device {
            id: DeviceId::new(name),
            name: name.to_string(),
            kind: DeviceKind::Partition {
                partition_type,
                start,
            },
            size,
            format: None,
            parents: vec![self.disk.id.clone()],
        });
    }

    /// Disk first, then its partitions in creation order
    pub fn build(self) -> Vec<Device> {
        let mut devices = Vec::with_capacity(self.partitions.len() + 1);
        devices.push(self.disk);
        devices.extend(self.partitions);
        devices
    }
}

/// Disk without any format
pub fn empty_disk(name: &str, size: Size) -> Device {
    Device {
        id: DeviceId::new(name),
        name: name.to_string(),
        kind: DeviceKind::Disk { removable: false },
        size,
        format: None,
        parents: Vec::new(),
    }
}

pub fn pv_format(pv_free: Size, vg: Option<&str>) -> Format {
    Format::LvmPv {
        pv_free,
        vg: vg.map(DeviceId::new),
    }
}

pub fn filesystem(fs: &str, mountpoint: Option<&str>) -> Format {
    Format::Filesystem {
        fs_type: fs.to_string(),
        label: None,
        mountpoint: mountpoint.map(str::to_string),
    }
}

/// Complete volume group with 4 MiB extents
pub fn volume_group(name: &str, pvs: &[&str], size: Size, free: Size) -> Device {
    Device {
        id: DeviceId::new(name),
        name: name.to_string(),
        kind: DeviceKind::LvmVg {
            pe_size: Size::from_mib(4),
            free,
            complete: true,
        },
        size,
        format: None,
        parents: pvs.iter().map(|pv| DeviceId::new(*pv)).collect(),
    }
}

/// Logical volume named `{vg}-{name}`
pub fn logical_volume(vg: &str, name: &str, size: Size, format: Option<Format>) -> Device {
    let full = format!("{vg}-{name}");
    Device {
        id: DeviceId::new(full.as_str()),
        name: full,
        kind: DeviceKind::LvmLv,
        size,
        format,
        parents: vec![DeviceId::new(vg)],
    }
}

pub fn thin_pool(vg: &str, name: &str, size: Size, free: Size) -> Device {
    let full = format!("{vg}-{name}");
    Device {
        id: DeviceId::new(full.as_str()),
        name: full,
        kind: DeviceKind::LvmThinPool { free },
        size,
        format: None,
        parents: vec![DeviceId::new(vg)],
    }
}

/// Btrfs volume spanning `members`
pub fn btrfs_volume(name: &str, members: &[&str], size: Size) -> Device {
    Device {
        id: DeviceId::new(name),
        name: name.to_string(),
        kind: DeviceKind::BtrfsVolume,
        size,
        format: Some(filesystem("btrfs", None)),
        parents: members.iter().map(|m| DeviceId::new(*m)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_are_laid_out_back_to_back() {
        let devices = DiskBuilder::msdos("sda", Size::from_gib(10))
            .primary("sda1", Size::from_gib(1))
            .extended("sda2", Size::from_gib(4))
            .logical("sda5", Size::from_gib(1))
            .logical("sda6", Size::from_gib(1))
            .build();

        let starts: Vec<(String, u64)> = devices
            .iter()
            .filter_map(|d| match d.kind {
                DeviceKind::Partition { start, .. } => Some((d.name.clone(), start)),
                _ => None,
            })
            .collect();

        assert_eq!(
            starts,
            vec![
                ("sda1".to_string(), MIB),
                ("sda2".to_string(), MIB + Size::GIB),
                ("sda5".to_string(), 2 * MIB + Size::GIB),
                ("sda6".to_string(), 3 * MIB + 2 * Size::GIB),
            ]
        );
    }

    #[test]
    fn gpt_reserves_backup_header() {
        let devices = DiskBuilder::gpt("nvme0n1", Size::from_gib(1)).build();
        let (label, usable, max_primary) = devices[0].disk_label().expect("label");
        assert_eq!(label, &DiskLabelType::Gpt);
        assert_eq!(usable, ByteRange::new(MIB, Size::GIB - MIB));
        assert_eq!(max_primary, 128);
    }

    #[test]
    fn format_last_targets_latest_partition() {
        let devices = DiskBuilder::msdos("sda", Size::from_gib(2))
            .primary("sda1", Size::from_mib(512))
            .primary("sda2", Size::from_mib(512))
            .format_last(pv_format(Size::from_mib(508), Some("vg")))
            .build();
        assert_eq!(devices[1].format, None);
        assert!(devices[2].is_pv());
        assert_eq!(devices[2].pv_vg(), Some(&DeviceId::new("vg")));
    }
}
