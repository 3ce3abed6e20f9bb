// SPDX-License-Identifier: GPL-3.0-only

//! TOML scenarios
//!
//! A scenario names a set of disks with their partitions and volume groups,
//! plus what the backend reports as supported. [`Scenario::backend`] turns
//! it into a seeded [`ScriptedBackend`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use storage_types::{Device, DiskLabelType, Format, Size};

use crate::errors::{Result, TestingError};
use crate::fixtures::{self, DiskBuilder};
use crate::scripted::ScriptedBackend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub filesystems: Option<Vec<String>>,
    #[serde(default)]
    pub mountpoints: Vec<String>,
    pub disks: Vec<DiskSpec>,
    #[serde(default)]
    pub volume_groups: Vec<VolumeGroupSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSpec {
    pub name: String,
    pub size_mib: u64,
    /// "msdos", "gpt" or absent for an empty disk
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub partitions: Vec<PartitionSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub name: String,
    pub size_mib: u64,
    #[serde(default = "default_partition_type")]
    pub r#type: String,
    #[serde(default)]
    pub fs: Option<String>,
    #[serde(default)]
    pub mountpoint: Option<String>,
    /// Volume group this partition is a PV of
    #[serde(default)]
    pub pv_of: Option<String>,
    #[serde(default)]
    pub pv_free_mib: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeGroupSpec {
    pub name: String,
    pub size_mib: u64,
    pub free_mib: u64,
}

fn default_partition_type() -> String {
    "primary".to_string()
}

pub fn scenarios_root() -> PathBuf {
    if let Ok(value) = std::env::var("STORAGE_TESTING_SCENARIOS") {
        return PathBuf::from(value);
    }
    Path::new(env!("CARGO_MANIFEST_DIR")).join("resources/scenarios")
}

impl Scenario {
    pub fn load_by_name(name: &str) -> Result<Self> {
        let path = scenarios_root().join(format!("{name}.toml"));
        if !path.exists() {
            return Err(TestingError::ScenarioNotFound {
                name: name.to_string(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|error| TestingError::ScenarioIo {
            path: path.clone(),
            reason: error.to_string(),
        })?;
        Self::parse(name, &raw)
    }

    pub fn parse(name: &str, raw: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(raw).map_err(|error| TestingError::ScenarioInvalid {
            name: name.to_string(),
            reason: error.to_string(),
        })?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn invalid(&self, reason: impl Into<String>) -> TestingError {
        TestingError::ScenarioInvalid {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TestingError::ScenarioInvalid {
                name: "<unknown>".to_string(),
                reason: "name must not be empty".to_string(),
            });
        }

        if self.disks.is_empty() {
            return Err(self.invalid("disks must not be empty"));
        }

        for disk in &self.disks {
            if let Some(label) = &disk.label
                && label != "msdos"
                && label != "gpt"
            {
                return Err(self.invalid(format!("disk {}: label must be 'msdos' or 'gpt'", disk.name)));
            }
            if disk.label.is_none() && !disk.partitions.is_empty() {
                return Err(self.invalid(format!("disk {}: partitions need a label", disk.name)));
            }

            let used: u64 = disk
                .partitions
                .iter()
                .filter(|p| p.r#type != "logical")
                .map(|p| p.size_mib)
                .sum();
            if used + 1 > disk.size_mib {
                return Err(self.invalid(format!("disk {}: partitions exceed disk size", disk.name)));
            }

            for partition in &disk.partitions {
                if !matches!(partition.r#type.as_str(), "primary" | "extended" | "logical") {
                    return Err(self.invalid(format!(
                        "partition {}: unknown type '{}'",
                        partition.name, partition.r#type
                    )));
                }
                if let Some(vg) = &partition.pv_of
                    && !self.volume_groups.iter().any(|g| &g.name == vg)
                {
                    return Err(self.invalid(format!(
                        "partition {}: unknown volume group '{vg}'",
                        partition.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Device list in backend order: disks with their partitions, then VGs
    pub fn devices(&self) -> Vec<Device> {
        let mut devices = Vec::new();

        for disk in &self.disks {
            let size = Size::from_mib(disk.size_mib);
            let mut builder = match disk.label.as_deref() {
                Some("gpt") => DiskBuilder::gpt(&disk.name, size),
                Some(_) => DiskBuilder::msdos(&disk.name, size),
                None => {
                    devices.push(fixtures::empty_disk(&disk.name, size));
                    continue;
                }
            };

            for partition in &disk.partitions {
                let size = Size::from_mib(partition.size_mib);
                builder = match partition.r#type.as_str() {
                    "extended" => builder.extended(&partition.name, size),
                    "logical" => builder.logical(&partition.name, size),
                    _ => builder.primary(&partition.name, size),
                };
                if let Some(format) = partition.format() {
                    builder = builder.format_last(format);
                }
            }

            devices.extend(builder.build());
        }

        for vg in &self.volume_groups {
            let pvs: Vec<&str> = self
                .disks
                .iter()
                .flat_map(|d| &d.partitions)
                .filter(|p| p.pv_of.as_deref() == Some(vg.name.as_str()))
                .map(|p| p.name.as_str())
                .collect();
            devices.push(fixtures::volume_group(
                &vg.name,
                &pvs,
                Size::from_mib(vg.size_mib),
                Size::from_mib(vg.free_mib),
            ));
        }

        devices
    }

    /// Backend seeded with this scenario
    pub fn backend(&self) -> ScriptedBackend {
        let backend = ScriptedBackend::new();
        backend.set_devices(self.devices());
        backend.set_mountpoints(self.mountpoints.iter().cloned());
        if let Some(filesystems) = &self.filesystems {
            backend.set_filesystems(filesystems.iter().cloned());
        }
        backend.set_disklabels(vec![DiskLabelType::Msdos, DiskLabelType::Gpt]);
        backend
    }
}

impl PartitionSpec {
    fn format(&self) -> Option<Format> {
        if let Some(vg) = &self.pv_of {
            return Some(fixtures::pv_format(Size::from_mib(self.pv_free_mib), Some(vg)));
        }
        self.fs
            .as_deref()
            .map(|fs| fixtures::filesystem(fs, self.mountpoint.as_deref()))
    }
}
