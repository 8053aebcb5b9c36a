use crate::{percent, Collector};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pmon_common::types::{Sample, SampleCategory, Tags};
use sysinfo::Disks;

pub struct DiskCollector {
    disks: Disks,
}

impl DiskCollector {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for DiskCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for DiskCollector {
    fn name(&self) -> &str {
        "disk"
    }

    fn collect(&mut self, now: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.disks.refresh();
        let mut samples = Vec::new();

        for disk in self.disks.iter() {
            let total = disk.total_space();
            if total == 0 {
                continue;
            }
            let free = disk.available_space();
            let used = total.saturating_sub(free);

            let mut tags = Tags::new();
            tags.insert("device".to_string(), disk.name().to_string_lossy().to_string());
            tags.insert(
                "mountpoint".to_string(),
                disk.mount_point().to_string_lossy().to_string(),
            );
            tags.insert("fstype".to_string(), disk.file_system().to_string_lossy().to_string());

            let sample = |name: &str, value: f64, unit: &str| {
                Sample::new(SampleCategory::Disk, name, value, unit)
                    .at(now)
                    .with_tags(&tags)
            };
            samples.push(sample("disk_total_bytes", total as f64, "bytes"));
            samples.push(sample("disk_used_bytes", used as f64, "bytes"));
            samples.push(sample("disk_free_bytes", free as f64, "bytes"));
            samples.push(sample(
                "disk_usage_percent",
                percent(used as f64, total as f64),
                "percent",
            ));
        }

        Ok(samples)
    }
}
