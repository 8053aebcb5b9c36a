use crate::Collector;
use anyhow::Result;
use chrono::{DateTime, Utc};
use pmon_common::types::{Sample, SampleCategory};
use std::collections::HashMap;
use sysinfo::Networks;

#[derive(Clone, Copy, Default)]
struct Counters {
    bytes_recv: u64,
    bytes_sent: u64,
    packets_recv: u64,
    packets_sent: u64,
}

/// Per-interface traffic since the previous collection. The first
/// collection of an interface reports zero.
pub struct NetworkCollector {
    networks: Networks,
    previous: HashMap<String, Counters>,
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            previous: HashMap::new(),
        }
    }
}

impl Default for NetworkCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for NetworkCollector {
    fn name(&self) -> &str {
        "network"
    }

    fn collect(&mut self, now: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.networks.refresh();
        let mut samples = Vec::new();

        for (interface, data) in self.networks.iter() {
            let current = Counters {
                bytes_recv: data.total_received(),
                bytes_sent: data.total_transmitted(),
                packets_recv: data.total_packets_received(),
                packets_sent: data.total_packets_transmitted(),
            };
            let prev = self.previous.insert(interface.clone(), current).unwrap_or(current);

            let sample = |name: &str, value: u64, unit: &str| {
                Sample::new(SampleCategory::Network, name, value as f64, unit)
                    .at(now)
                    .with_tag("interface", interface.as_str())
            };
            samples.push(sample(
                "network_bytes_recv",
                current.bytes_recv.saturating_sub(prev.bytes_recv),
                "bytes",
            ));
            samples.push(sample(
                "network_bytes_sent",
                current.bytes_sent.saturating_sub(prev.bytes_sent),
                "bytes",
            ));
            samples.push(sample(
                "network_packets_recv",
                current.packets_recv.saturating_sub(prev.packets_recv),
                "packets",
            ));
            samples.push(sample(
                "network_packets_sent",
                current.packets_sent.saturating_sub(prev.packets_sent),
                "packets",
            ));
        }

        Ok(samples)
    }
}
