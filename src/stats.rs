use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

#[derive(Clone, Debug, PartialEq)]
pub enum NetReading {
    Totals { sent_kib: u64, recv_kib: u64 },
    Rate { kbps: u64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatsSnapshot {
    pub cpu_percent: u32,
    pub mem_percent: u32,
    pub net:         NetReading,
}
impl StatsSnapshot {
    /// Placeholder readings derived from the wall clock, for hosts without a stats provider.
    pub fn synthetic(now: DateTime<Local>) -> Self {
        let t = now.timestamp().max(0) as u64;
        Self {
            cpu_percent: 30 + (t % 40) as u32,
            mem_percent: 48 + (t % 30) as u32,
            net:         NetReading::Rate { kbps: t % 120 },
        }
    }
    pub fn cpu_label(&self) -> String { format!("CPU: {}%", self.cpu_percent) }
    pub fn mem_label(&self) -> String { format!("RAM: {}%", self.mem_percent) }
    pub fn net_label(&self) -> String {
        match self.net {
            NetReading::Totals { sent_kib, recv_kib } => format!("NET: {sent_kib}k / {recv_kib}k"),
            NetReading::Rate { kbps }                 => format!("NET: {kbps} kb/s"),
        }
    }
}

pub enum StatsProvider {
    #[cfg(feature = "host-stats")]
    Live { sys: sysinfo::System, networks: sysinfo::Networks },
    Synthetic,
}
impl StatsProvider {
    /// Chosen once at startup.
    pub fn detect() -> Self {
        #[cfg(feature = "host-stats")]
        {
            if sysinfo::IS_SUPPORTED_SYSTEM {
                log::info!("host stats: sysinfo");
                let mut sys = sysinfo::System::new();
                sys.refresh_cpu();
                return Self::Live { sys, networks: sysinfo::Networks::new_with_refreshed_list() };
            }
        }
        log::info!("host stats: synthetic placeholders");
        Self::Synthetic
    }

    pub fn is_live(&self) -> bool { !matches!(self, Self::Synthetic) }

    pub fn sample(&mut self, now: DateTime<Local>) -> StatsSnapshot {
        match self {
            #[cfg(feature = "host-stats")]
            Self::Live { sys, networks } => {
                sys.refresh_cpu();
                sys.refresh_memory();
                networks.refresh();
                let total = sys.total_memory();
                let mem = if total == 0 { 0 } else { (sys.used_memory() * 100 / total) as u32 };
                let (sent, recv) = networks.iter().fold((0u64, 0u64), |(s, r), (_, data)| {
                    (s + data.total_transmitted(), r + data.total_received())
                });
                StatsSnapshot {
                    cpu_percent: sys.global_cpu_info().cpu_usage() as u32,
                    mem_percent: mem,
                    net:         NetReading::Totals { sent_kib: sent / 1024, recv_kib: recv / 1024 },
                }
            }
            Self::Synthetic => StatsSnapshot::synthetic(now),
        }
    }
}

pub struct StatsSidebar {
    provider: StatsProvider,
    interval: Duration,
    last:     Option<Instant>,
    snapshot: Option<StatsSnapshot>,
}
impl StatsSidebar {
    pub fn new(provider: StatsProvider, interval: Duration) -> Self {
        Self { provider, interval, last: None, snapshot: None }
    }

    /// Samples when the poll interval has elapsed. Returns whether the labels changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.last.is_some_and(|t| now.saturating_duration_since(t) < self.interval) {
            return false;
        }
        self.last = Some(now);
        let next = self.provider.sample(Local::now());
        let changed = self.snapshot.as_ref() != Some(&next);
        self.snapshot = Some(next);
        changed
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Option<&StatsSnapshot> { self.snapshot.as_ref() }
    pub fn is_live(&self) -> bool { self.provider.is_live() }

    pub fn labels(&self) -> [String; 3] {
        match &self.snapshot {
            Some(s) => [s.cpu_label(), s.mem_label(), s.net_label()],
            None    => ["CPU: --%".into(), "RAM: --%".into(), "NET: -- kb/s".into()],
        }
    }
}
