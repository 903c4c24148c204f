use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Tokens and cost of one completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub cost: f64,
}

impl UsageRecord {
    pub fn now(provider: &str, model: &str, tokens_in: u32, tokens_out: u32, cost: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            provider: provider.to_string(),
            model: model.to_string(),
            tokens_in,
            tokens_out,
            cost,
        }
    }
}

/// Per-provider totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
    pub requests: u64,
}

/// Ring buffer of recent usage. The oldest record is evicted at capacity.
pub struct UsageLog {
    inner: Mutex<VecDeque<UsageRecord>>,
    capacity: usize,
}

impl UsageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, record: UsageRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut buf = self.inner.lock();
        if buf.len() >= self.capacity {
            buf.pop_front();
        }
        buf.push_back(record);
    }

    /// The `limit` most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<UsageRecord> {
        let buf = self.inner.lock();
        buf.iter().rev().take(limit).cloned().collect()
    }

    /// Totals per provider for records at or after `since`.
    pub fn summary_since(&self, since: DateTime<Utc>) -> BTreeMap<String, ProviderUsage> {
        let buf = self.inner.lock();
        let mut out: BTreeMap<String, ProviderUsage> = BTreeMap::new();
        for r in buf.iter().filter(|r| r.timestamp >= since) {
            let entry = out.entry(r.provider.clone()).or_default();
            entry.tokens_in += u64::from(r.tokens_in);
            entry.tokens_out += u64::from(r.tokens_out);
            entry.cost += r.cost;
            entry.requests += 1;
        }
        out
    }
}
