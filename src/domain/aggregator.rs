//! Multi-timeframe bar buffers and bucketing.

use std::collections::BTreeMap;

use super::bar::Bar;

pub const DEFAULT_MAX_HISTORY: usize = 1000;

/// Per-timeframe, append-only bar buffers.
///
/// A bar is only appended when it is newer than the last buffered bar of the
/// same timeframe, so re-fetched overlapping windows are not duplicated.
#[derive(Debug, Clone)]
pub struct TimeframeAggregator {
    buffers: BTreeMap<u32, Vec<Bar>>,
    max_history: usize,
}

impl TimeframeAggregator {
    pub fn new(timeframes: &[u32]) -> Self {
        Self::with_max_history(timeframes, DEFAULT_MAX_HISTORY)
    }

    pub fn with_max_history(timeframes: &[u32], max_history: usize) -> Self {
        let buffers = timeframes
            .iter()
            .filter(|&&tf| tf > 0)
            .map(|&tf| (tf, Vec::new()))
            .collect();
        Self {
            buffers,
            max_history: max_history.max(1),
        }
    }

    /// Configured timeframes, ascending.
    pub fn timeframes(&self) -> Vec<u32> {
        self.buffers.keys().copied().collect()
    }

    pub fn base_timeframe(&self) -> Option<u32> {
        self.buffers.keys().next().copied()
    }

    /// Returns true when the bar was appended.
    pub fn add_bar(&mut self, bar: Bar) -> bool {
        let max_history = self.max_history;
        let Some(buffer) = self.buffers.get_mut(&bar.timeframe) else {
            return false;
        };
        if buffer
            .last()
            .is_some_and(|last| bar.timestamp <= last.timestamp)
        {
            return false;
        }
        buffer.push(bar);
        if buffer.len() > max_history {
            let excess = buffer.len() - max_history;
            buffer.drain(..excess);
        }
        true
    }

    /// Appends each bar in order; returns how many were new.
    pub fn extend<I: IntoIterator<Item = Bar>>(&mut self, bars: I) -> usize {
        let mut added = 0;
        for bar in bars {
            if self.add_bar(bar) {
                added += 1;
            }
        }
        added
    }

    /// Most recent `limit` bars for `timeframe`, oldest first.
    pub fn bars(&self, timeframe: u32, limit: usize) -> &[Bar] {
        match self.buffers.get(&timeframe) {
            Some(buffer) => &buffer[buffer.len().saturating_sub(limit)..],
            None => &[],
        }
    }

    pub fn len(&self, timeframe: u32) -> usize {
        self.buffers.get(&timeframe).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, timeframe: u32) -> bool {
        self.len(timeframe) == 0
    }

    /// Rebuild every configured timeframe above the base from a base window
    /// and append the completed buckets to their buffers.
    ///
    /// Buckets are aligned to period boundaries (epoch minutes divisible by
    /// the target timeframe), so a sliding window yields the same buckets
    /// every cycle.
    pub fn refresh_higher_timeframes(&mut self, base_bars: &[Bar]) {
        let Some(base_tf) = base_bars.first().map(|b| b.timeframe.max(1)) else {
            return;
        };
        let targets: Vec<u32> = self
            .buffers
            .keys()
            .copied()
            .filter(|&tf| tf / base_tf > 1)
            .collect();
        for tf in targets {
            let completed = aggregate_aligned(base_bars, base_tf, tf);
            self.extend(completed);
        }
    }
}

/// Bucket base bars by target period; only buckets holding every base bar
/// of the period are returned.
fn aggregate_aligned(base_bars: &[Bar], base_timeframe: u32, target_timeframe: u32) -> Vec<Bar> {
    let ratio = (target_timeframe / base_timeframe) as usize;
    let period_secs = i64::from(target_timeframe) * 60;
    base_bars
        .chunk_by(|a, b| {
            a.timestamp.timestamp().div_euclid(period_secs)
                == b.timestamp.timestamp().div_euclid(period_secs)
        })
        .filter(|group| group.len() == ratio)
        .map(|group| merge_group(group, target_timeframe))
        .collect()
}

/// Group `target_timeframe / base_timeframe` consecutive base bars into one bar.
///
/// A ratio of 1 or less returns the input unchanged; an incomplete trailing
/// group is dropped.
pub fn aggregate(base_bars: &[Bar], target_timeframe: u32) -> Vec<Bar> {
    let Some(first) = base_bars.first() else {
        return Vec::new();
    };
    let base_timeframe = first.timeframe.max(1);
    let ratio = (target_timeframe / base_timeframe) as usize;

    if ratio <= 1 {
        return base_bars.to_vec();
    }

    base_bars
        .chunks_exact(ratio)
        .map(|group| merge_group(group, target_timeframe))
        .collect()
}

fn merge_group(group: &[Bar], timeframe: u32) -> Bar {
    let first = &group[0];
    let last = &group[group.len() - 1];
    Bar {
        timestamp: first.timestamp,
        open: first.open,
        high: group.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max),
        low: group.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
        close: last.close,
        volume: group.iter().map(|b| b.volume).sum(),
        timeframe,
    }
}
