//! Channel selection by criteria.

use crate::info::{ChannelKind, RecordingInfo};

/// Indices of the named channels, in recording order.
///
/// Names absent from the recording are ignored.
pub fn pick_channels(info: &RecordingInfo, names: &[&str]) -> Vec<usize> {
    info.chs
        .iter()
        .enumerate()
        .filter(|(_, ch)| names.contains(&ch.name.as_str()))
        .map(|(i, _)| i)
        .collect()
}

/// Indices of channels matching the given kinds, in recording order.
///
/// `include` adds channels by name regardless of kind; `exclude` removes
/// by name and wins over everything else.
pub fn pick_types(
    info: &RecordingInfo,
    kinds: &[ChannelKind],
    include: &[&str],
    exclude: &[&str],
) -> Vec<usize> {
    info.chs
        .iter()
        .enumerate()
        .filter(|(_, ch)| {
            if exclude.contains(&ch.name.as_str()) {
                return false;
            }
            kinds.contains(&ch.kind) || include.contains(&ch.name.as_str())
        })
        .map(|(i, _)| i)
        .collect()
}
