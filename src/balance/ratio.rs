//! Balance ratio and candidate ordering

use crate::node::{Channel, ChannelId};

/// Local balance as a rounded percentage of the channel's total balance.
///
/// Returns 0 for a channel with no balance on either side.
pub fn balance_ratio(local: u64, remote: u64) -> u8 {
    if local == 0 && remote == 0 {
        return 0;
    }
    percent(local, remote).round() as u8
}

/// Same as [`balance_ratio`] but keeps two decimals
pub fn balance_ratio_precise(local: u64, remote: u64) -> f64 {
    if local == 0 && remote == 0 {
        return 0.0;
    }
    (percent(local, remote) * 100.0).round() / 100.0
}

fn percent(local: u64, remote: u64) -> f64 {
    let local = local as f64;
    local / (local + remote as f64) * 100.0
}

/// Channels ordered by ascending balance ratio. Ties keep their input order.
pub fn outgoing_candidates(channels: &[Channel]) -> Vec<&Channel> {
    let mut ordered: Vec<&Channel> = channels.iter().collect();
    ordered.sort_by_key(|c| c.balance_ratio());
    ordered
}

/// Reverse of [`outgoing_candidates`], without the chosen outgoing channel
pub fn incoming_candidates<'a>(
    channels: &'a [Channel],
    outgoing: Option<&ChannelId>,
) -> Vec<&'a Channel> {
    let mut ordered = outgoing_candidates(channels);
    ordered.reverse();
    if let Some(outgoing) = outgoing {
        ordered.retain(|c| &c.id != outgoing);
    }
    ordered
}
