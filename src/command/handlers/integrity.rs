//! Lead integrity test handler

use summit_shared::device_connected;

use super::{error_message, HandlerContext};
use crate::command::CommandResult;
use crate::manager::LeadPair;

const CONTACTS: u8 = 16;
const CONTACTS_PER_LEAD: u8 = 4;

/// Every pair of contacts on the same lead
fn lead_pairs() -> Vec<LeadPair> {
    let mut pairs = Vec::new();
    for lead in (0..CONTACTS).step_by(CONTACTS_PER_LEAD as usize) {
        for a in lead..lead + CONTACTS_PER_LEAD {
            for b in a + 1..lead + CONTACTS_PER_LEAD {
                pairs.push(LeadPair(a, b));
            }
        }
    }
    pairs
}

/// Handle INTEGRITY_TEST
///
/// A passing test leaves the pair alone; any failure is a device failure.
pub async fn handle_integrity_test(ctx: &HandlerContext<'_>) -> CommandResult {
    if !device_connected(ctx.state) {
        return ctx.reject("integrity test", "device-connected");
    }

    let leads = lead_pairs();
    match ctx
        .manager
        .integrity_test(ctx.state.name.as_str(), &leads)
        .await
    {
        Ok(ack) => match error_message(&ack.error) {
            Some(message) => ctx.device_failure(message),
            None => CommandResult::Completed {
                message: format!("{} lead pairs tested", leads.len()),
                events: vec![],
            },
        },
        Err(e) => ctx.device_failure(format!("{e:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_pairs_stay_within_a_lead() {
        let pairs = lead_pairs();
        assert_eq!(pairs.len(), 24);
        assert_eq!(pairs[0], LeadPair(0, 1));
        assert_eq!(pairs[23], LeadPair(14, 15));
        assert!(pairs.iter().all(|LeadPair(a, b)| a / 4 == b / 4 && a < b));
    }
}
