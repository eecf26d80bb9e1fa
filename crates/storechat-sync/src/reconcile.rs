//! Merging of optimistic and confirmed messages into a room's list.
//!
//! The gateway does not echo the client's provisional id, so a confirmed
//! message is paired with a pending optimistic one by room, sender, exact
//! text and time proximity. Two identical sends inside the window can pair
//! with the wrong entry; there is no correlation id to do better.

use chrono::TimeDelta;
use tracing::{debug, trace};

use storechat_types::models::{Message, RoomId};

/// Max distance in seconds between an optimistic insert and its server echo.
pub const RECONCILIATION_WINDOW_SECS: i64 = 7;

fn window() -> TimeDelta {
    TimeDelta::seconds(RECONCILIATION_WINDOW_SECS)
}

/// Merge `incoming` into a copy of `existing` and return it sorted by
/// `created_at`. `existing` is left untouched.
pub fn merge<I>(room_id: RoomId, existing: &[Message], incoming: I) -> Vec<Message>
where
    I: IntoIterator<Item = Message>,
{
    let mut list = existing.to_vec();

    for msg in incoming {
        if msg.room_id != room_id {
            debug!(
                "Skipping message {} for room {} while merging room {}",
                msg.id, msg.room_id, room_id
            );
            continue;
        }

        // An id already in the list is a replay: overwrite it in place.
        if !msg.is_provisional() && !list.iter().any(|m| m.id == msg.id) {
            if let Some(pos) = find_provisional_match(&list, &msg) {
                trace!("Confirmed {} replaces {} in room {}", msg.id, list[pos].id, room_id);
                list[pos] = msg;
                continue;
            }
        }

        upsert(&mut list, msg);
    }

    list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    list
}

fn upsert(list: &mut Vec<Message>, msg: Message) {
    match list.iter_mut().find(|m| m.id == msg.id) {
        Some(slot) => *slot = msg,
        None => list.push(msg),
    }
}

fn find_provisional_match(list: &[Message], confirmed: &Message) -> Option<usize> {
    list.iter().position(|m| {
        m.is_provisional()
            && m.room_id == confirmed.room_id
            && m.sender.id == confirmed.sender.id
            && m.text == confirmed.text
            && (m.created_at - confirmed.created_at).abs() <= window()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use storechat_types::models::{MessageKind, UserProfile};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn msg(id: &str, room: RoomId, sender: i64, text: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: id.into(),
            room_id: room,
            kind: MessageKind::Text,
            text: text.into(),
            sender: UserProfile {
                id: sender,
                nickname: format!("U{}", sender),
                avatar: String::new(),
            },
            created_at: at,
        }
    }

    fn ids(list: &[Message]) -> Vec<&str> {
        list.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn confirmed_replaces_provisional_within_window() {
        let existing = vec![msg("temp-1", 5, 7, "hi", t0())];
        let confirmed = msg("42", 5, 7, "hi", t0() + TimeDelta::seconds(2));

        let merged = merge(5, &existing, [confirmed]);
        assert_eq!(ids(&merged), vec!["42"]);
        // input untouched
        assert_eq!(ids(&existing), vec!["temp-1"]);
    }

    #[test]
    fn stale_confirmation_does_not_match() {
        let existing = vec![msg("temp-1", 5, 7, "hi", t0())];
        let confirmed = msg("42", 5, 7, "hi", t0() + TimeDelta::seconds(10));

        let merged = merge(5, &existing, [confirmed]);
        assert_eq!(ids(&merged), vec!["temp-1", "42"]);
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let existing = vec![msg("temp-1", 5, 7, "hi", t0())];
        let merged = merge(5, &existing, [msg("42", 5, 7, "hi", t0() + window())]);
        assert_eq!(ids(&merged), vec!["42"]);
    }

    #[test]
    fn different_sender_or_text_does_not_match() {
        let existing = vec![msg("temp-1", 5, 7, "hi", t0())];
        let merged = merge(
            5,
            &existing,
            [
                msg("42", 5, 8, "hi", t0() + TimeDelta::seconds(1)),
                msg("43", 5, 7, "hi!", t0() + TimeDelta::seconds(1)),
            ],
        );
        assert_eq!(ids(&merged), vec!["temp-1", "42", "43"]);
    }

    #[test]
    fn confirmed_replay_is_idempotent() {
        let m = msg("42", 5, 7, "hi", t0());
        let once = merge(5, &[], [m.clone()]);
        let twice = merge(5, &once, [m]);
        assert_eq!(ids(&twice), vec!["42"]);
    }

    #[test]
    fn provisional_reissue_is_upserted() {
        let p = msg("temp-5-1-aa", 5, 7, "hi", t0());
        let merged = merge(5, &[p.clone()], [p]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn output_is_sorted_and_foreign_rooms_skipped() {
        let merged = merge(
            5,
            &[msg("2", 5, 1, "b", t0() + TimeDelta::seconds(30))],
            [
                msg("3", 5, 1, "c", t0() + TimeDelta::seconds(60)),
                msg("1", 5, 1, "a", t0()),
                msg("9", 6, 1, "elsewhere", t0()),
            ],
        );
        assert_eq!(ids(&merged), vec!["1", "2", "3"]);
    }

    #[test]
    fn two_identical_sends_pair_in_order() {
        let existing = vec![
            msg("temp-a", 5, 7, "ok", t0()),
            msg("temp-b", 5, 7, "ok", t0() + TimeDelta::seconds(1)),
        ];
        let merged = merge(
            5,
            &existing,
            [
                msg("100", 5, 7, "ok", t0() + TimeDelta::seconds(1)),
                msg("101", 5, 7, "ok", t0() + TimeDelta::seconds(2)),
            ],
        );
        assert_eq!(ids(&merged), vec!["100", "101"]);
    }
}
