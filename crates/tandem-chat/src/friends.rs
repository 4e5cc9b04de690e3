use chrono::Utc;
use tracing::info;

use tandem_db::Database;
use tandem_db::models::FriendshipAcceptance;
use tandem_types::models::{UserId, UserPair};

use crate::error::ChatError;

/// Symmetric: `are_friends(a, b) == are_friends(b, a)`.
pub fn are_friends(db: &Database, a: UserId, b: UserId) -> Result<bool, ChatError> {
    Ok(db.friends_exist(UserPair::new(a, b))?)
}

/// Record the friendship. Returns false if it already existed.
pub fn add_friend(db: &Database, a: UserId, b: UserId) -> Result<bool, ChatError> {
    let pair = UserPair::new(a, b);
    if pair.is_degenerate() {
        return Err(ChatError::SelfAddressed);
    }
    let added = db.insert_friend(pair, Utc::now())?;
    if added {
        info!("Users {} and {} are now friends", pair.low(), pair.high());
    }
    Ok(added)
}

/// Mark every friend request `from_user_id` sent to `to_user_id` as accepted.
/// Returns whether there was at least one.
pub fn accept_friend_request(
    db: &Database,
    from_user_id: UserId,
    to_user_id: UserId,
) -> Result<bool, ChatError> {
    let found = db.mark_friend_requests_accepted(from_user_id, to_user_id)?;
    Ok(found > 0)
}

/// Accept `requester`'s pending requests and record the friendship atomically.
pub fn accept_friendship(
    db: &Database,
    requester: UserId,
    acceptor: UserId,
) -> Result<FriendshipAcceptance, ChatError> {
    if requester == acceptor {
        return Err(ChatError::SelfAddressed);
    }
    let outcome = db.accept_friendship(requester, acceptor, Utc::now())?;
    if outcome == FriendshipAcceptance::Accepted {
        info!("User {} accepted the friend request from {}", acceptor, requester);
    }
    Ok(outcome)
}

/// Returns whether a friendship was actually removed.
pub fn delete_friend(db: &Database, a: UserId, b: UserId) -> Result<bool, ChatError> {
    let pair = UserPair::new(a, b);
    let removed = db.delete_friend(pair)?;
    if removed {
        info!("Users {} and {} are no longer friends", pair.low(), pair.high());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendship_is_symmetric() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("ann", "Ann").unwrap();
        let b = db.create_user("ben", "Ben").unwrap();

        assert!(!are_friends(&db, a, b).unwrap());
        assert!(add_friend(&db, b, a).unwrap());
        assert!(are_friends(&db, a, b).unwrap());
        assert!(are_friends(&db, b, a).unwrap());

        assert!(!add_friend(&db, a, b).unwrap());
    }

    #[test]
    fn delete_reports_whether_a_row_was_removed() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("ann", "Ann").unwrap();
        let b = db.create_user("ben", "Ben").unwrap();

        assert!(!delete_friend(&db, a, b).unwrap());
        add_friend(&db, a, b).unwrap();
        assert!(delete_friend(&db, b, a).unwrap());
        assert!(!are_friends(&db, a, b).unwrap());
    }

    #[test]
    fn accept_sweeps_every_pending_request() {
        use tandem_db::models::NewMessage;
        use tandem_types::models::{ContentType, FriendRequestContent, MessageContent};

        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("ann", "Ann").unwrap();
        let b = db.create_user("ben", "Ben").unwrap();
        assert!(!accept_friend_request(&db, a, b).unwrap());

        let conv = crate::conversation::resolve_or_create(&db, a, b).unwrap();
        let body = serde_json::to_string(&MessageContent::FriendRequest(FriendRequestContent::default())).unwrap();
        let ids: Vec<_> = (0..2)
            .map(|_| {
                db.insert_message(&NewMessage {
                    conversation_id: conv.id,
                    sender_id: a,
                    receiver_id: b,
                    content_type: ContentType::FriendRequest.code(),
                    content: &body,
                    reply_to: None,
                    sent_at: Utc::now(),
                })
                .unwrap()
                .id
            })
            .collect();

        // Direction matters: b never sent a request to a.
        assert!(!accept_friend_request(&db, b, a).unwrap());
        assert!(accept_friend_request(&db, a, b).unwrap());
        for id in ids {
            let row = db.get_message(id).unwrap().unwrap();
            let content: FriendRequestContent = serde_json::from_str(&row.content).unwrap();
            assert!(content.is_accepted);
        }
    }
}
