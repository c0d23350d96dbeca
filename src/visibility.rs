//! Read and write access decisions for posts, comments and profiles.
//!
//! The policy functions are pure over an [`AccessFacts`] source, which lets the
//! same rules run against SQLite in handlers and against in-memory sets in tests.
//! The feed query in `db::posts` encodes the same read rules in SQL.

use rusqlite::Connection;

use crate::db::models::{Post, Privacy, User};
use crate::db::{follows, groups, posts};

/// Relationship facts the policy consults. Queried lazily, only when a rule needs one.
pub trait AccessFacts {
    type Error;

    /// Accepted follow edge `follower -> target`.
    fn is_following(&self, follower_id: &str, target_id: &str) -> Result<bool, Self::Error>;

    /// Accepted (not pending) membership.
    fn is_group_member(&self, group_id: &str, user_id: &str) -> Result<bool, Self::Error>;

    fn is_allowed_viewer(&self, post_id: &str, user_id: &str) -> Result<bool, Self::Error>;
}

pub struct SqliteFacts<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteFacts<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl AccessFacts for SqliteFacts<'_> {
    type Error = rusqlite::Error;

    fn is_following(&self, follower_id: &str, target_id: &str) -> rusqlite::Result<bool> {
        follows::is_following(self.conn, follower_id, target_id)
    }

    fn is_group_member(&self, group_id: &str, user_id: &str) -> rusqlite::Result<bool> {
        groups::is_accepted_member(self.conn, group_id, user_id)
    }

    fn is_allowed_viewer(&self, post_id: &str, user_id: &str) -> rusqlite::Result<bool> {
        posts::is_allowed_viewer(self.conn, post_id, user_id)
    }
}

/// First matching rule wins:
/// owner; group-scoped posts need accepted membership whatever their privacy;
/// public; followers need an accepted edge; private_list needs the allow-list.
pub fn can_view<F: AccessFacts>(
    requester: Option<&str>,
    post: &Post,
    facts: &F,
) -> Result<bool, F::Error> {
    if requester == Some(post.user_id.as_str()) {
        return Ok(true);
    }

    if let Some(group_id) = post.group_id.as_deref() {
        return match requester {
            Some(uid) => facts.is_group_member(group_id, uid),
            None => Ok(false),
        };
    }

    match (post.privacy, requester) {
        (Privacy::Public, _) => Ok(true),
        (_, None) => Ok(false),
        (Privacy::Followers, Some(uid)) => facts.is_following(uid, &post.user_id),
        (Privacy::PrivateList, Some(uid)) => facts.is_allowed_viewer(&post.id, uid),
        // Group privacy without a group id grants nobody but the owner.
        (Privacy::Group, Some(_)) => Ok(false),
    }
}

/// Edits are owner-only.
pub fn can_mutate(requester: &str, owner_id: &str) -> bool {
    requester == owner_id
}

/// Deletion: the owner, or the creator of the group the content belongs to.
pub fn can_remove(requester: &str, owner_id: &str, group_creator_id: Option<&str>) -> bool {
    requester == owner_id || group_creator_id == Some(requester)
}

pub fn can_view_profile<F: AccessFacts>(
    requester: Option<&str>,
    profile: &User,
    facts: &F,
) -> Result<bool, F::Error> {
    if profile.is_public || requester == Some(profile.id.as_str()) {
        return Ok(true);
    }
    match requester {
        Some(uid) => facts.is_following(uid, &profile.id),
        None => Ok(false),
    }
}
