use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar_url: Option<String>,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn display_name(&self) -> String {
        match self.nickname.as_deref() {
            Some(nick) if !nick.is_empty() => nick.to_string(),
            _ => format!("{} {}", self.first_name, self.last_name),
        }
    }
}

/// Public projection of a user, embedded in posts, comments and member lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub group_id: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub privacy: Privacy,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub allowed_viewers: Vec<String>,
    /// Live comments and replies.
    #[serde(default)]
    pub comment_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub title: String,
    pub description: String,
    pub creator_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    pub status: MemberStatus,
    pub created_at: String,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEvent {
    pub id: String,
    pub group_id: String,
    pub creator_id: String,
    pub title: String,
    pub description: String,
    pub event_date: String,
    pub created_at: String,
    pub going: i64,
    pub not_going: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub related_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

/// One entry in a user's activity history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub user_id: String,
    pub activity_type: ActivityKind,
    pub target_type: TargetType,
    pub target_id: String,
    pub target_user_id: Option<String>,
    pub post_id: String,
    pub content_preview: Option<String>,
    pub is_hidden: bool,
    pub created_at: String,
    pub user: UserSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Post>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
}

/// What other people may see of a user's activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySettings {
    pub show_posts: bool,
    pub show_comments: bool,
    pub show_likes: bool,
    pub show_to_followers_only: bool,
}

impl Default for ActivitySettings {
    fn default() -> Self {
        Self {
            show_posts: true,
            show_comments: true,
            show_likes: true,
            show_to_followers_only: false,
        }
    }
}

impl ActivitySettings {
    pub fn shows(&self, kind: ActivityKind) -> bool {
        match kind {
            ActivityKind::PostCreated => self.show_posts,
            ActivityKind::CommentCreated => self.show_comments,
            ActivityKind::PostLiked
            | ActivityKind::PostDisliked
            | ActivityKind::CommentLiked
            | ActivityKind::CommentDisliked => self.show_likes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub like_count: i64,
    pub dislike_count: i64,
    pub user_reaction: Option<String>,
}

// --- Enumerations stored as TEXT ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseEnumError(&'static str);

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}", self.0)
    }
}

impl std::error::Error for ParseEnumError {}

macro_rules! text_enum {
    (
        $name:ident,
        $what:literal,
        { $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)? }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text $(| $alias)* => Ok($name::$variant),)+
                    _ => Err(ParseEnumError($what)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(Privacy, "privacy", {
    Public => "public",
    Followers => "followers" | "almost_private",
    PrivateList => "private_list" | "private",
    Group => "group",
});

text_enum!(MemberStatus, "membership status", {
    Pending => "pending",
    Accepted => "accepted",
});

text_enum!(FollowStatus, "follow status", {
    Pending => "pending",
    Accepted => "accepted",
});

text_enum!(ReactionKind, "reaction", {
    Like => "like",
    Dislike => "dislike",
});

text_enum!(EventResponse, "event response", {
    Going => "going",
    NotGoing => "not_going",
});

text_enum!(TargetType, "target type", {
    Post => "post",
    Comment => "comment",
});

text_enum!(ActivityKind, "activity type", {
    PostCreated => "post_created",
    CommentCreated => "comment_created",
    PostLiked => "post_liked",
    PostDisliked => "post_disliked",
    CommentLiked => "comment_liked",
    CommentDisliked => "comment_disliked",
});

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::PostCreated,
        ActivityKind::CommentCreated,
        ActivityKind::PostLiked,
        ActivityKind::PostDisliked,
        ActivityKind::CommentLiked,
        ActivityKind::CommentDisliked,
    ];

    pub fn reaction(target: TargetType, kind: ReactionKind) -> Self {
        match (target, kind) {
            (TargetType::Post, ReactionKind::Like) => ActivityKind::PostLiked,
            (TargetType::Post, ReactionKind::Dislike) => ActivityKind::PostDisliked,
            (TargetType::Comment, ReactionKind::Like) => ActivityKind::CommentLiked,
            (TargetType::Comment, ReactionKind::Dislike) => ActivityKind::CommentDisliked,
        }
    }
}
