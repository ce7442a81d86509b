//! The lookup interface the surrounding application injects into the
//! renderer.
//!
//! Everything the dialect needs to resolve (users, groups, streams, the
//! viewer's identity, emoticon preferences) arrives through this trait so
//! the core stays free of application state.

pub type UserId = u64;
pub type UserGroupId = u64;
pub type StreamId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroup {
    pub id: UserGroupId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: StreamId,
    pub name: String,
}

/// Synchronous, side-effect-free lookups supplied by the caller.
///
/// All resolution methods return `None` for unknown names or ids; the
/// renderer treats that as "leave the raw syntax alone" rather than an
/// error.
pub trait Helpers {
    /// Canonical full name for a user id.
    fn user_full_name(&self, id: UserId) -> Option<String>;

    /// User id for an exact full name, if unambiguous.
    fn user_id_for_full_name(&self, name: &str) -> Option<UserId>;

    /// Whether `name` and `id` jointly resolve to a valid user. Mentions of
    /// the `name|id` form are rendered only when this holds.
    fn is_valid_full_name_and_user_id(&self, name: &str, id: UserId) -> bool;

    /// The viewing user's id.
    fn my_user_id(&self) -> UserId;

    fn user_group_by_name(&self, name: &str) -> Option<UserGroup>;

    fn is_member_of_group(&self, user: UserId, group: UserGroupId) -> bool;

    fn stream_by_name(&self, name: &str) -> Option<Stream>;

    /// Hash-fragment URL for a stream narrow.
    fn stream_hash(&self, stream: &Stream) -> String;

    /// Hash-fragment URL for a stream/topic narrow.
    fn stream_topic_hash(&self, stream: &Stream, topic: &str) -> String;

    /// Whether `:)`-style emoticons should be rewritten to emoji shortcodes.
    fn should_translate_emoticons(&self) -> bool;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A canned helper bundle shared by the unit tests.
    #[derive(Debug, Default)]
    pub struct TestHelpers {
        pub users: Vec<(UserId, String)>,
        pub groups: Vec<UserGroup>,
        pub memberships: Vec<(UserId, UserGroupId)>,
        pub streams: Vec<Stream>,
        pub me: UserId,
        pub translate_emoticons: bool,
    }

    impl TestHelpers {
        pub fn standard() -> Self {
            TestHelpers {
                users: vec![
                    (42, "Alice Smith".to_owned()),
                    (7, "Bob".to_owned()),
                    (101, "Cordelia, Lear's daughter".to_owned()),
                ],
                groups: vec![UserGroup {
                    id: 5,
                    name: "backend".to_owned(),
                }],
                memberships: vec![(7, 5)],
                streams: vec![
                    Stream {
                        id: 1,
                        name: "design".to_owned(),
                    },
                    Stream {
                        id: 2,
                        name: "general".to_owned(),
                    },
                ],
                me: 7,
                translate_emoticons: false,
            }
        }
    }

    impl Helpers for TestHelpers {
        fn user_full_name(&self, id: UserId) -> Option<String> {
            self.users
                .iter()
                .find(|(uid, _)| *uid == id)
                .map(|(_, name)| name.clone())
        }

        fn user_id_for_full_name(&self, name: &str) -> Option<UserId> {
            self.users
                .iter()
                .find(|(_, full)| full == name)
                .map(|(id, _)| *id)
        }

        fn is_valid_full_name_and_user_id(&self, name: &str, id: UserId) -> bool {
            self.user_full_name(id)
                .is_some_and(|full| full.eq_ignore_ascii_case(name))
        }

        fn my_user_id(&self) -> UserId {
            self.me
        }

        fn user_group_by_name(&self, name: &str) -> Option<UserGroup> {
            self.groups.iter().find(|g| g.name == name).cloned()
        }

        fn is_member_of_group(&self, user: UserId, group: UserGroupId) -> bool {
            self.memberships.contains(&(user, group))
        }

        fn stream_by_name(&self, name: &str) -> Option<Stream> {
            self.streams.iter().find(|s| s.name == name).cloned()
        }

        fn stream_hash(&self, stream: &Stream) -> String {
            format!("#narrow/stream/{}-{}", stream.id, stream.name.replace(' ', "-"))
        }

        fn stream_topic_hash(&self, stream: &Stream, topic: &str) -> String {
            format!(
                "{}/topic/{}",
                self.stream_hash(stream),
                topic.replace(' ', "-")
            )
        }

        fn should_translate_emoticons(&self) -> bool {
            self.translate_emoticons
        }
    }
}
