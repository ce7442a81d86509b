//! Client-side rendering of the Zulip message dialect.
//!
//! Converts raw message text into the same HTML fragments the server
//! produces, so freshly sent messages can be echoed locally without a
//! round trip. The pipeline runs a fence pre-pass, a series of text-level
//! substitution passes (mentions, stream links, emoji, timestamps, math,
//! realm linkifiers), and finally a filtered CommonMark render. Every
//! failure is local: a malformed construct degrades to literal text or a
//! visible error marker, never a failed message.

mod expand;
mod prelude;
mod stash;

pub mod emoji;
pub mod fenced;
pub mod helpers;
pub mod linkifier;
pub mod math;
pub mod message;
pub mod render;

pub use emoji::EmojiMap;
pub use fenced::get_unused_fence;
pub use helpers::{Helpers, Stream, StreamId, UserGroup, UserGroupId, UserId};
pub use linkifier::{Linkifier, LinkifierDef, LinkifierRegistry, TopicLink};
pub use math::{DisabledMathRenderer, MathError, MathRenderer};
pub use message::Message;
pub use render::MarkdownEngine;
