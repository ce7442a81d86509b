/// A message record threaded through the render pipeline.
///
/// The caller owns the record; rendering reads `raw_content`, stores the
/// resulting HTML fragment in `content`, and updates the mention flags
/// in place.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Message {
    pub raw_content: String,
    pub content: String,
    /// The viewer was mentioned outside of quoted content, either directly,
    /// by wildcard, or through a group they belong to.
    pub mentioned: bool,
    /// The viewer was mentioned by name or id, non-silently.
    pub mentioned_me_directly: bool,
    /// The raw content begins with the literal `/me ` prefix.
    pub is_me_message: bool,
}

impl Message {
    pub fn new(raw_content: impl Into<String>) -> Self {
        Message {
            raw_content: raw_content.into(),
            ..Message::default()
        }
    }
}
