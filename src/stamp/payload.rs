//! Two-token provenance payload.
//!
//! A stamp carries the provenance id twice: once under the uploader's key,
//! once under the master key. Each encrypted token ends in a single `=`
//! (the key vault's terminator), so the concatenation is self-delimiting:
//! the reader pairs every run of text with its trailing `=` and demands
//! exactly two tokens. Video tags carry the literal `deepmark` marker in
//! front; image stamps use `s`.

/// Marker literal on the video `copyright` tag.
pub const VIDEO_MARKER: &str = "deepmark";
/// Marker literal on the image stamp's `copyright` value.
pub const IMAGE_MARKER: &str = "s";

/// The two encrypted copies of one provenance id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StampPayload {
    pub user_token: String,
    pub master_token: String,
}

impl StampPayload {
    pub fn new(user_token: String, master_token: String) -> Self {
        Self {
            user_token,
            master_token,
        }
    }

    /// `"deepmark" ‖ tok_user ‖ tok_master`
    pub fn encode_video(&self) -> String {
        format!("{}{}{}", VIDEO_MARKER, self.user_token, self.master_token)
    }

    /// `"s" ‖ tok_user ‖ tok_master`
    pub fn encode_image(&self) -> String {
        format!("{}{}{}", IMAGE_MARKER, self.user_token, self.master_token)
    }

    pub fn decode_video(copyright: &str) -> Option<Self> {
        let text = copyright.strip_prefix(VIDEO_MARKER)?;
        split_two_tokens(text)
    }

    pub fn decode_image(value: &str) -> Option<Self> {
        let text = value.strip_prefix(IMAGE_MARKER)?;
        split_two_tokens(text)
    }
}

/// Pair each `=`-terminated run into a token; a trailing run with no
/// terminator is ignored. Anything but exactly two tokens is malformed.
fn split_two_tokens(text: &str) -> Option<StampPayload> {
    let mut tokens = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'=' {
            tokens.push(&text[start..=i]);
            start = i + 1;
        }
    }
    if tokens.len() != 2 {
        return None;
    }
    Some(StampPayload::new(
        tokens[0].to_string(),
        tokens[1].to_string(),
    ))
}
