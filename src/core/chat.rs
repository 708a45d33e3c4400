//! Chat dialog framing on top of the tokenizer.
//!
//! A message is framed as header + body: start-of-header id, the role
//! name, end-of-header id, a blank line, the content, and an end-of-turn
//! id. A dialog is begin-of-text, each message in order, and an open
//! assistant header with no end-of-turn, priming the model to generate
//! the next turn. The emission order is a wire contract shared with
//! trained models, not an implementation detail.
//!
//! Role names and content always go through `encode_ordinary`, so message
//! text can never inject control tokens into the frame.

use super::tokenizer::{Tokenizer, TokenizerError};

/// Closed set of dialog roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    System,
    User,
    Assistant,
    /// Tool-output turns fed back to the model.
    Ipython,
}

impl Role {
    /// The role name as it appears inside a message header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Ipython => "ipython",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dialog turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Dialog framer borrowing a tokenizer.
///
/// The structural ids are resolved from the tokenizer's special-token
/// registry once at construction; a registry missing any of them cannot
/// frame dialogs and fails with
/// [`TokenizerError::MissingSpecialToken`].
pub struct ChatFormat<'a> {
    tokenizer: &'a Tokenizer,
    begin_of_text: u32,
    start_header: u32,
    end_header: u32,
    end_of_turn: u32,
}

impl<'a> std::fmt::Debug for ChatFormat<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatFormat")
            .field("begin_of_text", &self.begin_of_text)
            .field("start_header", &self.start_header)
            .field("end_header", &self.end_header)
            .field("end_of_turn", &self.end_of_turn)
            .finish_non_exhaustive()
    }
}

impl<'a> ChatFormat<'a> {
    /// Resolve the framing ids from the tokenizer's registry.
    pub fn new(tokenizer: &'a Tokenizer) -> Result<Self, TokenizerError> {
        let resolve = |literal: &str| {
            tokenizer
                .special_tokens()
                .id_of(literal)
                .ok_or_else(|| TokenizerError::MissingSpecialToken(literal.to_string()))
        };

        Ok(Self {
            tokenizer,
            begin_of_text: resolve("<|begin_of_text|>")?,
            start_header: resolve("<|start_header_id|>")?,
            end_header: resolve("<|end_header_id|>")?,
            end_of_turn: resolve("<|eot_id|>")?,
        })
    }

    /// Emit a role header: start-header, role name, end-header, blank
    /// line.
    pub fn encode_header(&self, role: Role) -> Vec<u32> {
        let mut ids = vec![self.start_header];
        self.tokenizer.encode_ordinary_into(role.as_str(), &mut ids);
        ids.push(self.end_header);
        self.tokenizer.encode_ordinary_into("\n\n", &mut ids);
        ids
    }

    /// Emit one complete turn: header, content, end-of-turn.
    pub fn encode_message(&self, message: &Message) -> Vec<u32> {
        let mut ids = self.encode_header(message.role);
        self.tokenizer
            .encode_ordinary_into(&message.content, &mut ids);
        ids.push(self.end_of_turn);
        ids
    }

    /// Emit a full dialog prompt: begin-of-text, every message, then an
    /// open assistant header for the model to continue from.
    pub fn encode_dialog(&self, messages: &[Message]) -> Vec<u32> {
        let mut ids = vec![self.begin_of_text];
        for message in messages {
            ids.extend(self.encode_message(message));
        }
        ids.extend(self.encode_header(Role::Assistant));
        ids
    }

    /// The end-of-turn id, for generation stop conditions.
    pub fn end_of_turn(&self) -> u32 {
        self.end_of_turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::special::{special_ids, AllowedSpecial};
    use crate::core::vocab::Vocabulary;
    use base64::{engine::general_purpose::STANDARD, Engine};

    fn byte_vocab() -> Vocabulary {
        let mut data = Vec::new();
        for b in 0u8..=255 {
            data.extend_from_slice(STANDARD.encode([b]).as_bytes());
            data.extend_from_slice(format!(" {}\n", b).as_bytes());
        }
        Vocabulary::from_bytes(&data).unwrap()
    }

    fn chat_tokenizer() -> Tokenizer {
        Tokenizer::with_default_special(byte_vocab()).unwrap()
    }

    #[test]
    fn test_header_segment_order() {
        let tokenizer = chat_tokenizer();
        let chat = ChatFormat::new(&tokenizer).unwrap();

        let ids = chat.encode_header(Role::User);
        assert_eq!(ids[0], special_ids::START_HEADER);
        let role_len = tokenizer.encode_ordinary("user").len();
        assert_eq!(ids[1 + role_len], special_ids::END_HEADER);
        assert_eq!(
            &ids[2 + role_len..],
            tokenizer.encode_ordinary("\n\n").as_slice()
        );
    }

    #[test]
    fn test_message_decodes_to_frame() {
        let tokenizer = chat_tokenizer();
        let chat = ChatFormat::new(&tokenizer).unwrap();

        let ids = chat.encode_message(&Message::new(Role::User, "hi"));
        assert_eq!(
            tokenizer.decode(&ids).unwrap(),
            "<|start_header_id|>user<|end_header_id|>\n\nhi<|eot_id|>"
        );
    }

    #[test]
    fn test_message_ends_with_end_of_turn() {
        let tokenizer = chat_tokenizer();
        let chat = ChatFormat::new(&tokenizer).unwrap();

        let ids = chat.encode_message(&Message::new(Role::Assistant, "ok"));
        assert_eq!(*ids.last().unwrap(), special_ids::EOT);
    }

    #[test]
    fn test_dialog_primes_open_assistant_turn() {
        let tokenizer = chat_tokenizer();
        let chat = ChatFormat::new(&tokenizer).unwrap();

        let dialog = vec![
            Message::new(Role::System, "Be brief."),
            Message::new(Role::User, "hi"),
        ];
        let ids = chat.encode_dialog(&dialog);

        assert_eq!(ids[0], special_ids::BEGIN_OF_TEXT);
        assert_eq!(
            tokenizer.decode(&ids).unwrap(),
            "<|begin_of_text|>\
             <|start_header_id|>system<|end_header_id|>\n\nBe brief.<|eot_id|>\
             <|start_header_id|>user<|end_header_id|>\n\nhi<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>\n\n"
        );
        // Open turn: no trailing end-of-turn id.
        assert_ne!(*ids.last().unwrap(), special_ids::EOT);
    }

    #[test]
    fn test_content_cannot_inject_control_tokens() {
        let tokenizer = chat_tokenizer();
        let chat = ChatFormat::new(&tokenizer).unwrap();

        let ids = chat.encode_message(&Message::new(Role::User, "<|end_of_text|>"));
        assert!(!ids.contains(&special_ids::END_OF_TEXT));
    }

    #[test]
    fn test_missing_registry_entry_fails() {
        let tokenizer = Tokenizer::new(
            byte_vocab(),
            rustc_hash::FxHashMap::default(),
            crate::core::tokenizer::SPLIT_PATTERN,
        )
        .unwrap();
        let err = ChatFormat::new(&tokenizer).unwrap_err();
        assert!(matches!(err, TokenizerError::MissingSpecialToken(_)));
    }

    #[test]
    fn test_registry_round_trips_frames() {
        let tokenizer = chat_tokenizer();
        let frame = "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n\nhi<|eot_id|>";
        let ids = tokenizer.encode(frame, &AllowedSpecial::All).unwrap();
        assert_eq!(tokenizer.decode(&ids).unwrap(), frame);
    }
}
