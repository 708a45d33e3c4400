//! Integration tests for special-token scanning and the allow-list gate.

use base64::{engine::general_purpose::STANDARD, Engine};
use chatbpe::{
    default_special_tokens, special_ids, AllowedSpecial, Tokenizer, TokenizerError, Vocabulary,
    SPLIT_PATTERN,
};

#[test]
fn test_default_registry_layout() {
    let tokenizer = test_tokenizer();
    let special = tokenizer.special_tokens();

    assert_eq!(special.len(), 256);
    assert_eq!(
        special.id_of("<|begin_of_text|>"),
        Some(special_ids::BEGIN_OF_TEXT)
    );
    assert_eq!(
        special.id_of("<|end_of_text|>"),
        Some(special_ids::END_OF_TEXT)
    );
    assert_eq!(
        special.id_of("<|start_header_id|>"),
        Some(special_ids::START_HEADER)
    );
    assert_eq!(
        special.id_of("<|end_header_id|>"),
        Some(special_ids::END_HEADER)
    );
    assert_eq!(special.id_of("<|eot_id|>"), Some(special_ids::EOT));
    assert_eq!(special.id_of("<|python_tag|>"), Some(special_ids::PYTHON_TAG));

    // The block ends in reserved placeholders.
    assert_eq!(
        special.literal_of(128255),
        Some("<|reserved_special_token_246|>")
    );
}

#[test]
fn test_disallowed_special_token_rejected() {
    let tokenizer = test_tokenizer();
    let text = "user text with <|end_of_text|> embedded";

    let err = tokenizer.encode(text, &AllowedSpecial::None).unwrap_err();
    match err {
        TokenizerError::DisallowedSpecial(inner) => {
            assert_eq!(inner.literal, "<|end_of_text|>");
            assert_eq!(inner.position, 15);
        }
        other => panic!("expected DisallowedSpecial, got {:?}", other),
    }
}

#[test]
fn test_allowed_special_token_encodes_and_decodes() {
    let tokenizer = test_tokenizer();
    let text = "user text with <|end_of_text|> embedded";

    // The same text succeeds once the literal is allowed, and the
    // special id decodes back to the literal's bytes.
    let allowed = AllowedSpecial::only(["<|end_of_text|>"]);
    let ids = tokenizer.encode(text, &allowed).unwrap();
    assert!(ids.contains(&special_ids::END_OF_TEXT));
    assert_eq!(tokenizer.decode(&ids).unwrap(), text);
}

#[test]
fn test_only_policy_is_exact() {
    let tokenizer = test_tokenizer();
    let allowed = AllowedSpecial::only(["<|eot_id|>"]);

    assert!(tokenizer.encode("a<|eot_id|>b", &allowed).is_ok());

    let err = tokenizer
        .encode("a<|eot_id|><|eom_id|>", &allowed)
        .unwrap_err();
    match err {
        TokenizerError::DisallowedSpecial(inner) => {
            assert_eq!(inner.literal, "<|eom_id|>");
            assert_eq!(inner.position, "a<|eot_id|>".len());
        }
        other => panic!("expected DisallowedSpecial, got {:?}", other),
    }
}

#[test]
fn test_all_policy_interleaves_in_order() {
    let tokenizer = test_tokenizer();
    let ids = tokenizer
        .encode(
            "<|begin_of_text|>hi<|eot_id|>",
            &AllowedSpecial::All,
        )
        .unwrap();

    assert_eq!(ids.first(), Some(&special_ids::BEGIN_OF_TEXT));
    assert_eq!(ids.last(), Some(&special_ids::EOT));
    assert_eq!(
        tokenizer.decode(&ids).unwrap(),
        "<|begin_of_text|>hi<|eot_id|>"
    );
}

#[test]
fn test_encode_ordinary_never_emits_special_ids() {
    let tokenizer = test_tokenizer();
    let text = "<|begin_of_text|><|eot_id|>";

    let ids = tokenizer.encode_ordinary(text);
    assert!(ids.iter().all(|&id| id < 128000));
    // The literal text survives as ordinary bytes.
    assert_eq!(tokenizer.decode(&ids).unwrap(), text);
}

#[test]
fn test_reserved_placeholders_scan() {
    let tokenizer = test_tokenizer();
    let ids = tokenizer
        .encode("<|reserved_special_token_0|>", &AllowedSpecial::All)
        .unwrap();
    assert_eq!(ids, vec![128002]);
}

#[test]
fn test_special_ids_decode_as_literals() {
    let tokenizer = test_tokenizer();
    assert_eq!(
        tokenizer.decode(&[special_ids::BEGIN_OF_TEXT]).unwrap(),
        "<|begin_of_text|>"
    );
    assert_eq!(tokenizer.decode(&[special_ids::EOT]).unwrap(), "<|eot_id|>");
    assert_eq!(tokenizer.decode(&[special_ids::EOM]).unwrap(), "<|eom_id|>");
}

// Helper to build the shared test tokenizer.
fn test_tokenizer() -> Tokenizer {
    let mut data = Vec::new();
    for b in 0u8..=255 {
        data.extend_from_slice(STANDARD.encode([b]).as_bytes());
        data.extend_from_slice(format!(" {}\n", b).as_bytes());
    }
    let vocab = Vocabulary::from_bytes(&data).unwrap();
    Tokenizer::new(vocab, default_special_tokens(), SPLIT_PATTERN).unwrap()
}
