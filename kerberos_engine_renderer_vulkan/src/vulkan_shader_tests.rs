//! Unit tests for SPIR-V preflight checks
//!
//! Runs without a GPU: only the byte-level checks done before reflection.

use super::*;

fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

// ============================================================================
// ALIGNMENT TESTS
// ============================================================================

#[test]
fn test_unaligned_code_is_rejected() {
    let mut code = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
    code.push(0);

    match spirv_words("unaligned", &code) {
        Err(Error::InvalidResource(msg)) => {
            assert!(msg.contains("unaligned"));
            assert!(msg.contains("4-byte"));
        }
        other => panic!("expected InvalidResource, got {:?}", other),
    }
}

#[test]
fn test_empty_code_is_rejected() {
    assert!(matches!(spirv_words("empty", &[]), Err(Error::InvalidResource(_))));
}

// ============================================================================
// MAGIC NUMBER TESTS
// ============================================================================

#[test]
fn test_wrong_magic_is_rejected() {
    let code = words_to_bytes(&[0xDEAD_BEEF, 0x0001_0000]);

    match spirv_words("garbage", &code) {
        Err(Error::InvalidResource(msg)) => assert!(msg.contains("0xdeadbeef")),
        other => panic!("expected InvalidResource, got {:?}", other),
    }
}

#[test]
fn test_words_are_little_endian() {
    let code = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0300, 7]);

    let words = spirv_words("ok", &code).unwrap();
    assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0300, 7]);
}

#[test]
fn test_stage_execution_models() {
    assert_eq!(execution_model(ShaderStage::Vertex), ExecutionModel::Vertex);
    assert_eq!(execution_model(ShaderStage::Fragment), ExecutionModel::Fragment);
}
