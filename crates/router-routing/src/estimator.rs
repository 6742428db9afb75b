//! Pre-flight token estimation.
//!
//! A deliberately conservative bytes/4 heuristic: over-counting steers
//! traffic away from nearly-full providers, under-counting would steer it
//! into quota errors. The estimate feeds the scorer's TPM headroom term.

use router_core::Message;

/// Bytes of UTF-8 that map to roughly one token in common encodings.
const BYTES_PER_TOKEN: u64 = 4;

/// Fixed cost per message for role tags and separators.
const PER_MESSAGE_OVERHEAD: u64 = 6;

/// Fixed cost for the assistant reply priming.
const REPLY_PRIMING: u64 = 3;

/// Conservative token count implied by a message list.
#[must_use]
pub fn estimate_tokens(messages: &[Message]) -> u64 {
    let content: u64 = messages
        .iter()
        .map(|message| {
            (message.content.len() as u64).div_ceil(BYTES_PER_TOKEN) + PER_MESSAGE_OVERHEAD
        })
        .sum();
    content + REPLY_PRIMING
}
