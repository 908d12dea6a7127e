//! Byte stream to text chunk adapter
//!
//! Network bodies arrive in arbitrary byte chunks that may split a UTF-8
//! sequence. Incomplete trailing bytes are carried into the next chunk.

use futures::{Stream, StreamExt};

use crate::PipelineError;

/// Decode a byte stream into UTF-8 text chunks
///
/// The stream ends after the first error.
pub fn text_chunks<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, PipelineError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut carry: Vec<u8> = Vec::new();
        let mut failed = false;

        while let Some(item) = bytes.next().await {
            match item {
                Ok(chunk) => {
                    carry.extend_from_slice(chunk.as_ref());
                    match take_valid_prefix(&mut carry) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => {
                            failed = true;
                            yield Err(e);
                            break;
                        }
                    }
                }
                Err(e) => {
                    failed = true;
                    yield Err(PipelineError::Input(e.to_string()));
                    break;
                }
            }
        }

        if !failed && !carry.is_empty() {
            yield Err(PipelineError::Input("Stream ended inside a UTF-8 sequence".to_string()));
        }
    }
}

/// Drain the longest valid UTF-8 prefix of `carry`
fn take_valid_prefix(carry: &mut Vec<u8>) -> Result<Option<String>, PipelineError> {
    let valid = match std::str::from_utf8(carry) {
        Ok(_) => carry.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(e) => {
            return Err(PipelineError::Input(format!(
                "Invalid UTF-8 at byte {}",
                e.valid_up_to()
            )))
        }
    };
    if valid == 0 {
        return Ok(None);
    }

    let rest = carry.split_off(valid);
    let text = String::from_utf8(std::mem::replace(carry, rest))
        .map_err(|e| PipelineError::Input(e.to_string()))?;
    Ok(Some(text))
}
