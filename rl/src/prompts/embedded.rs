//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Prompt for one loop iteration
pub const ITERATION: &str = include_str!("../../prompts/iteration.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "iteration" => Some(ITERATION),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_iteration() {
        let prompt = get_embedded("iteration").unwrap();
        assert!(prompt.contains("{{task_label}}"));
        assert!(prompt.contains("{{context}}"));
        assert!(prompt.contains("CONTINUATION"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
