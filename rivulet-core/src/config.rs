// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Process-wide defaults.

use crate::{Result, ResultExt, RivuletError};
use std::sync::OnceLock;

/// Environment variable overriding [`buffer_size`].
pub const BUFFER_SIZE_ENV: &str = "RIVULET_BUFFER_SIZE";

/// Prefetch used when an operator is not given one explicitly.
pub const DEFAULT_BUFFER_SIZE: usize = 128;

const MIN_BUFFER_SIZE: usize = 16;

static BUFFER_SIZE: OnceLock<usize> = OnceLock::new();

/// Default prefetch/buffer size for coordinators.
///
/// Read once from `RIVULET_BUFFER_SIZE`; values below 16 are raised to 16 and
/// unparsable values fall back to 128.
pub fn buffer_size() -> usize {
    *BUFFER_SIZE.get_or_init(|| {
        std::env::var(BUFFER_SIZE_ENV)
            .ok()
            .map(|raw| parse_buffer_size(&raw))
            .unwrap_or(DEFAULT_BUFFER_SIZE)
    })
}

fn parse_buffer_size(raw: &str) -> usize {
    match try_parse_buffer_size(raw) {
        Ok(size) => size.max(MIN_BUFFER_SIZE),
        Err(error) => {
            warn!("{error}, using {DEFAULT_BUFFER_SIZE}");
            DEFAULT_BUFFER_SIZE
        }
    }
}

fn try_parse_buffer_size(raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(RivuletError::user_error)
        .with_context(|| format!("invalid {BUFFER_SIZE_ENV}={raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_clamps_small_sizes() {
        assert_eq!(parse_buffer_size("4"), MIN_BUFFER_SIZE);
        assert_eq!(parse_buffer_size(" 256 "), 256);
    }

    #[test]
    fn parse_falls_back_on_garbage() {
        assert_eq!(parse_buffer_size("lots"), DEFAULT_BUFFER_SIZE);
        assert_eq!(parse_buffer_size("-3"), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn parse_error_names_the_variable() {
        let error = try_parse_buffer_size("lots").unwrap_err();
        assert!(error.to_string().contains("invalid RIVULET_BUFFER_SIZE=\"lots\""));
    }
}
