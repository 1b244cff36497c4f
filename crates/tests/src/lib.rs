//! Cross-crate scenario tests for Sigscope

#[cfg(test)]
mod scenarios;
