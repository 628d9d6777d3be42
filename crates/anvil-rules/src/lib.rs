// Copyright 2026 The Anvil Authors.
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Concrete task builders laid on top of the generic engine: a one-shot command (`rule`),
//! a C++ compile step with discovered header dependencies (`cpp`), and a link step
//! (`link`).

mod builders;
mod depfile;
mod options;

pub use builders::{cpp, link, rule};
pub use options::{ConfigError, Options};
