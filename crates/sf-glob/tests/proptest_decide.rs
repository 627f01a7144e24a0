// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property test: a path under an unconditional `**` include with no
//! exclude rules is always allowed, regardless of its literal contents.

use proptest::prelude::*;
use sf_glob::{IncludeExcludeGlobs, MatchDecision};

proptest! {
    #[test]
    fn unconditional_include_always_allows(path in "[a-zA-Z0-9/_.-]{0,64}") {
        let globs = IncludeExcludeGlobs::new(&["**".to_string()], &[]).unwrap();
        prop_assert_eq!(globs.decide_str(&path), MatchDecision::Allowed);
    }

    #[test]
    fn excluding_a_path_that_matches_its_own_pattern_denies_it(name in "[a-zA-Z0-9_]{1,16}") {
        let pattern = format!("{name}.secret");
        let globs = IncludeExcludeGlobs::new(&[], &[pattern.clone()]).unwrap();
        prop_assert_eq!(globs.decide_str(&pattern), MatchDecision::DeniedByExclude);
    }
}
