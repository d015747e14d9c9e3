//! JavaScript language handler

use super::{default_env, LanguageHandler, RunTemplate, SeccompRule};
use crate::constants::{languages, seccomp_rules};

/// Get handler for JavaScript (Node.js, no compile step)
pub fn handler() -> LanguageHandler {
    LanguageHandler {
        name: languages::JAVASCRIPT,
        compile: None,
        run: RunTemplate {
            command: "/usr/bin/node {exe_path}",
            seccomp_rule: SeccompRule::Fixed(seccomp_rules::NODE),
            env: default_env(),
            memory_limit_check_only: true,
        },
        spj: None,
    }
}
